// SPDX-License-Identifier: MPL-2.0
//! The ata library contains the translators that implement the ATA capability on top of some
//! other device. Every translator owns its inner device through a [`libdev::Tunnel`] and
//! converts each ATA command into whatever the inner device understands.
//!
//! # Modules
//!
//! The below submodules are in this crate:
//!
//! * sat: SCSI / ATA Translation (ATA PASS-THROUGH (12) and (16))
//! * cmd_set: adapter for translators that only know a fixed table of SMART operations
//! * usb: vendor specific USB to ATA bridges (Cypress, JMicron, Prolific, Sunplus)
//! * intelliprop: drive routing through an IntelliProp multiplexer
#![forbid(
    absolute_paths_not_starting_with_crate,
    anonymous_parameters,
    explicit_outlives_requirements,
    keyword_idents,
    macro_use_extern_crate,
    trivial_numeric_casts,
    unsafe_code,
    unused_extern_crates,
    unused_import_braces
)]
#![deny(missing_debug_implementations, non_ascii_idents)]

/// Implements [`libdev::SmartDevice`] for an ATA translator made of a `core` and a `tunnel`.
///
/// The second form names the inherent method used as `open`; the first one just opens the
/// tunnel.
macro_rules! tunnelled_ata_device {
    ($dev:ty) => {
        impl $dev {
            fn open_tunnel(&mut self) -> libdev::Result<()> {
                self.tunnel.open(&mut self.core)
            }
        }
        tunnelled_ata_device!($dev, open_tunnel);
    };
    ($dev:ty, $open:ident) => {
        impl libdev::SmartDevice for $dev {
            fn core(&self) -> &libdev::DeviceCore {
                &self.core
            }

            fn core_mut(&mut self) -> &mut libdev::DeviceCore {
                &mut self.core
            }

            fn is_open(&self) -> bool {
                self.tunnel.is_open()
            }

            fn open(&mut self) -> libdev::Result<()> {
                self.$open()
            }

            fn close(&mut self) -> libdev::Result<()> {
                self.tunnel.close(&mut self.core)
            }

            fn owns(&self, dev: &dyn libdev::SmartDevice) -> bool {
                self.tunnel.owns(dev)
            }

            fn as_ata(&mut self) -> Option<&mut dyn libdev::AtaDevice> {
                Some(self)
            }
        }
    };
}

/// The cmd_set module maps ATA commands onto a fixed set of SMART operations.
pub mod cmd_set;
mod crc;
/// The intelliprop module selects which drive behind an IntelliProp multiplexer is addressed.
pub mod intelliprop;
/// The sat module implements SCSI / ATA Translation as defined by T10 SAT.
///
/// SAT is the standard way of reaching an ATA drive through a SCSI transport: the ATA task
/// file travels in the CDB of ATA PASS-THROUGH (12) or (16), and the resulting registers come
/// back in the ATA Return descriptor of descriptor format sense data (or, from SAT-2 onwards,
/// in fixed format sense data).
pub mod sat;
/// The usb module contains the vendor specific USB to ATA bridges.
pub mod usb;

pub use crc::crc16;

use libdev::ata::{AtaCmdIn, Direction};
use libdev::scsi::DxferDir;

/// Returns the SCSI direction and data buffer carrying `cmd`'s transfer. DATA IN buffers are
/// zeroed first. Only valid once `cmd` passed [`libdev::ata::check_supported`].
pub(crate) fn scsi_transfer<'c>(cmd: &'c mut AtaCmdIn<'_>) -> (DxferDir, &'c mut [u8]) {
    let dir = match cmd.direction {
        Direction::NoData => return (DxferDir::None, &mut []),
        Direction::In => DxferDir::FromDevice,
        Direction::Out => DxferDir::ToDevice,
    };
    match cmd.data_mut() {
        Some(data) => {
            if dir == DxferDir::FromDevice {
                data.fill(0);
            }
            (dir, data)
        }
        None => (DxferDir::None, &mut []),
    }
}

/// Zeroes the DATA IN buffer of `cmd` so a failed command leaves nothing stale behind.
pub(crate) fn clear_data_in(cmd: &mut AtaCmdIn<'_>) {
    if cmd.direction == Direction::In {
        if let Some(data) = cmd.data_mut() {
            data.fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_in_buffers_are_cleared() {
        let mut buf = [0xa5u8; 512];
        let mut cmd = AtaCmdIn::new();
        cmd.set_data_in(&mut buf, 1);
        let (dir, data) = scsi_transfer(&mut cmd);
        assert_eq!(dir, DxferDir::FromDevice);
        assert!(data.iter().all(|&b| b == 0));
        data[0] = 0x5a;
        clear_data_in(&mut cmd);
        assert_eq!(cmd.data_mut().map(|d| d[0]), Some(0));
    }

    #[test]
    fn data_out_buffers_are_kept() {
        let mut buf = [0xa5u8; 512];
        let mut cmd = AtaCmdIn::new();
        cmd.set_data_out(&mut buf, 1);
        clear_data_in(&mut cmd);
        let (dir, data) = scsi_transfer(&mut cmd);
        assert_eq!(dir, DxferDir::ToDevice);
        assert!(data.iter().all(|&b| b == 0xa5));
    }
}
