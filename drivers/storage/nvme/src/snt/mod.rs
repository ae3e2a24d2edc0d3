// SPDX-License-Identifier: MPL-2.0
//! SCSI to NVMe Translation.
//!
//! USB enclosures for NVMe drives expose a SCSI device, and each bridge vendor has its own
//! way of getting an NVMe admin command through it. [`SntDevice`] holds what every bridge
//! needs (the inner SCSI device, namespace id, names) and delegates the command encoding to
//! a [`Bridge`].
//!
//! Some enclosures accept SATA and NVMe drives alike. With `maybe_sat` set, opening through
//! [`SmartDevice::autodetect_open`] checks for a model number in the Identify Controller data
//! and, if there is none, hands the inner device over to a SAT translator instead.
use crate::identify;
use ata::sat::{SatDevice, SatLength, SatMode};
use libdev::nvme::{
    AdminCommand, IdentifyCns, NvmeCmdIn, NvmeCmdOut, NvmeDevice, BROADCAST_NSID, IDENTIFY_SIZE,
};
use libdev::{Capabilities, DeviceCore, DeviceInfo, Errno, Result, ScsiDevice, SmartDevice, Tunnel};
use log::*;

mod asmedia;
mod jmicron;
mod realtek;

pub use asmedia::Asmedia;
pub use jmicron::Jmicron;
pub use realtek::Realtek;

/// NVMe device behind an ASMedia bridge.
pub type SntAsmediaDevice = SntDevice<Asmedia>;
/// NVMe device behind a JMicron bridge.
pub type SntJmicronDevice = SntDevice<Jmicron>;
/// NVMe device behind a Realtek bridge.
pub type SntRealtekDevice = SntDevice<Realtek>;

/// Command encoding of one USB to NVMe bridge.
pub trait Bridge: core::fmt::Debug + Default + 'static {
    /// Device type name, e.g. `sntjmicron`.
    const DEV_TYPE: &'static str;
    /// Vendor name shown in the informal device name.
    const VENDOR: &'static str;

    /// Executes `cmd` through `tunnel`. Errors are recorded on `core`.
    fn nvme_pass_through(
        &mut self,
        core: &mut DeviceCore,
        tunnel: &mut Tunnel<dyn ScsiDevice>,
        cmd: &mut NvmeCmdIn<'_>,
        out: &mut NvmeCmdOut,
    ) -> Result<()>;
}

/// NVMe device reached through a USB bridge.
#[derive(Debug)]
pub struct SntDevice<B: Bridge> {
    core: DeviceCore,
    tunnel: Tunnel<dyn ScsiDevice>,
    bridge: B,
    nsid: u32,
    /// Length of the SAT translator the device turns into when no NVMe drive answers.
    maybe_sat: Option<SatLength>,
}

impl<B: Bridge> SntDevice<B> {
    /// Wraps `scsidev`, which becomes owned by the new device. A `nsid` of 0 is replaced by
    /// the broadcast namespace id on open.
    pub fn new(
        scsidev: Box<dyn ScsiDevice>,
        req_type: &str,
        nsid: u32,
        maybe_sat: Option<SatLength>,
    ) -> Self {
        let inner = scsidev.info();
        let mut info = DeviceInfo::new(&inner.dev_name, B::DEV_TYPE, req_type);
        info.info_name = format!("{} [USB NVMe {}]", inner.info_name, B::VENDOR);
        let mut core = DeviceCore::new(info, Capabilities::NVME);
        core.set_timeout(scsidev.core().timeout());
        SntDevice {
            core,
            tunnel: Tunnel::new(scsidev),
            bridge: B::default(),
            nsid,
            maybe_sat,
        }
    }

    /// The inner SCSI device.
    pub fn tunnel(&self) -> &Tunnel<dyn ScsiDevice> {
        &self.tunnel
    }

    /// Returns true if autodetection may replace this device by a SAT translator.
    pub fn maybe_sat(&self) -> bool {
        self.maybe_sat.is_some()
    }
}

impl<B: Bridge> NvmeDevice for SntDevice<B> {
    fn nvme_pass_through(&mut self, cmd: &mut NvmeCmdIn<'_>, out: &mut NvmeCmdOut) -> Result<()> {
        self.bridge
            .nvme_pass_through(&mut self.core, &mut self.tunnel, cmd, out)
    }

    fn nsid(&self) -> u32 {
        self.nsid
    }
}

impl<B: Bridge> SmartDevice for SntDevice<B> {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn is_open(&self) -> bool {
        self.tunnel.is_open()
    }

    fn open(&mut self) -> Result<()> {
        self.tunnel.open(&mut self.core)?;
        if self.nsid == 0 {
            self.nsid = BROADCAST_NSID;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.tunnel.close(&mut self.core)
    }

    fn autodetect_open(&mut self) -> Option<Box<dyn SmartDevice>> {
        if self.open().is_err() {
            return None;
        }
        let len = self.maybe_sat?;
        let mut id = [0u8; IDENTIFY_SIZE];
        if let Ok(hdr) = identify::read_id_ctrl(self, &mut id) {
            let model = hdr.model();
            if !model.is_empty() {
                info!("{}: NVMe device '{}' detected", self.core.info().info_name, model);
                return None;
            }
        }
        // no NVMe drive answered: the inner device goes to SAT still open
        let scsidev = self.tunnel.release()?;
        info!(
            "{}: no NVMe device, switching to SAT",
            self.core.info().info_name
        );
        Some(Box::new(SatDevice::new(scsidev, "sat", SatMode::SatAlways, len)))
    }

    fn owns(&self, dev: &dyn SmartDevice) -> bool {
        self.tunnel.owns(dev)
    }

    fn as_nvme(&mut self) -> Option<&mut dyn NvmeDevice> {
        Some(self)
    }
}

/// Rejects admin commands the restricted (ASMedia and Realtek) bridges cannot encode.
pub(crate) fn check_admin_whitelist(core: &mut DeviceCore, cmd: &NvmeCmdIn<'_>) -> Result<()> {
    const IDENTIFY: u8 = AdminCommand::Identify as u8;
    const GET_LOG_PAGE: u8 = AdminCommand::GetLogPage as u8;
    match cmd.opcode {
        IDENTIFY if cmd.cdw10 == IdentifyCns::Controller as u32 => Ok(()),
        IDENTIFY if cmd.cdw10 == IdentifyCns::Namespace as u32 => {
            if cmd.nsid == 1 {
                Ok(())
            } else {
                Err(core.set_err(
                    Errno::NoSys,
                    format!("NVMe Identify Namespace 0x{:x} not supported", cmd.nsid),
                ))
            }
        }
        IDENTIFY => Err(core.set_err(
            Errno::NoSys,
            format!("NVMe Identify with CDW10=0x{:08x} not supported", cmd.cdw10),
        )),
        GET_LOG_PAGE => {
            if cmd.nsid == BROADCAST_NSID || cmd.nsid == 0 {
                Ok(())
            } else {
                Err(core.set_err(
                    Errno::NoSys,
                    format!("NVMe Get Log Page with NSID=0x{:x} not supported", cmd.nsid),
                ))
            }
        }
        op => Err(core.set_err(
            Errno::NoSys,
            format!("NVMe admin command 0x{:02x} not supported", op),
        )),
    }
}

/// Returns the transfer buffer of a data command. Fails with EINVAL if the buffer is missing
/// or shorter than the transfer size.
pub(crate) fn data_buffer<'c>(
    core: &mut DeviceCore,
    cmd: &'c mut NvmeCmdIn<'_>,
) -> Result<&'c mut [u8]> {
    match cmd.data_mut() {
        Some(data) => Ok(data),
        None => Err(core.set_err(Errno::Inval, "NVMe data buffer missing or too short")),
    }
}
