// SPDX-License-Identifier: MPL-2.0
//! Vendor specific USB to ATA bridges.
//!
//! Each bridge wraps the SCSI device the USB mass storage driver exposes and smuggles the ATA
//! task file through a vendor specific CDB. None of them speak SAT; which one a device needs
//! is selected by the user through the `usb...` device types.
mod cypress;
mod jmicron;
mod prolific;
mod sunplus;

pub use cypress::{UsbCypressDevice, CYPRESS_SIGNATURE_DEFAULT};
pub use jmicron::{JmicronPort, UsbJmicronDevice};
pub use prolific::UsbProlificDevice;
pub use sunplus::UsbSunplusDevice;

use libdev::{DeviceInfo, ScsiDevice};

/// Info of a bridge named `dev_type` around `scsidev`, tagged `[USB <vendor>]`.
pub(crate) fn bridge_info(
    scsidev: &dyn ScsiDevice,
    dev_type: &str,
    req_type: &str,
    vendor: &str,
) -> DeviceInfo {
    let inner = scsidev.info();
    let mut info = DeviceInfo::new(&inner.dev_name, dev_type, req_type);
    info.info_name = format!("{} [USB {}]", inner.info_name, vendor);
    info
}
