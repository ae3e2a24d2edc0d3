// SPDX-License-Identifier: MPL-2.0
//! The device entity every translator is built from.
//!
//! A device is a [`DeviceCore`] (names, capability set, last error) plus whatever capability
//! traits its type implements. Capability tests are plain bit tests on the core; downcasts
//! return a trait object view or `None`.
//!
//! Devices are single threaded. None of the device types are `Sync`, and a device object must
//! only ever be driven by one thread at a time; concurrent use of the same device object is
//! undefined behaviour at the protocol level even where the type system would permit it.
use crate::ata::AtaDevice;
use crate::error::{DeviceError, Errno, Result};
use crate::nvme::NvmeDevice;
use crate::scsi::{ScsiDevice, SCSI_TIMEOUT_DEFAULT};
use bitflags::bitflags;
use log::*;
use core::marker::PhantomData;

bitflags! {
    /// Protocols a device currently exposes.
    pub struct Capabilities: u8 {
        const ATA = 1 << 0;
        const SCSI = 1 << 1;
        const NVME = 1 << 2;
    }
}

/// Naming information of a device.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct DeviceInfo {
    /// OS level device name, e.g. `/dev/sdb`.
    pub dev_name: String,
    /// Informal name for messages, e.g. `/dev/sdb [USB JMicron]`.
    pub info_name: String,
    /// Actual device type, e.g. `usbjmicron`.
    pub dev_type: String,
    /// Device type requested by the user.
    pub req_type: String,
}

impl DeviceInfo {
    /// Creates info whose informal name equals the device name.
    pub fn new(dev_name: &str, dev_type: &str, req_type: &str) -> Self {
        DeviceInfo {
            dev_name: dev_name.into(),
            info_name: dev_name.into(),
            dev_type: dev_type.into(),
            req_type: req_type.into(),
        }
    }
}

/// State shared by all device types.
#[derive(Debug)]
pub struct DeviceCore {
    info: DeviceInfo,
    caps: Capabilities,
    timeout: u32,
    err: Option<DeviceError>,
    // Device objects are driven by a single thread.
    _not_sync: PhantomData<core::cell::Cell<()>>,
}

impl DeviceCore {
    /// Creates a core exposing `caps`.
    pub fn new(info: DeviceInfo, caps: Capabilities) -> Self {
        DeviceCore {
            info,
            caps,
            timeout: SCSI_TIMEOUT_DEFAULT,
            err: None,
            _not_sync: PhantomData,
        }
    }

    /// Naming information.
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Mutable naming information.
    pub fn info_mut(&mut self) -> &mut DeviceInfo {
        &mut self.info
    }

    /// Capabilities currently exposed.
    pub fn caps(&self) -> Capabilities {
        self.caps
    }

    /// Shows or hides a capability.
    pub fn set_cap(&mut self, cap: Capabilities, visible: bool) {
        self.caps.set(cap, visible);
    }

    /// SCSI command timeout in seconds.
    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    /// Sets the SCSI command timeout in seconds.
    pub fn set_timeout(&mut self, secs: u32) {
        self.timeout = secs;
    }

    /// Last recorded error.
    pub fn err(&self) -> Option<&DeviceError> {
        self.err.as_ref()
    }

    /// Records an error and returns it for propagation.
    pub fn set_err(&mut self, no: Errno, msg: impl Into<String>) -> DeviceError {
        self.copy_err(&DeviceError::new(no, msg))
    }

    /// Records an error carrying the errno description.
    pub fn set_errno(&mut self, no: Errno) -> DeviceError {
        self.copy_err(&DeviceError::from_errno(no))
    }

    /// Records an error raised elsewhere, typically by an inner device.
    pub fn copy_err(&mut self, e: &DeviceError) -> DeviceError {
        self.err = Some(e.clone());
        e.clone()
    }

    /// Records the error of `res`, if any, and passes `res` on.
    pub fn record<T>(&mut self, res: Result<T>) -> Result<T> {
        res.map_err(|e| self.copy_err(&e))
    }

    /// Forgets the last error.
    pub fn clear_err(&mut self) {
        self.err = None;
    }
}

/// Operations common to every device.
pub trait SmartDevice {
    fn core(&self) -> &DeviceCore;

    fn core_mut(&mut self) -> &mut DeviceCore;

    fn is_open(&self) -> bool;

    fn open(&mut self) -> Result<()>;

    /// Closes the device. Closing a closed device is harmless.
    fn close(&mut self) -> Result<()>;

    /// Opens the device and probes what is really behind it.
    ///
    /// Returns a replacement device when probing shows that a different device type must be
    /// used; `self` should then be dropped. The default just opens the device; a failed open
    /// is left in the device's error slot.
    fn autodetect_open(&mut self) -> Option<Box<dyn SmartDevice>> {
        if let Err(e) = self.open() {
            debug!("{}: open failed: {}", self.core().info().info_name, e);
            self.core_mut().copy_err(&e);
        }
        None
    }

    /// Returns true if `dev` is owned by this device.
    fn owns(&self, dev: &dyn SmartDevice) -> bool {
        let _ = dev;
        false
    }

    fn as_ata(&mut self) -> Option<&mut dyn AtaDevice> {
        None
    }

    fn as_scsi(&mut self) -> Option<&mut dyn ScsiDevice> {
        None
    }

    fn as_nvme(&mut self) -> Option<&mut dyn NvmeDevice> {
        None
    }

    fn info(&self) -> &DeviceInfo {
        self.core().info()
    }

    fn err(&self) -> Option<&DeviceError> {
        self.core().err()
    }

    fn is_ata(&self) -> bool {
        self.core().caps().contains(Capabilities::ATA)
    }

    fn is_scsi(&self) -> bool {
        self.core().caps().contains(Capabilities::SCSI)
    }

    fn is_nvme(&self) -> bool {
        self.core().caps().contains(Capabilities::NVME)
    }
}

/// Conversion of a boxed capability view back into a plain device.
///
/// Implemented for every device type; the capability traits carry it as a supertrait so that
/// a `Box<dyn AtaDevice>` (or SCSI, NVMe) can be handed on as a `Box<dyn SmartDevice>`.
pub trait IntoSmartDevice {
    fn into_smart(self: Box<Self>) -> Box<dyn SmartDevice>;
}

impl<T: SmartDevice + 'static> IntoSmartDevice for T {
    fn into_smart(self: Box<Self>) -> Box<dyn SmartDevice> {
        self
    }
}

/// Runs [`SmartDevice::autodetect_open`] and returns the device to use afterwards, which may
/// differ from `dev`.
pub fn open_autodetect(mut dev: Box<dyn SmartDevice>) -> Box<dyn SmartDevice> {
    match dev.autodetect_open() {
        Some(replacement) => replacement,
        None => dev,
    }
}

/// Returns true if `a` and `b` are the same object.
pub fn same_device<A: ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    core::ptr::eq(a as *const A as *const u8, b as *const B as *const u8)
}
