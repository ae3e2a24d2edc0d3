// SPDX-License-Identifier: MPL-2.0
//! Ownership slot for devices that are implemented by tunnelling through another device.
//!
//! A translator embeds a [`Tunnel`] holding the inner device it forwards to. The inner device
//! is owned: dropping the translator drops it. [`Tunnel::release`] moves it out, after which
//! the translator can no longer reach it and dropping the translator leaves it alone. Since
//! release hands back the `Box`, giving the inner device to another owner without releasing
//! it first does not compile.
use crate::ata::{AtaCmdIn, AtaCmdOut, AtaDevice};
use crate::device::{same_device, DeviceCore, SmartDevice};
use crate::error::{Errno, Result};
use crate::scsi::{ScsiCmdIo, ScsiDevice};
use core::fmt;

/// Owned inner device of a tunnelled device.
pub struct Tunnel<I: ?Sized> {
    dev: Option<Box<I>>,
}

impl<I: ?Sized + SmartDevice> fmt::Debug for Tunnel<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut t = f.debug_struct("Tunnel");
        match self.dev.as_deref() {
            Some(dev) => t.field("dev", &dev.info().info_name),
            None => t.field("dev", &"released"),
        };
        t.finish()
    }
}

impl<I: ?Sized + SmartDevice> Tunnel<I> {
    /// Takes ownership of `dev`.
    pub fn new(dev: Box<I>) -> Self {
        Tunnel { dev: Some(dev) }
    }

    /// The inner device, or `None` once released.
    pub fn get(&self) -> Option<&I> {
        self.dev.as_deref()
    }

    /// Mutable inner device, or `None` once released.
    pub fn get_mut(&mut self) -> Option<&mut I> {
        self.dev.as_deref_mut()
    }

    /// The inner device for forwarding a command. Fails with ENOSYS, recorded on `core`, if
    /// it has been released.
    pub fn dev(&mut self, core: &mut DeviceCore) -> Result<&mut I> {
        match self.dev.as_deref_mut() {
            Some(d) => Ok(d),
            None => Err(core.set_errno(Errno::NoSys)),
        }
    }

    /// Returns true once the inner device has been released.
    pub fn is_released(&self) -> bool {
        self.dev.is_none()
    }

    /// Returns true if the inner device exists and is open.
    pub fn is_open(&self) -> bool {
        self.dev.as_deref().map_or(false, |d| d.is_open())
    }

    /// Opens the inner device. Its error is copied to `core` on failure.
    pub fn open(&mut self, core: &mut DeviceCore) -> Result<()> {
        let res = self.dev(core)?.open();
        core.record(res)
    }

    /// Closes the inner device. A released tunnel closes successfully.
    pub fn close(&mut self, core: &mut DeviceCore) -> Result<()> {
        match self.dev.as_deref_mut() {
            None => Ok(()),
            Some(dev) => {
                let res = dev.close();
                core.record(res)
            }
        }
    }

    /// Returns true if `dev` is the inner device.
    pub fn owns<D: ?Sized>(&self, dev: &D) -> bool {
        self.dev.as_deref().map_or(false, |d| same_device(d, dev))
    }

    /// Moves the inner device out without closing it.
    pub fn release(&mut self) -> Option<Box<I>> {
        self.dev.take()
    }
}

impl Tunnel<dyn ScsiDevice> {
    /// Forwards `io` to the inner SCSI device. Its error is copied to `core` on failure.
    pub fn scsi_pass_through(
        &mut self,
        core: &mut DeviceCore,
        io: &mut ScsiCmdIo<'_>,
    ) -> Result<()> {
        let res = self.dev(core)?.scsi_pass_through(io);
        core.record(res)
    }

    /// Forwards `io` with [`ScsiDevice::scsi_pass_through_and_check`].
    pub fn scsi_pass_through_and_check(
        &mut self,
        core: &mut DeviceCore,
        io: &mut ScsiCmdIo<'_>,
        msg: &str,
    ) -> Result<()> {
        let res = self.dev(core)?.scsi_pass_through_and_check(io, msg);
        core.record(res)
    }
}

impl Tunnel<dyn AtaDevice> {
    /// Forwards an ATA command to the inner ATA device.
    pub fn ata_pass_through(
        &mut self,
        core: &mut DeviceCore,
        cmd: &mut AtaCmdIn<'_>,
        out: &mut AtaCmdOut,
    ) -> Result<()> {
        let res = self.dev(core)?.ata_pass_through(cmd, out);
        core.record(res)
    }
}
