// SPDX-License-Identifier: MPL-2.0
//! NVMe admin command model.
use crate::device::{DeviceCore, IntoSmartDevice, SmartDevice};
use crate::error::{DeviceError, Errno, Result};
use bit_field::BitField;

/// Namespace id addressing every namespace of a controller.
pub const BROADCAST_NSID: u32 = 0xffff_ffff;
/// Size of the Identify Controller data structure.
pub const IDENTIFY_SIZE: usize = 4096;

/// Admin opcodes the bridges know how to carry.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum AdminCommand {
    GetLogPage = 0x02,
    Identify = 0x06,
}

/// Identify CNS values (low byte of cdw10).
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum IdentifyCns {
    Namespace = 0x00,
    Controller = 0x01,
}

/// Log page identifiers with bridge specific handling.
pub mod lid {
    /// Device Self-test log.
    pub const SELF_TEST: u8 = 0x06;
}

/// Transfer direction, the two low bits of an NVMe opcode.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NvmeDirection {
    NoData,
    Out,
    In,
    Io,
}

impl NvmeDirection {
    /// Decodes the direction of `opcode`.
    pub fn of(opcode: u8) -> Self {
        match opcode.get_bits(0..2) {
            0 => NvmeDirection::NoData,
            1 => NvmeDirection::Out,
            2 => NvmeDirection::In,
            _ => NvmeDirection::Io,
        }
    }
}

/// NVMe pass-through request.
#[derive(Debug, Default)]
pub struct NvmeCmdIn<'a> {
    pub opcode: u8,
    pub nsid: u32,
    pub cdw10: u32,
    pub cdw11: u32,
    pub cdw12: u32,
    pub cdw13: u32,
    pub cdw14: u32,
    pub cdw15: u32,
    pub buffer: Option<&'a mut [u8]>,
    pub size: usize,
}

impl<'a> NvmeCmdIn<'a> {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transfer direction implied by the opcode.
    pub fn direction(&self) -> NvmeDirection {
        NvmeDirection::of(self.opcode)
    }

    /// Prepares a DATA IN command.
    ///
    /// # Panics
    ///
    /// Panics if `opcode` does not encode a DATA IN transfer.
    pub fn set_data_in(&mut self, opcode: u8, buf: &'a mut [u8]) {
        self.opcode = opcode;
        assert_eq!(
            self.direction(),
            NvmeDirection::In,
            "invalid opcode {:#04x} for DATA IN",
            opcode
        );
        self.size = buf.len();
        self.buffer = Some(buf);
    }

    /// Returns the transfer buffer trimmed to `size`, or `None` if it is missing or shorter
    /// than `size`.
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        let size = self.size;
        match self.buffer.as_deref_mut() {
            Some(b) if b.len() >= size => Some(&mut b[..size]),
            _ => None,
        }
    }
}

/// NVMe completion.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct NvmeCmdOut {
    /// Command specific result (completion dword 0).
    pub result: u32,
    /// Status field without the phase bit.
    pub status: u16,
    pub status_valid: bool,
}

/// Records a nonzero completion status in `out` and on the device.
///
/// # Panics
///
/// Panics if `status` is zero.
pub fn set_nvme_err(
    core: &mut DeviceCore,
    out: &mut NvmeCmdOut,
    status: u16,
    msg: &str,
) -> DeviceError {
    assert_ne!(status, 0, "set_nvme_err() called with status=0");
    out.status = status;
    out.status_valid = true;
    core.set_err(Errno::Io, format!("{}NVMe Status 0x{:02x}", msg, status))
}

/// Devices able to execute NVMe admin commands.
pub trait NvmeDevice: SmartDevice + IntoSmartDevice {
    /// Executes one NVMe command.
    fn nvme_pass_through(&mut self, cmd: &mut NvmeCmdIn<'_>, out: &mut NvmeCmdOut) -> Result<()>;

    /// Namespace id used for namespace specific commands.
    fn nsid(&self) -> u32;
}
