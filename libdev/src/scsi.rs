// SPDX-License-Identifier: MPL-2.0
//! SCSI pass-through request model and the capability every tunnel is built on.
use crate::bytes::put_be16;
use crate::device::{IntoSmartDevice, SmartDevice};
use crate::error::{DeviceError, Errno, Result};
use crate::sense::{self, SimpleError};
use log::*;

/// Timeout in seconds carried by every SCSI command unless configured otherwise.
pub const SCSI_TIMEOUT_DEFAULT: u32 = 60;
/// Size of the sense buffer handed to the transport.
pub const SENSE_LEN: usize = 32;

/// SCSI opcodes issued by this crate.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ScsiOpcode {
    Inquiry = 0x12,
    /// ATA PASS-THROUGH (16).
    SatAtaPassThrough16 = 0x85,
    /// ATA PASS-THROUGH (12).
    SatAtaPassThrough12 = 0xa1,
}

/// Data transfer direction of a SCSI command.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DxferDir {
    None,
    FromDevice,
    ToDevice,
}

/// One SCSI command exchange.
///
/// The transport fills `sense`, `resp_sense_len`, `scsi_status` and `resid`.
#[derive(Debug)]
pub struct ScsiCmdIo<'a> {
    pub cdb: &'a [u8],
    pub dxfer_dir: DxferDir,
    /// Transfer buffer; its length is the transfer length.
    pub dxfer: &'a mut [u8],
    pub sense: [u8; SENSE_LEN],
    pub resp_sense_len: usize,
    pub scsi_status: u8,
    /// Bytes requested but not transferred.
    pub resid: i32,
    /// Timeout in seconds.
    pub timeout: u32,
}

impl<'a> ScsiCmdIo<'a> {
    /// Creates a command with an empty sense buffer and the default timeout.
    pub fn new(cdb: &'a [u8], dxfer_dir: DxferDir, dxfer: &'a mut [u8]) -> Self {
        ScsiCmdIo {
            cdb,
            dxfer_dir,
            dxfer,
            sense: [0; SENSE_LEN],
            resp_sense_len: 0,
            scsi_status: 0,
            resid: 0,
            timeout: SCSI_TIMEOUT_DEFAULT,
        }
    }

    /// Creates a command without data transfer.
    pub fn no_data(cdb: &'a [u8]) -> Self {
        ScsiCmdIo::new(cdb, DxferDir::None, &mut [])
    }

    /// Sense bytes the device actually returned.
    pub fn sense_data(&self) -> &[u8] {
        &self.sense[..self.resp_sense_len.min(SENSE_LEN)]
    }

    /// Returns true if the command completed with CHECK CONDITION and parseable sense.
    pub fn has_sense(&self) -> bool {
        self.scsi_status == sense::SCSI_STATUS_CHECK_CONDITION
            && sense::normalize(self.sense_data()).is_some()
    }

    /// Classifies the returned sense.
    pub fn simple_error(&self) -> SimpleError {
        sense::simple_filter(&sense::disect(self.scsi_status, self.sense_data()))
    }
}

/// Devices able to execute SCSI commands. Every tunnel's inner transport is one of these.
pub trait ScsiDevice: SmartDevice + IntoSmartDevice {
    /// Executes one SCSI command. Failure means the command could not be delivered; a
    /// delivered command reports device-side errors through `io.scsi_status` and sense.
    fn scsi_pass_through(&mut self, io: &mut ScsiCmdIo<'_>) -> Result<()>;

    /// Executes a command and turns sense data reporting an error into an EIO failure
    /// prefixed with `msg`.
    fn scsi_pass_through_and_check(&mut self, io: &mut ScsiCmdIo<'_>, msg: &str) -> Result<()> {
        io.timeout = self.core().timeout();
        if let Err(e) = self.scsi_pass_through(io) {
            debug!("{}scsi_pass_through() failed, errno={} [{}]", msg, e.no.code(), e);
            return Err(e);
        }
        let err = io.simple_error();
        if err.is_err() {
            debug!("{}scsi error: {}", msg, err);
            return Err(self
                .core_mut()
                .set_err(Errno::Io, format!("{}scsi error {}", msg, err)));
        }
        Ok(())
    }
}

/// Issues a standard INQUIRY for `buf.len()` bytes (at most 1023).
pub fn std_inquiry(dev: &mut dyn ScsiDevice, buf: &mut [u8]) -> Result<()> {
    if buf.len() > 1023 {
        return Err(DeviceError::new(
            Errno::Inval,
            format!("INQUIRY allocation length {} too large", buf.len()),
        ));
    }
    for b in buf.iter_mut() {
        *b = 0;
    }
    let mut cdb = [0u8; 6];
    cdb[0] = ScsiOpcode::Inquiry as u8;
    put_be16(&mut cdb[3..], buf.len() as u16);
    let mut io = ScsiCmdIo::new(&cdb, DxferDir::FromDevice, buf);
    dev.scsi_pass_through_and_check(&mut io, "")
}
