// SPDX-License-Identifier: MPL-2.0
//! Scripted SCSI transport for exercising translators without hardware.
//!
//! A [`MockScsi`] answers each command with the next queued [`ScsiReply`] (or a plain good
//! completion when the queue is empty) and records what it was sent in a [`MockLog`] shared
//! with the test, so the log stays readable after the device has been moved into a tunnel.
use crate::device::{Capabilities, DeviceCore, DeviceInfo, SmartDevice};
use crate::error::{DeviceError, Result};
use crate::scsi::{DxferDir, ScsiCmdIo, ScsiDevice, SENSE_LEN};
use crate::sense::SCSI_STATUS_CHECK_CONDITION;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Canned completion of one command.
#[derive(Clone, Debug, Default)]
pub struct ScsiReply {
    /// Bytes copied into the transfer buffer of a FROM DEVICE command.
    pub data: Vec<u8>,
    pub sense: Vec<u8>,
    pub scsi_status: u8,
    pub resid: i32,
    /// Makes the transport itself fail.
    pub fail: Option<DeviceError>,
}

impl ScsiReply {
    /// Good completion returning `data`.
    pub fn data(data: &[u8]) -> Self {
        ScsiReply {
            data: data.to_vec(),
            ..ScsiReply::default()
        }
    }

    /// CHECK CONDITION completion with `sense`.
    pub fn sense(sense: &[u8]) -> Self {
        ScsiReply {
            sense: sense.to_vec(),
            scsi_status: SCSI_STATUS_CHECK_CONDITION,
            ..ScsiReply::default()
        }
    }

    /// Transport failure.
    pub fn failure(e: DeviceError) -> Self {
        ScsiReply {
            fail: Some(e),
            ..ScsiReply::default()
        }
    }
}

/// One command as the transport saw it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Exchange {
    pub cdb: Vec<u8>,
    pub dir: DxferDir,
    pub len: usize,
    /// Payload of a TO DEVICE command.
    pub data_out: Vec<u8>,
    pub timeout: u32,
}

/// Observations shared between a [`MockScsi`] and the test driving it.
#[derive(Debug, Default)]
pub struct MockLog {
    pub sent: Vec<Exchange>,
    pub opens: u32,
    pub closes: u32,
    pub dropped: bool,
}

/// Shared handle on a [`MockLog`].
pub type SharedLog = Rc<RefCell<MockLog>>;

/// Scripted SCSI device.
#[derive(Debug)]
pub struct MockScsi {
    core: DeviceCore,
    open: bool,
    replies: VecDeque<ScsiReply>,
    log: SharedLog,
}

impl MockScsi {
    /// Creates a closed device named `name` of type `scsi`.
    pub fn new(name: &str) -> (Self, SharedLog) {
        let log = SharedLog::default();
        let dev = MockScsi {
            core: DeviceCore::new(DeviceInfo::new(name, "scsi", "scsi"), Capabilities::SCSI),
            open: false,
            replies: VecDeque::new(),
            log: Rc::clone(&log),
        };
        (dev, log)
    }

    /// Queues the completion of the next unanswered command.
    pub fn push(&mut self, reply: ScsiReply) -> &mut Self {
        self.replies.push_back(reply);
        self
    }

    /// Marks the device open without counting an open call.
    pub fn opened(mut self) -> Self {
        self.open = true;
        self
    }
}

impl Drop for MockScsi {
    fn drop(&mut self) {
        self.log.borrow_mut().dropped = true;
    }
}

impl SmartDevice for MockScsi {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> Result<()> {
        self.log.borrow_mut().opens += 1;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.log.borrow_mut().closes += 1;
        self.open = false;
        Ok(())
    }

    fn as_scsi(&mut self) -> Option<&mut dyn ScsiDevice> {
        Some(self)
    }
}

impl ScsiDevice for MockScsi {
    fn scsi_pass_through(&mut self, io: &mut ScsiCmdIo<'_>) -> Result<()> {
        let data_out = match io.dxfer_dir {
            DxferDir::ToDevice => io.dxfer.to_vec(),
            _ => Vec::new(),
        };
        self.log.borrow_mut().sent.push(Exchange {
            cdb: io.cdb.to_vec(),
            dir: io.dxfer_dir,
            len: io.dxfer.len(),
            data_out,
            timeout: io.timeout,
        });
        let reply = self.replies.pop_front().unwrap_or_default();
        if let Some(e) = reply.fail {
            return Err(self.core.copy_err(&e));
        }
        if io.dxfer_dir == DxferDir::FromDevice {
            let n = reply.data.len().min(io.dxfer.len());
            io.dxfer[..n].copy_from_slice(&reply.data[..n]);
        }
        let n = reply.sense.len().min(SENSE_LEN);
        io.sense[..n].copy_from_slice(&reply.sense[..n]);
        io.resp_sense_len = n;
        io.scsi_status = reply.scsi_status;
        io.resid = reply.resid;
        Ok(())
    }
}
