// SPDX-License-Identifier: MPL-2.0
#![allow(dead_code)]
use ata::sat::{SatDevice, SatLength, SatMode};
use libdev::mock::{MockScsi, ScsiReply, SharedLog};
use libdev::{AtaDevice, DeviceError, Errno, Result, ScsiDevice};
use passthru::{Config, Interface, Platform};

/// Platform whose base devices are scripted SCSI devices. Every device created gets the
/// replies queued so far.
#[derive(Debug, Default)]
pub struct TestPlatform {
    replies: Vec<ScsiReply>,
    pub logs: Vec<SharedLog>,
}

impl TestPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, reply: ScsiReply) -> Self {
        self.replies.push(reply);
        self
    }

    /// Log of the most recently created device.
    pub fn log(&self) -> SharedLog {
        self.logs.last().cloned().expect("no device created")
    }

    fn mock(&mut self, name: &str) -> MockScsi {
        let (mut mock, log) = MockScsi::new(name);
        for reply in self.replies.drain(..) {
            mock.push(reply);
        }
        self.logs.push(log);
        mock
    }
}

impl Platform for TestPlatform {
    fn get_ata_device(&mut self, name: &str, req_type: &str) -> Result<Box<dyn AtaDevice>> {
        if req_type != "ata" {
            return Err(DeviceError::new(
                Errno::Inval,
                format!("Unknown device type '{}'", req_type),
            ));
        }
        let scsidev = Box::new(self.mock(name));
        Ok(Box::new(SatDevice::new(scsidev, "sat", SatMode::SatAlways, SatLength::Len16)))
    }

    fn get_scsi_device(&mut self, name: &str, req_type: &str) -> Result<Box<dyn ScsiDevice>> {
        if req_type != "scsi" {
            return Err(DeviceError::new(
                Errno::Inval,
                format!("Unknown device type '{}'", req_type),
            ));
        }
        Ok(Box::new(self.mock(name)))
    }
}

pub fn interface(platform: TestPlatform) -> Interface<TestPlatform> {
    Interface::new(platform, Config::default())
}

/// CHECK CONDITION sense carrying an ATA Return descriptor with the given LBA mid/high and
/// status registers.
pub fn ata_return_sense(sense_key: u8, lba_mid: u8, lba_high: u8, status: u8) -> ScsiReply {
    let mut sense = vec![0x72, sense_key, 0x00, 0x1d, 0, 0, 0, 14];
    sense.extend_from_slice(&[
        0x09, 0x0c, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, lba_mid, 0x00, lba_high, 0xa0, status,
    ]);
    ScsiReply::sense(&sense)
}

/// 512-byte JMicron SNT reply block.
pub fn jmicron_reply(result: u32, status: u16) -> ScsiReply {
    let mut data = vec![0u8; 512];
    data[0..4].copy_from_slice(b"NVME");
    data[8..12].copy_from_slice(&result.to_le_bytes());
    data[20..24].copy_from_slice(&(u32::from(status) << 17).to_le_bytes());
    ScsiReply::data(&data)
}

/// Identify Controller data with the given model number.
pub fn identify_data(model: &[u8]) -> ScsiReply {
    let mut data = vec![0u8; 4096];
    data[24..24 + model.len()].copy_from_slice(model);
    ScsiReply::data(&data)
}
