// SPDX-License-Identifier: MPL-2.0
//! Cypress CY7C68300 ATACB bridges.
use crate::cmd_set::{AtaCommandSet, Completion, SmartCommand};
use bit_field::BitField;
use libdev::ata::{AtaCmdIn, AtaCmdOut, AtaCommand, AtaDevice, SmartSubcommand, SECTOR_SIZE};
use libdev::ata::{SMART_FAILING_LBA_HIGH, SMART_FAILING_LBA_MID, SMART_LBA_HIGH, SMART_LBA_MID};
use libdev::scsi::{DxferDir, ScsiCmdIo, ScsiDevice};
use libdev::{Capabilities, DeviceCore, Errno, Result, Tunnel};
use log::*;

/// Vendor specific CDB signature used unless `usbcypress,0xNN` says otherwise.
pub const CYPRESS_SIGNATURE_DEFAULT: u8 = 0x24;
/// bVSCBSubCommand selecting ATACB.
const ATACB: u8 = 0x24;
/// Features, sector count, LBA low/mid/high and command are valid.
const REGISTER_SELECT: u8 = 0xbe;
const CDB_LEN: usize = 16;
/// Registers returned by a read taskfile ATACB.
const TASKFILE_LEN: usize = 8;

/// Task file and transfer of one [`SmartCommand`].
#[derive(Clone, Copy, Debug)]
struct Atacb {
    command: u8,
    feature: u8,
    sector_count: u8,
    lba_low: u8,
    dir: DxferDir,
    /// Registers are read back with a second ATACB.
    ck_cond: bool,
}

impl Atacb {
    fn smart(feature: SmartSubcommand) -> Self {
        Atacb {
            command: AtaCommand::Smart as u8,
            feature: feature as u8,
            sector_count: 0,
            lba_low: 0,
            dir: DxferDir::None,
            ck_cond: false,
        }
    }

    fn new(command: SmartCommand, select: u8) -> Self {
        use SmartCommand::*;
        let read = |feature, lba_low| Atacb {
            sector_count: 1,
            lba_low,
            dir: DxferDir::FromDevice,
            ..Atacb::smart(feature)
        };
        match command {
            CheckPowerMode => Atacb {
                command: AtaCommand::CheckPowerMode as u8,
                feature: 0,
                ck_cond: true,
                ..Atacb::smart(SmartSubcommand::ReturnStatus)
            },
            ReadValues => read(SmartSubcommand::ReadData, 0),
            ReadThresholds => read(SmartSubcommand::ReadThresholds, 1),
            ReadLog => read(SmartSubcommand::ReadLog, select),
            WriteLog => Atacb {
                dir: DxferDir::ToDevice,
                ..read(SmartSubcommand::WriteLog, select)
            },
            Identify => Atacb {
                command: AtaCommand::IdentifyDevice as u8,
                feature: 0,
                ..read(SmartSubcommand::ReadData, 0)
            },
            PIdentify => Atacb {
                command: AtaCommand::IdentifyPacketDevice as u8,
                feature: 0,
                ..read(SmartSubcommand::ReadData, 0)
            },
            Enable => Atacb {
                lba_low: 1,
                ..Atacb::smart(SmartSubcommand::EnableOperations)
            },
            Disable => Atacb {
                lba_low: 1,
                ..Atacb::smart(SmartSubcommand::DisableOperations)
            },
            Status | StatusCheck => Atacb {
                ck_cond: true,
                ..Atacb::smart(SmartSubcommand::ReturnStatus)
            },
            // non-data, the count carries the setting
            AutoOffline => Atacb {
                sector_count: select,
                ..Atacb::smart(SmartSubcommand::AutoOffline)
            },
            Autosave => Atacb {
                sector_count: select,
                ..Atacb::smart(SmartSubcommand::ToggleAttributeAutosave)
            },
            ImmediateOffline => Atacb {
                lba_low: select,
                ..Atacb::smart(SmartSubcommand::ExecuteOfflineImmediate)
            },
        }
    }

    fn is_identify(&self) -> bool {
        self.command == AtaCommand::IdentifyDevice as u8
            || self.command == AtaCommand::IdentifyPacketDevice as u8
    }
}

/// ATA device behind a Cypress ATACB bridge.
///
/// The bridge only understands a fixed set of operations, so this is an [`AtaCommandSet`].
/// Registers are read back with a second ATACB; anything else touching the disk between the
/// two commands garbles them.
#[derive(Debug)]
pub struct UsbCypressDevice {
    core: DeviceCore,
    tunnel: Tunnel<dyn ScsiDevice>,
    signature: u8,
}

impl UsbCypressDevice {
    pub fn new(scsidev: Box<dyn ScsiDevice>, req_type: &str, signature: u8) -> Self {
        let info = super::bridge_info(&*scsidev, "usbcypress", req_type, "Cypress");
        let mut core = DeviceCore::new(info, Capabilities::ATA);
        core.set_timeout(scsidev.core().timeout());
        UsbCypressDevice {
            core,
            tunnel: Tunnel::new(scsidev),
            signature,
        }
    }

    pub fn signature(&self) -> u8 {
        self.signature
    }

    fn build_cdb(&self, tf: &Atacb) -> [u8; CDB_LEN] {
        let mut cdb = [0u8; CDB_LEN];
        cdb[0] = self.signature;
        cdb[1] = ATACB;
        cdb[2].set_bit(7, tf.is_identify());
        cdb[3] = REGISTER_SELECT;
        // TransferBlockCount: 512 byte blocks
        cdb[4] = 1;
        cdb[6] = tf.feature;
        cdb[7] = tf.sector_count;
        cdb[8] = tf.lba_low;
        if tf.command == AtaCommand::Smart as u8 {
            cdb[9] = SMART_LBA_MID;
            cdb[10] = SMART_LBA_HIGH;
        }
        cdb[12] = tf.command;
        cdb
    }

    /// Sends one ATACB. Sense data means the command failed or the bridge is no Cypress.
    fn exchange(&mut self, cdb: &[u8], dir: DxferDir, buf: &mut [u8]) -> Result<()> {
        let mut io = ScsiCmdIo::new(cdb, dir, buf);
        io.timeout = self.core.timeout();
        if let Err(e) = self.tunnel.scsi_pass_through(&mut self.core, &mut io) {
            debug!(
                "UsbCypressDevice::ata_command_interface: scsi_pass_through() failed, errno={} [{}]",
                e.no.code(),
                e
            );
            return Err(e);
        }
        if io.has_sense() {
            return Err(self.core.set_err(
                Errno::Io,
                format!("ATACB command failed: {} [USB Cypress]", io.simple_error()),
            ));
        }
        Ok(())
    }
}

impl AtaCommandSet for UsbCypressDevice {
    fn ata_command_interface(
        &mut self,
        command: SmartCommand,
        select: u8,
        data: &mut [u8],
    ) -> Result<Completion> {
        let tf = Atacb::new(command, select);
        let mut cdb = self.build_cdb(&tf);

        if tf.dir == DxferDir::None {
            self.exchange(&cdb, DxferDir::None, &mut [])?;
        } else {
            if data.len() < SECTOR_SIZE {
                return Err(self.core.set_err(
                    Errno::Inval,
                    format!("Buffer length {} smaller than transfer size 512", data.len()),
                ));
            }
            let buf = &mut data[..SECTOR_SIZE];
            if tf.dir == DxferDir::FromDevice {
                buf.fill(0);
            }
            self.exchange(&cdb, tf.dir, buf)?;
        }
        if !tf.ck_cond {
            return Ok(Completion::Done);
        }

        // Same command with the read taskfile bit: returns the registers selected in cdb[3]
        // instead of executing anything.
        cdb[2] = 0x01;
        let mut regs = [0u8; TASKFILE_LEN];
        self.exchange(&cdb, DxferDir::FromDevice, &mut regs)?;
        trace!("Values from ATA Return Descriptor are: {:02x?}", regs);

        match command {
            SmartCommand::CheckPowerMode => {
                if let Some(b) = data.first_mut() {
                    *b = regs[2];
                }
                Ok(Completion::Done)
            }
            SmartCommand::StatusCheck => match (regs[4], regs[5]) {
                (SMART_LBA_MID, SMART_LBA_HIGH) => Ok(Completion::Done),
                (SMART_FAILING_LBA_MID, SMART_FAILING_LBA_HIGH) => {
                    Ok(Completion::ThresholdExceeded)
                }
                (mid, high) => {
                    warn!(
                        "{}: SMART STATUS returned lba_mid 0x{:02x}, lba_high 0x{:02x}; this may \
                         be due to a race in the Cypress bridge, retry without other disk access",
                        self.core.info().info_name,
                        mid,
                        high
                    );
                    Err(self
                        .core
                        .set_err(Errno::Io, "Error SMART Status command failed [USB Cypress]"))
                }
            },
            _ => Ok(Completion::Done),
        }
    }
}

impl AtaDevice for UsbCypressDevice {
    fn ata_pass_through(&mut self, cmd: &mut AtaCmdIn<'_>, out: &mut AtaCmdOut) -> Result<()> {
        self.command_set_pass_through(cmd, out)
    }
}

tunnelled_ata_device!(UsbCypressDevice);

#[cfg(test)]
mod tests {
    use super::*;
    use libdev::SmartDevice;
    use libdev::ata::OutRegs;
    use libdev::mock::{MockScsi, ScsiReply};

    fn cypress(mock: MockScsi) -> UsbCypressDevice {
        UsbCypressDevice::new(Box::new(mock.opened()), "usbcypress", CYPRESS_SIGNATURE_DEFAULT)
    }

    fn smart_status() -> AtaCmdIn<'static> {
        let mut cmd = AtaCmdIn::new();
        cmd.in_regs.command.set(AtaCommand::Smart as u8);
        cmd.in_regs.features.set(SmartSubcommand::ReturnStatus as u8);
        cmd.out_needed = OutRegs::LBA_MID | OutRegs::LBA_HIGH;
        cmd
    }

    #[test]
    fn names() {
        let (mock, _log) = MockScsi::new("/dev/sdc");
        let dev = cypress(mock);
        assert_eq!(dev.info().dev_type, "usbcypress");
        assert_eq!(dev.info().info_name, "/dev/sdc [USB Cypress]");
        assert!(dev.is_ata() && !dev.is_scsi());
    }

    #[test]
    fn read_log_cdb() {
        let (mock, log) = MockScsi::new("/dev/sdc");
        let mut dev = cypress(mock);
        let mut buf = [0xaau8; 512];
        let mut cmd = AtaCmdIn::new();
        cmd.in_regs.command.set(AtaCommand::Smart as u8);
        cmd.in_regs.features.set(SmartSubcommand::ReadLog as u8);
        cmd.in_regs.lba_low.set(0x06);
        cmd.set_data_in(&mut buf, 1);
        dev.ata_pass_through(&mut cmd, &mut AtaCmdOut::default()).unwrap();
        let log = log.borrow();
        assert_eq!(log.sent.len(), 1);
        assert_eq!(
            log.sent[0].cdb,
            [0x24, 0x24, 0x00, 0xbe, 0x01, 0x00, 0xd5, 0x01, 0x06, 0x4f, 0xc2, 0x00, 0xb0, 0, 0, 0]
        );
        assert_eq!(log.sent[0].dir, DxferDir::FromDevice);
        assert_eq!(log.sent[0].len, 512);
        drop(log);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn identify_sets_identify_bit() {
        let (mock, log) = MockScsi::new("/dev/sdc");
        let mut dev = UsbCypressDevice::new(Box::new(mock.opened()), "usbcypress,0x42", 0x42);
        let mut buf = [0u8; 512];
        let mut cmd = AtaCmdIn::new();
        cmd.in_regs.command.set(AtaCommand::IdentifyDevice as u8);
        cmd.set_data_in(&mut buf, 1);
        dev.ata_pass_through(&mut cmd, &mut AtaCmdOut::default()).unwrap();
        let cdb = &log.borrow().sent[0].cdb;
        assert_eq!(cdb[0], 0x42);
        assert_eq!(cdb[2], 0x80);
        assert_eq!(cdb[9], 0);
        assert_eq!(cdb[12], 0xec);
    }

    #[test]
    fn status_check_reads_taskfile() {
        let (mut mock, log) = MockScsi::new("/dev/sdc");
        mock.push(ScsiReply::default())
            .push(ScsiReply::data(&[0x00, 0x00, 0x00, 0x00, 0xf4, 0x2c, 0xa0, 0x50]));
        let mut dev = cypress(mock);
        let mut out = AtaCmdOut::default();
        dev.ata_pass_through(&mut smart_status(), &mut out).unwrap();
        assert_eq!(out.out_regs.lba_mid.val(), SMART_FAILING_LBA_MID);
        assert_eq!(out.out_regs.lba_high.val(), SMART_FAILING_LBA_HIGH);
        let log = log.borrow();
        assert_eq!(log.sent.len(), 2);
        assert_eq!(log.sent[1].cdb[2], 0x01);
        assert_eq!(log.sent[1].len, 8);
    }

    #[test]
    fn unexpected_status_fails() {
        let (mut mock, _log) = MockScsi::new("/dev/sdc");
        mock.push(ScsiReply::default())
            .push(ScsiReply::data(&[0, 0, 0, 0, 0x00, 0x00, 0, 0x50]));
        let mut dev = cypress(mock);
        let e = dev
            .ata_pass_through(&mut smart_status(), &mut AtaCmdOut::default())
            .unwrap_err();
        assert_eq!(e.no, Errno::Io);
        assert_eq!(dev.err(), Some(&e));
    }

    #[test]
    fn check_power_mode_returns_count() {
        let (mut mock, _log) = MockScsi::new("/dev/sdc");
        mock.push(ScsiReply::default())
            .push(ScsiReply::data(&[0, 0, 0xff, 0, 0, 0, 0, 0x50]));
        let mut dev = cypress(mock);
        let mut cmd = AtaCmdIn::new();
        cmd.in_regs.command.set(AtaCommand::CheckPowerMode as u8);
        cmd.out_needed = OutRegs::SECTOR_COUNT;
        let mut out = AtaCmdOut::default();
        dev.ata_pass_through(&mut cmd, &mut out).unwrap();
        assert_eq!(out.out_regs.sector_count.val(), 0xff);
    }

    #[test]
    fn check_condition_fails() {
        let (mut mock, _log) = MockScsi::new("/dev/sdc");
        mock.push(ScsiReply::sense(&[0x70, 0, 0x05, 0, 0, 0, 0, 10, 0, 0, 0, 0, 0x20, 0]));
        let mut dev = cypress(mock);
        let mut cmd = AtaCmdIn::new();
        cmd.in_regs.command.set(AtaCommand::Smart as u8);
        cmd.in_regs.features.set(SmartSubcommand::EnableOperations as u8);
        let e = dev.ata_pass_through(&mut cmd, &mut AtaCmdOut::default()).unwrap_err();
        assert_eq!(e.no, Errno::Io);
        assert!(e.msg.ends_with("[USB Cypress]"));
    }

    #[test]
    fn non_smart_command_is_unsupported() {
        let (mock, log) = MockScsi::new("/dev/sdc");
        let mut dev = cypress(mock);
        let mut cmd = AtaCmdIn::new();
        cmd.in_regs.command.set(0xe7);
        let e = dev.ata_pass_through(&mut cmd, &mut AtaCmdOut::default()).unwrap_err();
        assert_eq!(e.no, Errno::NoSys);
        assert!(log.borrow().sent.is_empty());
    }
}
