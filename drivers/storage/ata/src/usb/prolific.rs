// SPDX-License-Identifier: MPL-2.0
//! Prolific PL2773 (and probably PL2771) bridges.
use bit_field::BitField;
use libdev::ata::{check_supported, AtaCmdIn, AtaCmdOut, AtaDevice, AtaSupport, Direction};
use libdev::bytes::put_be32;
use libdev::scsi::{DxferDir, ScsiCmdIo, ScsiDevice};
use libdev::{Capabilities, DeviceCore, Result, Tunnel};
use log::*;

/// Prolific ATA pass-through.
const PASS_THROUGH: u8 = 0xd8;
/// Prolific read registers.
const READ_REGISTERS: u8 = 0xd7;
/// Vendor id check word.
const CHECK_WORD: [u8; 2] = [0x06, 0x7b];
/// NORMAL mode nibble of byte 1.
const MODE_NORMAL: u8 = 0x05;

/// ATA device behind a Prolific bridge.
#[derive(Debug)]
pub struct UsbProlificDevice {
    core: DeviceCore,
    tunnel: Tunnel<dyn ScsiDevice>,
}

impl UsbProlificDevice {
    pub fn new(scsidev: Box<dyn ScsiDevice>, req_type: &str) -> Self {
        let info = super::bridge_info(&*scsidev, "usbprolific", req_type, "Prolific");
        let mut core = DeviceCore::new(info, Capabilities::ATA);
        core.set_timeout(scsidev.core().timeout());
        UsbProlificDevice {
            core,
            tunnel: Tunnel::new(scsidev),
        }
    }
}

impl AtaDevice for UsbProlificDevice {
    fn ata_pass_through(&mut self, cmd: &mut AtaCmdIn<'_>, out: &mut AtaCmdOut) -> Result<()> {
        self.core.record(check_supported(
            cmd,
            AtaSupport::DATA_OUT
                | AtaSupport::LBA48_HI_NULL
                | AtaSupport::OUTPUT_REGS
                | AtaSupport::SMART_STATUS,
            Some("Prolific"),
        ))?;

        let regs = &cmd.in_regs;
        let len = if cmd.direction == Direction::NoData { 0 } else { cmd.size };
        let mut cdb = [0u8; 16];
        cdb[0] = PASS_THROUGH;
        cdb[1] = MODE_NORMAL;
        cdb[1].set_bit(4, cmd.direction != Direction::Out);
        cdb[3] = regs.features.val();
        cdb[4..6].copy_from_slice(&CHECK_WORD);
        put_be32(&mut cdb[6..], len as u32);
        cdb[10] = regs.sector_count.val();
        cdb[11] = regs.lba_low.val();
        cdb[12] = regs.lba_mid.val();
        cdb[13] = regs.lba_high.val();
        cdb[14] = regs.device.val() | 0xa0;
        // only PIO commands
        cdb[15] = regs.command.val();

        let out_needed = !cmd.out_needed.is_empty();
        {
            let (dir, buf) = crate::scsi_transfer(cmd);
            let mut io = ScsiCmdIo::new(&cdb, dir, buf);
            self.tunnel.scsi_pass_through_and_check(
                &mut self.core,
                &mut io,
                "UsbProlificDevice::ata_pass_through: ",
            )?;
        }
        if !out_needed {
            return Ok(());
        }

        let mut cdb = [0u8; 16];
        cdb[0] = READ_REGISTERS;
        cdb[4..6].copy_from_slice(&CHECK_WORD);
        let mut regbuf = [0u8; 16];
        let mut io = ScsiCmdIo::new(&cdb, DxferDir::FromDevice, &mut regbuf);
        self.tunnel.scsi_pass_through_and_check(
            &mut self.core,
            &mut io,
            "UsbProlificDevice::scsi_pass_through (get registers): ",
        )?;
        trace!("Prolific registers: {:02x?}", regbuf);

        // regbuf[11] holds the features, regbuf[13] the command
        let r = &mut out.out_regs;
        r.status.set(regbuf[0]);
        r.error.set(regbuf[1]);
        r.sector_count.set(regbuf[2]);
        r.lba_low.set(regbuf[4]);
        r.lba_mid.set(regbuf[6]);
        r.lba_high.set(regbuf[8]);
        r.device.set(regbuf[10]);
        Ok(())
    }
}

tunnelled_ata_device!(UsbProlificDevice);
