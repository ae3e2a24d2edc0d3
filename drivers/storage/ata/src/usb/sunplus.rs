// SPDX-License-Identifier: MPL-2.0
//! SunplusIT bridges.
use libdev::ata::{check_supported, AtaCmdIn, AtaCmdOut, AtaDevice, AtaSupport, Direction};
use libdev::scsi::{DxferDir, ScsiCmdIo, ScsiDevice};
use libdev::{Capabilities, DeviceCore, Result, Tunnel};

const OPCODE: u8 = 0xf8;

/// Sunplus vendor subcommands (CDB byte 2).
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Subcommand {
    GetStatus = 0x21,
    PassThrough = 0x22,
    /// Loads the previous register group of a 48-bit command.
    Presetting = 0x23,
}

fn cdb(sub: Subcommand) -> [u8; 12] {
    let mut cdb = [0u8; 12];
    cdb[0] = OPCODE;
    cdb[2] = sub as u8;
    cdb
}

/// ATA device behind a Sunplus bridge.
#[derive(Debug)]
pub struct UsbSunplusDevice {
    core: DeviceCore,
    tunnel: Tunnel<dyn ScsiDevice>,
}

impl UsbSunplusDevice {
    pub fn new(scsidev: Box<dyn ScsiDevice>, req_type: &str) -> Self {
        let info = super::bridge_info(&*scsidev, "usbsunplus", req_type, "Sunplus");
        let mut core = DeviceCore::new(info, Capabilities::ATA);
        core.set_timeout(scsidev.core().timeout());
        UsbSunplusDevice {
            core,
            tunnel: Tunnel::new(scsidev),
        }
    }
}

impl AtaDevice for UsbSunplusDevice {
    fn ata_pass_through(&mut self, cmd: &mut AtaCmdIn<'_>, out: &mut AtaCmdOut) -> Result<()> {
        self.core.record(check_supported(
            cmd,
            AtaSupport::DATA_OUT | AtaSupport::OUTPUT_REGS | AtaSupport::LBA48,
            Some("Sunplus"),
        ))?;

        let regs = cmd.in_regs;
        if regs.is_48bit_cmd() {
            let mut preset = cdb(Subcommand::Presetting);
            preset[5] = regs.prev.features.val();
            preset[6] = regs.prev.sector_count.val();
            preset[7] = regs.prev.lba_low.val();
            preset[8] = regs.prev.lba_mid.val();
            preset[9] = regs.prev.lba_high.val();
            let mut io = ScsiCmdIo::no_data(&preset);
            self.tunnel.scsi_pass_through_and_check(
                &mut self.core,
                &mut io,
                "UsbSunplusDevice::scsi_pass_through (presetting): ",
            )?;
        }

        let (protocol, len) = match cmd.direction {
            Direction::NoData => (0x00, 0),
            Direction::In => (0x10, cmd.size),
            Direction::Out => (0x11, cmd.size),
        };
        let mut pt = cdb(Subcommand::PassThrough);
        pt[3] = protocol;
        pt[4] = (len >> 9) as u8;
        pt[5] = regs.features.val();
        pt[6] = regs.sector_count.val();
        pt[7] = regs.lba_low.val();
        pt[8] = regs.lba_mid.val();
        pt[9] = regs.lba_high.val();
        pt[10] = regs.device.val() | 0xa0;
        pt[11] = regs.command.val();
        let out_needed = !cmd.out_needed.is_empty();
        {
            let (dir, buf) = crate::scsi_transfer(cmd);
            let mut io = ScsiCmdIo::new(&pt, dir, buf);
            // an ATA error comes back as MEDIUM ERROR sense
            self.tunnel.scsi_pass_through_and_check(
                &mut self.core,
                &mut io,
                "UsbSunplusDevice::scsi_pass_through: ",
            )?;
        }
        if !out_needed {
            return Ok(());
        }

        let get_status = cdb(Subcommand::GetStatus);
        let mut regbuf = [0u8; 8];
        let mut io = ScsiCmdIo::new(&get_status, DxferDir::FromDevice, &mut regbuf);
        self.tunnel.scsi_pass_through_and_check(
            &mut self.core,
            &mut io,
            "UsbSunplusDevice::scsi_pass_through (get registers): ",
        )?;
        let r = &mut out.out_regs;
        r.error.set(regbuf[1]);
        r.sector_count.set(regbuf[2]);
        r.lba_low.set(regbuf[3]);
        r.lba_mid.set(regbuf[4]);
        r.lba_high.set(regbuf[5]);
        r.device.set(regbuf[6]);
        r.status.set(regbuf[7]);
        Ok(())
    }
}

tunnelled_ata_device!(UsbSunplusDevice);
