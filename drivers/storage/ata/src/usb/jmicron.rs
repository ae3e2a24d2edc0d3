// SPDX-License-Identifier: MPL-2.0
//! JMicron JM20329/JM20336/JM20337/JM20339 bridges, and Prolific PL3507 in JMicron mode.
use libdev::ata::{check_supported, AtaCmdIn, AtaCmdOut, AtaDevice, AtaSupport, Direction};
use libdev::ata::{SMART_FAILING_LBA_HIGH, SMART_FAILING_LBA_MID, SMART_LBA_HIGH, SMART_LBA_MID};
use libdev::bytes::put_be16;
use libdev::scsi::{DxferDir, ScsiCmdIo, ScsiDevice};
use libdev::{Capabilities, DeviceCore, Errno, Result, Tunnel};
use log::*;

const OPCODE: u8 = 0xdf;
/// Register read pseudo command.
const GET_REGISTERS: u8 = 0xfd;
/// Trailer required by Prolific chips.
const PROLIFIC_TRAILER: [u8; 2] = [0x06, 0x7b];
/// Bridge register telling which ports have a device attached.
const PORT_STATUS_ADDR: u16 = 0x720f;

/// Port of a two port JMicron bridge.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum JmicronPort {
    Zero,
    One,
}

impl JmicronPort {
    /// Maps the `N` of `usbjmicron,N`.
    pub fn from_index(n: u32) -> Option<Self> {
        match n {
            0 => Some(JmicronPort::Zero),
            1 => Some(JmicronPort::One),
            _ => None,
        }
    }

    /// Drive select bits of the device register.
    fn device_select(self) -> u8 {
        match self {
            JmicronPort::Zero => 0xa0,
            JmicronPort::One => 0xb0,
        }
    }

    /// Bridge address of the port's task file.
    fn task_file_addr(self) -> u16 {
        match self {
            JmicronPort::Zero => 0x8000,
            JmicronPort::One => 0x9000,
        }
    }
}

/// ATA device behind a JMicron bridge.
#[derive(Debug)]
pub struct UsbJmicronDevice {
    core: DeviceCore,
    tunnel: Tunnel<dyn ScsiDevice>,
    prolific: bool,
    ata_48bit_support: bool,
    port: Option<JmicronPort>,
}

impl UsbJmicronDevice {
    /// Wraps `scsidev`. Without a `port` the port is detected on open, except on Prolific
    /// chips which only have port 0.
    pub fn new(
        scsidev: Box<dyn ScsiDevice>,
        req_type: &str,
        prolific: bool,
        ata_48bit_support: bool,
        port: Option<JmicronPort>,
    ) -> Self {
        let info = super::bridge_info(&*scsidev, "usbjmicron", req_type, "JMicron");
        let mut core = DeviceCore::new(info, Capabilities::ATA);
        core.set_timeout(scsidev.core().timeout());
        UsbJmicronDevice {
            core,
            tunnel: Tunnel::new(scsidev),
            prolific,
            ata_48bit_support,
            port: if port.is_some() || !prolific {
                port
            } else {
                Some(JmicronPort::Zero)
            },
        }
    }

    pub fn port(&self) -> Option<JmicronPort> {
        self.port
    }

    fn cdb_len(&self) -> usize {
        if self.prolific {
            14
        } else {
            12
        }
    }

    /// Reads `buf.len()` bytes of bridge registers starting at `addr`.
    pub fn get_registers(&mut self, addr: u16, buf: &mut [u8]) -> Result<()> {
        let mut cdb = [0u8; 14];
        cdb[0] = OPCODE;
        cdb[1] = 0x10;
        put_be16(&mut cdb[3..], buf.len() as u16);
        put_be16(&mut cdb[6..], addr);
        cdb[11] = GET_REGISTERS;
        cdb[12..].copy_from_slice(&PROLIFIC_TRAILER);

        let len = self.cdb_len();
        let mut io = ScsiCmdIo::new(&cdb[..len], DxferDir::FromDevice, buf);
        self.tunnel.scsi_pass_through_and_check(
            &mut self.core,
            &mut io,
            "UsbJmicronDevice::get_registers: ",
        )
    }

    /// Reads the output registers of the last command from the port's task file.
    ///
    /// The register addresses are not valid on some older chip revisions, and another
    /// command reaching the bridge in between overwrites them.
    pub fn read_task_file(&mut self, out: &mut AtaCmdOut) -> Result<()> {
        let port = self.known_port()?;
        let mut regs = [0u8; 16];
        self.get_registers(port.task_file_addr(), &mut regs)?;
        let r = &mut out.out_regs;
        r.sector_count.set(regs[0]);
        r.lba_mid.set(regs[4]);
        r.lba_low.set(regs[6]);
        r.device.set(regs[9]);
        r.lba_high.set(regs[10]);
        r.error.set(regs[13]);
        r.status.set(regs[14]);
        Ok(())
    }

    fn known_port(&mut self) -> Result<JmicronPort> {
        match self.port {
            Some(port) => Ok(port),
            None => Err(self.core.set_err(Errno::Io, "Unknown JMicron port")),
        }
    }

    fn open_and_detect(&mut self) -> Result<()> {
        self.tunnel.open(&mut self.core)?;
        if self.port.is_some() {
            return Ok(());
        }

        let mut status = [0u8; 1];
        if let Err(e) = self.get_registers(PORT_STATUS_ADDR, &mut status) {
            let _ = self.tunnel.close(&mut self.core);
            return Err(self.core.copy_err(&e));
        }
        let port = match status[0] & 0x44 {
            0x04 => JmicronPort::Zero,
            0x40 => JmicronPort::One,
            0x44 => {
                let _ = self.tunnel.close(&mut self.core);
                return Err(self.core.set_err(
                    Errno::Inval,
                    "Two devices connected, try '-d usbjmicron,[01]'",
                ));
            }
            _ => {
                let _ = self.tunnel.close(&mut self.core);
                return Err(self.core.set_err(Errno::NoDev, "No device connected"));
            }
        };
        info!("{}: device found on JMicron port {:?}", self.core.info().info_name, port);
        self.port = Some(port);
        Ok(())
    }
}

impl AtaDevice for UsbJmicronDevice {
    fn ata_pass_through(&mut self, cmd: &mut AtaCmdIn<'_>, out: &mut AtaCmdOut) -> Result<()> {
        let mut flags = AtaSupport::DATA_OUT | AtaSupport::SMART_STATUS;
        if self.ata_48bit_support {
            flags |= AtaSupport::LBA48_HI_NULL;
        }
        self.core.record(check_supported(cmd, flags, Some("JMicron")))?;
        let port = self.known_port()?;

        // Only SMART RETURN STATUS may ask for registers: its result is a single status byte
        let status_needed = cmd.is_smart_status() && !cmd.out_needed.is_empty();
        let (len, read) = if status_needed {
            (1, true)
        } else {
            match cmd.direction {
                Direction::NoData => (0, true),
                Direction::In => (cmd.size, true),
                Direction::Out => (cmd.size, false),
            }
        };

        let regs = &cmd.in_regs;
        let mut cdb = [0u8; 14];
        cdb[0] = OPCODE;
        cdb[1] = if read { 0x10 } else { 0x00 };
        put_be16(&mut cdb[3..], len as u16);
        cdb[5] = regs.features.val();
        cdb[6] = regs.sector_count.val();
        cdb[7] = regs.lba_low.val();
        cdb[8] = regs.lba_mid.val();
        cdb[9] = regs.lba_high.val();
        cdb[10] = regs.device.val() | port.device_select();
        cdb[11] = regs.command.val();
        cdb[12..].copy_from_slice(&PROLIFIC_TRAILER);

        let mut status = [0xffu8; 1];
        let resid = {
            let (dir, buf) = if status_needed {
                (DxferDir::FromDevice, &mut status[..])
            } else {
                crate::scsi_transfer(cmd)
            };
            let mut io = ScsiCmdIo::new(&cdb[..self.cdb_len()], dir, buf);
            self.tunnel.scsi_pass_through_and_check(
                &mut self.core,
                &mut io,
                "UsbJmicronDevice::ata_pass_through: ",
            )?;
            io.resid
        };

        if status_needed {
            // Some (Prolific) bridges do not transfer the status byte
            if resid == 1 {
                return Err(self.core.set_err(
                    Errno::NoSys,
                    "Incomplete response, status byte missing [JMicron]",
                ));
            }
            let (mid, high) = match status[0] {
                SMART_LBA_HIGH => (SMART_LBA_MID, SMART_LBA_HIGH),
                SMART_FAILING_LBA_HIGH => (SMART_FAILING_LBA_MID, SMART_FAILING_LBA_HIGH),
                // JM20336 always answers 0x01
                b => {
                    return Err(self.core.set_err(
                        Errno::NoSys,
                        format!("Invalid status byte (0x{:02x}) [JMicron]", b),
                    ))
                }
            };
            out.out_regs.lba_mid.set(mid);
            out.out_regs.lba_high.set(high);
        }
        Ok(())
    }
}

tunnelled_ata_device!(UsbJmicronDevice, open_and_detect);
