// SPDX-License-Identifier: MPL-2.0
use bit_field::BitField;
use libdev::ata::{check_supported, AtaCmdIn, AtaCmdOut, AtaDevice, AtaSupport, Direction};
use libdev::scsi::{self, ScsiCmdIo, ScsiDevice, ScsiOpcode};
use libdev::sense::{self, asc, SenseKey, SimpleError};
use libdev::{Capabilities, DeviceCore, DeviceInfo, Errno, Result, SmartDevice, Tunnel};
use log::*;

/// Sense data descriptor type of the ATA Return descriptor.
pub const ATA_RETURN_DESCRIPTOR: u8 = 0x09;

/// Which ATA PASS-THROUGH command carries the task file.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SatLength {
    /// ATA PASS-THROUGH (12); 28-bit commands only.
    Len12,
    /// ATA PASS-THROUGH (16).
    Len16,
}

impl SatLength {
    /// Maps the `N` of a `sat,N` device type. 0 selects `default`.
    pub fn from_option(n: u32, default: SatLength) -> Option<Self> {
        match n {
            0 => Some(default),
            12 => Some(SatLength::Len12),
            16 => Some(SatLength::Len16),
            _ => None,
        }
    }

    /// CDB length in bytes.
    pub const fn cdb_len(self) -> usize {
        match self {
            SatLength::Len12 => 12,
            SatLength::Len16 => 16,
        }
    }
}

impl Default for SatLength {
    fn default() -> Self {
        SatLength::Len16
    }
}

/// Which capability a SAT device exposes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SatMode {
    /// Always ATA (`sat`).
    SatAlways,
    /// SCSI until [`SmartDevice::autodetect_open`] finds a SAT layer (`sat,auto`).
    SatAuto,
    /// Always SCSI (`scsi`).
    ScsiAlways,
}

impl SatMode {
    fn dev_type(self) -> &'static str {
        match self {
            SatMode::SatAlways => "sat",
            SatMode::SatAuto => "sat,auto",
            SatMode::ScsiAlways => "scsi",
        }
    }

    fn tag(self) -> &'static str {
        match self {
            SatMode::SatAlways => "SAT",
            SatMode::SatAuto => "SCSI/SAT",
            SatMode::ScsiAlways => "SCSI",
        }
    }
}

/// ATA device reached through SCSI / ATA Translation.
///
/// Depending on its [`SatMode`] the device exposes ATA, SCSI or (after autodetection)
/// whichever of the two the inner device turned out to support. SCSI commands are always
/// forwarded unchanged.
#[derive(Debug)]
pub struct SatDevice {
    core: DeviceCore,
    tunnel: Tunnel<dyn ScsiDevice>,
    len: SatLength,
    mode: SatMode,
}

impl SatDevice {
    /// Wraps `scsidev`, which becomes owned by the new device.
    pub fn new(
        scsidev: Box<dyn ScsiDevice>,
        req_type: &str,
        mode: SatMode,
        len: SatLength,
    ) -> Self {
        let inner = scsidev.info().clone();
        let mut info = DeviceInfo::new(&inner.dev_name, mode.dev_type(), req_type);
        if inner.dev_type != "scsi" {
            info.dev_type = format!("{}+{}", info.dev_type, inner.dev_type);
        }
        info.info_name = format!("{} [{}]", inner.info_name, mode.tag());
        // SCSI first, switched to ATA in autodetect_open()
        let caps = match mode {
            SatMode::SatAlways => Capabilities::ATA,
            SatMode::SatAuto | SatMode::ScsiAlways => Capabilities::SCSI,
        };
        let mut core = DeviceCore::new(info, caps);
        core.set_timeout(scsidev.core().timeout());
        SatDevice {
            core,
            tunnel: Tunnel::new(scsidev),
            len,
            mode,
        }
    }

    pub fn mode(&self) -> SatMode {
        self.mode
    }

    pub fn passthru_len(&self) -> SatLength {
        self.len
    }

    /// The inner SCSI device.
    pub fn tunnel(&self) -> &Tunnel<dyn ScsiDevice> {
        &self.tunnel
    }

    fn build_cdb(&self, cmd: &AtaCmdIn<'_>, ck_cond: bool) -> [u8; 16] {
        let (protocol, t_dir, t_length) = match cmd.direction {
            // non-data
            Direction::NoData => (3, true, 0),
            // PIO data-in, sector_count holds count
            Direction::In => (4, true, 2),
            // PIO data-out
            Direction::Out => (5, false, 2),
        };
        let mut cdb = [0u8; 16];
        cdb[1].set_bits(1..4, protocol);
        cdb[1].set_bit(0, cmd.in_regs.is_48bit_cmd());
        cdb[2].set_bit(5, ck_cond);
        cdb[2].set_bit(3, t_dir);
        // byte_block: transfer length counts 512 byte blocks
        cdb[2].set_bit(2, true);
        cdb[2].set_bits(0..2, t_length);
        let lo = &cmd.in_regs;
        let hi = &cmd.in_regs.prev;
        match self.len {
            SatLength::Len12 => {
                cdb[0] = ScsiOpcode::SatAtaPassThrough12 as u8;
                cdb[3] = lo.features.val();
                cdb[4] = lo.sector_count.val();
                cdb[5] = lo.lba_low.val();
                cdb[6] = lo.lba_mid.val();
                cdb[7] = lo.lba_high.val();
                cdb[8] = lo.device.val();
                cdb[9] = lo.command.val();
            }
            SatLength::Len16 => {
                // prev.* is all zero for 28-bit commands
                cdb[0] = ScsiOpcode::SatAtaPassThrough16 as u8;
                cdb[3] = hi.features.val();
                cdb[4] = lo.features.val();
                cdb[5] = hi.sector_count.val();
                cdb[6] = lo.sector_count.val();
                cdb[7] = hi.lba_low.val();
                cdb[8] = lo.lba_low.val();
                cdb[9] = hi.lba_mid.val();
                cdb[10] = lo.lba_mid.val();
                cdb[11] = hi.lba_high.val();
                cdb[12] = lo.lba_high.val();
                cdb[13] = lo.device.val();
                cdb[14] = lo.command.val();
            }
        }
        cdb
    }
}

/// Returns the ATA Return descriptor found in `sense` padded to 14 bytes, and its length
/// clamped to 12..=14.
fn return_descriptor(sense: &[u8]) -> Option<([u8; 14], usize)> {
    let desc = sense::find_descriptor(sense, ATA_RETURN_DESCRIPTOR)?;
    let mut ard = [0u8; 14];
    let n = desc.len().min(ard.len());
    ard[..n].copy_from_slice(&desc[..n]);
    let len = (usize::from(ard[1]) + 2).max(12).min(14);
    Some((ard, len))
}

impl AtaDevice for SatDevice {
    fn ata_pass_through(&mut self, cmd: &mut AtaCmdIn<'_>, out: &mut AtaCmdOut) -> Result<()> {
        self.core.record(check_supported(
            cmd,
            AtaSupport::DATA_OUT
                | AtaSupport::OUTPUT_REGS
                | AtaSupport::MULTI_SECTOR
                | AtaSupport::LBA48,
            Some("SAT"),
        ))?;
        let is_48bit = cmd.in_regs.is_48bit_cmd();
        if is_48bit && self.len != SatLength::Len16 {
            return Err(self.core.set_err(
                Errno::NoSys,
                "48-bit ATA commands require SAT ATA PASS-THROUGH (16)",
            ));
        }
        // Check condition if any output register needed
        let ck_cond = !cmd.out_needed.is_empty();
        let cdb = self.build_cdb(cmd, ck_cond);

        let (sense_buf, sense_len, scsi_status) = {
            let (dir, data) = crate::scsi_transfer(cmd);
            let mut io = ScsiCmdIo::new(&cdb[..self.len.cdb_len()], dir, data);
            io.timeout = self.core.timeout();
            if let Err(e) = self.tunnel.scsi_pass_through(&mut self.core, &mut io) {
                debug!(
                    "SAT: scsi_pass_through() failed, errno={} [{}]",
                    e.no.code(),
                    e
                );
                return Err(e);
            }
            (io.sense, io.resp_sense_len.min(scsi::SENSE_LEN), io.scsi_status)
        };
        let sense = &sense_buf[..sense_len];

        let hdr = sense::normalize(sense);
        let mut ard = None;
        if let Some(hdr) = hdr {
            if hdr.is_descriptor() {
                ard = return_descriptor(sense);
            }
            let mut status = sense::simple_filter(&sense::disect(scsi_status, sense));
            // Workaround for a bogus sense key next to an ATA Return descriptor
            if let Some((a, len)) = ard {
                if status.is_err() && ck_cond && len > 13 && a[13] & 0xc1 == 0x40 {
                    debug!(
                        "ATA status (0x{:02x}) indicates success, ignoring SCSI sense_key",
                        a[13]
                    );
                    status = SimpleError::NoError;
                }
            }
            if status.is_err() {
                debug!("SAT: scsi error: {}", status);
                if let Some((a, len)) = ard {
                    trace!("Values from ATA Return Descriptor are: {:02x?}", &a[..len]);
                }
                crate::clear_data_in(cmd);
                return Err(self
                    .core
                    .set_err(Errno::Io, format!("scsi error {}", status)));
            }
        }

        let hdr = match hdr {
            Some(hdr) => hdr,
            None => return Ok(()),
        };
        if !ck_cond {
            let key = SenseKey::from(hdr.sense_key);
            if (key == SenseKey::NoSense || key == SenseKey::RecoveredError)
                && hdr.asc == 0
                && hdr.ascq == asc::ASCQ_ATA_PASS_THROUGH
            {
                match ard {
                    Some((a, len)) => {
                        debug!("Values from ATA Return Descriptor are: {:02x?}", &a[..len])
                    }
                    None if !hdr.is_descriptor() => debug!(
                        "Values from ATA fixed format sense are: error 0x{:x}, status 0x{:x}, \
                         device 0x{:x}, count 0x{:x}",
                        sense_buf[3], sense_buf[4], sense_buf[5], sense_buf[6]
                    ),
                    None => (),
                }
            }
            return Err(self.core.set_err(Errno::Io, "SAT command failed"));
        }

        let regs = &mut out.out_regs;
        if let Some((a, len)) = ard {
            trace!("Values from ATA Return Descriptor are: {:02x?}", &a[..len]);
            regs.error.set(a[3]);
            regs.sector_count.set(a[5]);
            regs.lba_low.set(a[7]);
            regs.lba_mid.set(a[9]);
            regs.lba_high.set(a[11]);
            regs.device.set(a[12]);
            regs.status.set(a[13]);
            if is_48bit {
                regs.prev.sector_count.set(a[4]);
                regs.prev.lba_low.set(a[6]);
                regs.prev.lba_mid.set(a[8]);
                regs.prev.lba_high.set(a[10]);
            }
        } else if !hdr.is_descriptor()
            && hdr.asc == 0
            && hdr.ascq == asc::ASCQ_ATA_PASS_THROUGH
            // some ATA status bit must be set
            && sense_buf[4] != 0
        {
            // SAT-2 and later may return the registers in fixed format sense
            regs.error.set(sense_buf[3]);
            regs.status.set(sense_buf[4]);
            regs.device.set(sense_buf[5]);
            regs.sector_count.set(sense_buf[6]);
            regs.lba_low.set(sense_buf[9]);
            regs.lba_mid.set(sense_buf[10]);
            regs.lba_high.set(sense_buf[11]);
            // The upper bytes are only known to be zero; reading them would need the
            // ATA PASS-THROUGH Results log page.
            if is_48bit && sense_buf[8] & 0x60 == 0 {
                regs.prev.sector_count.set(0);
                regs.prev.lba_low.set(0);
                regs.prev.lba_mid.set(0);
                regs.prev.lba_high.set(0);
            }
        }
        Ok(())
    }
}

impl ScsiDevice for SatDevice {
    fn scsi_pass_through(&mut self, io: &mut ScsiCmdIo<'_>) -> Result<()> {
        self.tunnel.scsi_pass_through(&mut self.core, io)
    }
}

impl SmartDevice for SatDevice {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn is_open(&self) -> bool {
        self.tunnel.is_open()
    }

    fn open(&mut self) -> Result<()> {
        self.tunnel.open(&mut self.core)
    }

    fn close(&mut self) -> Result<()> {
        self.tunnel.close(&mut self.core)
    }

    fn autodetect_open(&mut self) -> Option<Box<dyn SmartDevice>> {
        if self.open().is_err() || self.mode != SatMode::SatAuto {
            return None;
        }
        let mut inq = [0u8; 36];
        let res = match self.tunnel.get_mut() {
            Some(dev) => scsi::std_inquiry(dev, &mut inq),
            None => Err(self.core.set_errno(Errno::NoSys)),
        };
        if let Err(e) = res {
            let _ = self.close();
            self.core
                .set_err(e.no, format!("INQUIRY [SAT]: {}", e.msg));
            return None;
        }

        // SAT layers report "ATA" as T10 vendor identification
        let sat = usize::from(inq[4]) + 5 >= 36 && &inq[8..16] == b"ATA     ";
        self.core.set_cap(Capabilities::ATA, sat);
        self.core.set_cap(Capabilities::SCSI, !sat);
        if let Some(inner) = self.tunnel.get() {
            let inner = inner.info().clone();
            let info = self.core.info_mut();
            info.dev_type = if sat { "sat".into() } else { inner.dev_type };
            info.info_name = format!("{} [{}]", inner.info_name, if sat { "SAT" } else { "SCSI" });
        }
        info!(
            "{}: {}",
            self.core.info().dev_name,
            if sat { "SAT layer detected" } else { "no SAT layer, using SCSI" }
        );
        None
    }

    fn owns(&self, dev: &dyn SmartDevice) -> bool {
        self.tunnel.owns(dev)
    }

    fn as_ata(&mut self) -> Option<&mut dyn AtaDevice> {
        if self.is_ata() {
            Some(self)
        } else {
            None
        }
    }

    fn as_scsi(&mut self) -> Option<&mut dyn ScsiDevice> {
        if self.is_scsi() {
            Some(self)
        } else {
            None
        }
    }
}
