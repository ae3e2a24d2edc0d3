// SPDX-License-Identifier: MPL-2.0
//! IntelliProp multiplexers route one of up to four drives to their host port. The routed
//! drive is chosen by writing the vendor specific log page C0h; every other command is
//! forwarded unchanged.
use crate::crc16;
use libdev::ata::{AtaCmdIn, AtaCmdOut, AtaCommand, AtaDevice};
use libdev::{Capabilities, DeviceCore, DeviceInfo, Errno, Result, Tunnel};
use log::*;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, LittleEndian, U16, U32};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

/// Vendor specific log address of the routing log.
pub const LOG_C0: u8 = 0xc0;
/// Highest drive index a multiplexer can route.
pub const MAX_PHYDRIVE: u32 = 3;

/// Vendor specific log C0h.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IntelliPropLog {
    pub drive_select: U32<LittleEndian>,
    pub obsolete: U32<LittleEndian>,
    pub mode_control: u8,
    pub log_passthrough: u8,
    pub tier_id: U16<LittleEndian>,
    pub hw_version: U32<LittleEndian>,
    pub fw_version: U32<LittleEndian>,
    pub variant: [u8; 8],
    reserved: [u8; 228],
    /// Gen 1, 2 and 3 PHY settings of ports 0 to 4, plus a reserved word each.
    pub port_settings: [[U16<LittleEndian>; 4]; 5],
    reserved2: [u8; 214],
    /// CRC16 of bytes 0 to 509.
    pub crc: U16<BigEndian>,
}

assert_eq_size!(IntelliPropLog, [u8; 512]);

impl IntelliPropLog {
    /// Returns true if the CRC matches the contents.
    pub fn crc_ok(&self) -> bool {
        crc16(self.as_bytes(), false) == 0
    }

    /// Recomputes the CRC over the contents.
    pub fn update_crc(&mut self) {
        let len = self.as_bytes().len() - 2;
        let crc = crc16(&self.as_bytes()[..len], false);
        self.crc.set(crc);
    }
}

fn read_log(dev: &mut dyn AtaDevice, log: &mut IntelliPropLog) -> Result<()> {
    let mut cmd = AtaCmdIn::new();
    cmd.in_regs.command.set(AtaCommand::ReadLogExt as u8);
    cmd.in_regs.features_16().set(0);
    cmd.set_data_in_48bit(log.as_mut_bytes(), 1);
    cmd.in_regs.lba_low.set(LOG_C0);
    cmd.in_regs.lba_mid_16().set(0);
    dev.ata_pass_through(&mut cmd, &mut AtaCmdOut::default())
}

fn write_log(dev: &mut dyn AtaDevice, log: &mut IntelliPropLog) -> Result<()> {
    let mut cmd = AtaCmdIn::new();
    cmd.in_regs.command.set(AtaCommand::WriteLogExt as u8);
    cmd.set_data_out(log.as_mut_bytes(), 1);
    cmd.in_regs.lba_low.set(LOG_C0);
    cmd.in_regs.lba_mid_16().set(0);
    dev.ata_pass_through(&mut cmd, &mut AtaCmdOut::default())
}

/// Routes `drive_select` to the host port of the multiplexer `dev` is attached to. Errors
/// are recorded on `dev`.
pub fn switch_routed_drive(dev: &mut dyn AtaDevice, drive_select: u32) -> Result<()> {
    let mut payload = IntelliPropLog::new_zeroed();
    if let Err(e) = read_log(dev, &mut payload) {
        return Err(dev
            .core_mut()
            .set_err(Errno::Io, format!("intelliprop: Initial Read Log failed: {}", e.msg)));
    }
    // A log failing its CRC may still carry the routing as long as everything else is zero
    if !payload.crc_ok() {
        warn!(
            "intelliprop: received log crc(0x{:04x}) is invalid",
            crc16(payload.as_bytes(), false)
        );
        debug!("{:#x?}", payload);
        payload = IntelliPropLog::new_zeroed();
    }
    trace!("{:#x?}", payload);

    payload.drive_select.set(drive_select);
    debug!("intelliprop: change to port 0x{:08x}", drive_select);
    // nonzero values make non member drives abort
    payload.log_passthrough = 0;
    payload.tier_id.set(0);
    payload.update_crc();
    if !payload.crc_ok() {
        let crc = crc16(payload.as_bytes(), false);
        return Err(dev.core_mut().set_err(
            Errno::Io,
            format!("intelliprop: Re-calculated log crc(0x{:04X}) is invalid!", crc),
        ));
    }

    if let Err(e) = write_log(dev, &mut payload) {
        return Err(dev
            .core_mut()
            .set_err(Errno::Io, format!("intelliprop: Write Log failed: {}", e.msg)));
    }

    let mut check = IntelliPropLog::new_zeroed();
    if let Err(e) = read_log(dev, &mut check) {
        return Err(dev
            .core_mut()
            .set_err(Errno::Io, format!("intelliprop: Secondary Read Log failed: {}", e.msg)));
    }
    if check.drive_select != payload.drive_select {
        trace!("{:#x?}", check);
        return Err(dev.core_mut().set_err(
            Errno::Io,
            format!(
                "intelliprop: Current drive select val(0x{:08X}) is not expected(0x{:08X})",
                check.drive_select.get(),
                payload.drive_select.get()
            ),
        ));
    }
    Ok(())
}

/// Drive behind an IntelliProp multiplexer, reached through the ATA device the multiplexer
/// is attached to.
#[derive(Debug)]
pub struct IntelliPropDevice {
    core: DeviceCore,
    tunnel: Tunnel<dyn AtaDevice>,
    phydrive: u32,
}

impl IntelliPropDevice {
    /// Wraps `atadev`, routing drive `phydrive` (at most [`MAX_PHYDRIVE`]) on open.
    pub fn new(atadev: Box<dyn AtaDevice>, phydrive: u32) -> Self {
        let inner = atadev.info();
        let mut info = DeviceInfo::new(&inner.dev_name, "intelliprop", "intelliprop");
        info.info_name = format!("{} [intelliprop_disk_{}]", inner.info_name, phydrive);
        let mut core = DeviceCore::new(info, Capabilities::ATA);
        core.set_timeout(atadev.core().timeout());
        IntelliPropDevice {
            core,
            tunnel: Tunnel::new(atadev),
            phydrive,
        }
    }

    pub fn phydrive(&self) -> u32 {
        self.phydrive
    }

    fn open_and_route(&mut self) -> Result<()> {
        self.tunnel.open(&mut self.core)?;
        let res = match self.tunnel.get_mut() {
            Some(dev) => switch_routed_drive(dev, self.phydrive),
            None => return Err(self.core.set_errno(Errno::NoSys)),
        };
        if let Err(e) = res {
            let _ = self.tunnel.close(&mut self.core);
            return Err(self.core.copy_err(&e));
        }
        Ok(())
    }
}

impl AtaDevice for IntelliPropDevice {
    fn ata_pass_through(&mut self, cmd: &mut AtaCmdIn<'_>, out: &mut AtaCmdOut) -> Result<()> {
        self.tunnel.ata_pass_through(&mut self.core, cmd, out)
    }
}

tunnelled_ata_device!(IntelliPropDevice, open_and_route);
