// SPDX-License-Identifier: MPL-2.0
//! ATA task file model shared by every ATA translator.
//!
//! A 28-bit command uses one group of seven registers. A 48-bit command writes every register
//! twice (the "previous" byte first, then the current one), so it is modelled as a current
//! group plus a `prev` group. The wider values a 48-bit command carries are accessed through
//! alias views borrowing both bytes of a pair at once.
use crate::device::{IntoSmartDevice, SmartDevice};
use crate::error::{DeviceError, Errno, Result};
use bitflags::bitflags;

/// Size of one ATA logical sector as used by every pass-through translator.
pub const SECTOR_SIZE: usize = 512;

/// Subset of the ATA command opcodes the pass-through layer inspects or issues itself.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum AtaCommand {
    CheckPowerMode = 0xE5,
    IdentifyDevice = 0xEC,
    IdentifyPacketDevice = 0xA1,
    ReadLogExt = 0x2F,
    Smart = 0xB0,
    WriteLogExt = 0x3F,
}

/// Feature register values of the SMART command.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SmartSubcommand {
    ReadData = 0xD0,
    ReadThresholds = 0xD1,
    ToggleAttributeAutosave = 0xD2,
    ExecuteOfflineImmediate = 0xD4,
    ReadLog = 0xD5,
    WriteLog = 0xD6,
    EnableOperations = 0xD8,
    DisableOperations = 0xD9,
    ReturnStatus = 0xDA,
    AutoOffline = 0xDB,
}

/// LBA mid/high signature loaded for every SMART command.
pub const SMART_LBA_MID: u8 = 0x4f;
/// See [`SMART_LBA_MID`].
pub const SMART_LBA_HIGH: u8 = 0xc2;
/// LBA mid/high pair SMART RETURN STATUS reports when a threshold is exceeded.
pub const SMART_FAILING_LBA_MID: u8 = 0xf4;
/// See [`SMART_FAILING_LBA_MID`].
pub const SMART_FAILING_LBA_HIGH: u8 = 0x2c;

/// One 8-bit task file register. Unset registers are never sent to a device.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct AtaRegister {
    val: u8,
    is_set: bool,
}

impl AtaRegister {
    /// Creates a register holding `val`, marked as set.
    pub const fn new(val: u8) -> Self {
        AtaRegister { val, is_set: true }
    }

    /// Writes the register and marks it set.
    #[inline]
    pub fn set(&mut self, val: u8) {
        self.val = val;
        self.is_set = true;
    }

    /// Current value; 0 if never written.
    #[inline]
    pub const fn val(self) -> u8 {
        self.val
    }

    /// Returns true once the register has been written.
    #[inline]
    pub const fn is_set(self) -> bool {
        self.is_set
    }
}

/// Input task file: the registers a command is issued with.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct AtaInRegs {
    pub features: AtaRegister,
    pub sector_count: AtaRegister,
    pub lba_low: AtaRegister,
    pub lba_mid: AtaRegister,
    pub lba_high: AtaRegister,
    pub device: AtaRegister,
    pub command: AtaRegister,
}

impl AtaInRegs {
    /// Returns true if any register has been written.
    pub fn is_set(&self) -> bool {
        self.features.is_set()
            || self.sector_count.is_set()
            || self.lba_low.is_set()
            || self.lba_mid.is_set()
            || self.lba_high.is_set()
            || self.device.is_set()
            || self.command.is_set()
    }

    fn any_nonzero(&self) -> bool {
        self.features.val() != 0
            || self.sector_count.val() != 0
            || self.lba_low.val() != 0
            || self.lba_mid.val() != 0
            || self.lba_high.val() != 0
            || self.device.val() != 0
            || self.command.val() != 0
    }
}

/// Output task file: the registers a device returns.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct AtaOutRegs {
    pub error: AtaRegister,
    pub sector_count: AtaRegister,
    pub lba_low: AtaRegister,
    pub lba_mid: AtaRegister,
    pub lba_high: AtaRegister,
    pub device: AtaRegister,
    pub status: AtaRegister,
}

/// Input registers of a possibly 48-bit command.
///
/// The flat fields are the current (most recent) writes; `prev` holds the high-order bytes
/// written first. Any set `prev` register makes the command a 48-bit command.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct AtaInRegs48 {
    pub features: AtaRegister,
    pub sector_count: AtaRegister,
    pub lba_low: AtaRegister,
    pub lba_mid: AtaRegister,
    pub lba_high: AtaRegister,
    pub device: AtaRegister,
    pub command: AtaRegister,
    pub prev: AtaInRegs,
}

impl AtaInRegs48 {
    /// Returns true if the command is a 48-bit command.
    pub fn is_48bit_cmd(&self) -> bool {
        self.prev.is_set()
    }

    /// Returns true if the command is a 48-bit command whose high-order bytes are not all zero.
    pub fn is_real_48bit_cmd(&self) -> bool {
        self.prev.any_nonzero()
    }
}

/// Output registers of a possibly 48-bit command.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct AtaOutRegs48 {
    pub error: AtaRegister,
    pub sector_count: AtaRegister,
    pub lba_low: AtaRegister,
    pub lba_mid: AtaRegister,
    pub lba_high: AtaRegister,
    pub device: AtaRegister,
    pub status: AtaRegister,
    pub prev: AtaOutRegs,
}

/// 16-bit view over a (current, previous) register pair.
///
/// The view borrows both registers mutably, so it can neither outlive them nor be copied.
#[derive(Debug)]
pub struct Alias16<'a> {
    lo: &'a mut AtaRegister,
    hi: &'a mut AtaRegister,
}

impl Alias16<'_> {
    /// Combined value, previous byte in bits 15:8.
    pub fn get(&self) -> u16 {
        u16::from(self.hi.val()) << 8 | u16::from(self.lo.val())
    }

    /// Writes both bytes and marks both registers set.
    pub fn set(&mut self, v: u16) {
        self.hi.set((v >> 8) as u8);
        self.lo.set(v as u8);
    }
}

/// 48-bit LBA view over the three (current, previous) LBA register pairs.
#[derive(Debug)]
pub struct Alias48<'a> {
    lo: [&'a mut AtaRegister; 3],
    hi: [&'a mut AtaRegister; 3],
}

impl Alias48<'_> {
    /// Combined value: current low/mid/high in bits 23:0, previous in bits 47:24.
    pub fn get(&self) -> u64 {
        let mut v = 0u64;
        for (i, r) in self.lo.iter().chain(self.hi.iter()).enumerate() {
            v |= u64::from(r.val()) << (8 * i);
        }
        v
    }

    /// Writes all six bytes and marks them set. Bits above 47 are ignored.
    pub fn set(&mut self, v: u64) {
        for (i, r) in self.lo.iter_mut().chain(self.hi.iter_mut()).enumerate() {
            r.set((v >> (8 * i)) as u8);
        }
    }
}

macro_rules! alias_accessors {
    ($regs:ty { $($name:ident => $field:ident),* $(,)? }) => {
        impl $regs {
            $(
                #[doc = concat!("16-bit view of `", stringify!($field), "` and its previous byte.")]
                pub fn $name(&mut self) -> Alias16<'_> {
                    Alias16 { lo: &mut self.$field, hi: &mut self.prev.$field }
                }
            )*

            /// 48-bit LBA view.
            pub fn lba_48(&mut self) -> Alias48<'_> {
                let prev = &mut self.prev;
                Alias48 {
                    lo: [&mut self.lba_low, &mut self.lba_mid, &mut self.lba_high],
                    hi: [&mut prev.lba_low, &mut prev.lba_mid, &mut prev.lba_high],
                }
            }
        }
    };
}

alias_accessors!(AtaInRegs48 {
    features_16 => features,
    sector_count_16 => sector_count,
    lba_low_16 => lba_low,
    lba_mid_16 => lba_mid,
    lba_high_16 => lba_high,
});

alias_accessors!(AtaOutRegs48 {
    sector_count_16 => sector_count,
    lba_low_16 => lba_low,
    lba_mid_16 => lba_mid,
    lba_high_16 => lba_high,
});

bitflags! {
    /// Output registers a caller needs back from the device.
    #[derive(Default)]
    pub struct OutRegs: u8 {
        const ERROR = 1 << 0;
        const SECTOR_COUNT = 1 << 1;
        const LBA_LOW = 1 << 2;
        const LBA_MID = 1 << 3;
        const LBA_HIGH = 1 << 4;
        const DEVICE = 1 << 5;
        const STATUS = 1 << 6;
    }
}

bitflags! {
    /// What an ATA translator is able to carry.
    pub struct AtaSupport: u8 {
        const DATA_OUT = 0x01;
        /// Only the output registers of SMART RETURN STATUS can be read back.
        const SMART_STATUS = 0x02;
        const OUTPUT_REGS = 0x04;
        const MULTI_SECTOR = 0x08;
        /// 48-bit commands whose previous bytes are all zero.
        const LBA48_HI_NULL = 0x10;
        const LBA48 = 0x20;
    }
}

/// Data transfer direction of an ATA command.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    NoData,
    In,
    Out,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::NoData
    }
}

/// ATA pass-through request.
///
/// `size` is the transfer length in bytes and must equal 512 times the (16-bit) sector
/// count for DATA IN/OUT commands. DATA OUT buffers are only read.
#[derive(Debug, Default)]
pub struct AtaCmdIn<'a> {
    pub in_regs: AtaInRegs48,
    pub out_needed: OutRegs,
    pub direction: Direction,
    pub buffer: Option<&'a mut [u8]>,
    pub size: usize,
}

impl<'a> AtaCmdIn<'a> {
    /// Creates an empty NO DATA request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepares a 28-bit DATA IN transfer of `nsectors` sectors.
    pub fn set_data_in(&mut self, buf: &'a mut [u8], nsectors: u8) {
        self.in_regs.sector_count.set(nsectors);
        self.direction = Direction::In;
        self.size = usize::from(nsectors) * SECTOR_SIZE;
        self.buffer = Some(buf);
    }

    /// Prepares a 28-bit DATA OUT transfer of `nsectors` sectors.
    pub fn set_data_out(&mut self, buf: &'a mut [u8], nsectors: u8) {
        self.in_regs.sector_count.set(nsectors);
        self.direction = Direction::Out;
        self.size = usize::from(nsectors) * SECTOR_SIZE;
        self.buffer = Some(buf);
    }

    /// Prepares a 48-bit DATA IN transfer. This also makes the command a 48-bit command.
    pub fn set_data_in_48bit(&mut self, buf: &'a mut [u8], nsectors: u16) {
        self.in_regs.sector_count_16().set(nsectors);
        self.direction = Direction::In;
        self.size = usize::from(nsectors) * SECTOR_SIZE;
        self.buffer = Some(buf);
    }

    /// Returns the transfer buffer trimmed to `size`. Only valid after [`check_supported`].
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        let size = self.size;
        self.buffer.as_deref_mut().map(|b| &mut b[..size])
    }

    /// Returns true for SMART RETURN STATUS.
    pub fn is_smart_status(&self) -> bool {
        self.in_regs.command.val() == AtaCommand::Smart as u8
            && self.in_regs.features.val() == SmartSubcommand::ReturnStatus as u8
    }
}

/// ATA pass-through response.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct AtaCmdOut {
    pub out_regs: AtaOutRegs48,
}

/// Validates `cmd` against what a translator supports.
///
/// Malformed requests fail with [`Errno::Inval`]; requests the translator cannot carry fail
/// with [`Errno::NoSys`] and a message tagged with `tag`. No I/O is done.
pub fn check_supported(cmd: &AtaCmdIn<'_>, flags: AtaSupport, tag: Option<&str>) -> Result<()> {
    match cmd.direction {
        Direction::NoData => {
            if cmd.size != 0 {
                return Err(DeviceError::new(
                    Errno::Inval,
                    format!("Buffer size {} > 0 for NO DATA command", cmd.size),
                ));
            }
        }
        Direction::In | Direction::Out => {
            let buf = match cmd.buffer.as_deref() {
                Some(b) => b,
                None => {
                    return Err(DeviceError::new(
                        Errno::Inval,
                        "Buffer not set for DATA IN/OUT command",
                    ))
                }
            };
            let count = u32::from(cmd.in_regs.prev.sector_count.val()) << 16
                | u32::from(cmd.in_regs.sector_count.val());
            if count as usize * SECTOR_SIZE != cmd.size {
                return Err(DeviceError::new(
                    Errno::Inval,
                    format!(
                        "Sector count {} does not match buffer size {}",
                        count, cmd.size
                    ),
                ));
            }
            if buf.len() < cmd.size {
                return Err(DeviceError::new(
                    Errno::Inval,
                    format!(
                        "Buffer length {} smaller than transfer size {}",
                        buf.len(),
                        cmd.size
                    ),
                ));
            }
        }
    }

    let errmsg = if cmd.direction == Direction::Out && !flags.contains(AtaSupport::DATA_OUT) {
        Some("DATA OUT ATA commands not implemented")
    } else if !cmd.out_needed.is_empty()
        && !flags.contains(AtaSupport::OUTPUT_REGS)
        && !(cmd.is_smart_status() && flags.contains(AtaSupport::SMART_STATUS))
    {
        Some("Read of ATA output registers not implemented")
    } else if !(cmd.size == 0 || cmd.size == SECTOR_SIZE)
        && !flags.contains(AtaSupport::MULTI_SECTOR)
    {
        Some("Multi-sector ATA commands not implemented")
    } else if cmd.in_regs.is_48bit_cmd()
        && !flags.intersects(AtaSupport::LBA48_HI_NULL | AtaSupport::LBA48)
    {
        Some("48-bit ATA commands not implemented")
    } else if cmd.in_regs.is_real_48bit_cmd() && !flags.contains(AtaSupport::LBA48) {
        Some("48-bit ATA commands not fully implemented")
    } else {
        None
    };
    match (errmsg, tag) {
        (None, _) => Ok(()),
        (Some(m), Some(t)) => Err(DeviceError::new(Errno::NoSys, format!("{} [{}]", m, t))),
        (Some(m), None) => Err(DeviceError::new(Errno::NoSys, m)),
    }
}

/// Devices able to execute ATA commands.
pub trait AtaDevice: SmartDevice + IntoSmartDevice {
    /// Executes one ATA command. On success the output registers named by
    /// `cmd.out_needed` are valid in `out`.
    fn ata_pass_through(&mut self, cmd: &mut AtaCmdIn<'_>, out: &mut AtaCmdOut) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn smart_read_data(buf: &mut [u8]) -> AtaCmdIn<'_> {
        let mut cmd = AtaCmdIn::new();
        cmd.in_regs.command.set(AtaCommand::Smart as u8);
        cmd.in_regs.features.set(SmartSubcommand::ReadData as u8);
        cmd.set_data_in(buf, 1);
        cmd
    }

    proptest! {
        #[test]
        fn alias16_round_trips(v in any::<u16>()) {
            let mut regs = AtaInRegs48::default();
            regs.lba_mid_16().set(v);
            prop_assert_eq!(regs.lba_mid_16().get(), v);
            prop_assert_eq!(regs.lba_mid.val(), v as u8);
            prop_assert_eq!(regs.prev.lba_mid.val(), (v >> 8) as u8);
            prop_assert!(regs.is_48bit_cmd());
        }

        #[test]
        fn alias48_round_trips(v in 0u64..(1 << 48)) {
            let mut regs = AtaOutRegs48::default();
            regs.lba_48().set(v);
            prop_assert_eq!(regs.lba_48().get(), v);
        }

        #[test]
        fn any_previous_byte_makes_command_48bit(which in 0usize..7, v in any::<u8>()) {
            let mut regs = AtaInRegs48::default();
            prop_assert!(!regs.is_48bit_cmd());
            let prev = &mut regs.prev;
            match which {
                0 => prev.features.set(v),
                1 => prev.sector_count.set(v),
                2 => prev.lba_low.set(v),
                3 => prev.lba_mid.set(v),
                4 => prev.lba_high.set(v),
                5 => prev.device.set(v),
                _ => prev.command.set(v),
            }
            prop_assert!(regs.is_48bit_cmd());
            prop_assert_eq!(regs.is_real_48bit_cmd(), v != 0);
        }
    }

    #[test]
    fn lba48_byte_order() {
        let mut regs = AtaInRegs48::default();
        regs.lba_48().set(0x0605_0403_0201);
        assert_eq!(regs.lba_low.val(), 0x01);
        assert_eq!(regs.lba_mid.val(), 0x02);
        assert_eq!(regs.lba_high.val(), 0x03);
        assert_eq!(regs.prev.lba_low.val(), 0x04);
        assert_eq!(regs.prev.lba_mid.val(), 0x05);
        assert_eq!(regs.prev.lba_high.val(), 0x06);
    }

    #[test]
    fn no_data_with_size_is_rejected() {
        let mut cmd = AtaCmdIn::new();
        cmd.in_regs.command.set(AtaCommand::Smart as u8);
        cmd.size = 512;
        let err = check_supported(&cmd, AtaSupport::all(), Some("SAT")).unwrap_err();
        assert_eq!(err.no, Errno::Inval);
        assert_eq!(err.msg, "Buffer size 512 > 0 for NO DATA command");
    }

    #[test]
    fn data_without_buffer_is_rejected() {
        let mut cmd = AtaCmdIn::new();
        cmd.direction = Direction::In;
        cmd.size = 512;
        cmd.in_regs.sector_count.set(1);
        let err = check_supported(&cmd, AtaSupport::all(), None).unwrap_err();
        assert_eq!(err.no, Errno::Inval);
    }

    #[test]
    fn sector_count_must_match_size() {
        let mut buf = [0u8; 1024];
        let mut cmd = smart_read_data(&mut buf);
        cmd.size = 1024;
        let err = check_supported(&cmd, AtaSupport::all(), None).unwrap_err();
        assert_eq!(err.msg, "Sector count 1 does not match buffer size 1024");
    }

    #[test]
    fn short_buffer_is_rejected() {
        let mut buf = [0u8; 100];
        let cmd = smart_read_data(&mut buf);
        assert_eq!(
            check_supported(&cmd, AtaSupport::all(), None).unwrap_err().no,
            Errno::Inval
        );
    }

    #[test]
    fn feature_errors_carry_the_tag() {
        let mut buf = [0u8; 512];
        let mut cmd = AtaCmdIn::new();
        cmd.set_data_out(&mut buf, 1);
        let err = check_supported(&cmd, AtaSupport::OUTPUT_REGS, Some("USB Sunplus")).unwrap_err();
        assert_eq!(err.no, Errno::NoSys);
        assert_eq!(err.msg, "DATA OUT ATA commands not implemented [USB Sunplus]");
    }

    #[test]
    fn smart_status_is_exempt_with_smart_status_support() {
        let mut cmd = AtaCmdIn::new();
        cmd.in_regs.command.set(AtaCommand::Smart as u8);
        cmd.in_regs.features.set(SmartSubcommand::ReturnStatus as u8);
        cmd.out_needed = OutRegs::LBA_MID | OutRegs::LBA_HIGH;
        assert!(check_supported(&cmd, AtaSupport::SMART_STATUS, None).is_ok());
        cmd.in_regs.features.set(SmartSubcommand::ReadData as u8);
        assert_eq!(
            check_supported(&cmd, AtaSupport::SMART_STATUS, None)
                .unwrap_err()
                .msg,
            "Read of ATA output registers not implemented"
        );
    }

    #[test]
    fn lba48_support_levels() {
        let mut buf = [0u8; 512];
        let mut cmd = AtaCmdIn::new();
        cmd.in_regs.command.set(AtaCommand::ReadLogExt as u8);
        cmd.set_data_in_48bit(&mut buf, 1);
        assert!(check_supported(&cmd, AtaSupport::LBA48_HI_NULL, None).is_ok());
        assert_eq!(
            check_supported(&cmd, AtaSupport::empty(), None).unwrap_err().msg,
            "48-bit ATA commands not implemented"
        );
        cmd.in_regs.lba_mid_16().set(0x100);
        assert_eq!(
            check_supported(&cmd, AtaSupport::LBA48_HI_NULL, None)
                .unwrap_err()
                .msg,
            "48-bit ATA commands not fully implemented"
        );
        assert!(check_supported(&cmd, AtaSupport::LBA48, None).is_ok());
    }

    #[test]
    fn multi_sector_needs_support() {
        let mut buf = [0u8; 1024];
        let mut cmd = AtaCmdIn::new();
        cmd.set_data_in(&mut buf, 2);
        assert_eq!(
            check_supported(&cmd, AtaSupport::empty(), None).unwrap_err().msg,
            "Multi-sector ATA commands not implemented"
        );
        assert!(check_supported(&cmd, AtaSupport::MULTI_SECTOR, None).is_ok());
    }
}
