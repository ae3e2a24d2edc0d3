// SPDX-License-Identifier: MPL-2.0
use libdev::ata::{
    check_supported, AtaCmdIn, AtaCmdOut, AtaCommand, AtaSupport, OutRegs, SmartSubcommand,
    SECTOR_SIZE, SMART_FAILING_LBA_HIGH, SMART_FAILING_LBA_MID, SMART_LBA_HIGH, SMART_LBA_MID,
};
use libdev::{Errno, Result, SmartDevice};

/// Operations a command-set translator knows how to issue.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SmartCommand {
    Enable,
    Disable,
    Autosave,
    ImmediateOffline,
    AutoOffline,
    /// SMART RETURN STATUS, output registers not needed.
    Status,
    /// SMART RETURN STATUS, with the threshold exceeded condition reported back.
    StatusCheck,
    ReadValues,
    ReadThresholds,
    ReadLog,
    WriteLog,
    Identify,
    PIdentify,
    CheckPowerMode,
}

/// Successful outcome of a [`SmartCommand`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Completion {
    Done,
    /// SMART RETURN STATUS reported a threshold exceeded condition.
    ThresholdExceeded,
}

/// Translators that only know a fixed table of SMART operations.
///
/// Implementors provide [`AtaCommandSet::ata_command_interface`] and get ATA pass-through for
/// every command that maps onto the table through
/// [`AtaCommandSet::command_set_pass_through`].
pub trait AtaCommandSet: SmartDevice {
    /// Issues `command`. `select` is the log address, self-test or enable value the operation
    /// carries, `data` the 512 byte sector it transfers (if any).
    ///
    /// For [`SmartCommand::CheckPowerMode`] the power mode is returned in `data[0]`.
    fn ata_command_interface(
        &mut self,
        command: SmartCommand,
        select: u8,
        data: &mut [u8],
    ) -> Result<Completion>;

    /// Executes an ATA command through [`AtaCommandSet::ata_command_interface`].
    fn command_set_pass_through(
        &mut self,
        cmd: &mut AtaCmdIn<'_>,
        out: &mut AtaCmdOut,
    ) -> Result<()> {
        if let Err(e) = check_supported(cmd, AtaSupport::DATA_OUT | AtaSupport::OUTPUT_REGS, None) {
            return Err(self.core_mut().copy_err(&e));
        }
        let (command, select) = match map_command(cmd) {
            Ok(m) => m,
            Err(msg) => return Err(self.core_mut().set_err(Errno::NoSys, msg)),
        };

        self.core_mut().clear_err();
        let mut power = [0u8; SECTOR_SIZE];
        let completion = if command == SmartCommand::CheckPowerMode {
            let c = self.ata_command_interface(command, select, &mut power)?;
            out.out_regs.sector_count.set(power[0]);
            c
        } else {
            let data: &mut [u8] = match cmd.data_mut() {
                Some(data) => data,
                None => &mut [],
            };
            self.ata_command_interface(command, select, data)?
        };

        if command == SmartCommand::StatusCheck {
            let (mid, high) = match completion {
                Completion::Done => (SMART_LBA_MID, SMART_LBA_HIGH),
                Completion::ThresholdExceeded => (SMART_FAILING_LBA_MID, SMART_FAILING_LBA_HIGH),
            };
            out.out_regs.lba_mid.set(mid);
            out.out_regs.lba_high.set(high);
        }
        Ok(())
    }
}

/// Maps the registers of `cmd` onto a [`SmartCommand`] and its select value.
pub fn map_command(cmd: &AtaCmdIn<'_>) -> core::result::Result<(SmartCommand, u8), &'static str> {
    let regs = &cmd.in_regs;
    let command = regs.command.val();
    if command == AtaCommand::IdentifyDevice as u8 {
        return Ok((SmartCommand::Identify, 0));
    }
    if command == AtaCommand::IdentifyPacketDevice as u8 {
        return Ok((SmartCommand::PIdentify, 0));
    }
    if command == AtaCommand::CheckPowerMode as u8 {
        return Ok((SmartCommand::CheckPowerMode, 0));
    }
    if command != AtaCommand::Smart as u8 {
        return Err("Non-SMART commands not implemented");
    }
    let feature = regs.features.val();
    let lba_low = regs.lba_low.val();
    let count = regs.sector_count.val();
    let m = match feature {
        f if f == SmartSubcommand::EnableOperations as u8 => (SmartCommand::Enable, 0),
        f if f == SmartSubcommand::ReadData as u8 => (SmartCommand::ReadValues, 0),
        f if f == SmartSubcommand::ReadThresholds as u8 => (SmartCommand::ReadThresholds, 0),
        f if f == SmartSubcommand::ReadLog as u8 => (SmartCommand::ReadLog, lba_low),
        f if f == SmartSubcommand::WriteLog as u8 => (SmartCommand::WriteLog, lba_low),
        f if f == SmartSubcommand::DisableOperations as u8 => (SmartCommand::Disable, 0),
        f if f == SmartSubcommand::ReturnStatus as u8 => {
            if cmd.out_needed.contains(OutRegs::LBA_HIGH) {
                (SmartCommand::StatusCheck, 0)
            } else {
                (SmartCommand::Status, 0)
            }
        }
        f if f == SmartSubcommand::AutoOffline as u8 => (SmartCommand::AutoOffline, count),
        f if f == SmartSubcommand::ToggleAttributeAutosave as u8 => (SmartCommand::Autosave, count),
        f if f == SmartSubcommand::ExecuteOfflineImmediate as u8 => {
            (SmartCommand::ImmediateOffline, lba_low)
        }
        _ => return Err("Unknown SMART command"),
    };
    Ok(m)
}
