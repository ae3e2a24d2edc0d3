// SPDX-License-Identifier: MPL-2.0
mod common;

use common::{ata_return_sense, interface, TestPlatform};
use libdev::ata::{AtaCommand, OutRegs, SmartSubcommand};
use libdev::mock::ScsiReply;
use libdev::{open_autodetect, AtaCmdIn, AtaCmdOut, Errno};

fn smart_status() -> AtaCmdIn<'static> {
    let mut cmd = AtaCmdIn::new();
    cmd.in_regs.command.set(AtaCommand::Smart as u8);
    cmd.in_regs.features.set(SmartSubcommand::ReturnStatus as u8);
    cmd.in_regs.lba_mid.set(0x4f);
    cmd.in_regs.lba_high.set(0xc2);
    cmd.out_needed = OutRegs::LBA_MID | OutRegs::LBA_HIGH | OutRegs::STATUS;
    cmd
}

#[test]
fn smart_status_through_sat16() -> anyhow::Result<()> {
    let mut intf = interface(TestPlatform::new().reply(ata_return_sense(0x01, 0xf4, 0x2c, 0x50)));
    let mut dev = intf.get_smart_device("/dev/sdb", "sat")?;
    dev.open()?;
    let ata = dev.as_ata().expect("ATA capability");
    let mut out = AtaCmdOut::default();
    ata.ata_pass_through(&mut smart_status(), &mut out)?;
    assert_eq!(out.out_regs.lba_mid.val(), 0xf4);
    assert_eq!(out.out_regs.lba_high.val(), 0x2c);
    assert_eq!(out.out_regs.status.val(), 0x50);

    let log = intf.platform().log();
    let log = log.borrow();
    assert_eq!(log.sent.len(), 1);
    assert_eq!(
        log.sent[0].cdb,
        vec![0x85, 0x06, 0x2c, 0, 0xda, 0, 0, 0, 0, 0, 0x4f, 0, 0xc2, 0, 0xb0, 0]
    );
    assert_eq!(log.sent[0].timeout, 60);
    Ok(())
}

#[test]
fn bogus_sense_key_downgraded_by_ata_status() -> anyhow::Result<()> {
    let mut intf = interface(TestPlatform::new().reply(ata_return_sense(0x04, 0x4f, 0xc2, 0x50)));
    let mut dev = intf.get_smart_device("/dev/sdb", "sat")?;
    let mut out = AtaCmdOut::default();
    dev.as_ata()
        .expect("ATA capability")
        .ata_pass_through(&mut smart_status(), &mut out)?;
    assert_eq!(out.out_regs.lba_mid.val(), 0x4f);
    Ok(())
}

#[test]
fn ata_error_status_is_not_downgraded() -> anyhow::Result<()> {
    let mut intf = interface(TestPlatform::new().reply(ata_return_sense(0x04, 0x4f, 0xc2, 0x51)));
    let mut dev = intf.get_smart_device("/dev/sdb", "sat")?;
    let e = dev
        .as_ata()
        .expect("ATA capability")
        .ata_pass_through(&mut smart_status(), &mut AtaCmdOut::default())
        .unwrap_err();
    assert_eq!(e.no, Errno::Io);
    assert_eq!(dev.err().map(|e| e.no), Some(Errno::Io));
    Ok(())
}

#[test]
fn no_data_with_size_rejected_before_io() -> anyhow::Result<()> {
    let mut intf = interface(TestPlatform::new());
    let mut dev = intf.get_smart_device("/dev/sdb", "sat,12")?;
    let mut buf = [0u8; 512];
    let mut cmd = AtaCmdIn::new();
    cmd.in_regs.command.set(AtaCommand::Smart as u8);
    cmd.in_regs.features.set(SmartSubcommand::EnableOperations as u8);
    cmd.buffer = Some(&mut buf);
    cmd.size = 512;
    let e = dev
        .as_ata()
        .expect("ATA capability")
        .ata_pass_through(&mut cmd, &mut AtaCmdOut::default())
        .unwrap_err();
    assert_eq!(e.no, Errno::Inval);
    assert_eq!(e.msg, "Buffer size 512 > 0 for NO DATA command");
    assert!(intf.platform().log().borrow().sent.is_empty());
    Ok(())
}

#[test]
fn sat12_cdb() -> anyhow::Result<()> {
    let mut intf = interface(TestPlatform::new());
    let mut dev = intf.get_smart_device("/dev/sdb", "sat,12")?;
    let mut cmd = AtaCmdIn::new();
    cmd.in_regs.command.set(AtaCommand::Smart as u8);
    cmd.in_regs.features.set(SmartSubcommand::EnableOperations as u8);
    cmd.in_regs.lba_mid.set(0x4f);
    cmd.in_regs.lba_high.set(0xc2);
    dev.as_ata()
        .expect("ATA capability")
        .ata_pass_through(&mut cmd, &mut AtaCmdOut::default())?;
    let log = intf.platform().log();
    assert_eq!(
        log.borrow().sent[0].cdb,
        vec![0xa1, 0x06, 0x0c, 0xd8, 0, 0, 0x4f, 0xc2, 0, 0xb0, 0, 0]
    );
    Ok(())
}

#[test]
fn sat_auto_detects_sat_layer() -> anyhow::Result<()> {
    let mut inq = [0u8; 36];
    inq[4] = 31;
    inq[8..16].copy_from_slice(b"ATA     ");
    let mut intf = interface(TestPlatform::new().reply(ScsiReply::data(&inq)));
    let dev = intf.get_smart_device("/dev/sdb", "sat,auto")?;
    assert!(dev.is_scsi());
    assert!(!dev.is_ata());
    let dev = open_autodetect(dev);
    assert!(dev.is_ata());
    assert!(dev.is_open());
    assert_eq!(dev.info().dev_type, "sat");
    assert_eq!(dev.info().info_name, "/dev/sdb [SAT]");
    Ok(())
}

#[test]
fn sat_auto_stays_scsi() -> anyhow::Result<()> {
    let mut inq = [0u8; 36];
    inq[4] = 31;
    inq[8..16].copy_from_slice(b"SEAGATE ");
    let mut intf = interface(TestPlatform::new().reply(ScsiReply::data(&inq)));
    let mut dev = open_autodetect(intf.get_smart_device("/dev/sdb", "sat,auto")?);
    assert!(dev.is_scsi());
    assert!(dev.as_ata().is_none());
    assert!(dev.as_scsi().is_some());
    assert_eq!(dev.info().info_name, "/dev/sdb [SCSI]");
    Ok(())
}
