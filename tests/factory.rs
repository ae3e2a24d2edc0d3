// SPDX-License-Identifier: MPL-2.0
mod common;

use ata::sat::SatLength;
use common::{interface, TestPlatform};
use libdev::ata::{AtaCommand, SmartSubcommand};
use libdev::{AtaCmdIn, AtaCmdOut, Errno, SmartDevice};
use passthru::{Config, Interface};

fn type_error(req_type: &str) -> (Errno, String) {
    let mut intf = interface(TestPlatform::new());
    let e = intf
        .get_smart_device("/dev/sdb", req_type)
        .map(|_| ())
        .unwrap_err();
    assert_eq!(intf.err(), Some(&e));
    (e.no, e.msg)
}

fn smart_enable(dev: &mut dyn SmartDevice) {
    let mut cmd = AtaCmdIn::new();
    cmd.in_regs.command.set(AtaCommand::Smart as u8);
    cmd.in_regs.features.set(SmartSubcommand::EnableOperations as u8);
    cmd.in_regs.lba_mid.set(0x4f);
    cmd.in_regs.lba_high.set(0xc2);
    dev.as_ata()
        .expect("ATA capability")
        .ata_pass_through(&mut cmd, &mut AtaCmdOut::default())
        .expect("SMART ENABLE");
}

#[test]
fn translator_names() -> anyhow::Result<()> {
    let mut intf = interface(TestPlatform::new());
    let cases = [
        ("sat", "sat", "/dev/sdb [SAT]"),
        ("sat,16+scsi", "sat", "/dev/sdb [SAT]"),
        ("sat,auto", "sat,auto", "/dev/sdb [SCSI/SAT]"),
        ("usbcypress", "usbcypress", "/dev/sdb [USB Cypress]"),
        ("usbjmicron,p,x,1", "usbjmicron", "/dev/sdb [USB JMicron]"),
        ("usbprolific", "usbprolific", "/dev/sdb [USB Prolific]"),
        ("usbsunplus+scsi", "usbsunplus", "/dev/sdb [USB Sunplus]"),
    ];
    for &(req_type, dev_type, info_name) in cases.iter() {
        let dev = intf.get_smart_device("/dev/sdb", req_type)?;
        assert_eq!(dev.info().dev_type, dev_type, "{}", req_type);
        assert_eq!(dev.info().info_name, info_name, "{}", req_type);
        assert_eq!(dev.info().dev_name, "/dev/sdb");
        assert!(!dev.is_open());
    }
    assert!(intf.err().is_none());
    Ok(())
}

#[test]
fn base_types() -> anyhow::Result<()> {
    let mut intf = interface(TestPlatform::new());
    let dev = intf.get_smart_device("/dev/sdb", "scsi")?;
    assert!(dev.is_scsi());
    assert_eq!(dev.info().dev_type, "scsi");
    let dev = intf.get_smart_device("/dev/sdb", "ata")?;
    assert!(dev.is_ata());

    let e = intf
        .get_smart_device("/dev/nvme0", "nvme")
        .map(|_| ())
        .unwrap_err();
    assert_eq!(e.no, Errno::NoSys);
    Ok(())
}

#[test]
fn cypress_signature() -> anyhow::Result<()> {
    let mut intf = interface(TestPlatform::new());
    let mut dev = intf.get_smart_device("/dev/sdb", "usbcypress,0x2f")?;
    smart_enable(&mut *dev);
    assert_eq!(intf.platform().log().borrow().sent[0].cdb[0], 0x2f);
    let mut dev = intf.get_smart_device("/dev/sdb", "usbcypress")?;
    smart_enable(&mut *dev);
    assert_eq!(intf.platform().log().borrow().sent[0].cdb[0], 0x24);
    Ok(())
}

#[test]
fn bad_options() {
    let cases = [
        ("sat,13", "Option '-d sat[,auto][,N]' requires N to be 0, 12 or 16"),
        ("sat,auto,x", "Option '-d sat[,auto][,N]' requires N to be 0, 12 or 16"),
        (
            "usbcypress,0x100",
            "Option '-d usbcypress,<n>' requires <n> to be an hexadecimal number between 0x0 and 0xff",
        ),
        (
            "usbcypress,24",
            "Option '-d usbcypress,<n>' requires <n> to be an hexadecimal number between 0x0 and 0xff",
        ),
        ("usbjmicron,2", "Option '-d usbjmicron[,p][,x],<n>' requires <n> to be 0 or 1"),
        ("usbjmicron,x,p", "Option '-d usbjmicron[,p][,x],<n>' requires <n> to be 0 or 1"),
        ("usbfoo", "Unknown USB device type 'usbfoo'"),
        ("intelliprop,4", "Option '-d intelliprop,N' must have 0 <= N <= 3"),
        ("intelliprop", "Option '-d intelliprop,N' must have 0 <= N <= 3"),
        ("sat+nvme", "Type 'sat+...': Unknown device type 'nvme'"),
        ("intelliprop,1+floppy", "Type 'intelliprop,1+...': Unknown device type 'floppy'"),
        ("floppy", "Unknown device type 'floppy'"),
        ("satx", "Unknown device type 'satx'"),
    ];
    for &(req_type, msg) in cases.iter() {
        let (no, m) = type_error(req_type);
        assert_eq!(no, Errno::Inval, "{}", req_type);
        assert_eq!(m, msg, "{}", req_type);
    }
}

#[test]
fn failed_type_drops_base_device() {
    let mut intf = interface(TestPlatform::new());
    assert!(intf.get_smart_device("/dev/sdb", "usbjmicron,7").is_err());
    assert!(intf.platform().log().borrow().dropped);
}

#[test]
fn intelliprop_over_ata() -> anyhow::Result<()> {
    let mut intf = interface(TestPlatform::new());
    let dev = intf.get_smart_device("/dev/sdb", "intelliprop,2")?;
    assert!(dev.is_ata());
    assert_eq!(dev.info().dev_type, "intelliprop");
    assert_eq!(dev.info().info_name, "/dev/sdb [SAT] [intelliprop_disk_2]");

    let dev = intf.get_smart_device("/dev/sdb", "intelliprop,0+usbsunplus")?;
    assert_eq!(dev.info().info_name, "/dev/sdb [USB Sunplus] [intelliprop_disk_0]");
    Ok(())
}

#[test]
fn config_reaches_devices() -> anyhow::Result<()> {
    let config = Config::new()
        .with_scsi_timeout(20)
        .with_sat_default_len(SatLength::Len12);
    let mut intf = Interface::new(TestPlatform::new(), config);
    let mut dev = intf.get_smart_device("/dev/sdb", "sat")?;
    smart_enable(&mut *dev);
    let log = intf.platform().log();
    let log = log.borrow();
    assert_eq!(log.sent[0].cdb.len(), 12);
    assert_eq!(log.sent[0].timeout, 20);
    Ok(())
}

#[test]
fn default_base_type() {
    let config = Config::new().with_default_base_type("usb-storage");
    let mut intf = Interface::new(TestPlatform::new(), config);
    let e = intf
        .get_smart_device("/dev/sdb", "usbsunplus")
        .map(|_| ())
        .unwrap_err();
    assert_eq!(e.msg, "Type 'usbsunplus+...': Unknown device type 'usb-storage'");
}

#[test]
fn empty_type_asks_platform() {
    let (no, msg) = type_error("");
    assert_eq!(no, Errno::Inval);
    assert_eq!(msg, "Unable to detect device type");
}

#[test]
fn valid_types() {
    let intf = interface(TestPlatform::new());
    let types = intf.valid_dev_types();
    assert!(types.starts_with("ata, scsi, "));
    assert!(types.contains("usbjmicron[,p][,x][,N]"));
    assert!(types.contains("intelliprop,N[+TYPE]"));
    assert_eq!(types.contains("sntjmicron[,NSID]"), cfg!(feature = "nvme"));
}
