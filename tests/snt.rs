// SPDX-License-Identifier: MPL-2.0
#![cfg(feature = "nvme")]
mod common;

use common::{identify_data, interface, jmicron_reply, TestPlatform};
use libdev::ata::{AtaCommand, SmartSubcommand};
use libdev::mock::ScsiReply;
use libdev::nvme::{lid, AdminCommand, IdentifyCns, BROADCAST_NSID, IDENTIFY_SIZE};
use libdev::{open_autodetect, AtaCmdIn, AtaCmdOut, Errno, NvmeCmdIn, NvmeCmdOut};

#[test]
fn sntjmicron_end_to_end() -> anyhow::Result<()> {
    let platform = TestPlatform::new()
        .reply(ScsiReply::default())
        .reply(identify_data(b"Samsung SSD 970 EVO Plus 1TB"))
        .reply(jmicron_reply(0x0000_8086, 0));
    let mut intf = interface(platform);
    let mut dev = intf.get_smart_device("/dev/sdc", "sntjmicron")?;
    dev.open()?;
    assert_eq!(dev.info().info_name, "/dev/sdc [USB NVMe JMicron]");
    let nvme = dev.as_nvme().expect("NVMe capability");
    assert_eq!(nvme.nsid(), BROADCAST_NSID);

    let mut buf = [0u8; IDENTIFY_SIZE];
    let mut cmd = NvmeCmdIn::new();
    cmd.set_data_in(AdminCommand::Identify as u8, &mut buf);
    cmd.cdw10 = IdentifyCns::Controller as u32;
    let mut out = NvmeCmdOut::default();
    nvme.nvme_pass_through(&mut cmd, &mut out)?;
    assert_eq!(out.result, 0x8086);
    assert_eq!(&buf[24..52], b"Samsung SSD 970 EVO Plus 1TB");

    let log = intf.platform().log();
    let log = log.borrow();
    assert_eq!(log.opens, 1);
    let protocols: Vec<u8> = log.sent.iter().map(|x| x.cdb[1]).collect();
    assert_eq!(protocols, vec![0x80, 0x82, 0x8f]);
    Ok(())
}

#[test]
fn sntjmicron_namespace_option() -> anyhow::Result<()> {
    let mut intf = interface(TestPlatform::new());
    let mut dev = intf.get_smart_device("/dev/sdc", "sntjmicron,0x1")?;
    assert_eq!(dev.as_nvme().map(|d| d.nsid()), Some(1));

    let mut dev = intf.get_smart_device("/dev/sdc", "sntjmicron,0x0")?;
    dev.open()?;
    assert_eq!(dev.as_nvme().map(|d| d.nsid()), Some(BROADCAST_NSID));

    let e = intf
        .get_smart_device("/dev/sdc", "sntjmicron,1")
        .map(|_| ())
        .unwrap_err();
    assert_eq!(e.no, Errno::Inval);
    assert_eq!(e.msg, "Invalid NVMe namespace id in 'sntjmicron,1'");

    let e = intf
        .get_smart_device("/dev/sdc", "sntfoo/sat")
        .map(|_| ())
        .unwrap_err();
    assert_eq!(e.msg, "Unknown SNT device type 'sntfoo/sat'");
    Ok(())
}

#[test]
fn self_test_log_clamped_on_jmicron() -> anyhow::Result<()> {
    let platform = TestPlatform::new()
        .reply(ScsiReply::default())
        .reply(ScsiReply::data(&[0x01; 0x400]))
        .reply(jmicron_reply(0, 0));
    let mut intf = interface(platform);
    let mut dev = intf.get_smart_device("/dev/sdc", "sntjmicron")?;
    let mut buf = [0xaau8; 0x400];
    let mut cmd = NvmeCmdIn::new();
    cmd.set_data_in(AdminCommand::GetLogPage as u8, &mut buf);
    cmd.nsid = BROADCAST_NSID;
    cmd.cdw10 = u32::from(lid::SELF_TEST) | ((0x400 / 4 - 1) << 16);
    dev.as_nvme()
        .expect("NVMe capability")
        .nvme_pass_through(&mut cmd, &mut NvmeCmdOut::default())?;
    assert!(buf[..0x218].iter().all(|&b| b == 0x01));
    assert!(buf[0x218..].iter().all(|&b| b == 0));
    assert_eq!(intf.platform().log().borrow().sent[1].len, 0x218);
    Ok(())
}

#[test]
fn realtek_rejects_before_cdb() -> anyhow::Result<()> {
    let mut intf = interface(TestPlatform::new());
    let mut dev = intf.get_smart_device("/dev/sdd", "sntrealtek")?;
    let nvme = dev.as_nvme().expect("NVMe capability");
    let mut buf = [0u8; 512];

    let mut cmd = NvmeCmdIn::new();
    cmd.set_data_in(AdminCommand::GetLogPage as u8, &mut buf);
    cmd.nsid = 0x1234;
    cmd.cdw10 = 0x02 | (127 << 16);
    let e = nvme
        .nvme_pass_through(&mut cmd, &mut NvmeCmdOut::default())
        .unwrap_err();
    assert_eq!(e.no, Errno::NoSys);
    assert_eq!(e.msg, "NVMe Get Log Page with NSID=0x1234 not supported");

    let mut cmd = NvmeCmdIn::new();
    cmd.set_data_in(AdminCommand::Identify as u8, &mut buf);
    cmd.nsid = 2;
    cmd.cdw10 = IdentifyCns::Namespace as u32;
    let e = nvme
        .nvme_pass_through(&mut cmd, &mut NvmeCmdOut::default())
        .unwrap_err();
    assert_eq!(e.no, Errno::NoSys);
    assert_eq!(e.msg, "NVMe Identify Namespace 0x2 not supported");

    assert!(intf.platform().log().borrow().sent.is_empty());
    Ok(())
}

#[test]
fn maybe_sat_falls_back_to_sat() -> anyhow::Result<()> {
    let platform = TestPlatform::new()
        .reply(identify_data(b""))
        .reply(ScsiReply::default());
    let mut intf = interface(platform);
    let dev = intf.get_smart_device("/dev/sde", "sntrealtek/sat")?;
    assert!(dev.is_nvme());
    assert_eq!(dev.info().req_type, "sntrealtek/sat");

    let mut dev = open_autodetect(dev);
    let log = intf.platform().log();
    {
        let log = log.borrow();
        assert_eq!(log.opens, 1);
        assert_eq!(log.closes, 0);
        assert!(!log.dropped);
    }
    assert!(dev.is_ata());
    assert!(!dev.is_nvme());
    assert!(dev.is_open());
    assert_eq!(dev.info().info_name, "/dev/sde [SAT]");

    // the SAT device talks to the very same SCSI device
    let mut cmd = AtaCmdIn::new();
    cmd.in_regs.command.set(AtaCommand::Smart as u8);
    cmd.in_regs.features.set(SmartSubcommand::EnableOperations as u8);
    dev.as_ata()
        .expect("ATA capability")
        .ata_pass_through(&mut cmd, &mut AtaCmdOut::default())?;
    assert_eq!(log.borrow().sent.len(), 2);
    assert_eq!(log.borrow().sent[1].cdb[0], 0x85);

    drop(dev);
    assert!(log.borrow().dropped);
    Ok(())
}

#[test]
fn maybe_sat_keeps_nvme_drive() -> anyhow::Result<()> {
    let platform = TestPlatform::new().reply(identify_data(b"CT1000P1SSD8"));
    let mut intf = interface(platform);
    let dev = open_autodetect(intf.get_smart_device("/dev/sdf", "sntasmedia/sat")?);
    assert!(dev.is_nvme());
    assert!(dev.is_open());
    assert_eq!(dev.info().dev_type, "sntasmedia");
    assert_eq!(intf.platform().log().borrow().sent[0].cdb[0], 0xe6);
    Ok(())
}
