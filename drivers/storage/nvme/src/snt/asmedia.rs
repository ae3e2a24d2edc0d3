// SPDX-License-Identifier: MPL-2.0
//! ASMedia ASM2362 and compatible bridges.
use super::{check_admin_whitelist, data_buffer, Bridge};
use libdev::bytes::put_be32;
use libdev::nvme::{NvmeCmdIn, NvmeCmdOut};
use libdev::scsi::{DxferDir, ScsiCmdIo, ScsiDevice};
use libdev::{DeviceCore, Errno, Result, Tunnel};

const OPCODE: u8 = 0xe6;

/// ASMedia command encoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct Asmedia;

impl Bridge for Asmedia {
    const DEV_TYPE: &'static str = "sntasmedia";
    const VENDOR: &'static str = "ASMedia";

    fn nvme_pass_through(
        &mut self,
        core: &mut DeviceCore,
        tunnel: &mut Tunnel<dyn ScsiDevice>,
        cmd: &mut NvmeCmdIn<'_>,
        _out: &mut NvmeCmdOut,
    ) -> Result<()> {
        check_admin_whitelist(core, cmd)?;
        if cmd.cdw11 != 0 || cmd.cdw14 != 0 || cmd.cdw15 != 0 {
            return Err(core.set_err(
                Errno::NoSys,
                "Nonzero NVMe command dwords 11, 14, or 15 not supported",
            ));
        }

        let mut cdb = [0u8; 16];
        cdb[0] = OPCODE;
        cdb[1] = cmd.opcode;
        cdb[3] = cmd.cdw10 as u8;
        cdb[6] = (cmd.cdw10 >> 24) as u8;
        cdb[7] = (cmd.cdw10 >> 16) as u8;
        put_be32(&mut cdb[8..], cmd.cdw13);
        put_be32(&mut cdb[12..], cmd.cdw12);

        let data = data_buffer(core, cmd)?;
        data.fill(0);
        let mut io = ScsiCmdIo::new(&cdb, DxferDir::FromDevice, data);
        tunnel.scsi_pass_through_and_check(core, &mut io, "SntAsmedia::nvme_pass_through: ")
    }
}
