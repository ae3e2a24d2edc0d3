// SPDX-License-Identifier: MPL-2.0
//! Realtek RTL9210 and compatible bridges.
//!
//! The vendor CDB has room for the opcode and the low byte of cdw10 only, which limits the
//! bridge to Identify and Get Log Page with the remaining dwords zero.
use super::{check_admin_whitelist, data_buffer, Bridge};
use core::convert::TryFrom;
use libdev::bytes::put_le16;
use libdev::nvme::{AdminCommand, NvmeCmdIn, NvmeCmdOut};
use libdev::scsi::{DxferDir, ScsiCmdIo, ScsiDevice};
use libdev::{DeviceCore, Errno, Result, Tunnel};
use log::*;

const OPCODE: u8 = 0xe4;
/// Largest log page the bridge transfers correctly.
const GET_LOG_MAX: usize = 0x200;

/// Realtek command encoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct Realtek;

impl Bridge for Realtek {
    const DEV_TYPE: &'static str = "sntrealtek";
    const VENDOR: &'static str = "Realtek";

    fn nvme_pass_through(
        &mut self,
        core: &mut DeviceCore,
        tunnel: &mut Tunnel<dyn ScsiDevice>,
        cmd: &mut NvmeCmdIn<'_>,
        _out: &mut NvmeCmdOut,
    ) -> Result<()> {
        check_admin_whitelist(core, cmd)?;
        if cmd.cdw11 != 0 || cmd.cdw12 != 0 || cmd.cdw13 != 0 || cmd.cdw14 != 0 || cmd.cdw15 != 0 {
            return Err(core.set_err(
                Errno::NoSys,
                "Nonzero NVMe command dwords 11-15 not supported",
            ));
        }

        let opcode = cmd.opcode;
        let cdw10 = cmd.cdw10;
        let data = data_buffer(core, cmd)?;
        data.fill(0);
        let mut size = data.len();
        if opcode == AdminCommand::GetLogPage as u8 && size > GET_LOG_MAX {
            warn!(
                "NVMe Get Log truncated to 0x{:03x} bytes, 0x{:03x} bytes zero filled",
                GET_LOG_MAX,
                size - GET_LOG_MAX
            );
            size = GET_LOG_MAX;
        }
        let len = match u16::try_from(size) {
            Ok(len) => len,
            Err(_) => {
                return Err(core.set_err(
                    Errno::Inval,
                    format!("NVMe transfer size 0x{:x} too large for Realtek bridge", size),
                ))
            }
        };

        let mut cdb = [0u8; 16];
        cdb[0] = OPCODE;
        put_le16(&mut cdb[1..], len);
        cdb[3] = opcode;
        cdb[4] = cdw10 as u8;
        let mut io = ScsiCmdIo::new(&cdb, DxferDir::FromDevice, &mut data[..size]);
        tunnel.scsi_pass_through_and_check(core, &mut io, "SntRealtek::nvme_pass_through: ")
    }
}
