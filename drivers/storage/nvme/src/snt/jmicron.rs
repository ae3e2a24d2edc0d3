// SPDX-License-Identifier: MPL-2.0
//! JMicron JMS583 and compatible bridges.
//!
//! A command takes three ATA PASS-THROUGH (12) shaped exchanges: the NVMe command block goes
//! out, the data phase (if any) follows, and a response block comes back carrying the
//! completion.
use super::{data_buffer, Bridge};
use bit_field::BitField;
use libdev::bytes::put_be24;
use libdev::nvme::{lid, set_nvme_err, AdminCommand, NvmeCmdIn, NvmeCmdOut, NvmeDirection};
use libdev::scsi::{DxferDir, ScsiCmdIo, ScsiDevice, ScsiOpcode};
use libdev::{DeviceCore, Errno, Result, Tunnel};
use log::*;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

/// "NVME" in little endian; first dword of both command and response block.
pub const NVME_SIGNATURE: u32 = 0x454d_564e;
/// Size of the command and response blocks.
const BLOCK_SIZE: usize = 512;
/// Largest self-test log the JMS583 transfers correctly.
const SELF_TEST_LOG_MAX: usize = 0x218;

/// Protocol field (low nibble of CDB byte 1).
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Protocol {
    NvmCmd = 0x0,
    NonData = 0x1,
    DmaIn = 0x2,
    DmaOut = 0x3,
    Response = 0xf,
}

fn cdb(protocol: Protocol, len: usize) -> [u8; 12] {
    let mut cdb = [0u8; 12];
    cdb[0] = ScsiOpcode::SatAtaPassThrough12 as u8;
    cdb[1] = 0x80 | protocol as u8;
    put_be24(&mut cdb[3..], len as u32);
    cdb
}

/// NVMe command block sent in the first phase.
#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct CommandBlock {
    signature: U32<LittleEndian>,
    _rsvd: U32<LittleEndian>,
    opcode: U32<LittleEndian>,
    nsid: U32<LittleEndian>,
    _rsvd2: [U32<LittleEndian>; 8],
    /// cdw10 to cdw15
    cdw: [U32<LittleEndian>; 6],
    _rsvd3: [U32<LittleEndian>; 110],
}
assert_eq_size!(CommandBlock, [u8; BLOCK_SIZE]);

/// Response block read in the last phase.
#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct ResponseBlock {
    signature: U32<LittleEndian>,
    _rsvd: U32<LittleEndian>,
    /// Completion dword 0
    result: U32<LittleEndian>,
    _rsvd2: [U32<LittleEndian>; 2],
    /// Completion dword 3; the status field starts at bit 17
    status: U32<LittleEndian>,
    _rsvd3: [U32<LittleEndian>; 122],
}
assert_eq_size!(ResponseBlock, [u8; BLOCK_SIZE]);

/// JMicron command encoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct Jmicron;

impl Bridge for Jmicron {
    const DEV_TYPE: &'static str = "sntjmicron";
    const VENDOR: &'static str = "JMicron";

    fn nvme_pass_through(
        &mut self,
        core: &mut DeviceCore,
        tunnel: &mut Tunnel<dyn ScsiDevice>,
        cmd: &mut NvmeCmdIn<'_>,
        out: &mut NvmeCmdOut,
    ) -> Result<()> {
        let direction = cmd.direction();
        if direction == NvmeDirection::Io {
            return Err(core.set_err(
                Errno::Inval,
                "SntJmicron::nvme_pass_through: bidirectional transfers not supported",
            ));
        }

        let mut size = cmd.size;
        let mut cdw10 = cmd.cdw10;
        if cmd.opcode == AdminCommand::GetLogPage as u8
            && cdw10.get_bits(0..8) == u32::from(lid::SELF_TEST)
            && size > SELF_TEST_LOG_MAX
        {
            // larger reads of the self-test log hang the bridge
            warn!(
                "{}: NVMe self-test log truncated to 0x{:03x} bytes",
                core.info().info_name,
                SELF_TEST_LOG_MAX
            );
            size = SELF_TEST_LOG_MAX;
            cdw10.set_bits(16..32, (SELF_TEST_LOG_MAX / 4 - 1) as u32);
        }

        let mut block = CommandBlock::new_zeroed();
        block.signature.set(NVME_SIGNATURE);
        block.opcode.set(u32::from(cmd.opcode));
        block.nsid.set(cmd.nsid);
        let cdws = [cdw10, cmd.cdw11, cmd.cdw12, cmd.cdw13, cmd.cdw14, cmd.cdw15];
        for (dw, val) in block.cdw.iter_mut().zip(cdws.iter()) {
            dw.set(*val);
        }

        let data = match direction {
            NvmeDirection::NoData => None,
            _ => {
                let data = data_buffer(core, cmd)?;
                if direction == NvmeDirection::In {
                    data.fill(0);
                }
                Some(&mut data[..size])
            }
        };

        let nvm_cdb = cdb(Protocol::NvmCmd, BLOCK_SIZE);
        let mut io = ScsiCmdIo::new(&nvm_cdb, DxferDir::ToDevice, block.as_mut_bytes());
        tunnel.scsi_pass_through_and_check(core, &mut io, "SntJmicron::nvme_pass_through:NVM: ")?;

        let data_cdb;
        let mut io = match data {
            None => {
                data_cdb = cdb(Protocol::NonData, 0);
                ScsiCmdIo::no_data(&data_cdb)
            }
            Some(data) if direction == NvmeDirection::Out => {
                data_cdb = cdb(Protocol::DmaOut, size);
                ScsiCmdIo::new(&data_cdb, DxferDir::ToDevice, data)
            }
            Some(data) => {
                data_cdb = cdb(Protocol::DmaIn, size);
                ScsiCmdIo::new(&data_cdb, DxferDir::FromDevice, data)
            }
        };
        tunnel.scsi_pass_through_and_check(core, &mut io, "SntJmicron::nvme_pass_through:Data: ")?;

        let mut reply = ResponseBlock::new_zeroed();
        let reply_cdb = cdb(Protocol::Response, BLOCK_SIZE);
        let mut io = ScsiCmdIo::new(&reply_cdb, DxferDir::FromDevice, reply.as_mut_bytes());
        tunnel.scsi_pass_through_and_check(core, &mut io, "SntJmicron::nvme_pass_through:Reply: ")?;
        trace!(
            "JMicron reply: signature 0x{:08x}, dw0 0x{:08x}, dw3 0x{:08x}",
            reply.signature.get(),
            reply.result.get(),
            reply.status.get()
        );

        if reply.signature.get() != NVME_SIGNATURE {
            return Err(core.set_err(Errno::Io, "Out of spec JMicron NVMe reply"));
        }
        let status = (reply.status.get() >> 17) as u16;
        if status > 0 {
            return Err(set_nvme_err(core, out, status, ""));
        }
        out.result = reply.result.get();
        Ok(())
    }
}
