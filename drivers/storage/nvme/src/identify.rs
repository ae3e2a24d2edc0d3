// SPDX-License-Identifier: MPL-2.0
use libdev::nvme::{AdminCommand, IdentifyCns, NvmeCmdIn, NvmeCmdOut, NvmeDevice, IDENTIFY_SIZE};
use libdev::Result;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

/// Leading bytes of the Identify Controller data structure, up to and including VER.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IdentifyControllerHeader {
    /// PCI Vendor ID
    pub vid: U16<LittleEndian>,
    /// PCI Subsystem Vendor ID
    pub ssvid: U16<LittleEndian>,
    /// Serial Number
    pub sn: [u8; 20],
    /// Model Number
    pub mn: [u8; 40],
    /// Firmware Revision
    pub fr: [u8; 8],
    /// Recommended Arbitration Burst
    pub rab: u8,
    /// IEEE OUI Identifier
    pub ieee: [u8; 3],
    /// Controller Multi-Path I/O and Namespace Sharing Capabilities
    pub cmic: u8,
    /// Maximum Data Transfer Size
    pub mdts: u8,
    /// Controller ID
    pub cntlid: U16<LittleEndian>,
    /// Version
    pub ver: U32<LittleEndian>,
}
assert_eq_size!(IdentifyControllerHeader, [u8; 84]);

fn ascii_field(field: &[u8]) -> String {
    String::from_utf8_lossy(field)
        .trim_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}

impl IdentifyControllerHeader {
    /// Decodes the header at the start of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than the header.
    pub fn parse(buf: &[u8]) -> Self {
        let mut hdr = Self::new_zeroed();
        let n = hdr.as_bytes().len();
        hdr.as_mut_bytes().copy_from_slice(&buf[..n]);
        hdr
    }

    /// Model number without padding. Empty if the field holds only blanks and NULs.
    pub fn model(&self) -> String {
        ascii_field(&self.mn)
    }

    pub fn serial(&self) -> String {
        ascii_field(&self.sn)
    }

    pub fn firmware(&self) -> String {
        ascii_field(&self.fr)
    }
}

/// Reads the Identify Controller data of `dev` into `buf`, which is zeroed first, and returns
/// its decoded header.
pub fn read_id_ctrl(
    dev: &mut dyn NvmeDevice,
    buf: &mut [u8; IDENTIFY_SIZE],
) -> Result<IdentifyControllerHeader> {
    buf.fill(0);
    {
        let mut cmd = NvmeCmdIn::new();
        cmd.set_data_in(AdminCommand::Identify as u8, &mut buf[..]);
        cmd.cdw10 = IdentifyCns::Controller as u32;
        dev.nvme_pass_through(&mut cmd, &mut NvmeCmdOut::default())?;
    }
    Ok(IdentifyControllerHeader::parse(&buf[..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_trims_padding() {
        let mut buf = [0u8; IDENTIFY_SIZE];
        buf[0] = 0x4d;
        buf[1] = 0x14;
        buf[4..12].copy_from_slice(b"S4EWNX0N");
        buf[24..40].copy_from_slice(b"Samsung SSD 970 ");
        buf[40..64].copy_from_slice(&[b' '; 24]);
        buf[64..72].copy_from_slice(b"2B2QEXM7");
        buf[80..84].copy_from_slice(&[0x00, 0x03, 0x01, 0x00]);
        let hdr = IdentifyControllerHeader::parse(&buf);
        assert_eq!(hdr.vid.get(), 0x144d);
        assert_eq!(hdr.model(), "Samsung SSD 970");
        assert_eq!(hdr.serial(), "S4EWNX0N");
        assert_eq!(hdr.firmware(), "2B2QEXM7");
        assert_eq!(hdr.ver.get(), 0x0001_0300);
    }

    #[test]
    fn blank_model_is_empty() {
        let mut buf = [0u8; IDENTIFY_SIZE];
        buf[24..34].copy_from_slice(&[b' '; 10]);
        assert!(IdentifyControllerHeader::parse(&buf).model().is_empty());
    }
}
