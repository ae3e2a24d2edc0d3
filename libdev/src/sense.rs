// SPDX-License-Identifier: MPL-2.0
//! SCSI sense data decoding.
//!
//! Everything here is a pure function over byte slices. Reads never go past the length a
//! caller passes, nor, for fixed format sense, past the additional sense length the device
//! reported.
use core::fmt;

/// SCSI status byte reported with sense data.
pub const SCSI_STATUS_CHECK_CONDITION: u8 = 0x02;

/// Sense keys. See SPC-5, table 49.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SenseKey {
    NoSense = 0x0,
    RecoveredError = 0x1,
    NotReady = 0x2,
    MediumError = 0x3,
    HardwareError = 0x4,
    IllegalRequest = 0x5,
    UnitAttention = 0x6,
    DataProtect = 0x7,
    BlankCheck = 0x8,
    VendorSpecific = 0x9,
    CopyAborted = 0xA,
    AbortedCommand = 0xB,
    Reserved = 0xC,
    VolumeOverflow = 0xD,
    Miscompare = 0xE,
    Completed = 0xF,
}

impl From<u8> for SenseKey {
    fn from(v: u8) -> Self {
        use SenseKey::*;
        match v & 0xf {
            0x0 => NoSense,
            0x1 => RecoveredError,
            0x2 => NotReady,
            0x3 => MediumError,
            0x4 => HardwareError,
            0x5 => IllegalRequest,
            0x6 => UnitAttention,
            0x7 => DataProtect,
            0x8 => BlankCheck,
            0x9 => VendorSpecific,
            0xA => CopyAborted,
            0xB => AbortedCommand,
            0xC => Reserved,
            0xD => VolumeOverflow,
            0xE => Miscompare,
            _ => Completed,
        }
    }
}

/// Additional sense codes the filter distinguishes.
pub mod asc {
    pub const NOT_READY: u8 = 0x04;
    pub const UNKNOWN_OPCODE: u8 = 0x20;
    pub const INVALID_FIELD: u8 = 0x24;
    pub const UNKNOWN_PARAM: u8 = 0x26;
    pub const NO_MEDIUM: u8 = 0x3a;
    /// ASCQ (with ASC 0) meaning "ATA pass-through information available".
    pub const ASCQ_ATA_PASS_THROUGH: u8 = 0x1d;
}

/// Normalized sense header, independent of fixed or descriptor format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct SenseHeader {
    pub response_code: u8,
    pub sense_key: u8,
    pub asc: u8,
    pub ascq: u8,
    pub additional_length: u8,
}

impl SenseHeader {
    /// Returns true for descriptor format sense (response code 0x72/0x73).
    pub fn is_descriptor(&self) -> bool {
        self.response_code >= 0x72
    }
}

/// Decodes the header of `sense`. Returns `None` if the buffer is empty or does not hold
/// current/deferred sense (response code 0x70..=0x73).
pub fn normalize(sense: &[u8]) -> Option<SenseHeader> {
    let first = *sense.first()?;
    if first & 0x70 != 0x70 {
        return None;
    }
    let mut len = sense.len();
    let mut hdr = SenseHeader {
        response_code: first & 0x7f,
        ..SenseHeader::default()
    };
    if hdr.is_descriptor() {
        if len > 1 {
            hdr.sense_key = sense[1] & 0xf;
        }
        if len > 2 {
            hdr.asc = sense[2];
        }
        if len > 3 {
            hdr.ascq = sense[3];
        }
        if len > 7 {
            hdr.additional_length = sense[7];
        }
    } else {
        if len > 2 {
            hdr.sense_key = sense[2] & 0xf;
        }
        if len > 7 {
            len = len.min(usize::from(sense[7]) + 8);
            if len > 12 {
                hdr.asc = sense[12];
            }
            if len > 13 {
                hdr.ascq = sense[13];
            }
        }
    }
    Some(hdr)
}

/// Finds the first descriptor of type `desc_type` in descriptor format sense and returns it,
/// including its two header bytes. The returned slice is bounded by the buffer, so callers
/// must check its length before indexing.
pub fn find_descriptor(sense: &[u8], desc_type: u8) -> Option<&[u8]> {
    if sense.len() < 8 || sense[7] == 0 || !(0x72..=0x73).contains(&sense[0]) {
        return None;
    }
    let add_len = usize::from(sense[7]).min(sense.len() - 8);
    let descs = &sense[8..8 + add_len];
    let mut k = 0;
    while k < add_len {
        let desc = &descs[k..];
        let add_len_d = if k + 1 < add_len {
            Some(usize::from(desc[1]))
        } else {
            None
        };
        if desc[0] == desc_type {
            let len = add_len_d.map_or(1, |d| d + 2).min(desc.len());
            return Some(&desc[..len]);
        }
        match add_len_d {
            Some(d) => k += d + 2,
            None => break,
        }
    }
    None
}

/// Sense fields a command's completion is judged by.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct SenseDisect {
    pub resp_code: u8,
    pub sense_key: u8,
    pub asc: u8,
    pub ascq: u8,
}

/// Extracts sense key and codes when `scsi_status` is CHECK CONDITION; everything is zero
/// otherwise.
pub fn disect(scsi_status: u8, sense: &[u8]) -> SenseDisect {
    let mut out = SenseDisect::default();
    if scsi_status != SCSI_STATUS_CHECK_CONDITION || sense.is_empty() {
        return out;
    }
    out.resp_code = sense[0] & 0x7f;
    if out.resp_code >= 0x72 {
        if sense.len() > 3 {
            out.sense_key = sense[1] & 0xf;
            out.asc = sense[2];
            out.ascq = sense[3];
        }
    } else if out.resp_code >= 0x70 && sense.len() > 2 {
        out.sense_key = sense[2] & 0xf;
        if sense.len() > 13 {
            out.asc = sense[12];
            out.ascq = sense[13];
        }
    }
    out
}

/// Coarse classification of a command's sense data.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SimpleError {
    NoError,
    NotReady,
    BadOpcode,
    BadField,
    BadParam,
    BadResponse,
    NoMedium,
    BecomingReady,
    TryAgain,
    MediumHardware,
    Unknown,
    AbortedCommand,
    Protection,
    Miscompare,
}

impl SimpleError {
    /// Returns true for anything but [`SimpleError::NoError`].
    pub fn is_err(self) -> bool {
        self != SimpleError::NoError
    }

    fn as_str(self) -> &'static str {
        match self {
            SimpleError::NoError => "no error",
            SimpleError::NotReady => "device not ready",
            SimpleError::BadOpcode => "unsupported scsi opcode",
            SimpleError::BadField => "unsupported field in scsi command",
            SimpleError::BadParam => "badly formed scsi parameters",
            SimpleError::BadResponse => "scsi response fails sanity test",
            SimpleError::NoMedium => "no medium present",
            SimpleError::BecomingReady => "device will be ready soon",
            SimpleError::TryAgain => "unit attention reported, try again",
            SimpleError::MediumHardware => "medium or hardware error (serious)",
            SimpleError::Unknown => "unknown error (unexpected sense key)",
            SimpleError::AbortedCommand => "aborted command",
            SimpleError::Protection => "data protection error",
            SimpleError::Miscompare => "miscompare",
        }
    }
}

impl fmt::Display for SimpleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps disected sense onto a [`SimpleError`].
pub fn simple_filter(s: &SenseDisect) -> SimpleError {
    match SenseKey::from(s.sense_key) {
        SenseKey::NoSense | SenseKey::RecoveredError | SenseKey::Completed => {
            SimpleError::NoError
        }
        SenseKey::NotReady => {
            if s.asc == asc::NO_MEDIUM {
                SimpleError::NoMedium
            } else if s.asc == asc::NOT_READY && s.ascq == 0x1 {
                SimpleError::BecomingReady
            } else {
                SimpleError::NotReady
            }
        }
        SenseKey::MediumError | SenseKey::HardwareError => SimpleError::MediumHardware,
        SenseKey::IllegalRequest => match s.asc {
            asc::UNKNOWN_OPCODE => SimpleError::BadOpcode,
            asc::INVALID_FIELD => SimpleError::BadField,
            // UNKNOWN_PARAM and everything else
            _ => SimpleError::BadParam,
        },
        SenseKey::UnitAttention => SimpleError::TryAgain,
        SenseKey::AbortedCommand => SimpleError::AbortedCommand,
        SenseKey::DataProtect => SimpleError::Protection,
        SenseKey::Miscompare => SimpleError::Miscompare,
        _ => SimpleError::Unknown,
    }
}
