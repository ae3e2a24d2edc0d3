// SPDX-License-Identifier: MPL-2.0
use core::fmt;
use thiserror::Error;

/// Error classes a device operation can fail with. The discriminants are the Linux errno values
/// so that codes can be compared against what a native binding reports.
#[repr(i32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Errno {
    /// Input/output error: the transport failed or the reply did not validate.
    Io = 5,
    /// No such device.
    NoDev = 19,
    /// Invalid argument: the request was malformed. Always raised before any I/O.
    Inval = 22,
    /// Function not implemented: the request needs a feature the translator lacks.
    NoSys = 38,
}

impl Errno {
    /// Returns the numeric errno value.
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Returns the `strerror` text for this errno.
    pub const fn description(self) -> &'static str {
        match self {
            Errno::Io => "Input/output error",
            Errno::NoDev => "No such device",
            Errno::Inval => "Invalid argument",
            Errno::NoSys => "Function not implemented",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// The (code, message) pair every failing device operation records.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Error)]
#[error("{msg}")]
pub struct DeviceError {
    /// Error class.
    pub no: Errno,
    /// Human readable message, tagged with the translator that produced it.
    pub msg: String,
}

impl DeviceError {
    /// Creates an error with an explicit message.
    pub fn new(no: Errno, msg: impl Into<String>) -> Self {
        DeviceError {
            no,
            msg: msg.into(),
        }
    }

    /// Creates an error whose message is the errno description.
    pub fn from_errno(no: Errno) -> Self {
        DeviceError::new(no, no.description())
    }

    /// Returns true if the error reports a missing feature rather than a failure.
    pub fn is_unsupported(&self) -> bool {
        self.no == Errno::NoSys
    }
}

/// Result type used by every device operation.
pub type Result<T> = core::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_defaults_to_strerror_text() {
        let e = DeviceError::from_errno(Errno::NoSys);
        assert_eq!(e.to_string(), "Function not implemented");
        assert_eq!(e.no.code(), 38);
        assert!(e.is_unsupported());
    }
}
