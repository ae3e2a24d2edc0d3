// SPDX-License-Identifier: MPL-2.0
use ata::sat::SatLength;
use libdev::scsi::SCSI_TIMEOUT_DEFAULT;

/// Run-time settings of an [`Interface`](crate::Interface).
///
/// ```
/// use passthru::Config;
/// use ata::sat::SatLength;
///
/// let config = Config::new().with_scsi_timeout(20).with_sat_default_len(SatLength::Len12);
/// assert_eq!(config.scsi_timeout(), 20);
/// assert_eq!(config.default_base_type(), "scsi");
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Config {
    scsi_timeout: u32,
    sat_default_len: SatLength,
    default_base_type: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scsi_timeout: SCSI_TIMEOUT_DEFAULT,
            sat_default_len: SatLength::Len16,
            default_base_type: "scsi".into(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout in seconds of every SCSI command sent through devices of this interface.
    pub fn scsi_timeout(&self) -> u32 {
        self.scsi_timeout
    }

    /// ATA PASS-THROUGH length used by `sat` and `sat,0`.
    pub fn sat_default_len(&self) -> SatLength {
        self.sat_default_len
    }

    /// Base device type of `sat...`, `usb...` and `snt...` types without a `+TYPE` suffix.
    pub fn default_base_type(&self) -> &str {
        &self.default_base_type
    }

    pub fn with_scsi_timeout(mut self, secs: u32) -> Self {
        self.scsi_timeout = secs;
        self
    }

    pub fn with_sat_default_len(mut self, len: SatLength) -> Self {
        self.sat_default_len = len;
        self
    }

    pub fn with_default_base_type(mut self, base: &str) -> Self {
        self.default_base_type = base.into();
        self
    }
}
