// SPDX-License-Identifier: MPL-2.0
//! Composition of device chains from device type strings.
//!
//! A type such as `usbjmicron,x,1+scsi` names a translator and, after the `+`, the base device
//! the translator tunnels through. The base device comes from the [`Platform`]; the
//! translators are built here and take ownership of it.
use crate::config::Config;
use ata::intelliprop::{IntelliPropDevice, MAX_PHYDRIVE};
use ata::sat::{SatDevice, SatLength, SatMode};
use ata::usb::{
    JmicronPort, UsbCypressDevice, UsbJmicronDevice, UsbProlificDevice, UsbSunplusDevice,
    CYPRESS_SIGNATURE_DEFAULT,
};
use libdev::{AtaDevice, DeviceError, Errno, IntoSmartDevice, Result, ScsiDevice, SmartDevice};
use log::*;

/// OS binding that creates the devices owning a real OS handle.
///
/// Devices are returned closed. Only [`Platform::get_ata_device`] and
/// [`Platform::get_scsi_device`] are required; the rest default to "not supported".
pub trait Platform: core::fmt::Debug {
    /// Creates the ATA device `name` for type `req_type` (normally `ata`).
    fn get_ata_device(&mut self, name: &str, req_type: &str) -> Result<Box<dyn AtaDevice>>;

    /// Creates the SCSI device `name` for type `req_type` (normally `scsi`).
    fn get_scsi_device(&mut self, name: &str, req_type: &str) -> Result<Box<dyn ScsiDevice>>;

    /// Creates the NVMe device `name` for type `req_type` (`nvme` or `nvme,NSID`).
    fn get_nvme_device(&mut self, name: &str, req_type: &str) -> Result<Box<dyn SmartDevice>> {
        let _ = (name, req_type);
        Err(DeviceError::new(Errno::NoSys, "NVMe devices are not supported on this platform"))
    }

    /// Creates a device of a platform specific type, or returns `None` if `req_type` is not
    /// one.
    fn get_custom_device(
        &mut self,
        name: &str,
        req_type: &str,
    ) -> Option<Result<Box<dyn SmartDevice>>> {
        let _ = (name, req_type);
        None
    }

    /// Picks a device type for `name` when none was given.
    fn autodetect_smart_device(&mut self, name: &str) -> Result<Box<dyn SmartDevice>> {
        let _ = name;
        Err(DeviceError::new(Errno::Inval, "Unable to detect device type"))
    }

    /// Comma separated list of the platform specific types, empty if there are none.
    fn valid_custom_dev_types(&self) -> String {
        String::new()
    }
}

/// Device factory context.
///
/// Holds the [`Config`], the [`Platform`] and the error of the last failing call, the same
/// way a device holds its own last error.
#[derive(Debug)]
pub struct Interface<P: Platform> {
    config: Config,
    platform: P,
    err: Option<DeviceError>,
}

/// Splits `type` into the translator part and the base type after `+`.
fn split_type(req_type: &str) -> (&str, &str) {
    match req_type.find('+') {
        Some(i) => (&req_type[..i], &req_type[i + 1..]),
        None => (req_type, ""),
    }
}

/// Parses `,N` with decimal N.
fn parse_dec_option(s: &str) -> Option<u32> {
    s.strip_prefix(',')?.parse().ok()
}

/// Parses `,0xN` with hexadecimal N.
fn parse_hex_option(s: &str) -> Option<u32> {
    let hex = s.strip_prefix(",0x")?;
    u32::from_str_radix(hex, 16).ok()
}

fn is_sat_type(t: &str) -> bool {
    match t.strip_prefix("sat") {
        Some(rest) => rest.is_empty() || rest.starts_with(',') || rest.starts_with('+'),
        None => false,
    }
}

impl<P: Platform> Interface<P> {
    pub fn new(platform: P, config: Config) -> Self {
        Interface {
            config,
            platform,
            err: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Error of the last failing factory call.
    pub fn err(&self) -> Option<&DeviceError> {
        self.err.as_ref()
    }

    pub fn clear_err(&mut self) {
        self.err = None;
    }

    fn set_err(&mut self, no: Errno, msg: impl Into<String>) -> DeviceError {
        let e = DeviceError::new(no, msg);
        debug!("{}", e);
        self.err = Some(e.clone());
        e
    }

    fn record<T>(&mut self, res: Result<T>) -> Result<T> {
        if let Err(e) = &res {
            self.err = Some(e.clone());
        }
        res
    }

    /// All device types this interface understands.
    pub fn valid_dev_types(&self) -> String {
        let mut s = String::from(
            "ata, scsi, nvme[,NSID], sat[,auto][,N][+TYPE], usbcypress[,X], \
             usbjmicron[,p][,x][,N], usbprolific, usbsunplus",
        );
        if cfg!(feature = "nvme") {
            s += ", sntasmedia, sntjmicron[,NSID], sntrealtek";
        }
        s += ", intelliprop,N[+TYPE]";
        let custom = self.platform.valid_custom_dev_types();
        if !custom.is_empty() {
            s += ", ";
            s += &custom;
        }
        s
    }

    /// Creates the (closed) device `name` of type `req_type`, composing the translator chain
    /// the type describes. An empty type asks the platform to pick one.
    pub fn get_smart_device(&mut self, name: &str, req_type: &str) -> Result<Box<dyn SmartDevice>> {
        self.clear_err();
        let res = self.smart_device(name, req_type);
        self.record(res)
    }

    fn smart_device(&mut self, name: &str, req_type: &str) -> Result<Box<dyn SmartDevice>> {
        if req_type.is_empty() {
            return self.platform.autodetect_smart_device(name);
        }
        if let Some(res) = self.platform.get_custom_device(name, req_type) {
            return res;
        }

        if req_type == "ata" {
            let dev = self.base_ata_device(name, req_type)?;
            Ok(dev.into_smart())
        } else if req_type == "scsi" {
            let dev = self.base_scsi_device(name, req_type)?;
            Ok(dev.into_smart())
        } else if req_type == "nvme" || req_type.starts_with("nvme,") {
            let mut dev = self.platform.get_nvme_device(name, req_type)?;
            dev.core_mut().set_timeout(self.config.scsi_timeout());
            Ok(dev)
        } else if is_sat_type(req_type) || req_type.starts_with("usb") {
            let (sat_type, base_type) = split_type(req_type);
            let scsidev = self.tunnel_base(name, sat_type, base_type)?;
            Ok(self.sat_device(sat_type, scsidev)?.into_smart())
        } else if req_type.starts_with("snt") {
            self.snt_chain(name, req_type)
        } else if req_type.starts_with("intelliprop") {
            let (itl_type, base_type) = split_type(req_type);
            let base_type = if base_type.is_empty() { "ata" } else { base_type };
            let atadev = self.ata_chain(name, base_type).map_err(|e| {
                DeviceError::new(Errno::Inval, format!("Type '{}+...': {}", itl_type, e.msg))
            })?;
            if !atadev.is_ata() {
                return Err(DeviceError::new(
                    Errno::Inval,
                    format!("Type '{}+...': Device type '{}' is not ATA", itl_type, base_type),
                ));
            }
            Ok(self.intelliprop_device(itl_type, atadev)?.into_smart())
        } else {
            Err(DeviceError::new(
                Errno::Inval,
                format!("Unknown device type '{}'", req_type),
            ))
        }
    }

    #[cfg(feature = "nvme")]
    fn snt_chain(&mut self, name: &str, req_type: &str) -> Result<Box<dyn SmartDevice>> {
        let (snt_type, base_type) = split_type(req_type);
        let scsidev = self.tunnel_base(name, snt_type, base_type)?;
        Ok(self.snt_device(snt_type, scsidev)?.into_smart())
    }

    #[cfg(not(feature = "nvme"))]
    fn snt_chain(&mut self, _name: &str, req_type: &str) -> Result<Box<dyn SmartDevice>> {
        Err(DeviceError::new(
            Errno::Inval,
            format!("Unknown device type '{}'", req_type),
        ))
    }

    fn base_scsi_device(&mut self, name: &str, req_type: &str) -> Result<Box<dyn ScsiDevice>> {
        let mut dev = self.platform.get_scsi_device(name, req_type)?;
        dev.core_mut().set_timeout(self.config.scsi_timeout());
        Ok(dev)
    }

    fn base_ata_device(&mut self, name: &str, req_type: &str) -> Result<Box<dyn AtaDevice>> {
        let mut dev = self.platform.get_ata_device(name, req_type)?;
        dev.core_mut().set_timeout(self.config.scsi_timeout());
        Ok(dev)
    }

    /// Creates the SCSI base device of the translator `outer` from `base_type`, or from the
    /// configured default base type if it is empty.
    fn tunnel_base(
        &mut self,
        name: &str,
        outer: &str,
        base_type: &str,
    ) -> Result<Box<dyn ScsiDevice>> {
        let base_type = if base_type.is_empty() {
            self.config.default_base_type().to_string()
        } else {
            base_type.to_string()
        };
        let dev = self.base_scsi_device(name, &base_type).map_err(|e| {
            DeviceError::new(Errno::Inval, format!("Type '{}+...': {}", outer, e.msg))
        })?;
        if !dev.is_scsi() {
            return Err(DeviceError::new(
                Errno::Inval,
                format!("Type '{}+...': Device type '{}' is not SCSI", outer, base_type),
            ));
        }
        Ok(dev)
    }

    /// ATA device for `req_type`: either an ATA over SCSI translator chain or a platform ATA
    /// device.
    fn ata_chain(&mut self, name: &str, req_type: &str) -> Result<Box<dyn AtaDevice>> {
        if is_sat_type(req_type) || req_type.starts_with("usb") {
            let (sat_type, base_type) = split_type(req_type);
            let scsidev = self.tunnel_base(name, sat_type, base_type)?;
            self.sat_device(sat_type, scsidev)
        } else {
            self.base_ata_device(name, req_type)
        }
    }

    /// Wraps `scsidev` in the ATA over SCSI translator named by `req_type` (`sat...`, `scsi`
    /// or `usb...`). `scsidev` is dropped on error.
    pub fn get_sat_device(
        &mut self,
        req_type: &str,
        scsidev: Box<dyn ScsiDevice>,
    ) -> Result<Box<dyn AtaDevice>> {
        let res = self.sat_device(req_type, scsidev);
        self.record(res)
    }

    fn sat_device(
        &mut self,
        req_type: &str,
        scsidev: Box<dyn ScsiDevice>,
    ) -> Result<Box<dyn AtaDevice>> {
        if let Some(t) = req_type.strip_prefix("sat") {
            let (mode, t) = match t.strip_prefix(",auto") {
                Some(rest) => (SatMode::SatAuto, rest),
                None => (SatMode::SatAlways, t),
            };
            let default_len = self.config.sat_default_len();
            let len = if t.is_empty() {
                Some(default_len)
            } else {
                parse_dec_option(t).and_then(|n| SatLength::from_option(n, default_len))
            };
            return match len {
                Some(len) => Ok(Box::new(SatDevice::new(scsidev, req_type, mode, len))),
                None => Err(self.set_err(
                    Errno::Inval,
                    "Option '-d sat[,auto][,N]' requires N to be 0, 12 or 16",
                )),
            };
        }

        if req_type == "scsi" {
            let len = self.config.sat_default_len();
            return Ok(Box::new(SatDevice::new(scsidev, req_type, SatMode::ScsiAlways, len)));
        }

        if let Some(t) = req_type.strip_prefix("usbcypress") {
            let signature = if t.is_empty() {
                Some(u32::from(CYPRESS_SIGNATURE_DEFAULT))
            } else {
                parse_hex_option(t)
            };
            return match signature {
                Some(sig) if sig <= 0xff => Ok(Box::new(UsbCypressDevice::new(
                    scsidev, req_type, sig as u8,
                ))),
                _ => Err(self.set_err(
                    Errno::Inval,
                    "Option '-d usbcypress,<n>' requires <n> to be an hexadecimal number between 0x0 and 0xff",
                )),
            };
        }

        if let Some(t) = req_type.strip_prefix("usbjmicron") {
            let (prolific, t) = match t.strip_prefix(",p") {
                Some(rest) => (true, rest),
                None => (false, t),
            };
            let (ata_48bit_support, t) = match t.strip_prefix(",x") {
                Some(rest) => (true, rest),
                None => (false, t),
            };
            let port = if t.is_empty() {
                Ok(None)
            } else {
                match parse_dec_option(t).and_then(JmicronPort::from_index) {
                    Some(port) => Ok(Some(port)),
                    None => Err(()),
                }
            };
            return match port {
                Ok(port) => Ok(Box::new(UsbJmicronDevice::new(
                    scsidev,
                    req_type,
                    prolific,
                    ata_48bit_support,
                    port,
                ))),
                Err(()) => Err(self.set_err(
                    Errno::Inval,
                    "Option '-d usbjmicron[,p][,x],<n>' requires <n> to be 0 or 1",
                )),
            };
        }

        match req_type {
            "usbprolific" => Ok(Box::new(UsbProlificDevice::new(scsidev, req_type))),
            "usbsunplus" => Ok(Box::new(UsbSunplusDevice::new(scsidev, req_type))),
            _ => Err(self.set_err(
                Errno::Inval,
                format!("Unknown USB device type '{}'", req_type),
            )),
        }
    }

    /// Wraps `scsidev` in the SNT translator named by `req_type`. A `/sat` suffix lets the
    /// device turn into a SAT device on [`SmartDevice::autodetect_open`]. `scsidev` is
    /// dropped on error.
    #[cfg(feature = "nvme")]
    pub fn get_snt_device(
        &mut self,
        req_type: &str,
        scsidev: Box<dyn ScsiDevice>,
    ) -> Result<Box<dyn libdev::NvmeDevice>> {
        let res = self.snt_device(req_type, scsidev);
        self.record(res)
    }

    #[cfg(feature = "nvme")]
    fn snt_device(
        &mut self,
        req_type: &str,
        scsidev: Box<dyn ScsiDevice>,
    ) -> Result<Box<dyn libdev::NvmeDevice>> {
        use libdev::nvme::BROADCAST_NSID;
        use nvme::{SntAsmediaDevice, SntJmicronDevice, SntRealtekDevice};

        let (snt_type, maybe_sat) = match req_type.strip_suffix("/sat") {
            Some(t) => (t, Some(self.config.sat_default_len())),
            None => (req_type, None),
        };

        if snt_type == "sntasmedia" {
            return Ok(Box::new(SntAsmediaDevice::new(
                scsidev,
                req_type,
                BROADCAST_NSID,
                maybe_sat,
            )));
        }
        if snt_type == "sntrealtek" {
            return Ok(Box::new(SntRealtekDevice::new(
                scsidev,
                req_type,
                BROADCAST_NSID,
                maybe_sat,
            )));
        }
        if let Some(t) = snt_type.strip_prefix("sntjmicron") {
            let nsid = if t.is_empty() {
                Some(BROADCAST_NSID)
            } else {
                parse_hex_option(t)
            };
            return match nsid {
                Some(nsid) => Ok(Box::new(SntJmicronDevice::new(
                    scsidev, req_type, nsid, maybe_sat,
                ))),
                None => Err(self.set_err(
                    Errno::Inval,
                    format!("Invalid NVMe namespace id in '{}'", snt_type),
                )),
            };
        }
        Err(self.set_err(
            Errno::Inval,
            format!("Unknown SNT device type '{}'", req_type),
        ))
    }

    /// Wraps `atadev` in an IntelliProp router for type `intelliprop,N`. `atadev` is dropped
    /// on error.
    pub fn get_intelliprop_device(
        &mut self,
        req_type: &str,
        atadev: Box<dyn AtaDevice>,
    ) -> Result<Box<dyn AtaDevice>> {
        let res = self.intelliprop_device(req_type, atadev);
        self.record(res)
    }

    fn intelliprop_device(
        &mut self,
        req_type: &str,
        atadev: Box<dyn AtaDevice>,
    ) -> Result<Box<dyn AtaDevice>> {
        let phydrive = req_type
            .strip_prefix("intelliprop")
            .and_then(parse_dec_option)
            .filter(|&n| n <= MAX_PHYDRIVE);
        match phydrive {
            Some(n) => Ok(Box::new(IntelliPropDevice::new(atadev, n))),
            None => Err(self.set_err(
                Errno::Inval,
                "Option '-d intelliprop,N' must have 0 <= N <= 3",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_splitting() {
        assert_eq!(split_type("sat,12+scsi"), ("sat,12", "scsi"));
        assert_eq!(split_type("usbsunplus"), ("usbsunplus", ""));
        assert_eq!(split_type("intelliprop,1+sat+scsi"), ("intelliprop,1", "sat+scsi"));
    }

    #[test]
    fn option_parsing() {
        assert_eq!(parse_dec_option(",12"), Some(12));
        assert_eq!(parse_dec_option("12"), None);
        assert_eq!(parse_dec_option(",1x"), None);
        assert_eq!(parse_hex_option(",0x1f"), Some(0x1f));
        assert_eq!(parse_hex_option(",1f"), None);
        assert_eq!(parse_hex_option(",0x"), None);
    }

    #[test]
    fn sat_type_detection() {
        assert!(is_sat_type("sat"));
        assert!(is_sat_type("sat,auto"));
        assert!(is_sat_type("sat+scsi"));
        assert!(!is_sat_type("satx"));
        assert!(!is_sat_type("scsi"));
    }
}
