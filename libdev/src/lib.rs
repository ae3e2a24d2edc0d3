//! The libdev crate contains the device model shared by every pass-through translator.
//! It holds the ATA, SCSI and NVMe command models, sense data decoding, the device core and
//! capability traits, and the ownership slot used by tunnelled devices.
#![forbid(
    absolute_paths_not_starting_with_crate,
    anonymous_parameters,
    explicit_outlives_requirements,
    keyword_idents,
    macro_use_extern_crate,
    meta_variable_misuse,
    trivial_numeric_casts,
    unsafe_code,
    unused_extern_crates,
    unused_import_braces,
    unused_lifetimes
)]
#![deny(missing_debug_implementations, non_ascii_idents)]
/// The ata module contains the ATA task file model, request validation and the ATA
/// capability.
pub mod ata;
/// The bytes module contains unaligned big and little endian accessors.
pub mod bytes;
/// The device module contains the device core and the capability-independent device trait.
pub mod device;
/// The error module contains errno codes and the device error type.
pub mod error;
/// Scripted SCSI transport for tests.
#[cfg(any(test, feature = "mock"))]
pub mod mock;
/// The nvme module contains the NVMe admin command model and the NVMe capability.
pub mod nvme;
/// The scsi module contains the SCSI command model and the SCSI capability.
pub mod scsi;
/// The sense module decodes SCSI sense data.
pub mod sense;
/// The tunnel module contains the inner device slot of tunnelled devices.
pub mod tunnel;

pub use ata::{AtaCmdIn, AtaCmdOut, AtaDevice, AtaSupport, Direction, OutRegs};
pub use device::{
    open_autodetect, Capabilities, DeviceCore, DeviceInfo, IntoSmartDevice, SmartDevice,
};
pub use error::{DeviceError, Errno, Result};
pub use nvme::{NvmeCmdIn, NvmeCmdOut, NvmeDevice};
pub use scsi::{DxferDir, ScsiCmdIo, ScsiDevice};
pub use tunnel::Tunnel;
