// SPDX-License-Identifier: MPL-2.0
//! The nvme library contains the translators that implement the NVMe capability on top of a
//! SCSI device, plus the few NVMe data structures they need to read.
//!
//! # Modules
//!
//! The below submodules are in this crate:
//!
//! * identify: Identify Controller data
//! * snt: SCSI to NVMe Translation through vendor specific USB bridges (ASMedia, JMicron,
//!   Realtek)
#![forbid(
    absolute_paths_not_starting_with_crate,
    anonymous_parameters,
    explicit_outlives_requirements,
    keyword_idents,
    macro_use_extern_crate,
    trivial_numeric_casts,
    unsafe_code,
    unused_extern_crates,
    unused_import_braces
)]
#![deny(missing_debug_implementations, non_ascii_idents)]
/// The identify module reads and decodes the Identify Controller data structure.
pub mod identify;
/// The snt module contains the USB to NVMe bridges.
pub mod snt;

pub use identify::{read_id_ctrl, IdentifyControllerHeader};
pub use snt::{SntAsmediaDevice, SntDevice, SntJmicronDevice, SntRealtekDevice};
