// SPDX-License-Identifier: MPL-2.0
//! The passthru crate composes the translators of the `ata` and `nvme` driver crates into
//! device chains.
//!
//! Given a device name and a type string such as `sat,12`, `usbjmicron,x,0+scsi` or
//! `sntrealtek/sat`, an [`Interface`] asks its [`Platform`] for the base device owning the OS
//! handle and wraps it in the requested translators. The resulting device is closed; open it
//! with [`libdev::open_autodetect`] when the type may be refined by probing (`sat,auto` and
//! the `/sat` SNT types).
//!
//! ```no_run
//! use passthru::{Config, Interface, Platform};
//! # fn run<P: Platform>(platform: P) -> libdev::Result<()> {
//! let mut intf = Interface::new(platform, Config::default());
//! let dev = intf.get_smart_device("/dev/sdb", "sat,auto")?;
//! let mut dev = libdev::open_autodetect(dev);
//! if let Some(ata) = dev.as_ata() {
//!     // ... ATA pass-through
//! #   let _ = ata;
//! }
//! # Ok(())
//! # }
//! ```
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
/// The config module contains the run-time settings of an interface.
pub mod config;
/// The interface module contains the device factory and the platform binding it builds on.
pub mod interface;

pub use config::Config;
pub use interface::{Interface, Platform};
pub use libdev::{DeviceError, Errno, Result};
