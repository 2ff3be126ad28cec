//! Binary interface between the worker and driver libraries.
//!
//! A driver library is a `cdylib` that invokes [`export_driver!`]. The macro
//! exports an ABI version probe, one `extern "C"` constructor per entry point,
//! and optionally a help function. Host and library must be built with the
//! same toolchain and the same version of this crate: the ABI passes boxed
//! Rust values across the boundary and only checks [`ABI_VERSION`].
//!
//! [`export_driver!`]: crate::export_driver

use std::panic::{self, AssertUnwindSafe};

use crate::error::DriverError;
use crate::instance::{Driver, DriverInstance};

/// Version of the driver ABI implemented by this crate.
pub const ABI_VERSION: u32 = 1;

/// Symbol reporting the library's ABI version.
pub const ABI_VERSION_SYMBOL: &str = "hostwire_abi_version";

/// Optional symbol producing module-level help.
pub const HELP_SYMBOL: &str = "hostwire_driver_help";

/// Outcome of an exported constructor.
pub type ConstructResult = Result<DriverInstance, DriverError>;

/// Outcome of the exported help function.
pub type HelpResult = Result<String, DriverError>;

/// Signature of the ABI version probe.
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

/// Signature of an exported constructor. The pointer owns a boxed result.
pub type EntryPointFn = unsafe extern "C" fn() -> *mut ConstructResult;

/// Signature of the exported help function. The pointer owns a boxed result.
pub type HelpFn = unsafe extern "C" fn() -> *mut HelpResult;

/// Runs a constructor behind the ABI, catching panics.
#[doc(hidden)]
pub fn construct<D, F>(constructor: F) -> *mut ConstructResult
where
    D: Driver,
    F: FnOnce() -> Result<D, DriverError>,
{
    let result = panic::catch_unwind(AssertUnwindSafe(constructor))
        .map_err(DriverError::from_panic)
        .and_then(|built| built)
        .map(DriverInstance::new);
    Box::into_raw(Box::new(result))
}

/// Runs a help function behind the ABI, catching panics.
#[doc(hidden)]
pub fn describe<F>(help: F) -> *mut HelpResult
where
    F: FnOnce() -> Result<String, DriverError>,
{
    let result = panic::catch_unwind(AssertUnwindSafe(help))
        .map_err(DriverError::from_panic)
        .and_then(|text| text);
    Box::into_raw(Box::new(result))
}

/// Takes ownership of a result produced by [`construct`] or [`describe`].
///
/// # Safety
///
/// `raw` must be null or a pointer returned by [`construct`] or
/// [`describe`] for the same `T`, not yet reclaimed.
#[doc(hidden)]
pub unsafe fn reclaim<T>(raw: *mut Result<T, DriverError>) -> Result<T, DriverError> {
    if raw.is_null() {
        return Err(DriverError::failed("driver library returned no result"));
    }
    // SAFETY: the caller guarantees `raw` came from `Box::into_raw` above.
    let boxed = unsafe { Box::from_raw(raw) };
    *boxed
}

/// Exports a driver library's entry points.
///
/// ```ignore
/// hostwire_driver::export_driver! {
///     entry_points: [open_loopback => Loopback::open],
///     help: loopback_help,
/// }
/// ```
///
/// Each constructor is a `fn() -> Result<D, DriverError>` where `D:
/// Driver`; `help` is a `fn() -> Result<String, DriverError>`. Invoke the
/// macro at most once per linked artefact since the exported symbol names are
/// fixed.
#[macro_export]
macro_rules! export_driver {
    (
        entry_points: [$($entry:ident => $constructor:path),+ $(,)?]
        $(, help: $help:path)?
        $(,)?
    ) => {
        #[doc(hidden)]
        #[unsafe(no_mangle)]
        pub extern "C" fn hostwire_abi_version() -> u32 {
            $crate::export::ABI_VERSION
        }

        $(
            #[doc(hidden)]
            #[unsafe(no_mangle)]
            pub extern "C" fn $entry() -> *mut $crate::export::ConstructResult {
                $crate::export::construct($constructor)
            }
        )+

        $(
            #[doc(hidden)]
            #[unsafe(no_mangle)]
            pub extern "C" fn hostwire_driver_help() -> *mut $crate::export::HelpResult {
                $crate::export::describe($help)
            }
        )?
    };
}
