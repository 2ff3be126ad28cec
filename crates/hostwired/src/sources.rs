//! Resolution of driver locators to code sources.
//!
//! Locators starting with `builtin:` name drivers compiled into the worker;
//! anything else is a path to a driver library.

use hostwire_driver::{Catalogue, DriverSource, LibrarySource};
use tracing::debug;

const BUILTIN_SCHEME: &str = "builtin:";
const SOURCES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::sources");

/// Whether `locator` names a compiled-in driver.
#[must_use]
pub fn is_builtin(locator: &str) -> bool {
    locator.starts_with(BUILTIN_SCHEME)
}

/// Catalogue holding every driver compiled into the worker.
#[must_use]
pub fn builtin_catalogue() -> Catalogue {
    let catalogue = Catalogue::new();
    if let Err(error) = catalogue.publish(
        hostwire_driver_loopback::BUILTIN_LOCATOR,
        hostwire_driver_loopback::catalogue_unit(),
    ) {
        debug!(target: SOURCES_TARGET, %error, "failed to publish loopback driver");
    }
    catalogue
}

/// Picks the source able to load `locator`.
#[must_use]
pub fn resolve_source(locator: &str) -> Box<dyn DriverSource> {
    if is_builtin(locator) {
        debug!(target: SOURCES_TARGET, locator, "using compiled-in drivers");
        Box::new(builtin_catalogue())
    } else {
        debug!(target: SOURCES_TARGET, locator, "using driver library");
        Box::new(LibrarySource::new())
    }
}
