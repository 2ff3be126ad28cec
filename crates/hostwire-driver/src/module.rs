//! Loaded code units and the sources that resolve them.

use crate::error::{DriverError, LoadError};
use crate::instance::DriverInstance;
use crate::marker::ModificationMarker;

/// A loaded code unit that contains one or more driver constructors.
///
/// Instances produced by [`DriverModule::instantiate`] may execute code owned
/// by the module, so callers must drop every instance before reloading or
/// dropping the module itself.
pub trait DriverModule: Send {
    /// Stable identity used in log records.
    fn identity(&self) -> &str;

    /// Reads the current modification marker of the backing code unit.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] when the marker cannot be read.
    fn marker(&self) -> Result<ModificationMarker, LoadError>;

    /// Re-reads the code unit so later constructions observe new code.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] when the fresh code cannot be loaded. The module
    /// holds no code afterwards and every construction fails until a later
    /// reload succeeds.
    fn reload(&mut self) -> Result<(), LoadError>;

    /// Calls the named zero-argument constructor.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingEntryPoint`] when no such constructor
    /// exists, or whatever the constructor raises.
    fn instantiate(&self, entry_point: &str) -> Result<DriverInstance, DriverError>;

    /// Module-level help text, if the module provides any.
    fn help(&self) -> Option<Result<String, DriverError>>;
}

/// Resolves locators to loaded modules.
pub trait DriverSource: Send {
    /// Loads the code unit named by `locator`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] when nothing exists at the locator or the code
    /// cannot be loaded.
    fn load(&self, locator: &str) -> Result<Box<dyn DriverModule>, LoadError>;
}
