//! In-process driver catalogue.
//!
//! Drivers linked into the host binary are published here under a locator.
//! Republishing a locator bumps its generation, which the worker observes as
//! a modification and answers with a reload, exactly as it would for a
//! rebuilt library on disk.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::error::{DriverError, LoadError};
use crate::instance::{Driver, DriverInstance};
use crate::marker::ModificationMarker;
use crate::module::{DriverModule, DriverSource};

const CATALOGUE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::catalogue");

type Constructor = Arc<dyn Fn() -> Result<DriverInstance, DriverError> + Send + Sync>;
type HelpText = Arc<dyn Fn() -> Result<String, DriverError> + Send + Sync>;

/// A publishable set of constructors plus optional module help.
#[derive(Clone, Default)]
pub struct CatalogueUnit {
    entry_points: BTreeMap<String, Constructor>,
    help: Option<HelpText>,
}

impl CatalogueUnit {
    /// Creates an empty unit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a zero-argument constructor under `name`.
    #[must_use]
    pub fn entry_point<D, F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        D: Driver,
        F: Fn() -> Result<D, DriverError> + Send + Sync + 'static,
    {
        let erased: Constructor = Arc::new(move || constructor().map(DriverInstance::new));
        self.entry_points.insert(name.into(), erased);
        self
    }

    /// Attaches module-level help text.
    #[must_use]
    pub fn help<F>(mut self, help: F) -> Self
    where
        F: Fn() -> Result<String, DriverError> + Send + Sync + 'static,
    {
        self.help = Some(Arc::new(help));
        self
    }
}

impl fmt::Debug for CatalogueUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogueUnit")
            .field("entry_points", &self.entry_points.keys().collect::<Vec<_>>())
            .field("help", &self.help.is_some())
            .finish()
    }
}

struct Published {
    unit: CatalogueUnit,
    generation: u64,
}

#[derive(Default)]
struct Shelf {
    units: BTreeMap<String, Published>,
    generation: u64,
}

impl Shelf {
    fn next_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }
}

/// Shared registry of in-process driver units.
///
/// Clones share the same contents. Generations come from one counter, so a
/// locator never reuses a marker even after being withdrawn and republished.
#[derive(Clone, Default)]
pub struct Catalogue {
    shelf: Arc<Mutex<Shelf>>,
}

impl Catalogue {
    /// Creates an empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `unit` at `locator`, replacing and superseding any earlier
    /// unit.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Catalogue`] when the catalogue lock is poisoned.
    pub fn publish(&self, locator: impl Into<String>, unit: CatalogueUnit) -> Result<(), LoadError> {
        let locator = locator.into();
        let mut shelf = self.lock()?;
        let generation = shelf.next_generation();
        debug!(target: CATALOGUE_TARGET, locator = %locator, generation, "published driver unit");
        shelf.units.insert(locator, Published { unit, generation });
        Ok(())
    }

    /// Marks `locator` as modified without changing its contents.
    ///
    /// Returns `false` when nothing is published there.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Catalogue`] when the catalogue lock is poisoned.
    pub fn touch(&self, locator: &str) -> Result<bool, LoadError> {
        let mut shelf = self.lock()?;
        if !shelf.units.contains_key(locator) {
            return Ok(false);
        }
        let generation = shelf.next_generation();
        if let Some(published) = shelf.units.get_mut(locator) {
            published.generation = generation;
        }
        Ok(true)
    }

    /// Removes the unit at `locator`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Catalogue`] when the catalogue lock is poisoned.
    pub fn withdraw(&self, locator: &str) -> Result<bool, LoadError> {
        Ok(self.lock()?.units.remove(locator).is_some())
    }

    fn snapshot(&self, locator: &str) -> Result<(CatalogueUnit, u64), LoadError> {
        let shelf = self.lock()?;
        shelf
            .units
            .get(locator)
            .map(|published| (published.unit.clone(), published.generation))
            .ok_or_else(|| LoadError::not_found(locator))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Shelf>, LoadError> {
        self.shelf.lock().map_err(|error| LoadError::Catalogue {
            message: error.to_string(),
        })
    }
}

impl fmt::Debug for Catalogue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalogue").finish_non_exhaustive()
    }
}

impl DriverSource for Catalogue {
    fn load(&self, locator: &str) -> Result<Box<dyn DriverModule>, LoadError> {
        let (unit, _) = self.snapshot(locator)?;
        Ok(Box::new(CatalogueModule {
            catalogue: self.clone(),
            locator: locator.to_owned(),
            unit,
        }))
    }
}

/// Module view over one catalogue locator.
struct CatalogueModule {
    catalogue: Catalogue,
    locator: String,
    unit: CatalogueUnit,
}

impl DriverModule for CatalogueModule {
    fn identity(&self) -> &str {
        &self.locator
    }

    fn marker(&self) -> Result<ModificationMarker, LoadError> {
        let (_, generation) = self.catalogue.snapshot(&self.locator)?;
        Ok(ModificationMarker::generation(generation))
    }

    fn reload(&mut self) -> Result<(), LoadError> {
        match self.catalogue.snapshot(&self.locator) {
            Ok((unit, _)) => {
                self.unit = unit;
                Ok(())
            }
            Err(error) => {
                self.unit = CatalogueUnit::new();
                Err(error)
            }
        }
    }

    fn instantiate(&self, entry_point: &str) -> Result<DriverInstance, DriverError> {
        let constructor = self
            .unit
            .entry_points
            .get(entry_point)
            .ok_or_else(|| DriverError::missing_entry_point(entry_point))?;
        constructor()
    }

    fn help(&self) -> Option<Result<String, DriverError>> {
        self.unit.help.as_ref().map(|help| help())
    }
}
