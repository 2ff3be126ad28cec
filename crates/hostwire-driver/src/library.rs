//! Dynamic driver libraries.
//!
//! Each load copies the library to a private shadow file before opening it.
//! Dynamic loaders cache libraries by path, so opening the original in place
//! would keep serving stale code after a rebuild; a fresh shadow path per
//! load guarantees the new bytes are mapped. The shadow file is removed when
//! the library is unloaded.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};
use tempfile::TempPath;
use tracing::debug;

use crate::error::{DriverError, LoadError};
use crate::export::{
    ABI_VERSION, ABI_VERSION_SYMBOL, AbiVersionFn, EntryPointFn, HELP_SYMBOL, HelpFn, reclaim,
};
use crate::instance::DriverInstance;
use crate::marker::ModificationMarker;
use crate::module::{DriverModule, DriverSource};

const LIBRARY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::library");

/// Resolves locators as filesystem paths to driver libraries.
#[derive(Debug, Clone)]
pub struct LibrarySource {
    shadow_dir: PathBuf,
}

impl LibrarySource {
    /// Creates a source that shadows libraries in the system temp directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shadow_dir: std::env::temp_dir(),
        }
    }

    /// Shadows libraries in `dir` instead. The directory must allow mapping
    /// executable code.
    #[must_use]
    pub fn with_shadow_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            shadow_dir: dir.into(),
        }
    }
}

impl Default for LibrarySource {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverSource for LibrarySource {
    fn load(&self, locator: &str) -> Result<Box<dyn DriverModule>, LoadError> {
        let path = Path::new(locator)
            .canonicalize()
            .map_err(|_| LoadError::not_found(locator))?;
        if !path.is_file() {
            return Err(LoadError::not_found(locator));
        }
        let loaded = LoadedLibrary::open(&path, &self.shadow_dir)?;
        Ok(Box::new(LibraryModule {
            identity: path.display().to_string(),
            path,
            shadow_dir: self.shadow_dir.clone(),
            loaded: Some(loaded),
        }))
    }
}

struct LoadedLibrary {
    // Field order matters: the library is closed before its shadow file is
    // deleted.
    library: Library,
    shadow: TempPath,
}

impl LoadedLibrary {
    fn open(path: &Path, shadow_dir: &Path) -> Result<Self, LoadError> {
        let shadow = shadow_copy(path, shadow_dir)?;
        // SAFETY: loading runs the library's initialisers. Driver libraries
        // are trusted code supplied by the operator.
        let library = unsafe { Library::new(shadow.as_os_str()) }.map_err(|source| {
            LoadError::Library {
                path: path.to_path_buf(),
                source: Arc::new(source),
            }
        })?;
        let loaded = Self { library, shadow };
        loaded.check_abi(path)?;
        debug!(
            target: LIBRARY_TARGET,
            path = %path.display(),
            shadow = %loaded.shadow.display(),
            "loaded driver library"
        );
        Ok(loaded)
    }

    fn check_abi(&self, path: &Path) -> Result<(), LoadError> {
        // SAFETY: the symbol type matches the one emitted by `export_driver!`.
        let probe: Symbol<'_, AbiVersionFn> =
            unsafe { self.library.get(ABI_VERSION_SYMBOL.as_bytes()) }.map_err(|_| {
                LoadError::MissingSymbol {
                    path: path.to_path_buf(),
                    symbol: ABI_VERSION_SYMBOL.to_owned(),
                }
            })?;
        // SAFETY: the probe takes no arguments and has no side effects.
        let found = unsafe { probe() };
        if found == ABI_VERSION {
            Ok(())
        } else {
            Err(LoadError::AbiMismatch {
                path: path.to_path_buf(),
                expected: ABI_VERSION,
                found,
            })
        }
    }
}

fn shadow_copy(path: &Path, shadow_dir: &Path) -> Result<TempPath, LoadError> {
    let suffix = path
        .extension()
        .and_then(OsStr::to_str)
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let file = tempfile::Builder::new()
        .prefix("hostwire-driver-")
        .suffix(&suffix)
        .tempfile_in(shadow_dir)
        .map_err(|error| LoadError::io(shadow_dir, error))?;
    std::fs::copy(path, file.path()).map_err(|error| LoadError::io(path, error))?;
    Ok(file.into_temp_path())
}

/// A driver library loaded from disk.
pub struct LibraryModule {
    identity: String,
    path: PathBuf,
    shadow_dir: PathBuf,
    loaded: Option<LoadedLibrary>,
}

impl LibraryModule {
    /// Path of the original library file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn library(&self) -> Result<&Library, DriverError> {
        self.loaded
            .as_ref()
            .map(|loaded| &loaded.library)
            .ok_or_else(|| DriverError::failed("driver library is not loaded"))
    }
}

impl fmt::Debug for LibraryModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryModule")
            .field("path", &self.path)
            .field("loaded", &self.loaded.is_some())
            .finish_non_exhaustive()
    }
}

impl DriverModule for LibraryModule {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn marker(&self) -> Result<ModificationMarker, LoadError> {
        ModificationMarker::from_path(&self.path).map_err(|error| LoadError::io(&self.path, error))
    }

    fn reload(&mut self) -> Result<(), LoadError> {
        self.loaded = None;
        self.loaded = Some(LoadedLibrary::open(&self.path, &self.shadow_dir)?);
        Ok(())
    }

    fn instantiate(&self, entry_point: &str) -> Result<DriverInstance, DriverError> {
        let library = self.library()?;
        // SAFETY: entry points are emitted by `export_driver!` with this
        // signature.
        let constructor: Symbol<'_, EntryPointFn> =
            unsafe { library.get(entry_point.as_bytes()) }
                .map_err(|_| DriverError::missing_entry_point(entry_point))?;
        // SAFETY: the constructor returns a pointer produced by
        // `export::construct`.
        unsafe { reclaim(constructor()) }
    }

    fn help(&self) -> Option<Result<String, DriverError>> {
        let library = match self.library() {
            Ok(library) => library,
            Err(error) => return Some(Err(error)),
        };
        // SAFETY: the help symbol is emitted by `export_driver!` with this
        // signature.
        let help: Symbol<'_, HelpFn> = unsafe { library.get(HELP_SYMBOL.as_bytes()) }.ok()?;
        // SAFETY: the help function returns a pointer produced by
        // `export::describe`.
        Some(unsafe { reclaim(help()) })
    }
}
