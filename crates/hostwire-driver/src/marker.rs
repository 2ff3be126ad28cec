//! Opaque modification markers.

use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Value that changes whenever the driver's code unit changes.
///
/// Markers are only compared for equality; ordering carries no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModificationMarker(Repr);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Repr {
    File {
        modified: Option<SystemTime>,
        len: u64,
    },
    Generation(u64),
}

impl ModificationMarker {
    /// Builds a marker from file metadata.
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self(Repr::File {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })
    }

    /// Reads the marker of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the IO error raised while reading metadata.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        std::fs::metadata(path).map(|metadata| Self::from_metadata(&metadata))
    }

    /// Builds a marker from a publication counter.
    #[must_use]
    pub const fn generation(value: u64) -> Self {
        Self(Repr::Generation(value))
    }
}
