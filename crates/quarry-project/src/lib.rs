//! The on-disk model of a quarry project: the human-authored manifest, the
//! machine-written lock, USE flags, the project directory layout, and the
//! snapshot interface framing every transaction.

pub use crate::error::ProjectError;
pub use crate::layout::ProjectLayout;
pub use crate::lock::{Lock, LockedPackage};
pub use crate::manifest::Manifest;
pub use crate::snapshot::{RecordingSnapshot, Snapshot, SnapshotOp};
pub use crate::use_flag::{UseFlag, UseFlagParseError};

mod error;
mod layout;
mod lock;
mod manifest;
mod snapshot;
mod use_flag;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Reads a JSON document from disk.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ProjectError> {
    let contents = fs_err::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|source| ProjectError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a JSON document atomically: serialize to a sibling temp file, then
/// rename over the target.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ProjectError> {
    let contents = serde_json::to_string_pretty(value).map_err(|source| ProjectError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(parent)?;
    use std::io::Write;
    file.write_all(contents.as_bytes())?;
    file.write_all(b"\n")?;
    file.persist(path)
        .map_err(|err| ProjectError::Io(err.error))?;
    Ok(())
}
