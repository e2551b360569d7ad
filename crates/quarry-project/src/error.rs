use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse `{path}`")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("`{0}` is not a quarry project (missing manifest)")]
    MissingManifest(PathBuf),

    #[error(transparent)]
    UseFlag(#[from] crate::use_flag::UseFlagParseError),

    #[error("snapshot operation failed: {0}")]
    Snapshot(String),
}
