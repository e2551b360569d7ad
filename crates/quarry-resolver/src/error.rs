use thiserror::Error;

use quarry_registry::RegistryError;
use quarry_version::RangeParseError;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to parse the requirement on `{name}`")]
    Requirement {
        name: String,
        #[source]
        source: RangeParseError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The constraints cannot be satisfied; the message holds the rendered
    /// explanation tree.
    #[error("{message}")]
    Unsat { message: String },

    #[error("resolution cancelled: {0}")]
    Cancelled(String),
}
