use thiserror::Error;

use quarry_project::ProjectError;
use quarry_registry::RegistryError;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(
        "the build of `{package}@{version}` failed (exit status {})",
        .code.map_or_else(|| "signal".to_string(), |code| code.to_string())
    )]
    BuildFailed {
        package: String,
        version: String,
        code: Option<i32>,
    },
}
