//! The registry adapter: how quarry learns which package versions exist,
//! what they depend on, and how to build them.
//!
//! The wire contract has two endpoints:
//!
//! - `GET {registry}/{name}` returns the versions of a package and their
//!   dependencies as `{"<version>": {"<dep>": "<range-expr>", ...}, ...}`.
//! - `GET {registry}/{name}/{version}/{os}/{arch}` returns the build
//!   [`Recipe`] for one version on one platform.
//!
//! Both calls are blocking; results are cached per name and per
//! `(name, version, os, arch)` for the lifetime of the client.

pub use crate::client::HttpRegistry;
pub use crate::error::RegistryError;
pub use crate::memory::MemoryRegistry;
pub use crate::recipe::{Recipe, RecipeWire};

mod client;
mod error;
mod memory;
mod recipe;

use indexmap::IndexMap;

/// Version string to dependency map (dependency name to range expression).
///
/// Dependencies on `use:<flag>` pseudo-packages express USE-flag
/// requirements and are resolved like any other requirement.
pub type VersionsResponse = IndexMap<String, IndexMap<String, String>>;

/// The interface the core consumes to reach a package registry.
pub trait Registry {
    /// All known versions of `name` with their dependencies. An empty map
    /// means the registry does not know the package.
    fn fetch_versions(&mut self, name: &str) -> Result<VersionsResponse, RegistryError>;

    /// The build recipe for one version on one platform.
    fn fetch_recipe(
        &mut self,
        name: &str,
        version: &str,
        os: &str,
        arch: &str,
    ) -> Result<Recipe, RegistryError>;
}

impl<R: Registry + ?Sized> Registry for &mut R {
    fn fetch_versions(&mut self, name: &str) -> Result<VersionsResponse, RegistryError> {
        (**self).fetch_versions(name)
    }

    fn fetch_recipe(
        &mut self,
        name: &str,
        version: &str,
        os: &str,
        arch: &str,
    ) -> Result<Recipe, RegistryError> {
        (**self).fetch_recipe(name, version, os, arch)
    }
}
