use base64::prelude::{Engine, BASE64_STANDARD};
use indexmap::IndexMap;

use crate::recipe::{Recipe, RecipeWire};
use crate::{Registry, RegistryError, VersionsResponse};

/// An in-memory registry with the same contract as the HTTP client, used by
/// tests and offline scenarios.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    packages: IndexMap<String, VersionsResponse>,
    recipes: IndexMap<(String, String), RecipeWire>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a package version with `(dependency, range-expression)`
    /// pairs. A dependency on `use:<flag>` expresses a USE-flag requirement.
    pub fn add_package(&mut self, name: &str, version: &str, deps: &[(&str, &str)]) -> &mut Self {
        let versions = self.packages.entry(name.to_string()).or_default();
        versions.insert(
            version.to_string(),
            deps.iter()
                .map(|(dep, range)| ((*dep).to_string(), (*range).to_string()))
                .collect(),
        );
        self
    }

    /// Registers a recipe; the script body is stored plain and encoded on
    /// the way out, like the wire format carries it.
    pub fn add_recipe(
        &mut self,
        name: &str,
        version: &str,
        script: &str,
        iuse: &[&str],
        dependencies: &[(&str, &str)],
    ) -> &mut Self {
        self.recipes.insert(
            (name.to_string(), version.to_string()),
            RecipeWire {
                install_script: BASE64_STANDARD.encode(script),
                iuse: iuse.iter().map(|flag| (*flag).to_string()).collect(),
                patches: IndexMap::new(),
                dependencies: dependencies
                    .iter()
                    .map(|(dep, range)| ((*dep).to_string(), (*range).to_string()))
                    .collect(),
            },
        );
        self
    }

    pub fn add_patch(&mut self, name: &str, version: &str, filename: &str, diff: &str) {
        let recipe = self
            .recipes
            .get_mut(&(name.to_string(), version.to_string()))
            .expect("add_recipe before add_patch");
        recipe
            .patches
            .insert(filename.to_string(), BASE64_STANDARD.encode(diff));
    }
}

impl Registry for MemoryRegistry {
    fn fetch_versions(&mut self, name: &str) -> Result<VersionsResponse, RegistryError> {
        Ok(self.packages.get(name).cloned().unwrap_or_default())
    }

    fn fetch_recipe(
        &mut self,
        name: &str,
        version: &str,
        _os: &str,
        _arch: &str,
    ) -> Result<Recipe, RegistryError> {
        let wire = self
            .recipes
            .get(&(name.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| RegistryError::PackageNotFound(name.to_string()))?;
        Recipe::decode(wire, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_registered_packages() {
        let mut registry = MemoryRegistry::new();
        registry.add_package("a", "1.0.0", &[("b", ">=1.0.0,<4.0.0")]);
        registry.add_recipe("a", "1.0.0", "make install\n", &["+ssl"], &[("b", ">=1.0.0,<4.0.0")]);

        let versions = registry.fetch_versions("a").unwrap();
        assert_eq!(versions["1.0.0"]["b"], ">=1.0.0,<4.0.0");

        let recipe = registry.fetch_recipe("a", "1.0.0", "Linux", "x86_64").unwrap();
        assert_eq!(recipe.install_script, b"make install\n");
        assert_eq!(recipe.iuse.len(), 1);

        assert!(registry.fetch_versions("ghost").unwrap().is_empty());
        assert!(registry
            .fetch_recipe("ghost", "1.0.0", "Linux", "x86_64")
            .is_err());
    }
}
