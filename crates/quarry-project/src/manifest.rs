use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::use_flag::UseFlag;
use crate::{read_json, write_json_atomic, ProjectError};

/// The human-authored project manifest: declared direct dependencies (name to
/// range expression), selected USE flags, and named scripts.
///
/// Round-trips losslessly: map entries keep their order and unknown scripts
/// are preserved verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub use_flags: Vec<UseFlag>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub scripts: IndexMap<String, String>,
}

impl Manifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "0.1.0".to_string(),
            ..Self::default()
        }
    }

    pub fn read(path: &Path) -> Result<Self, ProjectError> {
        if !path.exists() {
            return Err(ProjectError::MissingManifest(path.to_path_buf()));
        }
        read_json(path)
    }

    pub fn write(&self, path: &Path) -> Result<(), ProjectError> {
        write_json_atomic(path, self)
    }

    /// Inserts or replaces a direct dependency.
    pub fn set_dependency(&mut self, name: &str, range_expr: &str) {
        self.dependencies
            .insert(name.to_string(), range_expr.to_string());
    }

    pub fn remove_dependency(&mut self, name: &str) -> bool {
        self.dependencies.shift_remove(name).is_some()
    }

    /// The selected USE flags as a name-to-polarity map; a later entry for
    /// the same name wins.
    pub fn use_flag_map(&self) -> IndexMap<String, bool> {
        let mut map = IndexMap::new();
        for flag in &self.use_flags {
            map.insert(flag.name.clone(), flag.enabled);
        }
        map
    }

    /// Merges flags into the selection, replacing existing polarities.
    pub fn merge_use_flags(&mut self, flags: &[UseFlag]) {
        let mut map = self.use_flag_map();
        for flag in flags {
            map.insert(flag.name.clone(), flag.enabled);
        }
        self.use_flags = map
            .into_iter()
            .map(|(name, enabled)| UseFlag { name, enabled })
            .collect();
    }

    /// Drops flags from the selection by name.
    pub fn remove_use_flags(&mut self, names: &[String]) {
        self.use_flags
            .retain(|flag| !names.contains(&flag.name));
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn round_trips_losslessly() {
        let input = indoc! {r#"
            {
              "name": "demo",
              "version": "0.1.0",
              "dependencies": {
                "zlib": "^1.3.0",
                "openssl": ">=3.0.0,<4.0.0"
              },
              "useFlags": ["+ssl", "-static"],
              "scripts": {
                "preInstall": "echo before",
                "postInstall": "echo after"
              }
            }
        "#};
        let manifest: Manifest = serde_json::from_str(input).unwrap();
        assert_eq!(manifest.name, "demo");
        assert_eq!(manifest.dependencies.get_index(0).unwrap().0, "zlib");
        assert_eq!(
            manifest.use_flags,
            vec![UseFlag::enabled("ssl"), UseFlag::disabled("static")]
        );

        let output = serde_json::to_string_pretty(&manifest).unwrap();
        let reparsed: Manifest = serde_json::from_str(&output).unwrap();
        assert_eq!(reparsed, manifest);
    }

    #[test]
    fn merge_use_flags_replaces_polarity() {
        let mut manifest = Manifest::new("demo");
        manifest.merge_use_flags(&[UseFlag::enabled("ssl"), UseFlag::disabled("static")]);
        manifest.merge_use_flags(&[UseFlag::disabled("ssl")]);
        assert_eq!(
            manifest.use_flag_map().get("ssl").copied(),
            Some(false)
        );
        assert_eq!(manifest.use_flags.len(), 2);
    }

    #[test]
    fn empty_sections_are_omitted() {
        let manifest = Manifest::new("demo");
        let output = serde_json::to_string(&manifest).unwrap();
        assert!(!output.contains("dependencies"));
        assert!(!output.contains("useFlags"));
        assert!(!output.contains("scripts"));
    }
}
