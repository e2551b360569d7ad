use base64::prelude::{Engine, BASE64_STANDARD};
use indexmap::IndexMap;
use serde::Deserialize;

use quarry_project::UseFlag;

use crate::RegistryError;

/// The recipe endpoint's JSON shape; scripts and patches arrive base64
/// encoded.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RecipeWire {
    pub install_script: String,

    #[serde(default)]
    pub iuse: Vec<String>,

    #[serde(default)]
    pub patches: IndexMap<String, String>,

    #[serde(default)]
    pub dependencies: IndexMap<String, String>,
}

/// A decoded build recipe: the install script body, the USE flags the
/// package declares, patch files to drop into the source area, and the
/// dependencies recorded into the lock's `requires` section.
#[derive(Clone, Debug, Default)]
pub struct Recipe {
    pub install_script: Vec<u8>,
    pub iuse: Vec<UseFlag>,
    pub patches: Vec<(String, Vec<u8>)>,
    pub dependencies: IndexMap<String, String>,
}

impl Recipe {
    pub(crate) fn decode(wire: RecipeWire, package: &str) -> Result<Self, RegistryError> {
        let install_script =
            BASE64_STANDARD
                .decode(&wire.install_script)
                .map_err(|_| RegistryError::BadPayload {
                    name: package.to_string(),
                    field: "install_script".to_string(),
                })?;

        let mut iuse = Vec::with_capacity(wire.iuse.len());
        for flag in &wire.iuse {
            let parsed = flag
                .parse::<UseFlag>()
                .map_err(|_| RegistryError::BadPayload {
                    name: package.to_string(),
                    field: format!("iuse entry `{flag}`"),
                })?;
            iuse.push(parsed);
        }

        let mut patches = Vec::with_capacity(wire.patches.len());
        for (filename, payload) in &wire.patches {
            let decoded = BASE64_STANDARD
                .decode(payload)
                .map_err(|_| RegistryError::BadPayload {
                    name: package.to_string(),
                    field: format!("patch `{filename}`"),
                })?;
            patches.push((filename.clone(), decoded));
        }

        Ok(Self {
            install_script,
            iuse,
            patches,
            dependencies: wire.dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_script_iuse_and_patches() {
        let wire = RecipeWire {
            install_script: BASE64_STANDARD.encode("make install\n"),
            iuse: vec!["+ssl".to_string()],
            patches: [(
                "fix-build.patch".to_string(),
                BASE64_STANDARD.encode("--- a\n+++ b\n"),
            )]
            .into_iter()
            .collect(),
            dependencies: [("zlib".to_string(), "^1.3.0".to_string())]
                .into_iter()
                .collect(),
        };
        let recipe = Recipe::decode(wire, "demo").unwrap();
        assert_eq!(recipe.install_script, b"make install\n");
        assert_eq!(recipe.iuse, vec![UseFlag::enabled("ssl")]);
        assert_eq!(recipe.patches[0].0, "fix-build.patch");
        assert_eq!(recipe.dependencies.get("zlib").unwrap(), "^1.3.0");
    }

    #[test]
    fn rejects_bad_base64() {
        let wire = RecipeWire {
            install_script: "not base64!!!".to_string(),
            ..RecipeWire::default()
        };
        assert!(matches!(
            Recipe::decode(wire, "demo"),
            Err(RegistryError::BadPayload { .. })
        ));
    }
}
