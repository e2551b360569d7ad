use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use url::Url;

use crate::recipe::{Recipe, RecipeWire};
use crate::{Registry, RegistryError, VersionsResponse};

/// The header carrying a stable, hashed machine identifier. Its absence is
/// tolerated by the registry.
const MACHINE_ID_HEADER: &str = "X-Machine-Id";

/// A blocking client for the quarry registry.
///
/// Responses are cached in memory for the lifetime of the client, keyed by
/// name for version listings and by `(name, version, os, arch)` for recipes.
#[derive(Debug)]
pub struct HttpRegistry {
    client: Client,
    base: Url,
    machine_id: Option<String>,
    versions_cache: FxHashMap<String, VersionsResponse>,
    recipe_cache: FxHashMap<(String, String, String, String), Recipe>,
}

impl HttpRegistry {
    pub fn new(base: Url) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .user_agent("quarry")
            .timeout(Duration::from_secs(60 * 5))
            .build()?;
        Ok(Self {
            client,
            base,
            machine_id: machine_id(),
            versions_cache: FxHashMap::default(),
            recipe_cache: FxHashMap::default(),
        })
    }

    #[must_use]
    pub fn machine_id(mut self, machine_id: Option<String>) -> Self {
        self.machine_id = machine_id;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn get(&self, url: Url) -> Result<reqwest::blocking::Response, RegistryError> {
        tracing::debug!("fetching {url}");
        let mut request = self.client.get(url);
        if let Some(machine_id) = &self.machine_id {
            request = request.header(MACHINE_ID_HEADER, machine_id);
        }
        Ok(request.send()?)
    }
}

impl Registry for HttpRegistry {
    fn fetch_versions(&mut self, name: &str) -> Result<VersionsResponse, RegistryError> {
        if let Some(cached) = self.versions_cache.get(name) {
            return Ok(cached.clone());
        }

        let url = self.endpoint(&[name])?;
        let response = self.get(url.clone())?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::PackageNotFound(name.to_string()));
        }
        let response = response.error_for_status()?;
        let body = response.text()?;
        let versions: VersionsResponse =
            serde_json::from_str(&body).map_err(|source| RegistryError::BadJson {
                url: url.to_string(),
                source,
            })?;

        self.versions_cache
            .insert(name.to_string(), versions.clone());
        Ok(versions)
    }

    fn fetch_recipe(
        &mut self,
        name: &str,
        version: &str,
        os: &str,
        arch: &str,
    ) -> Result<Recipe, RegistryError> {
        let key = (
            name.to_string(),
            version.to_string(),
            os.to_string(),
            arch.to_string(),
        );
        if let Some(cached) = self.recipe_cache.get(&key) {
            return Ok(cached.clone());
        }

        let url = self.endpoint(&[name, version, os, arch])?;
        let response = self.get(url.clone())?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotAvailableForPlatform {
                name: name.to_string(),
                version: version.to_string(),
                os: os.to_string(),
                arch: arch.to_string(),
            });
        }
        let response = response.error_for_status()?;
        let body = response.text()?;
        let wire: RecipeWire =
            serde_json::from_str(&body).map_err(|source| RegistryError::BadJson {
                url: url.to_string(),
                source,
            })?;
        let recipe = Recipe::decode(wire, name)?;

        self.recipe_cache.insert(key, recipe.clone());
        Ok(recipe)
    }
}

/// A stable machine identifier: the sha256 of `/etc/machine-id` when
/// readable. Returns `None` elsewhere; the header is optional.
fn machine_id() -> Option<String> {
    let raw = std::fs::read_to_string("/etc/machine-id").ok()?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let digest = Sha256::digest(raw.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        write!(hex, "{byte:02x}").ok()?;
    }
    Some(hex)
}
