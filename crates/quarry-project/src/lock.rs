use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::use_flag::UseFlag;
use crate::{read_json, write_json_atomic, ProjectError};

/// One pinned package in the lock: the built version, the requirements it
/// was resolved with, the USE flags it declares and the ones it was built
/// with, and every file its build deposited under the install root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    pub version: String,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub requires: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub iuse: Vec<UseFlag>,

    #[serde(default, rename = "use", skip_serializing_if = "Vec::is_empty")]
    pub use_flags: Vec<UseFlag>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

/// The machine-written record of the last successful resolution and build.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Direct requirements as recorded at install time.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub packages: IndexMap<String, LockedPackage>,
}

impl Lock {
    /// Reads the lock, defaulting to empty when the file does not exist yet.
    pub fn read(path: &Path) -> Result<Self, ProjectError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        read_json(path)
    }

    pub fn write(&self, path: &Path) -> Result<(), ProjectError> {
        write_json_atomic(path, self)
    }

    pub fn package(&self, name: &str) -> Option<&LockedPackage> {
        self.packages.get(name)
    }

    /// Records a package, replacing any previous entry; a direct requirement
    /// is also recorded in the dependencies section.
    pub fn upsert_package(
        &mut self,
        name: &str,
        package: LockedPackage,
        direct_requirement: Option<&str>,
    ) {
        if let Some(requirement) = direct_requirement {
            self.dependencies
                .insert(name.to_string(), requirement.to_string());
        }
        self.packages.insert(name.to_string(), package);
    }

    pub fn remove_package(&mut self, name: &str) -> Option<LockedPackage> {
        self.dependencies.shift_remove(name);
        self.packages.shift_remove(name)
    }

    /// The forward dependency edges recorded in the lock: package name to
    /// the names it requires.
    pub fn dependency_names(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (name, package) in &self.packages {
            for dep_name in package.requires.keys() {
                map.entry(name.clone())
                    .or_default()
                    .insert(dep_name.clone());
            }
        }
        map
    }

    /// The reverse dependency edges recorded in the lock: package name to
    /// the names that require it.
    pub fn reverse_dependency_names(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (name, package) in &self.packages {
            for dep_name in package.requires.keys() {
                map.entry(dep_name.clone())
                    .or_default()
                    .insert(name.clone());
            }
        }
        map
    }
}
