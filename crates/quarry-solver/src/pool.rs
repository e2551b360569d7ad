use rustc_hash::FxHashMap;

use quarry_version::{Range, Version};

use crate::arena::Arena;
use crate::ids::{NameId, SolvableId, StringId, VersionSetId};

/// A candidate tracked by the pool: either the synthetic root or a concrete
/// `(name, version)` pair.
#[derive(Clone, Debug)]
pub enum Solvable {
    Root,
    Package(PackageSolvable),
}

#[derive(Clone, Debug)]
pub struct PackageSolvable {
    pub name: NameId,
    pub version: Version,
}

impl Solvable {
    pub fn package(&self) -> Option<&PackageSolvable> {
        match self {
            Self::Root => None,
            Self::Package(package) => Some(package),
        }
    }
}

/// Interning arenas for names, strings, candidates, and requirements.
///
/// Equal values intern to equal ids; ids are dense `u32`s handed out
/// consecutively and live for the whole solve.
pub struct Pool {
    solvables: Arena<SolvableId, Solvable>,
    names: Arena<NameId, String>,
    names_by_value: FxHashMap<String, NameId>,
    strings: Arena<StringId, String>,
    strings_by_value: FxHashMap<String, StringId>,
    version_sets: Arena<VersionSetId, (NameId, Range)>,
    version_sets_by_value: FxHashMap<(NameId, Range), VersionSetId>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    pub fn new() -> Self {
        let mut pool = Self {
            solvables: Arena::new(),
            names: Arena::new(),
            names_by_value: FxHashMap::default(),
            strings: Arena::new(),
            strings_by_value: FxHashMap::default(),
            version_sets: Arena::new(),
            version_sets_by_value: FxHashMap::default(),
        };
        let root = pool.solvables.alloc(Solvable::Root);
        debug_assert!(root.is_root());
        pool
    }

    pub fn intern_name(&mut self, name: &str) -> NameId {
        if let Some(&id) = self.names_by_value.get(name) {
            return id;
        }
        let id = self.names.alloc(name.to_string());
        self.names_by_value.insert(name.to_string(), id);
        id
    }

    pub fn lookup_name(&self, name: &str) -> Option<NameId> {
        self.names_by_value.get(name).copied()
    }

    pub fn resolve_name(&self, id: NameId) -> &str {
        &self.names[id]
    }

    pub fn intern_string(&mut self, value: &str) -> StringId {
        if let Some(&id) = self.strings_by_value.get(value) {
            return id;
        }
        let id = self.strings.alloc(value.to_string());
        self.strings_by_value.insert(value.to_string(), id);
        id
    }

    pub fn resolve_string(&self, id: StringId) -> &str {
        &self.strings[id]
    }

    pub fn intern_version_set(&mut self, name: NameId, range: Range) -> VersionSetId {
        let key = (name, range);
        if let Some(&id) = self.version_sets_by_value.get(&key) {
            return id;
        }
        let id = self.version_sets.alloc(key.clone());
        self.version_sets_by_value.insert(key, id);
        id
    }

    pub fn version_set_name(&self, id: VersionSetId) -> NameId {
        self.version_sets[id].0
    }

    pub fn version_set_range(&self, id: VersionSetId) -> &Range {
        &self.version_sets[id].1
    }

    pub fn intern_solvable(&mut self, name: NameId, version: Version) -> SolvableId {
        self.solvables
            .alloc(Solvable::Package(PackageSolvable { name, version }))
    }

    pub fn resolve_solvable(&self, id: SolvableId) -> &Solvable {
        &self.solvables[id]
    }

    /// The name of a solvable; `None` for the root.
    pub fn solvable_name(&self, id: SolvableId) -> Option<NameId> {
        self.resolve_solvable(id).package().map(|p| p.name)
    }

    pub fn solvable_count(&self) -> usize {
        self.solvables.len()
    }

    pub fn display_solvable(&self, id: SolvableId) -> String {
        match self.resolve_solvable(id) {
            Solvable::Root => "<root>".to_string(),
            Solvable::Package(package) => {
                format!("{} {}", self.resolve_name(package.name), package.version)
            }
        }
    }

    pub fn display_version_set(&self, id: VersionSetId) -> String {
        let (name, range) = &self.version_sets[id];
        format!("{} {}", self.resolve_name(*name), range)
    }
}
