use std::path::{Path, PathBuf};

use crate::ProjectError;

/// The directory layout of a project, relative to its root:
///
/// ```text
/// <root>/quarry.json          the manifest
/// <root>/quarry-lock.json     the lock
/// <root>/.quarry/install/     the tree builds install into
/// <root>/.quarry/build/       per-package download/source/build/logs dirs
/// <root>/.quarry/temp/        backup staging during transactions
/// <root>/.quarry/.dirty       present while a transaction is in flight
/// ```
#[derive(Clone, Debug)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("quarry.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join("quarry-lock.json")
    }

    pub fn container_dir(&self) -> PathBuf {
        self.root.join(".quarry")
    }

    pub fn install_dir(&self) -> PathBuf {
        self.container_dir().join("install")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.container_dir().join("build")
    }

    pub fn source_dir(&self) -> PathBuf {
        self.build_dir().join("source")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.container_dir().join("temp")
    }

    /// The backup staging directory for one package.
    pub fn package_temp_dir(&self, package: &str) -> PathBuf {
        self.temp_dir().join(package)
    }

    pub fn dirty_path(&self) -> PathBuf {
        self.container_dir().join(".dirty")
    }

    /// Creates the directory skeleton; idempotent.
    pub fn ensure_skeleton(&self) -> Result<(), ProjectError> {
        for dir in [
            self.install_dir(),
            self.build_dir(),
            self.source_dir(),
            self.temp_dir(),
        ] {
            fs_err::create_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_path().exists()
    }

    /// Marks a transaction as in flight.
    pub fn mark_dirty(&self) -> Result<(), ProjectError> {
        fs_err::create_dir_all(self.container_dir())?;
        fs_err::write(self.dirty_path(), b"")?;
        Ok(())
    }

    pub fn clear_dirty(&self) -> Result<(), ProjectError> {
        let path = self.dirty_path();
        if path.exists() {
            fs_err::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skeleton_and_dirty_marker() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        layout.ensure_skeleton().unwrap();
        assert!(layout.install_dir().is_dir());
        assert!(layout.temp_dir().is_dir());

        assert!(!layout.is_dirty());
        layout.mark_dirty().unwrap();
        assert!(layout.is_dirty());
        layout.clear_dirty().unwrap();
        assert!(!layout.is_dirty());
        // Clearing twice is fine.
        layout.clear_dirty().unwrap();
    }
}
