use std::collections::BTreeSet;
use std::path::Path;

use walkdir::WalkDir;

use crate::InstallError;

/// Records which files a build step creates under the install root.
///
/// [`FsMonitor::begin`] snapshots a sorted set of relative file paths;
/// [`FsMonitor::end`] re-enumerates and reports the paths that newly
/// appeared. Directories are implicit and file contents are never examined.
#[derive(Debug)]
pub struct FsMonitor {
    before: BTreeSet<String>,
}

impl FsMonitor {
    pub fn begin(install_root: &Path) -> Result<Self, InstallError> {
        Ok(Self {
            before: list_files(install_root)?,
        })
    }

    /// The files present now that were not present at `begin`, sorted.
    pub fn end(self, install_root: &Path) -> Result<Vec<String>, InstallError> {
        let after = list_files(install_root)?;
        Ok(after.difference(&self.before).cloned().collect())
    }
}

/// Every file (not directory) below `root`, as sorted slash-separated paths
/// relative to `root`.
fn list_files(root: &Path) -> Result<BTreeSet<String>, InstallError> {
    let mut files = BTreeSet::new();
    if !root.exists() {
        return Ok(files);
    }
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            InstallError::Io(err.into_io_error().unwrap_or_else(|| {
                std::io::Error::other("walk of the install tree failed")
            }))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .expect("walked entries live below the root");
        files.insert(path_to_slash(relative));
    }
    Ok(files)
}

fn path_to_slash(path: &Path) -> String {
    let mut result = String::new();
    for component in path.components() {
        if !result.is_empty() {
            result.push('/');
        }
        result.push_str(&component.as_os_str().to_string_lossy());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_only_newly_appeared_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs_err::create_dir_all(root.join("bin")).unwrap();
        fs_err::write(root.join("bin/old"), b"old").unwrap();

        let monitor = FsMonitor::begin(root).unwrap();
        fs_err::write(root.join("bin/new"), b"new").unwrap();
        fs_err::create_dir_all(root.join("lib")).unwrap();
        fs_err::write(root.join("lib/libnew.so"), b"so").unwrap();

        let diff = monitor.end(root).unwrap();
        assert_eq!(diff, vec!["bin/new".to_string(), "lib/libnew.so".to_string()]);
    }

    #[test]
    fn modified_files_are_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs_err::write(root.join("config"), b"one").unwrap();

        let monitor = FsMonitor::begin(root).unwrap();
        fs_err::write(root.join("config"), b"two").unwrap();

        assert!(monitor.end(root).unwrap().is_empty());
    }

    #[test]
    fn missing_root_is_an_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("not-created-yet");
        let monitor = FsMonitor::begin(&root).unwrap();
        fs_err::create_dir_all(&root).unwrap();
        fs_err::write(root.join("file"), b"x").unwrap();
        assert_eq!(monitor.end(&root).unwrap(), vec!["file".to_string()]);
    }
}
