use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use quarry_project::{ProjectError, Snapshot};

/// Snapshots backed by a git repository inside the project container.
///
/// The repository exists only to make transactions recoverable: each
/// successful transaction is folded into a single commit, and a dirty
/// workspace can be rolled back with `reset --hard` plus `clean`.
#[derive(Debug)]
pub struct GitSnapshot {
    root: PathBuf,
}

impl GitSnapshot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn git(&self, args: &[&str]) -> Result<(), ProjectError> {
        let status = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|err| ProjectError::Snapshot(format!("could not run git: {err}")))?;
        if !status.success() {
            return Err(ProjectError::Snapshot(format!(
                "git {} exited with {status}",
                args.join(" ")
            )));
        }
        Ok(())
    }

    fn is_repository(root: &Path) -> bool {
        root.join(".git").exists()
    }
}

impl Snapshot for GitSnapshot {
    fn ensure_ready(&mut self) -> Result<(), ProjectError> {
        if !Self::is_repository(&self.root) {
            create_dir_all(&self.root)?;
            self.git(&["init", "--quiet"])?;
            self.git(&["add", "-A"])?;
            self.git(&[
                "commit",
                "--quiet",
                "--allow-empty",
                "-m",
                "quarry: initial snapshot",
            ])?;
        }
        Ok(())
    }

    fn commit(&mut self, message: &str) -> Result<(), ProjectError> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "--quiet", "--allow-empty", "-m", message])
    }

    fn amend(&mut self) -> Result<(), ProjectError> {
        self.git(&["add", "-A"])?;
        self.git(&[
            "commit",
            "--quiet",
            "--amend",
            "--allow-empty",
            "--no-edit",
        ])
    }

    fn reset_hard(&mut self) -> Result<(), ProjectError> {
        self.git(&["reset", "--hard", "--quiet"])
    }

    fn clean(&mut self) -> Result<(), ProjectError> {
        self.git(&["clean", "-fdq"])
    }
}

fn create_dir_all(path: &Path) -> Result<(), ProjectError> {
    std::fs::create_dir_all(path).map_err(ProjectError::Io)
}
