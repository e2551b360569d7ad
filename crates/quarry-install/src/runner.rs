use std::path::Path;
use std::process::{Command, ExitStatus};

/// Executes install scripts.
///
/// The runner streams the script's stdout and stderr through and reports the
/// exit status; it must not touch the install tree other than by executing
/// the script.
pub trait ShellRunner {
    fn run(&mut self, script: &Path) -> std::io::Result<ExitStatus>;
}

/// Runs scripts as child processes with inherited standard streams.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ShellRunner for ProcessRunner {
    fn run(&mut self, script: &Path) -> std::io::Result<ExitStatus> {
        tracing::debug!("running install script {}", script.display());
        Command::new(script).status()
    }
}
