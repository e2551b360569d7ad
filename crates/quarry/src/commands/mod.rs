use std::process::ExitCode;

pub use init::init;
pub use install::{install, InstallOptions};
pub use list::list;
pub use uninstall::{uninstall, UninstallOptions};
pub use use_flags::{use_flags, UseFlagsOptions};

mod init;
mod install;
mod list;
mod uninstall;
mod use_flags;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    /// The command succeeded (including "nothing to do").
    Success,
    /// The command failed due to the user's input or an unsatisfiable
    /// problem.
    Failure,
    /// The command failed with an unexpected error.
    Error,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => ExitCode::from(0),
            ExitStatus::Failure => ExitCode::from(1),
            ExitStatus::Error => ExitCode::from(2),
        }
    }
}
