//! The transactional installer: executes a plan action by action, framing
//! every build with file backups and a filesystem monitor so a failure can
//! roll the install tree back to its pre-transaction state.

pub use crate::error::InstallError;
pub use crate::fsmonitor::FsMonitor;
pub use crate::installer::{InstallReport, Installer};
pub use crate::runner::{ProcessRunner, ShellRunner};
pub use crate::script::assemble_install_script;
pub use crate::uninstall::{uninstall, UninstallReport};

mod error;
mod fsmonitor;
mod installer;
mod runner;
mod script;
mod uninstall;
