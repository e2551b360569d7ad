//! The quarry command surface, exposed as a library so the commands can be
//! driven with injected registry, runner, and snapshot implementations.

pub mod commands;
pub mod git;
pub mod logging;
pub mod printer;

pub use commands::ExitStatus;
pub use printer::Printer;
