use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Default,
    Verbose,
}

/// Initializes tracing to stderr; `QUARRY_LOG` overrides the default level.
pub fn setup_logging(level: Level) {
    let default_level = match level {
        Level::Default => LevelFilter::WARN,
        Level::Verbose => LevelFilter::DEBUG,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("QUARRY_LOG")
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
