use crate::config::LoggerConfig;
use log::LevelFilter;

pub fn level(config: &LoggerConfig) -> LevelFilter {
    if config.silent {
        LevelFilter::Error
    } else if config.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Installs an env_logger backend at the level `config` asks for. `RUST_LOG`
/// still wins when it is set. Calling this twice is harmless.
pub fn init(config: &LoggerConfig) {
    let default_filter = level(config).to_string().to_lowercase();
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .try_init();
}
