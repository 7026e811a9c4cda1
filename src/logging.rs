use env_logger::{Builder, Env, Target};

pub const LOG_ENV: &str = "LICHESS_ELITE_LOG";
pub const DEFAULT_LEVEL: &str = "info";

/// Installs the process-wide logger. Level comes from `LICHESS_ELITE_LOG`
/// (`error`, `warn`, `info`, `debug`, or an env_logger filter string).
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { DEFAULT_LEVEL };
    let mut builder = Builder::from_env(Env::new().filter_or(LOG_ENV, default_level));
    builder.target(Target::Stderr).format_timestamp_secs();
    // A second init (e.g. from tests) keeps the first logger.
    let _ = builder.try_init();
}
