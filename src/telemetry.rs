//! Logging initialization.
//!
//! Plain `env_logger` on stdout. The default verbosity follows the app
//! environment (production is quieter); `RUST_LOG` overrides both.

use crate::config::Environment;

pub fn init(env: &Environment) {
    let default_filter = if env.is_production() { "info" } else { "debug" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}
