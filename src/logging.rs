//! Thin wrapper around `tracing` so call sites read `Logger::info(...)`
//! instead of depending on the tracing macros directly.

use tracing::{error, info, warn};

pub struct Logger;

impl Logger {
    pub fn init() {
        tracing_subscriber::fmt()
            .with_env_filter("wu=info")
            .with_target(false)
            .without_time()
            .init();
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("{}", msg);
    }

    pub fn error(msg: &str) {
        error!("{}", msg);
    }
}
