#![allow(dead_code)]

use log::LevelFilter;
use std::sync::Once;

static LOGGER: Once = Once::new();

/// Initializes `env_logger` once per test binary, matching the logging
/// style every module's own fallible boundary writes through.
pub fn enable_logging() {
    LOGGER.call_once(|| {
        env_logger::Builder::new().filter(None, LevelFilter::Warn).init();
    });
}
