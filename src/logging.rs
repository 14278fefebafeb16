use std::io::Write;

use chrono::Local;
use env_logger::Builder;
use log::{LevelFilter, SetLoggerError};

/// Install the process-wide logger. `level` is the default filter;
/// `RUST_LOG` overrides it per module.
pub fn init_logging(level: LevelFilter) -> Result<(), SetLoggerError> {
    Builder::new()
        .filter_level(level)
        // bluest is chatty at debug level
        .filter_module("bluest", LevelFilter::Warn.min(level))
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()
}
