//! Log output setup

use std::io::Write;
use std::str::FromStr;

use log::LevelFilter;

/// Parse a level name, falling back to `info` for anything unrecognized.
///
/// Accepts the `log` crate names plus the `warning` and `critical` aliases.
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    let Some(level) = level.map(str::trim) else {
        return LevelFilter::Info;
    };
    if level.eq_ignore_ascii_case("warning") {
        return LevelFilter::Warn;
    }
    if level.eq_ignore_ascii_case("critical") {
        return LevelFilter::Error;
    }
    LevelFilter::from_str(level).unwrap_or(LevelFilter::Info)
}

/// Install the global logger as `[timestamp] LEVEL message`.
///
/// `RUST_LOG` still refines per-module filters on top of `level`.
pub fn init(level: Option<&str>) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(parse_level(level))
        // HTTP internals are noise at debug
        .filter_module("hyper", LevelFilter::Warn)
        .filter_module("reqwest", LevelFilter::Warn)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        });

    if builder.try_init().is_err() {
        log::debug!("Logger was already initialized");
    }
}
