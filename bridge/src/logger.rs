use std::env;
use std::io::{self, Write as _};
use std::str::FromStr;

pub const LOG_VAR: &str = "BRIDGE_LOG";

/// writes to stderr; the host process usually owns stdout.
pub struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        eprintln!(
            "{level:<5} {file}:{line} > {text}",
            level = record.level(),
            file = record.file().unwrap_or_else(|| record.target()),
            line = record
                .line()
                .map_or_else(|| "??".to_string(), |line| line.to_string()),
            text = record.args(),
        );
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

impl Logger {
    /// a host that installed its own logger keeps it.
    pub fn init(level: log::LevelFilter) {
        if log::set_logger(&Logger).is_ok() {
            log::set_max_level(level);
        }
    }
}

pub fn level_from_env() -> log::LevelFilter {
    parse_level(env::var(LOG_VAR).ok().as_deref())
}

fn parse_level(value: Option<&str>) -> log::LevelFilter {
    value
        .and_then(|value| log::LevelFilter::from_str(value).ok())
        .unwrap_or(log::LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels() {
        assert_eq!(parse_level(None), log::LevelFilter::Info);
        assert_eq!(parse_level(Some("debug")), log::LevelFilter::Debug);
        assert_eq!(parse_level(Some("OFF")), log::LevelFilter::Off);
        assert_eq!(parse_level(Some("loud")), log::LevelFilter::Info);
    }
}
