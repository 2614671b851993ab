use std::io::{self, IsTerminal};
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;

/// Installs the global logger. Logs go to stderr so that command output on stdout
/// stays machine readable.
pub fn init(level: &str) -> Result<()> {
    let level = parse_level(level)?;

    let is_terminal = io::stderr().is_terminal();
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .debug(Color::Magenta)
        .trace(Color::BrightBlack);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let now = humantime::format_rfc3339_millis(SystemTime::now());
            if is_terminal {
                out.finish(format_args!(
                    "{now} [{}] {message}",
                    colors.color(record.level())
                ))
            } else {
                out.finish(format_args!("{now} [{}] {message}", record.level()))
            }
        })
        .level(level)
        .chain(io::stderr())
        .apply()
        .context("init logger")?;

    Ok(())
}

fn parse_level(level: &str) -> Result<LevelFilter> {
    Ok(match level {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => bail!("unknown log level '{level}'"),
    })
}
