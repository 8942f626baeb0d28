use crate::config::LoggingConfig;
use anyhow::Context;
use std::path::PathBuf;

pub fn parse_level(level: &str) -> anyhow::Result<log::LevelFilter> {
    level
        .parse::<log::LevelFilter>()
        .with_context(|| format!("Invalid log level: {}", level))
}

/// Route log records to stderr, or to a file when one is configured. The
/// table itself owns stdout, so logs never go there.
pub fn setup_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = parse_level(&config.level)?;
    let log_file = std::env::var("JOBTABLE_LOG")
        .ok()
        .map(PathBuf::from)
        .or_else(|| config.output.clone());

    let base_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Warn)
        .level_for("jobtable", level)
        .level_for("jobtable_common", level);

    let output = match log_file {
        Some(path) => fern::Dispatch::new().chain(
            fern::log_file(&path).with_context(|| format!("Failed to open log file: {:?}", path))?,
        ),
        None => fern::Dispatch::new().chain(std::io::stderr()),
    };

    base_config.chain(output).apply()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!(parse_level("debug").unwrap(), log::LevelFilter::Debug);
        assert_eq!(parse_level("WARN").unwrap(), log::LevelFilter::Warn);
        assert!(parse_level("chatty").is_err());
    }
}
