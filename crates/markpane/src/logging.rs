use crate::config::LogConfig;
use anyhow::{anyhow, Result};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Log files past this size are truncated on startup.
const MAX_LOG_FILE_SIZE: u64 = 8 * 1024 * 1024;

/// Picks the log destination: `--log`, then `MARKPANE_LOG_PATH`, then the config.
pub fn log_path(cli_log: Option<PathBuf>, config: &LogConfig) -> Option<PathBuf> {
    cli_log
        .or_else(|| std::env::var("MARKPANE_LOG_PATH").ok().map(PathBuf::from))
        .or_else(|| config.log_file.as_ref().map(PathBuf::from))
}

fn env_filter(config: &LogConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directive()))
        .map_err(|err| anyhow!("invalid log filter: {err}"))
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer and must be held until exit.
pub fn init(log_path: Option<&Path>, config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = env_filter(config)?;

    let Some(log_path) = log_path else {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(None);
    };

    if let Ok(metadata) = std::fs::metadata(log_path) {
        if log_path.is_file() && metadata.len() > MAX_LOG_FILE_SIZE {
            std::fs::remove_file(log_path)?;
        }
    }

    let file_name = log_path
        .file_name()
        .ok_or_else(|| anyhow!("no file name in {log_path:?}"))?;

    let directory = log_path
        .parent()
        .ok_or_else(|| anyhow!("{log_path:?} has no parent"))?;

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_line_number(true)
        .with_writer(non_blocking)
        .with_ansi(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path_precedence() {
        let config = LogConfig {
            log_file: Some("/tmp/from-config.log".into()),
            ..Default::default()
        };

        assert_eq!(
            log_path(Some(PathBuf::from("/tmp/cli.log")), &config),
            Some(PathBuf::from("/tmp/cli.log"))
        );

        if std::env::var_os("MARKPANE_LOG_PATH").is_none() {
            assert_eq!(
                log_path(None, &config),
                Some(PathBuf::from("/tmp/from-config.log"))
            );
            assert_eq!(log_path(None, &LogConfig::default()), None);
        }
    }

    #[test]
    fn test_env_filter_from_config() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(env_filter(&LogConfig::default()).is_ok());
            let broken = LogConfig {
                log_target: "markpane=verbose".into(),
                ..Default::default()
            };
            assert!(env_filter(&broken).is_err());
        }
    }
}
