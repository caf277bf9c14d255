//! `config.toml` for the headless previewer.

use directories::ProjectDirs;
use markpane_core::{Settings, WatcherConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the config file.
///
/// Linux: ~/.config/markpane/config.toml
/// macOS: ~/Library/Application\ Support/io.markpane.MarkPane/config.toml
/// Windows: ~\AppData\Roaming\MarkPane\MarkPane\config\config.toml
pub fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("io", "markpane", "MarkPane")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Loads the config, falling back to the defaults.
///
/// A malformed file is not fatal: the parse error is handed back so the
/// caller can report it once logging is up.
pub fn load_config(specified_config_file: Option<PathBuf>) -> (Config, Option<toml::de::Error>) {
    let Some(config_file) = specified_config_file.or_else(default_config_file) else {
        return (Config::default(), None);
    };

    let Ok(contents) = std::fs::read_to_string(&config_file) else {
        return (Config::default(), None);
    };

    match toml::from_str(&contents) {
        Ok(config) => (config, None),
        Err(err) => (Config::default(), Some(err)),
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct LogConfig {
    /// Specify the log file path.
    ///
    /// Logs go to stderr when unset.
    pub log_file: Option<String>,

    /// Specify the max log level of the markpane crates.
    pub max_level: String,

    /// Specify the log target to enable more detailed logging.
    ///
    /// Overrides `max-level` when set.
    ///
    /// ```toml
    /// [log]
    /// log-target = "markpane=debug,markpane_core::watcher=trace"
    /// ```
    pub log_target: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            max_level: "info".into(),
            log_target: "".into(),
        }
    }
}

impl LogConfig {
    /// The `EnvFilter` directive derived from this config.
    pub fn filter_directive(&self) -> String {
        if self.log_target.trim().is_empty() {
            let level = self.max_level.trim();
            format!("markpane={level},markpane_core={level}")
        } else {
            self.log_target.clone()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// Quiet period after the last file change before reloading, in milliseconds.
    pub debounce_ms: u64,

    /// Distance in pixels below the viewport top at which a heading becomes active.
    pub scroll_threshold: f64,

    /// Polling period when native file notifications are unavailable, in milliseconds.
    pub poll_interval_ms: u64,

    /// Skip native file notifications and always poll.
    pub force_polling: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        let watcher = WatcherConfig::default();
        Self {
            debounce_ms: watcher.debounce_ms,
            scroll_threshold: markpane_core::toc::DEFAULT_THRESHOLD,
            poll_interval_ms: watcher.poll_interval_ms,
            force_polling: watcher.force_polling,
        }
    }
}

impl PreviewConfig {
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            debounce_ms: self.debounce_ms,
            poll_interval_ms: self.poll_interval_ms,
            force_polling: self.force_polling,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DiagramConfig {
    /// External program turning diagram source on stdin into SVG on stdout.
    ///
    /// Diagrams are shown as source when empty.
    ///
    /// ```toml
    /// [diagram]
    /// command = ["mmdc", "--input", "-", "--output", "-", "--outputFormat", "svg"]
    /// ```
    pub command: Vec<String>,

    /// Give up on a single diagram after this many milliseconds.
    pub timeout_ms: u64,
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_ms: 10_000,
        }
    }
}

impl DiagramConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
    /// Log configuration.
    pub log: LogConfig,

    /// Live preview configuration.
    pub preview: PreviewConfig,

    /// Diagram rendering configuration.
    pub diagram: DiagramConfig,

    /// Initial theme and font settings.
    pub settings: Settings,
}
