use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Display and transport knobs for one debugging session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Omit numeric ids (process, breakpoint, function) from rendered text.
    pub hide_raw_ids: bool,
    /// Render without ANSI colour escapes.
    pub colors_disabled: bool,
    /// Suppress the program's standard output.
    pub silent: bool,
    pub show_internal_frames: bool,
    pub verbose: bool,
    /// Capacity of the decoded-message queue between the reader task and
    /// the session.
    pub incoming_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hide_raw_ids: false,
            colors_disabled: false,
            silent: false,
            show_internal_frames: false,
            verbose: false,
            incoming_buffer: 64,
        }
    }
}

impl SessionConfig {
    pub fn channel_config(&self) -> bvm_wire::ChannelConfig {
        bvm_wire::ChannelConfig {
            incoming_buffer: self.incoming_buffer,
            silence_stdout: self.silent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or an `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    fn default_level() -> String {
        "warn".to_owned()
    }

    /// `level` as filter directives. Bare level names are case-insensitive
    /// and `warning` is accepted; anything else is used verbatim.
    fn directives(&self) -> String {
        let level = self.level.trim();
        if level.is_empty() {
            return Self::default_level();
        }
        match level.to_ascii_lowercase().as_str() {
            lower @ ("trace" | "debug" | "info" | "warn" | "error") => lower.to_owned(),
            "warning" => "warn".to_owned(),
            _ => level.to_owned(),
        }
    }

    /// The configured directives followed by `overrides`, so the overrides win
    /// per target. An unparsable combination falls back to `warn`.
    fn filter_with(&self, overrides: Option<&str>) -> EnvFilter {
        let mut directives = self.directives();
        if let Some(extra) = overrides.map(str::trim).filter(|extra| !extra.is_empty()) {
            directives.push(',');
            directives.push_str(extra);
        }
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("warn"))
    }

    /// The configured level with `RUST_LOG` layered on top.
    pub fn env_filter(&self) -> EnvFilter {
        self.filter_with(std::env::var("RUST_LOG").ok().as_deref())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugConfig {
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(#[from] toml::de::Error),
}

impl DebugConfig {
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }
}

/// Installs the global `tracing` subscriber, writing to stderr. Safe to call
/// more than once; later calls are no-ops.
pub fn init_tracing(logging: &LoggingConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(logging.env_filter())
        .with_writer(std::io::stderr)
        .with_target(true);
    let res = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(err) = res {
        tracing::debug!(target: "bvm.debug", error = %err, "tracing subscriber already installed");
    }
}
