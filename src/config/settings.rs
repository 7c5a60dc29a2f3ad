use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::network::ResourceType;
use crate::util::paths::config_path;

/// Example configuration file contents
pub const EXAMPLE_CONFIG: &str = r#"# bugreel configuration
#
# topology = "worker"          # "worker" or "in-page"
# self_log_prefix = "[BUGREEL"
#
# [timing]
# teardown_grace_ms = 60000
# ping_timeout_ms = 1000
# inject_settle_ms = 100
# worker_stop_timeout_ms = 30000
# picker_timeout_ms = 120000
#
# [recorder]
# typing_debounce_ms = 300
# navigation_settle_ms = 100
# value_max_chars = 100
# readable_name_max_chars = 50
# redaction_marker = "***"
#
# [capture]
# format_candidates = ["video/webm;codecs=vp9", "video/webm;codecs=vp8", "video/webm"]
# fallback_format = "video/webm"
#
# [network]
# static_resource_types = ["Script", "Stylesheet", "Document", "Image", "Font", "Media", "Other"]
# page_body_max_chars = 10000
"#;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Where the live capture stream is held during a session.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureTopology {
    /// A dedicated media capture worker context provisioned by the coordinator.
    #[default]
    Worker,
    /// The observed tab holds the stream itself behind a gesture-gated prompt.
    InPage,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub topology: CaptureTopology,
    /// Console lines starting with this prefix are our own diagnostics
    pub self_log_prefix: String,
    pub timing: TimingConfig,
    pub recorder: RecorderConfig,
    pub capture: CaptureConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct TimingConfig {
    /// Grace window before the worker context is torn down after a stop
    pub teardown_grace: Duration,
    /// How long a liveness ping to the tab observer may take
    pub ping_timeout: Duration,
    /// Pause after injecting the observer so it can initialize
    pub inject_settle: Duration,
    /// Upper bound on a stop request to the capture worker
    pub worker_stop_timeout: Duration,
    /// Upper bound on waiting for the user to answer the capture picker
    pub picker_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub typing_debounce: Duration,
    pub navigation_settle: Duration,
    pub value_max_chars: usize,
    pub readable_name_max_chars: usize,
    pub redaction_marker: String,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Encoding formats probed in order; the first supported one wins
    pub format_candidates: Vec<String>,
    /// Used when no candidate is supported
    pub fallback_format: String,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Resource types whose bodies are never fetched
    pub static_resource_types: Vec<ResourceType>,
    /// Cap on bodies delivered by page-level hooks
    pub page_body_max_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topology: CaptureTopology::Worker,
            self_log_prefix: "[BUGREEL".to_string(),
            timing: TimingConfig::default(),
            recorder: RecorderConfig::default(),
            capture: CaptureConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            teardown_grace: Duration::from_secs(60),
            ping_timeout: Duration::from_millis(1000),
            inject_settle: Duration::from_millis(100),
            worker_stop_timeout: Duration::from_secs(30),
            picker_timeout: None,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            typing_debounce: Duration::from_millis(300),
            navigation_settle: Duration::from_millis(100),
            value_max_chars: 100,
            readable_name_max_chars: 50,
            redaction_marker: "***".to_string(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            format_candidates: vec![
                "video/webm;codecs=vp9".to_string(),
                "video/webm;codecs=vp8".to_string(),
                "video/webm".to_string(),
            ],
            fallback_format: "video/webm".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            static_resource_types: vec![
                ResourceType::Script,
                ResourceType::Stylesheet,
                ResourceType::Document,
                ResourceType::Image,
                ResourceType::Font,
                ResourceType::Media,
                ResourceType::Other,
            ],
            page_body_max_chars: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlTimingConfig {
    pub teardown_grace_ms: Option<u64>,
    pub ping_timeout_ms: Option<u64>,
    pub inject_settle_ms: Option<u64>,
    pub worker_stop_timeout_ms: Option<u64>,
    pub picker_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlRecorderConfig {
    pub typing_debounce_ms: Option<u64>,
    pub navigation_settle_ms: Option<u64>,
    pub value_max_chars: Option<usize>,
    pub readable_name_max_chars: Option<usize>,
    pub redaction_marker: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlCaptureConfig {
    pub format_candidates: Option<Vec<String>>,
    pub fallback_format: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlNetworkConfig {
    pub static_resource_types: Option<Vec<ResourceType>>,
    pub page_body_max_chars: Option<usize>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub topology: Option<CaptureTopology>,
    pub self_log_prefix: Option<String>,
    pub timing: Option<TomlTimingConfig>,
    pub recorder: Option<TomlRecorderConfig>,
    pub capture: Option<TomlCaptureConfig>,
    pub network: Option<TomlNetworkConfig>,
}

impl Config {
    /// Load configuration from ~/.bugreel/config.toml, falling back to defaults
    pub fn load() -> Self {
        let config_file = config_path();

        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        match Self::load_from_path(&config_file) {
            Ok(config) => config,
            Err(ConfigError::Read(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Config::default()
            }
            Err(err) => {
                tracing::warn!(
                    path = %config_file.display(),
                    error = %err,
                    "Ignoring unreadable config file"
                );
                Config::default()
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse a TOML document and merge it over the defaults
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let toml_config = toml::from_str::<TomlConfig>(contents)?;
        let mut config = Config::default();
        config.merge(toml_config);
        Ok(config)
    }

    fn merge(&mut self, toml_config: TomlConfig) {
        if let Some(topology) = toml_config.topology {
            self.topology = topology;
        }
        if let Some(prefix) = toml_config.self_log_prefix {
            self.self_log_prefix = prefix;
        }

        if let Some(timing) = toml_config.timing {
            if let Some(ms) = timing.teardown_grace_ms {
                self.timing.teardown_grace = Duration::from_millis(ms);
            }
            if let Some(ms) = timing.ping_timeout_ms {
                self.timing.ping_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = timing.inject_settle_ms {
                self.timing.inject_settle = Duration::from_millis(ms);
            }
            if let Some(ms) = timing.worker_stop_timeout_ms {
                self.timing.worker_stop_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = timing.picker_timeout_ms {
                self.timing.picker_timeout = Some(Duration::from_millis(ms));
            }
        }

        if let Some(recorder) = toml_config.recorder {
            if let Some(ms) = recorder.typing_debounce_ms {
                self.recorder.typing_debounce = Duration::from_millis(ms);
            }
            if let Some(ms) = recorder.navigation_settle_ms {
                self.recorder.navigation_settle = Duration::from_millis(ms);
            }
            if let Some(max) = recorder.value_max_chars {
                self.recorder.value_max_chars = max;
            }
            if let Some(max) = recorder.readable_name_max_chars {
                self.recorder.readable_name_max_chars = max;
            }
            if let Some(marker) = recorder.redaction_marker {
                self.recorder.redaction_marker = marker;
            }
        }

        if let Some(capture) = toml_config.capture {
            if let Some(candidates) = capture.format_candidates {
                self.capture.format_candidates = candidates;
            }
            if let Some(fallback) = capture.fallback_format {
                self.capture.fallback_format = fallback;
            }
        }

        if let Some(network) = toml_config.network {
            if let Some(types) = network.static_resource_types {
                self.network.static_resource_types = types;
            }
            if let Some(max) = network.page_body_max_chars {
                self.network.page_body_max_chars = max;
            }
        }
    }

    fn create_default_config(path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                tracing::debug!(error = %err, "Failed to create config directory");
                return;
            }
        }
        if let Err(err) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::debug!(error = %err, "Failed to write example config");
        }
    }
}
