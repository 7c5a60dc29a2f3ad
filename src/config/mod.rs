//! Configuration loading

mod settings;

pub use settings::{
    CaptureConfig, CaptureTopology, Config, ConfigError, NetworkConfig, RecorderConfig,
    TimingConfig, EXAMPLE_CONFIG,
};
