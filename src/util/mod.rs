//! Utility modules

pub mod paths;
pub mod time;

pub use paths::{config_path, data_dir, init_data_dir, log_file_path, logs_dir, session_state_path};
pub use time::{now_ms, truncate_chars, Clock, SystemClock};
