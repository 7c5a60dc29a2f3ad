use serde::{Deserialize, Serialize};

use crate::capture::VideoBlob;
use crate::config::NetworkConfig;
use crate::console::ConsoleEntry;
use crate::network::{NetworkCorrelator, NetworkExchange};
use crate::page::ActionEvent;

/// Buffered logs of one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLogs {
    pub console_logs: Vec<ConsoleEntry>,
    pub network_logs: Vec<NetworkExchange>,
    pub actions: Vec<ActionEvent>,
}

/// Consolidated output of a session, handed to the report renderer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBundle {
    pub video: Option<VideoBlob>,
    pub console_logs: Vec<ConsoleEntry>,
    pub network_logs: Vec<NetworkExchange>,
    pub actions: Vec<ActionEvent>,
}

impl SessionBundle {
    pub fn new(video: Option<VideoBlob>, logs: SessionLogs) -> Self {
        Self {
            video,
            console_logs: logs.console_logs,
            network_logs: logs.network_logs,
            actions: logs.actions,
        }
    }

    pub fn has_video(&self) -> bool {
        self.video.as_ref().is_some_and(|video| !video.is_empty())
    }
}

/// Append-only logs the coordinator accumulates while a session runs
#[derive(Debug)]
pub(crate) struct LogBuffer {
    pub console: Vec<ConsoleEntry>,
    pub actions: Vec<ActionEvent>,
    pub network: NetworkCorrelator,
}

impl LogBuffer {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            console: Vec::new(),
            actions: Vec::new(),
            network: NetworkCorrelator::new(config),
        }
    }

    pub fn clear(&mut self) {
        self.console.clear();
        self.actions.clear();
        self.network.clear();
    }

    pub fn snapshot(&self) -> SessionLogs {
        SessionLogs {
            console_logs: self.console.clone(),
            network_logs: self.network.snapshot(),
            actions: self.actions.clone(),
        }
    }

    pub fn take(&mut self) -> SessionLogs {
        SessionLogs {
            console_logs: std::mem::take(&mut self.console),
            network_logs: self.network.drain(),
            actions: std::mem::take(&mut self.actions),
        }
    }
}
