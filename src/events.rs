use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::AndroidUseResult;

/// Run lifecycle states the backend reports. The dashboard treats status
/// strings opaquely, so this enum only exists on the emitting side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Started,
    Running,
    Paused,
    Stopped,
    Completed,
    SwarmStarted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Started => "started",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::SwarmStarted => "swarm_started",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate swarm outcome, broadcast once after every sub-agent reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSummary {
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    /// agent name -> result text, replaces incremental accumulation.
    #[serde(default)]
    pub results: BTreeMap<String, String>,
}

/// Messages pushed to dashboard clients over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    Status {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<String>,
    },
    Update {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screenshot: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thoughts: Option<String>,
        step: u32,
        status: String,
    },
    TerminalOutput {
        line: String,
    },
    Error {
        error: String,
    },
    SwarmStep {
        agent: String,
        result: String,
    },
    SwarmResult {
        result: SwarmSummary,
    },
}

impl GatewayEvent {
    pub fn status(status: RunStatus) -> Self {
        Self::Status {
            status: status.to_string(),
            task: None,
            mode: None,
        }
    }

    pub fn status_with_task(status: RunStatus, task: impl Into<String>) -> Self {
        Self::Status {
            status: status.to_string(),
            task: Some(task.into()),
            mode: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    pub fn terminal(line: impl Into<String>) -> Self {
        Self::TerminalOutput { line: line.into() }
    }

    /// Parse one wire message. Unknown `type` tags and malformed payloads
    /// come back as an error the consumer counts as a rejected message.
    pub fn parse(text: &str) -> AndroidUseResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> AndroidUseResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
