use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::events::RunStatus;

/// Record of a single reasoning/action step.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStep {
    pub step_num: u32,
    pub timestamp: DateTime<Utc>,
    /// Registered action name, or "error" when the step failed before an
    /// action was chosen.
    pub action: String,
    pub params: serde_json::Value,
    pub reasoning: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_secs: f64,
}

impl AgentStep {
    /// "success" or the failure text, the way the model sees prior outcomes.
    pub fn outcome(&self) -> &str {
        if self.success {
            "success"
        } else {
            self.error.as_deref().unwrap_or("failed")
        }
    }
}

/// Final report of one agent run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRunResult {
    pub task: String,
    pub status: RunStatus,
    pub steps: Vec<AgentStep>,
    pub total_steps: u32,
    pub total_time_secs: f64,
    pub success: bool,
    pub final_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_prefers_error_text_on_failure() {
        let mut step = AgentStep {
            step_num: 1,
            timestamp: Utc::now(),
            action: "tap".into(),
            params: serde_json::json!({"x": 1, "y": 2}),
            reasoning: "tapping".into(),
            success: true,
            error: None,
            duration_secs: 0.5,
        };
        assert_eq!(step.outcome(), "success");
        step.success = false;
        step.error = Some("element vanished".into());
        assert_eq!(step.outcome(), "element vanished");
        step.error = None;
        assert_eq!(step.outcome(), "failed");
    }
}
