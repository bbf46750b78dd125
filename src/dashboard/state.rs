use chrono::{DateTime, Utc};

use crate::events::GatewayEvent;
use crate::memory::MemoryStats;

/// One timestamped activity-log line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub text: String,
}

/// What the main pane should show for the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    SwarmGrid,
    Screenshot,
    Terminal,
    Waiting,
}

/// Whether an inbound frame was applied or rejected at the parse boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Applied,
    Rejected,
}

/// The whole dashboard view state. Mutated only by [`apply_event`] and the
/// explicit clear operations, so every transition is unit-testable without a
/// live gateway.
///
/// [`apply_event`]: DashboardState::apply_event
#[derive(Debug, Clone)]
pub struct DashboardState {
    /// Backend status string, displayed as-is (uppercased by the renderer).
    pub status: String,
    pub current_task: Option<String>,
    pub mode: Option<String>,
    pub step_count: u32,
    /// Base64 PNG of the most recent non-empty frame.
    pub last_screenshot: Option<String>,
    pub last_thought: Option<String>,
    /// Sub-agent reports in receipt order until an aggregate replaces them.
    pub swarm_results: Vec<(String, String)>,
    pub logs: Vec<LogEntry>,
    pub terminal: Vec<String>,
    /// Latest successful stats poll; kept stale across failed polls.
    pub stats: MemoryStats,
    pub rejected_count: u64,
    log_cap: usize,
}

impl DashboardState {
    pub fn new(log_cap: usize) -> Self {
        Self {
            status: "idle".into(),
            current_task: None,
            mode: None,
            step_count: 0,
            last_screenshot: None,
            last_thought: None,
            swarm_results: Vec::new(),
            logs: Vec::new(),
            terminal: Vec::new(),
            stats: MemoryStats::default(),
            rejected_count: 0,
            log_cap: log_cap.max(1),
        }
    }

    /// Parse one wire frame and apply it. Unknown types and malformed
    /// payloads leave the state untouched apart from the rejected counter.
    pub fn apply_message(&mut self, text: &str) -> MessageOutcome {
        match GatewayEvent::parse(text) {
            Ok(event) => {
                self.apply_event(event);
                MessageOutcome::Applied
            }
            Err(e) => {
                tracing::warn!(error = %e, "gateway message rejected");
                self.rejected_count += 1;
                MessageOutcome::Rejected
            }
        }
    }

    pub fn apply_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Status { status, task, mode } => {
                if status == "swarm_started" {
                    self.swarm_results.clear();
                }
                if status == "started" {
                    self.terminal.clear();
                }
                if let Some(task) = task {
                    self.current_task = Some(task);
                }
                if let Some(mode) = mode {
                    self.mode = Some(mode);
                }
                self.status = status;
            }
            GatewayEvent::Update {
                screenshot,
                thoughts,
                step,
                status,
            } => {
                // Sticky frame: an absent or empty screenshot keeps the
                // previous one on screen.
                if let Some(shot) = screenshot.filter(|s| !s.is_empty()) {
                    self.last_screenshot = Some(shot);
                }
                if let Some(thoughts) = thoughts.filter(|t| !t.is_empty()) {
                    self.push_log(format!("Agent: {thoughts}"));
                    self.last_thought = Some(thoughts);
                }
                self.step_count = step;
                self.status = status;
            }
            GatewayEvent::TerminalOutput { line } => {
                self.push_terminal(line);
            }
            GatewayEvent::Error { error } => {
                self.push_log(format!("Error: {error}"));
                self.push_terminal(format!("[error] {error}"));
            }
            GatewayEvent::SwarmStep { agent, result } => {
                self.push_log(format!("Swarm [{agent}]: {result}"));
                self.swarm_results.push((agent, result));
            }
            GatewayEvent::SwarmResult { result } => {
                // The aggregate mapping wins over incremental accumulation;
                // an empty one keeps what the steps reported.
                if !result.results.is_empty() {
                    self.swarm_results = result.results.into_iter().collect();
                }
                self.status = "completed".into();
            }
        }
    }

    /// Which pane the renderer shows. Swarm output wins over everything,
    /// then the live frame, then raw terminal output.
    pub fn view(&self) -> View {
        if self.status.contains("swarm") || !self.swarm_results.is_empty() {
            View::SwarmGrid
        } else if self.last_screenshot.is_some() {
            View::Screenshot
        } else if !self.terminal.is_empty() {
            View::Terminal
        } else {
            View::Waiting
        }
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    pub fn clear_terminal(&mut self) {
        self.terminal.clear();
    }

    pub fn push_log(&mut self, text: impl Into<String>) {
        self.logs.push(LogEntry {
            at: Utc::now(),
            text: text.into(),
        });
        if self.logs.len() > self.log_cap {
            let excess = self.logs.len() - self.log_cap;
            self.logs.drain(..excess);
        }
    }

    fn push_terminal(&mut self, line: impl Into<String>) {
        self.terminal.push(line.into());
        if self.terminal.len() > self.log_cap {
            let excess = self.terminal.len() - self.log_cap;
            self.terminal.drain(..excess);
        }
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::events::SwarmSummary;

    fn update(screenshot: Option<&str>, thoughts: Option<&str>, step: u32) -> GatewayEvent {
        GatewayEvent::Update {
            screenshot: screenshot.map(String::from),
            thoughts: thoughts.map(String::from),
            step,
            status: "running".into(),
        }
    }

    fn status(status: &str) -> GatewayEvent {
        GatewayEvent::Status {
            status: status.into(),
            task: None,
            mode: None,
        }
    }

    #[test]
    fn screenshot_sticks_until_a_nonempty_frame_arrives() {
        let mut state = DashboardState::default();
        state.apply_event(update(Some("frame-a"), None, 1));
        assert_eq!(state.last_screenshot.as_deref(), Some("frame-a"));

        state.apply_event(update(None, None, 2));
        assert_eq!(state.last_screenshot.as_deref(), Some("frame-a"));

        state.apply_event(update(Some(""), None, 3));
        assert_eq!(state.last_screenshot.as_deref(), Some("frame-a"));

        state.apply_event(update(Some("frame-b"), None, 4));
        assert_eq!(state.last_screenshot.as_deref(), Some("frame-b"));
        assert_eq!(state.step_count, 4);
    }

    #[test]
    fn screenshotless_update_keeps_frame_and_logs_the_thought() {
        let mut state = DashboardState::default();
        state.apply_event(update(Some("frame-a"), None, 1));
        let logs_before = state.logs.len();

        state.apply_event(update(None, Some("tapping button"), 2));
        assert_eq!(state.last_screenshot.as_deref(), Some("frame-a"));
        assert_eq!(state.logs.len(), logs_before + 1);
        assert!(state.logs.last().unwrap().text.contains("tapping button"));
        assert_eq!(state.last_thought.as_deref(), Some("tapping button"));
    }

    #[test]
    fn started_clears_the_terminal_log() {
        let mut state = DashboardState::default();
        state.apply_event(GatewayEvent::terminal("old line"));
        state.apply_event(GatewayEvent::terminal("another"));
        assert_eq!(state.terminal.len(), 2);

        state.apply_event(status("started"));
        assert!(state.terminal.is_empty());
        assert_eq!(state.status, "started");

        // Other transitions leave the terminal alone.
        state.apply_event(GatewayEvent::terminal("fresh"));
        state.apply_event(status("paused"));
        assert_eq!(state.terminal, ["fresh"]);
    }

    #[test]
    fn swarm_started_clears_previous_results() {
        let mut state = DashboardState::default();
        state.apply_event(GatewayEvent::SwarmStep {
            agent: "flight".into(),
            result: "old".into(),
        });
        assert_eq!(state.swarm_results.len(), 1);

        state.apply_event(status("swarm_started"));
        assert!(state.swarm_results.is_empty());
    }

    #[test]
    fn status_merges_task_and_mode_when_present() {
        let mut state = DashboardState::default();
        state.apply_event(GatewayEvent::Status {
            status: "swarm_started".into(),
            task: Some("plan a trip".into()),
            mode: Some("simulate".into()),
        });
        assert_eq!(state.current_task.as_deref(), Some("plan a trip"));
        assert_eq!(state.mode.as_deref(), Some("simulate"));

        state.apply_event(status("completed"));
        // Absent fields do not erase what is known.
        assert_eq!(state.current_task.as_deref(), Some("plan a trip"));
    }

    #[test]
    fn three_swarm_steps_accumulate_in_receipt_order() {
        let mut state = DashboardState::default();
        state.apply_event(status("swarm_started"));
        for agent in ["A1", "A2", "A3"] {
            state.apply_event(GatewayEvent::SwarmStep {
                agent: agent.into(),
                result: "ok".into(),
            });
        }

        assert_eq!(state.status, "swarm_started");
        let agents: Vec<&str> = state.swarm_results.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(agents, ["A1", "A2", "A3"]);
        assert_eq!(state.view(), View::SwarmGrid);
    }

    #[test]
    fn aggregate_replaces_accumulated_results_and_completes() {
        let mut state = DashboardState::default();
        state.apply_event(status("swarm_started"));
        state.apply_event(GatewayEvent::SwarmStep {
            agent: "stale".into(),
            result: "partial".into(),
        });

        let mut results = BTreeMap::new();
        results.insert("flight".to_string(), "FL123".to_string());
        results.insert("hotel".to_string(), "Hotel A".to_string());
        state.apply_event(GatewayEvent::SwarmResult {
            result: SwarmSummary {
                task: "plan".into(),
                elapsed_seconds: Some(1.2),
                results,
            },
        });

        assert_eq!(state.status, "completed");
        assert_eq!(state.swarm_results.len(), 2);
        assert!(state.swarm_results.iter().all(|(a, _)| a != "stale"));
    }

    #[test]
    fn empty_aggregate_keeps_accumulated_results() {
        let mut state = DashboardState::default();
        state.apply_event(GatewayEvent::SwarmStep {
            agent: "flight".into(),
            result: "ok".into(),
        });
        state.apply_event(GatewayEvent::SwarmResult {
            result: SwarmSummary {
                task: "plan".into(),
                elapsed_seconds: None,
                results: BTreeMap::new(),
            },
        });

        assert_eq!(state.status, "completed");
        assert_eq!(state.swarm_results.len(), 1);
    }

    #[test]
    fn errors_log_but_do_not_change_status() {
        let mut state = DashboardState::default();
        state.apply_event(status("running"));
        state.apply_event(GatewayEvent::error("device unreachable"));

        assert_eq!(state.status, "running");
        assert!(state.logs.last().unwrap().text.contains("device unreachable"));
        assert_eq!(state.terminal.last().unwrap(), "[error] device unreachable");
    }

    #[test]
    fn unknown_and_malformed_messages_are_rejected_without_side_effects() {
        let mut state = DashboardState::default();
        state.apply_event(status("running"));
        let logs_before = state.logs.len();

        assert_eq!(
            state.apply_message(r#"{"type": "nonsense", "value": 1}"#),
            MessageOutcome::Rejected
        );
        assert_eq!(state.apply_message("not json at all"), MessageOutcome::Rejected);
        assert_eq!(
            state.apply_message(r#"{"type": "update", "status": 42}"#),
            MessageOutcome::Rejected
        );

        assert_eq!(state.rejected_count, 3);
        assert_eq!(state.status, "running");
        assert_eq!(state.logs.len(), logs_before);
    }

    #[test]
    fn well_formed_messages_apply_through_the_parse_boundary() {
        let mut state = DashboardState::default();
        let outcome = state.apply_message(
            r#"{"type": "update", "step": 3, "status": "running", "thoughts": "scrolling"}"#,
        );
        assert_eq!(outcome, MessageOutcome::Applied);
        assert_eq!(state.step_count, 3);
        assert!(state.logs.last().unwrap().text.contains("scrolling"));
    }

    #[test]
    fn view_prefers_swarm_then_screenshot_then_terminal() {
        let mut state = DashboardState::default();
        assert_eq!(state.view(), View::Waiting);

        state.apply_event(GatewayEvent::terminal("booting"));
        assert_eq!(state.view(), View::Terminal);

        state.apply_event(update(Some("frame"), None, 1));
        assert_eq!(state.view(), View::Screenshot);

        state.apply_event(status("swarm_started"));
        assert_eq!(state.view(), View::SwarmGrid);

        // Results alone keep the grid up after the status moves on.
        state.apply_event(GatewayEvent::SwarmStep {
            agent: "flight".into(),
            result: "ok".into(),
        });
        state.apply_event(status("completed"));
        assert_eq!(state.view(), View::SwarmGrid);
    }

    #[test]
    fn stats_survive_all_gateway_traffic() {
        // Only a successful poll overwrites the counters; events never do.
        let mut state = DashboardState::default();
        state.stats = MemoryStats {
            total_memories: 7,
            total_accumulated_experience: 9,
        };

        state.apply_event(status("started"));
        state.apply_event(update(Some("frame"), Some("thinking"), 1));
        state.apply_event(GatewayEvent::error("boom"));
        state.apply_event(GatewayEvent::terminal("line"));

        assert_eq!(state.stats.total_memories, 7);
        assert_eq!(state.stats.total_accumulated_experience, 9);
    }

    #[test]
    fn log_cap_drops_the_oldest_entries() {
        let mut state = DashboardState::new(3);
        for i in 0..5 {
            state.push_log(format!("line {i}"));
        }
        assert_eq!(state.logs.len(), 3);
        assert_eq!(state.logs[0].text, "line 2");
        assert_eq!(state.logs[2].text, "line 4");
    }

    #[test]
    fn explicit_clears_empty_the_panes() {
        let mut state = DashboardState::default();
        state.push_log("a line");
        state.apply_event(GatewayEvent::terminal("raw"));

        state.clear_logs();
        state.clear_terminal();
        assert!(state.logs.is_empty());
        assert!(state.terminal.is_empty());
    }
}
