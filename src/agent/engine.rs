use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine as _;
use tokio::sync::broadcast;

use crate::actions::{self, AgentAction};
use crate::agent::control::RunControl;
use crate::agent::decision;
use crate::agent::guard::{StopGuard, StopReason};
use crate::agent::history::{HistoryEntry, SessionHistory};
use crate::agent::prompts;
use crate::agent::state::{AgentRunResult, AgentStep};
use crate::config::AgentConfig;
use crate::device::DeviceControl;
use crate::errors::AndroidUseResult;
use crate::events::{GatewayEvent, RunStatus};
use crate::hierarchy::UiHierarchy;
use crate::llm::types::{ChatMessage, LlmResponse};
use crate::llm::ProviderRegistry;

/// Elements shown to the model per step.
const MAX_PROMPT_ELEMENTS: usize = 40;

enum StepVerdict {
    /// Step finished, run continues.
    Record(AgentStep, Option<String>),
    /// The model declared the task complete.
    Done(AgentStep, Option<String>),
    /// A stop condition fired between decision and dispatch.
    Halted(StopReason),
}

/// One observe/decide/act cycle per step until the task completes or a stop
/// condition fires.
pub struct AndroidAgent {
    task: String,
    config: AgentConfig,
    device: Arc<dyn DeviceControl>,
    registry: Arc<ProviderRegistry>,
    control: RunControl,
    events: broadcast::Sender<GatewayEvent>,
    guard: StopGuard,
    history: SessionHistory,
    steps: Vec<AgentStep>,
    screen_size: (u32, u32),
}

impl AndroidAgent {
    pub fn new(
        task: impl Into<String>,
        config: AgentConfig,
        device: Arc<dyn DeviceControl>,
        registry: Arc<ProviderRegistry>,
        control: RunControl,
        events: broadcast::Sender<GatewayEvent>,
    ) -> Self {
        let guard = StopGuard::new(&config);
        let history = SessionHistory::new(&config.history_dir);
        Self {
            task: task.into(),
            config,
            device,
            registry,
            control,
            events,
            guard,
            history,
            steps: Vec::new(),
            screen_size: (0, 0),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.history.session_id
    }

    pub async fn run(mut self) -> AgentRunResult {
        let run_start = Instant::now();
        tracing::info!(
            task = %self.task,
            session = %self.history.session_id,
            "agent run starting"
        );
        self.history.push(HistoryEntry::task(&self.task));
        if let Err(e) = self.history.flush() {
            tracing::warn!(error = %e, "could not write session history");
        }

        match self.device.screen_size().await {
            Ok(size) => self.screen_size = size,
            Err(e) => tracing::warn!(error = %e, "screen size unavailable"),
        }

        let (status, success, final_message) = loop {
            self.control.wait_if_paused().await;
            if let Some(reason) = self.guard.check(self.control.stop_requested()) {
                tracing::info!(reason = %reason, "stop condition triggered");
                break (RunStatus::Stopped, false, reason.to_string());
            }

            let step_num = self.guard.steps_taken() + 1;
            match self.step(step_num).await {
                StepVerdict::Halted(reason) => {
                    tracing::info!(reason = %reason, "stop condition triggered mid-step");
                    break (RunStatus::Stopped, false, reason.to_string());
                }
                StepVerdict::Done(record, screenshot) => {
                    self.emit_step(&record, screenshot);
                    let success = record.success;
                    let message = record.reasoning.clone();
                    self.finish_step(record);
                    break (RunStatus::Completed, success, message);
                }
                StepVerdict::Record(record, screenshot) => {
                    self.emit_step(&record, screenshot);
                    self.finish_step(record);
                    let delay = self.config.step_delay_secs.max(0.0);
                    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                }
            }
        };

        let total_steps = self.steps.len() as u32;
        let result = AgentRunResult {
            task: self.task.clone(),
            status,
            steps: self.steps,
            total_steps,
            total_time_secs: run_start.elapsed().as_secs_f64(),
            success,
            final_message,
        };
        tracing::info!(
            status = %result.status,
            steps = result.total_steps,
            elapsed = format!("{:.1}s", result.total_time_secs),
            message = %result.final_message,
            "agent run finished"
        );
        result
    }

    async fn step(&mut self, step_num: u32) -> StepVerdict {
        let started = Instant::now();
        tracing::info!(
            step = step_num,
            max_steps = self.config.max_steps,
            "step starting"
        );

        let (screenshot_b64, hierarchy) = match self.observe().await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "device observation failed");
                return StepVerdict::Record(
                    self.error_step(step_num, started, format!("observation failed: {e}")),
                    None,
                );
            }
        };
        let current_app = match self.device.current_app().await {
            Ok(app) => app,
            Err(e) => {
                tracing::debug!(error = %e, "foreground app lookup failed");
                None
            }
        };

        let prompt = prompts::build_step_prompt(&prompts::StepContext {
            task: &self.task,
            step: step_num,
            max_steps: self.config.max_steps,
            screen: self.screen_size,
            current_app: current_app.as_deref(),
            elements: &hierarchy.to_indexed_prompt(MAX_PROMPT_ELEMENTS),
            history: &self.steps,
        });
        let messages = vec![
            ChatMessage::system(prompts::system_prompt()),
            ChatMessage::user_with_image(prompt, &screenshot_b64),
        ];
        let response = match self.chat(messages).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "model call failed");
                return StepVerdict::Record(
                    self.error_step(step_num, started, format!("model call failed: {e}")),
                    Some(screenshot_b64),
                );
            }
        };

        let decision = match decision::parse_decision(&response.content, &hierarchy) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable decision");
                return StepVerdict::Record(
                    self.error_step(step_num, started, e.to_string()),
                    Some(screenshot_b64),
                );
            }
        };
        tracing::info!(
            action = decision.action.name(),
            thought = %decision.thought,
            "decision"
        );

        if let AgentAction::Done { success, result } = &decision.action {
            let record = AgentStep {
                step_num,
                timestamp: chrono::Utc::now(),
                action: "done".into(),
                params: serde_json::json!({}),
                reasoning: if result.is_empty() {
                    decision.thought.clone()
                } else {
                    result.clone()
                },
                success: *success,
                error: None,
                duration_secs: started.elapsed().as_secs_f64(),
            };
            return StepVerdict::Done(record, Some(screenshot_b64));
        }

        // A repeated action must not execute yet another time, so the guard
        // re-checks between decision and dispatch.
        self.guard.record_action(&decision.action);
        if let Some(reason) = self.guard.check(self.control.stop_requested()) {
            return StepVerdict::Halted(reason);
        }

        let action_name = decision.action.name().to_string();
        let params = action_params(&decision.action);
        let (success, error) = match actions::dispatch(self.device.as_ref(), &decision.action).await
        {
            Ok(outcome) => {
                tracing::info!(outcome = %outcome, "action executed");
                (true, None)
            }
            Err(e) => {
                tracing::error!(error = %e, "action failed");
                (false, Some(e.to_string()))
            }
        };

        StepVerdict::Record(
            AgentStep {
                step_num,
                timestamp: chrono::Utc::now(),
                action: action_name,
                params,
                reasoning: decision.thought,
                success,
                error,
                duration_secs: started.elapsed().as_secs_f64(),
            },
            Some(screenshot_b64),
        )
    }

    /// Screenshot (base64) and parsed hierarchy for the current screen.
    async fn observe(&self) -> AndroidUseResult<(String, UiHierarchy)> {
        let png = self.device.screenshot().await?;
        if self.config.save_screenshots {
            if let Err(e) = tokio::fs::write(&self.config.screenshot_path, &png).await {
                tracing::warn!(
                    error = %e,
                    path = %self.config.screenshot_path,
                    "screenshot not saved"
                );
            }
        }
        let xml = self.device.dump_hierarchy().await?;
        let hierarchy = UiHierarchy::parse(&xml);
        Ok((
            base64::engine::general_purpose::STANDARD.encode(&png),
            hierarchy,
        ))
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> AndroidUseResult<LlmResponse> {
        let (provider, call_cfg) = self.registry.active_call()?;
        provider.chat(messages, &call_cfg).await
    }

    fn finish_step(&mut self, record: AgentStep) {
        self.guard.record_step();
        self.guard.record_outcome(record.success);
        self.history.push(HistoryEntry::step(&record));
        if let Err(e) = self.history.flush() {
            tracing::warn!(error = %e, "could not write session history");
        }
        self.steps.push(record);
    }

    fn emit_step(&self, record: &AgentStep, screenshot: Option<String>) {
        let status = if self.control.is_paused() {
            RunStatus::Paused
        } else {
            RunStatus::Running
        };
        self.emit(GatewayEvent::Update {
            screenshot,
            thoughts: (!record.reasoning.is_empty()).then(|| record.reasoning.clone()),
            step: record.step_num,
            status: status.to_string(),
        });
        self.emit(GatewayEvent::terminal(format!(
            "[step {}/{}] {}: {} -> {}",
            record.step_num,
            self.config.max_steps,
            record.action,
            record.params,
            record.outcome()
        )));
        if !record.success {
            if let Some(error) = &record.error {
                self.emit(GatewayEvent::error(error.clone()));
            }
        }
    }

    fn emit(&self, event: GatewayEvent) {
        // Send only fails with no subscribers, which is fine for a one-shot
        // run without the gateway.
        let _ = self.events.send(event);
    }

    fn error_step(&self, step_num: u32, started: Instant, message: String) -> AgentStep {
        AgentStep {
            step_num,
            timestamp: chrono::Utc::now(),
            action: "error".into(),
            params: serde_json::json!({}),
            reasoning: String::new(),
            success: false,
            error: Some(message),
            duration_secs: started.elapsed().as_secs_f64(),
        }
    }
}

/// Parameter object of a serialized action, `{}` for parameterless ones.
fn action_params(action: &AgentAction) -> serde_json::Value {
    serde_json::to_value(action)
        .ok()
        .and_then(|v| v.get("params").cloned())
        .unwrap_or_else(|| serde_json::json!({}))
}
