use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::agent::RunControl;
use crate::errors::{AndroidUseError, AndroidUseResult};
use crate::events::{GatewayEvent, SwarmSummary};
use crate::llm::types::{CallConfig, ChatMessage};
use crate::llm::{LlmProvider, ProviderRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmMode {
    Simulate,
    Real,
}

impl SwarmMode {
    /// `"real"` selects real mode, anything else simulates.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("real") {
            Self::Real
        } else {
            Self::Simulate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simulate => "simulate",
            Self::Real => "real",
        }
    }
}

/// The three fixed sub-agent roles a swarm fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwarmRole {
    Flight,
    Hotel,
    Itinerary,
}

const ROLES: [SwarmRole; 3] = [SwarmRole::Flight, SwarmRole::Hotel, SwarmRole::Itinerary];

impl SwarmRole {
    fn name(&self) -> &'static str {
        match self {
            Self::Flight => "flight",
            Self::Hotel => "hotel",
            Self::Itinerary => "itinerary",
        }
    }

    /// Simulated think time, seconds. Each role has its own spread so
    /// completions arrive staggered.
    fn sim_delay_range(&self) -> (f64, f64) {
        match self {
            Self::Flight => (0.6, 1.8),
            Self::Hotel => (0.4, 1.2),
            Self::Itinerary => (0.3, 1.0),
        }
    }

    fn sim_result(&self, task: &str) -> String {
        match self {
            Self::Flight => format!("Flights found for {task}: [FL123, FL456]"),
            Self::Hotel => format!("Hotels found for {task}: [Hotel A, Hotel B]"),
            Self::Itinerary => format!("Itinerary draft for {task}: Day1 sightsee, Day2 rest"),
        }
    }

    fn real_prompt(&self, task: &str) -> String {
        match self {
            Self::Flight => format!(
                "You are a flight search assistant. Given the task: {task}, \
                 list two flight options concisely."
            ),
            Self::Hotel => format!(
                "You are a hotel search assistant. Given the task: {task}, \
                 list two hotel options concisely."
            ),
            Self::Itinerary => format!(
                "You are a travel planner. Given the task: {task}, \
                 draft a concise two-day itinerary."
            ),
        }
    }
}

/// Fans one task out to the fixed sub-agent roles and aggregates their
/// reports. Simulate mode needs no provider; real mode sends each role a
/// one-shot completion and falls back to the simulated answer for any role
/// whose call fails.
pub struct SwarmRunner {
    registry: Arc<ProviderRegistry>,
    events: broadcast::Sender<GatewayEvent>,
}

impl SwarmRunner {
    pub fn new(registry: Arc<ProviderRegistry>, events: broadcast::Sender<GatewayEvent>) -> Self {
        Self { registry, events }
    }

    /// Run one swarm to completion. Emits a `swarm_step` as each sub-agent
    /// reports and one final `swarm_result`. The aggregate carries
    /// `elapsed_seconds` only in real mode, simulate mode omits it.
    pub async fn run(
        &self,
        task: &str,
        mode: SwarmMode,
        control: &RunControl,
    ) -> AndroidUseResult<SwarmSummary> {
        tracing::info!(task = %task, mode = mode.as_str(), "swarm starting");
        let started = Instant::now();
        let mut set = JoinSet::new();

        match mode {
            SwarmMode::Simulate => self.spawn_simulated(&mut set, task),
            SwarmMode::Real => match self.registry.active_call() {
                Ok((provider, cfg)) => self.spawn_real(&mut set, task, provider, cfg),
                Err(e) => {
                    tracing::warn!(error = %e, "no usable provider, swarm falls back to simulation");
                    self.spawn_simulated(&mut set, task);
                }
            },
        }

        let mut results = BTreeMap::new();
        loop {
            tokio::select! {
                _ = control.stopped() => {
                    tracing::info!(task = %task, "swarm stopped");
                    set.abort_all();
                    return Err(AndroidUseError::Cancelled);
                }
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok((agent, result))) => {
                        tracing::info!(agent, "sub-agent reported");
                        self.emit(GatewayEvent::SwarmStep {
                            agent: agent.to_string(),
                            result: result.clone(),
                        });
                        results.insert(agent.to_string(), result);
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "sub-agent task failed");
                        self.emit(GatewayEvent::error(format!("swarm sub-agent failed: {e}")));
                    }
                },
            }
        }

        let summary = SwarmSummary {
            task: task.to_string(),
            elapsed_seconds: match mode {
                SwarmMode::Real => Some(round2(started.elapsed().as_secs_f64())),
                SwarmMode::Simulate => None,
            },
            results,
        };
        self.emit(GatewayEvent::SwarmResult {
            result: summary.clone(),
        });
        tracing::info!(
            task = %task,
            agents = summary.results.len(),
            "swarm finished"
        );
        Ok(summary)
    }

    fn spawn_simulated(&self, set: &mut JoinSet<(&'static str, String)>, task: &str) {
        for role in ROLES {
            let result = role.sim_result(task);
            set.spawn(async move {
                let (lo, hi) = role.sim_delay_range();
                let delay = rand::rng().random_range(lo..hi);
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                (role.name(), result)
            });
        }
    }

    fn spawn_real(
        &self,
        set: &mut JoinSet<(&'static str, String)>,
        task: &str,
        provider: Arc<dyn LlmProvider>,
        cfg: CallConfig,
    ) {
        // Sub-agents answer in prose, not the agent loop's JSON contract.
        let cfg = CallConfig {
            json_response: false,
            ..cfg
        };
        for role in ROLES {
            let provider = provider.clone();
            let cfg = cfg.clone();
            let prompt = role.real_prompt(task);
            let fallback = role.sim_result(task);
            set.spawn(async move {
                match provider.chat(vec![ChatMessage::user(prompt)], &cfg).await {
                    Ok(resp) => (role.name(), resp.content.trim().to_string()),
                    Err(e) => {
                        tracing::warn!(
                            agent = role.name(),
                            error = %e,
                            "sub-agent call failed, reporting simulated result"
                        );
                        (role.name(), fallback)
                    }
                }
            });
        }
    }

    fn emit(&self, event: GatewayEvent) {
        let _ = self.events.send(event);
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::config::AppConfig;
    use crate::llm::types::LlmResponse;

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn chat(
            &self,
            messages: Vec<ChatMessage>,
            _cfg: &CallConfig,
        ) -> AndroidUseResult<LlmResponse> {
            let content = match messages.last().map(|m| &m.content) {
                Some(crate::llm::types::MessageContent::Text(text)) => text.clone(),
                _ => String::new(),
            };
            Ok(LlmResponse { content })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LlmProvider for FailingProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn chat(
            &self,
            _messages: Vec<ChatMessage>,
            _cfg: &CallConfig,
        ) -> AndroidUseResult<LlmResponse> {
            Err(AndroidUseError::LlmProvider("no backend".into()))
        }
    }

    fn runner_with_provider(
        provider: Option<Arc<dyn LlmProvider>>,
    ) -> (SwarmRunner, broadcast::Receiver<GatewayEvent>) {
        let mut app_config = AppConfig::default();
        app_config.llm.active_provider = "echo".into();
        let mut registry = ProviderRegistry::from_config(&app_config);
        if let Some(provider) = provider {
            registry.register(provider);
        }
        let (tx, rx) = broadcast::channel(256);
        (SwarmRunner::new(Arc::new(registry), tx), rx)
    }

    fn drain(rx: &mut broadcast::Receiver<GatewayEvent>) -> Vec<GatewayEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn canned_results_match_the_fixed_wording() {
        assert_eq!(
            SwarmRole::Flight.sim_result("Plan my trip to Japan"),
            "Flights found for Plan my trip to Japan: [FL123, FL456]"
        );
        assert_eq!(
            SwarmRole::Hotel.sim_result("Plan my trip to Japan"),
            "Hotels found for Plan my trip to Japan: [Hotel A, Hotel B]"
        );
        assert_eq!(
            SwarmRole::Itinerary.sim_result("Plan my trip to Japan"),
            "Itinerary draft for Plan my trip to Japan: Day1 sightsee, Day2 rest"
        );
    }

    #[test]
    fn mode_parsing_defaults_to_simulate() {
        assert_eq!(SwarmMode::parse("real"), SwarmMode::Real);
        assert_eq!(SwarmMode::parse("REAL"), SwarmMode::Real);
        assert_eq!(SwarmMode::parse("simulate"), SwarmMode::Simulate);
        assert_eq!(SwarmMode::parse("anything"), SwarmMode::Simulate);
    }

    #[tokio::test]
    async fn simulated_swarm_reports_every_role() {
        let (runner, mut rx) = runner_with_provider(None);
        let summary = runner
            .run("Plan my trip", SwarmMode::Simulate, &RunControl::new())
            .await
            .unwrap();

        assert_eq!(summary.task, "Plan my trip");
        assert_eq!(summary.elapsed_seconds, None);
        assert_eq!(
            summary.results.keys().collect::<Vec<_>>(),
            ["flight", "hotel", "itinerary"]
        );
        assert_eq!(
            summary.results["flight"],
            "Flights found for Plan my trip: [FL123, FL456]"
        );

        let events = drain(&mut rx);
        let steps = events
            .iter()
            .filter(|e| matches!(e, GatewayEvent::SwarmStep { .. }))
            .count();
        assert_eq!(steps, 3);
        assert!(matches!(
            events.last(),
            Some(GatewayEvent::SwarmResult { .. })
        ));
    }

    #[tokio::test]
    async fn real_swarm_uses_the_provider_and_reports_elapsed() {
        let (runner, mut rx) = runner_with_provider(Some(Arc::new(EchoProvider)));
        let summary = runner
            .run("Plan my trip", SwarmMode::Real, &RunControl::new())
            .await
            .unwrap();

        assert!(summary.elapsed_seconds.is_some());
        assert_eq!(summary.results.len(), 3);
        assert!(summary.results["flight"].contains("flight search assistant"));
        assert!(summary.results["itinerary"].contains("two-day itinerary"));
        assert_eq!(drain(&mut rx).len(), 4);
    }

    #[tokio::test]
    async fn real_swarm_without_provider_simulates() {
        let (runner, _rx) = runner_with_provider(None);
        let summary = runner
            .run("Plan my trip", SwarmMode::Real, &RunControl::new())
            .await
            .unwrap();

        assert!(summary.elapsed_seconds.is_some());
        assert_eq!(
            summary.results["hotel"],
            "Hotels found for Plan my trip: [Hotel A, Hotel B]"
        );
    }

    #[tokio::test]
    async fn real_swarm_call_failures_fall_back_per_role() {
        let (runner, _rx) = runner_with_provider(Some(Arc::new(FailingProvider)));
        let summary = runner
            .run("Plan my trip", SwarmMode::Real, &RunControl::new())
            .await
            .unwrap();

        assert_eq!(summary.results.len(), 3);
        assert_eq!(
            summary.results["flight"],
            "Flights found for Plan my trip: [FL123, FL456]"
        );
    }

    #[tokio::test]
    async fn requested_stop_cancels_the_swarm() {
        let (runner, mut rx) = runner_with_provider(None);
        let control = RunControl::new();
        control.request_stop();

        let outcome = runner.run("Plan my trip", SwarmMode::Simulate, &control).await;
        assert!(matches!(outcome, Err(AndroidUseError::Cancelled)));
        assert!(drain(&mut rx)
            .iter()
            .all(|e| !matches!(e, GatewayEvent::SwarmResult { .. })));
    }
}
