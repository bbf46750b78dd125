use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::agent::{AndroidAgent, RunControl};
use crate::config::AppConfig;
use crate::device::{AdbDevice, DeviceControl};
use crate::errors::AndroidUseError;
use crate::events::{GatewayEvent, RunStatus};
use crate::llm::ProviderRegistry;
use crate::memory::{MemoryStats, TaskMemory};
use crate::swarm::{SwarmMode, SwarmRunner};

/// Event fan-out capacity. Slow dashboard clients drop frames past this.
const EVENT_CAPACITY: usize = 256;

#[derive(Default)]
struct ActiveRun {
    control: Option<RunControl>,
    handle: Option<JoinHandle<()>>,
}

/// Owns the one active run (agent or swarm), the event fan-out and the
/// reinforcement store. Starting a new run stops and waits out the previous
/// one, so at most one background task drives the device at a time.
pub struct AgentManager {
    config: AppConfig,
    registry: Arc<ProviderRegistry>,
    events: broadcast::Sender<GatewayEvent>,
    memory: Arc<Mutex<TaskMemory>>,
    active: Mutex<ActiveRun>,
}

impl AgentManager {
    pub fn new(config: AppConfig, registry: Arc<ProviderRegistry>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let memory = Arc::new(Mutex::new(TaskMemory::load(&config.memory.path)));
        Self {
            config,
            registry,
            events,
            memory,
            active: Mutex::new(ActiveRun::default()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    /// Start a single-agent run, stopping any run already in flight.
    pub async fn start_task(&self, task: &str) {
        self.stop_active().await;

        let control = RunControl::new();
        let events = self.events.clone();
        let registry = self.registry.clone();
        let config = self.config.clone();
        let memory = self.memory.clone();
        let run_control = control.clone();
        let task = task.to_string();

        let handle = tokio::spawn(async move {
            let _ = events.send(GatewayEvent::status_with_task(RunStatus::Started, &task));
            let device: Arc<dyn DeviceControl> =
                match AdbDevice::connect(&config.device).await {
                    Ok(device) => Arc::new(device),
                    Err(e) => {
                        tracing::error!(error = %e, "device connection failed");
                        let _ = events.send(GatewayEvent::error(e.to_string()));
                        let _ = events.send(GatewayEvent::status(RunStatus::Stopped));
                        return;
                    }
                };

            let agent = AndroidAgent::new(
                &task,
                config.agent.clone(),
                device,
                registry,
                run_control,
                events.clone(),
            );
            let result = agent.run().await;

            if result.status == RunStatus::Completed {
                let _ = events.send(GatewayEvent::terminal(format!(
                    "[done] {}",
                    result.final_message
                )));
                let _ = events.send(GatewayEvent::status(RunStatus::Completed));
                let mut memory = memory.lock().await;
                if let Err(e) = memory.record_experience(&result.task, result.success) {
                    tracing::warn!(error = %e, "could not persist experience");
                }
            } else {
                let _ = events.send(GatewayEvent::terminal(format!(
                    "[stopped] {}",
                    result.final_message
                )));
                let _ = events.send(GatewayEvent::status(RunStatus::Stopped));
            }
        });

        let mut active = self.active.lock().await;
        active.control = Some(control);
        active.handle = Some(handle);
    }

    /// Start a swarm run, stopping any run already in flight.
    pub async fn start_swarm(&self, task: &str, mode: SwarmMode) {
        self.stop_active().await;

        let control = RunControl::new();
        let events = self.events.clone();
        let runner = SwarmRunner::new(self.registry.clone(), self.events.clone());
        let run_control = control.clone();
        let task = task.to_string();

        let handle = tokio::spawn(async move {
            let _ = events.send(GatewayEvent::Status {
                status: RunStatus::SwarmStarted.to_string(),
                task: Some(task.clone()),
                mode: Some(mode.as_str().to_string()),
            });
            match runner.run(&task, mode, &run_control).await {
                Ok(_) => {}
                Err(AndroidUseError::Cancelled) => {
                    let _ = events.send(GatewayEvent::status(RunStatus::Stopped));
                }
                Err(e) => {
                    tracing::error!(error = %e, "swarm failed");
                    let _ = events.send(GatewayEvent::error(e.to_string()));
                }
            }
        });

        let mut active = self.active.lock().await;
        active.control = Some(control);
        active.handle = Some(handle);
    }

    pub async fn pause(&self) {
        let active = self.active.lock().await;
        if let Some(control) = &active.control {
            control.pause();
            let _ = self.events.send(GatewayEvent::status(RunStatus::Paused));
        }
    }

    pub async fn resume(&self) {
        let active = self.active.lock().await;
        if let Some(control) = &active.control {
            control.resume();
            let _ = self.events.send(GatewayEvent::status(RunStatus::Running));
        }
    }

    /// Request a stop and wait for the running task to wind down. The dying
    /// run broadcasts its own final `stopped` status.
    pub async fn stop(&self) {
        self.stop_active().await;
    }

    pub async fn memory_stats(&self) -> MemoryStats {
        self.memory.lock().await.stats()
    }

    async fn stop_active(&self) {
        let (control, handle) = {
            let mut active = self.active.lock().await;
            (active.control.take(), active.handle.take())
        };
        if let Some(control) = control {
            control.request_stop();
        }
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "run task join failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::timeout;

    fn test_manager() -> AgentManager {
        let mut config = AppConfig::default();
        config.memory.path = std::env::temp_dir()
            .join(format!("android-use-manager-test-{}.json", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned();
        // Point adb at a nonexistent binary so connection attempts fail fast.
        config.device.adb_path = "/nonexistent/adb".into();
        let registry = Arc::new(ProviderRegistry::from_config(&config));
        AgentManager::new(config, registry)
    }

    async fn next_event(rx: &mut broadcast::Receiver<GatewayEvent>) -> GatewayEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn failed_device_connection_reports_and_stops() {
        let manager = test_manager();
        let mut rx = manager.subscribe();
        manager.start_task("open settings").await;

        match next_event(&mut rx).await {
            GatewayEvent::Status { status, task, .. } => {
                assert_eq!(status, "started");
                assert_eq!(task.as_deref(), Some("open settings"));
            }
            other => panic!("expected started, got {other:?}"),
        }
        assert!(matches!(next_event(&mut rx).await, GatewayEvent::Error { .. }));
        match next_event(&mut rx).await {
            GatewayEvent::Status { status, .. } => assert_eq!(status, "stopped"),
            other => panic!("expected stopped, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn simulated_swarm_runs_to_completion() {
        let manager = test_manager();
        let mut rx = manager.subscribe();
        manager.start_swarm("Plan my trip", SwarmMode::Simulate).await;

        match next_event(&mut rx).await {
            GatewayEvent::Status { status, task, mode } => {
                assert_eq!(status, "swarm_started");
                assert_eq!(task.as_deref(), Some("Plan my trip"));
                assert_eq!(mode.as_deref(), Some("simulate"));
            }
            other => panic!("expected swarm_started, got {other:?}"),
        }

        let mut steps = 0;
        loop {
            match next_event(&mut rx).await {
                GatewayEvent::SwarmStep { .. } => steps += 1,
                GatewayEvent::SwarmResult { result } => {
                    assert_eq!(result.results.len(), 3);
                    break;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(steps, 3);
    }

    #[tokio::test]
    async fn stop_cancels_a_running_swarm() {
        let manager = test_manager();
        let mut rx = manager.subscribe();
        manager.start_swarm("Plan my trip", SwarmMode::Simulate).await;

        match next_event(&mut rx).await {
            GatewayEvent::Status { status, .. } => assert_eq!(status, "swarm_started"),
            other => panic!("expected swarm_started, got {other:?}"),
        }
        manager.stop().await;

        // Sub-agents may have reported before the stop landed; the run must
        // still end with a stopped status and no aggregate.
        loop {
            match next_event(&mut rx).await {
                GatewayEvent::SwarmStep { .. } => {}
                GatewayEvent::Status { status, .. } => {
                    assert_eq!(status, "stopped");
                    break;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn controls_without_a_run_emit_nothing() {
        let manager = test_manager();
        let mut rx = manager.subscribe();
        manager.pause().await;
        manager.resume().await;
        manager.stop().await;

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn stats_come_from_the_backing_store() {
        let manager = test_manager();
        let stats = manager.memory_stats().await;
        assert_eq!(stats.total_memories, 0);
        assert_eq!(stats.total_accumulated_experience, 0);
    }
}
