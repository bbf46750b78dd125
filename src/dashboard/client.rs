use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::config::DashboardConfig;
use crate::dashboard::state::DashboardState;
use crate::errors::{AndroidUseError, AndroidUseResult};
use crate::memory::MemoryStats;

/// Terminal front end for the gateway. One task owns the state: every
/// mutation happens on a websocket frame, a stats tick or a typed command,
/// each handled to completion before the next. Commands go out over HTTP;
/// send failures are logged and never retried. There is no automatic
/// reconnect, a dropped gateway ends the session.
pub struct DashboardClient {
    config: DashboardConfig,
    http: reqwest::Client,
}

struct Snapshot {
    status: String,
    logs: usize,
    terminal: usize,
}

impl Snapshot {
    fn of(state: &DashboardState) -> Self {
        Self {
            status: state.status.clone(),
            logs: state.logs.len(),
            terminal: state.terminal.len(),
        }
    }
}

impl DashboardClient {
    pub fn new(config: DashboardConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub async fn run(self) -> AndroidUseResult<()> {
        let mut state = DashboardState::new(self.config.max_log_lines);
        tracing::info!(url = %self.config.ws_url, "connecting to gateway");
        let (socket, _) = connect_async(&self.config.ws_url)
            .await
            .map_err(|e| AndroidUseError::Gateway(format!("connection failed: {e}")))?;
        let (_write, mut read) = socket.split();

        state.push_log("System: Connected");
        println!("connected to {} (type 'help' for commands)", self.config.ws_url);

        let mut poll =
            tokio::time::interval(Duration::from_secs(self.config.stats_poll_secs.max(1)));
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        let mut quit = false;

        loop {
            let before = Snapshot::of(&state);
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        state.apply_message(&text);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        state.push_log("System: Disconnected");
                        quit = true;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "gateway read failed");
                        state.push_log("System: Disconnected");
                        quit = true;
                    }
                },
                _ = poll.tick() => {
                    match self.fetch_stats().await {
                        Ok(stats) => state.stats = stats,
                        // Keep the previous value across failed polls.
                        Err(e) => tracing::debug!(error = %e, "stats poll failed"),
                    }
                }
                line = stdin.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => quit = self.handle_command(line.trim(), &mut state).await,
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        stdin_open = false;
                    }
                },
            }
            print_delta(&state, &before);
            if quit {
                break;
            }
        }
        Ok(())
    }

    /// Returns true when the user asked to quit.
    async fn handle_command(&self, command: &str, state: &mut DashboardState) -> bool {
        let (verb, rest) = match command.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (command, ""),
        };
        match verb {
            "start" => {
                if rest.is_empty() {
                    println!("usage: start <task>");
                } else {
                    self.send_command("agent/start", json!({"task": rest}), state)
                        .await;
                }
            }
            "swarm" => {
                let (mode, task) = match rest.split_once(char::is_whitespace) {
                    Some((first, remainder))
                        if first == "real" || first == "simulate" =>
                    {
                        (first, remainder.trim())
                    }
                    _ => ("simulate", rest),
                };
                if task.is_empty() {
                    println!("usage: swarm [real|simulate] <task>");
                } else {
                    self.send_command("swarm/start", json!({"task": task, "mode": mode}), state)
                        .await;
                }
            }
            "pause" => self.send_command("agent/pause", json!({}), state).await,
            "resume" => self.send_command("agent/resume", json!({}), state).await,
            "stop" => self.send_command("agent/stop", json!({}), state).await,
            "stats" => println!(
                "memories: {}  accumulated experience: {}",
                state.stats.total_memories, state.stats.total_accumulated_experience
            ),
            "clear" => {
                state.clear_logs();
                state.clear_terminal();
                println!("(cleared)");
            }
            "quit" | "exit" => return true,
            "" => {}
            _ => println!(
                "commands: start <task> | swarm [real|simulate] <task> | \
                 pause | resume | stop | stats | clear | quit"
            ),
        }
        false
    }

    async fn send_command(&self, path: &str, body: serde_json::Value, state: &mut DashboardState) {
        let url = format!("{}/{path}", self.config.api_base.trim_end_matches('/'));
        let outcome = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .and_then(|resp| resp.error_for_status());
        match outcome {
            Ok(_) => tracing::debug!(path, "command sent"),
            Err(e) => {
                tracing::error!(path, error = %e, "command failed");
                state.push_log(format!("Error: {path} failed: {e}"));
            }
        }
    }

    async fn fetch_stats(&self) -> AndroidUseResult<MemoryStats> {
        let url = format!(
            "{}/memory/stats",
            self.config.api_base.trim_end_matches('/')
        );
        Ok(self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

/// Print what the last event appended or changed. Status strings are shown
/// uppercased, as received and unvalidated.
fn print_delta(state: &DashboardState, before: &Snapshot) {
    if state.status != before.status {
        println!("== {}", state.status.to_uppercase());
    }
    for entry in &state.logs[before.logs.min(state.logs.len())..] {
        println!("[{}] {}", entry.at.format("%H:%M:%S"), entry.text);
    }
    for line in &state.terminal[before.terminal.min(state.terminal.len())..] {
        println!("| {line}");
    }
}
