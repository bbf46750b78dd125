use std::collections::VecDeque;

use crate::actions::AgentAction;
use crate::config::AgentConfig;

/// How many recent action signatures are kept for loop detection.
const SIGNATURE_WINDOW: usize = 10;

/// Why a run was halted before the task finished.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    StopRequested,
    MaxSteps(u32),
    MaxErrors(u32),
    BudgetExceeded { estimated: f64, limit: f64 },
    LoopDetected { action: String, repeats: u32 },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopRequested => write!(f, "stopped by user"),
            Self::MaxSteps(max) => write!(f, "maximum steps ({max}) reached"),
            Self::MaxErrors(max) => write!(f, "{max} consecutive errors"),
            Self::BudgetExceeded { estimated, limit } => {
                write!(f, "budget limit reached (${estimated:.2} >= ${limit:.2})")
            }
            Self::LoopDetected { action, repeats } => {
                write!(f, "action '{action}' repeated {repeats} times")
            }
        }
    }
}

/// Safety limits for one run. All stop conditions live here so the check
/// order is fixed in one place: external stop, step cap, consecutive
/// errors, budget, loop detection.
pub struct StopGuard {
    max_steps: u32,
    max_errors: u32,
    budget_limit: f64,
    cost_per_step: f64,
    loop_threshold: u32,
    steps_taken: u32,
    consecutive_errors: u32,
    recent: VecDeque<(String, String)>,
}

impl StopGuard {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            max_errors: config.max_errors,
            budget_limit: config.budget_limit,
            cost_per_step: config.cost_per_step,
            loop_threshold: config.loop_detection_threshold.max(1),
            steps_taken: 0,
            consecutive_errors: 0,
            recent: VecDeque::new(),
        }
    }

    pub fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    pub fn record_step(&mut self) {
        self.steps_taken += 1;
    }

    /// A success resets the error streak; only uninterrupted failures count
    /// toward the limit.
    pub fn record_outcome(&mut self, success: bool) {
        if success {
            self.consecutive_errors = 0;
        } else {
            self.consecutive_errors += 1;
        }
    }

    pub fn record_action(&mut self, action: &AgentAction) {
        self.recent
            .push_back((action.name().to_string(), action.signature()));
        if self.recent.len() > SIGNATURE_WINDOW {
            self.recent.pop_front();
        }
    }

    /// Flat per-step estimate, not a token count.
    pub fn estimated_cost(&self) -> f64 {
        f64::from(self.steps_taken) * self.cost_per_step
    }

    /// First triggered condition wins, in the documented order.
    pub fn check(&self, stop_requested: bool) -> Option<StopReason> {
        if stop_requested {
            return Some(StopReason::StopRequested);
        }
        if self.steps_taken >= self.max_steps {
            return Some(StopReason::MaxSteps(self.max_steps));
        }
        if self.consecutive_errors >= self.max_errors {
            return Some(StopReason::MaxErrors(self.max_errors));
        }
        let estimated = self.estimated_cost();
        if estimated >= self.budget_limit {
            return Some(StopReason::BudgetExceeded {
                estimated,
                limit: self.budget_limit,
            });
        }
        self.detect_loop()
    }

    fn detect_loop(&self) -> Option<StopReason> {
        let threshold = self.loop_threshold as usize;
        if self.recent.len() < threshold {
            return None;
        }
        let mut tail = self.recent.iter().rev().take(threshold);
        let (name, signature) = tail.next()?;
        if tail.all(|(_, s)| s == signature) {
            return Some(StopReason::LoopDetected {
                action: name.clone(),
                repeats: self.loop_threshold,
            });
        }
        None
    }
}
