pub mod control;
pub mod decision;
pub mod engine;
pub mod guard;
pub mod history;
pub mod prompts;
pub mod state;

pub use control::{ControlState, RunControl};
pub use engine::AndroidAgent;
pub use guard::{StopGuard, StopReason};
pub use state::{AgentRunResult, AgentStep};
