pub mod client;
pub mod scroll;
pub mod state;

pub use client::DashboardClient;
pub use scroll::ScrollPane;
pub use state::{DashboardState, LogEntry, MessageOutcome, View};
