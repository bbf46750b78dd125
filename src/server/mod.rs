pub mod manager;
pub mod routes;
pub mod ws;

pub use manager::AgentManager;
pub use routes::serve;
