pub mod actions;
pub mod agent;
pub mod config;
pub mod dashboard;
pub mod device;
pub mod errors;
pub mod events;
pub mod hierarchy;
pub mod llm;
pub mod memory;
pub mod server;
pub mod swarm;
