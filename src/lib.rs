pub mod agent;
pub mod artifact;
pub mod config;
pub mod errors;
pub mod events;
pub mod executor;
pub mod gateway;
pub mod orchestrator;
pub mod reviewer;
pub mod session;
pub mod step;
pub mod ui;
pub mod world;
