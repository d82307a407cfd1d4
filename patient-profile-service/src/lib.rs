pub mod clients;
pub mod config;
pub mod frontend;
pub mod models;
pub mod profile_format;
pub mod service;
pub mod tasks;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use config::{Config, ConfigError, ExtractionBackend};
pub use service::{AppState, build_router, create_app};
pub use workflow::{build_profile_workflow, create_flow_runner, create_profile_session};
pub use models::*;
