pub mod attachment;
pub mod capability;
pub mod config;
mod config_env;
pub mod content;
pub mod drafts;
pub mod error;
pub mod fallback;
pub mod models;
pub mod orchestrator;
pub mod remote;
pub mod sanitizer;
pub mod session;
pub mod telemetry;

pub use error::{ErrorKind, OrchestratorError};
pub use orchestrator::{OperationOutput, Orchestrator};
