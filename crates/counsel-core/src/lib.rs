pub mod agent;
pub mod case;
pub mod client;
pub mod config;
pub mod error;
pub mod instruction;
pub mod observer;
pub mod pipeline;
pub mod registry;
pub mod types;
pub mod validator;

pub use error::{ConfigError, PipelineError, ProviderError};
pub use types::*;
