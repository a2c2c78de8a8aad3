pub mod config;
pub mod error;
pub mod types;

pub use config::SessionConfig;
pub use error::{ConfigurationError, PlacementError, Result, SchemaViolation, SessionError};
