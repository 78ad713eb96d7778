//! Agent error types

use thiserror::Error;

/// Result type for scheduler operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Conditions that stop the agent. Everything else is absorbed and logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// Link-layer hardware is not present or not responding
    #[error("Link-layer module not found")]
    NoModule,
}
