//! Error types for orchestrator nodes, worker agents, and collaborator calls.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Failure taxonomy
// ---------------------------------------------------------------------------

/// Failure kinds shared by every node and agent. Serialized `snake_case`
/// so the wire form matches the user-facing error mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorKind {
    InvalidInput,
    SymbolNotFound,
    NoContext,
    /// Retryable collaborator failure (network blip, rate limit).
    TransientExternal,
    PermanentExternal,
    Timeout,
    Cancelled,
    RequiredAgentFailed,
    RenderFailed,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::SymbolNotFound => "symbol_not_found",
            Self::NoContext => "no_context",
            Self::TransientExternal => "transient_external",
            Self::PermanentExternal => "permanent_external",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::RequiredAgentFailed => "required_agent_failed",
            Self::RenderFailed => "render_failed",
            Self::Internal => "internal",
        }
    }

    /// Whether a failure of this kind, absorbed at the agent level, lets
    /// the request keep going. Request-level recoverability is decided at
    /// the record site (a required agent timing out is still fatal).
    pub fn default_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoContext | Self::TransientExternal | Self::Timeout | Self::RenderFailed
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Agent errors
// ---------------------------------------------------------------------------

/// A classified failure produced by a node or agent. Serializable so it can
/// ride inside an [`AgentResult`](crate::types::AgentResult).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct AgentError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AgentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<CapabilityError> for AgentError {
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::Transient { message } => {
                Self::new(ErrorKind::TransientExternal, message)
            }
            CapabilityError::Permanent { message } => {
                Self::new(ErrorKind::PermanentExternal, message)
            }
            CapabilityError::NotFound { what } => {
                Self::new(ErrorKind::PermanentExternal, format!("not found: {what}"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

/// Errors surfaced by collaborator capabilities. The transient/permanent
/// split drives the agents' retry decision; `NotFound` lets callers map
/// lookup misses to a domain kind (`symbol_not_found`, quote not found).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CapabilityError {
    #[error("transient: {message}")]
    Transient { message: String },
    #[error("permanent: {message}")]
    Permanent { message: String },
    #[error("not found: {what}")]
    NotFound { what: String },
}

impl CapabilityError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

// ---------------------------------------------------------------------------
// Builder errors
// ---------------------------------------------------------------------------

/// Errors from [`OrchestratorBuilder::build()`](crate::OrchestratorBuilder::build).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("missing required capability: {name}")]
    MissingCapability { name: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RequiredAgentFailed).unwrap();
        assert_eq!(json, "\"required_agent_failed\"");
        let rt: ErrorKind = serde_json::from_str("\"symbol_not_found\"").unwrap();
        assert_eq!(rt, ErrorKind::SymbolNotFound);
    }

    #[test]
    fn agent_error_display() {
        let e = AgentError::new(ErrorKind::Timeout, "stage deadline");
        assert_eq!(e.to_string(), "timeout: stage deadline");
    }

    #[test]
    fn capability_error_maps_to_agent_error() {
        let e: AgentError = CapabilityError::transient("socket reset").into();
        assert_eq!(e.kind, ErrorKind::TransientExternal);
        let e: AgentError = CapabilityError::permanent("bad request").into();
        assert_eq!(e.kind, ErrorKind::PermanentExternal);
    }

    #[test]
    fn recoverable_defaults() {
        assert!(ErrorKind::Timeout.default_recoverable());
        assert!(ErrorKind::TransientExternal.default_recoverable());
        assert!(!ErrorKind::InvalidInput.default_recoverable());
        assert!(!ErrorKind::RequiredAgentFailed.default_recoverable());
    }
}
