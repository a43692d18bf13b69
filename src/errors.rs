use thiserror::Error;

/// Every failure the client can surface. Mirrors the three kinds the session
/// distinguishes: the backend not being reachable yet, a single remote call
/// failing, and input rejected before any call is made.
///
/// `Clone` because one in-flight creation result is handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    // ── Readiness ────────────────────────────────────────────────────────────
    #[error("Backend is not reachable yet")]
    NotReady,

    // ── Remote failures ──────────────────────────────────────────────────────
    #[error("Network error during {operation}: {message}")]
    Network { operation: String, message: String },

    #[error("Server returned {status} during {operation}")]
    Status { operation: String, status: u16 },

    #[error("Could not decode {operation} response: {message}")]
    Decode { operation: String, message: String },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Field '{field_name}' is invalid: {message}")]
    InvalidField { field_name: String, message: String },

    #[error("Conversation '{id}' not found")]
    ConversationNotFound { id: String },

    #[error("Document '{id}' not found")]
    DocumentNotFound { id: String },

    #[error("No conversation is selected")]
    NoActiveConversation,

    // ── Configuration ────────────────────────────────────────────────────────
    #[error("Missing configuration value {key}")]
    MissingConfig { key: String },

    // ── Lifecycle ────────────────────────────────────────────────────────────
    #[error("Session was shut down before the result could be applied")]
    Cancelled,
}

impl ClientError {
    pub fn network(operation: impl Into<String>, source: impl std::fmt::Display) -> Self {
        ClientError::Network { operation: operation.into(), message: source.to_string() }
    }

    pub fn decode(operation: impl Into<String>, source: impl std::fmt::Display) -> Self {
        ClientError::Decode { operation: operation.into(), message: source.to_string() }
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, ClientError::NotReady)
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ClientError::EmptyField { .. }
                | ClientError::InvalidField { .. }
                | ClientError::ConversationNotFound { .. }
                | ClientError::DocumentNotFound { .. }
                | ClientError::NoActiveConversation
        )
    }

    /// A single remote call failed; the session stays usable.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Network { .. } | ClientError::Status { .. } | ClientError::Decode { .. }
        )
    }
}
