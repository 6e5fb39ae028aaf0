//! The orchestrator-wide error taxonomy, spec §7.
//!
//! Every user-visible failure carries a stable `error_code`, a short
//! message, an optional remediation hint, whether it is retriable, and a
//! correlation id. Subsystem-local errors (queue, checkpoint store, URG)
//! are small `thiserror` enums of their own, the way the teacher's
//! `DatabaseError` wraps `sqlx::Error`; they convert into
//! `OrchestratorError` at the service boundary.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        correlation_id: Uuid,
    },
    #[error("not found: {message}")]
    NotFound {
        message: String,
        correlation_id: Uuid,
    },
    #[error("unauthorized: {message}")]
    Unauthorized {
        message: String,
        correlation_id: Uuid,
    },
    #[error("conflict: {message}")]
    Conflict {
        message: String,
        correlation_id: Uuid,
    },
    #[error("expired: {message}")]
    Expired {
        message: String,
        correlation_id: Uuid,
    },
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        correlation_id: Uuid,
    },
    #[error("retryable failure: {message}")]
    Retryable {
        message: String,
        correlation_id: Uuid,
    },
    #[error("fatal error: {message}")]
    Fatal {
        message: String,
        correlation_id: Uuid,
    },
}

impl OrchestratorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn expired(message: impl Into<String>) -> Self {
        Self::Expired {
            message: message.into(),
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Stable machine-readable code, used in CLI `--json` output and
    /// structured logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Conflict { .. } => "conflict",
            Self::Expired { .. } => "expired",
            Self::RateLimited { .. } => "rate_limited",
            Self::Retryable { .. } => "retryable",
            Self::Fatal { .. } => "fatal",
        }
    }

    /// Whether a caller should retry this operation unchanged.
    pub fn retriable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Retryable { .. })
    }

    pub fn correlation_id(&self) -> Uuid {
        match self {
            Self::Validation { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::Expired { correlation_id, .. }
            | Self::RateLimited { correlation_id, .. }
            | Self::Retryable { correlation_id, .. }
            | Self::Fatal { correlation_id, .. } => *correlation_id,
        }
    }

    /// The process exit code this error should map to on the CLI surface
    /// (spec §6): `2` for RBAC denial, `1` for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unauthorized { .. } => 2,
            _ => 1,
        }
    }
}
