//! Error types for the coordinator.

use aofc_status::ParseError;
use thiserror::Error;

/// Failure talking to a store instance.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure (connect, read, write, or peer closed).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The call did not complete before its deadline.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The store answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// The store answered with something we cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Whether the failure left the connection in an unknown state.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Timeout(_) | ClientError::Protocol(_)
        )
    }
}

/// Coordination errors, always tagged with the instance they concern.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The status query could not be completed.
    #[error("status query to {instance} failed: {source}")]
    Query {
        instance: String,
        #[source]
        source: ClientError,
    },

    /// The status report contained a malformed value.
    #[error("status report from {instance} rejected: {source}")]
    Parse {
        instance: String,
        #[source]
        source: ParseError,
    },

    /// The rewrite command failed.
    #[error("rewrite trigger on {instance} failed: {source}")]
    Trigger {
        instance: String,
        #[source]
        source: ClientError,
    },
}

impl CoordinatorError {
    /// The instance the error concerns.
    pub fn instance(&self) -> &str {
        match self {
            CoordinatorError::Query { instance, .. }
            | CoordinatorError::Parse { instance, .. }
            | CoordinatorError::Trigger { instance, .. } => instance,
        }
    }

    /// Short machine-readable label, used as a log field.
    pub fn reason_code(&self) -> &'static str {
        match self {
            CoordinatorError::Query { .. } => "query_failed",
            CoordinatorError::Parse { .. } => "parse_failed",
            CoordinatorError::Trigger { .. } => "trigger_failed",
        }
    }
}
