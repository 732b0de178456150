use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("metric name must not be empty")]
    EmptyName,

    #[error("negative delta {delta} for counter {name}")]
    NegativeDelta { name: String, delta: i64 },

    #[error("missing metric id")]
    MissingId,

    #[error("missing metric type for {id}")]
    MissingKind { id: String },

    #[error("unknown metric type: {0}")]
    UnknownKind(String),

    #[error("missing {field} for {kind} metric {id}")]
    MissingField {
        id: String,
        kind: &'static str,
        field: &'static str,
    },

    #[error("metric not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("storage backend not connected: {0}")]
    NotConnected(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server responded with status {status}")]
    HttpStatus { status: u16 },

    #[error("GRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("signature mismatch")]
    BadSignature,

    #[error("delivery cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("channel closed")]
    ChannelClosed,

    #[error("timeout: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Result type alias for vigil operations
pub type Result<T> = std::result::Result<T, VigilError>;

impl VigilError {
    /// Creates a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a new not-connected error
    pub fn not_connected<S: Into<String>>(msg: S) -> Self {
        Self::NotConnected(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Returns true if this is a client-caused validation error.
    ///
    /// Validation errors are never retried and map to a 4xx class at the
    /// transport boundary.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyName
                | Self::NegativeDelta { .. }
                | Self::MissingId
                | Self::MissingKind { .. }
                | Self::UnknownKind(_)
                | Self::MissingField { .. }
        )
    }

    /// Returns true if a delivery attempt hitting this error may be retried.
    ///
    /// Only network-level connection failures and the GRPC
    /// `Unavailable`/`DeadlineExceeded` codes qualify; everything else is
    /// permanent for the attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Timeout { .. } => true,
            Self::Grpc(status) => {
                matches!(status.code(), tonic::Code::Unavailable | tonic::Code::DeadlineExceeded)
            },
            _ => false,
        }
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::EmptyName
            | Self::NegativeDelta { .. }
            | Self::MissingKind { .. }
            | Self::UnknownKind(_)
            | Self::MissingField { .. } => "validation",
            // A record without an identifier addresses nothing, so it maps
            // to the not-found class rather than bad-request.
            Self::MissingId | Self::NotFound(_) => "not_found",
            Self::Storage(_) | Self::NotConnected(_) => "backend",
            Self::Config(_) => "config",
            Self::Network(_) | Self::Transport(_) | Self::Grpc(_) | Self::HttpStatus { .. } => {
                "transport"
            },
            Self::BadSignature => "auth",
            Self::Cancelled => "cancelled",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Join(_) => "async",
            Self::ChannelClosed => "channel",
            Self::Timeout { .. } => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(VigilError::EmptyName.is_validation());
        assert!(VigilError::NegativeDelta {
            name: "hits".into(),
            delta: -1,
        }
        .is_validation());
        assert!(!VigilError::storage("down").is_validation());
    }

    #[test]
    fn test_transient_classification() {
        assert!(VigilError::network("connection refused").is_transient());
        assert!(VigilError::Grpc(tonic::Status::unavailable("backoff")).is_transient());
        assert!(VigilError::Grpc(tonic::Status::deadline_exceeded("slow")).is_transient());
        assert!(!VigilError::Grpc(tonic::Status::invalid_argument("bad")).is_transient());
        assert!(!VigilError::HttpStatus { status: 500 }.is_transient());
        assert!(!VigilError::EmptyName.is_transient());
    }

    #[test]
    fn test_category() {
        assert_eq!(VigilError::EmptyName.category(), "validation");
        assert_eq!(VigilError::not_connected("no dsn").category(), "backend");
        assert_eq!(VigilError::HttpStatus { status: 502 }.category(), "transport");
    }
}
