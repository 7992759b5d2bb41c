use thiserror::Error;
use super::types::ErrorReason;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Manager shut down")]
    ManagerShutdown,

    #[error("Worker panicked: {0}")]
    WorkerPanic(String),
}

/// Error alias
pub type Result<T, E = QueueError> = std::result::Result<T, E>;

/// 传输层错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Network,
    Server,
    /// 调用方主动中止
    Aborted,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportErrorKind::Network => write!(f, "network"),
            TransportErrorKind::Server => write!(f, "server"),
            TransportErrorKind::Aborted => write!(f, "aborted"),
        }
    }
}

/// 传输协作方返回的错误
#[derive(Error, Debug, Clone)]
#[error("Transport {kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Network,
            message: message.into(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Server,
            message: message.into(),
        }
    }

    pub fn aborted() -> Self {
        Self {
            kind: TransportErrorKind::Aborted,
            message: "upload was aborted".to_string(),
        }
    }
}

impl From<TransportErrorKind> for ErrorReason {
    fn from(kind: TransportErrorKind) -> Self {
        match kind {
            TransportErrorKind::Network => ErrorReason::Network,
            TransportErrorKind::Server => ErrorReason::Server,
            TransportErrorKind::Aborted => ErrorReason::Cancelled,
        }
    }
}
