use thiserror::Error;

/// 传输层错误
///
/// 任何传输错误都只终止所属连接，不会影响 Hub 或其他连接。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection already closed")]
    Closed,
    #[error("write deadline exceeded")]
    WriteTimeout,
    #[error("frame exceeds the {limit}-byte limit")]
    FrameTooLarge { limit: usize },
    #[error("transport io error: {0}")]
    Io(String),
}

impl TransportError {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}
