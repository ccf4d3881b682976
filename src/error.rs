//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use std::fmt;
use thiserror::Error;

/// HTTP-like status used for every timeout-class error.
pub const TIMEOUT_STATUS_CODE: u16 = 504;
/// Error code used for every timeout-class error.
pub const TIMEOUT_CODE: u32 = 50003;
/// HTTP-like status used for invalid-state errors.
pub const INVALID_STATE_STATUS_CODE: u16 = 400;
/// Error code used for invalid-state errors.
pub const INVALID_STATE_CODE: u32 = 40000;

/// A description of an error as reported to the application, mirroring the
/// shape of the `error` member carried by server error frames.
///
/// 以应用程序可见的形式描述的错误，与服务端错误帧中 `error` 成员的结构一致。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Human readable message.
    /// 人类可读的消息。
    pub message: String,
    /// HTTP-like status code.
    /// 类HTTP状态码。
    pub status_code: u16,
    /// Application-level error code.
    /// 应用层错误码。
    pub code: u32,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>, status_code: u16, code: u32) -> Self {
        Self {
            message: message.into(),
            status_code,
            code,
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (statusCode={}, code={})",
            self.message, self.status_code, self.code
        )
    }
}

/// The primary error type for the realtime connection library.
///
/// Errors are `Clone` because a single connection outcome is handed to every
/// caller waiting on the same pending operation.
///
/// 实时连接库的主要错误类型。
///
/// 错误实现了 `Clone`，因为同一个连接结果需要交给等待同一挂起操作的所有调用者。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A connect, close or ping request exceeded `realtime_request_timeout`.
    /// 连接、关闭或ping请求超过了 `realtime_request_timeout`。
    #[error("Timeout: {0}")]
    Timeout(ErrorInfo),

    /// The server reported a non-recoverable error. The connection is failed.
    /// 服务端报告了不可恢复的错误，连接进入失败状态。
    #[error("Fatal error: {0}")]
    Fatal(ErrorInfo),

    /// The operation's preconditions on the connection state were not met.
    /// 操作对连接状态的前置条件不满足。
    #[error("Invalid state: {0}")]
    InvalidState(ErrorInfo),

    /// The transport failed to connect, send or close.
    /// 传输层连接、发送或关闭失败。
    #[error("Transport error: {0}")]
    Transport(String),

    /// A frame had to be sent but no transport exists.
    /// 需要发送帧但没有可用的传输。
    #[error("No transport available")]
    NoTransport,

    /// A pending operation was dropped before anyone resolved it.
    /// 挂起操作在被解决之前就被丢弃了。
    #[error("Operation cancelled before completion")]
    Cancelled,
}

impl Error {
    pub(crate) fn connect_timeout() -> Self {
        Self::timeout("Timeout waiting for realtime connection")
    }

    pub(crate) fn attempt_cancelled() -> Self {
        Self::timeout("Connection cancelled due to request timeout. Attempting reconnection...")
    }

    pub(crate) fn close_timeout() -> Self {
        Self::timeout("Timeout waiting for connection close response")
    }

    pub(crate) fn ping_timeout() -> Self {
        Self::timeout("Timeout waiting for ping response")
    }

    pub(crate) fn ping_cancelled() -> Self {
        Self::timeout("Ping request cancelled due to request timeout")
    }

    fn timeout(message: &str) -> Self {
        Self::Timeout(ErrorInfo::new(message, TIMEOUT_STATUS_CODE, TIMEOUT_CODE))
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(ErrorInfo::new(
            message,
            INVALID_STATE_STATUS_CODE,
            INVALID_STATE_CODE,
        ))
    }

    /// Returns the structured error information, if this kind carries one.
    /// 返回结构化错误信息（如果该类型携带）。
    pub fn info(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Timeout(info) | Self::Fatal(info) | Self::InvalidState(info) => Some(info),
            Self::Transport(_) | Self::NoTransport | Self::Cancelled => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.info().map(|info| info.status_code)
    }

    pub fn code(&self) -> Option<u32> {
        self.info().map(|info| info.code)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        let kind = match &err {
            Error::Timeout(_) => ErrorKind::TimedOut,
            Error::Fatal(_) => ErrorKind::ConnectionRefused,
            Error::InvalidState(_) => ErrorKind::NotConnected,
            Error::Transport(_) => ErrorKind::Other,
            Error::NoTransport => ErrorKind::NotConnected,
            Error::Cancelled => ErrorKind::Interrupted,
        };
        std::io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_errors_carry_codes() {
        for err in [
            Error::connect_timeout(),
            Error::close_timeout(),
            Error::ping_timeout(),
            Error::attempt_cancelled(),
        ] {
            assert!(err.is_timeout());
            assert_eq!(err.status_code(), Some(504));
            assert_eq!(err.code(), Some(50003));
        }
    }

    #[test]
    fn test_invalid_state_codes() {
        let err = Error::invalid_state("Cannot send ping request");
        assert!(!err.is_timeout());
        assert_eq!(err.status_code(), Some(400));
        assert_eq!(err.code(), Some(40000));
    }

    #[test]
    fn test_display_includes_codes() {
        let err = Error::Fatal(ErrorInfo::new("Invalid key", 401, 40101));
        assert_eq!(
            err.to_string(),
            "Fatal error: Invalid key (statusCode=401, code=40101)"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_io_conversions() {
        let io: std::io::Error = Error::connect_timeout().into();
        assert_eq!(io.kind(), std::io::ErrorKind::TimedOut);

        let err: Error = std::io::Error::from(std::io::ErrorKind::BrokenPipe).into();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(err.info(), None);
    }
}
