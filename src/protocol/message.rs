//! 定义协议帧的结构。
//! Defines the structure of protocol frames.

use super::action::Action;
use crate::error::ErrorInfo;
use bytes::Bytes;

/// The `error` member of an `ERROR` frame.
///
/// `ERROR` 帧中的 `error` 成员。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFrame {
    pub message: String,
    pub status_code: u16,
    pub code: u32,
    /// `false` means the connection cannot continue.
    /// 为 `false` 时表示连接无法继续。
    pub nonfatal: bool,
}

impl ErrorFrame {
    pub fn is_fatal(&self) -> bool {
        !self.nonfatal
    }

    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.message.clone(), self.status_code, self.code)
    }
}

/// Identity assigned to the connection by the server in its `CONNECTED` frame.
///
/// 服务端在 `CONNECTED` 帧中分配给连接的标识。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionDetails {
    pub connection_id: Option<String>,
    pub connection_key: Option<String>,
}

/// A single structured message exchanged over the transport.
///
/// 通过传输交换的单个结构化消息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    /// Heartbeat in either direction. Pings carry a correlation id that the
    /// server echoes back.
    /// 双向心跳。ping携带由服务端回显的关联ID。
    Heartbeat { id: Option<String> },
    Connected { details: ConnectionDetails },
    Error { error: ErrorFrame },
    Close,
    Closed,
    Attached { channel: String },
    Detached { channel: String },
    Message { channel: String, payload: Bytes },
    /// Any action this layer does not interpret.
    /// 本层不解释的任何其他动作。
    Other { action: Action },
}

impl ProtocolMessage {
    /// Creates a heartbeat carrying a correlation id.
    /// 创建一个携带关联ID的心跳帧。
    pub fn heartbeat(id: impl Into<String>) -> Self {
        ProtocolMessage::Heartbeat {
            id: Some(id.into()),
        }
    }

    pub fn connected(connection_id: impl Into<String>, connection_key: impl Into<String>) -> Self {
        ProtocolMessage::Connected {
            details: ConnectionDetails {
                connection_id: Some(connection_id.into()),
                connection_key: Some(connection_key.into()),
            },
        }
    }

    pub fn error(message: impl Into<String>, status_code: u16, code: u32, nonfatal: bool) -> Self {
        ProtocolMessage::Error {
            error: ErrorFrame {
                message: message.into(),
                status_code,
                code,
                nonfatal,
            },
        }
    }

    /// Returns the action tag of this frame.
    /// 返回此帧的动作标签。
    pub fn action(&self) -> Action {
        match self {
            ProtocolMessage::Heartbeat { .. } => Action::Heartbeat,
            ProtocolMessage::Connected { .. } => Action::Connected,
            ProtocolMessage::Error { .. } => Action::Error,
            ProtocolMessage::Close => Action::Close,
            ProtocolMessage::Closed => Action::Closed,
            ProtocolMessage::Attached { .. } => Action::Attached,
            ProtocolMessage::Detached { .. } => Action::Detached,
            ProtocolMessage::Message { .. } => Action::Message,
            ProtocolMessage::Other { action } => *action,
        }
    }

    /// The correlation id of a heartbeat, if any.
    pub fn heartbeat_id(&self) -> Option<&str> {
        match self {
            ProtocolMessage::Heartbeat { id } => id.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_match_variants() {
        assert_eq!(ProtocolMessage::heartbeat("abc").action(), Action::Heartbeat);
        assert_eq!(ProtocolMessage::connected("id", "key").action(), Action::Connected);
        assert_eq!(ProtocolMessage::Closed.action(), Action::Closed);
        assert_eq!(
            ProtocolMessage::Other { action: Action::Ack }.action(),
            Action::Ack
        );
        assert_eq!(
            ProtocolMessage::Message {
                channel: "news".into(),
                payload: Bytes::from_static(b"hi"),
            }
            .action(),
            Action::Message
        );
    }

    #[test]
    fn test_heartbeat_id() {
        assert_eq!(ProtocolMessage::heartbeat("x1").heartbeat_id(), Some("x1"));
        assert_eq!(ProtocolMessage::Heartbeat { id: None }.heartbeat_id(), None);
        assert_eq!(ProtocolMessage::Close.heartbeat_id(), None);
    }

    #[test]
    fn test_error_frame_fatality() {
        let ProtocolMessage::Error { error } = ProtocolMessage::error("bad token", 401, 40140, false)
        else {
            panic!("expected an error frame");
        };
        assert!(error.is_fatal());
        let info = error.to_error_info();
        assert_eq!(info.status_code, 401);
        assert_eq!(info.code, 40140);
        assert_eq!(info.message, "bad token");
    }
}
