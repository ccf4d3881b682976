//! Defines the connection states and the record produced by each transition.
//!
//! 定义连接状态以及每次状态转换产生的记录。

use crate::error::Error;
use std::fmt;

/// The state of a connection.
/// 连接的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created with `auto_connect` disabled, nothing attempted yet.
    /// 在关闭 `auto_connect` 的情况下创建，尚未尝试连接。
    Initialized,

    /// A connection attempt is in flight.
    /// 正在进行连接尝试。
    Connecting,

    /// The server acknowledged the connection.
    /// 服务端已确认连接。
    Connected,

    /// The last attempt failed; a retry is scheduled.
    /// 上次尝试失败，已安排重试。
    Disconnected,

    /// A close handshake is in progress.
    /// 正在进行关闭握手。
    Closing,

    /// Closed by the application. Only an explicit `connect()` leaves this state.
    /// 已被应用程序关闭。只有显式调用 `connect()` 才能离开此状态。
    Closed,

    /// The server reported a fatal error. No automatic retry happens.
    /// 服务端报告了致命错误，不会自动重试。
    Failed,
}

impl ConnectionState {
    /// States from which no automatic transition occurs.
    /// 不会发生自动转换的终止状态。
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of one state transition.
///
/// 一次状态转换的不可变记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStateChange {
    previous: ConnectionState,
    current: ConnectionState,
    reason: Option<Error>,
}

impl ConnectionStateChange {
    pub fn new(previous: ConnectionState, current: ConnectionState, reason: Option<Error>) -> Self {
        Self {
            previous,
            current,
            reason,
        }
    }

    pub fn previous(&self) -> ConnectionState {
        self.previous
    }

    pub fn current(&self) -> ConnectionState {
        self.current
    }

    /// The error that caused the transition, if any.
    /// 导致此次转换的错误（如果有）。
    pub fn reason(&self) -> Option<&Error> {
        self.reason.as_ref()
    }
}
