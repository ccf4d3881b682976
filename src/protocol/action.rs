//! 定义协议的所有帧动作类型。
//! Defines all frame actions of the realtime protocol.

use std::fmt;

/// The action tag of a protocol frame, with its numeric wire code.
/// 协议帧的动作标签及其数值线路编码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    Heartbeat = 0,
    Ack = 1,
    Nack = 2,
    /// Client request to open a connection.
    /// 客户端打开连接的请求。
    Connect = 3,
    /// Server confirmation that the connection is open.
    /// 服务端确认连接已打开。
    Connected = 4,
    Disconnect = 5,
    Disconnected = 6,
    /// Client request to close the connection.
    /// 客户端关闭连接的请求。
    Close = 7,
    /// Server confirmation that the connection is closed.
    /// 服务端确认连接已关闭。
    Closed = 8,
    Error = 9,
    Attach = 10,
    Attached = 11,
    Detach = 12,
    Detached = 13,
    Presence = 14,
    Message = 15,
    Sync = 16,
    Auth = 17,
}

impl Action {
    /// 从一个字节尝试转换成 `Action`。
    /// Tries to convert a wire code into an `Action`.
    pub fn from_code(code: u8) -> Option<Self> {
        let action = match code {
            0 => Action::Heartbeat,
            1 => Action::Ack,
            2 => Action::Nack,
            3 => Action::Connect,
            4 => Action::Connected,
            5 => Action::Disconnect,
            6 => Action::Disconnected,
            7 => Action::Close,
            8 => Action::Closed,
            9 => Action::Error,
            10 => Action::Attach,
            11 => Action::Attached,
            12 => Action::Detach,
            13 => Action::Detached,
            14 => Action::Presence,
            15 => Action::Message,
            16 => Action::Sync,
            17 => Action::Auth,
            _ => return None,
        };
        Some(action)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// 检查该动作是否属于频道层，由频道分发器处理。
    /// Checks whether frames with this action belong to the channel layer.
    pub fn is_channel_action(self) -> bool {
        matches!(self, Action::Attached | Action::Detached | Action::Message)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Heartbeat => "HEARTBEAT",
            Action::Ack => "ACK",
            Action::Nack => "NACK",
            Action::Connect => "CONNECT",
            Action::Connected => "CONNECTED",
            Action::Disconnect => "DISCONNECT",
            Action::Disconnected => "DISCONNECTED",
            Action::Close => "CLOSE",
            Action::Closed => "CLOSED",
            Action::Error => "ERROR",
            Action::Attach => "ATTACH",
            Action::Attached => "ATTACHED",
            Action::Detach => "DETACH",
            Action::Detached => "DETACHED",
            Action::Presence => "PRESENCE",
            Action::Message => "MESSAGE",
            Action::Sync => "SYNC",
            Action::Auth => "AUTH",
        };
        write!(f, "{}", s)
    }
}
