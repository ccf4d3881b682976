#![deny(clippy::expect_used, clippy::unwrap_used)]

//! The connection-lifecycle core of a realtime pub/sub client.
//! 实时发布/订阅客户端的连接生命周期核心。
//!
//! A [`Connection`] establishes, maintains and tears down one logical
//! connection to the service over a pluggable [`Transport`]. It tracks the
//! connection state, correlates connect, close and ping requests with the
//! frames that answer them, enforces timeouts, and reconnects after a drop.
//!
//! [`Connection`] 通过可插拔的 [`Transport`] 建立、维护并拆除到服务的单个逻辑连接。
//! 它跟踪连接状态，将连接、关闭和ping请求与应答它们的帧关联起来，执行超时，并在断开后重连。

pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod notifier;
pub mod pending;
pub mod protocol;
pub mod state;
pub mod transport;

mod testing;

pub use config::Config;
pub use connection::Connection;
pub use error::{Error, ErrorInfo, Result};
pub use manager::ConnectionManager;
pub use notifier::{ListenerId, StateNotifier};
pub use protocol::{Action, ConnectionDetails, ErrorFrame, ProtocolMessage};
pub use state::{ConnectionState, ConnectionStateChange};
pub use transport::{ChannelDispatcher, NoopDispatcher, ProtocolSink, Transport, TransportFactory};
