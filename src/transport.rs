//! Transport layer abstraction for the realtime connection.
//!
//! The connection manager never touches sockets directly. It asks a
//! [`TransportFactory`] for a fresh [`Transport`] on every connection attempt,
//! drives that transport through `connect`/`send`/`close`/`dispose`, and
//! receives inbound frames through the [`ProtocolSink`] handed to the factory.
//!
//! 实时连接的传输层抽象。
//!
//! 连接管理器从不直接操作套接字。每次连接尝试时，它向 [`TransportFactory`]
//! 请求一个新的 [`Transport`]，通过 `connect`/`send`/`close`/`dispose` 驱动该传输，
//! 并通过交给工厂的 [`ProtocolSink`] 接收入站帧。

use crate::{
    error::{Error, Result},
    manager::ManagerInner,
    protocol::ProtocolMessage,
};
use async_trait::async_trait;
use std::{
    fmt::{self, Debug},
    sync::{Arc, Weak},
};
use tracing::debug;

/// A single bidirectional message channel to the server.
///
/// 到服务端的单个双向消息通道。
#[async_trait]
pub trait Transport: Send + Sync + Debug + 'static {
    /// Starts opening the channel. Completion of the protocol-level handshake
    /// is signalled separately by a `CONNECTED` frame.
    ///
    /// 开始打开通道。协议层握手的完成由 `CONNECTED` 帧单独通知。
    async fn connect(&self) -> Result<()>;

    /// 发送一个协议帧。
    /// Sends one protocol frame.
    async fn send(&self, message: ProtocolMessage) -> Result<()>;

    /// Starts the close handshake. The server answers with a `CLOSED` frame.
    ///
    /// 开始关闭握手。服务端以 `CLOSED` 帧应答。
    async fn close(&self) -> Result<()>;

    /// Releases every resource held by the transport. Must be idempotent.
    ///
    /// 释放传输持有的所有资源。必须是幂等的。
    async fn dispose(&self) -> Result<()>;

    /// Whether the server has acknowledged this transport's connection.
    /// 服务端是否已确认此传输的连接。
    fn is_connected(&self) -> bool;

    /// Set by the manager when a `CONNECTED` frame arrives.
    /// 在收到 `CONNECTED` 帧时由管理器设置。
    fn set_connected(&self, connected: bool);

    /// Waits for any background connect task the transport runs, so a close
    /// does not leave it running.
    ///
    /// 等待传输运行的后台连接任务结束，避免关闭后该任务仍在运行。
    async fn wait_connect_task(&self) {}
}

/// Creates a new transport for each connection attempt.
///
/// 为每次连接尝试创建新的传输。
pub trait TransportFactory: Send + Sync + 'static {
    fn create(&self, sink: ProtocolSink) -> Arc<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn(ProtocolSink) -> Arc<dyn Transport> + Send + Sync + 'static,
{
    fn create(&self, sink: ProtocolSink) -> Arc<dyn Transport> {
        self(sink)
    }
}

/// Receives frames addressed to the channel layer (`ATTACHED`, `DETACHED`,
/// `MESSAGE`), which this crate forwards without interpreting.
///
/// 接收发往频道层的帧（`ATTACHED`、`DETACHED`、`MESSAGE`），本库只转发不解释。
pub trait ChannelDispatcher: Send + Sync + 'static {
    fn on_channel_message(&self, message: ProtocolMessage);
}

/// A dispatcher that drops channel frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDispatcher;

impl ChannelDispatcher for NoopDispatcher {
    fn on_channel_message(&self, message: ProtocolMessage) {
        debug!(action = %message.action(), "No channel dispatcher installed, dropping frame");
    }
}

/// The transport's way back into the connection manager.
///
/// Holds a weak reference so a transport kept alive by a background task does
/// not keep the manager alive. Each sink is bound to the attempt that created
/// its transport; frames delivered after that transport was replaced or
/// released are dropped.
///
/// 传输回到连接管理器的入口。
///
/// 持有弱引用，这样被后台任务保持存活的传输不会使管理器保持存活。每个接收端绑定到
/// 创建其传输的那次尝试；该传输被替换或释放之后交付的帧会被丢弃。
#[derive(Clone)]
pub struct ProtocolSink {
    manager: Weak<ManagerInner>,
    generation: u64,
}

impl ProtocolSink {
    pub(crate) fn new(manager: Weak<ManagerInner>, generation: u64) -> Self {
        Self {
            manager,
            generation,
        }
    }

    /// Delivers an inbound frame. Frames must be delivered one at a time in
    /// arrival order.
    ///
    /// Returns the fatal error carried by an `ERROR` frame, so the transport's
    /// read loop can stop.
    ///
    /// 交付一个入站帧。帧必须按到达顺序逐个交付。
    ///
    /// 返回 `ERROR` 帧携带的致命错误，以便传输的读取循环可以停止。
    pub async fn deliver(&self, message: ProtocolMessage) -> Result<()> {
        match self.manager.upgrade() {
            Some(inner) => inner.on_protocol_message(self.generation, message).await,
            None => Err(Error::Cancelled),
        }
    }
}

impl Debug for ProtocolSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolSink")
            .field("generation", &self.generation)
            .field("manager_alive", &(self.manager.strong_count() > 0))
            .finish()
    }
}
