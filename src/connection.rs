//! 定义了面向用户的连接句柄。
//! Defines the user-facing connection handle.
//!
//! [`Connection`] 是 [`ConnectionManager`] 之上的一层薄封装。它镜像当前状态和错误原因，
//! 并在之后的调度轮次中把每一次状态变化重新发布给外部监听器，因此监听器永远不会在管理器
//! 的状态修改路径中运行，可以安全地回调连接。
//!
//! [`Connection`] is a thin layer over [`ConnectionManager`]. It mirrors the
//! current state and error reason, and re-publishes every state change to
//! external listeners on a later scheduler turn, so listeners never run inside
//! the manager's state-mutation path and may call back into the connection.

use crate::{
    config::Config,
    error::{Error, Result},
    manager::ConnectionManager,
    notifier::{ListenerId, StateNotifier},
    state::{ConnectionState, ConnectionStateChange},
    transport::{ChannelDispatcher, NoopDispatcher, TransportFactory},
};
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::trace;

/// The last observed state, kept current by the manager subscription.
#[derive(Debug)]
struct Snapshot {
    state: ConnectionState,
    error_reason: Option<Error>,
}

/// A realtime connection.
///
/// 一个实时连接。
pub struct Connection {
    manager: ConnectionManager,
    snapshot: Arc<Mutex<Snapshot>>,
    listeners: Arc<StateNotifier>,
    forwarder: JoinHandle<()>,
    subscription: ListenerId,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("snapshot", &*self.snapshot())
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl Connection {
    /// Creates a connection whose channel frames are dropped.
    ///
    /// Must be called from within a Tokio runtime. With `auto_connect` the
    /// first attempt starts immediately.
    ///
    /// 创建一个丢弃频道帧的连接。
    ///
    /// 必须在 Tokio 运行时内调用。启用 `auto_connect` 时第一次尝试立即开始。
    pub fn new<F>(config: Config, factory: F) -> Result<Self>
    where
        F: TransportFactory,
    {
        Self::with_dispatcher(config, factory, NoopDispatcher)
    }

    /// Creates a connection that forwards channel frames to `dispatcher`.
    ///
    /// 创建一个将频道帧转发给 `dispatcher` 的连接。
    pub fn with_dispatcher<F, D>(config: Config, factory: F, dispatcher: D) -> Result<Self>
    where
        F: TransportFactory,
        D: ChannelDispatcher,
    {
        config.validate()?;
        let auto_connect = config.auto_connect;
        let manager = ConnectionManager::new(config, factory, dispatcher);

        let snapshot = Arc::new(Mutex::new(Snapshot {
            state: manager.state(),
            error_reason: manager.error_reason(),
        }));
        let listeners = Arc::new(StateNotifier::new());
        let (tx, rx) = mpsc::unbounded_channel();

        let subscription = {
            let snapshot = snapshot.clone();
            manager.notifier().subscribe(move |change: &ConnectionStateChange| {
                {
                    let mut snapshot = snapshot.lock().unwrap_or_else(PoisonError::into_inner);
                    snapshot.state = change.current();
                    snapshot.error_reason = change.reason().cloned();
                }
                // The receiver only goes away once the connection is dropped.
                let _ = tx.send(change.clone());
            })
        };
        let forwarder = tokio::spawn(forward(rx, listeners.clone()));

        if auto_connect {
            manager.start();
        }

        Ok(Self {
            manager,
            snapshot,
            listeners,
            forwarder,
            subscription,
        })
    }

    pub async fn connect(&self) -> Result<()> {
        self.manager.connect().await
    }

    pub async fn close(&self) -> Result<()> {
        self.manager.close().await
    }

    /// Round-trip time of a heartbeat in milliseconds.
    /// 心跳的往返时间（毫秒）。
    pub async fn ping(&self) -> Result<f64> {
        self.manager.ping().await
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot().state
    }

    /// The cause of the most recent transition, if it had one.
    /// 最近一次状态转换的原因（如果有）。
    pub fn error_reason(&self) -> Option<Error> {
        self.snapshot().error_reason.clone()
    }

    /// Connection id assigned by the server, while connected.
    /// 连接期间由服务端分配的连接ID。
    pub fn id(&self) -> Option<String> {
        self.manager.connection_details()?.connection_id
    }

    /// Connection key assigned by the server, while connected.
    /// 连接期间由服务端分配的连接密钥。
    pub fn key(&self) -> Option<String> {
        self.manager.connection_details()?.connection_key
    }

    /// 注册一个接收所有状态变化的监听器
    /// Registers a listener for every state change
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionStateChange) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    /// 注册一个只接收进入 `state` 的变化的监听器
    /// Registers a listener for changes entering `state` only
    pub fn on_state<F>(&self, state: ConnectionState, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionStateChange) + Send + Sync + 'static,
    {
        self.listeners.subscribe_to(state, listener)
    }

    /// Resolves on the next change entering `state`.
    /// 在下一次进入 `state` 的变化发生时完成。
    pub fn once(&self, state: ConnectionState) -> oneshot::Receiver<ConnectionStateChange> {
        self.listeners.once(state)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    fn snapshot(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.manager.notifier().unsubscribe(self.subscription);
        self.forwarder.abort();
    }
}

/// Re-publishes manager changes to external listeners, in order.
async fn forward(
    mut rx: mpsc::UnboundedReceiver<ConnectionStateChange>,
    listeners: Arc<StateNotifier>,
) {
    while let Some(change) = rx.recv().await {
        trace!(current = %change.current(), "Forwarding state change");
        listeners.publish(&change);
    }
}
