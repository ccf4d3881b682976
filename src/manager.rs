//! 连接管理器 - 连接状态机的核心
//! Connection Manager - The core of the connection state machine
//!
//! 管理器拥有传输的生命周期，跟踪当前状态，管理三种关联的挂起操作（连接、关闭、ping），
//! 执行超时并在断开后自动重连。
//!
//! The manager owns the transport's lifecycle, tracks the current state,
//! correlates the three pending operations (connect, close, ping), enforces
//! timeouts and reconnects after a disconnect.
//!
//! 所有可变状态都位于一把互斥锁之后，状态转换与挂起操作的解决在同一临界区内完成。
//! 该锁从不跨越 `.await` 持有。
//!
//! All mutable state lives behind a single mutex so that state transitions and
//! pending-operation resolution happen in one critical section. The lock is
//! never held across an `.await`.

mod close;
mod dispatch;
mod lifecycle;
mod ping;


use crate::{
    config::Config,
    error::{Error, Result},
    notifier::StateNotifier,
    pending::PendingOperation,
    protocol::{ConnectionDetails, ProtocolMessage},
    state::{ConnectionState, ConnectionStateChange},
    transport::{ChannelDispatcher, Transport, TransportFactory},
};
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use lifecycle::AttemptTrigger;

/// An outstanding ping awaiting the heartbeat that echoes its id.
///
/// 等待回显其ID的心跳的未完成ping。
struct PendingPing {
    id: String,
    started: Instant,
    op: Arc<PendingOperation<f64>>,
}

/// The mutable core of the manager, guarded as one unit.
///
/// 管理器的可变核心，作为一个整体受保护。
struct ManagerCore {
    state: ConnectionState,
    error_reason: Option<Error>,
    /// At most one live transport.
    transport: Option<Arc<dyn Transport>>,
    connect_op: Option<Arc<PendingOperation<()>>>,
    close_op: Option<Arc<PendingOperation<()>>>,
    ping: Option<PendingPing>,
    /// The scheduled reconnection, if any.
    retry: Option<JoinHandle<()>>,
    details: Option<ConnectionDetails>,
    /// Number of transports opened so far, which is also the generation of
    /// the live transport.
    attempts: u64,
}

impl ManagerCore {
    /// Whether frames from the transport of `generation` may still be applied.
    fn is_live(&self, generation: u64) -> bool {
        self.transport.is_some() && self.attempts == generation
    }
}

pub(crate) struct ManagerInner {
    config: Config,
    factory: Box<dyn TransportFactory>,
    dispatcher: Arc<dyn ChannelDispatcher>,
    notifier: StateNotifier,
    core: Mutex<ManagerCore>,
}

/// The connection state machine.
///
/// Cloning yields another handle to the same manager.
///
/// 连接状态机。
///
/// 克隆得到的是指向同一管理器的另一个句柄。
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.lock();
        f.debug_struct("ConnectionManager")
            .field("state", &core.state)
            .field("error_reason", &core.error_reason)
            .field("has_transport", &core.transport.is_some())
            .field("attempts", &core.attempts)
            .field("config", &self.inner.config)
            .finish()
    }
}

impl ConnectionManager {
    /// Creates a manager. With `auto_connect` the initial state is
    /// `connecting` and a connect pending operation already exists; call
    /// [`start`](Self::start) to launch the first attempt.
    ///
    /// 创建管理器。启用 `auto_connect` 时初始状态为 `connecting`，且连接挂起操作已存在；
    /// 调用 [`start`](Self::start) 启动第一次尝试。
    pub fn new<F, D>(config: Config, factory: F, dispatcher: D) -> Self
    where
        F: TransportFactory,
        D: ChannelDispatcher,
    {
        let (state, connect_op) = if config.auto_connect {
            (
                ConnectionState::Connecting,
                Some(Arc::new(PendingOperation::new())),
            )
        } else {
            (ConnectionState::Initialized, None)
        };

        let core = ManagerCore {
            state,
            error_reason: None,
            transport: None,
            connect_op,
            close_op: None,
            ping: None,
            retry: None,
            details: None,
            attempts: 0,
        };

        Self {
            inner: Arc::new(ManagerInner {
                config,
                factory: Box::new(factory),
                dispatcher: Arc::new(dispatcher),
                notifier: StateNotifier::new(),
                core: Mutex::new(core),
            }),
        }
    }

    /// Launches the initial attempt of an auto-connecting manager. Must be
    /// called from within a Tokio runtime.
    ///
    /// 启动自动连接管理器的首次尝试。必须在 Tokio 运行时内调用。
    pub fn start(&self) {
        if self.inner.lock().connect_op.is_some() {
            self.inner.try_connect(AttemptTrigger::Request);
        }
    }

    /// Connects, or joins the attempt already in flight.
    /// 建立连接，或加入正在进行的尝试。
    pub async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    pub async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    /// Round-trip time of a heartbeat in milliseconds.
    /// 心跳的往返时间（毫秒）。
    pub async fn ping(&self) -> Result<f64> {
        self.inner.ping().await
    }

    /// Handles one inbound frame as if the live transport delivered it.
    /// Without a live transport the frame is dropped.
    ///
    /// 将一个入站帧视为由当前传输交付来处理。没有当前传输时该帧被丢弃。
    pub async fn on_protocol_message(&self, message: ProtocolMessage) -> Result<()> {
        let generation = self.inner.lock().attempts;
        self.inner.on_protocol_message(generation, message).await
    }

    /// Sends a frame over the current transport.
    /// 通过当前传输发送一个帧。
    pub async fn send_protocol_message(&self, message: ProtocolMessage) -> Result<()> {
        let transport = self.inner.lock().transport.clone();
        match transport {
            Some(transport) => transport.send(message).await,
            None => Err(Error::NoTransport),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn error_reason(&self) -> Option<Error> {
        self.inner.lock().error_reason.clone()
    }

    /// Identity assigned by the server while connected.
    /// 连接期间由服务端分配的标识。
    pub fn connection_details(&self) -> Option<ConnectionDetails> {
        self.inner.lock().details.clone()
    }

    /// The notifier every state transition is published to.
    ///
    /// Listeners run inside the manager's critical section and must not call
    /// back into the manager.
    ///
    /// 每次状态转换都会发布到的通知器。
    ///
    /// 监听器在管理器的临界区内运行，不得回调管理器。
    pub fn notifier(&self) -> &StateNotifier {
        &self.inner.notifier
    }
}

impl ManagerInner {
    fn lock(&self) -> MutexGuard<'_, ManagerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The single mutation point for the connection state.
    ///
    /// 连接状态的唯一修改点。
    fn enact_state_change(
        &self,
        core: &mut ManagerCore,
        state: ConnectionState,
        reason: Option<Error>,
    ) {
        let change = ConnectionStateChange::new(core.state, state, reason.clone());
        core.state = state;
        core.error_reason = reason;

        if state.is_terminal() {
            if let Some(retry) = core.retry.take() {
                retry.abort();
                debug!(state = %state, "Cancelled scheduled reconnection");
            }
            if let Some(ping) = core.ping.take() {
                ping.op.fail(Error::invalid_state(format!(
                    "Ping request abandoned, connection is {state}"
                )));
            }
            core.details = None;
        }

        info!(
            previous = %change.previous(),
            current = %change.current(),
            reason = ?change.reason(),
            "Connection state changed"
        );
        self.notifier.publish(&change);
    }
}

/// Takes the transport out of `slot` if it is the same handle as `transport`.
///
/// 如果 `slot` 中的传输与 `transport` 是同一个句柄，则将其取出。
fn take_if_same(
    slot: &mut Option<Arc<dyn Transport>>,
    transport: &Arc<dyn Transport>,
) -> Option<Arc<dyn Transport>> {
    let same = slot
        .as_ref()
        .is_some_and(|current| std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(transport)));
    if same { slot.take() } else { None }
}

/// Disposes a transport, logging instead of returning failures.
///
/// 释放传输，失败时只记录日志而不返回错误。
async fn dispose_quietly(transport: &Arc<dyn Transport>) {
    if let Err(err) = transport.dispose().await {
        warn!(error = %err, "Failed to dispose transport");
    }
}
