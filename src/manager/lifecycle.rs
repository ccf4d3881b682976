//! Connection attempts, their completion handling, and reconnection.
//!
//! 连接尝试、尝试完成处理以及重连。

use super::{dispose_quietly, take_if_same, ManagerCore, ManagerInner};
use crate::{
    error::{Error, Result},
    pending::PendingOperation,
    state::ConnectionState,
    transport::{ProtocolSink, Transport},
};
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// What launched a connection attempt.
/// 启动连接尝试的来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttemptTrigger {
    /// `connect()` or the auto-connect start.
    Request,
    /// The reconnection timer.
    Retry,
}

/// The decision taken under the lock at the top of an attempt.
enum AttemptStep {
    Done,
    Join(Arc<PendingOperation<()>>),
    Open {
        op: Arc<PendingOperation<()>>,
        transport: Arc<dyn Transport>,
        stale: Option<Arc<dyn Transport>>,
    },
}

impl ManagerInner {
    /// Connects, or joins the attempt already in flight. A connect issued
    /// while a close is in progress waits for `closed` and then opens a new
    /// connection.
    ///
    /// 建立连接，或加入正在进行的尝试。在关闭进行期间发起的连接会等待 `closed`，
    /// 然后打开新的连接。
    pub(super) async fn connect(self: &Arc<Self>) -> Result<()> {
        let closed = {
            let core = self.lock();
            (core.state == ConnectionState::Closing)
                .then(|| self.notifier.once(ConnectionState::Closed))
        };
        if let Some(closed) = closed {
            debug!("Connect waits for the close in progress");
            if closed.await.is_err() {
                return Err(Error::Cancelled);
            }
        }

        let (op, launch) = {
            let mut core = self.lock();
            if core.state == ConnectionState::Connected {
                return Ok(());
            }
            match &core.connect_op {
                Some(op) => (op.clone(), false),
                None => {
                    let op = Arc::new(PendingOperation::new());
                    core.connect_op = Some(op.clone());
                    (op, true)
                }
            }
        };

        if launch {
            self.try_connect(AttemptTrigger::Request);
        } else {
            debug!("Joining connection attempt already in flight");
        }
        op.wait().await
    }

    /// Spawns one attempt under a supervisor that runs the completion handler.
    ///
    /// 在一个监督任务下启动一次尝试，由监督任务运行完成处理逻辑。
    pub(super) fn try_connect(self: &Arc<Self>, trigger: AttemptTrigger) {
        if trigger == AttemptTrigger::Request {
            if let Some(retry) = self.lock().retry.take() {
                retry.abort();
                debug!("Explicit connect replaces the scheduled reconnection");
            }
        }

        let manager = self.clone();
        tokio::spawn(async move {
            let attempt = {
                let manager = manager.clone();
                tokio::spawn(async move { manager.attempt(trigger).await })
            };
            let outcome = match attempt.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(error = %err, "Connection attempt task did not complete");
                    Err(Error::attempt_cancelled())
                }
            };
            manager.on_attempt_done(outcome);
        });
    }

    async fn attempt(self: &Arc<Self>, trigger: AttemptTrigger) -> Result<()> {
        let step = {
            let mut core = self.lock();
            let state = core.state;
            let joinable = if state == ConnectionState::Connecting && core.transport.is_some() {
                core.connect_op.clone()
            } else {
                None
            };

            match state {
                ConnectionState::Connected => {
                    if let Some(op) = core.connect_op.take() {
                        op.succeed(());
                    }
                    AttemptStep::Done
                }
                ConnectionState::Closing => {
                    debug!(?trigger, "Skipping attempt while closing");
                    AttemptStep::Done
                }
                ConnectionState::Closed | ConnectionState::Failed
                    if trigger == AttemptTrigger::Retry =>
                {
                    debug!(%state, "Skipping reconnection");
                    AttemptStep::Done
                }
                _ => match joinable {
                    Some(op) => AttemptStep::Join(op),
                    None => self.open_transport(&mut core),
                },
            }
        };

        match step {
            AttemptStep::Done => Ok(()),
            AttemptStep::Join(op) => op.wait().await.map_err(|err| match err {
                Error::Cancelled => Error::attempt_cancelled(),
                err => err,
            }),
            AttemptStep::Open {
                op,
                transport,
                stale,
            } => {
                if let Some(stale) = stale {
                    dispose_quietly(&stale).await;
                }
                if let Err(err) = transport.connect().await {
                    warn!(error = %err, "Transport failed to connect");
                    self.release_transport(&transport).await;
                    return Err(err);
                }
                match timeout(self.config.realtime_request_timeout, op.wait()).await {
                    Ok(outcome) => outcome,
                    Err(_) => self.on_connect_timeout(&op, &transport).await,
                }
            }
        }
    }

    /// Moves to `connecting` and installs a fresh transport.
    ///
    /// 进入 `connecting` 状态并安装一个新的传输。
    fn open_transport(self: &Arc<Self>, core: &mut ManagerCore) -> AttemptStep {
        let op = core
            .connect_op
            .get_or_insert_with(|| Arc::new(PendingOperation::new()))
            .clone();
        if core.state != ConnectionState::Connecting {
            self.enact_state_change(core, ConnectionState::Connecting, None);
        }

        let stale = core.transport.take();
        core.attempts += 1;
        let sink = ProtocolSink::new(Arc::downgrade(self), core.attempts);
        let transport = self.factory.create(sink);
        core.transport = Some(transport.clone());
        debug!(attempt = core.attempts, "Opening transport");

        AttemptStep::Open {
            op,
            transport,
            stale,
        }
    }

    /// Handles an elapsed connect timer. A resolution that landed first wins,
    /// and a connection that is closing, closed or failed keeps its state.
    ///
    /// 处理连接计时器到期。先到达的解决结果优先；正在关闭、已关闭或已失败的连接保持其状态。
    pub(super) async fn on_connect_timeout(
        &self,
        op: &Arc<PendingOperation<()>>,
        transport: &Arc<dyn Transport>,
    ) -> Result<()> {
        let err = Error::connect_timeout();
        let released = {
            let mut core = self.lock();
            if !op.fail(err.clone()) {
                return op.outcome().unwrap_or(Err(Error::Cancelled));
            }
            if core.connect_op.as_ref().is_some_and(|c| Arc::ptr_eq(c, op)) {
                core.connect_op = None;
            }
            let state = core.state;
            if state.is_terminal() || state == ConnectionState::Closing {
                debug!(%state, "Connect timer elapsed after the connection was closed or failed");
            } else {
                self.enact_state_change(&mut core, ConnectionState::Disconnected, Some(err.clone()));
            }
            take_if_same(&mut core.transport, transport)
        };

        warn!(
            timeout = ?self.config.realtime_request_timeout,
            "Timed out waiting for CONNECTED frame"
        );
        if let Some(transport) = released {
            dispose_quietly(&transport).await;
        }
        Err(err)
    }

    /// Runs after every attempt. Failures move the connection to
    /// `disconnected` and schedule exactly one retry.
    ///
    /// 在每次尝试之后运行。失败会使连接进入 `disconnected` 并安排一次重试。
    pub(super) fn on_attempt_done(self: &Arc<Self>, outcome: Result<()>) {
        let Err(err) = outcome else {
            return;
        };

        let mut core = self.lock();
        if matches!(
            core.state,
            ConnectionState::Closing | ConnectionState::Closed | ConnectionState::Failed
        ) {
            debug!(state = %core.state, error = %err, "Attempt failed after the connection was closed or failed");
            return;
        }
        if core.state != ConnectionState::Disconnected {
            if let Some(op) = core.connect_op.take() {
                op.fail(err.clone());
            }
            self.enact_state_change(&mut core, ConnectionState::Disconnected, Some(err));
        }
        self.schedule_retry(&mut core);
    }

    fn schedule_retry(self: &Arc<Self>, core: &mut ManagerCore) {
        if core.retry.as_ref().is_some_and(|retry| !retry.is_finished()) {
            debug!("Reconnection already scheduled");
            return;
        }

        let delay = self.config.disconnected_retry_timeout;
        let manager = Arc::downgrade(self);
        debug!(?delay, "Scheduling reconnection");
        core.retry = Some(tokio::spawn(async move {
            sleep(delay).await;
            let Some(manager) = manager.upgrade() else {
                return;
            };
            manager.lock().retry = None;
            manager.try_connect(AttemptTrigger::Retry);
        }));
    }

    /// Takes `transport` out of the manager if it is still current, then
    /// disposes it.
    ///
    /// 如果 `transport` 仍是当前传输，则将其从管理器中取出并释放。
    async fn release_transport(&self, transport: &Arc<dyn Transport>) {
        let released = take_if_same(&mut self.lock().transport, transport);
        if released.is_some() {
            dispose_quietly(transport).await;
        }
    }
}
