//! The close path.
//!
//! 关闭流程。

use super::{dispose_quietly, ManagerInner};
use crate::{
    error::{Error, Result},
    pending::PendingOperation,
    state::ConnectionState,
    transport::Transport,
};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// How a close request proceeds, decided under the lock.
enum ClosePlan {
    Done,
    Dispose(Arc<dyn Transport>),
    AwaitConnect(Arc<PendingOperation<()>>),
    JoinClose(Arc<PendingOperation<()>>),
    Handshake,
}

impl ManagerInner {
    pub(super) async fn close(&self) -> Result<()> {
        let plan = {
            let mut core = self.lock();
            let state = core.state;
            match state {
                ConnectionState::Closed | ConnectionState::Initialized | ConnectionState::Failed => {
                    self.enact_state_change(&mut core, ConnectionState::Closed, None);
                    ClosePlan::Done
                }
                ConnectionState::Disconnected => match core.transport.take() {
                    Some(transport) => {
                        self.enact_state_change(&mut core, ConnectionState::Closed, None);
                        ClosePlan::Dispose(transport)
                    }
                    None => ClosePlan::Handshake,
                },
                ConnectionState::Connecting => {
                    warn!("Close called while connecting, waiting for the attempt to settle");
                    match &core.connect_op {
                        Some(op) => ClosePlan::AwaitConnect(op.clone()),
                        None => ClosePlan::Handshake,
                    }
                }
                ConnectionState::Closing => match &core.close_op {
                    Some(op) => ClosePlan::JoinClose(op.clone()),
                    None => ClosePlan::Handshake,
                },
                ConnectionState::Connected => ClosePlan::Handshake,
            }
        };

        match plan {
            ClosePlan::Done => Ok(()),
            ClosePlan::Dispose(transport) => {
                dispose_quietly(&transport).await;
                Ok(())
            }
            ClosePlan::AwaitConnect(op) => {
                if let Err(err) = op.wait().await {
                    debug!(error = %err, "Connection attempt failed before close");
                }
                self.close_handshake().await
            }
            ClosePlan::JoinClose(op) => {
                debug!("Joining close already in progress");
                op.wait().await
            }
            ClosePlan::Handshake => self.close_handshake().await,
        }
    }

    /// Sends the close request when a connected transport exists, waits for
    /// `CLOSED` within `realtime_request_timeout`, and always ends `closed`.
    ///
    /// 存在已连接的传输时发送关闭请求，在 `realtime_request_timeout` 内等待 `CLOSED`，
    /// 最终总是进入 `closed` 状态。
    async fn close_handshake(&self) -> Result<()> {
        let (op, transport) = {
            let mut core = self.lock();
            self.enact_state_change(&mut core, ConnectionState::Closing, None);
            let op = Arc::new(PendingOperation::new());
            core.close_op = Some(op.clone());
            (op, core.transport.clone())
        };

        let mut result = Ok(());
        match transport.filter(|transport| transport.is_connected()) {
            Some(transport) => match transport.close().await {
                Ok(()) => {
                    let waited = timeout(self.config.realtime_request_timeout, op.wait()).await;
                    if waited.is_err() && op.fail(Error::close_timeout()) {
                        warn!(
                            timeout = ?self.config.realtime_request_timeout,
                            "Timed out waiting for CLOSED frame, closing anyway"
                        );
                        result = Err(Error::close_timeout());
                    }
                }
                Err(err) => {
                    warn!(error = %err, "Transport failed to send close request, closing anyway");
                    op.succeed(());
                }
            },
            None => {
                warn!("Close called with no connected transport, skipping close handshake");
                op.succeed(());
            }
        }

        let transport = {
            let mut core = self.lock();
            if core.close_op.as_ref().is_some_and(|c| Arc::ptr_eq(c, &op)) {
                core.close_op = None;
            }
            if let Some(connect) = core.connect_op.take() {
                connect.fail(Error::invalid_state(
                    "Connection closed before the connection attempt completed",
                ));
            }
            self.enact_state_change(&mut core, ConnectionState::Closed, None);
            core.transport.take()
        };

        if let Some(transport) = transport {
            transport.wait_connect_task().await;
            dispose_quietly(&transport).await;
        }
        result
    }
}
