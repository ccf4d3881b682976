//! Heartbeat pings with correlation ids.
//!
//! 带关联ID的心跳ping。

use super::{ManagerInner, PendingPing};
use crate::{
    error::{Error, Result},
    pending::PendingOperation,
    protocol::ProtocolMessage,
    state::ConnectionState,
    transport::Transport,
};
use rand::{distr::Alphanumeric, Rng};
use std::sync::Arc;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

const CORRELATION_ID_LEN: usize = 16;

enum PingPlan {
    Join(Arc<PendingOperation<f64>>),
    Send {
        op: Arc<PendingOperation<f64>>,
        id: String,
        transport: Arc<dyn Transport>,
    },
}

/// Generates an opaque token for matching a heartbeat reply to its request.
///
/// 生成一个不透明令牌，用于将心跳应答与其请求匹配。
fn correlation_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(CORRELATION_ID_LEN)
        .map(char::from)
        .collect()
}

/// Milliseconds between `started` and `now`, rounded to two decimals.
///
/// `started` 与 `now` 之间的毫秒数，保留两位小数。
pub(super) fn round_trip_ms(started: Instant, now: Instant) -> f64 {
    let ms = now.saturating_duration_since(started).as_secs_f64() * 1000.0;
    (ms * 100.0).round() / 100.0
}

impl ManagerInner {
    pub(super) async fn ping(&self) -> Result<f64> {
        let plan = {
            let mut core = self.lock();
            if let Some(ping) = &core.ping {
                PingPlan::Join(ping.op.clone())
            } else if !matches!(
                core.state,
                ConnectionState::Connected | ConnectionState::Connecting
            ) {
                return Err(Error::invalid_state(format!(
                    "Cannot send ping request. Calling ping in invalid state: {}",
                    core.state
                )));
            } else {
                let transport = core.transport.clone().ok_or_else(|| {
                    Error::invalid_state(
                        "Cannot send ping request. No transport has been opened yet",
                    )
                })?;
                let op = Arc::new(PendingOperation::new());
                let id = correlation_id();
                core.ping = Some(PendingPing {
                    id: id.clone(),
                    started: Instant::now(),
                    op: op.clone(),
                });
                PingPlan::Send { op, id, transport }
            }
        };

        let (op, id, transport) = match plan {
            PingPlan::Join(op) => {
                debug!("Joining ping already in flight");
                return op.wait().await.map_err(|err| match err {
                    Error::Cancelled => Error::ping_cancelled(),
                    err => err,
                });
            }
            PingPlan::Send { op, id, transport } => (op, id, transport),
        };

        debug!(%id, "Sending heartbeat ping");
        if let Err(err) = transport.send(ProtocolMessage::heartbeat(id)).await {
            self.clear_ping(&op);
            op.fail(err.clone());
            return Err(err);
        }

        match timeout(self.config.realtime_request_timeout, op.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                if op.fail(Error::ping_timeout()) {
                    self.clear_ping(&op);
                    warn!(
                        timeout = ?self.config.realtime_request_timeout,
                        "Timed out waiting for heartbeat reply"
                    );
                }
                op.outcome().unwrap_or(Err(Error::Cancelled))
            }
        }
    }

    fn clear_ping(&self, op: &Arc<PendingOperation<f64>>) {
        let mut core = self.lock();
        if core.ping.as_ref().is_some_and(|ping| Arc::ptr_eq(&ping.op, op)) {
            core.ping = None;
        }
    }
}
