//! Inbound protocol frame dispatch.
//!
//! 入站协议帧分发。

use super::{dispose_quietly, ping::round_trip_ms, ManagerInner};
use crate::{
    error::{Error, Result},
    protocol::{ConnectionDetails, ErrorFrame, ProtocolMessage},
    state::ConnectionState,
};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

impl ManagerInner {
    /// Handles one inbound frame delivered by the transport of `generation`.
    /// Frames are handled one at a time in the order the transport delivers
    /// them. Frames from a transport that is no longer live are dropped.
    ///
    /// 处理由第 `generation` 代传输交付的一个入站帧。帧按传输交付的顺序逐个处理。
    /// 来自已不再存活的传输的帧会被丢弃。
    pub(crate) async fn on_protocol_message(
        &self,
        generation: u64,
        message: ProtocolMessage,
    ) -> Result<()> {
        if !self.lock().is_live(generation) {
            debug!(generation, action = %message.action(), "Dropping frame from a released transport");
            return Ok(());
        }

        match message {
            ProtocolMessage::Connected { details } => {
                self.on_connected(generation, details);
                Ok(())
            }
            ProtocolMessage::Error { error } if error.is_fatal() => {
                self.on_fatal_error(generation, &error).await
            }
            ProtocolMessage::Error { error } => {
                debug!(
                    message = %error.message,
                    code = error.code,
                    "Non-fatal error frame left to higher layers"
                );
                Ok(())
            }
            ProtocolMessage::Closed => {
                self.on_closed(generation).await;
                Ok(())
            }
            ProtocolMessage::Heartbeat { id } => {
                self.on_heartbeat(id.as_deref());
                Ok(())
            }
            message if message.action().is_channel_action() => {
                self.dispatcher.on_channel_message(message);
                Ok(())
            }
            message => {
                debug!(action = %message.action(), "Ignoring frame");
                Ok(())
            }
        }
    }

    fn on_connected(&self, generation: u64, details: ConnectionDetails) {
        let mut core = self.lock();
        if !core.is_live(generation) || core.state != ConnectionState::Connecting {
            warn!(state = %core.state, "Ignoring CONNECTED frame outside a connection attempt");
            return;
        }
        if let Some(transport) = &core.transport {
            transport.set_connected(true);
        }
        match core.connect_op.take() {
            Some(op) => {
                op.succeed(());
            }
            None => warn!("CONNECTED frame received but no connect was pending"),
        }
        debug!(
            connection_id = ?details.connection_id,
            "Server assigned connection details"
        );
        core.details = Some(details);
        self.enact_state_change(&mut core, ConnectionState::Connected, None);
    }

    /// A fatal error fails the connection for good: no retry follows.
    ///
    /// 致命错误使连接永久失败：之后不会重试。
    async fn on_fatal_error(&self, generation: u64, frame: &ErrorFrame) -> Result<()> {
        let err = Error::Fatal(frame.to_error_info());
        let transport = {
            let mut core = self.lock();
            if !core.is_live(generation) {
                return Ok(());
            }
            self.enact_state_change(&mut core, ConnectionState::Failed, Some(err.clone()));
            if let Some(op) = core.connect_op.take() {
                op.fail(err.clone());
            }
            core.transport.take()
        };

        warn!(error = %err, "Server reported a fatal error");
        if let Some(transport) = transport {
            dispose_quietly(&transport).await;
        }
        Err(err)
    }

    async fn on_closed(&self, generation: u64) {
        let (transport, op) = {
            let mut core = self.lock();
            if !core.is_live(generation) {
                return;
            }
            match core.close_op.clone() {
                // The close path releases the transport once it finishes.
                Some(op) => (core.transport.clone(), Some(op)),
                None => (core.transport.take(), None),
            }
        };

        if let Some(transport) = transport {
            dispose_quietly(&transport).await;
        }
        match op {
            Some(op) => {
                op.succeed(());
            }
            None => warn!("CLOSED frame received but no close was pending"),
        }
    }

    fn on_heartbeat(&self, id: Option<&str>) {
        let mut core = self.lock();
        let matched = core
            .ping
            .as_ref()
            .is_some_and(|ping| id == Some(ping.id.as_str()));
        if !matched {
            trace!(?id, "Ignoring heartbeat without a matching ping");
            return;
        }

        if let Some(ping) = core.ping.take() {
            let elapsed = round_trip_ms(ping.started, Instant::now());
            debug!(id = %ping.id, elapsed_ms = elapsed, "Heartbeat reply received");
            ping.op.succeed(elapsed);
        }
    }
}
