//! 测试辅助工具模块
//! Test utilities module
//!
//! 提供一个脚本化的模拟服务端：它创建的每个传输都会按脚本应答连接、心跳和关闭请求。
//! Provides a scripted mock server: every transport it creates answers
//! connect, heartbeat and close requests according to the script.

#![cfg(test)]

use crate::{
    config::Config,
    error::{Error, Result},
    protocol::ProtocolMessage,
    state::{ConnectionState, ConnectionStateChange},
    transport::{ChannelDispatcher, ProtocolSink, Transport, TransportFactory},
};
use async_trait::async_trait;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// A short-fused configuration for paused-clock tests.
pub fn test_config() -> Config {
    Config {
        realtime_request_timeout: Duration::from_secs(1),
        disconnected_retry_timeout: Duration::from_secs(2),
        auto_connect: false,
    }
}

/// How the mock server answers requests.
#[derive(Debug, Clone, Copy)]
pub struct ServerScript {
    /// Reply to `connect` with a `CONNECTED` frame.
    pub accept_connect: bool,
    /// Echo heartbeats back with the same id.
    pub echo_heartbeats: bool,
    /// Reply to `close` with a `CLOSED` frame.
    pub answer_close: bool,
    /// Make `connect` itself return an error.
    pub fail_connect: bool,
}

impl Default for ServerScript {
    fn default() -> Self {
        Self {
            accept_connect: true,
            echo_heartbeats: true,
            answer_close: true,
            fail_connect: false,
        }
    }
}

impl ServerScript {
    pub fn silent() -> Self {
        Self {
            accept_connect: false,
            echo_heartbeats: false,
            answer_close: false,
            fail_connect: false,
        }
    }
}

#[derive(Debug)]
pub struct MockTransport {
    pub index: usize,
    sink: ProtocolSink,
    script: ServerScript,
    connected: AtomicBool,
    sent: Mutex<Vec<ProtocolMessage>>,
    pub connect_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub dispose_calls: AtomicUsize,
}

impl MockTransport {
    /// Delivers a server frame from a separate task, like a read loop would.
    pub fn reply(&self, message: ProtocolMessage) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let _ = sink.deliver(message).await;
        });
    }

    /// Delivers a server frame and waits for the manager to handle it.
    pub async fn deliver(&self, message: ProtocolMessage) -> Result<()> {
        self.sink.deliver(message).await
    }

    pub fn sent(&self) -> Vec<ProtocolMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn disposed(&self) -> bool {
        self.dispose_calls.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_connect {
            return Err(Error::Transport("connection refused".into()));
        }
        if self.script.accept_connect {
            self.reply(ProtocolMessage::connected(
                format!("conn-{}", self.index),
                format!("key-{}", self.index),
            ));
        }
        Ok(())
    }

    async fn send(&self, message: ProtocolMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        if self.script.echo_heartbeats {
            if let Some(id) = message.heartbeat_id() {
                self.reply(ProtocolMessage::heartbeat(id));
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(ProtocolMessage::Close);
        if self.script.answer_close {
            self.reply(ProtocolMessage::Closed);
        }
        Ok(())
    }

    async fn dispose(&self) -> Result<()> {
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

/// A transport factory that keeps every transport it creates.
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    script: Arc<Mutex<ServerScript>>,
    created: Arc<Mutex<Vec<Arc<MockTransport>>>>,
}

impl MockServer {
    pub fn new(script: ServerScript) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            created: Arc::default(),
        }
    }

    /// Applies to transports created from now on.
    pub fn set_script(&self, script: ServerScript) {
        *self.script.lock().unwrap() = script;
    }

    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn transport(&self, index: usize) -> Arc<MockTransport> {
        self.created.lock().unwrap()[index].clone()
    }

    pub fn latest(&self) -> Arc<MockTransport> {
        self.created.lock().unwrap().last().cloned().unwrap()
    }
}

impl TransportFactory for MockServer {
    fn create(&self, sink: ProtocolSink) -> Arc<dyn Transport> {
        let mut created = self.created.lock().unwrap();
        let transport = Arc::new(MockTransport {
            index: created.len(),
            sink,
            script: *self.script.lock().unwrap(),
            connected: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            dispose_calls: AtomicUsize::new(0),
        });
        created.push(transport.clone());
        transport
    }
}

/// Records every channel frame it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    pub frames: Arc<Mutex<Vec<ProtocolMessage>>>,
}

impl ChannelDispatcher for RecordingDispatcher {
    fn on_channel_message(&self, message: ProtocolMessage) {
        self.frames.lock().unwrap().push(message);
    }
}

/// Collects `(previous, current)` pairs in publication order.
#[derive(Debug, Clone, Default)]
pub struct TransitionLog {
    changes: Arc<Mutex<Vec<ConnectionStateChange>>>,
}

impl TransitionLog {
    pub fn listener(&self) -> impl Fn(&ConnectionStateChange) + Send + Sync + 'static {
        let changes = self.changes.clone();
        move |change| changes.lock().unwrap().push(change.clone())
    }

    pub fn pairs(&self) -> Vec<(ConnectionState, ConnectionState)> {
        self.changes
            .lock()
            .unwrap()
            .iter()
            .map(|c| (c.previous(), c.current()))
            .collect()
    }

    pub fn changes(&self) -> Vec<ConnectionStateChange> {
        self.changes.lock().unwrap().clone()
    }
}

/// Lets spawned tasks run until they are idle. Under a paused clock this
/// advances time by a single millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
