//! tests/common/harness.rs
use async_trait::async_trait;
use realtime_connection::{
    Config, Connection, ConnectionState, ConnectionStateChange, ErrorFrame, ProtocolMessage,
    ProtocolSink, Result, Transport, TransportFactory,
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, Once,
    },
    time::Duration,
};
use tracing_subscriber::EnvFilter;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("realtime_connection=debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// How the simulated service behaves. Applies to transports created after it
/// is set.
#[derive(Debug, Clone)]
pub struct Behavior {
    /// One-way delay applied to every reply.
    pub latency: Duration,
    pub accept: bool,
    pub echo_heartbeats: bool,
    pub answer_close: bool,
    /// Answer `connect` with this error frame instead of `CONNECTED`.
    pub reject_with: Option<ErrorFrame>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(20),
            accept: true,
            echo_heartbeats: true,
            answer_close: true,
            reject_with: None,
        }
    }
}

impl Behavior {
    pub fn unresponsive() -> Self {
        Self {
            accept: false,
            echo_heartbeats: false,
            answer_close: false,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct SimulatedTransport {
    id: usize,
    sink: ProtocolSink,
    behavior: Behavior,
    connected: AtomicBool,
    sent: Mutex<Vec<ProtocolMessage>>,
    disposals: AtomicUsize,
}

impl SimulatedTransport {
    fn reply_later(&self, message: ProtocolMessage) {
        let sink = self.sink.clone();
        let latency = self.behavior.latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            if let Err(err) = sink.deliver(message).await {
                tracing::debug!(error = %err, "Delivered frame surfaced an error");
            }
        });
    }

    pub async fn push(&self, message: ProtocolMessage) -> Result<()> {
        self.sink.deliver(message).await
    }

    pub fn sent(&self) -> Vec<ProtocolMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposals.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn connect(&self) -> Result<()> {
        tracing::debug!(transport = self.id, "Simulated transport connecting");
        if let Some(error) = self.behavior.reject_with.clone() {
            self.reply_later(ProtocolMessage::Error { error });
        } else if self.behavior.accept {
            self.reply_later(ProtocolMessage::connected(
                format!("connection-{}", self.id),
                format!("secret-{}", self.id),
            ));
        }
        Ok(())
    }

    async fn send(&self, message: ProtocolMessage) -> Result<()> {
        if self.behavior.echo_heartbeats {
            if let Some(id) = message.heartbeat_id() {
                self.reply_later(ProtocolMessage::heartbeat(id));
            }
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.sent.lock().unwrap().push(ProtocolMessage::Close);
        if self.behavior.answer_close {
            self.reply_later(ProtocolMessage::Closed);
        }
        Ok(())
    }

    async fn dispose(&self) -> Result<()> {
        self.disposals.fetch_add(1, Ordering::SeqCst);
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

/// The simulated service: a transport factory that remembers its transports.
#[derive(Debug, Clone, Default)]
pub struct SimulatedService {
    behavior: Arc<Mutex<Behavior>>,
    transports: Arc<Mutex<Vec<Arc<SimulatedTransport>>>>,
}

impl SimulatedService {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            transports: Arc::default(),
        }
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn transport_count(&self) -> usize {
        self.transports.lock().unwrap().len()
    }

    pub fn transport(&self, index: usize) -> Arc<SimulatedTransport> {
        self.transports.lock().unwrap()[index].clone()
    }

    pub fn latest(&self) -> Arc<SimulatedTransport> {
        self.transports.lock().unwrap().last().cloned().unwrap()
    }
}

impl TransportFactory for SimulatedService {
    fn create(&self, sink: ProtocolSink) -> Arc<dyn Transport> {
        let mut transports = self.transports.lock().unwrap();
        let transport = Arc::new(SimulatedTransport {
            id: transports.len(),
            sink,
            behavior: self.behavior.lock().unwrap().clone(),
            connected: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            disposals: AtomicUsize::new(0),
        });
        transports.push(transport.clone());
        transport
    }
}

/// A test harness bundling a connection with the service it talks to.
pub struct TestHarness {
    pub connection: Connection,
    pub service: SimulatedService,
    changes: Arc<Mutex<Vec<ConnectionStateChange>>>,
}

impl TestHarness {
    pub fn config() -> Config {
        Config {
            realtime_request_timeout: Duration::from_secs(2),
            disconnected_retry_timeout: Duration::from_secs(5),
            auto_connect: false,
        }
    }

    pub fn new(behavior: Behavior) -> Self {
        Self::with_config(behavior, Self::config())
    }

    pub fn with_config(behavior: Behavior, config: Config) -> Self {
        init_tracing();
        let service = SimulatedService::new(behavior);
        let connection = Connection::new(config, service.clone()).unwrap();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let recorder = changes.clone();
        connection.on(move |change| recorder.lock().unwrap().push(change.clone()));
        Self {
            connection,
            service,
            changes,
        }
    }

    /// Transitions seen by an external listener so far.
    pub fn transitions(&self) -> Vec<(ConnectionState, ConnectionState)> {
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

    /// Lets listener forwarding catch up.
    pub async fn flush(&self) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
