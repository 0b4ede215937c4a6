use std::sync::Arc;

use bytes::Bytes;
use mqlink_core::{message::Message, qos::QoS};
use tokio::{
    sync::{mpsc, Mutex},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    driver::{self, Shared},
    error::Result,
    event::Event,
    options::ConnectOptions,
    runtime::ExecutionContext,
    session::{Session, SessionState},
    tls::TlsConnector,
    transport::{Connector, TcpConnector},
};

/// An MQTT client for connecting to brokers.
///
/// Every operation returns as soon as the session has taken it; outcomes
/// arrive as [`Event`]s through [`MqttClient::recv`].
pub struct MqttClient {
    shared: Arc<Shared>,
    event_rx: Mutex<mpsc::UnboundedReceiver<Event>>,
    cancel: CancellationToken,
    _context: ExecutionContext,
}

impl MqttClient {
    /// Creates a client that connects over TCP, or TLS when enabled in the options.
    pub fn new(options: ConnectOptions) -> Result<Self> {
        let connector: Arc<dyn Connector> = if options.tls.enabled {
            Arc::new(TlsConnector::new(&options.tls)?)
        } else {
            Arc::new(TcpConnector)
        };

        Self::with_connector(options, connector)
    }

    /// Creates a client that opens its transport through `connector`.
    pub fn with_connector(options: ConnectOptions, connector: Arc<dyn Connector>) -> Result<Self> {
        let context = ExecutionContext::acquire()?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        debug!(client_id = %options.client_id, "Creating client");

        let shared = Arc::new(Shared::new(Session::new(options), event_tx));
        let cancel = CancellationToken::new();

        context.spawn(driver::run(shared.clone(), connector, cancel.clone()));

        Ok(MqttClient {
            shared,
            event_rx: Mutex::new(event_rx),
            cancel,
            _context: context,
        })
    }

    fn command<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let result = self.shared.with_session(f);
        self.shared.wake();
        result
    }

    /// Starts connecting. Completion is reported by [`Event::Connected`].
    pub fn connect(&self) -> Result<()> {
        self.command(|s| s.connect(Instant::now()))?;

        Ok(())
    }

    /// Disconnect from the broker gracefully. Does nothing when already
    /// disconnected or disconnecting.
    pub fn disconnect(&self) {
        self.command(|s| s.disconnect(Instant::now()));
    }

    /// Publish a message to a topic. Returns the packet identifier for QoS 1 and 2.
    pub fn publish(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Result<Option<u16>> {
        self.publish_message(Message::new(topic, payload).qos(qos).retain(retain))
    }

    pub fn publish_message(&self, message: Message) -> Result<Option<u16>> {
        Ok(self.command(|s| s.publish(message, Instant::now()))?)
    }

    /// Subscribe to one or more topic filters.
    pub fn subscribe(&self, topics: &[(&str, QoS)]) -> Result<u16> {
        let topics = topics
            .iter()
            .map(|(topic, qos)| (topic.to_string(), *qos))
            .collect();

        Ok(self.command(|s| s.subscribe(topics, Instant::now()))?)
    }

    /// Unsubscribe from one or more topic filters.
    pub fn unsubscribe(&self, topics: &[&str]) -> Result<u16> {
        let topics = topics.iter().map(|topic| topic.to_string()).collect();

        Ok(self.command(|s| s.unsubscribe(topics, Instant::now()))?)
    }

    /// Receive the next event.
    pub async fn recv(&self) -> Option<Event> {
        let mut rx = self.event_rx.lock().await;
        rx.recv().await
    }

    /// Returns an event if one is ready.
    pub fn try_recv(&self) -> Option<Event> {
        let mut rx = self.event_rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    pub fn id(&self) -> String {
        self.shared.with_session(|s| s.options().client_id().to_string())
    }

    pub fn host(&self) -> String {
        self.shared.with_session(|s| s.options().host().to_string())
    }

    pub fn port(&self) -> u16 {
        self.shared.with_session(|s| s.options().port())
    }

    pub fn keep_alive(&self) -> u16 {
        self.shared.with_session(|s| s.options().keep_alive_secs())
    }

    pub fn will(&self) -> Option<Message> {
        self.shared
            .with_session(|s| s.options().will_message().cloned())
    }

    pub fn state(&self) -> SessionState {
        self.shared.with_session(|s| s.state())
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.shared.with_session(|s| s.subscribed_topics())
    }

    pub fn set_host(&self, host: impl Into<String>) -> Result<()> {
        let host = host.into();
        Ok(self.command(|s| s.options_mut().map(|o| o.set_host(host)))?)
    }

    pub fn set_port(&self, port: u16) -> Result<()> {
        Ok(self.command(|s| s.options_mut().map(|o| o.set_port(port)))?)
    }

    pub fn set_keep_alive(&self, seconds: u16) -> Result<()> {
        Ok(self.command(|s| s.options_mut().map(|o| o.set_keep_alive(seconds)))?)
    }

    pub fn set_will(&self, will: Option<Message>) -> Result<()> {
        Ok(self.command(|s| s.options_mut().map(|o| o.set_will(will)))?)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        self.command(|s| s.disconnect(Instant::now()));
        self.cancel.cancel();
    }
}
