//! Client-side MQTT session state machine.
//!
//! The session does no I/O. It takes application intents, decoded packets
//! and clock ticks, and produces packets to send and events to report. The
//! driver owns the transport and feeds it.

use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    fmt,
    time::Duration,
};

use mqlink_core::{
    codec::MAX_REMAINING_LENGTH,
    message::Message,
    qos::QoS,
    topic::{validate_topic_filter, validate_topic_name},
};
use mqlink_packets::{
    connack::ConnAckPacket,
    disconnect::DisconnectPacket,
    pingreq::PingReqPacket,
    puback::PubAckPacket,
    pubcomp::PubCompPacket,
    publish::PublishPacket,
    pubrec::PubRecPacket,
    pubrel::PubRelPacket,
    suback::{SubAckPacket, SubAckReturnCode},
    subscribe::{SubscribePacket, SubscribePayload},
    unsuback::UnsubAckPacket,
    unsubscribe::UnsubscribePacket,
    ControlPacket,
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    error::SessionError, event::Event, options::ConnectOptions, packet_id::PacketIdAllocator,
};

const MIN_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnecting => "disconnecting",
        };

        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PublishStage {
    /// QoS 1, waiting for PUBACK.
    AwaitingAck,
    /// QoS 2, waiting for PUBREC.
    AwaitingRec,
    /// QoS 2, PUBREL sent, waiting for PUBCOMP.
    AwaitingComp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PendingKind {
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    Publish { qos: QoS, stage: PublishStage },
}

#[derive(Debug, Clone)]
pub(crate) struct PendingOperation {
    pub(crate) packet_id: u16,
    pub(crate) kind: PendingKind,
    pub(crate) created_at: Instant,
}

pub struct Session {
    options: ConnectOptions,
    state: SessionState,
    epoch: u64,
    transport_open: bool,
    packet_ids: PacketIdAllocator,
    pending: HashMap<u16, PendingOperation>,
    incoming_qos2: HashMap<u16, Message>,
    subscribed: BTreeSet<String>,
    outgoing: VecDeque<ControlPacket>,
    events: VecDeque<Event>,
    connect_started: Option<Instant>,
    last_sent: Option<Instant>,
    ping_sent: Option<Instant>,
}

impl Session {
    pub fn new(options: ConnectOptions) -> Self {
        Session {
            options,
            state: SessionState::Disconnected,
            epoch: 0,
            transport_open: false,
            packet_ids: PacketIdAllocator::default(),
            pending: HashMap::new(),
            incoming_qos2: HashMap::new(),
            subscribed: BTreeSet::new(),
            outgoing: VecDeque::new(),
            events: VecDeque::new(),
            connect_started: None,
            last_sent: None,
            ping_sent: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identifies one connection attempt. Transport reports carrying an older
    /// epoch are ignored.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Connection parameters can only change while disconnected.
    pub fn options_mut(&mut self) -> Result<&mut ConnectOptions, SessionError> {
        if self.state != SessionState::Disconnected {
            let err = SessionError::InvalidState(format!(
                "connection parameters are read-only while {}",
                self.state
            ));
            return Err(self.reject(err));
        }

        Ok(&mut self.options)
    }

    pub fn connect_target(&self) -> (String, u16) {
        (self.options.host.clone(), self.options.port)
    }

    pub fn is_transport_open(&self) -> bool {
        self.transport_open
    }

    /// Topics granted by the broker and not unsubscribed since.
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.subscribed.iter().cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// How often the driver should call [`Session::handle_tick`].
    pub fn tick_interval(&self) -> Duration {
        if self.state == SessionState::Connecting {
            return MIN_TICK;
        }

        match self.options.keep_alive {
            0 => MIN_TICK,
            secs => Duration::from_millis(secs as u64 * 500).max(MIN_TICK),
        }
    }

    pub fn poll_transmit(&mut self) -> Option<ControlPacket> {
        self.outgoing.pop_front()
    }

    pub fn drain_outgoing(&mut self) -> Vec<ControlPacket> {
        self.outgoing.drain(..).collect()
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Starts a connection attempt and returns its epoch.
    pub fn connect(&mut self, now: Instant) -> Result<u64, SessionError> {
        if self.state != SessionState::Disconnected {
            let err = SessionError::InvalidState(format!("cannot connect while {}", self.state));
            return Err(self.reject(err));
        }

        if let Err(err) = self.options.validate() {
            return Err(self.reject(err));
        }

        self.epoch += 1;
        self.state = SessionState::Connecting;
        self.transport_open = false;
        self.connect_started = Some(now);
        self.ping_sent = None;
        self.outgoing.clear();

        info!(
            client_id = %self.options.client_id,
            host = %self.options.host,
            port = self.options.port,
            "Connecting"
        );

        let connect = self.options.connect_packet();
        self.queue(ControlPacket::Connect(connect), now);

        Ok(self.epoch)
    }

    /// The driver opened the transport for `epoch`. Returns false when the
    /// attempt is no longer wanted.
    pub fn transport_opened(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.state != SessionState::Connecting {
            return false;
        }

        debug!(epoch, "Transport open");
        self.transport_open = true;

        true
    }

    pub fn transport_failed(&mut self, epoch: u64, reason: String) {
        if !self.is_current(epoch) {
            return;
        }

        if self.state == SessionState::Disconnecting {
            self.enter_disconnected();
        } else {
            self.fatal(SessionError::Transport(reason));
        }
    }

    pub fn transport_closed(&mut self, epoch: u64) {
        if !self.is_current(epoch) {
            return;
        }

        if self.state == SessionState::Disconnecting {
            self.enter_disconnected();
        } else {
            self.fatal(SessionError::Transport("connection closed by broker".into()));
        }
    }

    /// The driver could not decode what the broker sent.
    pub fn protocol_violation(&mut self, epoch: u64, reason: String) {
        if !self.is_current(epoch) {
            return;
        }

        if self.state == SessionState::Disconnecting {
            self.enter_disconnected();
        } else {
            self.fatal(SessionError::Protocol(reason));
        }
    }

    /// Returns false when there was nothing to disconnect.
    pub fn disconnect(&mut self, now: Instant) -> bool {
        match self.state {
            SessionState::Connecting | SessionState::Connected => {
                if self.transport_open {
                    info!("Disconnecting");
                    self.queue(ControlPacket::Disconnect(DisconnectPacket {}), now);
                    self.state = SessionState::Disconnecting;
                } else {
                    self.enter_disconnected();
                }

                true
            }
            SessionState::Disconnecting | SessionState::Disconnected => false,
        }
    }

    pub fn publish(&mut self, message: Message, now: Instant) -> Result<Option<u16>, SessionError> {
        self.require_connected("publish")?;

        if let Err(e) = validate_topic_name(&message.topic) {
            return Err(self.reject(e.into()));
        }

        let mut publish = PublishPacket::from_message(&message, None);
        self.check_encodable("PUBLISH", publish.remaining_len())?;

        if message.qos == QoS::AtMostOnce {
            self.queue(ControlPacket::Publish(publish), now);
            self.events.push_back(Event::Published { packet_id: None });

            return Ok(None);
        }

        let packet_id = self.allocate_packet_id()?;
        let stage = match message.qos {
            QoS::AtLeastOnce => PublishStage::AwaitingAck,
            _ => PublishStage::AwaitingRec,
        };

        publish.packet_id = Some(packet_id);

        self.track(
            packet_id,
            PendingKind::Publish {
                qos: message.qos,
                stage,
            },
            now,
        );
        self.queue(ControlPacket::Publish(publish), now);

        Ok(Some(packet_id))
    }

    pub fn subscribe(
        &mut self,
        topics: Vec<(String, QoS)>,
        now: Instant,
    ) -> Result<u16, SessionError> {
        self.require_connected("subscribe")?;

        if topics.is_empty() {
            return Err(self.reject(SessionError::InvalidParameters(
                "subscribe needs at least one topic".into(),
            )));
        }

        for (filter, _) in &topics {
            if let Err(e) = validate_topic_filter(filter) {
                return Err(self.reject(e.into()));
            }
        }

        let filters = topics.iter().map(|(filter, _)| filter.clone()).collect();
        let payload = topics
            .into_iter()
            .map(|(topic_filter, qos)| SubscribePayload { topic_filter, qos })
            .collect();

        // The identifier is filled in once the packet is known to fit.
        let mut subscribe = SubscribePacket {
            packet_id: 0,
            payload,
        };
        self.check_encodable("SUBSCRIBE", subscribe.remaining_len())?;

        let packet_id = self.allocate_packet_id()?;
        subscribe.packet_id = packet_id;

        self.track(packet_id, PendingKind::Subscribe(filters), now);
        self.queue(ControlPacket::Subscribe(subscribe), now);

        Ok(packet_id)
    }

    pub fn unsubscribe(&mut self, topics: Vec<String>, now: Instant) -> Result<u16, SessionError> {
        self.require_connected("unsubscribe")?;

        if topics.is_empty() {
            return Err(self.reject(SessionError::InvalidParameters(
                "unsubscribe needs at least one topic".into(),
            )));
        }

        for filter in &topics {
            if let Err(e) = validate_topic_filter(filter) {
                return Err(self.reject(e.into()));
            }
        }

        let mut unsubscribe = UnsubscribePacket {
            packet_id: 0,
            topic_filters: topics.clone(),
        };
        self.check_encodable("UNSUBSCRIBE", unsubscribe.remaining_len())?;

        let packet_id = self.allocate_packet_id()?;
        unsubscribe.packet_id = packet_id;

        self.track(packet_id, PendingKind::Unsubscribe(topics), now);
        self.queue(ControlPacket::Unsubscribe(unsubscribe), now);

        Ok(packet_id)
    }

    pub fn handle_packet(&mut self, packet: ControlPacket, now: Instant) {
        debug!(packet = %packet.packet_type(), state = %self.state, "Received");

        match self.state {
            SessionState::Disconnected | SessionState::Disconnecting => {
                debug!(packet = %packet.packet_type(), "Ignoring packet while {}", self.state);
            }
            SessionState::Connecting => match packet {
                ControlPacket::ConnAck(ack) => self.handle_connack(ack),
                other => self.fatal(SessionError::Protocol(format!(
                    "expected CONNACK, received {}",
                    other.packet_type()
                ))),
            },
            SessionState::Connected => match packet {
                ControlPacket::Publish(publish) => self.handle_publish(publish, now),
                ControlPacket::PubAck(ack) => self.handle_puback(ack),
                ControlPacket::PubRec(rec) => self.handle_pubrec(rec, now),
                ControlPacket::PubRel(rel) => self.handle_pubrel(rel, now),
                ControlPacket::PubComp(comp) => self.handle_pubcomp(comp),
                ControlPacket::SubAck(ack) => self.handle_suback(ack),
                ControlPacket::UnsubAck(ack) => self.handle_unsuback(ack),
                ControlPacket::PingResp(_) => {
                    self.ping_sent = None;
                }
                other => self.fatal(SessionError::Protocol(format!(
                    "unexpected {} from broker",
                    other.packet_type()
                ))),
            },
        }
    }

    /// Drives the connect timeout, keep-alive and acknowledgment timeout.
    pub fn handle_tick(&mut self, now: Instant) {
        match self.state {
            SessionState::Connecting => {
                if let Some(started) = self.connect_started {
                    if now.duration_since(started) >= self.options.connect_timeout {
                        self.fatal(SessionError::ConnectTimeout);
                    }
                }
            }
            SessionState::Connected => {
                self.expire_pending(now);
                self.keep_alive(now);
            }
            SessionState::Disconnecting | SessionState::Disconnected => {}
        }
    }

    fn keep_alive(&mut self, now: Instant) {
        let window = match self.options.keep_alive_interval() {
            Some(window) => window,
            None => return,
        };

        if let Some(sent) = self.ping_sent {
            if now.duration_since(sent) >= window {
                self.fatal(SessionError::KeepAliveTimeout);
            }
            return;
        }

        let idle = self
            .last_sent
            .map(|last| now.duration_since(last))
            .unwrap_or(window);

        if idle >= window {
            self.queue(ControlPacket::PingReq(PingReqPacket {}), now);
            self.ping_sent = Some(now);
        }
    }

    fn expire_pending(&mut self, now: Instant) {
        let timeout = match self.options.ack_timeout {
            Some(timeout) => timeout,
            None => return,
        };

        let mut expired: Vec<u16> = self
            .pending
            .values()
            .filter(|op| now.duration_since(op.created_at) >= timeout)
            .map(|op| op.packet_id)
            .collect();
        expired.sort_unstable();

        for packet_id in expired {
            self.pending.remove(&packet_id);
            warn!(packet_id, "Acknowledgment timed out");
            self.events
                .push_back(Event::Error(SessionError::AckTimeout { packet_id }));
        }
    }

    fn handle_connack(&mut self, ack: ConnAckPacket) {
        if !ack.return_code.is_accepted() {
            warn!(reason = %ack.return_code, "Connection refused");
            self.events.push_back(Event::Error(SessionError::ConnectionRefused(
                ack.return_code,
            )));
            self.enter_disconnected();
            return;
        }

        let session_present = ack.flags.session_present;

        self.state = SessionState::Connected;
        self.connect_started = None;

        if !session_present {
            self.subscribed.clear();
        }

        info!(session_present, "Connected");
        self.events.push_back(Event::Connected { session_present });
    }

    fn handle_publish(&mut self, publish: PublishPacket, now: Instant) {
        let packet_id = publish.packet_id;

        match (publish.qos_level, packet_id) {
            (QoS::AtMostOnce, _) => self.deliver(publish.into_message()),
            (QoS::AtLeastOnce, Some(packet_id)) => {
                self.deliver(publish.into_message());
                self.queue(ControlPacket::PubAck(PubAckPacket { packet_id }), now);
            }
            (QoS::ExactlyOnce, Some(packet_id)) => {
                if self.incoming_qos2.contains_key(&packet_id) {
                    debug!(packet_id, "Duplicate QoS 2 PUBLISH");
                } else {
                    self.incoming_qos2.insert(packet_id, publish.into_message());
                }

                self.queue(ControlPacket::PubRec(PubRecPacket { packet_id }), now);
            }
            (_, None) => self.fatal(SessionError::Protocol(
                "PUBLISH without packet identifier".into(),
            )),
        }
    }

    fn handle_puback(&mut self, ack: PubAckPacket) {
        let packet_id = ack.packet_id;

        match self.pending.get(&packet_id).map(|op| &op.kind) {
            Some(PendingKind::Publish {
                qos: QoS::AtLeastOnce,
                stage: PublishStage::AwaitingAck,
            }) => {
                self.pending.remove(&packet_id);
                self.events.push_back(Event::Published {
                    packet_id: Some(packet_id),
                });
            }
            _ => warn!(packet_id, "Ignoring PUBACK for unknown packet"),
        }
    }

    fn handle_pubrec(&mut self, rec: PubRecPacket, now: Instant) {
        let packet_id = rec.packet_id;

        // A repeated PUBREC means our PUBREL was lost; send it again.
        let release = match self.pending.get_mut(&packet_id).map(|op| &mut op.kind) {
            Some(PendingKind::Publish { stage, .. }) if *stage != PublishStage::AwaitingAck => {
                *stage = PublishStage::AwaitingComp;
                true
            }
            _ => false,
        };

        if release {
            self.queue(ControlPacket::PubRel(PubRelPacket { packet_id }), now);
        } else {
            warn!(packet_id, "Ignoring PUBREC for unknown packet");
        }
    }

    fn handle_pubrel(&mut self, rel: PubRelPacket, now: Instant) {
        let packet_id = rel.packet_id;

        match self.incoming_qos2.remove(&packet_id) {
            Some(message) => self.deliver(message),
            None => debug!(packet_id, "PUBREL for unknown packet"),
        }

        self.queue(ControlPacket::PubComp(PubCompPacket { packet_id }), now);
    }

    fn handle_pubcomp(&mut self, comp: PubCompPacket) {
        let packet_id = comp.packet_id;

        match self.pending.get(&packet_id).map(|op| &op.kind) {
            Some(PendingKind::Publish {
                qos: QoS::ExactlyOnce,
                stage: PublishStage::AwaitingComp,
            }) => {
                self.pending.remove(&packet_id);
                self.events.push_back(Event::Published {
                    packet_id: Some(packet_id),
                });
            }
            _ => warn!(packet_id, "Ignoring PUBCOMP for unknown packet"),
        }
    }

    fn handle_suback(&mut self, ack: SubAckPacket) {
        let packet_id = ack.packet_id;

        let topics = match self.pending.get(&packet_id).map(|op| &op.kind) {
            Some(PendingKind::Subscribe(topics)) => topics.clone(),
            _ => {
                warn!(packet_id, "Ignoring SUBACK for unknown packet");
                return;
            }
        };

        self.pending.remove(&packet_id);

        if topics.len() != ack.return_codes.len() {
            self.fatal(SessionError::Protocol(format!(
                "SUBACK carries {} return codes for {} topics",
                ack.return_codes.len(),
                topics.len()
            )));
            return;
        }

        for (topic, code) in topics.into_iter().zip(ack.return_codes) {
            match code {
                SubAckReturnCode::Granted(qos) => {
                    debug!(%topic, %qos, "Subscribed");
                    self.subscribed.insert(topic.clone());
                    self.events.push_back(Event::Subscribed { topic, qos });
                }
                SubAckReturnCode::Failure => {
                    warn!(%topic, "Subscription rejected");
                    self.events
                        .push_back(Event::Error(SessionError::SubscriptionRejected { topic }));
                }
            }
        }
    }

    fn handle_unsuback(&mut self, ack: UnsubAckPacket) {
        let packet_id = ack.packet_id;

        let topics = match self.pending.get(&packet_id).map(|op| &op.kind) {
            Some(PendingKind::Unsubscribe(topics)) => topics.clone(),
            _ => {
                warn!(packet_id, "Ignoring UNSUBACK for unknown packet");
                return;
            }
        };

        self.pending.remove(&packet_id);

        for topic in topics {
            self.subscribed.remove(&topic);
            self.events.push_back(Event::Unsubscribed { topic });
        }
    }

    fn deliver(&mut self, message: Message) {
        debug!(topic = %message.topic, len = message.payload.len(), "Message received");
        self.events.push_back(Event::Message(message));
    }

    fn queue(&mut self, packet: ControlPacket, now: Instant) {
        debug!(packet = %packet.packet_type(), "Queued");
        self.outgoing.push_back(packet);
        self.last_sent = Some(now);
    }

    fn track(&mut self, packet_id: u16, kind: PendingKind, now: Instant) {
        self.pending.insert(
            packet_id,
            PendingOperation {
                packet_id,
                kind,
                created_at: now,
            },
        );
    }

    fn allocate_packet_id(&mut self) -> Result<u16, SessionError> {
        let pending = &self.pending;

        match self.packet_ids.allocate(|id| pending.contains_key(&id)) {
            Some(packet_id) => Ok(packet_id),
            None => Err(self.reject(SessionError::PacketIdsExhausted)),
        }
    }

    fn require_connected(&mut self, operation: &str) -> Result<(), SessionError> {
        if self.state == SessionState::Connected {
            return Ok(());
        }

        let err = SessionError::InvalidState(format!("cannot {} while {}", operation, self.state));
        Err(self.reject(err))
    }

    fn check_encodable(&mut self, packet: &str, remaining_len: usize) -> Result<(), SessionError> {
        if remaining_len <= MAX_REMAINING_LENGTH {
            return Ok(());
        }

        let err = SessionError::InvalidParameters(format!(
            "{} body of {} bytes exceeds the {} byte limit",
            packet, remaining_len, MAX_REMAINING_LENGTH
        ));
        Err(self.reject(err))
    }

    fn is_current(&self, epoch: u64) -> bool {
        epoch == self.epoch && self.state != SessionState::Disconnected
    }

    /// Reports a rejected request without changing state.
    fn reject(&mut self, err: SessionError) -> SessionError {
        warn!("{}", err);
        self.events.push_back(Event::Error(err.clone()));
        err
    }

    fn fatal(&mut self, err: SessionError) {
        error!("{}", err);
        self.events.push_back(Event::Error(err));
        self.enter_disconnected();
    }

    fn enter_disconnected(&mut self) {
        let previous = self.state;

        self.state = SessionState::Disconnected;
        self.transport_open = false;
        self.pending.clear();
        self.incoming_qos2.clear();
        self.outgoing.clear();
        self.connect_started = None;
        self.ping_sent = None;

        if previous != SessionState::Disconnected {
            info!("Disconnected");
            self.events.push_back(Event::Disconnected);
        }
    }
}
