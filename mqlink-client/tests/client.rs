use std::{io, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::{
    io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream},
    sync::Mutex,
    time::timeout,
};

use mqlink_client::{
    BoxedStream, ClientError, ConnectOptions, ConnectReturnCode, Connector, Event, Message,
    MqttClient, QoS, SessionError, SessionState,
};
use mqlink_core::{codec::Encoder, error::Error};
use mqlink_packets::{
    connack::{ConnAckFlags, ConnAckPacket},
    puback::PubAckPacket,
    pubcomp::PubCompPacket,
    publish::PublishPacket,
    pubrec::PubRecPacket,
    pubrel::PubRelPacket,
    suback::{SubAckPacket, SubAckReturnCode},
    ControlPacket,
};

/// Hands out one end of an in-memory pipe per connection attempt.
struct DuplexConnector {
    streams: Mutex<Vec<DuplexStream>>,
}

impl DuplexConnector {
    fn new(count: usize) -> (Arc<Self>, Vec<FakeBroker>) {
        let mut clients = Vec::new();
        let mut brokers = Vec::new();

        for _ in 0..count {
            let (client, broker) = duplex(4096);
            clients.push(client);
            brokers.push(FakeBroker::new(broker));
        }

        clients.reverse();

        (
            Arc::new(DuplexConnector {
                streams: Mutex::new(clients),
            }),
            brokers,
        )
    }
}

#[async_trait]
impl Connector for DuplexConnector {
    async fn connect(&self, _host: &str, _port: u16) -> io::Result<BoxedStream> {
        match self.streams.lock().await.pop() {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "no broker listening",
            )),
        }
    }
}

struct FakeBroker {
    stream: DuplexStream,
    buffer: BytesMut,
}

impl FakeBroker {
    fn new(stream: DuplexStream) -> Self {
        FakeBroker {
            stream,
            buffer: BytesMut::new(),
        }
    }

    /// Next packet from the client, `None` once the client closed the stream.
    async fn read(&mut self) -> Option<ControlPacket> {
        loop {
            match ControlPacket::parse(&mut self.buffer) {
                Ok(packet) => return Some(packet),
                Err(Error::PacketIncomplete) => {}
                Err(e) => panic!("client sent a malformed packet: {}", e),
            }

            let n = self.stream.read_buf(&mut self.buffer).await.unwrap();
            if n == 0 {
                return None;
            }
        }
    }

    async fn send(&mut self, packet: ControlPacket) {
        let mut encoded = BytesMut::new();
        packet.encode(&mut encoded);
        self.send_raw(&encoded).await;
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    async fn accept(&mut self, return_code: ConnectReturnCode) -> String {
        let client_id = match self.read().await {
            Some(ControlPacket::Connect(connect)) => connect.payload.client_id,
            other => panic!("expected CONNECT, got {:?}", other),
        };

        self.send(ControlPacket::ConnAck(ConnAckPacket {
            flags: ConnAckFlags::default(),
            return_code,
        }))
        .await;

        client_id
    }
}

async fn next_event(client: &MqttClient) -> Event {
    timeout(Duration::from_secs(5), client.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

async fn connected_client(options: ConnectOptions) -> (MqttClient, FakeBroker) {
    let (connector, mut brokers) = DuplexConnector::new(1);
    let client = MqttClient::with_connector(options, connector).expect("Unexpected error");
    let mut broker = brokers.remove(0);

    client.connect().expect("Unexpected error");
    broker.accept(ConnectReturnCode::Accepted).await;

    assert_eq!(
        next_event(&client).await,
        Event::Connected {
            session_present: false
        }
    );

    (client, broker)
}

fn options() -> ConnectOptions {
    ConnectOptions::new("test-client", "broker.local", 1883)
}

#[tokio::test]
async fn connect_subscribe_receive_disconnect() {
    let (client, mut broker) = connected_client(options()).await;
    assert!(client.is_connected());
    assert_eq!(client.id(), "test-client");

    let packet_id = client
        .subscribe(&[("sensors/+", QoS::AtLeastOnce)])
        .expect("Unexpected error");

    match broker.read().await {
        Some(ControlPacket::Subscribe(subscribe)) => {
            assert_eq!(subscribe.packet_id, packet_id);
            assert_eq!(subscribe.payload[0].topic_filter, "sensors/+");
        }
        other => panic!("expected SUBSCRIBE, got {:?}", other),
    }

    broker
        .send(ControlPacket::SubAck(SubAckPacket {
            packet_id,
            return_codes: vec![SubAckReturnCode::Granted(QoS::AtLeastOnce)],
        }))
        .await;

    assert_eq!(
        next_event(&client).await,
        Event::Subscribed {
            topic: "sensors/+".to_string(),
            qos: QoS::AtLeastOnce
        }
    );
    assert_eq!(client.subscribed_topics(), vec!["sensors/+".to_string()]);

    broker
        .send(ControlPacket::Publish(PublishPacket {
            dup: false,
            qos_level: QoS::AtLeastOnce,
            retain: false,
            topic_name: "sensors/kitchen".to_string(),
            packet_id: Some(10),
            payload: Bytes::from_static(b"21.5"),
        }))
        .await;

    assert_eq!(
        next_event(&client).await,
        Event::Message(Message::new("sensors/kitchen", "21.5").qos(QoS::AtLeastOnce))
    );
    assert_eq!(
        broker.read().await,
        Some(ControlPacket::PubAck(PubAckPacket { packet_id: 10 }))
    );

    client.disconnect();
    client.disconnect();

    assert!(matches!(
        broker.read().await,
        Some(ControlPacket::Disconnect(_))
    ));
    assert_eq!(broker.read().await, None);

    assert_eq!(next_event(&client).await, Event::Disconnected);
    assert!(timeout(Duration::from_millis(200), client.recv())
        .await
        .is_err());
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn publish_qos2_completes_after_pubcomp() {
    let (client, mut broker) = connected_client(options()).await;

    let packet_id = client
        .publish("out", "payload", QoS::ExactlyOnce, false)
        .expect("Unexpected error")
        .expect("QoS 2 needs a packet id");

    match broker.read().await {
        Some(ControlPacket::Publish(publish)) => {
            assert_eq!(publish.packet_id, Some(packet_id));
            assert_eq!(publish.qos_level, QoS::ExactlyOnce);
        }
        other => panic!("expected PUBLISH, got {:?}", other),
    }

    broker
        .send(ControlPacket::PubRec(PubRecPacket { packet_id }))
        .await;
    assert_eq!(
        broker.read().await,
        Some(ControlPacket::PubRel(PubRelPacket { packet_id }))
    );

    broker
        .send(ControlPacket::PubComp(PubCompPacket { packet_id }))
        .await;
    assert_eq!(
        next_event(&client).await,
        Event::Published {
            packet_id: Some(packet_id)
        }
    );
}

#[tokio::test]
async fn connection_refused_with_identifier_rejected() {
    let (connector, mut brokers) = DuplexConnector::new(1);
    let options = ConnectOptions::new("bad id", "broker.local", 1883);
    let client = MqttClient::with_connector(options, connector).expect("Unexpected error");
    let mut broker = brokers.remove(0);

    client.connect().expect("Unexpected error");
    assert_eq!(
        broker.accept(ConnectReturnCode::IdentifierRejected).await,
        "bad id"
    );

    assert_eq!(
        next_event(&client).await,
        Event::Error(SessionError::ConnectionRefused(
            ConnectReturnCode::IdentifierRejected
        ))
    );
    assert_eq!(next_event(&client).await, Event::Disconnected);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn transport_failure_is_reported() {
    let (connector, _) = DuplexConnector::new(0);
    let client = MqttClient::with_connector(options(), connector).expect("Unexpected error");

    client.connect().expect("Unexpected error");

    assert!(matches!(
        next_event(&client).await,
        Event::Error(SessionError::Transport(_))
    ));
    assert_eq!(next_event(&client).await, Event::Disconnected);
}

#[tokio::test]
async fn malformed_packet_from_broker_is_fatal() {
    let (client, mut broker) = connected_client(options()).await;

    broker.send_raw(&[0xf0, 0x00]).await;

    assert!(matches!(
        next_event(&client).await,
        Event::Error(SessionError::Protocol(_))
    ));
    assert_eq!(next_event(&client).await, Event::Disconnected);
}

#[tokio::test]
async fn broker_closing_the_stream_is_a_transport_error() {
    let (client, broker) = connected_client(options()).await;

    drop(broker);

    assert!(matches!(
        next_event(&client).await,
        Event::Error(SessionError::Transport(_))
    ));
    assert_eq!(next_event(&client).await, Event::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn keep_alive_pings_then_times_out() {
    let (client, mut broker) = connected_client(options().keep_alive(2)).await;

    assert!(matches!(broker.read().await, Some(ControlPacket::PingReq(_))));

    assert_eq!(
        next_event(&client).await,
        Event::Error(SessionError::KeepAliveTimeout)
    );
    assert_eq!(next_event(&client).await, Event::Disconnected);
}

#[tokio::test]
async fn operations_rejected_while_disconnected() {
    let (connector, _) = DuplexConnector::new(0);
    let client = MqttClient::with_connector(options(), connector).expect("Unexpected error");

    let result = client.publish("a/b", "x", QoS::AtMostOnce, false);
    assert!(matches!(
        result,
        Err(ClientError::Session(SessionError::InvalidState(_)))
    ));
    assert!(matches!(
        next_event(&client).await,
        Event::Error(SessionError::InvalidState(_))
    ));

    client.set_port(8883).expect("Unexpected error");
    assert_eq!(client.port(), 8883);
}

#[tokio::test]
async fn parameters_are_read_only_while_connected() {
    let (client, _broker) = connected_client(options()).await;

    assert!(matches!(
        client.set_host("elsewhere"),
        Err(ClientError::Session(SessionError::InvalidState(_)))
    ));
    assert_eq!(client.host(), "broker.local");
}

#[tokio::test]
async fn reconnect_after_disconnect() {
    let (connector, mut brokers) = DuplexConnector::new(2);
    let client = MqttClient::with_connector(options(), connector).expect("Unexpected error");
    let mut second = brokers.remove(1);
    let mut first = brokers.remove(0);

    client.connect().expect("Unexpected error");
    first.accept(ConnectReturnCode::Accepted).await;
    assert!(matches!(next_event(&client).await, Event::Connected { .. }));

    client.disconnect();
    assert_eq!(next_event(&client).await, Event::Disconnected);

    client.connect().expect("Unexpected error");
    second.accept(ConnectReturnCode::Accepted).await;
    assert!(matches!(next_event(&client).await, Event::Connected { .. }));
}
