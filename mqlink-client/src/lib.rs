//! mqlink MQTT client library
//!
//! An MQTT v3.1.1 client built around a sans-I/O session state machine. A
//! driver task owns the transport and the [`MqttClient`] handle talks to it
//! without blocking.
//!
//! # Example
//!
//! ```no_run
//! use mqlink_client::{ConnectOptions, Event, MqttClient, QoS};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ConnectOptions::new("my-client", "localhost", 1883);
//!     let client = MqttClient::new(options)?;
//!
//!     client.connect()?;
//!
//!     while let Some(event) = client.recv().await {
//!         match event {
//!             Event::Connected { .. } => {
//!                 client.subscribe(&[("test/topic", QoS::AtLeastOnce)])?;
//!                 client.publish("test/topic", "Hello, MQTT!", QoS::AtLeastOnce, false)?;
//!             }
//!             Event::Message(message) => println!("{}: {:?}", message.topic, message.payload),
//!             Event::Disconnected => break,
//!             other => println!("{:?}", other),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod connection;
mod driver;
mod error;
mod event;
mod options;
mod packet_id;
mod runtime;
pub mod session;
mod tls;
pub mod transport;

pub use client::MqttClient;
pub use error::{ClientError, Result, SessionError};
pub use event::Event;
pub use options::{ConnectOptions, TlsOptions, DEFAULT_KEEP_ALIVE, DEFAULT_PORT};
pub use runtime::shared_runtime_active;
pub use session::SessionState;
pub use tls::TlsConnector;
pub use transport::{BoxedStream, Connector, TcpConnector};

// Re-export commonly used types from mqlink-core
pub use mqlink_core::message::Message;
pub use mqlink_core::protocol::ProtocolVersion;
pub use mqlink_core::qos::QoS;
pub use mqlink_core::return_code::ConnectReturnCode;
pub use mqlink_core::topic::TopicValidationError;
