//! mqlink - MQTT v3.1.1 command-line client

use std::io::{self, Read};

use bytes::Bytes;
use clap::{Parser, Subcommand};
use mqlink_client::{Event, Message, MqttClient, SessionError};
use mqlink_core::qos::QoS;
use tokio::signal;
use tracing::{debug, info};

mod common;
mod config;

use common::{init_logging, ConnectionArgs};

#[derive(Parser, Debug)]
#[command(name = "mqlink")]
#[command(about = "MQTT v3.1.1 command-line client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish a message to a topic
    Pub {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Topic to publish to
        #[arg(short = 't', long)]
        topic: String,

        /// Message payload (reads from stdin if not provided)
        #[arg(short = 'm', long)]
        message: Option<String>,

        /// QoS level (0, 1, or 2)
        #[arg(short = 'q', long, default_value = "0")]
        qos: u8,

        /// Retain the message on the broker
        #[arg(short = 'r', long)]
        retain: bool,
    },
    /// Subscribe to topics and print messages
    Sub {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Topic(s) to subscribe to (can be specified multiple times)
        #[arg(short = 't', long, required = true)]
        topic: Vec<String>,

        /// QoS level for subscriptions (0, 1, or 2)
        #[arg(short = 'q', long, default_value = "0")]
        qos: u8,

        /// Print topic name before each message
        #[arg(short = 'T', long)]
        print_topic: bool,

        /// Will message topic (sent by broker if client disconnects unexpectedly)
        #[arg(long)]
        will_topic: Option<String>,

        /// Will message payload
        #[arg(long)]
        will_message: Option<String>,

        /// Will message QoS level (0, 1, or 2)
        #[arg(long, default_value = "0")]
        will_qos: u8,

        /// Retain the will message on the broker
        #[arg(long)]
        will_retain: bool,
    },
}

struct Will {
    topic: Option<String>,
    message: Option<String>,
    qos: u8,
    retain: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Pub {
            connection,
            topic,
            message,
            qos,
            retain,
        } => run_publish(connection, topic, message, qos, retain).await,
        Commands::Sub {
            connection,
            topic,
            qos,
            print_topic,
            will_topic,
            will_message,
            will_qos,
            will_retain,
        } => {
            let will = Will {
                topic: will_topic,
                message: will_message,
                qos: will_qos,
                retain: will_retain,
            };
            run_subscribe(connection, topic, qos, print_topic, will).await
        }
    }
}

fn start(
    connection: &ConnectionArgs,
    will: Option<Message>,
) -> Result<MqttClient, Box<dyn std::error::Error>> {
    let config = connection.load_config()?;
    init_logging(connection.verbose, &config.logging.level);

    let mut options = connection.to_connect_options(&config.connection)?;
    if let Some(will) = will {
        options = options.will(will);
    }

    let client = MqttClient::new(options)?;
    client.connect()?;

    Ok(client)
}

/// Waits until `done` matches an event. A disconnect before that is an error.
async fn wait_for(
    client: &MqttClient,
    done: impl Fn(&Event) -> bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut last_error: Option<SessionError> = None;

    while let Some(event) = client.recv().await {
        debug!(?event, "Event");

        if done(&event) {
            return Ok(());
        }

        match event {
            Event::Error(e) => last_error = Some(e),
            Event::Disconnected => {
                return Err(match last_error {
                    Some(e) => e.into(),
                    None => "disconnected".into(),
                });
            }
            _ => {}
        }
    }

    Err("client stopped".into())
}

async fn run_publish(
    connection: ConnectionArgs,
    topic: String,
    message: Option<String>,
    qos_level: u8,
    retain: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = match message {
        Some(msg) => msg,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let qos = QoS::try_from(qos_level)?;

    let client = start(&connection, None)?;
    wait_for(&client, |e| matches!(e, Event::Connected { .. })).await?;

    let packet_id = client.publish(&topic, Bytes::from(payload), qos, retain)?;
    wait_for(&client, |e| {
        matches!(e, Event::Published { packet_id: id } if *id == packet_id)
    })
    .await?;

    info!(%topic, ?packet_id, "Published");

    client.disconnect();
    wait_for(&client, |e| matches!(e, Event::Disconnected)).await?;

    Ok(())
}

async fn run_subscribe(
    connection: ConnectionArgs,
    topics: Vec<String>,
    qos_level: u8,
    print_topic: bool,
    will: Will,
) -> Result<(), Box<dyn std::error::Error>> {
    let qos = QoS::try_from(qos_level)?;

    let will = match will.topic {
        Some(topic) => Some(
            Message::new(topic, will.message.unwrap_or_default())
                .qos(QoS::try_from(will.qos)?)
                .retain(will.retain),
        ),
        None => None,
    };

    let client = start(&connection, will)?;
    wait_for(&client, |e| matches!(e, Event::Connected { .. })).await?;

    let subscriptions: Vec<(&str, QoS)> = topics.iter().map(|t| (t.as_str(), qos)).collect();
    client.subscribe(&subscriptions)?;

    tokio::select! {
        _ = signal::ctrl_c() => {
            eprintln!("\nDisconnecting...");
        }
        _ = async {
            while let Some(event) = client.recv().await {
                match event {
                    Event::Message(message) => {
                        let payload = String::from_utf8_lossy(&message.payload);
                        if print_topic {
                            println!("{}: {}", message.topic, payload);
                        } else {
                            println!("{}", payload);
                        }
                    }
                    Event::Subscribed { topic, qos } => {
                        info!(%topic, %qos, "Subscribed");
                    }
                    Event::Error(e) => eprintln!("Error: {}", e),
                    Event::Disconnected => {
                        eprintln!("Disconnected");
                        break;
                    }
                    _ => {}
                }
            }
        } => return Ok(()),
    }

    client.disconnect();
    let _ = wait_for(&client, |e| matches!(e, Event::Disconnected)).await;

    Ok(())
}
