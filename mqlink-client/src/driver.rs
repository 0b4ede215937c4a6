//! The task that owns the transport for one client.
//!
//! It opens a stream for every connection attempt, writes whatever the
//! session queued, and feeds inbound packets and clock ticks back into the
//! session under its lock.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use mqlink_core::error::Error;
use mqlink_packets::ControlPacket;
use tokio::{
    sync::{mpsc, Notify},
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    connection::Connection,
    event::Event,
    session::{Session, SessionState},
    transport::Connector,
};

/// State shared between a client handle and its driver.
pub(crate) struct Shared {
    session: Mutex<Session>,
    wakeup: Notify,
    events: mpsc::UnboundedSender<Event>,
}

impl Shared {
    pub(crate) fn new(session: Session, events: mpsc::UnboundedSender<Event>) -> Self {
        Shared {
            session: Mutex::new(session),
            wakeup: Notify::new(),
            events,
        }
    }

    /// Runs `f` with exclusive access to the session, then forwards the
    /// events it raised.
    pub(crate) fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut session);

        while let Some(event) = session.poll_event() {
            // The receiver is gone once the client is dropped.
            let _ = self.events.send(event);
        }

        result
    }

    /// Tells the driver the session changed.
    pub(crate) fn wake(&self) {
        self.wakeup.notify_one();
    }
}

enum Flow {
    Closed,
    Cancelled,
}

pub(crate) async fn run(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
) {
    loop {
        let attempt = shared.with_session(|s| {
            if s.state() == SessionState::Connecting && !s.is_transport_open() {
                Some((s.epoch(), s.connect_target(), s.options().connect_timeout))
            } else {
                None
            }
        });

        let (epoch, (host, port), connect_timeout) = match attempt {
            Some(attempt) => attempt,
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = shared.wakeup.notified() => continue,
                }
            }
        };

        debug!(%host, port, epoch, "Opening transport");

        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = time::timeout(connect_timeout, connector.connect(&host, port)) => opened,
        };

        let stream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                shared.with_session(|s| s.transport_failed(epoch, e.to_string()));
                continue;
            }
            Err(_) => {
                // The session's own clock decides that the attempt is over.
                shared.with_session(|s| s.handle_tick(Instant::now()));
                continue;
            }
        };

        if !shared.with_session(|s| s.transport_opened(epoch)) {
            debug!(epoch, "Dropping transport for an abandoned attempt");
            continue;
        }

        let mut connection = Connection::new(stream);

        match serve(&shared, &mut connection, epoch, &cancel).await {
            Flow::Closed => continue,
            Flow::Cancelled => return,
        }
    }
}

async fn serve(
    shared: &Shared,
    connection: &mut Connection,
    epoch: u64,
    cancel: &CancellationToken,
) -> Flow {
    let mut period = shared.with_session(|s| s.tick_interval());
    let mut ticks = ticker(period);

    loop {
        let outgoing = shared.with_session(|s| s.drain_outgoing());

        if let Err(e) = transmit(connection, &outgoing).await {
            shared.with_session(|s| s.transport_failed(epoch, e.to_string()));
            return Flow::Closed;
        }

        let (state, current_epoch, next_period) =
            shared.with_session(|s| (s.state(), s.epoch(), s.tick_interval()));

        if current_epoch != epoch || state == SessionState::Disconnected {
            let _ = connection.shutdown().await;
            return Flow::Closed;
        }

        if state == SessionState::Disconnecting {
            let _ = connection.shutdown().await;
            shared.with_session(|s| s.transport_closed(epoch));
            return Flow::Closed;
        }

        if next_period != period {
            period = next_period;
            ticks = ticker(period);
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                let outgoing = shared.with_session(|s| s.drain_outgoing());
                let _ = transmit(connection, &outgoing).await;
                let _ = connection.shutdown().await;
                return Flow::Cancelled;
            }
            _ = shared.wakeup.notified() => {}
            _ = ticks.tick() => {
                shared.with_session(|s| s.handle_tick(Instant::now()));
            }
            read = connection.read_packet() => match read {
                Ok(Some(packet)) => {
                    shared.with_session(|s| s.handle_packet(packet, Instant::now()));
                }
                Ok(None) => {
                    shared.with_session(|s| s.transport_closed(epoch));
                }
                Err(Error::Io(e)) => {
                    shared.with_session(|s| s.transport_failed(epoch, e.to_string()));
                }
                Err(e) => {
                    warn!("Undecodable input from broker: {}", e);
                    shared.with_session(|s| s.protocol_violation(epoch, e.to_string()));
                }
            },
        }
    }
}

async fn transmit(
    connection: &mut Connection,
    packets: &[ControlPacket],
) -> mqlink_core::Result<()> {
    if packets.is_empty() {
        return Ok(());
    }

    for packet in packets {
        debug!(packet = %packet.packet_type(), "Sending");
        connection.write_packet(packet).await?;
    }

    connection.flush().await
}

fn ticker(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
