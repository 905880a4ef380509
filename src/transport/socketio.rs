//! socket.io transport over WebSocket.
//!
//! Each opened socket spawns one tokio task that owns the WebSocket and
//! runs the reconnect loop.
//!
//! # Event Loop
//!
//! The task handles:
//!
//! - engine.io handshake and heartbeat
//! - socket.io namespace connect
//! - incoming events, forwarded as [`TransportEvent`]s
//! - outgoing emits, refused while disconnected
//! - reconnection with exponential backoff until closed
//!
//! Every namespace connect starts a new session number, published to the
//! socket handle. An emit is tagged with the session it was accepted in and
//! dropped if that session has ended by the time the loop sees it. Callers
//! learn about the loss through the [`TransportEvent::Error`] that ends the
//! session, so nothing is replayed on the next connection.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::packet::{ENGINE_IO_VERSION, ROOT_NAMESPACE};
use crate::protocol::{EnginePacket, SocketPacket, describe_error};

use super::{EventSink, ReconnectPolicy, Socket, Transport, TransportEvent};

// ============================================================================
// Constants
// ============================================================================

/// Path socket.io is served under.
const SOCKET_IO_PATH: &str = "/socket.io/";

/// Session number meaning "not connected".
const NO_SESSION: u64 = 0;

/// Heartbeat deadline used until the handshake says otherwise.
const IDLE_PING: Duration = Duration::from_secs(3600);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Internal commands for the event loop.
enum SocketCommand {
    /// Send a named event within `session`.
    Emit {
        session: u64,
        event: String,
        payload: Value,
    },
    /// Close the socket and stop reconnecting.
    Shutdown,
}

/// How a single WebSocket session ended.
enum SessionEnd {
    /// Closed on request; do not reconnect.
    Shutdown,
    /// Lost or never established; reconnect.
    Lost {
        /// Whether the namespace had connected in this session.
        connected: bool,
        reason: String,
    },
}

// ============================================================================
// SocketIoTransport
// ============================================================================

/// Transport speaking socket.io (engine.io protocol 3) over WebSocket.
///
/// The endpoint's scheme selects plain (`http`, `ws`) or secure (`https`,
/// `wss`) WebSockets, its path selects the socket.io namespace and its
/// query string is passed through on every connection attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketIoTransport;

impl SocketIoTransport {
    /// Creates the transport.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Transport for SocketIoTransport {
    fn open(
        &self,
        endpoint: &Url,
        policy: &ReconnectPolicy,
        events: EventSink,
    ) -> Result<Box<dyn Socket>> {
        let target = Target::from_endpoint(endpoint)?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let live = Arc::new(AtomicU64::new(NO_SESSION));

        debug!(url = %target.ws_url, namespace = %target.namespace, "Opening socket.io transport");
        tokio::spawn(run_event_loop(
            target,
            *policy,
            command_rx,
            events,
            Arc::clone(&live),
        ));

        Ok(Box::new(SocketIoSocket { command_tx, live }))
    }
}

// ============================================================================
// SocketIoSocket
// ============================================================================

/// Handle to a running socket.io event loop.
struct SocketIoSocket {
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    /// Current session number, [`NO_SESSION`] while disconnected.
    live: Arc<AtomicU64>,
}

impl Socket for SocketIoSocket {
    fn emit(&self, event: &str, payload: Value) -> Result<()> {
        let session = self.live.load(Ordering::Acquire);
        if session == NO_SESSION {
            if self.command_tx.is_closed() {
                return Err(Error::ConnectionClosed);
            }
            return Err(Error::SocketNotReady);
        }

        self.command_tx
            .send(SocketCommand::Emit {
                session,
                event: event.to_string(),
                payload,
            })
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        let _ = self.command_tx.send(SocketCommand::Shutdown);
    }
}

// ============================================================================
// Target
// ============================================================================

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    ws_url: Url,
    namespace: String,
}

impl Target {
    /// Derives the WebSocket URL and namespace from an endpoint URL.
    fn from_endpoint(endpoint: &Url) -> Result<Self> {
        let scheme = match endpoint.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(Error::config(format!(
                    "unsupported endpoint scheme: {other}"
                )));
            }
        };

        let namespace = match endpoint.path().trim_end_matches('/') {
            "" => ROOT_NAMESPACE.to_string(),
            path => path.to_string(),
        };

        let mut ws_url = endpoint.clone();
        ws_url
            .set_scheme(scheme)
            .map_err(|()| Error::config(format!("cannot use scheme {scheme} for {endpoint}")))?;
        ws_url.set_path(SOCKET_IO_PATH);
        ws_url.set_fragment(None);
        ws_url
            .query_pairs_mut()
            .append_pair("EIO", &ENGINE_IO_VERSION.to_string())
            .append_pair("transport", "websocket");

        Ok(Self { ws_url, namespace })
    }

    /// Encodes an event for this target's namespace.
    fn event_frame(&self, event: &str, payload: Value) -> Result<String> {
        EnginePacket::Message(SocketPacket::event(&self.namespace, event, payload)).encode()
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Connects, runs sessions and reconnects until shut down.
async fn run_event_loop(
    target: Target,
    policy: ReconnectPolicy,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    events: EventSink,
    live: Arc<AtomicU64>,
) {
    let mut sessions = Sessions {
        live,
        last: NO_SESSION,
    };
    let mut attempt: u32 = 0;

    loop {
        let end = run_session(&target, &policy, &mut command_rx, &events, &mut sessions).await;
        sessions.end();

        match end {
            SessionEnd::Shutdown => break,
            SessionEnd::Lost { connected, reason } => {
                let event = if connected {
                    attempt = 0;
                    warn!(reason = %reason, "socket.io connection lost");
                    TransportEvent::Error(reason)
                } else {
                    debug!(reason = %reason, attempt, "socket.io connect failed");
                    TransportEvent::ConnectError(reason)
                };
                if events.send(event).is_err() {
                    debug!("Event receiver dropped");
                    break;
                }
            }
        }

        let delay = policy.delay_for(attempt);
        attempt = attempt.saturating_add(1);
        trace!(?delay, attempt, "Waiting before reconnect");

        if !wait_backoff(delay, &mut command_rx).await {
            break;
        }
    }

    debug!("socket.io event loop terminated");
}

/// Sleeps for `delay`. Returns `false` on shutdown.
async fn wait_backoff(
    delay: Duration,
    command_rx: &mut mpsc::UnboundedReceiver<SocketCommand>,
) -> bool {
    let backoff = sleep(delay);
    tokio::pin!(backoff);

    loop {
        tokio::select! {
            () = &mut backoff => return true,
            command = command_rx.recv() => match command {
                Some(SocketCommand::Emit { session, event, .. }) => {
                    drop_stale_emit(session, &event);
                }
                Some(SocketCommand::Shutdown) | None => return false,
            }
        }
    }
}

/// Runs one WebSocket session from connect to loss or shutdown.
async fn run_session(
    target: &Target,
    policy: &ReconnectPolicy,
    command_rx: &mut mpsc::UnboundedReceiver<SocketCommand>,
    events: &EventSink,
    sessions: &mut Sessions,
) -> SessionEnd {
    debug!(url = %target.ws_url, "Connecting");

    let ws_stream = tokio::select! {
        attempt = timeout(policy.connect_timeout, connect_async(target.ws_url.as_str())) => {
            match attempt {
                Ok(Ok((ws_stream, _response))) => ws_stream,
                Ok(Err(e)) => return SessionEnd::lost(false, e.to_string()),
                Err(_) => return SessionEnd::lost(false, "timeout"),
            }
        }
        () = wait_shutdown(command_rx) => return SessionEnd::Shutdown,
    };

    let (mut ws_write, mut ws_read) = ws_stream.split();
    let mut session = NO_SESSION;
    let mut connected = false;
    let mut ping_interval = IDLE_PING;
    let mut ping_timeout = IDLE_PING;
    let mut pong_deadline: Option<Instant> = None;
    let next_ping = sleep_until(Instant::now() + IDLE_PING);
    tokio::pin!(next_ping);

    loop {
        tokio::select! {
            message = ws_read.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        return SessionEnd::lost(connected, "transport close");
                    }
                    Some(Err(e)) => return SessionEnd::lost(connected, e.to_string()),
                    // Binary, Ping, Pong, Frame
                    _ => continue,
                };

                let packet = match EnginePacket::decode(&text) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!(error = %e, "Failed to decode socket.io frame");
                        continue;
                    }
                };

                match packet {
                    EnginePacket::Open(handshake) => {
                        debug!(sid = %handshake.sid, "engine.io session opened");
                        ping_interval = handshake.ping_interval();
                        ping_timeout = handshake.ping_timeout();
                        next_ping.as_mut().reset(Instant::now() + ping_interval);

                        if target.namespace != ROOT_NAMESPACE {
                            let connect = EnginePacket::Message(SocketPacket::Connect {
                                namespace: target.namespace.clone(),
                            });
                            if let Err(e) = send_packet(&mut ws_write, &connect).await {
                                return SessionEnd::lost(connected, e.to_string());
                            }
                        }
                    }

                    EnginePacket::Ping(data) => {
                        if let Err(e) = send_packet(&mut ws_write, &EnginePacket::Pong(data)).await {
                            return SessionEnd::lost(connected, e.to_string());
                        }
                    }

                    EnginePacket::Pong(_) => pong_deadline = None,

                    EnginePacket::Close => return SessionEnd::lost(connected, "transport close"),

                    EnginePacket::Message(packet) if packet.namespace() == target.namespace => {
                        match packet {
                            SocketPacket::Connect { .. } => {
                                if connected {
                                    trace!("Duplicate namespace connect");
                                    continue;
                                }
                                session = sessions.begin();
                                connected = true;
                                info!(namespace = %target.namespace, session, "socket.io connected");
                                if events.send(TransportEvent::Connected).is_err() {
                                    return SessionEnd::Shutdown;
                                }
                            }
                            SocketPacket::Disconnect { .. } => {
                                return SessionEnd::lost(connected, "io server disconnect");
                            }
                            SocketPacket::Event { name, payload, .. } => {
                                trace!(event = %name, "socket.io event");
                                if events.send(TransportEvent::Event { name, payload }).is_err() {
                                    return SessionEnd::Shutdown;
                                }
                            }
                            SocketPacket::Error { data, .. } => {
                                let reason = describe_error(&data);
                                warn!(reason = %reason, "socket.io error packet");
                                if events.send(TransportEvent::Error(reason)).is_err() {
                                    return SessionEnd::Shutdown;
                                }
                            }
                            SocketPacket::Other { kind, .. } => {
                                trace!(kind, "Ignoring socket.io packet");
                            }
                        }
                    }

                    EnginePacket::Message(packet) => {
                        trace!(namespace = %packet.namespace(), "Ignoring packet for other namespace");
                    }

                    EnginePacket::Upgrade | EnginePacket::Noop => {}
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(SocketCommand::Emit { session: tag, event, payload }) => {
                        if !connected || tag != session {
                            drop_stale_emit(tag, &event);
                            continue;
                        }
                        let frame = match target.event_frame(&event, payload) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!(error = %e, event = %event, "Failed to encode emit");
                                continue;
                            }
                        };
                        if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                            return SessionEnd::lost(connected, e.to_string());
                        }
                    }

                    Some(SocketCommand::Shutdown) | None => {
                        debug!("Shutdown command received");
                        let _ = send_packet(&mut ws_write, &EnginePacket::Close).await;
                        let _ = ws_write.close().await;
                        return SessionEnd::Shutdown;
                    }
                }
            }

            () = &mut next_ping => {
                if pong_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    return SessionEnd::lost(connected, "ping timeout");
                }
                if let Err(e) = send_packet(&mut ws_write, &EnginePacket::Ping(String::new())).await {
                    return SessionEnd::lost(connected, e.to_string());
                }
                if pong_deadline.is_none() {
                    pong_deadline = Some(Instant::now() + ping_timeout);
                }
                next_ping.as_mut().reset(Instant::now() + ping_interval);
            }
        }
    }
}

/// Resolves once shutdown is requested.
async fn wait_shutdown(command_rx: &mut mpsc::UnboundedReceiver<SocketCommand>) {
    loop {
        match command_rx.recv().await {
            Some(SocketCommand::Emit { session, event, .. }) => {
                drop_stale_emit(session, &event);
            }
            Some(SocketCommand::Shutdown) | None => return,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

impl SessionEnd {
    fn lost(connected: bool, reason: impl Into<String>) -> Self {
        Self::Lost {
            connected,
            reason: reason.into(),
        }
    }
}

/// Session numbering shared with the socket handle.
struct Sessions {
    live: Arc<AtomicU64>,
    last: u64,
}

impl Sessions {
    /// Starts the next session and publishes it.
    fn begin(&mut self) -> u64 {
        self.last += 1;
        self.live.store(self.last, Ordering::Release);
        self.last
    }

    /// Marks the socket disconnected.
    fn end(&self) {
        self.live.store(NO_SESSION, Ordering::Release);
    }
}

/// Logs an emit whose session is gone.
fn drop_stale_emit(session: u64, event: &str) {
    debug!(session, event = %event, "Dropping emit from ended session");
}

/// Encodes and sends one engine.io packet.
async fn send_packet(ws_write: &mut WsSink, packet: &EnginePacket) -> Result<()> {
    let frame = packet.encode()?;
    ws_write.send(Message::Text(frame.into())).await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
