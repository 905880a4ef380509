//! socket.io text packet codec.
//!
//! pimatic serves socket.io 1.x/2.x, i.e. engine.io protocol 3. Over a
//! WebSocket every frame is one engine.io packet; socket.io packets ride
//! inside engine.io `message` packets.
//!
//! # Format
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":60000}   open
//! 2                                                          ping
//! 3                                                          pong
//! 40                                                         connect /
//! 40/pimatic                                                 connect /pimatic
//! 42["variables",[...]]                                      event on /
//! 42/pimatic,["callResult",{...}]                            event on /pimatic
//! 44{"message":"Authentication error"}                       error
//! ```
//!
//! Binary packets and acknowledgements are not used by pimatic and decode
//! to [`SocketPacket::Other`].

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Engine.io protocol revision spoken by the transport.
pub const ENGINE_IO_VERSION: u8 = 3;

/// The default namespace.
pub const ROOT_NAMESPACE: &str = "/";

// ============================================================================
// Handshake
// ============================================================================

/// Payload of the engine.io `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Session id assigned by the server.
    pub sid: String,

    /// Transports the session may upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,

    /// Client ping period in milliseconds.
    pub ping_interval: u64,

    /// Time allowed for the pong in milliseconds.
    pub ping_timeout: u64,
}

impl Handshake {
    /// Client ping period.
    #[inline]
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval)
    }

    /// Time after which a missing pong means the session is dead.
    #[inline]
    #[must_use]
    pub const fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout)
    }
}

// ============================================================================
// EnginePacket
// ============================================================================

/// One engine.io packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    /// Session opened.
    Open(Handshake),
    /// Session closed by the server.
    Close,
    /// Heartbeat request.
    Ping(String),
    /// Heartbeat answer.
    Pong(String),
    /// socket.io payload.
    Message(SocketPacket),
    /// Transport upgrade.
    Upgrade,
    /// No-op.
    Noop,
}

impl EnginePacket {
    /// Decodes a WebSocket text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for empty frames or unknown packet types,
    /// and [`Error::Json`] for malformed JSON bodies.
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::protocol("empty engine.io packet"))?;
        let body = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(body)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(body.to_string())),
            '3' => Ok(Self::Pong(body.to_string())),
            '4' => Ok(Self::Message(SocketPacket::decode(body)?)),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(Error::protocol(format!(
                "unknown engine.io packet type: {other}"
            ))),
        }
    }

    /// Encodes the packet as a WebSocket text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for [`EnginePacket::Open`], which only the
    /// server sends, and [`Error::Json`] if an event payload fails to encode.
    pub fn encode(&self) -> Result<String> {
        match self {
            Self::Open(_) => Err(Error::protocol("open packets are server-only")),
            Self::Close => Ok("1".to_string()),
            Self::Ping(data) => Ok(format!("2{data}")),
            Self::Pong(data) => Ok(format!("3{data}")),
            Self::Message(packet) => Ok(format!("4{}", packet.encode()?)),
            Self::Upgrade => Ok("5".to_string()),
            Self::Noop => Ok("6".to_string()),
        }
    }
}

// ============================================================================
// SocketPacket
// ============================================================================

/// One socket.io packet.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace joined.
    Connect {
        /// Namespace, `/` for the default one.
        namespace: String,
    },
    /// Namespace left.
    Disconnect {
        /// Namespace, `/` for the default one.
        namespace: String,
    },
    /// Named event with its first argument.
    Event {
        /// Namespace, `/` for the default one.
        namespace: String,
        /// Event name.
        name: String,
        /// First event argument, `null` if none.
        payload: Value,
    },
    /// Namespace-level error, e.g. rejected credentials.
    Error {
        /// Namespace, `/` for the default one.
        namespace: String,
        /// Error data as sent.
        data: Value,
    },
    /// Acknowledgements and binary packets.
    Other {
        /// Namespace, `/` for the default one.
        namespace: String,
        /// socket.io packet type.
        kind: u8,
    },
}

impl SocketPacket {
    /// Creates an event packet.
    #[must_use]
    pub fn event(namespace: &str, name: &str, payload: Value) -> Self {
        Self::Event {
            namespace: namespace.to_string(),
            name: name.to_string(),
            payload,
        }
    }

    /// Returns the namespace the packet belongs to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::Error { namespace, .. }
            | Self::Other { namespace, .. } => namespace,
        }
    }

    /// Decodes the body of an engine.io message packet.
    fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(|| Error::protocol(format!("invalid socket.io packet: {text}")))?;
        let (namespace, rest) = split_namespace(chars.as_str());
        let body = rest.trim_start_matches(|c: char| c.is_ascii_digit());

        let packet = match kind {
            0 => Self::Connect { namespace },
            1 => Self::Disconnect { namespace },
            2 => {
                let mut args: Vec<Value> = serde_json::from_str(body)?;
                if args.is_empty() {
                    return Err(Error::protocol("socket.io event without a name"));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(Error::protocol(format!(
                            "socket.io event name is not a string: {other}"
                        )));
                    }
                };
                let payload = args.into_iter().next().unwrap_or(Value::Null);
                Self::Event {
                    namespace,
                    name,
                    payload,
                }
            }
            4 => {
                let data = if body.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
                };
                Self::Error { namespace, data }
            }
            other => Self::Other {
                namespace,
                kind: u8::try_from(other).unwrap_or(u8::MAX),
            },
        };
        Ok(packet)
    }

    /// Encodes the packet body (without the engine.io prefix).
    fn encode(&self) -> Result<String> {
        match self {
            Self::Connect { namespace } => Ok(format!("0{}", namespace_prefix(namespace, false))),
            Self::Disconnect { namespace } => {
                Ok(format!("1{}", namespace_prefix(namespace, false)))
            }
            Self::Event {
                namespace,
                name,
                payload,
            } => {
                let args = serde_json::to_string(&[Value::from(name.as_str()), payload.clone()])?;
                Ok(format!("2{}{args}", namespace_prefix(namespace, true)))
            }
            Self::Error { namespace, data } => Ok(format!(
                "4{}{}",
                namespace_prefix(namespace, true),
                serde_json::to_string(data)?
            )),
            Self::Other { kind, .. } => Err(Error::protocol(format!(
                "cannot encode socket.io packet type {kind}"
            ))),
        }
    }
}

// ============================================================================
// Namespace Helpers
// ============================================================================

/// Splits an optional `/namespace,` prefix off a packet body.
fn split_namespace(text: &str) -> (String, &str) {
    if !text.starts_with('/') {
        return (ROOT_NAMESPACE.to_string(), text);
    }
    match text.find(',') {
        Some(index) => (text[..index].to_string(), &text[index + 1..]),
        None => (text.to_string(), ""),
    }
}

/// Renders the namespace prefix; the root namespace is implicit.
fn namespace_prefix(namespace: &str, separator: bool) -> String {
    if namespace == ROOT_NAMESPACE || namespace.is_empty() {
        String::new()
    } else if separator {
        format!("{namespace},")
    } else {
        namespace.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
