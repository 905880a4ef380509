//! Connection settings.
//!
//! [`ControllerConfig`] holds what a user configures for one pimatic
//! server. It deserializes from the camelCase JSON shape flow editors store,
//! with every field optional.
//!
//! # Example
//!
//! ```
//! use pimatic_bridge::ControllerConfig;
//!
//! let config: ControllerConfig = serde_json::from_str(
//!     r#"{"host": "pi.local", "port": "8080", "username": "admin", "password": "secret"}"#,
//! ).unwrap();
//! assert_eq!(
//!     config.connector_url().unwrap().as_str(),
//!     "http://pi.local:8080/?username=admin&password=secret"
//! );
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Scheme used when none is configured.
const DEFAULT_PROTOCOL: &str = "http";

/// Host used when none is configured.
const DEFAULT_HOST: &str = "localhost";

// ============================================================================
// ControllerConfig
// ============================================================================

/// Settings for one pimatic server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    /// `http` or `https`. Default: `http`.
    pub protocol: Option<String>,

    /// Server host name or address. Default: `localhost`.
    pub host: Option<String>,

    /// Server port. Accepts a number or a numeric string.
    #[serde(deserialize_with = "deserialize_port")]
    pub port: Option<u16>,

    /// Path pimatic is served under, e.g. behind a reverse proxy.
    pub path: Option<String>,

    /// User name. Credentials are only sent when it is non-blank.
    pub username: Option<String>,

    /// Password. May be empty.
    pub password: Option<String>,
}

impl ControllerConfig {
    /// Builds the server endpoint.
    ///
    /// `<protocol>://<host>[:port][/path]` followed by
    /// `/?username=..&password=..` when credentials are configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the pieces do not form a valid URL.
    pub fn connector_url(&self) -> Result<Url> {
        let mut url = format!(
            "{}://{}",
            non_blank(self.protocol.as_deref()).unwrap_or(DEFAULT_PROTOCOL),
            non_blank(self.host.as_deref()).unwrap_or(DEFAULT_HOST)
        );

        if let Some(port) = self.port {
            url.push_str(&format!(":{port}"));
        }

        if let Some(path) = non_blank(self.path.as_deref()) {
            url.push('/');
            url.push_str(path.trim_matches('/'));
        }

        if let (Some(username), Some(password)) =
            (non_blank(self.username.as_deref()), self.password.as_deref())
        {
            url.push_str(&format!(
                "/?username={}&password={}",
                urlencoding::encode(username),
                urlencoding::encode(password)
            ));
        }

        Ok(Url::parse(&url)?)
    }

    /// Returns `true` if credentials will be sent.
    #[inline]
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        non_blank(self.username.as_deref()).is_some() && self.password.is_some()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Trimmed value, or `None` if missing or blank.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Reads a port given as number, numeric string, blank string or null.
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid port: {number}"))),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid port: {text}"))),
        other => Err(D::Error::custom(format!("invalid port: {other}"))),
    }
}

/// Checks that a configured protocol is one the transport can speak.
pub(crate) fn validate_protocol(config: &ControllerConfig) -> Result<()> {
    match non_blank(config.protocol.as_deref()) {
        None | Some("http" | "https") => Ok(()),
        Some(other) => Err(Error::config(format!(
            "Unsupported protocol: {other}. Use \"http\" or \"https\"."
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
