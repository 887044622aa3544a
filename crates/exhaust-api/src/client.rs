// Relay module HTTP client
//
// Wraps `reqwest::Client` with command URL construction and response
// decoding. Every module is addressed per call by host, so a single
// client serves the whole fleet.

use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::command::{DeviceCommand, PowerState};
use crate::error::Error;
use crate::transport::TransportConfig;

/// Raw HTTP client for the modules' command endpoint.
///
/// Issues `GET {scheme}://{host}:{port}/{path}?cmnd={command}` and returns
/// the decoded JSON body. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    transport: TransportConfig,
}

impl DeviceClient {
    /// Create a new client from a `TransportConfig`.
    pub fn new(transport: TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, transport })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, transport: TransportConfig) -> Self {
        Self { http, transport }
    }

    /// The transport settings this client was built with.
    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    // ── Raw command surface ──────────────────────────────────────────

    /// Send a command, letting the HTTP layer encode it as `cmnd`.
    pub async fn send(&self, host: &str, command: &str) -> Result<Value, Error> {
        let url = Url::parse(&self.transport.command_base(host))?;
        debug!(host, command, "GET {}", url);

        let request = self.http.get(url).query(&[("cmnd", command)]);
        self.execute(request).await
    }

    /// Send a pre-encoded command verbatim (backlog / composite commands).
    ///
    /// The caller owns the encoding; the string is appended after `?cmnd=`
    /// without further escaping.
    pub async fn send_raw(&self, host: &str, encoded_command: &str) -> Result<Value, Error> {
        let full = format!("{}?cmnd={encoded_command}", self.transport.command_base(host));
        let url = Url::parse(&full)?;
        debug!(host, "GET {} (raw)", url);

        self.execute(self.http.get(url)).await
    }

    /// Send a typed command.
    pub async fn command(&self, host: &str, command: &DeviceCommand) -> Result<Value, Error> {
        self.send(host, &command.to_string()).await
    }

    // ── Typed helpers ────────────────────────────────────────────────

    /// Read the module's `Status` document.
    pub async fn status(&self, host: &str) -> Result<Value, Error> {
        self.command(host, &DeviceCommand::Status).await
    }

    /// Switch one relay.
    pub async fn power(&self, host: &str, relay: u8, state: PowerState) -> Result<Value, Error> {
        self.command(host, &DeviceCommand::Power { relay, state })
            .await
    }

    /// Read the pulse-time settings of every relay.
    pub async fn pulse_time(&self, host: &str) -> Result<Value, Error> {
        self.command(host, &DeviceCommand::PulseTime).await
    }

    /// Configure one relay's pulse time.
    pub async fn set_pulse_time(&self, host: &str, relay: u8, value: u64) -> Result<Value, Error> {
        self.command(host, &DeviceCommand::SetPulseTime { relay, value })
            .await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Value, Error> {
        let resp = request.send().await.map_err(|e| self.map_send_error(e))?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let body = resp.text().await.map_err(|e| self.map_send_error(e))?;
        trace!(body = %body, "module response");

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.transport.timeout.as_secs(),
            }
        } else {
            Error::Transport(err)
        }
    }
}
