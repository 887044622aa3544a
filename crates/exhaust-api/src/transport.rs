// Shared transport configuration for building the module HTTP client.
//
// Every relay module in the fleet speaks the same protocol on the same
// port and path, so one config describes how to reach all of them.

use std::time::Duration;

use crate::error::Error;

/// Default HTTP port of the relay modules.
pub const DEFAULT_PORT: u16 = 80;

/// Default command endpoint path (`/cm`).
pub const DEFAULT_COMMAND_PATH: &str = "cm";

/// Default bound on every module request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// URL scheme (`http` for stock firmware).
    pub scheme: String,
    /// Port appended to hosts that don't carry their own.
    pub port: u16,
    /// Command endpoint path, without leading slash.
    pub command_path: String,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            scheme: "http".into(),
            port: DEFAULT_PORT,
            command_path: DEFAULT_COMMAND_PATH.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(concat!("exhaust/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Client(format!("failed to build HTTP client: {e}")))
    }

    /// Base command URL for a host: `{scheme}://{host}:{port}/{path}`.
    ///
    /// A host that already names a port (`10.0.0.5:8080`) keeps it.
    pub fn command_base(&self, host: &str) -> String {
        let host = host.trim();
        let path = self.command_path.trim_start_matches('/');
        if host.contains(':') {
            format!("{}://{host}/{path}", self.scheme)
        } else {
            format!("{}://{host}:{}/{path}", self.scheme, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_base_appends_default_port() {
        let cfg = TransportConfig::default();
        assert_eq!(cfg.command_base("10.0.0.11"), "http://10.0.0.11:80/cm");
    }

    #[test]
    fn command_base_keeps_explicit_port() {
        let cfg = TransportConfig {
            command_path: "/cm".into(),
            ..TransportConfig::default()
        };
        assert_eq!(cfg.command_base("127.0.0.1:9000"), "http://127.0.0.1:9000/cm");
    }
}
