// ── Module bring-up and refresh ──
//
// Brings a module to a known-good state (all relays off, pulse time
// verified) and keeps its status cache entry fresh afterwards.

use exhaust_api::{PowerState, pulse_time_values};
use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use crate::config::{EXPECTED_PULSE_TIME, RELAY_COUNT};
use crate::controller::Controller;
use crate::error::{CoreError, InitError, InitErrorCode};
use crate::registry::ModuleId;

/// Relays (1-based) whose pulse time is not the expected value.
fn mismatched_relays(values: &[Option<u64>]) -> Vec<u8> {
    (1..=RELAY_COUNT)
        .filter(|relay| {
            values.get(usize::from(relay - 1)).copied().flatten() != Some(EXPECTED_PULSE_TIME)
        })
        .collect()
}

impl Controller {
    /// Bring one module to a known-good state.
    ///
    /// Reads `Status`, switches every relay off, corrects any pulse time
    /// that differs from [`EXPECTED_PULSE_TIME`] and verifies the result.
    /// Each failing step is written to the status cache under its own
    /// code. Re-running against a healthy module only costs the reads.
    pub async fn initialize_module(&self, module: ModuleId, host: &str) -> Result<(), InitError> {
        let client = &self.inner.client;
        let cache = &self.inner.modules;
        info!(%module, host, "initializing module");

        let fail = |code: InitErrorCode, message: String| {
            error!(%module, host, code = %code, error = %message, "module initialization failed");
            cache.record_error(module, host, code, message.clone());
            InitError::new(module, code, message)
        };

        // 1. Status
        let status = client
            .status(host)
            .await
            .map_err(|e| fail(InitErrorCode::StatusReadFailed, e.to_string()))?;
        debug!(%module, "status received");

        // 2. Every relay off, one at a time
        for relay in 1..=RELAY_COUNT {
            client
                .power(host, relay, PowerState::Off)
                .await
                .map_err(|e| fail(InitErrorCode::PowerOffFailed, format!("relay {relay}: {e}")))?;
        }
        debug!(%module, "relays switched off");

        // 3. Pulse time read + correction
        let pulse_time = client
            .pulse_time(host)
            .await
            .map_err(|e| fail(InitErrorCode::PulseTimeReadFailed, e.to_string()))?;

        let current = pulse_time_values(&pulse_time);
        for relay in mismatched_relays(&current) {
            let found = current.get(usize::from(relay - 1)).copied().flatten();
            info!(%module, relay, ?found, expected = EXPECTED_PULSE_TIME, "correcting pulse time");
            client
                .set_pulse_time(host, relay, EXPECTED_PULSE_TIME)
                .await
                .map_err(|e| {
                    fail(InitErrorCode::PulseTimeConfigFailed, format!("relay {relay}: {e}"))
                })?;
        }

        // 4. Verify
        let verified = client
            .pulse_time(host)
            .await
            .map_err(|e| fail(InitErrorCode::PulseTimeVerifyFailed, e.to_string()))?;

        let still_wrong = mismatched_relays(&pulse_time_values(&verified));
        if !still_wrong.is_empty() {
            return Err(fail(
                InitErrorCode::PulseTimeVerifyFailed,
                format!("pulse time differs from expected on relays {still_wrong:?}"),
            ));
        }

        // 5. Healthy
        cache.record_ok(module, host, status, verified);
        info!(%module, "module initialized");
        Ok(())
    }

    /// Re-read `Status` and `PulseTime` for a healthy module.
    ///
    /// Any failure (or an empty status) flags the module with
    /// `STATUS_READ_FAILED`, which sends it back through initialization
    /// on the next tick.
    pub async fn refresh_module(&self, module: ModuleId, host: &str) -> Result<(), CoreError> {
        let client = &self.inner.client;
        let (status, pulse_time) = tokio::join!(client.status(host), client.pulse_time(host));

        let failure = match (status, pulse_time) {
            (Ok(status), Ok(pulse_time)) if !status.is_null() => {
                self.inner.modules.record_ok(module, host, status, pulse_time);
                return Ok(());
            }
            (Ok(_), Ok(_)) => "empty status response".to_owned(),
            (Err(e), _) | (_, Err(e)) => e.to_string(),
        };

        warn!(%module, host, error = %failure, "module refresh failed");
        self.inner
            .modules
            .record_error(module, host, InitErrorCode::StatusReadFailed, failure.clone());
        Err(CoreError::Transport {
            message: failure,
            transient: true,
        })
    }

    /// Refresh every configured module concurrently.
    pub async fn refresh_modules(&self) -> Vec<(ModuleId, Result<(), CoreError>)> {
        let targets: Vec<(ModuleId, String)> = self
            .inner
            .registry
            .configured()
            .map(|(m, h)| (m, h.to_owned()))
            .collect();
        self.refresh_targets(&targets).await
    }

    pub(crate) async fn refresh_targets(
        &self,
        targets: &[(ModuleId, String)],
    ) -> Vec<(ModuleId, Result<(), CoreError>)> {
        join_all(
            targets
                .iter()
                .map(|(module, host)| async move { (*module, self.refresh_module(*module, host).await) }),
        )
        .await
    }
}
