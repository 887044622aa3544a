// ── Activation orchestrator ──
//
// Turn-on, turn-off (group power cut + re-arm of the survivors), status
// views and the raw configuration passthrough.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use exhaust_api::PowerState;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::controller::Controller;
use crate::error::CoreError;
use crate::registry::ModuleId;
use crate::store::{ExhaustState, MemoryEntry, ModuleStatus, PendingCommand, ProcessStatus};
use crate::unit::{Group, Tower, UnitId};

// ── Acknowledgements ────────────────────────────────────────────────

/// Result of a turn-on request. A device failure still produces an
/// acknowledgement: the state is recorded as failed and retried by the
/// scheduler.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOnAck {
    pub id: String,
    pub module_id: ModuleId,
    pub relay: u8,
    pub auto_off_minutes: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub process_status: ProcessStatus,
    pub device_response: Option<Value>,
    pub error: Option<String>,
}

impl TurnOnAck {
    pub fn is_applied(&self) -> bool {
        self.process_status == ProcessStatus::Applied
    }
}

/// What happened to one neighbouring unit during a group restore.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RestoreOutcome {
    #[serde(rename_all = "camelCase")]
    Rearmed {
        expires_at: Option<DateTime<Utc>>,
        response: Value,
    },
    #[serde(rename_all = "camelCase")]
    Skipped { remaining_minutes: Option<i64> },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOffAck {
    pub id: String,
    pub power_module: ModuleId,
    pub power_relay: u8,
    pub power_cut_response: Option<Value>,
    /// Keyed by neighbouring unit id.
    pub restore: BTreeMap<String, RestoreOutcome>,
    pub process_status: ProcessStatus,
    pub error: Option<String>,
}

impl TurnOffAck {
    pub fn is_applied(&self) -> bool {
        self.process_status == ProcessStatus::Applied
    }
}

// ── Views ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitStatus {
    pub id: String,
    pub tower: Tower,
    #[serde(rename = "final")]
    pub final_digit: u8,
    pub group: Group,
    pub relay: u8,
    pub module_id: ModuleId,
    pub module: Option<ModuleStatus>,
    pub memory: Option<MemoryEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetStatus {
    pub modules: BTreeMap<ModuleId, ModuleStatus>,
    pub memory: Vec<MemoryEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    pub total: usize,
    pub memory: Vec<MemoryEntry>,
    pub generated_at: DateTime<Utc>,
}

impl Controller {
    // ── Turn on ──────────────────────────────────────────────────────

    /// Switch a unit on, optionally with an auto-off deadline.
    ///
    /// `minutes` of `None` or `0` means no deadline. Rejected with
    /// [`CoreError::ModuleOffline`] unless the unit's relay module passed
    /// its last probe.
    pub async fn turn_on(&self, raw_id: &str, minutes: Option<u32>) -> Result<TurnOnAck, CoreError> {
        let unit = UnitId::parse(raw_id)?;
        let module = unit.module();
        let host = self.inner.registry.resolve_host(module)?.to_owned();

        let _ops = self.inner.operation_lock.lock().await;
        self.ensure_online(module)?;

        let now = Utc::now();
        let minutes = minutes.filter(|m| *m > 0);
        let mut state = ExhaustState::new(unit, PendingCommand::On, now);
        state.expires_at = minutes.map(|m| now + Duration::minutes(i64::from(m)));
        let expires_at = state.expires_at;
        let id = state.id.clone();
        self.inner.store.upsert(state).await;

        info!(unit = %id, %module, relay = unit.relay(), ?minutes, "turning exhaust on");
        let (process_status, device_response, error) =
            match self.inner.client.power(&host, unit.relay(), PowerState::On).await {
                Ok(response) => {
                    self.inner.store.update(&id, |s| s.mark_applied(Utc::now())).await;
                    (ProcessStatus::Applied, Some(response), None)
                }
                Err(e) => {
                    let err = CoreError::from(e);
                    let message = err.to_string();
                    warn!(
                        unit = %id,
                        error = %message,
                        retryable = err.is_retryable(),
                        "turn-on failed, scheduler will retry"
                    );
                    self.inner
                        .store
                        .update(&id, |s| s.mark_failed(message.clone(), Utc::now()))
                        .await;
                    (ProcessStatus::Failed, None, Some(message))
                }
            };

        Ok(TurnOnAck {
            id,
            module_id: module,
            relay: unit.relay(),
            auto_off_minutes: minutes,
            expires_at,
            process_status,
            device_response,
            error,
        })
    }

    fn ensure_online(&self, module: ModuleId) -> Result<(), CoreError> {
        match self.inner.modules.get(module) {
            Some(status) if status.is_healthy() => Ok(()),
            Some(status) => Err(CoreError::ModuleOffline {
                module,
                reason: match (status.error_code, status.error) {
                    (Some(code), Some(error)) => format!("{code}: {error}"),
                    (Some(code), None) => code.to_string(),
                    (None, error) => error.unwrap_or_else(|| "no status reported".to_owned()),
                },
            }),
            None => Err(CoreError::ModuleOffline {
                module,
                reason: "not initialized yet".to_owned(),
            }),
        }
    }

    pub(crate) async fn relay_on(&self, module: ModuleId, relay: u8) -> Result<Value, CoreError> {
        let host = self.inner.registry.resolve_host(module)?;
        Ok(self.inner.client.power(host, relay, PowerState::On).await?)
    }

    // ── Turn off ─────────────────────────────────────────────────────

    /// Switch a unit off.
    ///
    /// Relays only pulse, so "off" means cutting the whole tower+group
    /// branch on the PWR module and switching back on every neighbour
    /// that still has time left.
    pub async fn turn_off(&self, raw_id: &str) -> Result<TurnOffAck, CoreError> {
        let unit = UnitId::parse(raw_id)?;
        let _ops = self.inner.operation_lock.lock().await;
        self.turn_off_locked(unit).await
    }

    /// Turn-off body; the caller holds the operation lock.
    pub(crate) async fn turn_off_locked(&self, unit: UnitId) -> Result<TurnOffAck, CoreError> {
        let power_module = unit.power_cut_module();
        let power_relay = unit.tower.power_cut_relay();
        let power_host = self.inner.registry.resolve_host(power_module)?.to_owned();
        let id = unit.key();

        let now = Utc::now();
        let mut state = self
            .inner
            .store
            .get(&id)
            .await
            .unwrap_or_else(|| ExhaustState::new(unit, PendingCommand::Off, now));
        state.pending_command = PendingCommand::Off;
        state.process_status = ProcessStatus::Starting;
        state.updated_at = now;
        self.inner.store.upsert(state).await;

        let mut ack = TurnOffAck {
            id: id.clone(),
            power_module,
            power_relay,
            power_cut_response: None,
            restore: BTreeMap::new(),
            process_status: ProcessStatus::Failed,
            error: None,
        };

        info!(unit = %id, %power_module, power_relay, "cutting group power");
        match self
            .inner
            .client
            .power(&power_host, power_relay, PowerState::On)
            .await
        {
            Ok(response) => ack.power_cut_response = Some(response),
            Err(e) => {
                let err = CoreError::from(e);
                let message = err.to_string();
                warn!(
                    unit = %id,
                    error = %message,
                    retryable = err.is_retryable(),
                    "power cut failed, scheduler will retry"
                );
                self.fail_turn_off(&id, &message).await;
                ack.error = Some(message);
                return Ok(ack);
            }
        }

        let (restore, restore_error) = self.restore_group(unit).await;
        ack.restore = restore;

        if let Some(message) = restore_error {
            self.fail_turn_off(&id, &message).await;
            ack.error = Some(message);
            return Ok(ack);
        }

        self.inner.store.remove(&id).await;
        info!(unit = %id, rearmed = ack.restore.len(), "exhaust off");
        ack.process_status = ProcessStatus::Applied;
        Ok(ack)
    }

    async fn fail_turn_off(&self, id: &str, message: &str) {
        self.inner
            .store
            .update(id, |s| s.mark_failed(message, Utc::now()))
            .await;
    }

    /// Switch back on every active neighbour that shares the cut branch.
    ///
    /// Neighbours with more than the threshold left are re-armed with
    /// their deadline reset to now plus the rounded-up remaining minutes.
    /// A neighbour without a deadline counts as having unlimited time
    /// left, so it is always re-armed and keeps no deadline; it is never
    /// skipped as if it were about to expire. Returns the per-unit
    /// outcomes and the first failure, if any; a failure does not stop
    /// the remaining re-arms.
    async fn restore_group(&self, unit: UnitId) -> (BTreeMap<String, RestoreOutcome>, Option<String>) {
        let id = unit.key();
        let group = unit.group();
        let threshold = self.inner.config.rearm_threshold_minutes;

        let neighbours: Vec<ExhaustState> = self
            .inner
            .store
            .snapshot()
            .await
            .into_iter()
            .filter(|s| s.id != id && s.tower == unit.tower && s.group == group && s.is_active())
            .collect();

        let mut outcomes = BTreeMap::new();
        let mut first_error = None;
        let mut relay_on_sent = false;

        for state in neighbours {
            let remaining = state.remaining_minutes(Utc::now());
            let rearm = match (state.expires_at, remaining) {
                (None, _) => true,
                (Some(_), Some(minutes)) => minutes > threshold,
                (Some(_), None) => false,
            };
            if !rearm {
                debug!(unit = %state.id, ?remaining, "too little time left, not re-arming");
                outcomes.insert(state.id, RestoreOutcome::Skipped { remaining_minutes: remaining });
                continue;
            }

            if relay_on_sent {
                tokio::time::sleep(self.inner.config.rearm_delay).await;
            }
            relay_on_sent = true;

            match self.relay_on(state.module_id, state.relay).await {
                Ok(response) => {
                    let now = Utc::now();
                    let expires_at = remaining.map(|m| now + Duration::minutes(m));
                    self.inner
                        .store
                        .update(&state.id, |s| {
                            s.expires_at = expires_at;
                            s.updated_at = now;
                        })
                        .await;
                    debug!(unit = %state.id, ?remaining, "re-armed");
                    outcomes.insert(state.id, RestoreOutcome::Rearmed { expires_at, response });
                }
                Err(e) => {
                    let error = e.to_string();
                    warn!(unit = %state.id, error = %error, "re-arm failed");
                    if first_error.is_none() {
                        first_error = Some(format!("re-arm of {} failed: {error}", state.id));
                    }
                    outcomes.insert(state.id, RestoreOutcome::Failed { error });
                }
            }
        }

        (outcomes, first_error)
    }

    // ── Status views ─────────────────────────────────────────────────

    /// Identity, module status and stored state for one unit.
    pub async fn status(&self, raw_id: &str) -> Result<UnitStatus, CoreError> {
        let unit = UnitId::parse(raw_id)?;
        let module_id = unit.module();
        let memory = self
            .inner
            .store
            .get(&unit.key())
            .await
            .map(|s| MemoryEntry::new(s, Utc::now()));

        Ok(UnitStatus {
            id: unit.key(),
            tower: unit.tower,
            final_digit: unit.final_digit,
            group: unit.group(),
            relay: unit.relay(),
            module_id,
            module: self.inner.modules.get(module_id),
            memory,
        })
    }

    /// Every cached module status plus every stored state. Pure read.
    pub async fn all_modules_status(&self) -> FleetStatus {
        FleetStatus {
            modules: self.inner.modules.snapshot(),
            memory: self.memory_entries().await,
        }
    }

    pub async fn process_status(&self) -> ProcessSnapshot {
        let memory = self.memory_entries().await;
        ProcessSnapshot {
            total: memory.len(),
            memory,
            generated_at: Utc::now(),
        }
    }

    async fn memory_entries(&self) -> Vec<MemoryEntry> {
        let now = Utc::now();
        self.inner
            .store
            .snapshot()
            .await
            .into_iter()
            .map(|s| MemoryEntry::new(s, now))
            .collect()
    }

    // ── Configuration passthrough ────────────────────────────────────

    /// Send a raw, already URL-encoded command to a module addressed by
    /// name, 1-8 index or IPv4 address.
    pub async fn configure_module(&self, key: &str, encoded_command: &str) -> Result<Value, CoreError> {
        let host = self.inner.registry.resolve_flexible(key)?;
        info!(module = key, host = %host, command = encoded_command, "sending raw command");
        Ok(self.inner.client.send_raw(&host, encoded_command).await?)
    }
}
