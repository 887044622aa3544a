// ── Scheduler loop ──
//
// One tick: bring modules up (or refresh them), retry failed commands,
// then sweep expired activations. Ticks never overlap; a tick that
// finds another one running is dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::Controller;
use crate::error::InitErrorCode;
use crate::registry::ModuleId;
use crate::store::{ExhaustState, PendingCommand, ProcessStatus};

/// Last error written onto units whose relays a module bring-up switched off.
pub(crate) const RESET_BY_INIT: &str = "relays reset by module initialization";

/// What a single tick did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    /// The tick was dropped because another one was still running.
    pub skipped: bool,
    pub initialized: Vec<ModuleId>,
    /// Modules whose bring-up failed, with the failing step.
    pub init_failed: Vec<(ModuleId, InitErrorCode)>,
    pub refreshed: Vec<ModuleId>,
    pub refresh_failed: Vec<ModuleId>,
    /// Units whose failed command was re-applied.
    pub retried: Vec<String>,
    pub retry_failed: Vec<String>,
    /// Units turned off because their deadline passed.
    pub expired: Vec<String>,
}

impl TickReport {
    pub(crate) fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Clears the running flag however the tick exits.
struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Controller {
    /// Run one scheduler tick now.
    ///
    /// Returns a skipped report if a tick is already in progress.
    pub async fn tick(&self) -> TickReport {
        let Some(_guard) = TickGuard::acquire(&self.inner.tick_running) else {
            debug!("previous tick still running, skipping");
            return TickReport::skipped();
        };
        let _ops = self.inner.operation_lock.lock().await;

        let mut report = TickReport::default();
        self.bring_up_modules(&mut report).await;
        self.retry_failed(&mut report).await;
        self.sweep_expired(&mut report).await;

        info!(
            initialized = report.initialized.len(),
            init_failed = report.init_failed.len(),
            refreshed = report.refreshed.len(),
            refresh_failed = report.refresh_failed.len(),
            retried = report.retried.len(),
            retry_failed = report.retry_failed.len(),
            expired = report.expired.len(),
            "scheduler tick complete"
        );
        report
    }

    // ── Modules ──────────────────────────────────────────────────────

    async fn bring_up_modules(&self, report: &mut TickReport) {
        let (to_init, to_refresh): (Vec<_>, Vec<_>) = self
            .inner
            .registry
            .configured()
            .map(|(module, host)| (module, host.to_owned()))
            .partition(|(module, _)| self.inner.modules.needs_initialization(*module));

        for (module, host) in to_init {
            match self.initialize_module(module, &host).await {
                Ok(()) => {
                    report.initialized.push(module);
                    self.flag_reset_units(module).await;
                }
                Err(e) => report.init_failed.push((module, e.code)),
            }
        }

        for (module, result) in self.refresh_targets(&to_refresh).await {
            match result {
                Ok(()) => report.refreshed.push(module),
                Err(_) => report.refresh_failed.push(module),
            }
        }
    }

    /// Bring-up switched every relay on `module` off. Any unit that should
    /// still be running there is flagged failed so the retry pass turns
    /// it back on.
    async fn flag_reset_units(&self, module: ModuleId) {
        let now = Utc::now();
        let affected: Vec<String> = self
            .inner
            .store
            .snapshot()
            .await
            .into_iter()
            .filter(|s| {
                s.module_id == module
                    && s.pending_command == PendingCommand::On
                    && s.process_status != ProcessStatus::Failed
                    && !s.is_expired(now)
            })
            .map(|s| s.id)
            .collect();

        for id in affected {
            info!(unit = %id, %module, "unit reset by module initialization, scheduling re-arm");
            self.inner
                .store
                .update(&id, |s| {
                    s.process_status = ProcessStatus::Failed;
                    s.last_error = Some(RESET_BY_INIT.to_owned());
                    s.updated_at = now;
                })
                .await;
        }
    }

    // ── Retries ──────────────────────────────────────────────────────

    /// Re-apply every failed command. States left in `starting` by an
    /// interrupted process are treated the same way. Turn-ons whose
    /// deadline already passed are left to the expiry sweep.
    async fn retry_failed(&self, report: &mut TickReport) {
        let now = Utc::now();
        let pending: Vec<ExhaustState> = self
            .inner
            .store
            .snapshot()
            .await
            .into_iter()
            .filter(|s| s.process_status != ProcessStatus::Applied)
            .filter(|s| !(s.pending_command == PendingCommand::On && s.is_expired(now)))
            .collect();

        let mut relay_on_sent = false;
        for state in pending {
            let unit = state.unit();
            match state.pending_command {
                PendingCommand::On => {
                    if relay_on_sent {
                        tokio::time::sleep(self.inner.config.rearm_delay).await;
                    }
                    relay_on_sent = true;

                    match self.relay_on(state.module_id, state.relay).await {
                        Ok(_) => {
                            info!(unit = %state.id, attempt = state.retry_count + 1, "retry applied");
                            self.inner
                                .store
                                .update(&state.id, |s| s.mark_applied(Utc::now()))
                                .await;
                            report.retried.push(state.id);
                        }
                        Err(e) => {
                            warn!(
                                unit = %state.id,
                                error = %e,
                                retryable = e.is_retryable(),
                                "retry failed"
                            );
                            self.inner
                                .store
                                .update(&state.id, |s| s.mark_failed(e.to_string(), Utc::now()))
                                .await;
                            report.retry_failed.push(state.id);
                        }
                    }
                }
                PendingCommand::Off => match self.turn_off_locked(unit).await {
                    Ok(ack) if ack.is_applied() => report.retried.push(state.id),
                    Ok(_) => report.retry_failed.push(state.id),
                    Err(e) => {
                        warn!(unit = %state.id, error = %e, "turn-off retry rejected");
                        report.retry_failed.push(state.id);
                    }
                },
            }
        }
    }

    // ── Expiry ───────────────────────────────────────────────────────

    /// Turn off every unit whose deadline passed, including turn-ons
    /// that never confirmed.
    async fn sweep_expired(&self, report: &mut TickReport) {
        let now = Utc::now();
        let expired: Vec<ExhaustState> = self
            .inner
            .store
            .snapshot()
            .await
            .into_iter()
            .filter(|s| s.pending_command == PendingCommand::On && s.is_expired(now))
            .collect();

        for state in expired {
            info!(unit = %state.id, "auto-off deadline reached");
            match self.turn_off_locked(state.unit()).await {
                Ok(ack) if !ack.is_applied() => {
                    warn!(unit = %state.id, error = ?ack.error, "auto-off failed, will retry");
                }
                Ok(_) => {}
                Err(e) => warn!(unit = %state.id, error = %e, "auto-off rejected"),
            }
            report.expired.push(state.id);
        }
    }
}

/// Periodic tick driver.
pub(crate) async fn scheduler_task(controller: Controller, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                debug!("scheduler tick");
                controller.tick().await;
            }
        }
    }
}
