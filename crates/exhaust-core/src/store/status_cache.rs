// ── Module status cache ──
//
// Last-known status per module. Written by the initializer and the
// scheduler's refresh pass; read by status views and by turn-on's
// offline check.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::InitErrorCode;
use crate::registry::ModuleId;

/// Last probe result for one module.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    pub host: String,
    pub status: Option<Value>,
    pub pulse_time: Option<Value>,
    pub updated_at: DateTime<Utc>,
    pub error_code: Option<InitErrorCode>,
    pub error: Option<String>,
}

impl ModuleStatus {
    /// Reachable on the last probe and not stuck in a failed bring-up.
    pub fn is_healthy(&self) -> bool {
        self.error_code.is_none() && self.status.is_some()
    }
}

#[derive(Debug, Default)]
pub struct ModuleStatusCache {
    entries: DashMap<ModuleId, ModuleStatus>,
}

impl ModuleStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ok(&self, module: ModuleId, host: &str, status: Value, pulse_time: Value) {
        self.entries.insert(
            module,
            ModuleStatus {
                host: host.to_owned(),
                status: Some(status),
                pulse_time: Some(pulse_time),
                updated_at: Utc::now(),
                error_code: None,
                error: None,
            },
        );
    }

    pub fn record_error(
        &self,
        module: ModuleId,
        host: &str,
        code: InitErrorCode,
        error: impl Into<String>,
    ) {
        self.entries.insert(
            module,
            ModuleStatus {
                host: host.to_owned(),
                status: None,
                pulse_time: None,
                updated_at: Utc::now(),
                error_code: Some(code),
                error: Some(error.into()),
            },
        );
    }

    pub fn get(&self, module: ModuleId) -> Option<ModuleStatus> {
        self.entries.get(&module).map(|r| r.value().clone())
    }

    /// Never probed, or the last probe left an error code behind.
    pub fn needs_initialization(&self, module: ModuleId) -> bool {
        self.entries
            .get(&module)
            .is_none_or(|entry| entry.error_code.is_some())
    }

    pub fn is_healthy(&self, module: ModuleId) -> bool {
        self.entries
            .get(&module)
            .is_some_and(|entry| entry.is_healthy())
    }

    /// Every cached entry, in slot order.
    pub fn snapshot(&self) -> BTreeMap<ModuleId, ModuleStatus> {
        self.entries
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unknown_module_needs_initialization() {
        let cache = ModuleStatusCache::new();
        assert!(cache.needs_initialization(ModuleId::A14));
        assert!(!cache.is_healthy(ModuleId::A14));
    }

    #[test]
    fn error_entry_needs_initialization() {
        let cache = ModuleStatusCache::new();
        cache.record_error(ModuleId::B58, "10.0.0.14", InitErrorCode::PowerOffFailed, "timeout");
        assert!(cache.needs_initialization(ModuleId::B58));
        assert!(!cache.is_healthy(ModuleId::B58));
        let entry = cache.get(ModuleId::B58);
        assert_eq!(
            entry.and_then(|e| e.error_code),
            Some(InitErrorCode::PowerOffFailed)
        );
    }

    #[test]
    fn ok_entry_overwrites_error() {
        let cache = ModuleStatusCache::new();
        cache.record_error(ModuleId::A14, "h", InitErrorCode::StatusReadFailed, "down");
        cache.record_ok(ModuleId::A14, "h", json!({"Status": {}}), json!({"PulseTime": {}}));
        assert!(!cache.needs_initialization(ModuleId::A14));
        assert!(cache.is_healthy(ModuleId::A14));
    }

    #[test]
    fn snapshot_is_in_slot_order() {
        let cache = ModuleStatusCache::new();
        cache.record_ok(ModuleId::Pwr58, "h", json!({}), json!({}));
        cache.record_ok(ModuleId::A14, "h", json!({}), json!({}));
        let keys: Vec<_> = cache.snapshot().into_keys().collect();
        assert_eq!(keys, vec![ModuleId::A14, ModuleId::Pwr58]);
    }
}
