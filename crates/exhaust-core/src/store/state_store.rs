// ── Persistent state store ──
//
// The authoritative unit-id → ExhaustState map. Every mutation rewrites
// the whole JSON document through a temp file + rename so a crash never
// leaves a half-written file behind. A writable store holds an exclusive
// advisory lock on `<file>.lock` for as long as it lives, so the daemon
// and a one-shot command never write the same file.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::state::ExhaustState;
use crate::error::CoreError;

/// Current on-disk document version.
pub const STATE_FILE_VERSION: u32 = 1;

/// On-disk document: `{version, updatedAt, states}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateDocument {
    version: u32,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    states: Vec<ExhaustState>,
}

/// Owner of every `ExhaustState`.
///
/// Callers mutate only through [`upsert`](Self::upsert),
/// [`update`](Self::update) and [`remove`](Self::remove); each one
/// persists the full map before returning.
pub struct StateStore {
    path: Option<PathBuf>,
    /// Writer lock, held until drop. `None` for in-memory and read-only stores.
    lock: Option<File>,
    states: Mutex<BTreeMap<String, ExhaustState>>,
}

impl StateStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            lock: None,
            states: Mutex::new(BTreeMap::new()),
        }
    }

    /// Open the store at `path` as its only writer, loading whatever it
    /// holds.
    ///
    /// A missing or unreadable document yields an empty store. Fails
    /// with [`CoreError::StateLocked`] while another store holds the
    /// file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let lock = acquire_writer_lock(&path)?;
        let states = load_document(&path);
        info!(path = %path.display(), count = states.len(), "state store loaded");
        Ok(Self {
            path: Some(path),
            lock: Some(lock),
            states: Mutex::new(states),
        })
    }

    /// Load the store at `path` without taking the writer lock.
    ///
    /// Mutations stay in memory and are never written back.
    pub fn open_read_only(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let states = load_document(&path);
        debug!(path = %path.display(), count = states.len(), "state store loaded read-only");
        Self {
            path: Some(path),
            lock: None,
            states: Mutex::new(states),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.path.is_some() && self.lock.is_none()
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub async fn get(&self, id: &str) -> Option<ExhaustState> {
        self.states.lock().await.get(id).cloned()
    }

    /// All states, ordered by id.
    pub async fn snapshot(&self) -> Vec<ExhaustState> {
        self.states.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.states.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.lock().await.is_empty()
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Insert or replace a state under its own id.
    pub async fn upsert(&self, state: ExhaustState) {
        let mut states = self.states.lock().await;
        states.insert(state.id.clone(), state);
        self.persist_or_warn(&states).await;
    }

    /// Apply `f` to the state with `id`, returning the updated copy.
    pub async fn update<F>(&self, id: &str, f: F) -> Option<ExhaustState>
    where
        F: FnOnce(&mut ExhaustState),
    {
        let mut states = self.states.lock().await;
        let state = states.get_mut(id)?;
        f(state);
        let updated = state.clone();
        self.persist_or_warn(&states).await;
        Some(updated)
    }

    pub async fn remove(&self, id: &str) -> Option<ExhaustState> {
        let mut states = self.states.lock().await;
        let removed = states.remove(id);
        if removed.is_some() {
            self.persist_or_warn(&states).await;
        }
        removed
    }

    /// Write the current map to disk, surfacing any failure.
    pub async fn flush(&self) -> Result<(), CoreError> {
        let states = self.states.lock().await;
        self.persist(&states).await
    }

    // ── Persistence ──────────────────────────────────────────────────

    async fn persist_or_warn(&self, states: &BTreeMap<String, ExhaustState>) {
        if let Err(e) = self.persist(states).await {
            warn!(error = %e, "state persistence failed; in-memory state kept");
        }
    }

    /// Serialize under the map lock, then write on the blocking pool.
    /// The map lock stays held until the rename lands, so writes reach
    /// disk in mutation order.
    async fn persist(&self, states: &BTreeMap<String, ExhaustState>) -> Result<(), CoreError> {
        let Some(path) = self.path.as_deref().filter(|_| self.lock.is_some()) else {
            return Ok(());
        };

        let doc = StateDocument {
            version: STATE_FILE_VERSION,
            updated_at: Utc::now(),
            states: states.values().cloned().collect(),
        };
        let persistence = |message: String| CoreError::Persistence {
            path: path.to_path_buf(),
            message,
        };

        let body = serde_json::to_vec_pretty(&doc).map_err(|e| persistence(e.to_string()))?;
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomic(&target, &body))
            .await
            .map_err(|e| persistence(e.to_string()))?
            .map_err(|e| persistence(e.to_string()))?;

        debug!(path = %path.display(), count = states.len(), "state persisted");
        Ok(())
    }
}

fn write_atomic(path: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = sibling(path, ".tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(body)?;
        file.sync_all()?;
    }

    // Atomic replace (rename is atomic on POSIX)
    std::fs::rename(&temp_path, path)
}

fn acquire_writer_lock(path: &Path) -> Result<File, CoreError> {
    let persistence = |e: std::io::Error| CoreError::Persistence {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(persistence)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(sibling(path, ".lock"))
        .map_err(persistence)?;

    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
            Err(CoreError::StateLocked {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(persistence(e)),
    }
}

/// `state.json` → `state.json<suffix>` in the same directory.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
