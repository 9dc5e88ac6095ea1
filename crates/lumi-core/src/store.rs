//! Last-known device state cache

use crate::persistence;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Exposed property values of one device, keyed by property name
pub type DeviceState = Map<String, Value>;

/// Partial update proposed after a successful write sequence
pub type StatePatch = Map<String, Value>;

/// Per-device state cache
#[derive(Default)]
pub struct StateStore {
    /// Known states (keyed by device id)
    states: Arc<DashMap<String, DeviceState>>,
    /// Wakes the saver task; `None` for an in-memory store
    saver: Option<watch::Sender<()>>,
}

impl StateStore {
    /// In-memory store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by a JSON file, loading whatever is already there
    ///
    /// One background task owns the file. Changes only wake it, and it
    /// snapshots the cache after waking, so the last write is always the
    /// newest state.
    pub async fn with_persistence(path: PathBuf) -> Self {
        let states = Arc::new(DashMap::new());
        for (id, state) in persistence::load_states(&path).await {
            states.insert(id, state);
        }
        let (saver, changes) = watch::channel(());
        tokio::spawn(run_saver(path, Arc::clone(&states), changes));
        Self {
            states,
            saver: Some(saver),
        }
    }

    /// Copy of the cached state (empty if unknown)
    #[must_use]
    pub fn snapshot(&self, id: &str) -> DeviceState {
        self.states
            .get(id)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Merge a patch into one device's state as a single update
    pub fn merge(&self, id: &str, patch: &StatePatch) {
        if patch.is_empty() {
            return;
        }
        {
            let mut entry = self.states.entry(id.to_string()).or_default();
            for (key, value) in patch {
                entry.insert(key.clone(), value.clone());
            }
        }
        self.save();
    }

    /// Drop a device's state
    pub fn remove(&self, id: &str) -> Option<DeviceState> {
        let removed = self.states.remove(id).map(|(_, v)| v);
        if removed.is_some() {
            self.save();
        }
        removed
    }

    /// Ids with cached state
    #[must_use]
    pub fn device_ids(&self) -> Vec<String> {
        self.states.iter().map(|r| r.key().clone()).collect()
    }

    /// Ask the saver task to write the current states
    fn save(&self) {
        if let Some(saver) = &self.saver {
            saver.send_replace(());
        }
    }
}

/// Write the cache to disk each time it changes, until the store is dropped
///
/// Changes arriving during a write coalesce into one more write.
async fn run_saver(
    path: PathBuf,
    states: Arc<DashMap<String, DeviceState>>,
    mut changes: watch::Receiver<()>,
) {
    while changes.changed().await.is_ok() {
        let snapshot: BTreeMap<String, DeviceState> = states
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        if let Err(e) = persistence::save_states(&path, snapshot).await {
            tracing::warn!("Failed to save device state: {}", e);
        }
    }
    tracing::debug!("State saver for {} stopped", path.display());
}
