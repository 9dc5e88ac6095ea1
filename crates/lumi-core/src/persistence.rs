//! State cache file
//!
//! The cache is stored as one pretty-printed JSON document:
//!
//! ```text
//! { "version": 1, "devices": { "<id>": { "<property>": <value>, .. } } }
//! ```

use crate::error::EffectError;
use crate::store::DeviceState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

/// Current file format version
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    #[serde(default)]
    devices: BTreeMap<String, DeviceState>,
}

/// Read the state file; a missing, unreadable or foreign file yields an empty cache
pub async fn load_states(path: &Path) -> BTreeMap<String, DeviceState> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No state file at {:?}, starting empty", path);
            return BTreeMap::new();
        }
        Err(e) => {
            tracing::warn!("Failed to read state file {:?}: {}", path, e);
            return BTreeMap::new();
        }
    };

    match serde_json::from_str::<StateFile>(&contents) {
        Ok(file) if file.version == FORMAT_VERSION => {
            tracing::info!("Loaded cached state for {} devices from {:?}", file.devices.len(), path);
            file.devices
        }
        Ok(file) => {
            tracing::warn!("Ignoring state file {:?} with version {}", path, file.version);
            BTreeMap::new()
        }
        Err(e) => {
            tracing::warn!("Failed to parse state file {:?}: {}", path, e);
            BTreeMap::new()
        }
    }
}

/// Replace the state file with a new snapshot
///
/// The snapshot goes to a sibling `.tmp` file first and is renamed into
/// place, so readers never see a partial document.
pub async fn save_states(
    path: &Path,
    devices: BTreeMap<String, DeviceState>,
) -> Result<(), EffectError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let count = devices.len();
    let json = serde_json::to_vec_pretty(&StateFile {
        version: FORMAT_VERSION,
        devices,
    })?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json).await?;
    fs::rename(&tmp_path, path).await?;

    tracing::debug!("Saved state for {} devices", count);
    Ok(())
}
