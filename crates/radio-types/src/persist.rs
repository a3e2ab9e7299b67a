use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::station::StationDescriptor;

/// Last search form contents, restored on the next visit.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SearchFilters {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub stable_only: bool,
}

/// Client-side state that survives restarts.  Opaque to the playback core:
/// it only has to round-trip through serialize/deserialize.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistentState {
    pub last_station: Option<StationDescriptor>,
    #[serde(default)]
    pub favorite_ids: Vec<String>,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub installed: bool,
    pub volume: f32,
    pub saved_at: Option<DateTime<Utc>>,
}

impl Default for PersistentState {
    fn default() -> Self {
        Self {
            last_station: None,
            favorite_ids: Vec::new(),
            filters: SearchFilters::default(),
            installed: false,
            volume: 0.5,
            saved_at: None,
        }
    }
}

impl PersistentState {
    /// Load from disk, degrading to defaults on a missing or corrupt file.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!("persist: corrupt state file {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut stamped = self.clone();
        stamped.saved_at = Some(Utc::now());
        let json = serde_json::to_string_pretty(&stamped)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn toggle_favorite(&mut self, id: &str) {
        if let Some(pos) = self.favorite_ids.iter().position(|f| f == id) {
            self.favorite_ids.remove(pos);
        } else {
            self.favorite_ids.push(id.to_string());
        }
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorite_ids.iter().any(|f| f == id)
    }
}
