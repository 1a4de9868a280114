//! File-backed cluster configuration snapshots
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::stores::ConfigPersister;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rekey_keys::{KeyList, KeyStore};
use rekey_types::StoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

/// Snapshot written by [`SnapshotPersister`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub saved_at: DateTime<Utc>,
    pub full: bool,
    /// Key names, active first
    pub key_names: Vec<String>,
    /// Key material; only present in full snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<KeyList>,
}

/// Writes the encryption state to a JSON snapshot file
pub struct SnapshotPersister {
    keys: Arc<dyn KeyStore>,
    path: PathBuf,
}

impl SnapshotPersister {
    pub fn new(keys: Arc<dyn KeyStore>, path: impl AsRef<Path>) -> Self {
        Self {
            keys,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read back the last snapshot
    pub async fn load(&self) -> Result<ClusterSnapshot, StoreError> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| StoreError::Backend(format!("read {}: {}", self.path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| StoreError::Backend(format!("parse {}: {}", self.path.display(), e)))
    }
}

fn backend(context: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("{}: {}", context, err))
}

#[async_trait]
impl ConfigPersister for SnapshotPersister {
    async fn save(&self, full: bool) -> Result<(), StoreError> {
        let keys = self.keys.get_keys().await.map_err(|e| backend("read keys", e))?;
        let snapshot = ClusterSnapshot {
            saved_at: Utc::now(),
            full,
            key_names: keys.iter().map(|k| k.name.clone()).collect(),
            keys: full.then_some(keys),
        };
        let json = serde_json::to_string_pretty(&snapshot).map_err(|e| backend("encode snapshot", e))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| backend("create snapshot dir", e))?;
            }
        }
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, json).await.map_err(|e| backend("write snapshot", e))?;
        fs::rename(&tmp_path, &self.path).await.map_err(|e| backend("replace snapshot", e))?;

        info!(path = %self.path.display(), full = full, keys = snapshot.key_names.len(), "Saved cluster snapshot");
        Ok(())
    }
}
