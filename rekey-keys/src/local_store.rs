//! File-backed key store implementation
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


use crate::error::{KeyError, KeyResult};
use crate::key_types::KeyList;
use crate::store::KeyStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// On-disk layout of the encryption config
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncryptionConfigFile {
    keys: KeyList,
    /// Unix timestamp of the last persisted write
    updated_at: i64,
}

/// Key store backed by a JSON encryption config file
pub struct LocalKeyStore {
    /// Encryption config location
    config_path: PathBuf,
    /// In-memory copy of the key list; may be ahead of disk after a
    /// non-persisted write
    keys: tokio::sync::RwLock<KeyList>,
}

impl LocalKeyStore {
    /// Open a key store, loading the config file if it exists
    ///
    /// # Arguments
    /// * `config_path` - Path of the encryption config file
    pub async fn open<P: AsRef<Path>>(config_path: P) -> KeyResult<Self> {
        let config_path = config_path.as_ref().to_path_buf();

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let keys = match fs::read_to_string(&config_path).await {
            Ok(content) => {
                let file: EncryptionConfigFile = serde_json::from_str(&content)
                    .map_err(|e| KeyError::InvalidFormat(format!("{}: {}", config_path.display(), e)))?;
                debug!(path = %config_path.display(), keys = file.keys.len(), "Loaded encryption config");
                file.keys
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %config_path.display(), "No encryption config found, starting with an empty key list");
                KeyList::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            config_path,
            keys: tokio::sync::RwLock::new(keys),
        })
    }

    /// Path of the backing encryption config file
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Write the config next to its final location, then rename over it
    async fn save(&self, keys: &KeyList) -> KeyResult<()> {
        let file = EncryptionConfigFile {
            keys: keys.clone(),
            updated_at: chrono::Utc::now().timestamp(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let tmp_path = self.config_path.with_extension("tmp");
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &self.config_path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyStore for LocalKeyStore {
    async fn get_keys(&self) -> KeyResult<KeyList> {
        Ok(self.keys.read().await.clone())
    }

    async fn write_keys(&self, keys: &KeyList, persist: bool) -> KeyResult<()> {
        if keys.is_empty() {
            return Err(KeyError::Empty);
        }
        let mut current = self.keys.write().await;
        if persist {
            self.save(keys).await?;
            info!(
                path = %self.config_path.display(),
                keys = keys.len(),
                "Encryption config written"
            );
        }
        *current = keys.clone();
        Ok(())
    }
}
