//! Service integration helpers for opening the key store
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


use crate::error::KeyResult;
use crate::local_store::LocalKeyStore;
use std::env;
use std::sync::Arc;
use tracing::info;

/// Default encryption config location
pub const DEFAULT_KEY_CONFIG_PATH: &str = "./cred/encryption-config.json";

/// Initialize the key store for the controller
///
/// Falls back to `KEY_CONFIG_PATH`, then to [`DEFAULT_KEY_CONFIG_PATH`].
pub async fn init_key_store(config_path: Option<&str>) -> KeyResult<Arc<LocalKeyStore>> {
    let path = config_path
        .map(|p| p.to_string())
        .or_else(|| env::var("KEY_CONFIG_PATH").ok())
        .unwrap_or_else(|| DEFAULT_KEY_CONFIG_PATH.to_string());

    info!(path = %path, "Initializing key store");

    let store = LocalKeyStore::open(&path).await?;
    Ok(Arc::new(store))
}
