//! Controller assembly from configuration
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


use crate::controller::ReencryptController;
use crate::persister::SnapshotPersister;
use crate::stores::{EventSink, NodeStore, SecretStore};
use rekey_config::ControllerConfig;
use rekey_keys::{init_key_store, KeyResult, KeyStore};
use std::sync::Arc;
use tracing::info;

/// Default snapshot location when none is configured
pub const DEFAULT_SNAPSHOT_PATH: &str = "./cred/cluster-snapshot.json";

/// Service name attached to log output
pub const SERVICE_NAME: &str = "reencrypt-controller";

/// Build a controller backed by the on-disk key store and snapshot file
/// named in `config`, driving the given cluster stores.
///
/// Installs JSON logging at `config.log_level()` unless the host process
/// already set a subscriber.
pub async fn init_controller(
    config: ControllerConfig,
    nodes: Arc<dyn NodeStore>,
    secrets: Arc<dyn SecretStore>,
    events: Arc<dyn EventSink>,
) -> KeyResult<ReencryptController> {
    rekey_logging::init_logging(SERVICE_NAME, config.log_level());

    let keys: Arc<dyn KeyStore> = init_key_store(config.key_config_path.as_deref()).await?;

    let snapshot_path = config
        .snapshot_path
        .clone()
        .unwrap_or_else(|| DEFAULT_SNAPSHOT_PATH.to_string());
    info!(snapshot = %snapshot_path, skip = config.skip, "Initializing reencrypt controller");
    let persister = Arc::new(SnapshotPersister::new(keys.clone(), &snapshot_path));

    Ok(ReencryptController::new(config, nodes, secrets, keys, persister, events))
}
