//! Reencrypt worker - wires node change notifications to the controller
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
use crate::stores::NodeWatcher;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

/// Subscribe `controller` to node changes from `watcher`.
///
/// Changes are handled one at a time on a spawned task. Handler errors are
/// logged and the loop moves on to the next change. The task ends when the
/// change stream ends or the controller's cancellation token fires.
pub fn register(controller: Arc<ReencryptController>, watcher: &dyn NodeWatcher) -> JoinHandle<()> {
    let mut changes = watcher.watch();
    let cancel = controller.cancellation_token().clone();

    info!(
        annotation = %controller.config().annotation_key,
        skip = controller.config().skip,
        "Registered reencrypt controller"
    );

    tokio::spawn(async move {
        loop {
            let change = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Reencrypt controller stopping");
                    break;
                }
                change = changes.next() => change,
            };

            match change {
                Some(Ok(node)) => {
                    let name = node.as_ref().map(|n| n.name().to_string());
                    if let Err(e) = controller.on_change(node).await {
                        error!(node = ?name, error = %e, "Failed to handle node change");
                    }
                }
                Some(Err(e)) => {
                    error!(error = %e, "Error receiving node change");
                    // Continue processing - a lagged watch is not fatal
                }
                None => {
                    warn!("Node change stream ended");
                    break;
                }
            }
        }
    })
}
