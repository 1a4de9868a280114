//! Reencrypt controller - per-node rotation state machine
//!
//! On every node change the controller checks whether the node carries a
//! live rotation request. If it does, the node is marked active, every
//! secret is rewritten under the active key, and then either
//!
//! - skip mode: the node reverts to its start annotation and the key list
//!   is left alone, or
//! - commit: the oldest key is dropped, the key list is persisted, the node
//!   is marked finished and a full cluster snapshot is saved.
//!
//! Failures are returned to the caller and recorded as a warning event on
//! the node. Nothing is re-driven here; redelivery is up to the watcher.
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


use crate::error::{Result, RotationError};
use crate::migrator::SecretMigrator;
use crate::retry::update_with_retry;
use crate::stage::{annotation_for, bootstrap_annotation, Stage};
use crate::stores::{ConfigPersister, EventSink, NodeStore, SecretStore};
use crate::validator::{Decision, StageValidator};
use rekey_config::ControllerConfig;
use rekey_keys::key_types::{active_key, retiring_key};
use rekey_keys::KeyStore;
use rekey_types::{Event, Node};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Coordinates one rotation cycle per node change
pub struct ReencryptController {
    config: ControllerConfig,
    nodes: Arc<dyn NodeStore>,
    secrets: Arc<dyn SecretStore>,
    keys: Arc<dyn KeyStore>,
    persister: Arc<dyn ConfigPersister>,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl ReencryptController {
    /// Create a new controller
    pub fn new(
        config: ControllerConfig,
        nodes: Arc<dyn NodeStore>,
        secrets: Arc<dyn SecretStore>,
        keys: Arc<dyn KeyStore>,
        persister: Arc<dyn ConfigPersister>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            nodes,
            secrets,
            keys,
            persister,
            events,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort in-flight work when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Handle a node change notification.
    ///
    /// Returns the latest version of the node seen by the handler; `None`
    /// for deletions.
    pub async fn on_change(&self, node: Option<Node>) -> Result<Option<Node>> {
        let Some(node) = node else {
            return Ok(None);
        };

        match self.reconcile(&node).await {
            Ok(latest) => Ok(Some(latest)),
            Err(err) => {
                error!(node = node.name(), error = %err, "Secrets reencryption failed");
                self.events.emit(Event::warning(node.name(), err.to_string()));
                Err(err)
            }
        }
    }

    async fn reconcile(&self, node: &Node) -> Result<Node> {
        if node.annotation(&self.config.annotation_key).is_none() {
            return Ok(node.clone());
        }

        let keys = self.keys.get_keys().await?;
        let validator = StageValidator::new(
            self.nodes.as_ref(),
            &self.config.annotation_key,
            &self.config.control_plane_label,
        );

        let active_annotation = match validator.evaluate(node, &keys).await? {
            Decision::Rotate { active_annotation } => active_annotation,
            Decision::Ignore | Decision::NotApplicable => return Ok(node.clone()),
        };

        info!(node = node.name(), keys = keys.len(), "Starting secrets reencryption");
        let node = self.set_annotation(node.name(), active_annotation).await?;

        SecretMigrator::new(
            self.secrets.as_ref(),
            self.events.as_ref(),
            self.config.page_size,
            &self.cancel,
        )
        .migrate_all(&node)
        .await?;

        if self.config.skip {
            return self.revert_to_start(&node).await;
        }
        self.finish(&node).await
    }

    /// Skip mode: put the node back to its start annotation, keys untouched
    async fn revert_to_start(&self, node: &Node) -> Result<Node> {
        let keys = self.keys.get_keys().await?;
        let node = self.set_annotation(node.name(), bootstrap_annotation(&keys)).await?;
        info!(node = node.name(), "Reencryption skip enabled, reverted node to start stage");
        Ok(node)
    }

    /// Drop the retiring key, persist, mark the node finished and save the
    /// cluster snapshot
    async fn finish(&self, node: &Node) -> Result<Node> {
        let mut keys = self.keys.get_keys().await?;
        if keys.len() < 2 {
            return Err(RotationError::PersistenceFailure(format!(
                "cannot retire a key from a list of {}",
                keys.len()
            )));
        }

        let retired = retiring_key(&keys).map(|k| k.name.clone()).unwrap_or_default();
        keys.truncate(keys.len() - 1);
        self.keys.write_keys(&keys, true).await?;
        info!(
            node = node.name(),
            key = %retired,
            active = ?active_key(&keys).map(|k| &k.name),
            "Removed key"
        );

        let node = self
            .set_annotation(node.name(), annotation_for(&keys, Stage::Finished))
            .await?;

        self.persister
            .save(true)
            .await
            .map_err(|e| RotationError::PersistenceFailure(e.to_string()))?;

        info!(node = node.name(), keys = keys.len(), "Secrets reencryption finished");
        Ok(node)
    }

    /// Write `value` into the node's rotation annotation, refetching on conflict
    async fn set_annotation(&self, name: &str, value: String) -> Result<Node> {
        let nodes = self.nodes.as_ref();
        let key = self.config.annotation_key.as_str();
        debug!(node = name, annotation = %value, "Updating rotation annotation");

        update_with_retry(
            &self.config.retry,
            name,
            || nodes.get(name),
            |node: &mut Node| node.set_annotation(key, value.clone()),
            |node| nodes.update(node),
        )
        .await
    }
}
