//! In-memory collaborators
//!
//! Versioned node store with change notifications, paged secret store,
//! key store, persister and event recorder. They back the controller in
//! tests and in single-process setups, and expose fault injection hooks.
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


use crate::stores::{
    ConfigPersister, EventSink, NodeChangeStream, NodeStore, NodeWatcher, PageOptions, SecretPage,
    SecretStore,
};
use async_trait::async_trait;
use rekey_keys::{KeyError, KeyList, KeyResult, KeyStore};
use rekey_types::{Event, Node, Secret, StoreError};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

const CHANGE_BUFFER: usize = 256;

// A panicked holder cannot leave these maps half-written, so poisoning is
// ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Nodes
// ============================================================================

/// Node store enforcing `resource_version` checks on update
pub struct MemoryNodeStore {
    nodes: Mutex<HashMap<String, Node>>,
    /// Every successful update, in order
    history: Mutex<Vec<Node>>,
    /// Remaining updates to reject with a conflict
    forced_conflicts: Mutex<u32>,
    update_attempts: Mutex<u32>,
    changes: broadcast::Sender<Option<Node>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            nodes: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            forced_conflicts: Mutex::new(0),
            update_attempts: Mutex::new(0),
            changes,
        }
    }

    /// Create or replace a node outside the optimistic-concurrency path
    pub fn insert(&self, mut node: Node) -> Node {
        let mut nodes = lock(&self.nodes);
        let previous = nodes.get(node.name()).map(|n| n.metadata.resource_version).unwrap_or(0);
        node.metadata.resource_version = previous + 1;
        nodes.insert(node.name().to_string(), node.clone());
        let _ = self.changes.send(Some(node.clone()));
        node
    }

    /// Delete a node, notifying watchers
    pub fn remove(&self, name: &str) -> Option<Node> {
        let removed = lock(&self.nodes).remove(name);
        if removed.is_some() {
            let _ = self.changes.send(None);
        }
        removed
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        lock(&self.nodes).get(name).cloned()
    }

    /// Reject the next `count` updates with a conflict
    pub fn force_conflicts(&self, count: u32) {
        *lock(&self.forced_conflicts) = count;
    }

    /// Updates attempted, successful or not
    pub fn update_attempts(&self) -> u32 {
        *lock(&self.update_attempts)
    }

    /// Successful updates to `name`, oldest first
    pub fn history(&self, name: &str) -> Vec<Node> {
        lock(&self.history)
            .iter()
            .filter(|n| n.name() == name)
            .cloned()
            .collect()
    }
}

impl Default for MemoryNodeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn get(&self, name: &str) -> Result<Node, StoreError> {
        self.node(name)
            .ok_or_else(|| StoreError::NotFound(format!("node/{}", name)))
    }

    async fn update(&self, mut node: Node) -> Result<Node, StoreError> {
        *lock(&self.update_attempts) += 1;

        {
            let mut forced = lock(&self.forced_conflicts);
            if *forced > 0 {
                *forced -= 1;
                return Err(StoreError::Conflict(format!("node/{}", node.name())));
            }
        }

        let mut nodes = lock(&self.nodes);
        let stored = nodes
            .get(node.name())
            .ok_or_else(|| StoreError::NotFound(format!("node/{}", node.name())))?;
        if stored.metadata.resource_version != node.metadata.resource_version {
            return Err(StoreError::Conflict(format!("node/{}", node.name())));
        }

        node.metadata.resource_version += 1;
        nodes.insert(node.name().to_string(), node.clone());
        lock(&self.history).push(node.clone());
        let _ = self.changes.send(Some(node.clone()));
        Ok(node)
    }

    async fn list(&self, label_key: &str, label_value: &str) -> Result<Vec<Node>, StoreError> {
        let mut matching: Vec<Node> = lock(&self.nodes)
            .values()
            .filter(|n| n.has_label(label_key, label_value))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(matching)
    }
}

impl NodeWatcher for MemoryNodeStore {
    fn watch(&self) -> NodeChangeStream<'static> {
        let stream = BroadcastStream::new(self.changes.subscribe()).map(|change| {
            change.map_err(|lagged| StoreError::Backend(format!("node watch {}", lagged)))
        });
        Box::pin(stream)
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// Secret store ordered by `(namespace, name)`; continue tokens are the
/// last key of the previous page
pub struct MemorySecretStore {
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
    writes: Mutex<usize>,
    /// Writes allowed before every further write fails
    fail_after: Mutex<Option<usize>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self {
            secrets: Mutex::new(BTreeMap::new()),
            writes: Mutex::new(0),
            fail_after: Mutex::new(None),
        }
    }

    pub fn insert(&self, secret: Secret) {
        let key = (secret.metadata.namespace.clone(), secret.metadata.name.clone());
        lock(&self.secrets).insert(key, secret);
    }

    pub fn len(&self) -> usize {
        lock(&self.secrets).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Successful writes so far
    pub fn write_count(&self) -> usize {
        *lock(&self.writes)
    }

    /// Let `count` more writes through, then fail every write
    pub fn fail_writes_after(&self, count: usize) {
        *lock(&self.fail_after) = Some(self.write_count() + count);
    }

    fn decode_token(token: &str) -> Result<(String, String), StoreError> {
        token
            .split_once('/')
            .map(|(ns, name)| (ns.to_string(), name.to_string()))
            .ok_or_else(|| StoreError::Backend(format!("invalid continue token: {}", token)))
    }
}

impl Default for MemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn list_page(&self, namespace: &str, options: &PageOptions) -> Result<SecretPage, StoreError> {
        let start = match &options.continue_token {
            Some(token) => Bound::Excluded(Self::decode_token(token)?),
            None => Bound::Unbounded,
        };
        let limit = options.limit.max(1);

        let secrets = lock(&self.secrets);
        let mut matching = secrets
            .range((start, Bound::Unbounded))
            .filter(|((ns, _), _)| namespace.is_empty() || ns == namespace)
            .map(|(_, secret)| secret.clone());

        let items: Vec<Secret> = matching.by_ref().take(limit).collect();
        let continue_token = match (matching.next(), items.last()) {
            (Some(_), Some(last)) => Some(last.qualified_name()),
            _ => None,
        };

        Ok(SecretPage { items, continue_token })
    }

    async fn update(&self, mut secret: Secret) -> Result<Secret, StoreError> {
        let mut writes = lock(&self.writes);
        if let Some(limit) = *lock(&self.fail_after) {
            if *writes >= limit {
                return Err(StoreError::Backend(format!(
                    "write rejected for secret {}",
                    secret.qualified_name()
                )));
            }
        }

        let key = (secret.metadata.namespace.clone(), secret.metadata.name.clone());
        let mut secrets = lock(&self.secrets);
        let stored = secrets
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(format!("secret/{}", secret.qualified_name())))?;
        secret.metadata.resource_version = stored.metadata.resource_version + 1;
        secrets.insert(key, secret.clone());
        *writes += 1;
        Ok(secret)
    }
}

// ============================================================================
// Keys
// ============================================================================

/// Key store keeping the staged list and the last persisted list apart
pub struct MemoryKeyStore {
    keys: Mutex<KeyList>,
    persisted: Mutex<Option<KeyList>>,
}

impl MemoryKeyStore {
    pub fn new(keys: KeyList) -> Self {
        Self {
            keys: Mutex::new(keys),
            persisted: Mutex::new(None),
        }
    }

    pub fn keys(&self) -> KeyList {
        lock(&self.keys).clone()
    }

    /// List from the most recent persisted write, if any
    pub fn persisted(&self) -> Option<KeyList> {
        lock(&self.persisted).clone()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get_keys(&self) -> KeyResult<KeyList> {
        Ok(self.keys())
    }

    async fn write_keys(&self, keys: &KeyList, persist: bool) -> KeyResult<()> {
        if keys.is_empty() {
            return Err(KeyError::Empty);
        }
        *lock(&self.keys) = keys.clone();
        if persist {
            *lock(&self.persisted) = Some(keys.clone());
        }
        Ok(())
    }
}

// ============================================================================
// Persistence and events
// ============================================================================

/// Persister that records each save
#[derive(Default)]
pub struct MemoryConfigPersister {
    saves: Mutex<Vec<bool>>,
    failure: Mutex<Option<String>>,
}

impl MemoryConfigPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// `full` flag of every successful save
    pub fn saves(&self) -> Vec<bool> {
        lock(&self.saves).clone()
    }

    /// Make every subsequent save fail with `message`
    pub fn fail_with(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }
}

#[async_trait]
impl ConfigPersister for MemoryConfigPersister {
    async fn save(&self, full: bool) -> Result<(), StoreError> {
        if let Some(message) = lock(&self.failure).clone() {
            return Err(StoreError::Backend(message));
        }
        lock(&self.saves).push(full);
        Ok(())
    }
}

/// Event sink that keeps every event
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }

    pub fn with_reason(&self, reason: &str) -> Vec<Event> {
        lock(&self.events)
            .iter()
            .filter(|e| e.reason == reason)
            .cloned()
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: Event) {
        lock(&self.events).push(event);
    }
}
