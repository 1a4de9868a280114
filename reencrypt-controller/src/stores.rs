//! Collaborator interfaces the controller drives
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


use async_trait::async_trait;
use futures::Stream;
use rekey_types::{Event, Node, Secret, StoreError};
use std::pin::Pin;

/// Node objects with optimistic concurrency
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Fetch the latest version of a node
    async fn get(&self, name: &str) -> Result<Node, StoreError>;

    /// Write a node back.
    ///
    /// Fails with [`StoreError::Conflict`] when the node changed since
    /// `node.metadata.resource_version` was read.
    async fn update(&self, node: Node) -> Result<Node, StoreError>;

    /// Nodes carrying `label_key=label_value`
    async fn list(&self, label_key: &str, label_value: &str) -> Result<Vec<Node>, StoreError>;
}

/// Paging cursor for secret listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageOptions {
    pub limit: usize,
    /// Token returned by the previous page; `None` starts from the beginning
    pub continue_token: Option<String>,
}

/// One page of a secret listing
#[derive(Debug, Clone, Default)]
pub struct SecretPage {
    pub items: Vec<Secret>,
    /// `None` on the last page
    pub continue_token: Option<String>,
}

/// Protected objects; writing one back re-encrypts it under the active key
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// List secrets page by page; an empty `namespace` lists all namespaces
    async fn list_page(&self, namespace: &str, options: &PageOptions) -> Result<SecretPage, StoreError>;

    async fn update(&self, secret: Secret) -> Result<Secret, StoreError>;
}

/// Durable cluster configuration snapshot
#[async_trait]
pub trait ConfigPersister: Send + Sync {
    /// Persist the current cluster configuration; `full` includes key material
    async fn save(&self, full: bool) -> Result<(), StoreError>;
}

/// Operator-visible event recorder
pub trait EventSink: Send + Sync {
    /// Record an event; delivery is best effort
    fn emit(&self, event: Event);
}

/// Stream of node change notifications; `None` marks a deleted node
pub type NodeChangeStream<'a> =
    Pin<Box<dyn Stream<Item = Result<Option<Node>, StoreError>> + Send + 'a>>;

/// Source of node change notifications
pub trait NodeWatcher: Send + Sync {
    /// Subscribe to node changes
    fn watch(&self) -> NodeChangeStream<'static>;
}
