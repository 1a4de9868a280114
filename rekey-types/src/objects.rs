//! Cluster object definitions
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


use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Object Metadata
// ============================================================================

/// Metadata common to every stored object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    /// Empty for cluster-scoped objects such as nodes
    #[serde(default)]
    pub namespace: String,
    /// Version stamp checked by the store on update
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// A cluster node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub metadata: ObjectMeta,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    pub fn set_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.annotations.insert(key.into(), value.into());
    }

    /// Whether the node carries `key=value` among its labels
    pub fn has_label(&self, key: &str, value: &str) -> bool {
        self.metadata.labels.get(key).map(String::as_str) == Some(value)
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// A protected object whose payload is encrypted at rest by the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: HashMap<String, Vec<u8>>,
}

impl Secret {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let mut metadata = ObjectMeta::named(name);
        metadata.namespace = namespace.into();
        Self {
            metadata,
            data: HashMap::new(),
        }
    }

    /// `namespace/name`, used in logs and error messages
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.metadata.namespace, self.metadata.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_labels_and_annotations() {
        let node = Node::new("cp-1")
            .with_label("node-role.kubernetes.io/control-plane", "true")
            .with_annotation("rekey.io/encryption-hash", "start-abc");

        assert_eq!(node.name(), "cp-1");
        assert!(node.has_label("node-role.kubernetes.io/control-plane", "true"));
        assert!(!node.has_label("node-role.kubernetes.io/control-plane", "false"));
        assert_eq!(node.annotation("rekey.io/encryption-hash"), Some("start-abc"));
        assert_eq!(node.annotation("missing"), None);
    }

    #[test]
    fn test_node_deserializes_with_missing_maps() {
        let node: Node = serde_json::from_str(r#"{"metadata":{"name":"worker-1"}}"#).unwrap();
        assert_eq!(node.metadata.resource_version, 0);
        assert!(node.metadata.annotations.is_empty());
    }

    #[test]
    fn test_secret_qualified_name() {
        let secret = Secret::new("kube-system", "bootstrap-token");
        assert_eq!(secret.qualified_name(), "kube-system/bootstrap-token");
    }
}
