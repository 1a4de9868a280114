//! Rotation request validation
//!
//! A request is actionable when the node carries `reencrypt_request-<h>`
//! with `h` matching the current key list, and no control-plane node
//! carries `reencrypt_active-<h'>` for the current key list.
//!
//! The peer check is a scan followed by a separate write, not a
//! transaction: two requests validated at the same moment can both pass
//! before either marks itself active. The cost of that window is a
//! redundant migration pass, not corrupted state.
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
use crate::stage::{annotation_for, compute_hash, decode, Stage, StageAnnotation};
use crate::stores::NodeStore;
use rekey_keys::KeyRecord;
use rekey_types::Node;
use tracing::debug;

/// Outcome of evaluating a node change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The node has no rotation annotation
    Ignore,
    /// The annotation is well formed but not a rotation request
    NotApplicable,
    /// Start a rotation by writing `active_annotation` on the node
    Rotate { active_annotation: String },
}

fn decode_on(node: &str, annotation: &str) -> Result<StageAnnotation> {
    decode(annotation).map_err(|_| RotationError::MalformedAnnotation {
        node: node.to_string(),
        annotation: annotation.to_string(),
    })
}

/// Steps that only look at the requesting node.
///
/// Returns `Ok(false)` for any stage other than a request, and fails when
/// the request cites a key list other than `keys`.
pub fn check_request(node: &str, annotation: &str, keys: &[KeyRecord]) -> Result<bool> {
    let decoded = decode_on(node, annotation)?;

    if decoded.stage() != Some(Stage::Request) {
        debug!(node = node, stage = decoded.label(), "Annotation is not a rotation request");
        return Ok(false);
    }

    if decoded.hash() != compute_hash(keys, Stage::Request) {
        return Err(RotationError::StaleOrInvalidHash {
            node: node.to_string(),
            hash: decoded.hash().to_string(),
        });
    }

    Ok(true)
}

/// Fails if any of `peers` is already rotating the current key list
pub fn ensure_no_active_rotation(
    peers: &[Node],
    annotation_key: &str,
    keys: &[KeyRecord],
) -> Result<()> {
    let active_hash = compute_hash(keys, Stage::Active);

    for peer in peers {
        let Some(annotation) = peer.annotation(annotation_key) else {
            continue;
        };
        let decoded = decode_on(peer.name(), annotation)?;
        if decoded.matches(Stage::Active, &active_hash) {
            return Err(RotationError::ConflictingActiveRotation {
                node: peer.name().to_string(),
            });
        }
    }

    Ok(())
}

/// Decide what to do with a node given the current keys and the
/// control-plane nodes. Performs no I/O.
pub fn plan(
    node: &Node,
    annotation_key: &str,
    keys: &[KeyRecord],
    control_plane: &[Node],
) -> Result<Decision> {
    let Some(annotation) = node.annotation(annotation_key) else {
        return Ok(Decision::Ignore);
    };

    if !check_request(node.name(), annotation, keys)? {
        return Ok(Decision::NotApplicable);
    }
    ensure_no_active_rotation(control_plane, annotation_key, keys)?;

    Ok(Decision::Rotate {
        active_annotation: annotation_for(keys, Stage::Active),
    })
}

/// Validates requests against the live set of control-plane nodes
pub struct StageValidator<'a> {
    nodes: &'a dyn NodeStore,
    annotation_key: &'a str,
    control_plane_label: &'a str,
}

impl<'a> StageValidator<'a> {
    pub fn new(nodes: &'a dyn NodeStore, annotation_key: &'a str, control_plane_label: &'a str) -> Self {
        Self {
            nodes,
            annotation_key,
            control_plane_label,
        }
    }

    /// Whether `annotation` on `node` is a live, uncontested request.
    ///
    /// Control-plane nodes are only listed once the request itself checks out.
    pub async fn validate(&self, node: &Node, annotation: &str, keys: &[KeyRecord]) -> Result<bool> {
        if !check_request(node.name(), annotation, keys)? {
            return Ok(false);
        }

        let peers = self.nodes.list(self.control_plane_label, "true").await?;
        debug!(node = node.name(), peers = peers.len(), "Scanning control-plane nodes for an active rotation");
        ensure_no_active_rotation(&peers, self.annotation_key, keys)?;

        Ok(true)
    }

    /// [`plan`] against the live cluster
    pub async fn evaluate(&self, node: &Node, keys: &[KeyRecord]) -> Result<Decision> {
        let Some(annotation) = node.annotation(self.annotation_key) else {
            return Ok(Decision::Ignore);
        };

        if !self.validate(node, annotation, keys).await? {
            return Ok(Decision::NotApplicable);
        }

        Ok(Decision::Rotate {
            active_annotation: annotation_for(keys, Stage::Active),
        })
    }
}
