//! Rotation stage annotation codec
//!
//! A node's rotation annotation has the form `<stage>-<hash>`, where the
//! hash fingerprints the key list the stage was issued against. Because the
//! hash is always recomputed from the *current* key list, an annotation
//! written before the key list changed no longer validates.
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


use rekey_keys::KeyRecord;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

const SEPARATOR: char = '-';

/// Phase of the rotation annotation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Start,
    Request,
    Active,
    Finished,
}

impl Stage {
    /// Label used on the wire; never contains the separator
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Request => "reencrypt_request",
            Stage::Active => "reencrypt_active",
            Stage::Finished => "reencrypt_finished",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "start" => Some(Stage::Start),
            "reencrypt_request" => Some(Stage::Request),
            "reencrypt_active" => Some(Stage::Active),
            "reencrypt_finished" => Some(Stage::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The annotation did not split into exactly a stage and a hash
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed stage annotation: {0}")]
pub struct MalformedAnnotation(pub String);

/// A decoded `<stage>-<hash>` annotation.
///
/// Labels outside [`Stage`] decode fine (other tooling writes its own
/// stages); they simply never match a stage this controller acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageAnnotation {
    label: String,
    hash: String,
}

impl StageAnnotation {
    pub fn new(stage: Stage, hash: impl Into<String>) -> Self {
        Self {
            label: stage.label().to_string(),
            hash: hash.into(),
        }
    }

    /// Known stage, if the label is one
    pub fn stage(&self) -> Option<Stage> {
        Stage::from_label(&self.label)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Whether this annotation is `stage` issued against `hash`
    pub fn matches(&self, stage: Stage, hash: &str) -> bool {
        self.stage() == Some(stage) && self.hash == hash
    }
}

impl fmt::Display for StageAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.label, SEPARATOR, self.hash)
    }
}

/// Render `stage` and `hash` as an annotation value
pub fn encode(stage: Stage, hash: &str) -> String {
    format!("{}{}{}", stage.label(), SEPARATOR, hash)
}

/// Parse an annotation value
pub fn decode(annotation: &str) -> Result<StageAnnotation, MalformedAnnotation> {
    let mut parts = annotation.split(SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(label), Some(hash), None) => Ok(StageAnnotation {
            label: label.to_string(),
            hash: hash.to_string(),
        }),
        _ => Err(MalformedAnnotation(annotation.to_string())),
    }
}

fn update_length_prefixed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Fingerprint of `keys` (in stored order) under `stage`, as lowercase hex
pub fn compute_hash(keys: &[KeyRecord], stage: Stage) -> String {
    let mut hasher = Sha256::new();
    for key in keys {
        update_length_prefixed(&mut hasher, key.name.as_bytes());
        update_length_prefixed(&mut hasher, key.secret.as_bytes());
    }
    update_length_prefixed(&mut hasher, stage.label().as_bytes());
    hex::encode(hasher.finalize())
}

/// `stage-<hash>` computed over `keys`
pub fn annotation_for(keys: &[KeyRecord], stage: Stage) -> String {
    encode(stage, &compute_hash(keys, stage))
}

/// Annotation a node carries when no rotation is in progress
pub fn bootstrap_annotation(keys: &[KeyRecord]) -> String {
    annotation_for(keys, Stage::Start)
}
