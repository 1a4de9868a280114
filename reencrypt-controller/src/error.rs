//! Error types for the reencrypt controller
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


use rekey_keys::KeyError;
use rekey_types::StoreError;
use thiserror::Error;

/// Errors that end a rotation cycle
#[derive(Error, Debug)]
pub enum RotationError {
    #[error("invalid annotation {annotation} found on node {node}")]
    MalformedAnnotation { node: String, annotation: String },

    #[error("invalid hash: {hash} found on node {node}")]
    StaleOrInvalidHash { node: String, hash: String },

    #[error("another reencrypt is already active on node {node}")]
    ConflictingActiveRotation { node: String },

    #[error("gave up updating {target} after {attempts} conflicting writes")]
    ConflictRetryExhausted { target: String, attempts: u32 },

    #[error("failed to reencrypt secret {secret}: {source}")]
    MigrationFailure {
        secret: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to persist encryption state: {0}")]
    PersistenceFailure(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("rotation cancelled")]
    Cancelled,
}

impl From<KeyError> for RotationError {
    fn from(err: KeyError) -> Self {
        RotationError::PersistenceFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RotationError>;
