//! Key list definitions
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
use std::fmt;

/// A named symmetric key as stored in the encryption config
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub name: String,
    pub secret: String,
}

impl KeyRecord {
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
        }
    }
}

// Key material never ends up in logs.
impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("name", &self.name)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Ordered key list, active key first.
///
/// The first element encrypts new writes; the last element is the oldest
/// key and the one retired when a rotation finishes.
pub type KeyList = Vec<KeyRecord>;

/// The key new writes are encrypted with
pub fn active_key(keys: &[KeyRecord]) -> Option<&KeyRecord> {
    keys.first()
}

/// The key dropped when the current rotation finishes
pub fn retiring_key(keys: &[KeyRecord]) -> Option<&KeyRecord> {
    keys.last()
}
