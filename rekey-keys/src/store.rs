//! Key store interface consumed by the rotation controller
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


use crate::error::KeyResult;
use crate::key_types::KeyList;
use async_trait::async_trait;

/// Source of truth for the ordered encryption key list
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Current key list, active key first
    async fn get_keys(&self) -> KeyResult<KeyList>;

    /// Replace the key list; when `persist` is set the list is also
    /// written to durable storage before returning
    async fn write_keys(&self, keys: &KeyList, persist: bool) -> KeyResult<()>;
}
