//! Secret migration: rewrite every secret so the store re-encrypts it
//! under the active key
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
use crate::stores::{EventSink, PageOptions, SecretStore};
use rekey_types::{Event, Node, StoreError};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A progress event is emitted every this many migrated secrets
pub const PROGRESS_INTERVAL: usize = 10;

/// Walks all secrets, one page at a time, writing each one back
pub struct SecretMigrator<'a> {
    secrets: &'a dyn SecretStore,
    events: &'a dyn EventSink,
    page_size: usize,
    cancel: &'a CancellationToken,
}

impl<'a> SecretMigrator<'a> {
    pub fn new(
        secrets: &'a dyn SecretStore,
        events: &'a dyn EventSink,
        page_size: usize,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            secrets,
            events,
            page_size,
            cancel,
        }
    }

    async fn until_cancelled<T>(
        &self,
        op: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> Result<std::result::Result<T, StoreError>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RotationError::Cancelled),
            result = op => Ok(result),
        }
    }

    /// Rewrite every secret in every namespace, reporting progress against
    /// `node`. Returns the number of secrets migrated.
    ///
    /// The first failed write stops the walk; no completion event is
    /// emitted in that case.
    pub async fn migrate_all(&self, node: &Node) -> Result<usize> {
        let mut options = PageOptions {
            limit: self.page_size,
            continue_token: None,
        };
        let mut count = 0usize;

        loop {
            let page = self.until_cancelled(self.secrets.list_page("", &options)).await??;
            debug!(node = node.name(), secrets = page.items.len(), "Fetched secret page");

            for secret in page.items {
                let name = secret.qualified_name();
                self.until_cancelled(self.secrets.update(secret))
                    .await?
                    .map_err(|source| RotationError::MigrationFailure { secret: name, source })?;

                count += 1;
                if count % PROGRESS_INTERVAL == 0 {
                    info!(node = node.name(), count = count, "Reencrypted secrets");
                    self.events.emit(Event::progress(node.name(), count));
                }
            }

            match page.continue_token {
                Some(token) => options.continue_token = Some(token),
                None => break,
            }
        }

        info!(node = node.name(), count = count, "Completed secret reencryption");
        self.events.emit(Event::complete(node.name(), count));
        Ok(count)
    }
}
