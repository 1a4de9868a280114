//! Optimistic-concurrency retry for read-modify-write cycles
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
use rekey_config::RetryConfig;
use rekey_types::StoreError;
use std::future::Future;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Fetch an object, apply `mutate` to it and write it back, retrying the
/// whole cycle on write conflicts.
///
/// Read failures are not retried. Returns the object as written.
pub async fn update_with_retry<T, Fetch, FetchFut, Mutate, Write, WriteFut>(
    config: &RetryConfig,
    target: &str,
    mut fetch: Fetch,
    mut mutate: Mutate,
    mut write: Write,
) -> Result<T>
where
    Fetch: FnMut() -> FetchFut,
    FetchFut: Future<Output = std::result::Result<T, StoreError>>,
    Mutate: FnMut(&mut T),
    Write: FnMut(T) -> WriteFut,
    WriteFut: Future<Output = std::result::Result<T, StoreError>>,
{
    let max_attempts = config.max_attempts.max(1);

    for n in 1..=max_attempts {
        let mut object = fetch().await?;
        mutate(&mut object);

        match write(object).await {
            Ok(written) => {
                if n > 1 {
                    debug!(object = target, attempt = n, "Update succeeded after conflict");
                }
                return Ok(written);
            }
            Err(err) if err.is_conflict() => {
                if n < max_attempts {
                    let delay = config.delay_for_attempt(n);
                    warn!(
                        object = target,
                        attempt = n,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Update conflict, refetching"
                    );
                    sleep(delay).await;
                }
            }
            Err(err) => return Err(err.into()),
        }
    }

    warn!(object = target, attempts = max_attempts, "Update failed after all retries");
    Err(RotationError::ConflictRetryExhausted {
        target: target.to_string(),
        attempts: max_attempts,
    })
}
