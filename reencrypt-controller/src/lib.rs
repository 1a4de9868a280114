//! Reencrypt Controller
//!
//! Coordinates rotation of the encryption-at-rest key across a cluster:
//! - Stage annotations (`<stage>-<hash>`) on nodes carry rotation requests
//! - At most one rotation is active for a given key list
//! - Every secret is rewritten before the retiring key is dropped
//! - The truncated key list and a cluster snapshot are persisted on finish
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


pub mod controller;
pub mod error;
pub mod memory;
pub mod migrator;
pub mod persister;
pub mod retry;
pub mod service;
pub mod stage;
pub mod stores;
pub mod validator;
pub mod worker;

pub use controller::ReencryptController;
pub use error::{Result, RotationError};
pub use service::init_controller;
pub use stage::{Stage, StageAnnotation};
pub use stores::*;
pub use validator::{plan, Decision, StageValidator};
pub use worker::register;
