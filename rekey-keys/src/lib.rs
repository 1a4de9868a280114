//! Key storage for the rekey controller
//!
//! Holds the ordered list of encryption-at-rest keys and persists it as
//! an encryption config file.
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


pub mod error;
pub mod key_types;
pub mod local_store;
pub mod service_integration;
pub mod store;

pub use error::{KeyError, KeyResult};
pub use key_types::{KeyList, KeyRecord};
pub use local_store::LocalKeyStore;
pub use service_integration::*;
pub use store::KeyStore;
