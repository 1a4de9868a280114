//! Rekey Types
//!
//! Shared cluster object model (nodes, secrets), operator-facing events
//! and store errors used across the rekey crates.

pub mod events;
pub mod objects;
pub mod error;

pub use events::*;
pub use objects::*;
pub use error::*;
