//! Backends that live inside the domain crate for convenience.
//!
//! Intended for unit tests and the host's `memory` provider. Real database
//! backends (MongoDB) live in separate crates.

pub mod memory_store;
