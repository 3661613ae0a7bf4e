//! Veld store boundary.
//!
//! This crate defines the storage-facing surface the execution subsystem
//! depends on: record types for objects, links and their type metadata,
//! the `DataStoreSession` and `FunctionRegistry` traits, and an in-memory
//! backend used by tests and demos. Persistent backends live elsewhere and
//! implement the same traits.

pub mod error;
pub mod memory;
pub mod session;
pub mod types;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use session::{DataStoreSession, FunctionRegistry};
pub use types::{
    FunctionDefinition, LinkDirection, LinkRecord, LinkType, ObjectRecord, ObjectType,
};
