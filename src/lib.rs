//! Event-sourcing persistence engine.
//!
//! Entities are reconstructed by reducing an append-only log of versioned deltas. Deltas of any number
//! of entities are committed atomically as one source, under optimistic concurrency: every
//! `(entity, version)` can be committed once, and every lease can be held by one entity at a time.
//! Committed data is read back through a backend-agnostic filter/sort query algebra.

pub use crate::entity::{Entity, Snapshot};
pub use crate::error::{Conflict, Error};
pub use crate::manager::{MultipleEntityRepository, RepositoryBuilder};
pub use crate::types::{Id, Pointer, TimeStamp, VersionNumber};

pub mod agent;
pub mod builder;
pub mod envelope;
pub mod query;
pub mod session;
pub mod source;
pub mod store;
pub mod types;

mod entity;
mod error;
mod manager;

#[doc(hidden)]
pub use serde_json;
