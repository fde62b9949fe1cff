//! Artefact store boundary.
//!
//! The metadata store is the only shared mutable resource in the system.
//! Every stage goes through [`ArtefactStore`]; cross-stage state lives either
//! here or in the task payload, never in worker memory.
//!
//! Two implementations: an in-memory map for tests and local runs, and a
//! client for the REST facade (`GET`/`PATCH /artefacts/{id}`).

mod blob;
mod http;
mod memory;

pub use blob::BlobDir;
pub use http::HttpStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::artefact::{Artefact, ArtefactPatch};
use crate::error::StoreError;

/// Key-value record store for artefacts, reachable by UUID.
#[async_trait]
pub trait ArtefactStore: Send + Sync {
    /// Fetch the current record. Stages call this at the start of every
    /// attempt instead of trusting state carried from a previous attempt.
    async fn get(&self, id: Uuid) -> Result<Artefact, StoreError>;

    /// Apply a partial update and return the updated record.
    async fn patch(&self, id: Uuid, patch: ArtefactPatch) -> Result<Artefact, StoreError>;

    /// Create a new record. Fails if the id already exists.
    async fn insert(&self, artefact: Artefact) -> Result<(), StoreError>;

    /// Remove a record (cleanup path).
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}
