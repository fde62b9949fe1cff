//! In-memory artefact store for tests and single-process runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::artefact::{Artefact, ArtefactPatch};
use crate::error::StoreError;

use super::ArtefactStore;

#[derive(Default, Clone)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<Uuid, Artefact>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ArtefactStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Artefact, StoreError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn patch(&self, id: Uuid, patch: ArtefactPatch) -> Result<Artefact, StoreError> {
        let mut records = self.records.write().await;
        let current = records.get(&id).cloned().ok_or(StoreError::NotFound(id))?;
        let updated = patch.apply(current);
        records.insert(id, updated.clone());
        Ok(updated)
    }

    async fn insert(&self, artefact: Artefact) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&artefact.id) {
            return Err(StoreError::Request(format!(
                "artefact {} already exists",
                artefact.id
            )));
        }
        records.insert(artefact.id, artefact);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.records.write().await.remove(&id);
        Ok(())
    }
}
