//! Token cost commit.
//!
//! Cost is carried through the hand-off chain and written to the store
//! exactly once per run, at finalization. The store is a remote facade with
//! no transactions, so the read-add-write is guarded by a per-document async
//! mutex inside this process; workers for different documents never contend.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::artefact::ArtefactPatch;
use crate::error::StoreError;
use crate::store::ArtefactStore;

pub struct CostAccumulator {
    store: Arc<dyn ArtefactStore>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CostAccumulator {
    pub fn new(store: Arc<dyn ArtefactStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(id).or_default())
    }

    /// Add `delta` tokens to the document's committed cost, returning the
    /// new total. Commutative: commit order does not change the result.
    pub async fn commit(&self, document_id: Uuid, delta: u64) -> Result<u64, StoreError> {
        self.commit_with(document_id, delta, ArtefactPatch::new())
            .await
    }

    /// Commit a cost delta together with other field updates as one patch.
    ///
    /// The single write keeps retries safe: if the patch fails, nothing was
    /// written, so a redelivered task recomputes the same total from the
    /// unchanged record instead of adding its delta twice.
    pub async fn commit_with(
        &self,
        document_id: Uuid,
        delta: u64,
        mut patch: ArtefactPatch,
    ) -> Result<u64, StoreError> {
        let lock = self.lock_for(document_id).await;
        let _guard = lock.lock().await;

        let current = self.store.get(document_id).await?;
        let total = current.analysis_cost + delta;
        patch.analysis_cost = Some(total);
        self.store.patch(document_id, patch).await?;

        tracing::debug!(document = %document_id, delta, total, "Committed analysis cost");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use crate::artefact::{AnalysisMode, Artefact};
    use crate::store::MemoryStore;

    use super::*;

    fn sample() -> Artefact {
        Artefact::new(
            "cust-1",
            "lease.pdf",
            b"bytes",
            "English",
            AnalysisMode::Standard,
            "https://example.test/hook",
        )
    }

    #[tokio::test]
    async fn deltas_accumulate_in_any_order() {
        let store = Arc::new(MemoryStore::new());
        let artefact = sample();
        let id = artefact.id;
        store.insert(artefact).await.unwrap();

        let cost = Arc::new(CostAccumulator::new(store.clone()));
        let mut handles = Vec::new();
        for delta in [120u64, 80, 50] {
            let cost = Arc::clone(&cost);
            handles.push(tokio::spawn(async move { cost.commit(id, delta).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.get(id).await.unwrap().analysis_cost, 250);
    }

    #[tokio::test]
    async fn commit_returns_running_total() {
        let store = Arc::new(MemoryStore::new());
        let artefact = sample();
        let id = artefact.id;
        store.insert(artefact).await.unwrap();

        let cost = CostAccumulator::new(store);
        assert_eq!(cost.commit(id, 120).await.unwrap(), 120);
        assert_eq!(cost.commit(id, 80).await.unwrap(), 200);
    }

    #[tokio::test]
    async fn commit_with_folds_fields_into_one_patch() {
        let store = Arc::new(MemoryStore::new());
        let artefact = sample();
        let id = artefact.id;
        store.insert(artefact).await.unwrap();

        let cost = CostAccumulator::new(store.clone());
        let patch = ArtefactPatch {
            alert_status: Some(crate::artefact::AlertStatus::Reminder),
            ..Default::default()
        };
        assert_eq!(cost.commit_with(id, 40, patch).await.unwrap(), 40);

        let updated = store.get(id).await.unwrap();
        assert_eq!(updated.analysis_cost, 40);
        assert_eq!(updated.alert_status, crate::artefact::AlertStatus::Reminder);
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let cost = CostAccumulator::new(Arc::new(MemoryStore::new()));
        let err = cost.commit(Uuid::new_v4(), 10).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
