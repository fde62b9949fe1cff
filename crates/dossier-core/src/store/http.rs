//! REST facade client for the artefact store.
//!
//! The facade exposes `GET /artefacts/{id}` and `PATCH /artefacts/{id}`.
//! Transport failures and non-2xx responses map to transient store errors;
//! 404 maps to [`StoreError::NotFound`], which is permanent.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use uuid::Uuid;

use crate::artefact::{Artefact, ArtefactPatch};
use crate::error::StoreError;

use super::ArtefactStore;

pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    /// Build a client for the facade at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, id: Uuid) -> String {
        format!("{}/artefacts/{}", self.base_url, id)
    }

    async fn decode(
        response: reqwest::Response,
        id: Uuid,
    ) -> Result<Artefact, StoreError> {
        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(id)),
            status if status.is_success() => response
                .json::<Artefact>()
                .await
                .map_err(|e| StoreError::InvalidPayload(e.to_string())),
            status => Err(StoreError::Request(format!(
                "store returned {status} for {id}"
            ))),
        }
    }
}

#[async_trait]
impl ArtefactStore for HttpStore {
    async fn get(&self, id: Uuid) -> Result<Artefact, StoreError> {
        let response = self
            .client
            .get(self.url(id))
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Self::decode(response, id).await
    }

    async fn patch(&self, id: Uuid, patch: ArtefactPatch) -> Result<Artefact, StoreError> {
        let response = self
            .client
            .patch(self.url(id))
            .json(&patch)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Self::decode(response, id).await
    }

    async fn insert(&self, artefact: Artefact) -> Result<(), StoreError> {
        let response = self
            .client
            .post(format!("{}/artefacts", self.base_url))
            .json(&artefact)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Request(format!(
                "store returned {} creating {}",
                response.status(),
                artefact.id
            )))
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.url(id))
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        match response.status() {
            // Deleting an already-deleted record is fine (cleanup retries).
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(StoreError::Request(format!(
                "store returned {status} deleting {id}"
            ))),
        }
    }
}
