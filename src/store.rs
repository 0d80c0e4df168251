use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CancellationResponse, FollowupResponse, RecordId, SurveyKind};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("response store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt document in {collection}: {reason}")]
    Corrupt {
        collection: Collection,
        reason: String,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    CancellationResponses,
    FollowupResponses,
    CancellationGates,
    FollowupGates,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::CancellationResponses => "cancellationResponses",
            Collection::FollowupResponses => "followupResponses",
            Collection::CancellationGates => "cancellationGates",
            Collection::FollowupGates => "followupGates",
        }
    }

    pub fn gates_for(kind: SurveyKind) -> Self {
        match kind {
            SurveyKind::Cancellation => Collection::CancellationGates,
            SurveyKind::Followup => Collection::FollowupGates,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub body: Value,
}

/// Document persistence boundary. Implementations surface transport failures
/// as [`StoreError::Unavailable`] and never retry.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn append(&self, collection: Collection, document: Value) -> Result<RecordId, StoreError>;

    async fn list_all(&self, collection: Collection) -> Result<Vec<StoredDocument>, StoreError>;

    async fn delete_all(&self, collection: Collection) -> Result<(), StoreError>;
}

pub fn encode<T: Serialize>(collection: Collection, record: &T) -> Result<Value, StoreError> {
    serde_json::to_value(record).map_err(|err| StoreError::Corrupt {
        collection,
        reason: err.to_string(),
    })
}

/// Decodes every document of a response collection. The record `id` always
/// comes from the store, never from the body.
pub fn decode_all<T: DeserializeOwned>(
    collection: Collection,
    documents: Vec<StoredDocument>,
) -> Result<Vec<T>, StoreError> {
    documents
        .into_iter()
        .map(|document| {
            let mut body = document.body;
            match body.as_object_mut() {
                Some(fields) => {
                    fields.insert("id".to_string(), Value::String(document.id.to_string()));
                }
                None => {
                    return Err(StoreError::Corrupt {
                        collection,
                        reason: format!("{}: not an object", document.id),
                    })
                }
            }
            serde_json::from_value(body).map_err(|err| StoreError::Corrupt {
                collection,
                reason: format!("{}: {err}", document.id),
            })
        })
        .collect()
}

/// Typed access to the two response collections.
pub struct Responses<'a> {
    store: &'a dyn ResponseStore,
}

impl<'a> Responses<'a> {
    pub fn new(store: &'a dyn ResponseStore) -> Self {
        Self { store }
    }

    pub async fn append_cancellation(
        &self,
        response: &CancellationResponse,
    ) -> Result<RecordId, StoreError> {
        let collection = Collection::CancellationResponses;
        self.store
            .append(collection, encode(collection, response)?)
            .await
    }

    pub async fn append_followup(&self, response: &FollowupResponse) -> Result<RecordId, StoreError> {
        let collection = Collection::FollowupResponses;
        self.store
            .append(collection, encode(collection, response)?)
            .await
    }

    pub async fn cancellations(&self) -> Result<Vec<CancellationResponse>, StoreError> {
        let collection = Collection::CancellationResponses;
        decode_all(collection, self.store.list_all(collection).await?)
    }

    pub async fn followups(&self) -> Result<Vec<FollowupResponse>, StoreError> {
        let collection = Collection::FollowupResponses;
        decode_all(collection, self.store.list_all(collection).await?)
    }

    /// Irreversible wipe of both response collections.
    pub async fn delete_all(&self) -> Result<(), StoreError> {
        tokio::try_join!(
            self.store.delete_all(Collection::CancellationResponses),
            self.store.delete_all(Collection::FollowupResponses),
        )?;
        Ok(())
    }
}

/// In-process store, used for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<Collection, Vec<StoredDocument>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Collection, Vec<StoredDocument>>>, StoreError>
    {
        self.collections
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".to_string()))
    }
}

#[async_trait]
impl ResponseStore for MemoryStore {
    async fn append(&self, collection: Collection, document: Value) -> Result<RecordId, StoreError> {
        let id = Uuid::new_v4();
        self.lock()?
            .entry(collection)
            .or_default()
            .push(StoredDocument {
                id,
                created_at: Utc::now(),
                body: document,
            });
        Ok(id)
    }

    async fn list_all(&self, collection: Collection) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self
            .lock()?
            .get(&collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_all(&self, collection: Collection) -> Result<(), StoreError> {
        self.lock()?.remove(&collection);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Store whose every call fails, standing in for a network outage.
    pub(crate) struct OfflineStore;

    #[async_trait]
    impl ResponseStore for OfflineStore {
        async fn append(&self, _: Collection, _: Value) -> Result<RecordId, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn list_all(&self, _: Collection) -> Result<Vec<StoredDocument>, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn delete_all(&self, _: Collection) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
    }

    fn sample_cancellation(reason: &str) -> CancellationResponse {
        CancellationResponse {
            id: Uuid::new_v4(),
            submitted_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
            proposal_adjusted: true,
            attention_met: false,
            found_alternative: true,
            main_reason: reason.to_string(),
            contact_name: None,
            contact_phone: None,
            device_id: None,
        }
    }

    #[tokio::test]
    async fn responses_survive_a_store_round_trip() {
        let store = MemoryStore::new();
        let responses = Responses::new(&store);
        let mut original = sample_cancellation("Precio");

        original.id = responses.append_cancellation(&original).await.unwrap();

        assert_eq!(responses.cancellations().await.unwrap(), vec![original]);
        assert!(responses.followups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listed_ids_are_the_ids_the_store_assigned() {
        let store = MemoryStore::new();
        let responses = Responses::new(&store);
        let draft = sample_cancellation("Precio");

        let first = responses.append_cancellation(&draft).await.unwrap();
        let second = responses.append_cancellation(&draft).await.unwrap();

        let ids: Vec<RecordId> = responses
            .cancellations()
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![first, second]);

        let stored = store.list_all(Collection::CancellationResponses).await.unwrap();
        assert!(stored[0].body.get("id").is_none());
    }

    #[tokio::test]
    async fn delete_all_clears_only_response_collections() {
        let store = MemoryStore::new();
        let responses = Responses::new(&store);
        responses
            .append_cancellation(&sample_cancellation("Servicio"))
            .await
            .unwrap();
        store
            .append(Collection::CancellationGates, serde_json::json!({"deviceId": "d"}))
            .await
            .unwrap();

        responses.delete_all().await.unwrap();

        assert!(responses.cancellations().await.unwrap().is_empty());
        assert_eq!(
            store.list_all(Collection::CancellationGates).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn malformed_documents_are_reported_as_corrupt() {
        let store = MemoryStore::new();
        store
            .append(Collection::FollowupResponses, serde_json::json!({"oops": true}))
            .await
            .unwrap();

        let err = Responses::new(&store).followups().await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Corrupt {
                collection: Collection::FollowupResponses,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn offline_store_surfaces_unavailable() {
        let err = Responses::new(&OfflineStore)
            .cancellations()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
