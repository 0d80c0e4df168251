use std::fs;
use std::io;
use std::path::Path;

use chrono::Utc;

use crate::models::{DeviceGateRecord, DeviceId, RecordId, SurveyKind};
use crate::store::{encode, Collection, ResponseStore, StoreError};

/// Returns the identifier persisted at `path`, generating and writing a new one
/// on first use.
pub fn get_or_create_device_id(path: &Path) -> io::Result<DeviceId> {
    match fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => {
            return Ok(DeviceId::new(contents.trim()));
        }
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let device_id = DeviceId::generate();
    fs::write(path, device_id.as_str())?;
    tracing::info!(device_id = %device_id, path = %path.display(), "generated device id");
    Ok(device_id)
}

/// One-time-response flags keyed by device. The gate reports store failures
/// and leaves the blocking decision to the caller.
pub struct DeviceGate<'a> {
    store: &'a dyn ResponseStore,
}

impl<'a> DeviceGate<'a> {
    pub fn new(store: &'a dyn ResponseStore) -> Self {
        Self { store }
    }

    pub async fn has_responded(
        &self,
        device_id: &DeviceId,
        kind: SurveyKind,
    ) -> Result<bool, StoreError> {
        let collection = Collection::gates_for(kind);
        let documents = self.store.list_all(collection).await?;
        // Only the device id matters; other fields may be missing or malformed.
        Ok(documents.iter().any(|document| {
            document.body.get("deviceId").and_then(|v| v.as_str()) == Some(device_id.as_str())
        }))
    }

    /// Appends a gate record; repeated calls add duplicates, which
    /// `has_responded` tolerates.
    pub async fn mark_responded(
        &self,
        device_id: &DeviceId,
        kind: SurveyKind,
        client: Option<&str>,
    ) -> Result<RecordId, StoreError> {
        let collection = Collection::gates_for(kind);
        let record = DeviceGateRecord {
            device_id: device_id.clone(),
            recorded_at: Utc::now(),
            client: client.map(str::to_string),
        };
        self.store
            .append(collection, encode(collection, &record)?)
            .await
    }

    /// Un-gates every device for both survey kinds.
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        self.store.delete_all(Collection::CancellationGates).await?;
        self.store.delete_all(Collection::FollowupGates).await?;
        Ok(())
    }
}
