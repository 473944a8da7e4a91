//! JSON record helpers over any [`CoordinationStore`]

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::CoordinationStore;
use crate::error::{StoreError, StoreResult};

pub async fn get_json<T: DeserializeOwned>(
    store: &dyn CoordinationStore,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::serialization(key, e)),
        None => Ok(None),
    }
}

pub async fn set_json_ex<T: Serialize + ?Sized>(
    store: &dyn CoordinationStore,
    key: &str,
    ttl: Duration,
    value: &T,
) -> StoreResult<()> {
    let raw = to_json(key, value)?;
    store.set_ex(key, ttl, &raw).await
}

pub fn to_json<T: Serialize + ?Sized>(key: &str, value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::serialization(key, e))
}

/// Decodes every list entry, skipping (and logging) malformed ones
pub fn decode_list<T: DeserializeOwned>(key: &str, raw: Vec<String>) -> Vec<T> {
    raw.into_iter()
        .filter_map(|item| match serde_json::from_str(&item) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Skipping malformed entry in {}: {}", key, e);
                None
            }
        })
        .collect()
}
