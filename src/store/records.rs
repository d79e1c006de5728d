use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Collection holding one document per user, exercise and day.
pub const COMPLETIONS_COLLECTION: &str = "exerciseCompletions";

/// Authenticated document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn set(&self, collection: &str, id: &str, fields: Value) -> Result<()>;
    async fn exists(&self, collection: &str, id: &str) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub user_id: String,
    pub exercise: String,
    /// Calendar day in the user's local time, `YYYY-MM-DD`.
    pub day: String,
    pub cycles: u32,
}

impl CompletionRecord {
    pub fn document_id(&self) -> String {
        format!("{}_{}_{}", self.user_id, self.exercise, self.day)
    }
}

/// Write `record` unless that exercise was already completed the same day.
///
/// Returns `true` when a new document was written.
pub async fn record_completion(store: &dyn DocumentStore, record: &CompletionRecord) -> Result<bool> {
    let id = record.document_id();
    if store.exists(COMPLETIONS_COLLECTION, &id).await? {
        debug!("completion {} already recorded", id);
        return Ok(false);
    }
    store
        .set(COMPLETIONS_COLLECTION, &id, serde_json::to_value(record)?)
        .await?;
    debug!("completion {} recorded", id);
    Ok(true)
}

/// In-process document store.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id).cloned())
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn set(&self, collection: &str, id: &str, fields: Value) -> Result<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        Ok(())
    }

    async fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self.get(collection, id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(day: &str) -> CompletionRecord {
        CompletionRecord {
            user_id: "u1".to_string(),
            exercise: "box".to_string(),
            day: day.to_string(),
            cycles: 4,
        }
    }

    #[tokio::test]
    async fn test_record_completion_once_per_day() {
        let store = MemoryDocumentStore::new();
        assert!(record_completion(&store, &record("2026-10-16")).await.unwrap());
        assert!(!record_completion(&store, &record("2026-10-16")).await.unwrap());
        assert!(record_completion(&store, &record("2026-10-17")).await.unwrap());
        assert_eq!(store.len(COMPLETIONS_COLLECTION), 2);

        let doc = store.get(COMPLETIONS_COLLECTION, "u1_box_2026-10-16").unwrap();
        assert_eq!(doc["userId"], "u1");
        assert_eq!(doc["cycles"], 4);
    }
}
