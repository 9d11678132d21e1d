//! Local copy of every sample, partitioned by brand, kept in one storage slot.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use db::{
    DBService,
    models::{
        local_storage::LocalStorageEntry,
        sample::{Sample, SampleId},
    },
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Storage key under which the whole collection is kept.
pub const SAMPLES_STORAGE_KEY: &str = "lotfiv1_samples";

#[derive(Debug, Error)]
pub enum LocalMirrorError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("json error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A string-keyed storage slot
#[async_trait]
pub trait LocalSlot: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, LocalMirrorError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), LocalMirrorError>;
}

/// Slot stored in the local SQLite database
#[derive(Clone)]
pub struct SqliteSlot {
    db: DBService,
}

impl SqliteSlot {
    pub fn new(db: DBService) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LocalSlot for SqliteSlot {
    async fn get(&self, key: &str) -> Result<Option<String>, LocalMirrorError> {
        Ok(LocalStorageEntry::find(&self.db.pool, key)
            .await?
            .map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LocalMirrorError> {
        LocalStorageEntry::upsert(&self.db.pool, key, value).await?;
        Ok(())
    }
}

/// Process-local slot, lost on restart
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    values: Arc<Mutex<HashMap<String, String>>>,
}

#[async_trait]
impl LocalSlot for MemorySlot {
    async fn get(&self, key: &str) -> Result<Option<String>, LocalMirrorError> {
        let values = self
            .values
            .lock()
            .map_err(|e| LocalMirrorError::Unavailable(e.to_string()))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LocalMirrorError> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| LocalMirrorError::Unavailable(e.to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct LocalMirror {
    slot: Arc<dyn LocalSlot>,
    key: String,
}

impl LocalMirror {
    pub fn new(slot: Arc<dyn LocalSlot>) -> Self {
        Self {
            slot,
            key: SAMPLES_STORAGE_KEY.to_string(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySlot::default()))
    }

    /// Samples stored for `brand`. Absent, unreadable or malformed storage reads as
    /// empty; a single malformed record is skipped.
    pub async fn read(&self, brand: &str) -> Vec<Sample> {
        let records = match self.load_records().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Local mirror unreadable, treating as empty");
                return Vec::new();
            }
        };

        let samples: Vec<Sample> = records
            .into_iter()
            .filter(|record| record_brand(record) == Some(brand))
            .filter_map(|record| match serde_json::from_value(record) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    warn!(brand = %brand, error = %e, "Skipping malformed local sample");
                    None
                }
            })
            .collect();
        debug!(brand = %brand, count = samples.len(), "Loaded samples from local mirror");
        samples
    }

    /// Replace the stored slice for `brand` with `records`, leaving other brands untouched.
    ///
    /// Records of another brand are ignored and duplicate ids collapse to one
    /// entry (first position, last value), so repeating a write is a no-op.
    /// Stored records of other brands are kept verbatim, even ones that no
    /// longer parse. When the slot cannot be read or is not a JSON array the
    /// error is returned and nothing is written.
    pub async fn write(&self, brand: &str, records: &[Sample]) -> Result<(), LocalMirrorError> {
        let mut stored: Vec<Value> = self
            .load_records()
            .await?
            .into_iter()
            .filter(|record| record_brand(record) != Some(brand))
            .collect();
        let kept = stored.len();

        for sample in dedup_by_id(records.iter().filter(|sample| sample.brand == brand).cloned()) {
            stored.push(serde_json::to_value(sample)?);
        }

        let serialized = serde_json::to_string(&stored)?;
        self.slot.set(&self.key, &serialized).await?;
        debug!(
            brand = %brand,
            written = stored.len() - kept,
            other_brands = kept,
            "Saved samples to local mirror"
        );
        Ok(())
    }

    async fn load_records(&self) -> Result<Vec<Value>, LocalMirrorError> {
        match self.slot.get(&self.key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }
}

fn record_brand(record: &Value) -> Option<&str> {
    record.get("brand").and_then(Value::as_str)
}

fn dedup_by_id(records: impl Iterator<Item = Sample>) -> Vec<Sample> {
    let mut result: Vec<Sample> = Vec::new();
    let mut positions: HashMap<SampleId, usize> = HashMap::new();
    for record in records {
        match positions.get(&record.id) {
            Some(&index) => result[index] = record,
            None => {
                positions.insert(record.id.clone(), result.len());
                result.push(record);
            }
        }
    }
    result
}

/// Union of two sample lists, keeping the first occurrence of each id.
pub fn union_by_id<'a>(
    primary: &'a [Sample],
    secondary: &'a [Sample],
) -> impl Iterator<Item = &'a Sample> {
    let mut seen: HashSet<&SampleId> = HashSet::new();
    primary
        .iter()
        .chain(secondary.iter())
        .filter(move |sample| seen.insert(&sample.id))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn sample(id: &str, brand: &str, product: &str) -> Sample {
        Sample {
            id: SampleId::new(id),
            brand: brand.to_string(),
            product: product.to_string(),
            ..Sample::default()
        }
    }

    fn ids(samples: &[Sample]) -> Vec<&str> {
        samples.iter().map(|s| s.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_read_empty_when_nothing_stored() {
        let mirror = LocalMirror::in_memory();
        assert!(mirror.read("ACME").await.is_empty());
    }

    #[tokio::test]
    async fn test_other_brand_partition_survives_write() {
        let mirror = LocalMirror::in_memory();
        let set_a = vec![sample("1", "A", "x"), sample("2", "A", "y")];
        let set_b = vec![sample("3", "B", "z")];

        mirror.write("A", &set_a).await.unwrap();
        mirror.write("B", &set_b).await.unwrap();

        assert_eq!(mirror.read("A").await, set_a);
        assert_eq!(mirror.read("B").await, set_b);
    }

    #[tokio::test]
    async fn test_write_replaces_brand_slice() {
        let mirror = LocalMirror::in_memory();
        mirror
            .write("A", &[sample("1", "A", "x"), sample("2", "A", "y")])
            .await
            .unwrap();
        mirror.write("A", &[sample("3", "A", "z")]).await.unwrap();

        assert_eq!(ids(&mirror.read("A").await), vec!["3"]);
    }

    #[tokio::test]
    async fn test_repeated_overlapping_write_is_idempotent() {
        let slot = Arc::new(MemorySlot::default());
        let mirror = LocalMirror::new(slot.clone());
        let records = vec![
            sample("1", "A", "first"),
            sample("2", "A", "y"),
            sample("1", "A", "second"),
        ];

        mirror.write("A", &records).await.unwrap();
        let once = slot.get(SAMPLES_STORAGE_KEY).await.unwrap();
        mirror.write("A", &records).await.unwrap();
        let twice = slot.get(SAMPLES_STORAGE_KEY).await.unwrap();

        assert_eq!(once, twice);
        let stored = mirror.read("A").await;
        assert_eq!(ids(&stored), vec!["1", "2"]);
        assert_eq!(stored[0].product, "second");
    }

    #[tokio::test]
    async fn test_write_ignores_records_of_other_brands() {
        let mirror = LocalMirror::in_memory();
        mirror
            .write("A", &[sample("1", "A", "x"), sample("2", "B", "y")])
            .await
            .unwrap();
        assert!(mirror.read("B").await.is_empty());
        assert_eq!(ids(&mirror.read("A").await), vec!["1"]);
    }

    #[tokio::test]
    async fn test_malformed_storage_reads_empty_and_is_left_untouched() {
        let slot = Arc::new(MemorySlot::default());
        slot.set(SAMPLES_STORAGE_KEY, "{not json").await.unwrap();
        let mirror = LocalMirror::new(slot.clone());

        assert!(mirror.read("A").await.is_empty());

        let result = mirror.write("A", &[sample("1", "A", "x")]).await;
        assert!(matches!(result, Err(LocalMirrorError::Serde(_))));
        assert_eq!(
            slot.get(SAMPLES_STORAGE_KEY).await.unwrap().as_deref(),
            Some("{not json")
        );
    }

    #[tokio::test]
    async fn test_write_keeps_unparsable_records_of_other_brands() {
        let slot = Arc::new(MemorySlot::default());
        let original = serde_json::json!([
            { "id": "o1", "brand": "OTHER", "product": "x" },
            { "id": "o2", "brand": "OTHER", "status": null, "number": 7 }
        ]);
        slot.set(SAMPLES_STORAGE_KEY, &original.to_string()).await.unwrap();
        let mirror = LocalMirror::new(slot.clone());

        mirror.write("ACME", &[sample("a1", "ACME", "y")]).await.unwrap();

        let raw = slot.get(SAMPLES_STORAGE_KEY).await.unwrap().unwrap();
        let stored: Vec<Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0], original[0]);
        assert_eq!(stored[1], original[1]);
        assert_eq!(ids(&mirror.read("ACME").await), vec!["a1"]);
        // o2 has a numeric number field and is skipped on read, o1 survives.
        assert_eq!(ids(&mirror.read("OTHER").await), vec!["o1"]);
    }

    struct BrokenSlot {
        writes: AtomicUsize,
    }

    #[async_trait]
    impl LocalSlot for BrokenSlot {
        async fn get(&self, _key: &str) -> Result<Option<String>, LocalMirrorError> {
            Err(LocalMirrorError::Unavailable("disk I/O error".into()))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), LocalMirrorError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_write_does_not_overwrite_unreadable_slot() {
        let slot = Arc::new(BrokenSlot {
            writes: AtomicUsize::new(0),
        });
        let mirror = LocalMirror::new(slot.clone());

        assert!(mirror.read("A").await.is_empty());
        let result = mirror.write("A", &[sample("1", "A", "x")]).await;
        assert!(matches!(result, Err(LocalMirrorError::Unavailable(_))));
        assert_eq!(slot.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sqlite_slot_round_trips_through_database() {
        let db = DBService::new_in_memory().await.unwrap();
        let mirror = LocalMirror::new(Arc::new(SqliteSlot::new(db.clone())));
        mirror.write("A", &[sample("1", "A", "x")]).await.unwrap();

        let reopened = LocalMirror::new(Arc::new(SqliteSlot::new(db)));
        assert_eq!(ids(&reopened.read("A").await), vec!["1"]);
    }

    #[test]
    fn test_union_by_id_keeps_first_occurrence() {
        let primary = vec![sample("1", "A", "memory"), sample("2", "A", "y")];
        let secondary = vec![sample("1", "A", "mirror"), sample("3", "A", "z")];
        let merged: Vec<&Sample> = union_by_id(&primary, &secondary).collect();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].product, "memory");
    }
}
