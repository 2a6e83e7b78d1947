//! Durable ordered storage of position samples.
//!
//! The store only needs to append, list everything in timestamp order, and
//! wipe the table. Both implementations serialize their own writes so the
//! sampler and the UI can share one instance behind an `Arc`.

mod sqlite;

use std::sync::Mutex;

use anyhow::anyhow;

pub use sqlite::SqliteStore;

use crate::model::{NewSample, PositionSample};
use crate::prelude::*;

pub trait SampleStore: Send + Sync {
    /// Persist a sample, returning it with its newly assigned id
    fn insert(&self, sample: &NewSample) -> Result<PositionSample>;
    /// Every stored sample, ascending by timestamp
    fn list_all(&self) -> Result<Vec<PositionSample>>;
    /// Remove every sample, returning how many were removed
    fn clear_all(&self) -> Result<usize>;
}

#[derive(Default)]
struct MemoryInner {
    samples: Vec<PositionSample>,
    /// Last id handed out, kept across clears so ids are never reused
    last_id: i64,
}

/// Volatile store, used with `--memory` and in tests
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SampleStore for MemoryStore {
    fn insert(&self, sample: &NewSample) -> Result<PositionSample> {
        let mut inner = self.inner.lock().map_err(|_| anyhow!("Sample store poisoned"))?;
        inner.last_id += 1;
        let stored = sample.with_id(inner.last_id);
        inner.samples.push(stored);
        Ok(stored)
    }

    fn list_all(&self) -> Result<Vec<PositionSample>> {
        let inner = self.inner.lock().map_err(|_| anyhow!("Sample store poisoned"))?;
        let mut all = inner.samples.clone();
        all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    fn clear_all(&self) -> Result<usize> {
        let mut inner = self.inner.lock().map_err(|_| anyhow!("Sample store poisoned"))?;
        let removed = inner.samples.len();
        inner.samples.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::model::{now_micros, Fix};

    fn sample_at(secs: i64) -> NewSample {
        let ts = now_micros() + Duration::seconds(secs);
        NewSample::from_fix(Fix::new(10.0, 20.0, Some(5.0)), ts)
    }

    #[test]
    fn test_ids_are_never_reused() {
        let store = MemoryStore::new();
        let a = store.insert(&sample_at(0)).unwrap();
        let b = store.insert(&sample_at(1)).unwrap();
        assert!(b.id > a.id);

        assert_eq!(store.clear_all().unwrap(), 2);
        let c = store.insert(&sample_at(2)).unwrap();
        assert!(c.id > b.id);
    }

    #[test]
    fn test_list_is_timestamp_ordered() {
        let store = MemoryStore::new();
        store.insert(&sample_at(5)).unwrap();
        store.insert(&sample_at(-5)).unwrap();
        store.insert(&sample_at(0)).unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_clear_then_list_is_empty() {
        let store = MemoryStore::new();
        store.insert(&sample_at(0)).unwrap();
        store.clear_all().unwrap();
        assert!(store.list_all().unwrap().is_empty());
        assert_eq!(store.clear_all().unwrap(), 0);
    }
}
