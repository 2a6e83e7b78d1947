use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use chrono::DateTime;
use rusqlite::{params, Connection, Row};

use super::SampleStore;
use crate::model::{NewSample, PositionSample};
use crate::prelude::*;

/// SQLite-backed sample store.
///
/// Timestamps are stored as microseconds since the epoch so ordering is a
/// plain integer comparison.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Connection::open(path)
            .with_context(|| format!("Failed to open sample database {}", path.display()))?;
        Self::init(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(db)
    }

    fn init(db: Connection) -> Result<Self> {
        // AUTOINCREMENT keeps ids from being reused after a clear
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                accuracy_meters REAL,
                timestamp_us INTEGER NOT NULL
            );",
        )
        .context("Failed to create samples table")?;

        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| anyhow!("Sample database lock poisoned"))
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<(i64, f64, f64, Option<f64>, i64)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }
}

impl SampleStore for SqliteStore {
    fn insert(&self, sample: &NewSample) -> Result<PositionSample> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO samples (latitude, longitude, accuracy_meters, timestamp_us)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                sample.coordinate.lat,
                sample.coordinate.lon,
                sample.accuracy_meters,
                sample.timestamp.timestamp_micros(),
            ],
        )
        .context("Failed to insert sample")?;

        Ok(sample.with_id(db.last_insert_rowid()))
    }

    fn list_all(&self) -> Result<Vec<PositionSample>> {
        let db = self.conn()?;
        let mut stmt = db
            .prepare(
                "SELECT id, latitude, longitude, accuracy_meters, timestamp_us
                 FROM samples ORDER BY timestamp_us ASC, id ASC",
            )
            .context("Failed to prepare sample query")?;

        let rows = stmt.query_map([], Self::read_row)?;

        rows.map(|row| -> Result<PositionSample> {
            let (id, lat, lon, accuracy_meters, micros) = row.context("Failed to read sample row")?;
            let timestamp = DateTime::from_timestamp_micros(micros)
                .ok_or_else(|| anyhow!("Sample {id} has an out of range timestamp ({micros})"))?;
            Ok(PositionSample {
                id,
                lat,
                lon,
                accuracy_meters,
                timestamp,
            })
        })
        .collect()
    }

    fn clear_all(&self) -> Result<usize> {
        let db = self.conn()?;
        let removed = db
            .execute("DELETE FROM samples", [])
            .context("Failed to clear samples")?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::model::{now_micros, Fix};

    fn new_sample(lat: f64, offset_secs: i64, accuracy: Option<f64>) -> NewSample {
        let ts = now_micros() + Duration::seconds(offset_secs);
        NewSample::from_fix(Fix::new(lat, -122.4, accuracy), ts)
    }

    #[test]
    fn test_insert_and_list() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.insert(&new_sample(37.0, 0, Some(3.5))).unwrap();
        let second = store.insert(&new_sample(38.0, 10, None)).unwrap();

        assert!(second.id > first.id);

        let all = store.list_all().unwrap();
        assert_eq!(all, vec![first, second]);
        assert_eq!(all[1].accuracy_meters, None);
    }

    #[test]
    fn test_list_orders_by_timestamp() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&new_sample(1.0, 30, None)).unwrap();
        store.insert(&new_sample(2.0, -30, None)).unwrap();

        let lats = store
            .list_all()
            .unwrap()
            .iter()
            .map(|s| s.lat)
            .collect::<Vec<_>>();
        assert_eq!(lats, vec![2.0, 1.0]);
    }

    #[test]
    fn test_clear_keeps_ids_monotonic() {
        let store = SqliteStore::open_in_memory().unwrap();
        let before = store.insert(&new_sample(1.0, 0, None)).unwrap();
        store.insert(&new_sample(1.0, 1, None)).unwrap();

        assert_eq!(store.clear_all().unwrap(), 2);
        assert!(store.list_all().unwrap().is_empty());

        let after = store.insert(&new_sample(1.0, 2, None)).unwrap();
        assert!(after.id > before.id + 1);
    }

    #[test]
    fn test_samples_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.db3");

        let inserted = {
            let store = SqliteStore::open(&path).unwrap();
            store.insert(&new_sample(40.0, 0, Some(12.0))).unwrap()
        };

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_all().unwrap(), vec![inserted]);
    }
}
