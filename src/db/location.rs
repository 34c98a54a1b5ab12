//! Location history repository
//!
//! Samples are immutable once written: inserts and bulk deletes by device
//! only, reads ordered by time.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::DbPool;
use crate::{Error, Result};

/// A persisted location sample
#[derive(Debug, Clone, Serialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// A sample to insert
#[derive(Debug, Clone)]
pub struct NewLocationSample<'a> {
    pub device_id: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub battery: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// Location repository
#[derive(Clone)]
pub struct LocationRepo {
    pool: DbPool,
}

impl LocationRepo {
    /// Create a new location repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append a sample
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn insert(&self, sample: &NewLocationSample<'_>) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO locations (device_id, latitude, longitude, accuracy, battery, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                sample.device_id,
                sample.latitude,
                sample.longitude,
                sample.accuracy,
                sample.battery,
                sample.timestamp.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// List a device's samples ordered by time
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn history(&self, device_id: &str) -> Result<Vec<LocationSample>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT latitude, longitude, accuracy, battery, timestamp
             FROM locations WHERE device_id = ?1 ORDER BY timestamp",
        )?;
        let samples = stmt
            .query_map([device_id], |row| {
                Ok(LocationSample {
                    latitude: row.get(0)?,
                    longitude: row.get(1)?,
                    accuracy: row.get(2)?,
                    battery: row.get(3)?,
                    timestamp: parse_datetime(&row.get::<_, String>(4)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    /// Delete all samples for a device
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn delete_for_device(&self, device_id: &str) -> Result<usize> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let deleted = conn.execute("DELETE FROM locations WHERE device_id = ?1", [device_id])?;
        Ok(deleted)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn repo() -> LocationRepo {
        LocationRepo::new(init_memory().unwrap())
    }

    fn sample(device_id: &str, latitude: f64, timestamp: DateTime<Utc>) -> NewLocationSample<'_> {
        NewLocationSample {
            device_id,
            latitude,
            longitude: 25.0,
            accuracy: Some(10.0),
            battery: Some(80),
            timestamp,
        }
    }

    #[test]
    fn insert_and_history_ordered_by_time() {
        let locations = repo();
        let base = Utc::now();
        locations
            .insert(&sample("dev1", 2.0, base + chrono::Duration::seconds(10)))
            .unwrap();
        locations.insert(&sample("dev1", 1.0, base)).unwrap();

        let history = locations.history("dev1").unwrap();
        assert_eq!(history.len(), 2);
        assert!((history[0].latitude - 1.0).abs() < f64::EPSILON);
        assert!((history[1].latitude - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn history_is_per_device() {
        let locations = repo();
        locations.insert(&sample("dev1", 1.0, Utc::now())).unwrap();
        locations.insert(&sample("dev2", 2.0, Utc::now())).unwrap();
        assert_eq!(locations.history("dev1").unwrap().len(), 1);
    }

    #[test]
    fn delete_for_device_removes_all_samples() {
        let locations = repo();
        locations.insert(&sample("dev1", 1.0, Utc::now())).unwrap();
        locations.insert(&sample("dev1", 2.0, Utc::now())).unwrap();

        assert_eq!(locations.delete_for_device("dev1").unwrap(), 2);
        assert!(locations.history("dev1").unwrap().is_empty());
    }
}
