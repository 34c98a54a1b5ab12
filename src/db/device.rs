//! Device repository: last known state and display names

use chrono::{DateTime, Utc};

use super::DbPool;
use crate::{Error, Result};

/// A persisted device row
#[derive(Debug, Clone)]
pub struct Device {
    pub device_id: String,
    pub device_name: Option<String>,
    pub battery: Option<i64>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_lat: Option<f64>,
    pub last_lng: Option<f64>,
}

/// Device repository
#[derive(Clone)]
pub struct DeviceRepo {
    pool: DbPool,
}

impl DeviceRepo {
    /// Create a new device repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record a device's latest position and state, creating the row on
    /// first sight
    ///
    /// A `None` name never clears an existing display name.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn record_position(
        &self,
        device_id: &str,
        latitude: f64,
        longitude: f64,
        battery: Option<i64>,
        device_name: Option<&str>,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO devices (device_id, device_name, battery, last_seen, last_lat, last_lng)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(device_id) DO UPDATE SET
                 device_name = COALESCE(excluded.device_name, device_name),
                 battery = COALESCE(excluded.battery, battery),
                 last_seen = excluded.last_seen,
                 last_lat = excluded.last_lat,
                 last_lng = excluded.last_lng",
            rusqlite::params![
                device_id,
                device_name,
                battery,
                seen_at.to_rfc3339(),
                latitude,
                longitude
            ],
        )?;
        Ok(())
    }

    /// Set a device's display name
    ///
    /// # Errors
    ///
    /// Returns error if the device does not exist or the update fails
    pub fn rename(&self, device_id: &str, name: &str) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let updated = conn.execute(
            "UPDATE devices SET device_name = ?1 WHERE device_id = ?2",
            [name, device_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("device '{device_id}'")));
        }
        Ok(())
    }

    /// Fetch a single device
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get(&self, device_id: &str) -> Result<Option<Device>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let device = conn
            .query_row(
                "SELECT device_id, device_name, battery, last_seen, last_lat, last_lng
                 FROM devices WHERE device_id = ?1",
                [device_id],
                row_to_device,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(device)
    }

    /// List all persisted devices
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list(&self) -> Result<Vec<Device>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT device_id, device_name, battery, last_seen, last_lat, last_lng
             FROM devices ORDER BY device_id",
        )?;
        let devices = stmt
            .query_map([], row_to_device)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(devices)
    }

    /// Delete a device row
    ///
    /// Location history is deleted separately through the location
    /// repository.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn delete(&self, device_id: &str) -> Result<bool> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let deleted = conn.execute("DELETE FROM devices WHERE device_id = ?1", [device_id])?;
        Ok(deleted > 0)
    }
}

fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        device_id: row.get(0)?,
        device_name: row.get(1)?,
        battery: row.get(2)?,
        last_seen: row
            .get::<_, Option<String>>(3)?
            .map(|s| parse_datetime(&s)),
        last_lat: row.get(4)?,
        last_lng: row.get(5)?,
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn repo() -> DeviceRepo {
        DeviceRepo::new(init_memory().unwrap())
    }

    #[test]
    fn record_position_creates_and_updates() {
        let devices = repo();
        devices
            .record_position("dev1", 54.68, 25.27, Some(90), Some("Tracker Alpha"), Utc::now())
            .unwrap();

        let device = devices.get("dev1").unwrap().unwrap();
        assert_eq!(device.device_name.as_deref(), Some("Tracker Alpha"));
        assert_eq!(device.battery, Some(90));

        devices
            .record_position("dev1", 55.0, 26.0, Some(85), None, Utc::now())
            .unwrap();
        let device = devices.get("dev1").unwrap().unwrap();
        // Display name survives a nameless update
        assert_eq!(device.device_name.as_deref(), Some("Tracker Alpha"));
        assert_eq!(device.battery, Some(85));
        assert_eq!(device.last_lat, Some(55.0));
    }

    #[test]
    fn rename_unknown_device_is_not_found() {
        let devices = repo();
        assert!(matches!(
            devices.rename("ghost", "Name"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn rename_updates_display_name() {
        let devices = repo();
        devices
            .record_position("dev1", 54.0, 25.0, None, None, Utc::now())
            .unwrap();
        devices.rename("dev1", "Renamed").unwrap();
        assert_eq!(
            devices.get("dev1").unwrap().unwrap().device_name.as_deref(),
            Some("Renamed")
        );
    }

    #[test]
    fn list_and_delete() {
        let devices = repo();
        devices
            .record_position("dev1", 54.0, 25.0, None, None, Utc::now())
            .unwrap();
        devices
            .record_position("dev2", 55.0, 26.0, None, None, Utc::now())
            .unwrap();
        assert_eq!(devices.list().unwrap().len(), 2);

        assert!(devices.delete("dev1").unwrap());
        assert!(!devices.delete("dev1").unwrap());
        assert_eq!(devices.list().unwrap().len(), 1);
    }
}
