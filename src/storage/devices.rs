//! Persisted per-device state: profiles, what was synced, cached path maps.
//!
//! All of it is read when a sync starts and written when it ends. Writes are
//! last-writer-wins.

use std::collections::HashMap;

use rusqlite::{OptionalExtension, params};

use crate::{
    device::profile::DeviceProfile,
    domain::hash::TrackId,
    reconcile::path_map::{DeviceKey, DevicePathMap},
    storage::{
        db::now_secs,
        error::StorageError,
        operations::Storage,
        schema::{columns::*, tables::*},
    },
};

impl Storage {
    pub fn save_device_profile(&mut self, profile: &DeviceProfile) -> Result<(), StorageError> {
        let json = serde_json::to_string(profile)?;
        self.db.execute(
            &format!(
                "INSERT OR REPLACE INTO {DEVICE_PROFILES} ({DEVICE_ID}, {PROFILE}, {UPDATED_AT})
                 VALUES (?1, ?2, ?3)"
            ),
            params![profile.id, json, now_secs()?],
        )?;
        Ok(())
    }

    pub fn device_profiles(&self) -> Result<Vec<DeviceProfile>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {PROFILE} FROM {DEVICE_PROFILES} ORDER BY {DEVICE_ID}"
        ))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .iter()
            .map(|json| serde_json::from_str(json))
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub fn device_profile(&self, device_id: &str) -> Result<DeviceProfile, StorageError> {
        let json: Option<String> = self
            .db
            .query_row(
                &format!("SELECT {PROFILE} FROM {DEVICE_PROFILES} WHERE {DEVICE_ID} = ?1"),
                params![device_id],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(StorageError::DeviceNotFound(device_id.to_string())),
        }
    }

    /// Tracks recorded as synced to the device, with their path on it
    pub fn synced_tracks(&self, device_id: &str) -> Result<HashMap<TrackId, String>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {TRACK_ID}, {DEVICE_PATH} FROM {DEVICE_TRACKS} WHERE {DEVICE_ID} = ?1"
        ))?;
        let rows = stmt
            .query_map(params![device_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(hex, path)| match TrackId::from_hex(&hex) {
                Ok(id) => Some((id, path)),
                Err(_) => {
                    log::warn!("Database table {DEVICE_TRACKS} contains invalid track id {hex}");
                    None
                }
            })
            .collect())
    }

    pub fn record_synced(
        &mut self,
        device_id: &str,
        tracks: &[(TrackId, String)],
    ) -> Result<(), StorageError> {
        let now = now_secs()?;
        let tx = self.db.transaction()?;
        for (id, path) in tracks {
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO {DEVICE_TRACKS} ({DEVICE_ID}, {TRACK_ID}, {DEVICE_PATH}, {SYNCED_AT})
                     VALUES (?1, ?2, ?3, ?4)"
                ),
                params![device_id, id.to_hex(), path, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Drops mapping rows for device files that were deleted
    pub fn forget_synced_paths(
        &mut self,
        device_id: &str,
        device_paths: &[String],
    ) -> Result<usize, StorageError> {
        let tx = self.db.transaction()?;
        let mut removed = 0;
        for path in device_paths {
            removed += tx.execute(
                &format!("DELETE FROM {DEVICE_TRACKS} WHERE {DEVICE_ID} = ?1 AND {DEVICE_PATH} = ?2"),
                params![device_id, path],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Replaces the cached path map of a device
    pub fn save_path_cache(
        &mut self,
        device_id: &str,
        map: &DevicePathMap,
    ) -> Result<(), StorageError> {
        let tx = self.db.transaction()?;
        tx.execute(
            &format!("DELETE FROM {DEVICE_PATHS} WHERE {DEVICE_ID} = ?1"),
            params![device_id],
        )?;
        for (key, path) in map.iter() {
            tx.execute(
                &format!(
                    "INSERT INTO {DEVICE_PATHS} ({DEVICE_ID}, {KEY}, {PATH}) VALUES (?1, ?2, ?3)"
                ),
                params![device_id, key.encode(), path],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// `None` when the device was never scanned
    pub fn load_path_cache(&self, device_id: &str) -> Result<Option<DevicePathMap>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {KEY}, {PATH} FROM {DEVICE_PATHS} WHERE {DEVICE_ID} = ?1"
        ))?;
        let rows = stmt
            .query_map(params![device_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            return Ok(None);
        }
        let paths = rows
            .into_iter()
            .filter_map(|(key, path)| DeviceKey::decode(&key).map(|k| (k, path)));
        Ok(Some(DevicePathMap::from_cached(paths)))
    }
}
