use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Local};
use rusqlite::Connection;

use crate::{
    config::Database,
    storage::{error::StorageError, resolve_location, schema},
};

pub type SecondsSinceUnix = i64;

/// Opens the library database and makes sure every table exists.
///
/// An on-disk database may live on a removable drive; its folder is created
/// if the drive is there but the folder is not.
pub fn open(config: &Database) -> Result<Connection, StorageError> {
    let conn = match config {
        Database::InMemory => Connection::open_in_memory()?,
        Database::OnDisk { location } => {
            let path = resolve_location(location).map_err(StorageError::Internal)?;
            if let Some(dir) = path.parent()
                && !dir.as_os_str().is_empty()
            {
                std::fs::create_dir_all(dir)?;
            }
            log::debug!("opening database at {}", path.to_string_lossy());
            let conn = Connection::open(&path)?;
            // a second decksync process may be finishing a sync
            conn.busy_timeout(Duration::from_secs(5))?;
            conn
        }
    };
    schema::init(&conn)?;
    Ok(conn)
}

/// Whole seconds since the unix epoch
pub fn system_time_to_i64(time: SystemTime) -> anyhow::Result<SecondsSinceUnix> {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .context("time is before the unix epoch")?
        .as_secs();
    i64::try_from(secs).context("timestamp does not fit in i64")
}

pub fn now_secs() -> Result<SecondsSinceUnix, StorageError> {
    system_time_to_i64(SystemTime::now()).map_err(StorageError::Internal)
}

pub fn i64_seconds_to_local_time(since_unix: SecondsSinceUnix) -> anyhow::Result<DateTime<Local>> {
    DateTime::from_timestamp_secs(since_unix)
        .map(|utc| utc.with_timezone(&Local))
        .ok_or_else(|| anyhow!("timestamp {since_unix} is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Location;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn every_table_is_created() {
        let conn = open(&Database::InMemory).unwrap();
        let names = table_names(&conn);
        for table in schema::tables::ALL_TABLES {
            assert!(names.iter().any(|n| n == table), "missing {table}");
        }
    }

    #[test]
    fn on_disk_database_can_be_reopened() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = Database::OnDisk {
            location: Location::from_path(dir.path().join("state/lib.db")),
        };
        drop(open(&config)?);
        let conn = open(&config)?;
        assert_eq!(table_names(&conn).len(), schema::tables::ALL_TABLES.len());
        Ok(())
    }

    #[test]
    fn timestamps_convert_both_ways() -> anyhow::Result<()> {
        let now = now_secs()?;
        assert_eq!(i64_seconds_to_local_time(now)?.timestamp(), now);
        assert!(i64_seconds_to_local_time(i64::MAX).is_err());
        Ok(())
    }
}
