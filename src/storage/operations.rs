use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use crate::{
    config::{self, LibrarySource},
    domain::{
        hash::TrackId,
        track::{FileIndexEntry, Track, TrackLookup, TrackMetadata},
    },
    storage::{
        db::{self, SecondsSinceUnix, system_time_to_i64},
        error::StorageError,
        fs::{self, FoundFile, FsSnapshot},
        schema::{columns::*, tables::*},
    },
};

use rusqlite::{OptionalExtension, Row, Transaction, params};

/// A file row of the library index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedFile {
    pub entry: FileIndexEntry,
    pub metadata: TrackMetadata,
}

#[derive(Debug)]
pub struct DBSnapshot {
    pub updated_at: SecondsSinceUnix,
    pub files: Vec<IndexedFile>,
}

/// Difference between the file system and the index, keyed by path
#[derive(Debug, Default)]
pub struct LibraryDiff {
    /// on disk, not indexed
    pub added: Vec<FoundFile>,
    /// indexed, but size or mtime changed on disk
    pub changed: Vec<FoundFile>,
    /// indexed, gone from disk
    pub removed: Vec<PathBuf>,
}

impl LibraryDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RescanReport {
    pub added: Vec<IndexedFile>,
    pub updated: Vec<IndexedFile>,
    pub removed: Vec<PathBuf>,
    /// files that could not be hashed, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

/// Main structure that implements all storage logic
pub struct Storage {
    pub(crate) db: rusqlite::Connection,
    source: LibrarySource,
}

#[derive(Debug)]
pub struct TrackListEntry {
    pub track: Track,
    pub files: Vec<PathBuf>,
}

/// Columns of a `files` row, in the order [`indexed_file_from_row`] reads them
const FILE_COLUMNS: [&str; 12] = [
    PATH,
    TRACK_ID,
    RELATIVE_PATH,
    ROOT_ID,
    FILE_NAME,
    SIZE,
    MTIME,
    CONTENT_HASH,
    ARTIST,
    TITLE,
    ALBUM,
    TRACK_NO,
];

fn file_columns() -> String {
    FILE_COLUMNS.join(", ")
}

fn indexed_file_from_row(row: &Row<'_>) -> rusqlite::Result<(String, IndexedFile)> {
    let path: String = row.get(0)?;
    let track_id_hex: String = row.get(1)?;
    let relative_path: String = row.get(2)?;
    let size: i64 = row.get(5)?;
    let file = IndexedFile {
        entry: FileIndexEntry {
            // replaced by the caller once the hex is validated
            track_id: TrackId::from_bytes(&[]),
            path: PathBuf::from(&path),
            relative_path: PathBuf::from(relative_path),
            root_id: row.get(3)?,
            file_name: row.get(4)?,
            size: size.max(0) as u64,
            mtime: row.get(6)?,
            content_hash: row.get(7)?,
            full_hash: Some(track_id_hex.clone()),
        },
        metadata: TrackMetadata {
            artist: row.get(8)?,
            title: row.get(9)?,
            album: row.get(10)?,
            track_no: row.get(11)?,
        },
    };
    Ok((track_id_hex, file))
}

fn with_valid_ids(
    rows: Vec<(String, IndexedFile)>,
) -> impl Iterator<Item = IndexedFile> {
    rows.into_iter().filter_map(|(hex, mut file)| match TrackId::from_hex(&hex) {
        Ok(id) => {
            file.entry.track_id = id;
            Some(file)
        }
        Err(_) => {
            log::warn!("Database table {FILES} contains invalid track id {hex}");
            None
        }
    })
}

fn upsert_file(tx: &Transaction<'_>, file: &IndexedFile) -> Result<(), rusqlite::Error> {
    let entry = &file.entry;
    let columns = file_columns();
    tx.execute(
        &format!(
            "INSERT OR REPLACE INTO {FILES} ({columns})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        ),
        params![
            entry.path.to_string_lossy(),
            entry.track_id.to_hex(),
            entry.relative_path.to_string_lossy(),
            entry.root_id,
            entry.file_name,
            entry.size as i64,
            entry.mtime,
            entry.content_hash,
            file.metadata.artist,
            file.metadata.title,
            file.metadata.album,
            file.metadata.track_no,
        ],
    )?;
    Ok(())
}

impl Storage {
    /// when called, opens a data base connection
    pub fn new(
        db_config: config::Database,
        lib_config: LibrarySource,
    ) -> Result<Self, StorageError> {
        let db: rusqlite::Connection = db::open(&db_config)?;
        Ok(Self::from_existing_conn(db, lib_config))
    }

    pub fn from_existing_conn(db: rusqlite::Connection, lib_config: LibrarySource) -> Self {
        Self {
            db,
            source: lib_config,
        }
    }

    pub fn scan_db(&mut self) -> Result<DBSnapshot, StorageError> {
        let tx = self.db.transaction()?;

        let (rows, updated_at) = {
            let columns = file_columns();
            let mut stmt = tx.prepare(&format!("SELECT {columns} FROM {FILES}"))?;
            let rows = stmt
                .query_map([], indexed_file_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            let updated_at: SecondsSinceUnix = tx.query_row(
                &format!("SELECT COALESCE(MAX({UPDATED_AT}), 0) FROM {UPDATES}"),
                [],
                |row| row.get(0),
            )?;
            (rows, updated_at)
        };

        tx.commit()?;

        Ok(DBSnapshot {
            updated_at,
            files: with_valid_ids(rows).collect(),
        })
    }

    /// aka git status
    ///
    /// reads files in the file system,
    /// reads file records in the database,
    /// returns both, and difference between the database and the file system
    pub fn status(&mut self) -> Result<(FsSnapshot, DBSnapshot, LibraryDiff), StorageError> {
        log::info!("Scanning the music on file system...");
        let fs = FsSnapshot::scan(&self.source)?;
        let db = self.scan_db()?;
        let diff = Self::diff(&fs, &db);
        Ok((fs, db, diff))
    }

    fn diff(fs: &FsSnapshot, db: &DBSnapshot) -> LibraryDiff {
        let indexed = db
            .files
            .iter()
            .map(|f| (f.entry.path.as_path(), &f.entry))
            .collect::<HashMap<_, _>>();

        let mut diff = LibraryDiff::default();
        for found in &fs.files {
            match indexed.get(found.path.as_path()) {
                None => diff.added.push(found.clone()),
                Some(entry) if entry.size != found.size || entry.mtime != found.mtime => {
                    diff.changed.push(found.clone())
                }
                Some(_) => {}
            }
        }

        let on_disk = fs
            .files
            .iter()
            .map(|f| f.path.as_path())
            .collect::<std::collections::HashSet<_>>();
        diff.removed = db
            .files
            .iter()
            .filter(|f| !on_disk.contains(f.entry.path.as_path()))
            .map(|f| f.entry.path.clone())
            .collect();

        diff
    }

    /// Brings the index in line with the file system.
    ///
    /// Only new and changed files are hashed and have their tags read.
    pub fn rescan_library(&mut self) -> Result<RescanReport, StorageError> {
        let (fs, _, diff) = self.status()?;
        let time_secs = system_time_to_i64(fs.observed_at).map_err(StorageError::Internal)?;
        self.apply_diff(time_secs, diff)
    }

    fn apply_diff(
        &mut self,
        time_secs: SecondsSinceUnix,
        diff: LibraryDiff,
    ) -> Result<RescanReport, StorageError> {
        let hash_bytes = self.source.content_hash_bytes;
        let mut report = RescanReport::default();

        let mut index = |found: FoundFile, into: &mut Vec<IndexedFile>, failed: &mut Vec<_>| {
            match fs::index_file(&found, hash_bytes) {
                Ok((entry, metadata)) => into.push(IndexedFile { entry, metadata }),
                Err(e) => {
                    log::warn!("cannot index {}: {e}", found.path.to_string_lossy());
                    failed.push((found.path, e.to_string()));
                }
            }
        };
        for found in diff.added {
            index(found, &mut report.added, &mut report.failed);
        }
        for found in diff.changed {
            index(found, &mut report.updated, &mut report.failed);
        }

        let tx = self.db.transaction()?;
        for file in report.added.iter().chain(report.updated.iter()) {
            upsert_file(&tx, file)?;
        }
        for path in &diff.removed {
            tx.execute(
                &format!("DELETE FROM {FILES} WHERE {PATH} = ?1"),
                params![path.to_string_lossy()],
            )?;
        }
        tx.execute(
            &format!("INSERT INTO {UPDATES} ({UPDATED_AT}) VALUES (?1)"),
            params![time_secs],
        )?;
        tx.commit()?;

        report.removed = diff.removed;
        Ok(report)
    }

    fn files_of(&self, track_id: &TrackId) -> Result<Vec<IndexedFile>, StorageError> {
        let columns = file_columns();
        let mut stmt = self.db.prepare(&format!(
            "SELECT {columns} FROM {FILES} WHERE {TRACK_ID} = ?1 ORDER BY {PATH}"
        ))?;
        let rows = stmt
            .query_map(params![track_id.to_hex()], indexed_file_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(with_valid_ids(rows).collect())
    }

    /// Resolves a track and the file it is currently available at.
    ///
    /// If multiple locations point to the same track, the first one still on
    /// disk is chosen. A track whose files all vanished comes back without
    /// file metadata.
    pub fn lookup(&self, track_id: &TrackId) -> Result<TrackLookup, StorageError> {
        let files = self.files_of(track_id)?;
        let Some(first) = files.first() else {
            return Err(StorageError::TrackNotFound(track_id.clone()));
        };

        let track = Track {
            id: track_id.clone(),
            metadata: first.metadata.clone(),
            file_size: Some(first.entry.size),
            modified: Some(first.entry.mtime),
        };
        let file = files
            .into_iter()
            .map(|f| f.entry)
            .find(|e| fs::is_valid_music_path(&e.path));

        Ok(TrackLookup { track, file })
    }

    /// Resolves many tracks in order. Unknown ids come back without file metadata.
    pub fn lookups(&self, track_ids: &[TrackId]) -> Result<Vec<TrackLookup>, StorageError> {
        track_ids
            .iter()
            .map(|id| match self.lookup(id) {
                Ok(lookup) => Ok(lookup),
                Err(StorageError::TrackNotFound(id)) => Ok(TrackLookup {
                    track: Track {
                        id,
                        metadata: TrackMetadata::default(),
                        file_size: None,
                        modified: None,
                    },
                    file: None,
                }),
                Err(e) => Err(e),
            })
            .collect()
    }

    pub fn track_id_for_path(&self, path: &Path) -> Result<Option<TrackId>, StorageError> {
        let hex: Option<String> = self
            .db
            .query_row(
                &format!("SELECT {TRACK_ID} FROM {FILES} WHERE {PATH} = ?1"),
                params![path.to_string_lossy()],
                |row| row.get(0),
            )
            .optional()?;
        hex.map(|h| TrackId::from_hex(&h))
            .transpose()
            .map_err(StorageError::Internal)
    }

    /// Lists unique tracks with every indexed location
    pub fn list_tracks(&mut self) -> Result<Vec<TrackListEntry>, StorageError> {
        let snapshot = self.scan_db()?;

        let mut by_track: BTreeMap<TrackId, TrackListEntry> = BTreeMap::new();
        for file in snapshot.files {
            let entry = by_track
                .entry(file.entry.track_id.clone())
                .or_insert_with(|| TrackListEntry {
                    track: Track {
                        id: file.entry.track_id.clone(),
                        metadata: file.metadata.clone(),
                        file_size: Some(file.entry.size),
                        modified: Some(file.entry.mtime),
                    },
                    files: Vec::new(),
                });
            entry.files.push(file.entry.path);
        }

        Ok(by_track.into_values().collect())
    }
}
