use rusqlite::Connection;

pub mod tables {
    pub const FILES: &str = "files";
    pub const UPDATES: &str = "updates";
    pub const DEVICE_PROFILES: &str = "device_profiles";
    pub const DEVICE_TRACKS: &str = "device_tracks";
    pub const DEVICE_PATHS: &str = "device_paths";

    pub const ALL_TABLES: &[&str] = &[FILES, UPDATES, DEVICE_PROFILES, DEVICE_TRACKS, DEVICE_PATHS];
}

pub mod columns {
    pub const TRACK_ID: &str = "track_id";
    pub const PATH: &str = "path";
    pub const RELATIVE_PATH: &str = "relative_path";
    pub const ROOT_ID: &str = "root_id";
    pub const FILE_NAME: &str = "file_name";
    pub const SIZE: &str = "size";
    pub const MTIME: &str = "mtime";
    pub const CONTENT_HASH: &str = "content_hash";
    pub const ARTIST: &str = "artist";
    pub const TITLE: &str = "title";
    pub const ALBUM: &str = "album";
    pub const TRACK_NO: &str = "track_no";
    pub const UPDATED_AT: &str = "updated_at";
    pub const DEVICE_ID: &str = "device_id";
    pub const PROFILE: &str = "profile";
    pub const DEVICE_PATH: &str = "device_path";
    pub const SYNCED_AT: &str = "synced_at";
    pub const KEY: &str = "key";
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    path TEXT PRIMARY KEY,
    track_id TEXT NOT NULL,
    relative_path TEXT NOT NULL,
    root_id INTEGER NOT NULL,
    file_name TEXT NOT NULL,
    size INTEGER NOT NULL,
    mtime INTEGER NOT NULL,
    content_hash TEXT,
    artist TEXT,
    title TEXT,
    album TEXT,
    track_no INTEGER
);

CREATE INDEX IF NOT EXISTS files_track_id ON files (track_id);

CREATE TABLE IF NOT EXISTS updates (
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS device_profiles (
    device_id TEXT PRIMARY KEY,
    profile TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS device_tracks (
    device_id TEXT NOT NULL,
    track_id TEXT NOT NULL,
    device_path TEXT NOT NULL,
    synced_at INTEGER NOT NULL,
    PRIMARY KEY (device_id, track_id)
);

CREATE TABLE IF NOT EXISTS device_paths (
    device_id TEXT NOT NULL,
    key TEXT NOT NULL,
    path TEXT NOT NULL,
    PRIMARY KEY (device_id, key)
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
