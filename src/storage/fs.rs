//! Walking library roots and indexing the music files found there

use lofty::prelude::*;
use walkdir::WalkDir;

use std::{
    borrow::Cow,
    fs::Metadata,
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::{
    config::{self, Location},
    domain::{
        hash::{TrackId, prefix_hash},
        track::{FileIndexEntry, TrackMetadata},
    },
    storage::{db::system_time_to_i64, error::StorageError, resolve_location},
};

const MUSIC_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "ogg", "aac", "wma", "opus"];

pub fn is_music_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MUSIC_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// modification time in seconds since unix epoch, 0 if the platform has none
pub fn mtime_secs(meta: &Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| system_time_to_i64(t).ok())
        .unwrap_or(0)
}

#[derive(Debug)]
pub struct FsSnapshot {
    pub observed_at: SystemTime,
    pub files: Vec<FoundFile>,
}

impl FsSnapshot {
    pub fn scan(config: &config::LibrarySource) -> Result<Self, StorageError> {
        let observed_at = SystemTime::now();
        let files = scan_dirs(config.follow_symlinks, &config.roots, &config.ignored_dirs)?;
        Ok(Self { observed_at, files })
    }
}

/// A music file seen on disk, not hashed yet
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct FoundFile {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub root_id: u32,
    pub size: u64,
    pub mtime: i64,
}

/// Recursively scans all music files in the given directory, collecting their sizes and mtimes
pub fn scan_dir(
    follow_symlinks: bool,
    root: &Location,
    root_id: u32,
    ignored_dirs: &[PathBuf],
) -> Result<Vec<FoundFile>, StorageError> {
    let root = resolve_location(root)
        .map_err(|e| StorageError::Internal(e.context("failed to resolve library source root")))?;
    let root_str = root.to_string_lossy();

    let walker = WalkDir::new(&root).follow_links(follow_symlinks);

    let files = walker
        .into_iter()
        // keep the entry if it's not inside any ignored directory
        .filter_entry(|entry| {
            !ignored_dirs
                .iter()
                .any(|ignored| entry.path().starts_with(ignored))
        })
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                log::warn!("error while scanning dir {root_str}, skipping an entry: {err}");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_music_file(e.path()))
        .filter_map(|e| {
            let meta = match e.metadata() {
                Ok(meta) => meta,
                Err(err) => {
                    log::warn!("cannot stat {}, skipping: {err}", e.path().to_string_lossy());
                    return None;
                }
            };
            let relative_path = e
                .path()
                .strip_prefix(&root)
                .unwrap_or(e.path())
                .to_path_buf();
            Some(FoundFile {
                path: e.path().to_path_buf(),
                relative_path,
                root_id,
                size: meta.len(),
                mtime: mtime_secs(&meta),
            })
        })
        .collect();

    Ok(files)
}

/// Recursively scans all music files in given directories. Roots are numbered in order.
pub fn scan_dirs(
    follow_symlinks: bool,
    roots: &[Location],
    ignored_dirs: &[PathBuf],
) -> Result<Vec<FoundFile>, StorageError> {
    let scanned_dirs = roots
        .iter()
        .enumerate()
        .map(|(id, root)| scan_dir(follow_symlinks, root, id as u32, ignored_dirs))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(scanned_dirs.into_iter().flatten().collect())
}

/// Reads artist, title, album and track number. Unreadable tags give empty metadata.
pub fn read_tags(path: &Path) -> TrackMetadata {
    let tagged = match lofty::read_from_path(path) {
        Ok(tagged) => tagged,
        Err(err) => {
            log::debug!("no tags for {}: {err}", path.to_string_lossy());
            return TrackMetadata::default();
        }
    };
    let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
        return TrackMetadata::default();
    };

    TrackMetadata {
        artist: non_empty(tag.artist()),
        title: non_empty(tag.title()),
        album: non_empty(tag.album()),
        track_no: tag.track(),
    }
}

fn non_empty(value: Option<Cow<'_, str>>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Hashes a found file and reads its tags
pub fn index_file(
    found: &FoundFile,
    content_hash_bytes: u64,
) -> Result<(FileIndexEntry, TrackMetadata), StorageError> {
    let track_id = TrackId::from_file(&found.path)?;
    let content_hash = prefix_hash(&found.path, content_hash_bytes)?;
    let mut metadata = read_tags(&found.path);
    if metadata.title.is_none() {
        metadata.title = found
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string());
    }

    let entry = FileIndexEntry {
        full_hash: Some(track_id.to_hex()),
        track_id,
        path: found.path.clone(),
        relative_path: found.relative_path.clone(),
        root_id: found.root_id,
        file_name: found
            .path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
        size: found.size,
        mtime: found.mtime,
        content_hash: Some(content_hash),
    };
    Ok((entry, metadata))
}

/// Existing, non-empty regular file with a music extension. Audio is not decoded.
pub fn is_valid_music_path(path: &Path) -> bool {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return false,
    };

    meta.is_file() && is_music_file(path) && meta.len() > 0
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::{
        config::{self, Location},
        domain::hash::TrackId,
        storage::fs::{FsSnapshot, index_file, is_valid_music_path, scan_dir},
    };

    #[test]
    fn scan_finds_music_files_with_relative_paths() {
        let tmp = TempDir::new().unwrap();
        let root_path = tmp.path().to_path_buf();
        let root = Location::from_path(&root_path);

        std::fs::create_dir_all(root_path.join("Air")).unwrap();
        let song1 = root_path.join("Air/song1.mp3");
        let song2 = root_path.join("song2.FLAC");
        let not_music = root_path.join("notes.txt");

        std::fs::write(&song1, b"aaa").unwrap();
        std::fs::write(&song2, b"bbbb").unwrap();
        std::fs::write(&not_music, b"ccc").unwrap();

        let mut files = scan_dir(false, &root, 3, &[]).unwrap();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, song1);
        assert_eq!(files[0].relative_path, std::path::PathBuf::from("Air/song1.mp3"));
        assert_eq!(files[0].size, 3);
        assert_eq!(files[0].root_id, 3);
        assert_eq!(files[1].path, song2);
    }

    #[test]
    fn scan_dirs_numbers_roots() {
        let dir1 = TempDir::new().unwrap();
        let dir2 = TempDir::new().unwrap();

        std::fs::write(dir1.path().join("a.mp3"), b"song one").unwrap();
        std::fs::write(dir2.path().join("b.flac"), b"song two").unwrap();
        std::fs::write(dir2.path().join("notes.txt"), b"ignore me").unwrap();

        let config = config::LibrarySource {
            follow_symlinks: false,
            roots: vec![
                Location::from_path(dir1.path()),
                Location::from_path(dir2.path()),
            ],
            ignored_dirs: vec![],
            content_hash_bytes: 16,
        };

        let snapshot = FsSnapshot::scan(&config).unwrap();

        assert_eq!(snapshot.files.len(), 2);
        let b = snapshot
            .files
            .iter()
            .find(|f| f.path.ends_with("b.flac"))
            .unwrap();
        assert_eq!(b.root_id, 1);
    }

    #[test]
    fn scan_respects_ignored_dirs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        let ignored_dir = root.join("ignored");
        std::fs::create_dir_all(&ignored_dir).unwrap();

        std::fs::write(root.join("song1.mp3"), b"aaa").unwrap();
        std::fs::write(ignored_dir.join("ignored_song.mp3"), b"ccc").unwrap();

        let files = scan_dir(false, &Location::from_path(root), 0, &[ignored_dir]).unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("song1.mp3"));
    }

    #[test]
    fn index_file_hashes_and_falls_back_to_file_stem() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Untagged Song.mp3");
        // not a real mp3, tag reading fails quietly
        std::fs::write(&path, b"not audio").unwrap();

        let found = scan_dir(false, &Location::from_path(tmp.path()), 0, &[])
            .unwrap()
            .remove(0);
        let (entry, metadata) = index_file(&found, 4).unwrap();

        assert_eq!(entry.track_id, TrackId::from_bytes(b"not audio"));
        assert_eq!(entry.full_hash, Some(entry.track_id.to_hex()));
        assert_eq!(entry.file_name, "Untagged Song.mp3");
        assert!(entry.content_hash.is_some());
        assert_eq!(metadata.title.as_deref(), Some("Untagged Song"));
        assert_eq!(metadata.artist, None);
    }

    #[test]
    fn valid_music_path_rules_out_empty_and_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let empty = tmp.path().join("empty.mp3");
        let text = tmp.path().join("a.txt");
        let good = tmp.path().join("a.mp3");
        std::fs::write(&empty, b"").unwrap();
        std::fs::write(&text, b"x").unwrap();
        std::fs::write(&good, b"x").unwrap();

        assert!(!is_valid_music_path(&empty));
        assert!(!is_valid_music_path(&text));
        assert!(!is_valid_music_path(&tmp.path().join("missing.mp3")));
        assert!(is_valid_music_path(&good));
    }
}
