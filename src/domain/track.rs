use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::hash::TrackId;

/// Represent a music track in the library
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub metadata: TrackMetadata,
    pub file_size: Option<u64>,
    /// seconds since unix epoch
    pub modified: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub track_no: Option<u32>,
}

impl TrackMetadata {
    pub fn new(artist: &str, title: &str, album: &str, track_no: Option<u32>) -> Self {
        Self {
            artist: Some(artist.to_string()),
            title: Some(title.to_string()),
            album: Some(album.to_string()),
            track_no,
        }
    }
}

/// What the library scanner knows about one file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIndexEntry {
    pub track_id: TrackId,
    pub path: PathBuf,
    /// path relative to the library root it was found under
    pub relative_path: PathBuf,
    pub root_id: u32,
    pub file_name: String,
    pub size: u64,
    pub mtime: i64,
    /// hash of a bounded prefix, see [`super::hash::prefix_hash`]
    pub content_hash: Option<String>,
    /// hash of the whole file
    pub full_hash: Option<String>,
}

/// A library track paired with the file metadata it was indexed from.
///
/// `file` is `None` when the track is known but no file index row exists,
/// e.g. the track id came from a playlist of a stale library.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackLookup {
    pub track: Track,
    pub file: Option<FileIndexEntry>,
}

/// A track as stored in a device's own database (iPod track list)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTrack {
    #[serde(flatten)]
    pub metadata: TrackMetadata,
    #[serde(default)]
    pub size: Option<u64>,
    /// location on the device, for display only
    #[serde(default)]
    pub location: Option<String>,
}
