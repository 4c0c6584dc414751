//! Match keys built from track tags.
//!
//! Paths are useless for matching across devices with different folder
//! layouts, so tracks are matched on what they describe instead. The size
//! is an optional tie-breaker: re-encodes share tags but not sizes.

use std::fmt::Display;

use crate::domain::track::{DeviceTrack, TrackLookup, TrackMetadata};

const SEPARATOR: char = '|';

/// Loose key: normalized artist, title, album and track number
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagKey(String);

/// Strict key: [`TagKey`] plus the file size in bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagSizeKey(String);

fn normalize(field: Option<&str>) -> String {
    field.map(|s| s.trim().to_lowercase()).unwrap_or_default()
}

impl TagKey {
    pub fn new(metadata: &TrackMetadata) -> Self {
        let key = format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            normalize(metadata.artist.as_deref()),
            normalize(metadata.title.as_deref()),
            normalize(metadata.album.as_deref()),
            metadata.track_no.unwrap_or(0),
        );
        Self(key)
    }

    pub fn with_size(&self, size: u64) -> TagSizeKey {
        TagSizeKey(format!("{}{SEPARATOR}{size}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TagSizeKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TagKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Display for TagSizeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The descriptive fields of a candidate track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub metadata: TrackMetadata,
    pub size: Option<u64>,
}

impl TrackDescriptor {
    pub fn new(metadata: TrackMetadata, size: Option<u64>) -> Self {
        Self { metadata, size }
    }

    pub fn loose_key(&self) -> TagKey {
        TagKey::new(&self.metadata)
    }

    /// `None` when the size is unknown
    pub fn strict_key(&self) -> Option<TagSizeKey> {
        self.size.map(|size| self.loose_key().with_size(size))
    }
}

impl From<&TrackLookup> for TrackDescriptor {
    /// Prefers the size of the indexed file over the size recorded on the track.
    fn from(lookup: &TrackLookup) -> Self {
        let size = lookup
            .file
            .as_ref()
            .map(|f| f.size)
            .or(lookup.track.file_size);
        Self::new(lookup.track.metadata.clone(), size)
    }
}

impl From<&DeviceTrack> for TrackDescriptor {
    fn from(track: &DeviceTrack) -> Self {
        Self::new(track.metadata.clone(), track.size)
    }
}
