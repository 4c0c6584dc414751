//! Matching files found on a mass-storage device back to library tracks.
//!
//! The library side contributes a [`DeviceKeyMap`]: for every track, the
//! fingerprints its file could have on the device. The device scanner
//! produces a [`DevicePathMap`] from the other direction. A track is on the
//! device when one of its fingerprints resolves to a scanned path.

use std::collections::{HashMap, HashSet};

use crate::domain::{
    hash::TrackId,
    track::{FileIndexEntry, TrackLookup},
};

/// One way of recognizing a file on a device.
///
/// Ordered from weakest to strongest; [`DevicePathMap::resolve`] tries the
/// strongest first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceKey {
    NameSize { name: String, size: u64 },
    NameSizeMtime { name: String, size: u64, mtime: i64 },
    Content(String),
    FullContent(String),
}

impl DeviceKey {
    fn rank(&self) -> u8 {
        match self {
            DeviceKey::FullContent(_) => 0,
            DeviceKey::Content(_) => 1,
            DeviceKey::NameSizeMtime { .. } => 2,
            DeviceKey::NameSize { .. } => 3,
        }
    }

    /// Flat text form used to persist path caches
    pub fn encode(&self) -> String {
        match self {
            DeviceKey::NameSize { name, size } => format!("ns:{size}:{name}"),
            DeviceKey::NameSizeMtime { name, size, mtime } => format!("nsm:{size}:{mtime}:{name}"),
            DeviceKey::Content(hash) => format!("c:{hash}"),
            DeviceKey::FullContent(hash) => format!("f:{hash}"),
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        let (kind, rest) = s.split_once(':')?;
        match kind {
            "ns" => {
                let (size, name) = rest.split_once(':')?;
                Some(DeviceKey::NameSize {
                    name: name.to_string(),
                    size: size.parse().ok()?,
                })
            }
            "nsm" => {
                let mut parts = rest.splitn(3, ':');
                let size = parts.next()?.parse().ok()?;
                let mtime = parts.next()?.parse().ok()?;
                let name = parts.next()?.to_string();
                Some(DeviceKey::NameSizeMtime { name, size, mtime })
            }
            "c" => Some(DeviceKey::Content(rest.to_string())),
            "f" => Some(DeviceKey::FullContent(rest.to_string())),
            _ => None,
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// All candidate keys for one library file, strongest first
pub fn candidates(file: &FileIndexEntry) -> Vec<DeviceKey> {
    let name = normalize_name(&file.file_name);
    let mut keys = Vec::with_capacity(4);
    if let Some(full) = &file.full_hash {
        keys.push(DeviceKey::FullContent(full.clone()));
    }
    if let Some(content) = &file.content_hash {
        keys.push(DeviceKey::Content(content.clone()));
    }
    keys.push(DeviceKey::NameSizeMtime {
        name: name.clone(),
        size: file.size,
        mtime: file.mtime,
    });
    keys.push(DeviceKey::NameSize {
        name,
        size: file.size,
    });
    keys
}

/// Tracks of a sync target that could not be fingerprinted
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MissingMetadata {
    pub tracks: Vec<TrackId>,
}

impl MissingMetadata {
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }
}

/// Per-target map from track to the keys its file may appear under
#[derive(Debug, Default, Clone)]
pub struct DeviceKeyMap {
    keys: HashMap<TrackId, Vec<DeviceKey>>,
    sizes: HashSet<u64>,
    /// set when any candidate is a full-content hash, so the scanner knows
    /// hashing whole device files is worth the time
    pub needs_full_hash: bool,
}

impl DeviceKeyMap {
    pub fn build(lookups: &[TrackLookup]) -> (Self, MissingMetadata) {
        let mut map = Self::default();
        let mut missing = MissingMetadata::default();

        for lookup in lookups {
            let Some(file) = &lookup.file else {
                missing.tracks.push(lookup.track.id.clone());
                continue;
            };
            let keys = candidates(file);
            if keys
                .iter()
                .any(|k| matches!(k, DeviceKey::FullContent(_)))
            {
                map.needs_full_hash = true;
            }
            map.sizes.insert(file.size);
            map.keys.insert(lookup.track.id.clone(), keys);
        }

        (map, missing)
    }

    pub fn keys_for(&self, track: &TrackId) -> Option<&[DeviceKey]> {
        self.keys.get(track).map(Vec::as_slice)
    }

    /// Only files of a wanted size can match a content hash, so only those get hashed.
    pub fn has_size(&self, size: u64) -> bool {
        self.sizes.contains(&size)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// One music file found on a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceScanEntry {
    /// path relative to the device mount, with `/` separators
    pub relative_path: String,
    pub name: String,
    pub size: u64,
    pub mtime: i64,
    pub content_hash: Option<String>,
    pub full_hash: Option<String>,
}

impl DeviceScanEntry {
    fn keys(&self) -> Vec<DeviceKey> {
        let name = normalize_name(&self.name);
        let mut keys = vec![
            DeviceKey::NameSize {
                name: name.clone(),
                size: self.size,
            },
            DeviceKey::NameSizeMtime {
                name,
                size: self.size,
                mtime: self.mtime,
            },
        ];
        if let Some(content) = &self.content_hash {
            keys.push(DeviceKey::Content(content.clone()));
        }
        if let Some(full) = &self.full_hash {
            keys.push(DeviceKey::FullContent(full.clone()));
        }
        keys
    }
}

/// Fingerprint to relative path on the device, plus the raw scan entries
#[derive(Debug, Default, Clone)]
pub struct DevicePathMap {
    pub entries: Vec<DeviceScanEntry>,
    paths: HashMap<DeviceKey, String>,
}

impl DevicePathMap {
    /// First entry wins when two device files share a fingerprint.
    pub fn from_entries(entries: Vec<DeviceScanEntry>) -> Self {
        let mut paths = HashMap::new();
        for entry in &entries {
            for key in entry.keys() {
                paths
                    .entry(key)
                    .or_insert_with(|| entry.relative_path.clone());
            }
        }
        Self { entries, paths }
    }

    /// Rebuilds a map from a persisted key/path cache, without raw entries.
    pub fn from_cached(paths: impl IntoIterator<Item = (DeviceKey, String)>) -> Self {
        Self {
            entries: Vec::new(),
            paths: paths.into_iter().collect(),
        }
    }

    pub fn resolve(&self, keys: &[DeviceKey]) -> Option<&str> {
        let mut keys = keys.iter().collect::<Vec<_>>();
        keys.sort_by_key(|k| k.rank());
        keys.into_iter()
            .find_map(|k| self.paths.get(k))
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceKey, &String)> {
        self.paths.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
