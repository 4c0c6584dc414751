//! Walking a mounted device to find the music already on it

use std::path::Path;

use walkdir::WalkDir;

use crate::{
    config::DeviceScan,
    device::error::DeviceError,
    domain::hash::{TrackId, prefix_hash},
    reconcile::path_map::{DeviceKeyMap, DevicePathMap, DeviceScanEntry},
    storage::fs::{is_music_file, mtime_secs},
};

/// `/`-separated path of `path` below `root`
pub fn device_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Fingerprints every music file under `root`.
///
/// Names, sizes and mtimes are always recorded. Files whose size matches a
/// library candidate also get a prefix hash over `content_hash_bytes`, and a
/// full hash when `keys` asks for one. `content_hash_bytes` must be the length
/// the library was indexed with. Unreadable entries are logged and skipped.
pub fn scan_device_for_paths(
    root: &Path,
    keys: &DeviceKeyMap,
    config: &DeviceScan,
    content_hash_bytes: u64,
) -> Result<DevicePathMap, DeviceError> {
    if !root.is_dir() {
        return Err(DeviceError::NotMounted(root.to_path_buf()));
    }
    log::info!(
        "scanning device at {} (full hashes: {})",
        root.to_string_lossy(),
        keys.needs_full_hash
    );

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if let Some(io) = err.io_error()
                    && io.kind() == std::io::ErrorKind::PermissionDenied
                    && err.depth() == 0
                {
                    return Err(DeviceError::PermissionDenied(root.to_path_buf()));
                }
                log::warn!("skipping device entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_music_file(entry.path()) {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                log::warn!("cannot stat {}: {err}", entry.path().to_string_lossy());
                continue;
            }
        };

        let size = meta.len();
        let wanted = keys.has_size(size);
        let content_hash = wanted
            .then(|| prefix_hash(entry.path(), content_hash_bytes))
            .transpose()
            .unwrap_or_else(|err| {
                log::warn!("cannot hash {}: {err}", entry.path().to_string_lossy());
                None
            });
        let full_hash = (wanted && keys.needs_full_hash)
            .then(|| TrackId::from_file(entry.path()).map(|id| id.to_hex()))
            .transpose()
            .unwrap_or_else(|err| {
                log::warn!("cannot hash {}: {err}", entry.path().to_string_lossy());
                None
            });

        entries.push(DeviceScanEntry {
            relative_path: device_relative(root, entry.path()),
            name: entry.file_name().to_string_lossy().to_string(),
            size,
            mtime: mtime_secs(&meta),
            content_hash,
            full_hash,
        });
    }

    log::info!("found {} music files on device", entries.len());
    Ok(DevicePathMap::from_entries(entries))
}
