//! Gathering what a device already holds, before a sync starts

use std::path::Path;

use crate::{
    config::DeviceScan,
    device::{
        ipod::{JsonTrackDump, load_index},
        profile::{DeviceFamily, DeviceProfile},
        scan::scan_device_for_paths,
    },
    domain::track::TrackLookup,
    reconcile::{
        classify::{Classifier, UsbScanState},
        index::IndexState,
        path_map::DeviceKeyMap,
        plan::SyncTarget,
    },
};

/// Presence data owned for the length of one sync
#[derive(Debug, Clone)]
pub enum DevicePresence {
    Ipod(IndexState),
    Usb {
        state: UsbScanState,
        path_detection: bool,
    },
    Library,
}

impl DevicePresence {
    pub fn classifier(&self) -> Classifier<'_> {
        match self {
            DevicePresence::Ipod(state) => Classifier::Ipod(state),
            DevicePresence::Usb {
                state,
                path_detection,
            } => Classifier::Usb {
                state,
                path_detection: *path_detection,
            },
            DevicePresence::Library => Classifier::Library,
        }
    }
}

/// Reads the iPod track list or scans the mounted device.
///
/// Never fails: a device that cannot be read leaves every track undecided
/// and the sync goes on without presence detection. `content_hash_bytes` is
/// the prefix length the library was indexed with.
pub fn load_presence(
    profile: &DeviceProfile,
    root: &Path,
    config: &DeviceScan,
    content_hash_bytes: u64,
    targets: &[SyncTarget],
) -> DevicePresence {
    match profile.device_type.family() {
        DeviceFamily::TagIndex => {
            let Some(dump) = &profile.track_dump else {
                log::warn!(
                    "no track list configured for {}, presence stays unknown",
                    profile.label
                );
                return DevicePresence::Ipod(IndexState::Loading);
            };
            let source = JsonTrackDump::new(root.join(dump));
            match load_index(&source) {
                Ok(state) => DevicePresence::Ipod(state),
                Err(err) => {
                    log::warn!(
                        "cannot load iPod track list {}: {err}",
                        source.path().to_string_lossy()
                    );
                    DevicePresence::Ipod(IndexState::Loading)
                }
            }
        }
        DeviceFamily::MassStorage => {
            if !config.path_detection {
                return DevicePresence::Usb {
                    state: UsbScanState::Idle,
                    path_detection: false,
                };
            }
            let lookups = targets
                .iter()
                .flat_map(|t| t.lookups.iter().cloned())
                .collect::<Vec<TrackLookup>>();
            let (keys, missing) = DeviceKeyMap::build(&lookups);
            if !missing.is_empty() {
                log::warn!(
                    "{} tracks have no file metadata and cannot be matched on the device",
                    missing.len()
                );
            }

            let state = match scan_device_for_paths(root, &keys, config, content_hash_bytes) {
                Ok(map) => UsbScanState::Done(map),
                Err(err) => {
                    log::warn!("device scan failed, continuing without path detection: {err}");
                    UsbScanState::Failed(err.to_string())
                }
            };
            DevicePresence::Usb {
                state,
                path_detection: true,
            }
        }
        DeviceFamily::Export => DevicePresence::Library,
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use tempfile::tempdir;

    use super::*;
    use crate::{
        config::Location,
        device::profile::DeviceType,
        domain::{
            hash::TrackId,
            track::{FileIndexEntry, Track, TrackMetadata},
        },
        playlist::Playlist,
        reconcile::classify::Presence,
    };

    const HASH_BYTES: u64 = 64;

    fn target_with_file(name: &str, size: u64) -> SyncTarget {
        let id = TrackId::from_bytes(name.as_bytes());
        let lookup = TrackLookup {
            track: Track {
                id: id.clone(),
                metadata: TrackMetadata::new("Air", name, "Moon Safari", None),
                file_size: Some(size),
                modified: None,
            },
            file: Some(FileIndexEntry {
                track_id: id.clone(),
                path: PathBuf::from("/lib").join(name),
                relative_path: PathBuf::from(name),
                root_id: 0,
                file_name: name.to_string(),
                size,
                mtime: 1,
                content_hash: None,
                full_hash: None,
            }),
        };
        SyncTarget {
            playlist: Playlist::new("p", "p", vec![id]),
            lookups: vec![lookup],
            source_root: None,
        }
    }

    #[test]
    fn scanned_usb_device_finds_existing_file() -> anyhow::Result<()> {
        let device = tempdir()?;
        fs::create_dir_all(device.path().join("Music"))?;
        fs::write(device.path().join("Music/Talisman.mp3"), b"12345")?;
        let profile = DeviceProfile::new("g", "Stick", DeviceType::Generic, Location::from_path(device.path()));
        let targets = vec![target_with_file("Talisman.mp3", 5)];

        let presence = load_presence(
            &profile,
            device.path(),
            &DeviceScan::default(),
            HASH_BYTES,
            &targets,
        );

        let lookup = &targets[0].lookups[0];
        assert_eq!(presence.classifier().classify(lookup), Presence::Present);
        assert_eq!(
            presence.classifier().device_path(lookup).as_deref(),
            Some("Music/Talisman.mp3")
        );
        Ok(())
    }

    #[test]
    fn unreadable_device_degrades_to_unknown() {
        let profile = DeviceProfile::new("g", "Stick", DeviceType::Generic, Location::from_path("/nope"));
        let targets = vec![target_with_file("a.mp3", 5)];

        let presence = load_presence(
            &profile,
            Path::new("/definitely/not/mounted"),
            &DeviceScan::default(),
            HASH_BYTES,
            &targets,
        );

        assert!(matches!(
            presence,
            DevicePresence::Usb {
                state: UsbScanState::Failed(_),
                ..
            }
        ));
        assert_eq!(
            presence.classifier().classify(&targets[0].lookups[0]),
            Presence::Unknown
        );
    }

    #[test]
    fn path_detection_off_skips_the_scan() {
        let profile = DeviceProfile::new("g", "Stick", DeviceType::Generic, Location::from_path("/nope"));
        let config = DeviceScan {
            path_detection: false,
            ..DeviceScan::default()
        };
        let presence = load_presence(&profile, Path::new("/nope"), &config, HASH_BYTES, &[]);
        assert!(matches!(
            presence,
            DevicePresence::Usb {
                state: UsbScanState::Idle,
                path_detection: false
            }
        ));
    }

    #[test]
    fn ipod_reads_dump_relative_to_mount() -> anyhow::Result<()> {
        let mount = tempdir()?;
        fs::write(
            mount.path().join("tracks.json"),
            r#"[{"artist": "Air", "title": "a.mp3", "album": "Moon Safari"}]"#,
        )?;
        let mut profile = DeviceProfile::new("i", "iPod", DeviceType::Ipod, Location::from_path(mount.path()));

        let presence = load_presence(&profile, mount.path(), &DeviceScan::default(), HASH_BYTES, &[]);
        assert!(matches!(presence, DevicePresence::Ipod(IndexState::Loading)));

        profile.track_dump = Some("tracks.json".into());
        let targets = vec![target_with_file("a.mp3", 5)];
        let presence = load_presence(
            &profile,
            mount.path(),
            &DeviceScan::default(),
            HASH_BYTES,
            &targets,
        );
        assert_eq!(
            presence.classifier().classify(&targets[0].lookups[0]),
            Presence::Present
        );
        Ok(())
    }

    #[test]
    fn broken_ipod_dump_leaves_tracks_undecided() -> anyhow::Result<()> {
        let mount = tempdir()?;
        fs::write(mount.path().join("tracks.json"), "{ not json")?;
        let mut profile = DeviceProfile::new("i", "iPod", DeviceType::Ipod, Location::from_path(mount.path()));
        profile.track_dump = Some("tracks.json".into());
        let targets = vec![target_with_file("a.mp3", 5)];

        let presence = load_presence(
            &profile,
            mount.path(),
            &DeviceScan::default(),
            HASH_BYTES,
            &targets,
        );

        assert!(matches!(presence, DevicePresence::Ipod(IndexState::Loading)));
        assert_eq!(
            presence.classifier().classify(&targets[0].lookups[0]),
            Presence::Unknown
        );
        Ok(())
    }
}
