use crate::{
    domain::track::TrackLookup,
    reconcile::{
        index::IndexState,
        keys::TrackDescriptor,
        path_map::{DevicePathMap, candidates},
    },
};

/// Whether a track is on the device.
///
/// `Unknown` means the device data is not ready yet. It must never be read
/// as `Absent`, otherwise users get prompted to copy tracks they already have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Unknown,
    Present,
    Absent,
}

impl Presence {
    pub fn is_present(self) -> bool {
        self == Presence::Present
    }

    pub fn is_absent(self) -> bool {
        self == Presence::Absent
    }
}

impl From<bool> for Presence {
    fn from(found: bool) -> Self {
        if found {
            Presence::Present
        } else {
            Presence::Absent
        }
    }
}

/// Classifies a track against an iPod index.
///
/// With a known size the strict key is checked first; the loose key is the
/// fallback in every case.
pub fn classify_track(descriptor: &TrackDescriptor, state: &IndexState) -> Presence {
    let Some(index) = state.index() else {
        return Presence::Unknown;
    };

    if let Some(strict) = descriptor.strict_key()
        && index.tag_size.contains(&strict)
    {
        return Presence::Present;
    }

    index.tag_only.contains(&descriptor.loose_key()).into()
}

/// Progress of the path scan of a mass-storage device
#[derive(Debug, Default, Clone)]
pub enum UsbScanState {
    #[default]
    Idle,
    Scanning,
    Done(DevicePathMap),
    Failed(String),
}

impl UsbScanState {
    pub fn path_map(&self) -> Option<&DevicePathMap> {
        match self {
            UsbScanState::Done(map) => Some(map),
            _ => None,
        }
    }
}

/// Classifies a track against the scanned paths of a mass-storage device.
///
/// Undecided until a scan finished and path detection is on. Tracks without
/// file metadata cannot be fingerprinted and stay undecided as well.
pub fn classify_track_usb(
    lookup: &TrackLookup,
    state: &UsbScanState,
    path_detection: bool,
) -> Presence {
    if !path_detection {
        return Presence::Unknown;
    }
    let (Some(map), Some(file)) = (state.path_map(), &lookup.file) else {
        return Presence::Unknown;
    };
    map.resolve(&candidates(file)).is_some().into()
}

/// Where presence information for a device comes from
#[derive(Debug, Clone, Copy)]
pub enum Classifier<'a> {
    /// tag index read from the device database
    Ipod(&'a IndexState),
    /// scanned filesystem of a mass-storage device
    Usb {
        state: &'a UsbScanState,
        path_detection: bool,
    },
    /// export targets read straight from the library, nothing is ever copied
    Library,
}

impl Classifier<'_> {
    pub fn classify(&self, lookup: &TrackLookup) -> Presence {
        match self {
            Classifier::Ipod(state) => classify_track(&TrackDescriptor::from(lookup), state),
            Classifier::Usb {
                state,
                path_detection,
            } => classify_track_usb(lookup, state, *path_detection),
            Classifier::Library => {
                if lookup.file.is_some() {
                    Presence::Present
                } else {
                    Presence::Unknown
                }
            }
        }
    }

    /// Relative path of the track on the device, when the device data says so
    pub fn device_path(&self, lookup: &TrackLookup) -> Option<String> {
        match self {
            Classifier::Usb {
                state,
                path_detection: true,
            } => {
                let map = state.path_map()?;
                let file = lookup.file.as_ref()?;
                map.resolve(&candidates(file)).map(str::to_string)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::{
        domain::{
            hash::TrackId,
            track::{DeviceTrack, FileIndexEntry, Track, TrackMetadata},
        },
        reconcile::{index::DeviceIndex, keys::TagKey, path_map::DeviceScanEntry},
    };

    fn la_femme() -> TrackMetadata {
        TrackMetadata::new("Air", "La Femme D'Argent", "Moon Safari", Some(1))
    }

    fn on_device(metadata: TrackMetadata, size: Option<u64>) -> DeviceTrack {
        DeviceTrack {
            metadata,
            size,
            location: None,
        }
    }

    #[test]
    fn strict_key_hit_is_present() {
        let state = IndexState::ready(&[on_device(la_femme(), Some(8_000_000))]);
        let track = TrackDescriptor::new(la_femme(), Some(8_000_000));

        assert_eq!(classify_track(&track, &state), Presence::Present);
    }

    #[test]
    fn strict_hit_wins_even_when_loose_set_disagrees() {
        let track = TrackDescriptor::new(la_femme(), Some(8_000_000));
        // loose set only knows an unrelated track, strict set has ours
        let mut index = DeviceIndex::default();
        index.tag_size.insert(track.strict_key().unwrap());
        index
            .tag_only
            .insert(TagKey::new(&TrackMetadata::new("Air", "Other", "Other", None)));

        assert_eq!(
            classify_track(&track, &IndexState::Ready(index)),
            Presence::Present
        );
    }

    #[test]
    fn size_mismatch_falls_back_to_loose_key() {
        let state = IndexState::ready(&[on_device(la_femme(), Some(7_000_000))]);
        let track = TrackDescriptor::new(la_femme(), Some(8_000_000));

        assert_eq!(classify_track(&track, &state), Presence::Present);
    }

    #[test]
    fn loading_index_is_unknown_never_absent() {
        let state = IndexState::Loading;
        for size in [None, Some(1), Some(8_000_000)] {
            let track = TrackDescriptor::new(la_femme(), size);
            assert_eq!(classify_track(&track, &state), Presence::Unknown);
        }
    }

    #[test]
    fn only_absent_counts_as_missing() {
        assert!(Presence::Absent.is_absent());
        assert!(!Presence::Unknown.is_absent());
        assert!(!Presence::Present.is_absent());
        assert!(!Presence::Unknown.is_present());
    }

    #[test]
    fn unset_track_number_on_device_is_absent() {
        let mut device_meta = la_femme();
        device_meta.track_no = None;
        let state = IndexState::ready(&[on_device(device_meta, Some(8_000_000))]);
        let track = TrackDescriptor::new(la_femme(), Some(8_000_000));

        assert_eq!(classify_track(&track, &state), Presence::Absent);
    }

    #[test]
    fn empty_ready_index_is_absent() {
        let state = IndexState::ready(&[]);
        let track = TrackDescriptor::new(la_femme(), None);
        assert_eq!(classify_track(&track, &state), Presence::Absent);
    }

    fn usb_lookup(name: &str) -> TrackLookup {
        let id = TrackId::from_bytes(name.as_bytes());
        TrackLookup {
            track: Track {
                id: id.clone(),
                metadata: la_femme(),
                file_size: Some(5),
                modified: Some(1),
            },
            file: Some(FileIndexEntry {
                track_id: id,
                path: PathBuf::from("/lib").join(name),
                relative_path: PathBuf::from(name),
                root_id: 0,
                file_name: name.to_string(),
                size: 5,
                mtime: 1,
                content_hash: None,
                full_hash: None,
            }),
        }
    }

    fn done_scan() -> UsbScanState {
        UsbScanState::Done(DevicePathMap::from_entries(vec![DeviceScanEntry {
            relative_path: "MUSIC/a.mp3".into(),
            name: "a.mp3".into(),
            size: 5,
            mtime: 1,
            content_hash: None,
            full_hash: None,
        }]))
    }

    #[test]
    fn usb_classification_waits_for_scan() {
        let lookup = usb_lookup("a.mp3");
        assert_eq!(
            classify_track_usb(&lookup, &UsbScanState::Scanning, true),
            Presence::Unknown
        );
        assert_eq!(
            classify_track_usb(&lookup, &UsbScanState::Failed("io".into()), true),
            Presence::Unknown
        );
        assert_eq!(
            classify_track_usb(&lookup, &done_scan(), false),
            Presence::Unknown
        );
    }

    #[test]
    fn usb_classification_after_scan() {
        let state = done_scan();
        assert_eq!(
            classify_track_usb(&usb_lookup("a.mp3"), &state, true),
            Presence::Present
        );
        assert_eq!(
            classify_track_usb(&usb_lookup("b.mp3"), &state, true),
            Presence::Absent
        );
    }

    #[test]
    fn library_classifier_needs_file_metadata() {
        let mut lookup = usb_lookup("a.mp3");
        assert_eq!(Classifier::Library.classify(&lookup), Presence::Present);
        lookup.file = None;
        assert_eq!(Classifier::Library.classify(&lookup), Presence::Unknown);
    }
}
