use std::collections::HashSet;

use crate::{
    domain::track::DeviceTrack,
    reconcile::keys::{TagKey, TagSizeKey, TrackDescriptor},
};

/// Fingerprints of the tracks found in a device's own database
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceIndex {
    pub tag_only: HashSet<TagKey>,
    pub tag_size: HashSet<TagSizeKey>,
    pub used_bytes: u64,
}

impl DeviceIndex {
    pub fn build<'a>(tracks: impl IntoIterator<Item = &'a DeviceTrack>) -> Self {
        let mut index = Self::default();
        for track in tracks {
            let descriptor = TrackDescriptor::from(track);
            if let Some(strict) = descriptor.strict_key() {
                index.tag_size.insert(strict);
            }
            index.tag_only.insert(descriptor.loose_key());
            index.used_bytes += track.size.unwrap_or(0);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.tag_only.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tag_only.is_empty()
    }
}

/// Lifecycle of the index for the currently connected device.
///
/// The index lives only as long as the connection: it is never persisted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum IndexState {
    #[default]
    Loading,
    Ready(DeviceIndex),
}

impl IndexState {
    pub fn ready(tracks: &[DeviceTrack]) -> Self {
        Self::Ready(DeviceIndex::build(tracks))
    }

    /// Drops the index, e.g. on disconnect or when the device handle changes.
    pub fn reset(&mut self) {
        *self = Self::Loading;
    }

    pub fn index(&self) -> Option<&DeviceIndex> {
        match self {
            Self::Loading => None,
            Self::Ready(index) => Some(index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::track::TrackMetadata;

    fn device_track(title: &str, size: Option<u64>) -> DeviceTrack {
        DeviceTrack {
            metadata: TrackMetadata::new("Air", title, "Moon Safari", Some(1)),
            size,
            location: None,
        }
    }

    #[test]
    fn build_collects_keys_and_bytes() {
        let tracks = vec![
            device_track("La Femme D'Argent", Some(8_000_000)),
            device_track("Sexy Boy", None),
        ];
        let index = DeviceIndex::build(&tracks);

        assert_eq!(index.tag_only.len(), 2);
        // only the sized track has a strict key
        assert_eq!(index.tag_size.len(), 1);
        assert_eq!(index.used_bytes, 8_000_000);
    }

    #[test]
    fn reset_forgets_the_index() {
        let mut state = IndexState::ready(&[device_track("Talisman", Some(1))]);
        assert!(state.index().is_some());

        state.reset();
        assert_eq!(state, IndexState::Loading);
    }
}
