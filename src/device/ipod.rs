//! Reading the track list of an iPod.
//!
//! Parsing the iTunesDB itself happens elsewhere; this side only consumes a
//! track list, e.g. a JSON dump exported by such a parser.

use std::path::{Path, PathBuf};

use crate::{
    device::error::DeviceError, domain::track::DeviceTrack, reconcile::index::IndexState,
};

pub trait IpodTrackSource {
    fn load_tracks(&self) -> Result<Vec<DeviceTrack>, DeviceError>;
}

/// A JSON array of [`DeviceTrack`] objects
pub struct JsonTrackDump {
    path: PathBuf,
}

impl JsonTrackDump {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IpodTrackSource for JsonTrackDump {
    fn load_tracks(&self) -> Result<Vec<DeviceTrack>, DeviceError> {
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| DeviceError::from_io(&self.path, e))?;
        serde_json::from_str(&contents).map_err(|e| {
            DeviceError::TrackList(format!("{}: {e}", self.path.to_string_lossy()))
        })
    }
}

/// Builds a fresh index for a newly connected device
pub fn load_index(source: &dyn IpodTrackSource) -> Result<IndexState, DeviceError> {
    let tracks = source.load_tracks()?;
    let state = IndexState::ready(&tracks);
    if let Some(index) = state.index() {
        log::info!(
            "iPod index ready: {} tracks, {} bytes used",
            index.len(),
            index.used_bytes
        );
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::{
        domain::track::TrackMetadata,
        reconcile::{
            classify::{Presence, classify_track},
            keys::TrackDescriptor,
        },
    };

    #[test]
    fn json_dump_feeds_the_index() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let dump = dir.path().join("tracks.json");
        std::fs::write(
            &dump,
            r#"[
                {"artist": "Air", "title": "La Femme D'Argent", "album": "Moon Safari", "track_no": 1, "size": 8000000},
                {"artist": "Air", "title": "Sexy Boy", "album": "Moon Safari", "location": ":iPod_Control:Music:F01:ABCD.mp3"}
            ]"#,
        )?;

        let state = load_index(&JsonTrackDump::new(&dump))?;
        let index = state.index().unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.used_bytes, 8_000_000);

        let track = TrackDescriptor::new(
            TrackMetadata::new("Air", "La Femme D'Argent", "Moon Safari", Some(1)),
            Some(8_000_000),
        );
        assert_eq!(classify_track(&track, &state), Presence::Present);
        Ok(())
    }

    #[test]
    fn broken_dump_is_a_track_list_error() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let dump = dir.path().join("tracks.json");
        std::fs::write(&dump, "{not json")?;

        let err = load_index(&JsonTrackDump::new(&dump)).unwrap_err();
        assert!(matches!(err, DeviceError::TrackList(_)));

        let err = load_index(&JsonTrackDump::new(dir.path().join("missing.json"))).unwrap_err();
        assert!(matches!(err, DeviceError::Io { .. }));
        Ok(())
    }
}
