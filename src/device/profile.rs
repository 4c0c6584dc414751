use std::{fmt::Display, str::FromStr};

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::{config::Location, playlist::PlaylistFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Ipod,
    Walkman,
    Generic,
    Zune,
    Jellyfin,
}

/// How presence on a device is detected and how it is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFamily {
    /// tracks are listed in a device-side database
    TagIndex,
    /// plain files on a mounted filesystem
    MassStorage,
    /// playlists referencing the library on a media server, nothing copied
    Export,
}

impl DeviceType {
    pub fn family(&self) -> DeviceFamily {
        match self {
            DeviceType::Ipod => DeviceFamily::TagIndex,
            DeviceType::Walkman | DeviceType::Generic | DeviceType::Zune => {
                DeviceFamily::MassStorage
            }
            DeviceType::Jellyfin => DeviceFamily::Export,
        }
    }
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceType::Ipod => "ipod",
            DeviceType::Walkman => "walkman",
            DeviceType::Generic => "generic",
            DeviceType::Zune => "zune",
            DeviceType::Jellyfin => "jellyfin",
        };
        f.write_str(name)
    }
}

impl FromStr for DeviceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ipod" => Ok(DeviceType::Ipod),
            "walkman" => Ok(DeviceType::Walkman),
            "generic" | "usb" => Ok(DeviceType::Generic),
            "zune" => Ok(DeviceType::Zune),
            "jellyfin" => Ok(DeviceType::Jellyfin),
            other => bail!("unknown device type '{other}'"),
        }
    }
}

/// How tracks are referenced from written playlist files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStrategy {
    /// relative to the folder holding the playlist
    #[default]
    Relative,
    /// rooted at the device mount, e.g. `/MUSIC/Air/...`
    RootRelative,
    /// `path_prefix` joined with the track's path on the target: the device
    /// path for mass storage, the library-relative path for export folders
    Absolute,
}

impl FromStr for PathStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "relative" => Ok(PathStrategy::Relative),
            "root_relative" => Ok(PathStrategy::RootRelative),
            "absolute" => Ok(PathStrategy::Absolute),
            other => bail!("unknown path strategy '{other}'"),
        }
    }
}

/// Persisted configuration of one sync target device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub id: String,
    pub label: String,
    pub device_type: DeviceType,
    /// where the device (or export folder) is mounted
    pub mount: Location,
    pub playlist_format: PlaylistFormat,
    /// relative to the mount
    pub playlist_folder: String,
    /// relative to the mount, where copied tracks go
    pub music_folder: String,
    pub path_strategy: PathStrategy,
    #[serde(default)]
    pub path_prefix: Option<String>,
    /// iPod only: JSON dump of the device track list
    #[serde(default)]
    pub track_dump: Option<String>,
    #[serde(default)]
    pub last_synced_at: Option<i64>,
}

impl DeviceProfile {
    /// A profile with the folder layout the device type expects
    pub fn new(id: &str, label: &str, device_type: DeviceType, mount: Location) -> Self {
        let (music_folder, playlist_folder, playlist_format, path_strategy) = match device_type {
            DeviceType::Walkman => ("MUSIC", "MUSIC", PlaylistFormat::M3u8, PathStrategy::Relative),
            DeviceType::Zune => ("Music", "Playlists", PlaylistFormat::M3u, PathStrategy::RootRelative),
            DeviceType::Generic => ("Music", "Playlists", PlaylistFormat::M3u8, PathStrategy::Relative),
            DeviceType::Ipod => ("iPod_Control/Music", "", PlaylistFormat::M3u8, PathStrategy::Relative),
            DeviceType::Jellyfin => ("", "playlists", PlaylistFormat::M3u8, PathStrategy::Absolute),
        };

        Self {
            id: id.to_string(),
            label: label.to_string(),
            device_type,
            mount,
            playlist_format,
            playlist_folder: playlist_folder.to_string(),
            music_folder: music_folder.to_string(),
            path_strategy,
            path_prefix: None,
            track_dump: None,
            last_synced_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_device_type() {
        let walkman = DeviceProfile::new("w", "NW-A45", DeviceType::Walkman, Location::from_path("/media/WALKMAN"));
        assert_eq!(walkman.music_folder, "MUSIC");
        assert_eq!(walkman.playlist_folder, "MUSIC");
        assert_eq!(walkman.device_type.family(), DeviceFamily::MassStorage);

        let jelly = DeviceProfile::new("j", "Jellyfin", DeviceType::Jellyfin, Location::from_path("/srv/jf"));
        assert_eq!(jelly.path_strategy, PathStrategy::Absolute);
        assert_eq!(jelly.device_type.family(), DeviceFamily::Export);
    }

    #[test]
    fn profile_json_roundtrip_keeps_location_kind() -> anyhow::Result<()> {
        let mut profile = DeviceProfile::new(
            "zune",
            "Zune HD",
            DeviceType::Zune,
            Location::Usb {
                label: "ZUNE".into(),
                path: "".into(),
            },
        );
        profile.last_synced_at = Some(10);

        let json = serde_json::to_string(&profile)?;
        assert_eq!(serde_json::from_str::<DeviceProfile>(&json)?, profile);
        Ok(())
    }

    #[test]
    fn parses_device_types() {
        assert_eq!("iPod".parse::<DeviceType>().unwrap(), DeviceType::Ipod);
        assert_eq!("usb".parse::<DeviceType>().unwrap(), DeviceType::Generic);
        assert!("walkie-talkie".parse::<DeviceType>().is_err());
        assert_eq!(
            "root-relative".parse::<PathStrategy>().unwrap(),
            PathStrategy::RootRelative
        );
    }
}
