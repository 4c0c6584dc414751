//! Playlists: what gets synced, and the files written to devices.

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::domain::hash::TrackId;

pub const SELECTION_PLAYLIST_ID: &str = "selection";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub track_ids: Vec<TrackId>,
}

impl Playlist {
    pub fn new(id: &str, name: &str, track_ids: Vec<TrackId>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            track_ids,
        }
    }

    /// Synthetic playlist for a bare selection of tracks
    pub fn from_selection(name: &str, track_ids: Vec<TrackId>) -> Self {
        Self::new(SELECTION_PLAYLIST_ID, name, track_ids)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistFormat {
    M3u,
    #[default]
    M3u8,
    Pls,
}

impl PlaylistFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PlaylistFormat::M3u => "m3u",
            PlaylistFormat::M3u8 => "m3u8",
            PlaylistFormat::Pls => "pls",
        }
    }
}

impl Display for PlaylistFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for PlaylistFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "m3u" => Ok(PlaylistFormat::M3u),
            "m3u8" => Ok(PlaylistFormat::M3u8),
            "pls" => Ok(PlaylistFormat::Pls),
            other => bail!("unknown playlist format '{other}'"),
        }
    }
}

/// One line of a written playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistLine {
    pub location: String,
    pub title: Option<String>,
}

/// Renders a playlist file. Locations are written as given.
pub fn render(format: PlaylistFormat, lines: &[PlaylistLine]) -> String {
    match format {
        PlaylistFormat::M3u | PlaylistFormat::M3u8 => {
            let mut out = String::from("#EXTM3U\n");
            for line in lines {
                if let Some(title) = &line.title {
                    out.push_str(&format!("#EXTINF:-1,{title}\n"));
                }
                out.push_str(&line.location);
                out.push('\n');
            }
            out
        }
        PlaylistFormat::Pls => {
            let mut out = String::from("[playlist]\n");
            for (i, line) in lines.iter().enumerate() {
                let n = i + 1;
                out.push_str(&format!("File{n}={}\n", line.location));
                if let Some(title) = &line.title {
                    out.push_str(&format!("Title{n}={title}\n"));
                }
            }
            out.push_str(&format!("NumberOfEntries={}\nVersion=2\n", lines.len()));
            out
        }
    }
}

/// Reads the file locations of an M3U/M3U8 playlist.
///
/// Relative entries are resolved against the playlist's directory.
pub fn read_m3u(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read playlist {}", path.to_string_lossy()))?;
    let base = path.parent().unwrap_or(Path::new(""));

    Ok(contents
        .lines()
        .map(|l| l.trim_start_matches('\u{feff}').trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| {
            let entry = PathBuf::from(l);
            if entry.is_absolute() {
                entry
            } else {
                base.join(entry)
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn lines() -> Vec<PlaylistLine> {
        vec![
            PlaylistLine {
                location: "Music/Air/Moon Safari/01 La Femme D'Argent.mp3".into(),
                title: Some("Air - La Femme D'Argent".into()),
            },
            PlaylistLine {
                location: "Music/Air/Moon Safari/02 Sexy Boy.mp3".into(),
                title: None,
            },
        ]
    }

    #[test]
    fn renders_m3u() {
        let out = render(PlaylistFormat::M3u8, &lines());
        assert_eq!(
            out,
            "#EXTM3U\n#EXTINF:-1,Air - La Femme D'Argent\nMusic/Air/Moon Safari/01 La Femme D'Argent.mp3\nMusic/Air/Moon Safari/02 Sexy Boy.mp3\n"
        );
    }

    #[test]
    fn renders_pls() {
        let out = render(PlaylistFormat::Pls, &lines());
        assert!(out.starts_with("[playlist]\nFile1=Music/Air"));
        assert!(out.contains("Title1=Air - La Femme D'Argent\n"));
        assert!(!out.contains("Title2"));
        assert!(out.ends_with("NumberOfEntries=2\nVersion=2\n"));
    }

    #[test]
    fn reads_m3u_relative_to_its_folder() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mix.m3u");
        std::fs::write(&path, "#EXTM3U\n#EXTINF:-1,x\nsub/a.mp3\n\n/abs/b.flac\n")?;

        let entries = read_m3u(&path)?;
        assert_eq!(
            entries,
            vec![dir.path().join("sub/a.mp3"), PathBuf::from("/abs/b.flac")]
        );
        Ok(())
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("M3U8".parse::<PlaylistFormat>().unwrap(), PlaylistFormat::M3u8);
        assert!("xspf".parse::<PlaylistFormat>().is_err());
    }
}
