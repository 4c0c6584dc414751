//! Putting tracks and playlists on a device.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use crate::{
    device::{
        error::DeviceError,
        profile::{DeviceFamily, DeviceProfile, PathStrategy},
        scan::device_relative,
    },
    domain::{hash::TrackId, track::TrackLookup},
    playlist::{self, Playlist, PlaylistLine},
    reconcile::plan::SyncPlan,
    storage::fs::is_music_file,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// replace playlist files that already exist
    pub overwrite: bool,
    /// delete music files under the music folder that no written playlist references
    pub mirror: bool,
}

/// Where a track ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Copied(String),
    /// a file of the same size was already at the destination
    AlreadyThere(String),
    /// nothing copied, the playlist points at the library file
    Referenced(String),
}

impl Placement {
    pub fn device_path(&self) -> &str {
        match self {
            Placement::Copied(p) | Placement::AlreadyThere(p) | Placement::Referenced(p) => p,
        }
    }

    pub fn is_on_device(&self) -> bool {
        !matches!(self, Placement::Referenced(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistWrite {
    Written(PathBuf),
    /// exists and overwriting was not requested
    Skipped(PathBuf),
}

/// A track as listed in a playlist about to be written
#[derive(Debug, Clone)]
pub struct PlaylistTrack<'a> {
    pub lookup: &'a TrackLookup,
    pub device_path: &'a str,
}

#[derive(Debug, Default)]
pub struct WriteReport {
    pub copied: usize,
    pub already_there: usize,
    /// tracks now known to be on the device, with their device path
    pub on_device: Vec<(TrackId, String)>,
    pub playlists: Vec<PlaylistWrite>,
    /// per-track failures that did not stop the sync
    pub failed: Vec<(TrackId, String)>,
    /// device paths deleted by mirroring
    pub mirrored: Vec<String>,
}

pub trait DeviceWriter {
    fn place_track(&mut self, lookup: &TrackLookup) -> Result<Placement, DeviceError>;

    fn write_playlist(
        &mut self,
        playlist: &Playlist,
        tracks: &[PlaylistTrack<'_>],
        options: &WriteOptions,
    ) -> Result<PlaylistWrite, DeviceError>;

    /// Deletes device music files not in `keep`, returns their device paths
    fn mirror(&mut self, keep: &HashSet<String>) -> Result<Vec<String>, DeviceError>;

    /// Carries out a plan: copies first, then one playlist per target, in order.
    ///
    /// Fatal errors abort the whole write. Any other failure drops the track
    /// from the playlists and is reported in [`WriteReport::failed`].
    fn write(&mut self, plan: &SyncPlan, options: &WriteOptions) -> Result<WriteReport, DeviceError> {
        let mut report = WriteReport::default();
        let mut placed: HashMap<TrackId, String> = HashMap::new();
        let mut failed: HashSet<TrackId> = HashSet::new();

        let total = plan.copies.len();
        for (i, lookup) in plan.copies.iter().enumerate() {
            let id = &lookup.track.id;
            log::info!("[{}/{total}] {}", i + 1, describe(lookup));
            match self.place_track(lookup) {
                Ok(placement) => {
                    match &placement {
                        Placement::Copied(_) => report.copied += 1,
                        Placement::AlreadyThere(_) => report.already_there += 1,
                        Placement::Referenced(_) => {}
                    }
                    if placement.is_on_device() {
                        report
                            .on_device
                            .push((id.clone(), placement.device_path().to_string()));
                    }
                    placed.insert(id.clone(), placement.device_path().to_string());
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    log::warn!("skipping {}: {err}", describe(lookup));
                    failed.insert(id.clone());
                    report.failed.push((id.clone(), err.to_string()));
                }
            }
        }

        let mut keep = HashSet::new();
        let total = plan.playlists.len();
        for (i, target) in plan.playlists.iter().enumerate() {
            log::info!(
                "[{}/{total}] playlist '{}' ({} tracks)",
                i + 1,
                target.playlist.name,
                target.entries.len()
            );

            let mut resolved = Vec::with_capacity(target.entries.len());
            for entry in &target.entries {
                let id = &entry.lookup.track.id;
                if failed.contains(id) {
                    continue;
                }
                let known = placed.get(id).or(entry.device_path.as_ref()).cloned();
                let path = match known {
                    Some(path) => path,
                    None => match self.place_track(&entry.lookup) {
                        Ok(placement) => {
                            let path = placement.device_path().to_string();
                            placed.insert(id.clone(), path.clone());
                            path
                        }
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => {
                            log::warn!("skipping {}: {err}", describe(&entry.lookup));
                            failed.insert(id.clone());
                            report.failed.push((id.clone(), err.to_string()));
                            continue;
                        }
                    },
                };
                keep.insert(path.clone());
                resolved.push((&entry.lookup, path));
            }

            let tracks = resolved
                .iter()
                .map(|(lookup, path)| PlaylistTrack {
                    lookup,
                    device_path: path,
                })
                .collect::<Vec<_>>();
            report
                .playlists
                .push(self.write_playlist(&target.playlist, &tracks, options)?);
        }

        if options.mirror {
            report.mirrored = self.mirror(&keep)?;
        }
        Ok(report)
    }
}

fn describe(lookup: &TrackLookup) -> String {
    display_title(lookup).unwrap_or_else(|| lookup.track.id.to_hex())
}

/// Picks the writer for a profile's device family
pub fn writer_for(root: &Path, profile: &DeviceProfile) -> Result<Box<dyn DeviceWriter>, DeviceError> {
    match profile.device_type.family() {
        DeviceFamily::MassStorage => Ok(Box::new(MassStorageWriter::new(root, profile.clone()))),
        DeviceFamily::Export => Ok(Box::new(ExportWriter::new(root, profile.clone()))),
        DeviceFamily::TagIndex => Err(DeviceError::Unsupported(profile.device_type.to_string())),
    }
}

const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Makes a string usable as a single FAT32 path component
pub fn sanitize_component(s: &str) -> String {
    let cleaned = s
        .chars()
        .map(|c| {
            if FORBIDDEN.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect::<String>();
    let cleaned = cleaned.trim().trim_end_matches('.').trim();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.chars().take(120).collect()
    }
}

fn join_device(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// `Artist/Album/NN Title.ext` below the music folder
pub fn destination_for(music_folder: &str, lookup: &TrackLookup) -> String {
    let meta = &lookup.track.metadata;
    let ext = lookup
        .file
        .as_ref()
        .and_then(|f| f.path.extension())
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "mp3".to_string());
    let title = meta
        .title
        .clone()
        .unwrap_or_else(|| lookup.track.id.to_hex()[..12].to_string());
    let file_name = match meta.track_no {
        Some(n) if n > 0 => format!("{n:02} {}.{ext}", sanitize_component(&title)),
        _ => format!("{}.{ext}", sanitize_component(&title)),
    };

    join_device(&[
        music_folder,
        &sanitize_component(meta.artist.as_deref().unwrap_or("Unknown Artist")),
        &sanitize_component(meta.album.as_deref().unwrap_or("Unknown Album")),
        &file_name,
    ])
}

/// Path of `target` as seen from the directory `from`, both `/`-separated
/// and relative to the same root.
pub fn relative_location(from: &str, target: &str) -> String {
    let from = from.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>();
    let target = target.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>();
    let common = from
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts = vec![".."; from.len() - common];
    parts.extend(&target[common..]);
    parts.join("/")
}

fn display_title(lookup: &TrackLookup) -> Option<String> {
    let meta = &lookup.track.metadata;
    match (&meta.artist, &meta.title) {
        (Some(artist), Some(title)) => Some(format!("{artist} - {title}")),
        (None, Some(title)) => Some(title.clone()),
        _ => None,
    }
}

fn write_playlist_file(
    root: &Path,
    profile: &DeviceProfile,
    playlist: &Playlist,
    lines: &[PlaylistLine],
    options: &WriteOptions,
) -> Result<PlaylistWrite, DeviceError> {
    let folder = root.join(&profile.playlist_folder);
    let file_name = format!(
        "{}.{}",
        sanitize_component(&playlist.name),
        profile.playlist_format.extension()
    );
    let path = folder.join(file_name);

    if path.exists() && !options.overwrite {
        log::info!("playlist {} exists, leaving it alone", path.to_string_lossy());
        return Ok(PlaylistWrite::Skipped(path));
    }

    fs::create_dir_all(&folder).map_err(|e| DeviceError::from_io(&folder, e))?;
    let contents = playlist::render(profile.playlist_format, lines);
    fs::write(&path, contents).map_err(|e| DeviceError::from_io(&path, e))?;
    log::debug!("wrote {} ({} entries)", path.to_string_lossy(), lines.len());
    Ok(PlaylistWrite::Written(path))
}

/// Writer for devices mounted as plain folders: Walkman, Zune, USB sticks
pub struct MassStorageWriter {
    root: PathBuf,
    profile: DeviceProfile,
}

impl MassStorageWriter {
    pub fn new(root: impl Into<PathBuf>, profile: DeviceProfile) -> Self {
        Self {
            root: root.into(),
            profile,
        }
    }

    fn location(&self, device_path: &str) -> String {
        match self.profile.path_strategy {
            PathStrategy::Relative => relative_location(&self.profile.playlist_folder, device_path),
            PathStrategy::RootRelative => format!("/{device_path}"),
            PathStrategy::Absolute => {
                let prefix = self.profile.path_prefix.as_deref().unwrap_or("");
                format!("{}/{device_path}", prefix.trim_end_matches('/'))
            }
        }
    }
}

impl DeviceWriter for MassStorageWriter {
    fn place_track(&mut self, lookup: &TrackLookup) -> Result<Placement, DeviceError> {
        let Some(file) = &lookup.file else {
            return Err(DeviceError::Internal(anyhow::anyhow!(
                "track {} has no library file to copy",
                lookup.track.id
            )));
        };
        let device_path = destination_for(&self.profile.music_folder, lookup);
        let dest = self.root.join(&device_path);

        if let Ok(meta) = fs::metadata(&dest)
            && meta.len() == file.size
        {
            return Ok(Placement::AlreadyThere(device_path));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| DeviceError::from_io(parent, e))?;
        }
        fs::copy(&file.path, &dest).map_err(|e| DeviceError::from_io(&dest, e))?;
        log::debug!("copied {} -> {device_path}", file.path.to_string_lossy());
        Ok(Placement::Copied(device_path))
    }

    fn write_playlist(
        &mut self,
        playlist: &Playlist,
        tracks: &[PlaylistTrack<'_>],
        options: &WriteOptions,
    ) -> Result<PlaylistWrite, DeviceError> {
        let lines = tracks
            .iter()
            .map(|t| PlaylistLine {
                location: self.location(t.device_path),
                title: display_title(t.lookup),
            })
            .collect::<Vec<_>>();
        write_playlist_file(&self.root, &self.profile, playlist, &lines, options)
    }

    fn mirror(&mut self, keep: &HashSet<String>) -> Result<Vec<String>, DeviceError> {
        let music = self.root.join(&self.profile.music_folder);
        if !music.is_dir() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        for entry in WalkDir::new(&music).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() || !is_music_file(entry.path()) {
                continue;
            }
            let device_path = device_relative(&self.root, entry.path());
            if keep.contains(&device_path) {
                continue;
            }
            fs::remove_file(entry.path()).map_err(|e| DeviceError::from_io(entry.path(), e))?;
            log::info!("mirror: removed {device_path}");
            removed.push(device_path);
        }
        Ok(removed)
    }
}

/// Writer for media-server exports: playlists only, pointing into the library
pub struct ExportWriter {
    root: PathBuf,
    profile: DeviceProfile,
}

impl ExportWriter {
    pub fn new(root: impl Into<PathBuf>, profile: DeviceProfile) -> Self {
        Self {
            root: root.into(),
            profile,
        }
    }
}

impl DeviceWriter for ExportWriter {
    fn place_track(&mut self, lookup: &TrackLookup) -> Result<Placement, DeviceError> {
        let Some(file) = &lookup.file else {
            return Err(DeviceError::Internal(anyhow::anyhow!(
                "track {} has no library file to reference",
                lookup.track.id
            )));
        };
        let location = match &self.profile.path_prefix {
            Some(prefix) => {
                let relative = device_relative(Path::new(""), &file.relative_path);
                format!("{}/{relative}", prefix.trim_end_matches('/'))
            }
            None => file.path.to_string_lossy().to_string(),
        };
        Ok(Placement::Referenced(location))
    }

    fn write_playlist(
        &mut self,
        playlist: &Playlist,
        tracks: &[PlaylistTrack<'_>],
        options: &WriteOptions,
    ) -> Result<PlaylistWrite, DeviceError> {
        let lines = tracks
            .iter()
            .map(|t| PlaylistLine {
                location: t.device_path.to_string(),
                title: display_title(t.lookup),
            })
            .collect::<Vec<_>>();
        write_playlist_file(&self.root, &self.profile, playlist, &lines, options)
    }

    fn mirror(&mut self, _keep: &HashSet<String>) -> Result<Vec<String>, DeviceError> {
        Ok(Vec::new())
    }
}
