use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{
    config::{self, Config, Location},
    device::{
        monitor::{ConnectionMonitor, MountMonitor, NoopMonitor},
        profile::{DeviceFamily, DeviceProfile, DeviceType, PathStrategy},
        scan::scan_device_for_paths,
        writer::{PlaylistWrite, WriteOptions, writer_for},
    },
    domain::hash::TrackId,
    playlist::{self, Playlist, PlaylistFormat},
    reconcile::{
        path_map::DeviceKeyMap,
        plan::{MissingChoice, SyncTarget, count_missing},
    },
    storage::{db::i64_seconds_to_local_time, operations::Storage, resolve_location},
    sync::{
        engine::{SyncEngine, SyncOutcome},
        presence::load_presence,
    },
};

#[derive(Parser)]
#[command(name = "decksync")]
#[command(version = "0.1")]
#[command(about = "Sync playlists from a local music library to portable players")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show how the library index differs from the file system
    Status,
    /// Index new and changed files, forget removed ones
    Update,
    /// List tracks in the library
    List {
        /// Print every indexed location of each track
        #[arg(short, long)]
        files: bool,
    },
    /// Manage sync target devices
    #[command(subcommand)]
    Device(DeviceCommand),
    /// Sync playlists or tracks to a device
    Sync {
        /// Device id
        id: String,
        #[command(flatten)]
        selection: Selection,
        /// What to do with tracks the device does not have yet; asks when omitted
        #[arg(long, value_enum)]
        on_missing: Option<OnMissing>,
        /// Replace playlist files that already exist on the device
        #[arg(long)]
        overwrite: bool,
        /// Delete music files on the device that no synced playlist references
        #[arg(long)]
        mirror: bool,
    },
}

#[derive(Subcommand)]
pub enum DeviceCommand {
    /// Register a device
    Add {
        id: String,
        /// Name shown in messages
        #[arg(long)]
        label: Option<String>,
        /// ipod, walkman, generic, zune or jellyfin
        #[arg(long = "type")]
        device_type: DeviceType,
        /// Mount point, or the path below the drive when --usb-label is given
        mount: PathBuf,
        /// Find the drive by its volume label instead of a fixed mount point
        #[arg(long)]
        usb_label: Option<String>,
        #[arg(long)]
        format: Option<PlaylistFormat>,
        #[arg(long)]
        music_folder: Option<String>,
        #[arg(long)]
        playlist_folder: Option<String>,
        /// relative, root-relative or absolute
        #[arg(long)]
        path_strategy: Option<PathStrategy>,
        #[arg(long)]
        path_prefix: Option<String>,
        /// iPod track list dump, relative to the mount
        #[arg(long)]
        track_dump: Option<String>,
    },
    /// List registered devices
    List,
    /// Show one device with what is known about its contents
    Show { id: String },
    /// Scan a mounted device for library tracks already on it
    Scan { id: String },
    /// Count tracks of a selection the device does not have
    Missing {
        id: String,
        #[command(flatten)]
        selection: Selection,
    },
}

/// Tracks to sync: playlist files and/or track ids
#[derive(Args)]
pub struct Selection {
    /// M3U/M3U8 playlist files from the library
    #[arg(long, num_args = 1..)]
    pub playlist: Vec<PathBuf>,
    /// Track ids (hex)
    #[arg(long, num_args = 1..)]
    pub tracks: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OnMissing {
    Sync,
    PlaylistOnly,
    Cancel,
}

impl From<OnMissing> for MissingChoice {
    fn from(value: OnMissing) -> Self {
        match value {
            OnMissing::Sync => MissingChoice::SyncMissing,
            OnMissing::PlaylistOnly => MissingChoice::PlaylistOnly,
            OnMissing::Cancel => MissingChoice::Cancel,
        }
    }
}

fn open_storage(cfg: &Config) -> anyhow::Result<Storage> {
    Storage::new(cfg.database.clone(), cfg.library_source.clone())
        .context("Failed to initialize storage")
}

/// Resolves the selection into sync targets, one per playlist file plus one
/// for loose track ids
fn build_targets(storage: &Storage, selection: &Selection) -> anyhow::Result<Vec<SyncTarget>> {
    if selection.playlist.is_empty() && selection.tracks.is_empty() {
        bail!("nothing selected, pass --playlist or --tracks");
    }

    let mut targets = Vec::new();
    for path in &selection.playlist {
        let mut ids = Vec::new();
        for entry in playlist::read_m3u(path)? {
            let entry = std::fs::canonicalize(&entry).unwrap_or(entry);
            match storage.track_id_for_path(&entry)? {
                Some(id) => ids.push(id),
                None => log::warn!(
                    "{} is not in the library, run \"update\" first",
                    entry.to_string_lossy()
                ),
            }
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Playlist".to_string());
        targets.push(target(storage, Playlist::new(&name, &name, ids))?);
    }

    if !selection.tracks.is_empty() {
        let ids = selection
            .tracks
            .iter()
            .map(|hex| TrackId::from_hex(hex))
            .collect::<anyhow::Result<Vec<_>>>()?;
        targets.push(target(storage, Playlist::from_selection("Selection", ids))?);
    }
    Ok(targets)
}

fn target(storage: &Storage, playlist: Playlist) -> anyhow::Result<SyncTarget> {
    let lookups = storage.lookups(&playlist.track_ids)?;
    let source_root = lookups
        .iter()
        .find_map(|l| l.file.as_ref().map(|f| f.root_id));
    Ok(SyncTarget {
        playlist,
        lookups,
        source_root,
    })
}

fn monitor_for(profile: &DeviceProfile, root: &Path) -> Arc<dyn ConnectionMonitor> {
    match profile.device_type.family() {
        DeviceFamily::Export => Arc::new(NoopMonitor),
        _ => Arc::new(MountMonitor::new(root)),
    }
}

fn ask_missing_choice(missing: usize) -> anyhow::Result<MissingChoice> {
    let stdin = io::stdin();
    loop {
        print!(
            "{missing} tracks are not on the device. [s]ync them, [p]laylist only, [c]ancel? "
        );
        io::stdout().flush()?;

        let mut answer = String::new();
        if stdin.lock().read_line(&mut answer)? == 0 {
            return Ok(MissingChoice::Cancel);
        }
        match answer.trim().to_lowercase().as_str() {
            "s" | "sync" => return Ok(MissingChoice::SyncMissing),
            "p" | "playlist" | "playlist-only" => return Ok(MissingChoice::PlaylistOnly),
            "c" | "cancel" | "" => return Ok(MissingChoice::Cancel),
            _ => println!("Please answer s, p or c."),
        }
    }
}

fn print_profile(profile: &DeviceProfile) -> anyhow::Result<()> {
    println!("{} ({})", profile.id, profile.label);
    println!("  type:            {}", profile.device_type);
    println!("  mount:           {}", profile.mount);
    println!("  music folder:    {}", profile.music_folder);
    println!("  playlist folder: {}", profile.playlist_folder);
    println!(
        "  playlists:       {} with {:?} paths",
        profile.playlist_format, profile.path_strategy
    );
    if let Some(prefix) = &profile.path_prefix {
        println!("  path prefix:     {prefix}");
    }
    if let Some(dump) = &profile.track_dump {
        println!("  track list:      {dump}");
    }
    match profile.last_synced_at {
        Some(at) => println!("  last synced:     {}", i64_seconds_to_local_time(at)?),
        None => println!("  last synced:     never"),
    }
    Ok(())
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::Config::load(&cli.config)?;

    match cli.command {
        Commands::Status => {
            let mut storage = open_storage(&cfg)?;
            let (fs_snapshot, db_snapshot, diff) = storage.status()?;

            println!("Filesystem contains {} music files", fs_snapshot.files.len());
            println!(
                "Database was updated {} and contains {} files",
                i64_seconds_to_local_time(db_snapshot.updated_at)?,
                db_snapshot.files.len()
            );
            if !diff.is_empty() {
                println!("The index is out of date. Run \"update\" to update the database:");
                for file in &diff.added {
                    println!("  [NEW]      {}", file.path.to_string_lossy());
                }
                for file in &diff.changed {
                    println!("  [CHANGED]  {}", file.path.to_string_lossy());
                }
                for path in &diff.removed {
                    println!("  [DELETED]  {}", path.to_string_lossy());
                }
            }
        }

        Commands::Update => {
            let mut storage = open_storage(&cfg)?;
            let report = storage.rescan_library()?;
            println!(
                "Database updated: {} new, {} changed, {} removed",
                report.added.len(),
                report.updated.len(),
                report.removed.len()
            );
            for file in &report.added {
                println!(
                    "    + {} at {}",
                    file.entry.track_id,
                    file.entry.path.to_string_lossy()
                );
            }
            if !report.failed.is_empty() {
                println!("Could not index {} files:", report.failed.len());
                for (path, reason) in &report.failed {
                    println!("    ! {}: {reason}", path.to_string_lossy());
                }
            }
        }

        Commands::List { files } => {
            let mut storage = open_storage(&cfg)?;
            for entry in storage.list_tracks()? {
                let meta = &entry.track.metadata;
                println!(
                    "{}  {} - {}",
                    entry.track.id.to_hex(),
                    meta.artist.as_deref().unwrap_or("?"),
                    meta.title.as_deref().unwrap_or("?")
                );
                if files {
                    for path in &entry.files {
                        println!("    - {}", path.to_string_lossy());
                    }
                }
            }
        }

        Commands::Device(command) => run_device(&cfg, command)?,

        Commands::Sync {
            id,
            selection,
            on_missing,
            overwrite,
            mirror,
        } => {
            let storage = open_storage(&cfg)?;
            let profile = storage.device_profile(&id)?;
            let targets = build_targets(&storage, &selection)?;
            let root = resolve_location(&profile.mount)?;

            let mut writer = writer_for(&root, &profile)?;
            let presence = load_presence(
                &profile,
                &root,
                &cfg.device_scan,
                cfg.library_source.content_hash_bytes,
                &targets,
            );
            let monitor = monitor_for(&profile, &root);

            let engine = SyncEngine::new(storage);
            let prepared = engine.prepare(profile, targets, presence, monitor.clone())?;
            let report = prepared.report();
            if !report.missing_metadata.is_empty() {
                println!(
                    "{} tracks have no file in the library and are skipped",
                    report.missing_metadata.len()
                );
            }

            let choice = match (prepared.needs_choice(), on_missing) {
                (_, Some(choice)) => Some(choice.into()),
                (true, None) => Some(ask_missing_choice(report.missing_count())?),
                (false, None) => None,
            };

            let options = WriteOptions { overwrite, mirror };
            match prepared.finish(choice, writer.as_mut(), &options)? {
                SyncOutcome::Cancelled => println!("Sync cancelled, nothing written."),
                SyncOutcome::Completed {
                    excluded,
                    report,
                    mirror_skipped,
                    ..
                } => {
                    println!(
                        "Copied {} tracks, {} were already there.",
                        report.copied, report.already_there
                    );
                    for written in &report.playlists {
                        match written {
                            PlaylistWrite::Written(path) => {
                                println!("  wrote {}", path.to_string_lossy())
                            }
                            PlaylistWrite::Skipped(path) => println!(
                                "  kept existing {} (use --overwrite to replace)",
                                path.to_string_lossy()
                            ),
                        }
                    }
                    if !excluded.is_empty() {
                        println!("{} tracks left out of the playlists", excluded.len());
                    }
                    for (id, reason) in &report.failed {
                        println!("  failed {id}: {reason}");
                    }
                    for path in &report.mirrored {
                        println!("  removed {path}");
                    }
                    if mirror_skipped {
                        println!(
                            "Not mirroring: some tracks could not be checked on the device."
                        );
                    }
                }
            }
            if monitor.disconnected() {
                println!("Warning: the device was disconnected, check the copied files.");
            }
        }
    }
    Ok(())
}

fn run_device(cfg: &Config, command: DeviceCommand) -> anyhow::Result<()> {
    let mut storage = open_storage(cfg)?;

    match command {
        DeviceCommand::Add {
            id,
            label,
            device_type,
            mount,
            usb_label,
            format,
            music_folder,
            playlist_folder,
            path_strategy,
            path_prefix,
            track_dump,
        } => {
            let location = match usb_label {
                Some(label) => Location::Usb { label, path: mount },
                None => Location::File { path: mount },
            };
            let label = label.unwrap_or_else(|| id.clone());
            let mut profile = DeviceProfile::new(&id, &label, device_type, location);
            if let Some(format) = format {
                profile.playlist_format = format;
            }
            if let Some(folder) = music_folder {
                profile.music_folder = folder;
            }
            if let Some(folder) = playlist_folder {
                profile.playlist_folder = folder;
            }
            if let Some(strategy) = path_strategy {
                profile.path_strategy = strategy;
            }
            profile.path_prefix = path_prefix;
            profile.track_dump = track_dump;

            storage.save_device_profile(&profile)?;
            println!("Saved device:");
            print_profile(&profile)?;
        }

        DeviceCommand::List => {
            let profiles = storage.device_profiles()?;
            if profiles.is_empty() {
                println!("No devices yet, add one with \"device add\"");
            }
            for profile in profiles {
                println!(
                    "{:<16} {:<10} {}",
                    profile.id, profile.device_type, profile.mount
                );
            }
        }

        DeviceCommand::Show { id } => {
            let profile = storage.device_profile(&id)?;
            print_profile(&profile)?;
            println!("  synced tracks:   {}", storage.synced_tracks(&id)?.len());
            match storage.load_path_cache(&id)? {
                Some(map) => println!("  scanned paths:   {}", map.iter().count()),
                None => println!("  scanned paths:   never scanned"),
            }
        }

        DeviceCommand::Scan { id } => {
            let profile = storage.device_profile(&id)?;
            if profile.device_type.family() != DeviceFamily::MassStorage {
                bail!("{} devices are not scanned for files", profile.device_type);
            }
            let root = resolve_location(&profile.mount)?;

            let ids = storage
                .list_tracks()?
                .into_iter()
                .map(|t| t.track.id)
                .collect::<Vec<_>>();
            let lookups = storage.lookups(&ids)?;
            let (keys, _) = DeviceKeyMap::build(&lookups);

            let map = scan_device_for_paths(
                &root,
                &keys,
                &cfg.device_scan,
                cfg.library_source.content_hash_bytes,
            )?;
            let matched = lookups
                .iter()
                .filter_map(|l| keys.keys_for(&l.track.id))
                .filter(|k| map.resolve(k).is_some())
                .count();
            storage.save_path_cache(&id, &map)?;

            println!(
                "Found {} music files on {}, {} of them are library tracks",
                map.entries.len(),
                profile.label,
                matched
            );
        }

        DeviceCommand::Missing { id, selection } => {
            let profile = storage.device_profile(&id)?;
            let targets = build_targets(&storage, &selection)?;
            let root = resolve_location(&profile.mount)?;
            let presence = load_presence(
                &profile,
                &root,
                &cfg.device_scan,
                cfg.library_source.content_hash_bytes,
                &targets,
            );
            let synced = storage.synced_tracks(&id)?;

            let report = count_missing(&targets, &presence.classifier(), &synced);
            println!(
                "{} missing, {} already synced, {} undecided, {} without library file",
                report.missing_count(),
                report.already_synced,
                report.unknown,
                report.missing_metadata.len()
            );
            for target in &targets {
                for lookup in &target.lookups {
                    if report.presence(&lookup.track.id).is_absent() {
                        let meta = &lookup.track.metadata;
                        println!(
                            "  [MISSING]  {} - {}",
                            meta.artist.as_deref().unwrap_or("?"),
                            meta.title.as_deref().unwrap_or("?")
                        );
                    }
                }
            }
        }
    }
    Ok(())
}
