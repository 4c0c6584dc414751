//! Deciding what a sync will do before anything touches the device.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::{
    domain::{hash::TrackId, track::TrackLookup},
    playlist::Playlist,
    reconcile::classify::{Classifier, Presence},
};

/// A playlist and its resolved tracks: the unit of one device write
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub playlist: Playlist,
    pub lookups: Vec<TrackLookup>,
    /// index of the library root holding the first resolved track, kept for
    /// reporting; writers read each track's own root from its file entry
    pub source_root: Option<u32>,
}

/// What the user decides when tracks are missing on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingChoice {
    /// copy the absent tracks and write the playlists
    SyncMissing,
    /// write playlists referencing only tracks already on the device
    PlaylistOnly,
    Cancel,
}

#[derive(Debug, Default, Clone)]
pub struct MissingReport {
    /// tracks classified absent, each counted once across all targets
    pub missing: Vec<TrackId>,
    /// tracks without file metadata, a separate failure class
    pub missing_metadata: Vec<TrackId>,
    /// tracks skipped because the mapping table says they were synced before
    pub already_synced: usize,
    pub unknown: usize,
    presence: HashMap<TrackId, Presence>,
    device_paths: HashMap<TrackId, String>,
}

impl MissingReport {
    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }

    /// The user has to pick a [`MissingChoice`] before anything is written.
    pub fn needs_choice(&self) -> bool {
        !self.missing.is_empty()
    }

    pub fn presence(&self, track: &TrackId) -> Presence {
        self.presence
            .get(track)
            .copied()
            .unwrap_or(Presence::Unknown)
    }

    pub fn device_path(&self, track: &TrackId) -> Option<&str> {
        self.device_paths.get(track).map(String::as_str)
    }
}

/// Classifies every track of every target once.
///
/// `synced` maps tracks recorded in the device mapping table to their path
/// on the device; those count as present without asking the classifier.
pub fn count_missing(
    targets: &[SyncTarget],
    classifier: &Classifier<'_>,
    synced: &HashMap<TrackId, String>,
) -> MissingReport {
    let mut report = MissingReport::default();
    let mut seen = HashSet::new();

    for lookup in targets.iter().flat_map(|t| t.lookups.iter()) {
        let id = &lookup.track.id;
        if !seen.insert(id.clone()) {
            continue;
        }
        if lookup.file.is_none() {
            report.missing_metadata.push(id.clone());
            continue;
        }
        if let Some(path) = synced.get(id) {
            report.already_synced += 1;
            report.presence.insert(id.clone(), Presence::Present);
            report.device_paths.insert(id.clone(), path.clone());
            continue;
        }

        let presence = classifier.classify(lookup);
        match presence {
            Presence::Absent => report.missing.push(id.clone()),
            Presence::Unknown => report.unknown += 1,
            Presence::Present => {
                if let Some(path) = classifier.device_path(lookup) {
                    report.device_paths.insert(id.clone(), path);
                }
            }
        }
        report.presence.insert(id.clone(), presence);
    }

    report
}

/// A track as it will appear in a written playlist
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub lookup: TrackLookup,
    /// known location on the device; `None` until the writer places it
    pub device_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlaylistPlan {
    pub playlist: Playlist,
    pub source_root: Option<u32>,
    pub entries: Vec<PlanEntry>,
}

#[derive(Debug, Default, Clone)]
pub struct SyncPlan {
    /// playlists in target order
    pub playlists: Vec<PlaylistPlan>,
    /// tracks to copy, each once, in order of first appearance
    pub copies: Vec<TrackLookup>,
    /// tracks left out of the written playlists
    pub excluded: Vec<TrackId>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty() && self.copies.is_empty()
    }
}

/// Turns a report and the user's choice into concrete work.
///
/// Without missing tracks there is nothing to choose and the caller passes
/// [`MissingChoice::SyncMissing`]. Undecided tracks are copied in that mode:
/// the writer skips files that already exist at their destination.
pub fn plan_sync(targets: &[SyncTarget], report: &MissingReport, choice: MissingChoice) -> SyncPlan {
    if choice == MissingChoice::Cancel {
        return SyncPlan::default();
    }

    let mut plan = SyncPlan::default();
    let mut queued = HashSet::new();
    let mut excluded = HashSet::new();

    for target in targets {
        let mut entries = Vec::with_capacity(target.lookups.len());

        for lookup in &target.lookups {
            let id = &lookup.track.id;
            if lookup.file.is_none() {
                if excluded.insert(id.clone()) {
                    plan.excluded.push(id.clone());
                }
                continue;
            }

            let presence = report.presence(id);
            let keep = match choice {
                MissingChoice::SyncMissing => true,
                MissingChoice::PlaylistOnly => presence.is_present(),
                MissingChoice::Cancel => false,
            };
            if !keep {
                if excluded.insert(id.clone()) {
                    plan.excluded.push(id.clone());
                }
                continue;
            }

            if !presence.is_present() && queued.insert(id.clone()) {
                plan.copies.push(lookup.clone());
            }
            entries.push(PlanEntry {
                lookup: lookup.clone(),
                device_path: report.device_path(id).map(str::to_string),
            });
        }

        plan.playlists.push(PlaylistPlan {
            playlist: target.playlist.clone(),
            source_root: target.source_root,
            entries,
        });
    }

    plan
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot {event} while {from}")]
pub struct PhaseError {
    pub from: &'static str,
    pub event: &'static str,
}

/// The states a sync passes through.
///
/// `Idle → Preparing → AwaitingChoice → Writing → Idle`, skipping
/// `AwaitingChoice` when nothing is missing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Idle,
    Preparing,
    AwaitingChoice {
        missing: usize,
    },
    Writing,
}

impl SyncPhase {
    fn name(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Preparing => "preparing",
            SyncPhase::AwaitingChoice { .. } => "awaiting a choice",
            SyncPhase::Writing => "writing",
        }
    }

    fn invalid(self, event: &'static str) -> PhaseError {
        PhaseError {
            from: self.name(),
            event,
        }
    }

    pub fn start(self) -> Result<Self, PhaseError> {
        match self {
            SyncPhase::Idle => Ok(SyncPhase::Preparing),
            other => Err(other.invalid("start")),
        }
    }

    pub fn counted(self, missing: usize) -> Result<Self, PhaseError> {
        match self {
            SyncPhase::Preparing if missing > 0 => Ok(SyncPhase::AwaitingChoice { missing }),
            SyncPhase::Preparing => Ok(SyncPhase::Writing),
            other => Err(other.invalid("count missing tracks")),
        }
    }

    pub fn choose(self, choice: MissingChoice) -> Result<Self, PhaseError> {
        match (self, choice) {
            (SyncPhase::AwaitingChoice { .. }, MissingChoice::Cancel) => Ok(SyncPhase::Idle),
            (SyncPhase::AwaitingChoice { .. }, _) => Ok(SyncPhase::Writing),
            (other, _) => Err(other.invalid("choose")),
        }
    }

    pub fn finish(self) -> Result<Self, PhaseError> {
        match self {
            SyncPhase::Writing => Ok(SyncPhase::Idle),
            other => Err(other.invalid("finish")),
        }
    }
}
