//! The sync driver.
//!
//! A sync runs in two steps so a caller can ask the user before writing:
//! [`SyncEngine::prepare`] counts what is missing, [`PreparedSync::finish`]
//! plans and writes. Between the two the device is locked against other
//! syncs and its connection monitor is paused.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    device::{
        monitor::{ConnectionMonitor, MonitorPause},
        profile::DeviceProfile,
        writer::{DeviceWriter, WriteOptions, WriteReport},
    },
    domain::hash::TrackId,
    reconcile::{
        classify::UsbScanState,
        index::IndexState,
        plan::{MissingChoice, MissingReport, SyncPhase, SyncTarget, count_missing, plan_sync},
    },
    storage::{db::now_secs, operations::Storage},
    sync::{SyncError, presence::DevicePresence},
};

fn lock_storage(storage: &Mutex<Storage>) -> Result<MutexGuard<'_, Storage>, SyncError> {
    storage
        .lock()
        .map_err(|_| SyncError::Internal("storage lock poisoned".to_string()))
}

/// Held while a sync to one device is in flight
struct DeviceLock {
    locks: Arc<Mutex<HashSet<String>>>,
    device_id: String,
}

impl Drop for DeviceLock {
    fn drop(&mut self) {
        if let Ok(mut held) = self.locks.lock() {
            held.remove(&self.device_id);
        }
    }
}

pub struct SyncEngine {
    storage: Arc<Mutex<Storage>>,
    locks: Arc<Mutex<HashSet<String>>>,
}

impl SyncEngine {
    pub fn new(storage: Storage) -> Self {
        Self::from_shared(Arc::new(Mutex::new(storage)))
    }

    pub fn from_shared(storage: Arc<Mutex<Storage>>) -> Self {
        Self {
            storage,
            locks: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn storage(&self) -> Arc<Mutex<Storage>> {
        Arc::clone(&self.storage)
    }

    pub fn is_busy(&self, device_id: &str) -> bool {
        self.locks
            .lock()
            .map(|held| held.contains(device_id))
            .unwrap_or(false)
    }

    fn lock_device(&self, device_id: &str) -> Result<DeviceLock, SyncError> {
        let mut held = self
            .locks
            .lock()
            .map_err(|_| SyncError::Internal("device lock poisoned".to_string()))?;
        if !held.insert(device_id.to_string()) {
            return Err(SyncError::Busy(device_id.to_string()));
        }
        Ok(DeviceLock {
            locks: Arc::clone(&self.locks),
            device_id: device_id.to_string(),
        })
    }

    /// Locks the device and counts the tracks it is missing.
    ///
    /// Tracks recorded as synced to this device by an earlier run count as
    /// present without consulting `presence`.
    pub fn prepare(
        &self,
        profile: DeviceProfile,
        targets: Vec<SyncTarget>,
        presence: DevicePresence,
        monitor: Arc<dyn ConnectionMonitor>,
    ) -> Result<PreparedSync, SyncError> {
        let lock = self.lock_device(&profile.id)?;
        let pause = MonitorPause::new(monitor);
        let phase = SyncPhase::Idle.start()?;

        let synced = lock_storage(&self.storage)?.synced_tracks(&profile.id)?;
        let report = count_missing(&targets, &presence.classifier(), &synced);

        log::info!(
            "{}: {} playlists, {} missing, {} already synced, {} undecided",
            profile.label,
            targets.len(),
            report.missing_count(),
            report.already_synced,
            report.unknown
        );
        if !report.missing_metadata.is_empty() {
            log::warn!(
                "{} tracks have no file in the library and will be left out",
                report.missing_metadata.len()
            );
        }

        let phase = phase.counted(report.missing_count())?;

        Ok(PreparedSync {
            storage: Arc::clone(&self.storage),
            profile,
            targets,
            presence,
            report,
            phase,
            _pause: pause,
            _lock: lock,
        })
    }
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// nothing was written
    Cancelled,
    Completed {
        choice: MissingChoice,
        /// tracks left out of the written playlists
        excluded: Vec<TrackId>,
        report: WriteReport,
        /// `--mirror` was asked for but undecided tracks kept the device untouched
        mirror_skipped: bool,
    },
}

/// A counted sync waiting to be written. Dropping it releases the device.
pub struct PreparedSync {
    storage: Arc<Mutex<Storage>>,
    profile: DeviceProfile,
    targets: Vec<SyncTarget>,
    presence: DevicePresence,
    report: MissingReport,
    phase: SyncPhase,
    _pause: MonitorPause,
    _lock: DeviceLock,
}

impl PreparedSync {
    pub fn report(&self) -> &MissingReport {
        &self.report
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// The user has to choose before [`finish`](Self::finish) writes anything.
    pub fn needs_choice(&self) -> bool {
        self.report.needs_choice()
    }

    /// Mirroring deletes what the playlists do not reference, so every
    /// track must have been decided against a completed read of the device.
    pub fn can_mirror(&self) -> bool {
        let device_read = match &self.presence {
            DevicePresence::Usb { state, .. } => matches!(state, UsbScanState::Done(_)),
            DevicePresence::Ipod(state) => matches!(state, IndexState::Ready(_)),
            DevicePresence::Library => true,
        };
        device_read && self.report.unknown == 0
    }

    /// Plans and writes the sync, then records the result.
    ///
    /// `choice` is required when tracks are missing and ignored otherwise,
    /// except that [`MissingChoice::Cancel`] always stops before writing.
    pub fn finish(
        mut self,
        choice: Option<MissingChoice>,
        writer: &mut dyn DeviceWriter,
        options: &WriteOptions,
    ) -> Result<SyncOutcome, SyncError> {
        let choice = match self.phase {
            SyncPhase::AwaitingChoice { missing } => {
                let choice = choice.ok_or(SyncError::ChoiceRequired { missing })?;
                self.phase = self.phase.choose(choice)?;
                choice
            }
            _ => choice.unwrap_or(MissingChoice::SyncMissing),
        };
        if choice == MissingChoice::Cancel {
            log::info!("sync to {} cancelled", self.profile.label);
            return Ok(SyncOutcome::Cancelled);
        }

        let mut options = *options;
        let mirror_skipped = options.mirror && !self.can_mirror();
        if mirror_skipped {
            log::warn!(
                "{}: {} tracks could not be checked on the device, not mirroring",
                self.profile.label,
                self.report.unknown
            );
            options.mirror = false;
        }

        let plan = plan_sync(&self.targets, &self.report, choice);
        log::info!(
            "writing to {}: {} tracks to copy, {} playlists",
            self.profile.label,
            plan.copies.len(),
            plan.playlists.len()
        );
        let report = writer.write(&plan, &options)?;

        {
            let mut storage = lock_storage(&self.storage)?;
            storage.record_synced(&self.profile.id, &report.on_device)?;
            if !report.mirrored.is_empty() {
                let forgotten = storage.forget_synced_paths(&self.profile.id, &report.mirrored)?;
                log::debug!("forgot {forgotten} mapping rows of mirrored files");
            }

            self.profile.last_synced_at = Some(now_secs()?);
            storage.save_device_profile(&self.profile)?;

            if let DevicePresence::Usb {
                state: UsbScanState::Done(map),
                ..
            } = &self.presence
            {
                storage.save_path_cache(&self.profile.id, map)?;
            }
        }

        self.phase = self.phase.finish()?;
        log::info!(
            "sync to {} done: {} copied, {} already there, {} failed",
            self.profile.label,
            report.copied,
            report.already_there,
            report.failed.len()
        );

        Ok(SyncOutcome::Completed {
            choice,
            excluded: plan.excluded,
            report,
            mirror_skipped,
        })
    }
}
