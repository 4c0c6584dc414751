//! Running a sync against one device, start to finish.

use thiserror::Error;

use crate::{device::error::DeviceError, reconcile::plan::PhaseError, storage::error::StorageError};

pub mod engine;
pub mod presence;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync to device '{0}' is already running")]
    Busy(String),

    #[error("{missing} tracks are not on the device yet, choose how to continue")]
    ChoiceRequired { missing: usize },

    #[error(transparent)]
    Phase(#[from] PhaseError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}
