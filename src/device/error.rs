use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("{0} devices are not supported for this operation")]
    Unsupported(String),

    #[error("device folder {0} is not available")]
    NotMounted(PathBuf),

    #[error("permission denied on {0}, re-select the device folder")]
    PermissionDenied(PathBuf),

    #[error("device is read-only ({0}), check its lock switch or mount options")]
    ReadOnly(PathBuf),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read device track list: {0}")]
    TrackList(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl DeviceError {
    /// Sorts an i/o failure into the categories users can act on
    pub fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied(path),
            io::ErrorKind::ReadOnlyFilesystem => DeviceError::ReadOnly(path),
            _ => DeviceError::Io { path, source: err },
        }
    }

    /// Errors that make every further write pointless
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DeviceError::PermissionDenied(_) | DeviceError::ReadOnly(_) | DeviceError::NotMounted(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let ro = DeviceError::from_io("/m", io::Error::from(io::ErrorKind::ReadOnlyFilesystem));
        assert!(matches!(ro, DeviceError::ReadOnly(_)));
        assert!(ro.is_fatal());

        let denied = DeviceError::from_io("/m", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(denied, DeviceError::PermissionDenied(_)));

        let other = DeviceError::from_io("/m", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(other, DeviceError::Io { .. }));
        assert!(!other.is_fatal());
    }
}
