//! The library database and the file system it indexes

use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use anyhow::{Context, bail};

use crate::{config::Location, storage::usb::find_mount_by_label};

pub mod db;
mod devices;
pub mod error;
pub mod fs;
pub mod operations;
pub(crate) mod schema;
pub mod usb;

/// Turns a configured location into a path on this machine.
///
/// USB locations are looked up by volume label each time, since drive
/// letters and mount points change between plug-ins.
pub fn resolve_location(location: &Location) -> anyhow::Result<PathBuf> {
    match location {
        Location::File { path } => Ok(path.clone()),
        Location::Usb { label, path } => {
            let mount = find_mount_by_label(label)
                .with_context(|| format!("no drive labelled '{label}' is plugged in"))?;
            if !mount.is_dir() {
                bail!("drive '{label}' is listed at {} but not readable", mount.to_string_lossy());
            }
            Ok(mount.join(path))
        }
    }
}

impl Location {
    pub fn from_path<P: AsRef<Path>>(p: P) -> Self {
        Self::File {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::File { path } => f.write_str(&path.to_string_lossy()),
            Location::Usb { label, path } if path.as_os_str().is_empty() => write!(f, "[{label}]"),
            Location::Usb { label, path } => write!(f, "[{label}]/{}", path.to_string_lossy()),
        }
    }
}
