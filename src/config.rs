use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub database: Database,
    pub library_source: LibrarySource,
    #[serde(default)]
    pub device_scan: DeviceScan,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.to_string_lossy()))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }
}

/// A place on disk, either fixed or on a removable drive found by its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Usb { label: String, path: PathBuf },
    File { path: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Database {
    InMemory,
    OnDisk { location: Location },
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibrarySource {
    pub roots: Vec<Location>,
    pub follow_symlinks: bool,
    #[serde(default)]
    pub ignored_dirs: Vec<PathBuf>,
    /// bytes read for the prefix content hash of each file.
    /// Device scans hash the same prefix, or content matching never hits.
    #[serde(default = "default_content_hash_bytes")]
    pub content_hash_bytes: u64,
}

impl Default for LibrarySource {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            follow_symlinks: false,
            ignored_dirs: Vec::new(),
            content_hash_bytes: default_content_hash_bytes(),
        }
    }
}

/// How mounted devices are walked when detecting existing tracks
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DeviceScan {
    #[serde(default)]
    pub follow_symlinks: bool,
    /// match scanned device files back to library tracks
    #[serde(default = "default_true")]
    pub path_detection: bool,
}

impl Default for DeviceScan {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            path_detection: true,
        }
    }
}

fn default_content_hash_bytes() -> u64 {
    256 * 1024
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_config_toml() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[database]
kind = "in_memory"

[library_source]
roots = [{ path = "/home/user/Music" }]
follow_symlinks = true
ignored_dirs = ['C:\Users\user\Music\Sample pack']
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        assert_eq!(cfg.version, 1);
        assert!(matches!(cfg.database, Database::InMemory));
        assert_eq!(
            cfg.library_source.roots,
            vec![Location::File {
                path: PathBuf::from("/home/user/Music")
            }]
        );
        assert!(cfg.library_source.follow_symlinks);
        assert_eq!(cfg.library_source.content_hash_bytes, 256 * 1024);

        // section omitted entirely
        assert!(cfg.device_scan.path_detection);
        assert!(!cfg.device_scan.follow_symlinks);

        Ok(())
    }

    #[test]
    fn test_parse_usb_database_and_device_scan() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[database]
kind = "on_disk"
location = { label = "STICK", path = "decksync.db" }

[library_source]
roots = [{ path = "/music" }, { label = "ARCHIVE", path = "flac" }]
follow_symlinks = false
content_hash_bytes = 4096

[device_scan]
path_detection = false
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        match cfg.database {
            Database::OnDisk { location } => assert_eq!(
                location,
                Location::Usb {
                    label: "STICK".into(),
                    path: PathBuf::from("decksync.db")
                }
            ),
            Database::InMemory => panic!("expected on-disk database"),
        }
        assert_eq!(
            cfg.library_source.roots[1],
            Location::Usb {
                label: "ARCHIVE".into(),
                path: PathBuf::from("flac")
            }
        );
        assert_eq!(cfg.library_source.content_hash_bytes, 4096);
        assert!(!cfg.device_scan.path_detection);

        Ok(())
    }

    #[test]
    fn test_hash_length_is_not_a_device_setting() {
        let toml_str = r#"
version = 1

[database]
kind = "in_memory"

[library_source]
roots = []
follow_symlinks = false

[device_scan]
content_hash_bytes = 4096
"#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }
}
