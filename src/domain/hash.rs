use std::{
    cmp::Ordering,
    fmt::Display,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::Context;
use blake3::Hash;

/// Represents the track ID.
///
/// One can get track ID from a music file,
/// and then use it to search for that file in the filesystem.
/// The ID is the hash of the whole file, so it survives renames and moves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackId(pub Hash);

// blake3::Hash has no ordering of its own; listings sort by the raw digest.
impl Ord for TrackId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}

impl PartialOrd for TrackId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TrackId {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    pub fn from_hex(hex: &str) -> anyhow::Result<Self> {
        let hash = Hash::from_hex(hex.trim()).with_context(|| format!("invalid track id '{hex}'"))?;
        Ok(Self(hash))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
        let mut hasher = blake3::Hasher::new();
        hasher
            .update_reader(BufReader::new(file))
            .with_context(|| format!("failed to hash {}", path.to_string_lossy()))?;
        Ok(Self(hasher.finalize()))
    }
}

impl Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Cheap fingerprint of a file: hash of its first bytes plus its length.
///
/// Two files with equal prefixes and sizes are treated as the same content
/// by device path detection. Use [`TrackId`] when certainty matters.
pub fn prefix_hash(path: &Path, limit: u64) -> anyhow::Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    let size = file.metadata()?.len();

    let mut buf = Vec::new();
    BufReader::new(file)
        .take(limit)
        .read_to_end(&mut buf)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(&buf);
    hasher.update(&size.to_le_bytes());
    Ok(hasher.finalize().to_hex().to_string())
}
