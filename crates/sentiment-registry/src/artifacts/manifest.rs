use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileDigest {
    pub sha256: String,
    pub size: u64,
}

/// Checksums of a provisioned artifact set.
///
/// It is written before the files are moved into place, so it always
/// describes the set being installed and a half swapped directory fails
/// [`Manifest::matches`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub run_id: String,
    pub files: BTreeMap<String, FileDigest>,
}

impl Manifest {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, name: &str, path: &Path) -> io::Result<()> {
        let (sha256, size) = sha256_and_size(path)?;
        self.files.insert(name.to_string(), FileDigest { sha256, size });
        Ok(())
    }

    /// Read the manifest of `dir`, if there is one.
    pub fn read(dir: &Path) -> io::Result<Option<Self>> {
        let bytes = match fs::read(dir.join(MANIFEST_FILE)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))
    }

    /// Write the manifest next to the artifacts it describes.
    pub fn write(&self, dir: &Path) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        let staged = dir.join(format!(".{MANIFEST_FILE}.tmp"));
        fs::write(&staged, json)?;
        fs::rename(staged, dir.join(MANIFEST_FILE))
    }

    /// Whether every named file in `dir` matches its recorded digest.
    pub fn matches<'a>(&self, dir: &Path, names: impl IntoIterator<Item = &'a str>) -> bool {
        names.into_iter().all(|name| {
            let Some(expected) = self.files.get(name) else {
                return false;
            };
            match sha256_and_size(&dir.join(name)) {
                Ok((sha256, size)) => sha256 == expected.sha256 && size == expected.size,
                Err(_) => false,
            }
        })
    }
}

pub(crate) fn sha256_and_size(path: &Path) -> io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher)?;
    let digest = hasher.finalize();
    Ok((format!("{digest:x}"), size))
}
