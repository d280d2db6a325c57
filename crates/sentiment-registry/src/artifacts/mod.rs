mod location;
mod manifest;
mod store;

use std::path::PathBuf;

use crate::api::RegistryError;

pub use location::ArtifactLocation;
pub use manifest::{FileDigest, MANIFEST_FILE, Manifest};
pub use store::{ArtifactStore, Provisioned, artifacts_present};

/// The role an artifact plays in the served model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ArtifactKind {
    Parameters,
    PreprocessDescriptor,
    Tokenizer,
    ClassifierWeights,
}

/// One file produced by a training run, addressed relative to the run's
/// artifact root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub kind: ArtifactKind,
    pub logical_name: &'static str,
    pub remote_relative_path: &'static str,
}

impl ArtifactSpec {
    pub const fn new(
        kind: ArtifactKind,
        logical_name: &'static str,
        remote_relative_path: &'static str,
    ) -> Self {
        Self {
            kind,
            logical_name,
            remote_relative_path,
        }
    }

    /// Name of the file once copied into the local model directory.
    pub fn file_name(&self) -> &'static str {
        match self.remote_relative_path.rsplit_once('/') {
            Some((_, name)) => name,
            None => self.remote_relative_path,
        }
    }
}

/// Every artifact the server needs before the model can be loaded.
pub static REQUIRED_ARTIFACTS: [ArtifactSpec; 4] = [
    ArtifactSpec::new(
        ArtifactKind::Parameters,
        "parameters",
        "local_artifacts/parameters.json",
    ),
    ArtifactSpec::new(
        ArtifactKind::PreprocessDescriptor,
        "preprocess_function",
        "local_artifacts/preprocess_function.dill",
    ),
    ArtifactSpec::new(
        ArtifactKind::Tokenizer,
        "tokenizer",
        "local_artifacts/tokenizer.json",
    ),
    ArtifactSpec::new(
        ArtifactKind::ClassifierWeights,
        "classifier",
        "local_artifacts/classifier.mpk",
    ),
];

#[derive(Debug, thiserror::Error)]
pub enum ArtifactFetchError {
    #[error("Failed to resolve the artifact location of run {run_id}: {source}")]
    Resolve {
        run_id: String,
        #[source]
        source: RegistryError,
    },
    #[error("Failed to fetch artifact {name} from {location}: {source}")]
    Fetch {
        name: String,
        location: String,
        #[source]
        source: RegistryError,
    },
    #[error("Unsupported artifact URI '{0}'")]
    UnsupportedScheme(String),
    #[error("Filesystem error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
