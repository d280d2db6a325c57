use std::path::PathBuf;

use thiserror::Error;

use crate::lifecycle::ReadinessState;

/// Failure to assemble a [`ModelBundle`](crate::ModelBundle) from local artifacts.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Required artifact '{name}' not found at {}", path.display())]
    ArtifactMissing { name: String, path: PathBuf },
    #[error("Failed to deserialize artifact '{artifact}': {reason}")]
    Deserialization { artifact: String, reason: String },
    #[error("Failed to initialize the numeric backend: {0}")]
    Backend(String),
}

impl LoadError {
    pub(crate) fn deserialization(artifact: &str, reason: impl ToString) -> Self {
        LoadError::Deserialization {
            artifact: artifact.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failure while running a batch through the bundle. The whole batch is lost.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InferenceError {
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Numeric backend error: {0}")]
    NumericBackend(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Le modèle n'est pas encore chargé. Veuillez réessayer plus tard.")]
pub struct NotReadyError {
    pub state: ReadinessState,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Artifact provisioning failed: {0}")]
    Provisioning(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Model loading failed: {0}")]
    Load(#[from] LoadError),
}
