use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 100;

/// Hyper-parameters recorded alongside the trained classifier.
///
/// Resolved once when the bundle is loaded. Keys the server does not use are
/// ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    #[serde(default = "default_max_sequence_length")]
    pub max_sequence_length: usize,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "default_lstm_units")]
    pub lstm_units: usize,
    /// Defaults to the tokenizer's vocabulary size when absent.
    #[serde(default)]
    pub vocab_size: Option<usize>,
}

fn default_max_sequence_length() -> usize {
    DEFAULT_MAX_SEQUENCE_LENGTH
}

fn default_embedding_dim() -> usize {
    100
}

fn default_lstm_units() -> usize {
    64
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            max_sequence_length: default_max_sequence_length(),
            embedding_dim: default_embedding_dim(),
            lstm_units: default_lstm_units(),
            vocab_size: None,
        }
    }
}

impl ModelParams {
    pub fn from_slice(artifact: &str, bytes: &[u8]) -> Result<Self, LoadError> {
        let params: Self =
            serde_json::from_slice(bytes).map_err(|e| LoadError::deserialization(artifact, e))?;

        for (key, value) in [
            ("max_sequence_length", params.max_sequence_length),
            ("embedding_dim", params.embedding_dim),
            ("lstm_units", params.lstm_units),
        ] {
            if value == 0 {
                return Err(LoadError::deserialization(
                    artifact,
                    format!("{key} must be greater than zero"),
                ));
            }
        }
        Ok(params)
    }

    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let artifact = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|e| LoadError::deserialization(&artifact, e))?;
        Self::from_slice(&artifact, &bytes)
    }
}
