mod host;
mod model;

use burn::prelude::Backend;
use serde::Serialize;

pub use host::{ModelAccessor, ModelHost};
pub use model::{ClassifierArtifacts, Init, TextClassifier, TextClassifierConfig};

use crate::error::{InferenceError, LoadError};

/// CPU backend the server runs on.
pub type InferenceBackend = burn::backend::NdArray;

/// A row-major batch of equal-length token id sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBatch {
    ids: Vec<i64>,
    rows: usize,
    seq_len: usize,
}

impl TokenBatch {
    pub fn new(ids: Vec<i64>, rows: usize, seq_len: usize) -> Result<Self, InferenceError> {
        if ids.len() != rows * seq_len {
            return Err(InferenceError::Encoding(format!(
                "batch of {rows}x{seq_len} cannot hold {} ids",
                ids.len()
            )));
        }
        Ok(Self { ids, rows, seq_len })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn row(&self, index: usize) -> Option<&[i64]> {
        let start = index.checked_mul(self.seq_len)?;
        self.ids.get(start..start + self.seq_len)
    }

    pub fn max_id(&self) -> Option<i64> {
        self.ids.iter().copied().max()
    }

    pub fn into_ids(self) -> Vec<i64> {
        self.ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendInfo {
    pub backend: String,
    pub device: String,
}

/// The numeric model: padded token ids in, one probability per row out.
pub trait Classifier: Send + Sync {
    fn predict(&self, batch: TokenBatch) -> Result<Vec<f32>, InferenceError>;

    /// Exclusive upper bound on accepted token ids, when the model has one.
    fn vocab_size(&self) -> Option<usize> {
        None
    }

    fn backend(&self) -> BackendInfo;

    /// Free the model's resources. Called once at shutdown.
    fn release(self: Box<Self>) {}
}

/// [`TextClassifier`] hosted on its own thread.
pub struct BurnClassifier<B: Backend> {
    host: ModelHost<TextClassifier<B>>,
    device: B::Device,
    vocab_size: usize,
}

impl<B: Backend> BurnClassifier<B> {
    pub fn new(
        model: TextClassifier<B>,
        vocab_size: usize,
        device: B::Device,
    ) -> Result<Self, LoadError> {
        let host = ModelHost::spawn("classifier", model)
            .map_err(|e| LoadError::Backend(format!("failed to start the model thread: {e}")))?;
        Ok(Self {
            host,
            device,
            vocab_size,
        })
    }
}

impl<B: Backend> Init<B, ClassifierArtifacts> for BurnClassifier<B> {
    type Error = LoadError;

    fn init(args: &ClassifierArtifacts, device: &B::Device) -> Result<Self, Self::Error> {
        let model = <TextClassifier<B> as Init<B, ClassifierArtifacts>>::init(args, device)?;
        Self::new(model, args.config.vocab_size, device.clone())
    }
}

impl<B: Backend> Classifier for BurnClassifier<B> {
    fn predict(&self, batch: TokenBatch) -> Result<Vec<f32>, InferenceError> {
        let device = self.device.clone();
        self.host.with(move |model| model.score(batch, &device))?
    }

    fn vocab_size(&self) -> Option<usize> {
        Some(self.vocab_size)
    }

    fn backend(&self) -> BackendInfo {
        BackendInfo {
            backend: tynm::type_name::<B>(),
            device: format!("{:?}", self.device),
        }
    }

    fn release(self: Box<Self>) {
        let this = *self;
        match this.host.into_model() {
            Some(model) => {
                drop(model);
                log::info!("Classifier released.");
            }
            None => log::warn!("Classifier thread ended abnormally during release."),
        }
    }
}
