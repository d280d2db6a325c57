use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

use burn::prelude::Backend;
use sentiment_registry::{ArtifactKind, ArtifactSpec};

use crate::classifier::{
    BurnClassifier, Classifier, ClassifierArtifacts, InferenceBackend, Init, TextClassifierConfig,
};
use crate::error::LoadError;
use crate::params::ModelParams;
use crate::preprocess::Preprocessor;
use crate::tokenizer::{Tokenizer, WordIndexTokenizer};

/// Everything needed to answer a prediction, loaded once and never mutated.
pub struct ModelBundle {
    classifier: Box<dyn Classifier>,
    tokenizer: Box<dyn Tokenizer>,
    preprocessor: Preprocessor,
    params: ModelParams,
}

impl ModelBundle {
    pub fn new(
        classifier: Box<dyn Classifier>,
        tokenizer: Box<dyn Tokenizer>,
        preprocessor: Preprocessor,
        params: ModelParams,
    ) -> Self {
        Self {
            classifier,
            tokenizer,
            preprocessor,
            params,
        }
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Release the classifier explicitly instead of relying on drop order.
    pub fn release(self) {
        self.classifier.release();
    }
}

impl Debug for ModelBundle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBundle")
            .field("backend", &self.classifier.backend())
            .field("vocab_size", &self.tokenizer.vocab_size())
            .field("params", &self.params)
            .finish()
    }
}

/// Builds a [`ModelBundle`] from a directory of provisioned artifacts.
pub struct BundleLoader<B: Backend = InferenceBackend> {
    device: B::Device,
    preprocessor: Preprocessor,
}

impl<B: Backend> BundleLoader<B> {
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            preprocessor: Preprocessor::english(),
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Load every artifact in `expected` from `local_dir`.
    ///
    /// All files are checked before any is parsed. The preprocessing
    /// descriptor must be present but is never deserialized: preprocessing is
    /// compiled into the binary.
    pub fn load(
        &self,
        local_dir: &Path,
        expected: &[ArtifactSpec],
    ) -> Result<ModelBundle, LoadError> {
        log::info!("Loading model artifacts from {}", local_dir.display());
        for spec in expected {
            let path = local_dir.join(spec.file_name());
            if !path.is_file() {
                return Err(LoadError::ArtifactMissing {
                    name: spec.logical_name.to_string(),
                    path,
                });
            }
        }
        let path_of = |kind: ArtifactKind| -> Result<PathBuf, LoadError> {
            expected
                .iter()
                .find(|spec| spec.kind == kind)
                .map(|spec| local_dir.join(spec.file_name()))
                .ok_or_else(|| LoadError::ArtifactMissing {
                    name: kind.to_string(),
                    path: local_dir.to_path_buf(),
                })
        };

        let params = ModelParams::from_file(&path_of(ArtifactKind::Parameters)?)?;
        let tokenizer = WordIndexTokenizer::from_file(&path_of(ArtifactKind::Tokenizer)?)?;
        log::debug!(
            "Ignoring contents of {}",
            path_of(ArtifactKind::PreprocessDescriptor)?.display()
        );

        let vocab_size = match params.vocab_size {
            Some(size) => {
                if size < tokenizer.vocab_size() {
                    log::warn!(
                        "Classifier vocabulary ({size}) is smaller than the tokenizer's ({})",
                        tokenizer.vocab_size()
                    );
                }
                size
            }
            None => tokenizer.vocab_size(),
        };

        let weights_path = path_of(ArtifactKind::ClassifierWeights)?;
        let weights = std::fs::read(&weights_path)
            .map_err(|e| LoadError::deserialization(&weights_path.display().to_string(), e))?;
        let artifacts = ClassifierArtifacts {
            config: TextClassifierConfig::new(vocab_size, params.embedding_dim, params.lstm_units),
            weights,
        };
        let classifier = BurnClassifier::<B>::init(&artifacts, &self.device)?;

        log::info!(
            "Model loaded (vocabulary {vocab_size}, max sequence length {}).",
            params.max_sequence_length
        );
        Ok(ModelBundle::new(
            Box::new(classifier),
            Box::new(tokenizer),
            self.preprocessor.clone(),
            params,
        ))
    }
}
