use burn::config::Config;
use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig, Lstm, LstmConfig};
use burn::prelude::{Backend, Module};
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use burn::tensor::activation::sigmoid;
use burn::tensor::{Int, Tensor, TensorData};

use super::TokenBatch;
use crate::error::{InferenceError, LoadError};

/// Trait for models that can be initialized from their serialized artifacts.
pub trait Init<B, InitArgs = ()>: Sized
where
    B: Backend,
    InitArgs: Send + 'static,
{
    type Error;
    /// Initialize the model from the given arguments and device.
    fn init(args: &InitArgs, device: &B::Device) -> Result<Self, Self::Error>;
}

#[derive(Config, Debug)]
pub struct TextClassifierConfig {
    pub vocab_size: usize,
    pub embedding_dim: usize,
    pub lstm_units: usize,
}

impl TextClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TextClassifier<B> {
        TextClassifier {
            embedding: EmbeddingConfig::new(self.vocab_size, self.embedding_dim).init(device),
            lstm: LstmConfig::new(self.embedding_dim, self.lstm_units, true).init(device),
            output: LinearConfig::new(self.lstm_units, 1).init(device),
        }
    }
}

/// Embedding, a single LSTM layer read at its final hidden state, and a
/// sigmoid-activated dense output.
#[derive(Module, Debug)]
pub struct TextClassifier<B: Backend> {
    embedding: Embedding<B>,
    lstm: Lstm<B>,
    output: Linear<B>,
}

impl<B: Backend> TextClassifier<B> {
    /// `[batch, seq_len]` token ids to `[batch, 1]` probabilities.
    pub fn forward(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let embedded = self.embedding.forward(ids);
        let (_, state) = self.lstm.forward(embedded, None);
        sigmoid(self.output.forward(state.hidden))
    }

    pub fn score(&self, batch: TokenBatch, device: &B::Device) -> Result<Vec<f32>, InferenceError> {
        let [rows, seq_len] = [batch.rows(), batch.seq_len()];
        let ids = Tensor::<B, 2, Int>::from_data(
            TensorData::new(batch.into_ids(), [rows, seq_len]),
            device,
        );
        self.forward(ids)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| InferenceError::NumericBackend(format!("{e:?}")))
    }
}

/// Everything needed to rebuild a [`TextClassifier`].
pub struct ClassifierArtifacts {
    pub config: TextClassifierConfig,
    /// Named MessagePack record, full precision.
    pub weights: Vec<u8>,
}

impl<B: Backend> Init<B, ClassifierArtifacts> for TextClassifier<B> {
    type Error = LoadError;

    fn init(args: &ClassifierArtifacts, device: &B::Device) -> Result<Self, Self::Error> {
        let config = &args.config;
        log::info!("Loading classifier with config: {config:?}");
        let model = config.init(device);

        let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
        let record = recorder
            .load(args.weights.clone(), device)
            .map_err(|e| LoadError::deserialization("classifier", e))?;
        Ok(model.load_record(record))
    }
}
