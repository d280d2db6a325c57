//! Everything between a tweet and its sentiment.
//!
//! A [`ModelBundle`] is loaded once by the [`BundleLoader`] and owned by the
//! [`Lifecycle`]. Requests borrow it and call [`predict_one`] or
//! [`predict_many`], which clean the text, encode it, pad it and run one
//! classifier call per batch.

pub mod bundle;
pub mod classifier;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod params;
pub mod preprocess;
pub mod tokenizer;

#[cfg(test)]
mod testing;

pub use bundle::{BundleLoader, ModelBundle};
pub use classifier::{BackendInfo, BurnClassifier, Classifier, InferenceBackend, TokenBatch};
pub use engine::{
    POSITIVE_THRESHOLD, PredictionResult, Sentiment, pad_sequences_post, predict_many, predict_one,
};
pub use error::{InferenceError, LoadError, NotReadyError, StartupError};
pub use lifecycle::{Lifecycle, ReadinessState};
pub use params::ModelParams;
pub use preprocess::{Lemmatizer, MorphyLemmatizer, Preprocessor};
pub use tokenizer::{Tokenizer, WordIndexTokenizer};
