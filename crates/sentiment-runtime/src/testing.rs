//! Fixtures shared by the unit tests of this crate.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};

use crate::classifier::{BackendInfo, Classifier, TextClassifier, TextClassifierConfig, TokenBatch};
use crate::error::InferenceError;
use crate::{InferenceBackend, ModelBundle, ModelParams, Preprocessor, WordIndexTokenizer};

pub(crate) type TestBackend = InferenceBackend;

pub(crate) const WORDS: [&str; 9] = [
    "<OOV>", "love", "airline", "not", "good", "flight", "delay", "url", "mention",
];

pub(crate) fn word_index() -> HashMap<String, i64> {
    WORDS
        .iter()
        .enumerate()
        .map(|(i, w)| (w.to_string(), i as i64 + 1))
        .collect()
}

pub(crate) fn classifier_weights(config: &TextClassifierConfig) -> Vec<u8> {
    let device = Default::default();
    let model: TextClassifier<TestBackend> = config.init(&device);
    let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
    recorder.record(model.into_record(), ()).unwrap()
}

/// Write a complete, loadable artifact set into `dir`.
pub(crate) fn write_model_dir(dir: &Path) {
    let word_index = serde_json::to_string(&word_index()).unwrap();
    let tokenizer = serde_json::json!({
        "class_name": "Tokenizer",
        "config": {
            "num_words": null,
            "oov_token": "<OOV>",
            "lower": true,
            "split": " ",
            "char_level": false,
            "word_index": word_index,
        }
    });
    std::fs::write(dir.join("tokenizer.json"), tokenizer.to_string()).unwrap();
    std::fs::write(
        dir.join("parameters.json"),
        r#"{"max_sequence_length": 12, "embedding_dim": 8, "lstm_units": 4, "model": "lstm"}"#,
    )
    .unwrap();
    std::fs::write(dir.join("preprocess_function.dill"), b"\x80\x04opaque").unwrap();

    let config = TextClassifierConfig::new(WORDS.len() + 1, 8, 4);
    std::fs::write(dir.join("classifier.mpk"), classifier_weights(&config)).unwrap();
}

type Scorer = Box<dyn Fn(&[i64]) -> f32 + Send + Sync>;

/// Scores each row with a plain function and records every call.
pub(crate) struct StubClassifier {
    scorer: Scorer,
    pub calls: Arc<AtomicUsize>,
    pub batches: Arc<Mutex<Vec<TokenBatch>>>,
    pub released: Arc<AtomicBool>,
}

impl StubClassifier {
    pub fn constant(score: f32) -> Self {
        Self::scoring(move |_| score)
    }

    pub fn scoring(scorer: impl Fn(&[i64]) -> f32 + Send + Sync + 'static) -> Self {
        Self {
            scorer: Box::new(scorer),
            calls: Arc::default(),
            batches: Arc::default(),
            released: Arc::default(),
        }
    }
}

impl Classifier for StubClassifier {
    fn predict(&self, batch: TokenBatch) -> Result<Vec<f32>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scores = (0..batch.rows())
            .filter_map(|i| batch.row(i).map(|row| (self.scorer)(row)))
            .collect();
        self.batches.lock().unwrap().push(batch);
        Ok(scores)
    }

    fn vocab_size(&self) -> Option<usize> {
        Some(WORDS.len() + 1)
    }

    fn backend(&self) -> BackendInfo {
        BackendInfo {
            backend: "Stub".to_string(),
            device: "Cpu".to_string(),
        }
    }

    fn release(self: Box<Self>) {
        self.released.store(true, Ordering::SeqCst);
    }
}

pub(crate) fn stub_bundle(classifier: StubClassifier) -> ModelBundle {
    ModelBundle::new(
        Box::new(classifier),
        Box::new(WordIndexTokenizer::from_word_index(word_index()).with_oov_token("<OOV>")),
        Preprocessor::english(),
        ModelParams::default(),
    )
}
