use serde::{Deserialize, Serialize};

use crate::bundle::ModelBundle;
use crate::classifier::TokenBatch;
use crate::error::InferenceError;

/// Scores at or above this value are positive.
pub const POSITIVE_THRESHOLD: f32 = 0.5;

pub const PADDING_ID: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum Sentiment {
    #[serde(rename = "Positif")]
    #[strum(serialize = "Positif")]
    Positive,
    #[serde(rename = "Négatif")]
    #[strum(serialize = "Négatif")]
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub sentiment: Sentiment,
    /// Probability of the predicted class, in `[0.5, 1.0]`.
    pub confidence: f32,
    /// Raw probability of the positive class.
    pub raw_score: f32,
}

impl PredictionResult {
    pub fn from_score(score: f32) -> Result<Self, InferenceError> {
        if !(0.0..=1.0).contains(&score) {
            return Err(InferenceError::NumericBackend(format!(
                "classifier produced {score}, expected a probability"
            )));
        }
        let (sentiment, confidence) = if score >= POSITIVE_THRESHOLD {
            (Sentiment::Positive, score)
        } else {
            (Sentiment::Negative, 1.0 - score)
        };
        Ok(Self {
            sentiment,
            confidence,
            raw_score: score,
        })
    }
}

/// Pad with zeros or truncate every sequence at its tail to `max_len`.
pub fn pad_sequences_post(
    sequences: &[Vec<i64>],
    max_len: usize,
) -> Result<TokenBatch, InferenceError> {
    let mut ids = Vec::with_capacity(sequences.len() * max_len);
    for sequence in sequences {
        let kept = sequence.len().min(max_len);
        ids.extend_from_slice(&sequence[..kept]);
        ids.extend(std::iter::repeat_n(PADDING_ID, max_len - kept));
    }
    TokenBatch::new(ids, sequences.len(), max_len)
}

/// Predict the sentiment of every text with a single classifier call.
///
/// Results are in input order. An empty input never reaches the classifier.
pub fn predict_many<S: AsRef<str>>(
    texts: &[S],
    bundle: &ModelBundle,
) -> Result<Vec<PredictionResult>, InferenceError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let preprocessor = bundle.preprocessor();
    let tokenizer = bundle.tokenizer();
    let sequences = texts
        .iter()
        .map(|text| tokenizer.encode(&preprocessor.preprocess(text.as_ref())))
        .collect::<Result<Vec<_>, _>>()?;

    let batch = pad_sequences_post(&sequences, bundle.params().max_sequence_length)?;
    let classifier = bundle.classifier();
    if let (Some(vocab_size), Some(max_id)) = (classifier.vocab_size(), batch.max_id()) {
        if max_id < 0 || max_id as usize >= vocab_size {
            return Err(InferenceError::Encoding(format!(
                "token id {max_id} is outside the classifier vocabulary of {vocab_size}"
            )));
        }
    }

    let rows = batch.rows();
    let scores = classifier.predict(batch)?;
    if scores.len() != rows {
        return Err(InferenceError::NumericBackend(format!(
            "classifier returned {} scores for {rows} inputs",
            scores.len()
        )));
    }
    scores.into_iter().map(PredictionResult::from_score).collect()
}

/// A batch of one.
pub fn predict_one(text: &str, bundle: &ModelBundle) -> Result<PredictionResult, InferenceError> {
    predict_many(&[text], bundle)?
        .into_iter()
        .next()
        .ok_or_else(|| InferenceError::NumericBackend("classifier returned no score".to_string()))
}
