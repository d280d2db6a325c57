use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{InferenceError, LoadError};

/// Text to integer-ID encoder with a fixed vocabulary.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<i64>, InferenceError>;

    /// Number of rows the classifier's embedding table needs.
    fn vocab_size(&self) -> usize;
}

const DEFAULT_FILTERS: &str = "!\"#$%&()*+,-./:;<=>?@[\\]^_`{|}~\t\n";

/// Keras stores some nested documents as JSON-encoded strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Embedded<T> {
    Inline(T),
    Encoded(String),
}

impl<T: DeserializeOwned> Embedded<T> {
    fn decode(self) -> Result<T, serde_json::Error> {
        match self {
            Embedded::Inline(value) => Ok(value),
            Embedded::Encoded(json) => serde_json::from_str(&json),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenizerDocument {
    #[serde(default)]
    class_name: Option<String>,
    config: TokenizerConfig,
}

#[derive(Debug, Deserialize)]
struct TokenizerConfig {
    #[serde(default)]
    num_words: Option<usize>,
    #[serde(default = "default_filters")]
    filters: String,
    #[serde(default = "default_lower")]
    lower: bool,
    #[serde(default = "default_split")]
    split: String,
    #[serde(default)]
    char_level: bool,
    #[serde(default)]
    oov_token: Option<String>,
    word_index: Embedded<HashMap<String, i64>>,
}

fn default_filters() -> String {
    DEFAULT_FILTERS.to_string()
}

fn default_lower() -> bool {
    true
}

fn default_split() -> String {
    " ".to_string()
}

/// A word-index tokenizer as exported by Keras' `Tokenizer.to_json()`.
///
/// Reproduces `texts_to_sequences`: filter characters become separators, words
/// are lowercased and looked up in the index, and indices at or above
/// `num_words` are replaced by the OOV index (or dropped without one).
#[derive(Debug, Clone)]
pub struct WordIndexTokenizer {
    word_index: HashMap<String, i64>,
    num_words: Option<usize>,
    filters: Vec<char>,
    lower: bool,
    split: String,
    char_level: bool,
    oov_index: Option<i64>,
}

impl WordIndexTokenizer {
    pub fn from_word_index(word_index: HashMap<String, i64>) -> Self {
        Self {
            word_index,
            num_words: None,
            filters: DEFAULT_FILTERS.chars().collect(),
            lower: true,
            split: default_split(),
            char_level: false,
            oov_index: None,
        }
    }

    pub fn with_oov_token(mut self, token: &str) -> Self {
        self.oov_index = self.word_index.get(token).copied();
        self
    }

    pub fn with_num_words(mut self, num_words: usize) -> Self {
        self.num_words = Some(num_words);
        self
    }

    pub fn from_json(artifact: &str, json: &str) -> Result<Self, LoadError> {
        let document: TokenizerDocument =
            serde_json::from_str(json).map_err(|e| LoadError::deserialization(artifact, e))?;
        if let Some(class_name) = &document.class_name {
            if class_name != "Tokenizer" {
                return Err(LoadError::deserialization(
                    artifact,
                    format!("expected a Tokenizer document, found {class_name}"),
                ));
            }
        }

        let config = document.config;
        let word_index = config
            .word_index
            .decode()
            .map_err(|e| LoadError::deserialization(artifact, e))?;
        if word_index.values().any(|&i| i <= 0) {
            return Err(LoadError::deserialization(
                artifact,
                "word indices must be positive, 0 is reserved for padding",
            ));
        }
        let oov_index = config
            .oov_token
            .as_ref()
            .and_then(|token| word_index.get(token).copied());

        log::debug!(
            "Tokenizer loaded: {} words, num_words={:?}, oov={:?}",
            word_index.len(),
            config.num_words,
            config.oov_token
        );

        Ok(Self {
            word_index,
            num_words: config.num_words,
            filters: config.filters.chars().collect(),
            lower: config.lower,
            split: config.split,
            char_level: config.char_level,
            oov_index,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let artifact = path.display().to_string();
        let json =
            std::fs::read_to_string(path).map_err(|e| LoadError::deserialization(&artifact, e))?;
        Self::from_json(&artifact, &json)
    }

    fn words(&self, text: &str) -> Vec<String> {
        let text = if self.lower {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        if self.char_level {
            return text.chars().map(String::from).collect();
        }

        let translated: String = text
            .chars()
            .map(|c| {
                if self.filters.contains(&c) {
                    self.split.clone()
                } else {
                    c.to_string()
                }
            })
            .collect();
        translated
            .split(self.split.as_str())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn lookup(&self, word: &str) -> Option<i64> {
        match self.word_index.get(word) {
            Some(&index) => match self.num_words {
                Some(limit) if index as usize >= limit => self.oov_index,
                _ => Some(index),
            },
            None => self.oov_index,
        }
    }
}

impl Tokenizer for WordIndexTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<i64>, InferenceError> {
        Ok(self
            .words(text)
            .iter()
            .filter_map(|word| self.lookup(word))
            .collect())
    }

    fn vocab_size(&self) -> usize {
        let max_index = self.word_index.values().copied().max().unwrap_or(0) as usize;
        match self.num_words {
            Some(limit) => limit.min(max_index + 1),
            None => max_index + 1,
        }
    }
}
