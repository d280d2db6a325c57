//! Tweet normalisation applied before tokenization.
//!
//! The tokenizer vocabulary was built from text cleaned exactly this way, so
//! any change here silently degrades predictions.

mod lemmatizer;
mod stopwords;

use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

pub use lemmatizer::{Lemmatizer, MorphyLemmatizer};
pub use stopwords::{ENGLISH_STOPWORDS, NEGATIONS};

pub const URL_TOKEN: &str = "<URL>";
pub const MENTION_TOKEN: &str = "<MENTION>";

static URL: Lazy<Regex> = Lazy::new(|| compile(r"https?://\S+|www\.\S+"));
static MENTION: Lazy<Regex> = Lazy::new(|| compile(r"@\w+"));
static HASHTAG: Lazy<Regex> = Lazy::new(|| compile(r"#(\w+)"));
static SPECIAL: Lazy<Regex> = Lazy::new(|| compile(r"[^\w\s<>@#!?]"));

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => panic!("invalid built-in pattern {pattern}: {e}"),
    }
}

/// Characters that always form a token of their own.
const STANDALONE: [char; 6] = ['<', '>', '@', '#', '!', '?'];

/// Words the Treebank tokenizer splits in two.
const SPLIT_WORDS: [(&str, &str, &str); 6] = [
    ("cannot", "can", "not"),
    ("gimme", "gim", "me"),
    ("gonna", "gon", "na"),
    ("gotta", "got", "ta"),
    ("lemme", "lem", "me"),
    ("wanna", "wan", "na"),
];

#[derive(Clone)]
pub struct Preprocessor {
    lemmatizer: Arc<dyn Lemmatizer>,
    stopwords: HashSet<String>,
}

impl Preprocessor {
    /// English stopwords with negations kept, rule-based noun lemmatization.
    pub fn english() -> Self {
        Self::english_with(MorphyLemmatizer::new())
    }

    pub fn english_with(lemmatizer: impl Lemmatizer + 'static) -> Self {
        let stopwords = ENGLISH_STOPWORDS
            .iter()
            .filter(|w| !NEGATIONS.contains(*w))
            .map(|w| w.to_string())
            .collect();
        Self::new(Arc::new(lemmatizer), stopwords)
    }

    pub fn new(lemmatizer: Arc<dyn Lemmatizer>, stopwords: HashSet<String>) -> Self {
        Self {
            lemmatizer,
            stopwords,
        }
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    pub fn preprocess(&self, text: &str) -> String {
        let text = text.to_lowercase();
        let text = URL.replace_all(&text, URL_TOKEN);
        let text = MENTION.replace_all(&text, MENTION_TOKEN);
        let text = HASHTAG.replace_all(&text, "# ${1}");
        let text = SPECIAL.replace_all(&text, "");

        word_tokenize(&text)
            .iter()
            .map(|token| self.lemmatizer.lemmatize(token))
            .filter(|token| !self.is_stopword(token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::english()
    }
}

impl Debug for Preprocessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preprocessor")
            .field("lemmatizer", &self.lemmatizer)
            .field("stopwords", &self.stopwords.len())
            .finish()
    }
}

/// Treebank-style word tokenization over the characters left after cleaning.
pub fn word_tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() || STANDALONE.contains(&c) {
            if let Some(s) = start.take() {
                push_word(&mut tokens, &text[s..i]);
            }
            if !c.is_whitespace() {
                tokens.push(&text[i..i + c.len_utf8()]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        push_word(&mut tokens, &text[s..]);
    }
    tokens
}

fn push_word<'a>(tokens: &mut Vec<&'a str>, word: &'a str) {
    let split = SPLIT_WORDS
        .iter()
        .find(|(whole, _, _)| word.eq_ignore_ascii_case(whole));
    match split {
        Some((_, head, _)) => {
            let (first, second) = word.split_at(head.len());
            tokens.push(first);
            tokens.push(second);
        }
        None => tokens.push(word),
    }
}
