use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt::Debug;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

pub trait Lemmatizer: Send + Sync + Debug {
    fn lemmatize<'a>(&self, token: &'a str) -> Cow<'a, str>;
}

/// WordNet noun detachment rules, applied in this order.
const NOUN_SUBSTITUTIONS: [(&str, &str); 9] = [
    ("s", ""),
    ("ses", "s"),
    ("ves", "f"),
    ("xes", "x"),
    ("zes", "z"),
    ("ches", "ch"),
    ("shes", "sh"),
    ("men", "man"),
    ("ies", "y"),
];

/// Irregular plurals from the WordNet noun exception list.
const NOUN_EXCEPTIONS: &[(&str, &str)] = &[
    ("alumni", "alumnus"),
    ("analyses", "analysis"),
    ("businessmen", "businessman"),
    ("cacti", "cactus"),
    ("calves", "calf"),
    ("children", "child"),
    ("crises", "crisis"),
    ("criteria", "criterion"),
    ("feet", "foot"),
    ("firemen", "fireman"),
    ("fungi", "fungus"),
    ("geese", "goose"),
    ("gentlemen", "gentleman"),
    ("halves", "half"),
    ("indices", "index"),
    ("knives", "knife"),
    ("leaves", "leaf"),
    ("lice", "louse"),
    ("lives", "life"),
    ("loaves", "loaf"),
    ("matrices", "matrix"),
    ("men", "man"),
    ("mice", "mouse"),
    ("oxen", "ox"),
    ("phenomena", "phenomenon"),
    ("quizzes", "quiz"),
    ("policemen", "policeman"),
    ("salesmen", "salesman"),
    ("selves", "self"),
    ("shelves", "shelf"),
    ("stimuli", "stimulus"),
    ("teeth", "tooth"),
    ("theses", "thesis"),
    ("thieves", "thief"),
    ("wives", "wife"),
    ("wolves", "wolf"),
    ("women", "woman"),
];

/// Short tokens whose WordNet lemma is a shorter noun (`has` is the plural
/// of `ha`). The rule-based mode skips short tokens, so they are listed here.
const SHORT_FORMS: &[(&str, &str)] = &[
    ("as", "a"),
    ("does", "doe"),
    ("has", "ha"),
    ("his", "hi"),
    ("us", "u"),
    ("was", "wa"),
];

/// Words ending in `s` that are not plurals of anything shorter.
const INVARIANT: &[&str] = &[
    "always",
    "besides",
    "economics",
    "mathematics",
    "means",
    "news",
    "perhaps",
    "physics",
    "politics",
    "series",
    "sometimes",
    "species",
    "thanks",
    "towards",
    "whereas",
];

/// Plurals of nouns ending in `ie` that WordNet has no `-y` form for.
/// `cookies` and `goodies` are absent: `cooky` and `goody` are shorter lemmas.
const IE_NOUNS: &[&str] = &[
    "calories",
    "freebies",
    "movies",
    "rookies",
    "selfies",
    "smoothies",
    "zombies",
];

/// Plurals of nouns ending in `che`, which keep their `e`.
const CHE_PLURALS: &[&str] = &[
    "aches",
    "avalanches",
    "backaches",
    "caches",
    "cliches",
    "earaches",
    "headaches",
    "heartaches",
    "moustaches",
    "mustaches",
    "niches",
    "psyches",
    "quiches",
    "stomachaches",
    "toothaches",
];

/// Plurals of nouns ending in a single `s`.
const SES_PLURALS: &[&str] = &[
    "aliases",
    "atlases",
    "biases",
    "bonuses",
    "buses",
    "campuses",
    "canvases",
    "censuses",
    "choruses",
    "circuses",
    "gases",
    "irises",
    "lenses",
    "minuses",
    "octopuses",
    "pluses",
    "statuses",
    "viruses",
    "walruses",
];

/// Noun lemmatizer following WordNet's `morphy`.
///
/// With a lexicon of known noun lemmas it behaves exactly like `morphy`: all
/// detachment candidates are generated and the shortest one found in the
/// lexicon wins. Without a lexicon a conservative subset of the rules is
/// applied to lowercase alphabetic tokens, with word lists standing in for
/// the lexicon lookups that decide between `-es` and `-s` and between `-ie`
/// and `-y`. Words missing from those lists can still lemmatize differently
/// than WordNet would.
#[derive(Debug, Clone, Default)]
pub struct MorphyLemmatizer {
    lexicon: Option<HashSet<String>>,
}

impl MorphyLemmatizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lexicon<I, S>(lemmas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lexicon: Some(lemmas.into_iter().map(Into::into).collect()),
        }
    }

    /// Read a lexicon with one lemma at the start of each line.
    ///
    /// WordNet's `index.noun` is accepted as is: indented license lines are
    /// skipped and only the first field of each entry is kept.
    pub fn from_lexicon_file(path: &Path) -> io::Result<Self> {
        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut lemmas = HashSet::new();
        for line in reader.lines() {
            let line = line?;
            if line.starts_with(char::is_whitespace) || line.starts_with('#') {
                continue;
            }
            if let Some(lemma) = line.split_whitespace().next() {
                lemmas.insert(lemma.to_string());
            }
        }
        log::info!("Loaded {} lemmas from {}", lemmas.len(), path.display());
        Ok(Self::with_lexicon(lemmas))
    }

    pub fn has_lexicon(&self) -> bool {
        self.lexicon.is_some()
    }

    fn morphy(&self, lexicon: &HashSet<String>, form: &str) -> Vec<String> {
        let known = |forms: Vec<String>| -> Vec<String> {
            let mut seen = HashSet::new();
            forms
                .into_iter()
                .filter(|f| lexicon.contains(f) && seen.insert(f.clone()))
                .collect()
        };

        if let Some(lemma) = exception(NOUN_EXCEPTIONS, form) {
            return known(vec![form.to_string(), lemma.to_string()]);
        }

        let mut forms = apply_rules(&[form.to_string()]);
        let mut candidates = vec![form.to_string()];
        candidates.extend(forms.iter().cloned());
        let results = known(candidates);
        if !results.is_empty() {
            return results;
        }

        while !forms.is_empty() {
            forms = apply_rules(&forms);
            let results = known(forms.clone());
            if !results.is_empty() {
                return results;
            }
        }
        Vec::new()
    }

    fn detach<'a>(&self, word: &'a str) -> Cow<'a, str> {
        if let Some(lemma) = exception(NOUN_EXCEPTIONS, word).or(exception(SHORT_FORMS, word)) {
            return Cow::Borrowed(lemma);
        }
        let eligible = word.len() > 3
            && word.chars().all(|c| c.is_ascii_lowercase())
            && !INVARIANT.contains(&word)
            && !["ss", "us", "is"].iter().any(|s| word.ends_with(s));
        if !eligible {
            return Cow::Borrowed(word);
        }

        if CHE_PLURALS.contains(&word) {
            Cow::Borrowed(strip_suffix(word, "s"))
        } else if SES_PLURALS.contains(&word)
            || ["sses", "ches", "shes", "xes"]
                .iter()
                .any(|s| word.ends_with(s))
        {
            Cow::Borrowed(strip_suffix(word, "es"))
        } else if word.ends_with("ies") && word.len() > 4 && !IE_NOUNS.contains(&word) {
            Cow::Owned(format!("{}y", strip_suffix(word, "ies")))
        } else if word.ends_with('s') {
            Cow::Borrowed(strip_suffix(word, "s"))
        } else {
            Cow::Borrowed(word)
        }
    }
}

impl Lemmatizer for MorphyLemmatizer {
    fn lemmatize<'a>(&self, token: &'a str) -> Cow<'a, str> {
        match &self.lexicon {
            Some(lexicon) => self
                .morphy(lexicon, token)
                .into_iter()
                .min_by_key(|lemma| lemma.len())
                .map_or(Cow::Borrowed(token), Cow::Owned),
            None => self.detach(token),
        }
    }
}

fn exception(table: &'static [(&'static str, &'static str)], word: &str) -> Option<&'static str> {
    table
        .iter()
        .find_map(|(form, lemma)| (*form == word).then_some(*lemma))
}

fn strip_suffix<'a>(word: &'a str, suffix: &str) -> &'a str {
    word.strip_suffix(suffix).unwrap_or(word)
}

fn apply_rules(forms: &[String]) -> Vec<String> {
    forms
        .iter()
        .flat_map(|form| {
            NOUN_SUBSTITUTIONS
                .iter()
                .filter(move |(old, _)| form.ends_with(old))
                .map(move |(old, new)| format!("{}{new}", &form[..form.len() - old.len()]))
        })
        .collect()
}
