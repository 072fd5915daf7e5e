//! Lyric text normalization
//!
//! The similarity index only ever sees normalized text, and it treats the
//! normalizer as an opaque `normalize(text) -> String`. [`LyricNormalizer`] is
//! the default: lowercase, numbers spelled out, contractions expanded, markup
//! and punctuation stripped, English stop words dropped.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

use songcheck_common::{Error, Result};

pub trait Normalizer: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static ANNOTATIONS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("valid regex"));
static SECTION_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(chorus|verse|pre-chorus|bridge|outro|intro)\b\s*(\w+)?\s*:").expect("valid regex"));
static REPEAT_MARKERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(?\bx\s?\d+\b\)?").expect("valid regex"));
static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[,.:?\[\]{}\-+\\/|@#$*^&%~!()";_=<>]"#).expect("valid regex"));
static DROPPED_G: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w)in ?'(\W|$)").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Generic English contractions, longest first so `n't` never eats `can't`
const CONTRACTIONS: &[(&str, &str)] = &[
    ("can't", "cannot"),
    ("won't", "will not"),
    ("shan't", "shall not"),
    ("ain't", "am not"),
    ("let's", "let us"),
    ("y'all", "you all"),
    ("'cause", "because"),
    ("n't", " not"),
    ("'re", " are"),
    ("'m", " am"),
    ("'ll", " will"),
    ("'ve", " have"),
    ("'d", " would"),
    ("'s", ""),
];

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "cannot", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "itself", "just", "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of",
    "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own",
    "same", "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
    "too", "under", "until", "up", "us", "very", "was", "we", "were", "what", "when", "where",
    "which", "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours",
    "yourself", "yourselves",
];

/// Default normalizer
#[derive(Debug, Clone)]
pub struct LyricNormalizer {
    /// Applied before generic contraction expansion, in file order
    custom_contractions: Vec<(String, String)>,
    /// Matches any word or phrase from the removal list
    remove_pattern: Option<Regex>,
    stop_words: HashSet<&'static str>,
}

impl Default for LyricNormalizer {
    fn default() -> Self {
        Self {
            custom_contractions: Vec::new(),
            remove_pattern: None,
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }
}

impl LyricNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `short=full` replacements
    pub fn with_contractions(mut self, pairs: Vec<(String, String)>) -> Self {
        self.custom_contractions = pairs
            .into_iter()
            .map(|(short, full)| (short.to_lowercase(), full.to_lowercase()))
            .collect();
        self
    }

    /// Remove these words or phrases (whole-word, case-insensitive)
    pub fn with_removals(mut self, words: &[String]) -> Result<Self> {
        let escaped: Vec<String> = words
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .map(regex::escape)
            .collect();
        if escaped.is_empty() {
            self.remove_pattern = None;
            return Ok(self);
        }
        let pattern = format!(r"(?i)\b({})\b", escaped.join("|"));
        let regex = Regex::new(&pattern)
            .map_err(|e| Error::Config(format!("Invalid removal list: {}", e)))?;
        self.remove_pattern = Some(regex);
        Ok(self)
    }

    /// Build from optional word list files
    pub fn from_files(contractions_file: Option<&Path>, remove_file: Option<&Path>) -> Result<Self> {
        let mut normalizer = Self::new();
        if let Some(path) = contractions_file {
            normalizer = normalizer.with_contractions(load_contractions(path)?);
        }
        if let Some(path) = remove_file {
            normalizer = normalizer.with_removals(&load_word_list(path)?)?;
        }
        Ok(normalizer)
    }
}

impl Normalizer for LyricNormalizer {
    fn normalize(&self, text: &str) -> String {
        let mut lyrics = text.to_lowercase().trim().to_string();

        // Before digits are spelled out, or `x2` would become `xtwo`
        lyrics = REPEAT_MARKERS.replace_all(&lyrics, " ").into_owned();
        lyrics = DIGITS
            .replace_all(&lyrics, |caps: &regex::Captures| digits_to_words(&caps[0]))
            .into_owned();

        if let Some(pattern) = &self.remove_pattern {
            lyrics = pattern.replace_all(&lyrics, "").into_owned();
        }

        lyrics = lyrics.replace('’', "'").replace('`', "'");
        lyrics = DROPPED_G.replace_all(&lyrics, "${1}ing$2").into_owned();

        for (short, full) in &self.custom_contractions {
            lyrics = lyrics.replace(short.as_str(), full);
        }
        for (short, full) in CONTRACTIONS {
            lyrics = lyrics.replace(short, full);
        }
        lyrics = lyrics.replace('\'', "");

        lyrics = TAGS.replace_all(&lyrics, " ").into_owned();
        lyrics = ANNOTATIONS.replace_all(&lyrics, " ").into_owned();
        lyrics = SECTION_MARKERS.replace_all(&lyrics, " ").into_owned();
        lyrics = PUNCTUATION.replace_all(&lyrics, " ").into_owned();
        lyrics = WHITESPACE.replace_all(&lyrics, " ").into_owned();

        lyrics
            .split(' ')
            .filter(|word| !word.is_empty() && !self.stop_words.contains(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Parse `short=full` lines; blank lines and lines without `=` are skipped
pub fn load_contractions(path: &Path) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter_map(|line| {
            let (short, full) = line.trim().split_once('=')?;
            let short = short.trim();
            if short.is_empty() {
                return None;
            }
            Some((short.to_string(), full.trim().to_string()))
        })
        .collect())
}

/// One entry per non-blank line
pub fn load_word_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect())
}

/// Spell out a run of digits
///
/// Values too large for u64 are spelled digit by digit.
pub fn digits_to_words(digits: &str) -> String {
    match digits.parse::<u64>() {
        Ok(n) => number_to_words(n),
        Err(_) => digits
            .chars()
            .filter_map(|c| c.to_digit(10))
            .map(|d| ONES[d as usize])
            .collect::<Vec<_>>()
            .join(" "),
    }
}

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];
const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];
const SCALES: [(u64, &str); 6] = [
    (1_000_000_000_000_000_000, "quintillion"),
    (1_000_000_000_000_000, "quadrillion"),
    (1_000_000_000_000, "trillion"),
    (1_000_000_000, "billion"),
    (1_000_000, "million"),
    (1_000, "thousand"),
];

pub fn number_to_words(n: u64) -> String {
    if n < 20 {
        return ONES[n as usize].to_string();
    }

    let mut parts: Vec<String> = Vec::new();
    let mut rest = n;
    for (scale, name) in SCALES {
        if rest >= scale {
            parts.push(format!("{} {}", below_thousand(rest / scale), name));
            rest %= scale;
        }
    }
    if rest > 0 {
        parts.push(below_thousand(rest));
    }
    parts.join(" ")
}

fn below_thousand(n: u64) -> String {
    let mut words: Vec<&str> = Vec::new();
    let hundreds = n / 100;
    let rest = n % 100;
    if hundreds > 0 {
        words.push(ONES[hundreds as usize]);
        words.push("hundred");
    }
    if rest >= 20 {
        words.push(TENS[(rest / 10) as usize]);
        if rest % 10 > 0 {
            words.push(ONES[(rest % 10) as usize]);
        }
    } else if rest > 0 || hundreds == 0 {
        words.push(ONES[rest as usize]);
    }
    words.join(" ")
}
