//! Language screening for lyric text
//!
//! Only English lyrics are compared against the corpus. The detector is an
//! opaque collaborator; [`ScriptLanguageDetector`] is the default and works
//! from the writing system of each letter.

use serde::Serialize;
use std::collections::BTreeMap;

/// Share above which a non-English script makes text multilingual
pub const MULTILINGUAL_THRESHOLD: f32 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageVerdict {
    /// English only
    Monolingual,
    /// Substantial non-English content
    Multilingual,
    /// Nothing to judge (no letters)
    Unknown,
}

impl LanguageVerdict {
    /// Whether text with this verdict may be scored
    pub fn is_supported(&self) -> bool {
        matches!(self, LanguageVerdict::Monolingual)
    }
}

pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> LanguageVerdict;
}

/// Writing system of a letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    /// Unaccented ASCII letters
    English,
    /// Latin letters with diacritics (é, ñ, ơ, ß ...)
    AccentedLatin,
    Cyrillic,
    Greek,
    Han,
    Kana,
    Hangul,
    Other,
}

fn script_of(c: char) -> Script {
    match c {
        'a'..='z' | 'A'..='Z' => Script::English,
        '\u{00C0}'..='\u{024F}' | '\u{1E00}'..='\u{1EFF}' => Script::AccentedLatin,
        '\u{0370}'..='\u{03FF}' => Script::Greek,
        '\u{0400}'..='\u{052F}' => Script::Cyrillic,
        '\u{3040}'..='\u{30FF}' | '\u{31F0}'..='\u{31FF}' => Script::Kana,
        '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}' | '\u{AC00}'..='\u{D7AF}' => Script::Hangul,
        '\u{3400}'..='\u{4DBF}' | '\u{4E00}'..='\u{9FFF}' | '\u{F900}'..='\u{FAFF}' => Script::Han,
        _ => Script::Other,
    }
}

/// Default detector
///
/// Each non-blank line gets a per-script share of its letters. Shares are
/// averaged over all non-blank lines (lines without letters count as zero),
/// and any non-English script averaging above 20% marks the text multilingual.
#[derive(Debug, Clone)]
pub struct ScriptLanguageDetector {
    threshold: f32,
}

impl Default for ScriptLanguageDetector {
    fn default() -> Self {
        Self {
            threshold: MULTILINGUAL_THRESHOLD,
        }
    }
}

impl ScriptLanguageDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Average script shares over lines; None if the text has no letters
    pub fn script_shares(&self, text: &str) -> Option<BTreeMap<Script, f32>> {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            return None;
        }

        let mut totals: BTreeMap<Script, f32> = BTreeMap::new();
        let mut any_letters = false;

        for line in &lines {
            let mut counts: BTreeMap<Script, usize> = BTreeMap::new();
            let mut letters = 0usize;
            for c in line.chars().filter(|c| c.is_alphabetic()) {
                *counts.entry(script_of(c)).or_default() += 1;
                letters += 1;
            }
            if letters == 0 {
                continue;
            }
            any_letters = true;
            for (script, count) in counts {
                *totals.entry(script).or_default() += count as f32 / letters as f32;
            }
        }

        if !any_letters {
            return None;
        }

        let line_count = lines.len() as f32;
        Some(
            totals
                .into_iter()
                .map(|(script, total)| (script, total / line_count))
                .collect(),
        )
    }
}

impl LanguageDetector for ScriptLanguageDetector {
    fn detect(&self, text: &str) -> LanguageVerdict {
        match self.script_shares(text) {
            None => LanguageVerdict::Unknown,
            Some(shares) => {
                let multilingual = shares
                    .iter()
                    .any(|(script, share)| *script != Script::English && *share > self.threshold);
                if multilingual {
                    LanguageVerdict::Multilingual
                } else {
                    LanguageVerdict::Monolingual
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_lyrics_are_monolingual() {
        let detector = ScriptLanguageDetector::new();
        let text = "Here comes the sun\nAnd I say it's alright\n\nLittle darling";
        assert_eq!(detector.detect(text), LanguageVerdict::Monolingual);
    }

    #[test]
    fn test_occasional_accent_stays_monolingual() {
        let detector = ScriptLanguageDetector::new();
        let text = "We met at the café\nand walked along the river\nuntil the night was gone";
        assert_eq!(detector.detect(text), LanguageVerdict::Monolingual);
    }

    #[test]
    fn test_mixed_korean_is_multilingual() {
        let detector = ScriptLanguageDetector::new();
        let text = "Baby you know\n사랑해 너를 정말로\n보고 싶어\nI need you";
        assert_eq!(detector.detect(text), LanguageVerdict::Multilingual);
    }

    #[test]
    fn test_no_letters_is_unknown() {
        let detector = ScriptLanguageDetector::new();
        assert_eq!(detector.detect(""), LanguageVerdict::Unknown);
        assert_eq!(detector.detect("123 456\n...!"), LanguageVerdict::Unknown);
        assert!(!LanguageVerdict::Unknown.is_supported());
    }

    #[test]
    fn test_shares_average_over_lines() {
        let detector = ScriptLanguageDetector::new();
        let shares = detector.script_shares("abc\nабв").unwrap();
        assert!((shares[&Script::English] - 0.5).abs() < 1e-6);
        assert!((shares[&Script::Cyrillic] - 0.5).abs() < 1e-6);
    }
}
