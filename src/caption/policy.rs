// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption acceptance policy: length bounds, banned words and fallbacks

use regex::RegexBuilder;

use super::errors::CaptionError;

/// Placeholder written when every attempt came back too short
pub const DEFAULT_SHORT_FALLBACK: &str = "[caption unavailable: response too short]";
/// Placeholder written when stripping banned words left nothing behind
pub const DEFAULT_FILTERED_FALLBACK: &str = "[caption unavailable: filtered]";
/// Suffix appended to truncated captions
pub const DEFAULT_TRUNCATION_MARKER: &str = "...";

/// Why a single backend response was accepted or rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptVerdict {
    Pass,
    TooLong { chars: usize },
    TooShort { chars: usize },
    ContainsBanned(Vec<String>),
}

impl AttemptVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, AttemptVerdict::Pass)
    }
}

/// Acceptance rules applied to every backend response.
///
/// Lengths are counted in characters, not bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionPolicy {
    pub min_length: usize,
    pub max_length: usize,
    banned_words: Vec<String>,
    pub max_attempts: u32,
    pub short_fallback_text: String,
    pub filtered_fallback_text: String,
    pub truncation_marker: String,
    /// Used instead of `truncation_marker` when the cut lands right after a
    /// Latin letter (likely mid-word). `None` keeps a single generic suffix.
    pub mid_word_marker: Option<String>,
    pub escalate_on_retry: bool,
}

impl Default for CaptionPolicy {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_length: 1000,
            banned_words: Vec::new(),
            max_attempts: 3,
            short_fallback_text: DEFAULT_SHORT_FALLBACK.to_string(),
            filtered_fallback_text: DEFAULT_FILTERED_FALLBACK.to_string(),
            truncation_marker: DEFAULT_TRUNCATION_MARKER.to_string(),
            mid_word_marker: None,
            escalate_on_retry: false,
        }
    }
}

impl CaptionPolicy {
    pub fn new(min_length: usize, max_length: usize, max_attempts: u32) -> Self {
        Self {
            min_length,
            max_length,
            max_attempts,
            ..Self::default()
        }
    }

    /// Replace the banned word list. Blank entries are dropped and the rest trimmed.
    pub fn with_banned_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.banned_words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        self
    }

    pub fn banned_words(&self) -> &[String] {
        &self.banned_words
    }

    pub fn validate(&self) -> Result<(), CaptionError> {
        if self.max_attempts == 0 {
            return Err(CaptionError::InvalidPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.min_length > self.max_length {
            return Err(CaptionError::InvalidPolicy(format!(
                "min_length ({}) exceeds max_length ({})",
                self.min_length, self.max_length
            )));
        }
        Ok(())
    }

    /// Banned words found in `text`, compared case-insensitively as substrings
    pub fn banned_in(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        self.banned_words
            .iter()
            .filter(|w| lower.contains(&w.to_lowercase()))
            .cloned()
            .collect()
    }

    /// Classify a response. Length is checked before banned words.
    pub fn check(&self, text: &str) -> AttemptVerdict {
        let chars = text.chars().count();
        if chars > self.max_length {
            return AttemptVerdict::TooLong { chars };
        }
        if chars < self.min_length {
            return AttemptVerdict::TooShort { chars };
        }
        let found = self.banned_in(text);
        if !found.is_empty() {
            return AttemptVerdict::ContainsBanned(found);
        }
        AttemptVerdict::Pass
    }

    /// Cut `text` to `max_length` characters and append the truncation marker
    pub fn truncate(&self, text: &str) -> String {
        let cut: String = text.chars().take(self.max_length).collect();
        let ends_mid_word = cut
            .chars()
            .last()
            .map(|c| c.is_ascii_alphabetic())
            .unwrap_or(false);

        let marker = match (&self.mid_word_marker, ends_mid_word) {
            (Some(mid_word), true) => mid_word.as_str(),
            _ => self.truncation_marker.as_str(),
        };
        format!("{}{}", cut, marker)
    }

    /// Remove every banned word from `text`, case-insensitively.
    ///
    /// Words with ASCII alphanumeric edges only match whole ASCII words, so
    /// removing "cat" leaves "concatenate" intact while "logo" is still cut out
    /// of "有logo标志". Other edges match anywhere. Whitespace around a removed
    /// word is kept; callers trim the ends.
    pub fn strip_banned(&self, text: &str) -> String {
        if self.banned_words.is_empty() {
            return text.to_string();
        }

        let mut words: Vec<&String> = self.banned_words.iter().collect();
        // longest first so overlapping entries remove the larger span
        words.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));

        let alternation = words
            .iter()
            .map(|w| word_pattern(w))
            .collect::<Vec<_>>()
            .join("|");

        match RegexBuilder::new(&alternation).case_insensitive(true).build() {
            Ok(re) => re.replace_all(text, "").into_owned(),
            Err(e) => {
                tracing::warn!("banned word pattern failed to compile: {}", e);
                text.to_string()
            }
        }
    }
}

/// ASCII word boundary, so CJK neighbours count as separators
const ASCII_BOUNDARY: &str = r"(?-u:\b)";

fn word_pattern(word: &str) -> String {
    let escaped = regex::escape(word);
    let leading = word
        .chars()
        .next()
        .map(|c| c.is_ascii_alphanumeric())
        .unwrap_or(false);
    let trailing = word
        .chars()
        .last()
        .map(|c| c.is_ascii_alphanumeric())
        .unwrap_or(false);

    format!(
        "{}{}{}",
        if leading { ASCII_BOUNDARY } else { "" },
        escaped,
        if trailing { ASCII_BOUNDARY } else { "" }
    )
}
