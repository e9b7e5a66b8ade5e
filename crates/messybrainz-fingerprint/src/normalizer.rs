// SPDX-License-Identifier: GPL-3.0-or-later

//! Canonicalization of submitted listen fields.
//!
//! Every text field goes through the same pipeline:
//! 1. Unicode compatibility composition (NFKC), so full-width and ligature forms fold
//! 2. Lowercasing
//! 3. Diacritic removal (NFD, combining marks dropped) or canonical composition (NFC)
//! 4. Punctuation removal
//! 5. Whitespace collapsing and noise token removal
//!
//! The result is stable under re-application.

use std::collections::HashSet;

use messybrainz_domain::{CanonicalFields, RawRecord};
use serde::{Deserialize, Serialize};
use tracing::warn;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Switches for the text pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerOptions {
    pub strip_diacritics: bool,
    pub strip_punctuation: bool,
    /// Whole words removed from every text field, e.g. `"remastered"`.
    pub noise_tokens: Vec<String>,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            strip_diacritics: true,
            strip_punctuation: true,
            noise_tokens: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    strip_diacritics: bool,
    strip_punctuation: bool,
    noise_tokens: HashSet<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(NormalizerOptions::default())
    }
}

impl Normalizer {
    pub fn new(options: NormalizerOptions) -> Self {
        let mut normalizer = Self {
            strip_diacritics: options.strip_diacritics,
            strip_punctuation: options.strip_punctuation,
            noise_tokens: HashSet::new(),
        };

        // Noise tokens are compared against pipeline output, so run them through it too.
        for token in &options.noise_tokens {
            let folded = normalizer.fold(token);
            match folded.split_whitespace().count() {
                1 => {
                    normalizer.noise_tokens.insert(folded);
                }
                0 => {}
                _ => {
                    warn!(target: "normalizer", token = %token, "ignoring multi-word noise token");
                }
            }
        }

        normalizer
    }

    /// Canonicalize a submitted record. Never fails: missing fields become empty.
    pub fn normalize(&self, raw: &RawRecord) -> CanonicalFields {
        CanonicalFields {
            artist: self.normalize_text(raw.artist.as_deref()),
            title: self.normalize_text(raw.title.as_deref()),
            release: self.normalize_text(raw.release.as_deref()),
            recording_mbid: normalize_identifier(raw.recording_mbid.as_deref()),
            track_number: raw.track_number,
            duration_ms: raw.duration_ms,
        }
    }

    /// Run one free-text value through the full pipeline.
    pub fn normalize_text(&self, value: Option<&str>) -> String {
        let Some(value) = value else {
            return String::new();
        };

        self.fold(value)
            .split_whitespace()
            .filter(|token| !self.noise_tokens.contains(*token))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn fold(&self, value: &str) -> String {
        let lowered = value.nfkc().collect::<String>().to_lowercase();

        let unaccented: String = if self.strip_diacritics {
            lowered.nfd().filter(|c| !is_combining_mark(*c)).collect()
        } else {
            lowered.nfc().collect()
        };

        let cleaned: String = if self.strip_punctuation {
            unaccented
                .chars()
                .filter(|c| c.is_alphanumeric() || c.is_whitespace())
                .collect()
        } else {
            unaccented
        };

        cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Identifiers keep their punctuation; only surrounding whitespace and case are dropped.
fn normalize_identifier(value: Option<&str>) -> String {
    value.map(|v| v.trim().to_lowercase()).unwrap_or_default()
}
