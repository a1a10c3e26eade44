//! Extracted-text validation and normalization
//!
//! An ordered pipeline of named rules. Every rejection names the rule that
//! fired, so each rule is testable on its own. The same stored-value rules
//! decide both acceptance and completeness: a value the normalizer would
//! reject today is a value the scanner re-opens today, so the store and the
//! scanner can never disagree about what counts as done.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::ExtractionField;
use crate::services::extractor::RawCandidate;

/// Default minimum accepted length, in characters (the payload is CJK text;
/// byte length would triple-count)
pub const DEFAULT_MIN_LENGTH: usize = 8;

/// Substrings marking a refusal response from the extractor
const REFUSAL_MARKERS: &[&str] = &[
    "无法识别",
    "无法确定",
    "无法提取",
    "看不清",
    "抱歉",
    "对不起",
    "i cannot",
    "i can't",
    "unable to",
    "sorry",
];

/// Generic seed values that predate the backfill; echoing one of these is
/// not a successful extraction
const PLACEHOLDERS: &[&str] = &[
    "按图示完成练习",
    "按图示完成本页练习",
    "见图片",
    "待补充",
];

/// Trailing pass-requirement clause bleeding into a description extraction
static DESCRIPTION_TRAILING: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?s)[，。；;,.\s]*(过关要求|通关要求|过关标准)\s*[：:]?.*$").unwrap(),
    ]
});

/// Trailing description clause bleeding into a requirement extraction
static REQUIREMENT_TRAILING: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?s)[，。；;,.\s]*(题目说明|答题说明)\s*[：:]?.*$").unwrap(),
    ]
});

/// Punctuation trimmed from the ends of a candidate
const EDGE_PUNCTUATION: &[char] = &[
    '。', '，', '、', '；', '：', '！', '？', ',', '.', ';', ':', '!', '?',
];

/// Why a candidate was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The extractor returned no text
    Empty,
    /// The extractor refused, or the text matches a refusal phrase
    Refusal,
    /// Below the minimum character count
    TooShort,
    /// Equal to a known generic seed placeholder
    Placeholder,
}

impl RejectReason {
    pub fn rule_name(&self) -> &'static str {
        match self {
            RejectReason::Empty => "empty",
            RejectReason::Refusal => "refusal",
            RejectReason::TooShort => "too_short",
            RejectReason::Placeholder => "placeholder",
        }
    }
}

/// Validates and canonicalizes raw extractor output for one field
#[derive(Debug, Clone)]
pub struct Normalizer {
    field: ExtractionField,
    min_length: usize,
}

impl Normalizer {
    pub fn new(field: ExtractionField, min_length: usize) -> Self {
        Self { field, min_length }
    }

    /// Full normalization pipeline for a fresh extractor response.
    ///
    /// Deterministic and side-effect-free. Rules fire in a fixed order:
    /// refusal/empty, label-prefix strip, trailing-clause strip, punctuation
    /// trim, minimum length, placeholder.
    pub fn normalize(&self, raw: &RawCandidate) -> Result<String, RejectReason> {
        if raw.refused {
            return Err(RejectReason::Refusal);
        }

        let text = raw.text.as_deref().map(str::trim).unwrap_or("");
        if text.is_empty() {
            return Err(RejectReason::Empty);
        }
        if is_refusal(text) {
            return Err(RejectReason::Refusal);
        }

        let text = strip_label_prefix(text, self.field);
        let text = strip_trailing_clauses(text, self.field);
        let text = trim_edges(&text).to_string();

        self.validate_stored(&text)?;
        Ok(text)
    }

    /// The completeness predicate shared with the scanner: the rules that
    /// apply to values already in canonical form.
    pub fn validate_stored(&self, value: &str) -> Result<(), RejectReason> {
        let value = value.trim();
        if value.is_empty() {
            return Err(RejectReason::Empty);
        }
        if is_refusal(value) {
            return Err(RejectReason::Refusal);
        }
        if value.chars().count() < self.min_length {
            return Err(RejectReason::TooShort);
        }
        if PLACEHOLDERS.contains(&value) {
            return Err(RejectReason::Placeholder);
        }
        Ok(())
    }
}

fn is_refusal(text: &str) -> bool {
    let lowered = text.to_lowercase();
    REFUSAL_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Strip one leading field-label prefix, if present
fn strip_label_prefix(text: &str, field: ExtractionField) -> &str {
    for prefix in field.label_prefixes() {
        if let Some(rest) = text.strip_prefix(prefix) {
            return rest.trim_start();
        }
    }
    text
}

/// Strip trailing clauses that belong to the other field
fn strip_trailing_clauses(text: &str, field: ExtractionField) -> String {
    let patterns: &[Regex] = match field {
        ExtractionField::Description => &DESCRIPTION_TRAILING,
        ExtractionField::Requirement => &REQUIREMENT_TRAILING,
    };

    let mut result = text.to_string();
    for pattern in patterns {
        // Patterns are anchored to the end of the text, so cutting at the
        // match start removes the whole foreign clause
        let clause_start = pattern.find(&result).map(|m| m.start());
        if let Some(start) = clause_start {
            result.truncate(start);
        }
    }
    result
}

/// Trim punctuation, whitespace and newlines from both ends
fn trim_edges(text: &str) -> &str {
    text.trim()
        .trim_end_matches(|c: char| c.is_whitespace() || EDGE_PUNCTUATION.contains(&c))
        .trim()
}
