//! Data points and numeric normalization.
//!
//! Models report quantities as text ("$1.2 billion", "130,000", "35%") with
//! free-form units ("millions of dollars"). Everything here turns that into
//! an `f64` plus a unit string that can be compared, without ever converting
//! between different units.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How sure the extraction step is about a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Parse model text; anything unrecognized counts as low.
    pub fn parse_lenient(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().chars().next() {
            Some('h') => Self::High,
            Some('m') => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::Low
    }
}

/// One candidate value for a component, with its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub value: f64,
    pub unit: String,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    pub source_snippet: String,
    pub extraction_confidence: Confidence,
    /// Rank of the originating search result (0 = top hit).
    pub rank: usize,
}

impl DataPoint {
    pub fn new(value: f64, unit: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
            source_url: source_url.into(),
            source_title: None,
            source_snippet: String::new(),
            extraction_confidence: Confidence::Low,
            rank: 0,
        }
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.extraction_confidence = confidence;
        self
    }

    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.source_snippet = snippet.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.source_title = Some(title.into());
        self
    }
}

/// A number read from text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub value: f64,
    /// The text carried a percent sign; `value` is already a fraction.
    pub percent: bool,
    /// The text carried a scale word ("1.2 billion"); `value` is already
    /// multiplied out.
    pub scaled: bool,
}

impl Quantity {
    /// A bare number with no percent sign or scale word.
    pub fn plain(value: f64) -> Self {
        Self {
            value,
            percent: false,
            scaled: false,
        }
    }
}

static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(-)?([$€£])?(\d[\d,]*(?:\.\d+)?|\.\d+)\s*(%|percent\b|k\b|thousand\b|mn\b|m\b|million\b|bn\b|b\b|billion\b|tn\b|trillion\b)?",
    )
    .unwrap()
});

fn scale_factor(word: &str) -> Option<f64> {
    match word {
        "k" | "thousand" => Some(1e3),
        "m" | "mn" | "million" => Some(1e6),
        "b" | "bn" | "billion" => Some(1e9),
        "tn" | "trillion" => Some(1e12),
        _ => None,
    }
}

/// Scale words allowed inside a unit. Single letters are excluded there:
/// "m" or "t" in a unit more likely means meters or tonnes.
fn unit_scale_factor(word: &str) -> Option<f64> {
    match word.trim_end_matches('s') {
        "thousand" => Some(1e3),
        "mn" | "million" => Some(1e6),
        "bn" | "billion" => Some(1e9),
        "trillion" => Some(1e12),
        _ => None,
    }
}

/// One number found in the text.
struct Candidate {
    quantity: Quantity,
    /// Carries a currency sign, scale word or percent sign.
    marked: bool,
    /// A bare four-digit number that reads as a year ("FY2023").
    year_like: bool,
}

fn candidates(text: &str) -> Vec<Candidate> {
    QUANTITY
        .captures_iter(text)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let digits = captures.get(3)?.as_str();
            let mut value: f64 = digits.replace(',', "").parse().ok()?;
            let currency = captures.get(2).is_some();
            let mut percent = false;
            let mut scaled = false;

            let suffix = captures.get(4).map(|m| m.as_str().to_ascii_lowercase());
            if let Some(suffix) = &suffix {
                if suffix == "%" || suffix == "percent" {
                    value /= 100.0;
                    percent = true;
                } else if let Some(factor) = scale_factor(suffix) {
                    value *= factor;
                    scaled = true;
                }
            }

            // "300-500" is a range, not a negative number.
            let after_word = text[..whole.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
            let negative = captures.get(1).is_some() && !after_word;
            if negative {
                value = -value;
            }

            let year_like = !negative
                && !currency
                && suffix.is_none()
                && digits.len() == 4
                && digits.bytes().all(|b| b.is_ascii_digit())
                && (1900.0..=2100.0).contains(&value);

            value.is_finite().then_some(Candidate {
                quantity: Quantity {
                    value,
                    percent,
                    scaled,
                },
                marked: currency || suffix.is_some(),
                year_like,
            })
        })
        .collect()
}

/// Read the quantity in `raw`, applying scale words and percent signs.
///
/// Years are skipped when the text has another number. When several numbers
/// remain, the single one carrying a currency sign, scale word or percent
/// sign wins; otherwise the text is ambiguous and `None` is returned.
pub fn parse_quantity(raw: &str) -> Option<Quantity> {
    let found = candidates(raw.trim());
    let pool: Vec<&Candidate> = if found.iter().all(|c| c.year_like) {
        found.iter().collect()
    } else {
        found.iter().filter(|c| !c.year_like).collect()
    };

    match pool.as_slice() {
        [] => None,
        [only] => Some(only.quantity),
        many => {
            let mut marked = many.iter().filter(|c| c.marked);
            match (marked.next(), marked.next()) {
                (Some(candidate), None) => Some(candidate.quantity),
                _ => None,
            }
        }
    }
}

/// Read the number in `raw`; see [`parse_quantity`].
pub fn parse_numeric(raw: &str) -> Option<f64> {
    parse_quantity(raw).map(|q| q.value)
}

const UNRECOGNIZED_UNITS: &[&str] = &["", "unknown", "n/a", "na", "none", "null", "-", "?"];

fn is_percent_unit(unit: &str) -> bool {
    matches!(unit, "%" | "percent" | "percentage" | "pct" | "per cent")
}

/// Whether a unit string names something.
pub fn is_recognizable_unit(unit: &str) -> bool {
    !UNRECOGNIZED_UNITS.contains(&unit.trim().to_ascii_lowercase().as_str())
}

/// Fold a reported unit into the value: scale words multiply the value and
/// percentages become ratios. Returns `None` when the unit is not
/// recognizable.
pub fn normalize_reading(quantity: Quantity, unit: &str) -> Option<(f64, String)> {
    let lowered = unit.trim().to_ascii_lowercase();

    if is_percent_unit(&lowered) || (quantity.percent && !is_recognizable_unit(&lowered)) {
        let value = if quantity.percent {
            quantity.value
        } else {
            quantity.value / 100.0
        };
        return Some((value, "ratio".to_string()));
    }

    let mut value = quantity.value;
    let mut kept: Vec<&str> = Vec::new();
    let mut after_scale = false;
    for word in unit.split_whitespace() {
        let bare = word
            .trim_matches(|c: char| c == '(' || c == ')' || c == ',')
            .to_ascii_lowercase();
        if let Some(factor) = unit_scale_factor(&bare) {
            // "1.2 billion" with unit "billion USD" names the scale twice.
            if !quantity.scaled {
                value *= factor;
            }
            after_scale = true;
            continue;
        }
        if after_scale && bare == "of" {
            after_scale = false;
            continue;
        }
        after_scale = false;
        kept.push(word);
    }

    let unit = kept.join(" ");
    let unit = unit.trim_matches(|c: char| c == '(' || c == ')' || c.is_whitespace());
    if !is_recognizable_unit(unit) {
        return None;
    }
    Some((value, unit.to_string()))
}

/// Canonical form used for comparing units.
pub fn normalize_unit(unit: &str) -> String {
    let lowered = unit.trim().to_ascii_lowercase();
    if is_percent_unit(&lowered) || lowered == "fraction" || lowered == "share" {
        return "ratio".to_string();
    }

    lowered
        .replace('/', " per ")
        .split_whitespace()
        .map(|w| match w {
            "$" | "us$" | "usd" | "dollar" | "dollars" => "usd".to_string(),
            w if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") => {
                w.trim_end_matches('s').to_string()
            }
            w => w.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether two units name the same thing.
pub fn units_match(a: &str, b: &str) -> bool {
    normalize_unit(a) == normalize_unit(b)
}
