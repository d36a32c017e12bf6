//! Turns raw model text into a validated [`Forecast`] or a rejection.
//!
//! The model output is untrusted. Nothing is assumed about its shape beyond
//! what is checked here, and a single violated rule rejects the whole reply.

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::forecast::{
    FactorTrend, Forecast, KeyFactor, OutcomeProbabilities, Source, TimelineCategory,
    KEY_FACTOR_COUNT,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("AI response is not valid JSON: {0}")]
    Parse(String),

    #[error("AI response is not a JSON object")]
    NotAnObject,

    #[error("AI response is missing required field `{0}`")]
    MissingField(String),

    #[error("field `{field}` must be {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("field `{field}` has illegal value {value:?}")]
    IllegalValue { field: String, value: String },

    #[error("field `{field}` must have exactly {expected} entries, found {found}")]
    WrongArity {
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("field `{0}` is empty")]
    EmptyText(String),

    #[error("probability `{0}` must be a non-negative number")]
    InvalidProbability(String),

    #[error("probabilities sum to {sum}, expected 100")]
    ProbabilitySum { sum: f64 },
}

fn whole_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^```\w*\s*(.*?)\s*```$").expect("fence regex must compile")
    })
}

fn inner_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```\w*\s*(.*?)\s*```").expect("fence regex must compile")
    })
}

fn citation_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\s*\[\d+(?:\s*,\s*\d+)*\]").expect("citation regex must compile")
    })
}

/// Remove a fenced block wrapping the whole text. Unfenced text passes
/// through trimmed.
pub fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match whole_fence().captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) if !inner.as_str().trim().is_empty() => inner.as_str().trim(),
        _ => trimmed,
    }
}

/// Locate the JSON object inside the model reply.
///
/// Order: a fence around the whole reply, a bare object, the first fenced
/// block inside prose, then the outermost `{...}` span inside prose.
pub fn extract_payload(text: &str) -> &str {
    let unfenced = strip_fence(text);
    if unfenced.len() != text.trim().len() || unfenced.starts_with('{') {
        return unfenced;
    }
    if let Some(inner) = inner_fence().captures(unfenced).and_then(|c| c.get(1)) {
        let inner = inner.as_str().trim();
        if inner.starts_with('{') {
            return inner;
        }
    }
    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => unfenced,
    }
}

/// Remove bracketed numeric citation markers such as `[1]` or `[1, 2]`.
///
/// Repeats until nothing matches, so removing a marker can never expose a
/// new one and a second pass is always a no-op.
pub fn strip_citations(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = citation_marker().replace_all(&current, "");
        if next == current {
            return current;
        }
        current = next.into_owned();
    }
}

/// Keep the first source per uri, dropping incomplete entries.
pub fn dedup_sources(sources: impl IntoIterator<Item = Source>) -> Vec<Source> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(Source::is_complete)
        .filter(|s| seen.insert(s.uri.clone()))
        .collect()
}

pub fn normalize(raw: &str) -> Result<Forecast, ValidationError> {
    normalize_with_sources(raw, Vec::new())
}

/// Normalize `raw`, merging `grounding` sources (first) with any sources
/// the payload itself lists.
pub fn normalize_with_sources(
    raw: &str,
    grounding: Vec<Source>,
) -> Result<Forecast, ValidationError> {
    let payload = extract_payload(raw);
    let value: Value =
        serde_json::from_str(payload).map_err(|e| ValidationError::Parse(e.to_string()))?;
    let root = value.as_object().ok_or(ValidationError::NotAnObject)?;

    let timeline_category = category(root)?;
    let timeline_justification = text(root, "", "timelineJustification")?;
    let key_factors = key_factors(root)?;
    let outcome_probabilities = probabilities(root)?;
    let payload_sources = payload_sources(root)?;

    Ok(Forecast {
        timeline_category,
        timeline_justification,
        key_factors,
        outcome_probabilities,
        sources: dedup_sources(grounding.into_iter().chain(payload_sources)),
    })
}

fn path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

fn field<'a>(
    obj: &'a Map<String, Value>,
    parent: &str,
    name: &str,
) -> Result<&'a Value, ValidationError> {
    match obj.get(name) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(path(parent, name))),
        Some(v) => Ok(v),
    }
}

fn string<'a>(
    obj: &'a Map<String, Value>,
    parent: &str,
    name: &str,
) -> Result<&'a str, ValidationError> {
    field(obj, parent, name)?
        .as_str()
        .ok_or_else(|| ValidationError::WrongType {
            field: path(parent, name),
            expected: "a string",
        })
}

fn text(obj: &Map<String, Value>, parent: &str, name: &str) -> Result<String, ValidationError> {
    let cleaned = strip_citations(string(obj, parent, name)?).trim().to_string();
    if cleaned.is_empty() {
        return Err(ValidationError::EmptyText(path(parent, name)));
    }
    Ok(cleaned)
}

fn category(root: &Map<String, Value>) -> Result<TimelineCategory, ValidationError> {
    let raw = string(root, "", "timelineCategory")?;
    TimelineCategory::parse(raw.trim()).ok_or_else(|| ValidationError::IllegalValue {
        field: "timelineCategory".to_string(),
        value: raw.to_string(),
    })
}

fn key_factors(root: &Map<String, Value>) -> Result<Vec<KeyFactor>, ValidationError> {
    let items = field(root, "", "keyFactors")?
        .as_array()
        .ok_or_else(|| ValidationError::WrongType {
            field: "keyFactors".to_string(),
            expected: "an array",
        })?;
    if items.len() != KEY_FACTOR_COUNT {
        return Err(ValidationError::WrongArity {
            field: "keyFactors".to_string(),
            expected: KEY_FACTOR_COUNT,
            found: items.len(),
        });
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| -> Result<KeyFactor, ValidationError> {
            let at = format!("keyFactors[{}]", i);
            let obj = item.as_object().ok_or_else(|| ValidationError::WrongType {
                field: at.clone(),
                expected: "an object",
            })?;
            let raw_trend = string(obj, &at, "trend")?;
            let trend = FactorTrend::parse(raw_trend.trim()).ok_or_else(|| {
                ValidationError::IllegalValue {
                    field: path(&at, "trend"),
                    value: raw_trend.to_string(),
                }
            })?;
            Ok(KeyFactor {
                title: text(obj, &at, "title")?,
                impact: text(obj, &at, "impact")?,
                trend,
            })
        })
        .collect()
}

fn probabilities(root: &Map<String, Value>) -> Result<OutcomeProbabilities, ValidationError> {
    const PARENT: &str = "outcomeProbabilities";
    let obj = field(root, "", PARENT)?
        .as_object()
        .ok_or_else(|| ValidationError::WrongType {
            field: PARENT.to_string(),
            expected: "an object",
        })?;

    let mut values = [0.0_f64; 3];
    for (slot, name) in values.iter_mut().zip(OutcomeProbabilities::FIELDS) {
        let n = field(obj, PARENT, name)?
            .as_f64()
            .ok_or_else(|| ValidationError::WrongType {
                field: path(PARENT, name),
                expected: "a number",
            })?;
        if !n.is_finite() || n < 0.0 {
            return Err(ValidationError::InvalidProbability(path(PARENT, name)));
        }
        *slot = n;
    }

    let [ukraine_win, frozen_conflict, russia_win] = values;
    let probs = OutcomeProbabilities {
        ukraine_win,
        frozen_conflict,
        russia_win,
    };
    if !probs.sums_to_hundred() {
        return Err(ValidationError::ProbabilitySum {
            sum: values.iter().sum(),
        });
    }
    Ok(probs)
}

fn payload_sources(root: &Map<String, Value>) -> Result<Vec<Source>, ValidationError> {
    let items = match root.get("sources") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ValidationError::WrongType {
                field: "sources".to_string(),
                expected: "an array",
            })
        }
    };
    Ok(items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            let uri = obj.get("uri")?.as_str()?.trim();
            let title = strip_citations(obj.get("title")?.as_str()?);
            Some(Source::new(uri, title.trim()))
        })
        .collect())
}
