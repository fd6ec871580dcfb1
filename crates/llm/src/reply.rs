//! Model reply parsing
//!
//! Providers are asked for a JSON object but replies still arrive wrapped in
//! code fences, prefixed with prose, or as a bare `ID: 7` line. Parsing only
//! extracts the chosen id; checking it against the catalog is up to the caller.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").unwrap());
static ID_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:service_id|id)\b\W{0,3}(\d{1,4})\b").unwrap());
static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d{1,4})\b").unwrap());

/// Service chosen by the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyChoice {
    /// Raw id as returned; may be outside the catalog
    pub service_id: i64,
    /// Name echoed by the model, informational only
    pub service_name: Option<String>,
}

/// Reply parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    #[error("Empty reply")]
    Empty,

    #[error("Reply JSON has no usable service_id: {0}")]
    MissingServiceId(String),

    #[error("No service id found in reply: {0}")]
    NoServiceId(String),
}

#[derive(Debug, Deserialize)]
struct ReplyPayload {
    #[serde(default, alias = "id", alias = "serviceId")]
    service_id: Option<IdValue>,
    #[serde(default, alias = "name", alias = "serviceName")]
    service_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl IdValue {
    fn as_i64(&self) -> Option<i64> {
        match self {
            IdValue::Int(n) => Some(*n),
            IdValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            IdValue::Float(_) => None,
            IdValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Parse the model reply into a service choice
pub fn parse_reply(text: &str) -> Result<ReplyChoice, ReplyError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ReplyError::Empty);
    }

    let body = strip_code_fence(trimmed);

    if let Some(object) = first_json_object(body) {
        if let Ok(payload) = serde_json::from_str::<ReplyPayload>(object) {
            return match payload.service_id.as_ref().and_then(IdValue::as_i64) {
                Some(service_id) => Ok(ReplyChoice {
                    service_id,
                    service_name: payload.service_name,
                }),
                None => Err(ReplyError::MissingServiceId(snippet(object))),
            };
        }
    }

    let captured = ID_LABEL
        .captures(body)
        .or_else(|| LEADING_NUMBER.captures(body))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok());

    match captured {
        Some(service_id) => Ok(ReplyChoice {
            service_id,
            service_name: None,
        }),
        None => Err(ReplyError::NoServiceId(snippet(body))),
    }
}

fn strip_code_fence(text: &str) -> &str {
    CODE_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
}

/// First balanced `{...}` object in `s`
fn first_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = find_matching_brace(&s[start..])?;
    Some(&s[start..=start + end])
}

/// Index of the brace closing the object that opens at `s[0]`
fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            },
            _ => {},
        }
    }

    None
}

fn snippet(s: &str) -> String {
    s.chars().take(120).collect()
}
