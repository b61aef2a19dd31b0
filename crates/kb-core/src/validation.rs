//! Shape checks for incoming API requests.
//!
//! Each check reports every failing field, not just the first one.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::{domain::Category, utils::char_len};

pub const MIN_DAYS_BACK: u32 = 1;
pub const MAX_DAYS_BACK: u32 = 90;
pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_QUERY_CHARS: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractParams {
    pub channel_ids: Vec<String>,
    pub days_back: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchParams {
    pub query: String,
    pub category: Option<Category>,
}

fn channel_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[CG][A-Z0-9]{8,}$").expect("valid regex"))
}

/// Public (`C…`) or private/group (`G…`) channel id.
pub fn is_valid_channel_id(id: &str) -> bool {
    channel_id_pattern().is_match(id)
}

/// Validate a `POST /api/extract` body.
pub fn validate_extract(body: &Value) -> Result<ExtractParams, Vec<FieldError>> {
    let mut errors = Vec::new();
    let mut channel_ids = Vec::new();

    match body.get("channelIds") {
        Some(Value::Array(ids)) if ids.is_empty() => {
            errors.push(FieldError::new(
                "channelIds",
                "At least one channel must be selected",
            ));
        }
        Some(Value::Array(ids)) => {
            for (i, id) in ids.iter().enumerate() {
                let field = format!("channelIds[{i}]");
                match id.as_str() {
                    None => errors.push(FieldError::new(field, "Each channel ID must be a string")),
                    Some(s) if !is_valid_channel_id(s) => {
                        errors.push(FieldError::new(field, "Invalid channel ID format"))
                    }
                    Some(s) => channel_ids.push(s.to_string()),
                }
            }
        }
        _ => errors.push(FieldError::new("channelIds", "channelIds must be an array")),
    }

    let days_back = match body.get("daysBack") {
        None | Some(Value::Null) => None,
        Some(v) => match as_integer(v)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| (MIN_DAYS_BACK..=MAX_DAYS_BACK).contains(n))
        {
            Some(n) => Some(n),
            None => {
                errors.push(FieldError::new(
                    "daysBack",
                    format!("daysBack must be between {MIN_DAYS_BACK} and {MAX_DAYS_BACK}"),
                ));
                None
            }
        },
    };

    if errors.is_empty() {
        Ok(ExtractParams {
            channel_ids,
            days_back,
        })
    } else {
        Err(errors)
    }
}

fn as_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Validate `GET /api/search` query parameters.
pub fn validate_search(
    query: Option<&str>,
    category: Option<&str>,
) -> Result<SearchParams, Vec<FieldError>> {
    let mut errors = Vec::new();

    let query = match query {
        None | Some("") => {
            errors.push(FieldError::new("q", "Search query is required"));
            None
        }
        Some(q) => {
            let n = char_len(q);
            if (MIN_QUERY_CHARS..=MAX_QUERY_CHARS).contains(&n) {
                Some(q.to_string())
            } else {
                errors.push(FieldError::new(
                    "q",
                    format!(
                        "Search query must be between {MIN_QUERY_CHARS} and {MAX_QUERY_CHARS} characters"
                    ),
                ));
                None
            }
        }
    };

    let category = match category.filter(|c| !c.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<Category>() {
            Ok(c) => Some(c),
            Err(_) => {
                errors.push(FieldError::new("category", "Invalid category"));
                None
            }
        },
    };

    match query {
        Some(query) if errors.is_empty() => Ok(SearchParams { query, category }),
        _ => Err(errors),
    }
}
