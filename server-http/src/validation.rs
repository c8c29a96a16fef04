use crate::api::{CreateMaskedUrlRequest, ExtendMaskedUrlRequest, ListMaskedUrlsQuery};
use std::time::Duration;

// Constants for validation ranges
const MAX_TTL_SECS: u64 = 7 * 24 * 3600; // 1 week
const MAX_URL_LEN: usize = 8192;
const MAX_FILENAME_LEN: usize = 255;
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 1000;

#[derive(Debug, PartialEq)]
pub enum ValidationError {
    MissingRequiredField { field: &'static str },
    InvalidUrl { reason: &'static str },
    TooLong { field: &'static str, max: usize },
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingRequiredField { field } => {
                write!(f, "Missing required field '{}'", field)
            }
            ValidationError::InvalidUrl { reason } => write!(f, "Invalid url: {}", reason),
            ValidationError::TooLong { field, max } => {
                write!(f, "Field '{}' is longer than {} characters", field, max)
            }
            ValidationError::OutOfRange {
                field,
                value,
                min,
                max,
            } => {
                write!(
                    f,
                    "Field '{}' value {} is out of range (min: {}, max: {})",
                    field, value, min, max
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// A create request that passed validation.
#[derive(Debug, PartialEq)]
pub struct MaskedUrlSpec {
    pub url: String,
    pub filename: String,
    pub ttl: Option<Duration>,
}

pub fn validate_create(req: CreateMaskedUrlRequest) -> Result<MaskedUrlSpec, ValidationError> {
    let url = req.url.trim();
    if url.is_empty() {
        return Err(ValidationError::MissingRequiredField { field: "url" });
    }
    if url.len() > MAX_URL_LEN {
        return Err(ValidationError::TooLong {
            field: "url",
            max: MAX_URL_LEN,
        });
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ValidationError::InvalidUrl {
            reason: "scheme must be http or https",
        });
    }

    let filename = req.filename.trim();
    if filename.chars().count() > MAX_FILENAME_LEN {
        return Err(ValidationError::TooLong {
            field: "filename",
            max: MAX_FILENAME_LEN,
        });
    }

    let ttl = req
        .ttl_secs
        .map(|secs| seconds_in_range("ttl_secs", secs))
        .transpose()?;

    Ok(MaskedUrlSpec {
        url: url.to_string(),
        filename: filename.to_string(),
        ttl,
    })
}

pub fn validate_extend(req: &ExtendMaskedUrlRequest) -> Result<Duration, ValidationError> {
    seconds_in_range("seconds", req.seconds)
}

/// Missing limit means the default; anything above the ceiling is clamped.
pub fn list_limit(query: &ListMaskedUrlsQuery) -> usize {
    query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT)
}

fn seconds_in_range(field: &'static str, secs: u64) -> Result<Duration, ValidationError> {
    if !(1..=MAX_TTL_SECS).contains(&secs) {
        return Err(ValidationError::OutOfRange {
            field,
            value: secs,
            min: 1,
            max: MAX_TTL_SECS,
        });
    }
    Ok(Duration::from_secs(secs))
}
