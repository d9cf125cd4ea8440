//! Review record model
//!
//! Raw input lines are untyped JSON objects. [`normalize`] is the single
//! boundary where they become a fixed-shape [`Review`]: every optional field
//! gets its default here and nowhere else in the pipeline.
//!
//! Coercion follows the loose rules of the upstream dumps: numbers may arrive
//! as strings, booleans count as 0/1, and text fields accept any scalar.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::Error;

/// One normalized review, in table column order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    /// Star rating, always finite; expected in [0, 5] but not enforced
    pub rating: f32,
    pub title: String,
    pub text: String,
    /// JSON-encoded array of image URLs
    pub images: String,
    /// Product identifier
    pub asin: String,
    pub parent_asin: String,
    /// Reviewer identifier
    pub user_id: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub helpful_vote: u32,
    pub verified_purchase: bool,
}

impl Review {
    /// Deduplication identity of this review
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            asin: self.asin.clone(),
            user_id: self.user_id.clone(),
            timestamp: self.timestamp,
        }
    }

    /// `verified_purchase` as persisted (0 or 1)
    pub fn verified_flag(&self) -> u8 {
        u8::from(self.verified_purchase)
    }
}

impl Default for Review {
    fn default() -> Self {
        Self {
            rating: 0.0,
            title: String::new(),
            text: String::new(),
            images: "[]".to_string(),
            asin: String::new(),
            parent_asin: String::new(),
            user_id: String::new(),
            timestamp: 0,
            helpful_vote: 0,
            verified_purchase: false,
        }
    }
}

/// Natural key `(asin, user_id, timestamp)`
///
/// Uniqueness is an assumption of the loader, not a store constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
    pub asin: String,
    pub user_id: String,
    pub timestamp: i64,
}

impl NaturalKey {
    pub fn new(asin: impl Into<String>, user_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            asin: asin.into(),
            user_id: user_id.into(),
            timestamp,
        }
    }
}

/// Why a raw JSON value could not be normalized
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    /// Top-level value is not an object
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    /// A field is present but cannot be coerced to its column type
    #[error("field `{field}`: {reason}")]
    Field { field: &'static str, reason: String },
}

impl NormalizeError {
    /// Attach the input line number
    pub fn at_line(self, line: usize) -> Error {
        Error::MalformedRecord {
            line,
            reason: self.to_string(),
        }
    }
}

/// Normalize one raw JSON object into a [`Review`]
///
/// Missing fields take their defaults. Present fields that cannot be coerced
/// (e.g. `"rating": "five"`, `"timestamp": null`) are errors; the caller decides
/// whether that aborts the run or skips the line.
pub fn normalize(raw: &Value) -> Result<Review, NormalizeError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| NormalizeError::NotAnObject(kind_of(raw)))?;

    let helpful_vote = match obj.get("helpful_vote") {
        Some(v) => {
            let votes = coerce_i64("helpful_vote", v)?;
            u32::try_from(votes).map_err(|_| NormalizeError::Field {
                field: "helpful_vote",
                reason: format!("{} is out of range for an unsigned 32-bit count", votes),
            })?
        }
        None => 0,
    };

    Ok(Review {
        rating: match obj.get("rating") {
            Some(v) => coerce_f32("rating", v)?,
            None => 0.0,
        },
        title: text_field(obj, "title"),
        text: text_field(obj, "text"),
        images: obj
            .get("images")
            .map(Value::to_string)
            .unwrap_or_else(|| "[]".to_string()),
        asin: text_field(obj, "asin"),
        parent_asin: text_field(obj, "parent_asin"),
        user_id: text_field(obj, "user_id"),
        timestamp: match obj.get("timestamp") {
            Some(v) => coerce_i64("timestamp", v)?,
            None => 0,
        },
        helpful_vote,
        verified_purchase: obj.get("verified_purchase").map(is_truthy).unwrap_or(false),
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn text_field(obj: &Map<String, Value>, field: &str) -> String {
    obj.get(field).map(coerce_string).unwrap_or_default()
}

fn coerce_f32(field: &'static str, value: &Value) -> Result<f32, NormalizeError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    let f = parsed.ok_or_else(|| NormalizeError::Field {
        field,
        reason: format!("cannot convert {} to a float", describe(value)),
    })?;

    // NaN and infinities cannot be stored in a NOT NULL REAL column
    let narrowed = f as f32;
    if narrowed.is_finite() {
        Ok(narrowed)
    } else {
        Err(NormalizeError::Field {
            field,
            reason: format!("{} is not a finite 32-bit float", describe(value)),
        })
    }
}

fn coerce_i64(field: &'static str, value: &Value) -> Result<i64, NormalizeError> {
    let err = |reason: String| NormalizeError::Field { field, reason };
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            if n.is_u64() {
                return Err(err(format!("{} does not fit in a signed 64-bit integer", n)));
            }
            // Floats truncate toward zero
            let f = n.as_f64().unwrap_or(f64::NAN);
            if f.is_finite() && f.trunc() >= i64::MIN as f64 && f.trunc() < i64::MAX as f64 {
                Ok(f.trunc() as i64)
            } else {
                Err(err(format!("{} does not fit in a signed 64-bit integer", n)))
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| err(format!("cannot convert {} to an integer", describe(value)))),
        Value::Bool(b) => Ok(i64::from(*b)),
        _ => Err(err(format!("cannot convert {} to an integer", describe(value)))),
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("string {:?}", s),
        other => kind_of(other).to_string(),
    }
}
