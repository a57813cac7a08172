//! Raw review records and their parsed form.
//!
//! A raw record is one review payload as stored by the record source: a JSON
//! object carrying (at least) the product identifier, the rating and the review
//! text.
//!
//! ```json
//! {"asin": "B00002N8CX", "overall": "4.0", "reviewText": "Works great ..."}
//! ```
//!
//! Ratings are stored as decimal text, but plain JSON numbers are accepted as
//! well. Numbers are parsed with [`str::parse`], which does not depend on the
//! process locale.

use serde::Deserialize;

/// One review payload as delivered by a [`RecordSource`](crate::source::RecordSource).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Identifier of the record in its source, used in log messages.
    pub row_key: String,
    /// The JSON payload.
    pub payload: String,
}

impl RawRecord {
    pub fn new(row_key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            row_key: row_key.into(),
            payload: payload.into(),
        }
    }
}

/// A review with the fields the pipeline needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRecord {
    pub product_id: String,
    pub rating: f64,
    pub review_text: String,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ParseRecordError {
    #[display("record '{row_key}': malformed payload: {source}")]
    Json {
        row_key: String,
        source: serde_json::Error,
    },
    #[display("record '{row_key}': rating '{text}' is not a finite number")]
    InvalidRating { row_key: String, text: String },
    #[display("record '{row_key}': product id {product_id:?} is empty or contains a tab or line break")]
    InvalidProductId { row_key: String, product_id: String },
}

/// A JSON scalar read as text, the way the reviews are stored.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScalarText {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl ScalarText {
    fn into_string(self) -> String {
        match self {
            ScalarText::Text(text) => text,
            ScalarText::Number(number) => number.to_string(),
            ScalarText::Bool(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReviewPayload {
    asin: ScalarText,
    overall: ScalarText,
    #[serde(rename = "reviewText")]
    review_text: ScalarText,
}

impl ReviewRecord {
    /// Parses the payload of `record`.
    ///
    /// Fails if the payload is not a JSON object, if `asin`, `overall` or
    /// `reviewText` is missing or not a scalar, if the product id is empty or
    /// cannot be written as a dataset key, or if the rating is not a finite
    /// decimal number.
    pub fn parse(record: &RawRecord) -> Result<Self, ParseRecordError> {
        let payload = serde_json::from_str::<ReviewPayload>(&record.payload).map_err(|source| {
            ParseRecordError::Json {
                row_key: record.row_key.clone(),
                source,
            }
        })?;

        let product_id = payload.asin.into_string();
        if !is_valid_product_id(&product_id) {
            return Err(ParseRecordError::InvalidProductId {
                row_key: record.row_key.clone(),
                product_id,
            });
        }

        let text = payload.overall.into_string();
        let rating = parse_decimal(&text).ok_or_else(|| ParseRecordError::InvalidRating {
            row_key: record.row_key.clone(),
            text,
        })?;

        Ok(Self {
            product_id,
            rating,
            review_text: payload.review_text.into_string(),
        })
    }
}

/// Product ids become dataset keys, which are tab-separated lines.
fn is_valid_product_id(product_id: &str) -> bool {
    !product_id.is_empty() && !product_id.contains(['\t', '\n', '\r'])
}

/// Parses decimal text into a finite `f64`, ignoring surrounding whitespace.
fn parse_decimal(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
