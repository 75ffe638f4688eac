//! Normalization of raw marketplace payloads.
//!
//! Marketplaces disagree on field names; this module maps the common aliases
//! into one `NormalizedRecord`. A record that cannot be normalized fails on
//! its own (the batch continues without it).

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use unibox_core::domain::interaction::Channel;

use crate::types::RawItem;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("rating {0} outside the 1..=5 range")]
    InvalidRating(i64),
    #[error("unparseable timestamp `{0}`")]
    InvalidTimestamp(String),
}

/// A raw record with canonical field names, ready for upsert.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedRecord {
    pub external_id: String,
    pub customer_id: Option<String>,
    pub order_id: Option<String>,
    pub product_id: Option<String>,
    pub thread_id: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
    pub rating: Option<u8>,
    pub needs_response: bool,
    pub occurred_at: DateTime<Utc>,
}

const EXTERNAL_ID_ALIASES: &[&str] =
    &["external_id", "id", "review_id", "question_id", "message_id"];
const CUSTOMER_ID_ALIASES: &[&str] = &["customer_id", "buyer_id", "author_id", "user_id"];
const ORDER_ID_ALIASES: &[&str] = &["order_id", "order_ref"];
const PRODUCT_ID_ALIASES: &[&str] = &["product_id", "asin", "sku", "item_id", "listing_id"];
const THREAD_ID_ALIASES: &[&str] = &["thread_id", "conversation_id"];
const SUBJECT_ALIASES: &[&str] = &["subject", "title", "headline"];
const TEXT_ALIASES: &[&str] = &["text", "body", "content", "message", "comment"];
const RATING_ALIASES: &[&str] = &["rating", "stars", "score"];
const OCCURRED_AT_ALIASES: &[&str] = &["occurred_at", "created_at", "timestamp", "date"];
const NEEDS_RESPONSE_ALIASES: &[&str] = &["needs_response", "requires_response", "unanswered"];

pub fn normalize_item(
    item: &RawItem,
    channel: Channel,
) -> Result<NormalizedRecord, NormalizationError> {
    let payload = &item.payload;

    let external_id = first_string(payload, EXTERNAL_ID_ALIASES)
        .ok_or(NormalizationError::MissingField("external_id"))?;

    let rating = match first_value(payload, RATING_ALIASES).and_then(Value::as_i64) {
        Some(raw) if channel == Channel::Review => {
            if !(1..=5).contains(&raw) {
                return Err(NormalizationError::InvalidRating(raw));
            }
            Some(raw as u8)
        }
        // Ratings only carry meaning on reviews; drop them elsewhere.
        _ => None,
    };

    let occurred_at = parse_occurred_at(payload)?;

    let needs_response = first_value(payload, NEEDS_RESPONSE_ALIASES)
        .and_then(Value::as_bool)
        .unwrap_or(true);

    Ok(NormalizedRecord {
        external_id,
        customer_id: first_string(payload, CUSTOMER_ID_ALIASES),
        order_id: first_string(payload, ORDER_ID_ALIASES),
        product_id: first_string(payload, PRODUCT_ID_ALIASES),
        thread_id: first_string(payload, THREAD_ID_ALIASES),
        subject: first_string(payload, SUBJECT_ALIASES),
        text: first_string(payload, TEXT_ALIASES),
        rating,
        needs_response,
        occurred_at,
    })
}

fn first_value<'a>(payload: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|alias| payload.get(alias)).filter(|value| !value.is_null())
}

fn first_string(payload: &Value, aliases: &[&str]) -> Option<String> {
    let value = first_value(payload, aliases)?;
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn parse_occurred_at(payload: &Value) -> Result<DateTime<Utc>, NormalizationError> {
    let value = first_value(payload, OCCURRED_AT_ALIASES)
        .ok_or(NormalizationError::MissingField("occurred_at"))?;

    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|_| NormalizationError::InvalidTimestamp(raw.clone())),
        Value::Number(number) => number
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| NormalizationError::InvalidTimestamp(number.to_string())),
        other => Err(NormalizationError::InvalidTimestamp(other.to_string())),
    }
}
