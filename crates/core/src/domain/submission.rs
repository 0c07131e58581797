use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::UserId;
use crate::errors::ValidationError;

/// A design posted for quality control.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub designer: UserId,
    pub order_id: String,
    pub submitted_at: DateTime<Utc>,
    pub media_urls: Vec<String>,
}

impl Submission {
    pub fn new(
        designer: UserId,
        order_id: &str,
        raw_media: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(ValidationError::EmptyField("order_id"));
        }
        let media_urls = parse_media_urls(raw_media)?;
        Ok(Self { designer, order_id: order_id.to_owned(), submitted_at, media_urls })
    }

    /// Only the first URL is displayed; the rest stay on the record.
    pub fn primary_media(&self) -> &str {
        self.media_urls.first().map(String::as_str).unwrap_or_default()
    }
}

/// Splits a comma-separated link list, trimming each entry and dropping blanks.
pub fn parse_media_urls(raw: &str) -> Result<Vec<String>, ValidationError> {
    let urls = raw
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect::<Vec<_>>();

    if urls.is_empty() {
        return Err(ValidationError::NoMediaUrls);
    }
    Ok(urls)
}
