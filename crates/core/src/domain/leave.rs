use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::decision::check_reason_length;
use crate::domain::ids::UserId;
use crate::errors::ValidationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveUnit {
    Day,
    Month,
    Year,
}

impl LeaveUnit {
    /// Calendar-naive length: months are 31 days and years 365.
    pub fn days(self) -> u64 {
        match self {
            Self::Day => 1,
            Self::Month => 31,
            Self::Year => 365,
        }
    }

    fn from_suffix(suffix: char) -> Option<Self> {
        match suffix.to_ascii_lowercase() {
            'd' => Some(Self::Day),
            'm' => Some(Self::Month),
            'y' => Some(Self::Year),
            _ => None,
        }
    }
}

/// A `<digits><unit>` token such as `5d`, `2m` or `1Y`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveDuration {
    pub amount: u64,
    pub unit: LeaveUnit,
    token: String,
}

impl LeaveDuration {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn total_days(&self) -> Option<u64> {
        self.amount.checked_mul(self.unit.days())
    }

    pub fn end_from(&self, start: DateTime<Utc>) -> Result<DateTime<Utc>, ValidationError> {
        let out_of_range = || ValidationError::DurationOutOfRange(self.token.clone());
        let days = self
            .total_days()
            .and_then(|days| i64::try_from(days).ok())
            .ok_or_else(out_of_range)?;
        let span = Duration::try_days(days).ok_or_else(out_of_range)?;
        start.checked_add_signed(span).ok_or_else(out_of_range)
    }
}

impl FromStr for LeaveDuration {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || ValidationError::MalformedDuration(raw.to_owned());

        let mut chars = raw.chars();
        let suffix = chars.next_back().ok_or_else(malformed)?;
        let digits = chars.as_str();
        let unit = LeaveUnit::from_suffix(suffix).ok_or_else(malformed)?;
        if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(malformed());
        }
        let amount = digits
            .parse::<u64>()
            .map_err(|_| ValidationError::DurationOutOfRange(raw.to_owned()))?;

        Ok(Self { amount, unit, token: raw.to_owned() })
    }
}

impl fmt::Display for LeaveDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub requester: UserId,
    pub reason: String,
    pub duration: LeaveDuration,
    pub requested_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl LeaveRequest {
    pub fn new(
        requester: UserId,
        duration: &str,
        reason: &str,
        requested_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let duration = duration.parse::<LeaveDuration>()?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::EmptyField("reason"));
        }
        check_reason_length(reason)?;
        let ends_at = duration.end_from(requested_at)?;

        Ok(Self { requester, reason: reason.to_owned(), duration, requested_at, ends_at })
    }
}
