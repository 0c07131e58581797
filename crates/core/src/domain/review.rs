use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::ids::UserId;
use crate::errors::ValidationError;

pub const DEFAULT_REVIEW_NOTES: &str = "No additional notes provided.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductCategory {
    Livery,
    Els,
    Discord,
    Clothing,
    Graphics,
}

impl ProductCategory {
    pub const ALL: [Self; 5] = [Self::Livery, Self::Els, Self::Discord, Self::Clothing, Self::Graphics];

    pub fn label(self) -> &'static str {
        match self {
            Self::Livery => "Livery",
            Self::Els => "ELS",
            Self::Discord => "Discord",
            Self::Clothing => "Clothing",
            Self::Graphics => "Graphics",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::Livery => "🎨",
            Self::Els => "🚔",
            Self::Discord => "💻",
            Self::Clothing => "👕",
            Self::Graphics => "🖼️",
        }
    }
}

impl FromStr for ProductCategory {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.label().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ValidationError::UnknownCategory(value.to_owned()))
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One of the five star levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StarRating(u8);

impl StarRating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(stars: u8) -> Result<Self, ValidationError> {
        if (Self::MIN..=Self::MAX).contains(&stars) {
            Ok(Self(stars))
        } else {
            Err(ValidationError::UnknownRating(stars.to_string()))
        }
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (Self::MIN..=Self::MAX).map(Self)
    }

    pub fn stars(self) -> u8 {
        self.0
    }

    pub fn glyphs(self) -> String {
        "⭐".repeat(usize::from(self.0))
    }
}

impl FromStr for StarRating {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let stars = value
            .trim()
            .parse::<u8>()
            .map_err(|_| ValidationError::UnknownRating(value.to_owned()))?;
        Self::new(stars)
    }
}

/// Review collected so far; the category arrives before the rating.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDraft {
    pub author: UserId,
    pub designer: UserId,
    pub reviewer: UserId,
    pub notes: String,
    pub category: Option<ProductCategory>,
}

impl ReviewDraft {
    pub fn new(author: UserId, designer: UserId, reviewer: UserId, notes: Option<&str>) -> Self {
        let notes = notes
            .map(str::trim)
            .filter(|notes| !notes.is_empty())
            .unwrap_or(DEFAULT_REVIEW_NOTES)
            .to_owned();
        Self { author, designer, reviewer, notes, category: None }
    }

    pub fn with_category(mut self, category: ProductCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn finalize(self, rating: StarRating) -> Result<ReviewRecord, ValidationError> {
        let category = self.category.ok_or(ValidationError::EmptyField("category"))?;
        Ok(ReviewRecord {
            designer: self.designer,
            reviewer: self.reviewer,
            category,
            rating,
            notes: self.notes,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub designer: UserId,
    pub reviewer: UserId,
    pub category: ProductCategory,
    pub rating: StarRating,
    pub notes: String,
}
