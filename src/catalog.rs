//! Item categories and input validation
//!
//! The category set is closed: adding one means a schema-compatible code
//! change, not configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MAX_NAME_LEN: usize = 100;
pub const DEFAULT_MAX_TITLE_LEN: usize = 150;
pub const DEFAULT_MAX_DESCRIPTION_LEN: usize = 500;

/// Closed set of item classifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Electronics,
    Clothing,
    Home,
    Hobbies,
    Free,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Electronics,
        Category::Clothing,
        Category::Home,
        Category::Hobbies,
        Category::Free,
    ];

    /// Storage and wire key
    pub fn key(self) -> &'static str {
        match self {
            Category::Electronics => "electronics",
            Category::Clothing => "clothing",
            Category::Home => "home",
            Category::Hobbies => "hobbies",
            Category::Free => "free",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Category::Electronics => "Electronics",
            Category::Clothing => "Clothing & Shoes",
            Category::Home => "Home & Garden",
            Category::Hobbies => "Hobbies & Leisure",
            Category::Free => "Free Stuff",
        }
    }

    /// Whether the posting flow asks for a price in this category
    pub fn requires_price(self) -> bool {
        !matches!(self, Category::Free)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Accepts either the key or the display title, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.key().eq_ignore_ascii_case(needle) || c.title().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownCategory(needle.to_string()))
    }
}

/// Why a piece of user input was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Text must not be empty")]
    Empty,
    #[error("Text is longer than {max} characters")]
    TooLong { max: usize },
    #[error("Not a recognised category")]
    UnknownCategory,
    #[error("Price must be a whole number")]
    InvalidPrice,
    #[error("Phone number must have 10 to 15 digits")]
    InvalidPhone,
    #[error("Coordinates are out of range")]
    InvalidCoordinates,
    #[error("Search radius must be a positive number of kilometres")]
    InvalidRadius,
    #[error("Rating must be between 1 and 5")]
    InvalidScore,
    #[error("That choice is not one of the offered options")]
    UnknownOption,
    #[error("This step expects a different kind of input")]
    UnexpectedInput,
}

/// Trim and bound a free-text field
pub fn validate_text(text: &str, max_len: usize) -> Result<String, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::Empty);
    }
    if text.chars().count() > max_len {
        return Err(ValidationError::TooLong { max: max_len });
    }
    Ok(text.to_string())
}

pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    validate_text(name, MAX_NAME_LEN)
}

/// Parse a price string.
///
/// Every non-digit is stripped, so "1 500 €" reads as 1500. Zero means the
/// item is offered without a price and yields `Ok(None)`.
pub fn parse_price(text: &str) -> Result<Option<u64>, ValidationError> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(ValidationError::InvalidPrice);
    }
    let value: u64 = digits.parse().map_err(|_| ValidationError::InvalidPrice)?;
    Ok((value > 0).then_some(value))
}

/// Normalise a phone number to digits with an optional leading `+`
pub fn validate_phone(phone: &str) -> Result<String, ValidationError> {
    let cleaned: String = phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    let valid = (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit());
    if valid {
        Ok(cleaned)
    } else {
        Err(ValidationError::InvalidPhone)
    }
}

pub fn validate_score(score: u8) -> Result<u8, ValidationError> {
    if (1..=5).contains(&score) {
        Ok(score)
    } else {
        Err(ValidationError::InvalidScore)
    }
}
