//! Plate lookup against the workshop's vehicle, customer and appointment
//! records.
//!
//! Input is trimmed and uppercased before anything goes on the wire; empty
//! input never reaches the backend. A plate the backend knows nothing about
//! is a distinct nothing-found outcome, not an error.

use regex::Regex;
use thiserror::Error;

use platewatch_core::types::{PlateSearch, PlateSearchResult};
use platewatch_core::{ApiError, DetectionApi};

/// Trim and uppercase; `None` for empty or whitespace-only input.
pub fn normalize_plate(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Italian plate shape (AA999AA). Advisory: non-matching input is still
/// searched, the backend accepts any string.
pub fn is_valid_plate(plate: &str) -> bool {
    let re = Regex::new(r"^[A-Z]{2}[0-9]{3}[A-Z]{2}$").unwrap();
    re.is_match(plate)
}

#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Found(PlateSearchResult),
    /// Valid response with no vehicle, no customer and no appointments.
    NothingFound { license_plate: String },
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("license plate is empty")]
    EmptyPlate,
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SearchError {
    pub fn user_message(&self) -> String {
        match self {
            SearchError::EmptyPlate => "enter a license plate to search".into(),
            SearchError::Api(e) => e.user_message(),
        }
    }
}

/// One lookup. The caller holds at most one outcome at a time; a new search
/// replaces the previous one.
pub async fn search(api: &dyn DetectionApi, input: &str) -> Result<SearchOutcome, SearchError> {
    let plate = normalize_plate(input).ok_or(SearchError::EmptyPlate)?;
    if !is_valid_plate(&plate) {
        tracing::debug!(%plate, "plate does not match the italian format, searching anyway");
    }
    let response = api.search_plate(&plate).await?;
    Ok(classify(plate, response))
}

/// A `not_found` response and a found-but-empty join both classify as
/// nothing-found.
fn classify(plate: String, response: PlateSearch) -> SearchOutcome {
    match response.data {
        Some(result) if !result.is_empty() => SearchOutcome::Found(result),
        Some(result) => SearchOutcome::NothingFound {
            license_plate: result.license_plate,
        },
        None => SearchOutcome::NothingFound {
            license_plate: plate,
        },
    }
}
