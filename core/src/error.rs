use thiserror::Error;

/// Error type for profile analysis.
///
/// Only conditions that make a dive unplottable are errors. Malformed
/// timestamps, missing sensor data and a non-converging deco model are
/// corrected or encoded in the produced series instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfileError {
    #[error("unable to allocate {entries} profile entries")]
    Allocation { entries: usize },

    #[error("dive computer {index} does not exist ({available} available)")]
    NoSuchComputer { index: usize, available: usize },

    #[error("dive computer has no samples")]
    NoSamples,

    #[error("invalid preferences: {0}")]
    InvalidPrefs(String),

    #[error("json error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ProfileError {
    fn from(e: serde_json::Error) -> Self {
        ProfileError::Json(e.to_string())
    }
}

pub type ProfileResult<T> = Result<T, ProfileError>;
