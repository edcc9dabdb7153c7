//! Plausibility check for extraction results.

use thiserror::Error;

use crate::extraction::ExtractionResult;

/// Fewest alphanumeric characters a usable result may contain.
pub const MIN_ALPHANUMERIC_CHARS: usize = 15;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Extracted text has only {count} alphanumeric characters (minimum {minimum})")]
    TooLittleText { count: usize, minimum: usize },
}

/// Count alphanumeric characters across every segment's text.
pub fn alphanumeric_count(result: &ExtractionResult) -> usize {
    result
        .texts()
        .iter()
        .flat_map(|t| t.chars())
        .filter(|c| c.is_alphanumeric())
        .count()
}

/// Reject results too short to be a real transcription.
///
/// Returns the character count on success.
pub fn validate(result: &ExtractionResult) -> Result<usize, ValidationError> {
    let count = alphanumeric_count(result);
    if count < MIN_ALPHANUMERIC_CHARS {
        return Err(ValidationError::TooLittleText {
            count,
            minimum: MIN_ALPHANUMERIC_CHARS,
        });
    }
    Ok(count)
}
