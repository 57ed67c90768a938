//! Title and tag validation applied on every local write path, before any
//! storage or network call.

use crate::error::ValidationError;
use crate::habit::{Habit, HabitId};

/// Normalized form used for title uniqueness: lower-cased, trimmed, with
/// punctuation stripped and whitespace runs collapsed, so "Read   Book!"
/// and "read book" collide.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validate a habit's fields against the existing collection. `exclude` names
/// the habit being edited so that saving it under its own title passes.
/// Soft-deleted habits do not block a title from being reused.
pub fn validate(
    title: &str,
    tags: &[String],
    existing: &[Habit],
    exclude: Option<&HabitId>,
) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if tags.is_empty() {
        return Err(ValidationError::NoTags);
    }
    let normalized = normalize_title(title);
    let clash = existing.iter().any(|h| {
        !h.deleted
            && Some(&h.id) != exclude
            && normalize_title(&h.title) == normalized
    });
    if clash {
        return Err(ValidationError::DuplicateTitle(title.trim().to_string()));
    }
    Ok(())
}
