/// Rejections raised before any storage or network call. These never enter
/// the pending queue or the dirty-flag state.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("habit title must not be empty")]
    EmptyTitle,
    #[error("habit needs at least one tag")]
    NoTags,
    #[error("a habit with this title already exists: {0}")]
    DuplicateTitle(String),
}
