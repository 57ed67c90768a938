use cadence_core::ValidationError;
use cadence_remote::RemoteError;
use cadence_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("storage: {0}")]
    Store(#[from] StoreError),

    #[error("remote: {0}")]
    Remote(#[from] RemoteError),

    #[error("unknown habit: {0}")]
    UnknownHabit(String),
}
