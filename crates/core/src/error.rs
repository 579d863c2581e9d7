use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown action phase: {0}")]
    UnknownPhase(String),

    #[error("Unknown action type: {0}")]
    UnknownActionType(String),
}
