use thiserror::Error;

/// Problems loading or saving simulator state.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("device state is malformed: {0}")]
    State(String),
    #[error("device clock {0:?} is not dd/mm/yyyy hh:mm[:ss]")]
    Clock(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
