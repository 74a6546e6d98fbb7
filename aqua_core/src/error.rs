use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DoserError {
    #[error("link unavailable")]
    LinkUnavailable,
    #[error("request timed out waiting for the device")]
    RequestTimeout,
    #[error("a request of the same kind is already in flight")]
    RequestInFlight,
    #[error("format error: {0}")]
    Format(String),
    #[error("status decode error: {0}")]
    StatusDecode(String),
    #[error("link error: {0}")]
    Link(String),
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing link")]
    MissingLink,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = std::result::Result<T, DoserError>;
pub use eyre::Report;
