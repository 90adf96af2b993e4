use thiserror::Error;

/// Errors produced by environments, agents and the training loop
///
/// None of these are transient: every variant is a programming or configuration
/// mistake and is reported as soon as it is detected.
#[derive(Error, Debug)]
pub enum Error {
    /// An action outside the declared action enumeration
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// A hyperparameter or environment setting outside its allowed range
    #[error("Configuration error: {0}")]
    Config(String),

    /// A grid without a start, without a goal, or whose goals cannot be reached
    #[error("Malformed grid: {0}")]
    MalformedGrid(String),

    /// `step` was called after the episode reached a goal or its step limit
    #[error("Episode is over, call `reset` before stepping again")]
    EpisodeOver,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A snapshot key that is not of the form `row,col,action`
    #[cfg(feature = "serde")]
    #[error("Malformed snapshot key: {0}")]
    MalformedSnapshot(String),
}

pub type Result<T> = std::result::Result<T, Error>;
