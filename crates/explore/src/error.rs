use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExploreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExploreError {
    /// The explorer cannot run with the supplied wiring, e.g. a variable
    /// action count without a resolver.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single decision call received or produced invalid values.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
