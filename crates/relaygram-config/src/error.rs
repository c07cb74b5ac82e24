use thiserror::Error;

/// Errors that can occur when parsing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("environment variable '{name}' referenced in {field} is not set")]
    MissingEnvVar { name: String, field: String },

    #[error("unterminated ${{...}} placeholder in {field}")]
    UnterminatedPlaceholder { field: String },

    #[error("{field} must not be empty")]
    Empty { field: String },

    #[error("source and destination are the same channel ({0})")]
    SameChannel(i64),

    #[error("checkpoint_every must be at least 1")]
    InvalidCheckpointCadence,
}

pub type ConfigResult<T> = Result<T, ConfigError>;
