use validator::ValidationErrors;

use crate::transport::TransportError;

/// Invalid placement or application configuration. Always fatal to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("invalid base URL: {0}")]
    BaseUrl(#[from] url::ParseError),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("SDK version must be defined")]
    MissingSdkVersion,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unexpected ad response format")]
    UnexpectedResponseFormat,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, Error>;
