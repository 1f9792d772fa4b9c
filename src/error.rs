//! Error types for the bridge.
//!
//! Only [`ConfigError`] is fatal. Everything else is logged by the scheduler
//! and retried on the next due cycle.

use thiserror::Error;

/// Startup configuration problems. The process exits before polling starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),

    #[error("{var} has an invalid value `{value}`")]
    Invalid { var: &'static str, value: String },
}

/// Failure talking to the Geo cloud API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("not authorised (status {0})")]
    Unauthorized(u16),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Login was rejected or returned no token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("authentication failed: {0}")]
pub struct AuthError(#[source] pub ApiError);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceResolutionError {
    #[error("device lookup failed: {0}")]
    Api(#[source] ApiError),

    #[error("account has no metering system")]
    NoSystem,
}

/// A failure of the two-step re-authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    DeviceResolution(#[from] DeviceResolutionError),
}

/// Live or periodic data could not be retrieved this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Api(#[from] ApiError),
}

impl FetchError {
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Api(e) => e.is_unauthorized(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("mqtt client rejected publish: {0}")]
    Client(String),
}
