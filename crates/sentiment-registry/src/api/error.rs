use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use strum::Display;
use thiserror::Error;

#[derive(Clone, Debug, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ApiErrorCode {
    ResourceDoesNotExist,
    InvalidParameterValue,
    PermissionDenied,
    #[serde(other)]
    Unknown,
}

/// Error document returned by the tracking server on non-2xx responses.
#[derive(Deserialize, Debug)]
pub struct ApiErrorBody {
    #[serde(rename = "error_code", default = "unknown_code")]
    pub code: ApiErrorCode,
    #[serde(default)]
    pub message: String,
}

fn unknown_code() -> ApiErrorCode {
    ApiErrorCode::Unknown
}

impl Default for ApiErrorBody {
    fn default() -> Self {
        ApiErrorBody {
            code: ApiErrorCode::Unknown,
            message: "An unknown error occurred".to_string(),
        }
    }
}

impl Display for ApiErrorBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Code: {}, Message: {}", self.code, self.message)
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid tracking URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("Resource not found")]
    NotFound,
    #[error("Unauthorized access")]
    Unauthorized,
    #[error("Forbidden access")]
    Forbidden,
    #[error("Internal server error")]
    InternalServerError,
    #[error("Api error {status}: {body}")]
    ApiError {
        status: StatusCode,
        body: ApiErrorBody,
    },
    #[error("Registry unreachable: {0}")]
    Unreachable(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Unknown Error: {0}")]
    UnknownError(String),
}

impl RegistryError {
    pub fn code(&self) -> Option<ApiErrorCode> {
        match self {
            RegistryError::ApiError { body, .. } => Some(body.code.clone()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound)
            || self.code() == Some(ApiErrorCode::ResourceDoesNotExist)
    }

    pub fn is_login_error(&self) -> bool {
        matches!(self, RegistryError::Unauthorized | RegistryError::Forbidden)
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => RegistryError::ApiError {
                status,
                body: ApiErrorBody {
                    code: ApiErrorCode::Unknown,
                    message: error.to_string(),
                },
            },
            None if error.is_connect() || error.is_timeout() => {
                RegistryError::Unreachable(error.to_string())
            }
            None => RegistryError::UnknownError(error.to_string()),
        }
    }
}
