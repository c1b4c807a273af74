//! Error types for bbmirror
//!
//! Three families, one per phase of a run:
//!
//! - [`ApiError`]: a Bitbucket REST call did not produce the expected body
//! - [`GitError`]: a clone or update of one repository failed
//! - [`SetupError`]: startup validation failed and the run must not start

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

use crate::bitbucket::ResponseBody;

/// Placeholder used when an error response carries no readable message.
pub const NO_ERROR_MESSAGE: &str = "No error message.";

/// Errors returned by the Bitbucket API client
#[derive(Debug, Error)]
pub enum ApiError {
    /// 400: the request was malformed
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// 401: the credentials were rejected
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    /// 403: the credentials are valid but lack access
    #[error("Permission denied: {0}")]
    Permission(String),

    /// 404: the resource or workspace does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other status outside 200/201/204
    #[error("Unexpected response ({status}): {message}")]
    Unknown { status: u16, message: String },

    #[error("HTTP request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Expected a response body but the server returned none")]
    EmptyBody,
}

impl ApiError {
    /// Classify a non-success status and its body into a typed error.
    ///
    /// Never fails itself: a body without a recognizable message yields
    /// [`NO_ERROR_MESSAGE`].
    pub fn from_status(status: StatusCode, body: &ResponseBody) -> Self {
        let message = error_message(body);

        match status {
            StatusCode::BAD_REQUEST => Self::Invalid(message),
            StatusCode::UNAUTHORIZED => Self::NotAuthenticated(message),
            StatusCode::FORBIDDEN => Self::Permission(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            other => Self::Unknown {
                status: other.as_u16(),
                message,
            },
        }
    }

    /// True when the error means the credentials were rejected
    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, Self::NotAuthenticated(_))
    }
}

/// Extract the service-provided message from an error body.
///
/// Bitbucket answers either with an `errorMessages` list or with
/// `{"type": "error", "error": {"message": ...}}`.
fn error_message(body: &ResponseBody) -> String {
    let ResponseBody::Json(value) = body else {
        return NO_ERROR_MESSAGE.to_string();
    };

    if let Some(messages) = value.get("errorMessages").and_then(|m| m.as_array()) {
        let joined = messages
            .iter()
            .filter_map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        if !joined.is_empty() {
            return joined;
        }
    }

    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| NO_ERROR_MESSAGE.to_string())
}

/// Errors from a single git clone or update
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to run git {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to create parent directory {path}: {source}")]
    CreateParent {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Refusing to update bare repository: {0}")]
    Bare(PathBuf),

    #[error("Working tree has uncommitted changes: {0}")]
    DirtyWorkingTree(PathBuf),

    #[error("Remote '{remote}' is not configured in {path}")]
    MissingRemote { path: PathBuf, remote: String },
}

/// Fatal startup errors. Each one ends the process with status 1 before any
/// repository is touched.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Invalid Credentials...")]
    InvalidCredentials,

    #[error("Invalid Workspace '{0}'...")]
    UnknownWorkspace(String),

    #[error("Invalid Destination path '{0}', it must be a directory that exists.")]
    DestinationPath(String),

    #[error("[{0}] section is missing in config file")]
    MissingSection(&'static str),

    #[error("No password configured: set bitbucket.password or BITBUCKET_APP_PASSWORD")]
    MissingPassword,

    #[error("Bitbucket API error: {0}")]
    Api(ApiError),

    #[error("Failed to read input: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("Prompt task failed: {0}")]
    PromptTask(#[from] tokio::task::JoinError),
}

impl SetupError {
    /// Ctrl-C while a prompt holds the terminal surfaces as an interrupted read
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            Self::Prompt(dialoguer::Error::IO(e)) if e.kind() == std::io::ErrorKind::Interrupted
        )
    }
}

impl From<ApiError> for SetupError {
    fn from(err: ApiError) -> Self {
        if err.is_not_authenticated() {
            Self::InvalidCredentials
        } else {
            Self::Api(err)
        }
    }
}
