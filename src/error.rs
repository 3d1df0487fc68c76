use std::{io, path::StripPrefixError, sync::mpsc::SendError, time::Duration};

use http::status::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "service")]
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};

use serde_json::Error as JsonError;
use sqlx::{migrate::MigrateError, Error as SqlxError};

use crate::event::SyncEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum VellumError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Feature disabled: {0}")]
    Disabled(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("{path}: {message}")]
    Parse { path: String, message: String },
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("Invalid query: {0}")]
    Query(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Cache/Database error: {0}")]
    Store(String),
    #[error("Store write did not finish within {0:?}")]
    Timeout(Duration),
    #[error("Watcher error: {0}")]
    Watch(String),
}

impl VellumError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            VellumError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            VellumError::Disabled(_) => StatusCode::NOT_IMPLEMENTED,
            VellumError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            VellumError::NotFound(_) => StatusCode::NOT_FOUND,
            VellumError::Parse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            VellumError::PermissionDenied => StatusCode::FORBIDDEN,
            VellumError::Query(_) => StatusCode::BAD_REQUEST,
            VellumError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            VellumError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            VellumError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            VellumError::Watch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn parse(path: &str, message: impl std::fmt::Display) -> Self {
        VellumError::Parse {
            path: path.to_string(),
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VellumError::NotFound(_))
    }
}

impl From<StripPrefixError> for VellumError {
    fn from(src: StripPrefixError) -> VellumError {
        VellumError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for VellumError {
    fn from(src: toml::de::Error) -> VellumError {
        VellumError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for VellumError {
    fn from(src: toml::ser::Error) -> VellumError {
        VellumError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<serde_yaml::Error> for VellumError {
    fn from(src: serde_yaml::Error) -> VellumError {
        VellumError::Serialization(format!("Yaml deserialization error: {src}"))
    }
}

impl From<JsonError> for VellumError {
    fn from(src: JsonError) -> VellumError {
        VellumError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for VellumError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => VellumError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => VellumError::PermissionDenied,
            _ => VellumError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<SendError<SyncEvent>> for VellumError {
    fn from(x: SendError<SyncEvent>) -> Self {
        VellumError::Io(format!(
            "Channel update send Error, could not transmit sync event {:?}",
            x.0
        ))
    }
}

impl From<tokio::task::JoinError> for VellumError {
    fn from(x: tokio::task::JoinError) -> Self {
        VellumError::Io(format!("Background task failed: {x}"))
    }
}

impl From<tokio::time::error::Elapsed> for VellumError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        VellumError::Timeout(Duration::ZERO)
    }
}

#[cfg(feature = "service")]
impl From<NotifyError> for VellumError {
    fn from(notify_error: NotifyError) -> Self {
        match notify_error.kind {
            NotifyErrorKind::Generic(msg) => VellumError::Watch(format!(
                "notify: {}, paths: {:?}",
                msg, notify_error.paths
            )),
            NotifyErrorKind::Io(io_error) => VellumError::Watch(format!(
                "notify: io error {}, paths: {:?}",
                io_error.kind(),
                notify_error.paths
            )),
            NotifyErrorKind::PathNotFound => VellumError::NotFound(format!(
                "notify: path(s) not found: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::WatchNotFound => VellumError::NotFound(format!(
                "notify: watch not found, paths: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::InvalidConfig(_) => {
                VellumError::Watch("notify invalid config".to_string())
            }
            NotifyErrorKind::MaxFilesWatch => {
                VellumError::Watch("notify max file watch limit reached".to_string())
            }
        }
    }
}

impl From<SqlxError> for VellumError {
    fn from(db_error: SqlxError) -> Self {
        match db_error {
            SqlxError::RowNotFound => VellumError::NotFound("database row".to_string()),
            other => VellumError::Store(format!("database error: {other:?}")),
        }
    }
}

impl From<MigrateError> for VellumError {
    fn from(migrate_error: MigrateError) -> Self {
        VellumError::Store(format!("migration error: {migrate_error}"))
    }
}
