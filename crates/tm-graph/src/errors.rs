use std::path::PathBuf;

use thiserror::Error;
use tm_auth::TokenmanError;

/// Microsoft Graph and Azure Resource Manager error types
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Graph returned an error: {message}")]
    Graph { message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No access token available after token check")]
    MissingAccessToken,

    #[error("Unknown module '{0}'")]
    UnknownModule(String),

    #[error(transparent)]
    Auth(#[from] TokenmanError),

    #[error(transparent)]
    AzureCli(#[from] AzureCliError),
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum AzureCliError {
    #[error("Could not determine the home directory")]
    HomeDirNotFound,

    #[error("Failed to back up '{path}' to '{backup}': {source}")]
    BackupFailed {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to serialize '{path}': {source}")]
    SerializationFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}
