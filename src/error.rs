// src/error.rs

use crate::model::Resource;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid GitHub URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to fetch {resource}: {reason}")]
    Fetch { resource: Resource, reason: String },

    #[error("External service error: {0}")]
    ExternalService(String),

    /// The model reply held no usable chart spec
    #[error("Generation error: {0}")]
    Generation(String),

    /// The chart spec could not be bound to the data or drawn
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub fn fetch(resource: Resource, reason: impl Into<String>) -> Self {
        Error::Fetch {
            resource,
            reason: reason.into(),
        }
    }

    /// Errors that end a single chart query with a fallback message
    /// instead of an error shown to the user.
    pub fn is_chart_failure(&self) -> bool {
        matches!(self, Error::Generation(_) | Error::Execution(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
