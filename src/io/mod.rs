//! File input and output.
//!
//! - [`TimelineLoader`]: JSON timelines, memory-mapped on load
//! - [`SnapshotWriter`]: JSON snapshots of an optimized graph for external plotting

use serde_json::error::Category;
use std::{io, path::Path};
use thiserror::Error;
use tracing::error;

use crate::core::event::Timeline;

pub mod snapshot;
pub mod timeline;

pub use snapshot::SnapshotWriter;
pub use timeline::TimelineLoader;

/// Errors that can occur while reading or writing graph files
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to create file '{path}': {reason}")]
    FileCreationFailed { path: String, reason: String },
}

impl IoError {
    /// Log the error using tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with source error information using tracing::error and return self for chaining
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

impl From<serde_json::Error> for IoError {
    fn from(e: serde_json::Error) -> Self {
        match e.classify() {
            Category::Io => IoError::Io(e.into()),
            Category::Syntax | Category::Data | Category::Eof => IoError::Parse {
                line: e.line(),
                column: e.column(),
                message: e.to_string(),
            },
        }
    }
}

/// Load a timeline, picking the format from the file extension.
pub fn load_timeline<P: AsRef<Path>>(path: P) -> Result<Timeline, IoError> {
    let path_ref = path.as_ref();
    let extension = path_ref
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| {
            IoError::UnsupportedFormat("No file extension".to_string())
                .log_with_source(format!("File path: {:?}", path_ref))
        })?;

    match extension.to_lowercase().as_str() {
        "json" => TimelineLoader::load(path_ref),
        _ => Err(
            IoError::UnsupportedFormat(format!("Unsupported extension: {extension}"))
                .log_with_source(format!("File path: {:?}", path_ref)),
        ),
    }
}
