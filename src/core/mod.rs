//! Core graph components for the graph-slam library
//!
//! This module contains the building blocks the optimizer works on:
//! - Variables (SE(2) poses and 2D landmarks) and their update rules
//! - Edges with cached errors and central-difference Jacobians
//! - Features grouping one landmark with its observation edges
//! - The variable store shared by all edges of one optimizer
//! - Input events and timelines

pub mod edge;
pub mod event;
pub mod feature;
pub mod graph;
pub mod variable;

use crate::factors::FactorError;
use thiserror::Error;
use tracing::error;

/// Core module error types for graph construction
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Timeline could not be decoded
    #[error("Invalid timeline: {0}")]
    InvalidTimeline(String),

    /// Timeline has no frames, so there is no pose to optimize
    #[error("Timeline contains no frames")]
    EmptyTimeline,

    /// Event data was rejected by the residual model it feeds
    #[error("Invalid event at step {step}")]
    InvalidEvent {
        step: usize,
        #[source]
        source: FactorError,
    },

    /// Parameter vector length does not match the graph
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl CoreError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// operation()
    ///     .map_err(|e| CoreError::from(e).log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error from a third-party library
    ///
    /// # Example
    /// ```ignore
    /// serde_json::from_str::<Timeline>(text)
    ///     .map_err(|e| CoreError::InvalidTimeline(e.to_string()).log_with_source(e))?;
    /// ```
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for core module operations
pub type CoreResult<T> = Result<T, CoreError>;
