//! Error types for the graph-slam library
//!
//! Every module owns its error enum; [`GraphSlamError`] is the top-level error of the public
//! API and wraps them transparently, so the module error stays reachable through the source
//! chain:
//!
//! ```text
//! GraphSlamError::Optimizer(
//!     OptimizerError::Core(
//!         CoreError::InvalidEvent { step: 4, source: FactorError::SingularCovariance(..) }
//!     )
//! )
//! ```

#[cfg(feature = "io")]
use crate::io::IoError;
use crate::{
    core::CoreError, factors::FactorError, linalg::LinAlgError, optimizer::OptimizerError,
};
use std::error::Error as StdError;
use thiserror::Error;

/// Main result type used throughout the graph-slam library
pub type GraphSlamResult<T> = Result<T, GraphSlamError>;

#[derive(Debug, Error)]
pub enum GraphSlamError {
    /// Timeline decoding and graph construction
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Residual model parameters
    #[error(transparent)]
    Factor(#[from] FactorError),

    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    #[error(transparent)]
    LinearAlgebra(#[from] LinAlgError),

    /// File loading and saving
    #[cfg(feature = "io")]
    #[error(transparent)]
    Io(#[from] IoError),
}

impl GraphSlamError {
    /// Full error chain, one error per line.
    ///
    /// ```rust,ignore
    /// if let Err(e) = GraphOptimizer::new(&timeline) {
    ///     warn!("Full chain: {}", GraphSlamError::from(e).chain());
    /// }
    /// ```
    pub fn chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(format!("  → {}", err));
            source = err.source();
        }

        chain.join("\n")
    }

    /// Single-line error chain for logging
    pub fn chain_compact(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }

        chain.join(" → ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn singular() -> FactorError {
        FactorError::SingularCovariance("det(Q) = 0".to_string())
    }

    fn invalid_event() -> GraphSlamError {
        let core = CoreError::InvalidEvent {
            step: 4,
            source: singular(),
        };
        GraphSlamError::from(OptimizerError::from(core))
    }

    #[test]
    fn test_display_is_transparent() {
        let error = GraphSlamError::from(LinAlgError::SingularMatrix);
        assert!(error.to_string().contains("Singular matrix"));
        assert_eq!(invalid_event().to_string(), "Invalid event at step 4");
    }

    #[test]
    fn test_chain_reaches_root_cause() {
        let chain = invalid_event().chain();
        let lines: Vec<_> = chain.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Invalid event at step 4");
        assert_eq!(lines[1], "  → Singular covariance matrix: det(Q) = 0");
    }

    #[test]
    fn test_chain_compact() {
        let compact = invalid_event().chain_compact();
        assert!(compact.starts_with("Invalid event at step 4 → "));
        assert!(!compact.contains('\n'));
    }

    #[test]
    fn test_from_conversions() {
        let error: GraphSlamError = CoreError::EmptyTimeline.into();
        assert!(matches!(error, GraphSlamError::Core(CoreError::EmptyTimeline)));
        let result: GraphSlamResult<()> = Err(singular().into());
        assert!(matches!(result, Err(GraphSlamError::Factor(_))));
    }
}
