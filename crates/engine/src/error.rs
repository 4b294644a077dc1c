//! Error taxonomy of one extension analysis.
//!
//! Errors recover at the smallest granularity that keeps results correct:
//! parse failures at the file, graph limits at the flow, timeouts at the
//! extension. Invariant violations abort the extension and are recorded as
//! crash entries in its report.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The external parser rejected the file; it is recorded as
    /// uncompilable and the extension continues with its other files.
    #[error("parser rejected {file}: {message}")]
    ParseFailure { file: String, message: String },

    /// Scope resolution hit a malformed subtree.
    #[error("scope resolution failed in {file}: {source}")]
    ResolveFailure {
        file: String,
        #[source]
        source: pdg::ResolveError,
    },

    /// An edge-count or flow-depth bound was exceeded; the affected flow is
    /// truncated and marked in the output.
    #[error("graph limit exceeded: {0}")]
    GraphLimit(String),

    /// The extension-level wall clock expired.
    #[error("extension analysis timed out after {0} s")]
    Timeout(u64),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// A data-model invariant failed; fatal for this extension only.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}
