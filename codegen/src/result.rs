//! Result and error types representing the outcome of compiling a function.

use crate::verifier::VerifierErrors;
use thiserror::Error;

/// A compilation error.
///
/// When a function fails to compile, this error carries enough information
/// for the embedder to report the problem. Programming errors in a target
/// description (an unmatched selection node, an impossible colouring state)
/// are not represented here; those panic with a descriptive message.
#[derive(Error, Debug)]
pub enum CodegenError {
    /// The IR verifier rejected the function.
    ///
    /// Verification runs after every pass when enabled, and all findings
    /// from a pass are collected before the pipeline gives up, so several
    /// problems can be reported at once.
    #[error("verifier errors")]
    Verifier(#[from] VerifierErrors),

    /// The requested target is not supported by this build.
    #[error("unsupported target: {0}")]
    UnsupportedTarget(String),

    /// An implementation limit was exceeded (for example too many virtual
    /// registers for the allocator's index space).
    #[error("implementation limit exceeded")]
    ImplLimitExceeded,
}

/// A convenient alias for a `Result` that uses `CodegenError` as the error
/// type.
pub type CodegenResult<T> = Result<T, CodegenError>;
