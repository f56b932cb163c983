//! Error types related to compilation

use crate::{source::SourceError, DiagnosticSet};

/// An error reported by the compiler
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum CompilerError {
    #[error("{0}")]
    Source(
        #[from]
        #[source]
        SourceError,
    ),
    #[error("Compilation stopped by a fatal error\n{}", .0.display())]
    Fatal(DiagnosticSet),
    #[error("Compilation failed with {} errors\n{}", .0.count_errors(), .0.display())]
    CompilationFail(DiagnosticSet),
}

impl CompilerError {
    /// The diagnostics collected before compilation stopped, if any.
    pub fn diagnostics(&self) -> Option<&DiagnosticSet> {
        match self {
            CompilerError::Source(_) => None,
            CompilerError::Fatal(set) | CompilerError::CompilationFail(set) => Some(set),
        }
    }
}
