//! Diagnostic reporting infrastructure.
//!
//! All block decoders funnel their errors through one [`DiagnosticsEngine`]
//! so that the module-wide "any error disables translation" switch is
//! observed uniformly.
//!
//! # Recovery Policy
//!
//! The source format is untrusted: a malformed record can desynchronize
//! every later index in the stream, so the safe default is to abort
//! translation at the first recorded diagnostic. When
//! [`Flags::allow_error_recovery`](crate::Flags) is set, [`report`]
//! instead records the diagnostic and returns control to the caller, which
//! continues with an explicitly chosen fallback value. Structural failures
//! (unreadable header, unbalanced blocks, wrong top-level block count) are
//! fatal in both modes.
//!
//! [`report`]: DiagnosticsEngine::report

use std::fmt;

use thiserror::Error;

/// Classification of a recorded diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed block/record nesting, unknown block, unreadable stream.
    Structural,
    /// A record carried the wrong number of arguments.
    RecordShape,
    /// A type ID was undefined or of the wrong kind at use.
    TypeResolution,
    /// A relative/absolute value index was out of range or undefined.
    OperandResolution,
    /// Operand types violated an instruction's typing rule.
    TypeCheck,
    /// Duplicate definition of a type, value, or name.
    NameConflict,
}

impl ErrorKind {
    /// Short tag used when rendering the diagnostic.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Structural => "structural",
            ErrorKind::RecordShape => "record shape",
            ErrorKind::TypeResolution => "type resolution",
            ErrorKind::OperandResolution => "operand resolution",
            ErrorKind::TypeCheck => "type check",
            ErrorKind::NameConflict => "name conflict",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// The classification of the failure.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Bit offset into the stream where the failure was observed.
    pub bit: u64,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Rendered as (byte:bit) so messages line up with hex dumps.
        write!(
            f,
            "({}:{}) {} error: {}",
            self.bit / 8,
            self.bit % 8,
            self.kind,
            self.message
        )
    }
}

/// Failure modes of the `translate` entry point.
#[derive(Debug, Clone, Error)]
pub enum TranslationError {
    /// The byte stream is not a whole number of 32-bit words.
    #[error("bitcode stream is {0} bytes; length must be a multiple of 4")]
    MisalignedStream(usize),

    /// The fixed header prelude is absent or unsupported.
    #[error("invalid or unsupported bitcode header")]
    InvalidHeader,

    /// The stream did not contain exactly one top-level module block.
    #[error("expected exactly one top-level module block, found {0}")]
    TopLevelBlockCount(usize),

    /// A recorded diagnostic aborted translation (strict mode, or a
    /// structural failure in either mode).
    #[error("{0}")]
    Malformed(String),

    /// Recovery mode decoded the whole stream but recorded diagnostics.
    #[error("translation failed with {0} diagnostic(s)")]
    Invalid(usize),
}

/// Accumulates diagnostics and decides recoverable-vs-fatal.
///
/// Once any diagnostic has been recorded, [`is_clean`](Self::is_clean)
/// stays false for the rest of the run; the orchestrator uses this to
/// suppress handoff of function bodies to lowering while decoding
/// continues.
#[derive(Debug)]
pub struct DiagnosticsEngine {
    diagnostics: Vec<Diagnostic>,
    allow_recovery: bool,
}

impl DiagnosticsEngine {
    pub fn new(allow_recovery: bool) -> Self {
        Self {
            diagnostics: Vec::new(),
            allow_recovery,
        }
    }

    /// Record a diagnostic.
    ///
    /// Returns `Err` when the engine is in strict mode, so callers can bail
    /// out with `?`. In recovery mode the caller continues with its
    /// documented fallback value.
    pub fn report(
        &mut self,
        kind: ErrorKind,
        bit: u64,
        message: impl Into<String>,
    ) -> Result<(), TranslationError> {
        let diag = Diagnostic {
            kind,
            message: message.into(),
            bit,
        };
        let rendered = diag.to_string();
        self.diagnostics.push(diag);
        if self.allow_recovery {
            Ok(())
        } else {
            Err(TranslationError::Malformed(rendered))
        }
    }

    /// Record a diagnostic that is fatal regardless of recovery mode.
    pub fn fatal(
        &mut self,
        kind: ErrorKind,
        bit: u64,
        message: impl Into<String>,
    ) -> TranslationError {
        let diag = Diagnostic {
            kind,
            message: message.into(),
            bit,
        };
        let rendered = diag.to_string();
        self.diagnostics.push(diag);
        TranslationError::Malformed(rendered)
    }

    /// True while no diagnostic has been recorded.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Number of diagnostics recorded so far.
    pub fn error_count(&self) -> usize {
        self.diagnostics.len()
    }

    /// All diagnostics recorded so far, in order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_mode_aborts_on_first_report() {
        let mut diags = DiagnosticsEngine::new(false);
        let result = diags.report(ErrorKind::RecordShape, 64, "binop record expects 3 arguments");
        assert!(result.is_err());
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn test_recovery_mode_accumulates() {
        let mut diags = DiagnosticsEngine::new(true);
        assert!(diags.report(ErrorKind::TypeResolution, 0, "first").is_ok());
        assert!(diags.report(ErrorKind::TypeCheck, 8, "second").is_ok());
        assert_eq!(diags.error_count(), 2);
        assert!(!diags.is_clean());
    }

    #[test]
    fn test_fatal_is_fatal_in_recovery_mode() {
        let mut diags = DiagnosticsEngine::new(true);
        let err = diags.fatal(ErrorKind::Structural, 0, "stream ended inside a block");
        assert!(matches!(err, TranslationError::Malformed(_)));
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn test_diagnostic_renders_byte_and_bit() {
        let diag = Diagnostic {
            kind: ErrorKind::OperandResolution,
            message: "value index 7 not defined".to_string(),
            bit: 35,
        };
        assert_eq!(
            diag.to_string(),
            "(4:3) operand resolution error: value index 7 not defined"
        );
    }
}
