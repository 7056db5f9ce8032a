//! Translator configuration.
//!
//! A plain flags struct owned by the [`Translator`](crate::translate::Translator)
//! and consulted by every block decoder. The CLI populates it from command-line
//! arguments; library users construct it directly.

/// Runtime configuration for a translation run.
#[derive(Debug, Clone)]
pub struct Flags {
    /// Keep decoding after a recoverable diagnostic instead of aborting on
    /// the first error. Translation output is still suppressed once any
    /// diagnostic has been recorded; this only controls whether decoding
    /// continues far enough to surface further diagnostics in the same pass.
    pub allow_error_recovery: bool,
    /// Prefix used when generating names for unnamed function declarations.
    pub function_prefix: String,
    /// Prefix used when generating names for unnamed global variables.
    pub global_prefix: String,
    /// Number of worker threads used for lowering. Zero means lowering runs
    /// synchronously on the decoding thread.
    pub num_workers: usize,
}

impl Flags {
    /// Flags with error recovery enabled. Used by tests that want to observe
    /// several diagnostics from one malformed module.
    pub fn permissive() -> Self {
        Self {
            allow_error_recovery: true,
            ..Self::default()
        }
    }

    /// Set the number of lowering workers.
    pub fn with_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            allow_error_recovery: false,
            function_prefix: "Function".to_string(),
            global_prefix: "Global".to_string(),
            num_workers: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags() {
        let flags = Flags::default();
        assert!(!flags.allow_error_recovery);
        assert_eq!(flags.function_prefix, "Function");
        assert_eq!(flags.global_prefix, "Global");
        assert_eq!(flags.num_workers, 0);
    }

    #[test]
    fn test_permissive_flags() {
        let flags = Flags::permissive().with_workers(4);
        assert!(flags.allow_error_recovery);
        assert_eq!(flags.num_workers, 4);
    }
}
