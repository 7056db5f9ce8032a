//! # Rime Translator Library
//!
//! Rime is an ahead-of-time translator that converts a sandboxed, portable
//! bitcode module into a typed intermediate representation ready for
//! machine-code lowering.
//!
//! ## Pipeline
//!
//! ```text
//! Bytes -> Header check -> Record stream -> Block decoders -> IR -> Lowering
//! ```
//!
//! The wire format is a stream of untyped, variable-width integer records
//! grouped into nested, length-framed blocks. There are no forward
//! declarations: types, globals, and instruction operands may be referenced
//! before they are fully defined, so decoding builds the module namespace
//! incrementally and resolves forward references through placeholder values.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use rimec::bitcode::codes;
//! use rimec::bitcode::stream::EventStream;
//! use rimec::lower::NullLower;
//! use rimec::translate::Translator;
//! use rimec::Flags;
//!
//! let mut stream = EventStream::new();
//! stream.enter_block(codes::block::MODULE);
//! stream.record(codes::module::VERSION, &[1]);
//! stream.exit_block();
//!
//! let mut translator = Translator::new(Flags::default(), Arc::new(NullLower));
//! translator.translate_stream(&mut stream).unwrap();
//! ```
//!
//! ## Module Overview
//!
//! - [`bitcode`] - Wire format: header, block/record codes, record streams
//! - [`config`] - Translator flags
//! - [`diagnostics`] - Error reporting infrastructure
//! - [`ir`] - The typed IR handed to lowering
//! - [`lower`] - Lowering boundary and the worker pool behind it
//! - [`translate`] - Block decoders and the module orchestrator

pub mod bitcode;
pub mod config;
pub mod diagnostics;
pub mod ir;
pub mod lower;
pub mod translate;

// Re-export commonly used types
pub use config::Flags;
pub use diagnostics::{Diagnostic, DiagnosticsEngine, ErrorKind, TranslationError};
pub use ir::cfg::Cfg;
pub use ir::types::Type;
pub use lower::{Lower, LoweringPool};
pub use translate::Translator;
