//! The module orchestrator and block decoders.
//!
//! [`Translator`] drives decoding from the outside in: validate the byte
//! prelude, require exactly one top-level module block, then dispatch each
//! nested block to its decoder in file order. The type and globals blocks
//! populate the module-wide namespace in [`context::Context`]; every
//! function block layers its own value space on top of it and hands the
//! finished CFG to the lowering pool.

pub mod constants;
pub mod context;
pub mod function;
pub mod globals;
pub mod intrinsics;
pub mod symtab;
pub mod types;

use std::sync::Arc;

use tracing::{debug, info};

use crate::bitcode::codes::block;
use crate::bitcode::header::Header;
use crate::bitcode::stream::{Record, RecordStream, StreamEvent, WordStream};
use crate::config::Flags;
use crate::diagnostics::{Diagnostic, ErrorKind, TranslationError};
use crate::ir::globals::{CallingConv, FunctionDecl, Linkage};
use crate::lower::{Lower, LoweringPool};

use context::Context;
use function::FunctionDecoder;

/// Expected argument-count shapes for record validation.
pub(crate) enum Arity {
    Exactly(usize),
    AtLeast(usize),
    Range(usize, usize),
}

/// Check a record's argument count, reporting the standard "record
/// expects K arguments" diagnostic on mismatch. Returns false when the
/// record should be skipped.
pub(crate) fn check_arity(
    ctx: &mut Context,
    bit: u64,
    block: &str,
    record: &str,
    values: &[u64],
    arity: Arity,
) -> Result<bool, TranslationError> {
    let (ok, expected, qualifier) = match arity {
        Arity::Exactly(n) => (values.len() == n, n, ""),
        Arity::AtLeast(n) => (values.len() >= n, n, "at least "),
        Arity::Range(lo, hi) => {
            if values.len() < lo {
                (false, lo, "at least ")
            } else {
                (values.len() <= hi, hi, "no more than ")
            }
        }
    };
    if ok {
        return Ok(true);
    }
    ctx.diags.report(
        ErrorKind::RecordShape,
        bit,
        format!(
            "{} {} record expects {}{} argument{}; found {}",
            block,
            record,
            qualifier,
            expected,
            if expected == 1 { "" } else { "s" },
            values.len()
        ),
    )?;
    Ok(false)
}

/// Report a record code the enclosing block does not understand.
pub(crate) fn unknown_record(
    ctx: &mut Context,
    bit: u64,
    block: &str,
    record: &Record,
) -> Result<(), TranslationError> {
    ctx.diags.report(
        ErrorKind::Structural,
        bit,
        format!(
            "don't know how to process {} record with code {}",
            block, record.code
        ),
    )
}

/// Skip the remainder of the current block, including nested blocks.
pub(crate) fn skip_block<S: RecordStream>(
    ctx: &mut Context,
    stream: &mut S,
) -> Result<(), TranslationError> {
    let mut depth = 1usize;
    while let Some(event) = stream.next_event() {
        match event {
            StreamEvent::EnterBlock(_) => depth += 1,
            StreamEvent::ExitBlock => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            StreamEvent::Record(_) => {}
        }
    }
    Err(end_of_stream(ctx, stream, "skipped"))
}

/// The stream ran out inside an open block; unrecoverable.
pub(crate) fn end_of_stream<S: RecordStream>(
    ctx: &mut Context,
    stream: &S,
    block: &str,
) -> TranslationError {
    ctx.diags.fatal(
        ErrorKind::Structural,
        stream.bit_position(),
        format!("bitcode stream ended inside {} block", block),
    )
}

/// Translates one bitcode module into IR handed to a lowering backend.
pub struct Translator {
    ctx: Context,
    pool: LoweringPool,
}

impl Translator {
    pub fn new(flags: Flags, backend: Arc<dyn Lower>) -> Self {
        let pool = LoweringPool::new(backend, flags.num_workers);
        Self {
            ctx: Context::new(flags),
            pool,
        }
    }

    /// The module-wide decode state, for inspection after translation.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Diagnostics recorded so far, in order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.ctx.diags.diagnostics()
    }

    /// Translate a complete module file: alignment check, header check,
    /// then the record stream decoded from the word payload.
    pub fn translate(&mut self, bytes: &[u8]) -> Result<(), TranslationError> {
        if bytes.len() % 4 != 0 {
            return Err(TranslationError::MisalignedStream(bytes.len()));
        }
        let header = Header::read(bytes)?;
        let mut stream = WordStream::new(&bytes[header.size()..], (header.size() * 8) as u64);
        self.translate_stream(&mut stream)
    }

    /// Translate from an already-decoded record stream. The stream must
    /// contain exactly one top-level module block.
    pub fn translate_stream<S: RecordStream>(
        &mut self,
        stream: &mut S,
    ) -> Result<(), TranslationError> {
        let mut top_level = 0usize;
        let outcome = self.run_top_level(stream, &mut top_level);
        // Always drain: in-flight lowering work runs to completion even
        // when decoding failed partway.
        self.pool.drain();
        outcome?;
        if top_level != 1 {
            return Err(TranslationError::TopLevelBlockCount(top_level));
        }
        if !self.ctx.diags.is_clean() {
            return Err(TranslationError::Invalid(self.ctx.diags.error_count()));
        }
        info!(
            functions = self.ctx.num_function_ids(),
            variables = self.ctx.num_global_variables(),
            "module translated"
        );
        Ok(())
    }

    fn run_top_level<S: RecordStream>(
        &mut self,
        stream: &mut S,
        top_level: &mut usize,
    ) -> Result<(), TranslationError> {
        while let Some(event) = stream.next_event() {
            let bit = stream.bit_position();
            match event {
                StreamEvent::EnterBlock(block::MODULE) => {
                    *top_level += 1;
                    if *top_level == 1 {
                        self.run_module_block(stream)?;
                    } else {
                        skip_block(&mut self.ctx, stream)?;
                    }
                }
                StreamEvent::EnterBlock(id) => {
                    self.ctx.diags.report(
                        ErrorKind::Structural,
                        bit,
                        format!("unexpected top-level block id {}", id),
                    )?;
                    skip_block(&mut self.ctx, stream)?;
                }
                StreamEvent::Record(_) => {
                    self.ctx.diags.report(
                        ErrorKind::Structural,
                        bit,
                        "record outside any block",
                    )?;
                }
                StreamEvent::ExitBlock => {
                    return Err(self.ctx.diags.fatal(
                        ErrorKind::Structural,
                        bit,
                        "unbalanced block exit at top level",
                    ));
                }
            }
        }
        Ok(())
    }

    fn run_module_block<S: RecordStream>(
        &mut self,
        stream: &mut S,
    ) -> Result<(), TranslationError> {
        while let Some(event) = stream.next_event() {
            let bit = stream.bit_position();
            match event {
                StreamEvent::EnterBlock(id) => match id {
                    // Abbreviation definitions concern the bit-level
                    // reader, which has already applied them.
                    block::BLOCKINFO => {
                        debug!("skipping blockinfo block");
                        skip_block(&mut self.ctx, stream)?;
                    }
                    block::TYPES => types::run_types_block(&mut self.ctx, stream)?,
                    block::GLOBALS => globals::run_globals_block(&mut self.ctx, stream)?,
                    block::VALUE_SYMTAB => symtab::run_module_symtab(&mut self.ctx, stream)?,
                    block::FUNCTION => {
                        self.install_names_and_emit_globals();
                        let decoder = FunctionDecoder::new(&mut self.ctx, stream)?;
                        if let Some(cfg) = decoder.run()? {
                            self.pool.submit(cfg);
                        }
                    }
                    _ => {
                        self.ctx.diags.report(
                            ErrorKind::Structural,
                            bit,
                            format!("don't know how to parse block id {}", id),
                        )?;
                        skip_block(&mut self.ctx, stream)?;
                    }
                },
                StreamEvent::Record(record) => self.process_module_record(&record, bit)?,
                StreamEvent::ExitBlock => {
                    self.install_names_and_emit_globals();
                    return Ok(());
                }
            }
        }
        Err(end_of_stream(&mut self.ctx, stream, "module"))
    }

    /// Install names and lower global variable declarations exactly once,
    /// at the first function block or module exit, whichever comes first.
    fn install_names_and_emit_globals(&mut self) {
        if self.ctx.install_names() {
            self.pool.backend().emit_globals(self.ctx.variables());
        }
    }

    fn process_module_record(
        &mut self,
        record: &Record,
        bit: u64,
    ) -> Result<(), TranslationError> {
        use crate::bitcode::codes::module as code;

        let values = &record.values;
        match record.code {
            code::VERSION => {
                if !check_arity(&mut self.ctx, bit, "module", "version", values, Arity::Exactly(1))?
                {
                    return Ok(());
                }
                if values[0] != 1 {
                    self.ctx.diags.report(
                        ErrorKind::Structural,
                        bit,
                        format!("unknown bitstream version: {}", values[0]),
                    )?;
                }
            }
            code::FUNCTION => {
                if !check_arity(&mut self.ctx, bit, "module", "address", values, Arity::Exactly(4))?
                {
                    return Ok(());
                }
                let sig = self.ctx.signature(values[0], bit)?;
                let Some(calling_conv) = CallingConv::decode(values[1]) else {
                    return self.ctx.diags.report(
                        ErrorKind::TypeCheck,
                        bit,
                        format!("function address has unknown calling convention: {}", values[1]),
                    );
                };
                let Some(linkage) = Linkage::decode(values[3]) else {
                    return self.ctx.diags.report(
                        ErrorKind::TypeCheck,
                        bit,
                        format!("function address has unknown linkage: {}", values[3]),
                    );
                };
                self.ctx.declare_function(FunctionDecl {
                    sig_id: values[0],
                    sig,
                    calling_conv,
                    linkage,
                    is_proto: values[2] != 0,
                    name: None,
                });
            }
            _ => unknown_record(&mut self.ctx, bit, "module", record)?,
        }
        Ok(())
    }
}
