//! Value-symbol-table block decoding.
//!
//! Symbol table blocks attach names to already-created values. At module
//! scope the indices name global declarations; inside a function block they
//! name instruction variables and basic blocks. The record grammar is the
//! same at both scopes, so the entry parsing is shared.

use crate::bitcode::stream::{Record, RecordStream, StreamEvent};
use crate::diagnostics::{ErrorKind, TranslationError};
use crate::ir::instr::Operand;

use super::context::Context;
use super::function::FunctionDecoder;
use super::{check_arity, end_of_stream, skip_block, unknown_record, Arity};

const BLOCK_NAME: &str = "valuesymtab";

/// One parsed symbol table record.
pub(crate) enum SymtabEntry {
    /// Name for a value (global declaration or local variable).
    Value { index: u64, name: String },
    /// Name for a basic block.
    Block { index: u64, name: String },
}

/// Parse one symbol table record, or `None` for shape failures and
/// unknown codes (which are reported).
pub(crate) fn parse_symtab_record(
    ctx: &mut Context,
    record: &Record,
    bit: u64,
) -> Result<Option<SymtabEntry>, TranslationError> {
    use crate::bitcode::codes::symtab as code;

    let values = &record.values;
    let name_of = |values: &[u64]| -> String {
        values[1..]
            .iter()
            .map(|&v| v as u8 as char)
            .collect::<String>()
    };
    match record.code {
        code::ENTRY => {
            if !check_arity(ctx, bit, BLOCK_NAME, "value entry", values, Arity::AtLeast(2))? {
                return Ok(None);
            }
            Ok(Some(SymtabEntry::Value {
                index: values[0],
                name: name_of(values),
            }))
        }
        code::BBENTRY => {
            if !check_arity(
                ctx,
                bit,
                BLOCK_NAME,
                "basic block entry",
                values,
                Arity::AtLeast(2),
            )? {
                return Ok(None);
            }
            Ok(Some(SymtabEntry::Block {
                index: values[0],
                name: name_of(values),
            }))
        }
        _ => {
            unknown_record(ctx, bit, BLOCK_NAME, record)?;
            Ok(None)
        }
    }
}

/// Decode a module-scoped symbol table block, naming global declarations.
pub(crate) fn run_module_symtab<S: RecordStream>(
    ctx: &mut Context,
    stream: &mut S,
) -> Result<(), TranslationError> {
    while let Some(event) = stream.next_event() {
        let bit = stream.bit_position();
        match event {
            StreamEvent::EnterBlock(id) => {
                ctx.diags.report(
                    ErrorKind::Structural,
                    bit,
                    format!("unexpected block id {} inside valuesymtab block", id),
                )?;
                skip_block(ctx, stream)?;
            }
            StreamEvent::Record(record) => match parse_symtab_record(ctx, &record, bit)? {
                Some(SymtabEntry::Value { index, name }) => {
                    ctx.set_global_name(index, name, bit)?;
                }
                Some(SymtabEntry::Block { index, name }) => {
                    ctx.diags.report(
                        ErrorKind::Structural,
                        bit,
                        format!(
                            "cannot define basic block name at module level: '{}' -> {}",
                            name, index
                        ),
                    )?;
                }
                None => {}
            },
            StreamEvent::ExitBlock => return Ok(()),
        }
    }
    Err(end_of_stream(ctx, stream, BLOCK_NAME))
}

impl<S: RecordStream> FunctionDecoder<'_, S> {
    /// Decode a function-scoped symbol table block, naming instruction
    /// variables and basic blocks.
    pub(crate) fn run_local_symtab(&mut self) -> Result<(), TranslationError> {
        while let Some(event) = self.stream.next_event() {
            let bit = self.stream.bit_position();
            match event {
                StreamEvent::EnterBlock(id) => {
                    self.ctx.diags.report(
                        ErrorKind::Structural,
                        bit,
                        format!("unexpected block id {} inside valuesymtab block", id),
                    )?;
                    skip_block(self.ctx, self.stream)?;
                }
                StreamEvent::Record(record) => {
                    match parse_symtab_record(self.ctx, &record, bit)? {
                        Some(SymtabEntry::Value { index, name }) => {
                            self.set_local_value_name(index, name, bit)?;
                        }
                        Some(SymtabEntry::Block { index, name }) => {
                            if (index as usize) < self.func.num_nodes() {
                                self.func.node_mut(index as usize).name = Some(name);
                            } else {
                                self.ctx.diags.report(
                                    ErrorKind::OperandResolution,
                                    bit,
                                    format!(
                                        "function-local block name '{}' cannot be associated with index {}",
                                        name, index
                                    ),
                                )?;
                            }
                        }
                        None => {}
                    }
                }
                StreamEvent::ExitBlock => return Ok(()),
            }
        }
        Err(end_of_stream(self.ctx, self.stream, BLOCK_NAME))
    }

    fn set_local_value_name(
        &mut self,
        index: u64,
        name: String,
        bit: u64,
    ) -> Result<(), TranslationError> {
        if index < self.num_global_ids as u64 || index > u32::MAX as u64 {
            return self.ctx.diags.report(
                ErrorKind::OperandResolution,
                bit,
                format!(
                    "function-local name '{}' cannot be associated with index {}",
                    name, index
                ),
            );
        }
        match self.get_operand(index as u32, bit)? {
            Operand::Var(var) => {
                self.func.set_var_name(var, name);
                Ok(())
            }
            Operand::Const(_) => self.ctx.diags.report(
                ErrorKind::NameConflict,
                bit,
                format!(
                    "function-local name '{}' cannot be associated with constant index {}",
                    name, index
                ),
            ),
        }
    }
}
