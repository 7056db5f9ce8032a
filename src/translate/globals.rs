//! Globals block decoding.
//!
//! The block starts with a count record that preallocates every variable
//! declaration, then describes each variable with a var record followed by
//! its initializers. A compound record announces how many initializers the
//! current variable carries; the bookkeeping is verified when the cursor
//! advances and again at block exit, self-correcting after a mismatch so
//! one bad variable does not cascade.

use crate::bitcode::codes::{decode_alignment, ALIGN_POWER_LIMIT};
use crate::bitcode::stream::{Record, RecordStream, StreamEvent};
use crate::diagnostics::{ErrorKind, TranslationError};
use crate::ir::globals::Initializer;

use super::context::Context;
use super::{check_arity, end_of_stream, skip_block, unknown_record, Arity};

const BLOCK_NAME: &str = "globals";

struct GlobalsState {
    /// Initializers the current variable still owes.
    initializers_needed: usize,
    /// Index of the next variable declaration to fill.
    next_global_id: usize,
    /// Index of the variable currently receiving initializers.
    current: Option<usize>,
}

pub(crate) fn run_globals_block<S: RecordStream>(
    ctx: &mut Context,
    stream: &mut S,
) -> Result<(), TranslationError> {
    let mut state = GlobalsState {
        initializers_needed: 0,
        next_global_id: 0,
        current: None,
    };
    while let Some(event) = stream.next_event() {
        let bit = stream.bit_position();
        match event {
            StreamEvent::EnterBlock(id) => {
                ctx.diags.report(
                    ErrorKind::Structural,
                    bit,
                    format!("unexpected block id {} inside globals block", id),
                )?;
                skip_block(ctx, stream)?;
            }
            StreamEvent::Record(record) => process_record(ctx, &record, bit, &mut state)?,
            StreamEvent::ExitBlock => {
                verify_initializer_count(ctx, &mut state, bit)?;
                if state.next_global_id < ctx.num_global_variables() {
                    ctx.diags.report(
                        ErrorKind::Structural,
                        bit,
                        format!(
                            "globals block expects {} variable declarations; found {}",
                            ctx.num_global_variables(),
                            state.next_global_id
                        ),
                    )?;
                }
                return Ok(());
            }
        }
    }
    Err(end_of_stream(ctx, stream, BLOCK_NAME))
}

fn process_record(
    ctx: &mut Context,
    record: &Record,
    bit: u64,
    state: &mut GlobalsState,
) -> Result<(), TranslationError> {
    use crate::bitcode::codes::globals as code;

    let values = &record.values;
    match record.code {
        code::COUNT => {
            if !check_arity(ctx, bit, BLOCK_NAME, "count", values, Arity::Exactly(1))? {
                return Ok(());
            }
            if state.next_global_id != 0 || ctx.num_global_variables() != 0 {
                return ctx.diags.report(
                    ErrorKind::Structural,
                    bit,
                    "globals count record not first in block",
                );
            }
            ctx.create_global_variables(values[0] as usize);
        }
        code::VAR => {
            if !check_arity(ctx, bit, BLOCK_NAME, "variable", values, Arity::Exactly(2))? {
                return Ok(());
            }
            verify_initializer_count(ctx, state, bit)?;
            let alignment = if values[0] <= ALIGN_POWER_LIMIT {
                decode_alignment(values[0])
            } else {
                ctx.diags.report(
                    ErrorKind::TypeCheck,
                    bit,
                    format!(
                        "variable alignment greater than 2**{}; found 2**{}",
                        ALIGN_POWER_LIMIT, values[0]
                    ),
                )?;
                1
            };
            let constant = values[1] != 0;
            let index = state.next_global_id;
            state.current = if index < ctx.num_global_variables() {
                Some(index)
            } else {
                ctx.diags.report(
                    ErrorKind::OperandResolution,
                    bit,
                    format!(
                        "global variable index {} out of range; must be less than {}",
                        index,
                        ctx.num_global_variables()
                    ),
                )?;
                None
            };
            if let Some(index) = state.current {
                let var = &mut ctx.variables_mut()[index];
                var.alignment = alignment;
                var.constant = constant;
            }
            state.initializers_needed = 1;
            state.next_global_id += 1;
        }
        code::COMPOUND => {
            if !check_arity(ctx, bit, BLOCK_NAME, "compound", values, Arity::Exactly(1))? {
                return Ok(());
            }
            if current_initializer_count(ctx, state) != 0 {
                return ctx.diags.report(
                    ErrorKind::Structural,
                    bit,
                    "globals compound record not first initializer",
                );
            }
            if values[0] < 2 {
                return ctx.diags.report(
                    ErrorKind::RecordShape,
                    bit,
                    format!("globals compound record size invalid; found {}", values[0]),
                );
            }
            state.initializers_needed = values[0] as usize;
        }
        code::ZEROFILL => {
            if !check_arity(ctx, bit, BLOCK_NAME, "zerofill", values, Arity::Exactly(1))? {
                return Ok(());
            }
            append_initializer(ctx, state, Initializer::Zerofill(values[0]), bit)?;
        }
        code::DATA => {
            if !check_arity(ctx, bit, BLOCK_NAME, "data", values, Arity::AtLeast(1))? {
                return Ok(());
            }
            let bytes = values.iter().map(|&v| v as u8).collect();
            append_initializer(ctx, state, Initializer::Data(bytes), bit)?;
        }
        code::RELOC => {
            if !check_arity(ctx, bit, BLOCK_NAME, "reloc", values, Arity::Range(1, 2))? {
                return Ok(());
            }
            let global_id = values[0];
            if global_id as usize >= ctx.num_global_ids() {
                ctx.diags.report(
                    ErrorKind::OperandResolution,
                    bit,
                    format!("reloc initializer references unknown global {}", global_id),
                )?;
            }
            let offset = values.get(1).copied().unwrap_or(0);
            append_initializer(ctx, state, Initializer::Reloc { global_id, offset }, bit)?;
        }
        _ => unknown_record(ctx, bit, BLOCK_NAME, record)?,
    }
    Ok(())
}

fn current_initializer_count(ctx: &Context, state: &GlobalsState) -> usize {
    state
        .current
        .and_then(|index| ctx.variables().get(index))
        .map(|var| var.initializers.len())
        .unwrap_or(0)
}

fn append_initializer(
    ctx: &mut Context,
    state: &mut GlobalsState,
    init: Initializer,
    bit: u64,
) -> Result<(), TranslationError> {
    let Some(index) = state.current else {
        return ctx.diags.report(
            ErrorKind::Structural,
            bit,
            "initializer record not preceded by a variable record",
        );
    };
    ctx.variables_mut()[index].initializers.push(init);
    Ok(())
}

/// Check that the current variable received exactly the announced number
/// of initializers. On mismatch, report once and adopt the actual count so
/// the error does not repeat at every later cursor advance.
fn verify_initializer_count(
    ctx: &mut Context,
    state: &mut GlobalsState,
    bit: u64,
) -> Result<(), TranslationError> {
    if state.current.is_none() {
        return Ok(());
    }
    let found = current_initializer_count(ctx, state);
    if state.initializers_needed != found {
        let needed = state.initializers_needed;
        state.initializers_needed = found;
        ctx.diags.report(
            ErrorKind::Structural,
            bit,
            format!(
                "global variable @g{} expected {} initializer{}; found {}",
                state.next_global_id.saturating_sub(1),
                needed,
                if needed == 1 { "" } else { "s" },
                found
            ),
        )?;
    }
    Ok(())
}
