//! Types block decoding.
//!
//! The types block assigns dense IDs to every type the module uses. A
//! count record sizes the table; each defining record claims the next ID
//! in sequence. Records with invalid payloads do not claim an ID, so the
//! affected slots stay undefined and surface resolution errors at use.

use crate::bitcode::stream::{Record, RecordStream, StreamEvent};
use crate::diagnostics::{ErrorKind, TranslationError};
use crate::ir::types::{FuncSig, Type};

use super::context::Context;
use super::{check_arity, end_of_stream, skip_block, unknown_record, Arity};

const BLOCK_NAME: &str = "types";

pub(crate) fn run_types_block<S: RecordStream>(
    ctx: &mut Context,
    stream: &mut S,
) -> Result<(), TranslationError> {
    let mut next_type_id: u64 = 0;
    while let Some(event) = stream.next_event() {
        let bit = stream.bit_position();
        match event {
            StreamEvent::EnterBlock(id) => {
                ctx.diags.report(
                    ErrorKind::Structural,
                    bit,
                    format!("unexpected block id {} inside types block", id),
                )?;
                skip_block(ctx, stream)?;
            }
            StreamEvent::Record(record) => {
                process_record(ctx, &record, bit, &mut next_type_id)?;
            }
            StreamEvent::ExitBlock => return Ok(()),
        }
    }
    Err(end_of_stream(ctx, stream, BLOCK_NAME))
}

fn process_record(
    ctx: &mut Context,
    record: &Record,
    bit: u64,
    next_type_id: &mut u64,
) -> Result<(), TranslationError> {
    use crate::bitcode::codes::types as code;

    let values = &record.values;
    match record.code {
        code::COUNT => {
            if !check_arity(ctx, bit, BLOCK_NAME, "count", values, Arity::Exactly(1))? {
                return Ok(());
            }
            ctx.set_type_count(values[0] as usize);
        }
        code::VOID => {
            if !check_arity(ctx, bit, BLOCK_NAME, "void", values, Arity::Exactly(0))? {
                return Ok(());
            }
            define_simple(ctx, next_type_id, Type::Void, bit)?;
        }
        code::FLOAT => {
            if !check_arity(ctx, bit, BLOCK_NAME, "float", values, Arity::Exactly(0))? {
                return Ok(());
            }
            define_simple(ctx, next_type_id, Type::F32, bit)?;
        }
        code::DOUBLE => {
            if !check_arity(ctx, bit, BLOCK_NAME, "double", values, Arity::Exactly(0))? {
                return Ok(());
            }
            define_simple(ctx, next_type_id, Type::F64, bit)?;
        }
        code::INTEGER => {
            if !check_arity(ctx, bit, BLOCK_NAME, "integer", values, Arity::Exactly(1))? {
                return Ok(());
            }
            match Type::from_integer_width(values[0]) {
                Some(ty) => define_simple(ctx, next_type_id, ty, bit)?,
                None => ctx.diags.report(
                    ErrorKind::TypeCheck,
                    bit,
                    format!("integer type record with invalid bit width: {}", values[0]),
                )?,
            }
        }
        code::VECTOR => {
            if !check_arity(ctx, bit, BLOCK_NAME, "vector", values, Arity::Exactly(2))? {
                return Ok(());
            }
            let element = ctx.simple_type(values[1], bit)?;
            match Type::vector(element, values[0]) {
                Some(ty) => define_simple(ctx, next_type_id, ty, bit)?,
                None => ctx.diags.report(
                    ErrorKind::TypeCheck,
                    bit,
                    format!("invalid vector type record: <{} x {}>", values[0], element),
                )?,
            }
        }
        code::FUNCTION => {
            if !check_arity(ctx, bit, BLOCK_NAME, "signature", values, Arity::AtLeast(2))? {
                return Ok(());
            }
            if values[0] != 0 {
                ctx.diags.report(
                    ErrorKind::TypeCheck,
                    bit,
                    "function signature cannot declare varargs",
                )?;
            }
            let ret = ctx.simple_type(values[1], bit)?;
            let mut args = Vec::with_capacity(values.len() - 2);
            for (param, &type_id) in values[2..].iter().enumerate() {
                let mut arg = ctx.simple_type(type_id, bit)?;
                if arg == Type::Void {
                    ctx.diags.report(
                        ErrorKind::TypeCheck,
                        bit,
                        format!("type for parameter {} not valid; found {}", param + 1, arg),
                    )?;
                    arg = Type::I32;
                }
                args.push(arg);
            }
            let id = *next_type_id;
            *next_type_id += 1;
            ctx.define_signature(id, FuncSig::new(ret, args), bit)?;
        }
        _ => unknown_record(ctx, bit, BLOCK_NAME, record)?,
    }
    Ok(())
}

fn define_simple(
    ctx: &mut Context,
    next_type_id: &mut u64,
    ty: Type,
    bit: u64,
) -> Result<(), TranslationError> {
    let id = *next_type_id;
    *next_type_id += 1;
    ctx.define_simple_type(id, ty, bit)
}
