//! Per-function constants block decoding.
//!
//! The constants block interleaves with instruction records inside a
//! function block. A set-type record establishes the type of every
//! following literal record; each literal claims the next local value
//! slot through the same mechanism instructions use, so constants and
//! instruction results share one index space.

use std::sync::Arc;

use crate::bitcode::codes::{decode_sign_rotated, sign_extend};
use crate::bitcode::stream::{Record, RecordStream, StreamEvent};
use crate::diagnostics::{ErrorKind, TranslationError};
use crate::ir::constant::{Constant, ConstantRef};
use crate::ir::instr::Operand;
use crate::ir::types::Type;

use super::function::FunctionDecoder;
use super::{check_arity, end_of_stream, skip_block, unknown_record, Arity};

const BLOCK_NAME: &str = "constants";

impl<S: RecordStream> FunctionDecoder<'_, S> {
    pub(crate) fn run_constants_block(&mut self) -> Result<(), TranslationError> {
        // The type for succeeding literal records; unset until the first
        // set-type record.
        let mut next_type: Option<Type> = None;
        while let Some(event) = self.stream.next_event() {
            let bit = self.stream.bit_position();
            match event {
                StreamEvent::EnterBlock(id) => {
                    self.ctx.diags.report(
                        ErrorKind::Structural,
                        bit,
                        format!("unexpected block id {} inside constants block", id),
                    )?;
                    skip_block(self.ctx, self.stream)?;
                }
                StreamEvent::Record(record) => {
                    self.process_constants_record(&record, bit, &mut next_type)?;
                }
                StreamEvent::ExitBlock => return Ok(()),
            }
        }
        Err(end_of_stream(self.ctx, self.stream, BLOCK_NAME))
    }

    fn process_constants_record(
        &mut self,
        record: &Record,
        bit: u64,
        next_type: &mut Option<Type>,
    ) -> Result<(), TranslationError> {
        use crate::bitcode::codes::constants as code;

        let values = &record.values;
        match record.code {
            code::SETTYPE => {
                if !check_arity(self.ctx, bit, BLOCK_NAME, "set type", values, Arity::Exactly(1))? {
                    return Ok(());
                }
                let ty = self.ctx.simple_type(values[0], bit)?;
                if ty == Type::Void {
                    *next_type = None;
                    return self.ctx.diags.report(
                        ErrorKind::TypeCheck,
                        bit,
                        "constants block set type not allowed for void type",
                    );
                }
                *next_type = Some(ty);
            }
            code::UNDEF => {
                if !check_arity(self.ctx, bit, BLOCK_NAME, "undef", values, Arity::Exactly(0))? {
                    return Ok(());
                }
                let Some(ty) = self.require_set_type(*next_type, bit)? else {
                    return Ok(());
                };
                self.set_next_constant(Arc::new(Constant::Undef(ty)), bit)?;
            }
            code::INTEGER => {
                if !check_arity(self.ctx, bit, BLOCK_NAME, "integer", values, Arity::Exactly(1))? {
                    return Ok(());
                }
                let Some(ty) = self.require_set_type(*next_type, bit)? else {
                    return Ok(());
                };
                if !ty.is_scalar_integer() {
                    return self.ctx.diags.report(
                        ErrorKind::TypeCheck,
                        bit,
                        format!("constants block integer record for non-integer type {}", ty),
                    );
                }
                let value = sign_extend(decode_sign_rotated(values[0]), ty.scalar_int_width());
                self.set_next_constant(Arc::new(Constant::Integer { ty, value }), bit)?;
            }
            code::FLOAT => {
                if !check_arity(self.ctx, bit, BLOCK_NAME, "float", values, Arity::Exactly(1))? {
                    return Ok(());
                }
                let Some(ty) = self.require_set_type(*next_type, bit)? else {
                    return Ok(());
                };
                let constant = match ty {
                    Type::F32 => Constant::Float(f32::from_bits(values[0] as u32)),
                    Type::F64 => Constant::Double(f64::from_bits(values[0])),
                    _ => {
                        return self.ctx.diags.report(
                            ErrorKind::TypeCheck,
                            bit,
                            format!(
                                "constants block float record for non-floating type {}",
                                ty
                            ),
                        );
                    }
                };
                self.set_next_constant(Arc::new(constant), bit)?;
            }
            _ => unknown_record(self.ctx, bit, BLOCK_NAME, record)?,
        }
        Ok(())
    }

    /// The current set-type, or a diagnostic when literal records arrive
    /// before any set-type record.
    fn require_set_type(
        &mut self,
        next_type: Option<Type>,
        bit: u64,
    ) -> Result<Option<Type>, TranslationError> {
        if next_type.is_none() {
            self.ctx.diags.report(
                ErrorKind::Structural,
                bit,
                "constant record not preceded by set type record",
            )?;
        }
        Ok(next_type)
    }

    /// Bind a literal constant to the next local value slot.
    fn set_next_constant(
        &mut self,
        constant: ConstantRef,
        bit: u64,
    ) -> Result<(), TranslationError> {
        let index = self.next_local_index;
        self.set_operand(index, Operand::Const(constant), bit)?;
        self.next_local_index += 1;
        Ok(())
    }
}
