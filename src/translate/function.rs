//! Function block decoding: the core state machine.
//!
//! A function block carries the body of the next defined function, as a
//! flat sequence of instruction records. Three pieces of state make the
//! decoding work:
//!
//! - **The local value space.** Instruction results occupy indices at and
//!   above the global ID boundary, assigned monotonically as each
//!   value-producing record is decoded. Operands are encoded relative to
//!   the index of the value being defined, so a record that fails type
//!   checking must still claim its destination slot (as a self-assignment)
//!   or every later index in the function desynchronizes.
//! - **Forward references.** A forward-type-ref record plants a placeholder
//!   variable at a not-yet-reached slot; when the defining instruction
//!   arrives it must find exactly that placeholder.
//! - **Terminator tracking.** Blocks are delimited only by terminators:
//!   after one is appended, the next record first advances the current
//!   node cursor, then decodes normally.

use std::sync::Arc;

use tracing::debug;

use crate::bitcode::codes::{
    block, decode_alignment, decode_sign_rotated, sign_extend, ALIGN_POWER_LIMIT,
};
use crate::bitcode::stream::{Record, RecordStream, StreamEvent};
use crate::diagnostics::{ErrorKind, TranslationError};
use crate::ir::cfg::{Cfg, NodeIndex, VarId};
use crate::ir::constant::Constant;
use crate::ir::globals::CallingConv;
use crate::ir::instr::{ArithOp, CastOp, FcmpCond, IcmpCond, Inst, InstKind, Operand};
use crate::ir::types::Type;

use super::context::Context;
use super::intrinsics::{self, CallValidation, IntrinsicSig, INTRINSIC_PREFIX};
use super::{check_arity, end_of_stream, skip_block, unknown_record, Arity};

const BLOCK_NAME: &str = "function";

/// Decodes one function block into a [`Cfg`].
pub(crate) struct FunctionDecoder<'a, S: RecordStream> {
    pub(crate) ctx: &'a mut Context,
    pub(crate) stream: &'a mut S,
    pub(crate) func: Cfg,
    /// Node currently receiving instructions.
    current_node: NodeIndex,
    /// The boundary between global and local value indices.
    pub(crate) num_global_ids: u32,
    /// Absolute index of the next value-producing instruction.
    pub(crate) next_local_index: u32,
    /// Local value slots, keyed by `absolute index - num_global_ids`.
    local_operands: Vec<Option<Operand>>,
    /// Set when the last appended instruction was a terminator.
    inst_is_terminating: bool,
    /// Set once a block-count record has been accepted.
    declared_blocks: bool,
    /// Set once any instruction record has been decoded.
    started_body: bool,
}

impl<'a, S: RecordStream> FunctionDecoder<'a, S> {
    /// Bind the next function block to its declaration: create the entry
    /// node and assign the formal parameters to the first local slots.
    pub(crate) fn new(ctx: &'a mut Context, stream: &'a mut S) -> Result<Self, TranslationError> {
        let bit = stream.bit_position();
        let func_id = ctx.next_function_block_ordinal(bit)?;
        // The ordinal always indexes a declaration; it was recorded when
        // the declaration was appended.
        let decl = ctx.function(func_id).cloned().ok_or_else(|| {
            TranslationError::Malformed(format!("function declaration {} missing", func_id))
        })?;
        let name = decl.name.clone().unwrap_or_default();
        let internal = decl.linkage == crate::ir::globals::Linkage::Internal;
        let mut func = Cfg::new(name, func_id, decl.sig.ret, internal);
        let entry = func.make_node();
        let num_global_ids = ctx.num_global_ids() as u32;
        let mut decoder = Self {
            ctx,
            stream,
            func,
            current_node: entry,
            num_global_ids,
            next_local_index: num_global_ids,
            local_operands: Vec::new(),
            inst_is_terminating: false,
            declared_blocks: false,
            started_body: false,
        };
        for &arg_ty in &decl.sig.args {
            let var = decoder.next_inst_var(arg_ty, bit)?;
            decoder.func.args.push(var);
        }
        Ok(decoder)
    }

    /// Decode until the block exits. Returns the finished CFG only when
    /// the module is still error-free; otherwise the body is discarded.
    pub(crate) fn run(mut self) -> Result<Option<Cfg>, TranslationError> {
        while let Some(event) = self.stream.next_event() {
            let bit = self.stream.bit_position();
            match event {
                StreamEvent::EnterBlock(id) => self.enter_nested_block(id)?,
                StreamEvent::Record(record) => self.process_record(&record, bit)?,
                StreamEvent::ExitBlock => return self.finish(bit),
            }
        }
        Err(end_of_stream(self.ctx, self.stream, BLOCK_NAME))
    }

    fn enter_nested_block(&mut self, id: u64) -> Result<(), TranslationError> {
        match id {
            block::CONSTANTS => self.run_constants_block(),
            block::VALUE_SYMTAB => self.run_local_symtab(),
            _ => {
                let bit = self.stream.bit_position();
                self.ctx.diags.report(
                    ErrorKind::Structural,
                    bit,
                    format!("don't know how to parse block id {} inside function block", id),
                )?;
                skip_block(self.ctx, self.stream)
            }
        }
    }

    fn finish(mut self, bit: u64) -> Result<Option<Cfg>, TranslationError> {
        // Defensive: well-formed input terminates every block, but an
        // empty node must not reach lowering.
        for index in 0..self.func.num_nodes() {
            if self.func.node(index).insts.is_empty() {
                self.ctx.diags.report(
                    ErrorKind::Structural,
                    bit,
                    format!("basic block {} contains no instructions", index),
                )?;
                self.func
                    .append_inst(index, Inst::new(InstKind::Unreachable, None));
            }
        }
        self.func.compute_predecessors();
        debug!(
            function = %self.func.name,
            nodes = self.func.num_nodes(),
            values = self.func.num_variables(),
            "decoded function body"
        );
        if self.ctx.diags.is_clean() {
            Ok(Some(self.func))
        } else {
            Ok(None)
        }
    }

    // ------------------------------------------------------------------
    // Local value space
    // ------------------------------------------------------------------

    /// Make a fresh instruction variable; `void` results are invalid and
    /// recover as `i32`.
    fn create_inst_var(&mut self, ty: Type, bit: u64) -> Result<VarId, TranslationError> {
        let ty = if ty == Type::Void {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                "cannot define instruction value of type void",
            )?;
            Type::I32
        } else {
            ty
        };
        Ok(self.func.make_variable(ty))
    }

    /// Claim the next local value slot with a variable of type `ty`.
    ///
    /// A forward-type-ref may have planted a placeholder there already; it
    /// is reused when the types match, and anything else at the slot is an
    /// illegal forward reference.
    pub(crate) fn next_inst_var(&mut self, ty: Type, bit: u64) -> Result<VarId, TranslationError> {
        let local = (self.next_local_index - self.num_global_ids) as usize;
        let existing = self.local_operands.get(local).cloned().flatten();
        if let Some(op) = existing {
            if let Operand::Var(var) = op {
                if self.func.var_type(var) == ty {
                    self.next_local_index += 1;
                    return Ok(var);
                }
            }
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!(
                    "illegal forward reference at value index {}",
                    self.next_local_index
                ),
            )?;
            self.next_local_index += 1;
            return self.create_inst_var(ty, bit);
        }
        let var = self.create_inst_var(ty, bit)?;
        let index = self.next_local_index;
        self.set_operand(index, Operand::Var(var), bit)?;
        self.next_local_index += 1;
        Ok(var)
    }

    /// Set local value slot `index` (absolute). A slot may be set once;
    /// setting it again is benign only for the identical operand.
    pub(crate) fn set_operand(
        &mut self,
        index: u32,
        op: Operand,
        bit: u64,
    ) -> Result<(), TranslationError> {
        if index < self.num_global_ids {
            return self.ctx.diags.report(
                ErrorKind::OperandResolution,
                bit,
                format!("cannot define local value at global index {}", index),
            );
        }
        let local = (index - self.num_global_ids) as usize;
        if local >= self.local_operands.len() {
            self.local_operands.resize(local + 1, None);
        }
        let conflict = match &self.local_operands[local] {
            None => false,
            Some(old) if old.same(&op) => return Ok(()),
            Some(_) => true,
        };
        if conflict {
            self.ctx.diags.report(
                ErrorKind::NameConflict,
                bit,
                format!("multiple definitions for value index {}", index),
            )?;
        }
        self.local_operands[local] = Some(op);
        Ok(())
    }

    /// Resolve an absolute value index: global IDs become memoized
    /// relocatable constants, local indices read the operand table.
    pub(crate) fn get_operand(&mut self, index: u32, bit: u64) -> Result<Operand, TranslationError> {
        if index < self.num_global_ids {
            return self
                .ctx
                .global_constant(index as u64, bit)
                .map(Operand::Const);
        }
        let local = (index - self.num_global_ids) as usize;
        match self.local_operands.get(local).cloned().flatten() {
            Some(op) => Ok(op),
            None => {
                self.ctx.diags.report(
                    ErrorKind::OperandResolution,
                    bit,
                    format!("value index {} not defined", index),
                )?;
                Ok(Operand::Const(Arc::new(Constant::Undef(Type::I32))))
            }
        }
    }

    /// Convert a relative operand reference to an absolute index. Offsets
    /// past the base resolve to index 0 after a diagnostic; negative
    /// offsets (from sign-rotated encodings) reach forward.
    fn relative_index(&mut self, id: i64, base: u32, bit: u64) -> Result<u32, TranslationError> {
        let abs = base as i64 - id;
        if abs < 0 || abs > u32::MAX as i64 {
            self.ctx.diags.report(
                ErrorKind::OperandResolution,
                bit,
                format!("invalid relative value id: {} (base {})", id, base),
            )?;
            return Ok(0);
        }
        Ok(abs as u32)
    }

    fn relative_operand(
        &mut self,
        raw: u64,
        base: u32,
        bit: u64,
    ) -> Result<Operand, TranslationError> {
        let index = self.relative_index(raw as i64, base, bit)?;
        self.get_operand(index, bit)
    }

    pub(crate) fn operand_type(&self, op: &Operand) -> Type {
        match op {
            Operand::Var(id) => self.func.var_type(*id),
            Operand::Const(c) => c.ty(),
        }
    }

    /// Claim the destination slot for a record that failed its checks, as
    /// a self-assignment, so later relative indices stay consistent. Void
    /// results claim no slot and need no placeholder.
    fn append_error_inst(&mut self, ty: Type, bit: u64) -> Result<(), TranslationError> {
        if ty == Type::Void {
            return Ok(());
        }
        let var = self.next_inst_var(ty, bit)?;
        self.append(InstKind::Assign {
            src: Operand::Var(var),
        }, Some(var));
        Ok(())
    }

    fn append(&mut self, kind: InstKind, dest: Option<VarId>) {
        self.func.append_inst(self.current_node, Inst::new(kind, dest));
    }

    // ------------------------------------------------------------------
    // Node references
    // ------------------------------------------------------------------

    /// Node by index, recovering to the entry node when out of range.
    fn node_at(&mut self, index: usize, bit: u64) -> Result<NodeIndex, TranslationError> {
        if index >= self.func.num_nodes() {
            self.ctx.diags.report(
                ErrorKind::OperandResolution,
                bit,
                format!(
                    "reference to basic block {} not found; must be less than {}",
                    index,
                    self.func.num_nodes()
                ),
            )?;
            return Ok(0);
        }
        Ok(index)
    }

    /// Branch target: like [`node_at`], but branching to the entry node is
    /// additionally an error.
    fn branch_target(&mut self, index: u64, bit: u64) -> Result<NodeIndex, TranslationError> {
        if index == 0 {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                "branch to entry block not allowed",
            )?;
        }
        self.node_at(index as usize, bit)
    }

    fn extract_alignment(
        &mut self,
        inst: &str,
        exponent: u64,
        bit: u64,
    ) -> Result<u64, TranslationError> {
        if exponent <= ALIGN_POWER_LIMIT {
            return Ok(decode_alignment(exponent));
        }
        self.ctx.diags.report(
            ErrorKind::TypeCheck,
            bit,
            format!(
                "{} alignment greater than 2**{}; found 2**{}",
                inst, ALIGN_POWER_LIMIT, exponent
            ),
        )?;
        Ok(1)
    }

    // ------------------------------------------------------------------
    // Instruction records
    // ------------------------------------------------------------------

    fn process_record(&mut self, record: &Record, bit: u64) -> Result<(), TranslationError> {
        use crate::bitcode::codes::function as code;

        // Blocks are delimited by terminators: the record after one
        // targets the next preallocated node.
        if self.inst_is_terminating {
            self.inst_is_terminating = false;
            let next = self.current_node + 1;
            self.current_node = self.node_at(next, bit)?;
        }
        if record.code != code::DECLAREBLOCKS {
            self.started_body = true;
        }
        // Base for relative operand references: captured before this
        // record allocates its own destination.
        let base = self.next_local_index;
        let values = &record.values;
        match record.code {
            code::DECLAREBLOCKS => self.decode_declare_blocks(values, bit),
            code::BINOP => self.decode_binop(values, base, bit),
            code::CAST => self.decode_cast(values, base, bit),
            code::VSELECT => self.decode_select(values, base, bit),
            code::EXTRACTELT => self.decode_extract_element(values, base, bit),
            code::INSERTELT => self.decode_insert_element(values, base, bit),
            code::CMP2 => self.decode_compare(values, base, bit),
            code::RET => self.decode_ret(values, base, bit),
            code::BR => self.decode_br(values, base, bit),
            code::SWITCH => self.decode_switch(values, base, bit),
            code::UNREACHABLE => self.decode_unreachable(values, bit),
            code::PHI => self.decode_phi(values, base, bit),
            code::ALLOCA => self.decode_alloca(values, base, bit),
            code::LOAD => self.decode_load(values, base, bit),
            code::STORE => self.decode_store(values, base, bit),
            code::CALL | code::CALL_INDIRECT => {
                self.decode_call(values, base, bit, record.code == code::CALL_INDIRECT)
            }
            code::FORWARDTYPEREF => self.decode_forward_type_ref(values, bit),
            _ => unknown_record(self.ctx, bit, BLOCK_NAME, record),
        }
    }

    fn decode_declare_blocks(&mut self, values: &[u64], bit: u64) -> Result<(), TranslationError> {
        if !check_arity(self.ctx, bit, BLOCK_NAME, "count", values, Arity::Exactly(1))? {
            return Ok(());
        }
        let mut count = values[0];
        if count == 0 {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                "functions must contain at least one basic block",
            )?;
            count = 1;
        }
        if self.declared_blocks {
            return self.ctx.diags.report(
                ErrorKind::Structural,
                bit,
                "duplicate function block count record",
            );
        }
        if self.started_body {
            return self.ctx.diags.report(
                ErrorKind::Structural,
                bit,
                "function block count record must precede instructions",
            );
        }
        self.declared_blocks = true;
        // The entry node already exists.
        for _ in 1..count {
            self.func.make_node();
        }
        Ok(())
    }

    fn decode_binop(&mut self, values: &[u64], base: u32, bit: u64) -> Result<(), TranslationError> {
        if !check_arity(self.ctx, bit, BLOCK_NAME, "binop", values, Arity::Exactly(3))? {
            return Ok(());
        }
        let lhs = self.relative_operand(values[0], base, bit)?;
        let rhs = self.relative_operand(values[1], base, bit)?;
        let lhs_ty = self.operand_type(&lhs);
        let rhs_ty = self.operand_type(&rhs);
        if lhs_ty != rhs_ty {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!("binop argument types differ: {} and {}", lhs_ty, rhs_ty),
            )?;
            return self.append_error_inst(lhs_ty, bit);
        }
        let Some(op) = self.convert_binop(values[2], lhs_ty, bit)? else {
            return self.append_error_inst(lhs_ty, bit);
        };
        let dest = self.next_inst_var(lhs_ty, bit)?;
        self.append(InstKind::Arith { op, lhs, rhs }, Some(dest));
        Ok(())
    }

    fn convert_binop(
        &mut self,
        opcode: u64,
        ty: Type,
        bit: u64,
    ) -> Result<Option<ArithOp>, TranslationError> {
        use crate::bitcode::codes::binop as code;

        let op = match opcode {
            code::ADD => {
                if ty.is_integer() {
                    ArithOp::Add
                } else {
                    ArithOp::Fadd
                }
            }
            code::SUB => {
                if ty.is_integer() {
                    ArithOp::Sub
                } else {
                    ArithOp::Fsub
                }
            }
            code::MUL => {
                if ty.is_integer() {
                    ArithOp::Mul
                } else {
                    ArithOp::Fmul
                }
            }
            code::UDIV => ArithOp::Udiv,
            code::SDIV => {
                if ty.is_integer() {
                    ArithOp::Sdiv
                } else {
                    ArithOp::Fdiv
                }
            }
            code::UREM => ArithOp::Urem,
            code::SREM => {
                if ty.is_integer() {
                    ArithOp::Srem
                } else {
                    ArithOp::Frem
                }
            }
            code::SHL => ArithOp::Shl,
            code::LSHR => ArithOp::Lshr,
            code::ASHR => ArithOp::Ashr,
            code::AND => ArithOp::And,
            code::OR => ArithOp::Or,
            code::XOR => ArithOp::Xor,
            _ => {
                self.ctx.diags.report(
                    ErrorKind::TypeCheck,
                    bit,
                    format!("binary opcode {} not understood for type {}", opcode, ty),
                )?;
                return Ok(None);
            }
        };
        let valid = match op {
            ArithOp::Fadd | ArithOp::Fsub | ArithOp::Fmul | ArithOp::Fdiv | ArithOp::Frem => {
                ty.is_float()
            }
            // Logical ops accept booleans; the rest need arithmetic
            // integer types.
            ArithOp::And | ArithOp::Or | ArithOp::Xor => ty.is_integer(),
            _ => ty.is_integer_arithmetic(),
        };
        if !valid {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!("invalid operand type for {}; found {}", op.name(), ty),
            )?;
            return Ok(None);
        }
        Ok(Some(op))
    }

    fn decode_cast(&mut self, values: &[u64], base: u32, bit: u64) -> Result<(), TranslationError> {
        if !check_arity(self.ctx, bit, BLOCK_NAME, "cast", values, Arity::Exactly(3))? {
            return Ok(());
        }
        let src = self.relative_operand(values[0], base, bit)?;
        let cast_ty = self.ctx.simple_type(values[1], bit)?;
        let src_ty = self.operand_type(&src);
        let Some(op) = self.convert_cast_op(values[2], src_ty, cast_ty, bit)? else {
            return self.append_error_inst(cast_ty, bit);
        };
        let dest = self.next_inst_var(cast_ty, bit)?;
        self.append(InstKind::Cast { op, src }, Some(dest));
        Ok(())
    }

    fn convert_cast_op(
        &mut self,
        opcode: u64,
        src: Type,
        dst: Type,
        bit: u64,
    ) -> Result<Option<CastOp>, TranslationError> {
        use crate::bitcode::codes::cast as code;

        let op = match opcode {
            code::TRUNC => CastOp::Trunc,
            code::ZEXT => CastOp::Zext,
            code::SEXT => CastOp::Sext,
            code::FPTOUI => CastOp::Fptoui,
            code::FPTOSI => CastOp::Fptosi,
            code::UITOFP => CastOp::Uitofp,
            code::SITOFP => CastOp::Sitofp,
            code::FPTRUNC => CastOp::Fptrunc,
            code::FPEXT => CastOp::Fpext,
            code::BITCAST => CastOp::Bitcast,
            _ => {
                self.ctx.diags.report(
                    ErrorKind::TypeCheck,
                    bit,
                    format!("cast opcode {} not understood", opcode),
                )?;
                return Ok(None);
            }
        };
        let valid = match op {
            CastOp::Trunc => int_trunc_valid(src, dst),
            CastOp::Zext | CastOp::Sext => int_trunc_valid(dst, src),
            CastOp::Fptoui | CastOp::Fptosi => float_to_int_valid(src, dst),
            CastOp::Uitofp | CastOp::Sitofp => float_to_int_valid(dst, src),
            CastOp::Fptrunc => float_trunc_valid(src, dst),
            CastOp::Fpext => float_trunc_valid(dst, src),
            CastOp::Bitcast => {
                src != Type::Void && dst != Type::Void && src.bit_width() == dst.bit_width()
            }
        };
        if !valid {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!("illegal cast: {} {} to {}", op.name(), src, dst),
            )?;
            return Ok(None);
        }
        Ok(Some(op))
    }

    fn decode_select(&mut self, values: &[u64], base: u32, bit: u64) -> Result<(), TranslationError> {
        if !check_arity(self.ctx, bit, BLOCK_NAME, "select", values, Arity::Exactly(3))? {
            return Ok(());
        }
        let then_val = self.relative_operand(values[0], base, bit)?;
        let else_val = self.relative_operand(values[1], base, bit)?;
        let cond = self.relative_operand(values[2], base, bit)?;
        let then_ty = self.operand_type(&then_val);
        let else_ty = self.operand_type(&else_val);
        if then_ty != else_ty {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!("select operands not same type: {} and {}", then_ty, else_ty),
            )?;
            return self.append_error_inst(then_ty, bit);
        }
        let cond_ty = self.operand_type(&cond);
        if cond_ty.is_vector() {
            if !then_ty.is_vector()
                || cond_ty.element_type() != Type::I1
                || then_ty.num_elements() != cond_ty.num_elements()
            {
                self.ctx.diags.report(
                    ErrorKind::TypeCheck,
                    bit,
                    format!(
                        "select condition type {} not allowed for values of type {}",
                        cond_ty, then_ty
                    ),
                )?;
                return self.append_error_inst(then_ty, bit);
            }
        } else if cond_ty != Type::I1 {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!("select condition not i1; found {}", cond_ty),
            )?;
            return self.append_error_inst(then_ty, bit);
        }
        let dest = self.next_inst_var(then_ty, bit)?;
        self.append(
            InstKind::Select {
                cond,
                then_val,
                else_val,
            },
            Some(dest),
        );
        Ok(())
    }

    fn decode_extract_element(
        &mut self,
        values: &[u64],
        base: u32,
        bit: u64,
    ) -> Result<(), TranslationError> {
        if !check_arity(
            self.ctx,
            bit,
            BLOCK_NAME,
            "extract element",
            values,
            Arity::Exactly(2),
        )? {
            return Ok(());
        }
        let vec = self.relative_operand(values[0], base, bit)?;
        let index = self.relative_operand(values[1], base, bit)?;
        let vec_ty = self.operand_type(&vec);
        if let Some(problem) = self.vector_index_problem(&vec, &index) {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!("{}: extractelement on {}", problem, vec_ty),
            )?;
            return self.append_error_inst(vec_ty, bit);
        }
        let dest = self.next_inst_var(vec_ty.element_type(), bit)?;
        self.append(InstKind::ExtractElement { vec, index }, Some(dest));
        Ok(())
    }

    fn decode_insert_element(
        &mut self,
        values: &[u64],
        base: u32,
        bit: u64,
    ) -> Result<(), TranslationError> {
        if !check_arity(
            self.ctx,
            bit,
            BLOCK_NAME,
            "insert element",
            values,
            Arity::Exactly(3),
        )? {
            return Ok(());
        }
        let vec = self.relative_operand(values[0], base, bit)?;
        let elt = self.relative_operand(values[1], base, bit)?;
        let index = self.relative_operand(values[2], base, bit)?;
        let vec_ty = self.operand_type(&vec);
        let elt_ty = self.operand_type(&elt);
        if let Some(problem) = self.vector_index_problem(&vec, &index) {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!("{}: insertelement on {}", problem, vec_ty),
            )?;
            return self.append_error_inst(elt_ty, bit);
        }
        let dest = self.next_inst_var(vec_ty, bit)?;
        self.append(InstKind::InsertElement { vec, elt, index }, Some(dest));
        Ok(())
    }

    /// Why a vector index operand is invalid, or `None` when it is fine.
    fn vector_index_problem(&self, vec: &Operand, index: &Operand) -> Option<&'static str> {
        let vec_ty = self.operand_type(vec);
        if !vec_ty.is_vector() {
            return Some("vector index on non vector");
        }
        let Some(constant) = index.as_const() else {
            return Some("vector index not integer constant");
        };
        let Constant::Integer { ty, value } = &**constant else {
            return Some("vector index not integer constant");
        };
        if *value < 0 || *value as usize >= vec_ty.num_elements() {
            return Some("vector index not in range of vector");
        }
        if *ty != Type::I32 {
            return Some("vector index not of type i32");
        }
        None
    }

    fn decode_compare(&mut self, values: &[u64], base: u32, bit: u64) -> Result<(), TranslationError> {
        if !check_arity(self.ctx, bit, BLOCK_NAME, "compare", values, Arity::Exactly(3))? {
            return Ok(());
        }
        let lhs = self.relative_operand(values[0], base, bit)?;
        let mut rhs = self.relative_operand(values[1], base, bit)?;
        let lhs_ty = self.operand_type(&lhs);
        let rhs_ty = self.operand_type(&rhs);
        let dest_ty = lhs_ty.compare_result_type();
        if lhs_ty != rhs_ty {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!("compare argument types differ: {} and {}", lhs_ty, rhs_ty),
            )?;
            rhs = lhs.clone();
        }
        if dest_ty == Type::Void {
            return self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!("compare not defined for type {}", lhs_ty),
            );
        }
        let dest = self.next_inst_var(dest_ty, bit)?;
        if lhs_ty.is_integer() {
            match IcmpCond::decode(values[2]) {
                Some(cond) => self.append(InstKind::Icmp { cond, lhs, rhs }, Some(dest)),
                None => {
                    self.ctx.diags.report(
                        ErrorKind::TypeCheck,
                        bit,
                        format!(
                            "compare record contains unknown integer predicate index: {}",
                            values[2]
                        ),
                    )?;
                    self.append(
                        InstKind::Assign {
                            src: Operand::Var(dest),
                        },
                        Some(dest),
                    );
                }
            }
        } else {
            match FcmpCond::decode(values[2]) {
                Some(cond) => self.append(InstKind::Fcmp { cond, lhs, rhs }, Some(dest)),
                None => {
                    self.ctx.diags.report(
                        ErrorKind::TypeCheck,
                        bit,
                        format!(
                            "compare record contains unknown float predicate index: {}",
                            values[2]
                        ),
                    )?;
                    self.append(
                        InstKind::Assign {
                            src: Operand::Var(dest),
                        },
                        Some(dest),
                    );
                }
            }
        }
        Ok(())
    }

    fn decode_ret(&mut self, values: &[u64], base: u32, bit: u64) -> Result<(), TranslationError> {
        if !check_arity(self.ctx, bit, BLOCK_NAME, "return", values, Arity::Range(0, 1))? {
            return Ok(());
        }
        let value = if values.is_empty() {
            None
        } else {
            Some(self.relative_operand(values[0], base, bit)?)
        };
        self.append(InstKind::Ret { value }, None);
        self.inst_is_terminating = true;
        Ok(())
    }

    fn decode_br(&mut self, values: &[u64], base: u32, bit: u64) -> Result<(), TranslationError> {
        if values.len() == 1 {
            let dest = self.branch_target(values[0], bit)?;
            self.append(InstKind::Br { dest }, None);
        } else {
            if !check_arity(self.ctx, bit, BLOCK_NAME, "branch", values, Arity::Exactly(3))? {
                return Ok(());
            }
            let cond = self.relative_operand(values[2], base, bit)?;
            let cond_ty = self.operand_type(&cond);
            if cond_ty != Type::I1 {
                return self.ctx.diags.report(
                    ErrorKind::TypeCheck,
                    bit,
                    format!("branch condition not i1; found {}", cond_ty),
                );
            }
            let then_dest = self.branch_target(values[0], bit)?;
            let else_dest = self.branch_target(values[1], bit)?;
            self.append(
                InstKind::CondBr {
                    cond,
                    then_dest,
                    else_dest,
                },
                None,
            );
        }
        self.inst_is_terminating = true;
        Ok(())
    }

    fn decode_switch(&mut self, values: &[u64], base: u32, bit: u64) -> Result<(), TranslationError> {
        // The case tuples carry two constant-1 fields the frozen wire
        // format never cleaned up; they are validated and discarded.
        if !check_arity(self.ctx, bit, BLOCK_NAME, "switch", values, Arity::AtLeast(4))? {
            return Ok(());
        }
        let cond_ty = self.ctx.simple_type(values[0], bit)?;
        if !cond_ty.is_scalar_integer() {
            return self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!("switch condition must be a scalar integer; found {}", cond_ty),
            );
        }
        let width = cond_ty.scalar_int_width();
        let cond = self.relative_operand(values[1], base, bit)?;
        let found_ty = self.operand_type(&cond);
        if found_ty != cond_ty {
            return self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!(
                    "switch condition expects type {}; found {}",
                    cond_ty, found_ty
                ),
            );
        }
        let default_dest = self.branch_target(values[2], bit)?;
        let num_cases = values[3] as usize;
        let expected = 4usize.saturating_add(num_cases.saturating_mul(4));
        if !check_arity(self.ctx, bit, BLOCK_NAME, "switch", values, Arity::Exactly(expected))? {
            return Ok(());
        }
        let mut cases = Vec::with_capacity(num_cases);
        for case in 0..num_cases {
            let entry = 4 + case * 4;
            if values[entry] != 1 || values[entry + 1] != 1 {
                // Abandon the remaining cases; the switch keeps the ones
                // decoded so far and the function stays consistent.
                self.ctx.diags.report(
                    ErrorKind::RecordShape,
                    bit,
                    format!(
                        "sequence [1, 1, value, label] expected for case entry {} in switch record",
                        case
                    ),
                )?;
                break;
            }
            let value = sign_extend(decode_sign_rotated(values[entry + 2]), width);
            let label = self.branch_target(values[entry + 3], bit)?;
            cases.push((value, label));
        }
        self.append(
            InstKind::Switch {
                cond,
                default_dest,
                cases,
            },
            None,
        );
        self.inst_is_terminating = true;
        Ok(())
    }

    fn decode_unreachable(&mut self, values: &[u64], bit: u64) -> Result<(), TranslationError> {
        if !check_arity(
            self.ctx,
            bit,
            BLOCK_NAME,
            "unreachable",
            values,
            Arity::Exactly(0),
        )? {
            return Ok(());
        }
        self.append(InstKind::Unreachable, None);
        self.inst_is_terminating = true;
        Ok(())
    }

    fn decode_phi(&mut self, values: &[u64], base: u32, bit: u64) -> Result<(), TranslationError> {
        if !check_arity(self.ctx, bit, BLOCK_NAME, "phi", values, Arity::AtLeast(3))? {
            return Ok(());
        }
        let ty = self.ctx.simple_type(values[0], bit)?;
        if values.len() % 2 == 0 {
            self.ctx.diags.report(
                ErrorKind::RecordShape,
                bit,
                format!("phi record size not valid: {}", values.len()),
            )?;
            return self.append_error_inst(ty, bit);
        }
        if ty == Type::Void {
            return self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                "phi record using type void not allowed",
            );
        }
        let dest = self.next_inst_var(ty, bit)?;
        let mut args = Vec::with_capacity(values.len() / 2);
        for pair in values[1..].chunks_exact(2) {
            // Incoming values are sign-rotated so they can reach forward.
            let id = decode_sign_rotated(pair[0]);
            let index = self.relative_index(id, base, bit)?;
            let op = self.get_operand(index, bit)?;
            let op_ty = self.operand_type(&op);
            if op_ty != ty {
                self.ctx.diags.report(
                    ErrorKind::TypeCheck,
                    bit,
                    format!("phi operand not type {}; found {}", ty, op_ty),
                )?;
                self.append(
                    InstKind::Assign {
                        src: Operand::Var(dest),
                    },
                    Some(dest),
                );
                return Ok(());
            }
            let label = self.node_at(pair[1] as usize, bit)?;
            args.push((op, label));
        }
        self.append(InstKind::Phi { args }, Some(dest));
        Ok(())
    }

    fn decode_alloca(&mut self, values: &[u64], base: u32, bit: u64) -> Result<(), TranslationError> {
        if !check_arity(self.ctx, bit, BLOCK_NAME, "alloca", values, Arity::Exactly(2))? {
            return Ok(());
        }
        let byte_count = self.relative_operand(values[0], base, bit)?;
        let alignment = self.extract_alignment("alloca", values[1], bit)?;
        let ptr_ty = Type::pointer();
        let count_ty = self.operand_type(&byte_count);
        if count_ty != Type::I32 {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!("alloca byte count not i32; found {}", count_ty),
            )?;
            return self.append_error_inst(ptr_ty, bit);
        }
        let dest = self.next_inst_var(ptr_ty, bit)?;
        self.append(
            InstKind::Alloca {
                byte_count,
                alignment,
            },
            Some(dest),
        );
        Ok(())
    }

    fn decode_load(&mut self, values: &[u64], base: u32, bit: u64) -> Result<(), TranslationError> {
        if !check_arity(self.ctx, bit, BLOCK_NAME, "load", values, Arity::Exactly(3))? {
            return Ok(());
        }
        let addr = self.relative_operand(values[0], base, bit)?;
        let alignment = self.extract_alignment("load", values[1], bit)?;
        let ty = self.ctx.simple_type(values[2], bit)?;
        if !self.check_pointer_operand(&addr, "load", bit)? {
            return self.append_error_inst(ty, bit);
        }
        if !self.check_load_store(ty, alignment, "load", bit)? {
            return self.append_error_inst(ty, bit);
        }
        let dest = self.next_inst_var(ty, bit)?;
        self.append(InstKind::Load { addr, ty, alignment }, Some(dest));
        Ok(())
    }

    fn decode_store(&mut self, values: &[u64], base: u32, bit: u64) -> Result<(), TranslationError> {
        if !check_arity(self.ctx, bit, BLOCK_NAME, "store", values, Arity::Exactly(3))? {
            return Ok(());
        }
        let addr = self.relative_operand(values[0], base, bit)?;
        let value = self.relative_operand(values[1], base, bit)?;
        let alignment = self.extract_alignment("store", values[2], bit)?;
        if !self.check_pointer_operand(&addr, "store", bit)? {
            return Ok(());
        }
        let value_ty = self.operand_type(&value);
        if !self.check_load_store(value_ty, alignment, "store", bit)? {
            return Ok(());
        }
        self.append(
            InstKind::Store {
                addr,
                value,
                alignment,
            },
            None,
        );
        Ok(())
    }

    fn check_pointer_operand(
        &mut self,
        op: &Operand,
        inst: &str,
        bit: u64,
    ) -> Result<bool, TranslationError> {
        let ty = self.operand_type(op);
        if ty == Type::pointer() {
            return Ok(true);
        }
        self.ctx.diags.report(
            ErrorKind::TypeCheck,
            bit,
            format!("{} address not {}; found {}", inst, Type::pointer(), ty),
        )?;
        Ok(false)
    }

    fn check_load_store(
        &mut self,
        ty: Type,
        alignment: u64,
        inst: &str,
        bit: u64,
    ) -> Result<bool, TranslationError> {
        if !ty.is_load_store_type() {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!("{} type not allowed: {}*", inst, ty),
            )?;
            return Ok(false);
        }
        if !ty.allows_alignment(alignment) {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!("{} {}*: not allowed for alignment {}", inst, ty, alignment),
            )?;
            return Ok(false);
        }
        Ok(true)
    }

    fn decode_call(
        &mut self,
        values: &[u64],
        base: u32,
        bit: u64,
        indirect: bool,
    ) -> Result<(), TranslationError> {
        let (record_name, params_start): (&str, usize) = if indirect {
            ("call indirect", 3)
        } else {
            ("call", 2)
        };
        if !check_arity(
            self.ctx,
            bit,
            BLOCK_NAME,
            record_name,
            values,
            Arity::AtLeast(params_start),
        )? {
            return Ok(());
        }

        // Direct calls infer the return type from the callee's declared
        // signature; indirect calls carry it in the record.
        let callee_index = self.relative_index(values[1] as i64, base, bit)?;
        let callee = self.get_operand(callee_index, bit)?;
        let mut intrinsic: Option<&'static IntrinsicSig> = None;
        let return_type = if indirect {
            self.ctx.simple_type(values[2], bit)?
        } else {
            let sig = self.ctx.function_signature(callee_index as usize, bit)?;
            let name = self
                .ctx
                .function(callee_index as usize)
                .and_then(|decl| decl.name.clone());
            if let Some(suffix) = name.as_deref().and_then(|n| n.strip_prefix(INTRINSIC_PREFIX)) {
                match intrinsics::find(suffix) {
                    Some(info) => intrinsic = Some(info),
                    None => {
                        self.ctx.diags.report(
                            ErrorKind::TypeCheck,
                            bit,
                            format!("invalid intrinsic call to {}", name.as_deref().unwrap_or("")),
                        )?;
                        return self.append_error_inst(sig.ret, bit);
                    }
                }
            }
            sig.ret
        };

        let cc_info = values[0];
        let is_tail = cc_info & 1 != 0;
        if CallingConv::decode(cc_info >> 1).is_none() {
            self.ctx.diags.report(
                ErrorKind::TypeCheck,
                bit,
                format!(
                    "function call calling convention value {} not understood",
                    cc_info >> 1
                ),
            )?;
            return self.append_error_inst(return_type, bit);
        }

        let mut args = Vec::with_capacity(values.len() - params_start);
        for &raw in &values[params_start..] {
            args.push(self.relative_operand(raw, base, bit)?);
        }

        let dest = if return_type == Type::Void {
            None
        } else {
            Some(self.next_inst_var(return_type, bit)?)
        };

        if let Some(info) = intrinsic {
            let arg_types: Vec<Type> = args.iter().map(|a| self.operand_type(a)).collect();
            match intrinsics::validate_call(info, return_type, &arg_types) {
                CallValidation::Valid => {}
                CallValidation::BadReturnType { expected, found } => {
                    self.ctx.diags.report(
                        ErrorKind::TypeCheck,
                        bit,
                        format!(
                            "intrinsic call expects return type {}; found {}",
                            expected, found
                        ),
                    )?;
                }
                CallValidation::WrongArgCount { expected, found } => {
                    self.ctx.diags.report(
                        ErrorKind::TypeCheck,
                        bit,
                        format!("intrinsic call expects {} arguments; found {}", expected, found),
                    )?;
                }
                CallValidation::WrongArgType {
                    index,
                    expected,
                    found,
                } => {
                    self.ctx.diags.report(
                        ErrorKind::TypeCheck,
                        bit,
                        format!(
                            "intrinsic call argument {} expects type {}; found {}",
                            index, expected, found
                        ),
                    )?;
                }
            }
        }

        self.append(
            InstKind::Call {
                callee,
                args,
                is_tail,
            },
            dest,
        );
        Ok(())
    }

    fn decode_forward_type_ref(&mut self, values: &[u64], bit: u64) -> Result<(), TranslationError> {
        if !check_arity(
            self.ctx,
            bit,
            BLOCK_NAME,
            "forward type ref",
            values,
            Arity::Exactly(2),
        )? {
            return Ok(());
        }
        let ty = self.ctx.simple_type(values[1], bit)?;
        if values[0] > u32::MAX as u64 {
            return self.ctx.diags.report(
                ErrorKind::OperandResolution,
                bit,
                format!("forward reference index {} out of range", values[0]),
            );
        }
        let var = self.create_inst_var(ty, bit)?;
        self.set_operand(values[0] as u32, Operand::Var(var), bit)
    }
}

// ----------------------------------------------------------------------
// Cast legality
// ----------------------------------------------------------------------

/// Strip a common vector shape: both scalars, or both vectors with equal
/// lane counts (reduced to their element types).
fn simplify_common_vector(a: Type, b: Type) -> Option<(Type, Type)> {
    if a.is_vector() != b.is_vector() {
        return None;
    }
    if !a.is_vector() {
        return Some((a, b));
    }
    if a.num_elements() != b.num_elements() {
        return None;
    }
    Some((a.element_type(), b.element_type()))
}

fn int_trunc_valid(src: Type, dst: Type) -> bool {
    if !src.is_integer() || !dst.is_integer() {
        return false;
    }
    match simplify_common_vector(src, dst) {
        Some((s, d)) => s.scalar_int_width() > d.scalar_int_width(),
        None => false,
    }
}

fn float_trunc_valid(src: Type, dst: Type) -> bool {
    matches!(simplify_common_vector(src, dst), Some((Type::F64, Type::F32)))
}

fn float_to_int_valid(src: Type, dst: Type) -> bool {
    if !src.is_float() || !dst.is_integer() {
        return false;
    }
    if src.is_vector() != dst.is_vector() {
        return false;
    }
    !src.is_vector() || src.num_elements() == dst.num_elements()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_trunc_valid() {
        assert!(int_trunc_valid(Type::I64, Type::I32));
        assert!(int_trunc_valid(Type::I32, Type::I1));
        assert!(!int_trunc_valid(Type::I32, Type::I32));
        assert!(!int_trunc_valid(Type::I32, Type::I64));
        assert!(!int_trunc_valid(Type::F32, Type::I16));
        assert!(int_trunc_valid(Type::V4I32, Type::V4I1));
        assert!(!int_trunc_valid(Type::V4I32, Type::V8I1));
    }

    #[test]
    fn test_float_casts() {
        assert!(float_trunc_valid(Type::F64, Type::F32));
        assert!(!float_trunc_valid(Type::F32, Type::F64));
        assert!(float_to_int_valid(Type::F32, Type::I32));
        assert!(float_to_int_valid(Type::V4F32, Type::V4I32));
        assert!(!float_to_int_valid(Type::V4F32, Type::I32));
        assert!(!float_to_int_valid(Type::I32, Type::I32));
    }
}
