//! Instructions and operands.
//!
//! ```text
//! Cfg
//! └── Node
//!     └── Vec<Inst>
//!         └── InstKind
//!             ├── Arith { op, lhs, rhs }
//!             ├── Br { dest } / CondBr { cond, .. } / Switch { .. }
//!             ├── Ret { value } / Unreachable
//!             └── ...
//! ```
//!
//! A node accumulates instructions until a terminator is appended; blocks
//! are delimited only by their terminators, never by an explicit record.

use super::cfg::{NodeIndex, VarId};
use super::constant::ConstantRef;
use super::types::Type;

/// A read-only input to an instruction: a local variable or a constant.
#[derive(Debug, Clone)]
pub enum Operand {
    Var(VarId),
    Const(ConstantRef),
}

impl Operand {
    /// Identity comparison: same variable slot, or the same shared
    /// constant object. Structurally equal but distinct constants are not
    /// the same operand.
    pub fn same(&self, other: &Operand) -> bool {
        match (self, other) {
            (Operand::Var(a), Operand::Var(b)) => a == b,
            (Operand::Const(a), Operand::Const(b)) => std::sync::Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_var(&self) -> Option<VarId> {
        match self {
            Operand::Var(id) => Some(*id),
            Operand::Const(_) => None,
        }
    }

    pub fn as_const(&self) -> Option<&ConstantRef> {
        match self {
            Operand::Const(c) => Some(c),
            Operand::Var(_) => None,
        }
    }
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Fadd,
    Sub,
    Fsub,
    Mul,
    Fmul,
    Udiv,
    Sdiv,
    Fdiv,
    Urem,
    Srem,
    Frem,
    Shl,
    Lshr,
    Ashr,
    And,
    Or,
    Xor,
}

impl ArithOp {
    pub fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Fadd => "fadd",
            ArithOp::Sub => "sub",
            ArithOp::Fsub => "fsub",
            ArithOp::Mul => "mul",
            ArithOp::Fmul => "fmul",
            ArithOp::Udiv => "udiv",
            ArithOp::Sdiv => "sdiv",
            ArithOp::Fdiv => "fdiv",
            ArithOp::Urem => "urem",
            ArithOp::Srem => "srem",
            ArithOp::Frem => "frem",
            ArithOp::Shl => "shl",
            ArithOp::Lshr => "lshr",
            ArithOp::Ashr => "ashr",
            ArithOp::And => "and",
            ArithOp::Or => "or",
            ArithOp::Xor => "xor",
        }
    }
}

/// Cast operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    Trunc,
    Zext,
    Sext,
    Fptoui,
    Fptosi,
    Uitofp,
    Sitofp,
    Fptrunc,
    Fpext,
    Bitcast,
}

impl CastOp {
    pub fn name(self) -> &'static str {
        match self {
            CastOp::Trunc => "trunc",
            CastOp::Zext => "zext",
            CastOp::Sext => "sext",
            CastOp::Fptoui => "fptoui",
            CastOp::Fptosi => "fptosi",
            CastOp::Uitofp => "uitofp",
            CastOp::Sitofp => "sitofp",
            CastOp::Fptrunc => "fptrunc",
            CastOp::Fpext => "fpext",
            CastOp::Bitcast => "bitcast",
        }
    }
}

/// Integer compare predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpCond {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

impl IcmpCond {
    /// Decode a wire predicate value.
    pub fn decode(value: u64) -> Option<IcmpCond> {
        match value {
            32 => Some(IcmpCond::Eq),
            33 => Some(IcmpCond::Ne),
            34 => Some(IcmpCond::Ugt),
            35 => Some(IcmpCond::Uge),
            36 => Some(IcmpCond::Ult),
            37 => Some(IcmpCond::Ule),
            38 => Some(IcmpCond::Sgt),
            39 => Some(IcmpCond::Sge),
            40 => Some(IcmpCond::Slt),
            41 => Some(IcmpCond::Sle),
            _ => None,
        }
    }
}

/// Float compare predicates (ordered and unordered forms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcmpCond {
    False,
    Oeq,
    Ogt,
    Oge,
    Olt,
    Ole,
    One,
    Ord,
    Uno,
    Ueq,
    Ugt,
    Uge,
    Ult,
    Ule,
    Une,
    True,
}

impl FcmpCond {
    /// Decode a wire predicate value.
    pub fn decode(value: u64) -> Option<FcmpCond> {
        match value {
            0 => Some(FcmpCond::False),
            1 => Some(FcmpCond::Oeq),
            2 => Some(FcmpCond::Ogt),
            3 => Some(FcmpCond::Oge),
            4 => Some(FcmpCond::Olt),
            5 => Some(FcmpCond::Ole),
            6 => Some(FcmpCond::One),
            7 => Some(FcmpCond::Ord),
            8 => Some(FcmpCond::Uno),
            9 => Some(FcmpCond::Ueq),
            10 => Some(FcmpCond::Ugt),
            11 => Some(FcmpCond::Uge),
            12 => Some(FcmpCond::Ult),
            13 => Some(FcmpCond::Ule),
            14 => Some(FcmpCond::Une),
            15 => Some(FcmpCond::True),
            _ => None,
        }
    }
}

/// An instruction with an optional result variable.
#[derive(Debug, Clone)]
pub struct Inst {
    pub kind: InstKind,
    pub dest: Option<VarId>,
}

impl Inst {
    pub fn new(kind: InstKind, dest: Option<VarId>) -> Self {
        Self { kind, dest }
    }

    pub fn is_terminator(&self) -> bool {
        self.kind.is_terminator()
    }
}

/// The kind of an instruction.
#[derive(Debug, Clone)]
pub enum InstKind {
    /// Plain copy. The decoder emits self-assignments as placeholders for
    /// records that failed type checking, so later relative indices stay
    /// numerically consistent.
    Assign { src: Operand },
    Arith {
        op: ArithOp,
        lhs: Operand,
        rhs: Operand,
    },
    Cast { op: CastOp, src: Operand },
    Icmp {
        cond: IcmpCond,
        lhs: Operand,
        rhs: Operand,
    },
    Fcmp {
        cond: FcmpCond,
        lhs: Operand,
        rhs: Operand,
    },
    Select {
        cond: Operand,
        then_val: Operand,
        else_val: Operand,
    },
    ExtractElement { vec: Operand, index: Operand },
    InsertElement {
        vec: Operand,
        elt: Operand,
        index: Operand,
    },
    /// Stack allocation of `byte_count` bytes; the result is a pointer.
    Alloca {
        byte_count: Operand,
        alignment: u64,
    },
    Load {
        addr: Operand,
        ty: Type,
        alignment: u64,
    },
    Store {
        addr: Operand,
        value: Operand,
        alignment: u64,
    },
    /// The result type is the dest variable's type; every incoming value
    /// must match it.
    Phi { args: Vec<(Operand, NodeIndex)> },
    Call {
        callee: Operand,
        args: Vec<Operand>,
        is_tail: bool,
    },
    Br { dest: NodeIndex },
    CondBr {
        cond: Operand,
        then_dest: NodeIndex,
        else_dest: NodeIndex,
    },
    Switch {
        cond: Operand,
        default_dest: NodeIndex,
        cases: Vec<(i64, NodeIndex)>,
    },
    Ret { value: Option<Operand> },
    Unreachable,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Switch { .. }
                | InstKind::Ret { .. }
                | InstKind::Unreachable
        )
    }

    /// Successor nodes of a terminator. Non-terminators have none.
    pub fn successors(&self) -> Vec<NodeIndex> {
        match self {
            InstKind::Br { dest } => vec![*dest],
            InstKind::CondBr {
                then_dest,
                else_dest,
                ..
            } => vec![*then_dest, *else_dest],
            InstKind::Switch {
                default_dest,
                cases,
                ..
            } => {
                let mut succs = vec![*default_dest];
                succs.extend(cases.iter().map(|(_, dest)| *dest));
                succs
            }
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::constant::Constant;
    use std::sync::Arc;

    #[test]
    fn test_operand_identity() {
        let a = Constant::reloc("f");
        let op1 = Operand::Const(Arc::clone(&a));
        let op2 = Operand::Const(Arc::clone(&a));
        let op3 = Operand::Const(Constant::reloc("f"));
        assert!(op1.same(&op2));
        assert!(!op1.same(&op3));
        assert!(Operand::Var(VarId(3)).same(&Operand::Var(VarId(3))));
        assert!(!Operand::Var(VarId(3)).same(&op1));
    }

    #[test]
    fn test_terminator_classification() {
        assert!(InstKind::Unreachable.is_terminator());
        assert!(InstKind::Ret { value: None }.is_terminator());
        assert!(!InstKind::Assign {
            src: Operand::Var(VarId(0))
        }
        .is_terminator());
    }

    #[test]
    fn test_switch_successors() {
        let kind = InstKind::Switch {
            cond: Operand::Var(VarId(0)),
            default_dest: 1,
            cases: vec![(0, 2), (5, 3)],
        };
        assert_eq!(kind.successors(), vec![1, 2, 3]);
    }

    #[test]
    fn test_predicate_decoding() {
        assert_eq!(IcmpCond::decode(32), Some(IcmpCond::Eq));
        assert_eq!(IcmpCond::decode(41), Some(IcmpCond::Sle));
        assert_eq!(IcmpCond::decode(0), None);
        assert_eq!(FcmpCond::decode(0), Some(FcmpCond::False));
        assert_eq!(FcmpCond::decode(15), Some(FcmpCond::True));
        assert_eq!(FcmpCond::decode(16), None);
    }
}
