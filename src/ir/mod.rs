//! The typed intermediate representation.
//!
//! This is the output side of the translator: a module-wide namespace of
//! function and variable declarations, and one [`cfg::Cfg`] per defined
//! function, handed to the lowering collaborator.

pub mod cfg;
pub mod constant;
pub mod globals;
pub mod instr;
pub mod types;

pub use cfg::{Cfg, Node, NodeIndex, VarId, Variable};
pub use constant::{Constant, ConstantRef};
pub use globals::{CallingConv, FunctionDecl, Initializer, Linkage, VariableDecl};
pub use instr::{ArithOp, CastOp, FcmpCond, IcmpCond, Inst, InstKind, Operand};
pub use types::{FuncSig, Type};
