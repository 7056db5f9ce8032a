//! Constants.
//!
//! Constants are shared through [`ConstantRef`] (`Arc`) because the global
//! constant pool memoizes one relocatable constant per global ID and every
//! use of that ID must observe the same object. Identity is therefore
//! `Arc::ptr_eq`, not structural equality.

use std::fmt;
use std::sync::Arc;

use super::types::Type;

/// Shared handle to a constant.
pub type ConstantRef = Arc<Constant>;

/// A constant operand value.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// A sign-extended integer literal of the given scalar integer type.
    Integer { ty: Type, value: i64 },
    /// A 32-bit float literal.
    Float(f32),
    /// A 64-bit float literal.
    Double(f64),
    /// An undefined value of the given type.
    Undef(Type),
    /// A relocatable reference to a global declaration by name.
    Reloc { name: String, offset: u64 },
}

impl Constant {
    /// The type of this constant. Relocatables have pointer type.
    pub fn ty(&self) -> Type {
        match self {
            Constant::Integer { ty, .. } => *ty,
            Constant::Float(_) => Type::F32,
            Constant::Double(_) => Type::F64,
            Constant::Undef(ty) => *ty,
            Constant::Reloc { .. } => Type::pointer(),
        }
    }

    /// Create a relocatable constant for a global declaration.
    pub fn reloc(name: impl Into<String>) -> ConstantRef {
        Arc::new(Constant::Reloc {
            name: name.into(),
            offset: 0,
        })
    }

    /// The integer value, if this is an integer constant.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Constant::Integer { value, .. } => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Integer { ty, value } => write!(f, "{} {}", ty, value),
            Constant::Float(v) => write!(f, "float {}", v),
            Constant::Double(v) => write!(f, "double {}", v),
            Constant::Undef(ty) => write!(f, "{} undef", ty),
            Constant::Reloc { name, offset } => {
                if *offset == 0 {
                    write!(f, "@{}", name)
                } else {
                    write!(f, "@{}+{}", name, offset)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_types() {
        let int = Constant::Integer {
            ty: Type::I32,
            value: -1,
        };
        assert_eq!(int.ty(), Type::I32);
        assert_eq!(int.as_integer(), Some(-1));
        assert_eq!(Constant::Float(1.5).ty(), Type::F32);
        assert_eq!(Constant::reloc("puts").ty(), Type::pointer());
    }

    #[test]
    fn test_reloc_identity_is_by_handle() {
        let a = Constant::reloc("f");
        let b = Constant::reloc("f");
        assert!(!Arc::ptr_eq(&a, &b));
        let c = Arc::clone(&a);
        assert!(Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Constant::Integer {
                ty: Type::I8,
                value: 7
            }
            .to_string(),
            "i8 7"
        );
        assert_eq!(Constant::reloc("main").to_string(), "@main");
        assert_eq!(Constant::Undef(Type::V4I32).to_string(), "<4 x i32> undef");
    }
}
