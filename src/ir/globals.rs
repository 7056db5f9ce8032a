//! Global declarations: functions, variables, initializers.
//!
//! Functions and global variables share a single flat ID space: all
//! function declarations (in file order) followed by all variable
//! declarations (in file order). The split point is tracked by the
//! translation context, not here.

use std::fmt;

use super::types::FuncSig;

/// Calling conventions the wire format can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConv {
    C,
}

impl CallingConv {
    /// Decode a wire value. Only the C convention exists in the sandboxed
    /// format; anything else is a record-level error at the call site.
    pub fn decode(value: u64) -> Option<CallingConv> {
        match value {
            0 => Some(CallingConv::C),
            _ => None,
        }
    }
}

/// Linkage of a global declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    External,
    Internal,
}

impl Linkage {
    pub fn decode(value: u64) -> Option<Linkage> {
        match value {
            0 => Some(Linkage::External),
            3 => Some(Linkage::Internal),
            _ => None,
        }
    }
}

/// A function declaration in the module namespace.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    /// The type ID the signature was resolved from.
    pub sig_id: u64,
    pub sig: FuncSig,
    pub calling_conv: CallingConv,
    pub linkage: Linkage,
    /// True for declarations without a body; only non-proto functions
    /// consume a function block later in the stream.
    pub is_proto: bool,
    pub name: Option<String>,
}

impl FunctionDecl {
    pub fn name_or_unset(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

/// One initializer of a global variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initializer {
    /// `size` zero bytes.
    Zerofill(u64),
    /// Literal bytes.
    Data(Vec<u8>),
    /// The address of another global, plus a byte offset.
    Reloc { global_id: u64, offset: u64 },
}

impl Initializer {
    /// Number of bytes this initializer contributes to the variable.
    pub fn byte_size(&self) -> u64 {
        match self {
            Initializer::Zerofill(size) => *size,
            Initializer::Data(bytes) => bytes.len() as u64,
            // A relocation is a pointer-sized slot.
            Initializer::Reloc { .. } => 4,
        }
    }
}

impl fmt::Display for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Initializer::Zerofill(size) => write!(f, "zerofill {}", size),
            Initializer::Data(bytes) => write!(f, "data [{} bytes]", bytes.len()),
            Initializer::Reloc { global_id, offset } => {
                write!(f, "reloc @{}+{}", global_id, offset)
            }
        }
    }
}

/// A global variable declaration.
#[derive(Debug, Clone, Default)]
pub struct VariableDecl {
    /// Byte alignment (already decoded from the stored exponent).
    pub alignment: u64,
    pub constant: bool,
    pub initializers: Vec<Initializer>,
    pub name: Option<String>,
}

impl VariableDecl {
    /// Total initialized size in bytes.
    pub fn byte_size(&self) -> u64 {
        self.initializers.iter().map(Initializer::byte_size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calling_conv_decode() {
        assert_eq!(CallingConv::decode(0), Some(CallingConv::C));
        assert_eq!(CallingConv::decode(1), None);
    }

    #[test]
    fn test_linkage_decode() {
        assert_eq!(Linkage::decode(0), Some(Linkage::External));
        assert_eq!(Linkage::decode(3), Some(Linkage::Internal));
        assert_eq!(Linkage::decode(2), None);
    }

    #[test]
    fn test_initializer_sizes() {
        assert_eq!(Initializer::Zerofill(16).byte_size(), 16);
        assert_eq!(Initializer::Data(vec![1, 2, 3]).byte_size(), 3);
        assert_eq!(
            Initializer::Reloc {
                global_id: 0,
                offset: 0
            }
            .byte_size(),
            4
        );

        let var = VariableDecl {
            initializers: vec![
                Initializer::Data(vec![0; 8]),
                Initializer::Zerofill(8),
            ],
            ..Default::default()
        };
        assert_eq!(var.byte_size(), 16);
    }
}
