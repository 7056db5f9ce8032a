//! Shared translation context.
//!
//! One [`Context`] is owned by the orchestrator and borrowed mutably by
//! every block decoder; there is no ambient global state. It holds the
//! three module-wide namespaces that later blocks consume:
//!
//! - the type table, keyed by dense type ID,
//! - the flat global value space (functions first, then variables),
//! - the memoized relocatable-constant pool keyed by global ID,
//!
//! plus the diagnostics engine and flags everything funnels through.

use std::sync::Arc;

use crate::config::Flags;
use crate::diagnostics::{DiagnosticsEngine, ErrorKind, TranslationError};
use crate::ir::constant::{Constant, ConstantRef};
use crate::ir::globals::{FunctionDecl, VariableDecl};
use crate::ir::types::{FuncSig, Type};

/// A slot in the type table. Slots start undefined and may be defined
/// exactly once, as either a simple type or a function signature.
#[derive(Debug, Clone, Default)]
pub enum ExtendedType {
    #[default]
    Undefined,
    Simple(Type),
    Signature(FuncSig),
}

impl ExtendedType {
    fn kind_name(&self) -> &'static str {
        match self {
            ExtendedType::Undefined => "undefined",
            ExtendedType::Simple(_) => "simple",
            ExtendedType::Signature(_) => "signature",
        }
    }
}

/// Module-wide decode state shared by all block decoders.
pub struct Context {
    pub flags: Flags,
    pub diags: DiagnosticsEngine,
    types: Vec<ExtendedType>,
    functions: Vec<FunctionDecl>,
    variables: Vec<VariableDecl>,
    /// Ordinals (into `functions`) of declarations that have a body, in
    /// file order. Function blocks self-identify by position in this list.
    defining_functions: Vec<usize>,
    /// Number of function blocks decoded so far.
    num_function_blocks: usize,
    /// Relocatable constants, lazily created and memoized per global ID.
    global_constants: Vec<Option<ConstantRef>>,
    names_installed: bool,
}

impl Context {
    pub fn new(flags: Flags) -> Self {
        let diags = DiagnosticsEngine::new(flags.allow_error_recovery);
        Self {
            flags,
            diags,
            types: Vec::new(),
            functions: Vec::new(),
            variables: Vec::new(),
            defining_functions: Vec::new(),
            num_function_blocks: 0,
            global_constants: Vec::new(),
            names_installed: false,
        }
    }

    // ------------------------------------------------------------------
    // Type table
    // ------------------------------------------------------------------

    /// Resize the type table to the declared entry count.
    pub fn set_type_count(&mut self, count: usize) {
        self.types.resize_with(count, ExtendedType::default);
    }

    pub fn num_types(&self) -> usize {
        self.types.len()
    }

    fn define_type(
        &mut self,
        id: u64,
        value: ExtendedType,
        bit: u64,
    ) -> Result<(), TranslationError> {
        let index = id as usize;
        if index >= self.types.len() {
            self.types.resize_with(index + 1, ExtendedType::default);
        }
        if !matches!(self.types[index], ExtendedType::Undefined) {
            return self.diags.report(
                ErrorKind::NameConflict,
                bit,
                format!(
                    "type id {} defined twice; already {}",
                    id,
                    self.types[index].kind_name()
                ),
            );
        }
        self.types[index] = value;
        Ok(())
    }

    /// Define type `id` as a simple type. Redefinition is an error; the
    /// first definition wins.
    pub fn define_simple_type(
        &mut self,
        id: u64,
        ty: Type,
        bit: u64,
    ) -> Result<(), TranslationError> {
        self.define_type(id, ExtendedType::Simple(ty), bit)
    }

    /// Define type `id` as a function signature.
    pub fn define_signature(
        &mut self,
        id: u64,
        sig: FuncSig,
        bit: u64,
    ) -> Result<(), TranslationError> {
        self.define_type(id, ExtendedType::Signature(sig), bit)
    }

    fn report_bad_type_id(
        &mut self,
        id: u64,
        wanted: &str,
        bit: u64,
    ) -> Result<(), TranslationError> {
        let message = match self.types.get(id as usize) {
            None | Some(ExtendedType::Undefined) => {
                format!("no {} type defined for type id {}", wanted, id)
            }
            Some(found) => format!(
                "type id {} is not a {} type; found {}",
                id,
                wanted,
                found.kind_name()
            ),
        };
        self.diags.report(ErrorKind::TypeResolution, bit, message)
    }

    /// Resolve type `id` as a simple type. Undefined or wrong-kind slots
    /// report one diagnostic and fall back to `void`.
    pub fn simple_type(&mut self, id: u64, bit: u64) -> Result<Type, TranslationError> {
        match self.types.get(id as usize) {
            Some(ExtendedType::Simple(ty)) => Ok(*ty),
            _ => {
                self.report_bad_type_id(id, "simple", bit)?;
                Ok(Type::Void)
            }
        }
    }

    /// Resolve type `id` as a function signature, falling back to the
    /// empty `void ()` signature on failure.
    pub fn signature(&mut self, id: u64, bit: u64) -> Result<FuncSig, TranslationError> {
        match self.types.get(id as usize) {
            Some(ExtendedType::Signature(sig)) => Ok(sig.clone()),
            _ => {
                self.report_bad_type_id(id, "signature", bit)?;
                Ok(FuncSig::undefined())
            }
        }
    }

    // ------------------------------------------------------------------
    // Global value space
    // ------------------------------------------------------------------

    /// Append a function declaration, assigning it the next global ID.
    /// Non-proto declarations are also queued for the function blocks that
    /// follow in the stream.
    pub fn declare_function(&mut self, decl: FunctionDecl) {
        if !decl.is_proto {
            self.defining_functions.push(self.functions.len());
        }
        self.functions.push(decl);
    }

    /// Number of function IDs; the boundary of the flat global ID space.
    pub fn num_function_ids(&self) -> usize {
        self.functions.len()
    }

    /// Total number of global IDs (functions then variables).
    pub fn num_global_ids(&self) -> usize {
        self.functions.len() + self.variables.len()
    }

    /// Preallocate `count` empty global variable declarations.
    pub fn create_global_variables(&mut self, count: usize) {
        self.variables
            .resize_with(self.variables.len() + count, VariableDecl::default);
    }

    pub fn num_global_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn functions(&self) -> &[FunctionDecl] {
        &self.functions
    }

    pub fn variables(&self) -> &[VariableDecl] {
        &self.variables
    }

    pub(crate) fn variables_mut(&mut self) -> &mut [VariableDecl] {
        &mut self.variables
    }

    /// Signature of function declaration `id`, with the undefined
    /// signature as the out-of-range fallback.
    pub fn function_signature(&mut self, id: usize, bit: u64) -> Result<FuncSig, TranslationError> {
        if let Some(decl) = self.functions.get(id) {
            return Ok(decl.sig.clone());
        }
        self.diags.report(
            ErrorKind::OperandResolution,
            bit,
            format!(
                "function index {} out of range; must be less than {}",
                id,
                self.functions.len()
            ),
        )?;
        Ok(FuncSig::undefined())
    }

    pub fn function(&self, id: usize) -> Option<&FunctionDecl> {
        self.functions.get(id)
    }

    /// The global ID for the next function block in the stream. Running
    /// out of defining declarations means the stream carries more function
    /// blocks than the module declared, which is unrecoverable.
    pub fn next_function_block_ordinal(&mut self, bit: u64) -> Result<usize, TranslationError> {
        if self.num_function_blocks >= self.defining_functions.len() {
            return Err(self.diags.fatal(
                ErrorKind::Structural,
                bit,
                "more function blocks than defined function declarations",
            ));
        }
        let ordinal = self.defining_functions[self.num_function_blocks];
        self.num_function_blocks += 1;
        Ok(ordinal)
    }

    /// Name of the global declaration with the given flat ID.
    pub fn global_name(&self, id: usize) -> Option<&str> {
        if id < self.functions.len() {
            self.functions[id].name.as_deref()
        } else {
            self.variables
                .get(id - self.functions.len())
                .and_then(|v| v.name.as_deref())
        }
    }

    /// Assign an explicit name to the global declaration with the given
    /// flat ID. Renaming an already-named declaration is a conflict.
    pub fn set_global_name(
        &mut self,
        id: u64,
        name: String,
        bit: u64,
    ) -> Result<(), TranslationError> {
        let index = id as usize;
        if index >= self.num_global_ids() {
            return self.diags.report(
                ErrorKind::OperandResolution,
                bit,
                format!(
                    "global index {} out of range; must be less than {}",
                    id,
                    self.num_global_ids()
                ),
            );
        }
        if let Some(old) = self.global_name(index) {
            let old = old.to_string();
            return self.diags.report(
                ErrorKind::NameConflict,
                bit,
                format!(
                    "global {} already named '{}'; cannot rename to '{}'",
                    id, old, name
                ),
            );
        }
        if index < self.functions.len() {
            self.functions[index].name = Some(name);
        } else {
            let offset = index - self.functions.len();
            self.variables[offset].name = Some(name);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Global constant pool
    // ------------------------------------------------------------------

    /// The relocatable constant for global `id`, created on first use and
    /// memoized so every reference observes the same object. An ID with no
    /// corresponding declaration yields a diagnostic and a placeholder
    /// symbol, keeping decoding robust against out-of-range indices.
    pub fn global_constant(&mut self, id: u64, bit: u64) -> Result<ConstantRef, TranslationError> {
        let index = id as usize;
        if index >= self.global_constants.len() {
            let expected = self.num_global_ids().max(index + 1);
            self.global_constants.resize(expected, None);
        }
        if let Some(existing) = &self.global_constants[index] {
            return Ok(Arc::clone(existing));
        }

        let known = self.global_name(index).map(str::to_string);
        let name = match known {
            Some(name) => name,
            None if index < self.num_global_ids() => String::new(),
            None => {
                self.diags.report(
                    ErrorKind::OperandResolution,
                    bit,
                    format!("reference to global not defined: {}", id),
                )?;
                "??".to_string()
            }
        };
        let constant = Constant::reloc(name);
        self.global_constants[index] = Some(Arc::clone(&constant));
        Ok(constant)
    }

    // ------------------------------------------------------------------
    // Name installation
    // ------------------------------------------------------------------

    /// Generate deterministic names for unnamed declarations. Name
    /// counters are scoped per kind, so regenerated names are stable for a
    /// given input. Only the first call does work; later calls are no-ops
    /// and return false.
    pub fn install_names(&mut self) -> bool {
        if self.names_installed {
            return false;
        }
        self.names_installed = true;
        if !self.flags.function_prefix.is_empty() {
            let prefix = self.flags.function_prefix.clone();
            let mut index = 0u32;
            for decl in &mut self.functions {
                if decl.name.is_none() {
                    decl.name = Some(format!("{}{}", prefix, index));
                    index += 1;
                }
            }
        }
        if !self.flags.global_prefix.is_empty() {
            let prefix = self.flags.global_prefix.clone();
            let mut index = 0u32;
            for decl in &mut self.variables {
                if decl.name.is_none() {
                    decl.name = Some(format!("{}{}", prefix, index));
                    index += 1;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::globals::{CallingConv, Linkage};

    fn permissive_context() -> Context {
        Context::new(Flags::permissive())
    }

    fn function_decl(is_proto: bool) -> FunctionDecl {
        FunctionDecl {
            sig_id: 0,
            sig: FuncSig::new(Type::I32, vec![]),
            calling_conv: CallingConv::C,
            linkage: Linkage::Internal,
            is_proto,
            name: None,
        }
    }

    #[test]
    fn test_type_defined_exactly_once() {
        let mut ctx = permissive_context();
        ctx.set_type_count(2);
        ctx.define_simple_type(0, Type::I32, 0).unwrap();
        assert_eq!(ctx.simple_type(0, 0).unwrap(), Type::I32);

        ctx.define_simple_type(0, Type::F32, 0).unwrap();
        assert_eq!(ctx.diags.error_count(), 1);
        // First definition survives.
        assert_eq!(ctx.simple_type(0, 0).unwrap(), Type::I32);
    }

    #[test]
    fn test_undefined_type_reports_and_falls_back() {
        let mut ctx = permissive_context();
        ctx.set_type_count(1);
        assert_eq!(ctx.simple_type(0, 0).unwrap(), Type::Void);
        assert_eq!(ctx.diags.error_count(), 1);
        assert_eq!(ctx.signature(7, 0).unwrap(), FuncSig::undefined());
        assert_eq!(ctx.diags.error_count(), 2);
    }

    #[test]
    fn test_wrong_kind_resolution() {
        let mut ctx = permissive_context();
        ctx.define_signature(0, FuncSig::new(Type::Void, vec![]), 0)
            .unwrap();
        assert_eq!(ctx.simple_type(0, 0).unwrap(), Type::Void);
        assert_eq!(ctx.diags.error_count(), 1);
    }

    #[test]
    fn test_defining_function_list() {
        let mut ctx = permissive_context();
        ctx.declare_function(function_decl(true));
        ctx.declare_function(function_decl(false));
        ctx.declare_function(function_decl(false));
        assert_eq!(ctx.num_function_ids(), 3);
        assert_eq!(ctx.next_function_block_ordinal(0).unwrap(), 1);
        assert_eq!(ctx.next_function_block_ordinal(0).unwrap(), 2);
        assert!(ctx.next_function_block_ordinal(0).is_err());
    }

    #[test]
    fn test_global_constant_memoized() {
        let mut ctx = permissive_context();
        let mut decl = function_decl(true);
        decl.name = Some("puts".to_string());
        ctx.declare_function(decl);

        let a = ctx.global_constant(0, 0).unwrap();
        let b = ctx.global_constant(0, 0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.to_string(), "@puts");
    }

    #[test]
    fn test_global_constant_out_of_range_placeholder() {
        let mut ctx = permissive_context();
        let c = ctx.global_constant(9, 0).unwrap();
        assert_eq!(ctx.diags.error_count(), 1);
        assert_eq!(c.to_string(), "@??");
        // Still memoized: one diagnostic, one object.
        let again = ctx.global_constant(9, 0).unwrap();
        assert!(Arc::ptr_eq(&c, &again));
        assert_eq!(ctx.diags.error_count(), 1);
    }

    #[test]
    fn test_install_names_idempotent() {
        let mut ctx = permissive_context();
        ctx.declare_function(function_decl(false));
        ctx.declare_function(function_decl(true));
        ctx.create_global_variables(2);
        ctx.set_global_name(2, "table".to_string(), 0).unwrap();

        assert!(ctx.install_names());
        let first: Vec<_> = (0..4).map(|i| ctx.global_name(i).map(str::to_string)).collect();
        assert_eq!(first[0].as_deref(), Some("Function0"));
        assert_eq!(first[1].as_deref(), Some("Function1"));
        assert_eq!(first[2].as_deref(), Some("table"));
        assert_eq!(first[3].as_deref(), Some("Global0"));

        // Second call is a no-op.
        assert!(!ctx.install_names());
        let second: Vec<_> = (0..4).map(|i| ctx.global_name(i).map(str::to_string)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_set_global_name_conflict() {
        let mut ctx = permissive_context();
        ctx.create_global_variables(1);
        ctx.set_global_name(0, "a".to_string(), 0).unwrap();
        ctx.set_global_name(0, "b".to_string(), 0).unwrap();
        assert_eq!(ctx.diags.error_count(), 1);
        assert_eq!(ctx.global_name(0), Some("a"));
    }
}
