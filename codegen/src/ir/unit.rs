//! A compilation unit: functions, globals, and the interning context.

use crate::ir::constants::{ConstantData, ConstantPool};
use crate::ir::entities::{Constant, FuncId, GlobalVar, Type};
use crate::ir::function::Function;
use crate::ir::types::TypeStore;
use crate::isa::CallConv;
use sable_entity::PrimaryMap;

/// The interning context: type constructors and the constant pool.
///
/// Everything interned here lives for the lifetime of the unit; IR nodes
/// reference it by entity id only.
pub struct Context {
    /// Interned types.
    pub types: TypeStore,
    /// Interned constants.
    pub constants: ConstantPool,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            types: TypeStore::new(),
            constants: ConstantPool::new(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Linkage of a global or function symbol.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Linkage {
    /// Defined in this unit.
    Local,
    /// Defined in this unit and visible outside it.
    Export,
    /// Declared here, defined elsewhere.
    Import,
}

/// A global variable.
pub struct GlobalVarData {
    /// Symbol name.
    pub name: String,
    /// The pointee type of the global.
    pub ty: Type,
    /// Initialiser for definitions; `None` for imports.
    pub init: Option<Constant>,
    /// Linkage of the symbol.
    pub linkage: Linkage,
}

/// A compilation unit owning functions, globals and the interning context.
pub struct Unit {
    /// Unit name, used for diagnostics only.
    pub name: String,
    /// Types and constants.
    pub ctx: Context,
    /// All functions, declarations included.
    pub functions: PrimaryMap<FuncId, Function>,
    /// All global variables.
    pub globals: PrimaryMap<GlobalVar, GlobalVarData>,
    string_counter: u32,
}

impl Unit {
    /// Create an empty unit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ctx: Context::new(),
            functions: PrimaryMap::new(),
            globals: PrimaryMap::new(),
            string_counter: 0,
        }
    }

    /// Add a function with the given name and signature type, returning its
    /// id. The function starts out as a declaration; building a body makes
    /// it a definition.
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        sig: Type,
        call_conv: CallConv,
    ) -> FuncId {
        let func = Function::with_signature(name, sig, &self.ctx.types, call_conv);
        self.functions.push(func)
    }

    /// Add a global variable.
    pub fn add_global(
        &mut self,
        name: impl Into<String>,
        ty: Type,
        init: Option<Constant>,
        linkage: Linkage,
    ) -> GlobalVar {
        self.globals.push(GlobalVarData {
            name: name.into(),
            ty,
            init,
            linkage,
        })
    }

    /// Create an anonymous global holding a NUL-terminated string.
    pub fn add_global_string(&mut self, value: &str) -> GlobalVar {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        let i8t = self.ctx.types.int(8);
        let ty = self.ctx.types.array(i8t, bytes.len() as u32);
        let init = self.ctx.constants.intern(ConstantData::Bytes(bytes), ty);
        let name = format!(".str{}", self.string_counter);
        self.string_counter += 1;
        self.add_global(name, ty, Some(init), Linkage::Local)
    }

    /// Borrow one function and the interning context at the same time.
    /// Passes that build IR need both.
    pub fn parts_mut(&mut self, func: FuncId) -> (&mut Function, &mut Context) {
        (&mut self.functions[func], &mut self.ctx)
    }

    /// Find a function by name.
    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| id)
    }

    /// Total number of IR instructions across all function bodies. The
    /// inliner budgets against this.
    pub fn instruction_count(&self) -> usize {
        self.functions
            .values()
            .map(|f| f.instruction_count())
            .sum()
    }

    /// Pairs of `(id, name)` for all defined functions, in id order.
    pub fn defined_functions(&self) -> Vec<FuncId> {
        self.functions
            .iter()
            .filter(|(_, f)| f.has_body())
            .map(|(id, _)| id)
            .collect()
    }
}
