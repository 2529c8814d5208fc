//! Interned type constructors.
//!
//! All types live in the `TypeStore` owned by the unit's [`Context`]; two
//! structurally equal types always intern to the same [`Type`] reference.
//!
//! [`Context`]: crate::ir::Context

use crate::fx::FxHashMap;
use crate::ir::entities::Type;
use sable_entity::PrimaryMap;

/// The structure of an interned type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeData {
    /// The empty type, used as the return type of functions returning
    /// nothing.
    Void,
    /// An integer type with the given bit width (1, 8, 16, 32 or 64).
    Int(u8),
    /// An IEEE-754 binary float with the given bit width (32 or 64).
    Float(u8),
    /// A pointer. The pointee is retained even though loads carry their own
    /// result type; `gep` walks it.
    Ptr(Type),
    /// A fixed-size array.
    Array {
        /// Element type.
        elem: Type,
        /// Number of elements.
        count: u32,
    },
    /// An unpacked struct; size is the naive sum of field sizes.
    Struct(Vec<Type>),
    /// A function signature.
    Func {
        /// Return type, possibly `Void`.
        ret: Type,
        /// Declared parameter types.
        params: Vec<Type>,
        /// Whether extra arguments may follow the declared parameters.
        var_arg: bool,
    },
}

/// Interning table for types.
pub struct TypeStore {
    data: PrimaryMap<Type, TypeData>,
    interned: FxHashMap<TypeData, Type>,
}

impl TypeStore {
    /// Create a new store with the primitive types pre-interned.
    pub fn new() -> Self {
        let mut store = Self {
            data: PrimaryMap::new(),
            interned: FxHashMap::default(),
        };
        // Keep `Void` at index 0 so `Type::default`-ish uses are harmless.
        store.intern(TypeData::Void);
        store
    }

    /// Intern `data`, returning the canonical reference.
    pub fn intern(&mut self, data: TypeData) -> Type {
        if let Some(&ty) = self.interned.get(&data) {
            return ty;
        }
        let ty = self.data.push(data.clone());
        self.interned.insert(data, ty);
        ty
    }

    /// The void type.
    pub fn void(&mut self) -> Type {
        self.intern(TypeData::Void)
    }

    /// The void type without mutable access; it is pre-interned at
    /// index 0 by `new`.
    pub fn lookup_void(&self) -> Type {
        Type::from_u32(0)
    }

    /// An integer type of `bits` width.
    pub fn int(&mut self, bits: u8) -> Type {
        debug_assert!(matches!(bits, 1 | 8 | 16 | 32 | 64));
        self.intern(TypeData::Int(bits))
    }

    /// A float type of `bits` width.
    pub fn float(&mut self, bits: u8) -> Type {
        debug_assert!(matches!(bits, 32 | 64));
        self.intern(TypeData::Float(bits))
    }

    /// A pointer to `pointee`.
    pub fn ptr(&mut self, pointee: Type) -> Type {
        self.intern(TypeData::Ptr(pointee))
    }

    /// An array of `count` elements of type `elem`.
    pub fn array(&mut self, elem: Type, count: u32) -> Type {
        self.intern(TypeData::Array { elem, count })
    }

    /// A struct with the given field types.
    pub fn struct_(&mut self, fields: Vec<Type>) -> Type {
        self.intern(TypeData::Struct(fields))
    }

    /// A function type.
    pub fn func(&mut self, ret: Type, params: Vec<Type>, var_arg: bool) -> Type {
        self.intern(TypeData::Func {
            ret,
            params,
            var_arg,
        })
    }

    /// Look at the structure of `ty`.
    pub fn resolve(&self, ty: Type) -> &TypeData {
        &self.data[ty]
    }

    /// Is `ty` an integer type?
    pub fn is_int(&self, ty: Type) -> bool {
        matches!(self.resolve(ty), TypeData::Int(_))
    }

    /// Is `ty` a float type?
    pub fn is_float(&self, ty: Type) -> bool {
        matches!(self.resolve(ty), TypeData::Float(_))
    }

    /// Is `ty` a pointer type?
    pub fn is_ptr(&self, ty: Type) -> bool {
        matches!(self.resolve(ty), TypeData::Ptr(_))
    }

    /// Is `ty` void?
    pub fn is_void(&self, ty: Type) -> bool {
        matches!(self.resolve(ty), TypeData::Void)
    }

    /// Is `ty` a struct type?
    pub fn is_struct(&self, ty: Type) -> bool {
        matches!(self.resolve(ty), TypeData::Struct(_))
    }

    /// Is `ty` an aggregate (struct or array)?
    pub fn is_aggregate(&self, ty: Type) -> bool {
        matches!(
            self.resolve(ty),
            TypeData::Struct(_) | TypeData::Array { .. }
        )
    }

    /// Bit width of an integer or float type.
    pub fn bits(&self, ty: Type) -> Option<u8> {
        match self.resolve(ty) {
            TypeData::Int(b) | TypeData::Float(b) => Some(*b),
            _ => None,
        }
    }

    /// Look up the pointer-to-`pointee` type without interning it.
    pub fn lookup_ptr(&self, pointee: Type) -> Option<Type> {
        self.interned.get(&TypeData::Ptr(pointee)).copied()
    }

    /// Pointee of a pointer type.
    pub fn pointee(&self, ty: Type) -> Option<Type> {
        match self.resolve(ty) {
            TypeData::Ptr(p) => Some(*p),
            _ => None,
        }
    }

    /// Struct field types, if `ty` is a struct.
    pub fn struct_fields(&self, ty: Type) -> Option<&[Type]> {
        match self.resolve(ty) {
            TypeData::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Return type of a function type.
    pub fn func_ret(&self, ty: Type) -> Option<Type> {
        match self.resolve(ty) {
            TypeData::Func { ret, .. } => Some(*ret),
            _ => None,
        }
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Target-independent size and alignment queries.
///
/// Both x86-64 and AArch64 share the layout rules the backend cares about:
/// 8-byte pointers, natural scalar alignment, 8-byte aggregate alignment,
/// and struct size as the naive sum of field sizes.
#[derive(Clone, Copy, Debug, Default)]
pub struct DataLayout;

impl DataLayout {
    /// Size of a pointer in bytes.
    pub fn pointer_size(&self) -> u32 {
        8
    }

    /// Size of `ty` in bytes.
    pub fn size(&self, types: &TypeStore, ty: Type) -> u32 {
        match types.resolve(ty) {
            TypeData::Void => 0,
            TypeData::Int(b) | TypeData::Float(b) => u32::from(*b).div_ceil(8).max(1),
            TypeData::Ptr(_) | TypeData::Func { .. } => self.pointer_size(),
            TypeData::Struct(fields) => fields.iter().map(|&f| self.size(types, f)).sum(),
            TypeData::Array { elem, count } => self.size(types, *elem) * count,
        }
    }

    /// Alignment of `ty` in bytes.
    pub fn alignment(&self, types: &TypeStore, ty: Type) -> u32 {
        match types.resolve(ty) {
            TypeData::Void => 0,
            TypeData::Int(b) | TypeData::Float(b) => u32::from(*b).div_ceil(8).max(1),
            TypeData::Ptr(_) | TypeData::Func { .. } => self.pointer_size(),
            TypeData::Struct(_) | TypeData::Array { .. } => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_canonical() {
        let mut types = TypeStore::new();
        let i32a = types.int(32);
        let i32b = types.int(32);
        assert_eq!(i32a, i32b);
        let p1 = types.ptr(i32a);
        let p2 = types.ptr(i32b);
        assert_eq!(p1, p2);
        assert_ne!(p1, i32a);
        assert_eq!(types.pointee(p1), Some(i32a));
    }

    #[test]
    fn layout_sizes() {
        let mut types = TypeStore::new();
        let dl = DataLayout;
        let i64t = types.int(64);
        let i8t = types.int(8);
        let st = types.struct_(vec![i64t, i8t]);
        let arr = types.array(i64t, 4);
        assert_eq!(dl.size(&types, i64t), 8);
        assert_eq!(dl.size(&types, st), 9);
        assert_eq!(dl.alignment(&types, st), 8);
        assert_eq!(dl.size(&types, arr), 32);
        let i1 = types.int(1);
        assert_eq!(dl.size(&types, i1), 1);
    }
}
