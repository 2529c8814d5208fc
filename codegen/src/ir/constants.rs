//! The constant pool.
//!
//! Constants are interned per unit: the pool hands out one [`Constant`]
//! reference per distinct `(data, type)` pair, alive for the unit's
//! lifetime. Floats are stored by bit pattern so interning works through
//! NaNs and signed zeros.

use crate::fx::FxHashMap;
use crate::ir::entities::{Constant, GlobalVar, Type};
use sable_entity::PrimaryMap;

/// The payload of an interned constant.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConstantData {
    /// An integer constant; the width comes from the type.
    Int(i64),
    /// A float constant stored as its IEEE-754 bit pattern.
    Float(u64),
    /// The null pointer.
    Null,
    /// An undefined value of the given type.
    Undef,
    /// Raw bytes, used for string data in globals.
    Bytes(Vec<u8>),
    /// A constant aggregate (struct or array initialiser).
    Aggregate(Vec<Constant>),
    /// The address of a global plus a constant byte offset, as produced by
    /// a constant `gep` over a global.
    GlobalAddr {
        /// The referenced global.
        global: GlobalVar,
        /// Byte offset from its start.
        offset: i64,
    },
}

/// One pooled constant: its payload and its type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PooledConstant {
    /// The payload.
    pub data: ConstantData,
    /// The type of the constant.
    pub ty: Type,
}

/// Interning pool for constants.
pub struct ConstantPool {
    pool: PrimaryMap<Constant, PooledConstant>,
    interned: FxHashMap<PooledConstant, Constant>,
}

impl ConstantPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            pool: PrimaryMap::new(),
            interned: FxHashMap::default(),
        }
    }

    /// Intern a constant.
    pub fn intern(&mut self, data: ConstantData, ty: Type) -> Constant {
        let entry = PooledConstant { data, ty };
        if let Some(&c) = self.interned.get(&entry) {
            return c;
        }
        let c = self.pool.push(entry.clone());
        self.interned.insert(entry, c);
        c
    }

    /// Look at a pooled constant.
    pub fn resolve(&self, c: Constant) -> &PooledConstant {
        &self.pool[c]
    }

    /// The integer payload of `c`, if it is an integer constant.
    pub fn int_value(&self, c: Constant) -> Option<i64> {
        match self.pool[c].data {
            ConstantData::Int(v) => Some(v),
            _ => None,
        }
    }

    /// The float payload of `c` as an `f64`, widening f32 payloads.
    pub fn float_value(&self, c: Constant, bits: u8) -> Option<f64> {
        match self.pool[c].data {
            ConstantData::Float(pattern) => Some(if bits == 32 {
                f64::from(f32::from_bits(pattern as u32))
            } else {
                f64::from_bits(pattern)
            }),
            _ => None,
        }
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::TypeStore;

    #[test]
    fn interning_dedups() {
        let mut types = TypeStore::new();
        let mut pool = ConstantPool::new();
        let i32t = types.int(32);
        let a = pool.intern(ConstantData::Int(7), i32t);
        let b = pool.intern(ConstantData::Int(7), i32t);
        let c = pool.intern(ConstantData::Int(8), i32t);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.int_value(a), Some(7));
    }

    #[test]
    fn float_bits_roundtrip() {
        let mut types = TypeStore::new();
        let mut pool = ConstantPool::new();
        let f32t = types.float(32);
        let c = pool.intern(ConstantData::Float(f64::to_bits(0.0) as u64), f32t);
        // Interned via a 32-bit pattern in practice; exercise the accessor.
        let c2 = pool.intern(ConstantData::Float((1.5f32).to_bits() as u64), f32t);
        assert_ne!(c, c2);
        assert_eq!(pool.float_value(c2, 32), Some(1.5));
    }
}
