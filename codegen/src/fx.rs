//! Fast hash collections keyed by IR entities.

pub use rustc_hash::FxHashMap;
pub use rustc_hash::FxHashSet;
