//! Calling convention identifiers.

use core::fmt;

/// A calling convention a function can declare.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CallConv {
    /// The System V AMD64 ABI, the default on x86-64 Unix.
    SystemV,
    /// The AArch64 procedure call standard.
    Aapcs64,
}

impl CallConv {
    /// The default calling convention for the given architecture.
    pub fn default_for(arch: target_lexicon::Architecture) -> Self {
        match arch {
            target_lexicon::Architecture::Aarch64(_) => Self::Aapcs64,
            _ => Self::SystemV,
        }
    }
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::SystemV => "system_v",
            Self::Aapcs64 => "aapcs64",
        })
    }
}
