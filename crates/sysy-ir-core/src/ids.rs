//! Typed arena indices.
//!
//! Per the design notes on pointer graphs with cycles, every cross-reference
//! in this crate — operands, use-list edges, CFG predecessor/successor
//! links, dominator-tree parent/child links computed downstream in
//! `sysy-ir-analysis` — is one of these small `Copy` indices rather than a
//! smart pointer. The arena that owns the corresponding data lives on
//! [`crate::module::Module`] or [`crate::function::Function`].

use std::fmt;

macro_rules! def_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub(crate) fn from_index(i: usize) -> Self {
                $name(i as u32)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

def_id!(ValueId, "Identifies any value: constant, argument, instruction result, block, function, or global.");
def_id!(InstId, "Identifies an instruction's operand/opcode record within its function.");
def_id!(BlockId, "Identifies a basic block within its function.");
def_id!(FuncId, "Identifies a function within its module.");
def_id!(GlobalId, "Identifies a global variable within its module.");
def_id!(TypeInternId, "Identifies an interned type within its module.");
