//! The value graph (§3.1): every constant, argument, instruction result,
//! basic block, function, and global variable is a value with a type and a
//! use-list.

use smallvec::SmallVec;

use crate::ids::{BlockId, FuncId, GlobalId, InstId, TypeInternId, ValueId};

/// One edge of a use-list: `user`'s operand at `operand_index` refers to
/// the owning value.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Use {
    pub user: InstId,
    pub operand_index: u32,
}

/// What kind of thing a [`ValueId`] denotes. Constants are represented
/// directly rather than as a separate `Constant` value hierarchy: the
/// source's `ConstantInt`/`ConstantArray`/… family (mirrored in the
/// teacher's `crates/llvm-core/src/value.rs::Constant`) collapses here into
/// plain enum payloads, since nothing downstream needs virtual dispatch
/// over "is this a constant" — only pattern matching.
#[derive(Clone, PartialEq, Debug)]
pub enum ValueKind {
    ConstInt { bits: u8, value: i64 },
    ConstI64(i64),
    ConstFloat(f32),
    ConstBool(bool),
    /// Zero-initializer for any type (array, base type).
    ConstZero,
    ConstUndef,
    ConstArray(Vec<ValueId>),
    Argument { func: FuncId, index: u32 },
    Inst(InstId),
    Block(BlockId),
    Function(FuncId),
    Global(GlobalId),
}

impl ValueKind {
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            ValueKind::ConstInt { .. }
                | ValueKind::ConstI64(_)
                | ValueKind::ConstFloat(_)
                | ValueKind::ConstBool(_)
                | ValueKind::ConstZero
                | ValueKind::ConstUndef
                | ValueKind::ConstArray(_)
        )
    }

    pub fn as_const_int(&self) -> Option<i64> {
        match *self {
            ValueKind::ConstInt { value, .. } => Some(value),
            ValueKind::ConstI64(value) => Some(value),
            ValueKind::ConstBool(b) => Some(b as i64),
            ValueKind::ConstZero => Some(0),
            _ => None,
        }
    }

    pub fn as_const_float(&self) -> Option<f32> {
        match *self {
            ValueKind::ConstFloat(f) => Some(f),
            ValueKind::ConstZero => Some(0.0),
            _ => None,
        }
    }
}

/// A value record: type, optional name, and the use-list maintained per
/// the §3.1 invariants. Uses are kept as a `SmallVec` because the common
/// case (a single definition used by one or two instructions) never spills
/// to the heap, matching the shape of most SSA values in practice.
#[derive(Clone, Debug)]
pub struct ValueSlot {
    pub ty: TypeInternId,
    pub name: Option<Box<str>>,
    pub kind: ValueKind,
    pub(crate) uses: SmallVec<[Use; 4]>,
}

impl ValueSlot {
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    pub fn is_unused(&self) -> bool {
        self.uses.is_empty()
    }
}
