//! The closed instruction opcode catalog (§3.6).

use smallvec::SmallVec;

use crate::ids::{BlockId, TypeInternId, ValueId};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ICmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ICmpOp {
    pub fn negate(self) -> ICmpOp {
        match self {
            ICmpOp::Eq => ICmpOp::Ne,
            ICmpOp::Ne => ICmpOp::Eq,
            ICmpOp::Lt => ICmpOp::Ge,
            ICmpOp::Le => ICmpOp::Gt,
            ICmpOp::Gt => ICmpOp::Le,
            ICmpOp::Ge => ICmpOp::Lt,
        }
    }

    /// Swaps operand order: `a OP b` <=> `b OP.mirror() a`.
    pub fn mirror(self) -> ICmpOp {
        match self {
            ICmpOp::Eq => ICmpOp::Eq,
            ICmpOp::Ne => ICmpOp::Ne,
            ICmpOp::Lt => ICmpOp::Gt,
            ICmpOp::Le => ICmpOp::Ge,
            ICmpOp::Gt => ICmpOp::Lt,
            ICmpOp::Ge => ICmpOp::Le,
        }
    }

    pub fn eval(self, lhs: i64, rhs: i64) -> bool {
        match self {
            ICmpOp::Eq => lhs == rhs,
            ICmpOp::Ne => lhs != rhs,
            ICmpOp::Lt => lhs < rhs,
            ICmpOp::Le => lhs <= rhs,
            ICmpOp::Gt => lhs > rhs,
            ICmpOp::Ge => lhs >= rhs,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FCmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FCmpOp {
    pub fn eval(self, lhs: f32, rhs: f32) -> bool {
        match self {
            FCmpOp::Eq => lhs == rhs,
            FCmpOp::Ne => lhs != rhs,
            FCmpOp::Lt => lhs < rhs,
            FCmpOp::Le => lhs <= rhs,
            FCmpOp::Gt => lhs > rhs,
            FCmpOp::Ge => lhs >= rhs,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum IBinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

impl IBinOp {
    pub fn is_commutative(self) -> bool {
        matches!(self, IBinOp::Add | IBinOp::Mul | IBinOp::And | IBinOp::Or | IBinOp::Xor)
    }

    pub fn eval(self, lhs: i64, rhs: i64) -> Option<i64> {
        Some(match self {
            IBinOp::Add => lhs.wrapping_add(rhs),
            IBinOp::Sub => lhs.wrapping_sub(rhs),
            IBinOp::Mul => lhs.wrapping_mul(rhs),
            IBinOp::SDiv => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_div(rhs)
            }
            IBinOp::SRem => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_rem(rhs)
            }
            IBinOp::And => lhs & rhs,
            IBinOp::Or => lhs | rhs,
            IBinOp::Xor => lhs ^ rhs,
            IBinOp::Shl => lhs.wrapping_shl(rhs as u32),
            IBinOp::LShr => ((lhs as u64) >> (rhs as u32)) as i64,
            IBinOp::AShr => lhs.wrapping_shr(rhs as u32),
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FBinOp {
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl FBinOp {
    pub fn is_commutative(self) -> bool {
        matches!(self, FBinOp::FAdd | FBinOp::FMul)
    }

    pub fn eval(self, lhs: f32, rhs: f32) -> f32 {
        match self {
            FBinOp::FAdd => lhs + rhs,
            FBinOp::FSub => lhs - rhs,
            FBinOp::FMul => lhs * rhs,
            FBinOp::FDiv => lhs / rhs,
        }
    }
}

/// Opcode discriminant. Operands are stored uniformly on
/// [`InstructionData`] as a flat `Vec<ValueId>`; opcode-specific payload
/// (comparison kind, allocated type) lives on the variant itself, matching
/// §9's note to specialize by matching on a tag rather than by virtual
/// dispatch over a class hierarchy.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
    Ret,
    /// Unconditional: one operand, the target block. Conditional: three
    /// operands, `[cond, true_block, false_block]`.
    Br,
    IBin(IBinOp),
    FBin(FBinOp),
    ICmp(ICmpOp),
    FCmp(FCmpOp),
    Alloca(TypeInternId),
    Load,
    Store,
    GetElementPtr,
    Zext,
    Sext,
    Trunc,
    SIToFP,
    FPToSI,
    PtrToInt,
    IntToPtr,
    Call,
    Phi,
}

impl Opcode {
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Ret | Opcode::Br)
    }

    pub fn has_side_effects(self) -> bool {
        matches!(self, Opcode::Store | Opcode::Call | Opcode::Ret | Opcode::Br)
    }

    pub fn is_memory_op(self) -> bool {
        matches!(
            self,
            Opcode::Alloca(_) | Opcode::Load | Opcode::Store | Opcode::GetElementPtr
        )
    }
}

/// An instruction record: opcode, ordered operands, optional result value,
/// and the block that owns it. `operands` doubles as the `User::operands`
/// contract from the original `ir::User` base class (§3.1 supplement) —
/// there is only ever one kind of `User` in this IR, so the capability is
/// folded directly into the instruction record rather than kept as a
/// separate trait object.
#[derive(Clone, Debug)]
pub struct InstructionData {
    pub opcode: Opcode,
    pub operands: SmallVec<[ValueId; 2]>,
    pub result: Option<ValueId>,
    pub parent: BlockId,
}

impl InstructionData {
    pub fn is_phi(&self) -> bool {
        matches!(self.opcode, Opcode::Phi)
    }

    /// `phi`'s operands are stored as `[val0, block0, val1, block1, ...]`.
    pub fn phi_pairs(&self) -> impl Iterator<Item = (ValueId, ValueId)> + '_ {
        debug_assert!(self.is_phi());
        self.operands.chunks(2).map(|c| (c[0], c[1]))
    }
}
