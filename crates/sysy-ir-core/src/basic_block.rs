//! Basic blocks (§3.5): an ordered instruction list plus CFG neighbor
//! lists kept in sync with the terminator.

use smallvec::SmallVec;

use crate::ids::{BlockId, FuncId, InstId, ValueId};

#[derive(Clone, Debug)]
pub struct BasicBlockData {
    pub name: Box<str>,
    pub func: FuncId,
    pub value_id: ValueId,
    pub(crate) insts: Vec<InstId>,
    pub(crate) preds: SmallVec<[BlockId; 4]>,
    pub(crate) succs: SmallVec<[BlockId; 2]>,
}

impl BasicBlockData {
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    pub fn predecessors(&self) -> &[BlockId] {
        &self.preds
    }

    pub fn successors(&self) -> &[BlockId] {
        &self.succs
    }

    pub fn terminator(&self) -> Option<InstId> {
        self.insts.last().copied()
    }

    pub fn is_empty_of_instructions(&self) -> bool {
        self.insts.is_empty()
    }
}
