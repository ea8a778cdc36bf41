//! Functions (§3.4): an ordered argument list and an ordered basic-block
//! list. The first block is the entry.

use crate::ids::{BlockId, TypeInternId, ValueId};

#[derive(Clone, Debug)]
pub struct FunctionData {
    pub name: Box<str>,
    pub value_id: ValueId,
    pub ret_ty: TypeInternId,
    pub param_tys: Vec<TypeInternId>,
    pub args: Vec<ValueId>,
    pub(crate) blocks: Vec<BlockId>,
    pub is_external: bool,
}

impl FunctionData {
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }

    pub fn is_main(&self) -> bool {
        &*self.name == "main"
    }
}
