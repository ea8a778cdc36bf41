//! Unreachable-block removal (§4.17), grounded in
//! `transform/remove_unreach_bb.cc`. A single linear pass, not a fixed
//! point: it is scheduled as a post-pass after transforms that can create
//! newly-unreachable blocks, and the pipeline's outer iteration re-triggers
//! it as needed.

use sysy_ir_analysis::{Pass, PassManager};
use sysy_ir_core::{BlockId, FuncId, Module};

use crate::transform::{PassResult, Transform};

pub struct RemoveUnreachBlocks;

impl Transform for RemoveUnreachBlocks {
    fn name() -> &'static str {
        "remove_unreach_bb"
    }

    fn run(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        let mut changed = false;
        let funcs: Vec<FuncId> = module.functions().collect();
        for f in funcs {
            if module.func(f).is_external {
                continue;
            }
            // The entry block is reachable by definition and is skipped.
            let blocks: Vec<BlockId> = module.func(f).blocks().to_vec();
            for &bb in blocks.iter().skip(1) {
                if module.func(f).blocks().contains(&bb) && module.block(bb).predecessors().is_empty() {
                    module.remove_block(f, bb);
                    changed = true;
                }
            }
        }
        if changed {
            mgr.kill_all();
        }
        Ok(changed)
    }
}

impl Pass for RemoveUnreachBlocks {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        <Self as Transform>::run(module, mgr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;
    use sysy_ir_core::instruction::Opcode;

    #[test]
    fn removes_block_with_no_predecessors() {
        let mut m = Module::new();
        let i32_ty = m.types.i32();
        let f = m.declare_function("f", i32_ty, vec![], false).unwrap();
        let entry = m.create_block(f, "entry");
        let zero = m.const_int(32, 0);
        m.append_inst(entry, Opcode::Ret, smallvec![zero], None);
        let dead = m.create_block(f, "dead");
        m.append_inst(dead, Opcode::Ret, smallvec![zero], None);

        assert_eq!(m.func(f).blocks().len(), 2);
        let mut mgr = PassManager::new();
        let changed = RemoveUnreachBlocks::run(&mut m, &mut mgr).unwrap();
        assert!(changed);
        assert_eq!(m.func(f).blocks(), &[entry]);
    }
}
