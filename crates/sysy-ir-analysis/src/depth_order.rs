//! Reverse post-order numbering over each function's CFG (§4.2 supplement),
//! grounded in `analysis/depth_order.cc`. Every other analysis in this
//! crate that needs a fixed-point iteration order or a post-order index
//! (the dominator computation's `intersect`) depends on this one.

use rustc_hash::{FxHashMap, FxHashSet};

use sysy_ir_core::{BlockId, FuncId, Module};

use crate::pass::{Analysis, PassManager};

#[derive(Default, Clone)]
pub struct DepthOrderResult {
    /// Reverse post-order block list per function — the order the
    /// original's `create_depth_priority_order` produces by reversing a
    /// post-order DFS.
    pub rpo: FxHashMap<FuncId, Vec<BlockId>>,
    /// Post-order index (NOT rpo index) per block, used by the dominator
    /// computation's `intersect` to compare "depth".
    pub post_order_id: FxHashMap<FuncId, FxHashMap<BlockId, u32>>,
}

impl DepthOrderResult {
    pub fn rpo_of(&self, f: FuncId) -> &[BlockId] {
        self.rpo.get(&f).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub struct DepthOrder;

impl Analysis for DepthOrder {
    type Result = DepthOrderResult;

    fn run(module: &Module, _mgr: &mut PassManager) -> Self::Result {
        let mut result = DepthOrderResult::default();
        for f in module.functions() {
            if module.func(f).is_external {
                continue;
            }
            let Some(entry) = module.func(f).entry_block() else {
                continue;
            };
            let mut visited = FxHashSet::default();
            let mut post_order = Vec::new();
            post_order_visit(module, entry, &mut visited, &mut post_order);

            let mut ids = FxHashMap::default();
            for (i, &bb) in post_order.iter().enumerate() {
                ids.insert(bb, i as u32);
            }
            let mut rpo = post_order;
            rpo.reverse();

            result.rpo.insert(f, rpo);
            result.post_order_id.insert(f, ids);
        }
        result
    }
}

impl crate::pass::Pass for DepthOrder {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> crate::pass::PassResult<bool> {
        mgr.get::<DepthOrder>(module);
        Ok(false)
    }

    fn analysis_usage(au: &mut crate::pass::AnalysisUsage) {
        au.set_kill_type(crate::pass::KillType::None);
    }

    fn always_invalid() -> bool {
        false
    }

    fn is_analysis() -> bool {
        true
    }
}

fn post_order_visit(module: &Module, bb: BlockId, visited: &mut FxHashSet<BlockId>, out: &mut Vec<BlockId>) {
    visited.insert(bb);
    for &succ in module.block(bb).successors() {
        if !visited.contains(&succ) {
            post_order_visit(module, succ, visited, out);
        }
    }
    out.push(bb);
}
