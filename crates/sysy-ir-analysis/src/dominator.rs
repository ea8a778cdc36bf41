//! Dominator tree and dominance frontier (§4.2), grounded in
//! `analysis/dominator.cc` — the Cooper-Harvey-Kennedy iterative
//! algorithm over reverse post-order with a post-order-index `intersect`.

use rustc_hash::{FxHashMap, FxHashSet};

use sysy_ir_core::{BlockId, FuncId, Module};

use crate::depth_order::{DepthOrder, DepthOrderResult};
use crate::pass::{Analysis, PassManager};

#[derive(Default, Clone)]
pub struct DominatorResult {
    pub idom: FxHashMap<BlockId, BlockId>,
    pub dom_frontier: FxHashMap<BlockId, FxHashSet<BlockId>>,
    pub dom_tree_children: FxHashMap<BlockId, FxHashSet<BlockId>>,
}

impl DominatorResult {
    /// Strict dominance (a block does not dominate itself), matching the
    /// original `Dominator::ResultType::is_dom`'s BFS, which starts from
    /// `domer`'s dominator-tree *children* rather than `domer` itself.
    pub fn strictly_dominates(&self, domer: BlockId, domee: BlockId) -> bool {
        let mut stack: Vec<BlockId> = self
            .dom_tree_children
            .get(&domer)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default();
        while let Some(bb) = stack.pop() {
            if bb == domee {
                return true;
            }
            if let Some(children) = self.dom_tree_children.get(&bb) {
                stack.extend(children.iter().copied());
            }
        }
        false
    }

    /// Reflexive dominance: `dominates(b, b)` is true, unlike
    /// `strictly_dominates`.
    pub fn dominates(&self, domer: BlockId, domee: BlockId) -> bool {
        domer == domee || self.strictly_dominates(domer, domee)
    }
}

pub struct Dominator;

impl Analysis for Dominator {
    type Result = DominatorResult;

    fn run(module: &Module, mgr: &mut PassManager) -> Self::Result {
        let depth: DepthOrderResult = mgr.get::<DepthOrder>(module).clone();
        let mut result = DominatorResult::default();
        let mut idom: FxHashMap<BlockId, BlockId> = FxHashMap::default();

        for f in module.functions() {
            if module.func(f).is_external {
                continue;
            }
            run_for_function(module, f, &depth, &mut idom, &mut result);
        }
        result.idom = idom;
        result
    }
}

impl crate::pass::Pass for Dominator {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> crate::pass::PassResult<bool> {
        mgr.get::<Dominator>(module);
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

    // `dominator.hh`'s `get_analysis_usage` also declares
    // `AU.add_require<RmUnreachBB>()` — `RemoveUnreachBlocks` is a
    // transform living in the downstream `sysy-ir-opt` crate, which this
    // crate cannot depend on without a cycle (`sysy-ir-opt` itself
    // depends on `sysy-ir-analysis`). `Pipeline::run` sweeps unreachable
    // blocks up front before any analysis runs, achieving the same
    // ordering guarantee at the driver level instead; see DESIGN.md.
}

fn run_for_function(
    module: &Module,
    f: FuncId,
    depth: &DepthOrderResult,
    idom: &mut FxHashMap<BlockId, BlockId>,
    result: &mut DominatorResult,
) {
    let rpo = depth.rpo_of(f);
    let Some(&root) = rpo.first() else { return };
    let post_id = &depth.post_order_id[&f];

    idom.insert(root, root);
    let mut changed = true;
    while changed {
        changed = false;
        for &bb in rpo {
            if bb == root {
                continue;
            }
            let preds = module.block(bb).predecessors();
            let mut new_idom: Option<BlockId> = None;
            for &p in preds {
                if idom.contains_key(&p) {
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(cur, p, idom, post_id),
                    });
                }
            }
            let new_idom = new_idom.expect("a reachable non-root block always has an already-processed predecessor");
            if idom.get(&bb) != Some(&new_idom) {
                idom.insert(bb, new_idom);
                changed = true;
            }
        }
    }

    for &bb in rpo {
        let preds = module.block(bb).predecessors();
        if preds.len() >= 2 {
            for &p in preds {
                let mut runner = p;
                while Some(runner) != idom.get(&bb).copied() {
                    result.dom_frontier.entry(runner).or_default().insert(bb);
                    runner = idom[&runner];
                }
            }
        }
    }

    for &bb in rpo {
        let id = idom[&bb];
        if id != bb {
            result.dom_tree_children.entry(id).or_default().insert(bb);
        }
    }
}

fn intersect(mut b1: BlockId, mut b2: BlockId, idom: &FxHashMap<BlockId, BlockId>, post_id: &FxHashMap<BlockId, u32>) -> BlockId {
    while b1 != b2 {
        while post_id[&b1] < post_id[&b2] {
            b1 = idom[&b1];
        }
        while post_id[&b2] < post_id[&b1] {
            b2 = idom[&b2];
        }
    }
    b1
}
