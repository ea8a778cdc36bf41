//! Natural-loop discovery (§4.3), grounded in `analysis/loop_find.cc`:
//! a back edge `latch -> header` exists exactly when `header` dominates
//! `latch`; the loop body is everything reachable backward from the
//! latch without crossing the header.

use rustc_hash::{FxHashMap, FxHashSet};

use sysy_ir_core::{BlockId, FuncId, Module};

use crate::dominator::{Dominator, DominatorResult};
use crate::pass::{Analysis, PassManager};

#[derive(Clone, Debug)]
pub struct LoopInfo {
    pub header: BlockId,
    pub latches: Vec<BlockId>,
    pub bbs: FxHashSet<BlockId>,
}

#[derive(Default, Clone)]
pub struct FuncLoopInfo {
    /// Keyed by loop header.
    pub loops: FxHashMap<BlockId, LoopInfo>,
}

impl FuncLoopInfo {
    /// Outer-loops-first order. A loop nested inside another has a body
    /// that is a strict subset of its parent's, so sorting by descending
    /// body size is sufficient — there is no need to build an explicit
    /// loop-nest tree to get a valid topological order out of it.
    pub fn topo_order(&self) -> Vec<BlockId> {
        let mut headers: Vec<BlockId> = self.loops.keys().copied().collect();
        headers.sort_by_key(|h| (std::cmp::Reverse(self.loops[h].bbs.len()), h.index()));
        headers
    }

    /// The innermost loop (if any) that contains `bb`, i.e. the loop
    /// whose body contains `bb` and is smallest among those that do.
    pub fn innermost_containing(&self, bb: BlockId) -> Option<&LoopInfo> {
        self.loops
            .values()
            .filter(|l| l.bbs.contains(&bb))
            .min_by_key(|l| l.bbs.len())
    }
}

#[derive(Default, Clone)]
pub struct LoopFindResult {
    pub per_func: FxHashMap<FuncId, FuncLoopInfo>,
}

pub struct LoopFind;

impl Analysis for LoopFind {
    type Result = LoopFindResult;

    fn run(module: &Module, mgr: &mut PassManager) -> Self::Result {
        let dom: DominatorResult = mgr.get::<Dominator>(module).clone();
        let mut result = LoopFindResult::default();

        for f in module.functions() {
            if module.func(f).is_external {
                continue;
            }
            let mut loops: FxHashMap<BlockId, LoopInfo> = FxHashMap::default();
            for &bb in module.func(f).blocks() {
                for &pred in module.block(bb).predecessors() {
                    if dom.dominates(bb, pred) {
                        let entry = loops.entry(bb).or_insert_with(|| LoopInfo {
                            header: bb,
                            latches: Vec::new(),
                            bbs: FxHashSet::default(),
                        });
                        entry.latches.push(pred);
                        let found = find_bbs_by_latch(module, bb, pred);
                        entry.bbs.extend(found);
                    }
                }
            }
            result.per_func.insert(f, FuncLoopInfo { loops });
        }
        result
    }
}

impl crate::pass::Pass for LoopFind {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> crate::pass::PassResult<bool> {
        mgr.get::<LoopFind>(module);
        Ok(false)
    }

    fn analysis_usage(au: &mut crate::pass::AnalysisUsage) {
        au.set_kill_type(crate::pass::KillType::None);
        au.add_require::<Dominator>();
    }

    fn always_invalid() -> bool {
        false
    }

    fn is_analysis() -> bool {
        true
    }
}

fn find_bbs_by_latch(module: &Module, header: BlockId, latch: BlockId) -> FxHashSet<BlockId> {
    let mut ret = FxHashSet::default();
    ret.insert(header);
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(latch);
    while let Some(bb) = queue.pop_front() {
        if !ret.insert(bb) {
            continue;
        }
        for &pred in module.block(bb).predecessors() {
            if !ret.contains(&pred) {
                queue.push_back(pred);
            }
        }
    }
    ret
}
