//! The default optimization pipeline (§6), grounded in `main.cc`'s driver:
//! the same fixed pass order, registered into a [`PassManager`] with
//! `add_pass` the way `main.cc` builds its pass list, then driven through
//! `PassManager::run`/`run_iteratively` instead of a hand-rolled loop.
//!
//! `optimize=true` runs two phases, each iterated to a fixed point over
//! its *whole* sequence (not pass-by-pass) before moving on; `optimize=
//! false` runs a single pass each of mem2reg and dead-code elimination.
//! Analyses are cleared between phases with [`PassManager::reset`],
//! mirroring the original's `pm.reset()`.
//!
//! A driver can also bypass both built-in sequences entirely and supply
//! its own ordered pass list (§6's "an ordered pass list" external
//! interface) via [`PipelineConfig::custom_order`] — each entry is a
//! [`pass_id`] naming a pass this crate or `sysy-ir-analysis` already
//! knows how to run.

use std::any::TypeId;

use sysy_ir_analysis::{pass_id, DepthOrder, Dominator, FuncInfo, LoopFind, PassManager};
use sysy_ir_core::Module;

use crate::transform::{PassResult, Transform};
use crate::{
    AlgebraicSimplify, ConstPropagate, ControlFlow, DeadCode, GVN, GlobalLocalize, Inline, LoopInvariant, LoopUnroll, Mem2Reg,
    RemoveUnreachBlocks, StrengthReduce,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    #[default]
    O0,
    O1,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub opt_level: OptLevel,
    /// A driver-supplied ordered pass list that, when present, replaces
    /// the built-in phase sequences entirely and is run once through
    /// `PassManager::run(order, post = true)`.
    pub custom_order: Option<Vec<TypeId>>,
}

impl PipelineConfig {
    pub fn from_optimize(optimize: bool) -> Self {
        Self {
            opt_level: if optimize { OptLevel::O1 } else { OptLevel::O0 },
            custom_order: None,
        }
    }

    pub fn with_custom_order(order: Vec<TypeId>) -> Self {
        Self {
            opt_level: OptLevel::O1,
            custom_order: Some(order),
        }
    }
}

pub struct Pipeline;

fn register_all(mgr: &mut PassManager) {
    // Analyses that a transform's `analysis_usage` declares as required
    // must be registered too — `run_single_pass` looks up a required id
    // in the same registry a scheduled pass lives in.
    mgr.add_pass::<Dominator>();
    mgr.add_pass::<FuncInfo>();
    mgr.add_pass::<DepthOrder>();
    mgr.add_pass::<LoopFind>();

    mgr.add_pass::<GlobalLocalize>();
    mgr.add_pass::<Mem2Reg>();
    mgr.add_pass::<StrengthReduce>();
    mgr.add_pass::<GVN>();
    mgr.add_pass::<Inline>();
    mgr.add_pass::<RemoveUnreachBlocks>();
    mgr.add_pass::<AlgebraicSimplify>();
    mgr.add_pass::<LoopInvariant>();
    mgr.add_pass::<LoopUnroll>();
    mgr.add_pass::<ControlFlow>();
    mgr.add_pass::<ConstPropagate>();
    mgr.add_pass::<DeadCode>();
}

// `remove_unreach_bb` is interposed directly after `inline` and
// `control_flow`, the two passes named in §4.17 as the ones that can
// strand blocks — it is not itself one of the named phase passes, the
// same way the original registers it without giving it a slot in either
// explicit `pm.run` list.
fn phase_1() -> Vec<TypeId> {
    vec![
        pass_id::<GlobalLocalize>(),
        pass_id::<Mem2Reg>(),
        pass_id::<StrengthReduce>(),
        pass_id::<GVN>(),
        pass_id::<Inline>(),
        pass_id::<RemoveUnreachBlocks>(),
        pass_id::<AlgebraicSimplify>(),
        pass_id::<LoopInvariant>(),
        pass_id::<LoopUnroll>(),
        pass_id::<ControlFlow>(),
        pass_id::<RemoveUnreachBlocks>(),
    ]
}

fn phase_2() -> Vec<TypeId> {
    vec![
        pass_id::<AlgebraicSimplify>(),
        pass_id::<LoopInvariant>(),
        pass_id::<LoopUnroll>(),
        pass_id::<AlgebraicSimplify>(),
        pass_id::<ControlFlow>(),
        pass_id::<RemoveUnreachBlocks>(),
        pass_id::<DeadCode>(),
    ]
}

fn unoptimized() -> Vec<TypeId> {
    vec![pass_id::<Mem2Reg>(), pass_id::<DeadCode>()]
}

impl Pipeline {
    /// Runs the configured pipeline to completion, returning whether the
    /// module changed at all. Every run also sweeps unreachable blocks
    /// first — `control_flow` and `inline` can both strand blocks that
    /// `Dominator` then refuses to reason about.
    pub fn run(module: &mut Module, config: &PipelineConfig) -> PassResult<bool> {
        sysy_ir_core::verify_module(module)?;

        let mut mgr = PassManager::new();
        register_all(&mut mgr);
        RemoveUnreachBlocks::run(module, &mut mgr)?;

        if let Some(order) = &config.custom_order {
            return mgr.run(module, order, true);
        }

        let changed = match config.opt_level {
            OptLevel::O0 => mgr.run(module, &unoptimized(), true)?,
            OptLevel::O1 => {
                let phase1 = mgr.run_iteratively(module, &phase_1())?;
                mgr.reset();
                let phase2 = mgr.run_iteratively(module, &phase_2())?;
                phase1 || phase2
            }
        };
        Ok(changed)
    }
}
