//! Transform passes (§4) plus the default optimization pipeline (§6)
//! built on top of them.

pub mod algebraic_simplify;
pub mod const_propagate;
pub mod control_flow;
pub mod dead_code;
pub mod global_localize;
pub mod gvn;
pub mod inline;
pub mod loop_invariant;
pub mod loop_unroll;
pub mod loop_utils;
pub mod mem2reg;
pub mod phi_combine;
pub mod pipeline;
pub mod remove_unreach_bb;
pub mod strength_reduce;
pub mod transform;

pub use algebraic_simplify::AlgebraicSimplify;
pub use const_propagate::ConstPropagate;
pub use control_flow::ControlFlow;
pub use dead_code::DeadCode;
pub use global_localize::GlobalLocalize;
pub use gvn::GVN;
pub use inline::Inline;
pub use loop_invariant::LoopInvariant;
pub use loop_unroll::LoopUnroll;
pub use mem2reg::Mem2Reg;
pub use phi_combine::PhiCombine;
pub use pipeline::{OptLevel, Pipeline, PipelineConfig};
pub use remove_unreach_bb::RemoveUnreachBlocks;
pub use strength_reduce::StrengthReduce;
pub use transform::{run_to_fixpoint, PassError, PassResult, Transform};
