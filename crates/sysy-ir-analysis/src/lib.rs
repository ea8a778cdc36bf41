//! Analyses over a [`sysy_ir_core::Module`]: dominance, natural loops,
//! pure-function detection, and the pass manager that caches their
//! results and invalidates them when `sysy-ir-opt` mutates the module.
//!
//! There is no use-def-chain analysis here the way the original keeps one
//! (`usedef_chain.cc`): `Module`'s value slots maintain their use-lists
//! eagerly on every mutation (see `sysy_ir_core::module::Module::set_operand`),
//! so the eager-recompute-everything pass the original runs before every
//! rewrite has no counterpart to port — querying `Module::uses_of` *is*
//! the use-def chain.

pub mod depth_order;
pub mod dominator;
pub mod func_info;
pub mod loop_find;
pub mod pass;

pub use depth_order::{DepthOrder, DepthOrderResult};
pub use dominator::{Dominator, DominatorResult};
pub use func_info::{FuncInfo, FuncInfoResult};
pub use loop_find::{FuncLoopInfo, LoopFind, LoopFindResult, LoopInfo};
pub use pass::{pass_id, Analysis, AnalysisUsage, KillType, Pass, PassError, PassManager, PassResult};
