//! The transform-pass contract: unlike an [`sysy_ir_analysis::Analysis`],
//! a transform mutates the module and reports whether it changed
//! anything, mirroring `TransformPass`/`IterativePass` in `pass.hh`.

use sysy_ir_analysis::PassManager;
use sysy_ir_core::Module;

pub use sysy_ir_analysis::{PassError, PassResult};

pub trait Transform {
    fn name() -> &'static str;

    /// Runs once. Returns whether the module changed. Callers that need a
    /// fixed point (`IterativePass` in the original) loop this themselves
    /// — see [`run_to_fixpoint`].
    fn run(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool>;
}

/// Runs `T` repeatedly until it reports no further change, mirroring
/// `PassManager::run_iteratively`.
pub fn run_to_fixpoint<T: Transform>(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
    let mut changed_ever = false;
    loop {
        let changed = T::run(module, mgr)?;
        changed_ever |= changed;
        if !changed {
            return Ok(changed_ever);
        }
    }
}
