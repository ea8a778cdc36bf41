//! Pre-pipeline module verification (§7, AMBIENT), grounded in
//! `boxabirds-llvm-rust`'s `verification.rs`: before a module built by an
//! external AST lowering is handed to the pass manager, check the handful
//! of structural invariants a lowering is expected to uphold but a buggy
//! one could violate — a `main` function exists, every defined function
//! has a body, and every block ends in a terminator.
//!
//! Unlike the teacher's verifier, this stops at the first violation
//! rather than collecting every one into a report: a module that fails
//! this check is never valid input to begin with, so there is no later
//! stage that benefits from an exhaustive error list the way a compiler's
//! diagnostic output does.

use crate::error::{Error, Result};
use crate::instruction::Opcode;
use crate::module::Module;

/// Checks the invariants §7 describes a lowering-produced module as
/// needing before any analysis or transform runs over it.
pub fn verify_module(module: &Module) -> Result<()> {
    if module.main().is_none() {
        return Err(Error::MissingMain);
    }

    for f in module.functions() {
        let data = module.func(f);
        if data.is_external {
            continue;
        }
        if data.blocks().is_empty() {
            return Err(Error::ExternalFunctionHasNoBody(data.name.to_string()));
        }
        for &bb in data.blocks() {
            let block = module.block(bb);
            let terminates = block
                .terminator()
                .map(|inst| module.inst(inst).opcode.is_terminator())
                .unwrap_or(false);
            if !terminates {
                return Err(Error::VerificationFailed(format!(
                    "block `{}` in function `{}` does not end in a terminator",
                    block.name, data.name
                )));
            }
        }
    }

    Ok(())
}
