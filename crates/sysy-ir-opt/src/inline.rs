//! Call inlining (§4.12), grounded in `transform/inline.cc`. Only direct
//! calls found in `main` are candidates, and only for a single outer
//! sweep — a callee that itself calls another non-external function
//! gets that nested call cloned in unexpanded, left for a later pipeline
//! iteration to pick up (the original's `upper_times` bound, hard-coded
//! to one).
//!
//! Each call site is replaced in two passes: first the callee's blocks
//! and instructions are cloned breadth-first into the caller with an
//! old-to-new value map (`clee2cler`) seeded from the call's arguments,
//! then — once the map is total over every callee value — a second pass
//! rewrites every cloned instruction's operands through it. Splitting in
//! two this way is what makes back edges inside the callee resolve
//! correctly: a loop header cloned before its latch would otherwise bake
//! in a stale reference if operands were remapped as each instruction
//! was cloned.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use sysy_ir_analysis::{AnalysisUsage, DepthOrder, Pass, PassManager};
use sysy_ir_core::instruction::Opcode;
use sysy_ir_core::value::ValueKind;
use sysy_ir_core::{BlockId, FuncId, InstId, Module, ValueId};

use crate::const_propagate::ConstPropagate;
use crate::remove_unreach_bb::RemoveUnreachBlocks;
use crate::transform::{PassResult, Transform};

pub struct Inline;

impl Transform for Inline {
    fn name() -> &'static str {
        "inline"
    }

    fn run(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        let Some(main) = module.main() else { return Ok(false) };
        let mut worklist = collect_calls(module, main);
        let mut changed = false;
        while let Some(call) = worklist.pop_front() {
            inline_one(module, main, call);
            changed = true;
        }
        if changed {
            mgr.kill_all();
        }
        Ok(changed)
    }
}

impl Pass for Inline {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        <Self as Transform>::run(module, mgr)
    }

    fn analysis_usage(au: &mut AnalysisUsage) {
        au.add_require::<DepthOrder>();
        au.add_post::<RemoveUnreachBlocks>();
        au.add_post::<ConstPropagate>();
    }
}

fn callee_of(module: &Module, call: InstId) -> Option<FuncId> {
    let ValueKind::Function(callee) = module.value(module.inst(call).operands[0]).kind else {
        return None;
    };
    Some(callee)
}

fn collect_calls(module: &Module, main: FuncId) -> VecDeque<InstId> {
    let mut calls = VecDeque::new();
    for &bb in module.func(main).blocks() {
        for &inst in module.block(bb).insts() {
            if module.inst(inst).opcode == Opcode::Call {
                if let Some(callee) = callee_of(module, inst) {
                    if !module.func(callee).is_external {
                        calls.push_back(inst);
                    }
                }
            }
        }
    }
    calls
}

fn find_exit_block(module: &Module, f: FuncId) -> Option<BlockId> {
    module.func(f).blocks().iter().copied().find(|&b| {
        module
            .block(b)
            .terminator()
            .is_some_and(|t| module.inst(t).opcode == Opcode::Ret)
    })
}

fn inline_one(module: &mut Module, caller: FuncId, call: InstId) {
    let Some(callee) = callee_of(module, call) else { return };
    if module.func(callee).is_external {
        return;
    }
    let call_operands = module.inst(call).operands.clone();
    let args = module.func(callee).args.clone();

    let mut clee2cler: FxHashMap<ValueId, ValueId> = FxHashMap::default();
    for (i, &arg) in args.iter().enumerate() {
        clee2cler.insert(arg, call_operands[1 + i]);
    }

    let callee_entry = module.func(callee).entry_block().expect("non-external function has an entry block");
    let caller_entry = module.create_block(caller, "inline.entry");
    let mut block_map: FxHashMap<BlockId, BlockId> = FxHashMap::default();
    block_map.insert(callee_entry, caller_entry);
    clee2cler.insert(module.block(callee_entry).value_id, module.block(caller_entry).value_id);

    let mut worklist = VecDeque::from([callee_entry]);
    let mut cloned: Vec<(InstId, InstId)> = Vec::new();
    while let Some(old_bb) = worklist.pop_front() {
        let new_bb = block_map[&old_bb];
        for succ in module.block(old_bb).successors().to_vec() {
            if !block_map.contains_key(&succ) {
                let nb = module.create_block(caller, "inline.bb");
                block_map.insert(succ, nb);
                clee2cler.insert(module.block(succ).value_id, module.block(nb).value_id);
                worklist.push_back(succ);
            }
        }
        for old_inst in module.block(old_bb).insts().to_vec() {
            let new_inst = module.clone_inst(new_bb, old_inst, &clee2cler);
            if let (Some(old_result), Some(new_result)) = (module.inst(old_inst).result, module.inst(new_inst).result) {
                clee2cler.insert(old_result, new_result);
            }
            cloned.push((old_inst, new_inst));
        }
    }

    // `clee2cler` is now total over every callee value (args, blocks,
    // instruction results); rewrite every cloned instruction's operands
    // through it. Constants, globals, and other functions are not keys
    // and pass through untouched.
    for (old_inst, new_inst) in cloned {
        let old_operands = module.inst(old_inst).operands.clone();
        for (idx, &old_op) in old_operands.iter().enumerate() {
            if let Some(&new_op) = clee2cler.get(&old_op) {
                module.set_operand(new_inst, idx, new_op);
            }
        }
    }

    let callee_exit = find_exit_block(module, callee).expect("callee has a canonical exit block");
    let map_exit_bb = block_map[&callee_exit];
    let map_entry_bb = block_map[&callee_entry];

    let exit_ret = module.block(map_exit_bb).terminator().expect("cloned exit block ends in a return");
    let ret_operand = module.inst(exit_ret).operands.first().copied();
    if let Some(call_result) = module.inst(call).result {
        let return_value = ret_operand.expect("callee with a non-void call site returns a value");
        module.replace_all_uses_with(call_result, return_value);
    }
    module.erase_inst(exit_ret);

    // Move every instruction after the call (including the caller's own
    // terminator) into the callee's cloned exit block, which becomes the
    // post-call continuation once its own return is gone.
    let parent_bb = module.inst(call).parent;
    let tail: Vec<InstId> = {
        let insts = module.block(parent_bb).insts();
        let pos = insts.iter().position(|&i| i == call).expect("call is in its own parent block");
        insts[pos + 1..].to_vec()
    };
    for inst in tail {
        module.append_existing_inst(inst, map_exit_bb);
    }
    // `append_existing_inst` only relocates the instruction; it does not
    // re-derive CFG edges the way `set_operand`/`append_inst` do for a
    // terminator. The moved terminator's targets are real once more, but
    // `map_exit_bb`'s own successor bookkeeping still needs to catch up
    // (parent_bb's stale edge is cleaned up below, when its replacement
    // terminator is appended and auto-resynced).
    module.resync_terminator(map_exit_bb);

    // Any phi in a successor of the old parent block that pointed back
    // to it must now point to the continuation block, since that is
    // where the branch instruction physically lives after the move.
    let parent_val = module.block(parent_bb).value_id;
    let map_exit_val = module.block(map_exit_bb).value_id;
    for succ in module.block(map_exit_bb).successors().to_vec() {
        let phis: Vec<InstId> = module
            .block(succ)
            .insts()
            .iter()
            .copied()
            .take_while(|&i| module.inst(i).is_phi())
            .collect();
        for phi in phis {
            let operands = module.inst(phi).operands.clone();
            for (idx, &op) in operands.iter().enumerate() {
                if idx % 2 == 1 && op == parent_val {
                    module.set_operand(phi, idx, map_exit_val);
                }
            }
        }
    }

    module.erase_inst(call);
    let entry_val = module.block(map_entry_bb).value_id;
    module.append_inst(parent_bb, Opcode::Br, smallvec::smallvec![entry_val], None);
}
