//! Loop unrolling (§4.11), grounded in `transform/loop_unroll.cc`. Only
//! *simple loops* qualify: exactly one body block besides the header,
//! exactly one exit edge leaving the header, and a header-resident
//! integer induction variable with a constant initial value, a constant
//! `add` step and a compare-against-constant exit test. When the
//! iteration count is statically known and below [`UNROLL_MAX`], the
//! whole loop is replaced by one straight-line clone of (header, body)
//! per iteration plus a final header clone that evaluates the exiting
//! comparison for the values seen after the loop.
//!
//! Needs the same guaranteed preheader as
//! [`crate::loop_invariant::LoopInvariant`]; see [`crate::loop_utils`].

use rustc_hash::FxHashMap;
use smallvec::smallvec;

use sysy_ir_analysis::{AnalysisUsage, LoopFind, LoopFindResult, LoopInfo, Pass, PassManager};
use sysy_ir_core::instruction::{IBinOp, ICmpOp, Opcode};
use sysy_ir_core::value::ValueKind;
use sysy_ir_core::{BlockId, FuncId, InstId, Module, ValueId};

use crate::dead_code::DeadCode;
use crate::loop_invariant::LoopInvariant;
use crate::loop_utils::ensure_preheader;
use crate::transform::{PassResult, Transform};

/// Loops whose statically-known trip count exceeds this are left alone.
const UNROLL_MAX: i64 = 1000;

pub struct LoopUnroll;

impl Transform for LoopUnroll {
    fn name() -> &'static str {
        "loop_unroll"
    }

    fn run(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        let loop_find: LoopFindResult = mgr.get::<LoopFind>(module).clone();
        let mut changed = false;
        let funcs: Vec<FuncId> = module.functions().collect();
        for f in funcs {
            if module.func(f).is_external {
                continue;
            }
            let Some(func_loops) = loop_find.per_func.get(&f) else { continue };
            // Innermost-first: an outer loop that contains an unrollable
            // inner one only simplifies to a single block after the inner
            // one is gone, so process short bodies first.
            let mut headers = func_loops.topo_order();
            headers.reverse();
            for header in headers {
                let loop_info = func_loops.loops[&header].clone();
                if let Some(simple) = parse_simple_loop(module, f, &loop_info) {
                    if should_unroll(&simple) {
                        unroll_simple_loop(module, f, &simple);
                        changed = true;
                    }
                }
            }
        }
        // Unlike the distillation's pass this reports whether it actually
        // unrolled anything rather than unconditionally `false` — this
        // port's pass manager uses the return value to decide whether to
        // invalidate analyses and re-run the pipeline to a fixed point.
        if changed {
            mgr.kill_all();
        }
        Ok(changed)
    }
}

impl Pass for LoopUnroll {
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool> {
        <Self as Transform>::run(module, mgr)
    }

    fn analysis_usage(au: &mut AnalysisUsage) {
        au.add_require::<LoopFind>();
        au.add_require::<LoopInvariant>();
        au.add_post::<DeadCode>();
    }
}

struct SimpleLoop {
    header: BlockId,
    body: BlockId,
    exit: BlockId,
    preheader: BlockId,
    /// The induction variable's value, expressed as `ind OP bound`, that
    /// keeps the loop going (i.e. `!cond` exits).
    keep_going: ICmpOp,
    initial: i64,
    step: i64,
    bound: i64,
}

fn find_unique_exit(module: &Module, loop_info: &LoopInfo) -> Option<(BlockId, BlockId)> {
    let mut exits: Vec<(BlockId, BlockId)> = Vec::new();
    for &bb in &loop_info.bbs {
        for &succ in module.block(bb).successors() {
            if !loop_info.bbs.contains(&succ) {
                exits.push((bb, succ));
            }
        }
    }
    if exits.len() == 1 {
        Some(exits[0])
    } else {
        None
    }
}

fn parse_simple_loop(module: &mut Module, f: FuncId, loop_info: &LoopInfo) -> Option<SimpleLoop> {
    if loop_info.bbs.len() > 2 {
        return None;
    }
    let header = loop_info.header;
    let body = loop_info.bbs.iter().copied().find(|&b| b != header)?;

    let (exiting, exit) = find_unique_exit(module, loop_info)?;
    if exiting != header {
        return None;
    }

    let preheader = ensure_preheader(module, f, loop_info);

    let term = module.block(header).terminator()?;
    let term_operands = module.inst(term).operands.clone();
    if term_operands.len() != 3 {
        // Not a conditional branch - no exit test to unroll against.
        return None;
    }
    let cond = term_operands[0];
    let ValueKind::Inst(icmp_inst) = module.value(cond).kind else { return None };
    let Opcode::ICmp(icmp_op) = module.inst(icmp_inst).opcode else { return None };
    let icmp_operands = module.inst(icmp_inst).operands.clone();
    let (lhs, rhs) = (icmp_operands[0], icmp_operands[1]);
    let lhs_const = module.value(lhs).kind.as_const_int();
    let rhs_const = module.value(rhs).kind.as_const_int();

    let (ind_candidate, bound, op_ind_vs_bound) = match (lhs_const, rhs_const) {
        (None, Some(c)) => (lhs, c, icmp_op),
        (Some(c), None) => (rhs, c, icmp_op.mirror()),
        _ => return None,
    };

    let exits_on_true = term_operands[1] == module.block(exit).value_id;
    let keep_going = if exits_on_true { op_ind_vs_bound.negate() } else { op_ind_vs_bound };

    // The induction variable must be exactly the header's own phi, not
    // merely something derived from it.
    let phis: Vec<InstId> = module
        .block(header)
        .insts()
        .iter()
        .copied()
        .take_while(|&i| module.inst(i).is_phi())
        .collect();
    let ind_var = *phis.iter().find(|&&p| module.inst(p).result == Some(ind_candidate))?;

    let pairs: Vec<(ValueId, ValueId)> = module.inst(ind_var).phi_pairs().collect();
    let mut initial: Option<i64> = None;
    let mut step: Option<i64> = None;
    for (val, block_val) in pairs {
        let ValueKind::Block(src) = module.value(block_val).kind else {
            unreachable!("phi's second operand is always a block value")
        };
        if loop_info.bbs.contains(&src) {
            let ValueKind::Inst(def) = module.value(val).kind else { return None };
            let Opcode::IBin(IBinOp::Add) = module.inst(def).opcode else { return None };
            let add_operands = module.inst(def).operands.clone();
            let ind_val = module.inst(ind_var).result.unwrap();
            let other = if add_operands[0] == ind_val {
                add_operands[1]
            } else if add_operands[1] == ind_val {
                add_operands[0]
            } else {
                return None;
            };
            step = module.value(other).kind.as_const_int();
        } else {
            initial = module.value(val).kind.as_const_int();
        }
    }
    let (initial, step) = (initial?, step?);

    Some(SimpleLoop { header, body, exit, preheader, keep_going, initial, step, bound })
}

fn should_unroll(simple: &SimpleLoop) -> bool {
    if simple.step == 0 {
        return false;
    }
    let mut i = simple.initial;
    let mut count = 0i64;
    while simple.keep_going.eval(i, simple.bound) {
        count += 1;
        if count > UNROLL_MAX {
            return false;
        }
        i += simple.step;
    }
    true
}

fn unroll_simple_loop(module: &mut Module, f: FuncId, simple: &SimpleLoop) {
    let header_phis: Vec<InstId> = module
        .block(simple.header)
        .insts()
        .iter()
        .copied()
        .take_while(|&i| module.inst(i).is_phi())
        .collect();

    let mut old2new: FxHashMap<ValueId, ValueId> = FxHashMap::default();
    // For every body-sourced value that feeds a header phi, remember
    // which phi it ultimately updates so the clone that produces it can
    // re-point that phi's mapping at the freshest iteration's value.
    let mut phi2dst: FxHashMap<ValueId, ValueId> = FxHashMap::default();

    for &phi in &header_phis {
        let phi_val = module.inst(phi).result.unwrap();
        for (val, block_val) in module.inst(phi).phi_pairs().collect::<Vec<_>>() {
            let ValueKind::Block(src) = module.value(block_val).kind else {
                unreachable!("phi's second operand is always a block value")
            };
            if src == simple.body {
                phi2dst.insert(val, phi_val);
            } else {
                old2new.insert(phi_val, val);
            }
        }
    }

    let bb = module.create_block(f, "unrolled");

    let mut clone_block = |module: &mut Module, old_bb: BlockId, old2new: &mut FxHashMap<ValueId, ValueId>| {
        let insts: Vec<InstId> = module
            .block(old_bb)
            .insts()
            .iter()
            .copied()
            .filter(|&i| !module.inst(i).is_phi() && module.inst(i).opcode != Opcode::Br)
            .collect();
        for old_inst in insts {
            let new_inst = module.clone_inst(bb, old_inst, old2new);
            if let (Some(old_result), Some(new_result)) = (module.inst(old_inst).result, module.inst(new_inst).result) {
                old2new.insert(old_result, new_result);
                if let Some(&phi_val) = phi2dst.get(&old_result) {
                    old2new.insert(phi_val, new_result);
                }
            }
        }
    };

    let mut i = simple.initial;
    while simple.keep_going.eval(i, simple.bound) {
        clone_block(module, simple.header, &mut old2new);
        clone_block(module, simple.body, &mut old2new);
        i += simple.step;
    }
    // One trailing header clone materializes the now-false comparison
    // (and any header-only computation) feeding values used after the
    // loop exits.
    clone_block(module, simple.header, &mut old2new);

    for (&old, &new) in old2new.iter() {
        module.replace_all_uses_with(old, new);
    }

    let exit_val = module.block(simple.exit).value_id;
    module.append_inst(bb, Opcode::Br, smallvec![exit_val], None);

    let preheader_term = module.block(simple.preheader).terminator().unwrap();
    let header_val = module.block(simple.header).value_id;
    let bb_val = module.block(bb).value_id;
    let preheader_operands = module.inst(preheader_term).operands.clone();
    for (idx, &op) in preheader_operands.iter().enumerate() {
        if op == header_val {
            module.set_operand(preheader_term, idx, bb_val);
        }
    }

    // The exit block's phis still list the original header as a
    // predecessor; repoint those incoming edges at the new unrolled tail,
    // which is the header's sole replacement as a predecessor of exit.
    let exit_phis: Vec<InstId> = module
        .block(simple.exit)
        .insts()
        .iter()
        .copied()
        .take_while(|&i| module.inst(i).is_phi())
        .collect();
    for phi in exit_phis {
        let operands = module.inst(phi).operands.clone();
        for (idx, &op) in operands.iter().enumerate() {
            if idx % 2 == 1 && op == header_val {
                module.set_operand(phi, idx, bb_val);
            }
        }
    }

    module.remove_block(f, simple.body);
    module.remove_block(f, simple.header);
}
