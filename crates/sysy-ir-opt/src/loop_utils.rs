//! Preheader construction, grounded in `transform/loop_simplify.cc`'s
//! `create_preheader`. Not a named pass of its own — the spec names only
//! LICM (§4.10) and loop unrolling (§4.11) among the twelve in-scope
//! transforms, both of which need a guaranteed preheader, so this lives
//! as a shared helper each calls directly rather than as a separate
//! scheduled pass. [`find_preheader`] recognizes an already-dedicated
//! preheader (the header's sole external predecessor, itself branching
//! only to the header) before [`ensure_preheader`] synthesizes a fresh
//! one, so repeated pipeline iterations never pile up empty blocks.

use smallvec::smallvec;
use sysy_ir_analysis::LoopInfo;
use sysy_ir_core::instruction::Opcode;
use sysy_ir_core::value::ValueKind;
use sysy_ir_core::{BlockId, FuncId, InstId, Module, ValueId};

pub fn find_preheader(module: &Module, loop_info: &LoopInfo) -> Option<BlockId> {
    let header = loop_info.header;
    let externals: Vec<BlockId> = module
        .block(header)
        .predecessors()
        .iter()
        .copied()
        .filter(|p| !loop_info.bbs.contains(p))
        .collect();
    if externals.len() != 1 {
        return None;
    }
    let p = externals[0];
    let succs = module.block(p).successors();
    (succs.len() == 1 && succs[0] == header).then_some(p)
}

pub fn ensure_preheader(module: &mut Module, f: FuncId, loop_info: &LoopInfo) -> BlockId {
    if let Some(p) = find_preheader(module, loop_info) {
        return p;
    }
    let header = loop_info.header;
    let preheader = module.create_block(f, "preheader");
    let header_val = module.block(header).value_id;
    let preheader_val = module.block(preheader).value_id;

    let phis: Vec<InstId> = module
        .block(header)
        .insts()
        .iter()
        .copied()
        .take_while(|&i| module.inst(i).is_phi())
        .collect();
    for phi in phis {
        split_phi(module, phi, preheader, preheader_val, loop_info);
    }

    let externals: Vec<BlockId> = module
        .block(header)
        .predecessors()
        .iter()
        .copied()
        .filter(|p| !loop_info.bbs.contains(p))
        .collect();
    for pred in externals {
        redirect_branch_target(module, pred, header_val, preheader_val);
    }

    module.append_inst(preheader, Opcode::Br, smallvec![header_val], None);
    preheader
}

/// Splits one header φ's incoming pairs into those sourced from inside
/// the loop (kept on the original φ) and those sourced from outside
/// (merged into a single value flowing in from the new preheader edge).
fn split_phi(module: &mut Module, phi: InstId, preheader: BlockId, preheader_val: ValueId, loop_info: &LoopInfo) {
    let pairs: Vec<(ValueId, ValueId)> = module.inst(phi).phi_pairs().collect();
    let mut inner: Vec<(ValueId, ValueId)> = Vec::new();
    let mut outer: Vec<(ValueId, ValueId)> = Vec::new();
    for (val, block_val) in pairs {
        let ValueKind::Block(bb) = module.value(block_val).kind else {
            unreachable!("phi's second operand is always a block value")
        };
        if loop_info.bbs.contains(&bb) {
            inner.push((val, block_val));
        } else {
            outer.push((val, block_val));
        }
    }
    if outer.is_empty() {
        // Every incoming value already comes from inside the loop body;
        // nothing for the preheader to carry.
        return;
    }
    if inner.is_empty() {
        // The whole phi is loop-invariant by definition; relocate it.
        module.append_existing_inst(phi, preheader);
        return;
    }
    let incoming = if outer.len() == 1 {
        outer[0].0
    } else {
        let ty = module.value_type(module.inst(phi).result.unwrap());
        let merged = module.prepend_inst(preheader, Opcode::Phi, smallvec![], Some(ty));
        for &(val, block_val) in &outer {
            module.push_phi_operand(merged, val, block_val);
        }
        module.inst(merged).result.unwrap()
    };
    rebuild_phi(module, phi, &inner, incoming, preheader_val);
}

fn rebuild_phi(module: &mut Module, phi: InstId, inner: &[(ValueId, ValueId)], incoming: ValueId, preheader_val: ValueId) {
    let ty = module.value_type(module.inst(phi).result.unwrap());
    let new_phi = module.insert_inst_before(phi, Opcode::Phi, smallvec![], Some(ty));
    for &(val, block_val) in inner {
        module.push_phi_operand(new_phi, val, block_val);
    }
    module.push_phi_operand(new_phi, incoming, preheader_val);
    let old_result = module.inst(phi).result.unwrap();
    let new_result = module.inst(new_phi).result.unwrap();
    module.replace_all_uses_with(old_result, new_result);
    module.erase_inst(phi);
}

fn redirect_branch_target(module: &mut Module, pred: BlockId, old: ValueId, new: ValueId) {
    let term = *module.block(pred).insts().last().expect("every block ends in a terminator");
    let operands = module.inst(term).operands.clone();
    for (idx, &op) in operands.iter().enumerate() {
        if op == old {
            module.set_operand(term, idx, new);
        }
    }
}
