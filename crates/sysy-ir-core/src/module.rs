//! The module: top-level owner of every arena (§3). This is where the
//! pointer-graph-with-cycles design note actually lands — `Module` plays
//! the role the teacher's `Arc<RwLock<…>>` handle graph played, except
//! every edge is a `Copy` index and every mutation goes through a method
//! here instead of through a lock.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::basic_block::BasicBlockData;
use crate::error::{Error, Result};
use crate::function::FunctionData;
use crate::global_variable::GlobalData;
use crate::ids::{BlockId, FuncId, GlobalId, InstId, TypeInternId, ValueId};
use crate::instruction::{InstructionData, Opcode};
use crate::types::{Type, TypeInterner};
use crate::value::{Use, ValueKind, ValueSlot};

/// Cache key for scalar constant interning. Arrays are never cached: two
/// `[1, 2, 3]` literals at different source sites have no reason to share
/// an id, and hashing a `Vec<ValueId>` gains nothing an identity allocation
/// wouldn't already give.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum ConstKey {
    Int(u8, i64),
    I64(i64),
    Float(u32),
    Bool(bool),
    Zero(TypeInternId),
    Undef(TypeInternId),
}

#[derive(Default)]
pub struct Module {
    pub types: TypeInterner,
    values: Vec<ValueSlot>,
    insts: Vec<InstructionData>,
    blocks: Vec<BasicBlockData>,
    funcs: Vec<FunctionData>,
    globals: Vec<GlobalData>,
    const_cache: FxHashMap<ConstKey, ValueId>,
    names: FxHashSet<Box<str>>,
    main: Option<FuncId>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    pub fn value(&self, id: ValueId) -> &ValueSlot {
        &self.values[id.index()]
    }

    pub fn inst(&self, id: InstId) -> &InstructionData {
        &self.insts[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &BasicBlockData {
        &self.blocks[id.index()]
    }

    pub fn func(&self, id: FuncId) -> &FunctionData {
        &self.funcs[id.index()]
    }

    pub fn global(&self, id: GlobalId) -> &GlobalData {
        &self.globals[id.index()]
    }

    pub fn main(&self) -> Option<FuncId> {
        self.main
    }

    pub fn functions(&self) -> impl Iterator<Item = FuncId> {
        (0..self.funcs.len()).map(FuncId::from_index)
    }

    pub fn globals(&self) -> impl Iterator<Item = GlobalId> {
        (0..self.globals.len()).map(GlobalId::from_index)
    }

    pub fn value_type(&self, id: ValueId) -> TypeInternId {
        self.values[id.index()].ty
    }

    pub fn uses_of(&self, id: ValueId) -> &[Use] {
        self.values[id.index()].uses()
    }

    // ---------------------------------------------------------------
    // Value allocation
    // ---------------------------------------------------------------

    fn alloc_value(&mut self, ty: TypeInternId, name: Option<Box<str>>, kind: ValueKind) -> ValueId {
        let id = ValueId::from_index(self.values.len());
        self.values.push(ValueSlot {
            ty,
            name,
            kind,
            uses: SmallVec::new(),
        });
        id
    }

    fn reserve_name(&mut self, name: &str) -> Result<()> {
        if self.names.contains(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        self.names.insert(name.into());
        Ok(())
    }

    // ---------------------------------------------------------------
    // Constants (§3.1 supplement): scalars are interned so that e.g. every
    // occurrence of the literal `0` in a function shares one `ValueId`,
    // mirroring how `TypeInterner` collapses structurally-equal types.
    // ---------------------------------------------------------------

    pub fn const_int(&mut self, bits: u8, value: i64) -> ValueId {
        let key = ConstKey::Int(bits, value);
        if let Some(&id) = self.const_cache.get(&key) {
            return id;
        }
        let ty = self.types.intern_int(bits);
        let id = self.alloc_value(ty, None, ValueKind::ConstInt { bits, value });
        self.const_cache.insert(key, id);
        id
    }

    pub fn const_i64(&mut self, value: i64) -> ValueId {
        let key = ConstKey::I64(value);
        if let Some(&id) = self.const_cache.get(&key) {
            return id;
        }
        let ty = self.types.i64();
        let id = self.alloc_value(ty, None, ValueKind::ConstI64(value));
        self.const_cache.insert(key, id);
        id
    }

    pub fn const_float(&mut self, value: f32) -> ValueId {
        let key = ConstKey::Float(value.to_bits());
        if let Some(&id) = self.const_cache.get(&key) {
            return id;
        }
        let ty = self.types.float();
        let id = self.alloc_value(ty, None, ValueKind::ConstFloat(value));
        self.const_cache.insert(key, id);
        id
    }

    pub fn const_bool(&mut self, value: bool) -> ValueId {
        let key = ConstKey::Bool(value);
        if let Some(&id) = self.const_cache.get(&key) {
            return id;
        }
        let ty = self.types.i1();
        let id = self.alloc_value(ty, None, ValueKind::ConstBool(value));
        self.const_cache.insert(key, id);
        id
    }

    pub fn const_zero(&mut self, ty: TypeInternId) -> ValueId {
        let key = ConstKey::Zero(ty);
        if let Some(&id) = self.const_cache.get(&key) {
            return id;
        }
        let id = self.alloc_value(ty, None, ValueKind::ConstZero);
        self.const_cache.insert(key, id);
        id
    }

    pub fn const_undef(&mut self, ty: TypeInternId) -> ValueId {
        let key = ConstKey::Undef(ty);
        if let Some(&id) = self.const_cache.get(&key) {
            return id;
        }
        let id = self.alloc_value(ty, None, ValueKind::ConstUndef);
        self.const_cache.insert(key, id);
        id
    }

    /// Array constants are not interned; see [`ConstKey`].
    pub fn const_array(&mut self, ty: TypeInternId, elems: Vec<ValueId>) -> ValueId {
        self.alloc_value(ty, None, ValueKind::ConstArray(elems))
    }

    // ---------------------------------------------------------------
    // Functions, blocks, globals
    // ---------------------------------------------------------------

    pub fn declare_function(
        &mut self,
        name: &str,
        ret_ty: TypeInternId,
        param_tys: Vec<TypeInternId>,
        is_external: bool,
    ) -> Result<FuncId> {
        self.reserve_name(name)?;
        let func_ty = self.types.func(ret_ty, param_tys.clone());
        let func_id = FuncId::from_index(self.funcs.len());
        let value_id = self.alloc_value(func_ty, Some(name.into()), ValueKind::Function(func_id));
        let args = param_tys
            .iter()
            .enumerate()
            .map(|(index, &ty)| self.alloc_value(ty, None, ValueKind::Argument { func: func_id, index: index as u32 }))
            .collect();
        self.funcs.push(FunctionData {
            name: name.into(),
            value_id,
            ret_ty,
            param_tys,
            args,
            blocks: Vec::new(),
            is_external,
        });
        if name == "main" {
            self.main = Some(func_id);
        }
        Ok(func_id)
    }

    pub fn create_block(&mut self, func: FuncId, name: &str) -> BlockId {
        let block_id = BlockId::from_index(self.blocks.len());
        let label_ty = self.types.label();
        let value_id = self.alloc_value(label_ty, Some(name.into()), ValueKind::Block(block_id));
        self.blocks.push(BasicBlockData {
            name: name.into(),
            func,
            value_id,
            insts: Vec::new(),
            preds: SmallVec::new(),
            succs: SmallVec::new(),
        });
        self.funcs[func.index()].blocks.push(block_id);
        block_id
    }

    pub fn create_global(
        &mut self,
        name: &str,
        elem_ty: TypeInternId,
        is_constant: bool,
        init: ValueId,
    ) -> Result<GlobalId> {
        self.reserve_name(name)?;
        let ptr_ty = self.types.pointer(elem_ty);
        let global_id = GlobalId::from_index(self.globals.len());
        let value_id = self.alloc_value(ptr_ty, Some(name.into()), ValueKind::Global(global_id));
        self.globals.push(GlobalData {
            name: name.into(),
            value_id,
            elem_ty,
            is_constant,
            init,
        });
        Ok(global_id)
    }

    // ---------------------------------------------------------------
    // Instruction construction and the use-def contract (§3.1)
    // ---------------------------------------------------------------

    /// Appends a new instruction to the end of `block`'s instruction list.
    /// If `result_ty` is `Some`, a fresh value is allocated for the
    /// instruction's result and returned alongside the instruction id by
    /// [`Module::inst`]'s `result` field. Registers a use-list edge from
    /// every operand back to this instruction, and — if the opcode is a
    /// terminator — rewires the block's CFG edges from the new operands.
    pub fn append_inst(
        &mut self,
        block: BlockId,
        opcode: Opcode,
        operands: SmallVec<[ValueId; 2]>,
        result_ty: Option<TypeInternId>,
    ) -> InstId {
        let inst_id = InstId::from_index(self.insts.len());
        let result = result_ty.map(|ty| self.alloc_value(ty, None, ValueKind::Inst(inst_id)));
        self.insts.push(InstructionData {
            opcode,
            operands,
            result,
            parent: block,
        });
        self.register_operand_uses(inst_id);
        self.blocks[block.index()].insts.push(inst_id);
        if opcode.is_terminator() {
            self.rewire_terminator(block);
        }
        inst_id
    }

    /// Inserts a new instruction immediately before `before` in its block.
    /// Used by phi placement (mem2reg), invariant hoisting (LICM), and any
    /// other pass that must introduce an instruction mid-block rather than
    /// at the end.
    pub fn insert_inst_before(
        &mut self,
        before: InstId,
        opcode: Opcode,
        operands: SmallVec<[ValueId; 2]>,
        result_ty: Option<TypeInternId>,
    ) -> InstId {
        let block = self.insts[before.index()].parent;
        let inst_id = InstId::from_index(self.insts.len());
        let result = result_ty.map(|ty| self.alloc_value(ty, None, ValueKind::Inst(inst_id)));
        self.insts.push(InstructionData {
            opcode,
            operands,
            result,
            parent: block,
        });
        self.register_operand_uses(inst_id);
        let list = &mut self.blocks[block.index()].insts;
        let pos = list.iter().position(|&i| i == before).expect("before must be in its own block");
        list.insert(pos, inst_id);
        debug_assert!(!opcode.is_terminator(), "cannot insert a terminator mid-block");
        inst_id
    }

    /// Prepends to the front of `block` — the common case for phi nodes,
    /// which must precede every non-phi instruction.
    pub fn prepend_inst(
        &mut self,
        block: BlockId,
        opcode: Opcode,
        operands: SmallVec<[ValueId; 2]>,
        result_ty: Option<TypeInternId>,
    ) -> InstId {
        let inst_id = InstId::from_index(self.insts.len());
        let result = result_ty.map(|ty| self.alloc_value(ty, None, ValueKind::Inst(inst_id)));
        self.insts.push(InstructionData {
            opcode,
            operands,
            result,
            parent: block,
        });
        self.register_operand_uses(inst_id);
        self.blocks[block.index()].insts.insert(0, inst_id);
        inst_id
    }

    fn register_operand_uses(&mut self, inst_id: InstId) {
        let operands = self.insts[inst_id.index()].operands.clone();
        for (idx, operand) in operands.iter().enumerate() {
            self.values[operand.index()].uses.push(Use {
                user: inst_id,
                operand_index: idx as u32,
            });
        }
    }

    /// Changes `inst`'s operand at `idx` from its current value to `new`,
    /// maintaining use-list edges on both the old and new operand. This is
    /// the single choke point every rewrite pass goes through; nothing ever
    /// mutates `InstructionData::operands` directly.
    pub fn set_operand(&mut self, inst: InstId, idx: usize, new: ValueId) {
        let old = self.insts[inst.index()].operands[idx];
        if old == new {
            return;
        }
        if let Some(pos) = self.values[old.index()]
            .uses
            .iter()
            .position(|u| u.user == inst && u.operand_index as usize == idx)
        {
            self.values[old.index()].uses.swap_remove(pos);
        }
        self.insts[inst.index()].operands[idx] = new;
        self.values[new.index()].uses.push(Use {
            user: inst,
            operand_index: idx as u32,
        });
        let block = self.insts[inst.index()].parent;
        if self.insts[inst.index()].opcode.is_terminator() {
            self.rewire_terminator(block);
        }
    }

    /// Rewrites every use of `old` to refer to `new` instead — the core
    /// RAUW (replace-all-uses-with) operation every transform pass in §4
    /// builds on: GVN folding a value into its congruence leader, constant
    /// propagation folding an instruction to a constant, mem2reg replacing
    /// a load with the reaching store value, and so on.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        self.replace_uses_with_if(old, new, |_| true);
    }

    /// As [`Module::replace_all_uses_with`], but only rewrites uses whose
    /// user instruction satisfies `keep`. Used when a replacement is only
    /// valid in a dominance-restricted subset of uses (GVN's congruence
    /// replacement honors dominance rather than rewriting globally).
    pub fn replace_uses_with_if(&mut self, old: ValueId, new: ValueId, keep: impl Fn(InstId) -> bool) {
        if old == new {
            return;
        }
        let uses: SmallVec<[Use; 8]> = self.values[old.index()].uses.iter().copied().collect();
        for u in uses {
            if keep(u.user) {
                self.set_operand(u.user, u.operand_index as usize, new);
            }
        }
    }

    /// Removes `inst` from its block's instruction list and clears its
    /// outgoing use edges. The caller must already have rerouted any uses
    /// of this instruction's own result (e.g. via `replace_all_uses_with`)
    /// — an instruction whose result is still referenced cannot be erased,
    /// matching the liveness precondition every dead-code-style pass
    /// checks before calling this.
    pub fn erase_inst(&mut self, inst: InstId) {
        if let Some(result) = self.insts[inst.index()].result {
            debug_assert!(
                self.values[result.index()].uses.is_empty(),
                "erasing an instruction whose result is still used"
            );
        }
        self.unlink_inst(inst);
    }

    /// Erases a whole set of mutually-dead instructions at once, as
    /// dead-code elimination's sweep phase does: members of the set may
    /// reference each other's results, so each instruction's own result
    /// use-list is force-cleared before any of them is unlinked, rather
    /// than requiring (as [`Module::erase_inst`] does) that it already be
    /// empty.
    pub fn erase_dead_insts(&mut self, insts: &[InstId]) {
        for &inst in insts {
            if let Some(result) = self.insts[inst.index()].result {
                self.values[result.index()].uses.clear();
            }
        }
        for &inst in insts {
            self.unlink_inst(inst);
        }
    }

    fn unlink_inst(&mut self, inst: InstId) {
        let operands = self.insts[inst.index()].operands.clone();
        for (idx, operand) in operands.iter().enumerate() {
            if let Some(pos) = self.values[operand.index()]
                .uses
                .iter()
                .position(|u| u.user == inst && u.operand_index as usize == idx)
            {
                self.values[operand.index()].uses.swap_remove(pos);
            }
        }
        let block = self.insts[inst.index()].parent;
        let was_terminator = self.insts[inst.index()].opcode.is_terminator();
        self.blocks[block.index()].insts.retain(|&i| i != inst);
        if was_terminator {
            // Removing a terminator without installing a new one leaves the
            // block momentarily non-terminated; callers that erase a
            // terminator are expected to append its replacement in the same
            // breath, which will re-run `rewire_terminator`. We still need
            // to drop this block from its old successors' predecessor
            // lists first, which `rewire_terminator` would otherwise have
            // done on our behalf.
            for succ in self.block(block).successors().to_vec() {
                let preds = &mut self.blocks[succ.index()].preds;
                if let Some(pos) = preds.iter().position(|&p| p == block) {
                    preds.remove(pos);
                }
            }
            self.blocks[block.index()].succs.clear();
        }
    }

    /// Moves `inst` to immediately before `before`, which must be in a
    /// different block (or the same block, in which case this reorders
    /// within it). Used by LICM to hoist loop-invariant instructions into
    /// a preheader and by control-flow simplification when merging blocks.
    pub fn move_inst_before(&mut self, inst: InstId, before: InstId) {
        let old_block = self.insts[inst.index()].parent;
        self.blocks[old_block.index()].insts.retain(|&i| i != inst);
        let new_block = self.insts[before.index()].parent;
        self.insts[inst.index()].parent = new_block;
        let list = &mut self.blocks[new_block.index()].insts;
        let pos = list.iter().position(|&i| i == before).expect("before must be in its own block");
        list.insert(pos, inst);
    }

    /// Appends `inst` (previously erased from `old_block`'s list but not
    /// yet re-inserted — its `operands`/`result` remain valid) to the end
    /// of `dest`. Used by the inliner's block-splitting and LICM's
    /// preheader hoist when the destination end is already known to be
    /// safe (before the terminator).
    pub fn append_existing_inst(&mut self, inst: InstId, dest: BlockId) {
        let old_block = self.insts[inst.index()].parent;
        if old_block != dest {
            self.blocks[old_block.index()].insts.retain(|&i| i != inst);
        }
        self.insts[inst.index()].parent = dest;
        if !self.blocks[dest.index()].insts.contains(&inst) {
            self.blocks[dest.index()].insts.push(inst);
        }
    }

    /// Clones `src` into `dest`, remapping its operands through
    /// `value_map` (falling back to the original operand if unmapped —
    /// correct for operands that are module-level constants or globals,
    /// which clone as themselves). Returns the new instruction id; if
    /// `src` produced a result, the caller is responsible for inserting
    /// the new result into `value_map` under `src`'s old result id before
    /// cloning any instruction that uses it, matching the breadth-first
    /// clone order both the inliner and the loop unroller use.
    pub fn clone_inst(&mut self, dest: BlockId, src: InstId, value_map: &FxHashMap<ValueId, ValueId>) -> InstId {
        let data = self.insts[src.index()].clone();
        let remapped: SmallVec<[ValueId; 2]> = data
            .operands
            .iter()
            .map(|v| value_map.get(v).copied().unwrap_or(*v))
            .collect();
        let result_ty = data.result.map(|r| self.values[r.index()].ty);
        self.append_inst(dest, data.opcode, remapped, result_ty)
    }

    /// Appends one more `(value, block)` incoming pair to an existing phi,
    /// growing its operand list rather than replacing an existing slot.
    /// Used when filling in a successor's phi as each predecessor is
    /// visited (mem2reg's renaming pass, loop-simplify's phi splitting).
    pub fn push_phi_operand(&mut self, inst: InstId, value: ValueId, block: ValueId) {
        debug_assert!(self.insts[inst.index()].is_phi());
        let idx_val = self.insts[inst.index()].operands.len() as u32;
        self.insts[inst.index()].operands.push(value);
        self.values[value.index()].uses.push(Use {
            user: inst,
            operand_index: idx_val,
        });
        let idx_block = idx_val + 1;
        self.insts[inst.index()].operands.push(block);
        self.values[block.index()].uses.push(Use {
            user: inst,
            operand_index: idx_block,
        });
    }

    // ---------------------------------------------------------------
    // CFG maintenance
    // ---------------------------------------------------------------

    /// Extracts the set of successor blocks a terminator instruction
    /// branches to, reading straight from its operands: `ret` has none,
    /// `br` has one (unconditional) or the two block operands at fixed
    /// positions (conditional: `[cond, then_block, else_block]`).
    fn terminator_targets(&self, inst: InstId) -> SmallVec<[BlockId; 2]> {
        let data = &self.insts[inst.index()];
        let mut out = SmallVec::new();
        if !matches!(data.opcode, Opcode::Br) {
            return out;
        }
        for operand in &data.operands {
            if let ValueKind::Block(b) = self.values[operand.index()].kind {
                out.push(b);
            }
        }
        out
    }

    /// Recomputes `block`'s successor list from its current terminator and
    /// patches the affected blocks' predecessor lists to match, preserving
    /// multiplicity (a conditional branch whose two targets coincide, or a
    /// loop latch branching back to its own header, contributes one
    /// predecessor-list entry per edge instance — phi incoming lists are
    /// keyed on this multiset, not on the set of distinct predecessors).
    fn rewire_terminator(&mut self, block: BlockId) {
        let Some(term) = self.block(block).terminator() else { return };
        let old_succs: SmallVec<[BlockId; 2]> = self.block(block).successors().iter().copied().collect();
        let new_succs = self.terminator_targets(term);
        for s in &old_succs {
            let preds = &mut self.blocks[s.index()].preds;
            if let Some(pos) = preds.iter().position(|&p| p == block) {
                preds.remove(pos);
            }
        }
        for &s in &new_succs {
            self.blocks[s.index()].preds.push(block);
        }
        self.blocks[block.index()].succs = new_succs;
    }

    /// Rewires `block`'s CFG edges from its terminator. Public so that a
    /// pass which directly patches a `br`'s block operand via
    /// [`Module::set_operand`] does not need to duplicate this logic — but
    /// `set_operand` already calls it automatically for terminators, so
    /// this is only needed after bulk operand surgery that bypasses it.
    pub fn resync_terminator(&mut self, block: BlockId) {
        self.rewire_terminator(block);
    }

    // ---------------------------------------------------------------
    // Whole-module sweeps (dead-code elimination's `sweep_globally`, §4.7)
    // ---------------------------------------------------------------

    /// Caller guarantees every instruction in `block` is already dead
    /// (no remaining uses of its result) before calling this; `erase_inst`
    /// asserts that invariant per instruction.
    pub fn remove_block(&mut self, func: FuncId, block: BlockId) {
        for inst in self.block(block).insts().to_vec().into_iter().rev() {
            self.erase_inst(inst);
        }
        self.funcs[func.index()].blocks.retain(|&b| b != block);
        for succ in self.block(block).successors().to_vec() {
            let preds = &mut self.blocks[succ.index()].preds;
            preds.retain(|&p| p != block);
        }
    }

    pub fn remove_function(&mut self, func: FuncId) {
        self.funcs[func.index()].is_external = true;
        self.funcs[func.index()].blocks.clear();
    }

    pub fn remove_global(&mut self, global: GlobalId) {
        self.globals[global.index()].is_constant = true;
    }
}

impl TypeInterner {
    /// Dispatches to the `i1`/`i32`/arbitrary-bit-width helper by width,
    /// used by [`Module::const_int`] where the width is a runtime value
    /// rather than a call-site literal.
    pub(crate) fn intern_int(&mut self, bits: u8) -> TypeInternId {
        match bits {
            1 => self.i1(),
            32 => self.i32(),
            other => self.intern(Type::Int { bits: other }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_add_function(m: &mut Module) -> (FuncId, BlockId, InstId) {
        let i32_ty = m.types.i32();
        let f = m.declare_function("add_one", i32_ty, vec![i32_ty], false).unwrap();
        let entry = m.create_block(f, "entry");
        let arg = m.func(f).args[0];
        let one = m.const_int(32, 1);
        let add = m.append_inst(entry, Opcode::IBin(crate::instruction::IBinOp::Add), smallvec::smallvec![arg, one], Some(i32_ty));
        m.append_inst(entry, Opcode::Ret, smallvec::smallvec![m.inst(add).result.unwrap()], None);
        (f, entry, add)
    }

    #[test]
    fn append_inst_registers_use_edges() {
        let mut m = Module::new();
        let (_, _, add) = build_add_function(&mut m);
        let add_result = m.inst(add).result.unwrap();
        assert_eq!(m.uses_of(add_result).len(), 1, "add's result should be used once, by ret");
        let arg = m.inst(add).operands[0];
        assert_eq!(m.uses_of(arg).len(), 1);
    }

    #[test]
    fn set_operand_moves_use_edge() {
        let mut m = Module::new();
        let (_, _, add) = build_add_function(&mut m);
        let old_rhs = m.inst(add).operands[1];
        let two = m.const_int(32, 2);
        m.set_operand(add, 1, two);
        assert!(m.uses_of(old_rhs).is_empty());
        assert_eq!(m.uses_of(two).len(), 1);
        assert_eq!(m.inst(add).operands[1], two);
    }

    #[test]
    fn replace_all_uses_with_rewrites_every_user() {
        let mut m = Module::new();
        let i32_ty = m.types.i32();
        let f = m.declare_function("f", i32_ty, vec![], false).unwrap();
        let entry = m.create_block(f, "entry");
        let one = m.const_int(32, 1);
        let a = m.append_inst(entry, Opcode::IBin(crate::instruction::IBinOp::Add), smallvec::smallvec![one, one], Some(i32_ty));
        let a_val = m.inst(a).result.unwrap();
        let b = m.append_inst(entry, Opcode::IBin(crate::instruction::IBinOp::Mul), smallvec::smallvec![a_val, a_val], Some(i32_ty));
        m.append_inst(entry, Opcode::Ret, smallvec::smallvec![m.inst(b).result.unwrap()], None);

        let two = m.const_int(32, 2);
        m.replace_all_uses_with(a_val, two);
        assert!(m.uses_of(a_val).is_empty());
        assert_eq!(m.inst(b).operands[0], two);
        assert_eq!(m.inst(b).operands[1], two);
    }

    #[test]
    fn const_int_is_interned() {
        let mut m = Module::new();
        let a = m.const_int(32, 7);
        let b = m.const_int(32, 7);
        assert_eq!(a, b);
        let c = m.const_int(1, 7);
        assert_ne!(a, c, "different bit width must not share an id even with the same value");
    }

    #[test]
    fn terminator_rewiring_updates_predecessors() {
        let mut m = Module::new();
        let void = m.types.void();
        let f = m.declare_function("f", void, vec![], false).unwrap();
        let entry = m.create_block(f, "entry");
        let then_bb = m.create_block(f, "then");
        let then_val = m.block(then_bb).value_id;
        m.append_inst(entry, Opcode::Br, smallvec::smallvec![then_val], None);
        assert_eq!(m.block(entry).successors(), &[then_bb]);
        assert_eq!(m.block(then_bb).predecessors(), &[entry]);
    }

    #[test]
    fn erase_inst_requires_dead_result() {
        let mut m = Module::new();
        let (_, entry, add) = build_add_function(&mut m);
        let ret = *m.block(entry).insts().last().unwrap();
        let add_result = m.inst(add).result.unwrap();
        // Reroute ret's use of add's result before erasing, matching the
        // precondition every dead-code pass upholds.
        let zero = m.const_int(32, 0);
        m.set_operand(ret, 0, zero);
        assert!(m.uses_of(add_result).is_empty());
        m.erase_inst(add);
        assert!(!m.block(entry).insts().contains(&add));
    }
}
