//! Analysis cache plus the driver-facing pass registry (§4.1's "ambient
//! pass-manager" supplement). Grounded in `pass.hh`'s `PassIDType =
//! std::type_index` / `AnalysisUsage` contract and `pass.cc`'s
//! `run`/`run_iteratively`/`run_single_pass` algorithm, reshaped for Rust:
//! instead of a registry of heap-allocated `Pass` objects queried through
//! RTTI, every pass is a stateless marker type keyed by `TypeId`, and its
//! behavior (how to run it, what it requires/kills/suggests) is captured
//! as a handful of plain function pointers at `add_pass::<P>()` time
//! rather than through virtual dispatch. The error vocabulary
//! (`PassError` / `PassResult<T>`) follows the shape of
//! `boxabirds-llvm-rust`'s `src/passes.rs::PassError`, upgraded to a
//! `thiserror`-derived enum the way `crates/llvm-core/src/lib.rs::Error`
//! already does it elsewhere in that workspace.

use std::any::{Any, TypeId};

use rustc_hash::FxHashMap;
use sysy_ir_core::Module;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum PassError {
    #[error("pass `{0}` failed: {1}")]
    Failed(&'static str, String),

    #[error("module failed verification before the pass pipeline could run: {0}")]
    Verification(#[from] sysy_ir_core::Error),
}

pub type PassResult<T> = Result<T, PassError>;

/// An analysis: a pure function of the module (plus whatever other
/// analyses it asks the manager for) to some cacheable result. Analyses
/// never mutate the module; only `sysy-ir-opt`'s transforms do, and they
/// invalidate this cache when they do (see [`PassManager::kill_all`]).
pub trait Analysis: 'static {
    type Result: 'static;

    fn run(module: &Module, mgr: &mut PassManager) -> Self::Result;

    /// A short name for logging; defaults to the type name.
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A schedulable pass: anything `PassManager::add_pass`/`run`/
/// `run_iteratively` can drive by id. Every [`Analysis`] and every
/// transform in `sysy-ir-opt` implements this, so a driver-supplied
/// ordered pass list (§6's "an ordered pass list" external-interface
/// input) has one registry to dispatch through — the same way `pass.hh`'s
/// `Pass` base class unifies `AnalysisPass`/`TransformPass` under one
/// `PassIDType`-keyed registry, just without the virtual call.
pub trait Pass: 'static {
    /// Runs the pass, returning whether it changed the module. An
    /// analysis wrapped as a `Pass` (see the `impl Pass for` blocks next
    /// to each `Analysis` in this crate) always returns `false` — forcing
    /// it just (re)populates the cache `get`/`get_result` read from.
    fn run_pass(module: &mut Module, mgr: &mut PassManager) -> PassResult<bool>;

    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Declares this pass's required analyses, suggested post-passes, and
    /// invalidation behavior. The default (`All`, nothing required or
    /// suggested) matches `TransformPass`'s default in the original —
    /// every transform here overrides it to match its own `.hh`'s
    /// `get_analysis_usage`.
    fn analysis_usage(_au: &mut AnalysisUsage) {}

    /// Whether this pass must always re-run when requested, never
    /// trusting a cached "valid" flag. Transforms default to `true`
    /// (nothing here tracks incremental re-validation, matching
    /// `TransformPass::always_invalid`); analyses override this to
    /// `false` next to their `Analysis` impl, matching `AnalysisPass`.
    fn always_invalid() -> bool {
        true
    }

    /// True for passes that are also an [`Analysis`] — mirrors the
    /// original's `is_a<AnalysisPass>(passinfo.get())` check, which
    /// `KillType::All` uses to only invalidate analysis results, not
    /// transform entries (whose `always_invalid` already makes their
    /// valid flag moot).
    fn is_analysis() -> bool {
        false
    }
}

/// The id a driver assembles a custom ordered pass list out of (§6's
/// "ordered pass list" external interface) — just the `TypeId` a pass was
/// registered under by `PassManager::add_pass::<P>()`.
pub fn pass_id<P: Pass>() -> TypeId {
    TypeId::of::<P>()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KillType {
    None,
    Normal,
    #[default]
    All,
}

/// Declared once per pass via [`Pass::analysis_usage`], collected by the
/// manager at `run_single_pass` time. Mirrors `pass.hh`'s `AnalysisUsage`:
/// a kill type, a required-analyses list (run first if stale), a
/// suggested-post list (run after, depth-first, when `post=true`), and an
/// explicit kill list for `KillType::Normal`.
#[derive(Default)]
pub struct AnalysisUsage {
    kill_type: KillType,
    requires: Vec<TypeId>,
    posts: Vec<TypeId>,
    kills: Vec<TypeId>,
}

impl AnalysisUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_kill_type(&mut self, kt: KillType) {
        self.kill_type = kt;
    }

    /// `P` must already be registered via `PassManager::add_pass::<P>()`
    /// by the time this usage is consulted — requesting a result for an
    /// unregistered pass is a programming error, per §4.1's error
    /// semantics.
    pub fn add_require<P: Pass>(&mut self) {
        self.requires.push(TypeId::of::<P>());
    }

    pub fn add_post<P: Pass>(&mut self) {
        self.posts.push(TypeId::of::<P>());
    }

    pub fn add_kill<P: Pass>(&mut self) {
        self.kills.push(TypeId::of::<P>());
    }
}

#[derive(Clone, Copy)]
struct PassEntry {
    name: &'static str,
    always_invalid: bool,
    is_analysis: bool,
    run: fn(&mut Module, &mut PassManager) -> PassResult<bool>,
    analysis_usage: fn() -> AnalysisUsage,
}

#[derive(Default)]
pub struct PassManager {
    cache: FxHashMap<TypeId, Box<dyn Any>>,
    valid: FxHashMap<TypeId, bool>,
    registry: FxHashMap<TypeId, PassEntry>,
    /// Passes registered via `add_pass`, in registration order. `run`/
    /// `run_iteratively` take their order explicitly instead of reading
    /// this — matching the original's own `run`, which comments "ignore
    /// `_order` and always use order provided by user, or it could be
    /// confusing when user tries to provide an empty order list".
    /// `run_configured` is the one operation that does read it, for
    /// callers happy with whatever order they registered passes in.
    order: Vec<TypeId>,
    record: Vec<TypeId>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached result for analysis `A`, running it first if it
    /// is missing or was invalidated by an earlier transform.
    pub fn get_result<A: Analysis>(&mut self, module: &Module) -> &A::Result {
        let id = TypeId::of::<A>();
        if !self.valid.get(&id).copied().unwrap_or(false) {
            trace!(pass = A::name(), "recomputing analysis");
            let result = A::run(module, self);
            self.cache.insert(id, Box::new(result));
            self.valid.insert(id, true);
        }
        self.cache
            .get(&id)
            .expect("analysis result populated above")
            .downcast_ref::<A::Result>()
            .expect("analysis result type mismatch — TypeId collision should be impossible")
    }

    /// Alias kept for the existing direct-by-static-type call sites across
    /// `sysy-ir-opt` (`mgr.get::<Dominator>(module)` and friends), which
    /// fetch an analysis without going through the id-indexed registry
    /// below at all.
    pub fn get<A: Analysis>(&mut self, module: &Module) -> &A::Result {
        self.get_result::<A>(module)
    }

    /// Invalidates every cached analysis. Transform passes call this
    /// after any edit that could change instruction operands, block
    /// contents, or CFG shape — which in practice is every transform in
    /// this crate, since none of them track incremental updates to
    /// dominance or loop structure. This mirrors `AnalysisUsage::KillType::All`.
    pub fn kill_all(&mut self) {
        self.valid.clear();
    }

    pub fn kill<A: Analysis>(&mut self) {
        self.valid.remove(&TypeId::of::<A>());
    }

    /// Registers pass `P` if absent and appends its id to the configured
    /// order. Idempotent registration, append-always ordering — matching
    /// `add_pass<PassName>(args...)`'s "insert if absent into `_passes`,
    /// always push onto `_order`" behavior.
    pub fn add_pass<P: Pass>(&mut self) {
        let id = TypeId::of::<P>();
        self.registry.entry(id).or_insert_with(|| PassEntry {
            name: P::name(),
            always_invalid: P::always_invalid(),
            is_analysis: P::is_analysis(),
            run: P::run_pass,
            analysis_usage: || {
                let mut au = AnalysisUsage::default();
                P::analysis_usage(&mut au);
                au
            },
        });
        self.order.push(id);
    }

    /// Executes `order` once, depth-first expanding suggested post-passes
    /// when `post` is true. Mirrors `PassManager::run`.
    pub fn run(&mut self, module: &mut Module, order: &[TypeId], post: bool) -> PassResult<bool> {
        let mut changed = false;
        for &id in order {
            changed |= self.run_single_pass(module, id, false, post)?;
        }
        Ok(changed)
    }

    /// Runs `order` repeatedly, forcing every pass to re-run each round
    /// (post-passes are not expanded, matching the original's
    /// `run_iteratively` always calling `run_single_pass(id, true, false)`),
    /// until a full round makes no change. Mirrors `run_iteratively`.
    pub fn run_iteratively(&mut self, module: &mut Module, order: &[TypeId]) -> PassResult<bool> {
        let mut changed_ever = false;
        loop {
            let mut changed_this_round = false;
            for &id in order {
                changed_this_round |= self.run_single_pass(module, id, true, false)?;
            }
            changed_ever |= changed_this_round;
            if !changed_this_round {
                return Ok(changed_ever);
            }
        }
    }

    /// Runs the passes registered via `add_pass`, in registration order.
    pub fn run_configured(&mut self, module: &mut Module, post: bool) -> PassResult<bool> {
        let order = self.order.clone();
        self.run(module, &order, post)
    }

    /// Marks every registered pass's cached result invalid without
    /// touching the module. Mirrors `PassManager::reset`.
    pub fn reset(&mut self) {
        self.valid.clear();
    }

    pub fn passes_run(&self) -> &[TypeId] {
        &self.record
    }

    fn run_single_pass(&mut self, module: &mut Module, id: TypeId, force: bool, post: bool) -> PassResult<bool> {
        let entry = *self
            .registry
            .get(&id)
            .unwrap_or_else(|| panic!("pass {id:?} not registered — call PassManager::add_pass::<P>() before referencing it"));

        if !force && !entry.always_invalid && self.valid.get(&id).copied().unwrap_or(false) {
            return Ok(false);
        }

        let au = (entry.analysis_usage)();
        for &req in &au.requires {
            if !self.valid.get(&req).copied().unwrap_or(false) {
                self.run_single_pass(module, req, false, false)?;
            }
        }

        debug!(pass = entry.name, "running pass");
        let mut changed = (entry.run)(module, self)?;
        self.record.push(id);

        match au.kill_type {
            KillType::None => {}
            KillType::Normal => {
                for &k in &au.kills {
                    self.valid.insert(k, false);
                }
            }
            KillType::All => {
                let analysis_ids: Vec<TypeId> = self.registry.iter().filter(|(_, e)| e.is_analysis).map(|(id, _)| *id).collect();
                for aid in analysis_ids {
                    self.valid.insert(aid, false);
                }
            }
        }

        if post {
            for &p in &au.posts {
                changed |= self.run_single_pass(module, p, force, post)?;
            }
        }

        if !entry.always_invalid {
            self.valid.insert(id, true);
        }
        Ok(changed)
    }
}
