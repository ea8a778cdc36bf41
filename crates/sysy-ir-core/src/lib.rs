//! The SSA-form intermediate representation at the heart of the SysY
//! middle end: a value graph of constants, arguments, instructions,
//! blocks, functions and globals, arena-indexed rather than
//! pointer-linked (see [`ids`] and [`module`]).
//!
//! Downstream crates build on top of this one: `sysy-ir-analysis` computes
//! facts about a [`module::Module`] without mutating it, and `sysy-ir-opt`
//! rewrites one in place using those facts.

pub mod basic_block;
pub mod error;
pub mod function;
pub mod global_variable;
pub mod ids;
pub mod instruction;
pub mod module;
pub mod types;
pub mod value;
pub mod verify;

pub use error::{Error, Result};
pub use ids::{BlockId, FuncId, GlobalId, InstId, TypeInternId, ValueId};
pub use module::Module;
pub use verify::verify_module;
