//! Global variables (§3.3). A global's value type is always a pointer to
//! its declared element type, matching how `alloca` and function arguments
//! of pointer type are modeled.

use crate::ids::{TypeInternId, ValueId};

#[derive(Clone, Debug)]
pub struct GlobalData {
    pub name: Box<str>,
    pub value_id: ValueId,
    /// The pointee type — what the global actually stores, not its pointer
    /// value type.
    pub elem_ty: TypeInternId,
    pub is_constant: bool,
    pub init: ValueId,
}
