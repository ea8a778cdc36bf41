//! The closed type lattice (§3.2) with per-module structural interning.

use rustc_hash::FxHashMap;

use crate::ids::TypeInternId;

/// A SysY IR type. `bits` on `Int` is always `1` (boolean results of
/// `icmp`/`fcmp`) or `32`; the 64-bit integer type used for address
/// arithmetic and overflow-safe constant folding is its own variant,
/// `I64`, matching the source language's `int`/`long` split.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Type {
    Void,
    Label,
    Int { bits: u8 },
    I64,
    Float,
    Pointer(TypeInternId),
    Array(TypeInternId, u32),
    Func(TypeInternId, FuncTypeKey),
}

/// Interned parameter-list payload for function types: `(return, params)`.
/// Function types are rare enough (one per declared/defined function) that
/// a secondary small table keyed by the parameter vector is simpler than
/// inventing variable-length interned records in the `Type` enum itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FuncTypeKey(pub(crate) u32);

#[derive(Clone, PartialEq, Eq, Hash)]
struct FuncTypeData {
    ret: TypeInternId,
    params: Vec<TypeInternId>,
}

/// Per-module structural interner: two types with the same shape share one
/// [`TypeInternId`], so type equality collapses to `TypeInternId` equality.
#[derive(Default)]
pub struct TypeInterner {
    types: Vec<Type>,
    lookup: FxHashMap<Type, TypeInternId>,
    func_types: Vec<FuncTypeData>,
    func_lookup: FxHashMap<(TypeInternId, Vec<TypeInternId>), FuncTypeKey>,
    void: Option<TypeInternId>,
    i1: Option<TypeInternId>,
    i32: Option<TypeInternId>,
    i64: Option<TypeInternId>,
    float: Option<TypeInternId>,
    label: Option<TypeInternId>,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn intern(&mut self, ty: Type) -> TypeInternId {
        if let Some(&id) = self.lookup.get(&ty) {
            return id;
        }
        let id = TypeInternId::from_index(self.types.len());
        self.types.push(ty);
        self.lookup.insert(ty, id);
        id
    }

    pub fn void(&mut self) -> TypeInternId {
        if let Some(id) = self.void {
            return id;
        }
        let id = self.intern(Type::Void);
        self.void = Some(id);
        id
    }

    pub fn label(&mut self) -> TypeInternId {
        if let Some(id) = self.label {
            return id;
        }
        let id = self.intern(Type::Label);
        self.label = Some(id);
        id
    }

    pub fn i1(&mut self) -> TypeInternId {
        if let Some(id) = self.i1 {
            return id;
        }
        let id = self.intern(Type::Int { bits: 1 });
        self.i1 = Some(id);
        id
    }

    pub fn i32(&mut self) -> TypeInternId {
        if let Some(id) = self.i32 {
            return id;
        }
        let id = self.intern(Type::Int { bits: 32 });
        self.i32 = Some(id);
        id
    }

    pub fn i64(&mut self) -> TypeInternId {
        if let Some(id) = self.i64 {
            return id;
        }
        let id = self.intern(Type::I64);
        self.i64 = Some(id);
        id
    }

    pub fn float(&mut self) -> TypeInternId {
        if let Some(id) = self.float {
            return id;
        }
        let id = self.intern(Type::Float);
        self.float = Some(id);
        id
    }

    pub fn pointer(&mut self, elem: TypeInternId) -> TypeInternId {
        self.intern(Type::Pointer(elem))
    }

    pub fn array(&mut self, elem: TypeInternId, len: u32) -> TypeInternId {
        self.intern(Type::Array(elem, len))
    }

    pub fn func(&mut self, ret: TypeInternId, params: Vec<TypeInternId>) -> TypeInternId {
        let key = (ret, params.clone());
        let func_key = if let Some(&k) = self.func_lookup.get(&key) {
            k
        } else {
            let k = FuncTypeKey(self.func_types.len() as u32);
            self.func_types.push(FuncTypeData { ret, params });
            self.func_lookup.insert(key, k);
            k
        };
        self.intern(Type::Func(ret, func_key))
    }

    pub fn get(&self, id: TypeInternId) -> Type {
        self.types[id.index()]
    }

    pub fn func_parts(&self, key: FuncTypeKey) -> (TypeInternId, &[TypeInternId]) {
        let data = &self.func_types[key.0 as usize];
        (data.ret, &data.params)
    }

    /// Unwraps one level of pointer indirection. Panics if `id` is not a
    /// pointer type — callers (GEP typing, alloca, load/store) know the
    /// operand is a pointer by construction.
    pub fn pointee(&self, id: TypeInternId) -> TypeInternId {
        match self.get(id) {
            Type::Pointer(elem) => elem,
            other => panic!("pointee() on non-pointer type {other:?}"),
        }
    }

    pub fn is_base_type(&self, id: TypeInternId) -> bool {
        matches!(self.get(id), Type::Int { .. } | Type::I64 | Type::Float)
    }

    pub fn is_int_like(&self, id: TypeInternId) -> bool {
        matches!(self.get(id), Type::Int { .. } | Type::I64)
    }

    pub fn display(&self, id: TypeInternId) -> String {
        match self.get(id) {
            Type::Void => "void".to_string(),
            Type::Label => "label".to_string(),
            Type::Int { bits: 1 } => "i1".to_string(),
            Type::Int { bits } => format!("i{bits}"),
            Type::I64 => "i64".to_string(),
            Type::Float => "float".to_string(),
            Type::Pointer(e) => format!("{}*", self.display(e)),
            Type::Array(e, n) => format!("[{} x {}]", n, self.display(e)),
            Type::Func(ret, key) => {
                let (_, params) = self.func_parts(key);
                let params: Vec<_> = params.iter().map(|p| self.display(*p)).collect();
                format!("{}({})", self.display(ret), params.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_interning_shares_identity() {
        let mut t = TypeInterner::new();
        let i32_ty = t.i32();
        let a = t.pointer(i32_ty);
        let i32_again = t.i32();
        let b = t.pointer(i32_again);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_shapes_get_distinct_ids() {
        let mut t = TypeInterner::new();
        let i32_ty = t.i32();
        let i64_ty = t.i64();
        assert_ne!(i32_ty, i64_ty);
        let arr1 = t.array(i32_ty, 4);
        let arr2 = t.array(i32_ty, 5);
        assert_ne!(arr1, arr2);
    }
}
