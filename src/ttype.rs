/// Type records attached to tree nodes.
///
/// Types are produced by the semantic analyzer and referenced from nodes
/// by handle. The table keeps an attach count per record so the garbage
/// collector can reclaim types orphaned by a node sweep. Range constraints
/// (`dims`) are ordinary `Range` nodes, so attribute folding and traversal
/// read them like any other tree.

use crate::ident::Ident;
use crate::tree::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub(crate) u32);

#[derive(Debug, Clone)]
pub enum TypeKind {
    Integer { dims: Vec<NodeId> },
    Real { dims: Vec<NodeId> },
    Physical { dims: Vec<NodeId>, units: Vec<NodeId> },
    Enum { literals: Vec<NodeId> },
    /// Empty `dims` means unconstrained.
    Array { index: Vec<TypeId>, elem: TypeId, dims: Vec<NodeId> },
    Record { fields: Vec<NodeId> },
    Subtype { base: TypeId, dims: Vec<NodeId> },
    Incomplete,
}

#[derive(Debug)]
pub struct TypeData {
    pub ident: Ident,
    pub kind: TypeKind,
    pub(crate) refcount: u32,
    pub(crate) generation: u32,
}

#[derive(Debug, Default)]
pub struct TypeTable {
    types: Vec<Option<TypeData>>,
}

impl TypeTable {
    pub fn new() -> Self {
        TypeTable { types: Vec::new() }
    }

    pub fn new_type(&mut self, ident: Ident, kind: TypeKind) -> TypeId {
        self.types.push(Some(TypeData {
            ident,
            kind,
            refcount: 0,
            generation: 0,
        }));
        TypeId((self.types.len() - 1) as u32)
    }

    pub fn get(&self, id: TypeId) -> &TypeData {
        self.types[id.0 as usize]
            .as_ref()
            .expect("stale type reference")
    }

    pub(crate) fn get_mut(&mut self, id: TypeId) -> &mut TypeData {
        self.types[id.0 as usize]
            .as_mut()
            .expect("stale type reference")
    }

    pub(crate) fn attach(&mut self, id: TypeId) {
        self.get_mut(id).refcount += 1;
    }

    pub(crate) fn release(&mut self, id: TypeId) {
        let data = self.get_mut(id);
        debug_assert!(data.refcount > 0, "type release underflow");
        data.refcount = data.refcount.saturating_sub(1);
    }

    /// Sweep records nobody references. Returns the number freed.
    pub(crate) fn sweep(&mut self) -> usize {
        let mut freed = 0;
        // A record referenced only from another type must stay: pin
        // directly-attached types first, then propagate through
        // type-to-type edges.
        let mut pinned = vec![false; self.types.len()];
        for (i, slot) in self.types.iter().enumerate() {
            if let Some(data) = slot {
                if data.refcount > 0 {
                    pinned[i] = true;
                }
            }
        }
        // Propagate pinning through array element / index / subtype base
        // edges until fixed point.
        loop {
            let mut changed = false;
            for i in 0..self.types.len() {
                if !pinned[i] {
                    continue;
                }
                let mark = |id: TypeId, pinned: &mut Vec<bool>, changed: &mut bool| {
                    if !pinned[id.0 as usize] {
                        pinned[id.0 as usize] = true;
                        *changed = true;
                    }
                };
                if let Some(data) = &self.types[i] {
                    match &data.kind {
                        TypeKind::Array { index, elem, .. } => {
                            for &ix in index {
                                mark(ix, &mut pinned, &mut changed);
                            }
                            mark(*elem, &mut pinned, &mut changed);
                        }
                        TypeKind::Subtype { base, .. } => {
                            mark(*base, &mut pinned, &mut changed);
                        }
                        _ => {}
                    }
                }
            }
            if !changed {
                break;
            }
        }
        for (i, slot) in self.types.iter_mut().enumerate() {
            if slot.is_some() && !pinned[i] {
                *slot = None;
                freed += 1;
            }
        }
        freed
    }

    pub fn live_count(&self) -> usize {
        self.types.iter().filter(|t| t.is_some()).count()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Resolve subtype chains to the base type.
    pub fn base_of(&self, id: TypeId) -> TypeId {
        match &self.get(id).kind {
            TypeKind::Subtype { base, .. } => self.base_of(*base),
            _ => id,
        }
    }

    pub fn is_scalar(&self, id: TypeId) -> bool {
        matches!(
            self.get(self.base_of(id)).kind,
            TypeKind::Integer { .. }
                | TypeKind::Real { .. }
                | TypeKind::Physical { .. }
                | TypeKind::Enum { .. }
        )
    }

    pub fn is_enum(&self, id: TypeId) -> bool {
        matches!(self.get(self.base_of(id)).kind, TypeKind::Enum { .. })
    }

    pub fn is_real(&self, id: TypeId) -> bool {
        matches!(self.get(self.base_of(id)).kind, TypeKind::Real { .. })
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        matches!(self.get(self.base_of(id)).kind, TypeKind::Array { .. })
    }

    pub fn is_record(&self, id: TypeId) -> bool {
        matches!(self.get(self.base_of(id)).kind, TypeKind::Record { .. })
    }

    /// An array type with no index constraint anywhere in its subtype
    /// chain.
    pub fn is_unconstrained(&self, id: TypeId) -> bool {
        match &self.get(id).kind {
            TypeKind::Subtype { base, dims } => dims.is_empty() && self.is_unconstrained(*base),
            TypeKind::Array { dims, .. } => dims.is_empty(),
            _ => false,
        }
    }

    /// The constraint ranges of a type: the nearest non-empty `dims`
    /// along the subtype chain.
    pub fn dims(&self, id: TypeId) -> &[NodeId] {
        match &self.get(id).kind {
            TypeKind::Subtype { base, dims } => {
                if dims.is_empty() {
                    self.dims(*base)
                } else {
                    dims
                }
            }
            TypeKind::Integer { dims }
            | TypeKind::Real { dims }
            | TypeKind::Physical { dims, .. }
            | TypeKind::Array { dims, .. } => dims,
            _ => &[],
        }
    }

    pub fn enum_literals(&self, id: TypeId) -> &[NodeId] {
        match &self.get(self.base_of(id)).kind {
            TypeKind::Enum { literals } => literals,
            _ => panic!("enum_literals on non-enumeration type"),
        }
    }

    pub fn elem_type(&self, id: TypeId) -> TypeId {
        match &self.get(self.base_of(id)).kind {
            TypeKind::Array { elem, .. } => *elem,
            _ => panic!("elem_type on non-array type"),
        }
    }

    pub fn index_type(&self, id: TypeId, dim: usize) -> TypeId {
        match &self.get(self.base_of(id)).kind {
            TypeKind::Array { index, .. } => index[dim],
            _ => panic!("index_type on non-array type"),
        }
    }

    pub fn record_fields(&self, id: TypeId) -> &[NodeId] {
        match &self.get(self.base_of(id)).kind {
            TypeKind::Record { fields } => fields,
            _ => panic!("record_fields on non-record type"),
        }
    }
}
