/// Tree and type serialization.
///
/// Each node is introduced by its `u16` kind ordinal; `0xFFFF` marks a
/// null child and `0xFFFE` a back-reference to an already-emitted node
/// (followed by its uleb index). Slots follow in one fixed canonical
/// order, gated by the slot legality table, so kind ordinals and slot
/// order are the whole compatibility boundary: the format is stable only
/// within a single build.
///
/// Types are interleaved in the same stream with their own index space.
/// The reader registers every node and type index before recursing into
/// its contents, which is what makes cycles through `ref` edges resolve.

use std::collections::HashMap;

use crate::fbuf::Fbuf;
use crate::ident::{intern, Ident};
use crate::kind::{has_slot, Class, Flags, Kind, PortMode, RangeKind, Slot};
use crate::loc::{LocReadCtx, LocWriteCtx, SourceMap};
use crate::ttype::{TypeId, TypeKind};
use crate::tree::{Arena, Assoc, AssocSel, AttrVal, LitValue, NodeId};

const NULL_MARK: u16 = 0xFFFF;
const BACKREF_MARK: u16 = 0xFFFE;

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

pub struct TreeWriter {
    generation: u32,
    nodes: HashMap<NodeId, u32>,
    types: HashMap<TypeId, u32>,
    loc: LocWriteCtx,
}

impl TreeWriter {
    /// Begin a write context with a fresh generation.
    pub fn new(arena: &mut Arena) -> TreeWriter {
        TreeWriter {
            generation: arena.new_generation(),
            nodes: HashMap::new(),
            types: HashMap::new(),
            loc: LocWriteCtx::new(),
        }
    }

    pub fn write(
        &mut self,
        arena: &mut Arena,
        map: &SourceMap,
        f: &mut Fbuf,
        node: Option<NodeId>,
    ) {
        let n = match node {
            None => {
                f.put_u16(NULL_MARK);
                return;
            }
            Some(n) => n,
        };

        if arena.node(n).generation == self.generation {
            let idx = self.nodes[&n];
            f.put_u16(BACKREF_MARK);
            f.put_uint(idx as u64);
            return;
        }
        arena.node_mut(n).generation = self.generation;
        let idx = self.nodes.len() as u32;
        self.nodes.insert(n, idx);

        let kind = arena.kind(n);
        f.put_u16(kind as u16);
        self.loc.write(f, map, arena.loc(n));

        if has_slot(kind, Slot::Ident) {
            put_opt_ident(f, arena.node(n).ident);
        }
        if has_slot(kind, Slot::Ident2) {
            put_opt_ident(f, arena.node(n).ident2);
        }

        macro_rules! seq {
            ($field:ident, $slot:expr) => {
                if has_slot(kind, $slot) {
                    let items = arena.node(n).$field.clone();
                    f.put_uint(items.len() as u64);
                    for c in items {
                        self.write(arena, map, f, Some(c));
                    }
                }
            };
        }
        seq!(ports, Slot::Ports);
        seq!(generics, Slot::Generics);
        seq!(decls, Slot::Decls);
        seq!(triggers, Slot::Triggers);
        seq!(stmts, Slot::Stmts);
        seq!(else_stmts, Slot::ElseStmts);
        seq!(waveforms, Slot::Waveforms);
        seq!(drivers, Slot::Drivers);

        if has_slot(kind, Slot::Type) {
            let ty = arena.node(n).ty;
            self.write_type(arena, map, f, ty);
        }

        macro_rules! single {
            ($field:ident, $slot:expr) => {
                if has_slot(kind, $slot) {
                    let child = arena.node(n).$field;
                    self.write(arena, map, f, child);
                }
            };
        }
        single!(target, Slot::Target);
        single!(value, Slot::Value);
        single!(delay, Slot::Delay);
        single!(reject, Slot::Reject);
        single!(message, Slot::Message);
        single!(severity, Slot::Severity);
        single!(guard, Slot::Guard);
        single!(reference, Slot::Ref);
        single!(name, Slot::Name);
        single!(left, Slot::Left);
        single!(right, Slot::Right);
        single!(range, Slot::Range);

        seq!(contexts, Slot::Contexts);

        macro_rules! assoc_list {
            ($field:ident, $slot:expr) => {
                if has_slot(kind, $slot) {
                    let items = arena.node(n).$field.clone();
                    f.put_uint(items.len() as u64);
                    for assoc in items {
                        self.write_assoc(arena, map, f, assoc);
                    }
                }
            };
        }
        assoc_list!(params, Slot::Params);
        assoc_list!(genmaps, Slot::Genmaps);
        assoc_list!(assocs, Slot::Assocs);

        if has_slot(kind, Slot::Literal) {
            let lit = arena.node(n).literal.clone();
            match lit {
                None => f.put_u8(0),
                Some(LitValue::Int(v)) => {
                    f.put_u8(1);
                    f.put_i64(v);
                }
                Some(LitValue::Real(v)) => {
                    f.put_u8(2);
                    f.put_f64(v);
                }
                Some(LitValue::Phys(v)) => {
                    f.put_u8(3);
                    f.put_i64(v);
                }
                Some(LitValue::Str(s)) => {
                    f.put_u8(4);
                    f.put_str(&s);
                }
                Some(LitValue::Null) => f.put_u8(5),
            }
        }

        if kind == Kind::Range {
            f.put_u8(arena.node(n).range_kind.map(|k| k as u8).unwrap_or(0xFF));
        }
        if kind == Kind::PortDecl {
            f.put_u8(arena.node(n).port_mode.map(|m| m as u8).unwrap_or(0xFF));
            f.put_u8(arena.node(n).class.map(|c| c as u8).unwrap_or(0xFF));
        }

        f.put_u32(arena.node(n).flags.bits());

        let attrs = arena.node(n).attrs.clone();
        f.put_uint(attrs.len() as u64);
        for (name, value) in attrs {
            f.put_str(name.as_str());
            match value {
                AttrVal::Int(v) => {
                    f.put_u8(0);
                    f.put_i64(v);
                }
                AttrVal::Str(s) => {
                    f.put_u8(1);
                    f.put_str(&s);
                }
                AttrVal::Node(c) => {
                    f.put_u8(2);
                    self.write(arena, map, f, Some(c));
                }
            }
        }
    }

    fn write_assoc(&mut self, arena: &mut Arena, map: &SourceMap, f: &mut Fbuf, assoc: Assoc) {
        match assoc.sel {
            AssocSel::Pos(pos) => {
                f.put_u8(0);
                f.put_uint(pos as u64);
            }
            AssocSel::Named(sel) => {
                f.put_u8(1);
                self.write(arena, map, f, Some(sel));
            }
            AssocSel::Range(sel) => {
                f.put_u8(2);
                self.write(arena, map, f, Some(sel));
            }
            AssocSel::Others => f.put_u8(3),
        }
        self.write(arena, map, f, Some(assoc.value));
    }

    fn write_type(
        &mut self,
        arena: &mut Arena,
        map: &SourceMap,
        f: &mut Fbuf,
        ty: Option<TypeId>,
    ) {
        let ty = match ty {
            None => {
                f.put_u16(NULL_MARK);
                return;
            }
            Some(ty) => ty,
        };
        if let Some(&idx) = self.types.get(&ty) {
            f.put_u16(BACKREF_MARK);
            f.put_uint(idx as u64);
            return;
        }
        let idx = self.types.len() as u32;
        self.types.insert(ty, idx);

        let (tag, ident) = {
            let data = arena.types.get(ty);
            let tag: u8 = match data.kind {
                TypeKind::Integer { .. } => 0,
                TypeKind::Real { .. } => 1,
                TypeKind::Physical { .. } => 2,
                TypeKind::Enum { .. } => 3,
                TypeKind::Array { .. } => 4,
                TypeKind::Record { .. } => 5,
                TypeKind::Subtype { .. } => 6,
                TypeKind::Incomplete => 7,
            };
            (tag, data.ident)
        };
        f.put_u16(tag as u16);
        f.put_str(ident.as_str());

        macro_rules! node_list {
            ($items:expr) => {{
                let items = $items;
                f.put_uint(items.len() as u64);
                for c in items {
                    self.write(arena, map, f, Some(c));
                }
            }};
        }

        let kind = arena.types.get(ty).kind.clone();
        match kind {
            TypeKind::Integer { dims } | TypeKind::Real { dims } => node_list!(dims),
            TypeKind::Physical { dims, units } => {
                node_list!(dims);
                node_list!(units);
            }
            TypeKind::Enum { literals } => node_list!(literals),
            TypeKind::Array { index, elem, dims } => {
                f.put_uint(index.len() as u64);
                for ix in index {
                    self.write_type(arena, map, f, Some(ix));
                }
                self.write_type(arena, map, f, Some(elem));
                node_list!(dims);
            }
            TypeKind::Record { fields } => node_list!(fields),
            TypeKind::Subtype { base, dims } => {
                self.write_type(arena, map, f, Some(base));
                node_list!(dims);
            }
            TypeKind::Incomplete => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

pub struct TreeReader {
    nodes: Vec<NodeId>,
    types: Vec<TypeId>,
    loc: LocReadCtx,
}

impl TreeReader {
    pub fn new() -> TreeReader {
        TreeReader {
            nodes: Vec::new(),
            types: Vec::new(),
            loc: LocReadCtx::new(),
        }
    }

    pub fn read(&mut self, arena: &mut Arena, map: &mut SourceMap, f: &mut Fbuf) -> Option<NodeId> {
        let tag = f.get_u16();
        if tag == NULL_MARK {
            return None;
        }
        if tag == BACKREF_MARK {
            let idx = f.get_uint() as usize;
            let n = *self
                .nodes
                .get(idx)
                .unwrap_or_else(|| panic!("{}: invalid node back-reference {}", f.file_name(), idx));
            return Some(n);
        }
        let kind = Kind::try_from(tag)
            .unwrap_or_else(|_| panic!("{}: corrupt node kind {}", f.file_name(), tag));

        let loc = self.loc.read(f, map);
        let n = arena.new_node(kind, loc);
        // Register before recursing so cycles resolve.
        self.nodes.push(n);

        if has_slot(kind, Slot::Ident) {
            arena.node_mut(n).ident = get_opt_ident(f);
        }
        if has_slot(kind, Slot::Ident2) {
            arena.node_mut(n).ident2 = get_opt_ident(f);
        }

        macro_rules! seq {
            ($field:ident, $slot:expr) => {
                if has_slot(kind, $slot) {
                    let len = f.get_uint() as usize;
                    let mut items = Vec::with_capacity(len);
                    for _ in 0..len {
                        items.push(self.read_child(arena, map, f));
                    }
                    arena.node_mut(n).$field = items;
                }
            };
        }
        seq!(ports, Slot::Ports);
        seq!(generics, Slot::Generics);
        seq!(decls, Slot::Decls);
        seq!(triggers, Slot::Triggers);
        seq!(stmts, Slot::Stmts);
        seq!(else_stmts, Slot::ElseStmts);
        seq!(waveforms, Slot::Waveforms);
        seq!(drivers, Slot::Drivers);

        if has_slot(kind, Slot::Type) {
            if let Some(ty) = self.read_type(arena, map, f) {
                arena.set_type(n, ty);
            }
        }

        macro_rules! single {
            ($field:ident, $slot:expr) => {
                if has_slot(kind, $slot) {
                    let child = self.read(arena, map, f);
                    arena.node_mut(n).$field = child;
                }
            };
        }
        single!(target, Slot::Target);
        single!(value, Slot::Value);
        single!(delay, Slot::Delay);
        single!(reject, Slot::Reject);
        single!(message, Slot::Message);
        single!(severity, Slot::Severity);
        single!(guard, Slot::Guard);
        single!(reference, Slot::Ref);
        single!(name, Slot::Name);
        single!(left, Slot::Left);
        single!(right, Slot::Right);
        single!(range, Slot::Range);

        seq!(contexts, Slot::Contexts);

        macro_rules! assoc_list {
            ($field:ident, $slot:expr) => {
                if has_slot(kind, $slot) {
                    let len = f.get_uint() as usize;
                    let mut items = Vec::with_capacity(len);
                    for _ in 0..len {
                        items.push(self.read_assoc(arena, map, f));
                    }
                    arena.node_mut(n).$field = items;
                }
            };
        }
        assoc_list!(params, Slot::Params);
        assoc_list!(genmaps, Slot::Genmaps);
        assoc_list!(assocs, Slot::Assocs);

        if has_slot(kind, Slot::Literal) {
            let lit = match f.get_u8() {
                0 => None,
                1 => Some(LitValue::Int(f.get_i64())),
                2 => Some(LitValue::Real(f.get_f64())),
                3 => Some(LitValue::Phys(f.get_i64())),
                4 => Some(LitValue::Str(f.get_str())),
                5 => Some(LitValue::Null),
                t => panic!("{}: corrupt literal tag {}", f.file_name(), t),
            };
            arena.node_mut(n).literal = lit;
        }

        if kind == Kind::Range {
            let raw = f.get_u8();
            arena.node_mut(n).range_kind = if raw == 0xFF {
                None
            } else {
                Some(RangeKind::try_from(raw).unwrap_or_else(|_| {
                    panic!("{}: corrupt range direction {}", f.file_name(), raw)
                }))
            };
        }
        if kind == Kind::PortDecl {
            let mode = f.get_u8();
            arena.node_mut(n).port_mode = if mode == 0xFF {
                None
            } else {
                Some(PortMode::try_from(mode).unwrap_or_else(|_| {
                    panic!("{}: corrupt port mode {}", f.file_name(), mode)
                }))
            };
            let class = f.get_u8();
            arena.node_mut(n).class = if class == 0xFF {
                None
            } else {
                Some(Class::try_from(class).unwrap_or_else(|_| {
                    panic!("{}: corrupt object class {}", f.file_name(), class)
                }))
            };
        }

        let bits = f.get_u32();
        arena.node_mut(n).flags = Flags::from_bits(bits)
            .unwrap_or_else(|| panic!("{}: corrupt flag bits {:#010x}", f.file_name(), bits));

        let n_attrs = f.get_uint() as usize;
        for _ in 0..n_attrs {
            let name = intern(&f.get_str());
            let value = match f.get_u8() {
                0 => AttrVal::Int(f.get_i64()),
                1 => AttrVal::Str(f.get_str()),
                2 => AttrVal::Node(self.read_child(arena, map, f)),
                t => panic!("{}: corrupt attribute tag {}", f.file_name(), t),
            };
            arena.node_mut(n).attrs.push((name, value));
        }

        Some(n)
    }

    fn read_child(&mut self, arena: &mut Arena, map: &mut SourceMap, f: &mut Fbuf) -> NodeId {
        self.read(arena, map, f)
            .unwrap_or_else(|| panic!("{}: unexpected null child", f.file_name()))
    }

    fn read_assoc(&mut self, arena: &mut Arena, map: &mut SourceMap, f: &mut Fbuf) -> Assoc {
        let sel = match f.get_u8() {
            0 => AssocSel::Pos(f.get_uint() as u32),
            1 => AssocSel::Named(self.read_child(arena, map, f)),
            2 => AssocSel::Range(self.read_child(arena, map, f)),
            3 => AssocSel::Others,
            t => panic!("{}: corrupt association tag {}", f.file_name(), t),
        };
        let value = self.read_child(arena, map, f);
        Assoc { sel, value }
    }

    fn read_type(&mut self, arena: &mut Arena, map: &mut SourceMap, f: &mut Fbuf) -> Option<TypeId> {
        let tag = f.get_u16();
        if tag == NULL_MARK {
            return None;
        }
        if tag == BACKREF_MARK {
            let idx = f.get_uint() as usize;
            let ty = *self
                .types
                .get(idx)
                .unwrap_or_else(|| panic!("{}: invalid type back-reference {}", f.file_name(), idx));
            return Some(ty);
        }

        let ident = intern(&f.get_str());
        // Register as incomplete before recursing; cycles through
        // enumeration literals resolve to this handle.
        let ty = arena.types.new_type(ident, TypeKind::Incomplete);
        self.types.push(ty);

        macro_rules! node_list {
            () => {{
                let len = f.get_uint() as usize;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.read_child(arena, map, f));
                }
                items
            }};
        }

        let kind = match tag {
            0 => TypeKind::Integer { dims: node_list!() },
            1 => TypeKind::Real { dims: node_list!() },
            2 => {
                let dims = node_list!();
                let units = node_list!();
                TypeKind::Physical { dims, units }
            }
            3 => TypeKind::Enum { literals: node_list!() },
            4 => {
                let n_index = f.get_uint() as usize;
                let mut index = Vec::with_capacity(n_index);
                for _ in 0..n_index {
                    index.push(self.read_type_child(arena, map, f));
                }
                let elem = self.read_type_child(arena, map, f);
                let dims = node_list!();
                TypeKind::Array { index, elem, dims }
            }
            5 => TypeKind::Record { fields: node_list!() },
            6 => {
                let base = self.read_type_child(arena, map, f);
                let dims = node_list!();
                TypeKind::Subtype { base, dims }
            }
            7 => TypeKind::Incomplete,
            t => panic!("{}: corrupt type kind {}", f.file_name(), t),
        };
        arena.types.get_mut(ty).kind = kind;
        Some(ty)
    }

    fn read_type_child(&mut self, arena: &mut Arena, map: &mut SourceMap, f: &mut Fbuf) -> TypeId {
        self.read_type(arena, map, f)
            .unwrap_or_else(|| panic!("{}: unexpected null type", f.file_name()))
    }
}

impl Default for TreeReader {
    fn default() -> Self {
        TreeReader::new()
    }
}

fn put_opt_ident(f: &mut Fbuf, ident: Option<Ident>) {
    match ident {
        Some(id) => {
            f.put_u8(1);
            f.put_str(id.as_str());
        }
        None => f.put_u8(0),
    }
}

fn get_opt_ident(f: &mut Fbuf) -> Option<Ident> {
    match f.get_u8() {
        0 => None,
        _ => Some(intern(&f.get_str())),
    }
}
