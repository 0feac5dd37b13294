/// The tree IR node store.
///
/// Nodes live in an `Arena` and are addressed by `NodeId`. The graph is
/// directed with sharing: a declaration is referenced from many uses
/// through the `ref` slot, and there are no parent pointers. Reclamation
/// is mark-and-sweep (`gc` module); swept slots are recycled through a
/// free list, so live ids stay stable across collections.
///
/// Every accessor asserts the slot legality table in `kind`. A failing
/// assert is a program bug in the caller, never a user error.

use crate::ident::Ident;
use crate::kind::{has_slot, Class, Flags, Kind, PortMode, RangeKind, Slot};
use crate::loc::Loc;
use crate::ttype::{TypeId, TypeTable};

/// Maximum number of auxiliary attributes per node.
pub const MAX_ATTRS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

// ---------------------------------------------------------------------------
// Slot payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum LitValue {
    Int(i64),
    Real(f64),
    /// A physical literal scaled to the base unit.
    Phys(i64),
    Str(String),
    Null,
}

/// Association element, shared between call parameter lists, generic
/// maps, and aggregate/case choices. Parameter lists never use `Others`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssocSel {
    Pos(u32),
    Named(NodeId),
    Range(NodeId),
    Others,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assoc {
    pub sel: AssocSel,
    pub value: NodeId,
}

impl Assoc {
    pub fn pos(pos: u32, value: NodeId) -> Assoc {
        Assoc { sel: AssocSel::Pos(pos), value }
    }

    pub fn named(name: NodeId, value: NodeId) -> Assoc {
        Assoc { sel: AssocSel::Named(name), value }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrVal {
    Int(i64),
    Str(String),
    Node(NodeId),
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) kind: Kind,
    pub(crate) loc: Loc,
    pub(crate) generation: u32,

    pub(crate) ident: Option<Ident>,
    pub(crate) ident2: Option<Ident>,
    pub(crate) ty: Option<TypeId>,

    pub(crate) ports: Vec<NodeId>,
    pub(crate) generics: Vec<NodeId>,
    pub(crate) decls: Vec<NodeId>,
    pub(crate) stmts: Vec<NodeId>,
    pub(crate) else_stmts: Vec<NodeId>,
    pub(crate) triggers: Vec<NodeId>,
    pub(crate) waveforms: Vec<NodeId>,
    pub(crate) drivers: Vec<NodeId>,
    pub(crate) contexts: Vec<NodeId>,

    pub(crate) params: Vec<Assoc>,
    pub(crate) genmaps: Vec<Assoc>,
    pub(crate) assocs: Vec<Assoc>,

    pub(crate) target: Option<NodeId>,
    pub(crate) value: Option<NodeId>,
    pub(crate) delay: Option<NodeId>,
    pub(crate) reject: Option<NodeId>,
    pub(crate) message: Option<NodeId>,
    pub(crate) severity: Option<NodeId>,
    pub(crate) guard: Option<NodeId>,
    pub(crate) reference: Option<NodeId>,
    pub(crate) name: Option<NodeId>,
    pub(crate) range: Option<NodeId>,
    pub(crate) left: Option<NodeId>,
    pub(crate) right: Option<NodeId>,

    pub(crate) literal: Option<LitValue>,
    pub(crate) range_kind: Option<RangeKind>,
    pub(crate) port_mode: Option<PortMode>,
    pub(crate) class: Option<Class>,

    pub(crate) flags: Flags,
    pub(crate) attrs: Vec<(Ident, AttrVal)>,
}

impl Node {
    fn new(kind: Kind, loc: Loc) -> Node {
        Node {
            kind,
            loc,
            generation: 0,
            ident: None,
            ident2: None,
            ty: None,
            ports: Vec::new(),
            generics: Vec::new(),
            decls: Vec::new(),
            stmts: Vec::new(),
            else_stmts: Vec::new(),
            triggers: Vec::new(),
            waveforms: Vec::new(),
            drivers: Vec::new(),
            contexts: Vec::new(),
            params: Vec::new(),
            genmaps: Vec::new(),
            assocs: Vec::new(),
            target: None,
            value: None,
            delay: None,
            reject: None,
            message: None,
            severity: None,
            guard: None,
            reference: None,
            name: None,
            range: None,
            left: None,
            right: None,
            literal: None,
            range_kind: None,
            port_mode: None,
            class: None,
            flags: Flags::default(),
            attrs: Vec::new(),
        }
    }

    /// Slots currently holding data, for the `change_kind` legality check.
    fn populated_slots(&self) -> Vec<Slot> {
        let mut out = Vec::new();
        let mut seq = |v: &Vec<NodeId>, s: Slot, out: &mut Vec<Slot>| {
            if !v.is_empty() {
                out.push(s);
            }
        };
        if self.ident.is_some() {
            out.push(Slot::Ident);
        }
        if self.ident2.is_some() {
            out.push(Slot::Ident2);
        }
        if self.ty.is_some() {
            out.push(Slot::Type);
        }
        seq(&self.ports, Slot::Ports, &mut out);
        seq(&self.generics, Slot::Generics, &mut out);
        seq(&self.decls, Slot::Decls, &mut out);
        seq(&self.stmts, Slot::Stmts, &mut out);
        seq(&self.else_stmts, Slot::ElseStmts, &mut out);
        seq(&self.triggers, Slot::Triggers, &mut out);
        seq(&self.waveforms, Slot::Waveforms, &mut out);
        seq(&self.drivers, Slot::Drivers, &mut out);
        seq(&self.contexts, Slot::Contexts, &mut out);
        if !self.params.is_empty() {
            out.push(Slot::Params);
        }
        if !self.genmaps.is_empty() {
            out.push(Slot::Genmaps);
        }
        if !self.assocs.is_empty() {
            out.push(Slot::Assocs);
        }
        let mut opt = |v: &Option<NodeId>, s: Slot, out: &mut Vec<Slot>| {
            if v.is_some() {
                out.push(s);
            }
        };
        opt(&self.target, Slot::Target, &mut out);
        opt(&self.value, Slot::Value, &mut out);
        opt(&self.delay, Slot::Delay, &mut out);
        opt(&self.reject, Slot::Reject, &mut out);
        opt(&self.message, Slot::Message, &mut out);
        opt(&self.severity, Slot::Severity, &mut out);
        opt(&self.guard, Slot::Guard, &mut out);
        opt(&self.reference, Slot::Ref, &mut out);
        opt(&self.name, Slot::Name, &mut out);
        opt(&self.range, Slot::Range, &mut out);
        opt(&self.left, Slot::Left, &mut out);
        opt(&self.right, Slot::Right, &mut out);
        if self.literal.is_some() {
            out.push(Slot::Literal);
        }
        out
    }
}

fn assert_slot(kind: Kind, slot: Slot) {
    assert!(
        has_slot(kind, slot),
        "kind {:?} has no {:?} slot",
        kind,
        slot
    );
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Arena {
    pub(crate) nodes: Vec<Option<Node>>,
    pub(crate) free: Vec<u32>,
    pub(crate) next_generation: u32,
    pub types: TypeTable,
}

impl Default for Arena {
    fn default() -> Self {
        Arena::new()
    }
}

macro_rules! seq_slot {
    ($get:ident, $add:ident, $field:ident, $slot:expr $(, $guard:expr, $why:literal)?) => {
        pub fn $get(&self, n: NodeId) -> &[NodeId] {
            let node = self.node(n);
            assert_slot(node.kind, $slot);
            &node.$field
        }

        pub fn $add(&mut self, n: NodeId, child: NodeId) {
            $(
                let guard: fn(&Arena, NodeId) -> bool = $guard;
                assert!(guard(self, child), concat!(stringify!($add), ": ", $why));
            )?
            let node = self.node_mut(n);
            assert_slot(node.kind, $slot);
            node.$field.push(child);
        }
    };
}

macro_rules! opt_slot {
    ($get:ident, $set:ident, $has:ident, $field:ident, $slot:expr $(, $guard:expr, $why:literal)?) => {
        pub fn $get(&self, n: NodeId) -> NodeId {
            let node = self.node(n);
            assert_slot(node.kind, $slot);
            node.$field
                .unwrap_or_else(|| panic!(concat!(stringify!($get), " not set on {:?}"), node.kind))
        }

        pub fn $has(&self, n: NodeId) -> bool {
            let node = self.node(n);
            assert_slot(node.kind, $slot);
            node.$field.is_some()
        }

        pub fn $set(&mut self, n: NodeId, v: NodeId) {
            $(
                let guard: fn(&Arena, NodeId) -> bool = $guard;
                assert!(guard(self, v), concat!(stringify!($set), ": ", $why));
            )?
            let node = self.node_mut(n);
            assert_slot(node.kind, $slot);
            node.$field = Some(v);
        }
    };
}

impl Arena {
    pub fn new() -> Self {
        Arena {
            nodes: Vec::new(),
            free: Vec::new(),
            next_generation: 1,
            types: TypeTable::new(),
        }
    }

    pub fn new_node(&mut self, kind: Kind, loc: Loc) -> NodeId {
        let node = Node::new(kind, loc);
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx as usize] = Some(node);
                NodeId(idx)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId((self.nodes.len() - 1) as u32)
            }
        }
    }

    pub(crate) fn node(&self, n: NodeId) -> &Node {
        self.nodes[n.0 as usize]
            .as_ref()
            .expect("stale node reference")
    }

    pub(crate) fn node_mut(&mut self, n: NodeId) -> &mut Node {
        self.nodes[n.0 as usize]
            .as_mut()
            .expect("stale node reference")
    }

    pub fn is_live(&self, n: NodeId) -> bool {
        self.nodes
            .get(n.0 as usize)
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub(crate) fn new_generation(&mut self) -> u32 {
        let g = self.next_generation;
        self.next_generation += 1;
        g
    }

    // -----------------------------------------------------------------------
    // Kind and location
    // -----------------------------------------------------------------------

    pub fn kind(&self, n: NodeId) -> Kind {
        self.node(n).kind
    }

    /// Change a node's kind in place. Used only by late passes; every
    /// populated slot must remain legal under the new kind.
    pub fn change_kind(&mut self, n: NodeId, kind: Kind) {
        let node = self.node_mut(n);
        for slot in node.populated_slots() {
            assert!(
                has_slot(kind, slot),
                "change_kind: {:?} slot not legal for {:?}",
                slot,
                kind
            );
        }
        node.kind = kind;
    }

    pub fn loc(&self, n: NodeId) -> Loc {
        self.node(n).loc
    }

    pub fn set_loc(&mut self, n: NodeId, loc: Loc) {
        self.node_mut(n).loc = loc;
    }

    // -----------------------------------------------------------------------
    // Identifiers
    // -----------------------------------------------------------------------

    pub fn ident(&self, n: NodeId) -> Ident {
        let node = self.node(n);
        assert_slot(node.kind, Slot::Ident);
        node.ident
            .unwrap_or_else(|| panic!("ident not set on {:?}", node.kind))
    }

    pub fn has_ident(&self, n: NodeId) -> bool {
        let node = self.node(n);
        assert_slot(node.kind, Slot::Ident);
        node.ident.is_some()
    }

    pub fn set_ident(&mut self, n: NodeId, id: Ident) {
        let node = self.node_mut(n);
        assert_slot(node.kind, Slot::Ident);
        node.ident = Some(id);
    }

    pub fn ident2(&self, n: NodeId) -> Ident {
        let node = self.node(n);
        assert_slot(node.kind, Slot::Ident2);
        node.ident2
            .unwrap_or_else(|| panic!("ident2 not set on {:?}", node.kind))
    }

    pub fn set_ident2(&mut self, n: NodeId, id: Ident) {
        let node = self.node_mut(n);
        assert_slot(node.kind, Slot::Ident2);
        node.ident2 = Some(id);
    }

    // -----------------------------------------------------------------------
    // Attached type
    // -----------------------------------------------------------------------

    pub fn type_of(&self, n: NodeId) -> TypeId {
        let node = self.node(n);
        assert_slot(node.kind, Slot::Type);
        node.ty
            .unwrap_or_else(|| panic!("type not set on {:?}", node.kind))
    }

    pub fn has_type(&self, n: NodeId) -> bool {
        let node = self.node(n);
        assert_slot(node.kind, Slot::Type);
        node.ty.is_some()
    }

    pub fn set_type(&mut self, n: NodeId, ty: TypeId) {
        assert_slot(self.node(n).kind, Slot::Type);
        if let Some(old) = self.node(n).ty {
            self.types.release(old);
        }
        self.types.attach(ty);
        self.node_mut(n).ty = Some(ty);
    }

    // -----------------------------------------------------------------------
    // Sequence slots
    // -----------------------------------------------------------------------

    seq_slot!(ports, add_port, ports, Slot::Ports,
        |a, c| a.kind(c) == Kind::PortDecl, "only interface declarations");
    seq_slot!(generics, add_generic, generics, Slot::Generics,
        |a, c| a.kind(c) == Kind::PortDecl, "only interface declarations");
    seq_slot!(decls, add_decl, decls, Slot::Decls,
        |a, c| a.kind(c).is_decl() || a.kind(c) == Kind::UseClause, "only declarations");
    seq_slot!(stmts, add_stmt, stmts, Slot::Stmts,
        |a, c| a.kind(c).is_stmt(), "only statements");
    seq_slot!(else_stmts, add_else_stmt, else_stmts, Slot::ElseStmts,
        |a, c| a.kind(c).is_stmt(), "only statements");
    seq_slot!(triggers, add_trigger, triggers, Slot::Triggers,
        |a, c| a.kind(c).is_expr(), "only expressions");
    seq_slot!(waveforms, add_waveform, waveforms, Slot::Waveforms,
        |a, c| a.kind(c) == Kind::Waveform, "only waveform elements");
    seq_slot!(drivers, add_driver, drivers, Slot::Drivers);
    seq_slot!(contexts, add_context, contexts, Slot::Contexts,
        |a, c| a.kind(c) == Kind::UseClause, "only context items");

    // -----------------------------------------------------------------------
    // Association lists
    // -----------------------------------------------------------------------

    pub fn params(&self, n: NodeId) -> &[Assoc] {
        let node = self.node(n);
        assert_slot(node.kind, Slot::Params);
        &node.params
    }

    pub fn add_param(&mut self, n: NodeId, assoc: Assoc) {
        assert!(
            !matches!(assoc.sel, AssocSel::Others),
            "add_param: others association not legal in a parameter list"
        );
        let node = self.node_mut(n);
        assert_slot(node.kind, Slot::Params);
        node.params.push(assoc);
    }

    pub fn set_params(&mut self, n: NodeId, params: Vec<Assoc>) {
        assert!(
            params.iter().all(|p| !matches!(p.sel, AssocSel::Others)),
            "set_params: others association not legal in a parameter list"
        );
        let node = self.node_mut(n);
        assert_slot(node.kind, Slot::Params);
        node.params = params;
    }

    pub fn genmaps(&self, n: NodeId) -> &[Assoc] {
        let node = self.node(n);
        assert_slot(node.kind, Slot::Genmaps);
        &node.genmaps
    }

    pub fn add_genmap(&mut self, n: NodeId, assoc: Assoc) {
        let node = self.node_mut(n);
        assert_slot(node.kind, Slot::Genmaps);
        node.genmaps.push(assoc);
    }

    pub fn assocs(&self, n: NodeId) -> &[Assoc] {
        let node = self.node(n);
        assert_slot(node.kind, Slot::Assocs);
        &node.assocs
    }

    pub fn add_assoc(&mut self, n: NodeId, assoc: Assoc) {
        let node = self.node_mut(n);
        assert_slot(node.kind, Slot::Assocs);
        node.assocs.push(assoc);
    }

    // -----------------------------------------------------------------------
    // Singleton children
    // -----------------------------------------------------------------------

    opt_slot!(target, set_target, has_target, target, Slot::Target,
        |a, v| a.kind(v).is_expr(), "only expressions");
    opt_slot!(value, set_value, has_value, value, Slot::Value);
    opt_slot!(delay, set_delay, has_delay, delay, Slot::Delay,
        |a, v| a.kind(v).is_expr(), "only expressions");
    opt_slot!(reject, set_reject, has_reject, reject, Slot::Reject,
        |a, v| a.kind(v).is_expr(), "only expressions");
    opt_slot!(message, set_message, has_message, message, Slot::Message,
        |a, v| a.kind(v).is_expr(), "only expressions");
    opt_slot!(severity, set_severity, has_severity, severity, Slot::Severity,
        |a, v| a.kind(v).is_expr(), "only expressions");
    opt_slot!(guard, set_guard, has_guard, guard, Slot::Guard,
        |a, v| a.kind(v).is_expr(), "only expressions");
    opt_slot!(reference, set_ref, has_ref, reference, Slot::Ref,
        |a, v| a.kind(v).is_ref_target(), "only declarations and top-level units");
    opt_slot!(name, set_name, has_name, name, Slot::Name,
        |a, v| a.kind(v).is_expr(), "only expressions");
    opt_slot!(range, set_range, has_range, range, Slot::Range,
        |a, v| a.kind(v) == Kind::Range, "only range nodes");
    opt_slot!(left, set_left, has_left, left, Slot::Left);
    opt_slot!(right, set_right, has_right, right, Slot::Right);

    // -----------------------------------------------------------------------
    // Literal, subkinds, flags, attributes
    // -----------------------------------------------------------------------

    pub fn literal(&self, n: NodeId) -> &LitValue {
        let node = self.node(n);
        assert_slot(node.kind, Slot::Literal);
        node.literal
            .as_ref()
            .unwrap_or_else(|| panic!("literal not set on {:?}", node.kind))
    }

    pub fn set_literal(&mut self, n: NodeId, lit: LitValue) {
        let node = self.node_mut(n);
        assert_slot(node.kind, Slot::Literal);
        node.literal = Some(lit);
    }

    pub fn range_kind(&self, n: NodeId) -> RangeKind {
        let node = self.node(n);
        assert_eq!(node.kind, Kind::Range, "range_kind on non-range node");
        node.range_kind.expect("range direction not set")
    }

    pub fn set_range_kind(&mut self, n: NodeId, rk: RangeKind) {
        let node = self.node_mut(n);
        assert_eq!(node.kind, Kind::Range, "set_range_kind on non-range node");
        node.range_kind = Some(rk);
    }

    pub fn port_mode(&self, n: NodeId) -> PortMode {
        let node = self.node(n);
        assert_eq!(node.kind, Kind::PortDecl, "port_mode on non-interface node");
        node.port_mode.expect("port mode not set")
    }

    pub fn set_port_mode(&mut self, n: NodeId, mode: PortMode) {
        let node = self.node_mut(n);
        assert_eq!(node.kind, Kind::PortDecl, "set_port_mode on non-interface node");
        node.port_mode = Some(mode);
    }

    pub fn class(&self, n: NodeId) -> Class {
        let node = self.node(n);
        assert_eq!(node.kind, Kind::PortDecl, "class on non-interface node");
        node.class.expect("object class not set")
    }

    pub fn set_class(&mut self, n: NodeId, class: Class) {
        let node = self.node_mut(n);
        assert_eq!(node.kind, Kind::PortDecl, "set_class on non-interface node");
        node.class = Some(class);
    }

    pub fn flags(&self, n: NodeId) -> Flags {
        self.node(n).flags
    }

    /// Set flag bits. Flags are monotone; there is no clearing API.
    pub fn set_flag(&mut self, n: NodeId, flags: Flags) {
        self.node_mut(n).flags |= flags;
    }

    pub fn has_flag(&self, n: NodeId, flags: Flags) -> bool {
        self.node(n).flags.contains(flags)
    }

    pub fn attr(&self, n: NodeId, name: Ident) -> Option<&AttrVal> {
        self.node(n)
            .attrs
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    pub fn set_attr(&mut self, n: NodeId, name: Ident, value: AttrVal) {
        let node = self.node_mut(n);
        if let Some(slot) = node.attrs.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
            return;
        }
        assert!(node.attrs.len() < MAX_ATTRS, "attribute table full");
        node.attrs.push((name, value));
    }

    // -----------------------------------------------------------------------
    // Common queries
    // -----------------------------------------------------------------------

    /// The integer value of a folded expression, when it is one.
    pub fn folded_int(&self, n: NodeId) -> Option<i64> {
        if self.kind(n) != Kind::Literal {
            return None;
        }
        match self.literal(n) {
            LitValue::Int(v) | LitValue::Phys(v) => Some(*v),
            _ => None,
        }
    }

    pub fn folded_real(&self, n: NodeId) -> Option<f64> {
        if self.kind(n) != Kind::Literal {
            return None;
        }
        match self.literal(n) {
            LitValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// A folded boolean: a reference to one of the two literals of an
    /// enumeration type named `boolean`.
    pub fn folded_bool(&self, n: NodeId) -> Option<bool> {
        if self.kind(n) != Kind::Ref || !self.has_ref(n) {
            return None;
        }
        let decl = self.reference(n);
        if self.kind(decl) != Kind::EnumLit || !self.has_type(decl) {
            return None;
        }
        let ty = self.type_of(decl);
        if !self.types.get(self.types.base_of(ty)).ident.eq_ignore_case("boolean") {
            return None;
        }
        match self.literal(decl) {
            LitValue::Int(pos) => Some(*pos != 0),
            _ => None,
        }
    }

    /// The enumeration position of a literal reference.
    pub fn folded_enum(&self, n: NodeId) -> Option<i64> {
        if self.kind(n) != Kind::Ref || !self.has_ref(n) {
            return None;
        }
        let decl = self.reference(n);
        if self.kind(decl) != Kind::EnumLit {
            return None;
        }
        match self.literal(decl) {
            LitValue::Int(pos) => Some(*pos),
            _ => None,
        }
    }
}
