/// Structural traversal, rewriting, and deep copy.
///
/// All three walks share the same canonical child order and use the
/// per-node generation counter for O(1) idempotence: a traversal takes a
/// fresh generation, stamps every node it touches, and skips nodes already
/// stamped. Nested traversals started from inside a rewrite callback must
/// not rely on generation bits (they would collide with the active walk).

use std::collections::{HashMap, HashSet};

use crate::kind::Kind;
use crate::ttype::{TypeId, TypeKind};
use crate::tree::{Arena, AssocSel, AttrVal, NodeId};

// ---------------------------------------------------------------------------
// Child enumeration
// ---------------------------------------------------------------------------

/// Collect the children of `n` in canonical order. `deep` additionally
/// follows the `ref` edge and the contents of the attached type; it is
/// used only by the garbage collector.
fn children(arena: &Arena, n: NodeId, deep: bool) -> Vec<NodeId> {
    let node = arena.node(n);
    let mut out = Vec::new();

    for seq in [
        &node.ports,
        &node.generics,
        &node.decls,
        &node.triggers,
        &node.stmts,
        &node.else_stmts,
        &node.waveforms,
        &node.drivers,
        &node.contexts,
    ] {
        out.extend_from_slice(seq);
    }

    for opt in [
        node.target,
        node.value,
        node.delay,
        node.reject,
        node.message,
        node.severity,
        node.guard,
        node.name,
        node.left,
        node.right,
        node.range,
    ] {
        if let Some(c) = opt {
            out.push(c);
        }
    }

    for list in [&node.params, &node.genmaps, &node.assocs] {
        for assoc in list.iter() {
            match assoc.sel {
                AssocSel::Named(sel) | AssocSel::Range(sel) => out.push(sel),
                _ => {}
            }
            out.push(assoc.value);
        }
    }

    for (_, attr) in &node.attrs {
        if let AttrVal::Node(c) = attr {
            out.push(*c);
        }
    }

    if deep {
        if let Some(r) = node.reference {
            out.push(r);
        }
        if let Some(ty) = node.ty {
            type_nodes(arena, ty, &mut out);
        }
    }

    out
}

/// The non-deep child list, for the debug dumper.
pub(crate) fn visible_children(arena: &Arena, n: NodeId) -> Vec<NodeId> {
    children(arena, n, false)
}

/// Tree nodes reachable through a type record: constraint ranges, unit
/// and enumeration literal declarations, record fields.
fn type_nodes(arena: &Arena, ty: TypeId, out: &mut Vec<NodeId>) {
    match &arena.types.get(ty).kind {
        TypeKind::Integer { dims } | TypeKind::Real { dims } => out.extend_from_slice(dims),
        TypeKind::Physical { dims, units } => {
            out.extend_from_slice(dims);
            out.extend_from_slice(units);
        }
        TypeKind::Enum { literals } => out.extend_from_slice(literals),
        TypeKind::Array { index, elem, dims } => {
            out.extend_from_slice(dims);
            for &ix in index {
                type_nodes(arena, ix, out);
            }
            type_nodes(arena, *elem, out);
        }
        TypeKind::Record { fields } => out.extend_from_slice(fields),
        TypeKind::Subtype { base, dims } => {
            out.extend_from_slice(dims);
            type_nodes(arena, *base, out);
        }
        TypeKind::Incomplete => {}
    }
}

// ---------------------------------------------------------------------------
// Visit
// ---------------------------------------------------------------------------

/// Depth-first walk invoking `f` on every reachable node once, children
/// before parents.
pub fn visit(arena: &mut Arena, root: NodeId, f: &mut dyn FnMut(&Arena, NodeId)) {
    let gen = arena.new_generation();
    visit_node(arena, root, None, false, gen, f);
}

/// Like `visit` but `f` fires only on nodes of `only`; the walk still
/// descends through everything.
pub fn visit_only(
    arena: &mut Arena,
    root: NodeId,
    only: Kind,
    f: &mut dyn FnMut(&Arena, NodeId),
) {
    let gen = arena.new_generation();
    visit_node(arena, root, Some(only), false, gen, f);
}

/// Deep mark for the garbage collector: stamp every node reachable from
/// `root`, following `ref` edges and type contents, reusing `gen` so
/// multiple roots share one marking pass.
pub(crate) fn mark_deep(arena: &mut Arena, root: NodeId, gen: u32) {
    visit_node(arena, root, None, true, gen, &mut |_, _| {});
}

fn visit_node(
    arena: &mut Arena,
    n: NodeId,
    only: Option<Kind>,
    deep: bool,
    gen: u32,
    f: &mut dyn FnMut(&Arena, NodeId),
) {
    if arena.node(n).generation == gen {
        return;
    }
    arena.node_mut(n).generation = gen;

    for child in children(arena, n, deep) {
        visit_node(arena, child, only, deep, gen, f);
    }

    if only.map_or(true, |k| arena.kind(n) == k) {
        f(arena, n);
    }
}

// ---------------------------------------------------------------------------
// Rewrite
// ---------------------------------------------------------------------------

/// A post-order rewriting pass. `pre` fires on descent (scope
/// establishment); `post` replaces the node in its parent. Returning
/// `None` deletes the node from a sequence slot or clears a singleton.
pub trait Rewriter {
    fn pre(&mut self, _arena: &mut Arena, _n: NodeId) {}
    fn post(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId>;
}

/// Rewrite the graph under `root` bottom-up. Shared nodes are rewritten
/// once; later encounters reuse the first result. Types are not
/// rewritten, and `ref` edges are not followed.
pub fn rewrite<R: Rewriter>(arena: &mut Arena, root: NodeId, rw: &mut R) -> Option<NodeId> {
    let gen = arena.new_generation();
    let mut cache: HashMap<NodeId, Option<NodeId>> = HashMap::new();
    rewrite_node(arena, root, gen, &mut cache, rw)
}

fn rewrite_node<R: Rewriter>(
    arena: &mut Arena,
    n: NodeId,
    gen: u32,
    cache: &mut HashMap<NodeId, Option<NodeId>>,
    rw: &mut R,
) -> Option<NodeId> {
    if arena.node(n).generation == gen {
        return *cache.get(&n).unwrap_or(&Some(n));
    }
    arena.node_mut(n).generation = gen;

    rw.pre(arena, n);

    macro_rules! seq {
        ($field:ident) => {{
            let items = std::mem::take(&mut arena.node_mut(n).$field);
            let rewritten: Vec<NodeId> = items
                .into_iter()
                .filter_map(|c| rewrite_node(arena, c, gen, cache, rw))
                .collect();
            arena.node_mut(n).$field = rewritten;
        }};
    }
    macro_rules! opt {
        ($field:ident) => {{
            if let Some(c) = arena.node(n).$field {
                let r = rewrite_node(arena, c, gen, cache, rw);
                arena.node_mut(n).$field = r;
            }
        }};
    }

    seq!(ports);
    seq!(generics);
    seq!(decls);
    seq!(triggers);
    seq!(stmts);
    seq!(else_stmts);
    seq!(waveforms);
    seq!(drivers);
    seq!(contexts);

    opt!(target);
    opt!(value);
    opt!(delay);
    opt!(reject);
    opt!(message);
    opt!(severity);
    opt!(guard);
    opt!(name);
    opt!(left);
    opt!(right);
    opt!(range);

    macro_rules! assoc_list {
        ($field:ident) => {{
            let items = std::mem::take(&mut arena.node_mut(n).$field);
            let mut rewritten = Vec::with_capacity(items.len());
            for mut assoc in items {
                match assoc.sel {
                    AssocSel::Named(sel) => {
                        if let Some(r) = rewrite_node(arena, sel, gen, cache, rw) {
                            assoc.sel = AssocSel::Named(r);
                        }
                    }
                    AssocSel::Range(sel) => {
                        if let Some(r) = rewrite_node(arena, sel, gen, cache, rw) {
                            assoc.sel = AssocSel::Range(r);
                        }
                    }
                    _ => {}
                }
                match rewrite_node(arena, assoc.value, gen, cache, rw) {
                    Some(v) => {
                        assoc.value = v;
                        rewritten.push(assoc);
                    }
                    // A deleted value deletes the whole element.
                    None => {}
                }
            }
            arena.node_mut(n).$field = rewritten;
        }};
    }

    assoc_list!(params);
    assoc_list!(genmaps);
    assoc_list!(assocs);

    let result = rw.post(arena, n);
    if let Some(r) = result {
        // Stamp replacements so a shared parent does not descend into
        // freshly built nodes with stale generations.
        arena.node_mut(r).generation = gen;
    }
    cache.insert(n, result);
    result
}

// ---------------------------------------------------------------------------
// Deep copy
// ---------------------------------------------------------------------------

/// Copy the subgraph under `root`. Sharing inside the subgraph is
/// preserved through an original-to-copy map; declarations reached only
/// through `ref` edges stay shared with the original. Attached types are
/// shared by handle.
pub fn copy(arena: &mut Arena, root: NodeId) -> NodeId {
    let gen = arena.new_generation();
    visit_node(arena, root, None, false, gen, &mut |_, _| {});

    let mut map: HashMap<NodeId, NodeId> = HashMap::new();
    copy_node(arena, root, gen, &mut map)
}

fn copy_node(
    arena: &mut Arena,
    n: NodeId,
    gen: u32,
    map: &mut HashMap<NodeId, NodeId>,
) -> NodeId {
    if arena.node(n).generation != gen {
        // Outside the copied subgraph: preserve by reference.
        return n;
    }
    if let Some(&c) = map.get(&n) {
        return c;
    }

    let (kind, loc) = {
        let node = arena.node(n);
        (node.kind, node.loc)
    };
    let c = arena.new_node(kind, loc);
    // Register before recursing so ref cycles back into the subgraph
    // resolve to the copy.
    map.insert(n, c);

    macro_rules! seq {
        ($field:ident) => {{
            let items = arena.node(n).$field.clone();
            let copied: Vec<NodeId> = items
                .into_iter()
                .map(|x| copy_node(arena, x, gen, map))
                .collect();
            arena.node_mut(c).$field = copied;
        }};
    }
    macro_rules! opt {
        ($field:ident) => {{
            if let Some(x) = arena.node(n).$field {
                let r = copy_node(arena, x, gen, map);
                arena.node_mut(c).$field = Some(r);
            }
        }};
    }

    seq!(ports);
    seq!(generics);
    seq!(decls);
    seq!(triggers);
    seq!(stmts);
    seq!(else_stmts);
    seq!(waveforms);
    seq!(drivers);
    seq!(contexts);

    opt!(target);
    opt!(value);
    opt!(delay);
    opt!(reject);
    opt!(message);
    opt!(severity);
    opt!(guard);
    opt!(name);
    opt!(left);
    opt!(right);
    opt!(range);
    opt!(reference);

    macro_rules! assoc_list {
        ($field:ident) => {{
            let items = arena.node(n).$field.clone();
            let copied: Vec<_> = items
                .into_iter()
                .map(|mut assoc| {
                    assoc.sel = match assoc.sel {
                        AssocSel::Named(s) => AssocSel::Named(copy_node(arena, s, gen, map)),
                        AssocSel::Range(s) => AssocSel::Range(copy_node(arena, s, gen, map)),
                        other => other,
                    };
                    assoc.value = copy_node(arena, assoc.value, gen, map);
                    assoc
                })
                .collect();
            arena.node_mut(c).$field = copied;
        }};
    }

    assoc_list!(params);
    assoc_list!(genmaps);
    assoc_list!(assocs);

    {
        let (ident, ident2, ty, literal, range_kind, port_mode, class, flags, attrs) = {
            let node = arena.node(n);
            (
                node.ident,
                node.ident2,
                node.ty,
                node.literal.clone(),
                node.range_kind,
                node.port_mode,
                node.class,
                node.flags,
                node.attrs.clone(),
            )
        };
        if let Some(ty) = ty {
            arena.types.attach(ty);
        }
        let attrs = attrs
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    AttrVal::Node(x) => AttrVal::Node(copy_node(arena, x, gen, map)),
                    other => other,
                };
                (k, v)
            })
            .collect();
        let copy = arena.node_mut(c);
        copy.ident = ident;
        copy.ident2 = ident2;
        copy.ty = ty;
        copy.literal = literal;
        copy.range_kind = range_kind;
        copy.port_mode = port_mode;
        copy.class = class;
        copy.flags = flags;
        copy.attrs = attrs;
    }

    c
}

// ---------------------------------------------------------------------------
// Structural equality
// ---------------------------------------------------------------------------

/// Compare two graphs structurally: same kinds, same slot contents, same
/// sharing shape. `ref` cycles are broken with a visited-pair set.
pub fn structurally_equal(a: &Arena, x: NodeId, b: &Arena, y: NodeId) -> bool {
    let mut seen = HashSet::new();
    eq_node(a, x, b, y, &mut seen)
}

fn eq_node(
    a: &Arena,
    x: NodeId,
    b: &Arena,
    y: NodeId,
    seen: &mut HashSet<(NodeId, NodeId)>,
) -> bool {
    if !seen.insert((x, y)) {
        return true;
    }
    let nx = a.node(x);
    let ny = b.node(y);
    if nx.kind != ny.kind
        || nx.ident != ny.ident
        || nx.ident2 != ny.ident2
        || nx.literal != ny.literal
        || nx.range_kind != ny.range_kind
        || nx.port_mode != ny.port_mode
        || nx.class != ny.class
        || nx.flags != ny.flags
    {
        return false;
    }
    match (nx.ty, ny.ty) {
        (None, None) => {}
        (Some(tx), Some(ty)) => {
            if a.types.get(tx).ident != b.types.get(ty).ident {
                return false;
            }
        }
        _ => return false,
    }

    let seqs_x = [
        &nx.ports, &nx.generics, &nx.decls, &nx.triggers, &nx.stmts, &nx.else_stmts,
        &nx.waveforms, &nx.drivers, &nx.contexts,
    ];
    let seqs_y = [
        &ny.ports, &ny.generics, &ny.decls, &ny.triggers, &ny.stmts, &ny.else_stmts,
        &ny.waveforms, &ny.drivers, &ny.contexts,
    ];
    for (sx, sy) in seqs_x.iter().zip(seqs_y.iter()) {
        if sx.len() != sy.len() {
            return false;
        }
        for (&cx, &cy) in sx.iter().zip(sy.iter()) {
            if !eq_node(a, cx, b, cy, seen) {
                return false;
            }
        }
    }

    let opts_x = [
        nx.target, nx.value, nx.delay, nx.reject, nx.message, nx.severity, nx.guard,
        nx.reference, nx.name, nx.range, nx.left, nx.right,
    ];
    let opts_y = [
        ny.target, ny.value, ny.delay, ny.reject, ny.message, ny.severity, ny.guard,
        ny.reference, ny.name, ny.range, ny.left, ny.right,
    ];
    for (ox, oy) in opts_x.iter().zip(opts_y.iter()) {
        match (ox, oy) {
            (None, None) => {}
            (Some(cx), Some(cy)) => {
                if !eq_node(a, *cx, b, *cy, seen) {
                    return false;
                }
            }
            _ => return false,
        }
    }

    for (lx, ly) in [
        (&nx.params, &ny.params),
        (&nx.genmaps, &ny.genmaps),
        (&nx.assocs, &ny.assocs),
    ] {
        if lx.len() != ly.len() {
            return false;
        }
        for (ax, ay) in lx.iter().zip(ly.iter()) {
            let sel_ok = match (ax.sel, ay.sel) {
                (AssocSel::Pos(px), AssocSel::Pos(py)) => px == py,
                (AssocSel::Named(sx), AssocSel::Named(sy)) => eq_node(a, sx, b, sy, seen),
                (AssocSel::Range(sx), AssocSel::Range(sy)) => eq_node(a, sx, b, sy, seen),
                (AssocSel::Others, AssocSel::Others) => true,
                _ => false,
            };
            if !sel_ok || !eq_node(a, ax.value, b, ay.value, seen) {
                return false;
            }
        }
    }

    true
}
