/// Debug pretty-printer for IR subtrees.
///
/// Not a VHDL renderer; an indented structural dump for tests and
/// debugging, one node per line:
///
///   process 'delayed_sig_driver'
///     signal assignment
///       reference 'delayed_sig' -> signal declaration
///       waveform element
///         reference 'sig' -> signal declaration

use std::fmt::Write;

use crate::kind::Kind;
use crate::tree::{Arena, LitValue, NodeId};
use crate::walk;

pub fn dump(arena: &Arena, root: NodeId) -> String {
    let mut out = String::new();
    // Stamp reachable nodes so sharing renders as a back-reference line
    // instead of recursing forever.
    let mut seen = std::collections::HashSet::new();
    dump_node(arena, root, 0, &mut seen, &mut out);
    out
}

fn describe(arena: &Arena, n: NodeId) -> String {
    let kind = arena.kind(n);
    let mut line = kind.name().to_string();
    if crate::kind::has_slot(kind, crate::kind::Slot::Ident) && arena.has_ident(n) {
        let _ = write!(line, " '{}'", arena.ident(n));
    }
    if kind == Kind::Literal {
        match arena.literal(n) {
            LitValue::Int(v) => {
                let _ = write!(line, " {}", v);
            }
            LitValue::Real(v) => {
                let _ = write!(line, " {}", v);
            }
            LitValue::Phys(v) => {
                let _ = write!(line, " {} (physical)", v);
            }
            LitValue::Str(s) => {
                let _ = write!(line, " \"{}\"", s);
            }
            LitValue::Null => line.push_str(" null"),
        }
    }
    if kind == Kind::Ref && arena.has_ref(n) {
        let _ = write!(line, " -> {}", arena.kind(arena.reference(n)).name());
    }
    let flags = arena.flags(n);
    if !flags.is_empty() {
        let _ = write!(line, " [{:?}]", flags);
    }
    line
}

fn dump_node(
    arena: &Arena,
    n: NodeId,
    depth: usize,
    seen: &mut std::collections::HashSet<NodeId>,
    out: &mut String,
) {
    let _ = writeln!(out, "{:indent$}{}", "", describe(arena, n), indent = depth * 2);
    if !seen.insert(n) {
        let _ = writeln!(out, "{:indent$}(shared)", "", indent = (depth + 1) * 2);
        return;
    }
    for child in walk::visible_children(arena, n) {
        dump_node(arena, child, depth + 1, seen, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::intern;
    use crate::loc::Loc;

    #[test]
    fn dump_renders_structure_and_sharing() {
        let mut a = Arena::new();
        let lit = a.new_node(Kind::Literal, Loc::invalid());
        a.set_literal(lit, LitValue::Int(5));
        let w1 = a.new_node(Kind::Waveform, Loc::invalid());
        a.set_value(w1, lit);
        let w2 = a.new_node(Kind::Waveform, Loc::invalid());
        a.set_value(w2, lit);
        let assign = a.new_node(Kind::SignalAssign, Loc::invalid());
        a.add_waveform(assign, w1);
        a.add_waveform(assign, w2);
        let proc = a.new_node(Kind::Process, Loc::invalid());
        a.set_ident(proc, intern("p"));
        a.add_stmt(proc, assign);

        let text = dump(&a, proc);
        assert!(text.contains("process 'p'"));
        assert!(text.contains("literal 5"));
        assert!(text.contains("(shared)"));
    }
}
