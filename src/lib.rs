/// Velab — VHDL front-end core.
///
/// Module layout:
///   - conf      — configuration property registry
///   - ident     — interned identifiers
///   - loc       — packed source locations, file registry, persistence
///   - fbuf      — byte-stream abstraction for serialized artifacts
///   - ttype     — type records attached to nodes
///   - kind      — node kinds, slot legality table, flags
///   - tree      — the node arena and slot accessors
///   - walk      — visit / rewrite / deep copy
///   - gc        — mark-and-sweep reclamation over the arena
///   - serialize — tree and type round-trip serialization
///   - diag      — diagnostic engine with source-context rendering
///   - lower     — thunk compiler for constant folding
///   - eval      — the constant-fold evaluator
///   - simp      — the local/global simplification pass
///   - dump      — debug pretty-printer for IR subtrees
///
/// The parser and semantic analyzer that produce and annotate the IR are
/// external; this crate owns the tree, the diagnostics, and the
/// simplification that lowers concurrent constructs toward a
/// simulation-ready form.

// ── Foundation ───────────────────────────────────────────────────────────────
pub mod conf;
pub mod fbuf;
pub mod ident;
pub mod loc;

// ── Tree IR ──────────────────────────────────────────────────────────────────
pub mod gc;
pub mod kind;
pub mod serialize;
pub mod tree;
pub mod ttype;
pub mod walk;

// ── Diagnostics ──────────────────────────────────────────────────────────────
pub mod diag;

// ── Simplification ───────────────────────────────────────────────────────────
pub mod dump;
pub mod eval;
pub mod lower;
pub mod simp;

// ── Re-exports for convenience ───────────────────────────────────────────────
pub use conf::Conf;
pub use diag::{Diag, Level, Reporter};
pub use ident::{intern, Ident};
pub use kind::{Class, Flags, Kind, PortMode, RangeKind};
pub use loc::{FileRef, Loc, SourceMap};
pub use simp::{simplify_global, simplify_local};
pub use tree::{Arena, Assoc, AssocSel, AttrVal, LitValue, NodeId};
pub use ttype::{TypeId, TypeKind};
pub use walk::{copy, rewrite, structurally_equal, visit, visit_only, Rewriter};
