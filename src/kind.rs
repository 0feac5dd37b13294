/// Node kinds, slot legality, and node flags.
///
/// Every tree node has exactly one `Kind`, fixed at creation. Each kind
/// permits a declared subset of slots; `has_slot` is the authoritative
/// legality table and every accessor in `tree` asserts against it.
/// Reading or writing an inapplicable slot is a program bug, not a user
/// error.

use num_enum::TryFromPrimitive;

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum Kind {
    // ── Top-level units ──────────────────────────────────────────────────
    Entity,
    Arch,
    Package,
    PackageBody,
    Elab,

    // ── Declarations ─────────────────────────────────────────────────────
    PortDecl,
    SignalDecl,
    ConstDecl,
    VarDecl,
    TypeDecl,
    SubtypeDecl,
    AliasDecl,
    UnitDecl,
    EnumLit,
    FieldDecl,
    FuncDecl,
    FuncBody,
    ProcDecl,
    ProcBody,

    // ── Context items ────────────────────────────────────────────────────
    UseClause,

    // ── Concurrent statements ────────────────────────────────────────────
    Process,
    Block,
    Instance,
    CAssign,
    SelectAssign,
    CProcCall,
    CAssert,
    IfGenerate,
    ForGenerate,

    // ── Sequential statements ────────────────────────────────────────────
    If,
    While,
    For,
    CaseStmt,
    Assert,
    SignalAssign,
    VarAssign,
    Wait,
    NullStmt,
    Return,
    PCall,

    // ── Expressions ──────────────────────────────────────────────────────
    FCall,
    Ref,
    Literal,
    Aggregate,
    Qualified,
    TypeConv,
    AttrRef,
    ArrayRef,
    ArraySlice,
    RecordRef,
    Waveform,
    Range,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Entity => "entity",
            Kind::Arch => "architecture",
            Kind::Package => "package",
            Kind::PackageBody => "package body",
            Kind::Elab => "elaborated design",
            Kind::PortDecl => "port declaration",
            Kind::SignalDecl => "signal declaration",
            Kind::ConstDecl => "constant declaration",
            Kind::VarDecl => "variable declaration",
            Kind::TypeDecl => "type declaration",
            Kind::SubtypeDecl => "subtype declaration",
            Kind::AliasDecl => "alias declaration",
            Kind::UnitDecl => "unit declaration",
            Kind::EnumLit => "enumeration literal",
            Kind::FieldDecl => "record field",
            Kind::FuncDecl => "function declaration",
            Kind::FuncBody => "function body",
            Kind::ProcDecl => "procedure declaration",
            Kind::ProcBody => "procedure body",
            Kind::UseClause => "use clause",
            Kind::Process => "process",
            Kind::Block => "block",
            Kind::Instance => "instance",
            Kind::CAssign => "concurrent signal assignment",
            Kind::SelectAssign => "selected signal assignment",
            Kind::CProcCall => "concurrent procedure call",
            Kind::CAssert => "concurrent assertion",
            Kind::IfGenerate => "if generate",
            Kind::ForGenerate => "for generate",
            Kind::If => "if statement",
            Kind::While => "while loop",
            Kind::For => "for loop",
            Kind::CaseStmt => "case statement",
            Kind::Assert => "assertion",
            Kind::SignalAssign => "signal assignment",
            Kind::VarAssign => "variable assignment",
            Kind::Wait => "wait statement",
            Kind::NullStmt => "null statement",
            Kind::Return => "return statement",
            Kind::PCall => "procedure call",
            Kind::FCall => "function call",
            Kind::Ref => "reference",
            Kind::Literal => "literal",
            Kind::Aggregate => "aggregate",
            Kind::Qualified => "qualified expression",
            Kind::TypeConv => "type conversion",
            Kind::AttrRef => "attribute reference",
            Kind::ArrayRef => "indexed name",
            Kind::ArraySlice => "slice name",
            Kind::RecordRef => "selected name",
            Kind::Waveform => "waveform element",
            Kind::Range => "range",
        }
    }

    /// Roots for garbage collection and serialization.
    pub fn is_top_level(self) -> bool {
        matches!(
            self,
            Kind::Entity | Kind::Arch | Kind::Package | Kind::PackageBody | Kind::Elab
        )
    }

    pub fn is_decl(self) -> bool {
        matches!(
            self,
            Kind::PortDecl
                | Kind::SignalDecl
                | Kind::ConstDecl
                | Kind::VarDecl
                | Kind::TypeDecl
                | Kind::SubtypeDecl
                | Kind::AliasDecl
                | Kind::UnitDecl
                | Kind::EnumLit
                | Kind::FieldDecl
                | Kind::FuncDecl
                | Kind::FuncBody
                | Kind::ProcDecl
                | Kind::ProcBody
        )
    }

    pub fn is_concurrent_stmt(self) -> bool {
        matches!(
            self,
            Kind::Process
                | Kind::Block
                | Kind::Instance
                | Kind::CAssign
                | Kind::SelectAssign
                | Kind::CProcCall
                | Kind::CAssert
                | Kind::IfGenerate
                | Kind::ForGenerate
        )
    }

    pub fn is_sequential_stmt(self) -> bool {
        matches!(
            self,
            Kind::If
                | Kind::While
                | Kind::For
                | Kind::CaseStmt
                | Kind::Assert
                | Kind::SignalAssign
                | Kind::VarAssign
                | Kind::Wait
                | Kind::NullStmt
                | Kind::Return
                | Kind::PCall
                | Kind::Block
        )
    }

    pub fn is_stmt(self) -> bool {
        self.is_sequential_stmt() || self.is_concurrent_stmt()
    }

    pub fn is_expr(self) -> bool {
        matches!(
            self,
            Kind::FCall
                | Kind::Ref
                | Kind::Literal
                | Kind::Aggregate
                | Kind::Qualified
                | Kind::TypeConv
                | Kind::AttrRef
                | Kind::ArrayRef
                | Kind::ArraySlice
                | Kind::RecordRef
                | Kind::Range
        )
    }

    /// Legal targets for the `ref` slot: declarations (including
    /// enumeration literals) and top-level units.
    pub fn is_ref_target(self) -> bool {
        self.is_decl() || self.is_top_level()
    }
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Ident,
    Ident2,
    Ports,
    Generics,
    Decls,
    Stmts,
    ElseStmts,
    Triggers,
    Waveforms,
    Drivers,
    Contexts,
    Params,
    Genmaps,
    Assocs,
    Target,
    Value,
    Delay,
    Reject,
    Message,
    Severity,
    Guard,
    Ref,
    Name,
    Range,
    Left,
    Right,
    Literal,
    Type,
}

/// The authoritative slot legality table.
pub fn has_slot(kind: Kind, slot: Slot) -> bool {
    use Kind::*;
    match slot {
        Slot::Ident => matches!(
            kind,
            Entity
                | Arch
                | Package
                | PackageBody
                | Elab
                | PortDecl
                | SignalDecl
                | ConstDecl
                | VarDecl
                | TypeDecl
                | SubtypeDecl
                | AliasDecl
                | UnitDecl
                | EnumLit
                | FieldDecl
                | FuncDecl
                | FuncBody
                | ProcDecl
                | ProcBody
                | UseClause
                | Process
                | Block
                | Instance
                | IfGenerate
                | ForGenerate
                | For
                | PCall
                | CProcCall
                | FCall
                | Ref
                | AttrRef
                | RecordRef
        ),
        Slot::Ident2 => matches!(kind, Arch | Instance | UseClause),
        Slot::Ports => matches!(
            kind,
            Entity | Block | FuncDecl | FuncBody | ProcDecl | ProcBody
        ),
        Slot::Generics => matches!(kind, Entity | Block),
        Slot::Decls => matches!(
            kind,
            Entity
                | Arch
                | Package
                | PackageBody
                | Elab
                | Process
                | Block
                | FuncBody
                | ProcBody
                | IfGenerate
                | ForGenerate
        ),
        Slot::Stmts => matches!(
            kind,
            Entity
                | Arch
                | Elab
                | Process
                | Block
                | FuncBody
                | ProcBody
                | IfGenerate
                | ForGenerate
                | If
                | While
                | For
        ),
        Slot::ElseStmts => matches!(kind, If | IfGenerate),
        Slot::Triggers => matches!(kind, Process | Wait),
        Slot::Waveforms => matches!(kind, SignalAssign | CAssign),
        Slot::Drivers => matches!(kind, SignalDecl),
        Slot::Contexts => matches!(kind, Entity | Arch | Package | PackageBody | Elab),
        Slot::Params => matches!(
            kind,
            FCall | PCall | CProcCall | AttrRef | ArrayRef | Instance | Block
        ),
        Slot::Genmaps => matches!(kind, Instance | Block),
        Slot::Assocs => matches!(kind, Aggregate | CaseStmt | SelectAssign),
        Slot::Target => matches!(kind, SignalAssign | VarAssign | CAssign | SelectAssign),
        Slot::Value => matches!(
            kind,
            PortDecl
                | SignalDecl
                | ConstDecl
                | VarDecl
                | AliasDecl
                | UnitDecl
                | If
                | While
                | CaseStmt
                | Assert
                | CAssert
                | VarAssign
                | Wait
                | Return
                | SelectAssign
                | IfGenerate
                | Qualified
                | TypeConv
                | ArrayRef
                | ArraySlice
                | RecordRef
                | Waveform
                | Range
        ),
        Slot::Delay => matches!(kind, Wait | Waveform),
        Slot::Reject => matches!(kind, SignalAssign | CAssign),
        Slot::Message => matches!(kind, Assert | CAssert),
        Slot::Severity => matches!(kind, Assert | CAssert),
        Slot::Guard => matches!(kind, Block | CAssign),
        Slot::Ref => matches!(kind, Arch | Instance | PCall | CProcCall | FCall | Ref),
        Slot::Name => matches!(kind, AttrRef),
        Slot::Range => matches!(kind, For | ForGenerate | ArraySlice),
        Slot::Left | Slot::Right => matches!(kind, Range),
        Slot::Literal => matches!(kind, Literal | EnumLit),
        Slot::Type => kind.is_decl() || kind.is_expr() || matches!(kind, Waveform),
    }
}

// ---------------------------------------------------------------------------
// Subkinds
// ---------------------------------------------------------------------------

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
pub enum RangeKind {
    To,
    Downto,
    /// A range given by an expression, e.g. `T'RANGE`.
    Expr,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
pub enum PortMode {
    In,
    Out,
    Inout,
    Buffer,
}

/// Object class of an interface declaration. Generics are interface
/// constants; they live in the `generics` slot with class `Constant`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
pub enum Class {
    Signal,
    Constant,
    Variable,
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

bitflags::bitflags! {
    /// Per-node flag bits. Flags are monotone: once the simplification
    /// pass has started, clearing a flag is forbidden.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u32 {
        const LOCALLY_STATIC  = 1 << 0;
        const GLOBALLY_STATIC = 1 << 1;
        const PREDEFINED      = 1 << 2;
        const HIDDEN          = 1 << 3;
        const IMPURE          = 1 << 4;
        const STATIC_WAIT     = 1 << 5;
        const POSTPONED       = 1 << 6;
        const FORMAL_NAME     = 1 << 7;
        const FOREIGN         = 1 << 8;
        const DEFERRED        = 1 << 9;
        /// A process whose sensitivity covers every signal its body
        /// reads; the list is synthesized during simplification.
        const ALL_SENSITIZED  = 1 << 10;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legality_matches_kind_classes() {
        assert!(has_slot(Kind::If, Slot::ElseStmts));
        assert!(!has_slot(Kind::While, Slot::ElseStmts));
        assert!(has_slot(Kind::Instance, Slot::Genmaps));
        assert!(has_slot(Kind::Block, Slot::Genmaps));
        assert!(!has_slot(Kind::Process, Slot::Genmaps));
        assert!(has_slot(Kind::Wait, Slot::Triggers));
        assert!(!has_slot(Kind::Assert, Slot::Triggers));
        assert!(has_slot(Kind::Ref, Slot::Ref));
        assert!(!has_slot(Kind::Literal, Slot::Ref));
    }

    #[test]
    fn kind_ordinals_round_trip() {
        for raw in 0..u16::MAX {
            if let Ok(kind) = Kind::try_from(raw) {
                assert_eq!(kind as u16, raw);
            }
        }
    }

    #[test]
    fn block_is_both_statement_classes() {
        // A block appears in concurrent position; guarded-assignment
        // desugaring also nests it inside a process body.
        assert!(Kind::Block.is_concurrent_stmt());
        assert!(Kind::Block.is_sequential_stmt());
    }
}
