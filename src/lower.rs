/// Thunk compiler.
///
/// Lowers foldable scalar expressions (and, for the global pass,
/// sequential function bodies) into self-contained stack-machine
/// programs. Jumps carry absolute targets and are back-patched the way a
/// bytecode compiler patches placeholder offsets. Anything the lowerer
/// cannot express yields `None` and the caller leaves the node unfolded.

use crate::kind::{Flags, Kind};
use crate::tree::{Arena, AssocSel, LitValue, NodeId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    PushInt(i64),
    PushReal(f64),
    Load(usize),
    Store(usize),
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Rem,
    Neg,
    Abs,
    Not,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IntToReal,
    RealToInt,
    Call { decl: NodeId, nargs: usize },
    Jump(usize),
    JumpIfFalse(usize),
    Ret,
}

/// A compiled, self-contained fold program.
#[derive(Debug, Clone)]
pub struct Thunk {
    pub code: Vec<Op>,
    pub nlocals: usize,
}

/// Compile a foldable scalar expression. The caller has already checked
/// foldability; a `None` here means the expression uses a construct the
/// lowerer does not model, and folding is abandoned.
pub fn lower_thunk(arena: &Arena, expr: NodeId) -> Option<Thunk> {
    let mut lw = Lower {
        arena,
        code: Vec::new(),
        locals: Vec::new(),
    };
    lw.expr(expr)?;
    lw.code.push(Op::Ret);
    Some(Thunk {
        code: lw.code,
        nlocals: 0,
    })
}

/// Compile a function body: parameters become locals 0..n, variable
/// declarations follow, statements lower to straight-line code with
/// patched jumps.
pub fn lower_body(arena: &Arena, body: NodeId) -> Option<Thunk> {
    if arena.kind(body) != Kind::FuncBody {
        return None;
    }
    let mut lw = Lower {
        arena,
        code: Vec::new(),
        locals: Vec::new(),
    };
    for &port in arena.ports(body) {
        lw.locals.push(port);
    }
    for &decl in arena.decls(body) {
        match arena.kind(decl) {
            Kind::VarDecl => {
                let idx = lw.locals.len();
                lw.locals.push(decl);
                if arena.has_value(decl) {
                    lw.expr(arena.value(decl))?;
                    lw.code.push(Op::Store(idx));
                }
            }
            // Local constants fold inline at each use.
            Kind::ConstDecl => {}
            _ => return None,
        }
    }
    for &stmt in arena.stmts(body) {
        lw.stmt(stmt)?;
    }
    let nlocals = lw.locals.len();
    Some(Thunk {
        code: lw.code,
        nlocals,
    })
}

struct Lower<'a> {
    arena: &'a Arena,
    code: Vec<Op>,
    locals: Vec<NodeId>,
}

impl<'a> Lower<'a> {
    fn local_of(&self, decl: NodeId) -> Option<usize> {
        self.locals.iter().position(|&d| d == decl)
    }

    fn emit_jump(&mut self, op: Op) -> usize {
        let idx = self.code.len();
        self.code.push(op);
        idx
    }

    fn patch_jump(&mut self, idx: usize) {
        let target = self.code.len();
        self.code[idx] = match self.code[idx] {
            Op::Jump(_) => Op::Jump(target),
            Op::JumpIfFalse(_) => Op::JumpIfFalse(target),
            other => panic!("patch_jump on non-jump {:?}", other),
        };
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn expr(&mut self, n: NodeId) -> Option<()> {
        let arena = self.arena;
        match arena.kind(n) {
            Kind::Literal => match arena.literal(n) {
                LitValue::Int(v) | LitValue::Phys(v) => {
                    self.code.push(Op::PushInt(*v));
                    Some(())
                }
                LitValue::Real(v) => {
                    self.code.push(Op::PushReal(*v));
                    Some(())
                }
                _ => None,
            },
            Kind::Ref => {
                if !arena.has_ref(n) {
                    return None;
                }
                let decl = arena.reference(n);
                match arena.kind(decl) {
                    Kind::EnumLit => match arena.literal(decl) {
                        LitValue::Int(pos) => {
                            self.code.push(Op::PushInt(*pos));
                            Some(())
                        }
                        _ => None,
                    },
                    Kind::ConstDecl => {
                        if arena.has_value(decl) {
                            self.expr(arena.value(decl))
                        } else {
                            None
                        }
                    }
                    Kind::UnitDecl => {
                        if arena.has_value(decl) {
                            self.expr(arena.value(decl))
                        } else {
                            None
                        }
                    }
                    Kind::VarDecl | Kind::PortDecl => {
                        let idx = self.local_of(decl)?;
                        self.code.push(Op::Load(idx));
                        Some(())
                    }
                    _ => None,
                }
            }
            Kind::FCall => self.fcall(n),
            Kind::Qualified => self.expr(arena.value(n)),
            Kind::TypeConv => {
                let value = arena.value(n);
                self.expr(value)?;
                if arena.has_type(n) && arena.has_type(value) {
                    let to_real = arena.types.is_real(arena.type_of(n));
                    let from_real = arena.types.is_real(arena.type_of(value));
                    if to_real && !from_real {
                        self.code.push(Op::IntToReal);
                    } else if !to_real && from_real {
                        self.code.push(Op::RealToInt);
                    }
                }
                Some(())
            }
            Kind::RecordRef => self.record_select(n),
            _ => None,
        }
    }

    fn fcall(&mut self, n: NodeId) -> Option<()> {
        let arena = self.arena;
        if !arena.has_ref(n) {
            return None;
        }
        let decl = arena.reference(n);
        let params = arena.params(n).to_vec();

        if arena.has_flag(decl, Flags::PREDEFINED) {
            for p in &params {
                self.expr(p.value)?;
            }
            return self.builtin(arena.ident(decl).as_str(), params.len());
        }

        if arena.has_flag(decl, Flags::IMPURE) || arena.has_flag(decl, Flags::FOREIGN) {
            return None;
        }
        for p in &params {
            self.expr(p.value)?;
        }
        self.code.push(Op::Call {
            decl,
            nargs: params.len(),
        });
        Some(())
    }

    fn builtin(&mut self, name: &str, nargs: usize) -> Option<()> {
        let op = match (name, nargs) {
            ("+", 2) => Op::Add,
            ("+", 1) => return Some(()), // unary plus is the identity
            ("-", 2) => Op::Sub,
            ("-", 1) => Op::Neg,
            ("*", 2) => Op::Mul,
            ("/", 2) => Op::Div,
            ("mod", 2) => Op::Mod,
            ("rem", 2) => Op::Rem,
            ("abs", 1) => Op::Abs,
            ("not", 1) => Op::Not,
            ("and", 2) => Op::And,
            ("or", 2) => Op::Or,
            ("xor", 2) => Op::Xor,
            ("=", 2) => Op::Eq,
            ("/=", 2) => Op::Ne,
            ("<", 2) => Op::Lt,
            ("<=", 2) => Op::Le,
            (">", 2) => Op::Gt,
            (">=", 2) => Op::Ge,
            _ => return None,
        };
        self.code.push(op);
        Some(())
    }

    /// Record selection over an aggregate folds to the element for the
    /// selected field.
    fn record_select(&mut self, n: NodeId) -> Option<()> {
        let arena = self.arena;
        let agg = arena.value(n);
        if arena.kind(agg) != Kind::Aggregate {
            return None;
        }
        let field = arena.ident(n);
        let field_index = if arena.has_type(agg) {
            arena
                .types
                .record_fields(arena.type_of(agg))
                .iter()
                .position(|&f| arena.ident(f) == field)
        } else {
            None
        };
        for assoc in arena.assocs(agg).iter() {
            let hit = match assoc.sel {
                AssocSel::Named(sel) => {
                    arena.kind(sel) == Kind::Ref && arena.ident(sel) == field
                }
                AssocSel::Pos(pos) => field_index == Some(pos as usize),
                AssocSel::Others => true,
                AssocSel::Range(_) => false,
            };
            if hit {
                return self.expr(assoc.value);
            }
        }
        None
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn stmt(&mut self, n: NodeId) -> Option<()> {
        let arena = self.arena;
        match arena.kind(n) {
            Kind::VarAssign => {
                let target = arena.target(n);
                if arena.kind(target) != Kind::Ref || !arena.has_ref(target) {
                    return None;
                }
                let idx = self.local_of(arena.reference(target))?;
                self.expr(arena.value(n))?;
                self.code.push(Op::Store(idx));
                Some(())
            }
            Kind::If => {
                self.expr(arena.value(n))?;
                let j_else = self.emit_jump(Op::JumpIfFalse(0));
                for &s in arena.stmts(n).to_vec().iter() {
                    self.stmt(s)?;
                }
                let else_stmts = arena.else_stmts(n).to_vec();
                if else_stmts.is_empty() {
                    self.patch_jump(j_else);
                } else {
                    let j_end = self.emit_jump(Op::Jump(0));
                    self.patch_jump(j_else);
                    for &s in else_stmts.iter() {
                        self.stmt(s)?;
                    }
                    self.patch_jump(j_end);
                }
                Some(())
            }
            Kind::While => {
                let top = self.code.len();
                self.expr(arena.value(n))?;
                let j_end = self.emit_jump(Op::JumpIfFalse(0));
                for &s in arena.stmts(n).to_vec().iter() {
                    self.stmt(s)?;
                }
                self.code.push(Op::Jump(top));
                self.patch_jump(j_end);
                Some(())
            }
            Kind::Return => {
                if !arena.has_value(n) {
                    return None;
                }
                self.expr(arena.value(n))?;
                self.code.push(Op::Ret);
                Some(())
            }
            Kind::NullStmt => Some(()),
            _ => None,
        }
    }
}
