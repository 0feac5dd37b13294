/// The simplification pass.
///
/// A bottom-up rewrite over a top-level unit that realizes the language
/// semantics ahead of elaboration: constant folding through the
/// evaluator, call-argument normalization, generic substitution,
/// dead-code elimination on statically known conditions, desugaring of
/// concurrent statements into processes, and synthesis of wait
/// sensitivity lists.
///
/// The pass never fails: its only failure mode is leaving a node alone,
/// optionally with a warning when fold diagnostics are enabled.

use std::collections::HashMap;

use crate::conf::Conf;
use crate::diag::{Level, Reporter};
use crate::eval::{Exec, ExecFlags};
use crate::ident::{intern, Ident};
use crate::kind::{Class, Flags, Kind, PortMode, RangeKind};
use crate::loc::SourceMap;
use crate::lower;
use crate::ttype::TypeId;
use crate::tree::{Arena, Assoc, AssocSel, LitValue, NodeId};
use crate::walk::{self, Rewriter};

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Local simplification: folds locally static expressions only, never
/// calls user functions.
pub fn simplify_local(
    arena: &mut Arena,
    unit: NodeId,
    reporter: &mut Reporter,
    map: &mut SourceMap,
    conf: &Conf,
) {
    let mut flags = ExecFlags::empty();
    if conf.is_set("eval_warn") {
        flags |= ExecFlags::WARN;
    }
    let exec = Exec::new(flags, conf.get("eval_budget") as u64);
    run_pass(arena, unit, Flags::LOCALLY_STATIC, exec, None, reporter, map);
}

/// Global simplification: folds both static classes and may demand-lower
/// user subprograms collected from the unit before rewriting. An optional
/// generic map seeds substitution for the unit itself.
pub fn simplify_global(
    arena: &mut Arena,
    unit: NodeId,
    generics: Option<HashMap<NodeId, NodeId>>,
    reporter: &mut Reporter,
    map: &mut SourceMap,
    conf: &Conf,
) {
    let mut flags = ExecFlags::FCALL;
    if conf.is_set("eval_warn") {
        flags |= ExecFlags::WARN;
    }
    let mut exec = Exec::new(flags, conf.get("eval_budget") as u64);

    let mut subprograms: HashMap<Ident, NodeId> = HashMap::new();
    walk::visit(arena, unit, &mut |a, n| {
        if a.kind(n) == Kind::FuncBody && a.has_ident(n) {
            subprograms.insert(a.ident(n), n);
        }
    });
    exec.set_subprograms(subprograms);

    run_pass(
        arena,
        unit,
        Flags::LOCALLY_STATIC | Flags::GLOBALLY_STATIC,
        exec,
        generics,
        reporter,
        map,
    );
}

fn run_pass(
    arena: &mut Arena,
    unit: NodeId,
    mask: Flags,
    exec: Exec,
    generics: Option<HashMap<NodeId, NodeId>>,
    reporter: &mut Reporter,
    map: &mut SourceMap,
) {
    let mut simp = Simp {
        reporter,
        map,
        mask,
        exec,
        generics: vec![generics.unwrap_or_default()],
        scope_owner: Vec::new(),
        implicit: Vec::new(),
        implicit_cache: HashMap::new(),
    };
    let root = walk::rewrite(arena, unit, &mut simp);
    let top = root.unwrap_or(unit);
    for (sig, proc) in simp.implicit {
        arena.add_decl(top, sig);
        arena.add_stmt(top, proc);
    }
}

// ---------------------------------------------------------------------------
// Pass state
// ---------------------------------------------------------------------------

struct Simp<'a> {
    reporter: &'a mut Reporter,
    map: &'a mut SourceMap,
    mask: Flags,
    exec: Exec,
    /// Generic substitution scopes; each block with a generic map pushes
    /// an extension of the enclosing scope.
    generics: Vec<HashMap<NodeId, NodeId>>,
    scope_owner: Vec<NodeId>,
    /// Implicit signals (signal, driver process) created for 'DELAYED and
    /// 'TRANSACTION, installed on the top unit after the rewrite.
    implicit: Vec<(NodeId, NodeId)>,
    implicit_cache: HashMap<(NodeId, Ident), NodeId>,
}

impl Rewriter for Simp<'_> {
    fn pre(&mut self, arena: &mut Arena, n: NodeId) {
        if arena.kind(n) == Kind::Block && !arena.genmaps(n).is_empty() {
            let scope = self.block_scope(arena, n);
            self.generics.push(scope);
            self.scope_owner.push(n);
        }
    }

    fn post(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        let result = self.simp_tree(arena, n);
        if self.scope_owner.last() == Some(&n) {
            self.scope_owner.pop();
            self.generics.pop();
        }
        result
    }
}

impl Simp<'_> {
    /// Build the substitution map for a block: positional map entries,
    /// then named entries, then declared defaults; the enclosing scope is
    /// extended, never overwritten.
    fn block_scope(&self, arena: &Arena, block: NodeId) -> HashMap<NodeId, NodeId> {
        let mut scope = self.generics.last().cloned().unwrap_or_default();
        let maps = arena.genmaps(block).to_vec();
        for (i, &gen) in arena.generics(block).iter().enumerate() {
            let actual = maps
                .iter()
                .find_map(|m| match m.sel {
                    AssocSel::Pos(p) if p as usize == i => Some(m.value),
                    AssocSel::Named(sel) if named_matches(arena, sel, gen) => Some(m.value),
                    _ => None,
                })
                .or_else(|| {
                    if arena.has_value(gen) {
                        Some(arena.value(gen))
                    } else {
                        None
                    }
                });
            if let Some(a) = actual {
                scope.entry(gen).or_insert(a);
            }
        }
        scope
    }

    fn lookup_generic(&self, decl: NodeId) -> Option<NodeId> {
        self.generics.last().and_then(|s| s.get(&decl).copied())
    }

    fn warn_fold(&mut self, arena: &Arena, n: NodeId, why: &str) {
        if self.exec.flags().contains(ExecFlags::WARN) {
            let mut d = self.reporter.diag(Level::Warn, arena.loc(n));
            d.msg(format!("expression cannot be folded: {}", why));
            self.reporter.emit(self.map, d);
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    fn simp_tree(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        match arena.kind(n) {
            Kind::FCall => self.simp_fcall(arena, n),
            Kind::PCall => {
                self.simp_call_args(arena, n);
                Some(n)
            }
            Kind::Ref => Some(self.simp_ref(arena, n)),
            Kind::AttrRef => Some(self.simp_attr_ref(arena, n)),
            Kind::If => self.simp_if(arena, n),
            Kind::While => self.simp_while(arena, n),
            Kind::For => self.simp_for(arena, n),
            Kind::CaseStmt => self.simp_case(arena, n),
            Kind::Assert => self.simp_assert(arena, n),
            Kind::CAssert => self.simp_cassert(arena, n),
            Kind::CAssign => self.simp_cassign(arena, n),
            Kind::SelectAssign => self.simp_select(arena, n),
            Kind::CProcCall => self.simp_cpcall(arena, n),
            Kind::IfGenerate => self.simp_if_generate(arena, n),
            Kind::Process => self.simp_process(arena, n),
            Kind::SignalAssign => self.simp_signal_assign(arena, n),
            Kind::NullStmt => None,
            _ => Some(n),
        }
    }

    // -----------------------------------------------------------------------
    // Call argument normalization
    // -----------------------------------------------------------------------

    /// Rewrite a call so every parameter is positional and in declaration
    /// order, filling defaults for missing and open associations.
    fn simp_call_args(&mut self, arena: &mut Arena, call: NodeId) {
        if !arena.has_ref(call) {
            return;
        }
        let decl = arena.reference(call);
        if !matches!(
            arena.kind(decl),
            Kind::FuncDecl | Kind::FuncBody | Kind::ProcDecl | Kind::ProcBody
        ) {
            return;
        }
        // Operator calls are positional by construction.
        if arena.has_flag(decl, Flags::PREDEFINED) {
            return;
        }
        let ports = arena.ports(decl).to_vec();
        let params = arena.params(call).to_vec();

        let any_named = params.iter().any(|p| matches!(p.sel, AssocSel::Named(_)));
        if !any_named && params.len() == ports.len() {
            return;
        }

        let mut new_params = Vec::with_capacity(ports.len());
        for (i, &port) in ports.iter().enumerate() {
            let actual = params.iter().find_map(|p| match p.sel {
                AssocSel::Pos(pos) if pos as usize == i => Some(p.value),
                AssocSel::Named(sel) if named_matches(arena, sel, port) => Some(p.value),
                _ => None,
            });
            let value = match actual {
                Some(v) if is_open(arena, v) => default_of(arena, port),
                Some(v) => v,
                None => default_of(arena, port),
            };
            new_params.push(Assoc::pos(i as u32, value));
        }
        arena.set_params(call, new_params);
    }

    // -----------------------------------------------------------------------
    // Foldability
    // -----------------------------------------------------------------------

    fn foldable(&mut self, arena: &Arena, n: NodeId) -> bool {
        match arena.kind(n) {
            Kind::Literal => true,
            Kind::Ref => {
                if !arena.has_ref(n) {
                    return false;
                }
                let decl = arena.reference(n);
                match arena.kind(decl) {
                    Kind::EnumLit | Kind::UnitDecl => true,
                    Kind::ConstDecl => {
                        if arena.has_value(decl) {
                            self.foldable(arena, arena.value(decl))
                        } else if arena.has_flag(decl, Flags::DEFERRED)
                            && self.exec.flags().contains(ExecFlags::FCALL)
                        {
                            // A deferred constant resolves during the
                            // global pass; let the lowerer try.
                            true
                        } else {
                            self.warn_fold(arena, n, "deferred constant has no value yet");
                            false
                        }
                    }
                    _ => {
                        self.warn_fold(arena, n, "name is not a constant");
                        false
                    }
                }
            }
            Kind::FCall => {
                if !arena.has_ref(n) {
                    return false;
                }
                let decl = arena.reference(n);
                if arena.has_flag(decl, Flags::IMPURE) {
                    self.warn_fold(arena, n, "call to impure function");
                    return false;
                }
                if arena.has_flag(decl, Flags::FOREIGN) {
                    self.warn_fold(arena, n, "call to foreign function");
                    return false;
                }
                if !arena.has_flag(decl, Flags::PREDEFINED) {
                    let can = self.exec.flags().contains(ExecFlags::FCALL)
                        && self.exec.has_body(arena, decl);
                    if !can {
                        self.warn_fold(arena, n, "function body is not available");
                        return false;
                    }
                }
                arena
                    .params(n)
                    .to_vec()
                    .iter()
                    .all(|p| self.foldable(arena, p.value))
            }
            Kind::Qualified | Kind::TypeConv => self.foldable(arena, arena.value(n)),
            Kind::RecordRef => {
                arena.kind(arena.value(n)) == Kind::Aggregate
                    && self.foldable(arena, arena.value(n))
            }
            Kind::Aggregate => arena
                .assocs(n)
                .to_vec()
                .iter()
                .all(|a| self.foldable(arena, a.value)),
            _ => {
                self.warn_fold(arena, n, "expression is not static");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Folding
    // -----------------------------------------------------------------------

    fn simp_fcall(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        self.simp_call_args(arena, n);

        if !arena.has_type(n) || !arena.types.is_scalar(arena.type_of(n)) {
            return Some(n);
        }
        if !arena.flags(n).intersects(self.mask) {
            return Some(n);
        }
        if !self.foldable(arena, n) {
            return Some(n);
        }
        let thunk = match lower::lower_thunk(arena, n) {
            Some(t) => t,
            None => return Some(n),
        };
        match self.exec.fold(arena, n, &thunk) {
            Ok(lit) => {
                log::trace!("folded call at {:?}", arena.loc(n));
                Some(lit)
            }
            Err(fail) => {
                self.warn_fold(arena, n, fail.describe());
                Some(n)
            }
        }
        // The thunk is released here, immediately after folding.
    }

    // -----------------------------------------------------------------------
    // Reference resolution
    // -----------------------------------------------------------------------

    fn simp_ref(&mut self, arena: &mut Arena, n: NodeId) -> NodeId {
        if !arena.has_ref(n) {
            return n;
        }
        let decl = arena.reference(n);
        match arena.kind(decl) {
            Kind::ConstDecl => {
                if arena.has_value(decl) {
                    let value = arena.value(decl);
                    if arena.kind(value) == Kind::Literal
                        && !matches!(arena.literal(value), LitValue::Str(_))
                    {
                        return value;
                    }
                    if arena.folded_enum(value).is_some() {
                        return value;
                    }
                }
                n
            }
            Kind::UnitDecl => {
                if arena.has_value(decl) {
                    arena.value(decl)
                } else {
                    n
                }
            }
            Kind::PortDecl => {
                if let Some(actual) = self.lookup_generic(decl) {
                    // Composite and call actuals cannot stand in for a
                    // formal name.
                    let incompatible = arena.has_flag(n, Flags::FORMAL_NAME)
                        && matches!(
                            arena.kind(actual),
                            Kind::Aggregate | Kind::FCall | Kind::ArrayRef | Kind::ArraySlice
                        );
                    if !incompatible {
                        return actual;
                    }
                }
                n
            }
            _ => n,
        }
    }

    // -----------------------------------------------------------------------
    // Attribute folding
    // -----------------------------------------------------------------------

    fn simp_attr_ref(&mut self, arena: &mut Arena, n: NodeId) -> NodeId {
        if !arena.has_ident(n) {
            return n;
        }
        let attr = arena.ident(n);
        if attr.eq_ignore_case("delayed") || attr.eq_ignore_case("transaction") {
            return self.implicit_signal(arena, n, attr);
        }
        if attr.eq_ignore_case("pos") {
            return self.fold_pos_attr(arena, n);
        }
        for name in ["left", "right", "low", "high", "length", "ascending"] {
            if attr.eq_ignore_case(name) {
                return self.fold_range_attr(arena, n, name);
            }
        }
        n
    }

    fn attr_prefix_type(&self, arena: &Arena, n: NodeId) -> Option<TypeId> {
        if !arena.has_name(n) {
            return None;
        }
        let prefix = arena.name(n);
        match arena.kind(prefix) {
            Kind::Ref if arena.has_ref(prefix) => {
                let decl = arena.reference(prefix);
                if arena.has_type(decl) {
                    Some(arena.type_of(decl))
                } else {
                    None
                }
            }
            Kind::AttrRef if arena.ident(prefix).eq_ignore_case("base") => self
                .attr_prefix_type(arena, prefix)
                .map(|ty| arena.types.base_of(ty)),
            _ => {
                if arena.has_type(prefix) {
                    Some(arena.type_of(prefix))
                } else {
                    None
                }
            }
        }
    }

    /// Whether the attribute prefix names a type (as opposed to an
    /// object of that type); unconstrained-array attributes fold only in
    /// that case, through the index-constraint type.
    fn prefix_is_type_decl(&self, arena: &Arena, n: NodeId) -> bool {
        if !arena.has_name(n) {
            return false;
        }
        let prefix = arena.name(n);
        arena.kind(prefix) == Kind::Ref
            && arena.has_ref(prefix)
            && matches!(
                arena.kind(arena.reference(prefix)),
                Kind::TypeDecl | Kind::SubtypeDecl
            )
    }

    fn fold_pos_attr(&mut self, arena: &mut Arena, n: NodeId) -> NodeId {
        let arg = match arena.params(n).first() {
            Some(p) => p.value,
            None => return n,
        };
        let pos = arena.folded_enum(arg).or_else(|| arena.folded_int(arg));
        match pos {
            Some(v) => {
                let lit = arena.new_node(Kind::Literal, arena.loc(n));
                arena.set_literal(lit, LitValue::Int(v));
                if arena.has_type(n) {
                    let ty = arena.type_of(n);
                    arena.set_type(lit, ty);
                }
                lit
            }
            None => n,
        }
    }

    fn fold_range_attr(&mut self, arena: &mut Arena, n: NodeId, attr: &str) -> NodeId {
        let ty = match self.attr_prefix_type(arena, n) {
            Some(ty) => ty,
            None => return n,
        };
        let dim = arena
            .params(n)
            .first()
            .and_then(|p| arena.folded_int(p.value))
            .unwrap_or(1);
        if dim < 1 {
            return n;
        }

        // Enumeration prefixes fold straight from the literal list.
        if arena.types.is_enum(ty) {
            let literals = arena.types.enum_literals(ty).to_vec();
            if literals.is_empty() {
                return n;
            }
            return match attr {
                "left" | "low" => make_ref(arena, literals[0], arena.loc(n)),
                "right" | "high" => make_ref(arena, literals[literals.len() - 1], arena.loc(n)),
                "length" => self.make_int(arena, n, literals.len() as i64),
                "ascending" => self.make_bool(arena, n, true).unwrap_or(n),
                _ => n,
            };
        }

        let range_ty = if arena.types.is_array(ty) && arena.types.is_unconstrained(ty) {
            if self.prefix_is_type_decl(arena, n) {
                arena.types.index_type(ty, (dim - 1) as usize)
            } else {
                return n;
            }
        } else {
            ty
        };
        let dims = arena.types.dims(range_ty).to_vec();
        let r = match dims.get((dim - 1) as usize) {
            Some(&r) => r,
            None => return n,
        };
        let dir = arena.range_kind(r);
        if dir == RangeKind::Expr || !arena.has_left(r) || !arena.has_right(r) {
            return n;
        }
        let (left, right) = (arena.left(r), arena.right(r));
        let ascending = dir == RangeKind::To;

        match attr {
            "left" => left,
            "right" => right,
            "low" => if ascending { left } else { right },
            "high" => if ascending { right } else { left },
            "ascending" => self.make_bool(arena, n, ascending).unwrap_or(n),
            "length" => {
                let (lo, hi) = if ascending { (left, right) } else { (right, left) };
                match (arena.folded_int(lo), arena.folded_int(hi)) {
                    (Some(lo), Some(hi)) => self.make_int(arena, n, 0.max(hi - lo + 1)),
                    _ => n,
                }
            }
            _ => n,
        }
    }

    fn make_int(&self, arena: &mut Arena, like: NodeId, v: i64) -> NodeId {
        let lit = arena.new_node(Kind::Literal, arena.loc(like));
        arena.set_literal(lit, LitValue::Int(v));
        if arena.has_type(like) {
            let ty = arena.type_of(like);
            arena.set_type(lit, ty);
        }
        lit
    }

    /// Build a boolean literal reference, typed by the attribute node
    /// (the analyzer gives boolean-valued attributes their type).
    fn make_bool(&self, arena: &mut Arena, like: NodeId, v: bool) -> Option<NodeId> {
        if !arena.has_type(like) {
            return None;
        }
        let ty = arena.type_of(like);
        if !arena.types.is_enum(ty) {
            return None;
        }
        let literals = arena.types.enum_literals(ty).to_vec();
        let decl = *literals.get(v as usize)?;
        Some(make_ref(arena, decl, arena.loc(like)))
    }

    // -----------------------------------------------------------------------
    // Implicit signals
    // -----------------------------------------------------------------------

    /// Synthesize the implicit signal and driver process modelling
    /// `prefix'DELAYED(T)` or `prefix'TRANSACTION`, and return a
    /// reference to the new signal.
    fn implicit_signal(&mut self, arena: &mut Arena, n: NodeId, attr: Ident) -> NodeId {
        let delayed = attr.eq_ignore_case("delayed");
        if !arena.has_name(n) {
            return n;
        }
        let prefix = arena.name(n);
        if arena.kind(prefix) != Kind::Ref || !arena.has_ref(prefix) {
            return n;
        }
        let decl = arena.reference(prefix);
        let is_signal = match arena.kind(decl) {
            Kind::SignalDecl => true,
            Kind::PortDecl => port_class(arena, decl) == Class::Signal,
            _ => false,
        };
        if !is_signal || !arena.has_type(decl) {
            return n;
        }

        if let Some(&sig) = self.implicit_cache.get(&(decl, attr)) {
            return make_ref(arena, sig, arena.loc(n));
        }

        let loc = arena.loc(n);
        let ty = arena.type_of(decl);
        let base = if delayed { "delayed" } else { "transaction" };
        let sig_name = intern(&format!("{}_{}", base, arena.ident(decl)));

        let sig = arena.new_node(Kind::SignalDecl, loc);
        arena.set_ident(sig, sig_name);
        arena.set_type(sig, ty);
        let initial = if arena.has_value(decl) {
            Some(arena.value(decl))
        } else {
            self.default_value(arena, ty, loc)
        };
        if let Some(init) = initial {
            arena.set_value(sig, init);
        }

        // Driver: delayed_s <= s after T;   or   transaction_s <= not transaction_s;
        let wave = arena.new_node(Kind::Waveform, loc);
        if delayed {
            let source = make_ref(arena, decl, loc);
            arena.set_value(wave, source);
            let delay = arena
                .params(n)
                .first()
                .map(|p| p.value)
                .unwrap_or_else(|| {
                    let zero = arena.new_node(Kind::Literal, loc);
                    arena.set_literal(zero, LitValue::Phys(0));
                    zero
                });
            arena.set_delay(wave, delay);
        } else {
            let toggled = arena.new_node(Kind::FCall, loc);
            arena.set_ident(toggled, intern("not"));
            let self_ref = make_ref(arena, sig, loc);
            arena.add_param(toggled, Assoc::pos(0, self_ref));
            arena.set_value(wave, toggled);
        }

        let assign = arena.new_node(Kind::SignalAssign, loc);
        let target = make_ref(arena, sig, loc);
        arena.set_target(assign, target);
        arena.add_waveform(assign, wave);

        let trigger = make_ref(arena, decl, loc);
        let wait = self.make_wait(arena, n, vec![trigger]);

        let proc = arena.new_node(Kind::Process, loc);
        arena.set_ident(proc, intern(&format!("{}_driver", sig_name)));
        arena.add_stmt(proc, assign);
        arena.add_stmt(proc, wait);

        self.implicit.push((sig, proc));
        self.implicit_cache.insert((decl, attr), sig);

        make_ref(arena, sig, loc)
    }

    /// The default initial value for a type: the first enumeration
    /// literal, or zero for numeric types.
    fn default_value(&self, arena: &mut Arena, ty: TypeId, loc: crate::loc::Loc) -> Option<NodeId> {
        if arena.types.is_enum(ty) {
            let first = *arena.types.enum_literals(ty).first()?;
            return Some(make_ref(arena, first, loc));
        }
        if arena.types.is_scalar(ty) {
            let lit = arena.new_node(Kind::Literal, loc);
            if arena.types.is_real(ty) {
                arena.set_literal(lit, LitValue::Real(0.0));
            } else {
                arena.set_literal(lit, LitValue::Int(0));
            }
            arena.set_type(lit, ty);
            return Some(lit);
        }
        None
    }

    // -----------------------------------------------------------------------
    // Dead code elimination
    // -----------------------------------------------------------------------

    fn simp_if(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        match arena.folded_bool(arena.value(n)) {
            Some(true) => self.take_branch(arena, n, arena.stmts(n).to_vec()),
            Some(false) => self.take_branch(arena, n, arena.else_stmts(n).to_vec()),
            None => Some(n),
        }
    }

    /// Replace a statically decided statement with its surviving branch:
    /// nothing, the single statement, or a block wrapper.
    fn take_branch(
        &mut self,
        arena: &mut Arena,
        n: NodeId,
        stmts: Vec<NodeId>,
    ) -> Option<NodeId> {
        match stmts.len() {
            0 => None,
            1 => Some(stmts[0]),
            _ => {
                let block = arena.new_node(Kind::Block, arena.loc(n));
                for s in stmts {
                    arena.add_stmt(block, s);
                }
                Some(block)
            }
        }
    }

    fn simp_while(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        match arena.folded_bool(arena.value(n)) {
            Some(false) => None,
            _ => Some(n),
        }
    }

    /// A loop over a statically null range iterates zero times.
    fn simp_for(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        if !arena.has_range(n) {
            return Some(n);
        }
        let r = arena.range(n);
        if arena.kind(r) != Kind::Range
            || arena.range_kind(r) == RangeKind::Expr
            || !arena.has_left(r)
            || !arena.has_right(r)
        {
            return Some(n);
        }
        let (left, right) = (arena.folded_int(arena.left(r)), arena.folded_int(arena.right(r)));
        if let (Some(l), Some(rv)) = (left, right) {
            let empty = match arena.range_kind(r) {
                RangeKind::To => l > rv,
                RangeKind::Downto => l < rv,
                RangeKind::Expr => false,
            };
            if empty {
                return None;
            }
        }
        Some(n)
    }

    fn simp_case(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        let scrutinee = arena.value(n);
        let sel = match arena
            .folded_int(scrutinee)
            .or_else(|| arena.folded_enum(scrutinee))
        {
            Some(v) => v,
            None => return Some(n),
        };

        let assocs = arena.assocs(n).to_vec();
        let mut others: Option<NodeId> = None;
        for assoc in &assocs {
            match assoc.sel {
                AssocSel::Named(choice) => {
                    let cv = arena
                        .folded_int(choice)
                        .or_else(|| arena.folded_enum(choice));
                    match cv {
                        Some(v) if v == sel => return self.take_arm(arena, assoc.value),
                        Some(_) => {}
                        // A choice we cannot evaluate makes the whole
                        // selection undecidable.
                        None => return Some(n),
                    }
                }
                AssocSel::Range(r) => {
                    if arena.kind(r) == Kind::Range
                        && arena.range_kind(r) != RangeKind::Expr
                        && arena.has_left(r)
                        && arena.has_right(r)
                    {
                        let lo_hi = (
                            arena.folded_int(arena.left(r)),
                            arena.folded_int(arena.right(r)),
                        );
                        if let (Some(a), Some(b)) = lo_hi {
                            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                            if sel >= lo && sel <= hi {
                                return self.take_arm(arena, assoc.value);
                            }
                        } else {
                            return Some(n);
                        }
                    } else {
                        return Some(n);
                    }
                }
                AssocSel::Others => others = Some(assoc.value),
                AssocSel::Pos(_) => return Some(n),
            }
        }
        match others {
            Some(arm) => self.take_arm(arena, arm),
            None => None,
        }
    }

    fn take_arm(&mut self, arena: &mut Arena, arm: NodeId) -> Option<NodeId> {
        if arena.kind(arm) == Kind::Block {
            let stmts = arena.stmts(arm).to_vec();
            return self.take_branch(arena, arm, stmts);
        }
        Some(arm)
    }

    fn simp_assert(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        if !arena.has_value(n) {
            return Some(n);
        }
        match arena.folded_bool(arena.value(n)) {
            Some(true) => None,
            _ => Some(n),
        }
    }

    fn simp_if_generate(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        match arena.folded_bool(arena.value(n)) {
            Some(true) => {
                let decls = arena.decls(n).to_vec();
                let stmts = arena.stmts(n).to_vec();
                if decls.is_empty() && stmts.is_empty() {
                    return None;
                }
                let block = arena.new_node(Kind::Block, arena.loc(n));
                if arena.has_ident(n) {
                    let label = arena.ident(n);
                    arena.set_ident(block, label);
                }
                for d in decls {
                    arena.add_decl(block, d);
                }
                for s in stmts {
                    arena.add_stmt(block, s);
                }
                Some(block)
            }
            Some(false) => {
                let stmts = arena.else_stmts(n).to_vec();
                self.take_branch(arena, n, stmts)
            }
            None => Some(n),
        }
    }

    /// An all-sensitized process gets its sensitivity synthesized from
    /// every signal its body reads, following procedure calls.
    fn simp_process(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        if arena.has_flag(n, Flags::ALL_SENSITIZED) && arena.triggers(n).is_empty() {
            let mut triggers = Vec::new();
            for s in arena.stmts(n).to_vec() {
                self.build_wait(arena, s, &mut triggers, true);
            }
            for t in triggers {
                arena.add_trigger(n, t);
            }
        }
        Some(n)
    }

    /// A signal assignment whose target collapsed to an open association
    /// drives nothing and is deleted.
    fn simp_signal_assign(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        if is_open(arena, arena.target(n)) {
            None
        } else {
            Some(n)
        }
    }

    // -----------------------------------------------------------------------
    // Concurrent statement desugaring
    // -----------------------------------------------------------------------

    fn make_wait(&self, arena: &mut Arena, like: NodeId, triggers: Vec<NodeId>) -> NodeId {
        let wait = arena.new_node(Kind::Wait, arena.loc(like));
        for t in triggers {
            arena.add_trigger(wait, t);
        }
        arena.set_flag(wait, Flags::STATIC_WAIT);
        wait
    }

    fn make_process(
        &self,
        arena: &mut Arena,
        like: NodeId,
        stmts: Vec<NodeId>,
        triggers: Vec<NodeId>,
    ) -> NodeId {
        let proc = arena.new_node(Kind::Process, arena.loc(like));
        for s in stmts {
            arena.add_stmt(proc, s);
        }
        let wait = self.make_wait(arena, like, triggers);
        arena.add_stmt(proc, wait);
        if arena.has_flag(like, Flags::POSTPONED) {
            arena.set_flag(proc, Flags::POSTPONED);
        }
        proc
    }

    fn simp_cassign(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        let target = arena.target(n);
        if is_open(arena, target) {
            return None;
        }

        let waveforms = arena.waveforms(n).to_vec();
        let mut triggers = Vec::new();
        for &w in &waveforms {
            if arena.has_value(w) {
                self.build_wait(arena, arena.value(w), &mut triggers, false);
            }
            if arena.has_delay(w) {
                self.build_wait(arena, arena.delay(w), &mut triggers, false);
            }
        }
        self.target_sensitivity(arena, target, &mut triggers);

        let assign = arena.new_node(Kind::SignalAssign, arena.loc(n));
        arena.set_target(assign, target);
        for w in waveforms {
            arena.add_waveform(assign, w);
        }
        if arena.has_reject(n) {
            let reject = arena.reject(n);
            arena.set_reject(assign, reject);
        }

        let body = if arena.has_guard(n) {
            let guard = arena.guard(n);
            self.build_wait(arena, guard, &mut triggers, false);
            let wrapper = arena.new_node(Kind::If, arena.loc(n));
            arena.set_value(wrapper, guard);
            arena.add_stmt(wrapper, assign);
            wrapper
        } else {
            assign
        };

        Some(self.make_process(arena, n, vec![body], triggers))
    }

    fn simp_select(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        let target = arena.target(n);
        if is_open(arena, target) {
            return None;
        }
        let scrutinee = arena.value(n);
        let assocs = arena.assocs(n).to_vec();

        let mut triggers = Vec::new();
        self.build_wait(arena, scrutinee, &mut triggers, false);
        for assoc in &assocs {
            if arena.kind(assoc.value) == Kind::Waveform && arena.has_value(assoc.value) {
                self.build_wait(arena, arena.value(assoc.value), &mut triggers, false);
            }
        }
        self.target_sensitivity(arena, target, &mut triggers);

        // Each choice becomes a case arm assigning its waveform.
        let case = arena.new_node(Kind::CaseStmt, arena.loc(n));
        arena.set_value(case, scrutinee);
        for assoc in assocs {
            let assign = arena.new_node(Kind::SignalAssign, arena.loc(assoc.value));
            arena.set_target(assign, target);
            arena.add_waveform(assign, assoc.value);
            arena.add_assoc(
                case,
                Assoc {
                    sel: assoc.sel,
                    value: assign,
                },
            );
        }

        // A statically known selector reduces like any other case.
        let reduced = self.simp_case(arena, case)?;
        Some(self.make_process(arena, n, vec![reduced], triggers))
    }

    fn simp_cassert(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        if arena.has_value(n) && arena.folded_bool(arena.value(n)) == Some(true) {
            return None;
        }

        let cond = arena.value(n);
        let mut triggers = Vec::new();
        self.build_wait(arena, cond, &mut triggers, false);

        let assert = arena.new_node(Kind::Assert, arena.loc(n));
        arena.set_value(assert, cond);
        if arena.has_message(n) {
            let m = arena.message(n);
            arena.set_message(assert, m);
        }
        if arena.has_severity(n) {
            let s = arena.severity(n);
            arena.set_severity(assert, s);
        }

        Some(self.make_process(arena, n, vec![assert], triggers))
    }

    fn simp_cpcall(&mut self, arena: &mut Arena, n: NodeId) -> Option<NodeId> {
        self.simp_call_args(arena, n);

        let params = arena.params(n).to_vec();
        let ports: Vec<NodeId> = if arena.has_ref(n) {
            arena.ports(arena.reference(n)).to_vec()
        } else {
            Vec::new()
        };

        let mut triggers = Vec::new();
        for (i, p) in params.iter().enumerate() {
            let readable = ports
                .get(i)
                .map(|&port| {
                    matches!(port_mode(arena, port), PortMode::In | PortMode::Inout)
                })
                .unwrap_or(true);
            if readable {
                self.build_wait(arena, p.value, &mut triggers, false);
            }
        }

        let call = arena.new_node(Kind::PCall, arena.loc(n));
        if arena.has_ident(n) {
            let id = arena.ident(n);
            arena.set_ident(call, id);
        }
        if arena.has_ref(n) {
            let r = arena.reference(n);
            arena.set_ref(call, r);
        }
        for p in params {
            arena.add_param(call, p);
        }

        Some(self.make_process(arena, n, vec![call], triggers))
    }

    /// Signals read by an indexed or sliced assignment target (the
    /// indices, not the driven signal itself).
    fn target_sensitivity(&self, arena: &Arena, target: NodeId, out: &mut Vec<NodeId>) {
        match arena.kind(target) {
            Kind::ArrayRef => {
                for p in arena.params(target).to_vec() {
                    self.build_wait(arena, p.value, out, false);
                }
            }
            Kind::ArraySlice => {
                if arena.has_range(target) {
                    self.build_wait(arena, arena.range(target), out, false);
                }
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Sensitivity synthesis
    // -----------------------------------------------------------------------

    /// Collect the wait triggers implied by an expression or, in `all`
    /// mode, a statement body. Every statically visible signal read is
    /// added once; an unhandled kind is a bug in this table.
    fn build_wait(&self, arena: &Arena, n: NodeId, out: &mut Vec<NodeId>, all: bool) {
        match arena.kind(n) {
            Kind::Ref => {
                if !arena.has_ref(n) {
                    return;
                }
                let decl = arena.reference(n);
                match arena.kind(decl) {
                    Kind::SignalDecl => add_trigger(arena, out, n),
                    Kind::PortDecl if port_class(arena, decl) == Class::Signal => {
                        add_trigger(arena, out, n)
                    }
                    Kind::AliasDecl if arena.has_value(decl) => {
                        self.build_wait(arena, arena.value(decl), out, all)
                    }
                    _ => {}
                }
            }
            Kind::ArrayRef => {
                let prefix = arena.value(n);
                if signal_base(arena, n).is_some() && static_prefix(arena, n) {
                    add_trigger(arena, out, n);
                } else {
                    self.build_wait(arena, prefix, out, all);
                    for p in arena.params(n).to_vec() {
                        self.build_wait(arena, p.value, out, all);
                    }
                }
            }
            Kind::ArraySlice => {
                let prefix = arena.value(n);
                if signal_base(arena, n).is_some() && static_prefix(arena, n) {
                    add_trigger(arena, out, n);
                } else {
                    self.build_wait(arena, prefix, out, all);
                    if arena.has_range(n) {
                        self.build_wait(arena, arena.range(n), out, all);
                    }
                }
            }
            Kind::RecordRef => {
                if signal_base(arena, n).is_some() && static_prefix(arena, n) {
                    add_trigger(arena, out, n);
                } else {
                    self.build_wait(arena, arena.value(n), out, all);
                }
            }
            Kind::FCall | Kind::PCall | Kind::CProcCall => {
                let ports: Vec<NodeId> = if arena.has_ref(n) {
                    arena.ports(arena.reference(n)).to_vec()
                } else {
                    Vec::new()
                };
                for (i, p) in arena.params(n).to_vec().iter().enumerate() {
                    let readable = ports
                        .get(i)
                        .map(|&port| {
                            matches!(port_mode(arena, port), PortMode::In | PortMode::Inout)
                        })
                        .unwrap_or(true);
                    if readable {
                        self.build_wait(arena, p.value, out, all);
                    }
                }
                if all && arena.has_ref(n) {
                    let decl = arena.reference(n);
                    if matches!(arena.kind(decl), Kind::ProcBody | Kind::FuncBody) {
                        for s in arena.stmts(decl).to_vec() {
                            self.build_wait(arena, s, out, all);
                        }
                    }
                }
            }
            Kind::AttrRef => {
                let attr_ident = if arena.has_ident(n) {
                    Some(arena.ident(n))
                } else {
                    None
                };
                let event_like = attr_ident
                    .map(|a| a.eq_ignore_case("event") || a.eq_ignore_case("active"))
                    .unwrap_or(false);
                if arena.has_name(n) {
                    self.build_wait(arena, arena.name(n), out, all);
                }
                if !event_like {
                    for p in arena.params(n).to_vec() {
                        self.build_wait(arena, p.value, out, all);
                    }
                }
            }
            Kind::Aggregate => {
                for a in arena.assocs(n).to_vec() {
                    if let AssocSel::Named(sel) | AssocSel::Range(sel) = a.sel {
                        self.build_wait(arena, sel, out, all);
                    }
                    self.build_wait(arena, a.value, out, all);
                }
            }
            Kind::Qualified | Kind::TypeConv => {
                self.build_wait(arena, arena.value(n), out, all)
            }
            Kind::Range => {
                if arena.has_left(n) {
                    self.build_wait(arena, arena.left(n), out, all);
                }
                if arena.has_right(n) {
                    self.build_wait(arena, arena.right(n), out, all);
                }
                if arena.has_value(n) {
                    self.build_wait(arena, arena.value(n), out, all);
                }
            }
            Kind::Waveform => {
                if arena.has_value(n) {
                    self.build_wait(arena, arena.value(n), out, all);
                }
                if arena.has_delay(n) {
                    self.build_wait(arena, arena.delay(n), out, all);
                }
            }
            Kind::Literal => {}

            // Statement forms, reached from all-sensitized bodies.
            Kind::If => {
                self.build_wait(arena, arena.value(n), out, all);
                for s in arena.stmts(n).to_vec() {
                    self.build_wait(arena, s, out, all);
                }
                for s in arena.else_stmts(n).to_vec() {
                    self.build_wait(arena, s, out, all);
                }
            }
            Kind::While => {
                self.build_wait(arena, arena.value(n), out, all);
                for s in arena.stmts(n).to_vec() {
                    self.build_wait(arena, s, out, all);
                }
            }
            Kind::For => {
                if arena.has_range(n) {
                    self.build_wait(arena, arena.range(n), out, all);
                }
                for s in arena.stmts(n).to_vec() {
                    self.build_wait(arena, s, out, all);
                }
            }
            Kind::CaseStmt => {
                self.build_wait(arena, arena.value(n), out, all);
                for a in arena.assocs(n).to_vec() {
                    self.build_wait(arena, a.value, out, all);
                }
            }
            Kind::Block => {
                for s in arena.stmts(n).to_vec() {
                    self.build_wait(arena, s, out, all);
                }
            }
            Kind::SignalAssign => {
                self.target_sensitivity(arena, arena.target(n), out);
                for w in arena.waveforms(n).to_vec() {
                    self.build_wait(arena, w, out, all);
                }
            }
            Kind::VarAssign => {
                self.target_sensitivity(arena, arena.target(n), out);
                self.build_wait(arena, arena.value(n), out, all);
            }
            Kind::Assert => {
                if arena.has_value(n) {
                    self.build_wait(arena, arena.value(n), out, all);
                }
                if arena.has_message(n) {
                    self.build_wait(arena, arena.message(n), out, all);
                }
                if arena.has_severity(n) {
                    self.build_wait(arena, arena.severity(n), out, all);
                }
            }
            Kind::Return => {
                if arena.has_value(n) {
                    self.build_wait(arena, arena.value(n), out, all);
                }
            }
            Kind::NullStmt | Kind::Wait => {}

            other => panic!("build_wait: cannot handle {:?}", other),
        }
    }
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

fn make_ref(arena: &mut Arena, decl: NodeId, loc: crate::loc::Loc) -> NodeId {
    let r = arena.new_node(Kind::Ref, loc);
    if arena.has_ident(decl) {
        let id = arena.ident(decl);
        arena.set_ident(r, id);
    }
    arena.set_ref(r, decl);
    if arena.has_type(decl) {
        let ty = arena.type_of(decl);
        arena.set_type(r, ty);
    }
    r
}

fn named_matches(arena: &Arena, sel: NodeId, port: NodeId) -> bool {
    if arena.kind(sel) != Kind::Ref {
        return false;
    }
    if arena.has_ref(sel) && arena.reference(sel) == port {
        return true;
    }
    arena.has_ident(sel) && arena.has_ident(port) && arena.ident(sel) == arena.ident(port)
}

fn is_open(arena: &Arena, n: NodeId) -> bool {
    arena.kind(n) == Kind::Literal && matches!(arena.literal(n), LitValue::Null)
}

fn default_of(arena: &Arena, port: NodeId) -> NodeId {
    assert!(
        arena.has_value(port),
        "no actual or default for parameter '{}'",
        arena.ident(port)
    );
    arena.value(port)
}

fn port_class(arena: &Arena, decl: NodeId) -> Class {
    arena.node(decl).class.unwrap_or(Class::Signal)
}

fn port_mode(arena: &Arena, decl: NodeId) -> PortMode {
    arena.node(decl).port_mode.unwrap_or(PortMode::In)
}

/// Trigger deduplication: two references to the same declaration are the
/// same trigger; indexed names compare by base and literal indices.
fn same_trigger(arena: &Arena, a: NodeId, b: NodeId) -> bool {
    let (ka, kb) = (arena.kind(a), arena.kind(b));
    if ka != kb {
        return false;
    }
    match ka {
        Kind::Ref => arena.has_ref(a) && arena.has_ref(b) && arena.reference(a) == arena.reference(b),
        Kind::Literal => arena.literal(a) == arena.literal(b),
        Kind::ArrayRef => {
            let pa = arena.params(a);
            let pb = arena.params(b);
            same_trigger(arena, arena.value(a), arena.value(b))
                && pa.len() == pb.len()
                && pa
                    .iter()
                    .zip(pb.iter())
                    .all(|(x, y)| same_trigger(arena, x.value, y.value))
        }
        Kind::ArraySlice => same_trigger(arena, arena.value(a), arena.value(b)),
        Kind::RecordRef => {
            arena.has_ident(a)
                && arena.has_ident(b)
                && arena.ident(a) == arena.ident(b)
                && same_trigger(arena, arena.value(a), arena.value(b))
        }
        _ => a == b,
    }
}

fn add_trigger(arena: &Arena, out: &mut Vec<NodeId>, n: NodeId) {
    if !out.iter().any(|&t| same_trigger(arena, t, n)) {
        out.push(n);
    }
}

/// Whether an expression is static in the longest-static-prefix sense:
/// constants, enumeration and unit literals, constant-class interface
/// objects, and aliases to the same.
fn is_static_expr(arena: &Arena, n: NodeId) -> bool {
    match arena.kind(n) {
        Kind::Literal => true,
        Kind::Ref => {
            if !arena.has_ref(n) {
                return false;
            }
            let decl = arena.reference(n);
            match arena.kind(decl) {
                Kind::ConstDecl | Kind::EnumLit | Kind::UnitDecl => true,
                Kind::PortDecl => port_class(arena, decl) == Class::Constant,
                Kind::AliasDecl => {
                    arena.has_value(decl) && is_static_expr(arena, arena.value(decl))
                }
                _ => false,
            }
        }
        _ => false,
    }
}

/// Whether `n` is its own longest static prefix: every index on the way
/// down is static, so the fine-grained name can be a trigger by itself.
fn static_prefix(arena: &Arena, n: NodeId) -> bool {
    match arena.kind(n) {
        Kind::Ref => true,
        Kind::ArrayRef => {
            static_prefix(arena, arena.value(n))
                && arena.params(n).iter().all(|p| is_static_expr(arena, p.value))
        }
        Kind::ArraySlice => {
            if !static_prefix(arena, arena.value(n)) {
                return false;
            }
            if !arena.has_range(n) {
                return false;
            }
            let r = arena.range(n);
            arena.kind(r) == Kind::Range
                && arena.has_left(r)
                && arena.has_right(r)
                && is_static_expr(arena, arena.left(r))
                && is_static_expr(arena, arena.right(r))
        }
        Kind::RecordRef => static_prefix(arena, arena.value(n)),
        _ => false,
    }
}

/// The signal declaration at the bottom of a name, if any.
fn signal_base(arena: &Arena, n: NodeId) -> Option<NodeId> {
    match arena.kind(n) {
        Kind::Ref => {
            if !arena.has_ref(n) {
                return None;
            }
            let decl = arena.reference(n);
            match arena.kind(decl) {
                Kind::SignalDecl => Some(decl),
                Kind::PortDecl if port_class(arena, decl) == Class::Signal => Some(decl),
                _ => None,
            }
        }
        Kind::ArrayRef | Kind::ArraySlice | Kind::RecordRef => {
            signal_base(arena, arena.value(n))
        }
        _ => None,
    }
}
