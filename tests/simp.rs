/// Integration tests for the simplification pass.
///
/// These tests verify:
///   • Constant folding of arithmetic through the evaluator
///   • If statements with literal conditions reduce to the taken branch
///   • Concurrent signal assignment desugars to a process + static wait
///   • 'DELAYED synthesizes an implicit signal and driver process
///   • Generic substitution replaces references inside a block
///   • Case selection over a folded scrutinee picks the matching arm
///   • Sensitivity lists deduplicate and honour the longest static prefix
use std::collections::HashMap;

use velab::*;

// ─── Builder helpers ──────────────────────────────────────────────────────────

struct Ctx {
    arena: Arena,
    map: SourceMap,
    conf: Conf,
    int_ty: TypeId,
    bool_ty: TypeId,
    bit_ty: TypeId,
    time_ty: TypeId,
    t_false: NodeId,
    t_true: NodeId,
}

fn ctx() -> Ctx {
    let mut arena = Arena::new();
    let map = SourceMap::new();
    let conf = Conf::new();

    let int_ty = arena
        .types
        .new_type(intern("integer"), TypeKind::Integer { dims: vec![] });
    let time_ty = arena.types.new_type(
        intern("time"),
        TypeKind::Physical { dims: vec![], units: vec![] },
    );

    let t_false = arena.new_node(Kind::EnumLit, Loc::invalid());
    arena.set_ident(t_false, intern("false"));
    arena.set_literal(t_false, LitValue::Int(0));
    let t_true = arena.new_node(Kind::EnumLit, Loc::invalid());
    arena.set_ident(t_true, intern("true"));
    arena.set_literal(t_true, LitValue::Int(1));
    let bool_ty = arena.types.new_type(
        intern("boolean"),
        TypeKind::Enum { literals: vec![t_false, t_true] },
    );
    arena.set_type(t_false, bool_ty);
    arena.set_type(t_true, bool_ty);

    let b0 = arena.new_node(Kind::EnumLit, Loc::invalid());
    arena.set_ident(b0, intern("'0'"));
    arena.set_literal(b0, LitValue::Int(0));
    let b1 = arena.new_node(Kind::EnumLit, Loc::invalid());
    arena.set_ident(b1, intern("'1'"));
    arena.set_literal(b1, LitValue::Int(1));
    let bit_ty = arena
        .types
        .new_type(intern("bit"), TypeKind::Enum { literals: vec![b0, b1] });
    arena.set_type(b0, bit_ty);
    arena.set_type(b1, bit_ty);

    Ctx {
        arena,
        map,
        conf,
        int_ty,
        bool_ty,
        bit_ty,
        time_ty,
        t_false,
        t_true,
    }
}

impl Ctx {
    fn int_lit(&mut self, v: i64) -> NodeId {
        let n = self.arena.new_node(Kind::Literal, Loc::invalid());
        self.arena.set_literal(n, LitValue::Int(v));
        self.arena.set_type(n, self.int_ty);
        n
    }

    fn bool_ref(&mut self, v: bool) -> NodeId {
        let decl = if v { self.t_true } else { self.t_false };
        let r = self.arena.new_node(Kind::Ref, Loc::invalid());
        self.arena.set_ident(r, self.arena.ident(decl));
        self.arena.set_ref(r, decl);
        self.arena.set_type(r, self.bool_ty);
        r
    }

    fn predef(&mut self, name: &str) -> NodeId {
        let d = self.arena.new_node(Kind::FuncDecl, Loc::invalid());
        self.arena.set_ident(d, intern(name));
        self.arena.set_flag(d, Flags::PREDEFINED);
        d
    }

    /// A locally static binary operator call typed as `ty`.
    fn binop(&mut self, name: &str, ty: TypeId, l: NodeId, r: NodeId) -> NodeId {
        let d = self.predef(name);
        let call = self.arena.new_node(Kind::FCall, Loc::invalid());
        self.arena.set_ident(call, intern(name));
        self.arena.set_ref(call, d);
        self.arena.add_param(call, Assoc::pos(0, l));
        self.arena.add_param(call, Assoc::pos(1, r));
        self.arena.set_type(call, ty);
        self.arena.set_flag(call, Flags::LOCALLY_STATIC);
        call
    }

    fn signal(&mut self, name: &str, ty: TypeId) -> NodeId {
        let s = self.arena.new_node(Kind::SignalDecl, Loc::invalid());
        self.arena.set_ident(s, intern(name));
        self.arena.set_type(s, ty);
        s
    }

    fn var(&mut self, name: &str, ty: TypeId) -> NodeId {
        let v = self.arena.new_node(Kind::VarDecl, Loc::invalid());
        self.arena.set_ident(v, intern(name));
        self.arena.set_type(v, ty);
        v
    }

    fn sig_ref(&mut self, decl: NodeId) -> NodeId {
        let r = self.arena.new_node(Kind::Ref, Loc::invalid());
        self.arena.set_ident(r, self.arena.ident(decl));
        self.arena.set_ref(r, decl);
        if self.arena.has_type(decl) {
            let ty = self.arena.type_of(decl);
            self.arena.set_type(r, ty);
        }
        r
    }

    fn waveform(&mut self, value: NodeId) -> NodeId {
        let w = self.arena.new_node(Kind::Waveform, Loc::invalid());
        self.arena.set_value(w, value);
        w
    }

    fn var_assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        let a = self.arena.new_node(Kind::VarAssign, Loc::invalid());
        let t = self.sig_ref(target);
        self.arena.set_target(a, t);
        self.arena.set_value(a, value);
        a
    }

    fn arch(&mut self, name: &str) -> NodeId {
        let a = self.arena.new_node(Kind::Arch, Loc::invalid());
        self.arena.set_ident(a, intern(name));
        a
    }

    fn simplify(&mut self, unit: NodeId) {
        let mut reporter = Reporter::new(&self.conf);
        reporter.set_color(false);
        simplify_local(&mut self.arena, unit, &mut reporter, &mut self.map, &self.conf);
    }
}

// ─── S1: constant-folding arithmetic ──────────────────────────────────────────

#[test]
fn s1_constant_arithmetic_folds_to_a_literal() {
    let mut c = ctx();
    // constant K : integer := 2 + 3 * 4;
    let three = c.int_lit(3);
    let four = c.int_lit(4);
    let mul = c.binop("*", c.int_ty, three, four);
    let two = c.int_lit(2);
    let add = c.binop("+", c.int_ty, two, mul);

    let k = c.arena.new_node(Kind::ConstDecl, Loc::invalid());
    c.arena.set_ident(k, intern("k"));
    c.arena.set_type(k, c.int_ty);
    c.arena.set_value(k, add);

    let pkg = c.arena.new_node(Kind::Package, Loc::invalid());
    c.arena.set_ident(pkg, intern("p"));
    c.arena.add_decl(pkg, k);

    c.simplify(pkg);

    let folded = c.arena.value(k);
    assert_eq!(c.arena.kind(folded), Kind::Literal);
    assert_eq!(c.arena.folded_int(folded), Some(14));
}

// ─── S2: if with literal condition ────────────────────────────────────────────

#[test]
fn s2_if_true_keeps_only_the_then_branch() {
    let mut c = ctx();
    let a = c.var("a", c.int_ty);

    let one = c.int_lit(1);
    let then_assign = c.var_assign(a, one);
    let two = c.int_lit(2);
    let else_assign = c.var_assign(a, two);

    let cond = c.bool_ref(true);
    let iff = c.arena.new_node(Kind::If, Loc::invalid());
    c.arena.set_value(iff, cond);
    c.arena.add_stmt(iff, then_assign);
    c.arena.add_else_stmt(iff, else_assign);

    let proc = c.arena.new_node(Kind::Process, Loc::invalid());
    c.arena.add_decl(proc, a);
    c.arena.add_stmt(proc, iff);
    let arch = c.arch("rtl");
    c.arena.add_stmt(arch, proc);

    c.simplify(arch);

    // The branch is unwrapped because it holds a single statement.
    assert_eq!(c.arena.stmts(proc), &[then_assign]);
    assert_eq!(c.arena.folded_int(c.arena.value(then_assign)), Some(1));
}

#[test]
fn if_false_without_else_deletes_the_statement() {
    let mut c = ctx();
    let a = c.var("a", c.int_ty);
    let one = c.int_lit(1);
    let assign = c.var_assign(a, one);
    let cond = c.bool_ref(false);
    let iff = c.arena.new_node(Kind::If, Loc::invalid());
    c.arena.set_value(iff, cond);
    c.arena.add_stmt(iff, assign);

    let proc = c.arena.new_node(Kind::Process, Loc::invalid());
    c.arena.add_decl(proc, a);
    c.arena.add_stmt(proc, iff);
    let arch = c.arch("rtl");
    c.arena.add_stmt(arch, proc);

    c.simplify(arch);
    assert!(c.arena.stmts(proc).is_empty());
}

// ─── S3: concurrent signal assignment ─────────────────────────────────────────

#[test]
fn s3_concurrent_assignment_becomes_a_process_with_static_wait() {
    let mut c = ctx();
    let a = c.signal("a", c.bit_ty);
    let b = c.signal("b", c.bit_ty);
    let y = c.signal("y", c.bit_ty);

    let ra = c.sig_ref(a);
    let rb = c.sig_ref(b);
    let and = {
        // Untyped on purpose: signal operands never fold.
        let d = c.predef("and");
        let call = c.arena.new_node(Kind::FCall, Loc::invalid());
        c.arena.set_ident(call, intern("and"));
        c.arena.set_ref(call, d);
        c.arena.add_param(call, Assoc::pos(0, ra));
        c.arena.add_param(call, Assoc::pos(1, rb));
        call
    };
    let wave = c.waveform(and);
    let ry = c.sig_ref(y);
    let cassign = c.arena.new_node(Kind::CAssign, Loc::invalid());
    c.arena.set_target(cassign, ry);
    c.arena.add_waveform(cassign, wave);

    let arch = c.arch("rtl");
    for d in [a, b, y] {
        c.arena.add_decl(arch, d);
    }
    c.arena.add_stmt(arch, cassign);

    c.simplify(arch);

    let stmts = c.arena.stmts(arch).to_vec();
    assert_eq!(stmts.len(), 1);
    let proc = stmts[0];
    assert_eq!(c.arena.kind(proc), Kind::Process);
    assert!(!c.arena.has_flag(proc, Flags::POSTPONED));

    let body = c.arena.stmts(proc).to_vec();
    assert_eq!(body.len(), 2);
    assert_eq!(c.arena.kind(body[0]), Kind::SignalAssign);
    let wait = body[1];
    assert_eq!(c.arena.kind(wait), Kind::Wait);
    assert!(c.arena.has_flag(wait, Flags::STATIC_WAIT));

    let triggers: Vec<NodeId> = c
        .arena
        .triggers(wait)
        .iter()
        .map(|&t| c.arena.reference(t))
        .collect();
    assert_eq!(triggers, vec![a, b]);
}

// ─── S4: 'DELAYED implicit signal ─────────────────────────────────────────────

#[test]
fn s4_delayed_attribute_synthesizes_an_implicit_signal() {
    let mut c = ctx();
    let sig = c.signal("sig", c.bit_ty);
    let y = c.signal("y", c.bit_ty);

    let prefix = c.sig_ref(sig);
    let delay = c.arena.new_node(Kind::Literal, Loc::invalid());
    c.arena.set_literal(delay, LitValue::Phys(5_000_000));
    c.arena.set_type(delay, c.time_ty);

    let attr = c.arena.new_node(Kind::AttrRef, Loc::invalid());
    c.arena.set_ident(attr, intern("delayed"));
    c.arena.set_name(attr, prefix);
    c.arena.add_param(attr, Assoc::pos(0, delay));
    c.arena.set_type(attr, c.bit_ty);

    let wave = c.waveform(attr);
    let ry = c.sig_ref(y);
    let cassign = c.arena.new_node(Kind::CAssign, Loc::invalid());
    c.arena.set_target(cassign, ry);
    c.arena.add_waveform(cassign, wave);

    let arch = c.arch("rtl");
    c.arena.add_decl(arch, sig);
    c.arena.add_decl(arch, y);
    c.arena.add_stmt(arch, cassign);

    c.simplify(arch);

    // A new signal declaration landed on the architecture.
    let decls = c.arena.decls(arch).to_vec();
    assert_eq!(decls.len(), 3);
    let imp = decls[2];
    assert_eq!(c.arena.kind(imp), Kind::SignalDecl);
    assert_eq!(c.arena.ident(imp), intern("delayed_sig"));
    assert_eq!(c.arena.type_of(imp), c.bit_ty);

    // The attribute reference was replaced by a reference to it.
    let user_proc = c.arena.stmts(arch)[0];
    let assign = c.arena.stmts(user_proc)[0];
    let replaced = c.arena.value(c.arena.waveforms(assign)[0]);
    assert_eq!(c.arena.kind(replaced), Kind::Ref);
    assert_eq!(c.arena.reference(replaced), imp);

    // And a driver process: delayed_sig <= sig after 5 ns; wait on sig;
    let stmts = c.arena.stmts(arch).to_vec();
    assert_eq!(stmts.len(), 2);
    let driver = stmts[1];
    assert_eq!(c.arena.kind(driver), Kind::Process);
    let body = c.arena.stmts(driver).to_vec();
    assert_eq!(c.arena.kind(body[0]), Kind::SignalAssign);
    assert_eq!(c.arena.reference(c.arena.target(body[0])), imp);
    let dw = c.arena.waveforms(body[0])[0];
    assert_eq!(c.arena.reference(c.arena.value(dw)), sig);
    assert_eq!(c.arena.delay(dw), delay);
    let wait = body[1];
    assert!(c.arena.has_flag(wait, Flags::STATIC_WAIT));
    assert_eq!(c.arena.reference(c.arena.triggers(wait)[0]), sig);
}

// ─── S5: generic substitution ─────────────────────────────────────────────────

#[test]
fn s5_generic_map_substitutes_references() {
    let mut c = ctx();
    // block generic (N : integer := 8); generic map (N => 16);
    let n_decl = c.arena.new_node(Kind::PortDecl, Loc::invalid());
    c.arena.set_ident(n_decl, intern("n"));
    c.arena.set_type(n_decl, c.int_ty);
    c.arena.set_class(n_decl, Class::Constant);
    c.arena.set_port_mode(n_decl, PortMode::In);
    let eight = c.int_lit(8);
    c.arena.set_value(n_decl, eight);

    let sixteen = c.int_lit(16);

    let y = c.signal("y", c.int_ty);
    let n_use = c.sig_ref(n_decl);
    let wave = c.waveform(n_use);
    let ry = c.sig_ref(y);
    let cassign = c.arena.new_node(Kind::CAssign, Loc::invalid());
    c.arena.set_target(cassign, ry);
    c.arena.add_waveform(cassign, wave);

    let block = c.arena.new_node(Kind::Block, Loc::invalid());
    c.arena.set_ident(block, intern("b"));
    c.arena.add_generic(block, n_decl);
    c.arena.add_genmap(block, Assoc::pos(0, sixteen));
    c.arena.add_stmt(block, cassign);

    let arch = c.arch("rtl");
    c.arena.add_decl(arch, y);
    c.arena.add_stmt(arch, block);

    c.simplify(arch);

    // Inside the block the assignment became a process; its waveform
    // value is the mapped literal.
    let proc = c.arena.stmts(block)[0];
    let assign = c.arena.stmts(proc)[0];
    let value = c.arena.value(c.arena.waveforms(assign)[0]);
    assert_eq!(c.arena.folded_int(value), Some(16));
}

#[test]
fn generic_default_applies_when_not_mapped() {
    let mut c = ctx();
    let n_decl = c.arena.new_node(Kind::PortDecl, Loc::invalid());
    c.arena.set_ident(n_decl, intern("n"));
    c.arena.set_type(n_decl, c.int_ty);
    c.arena.set_class(n_decl, Class::Constant);
    let eight = c.int_lit(8);
    c.arena.set_value(n_decl, eight);

    let m_decl = c.arena.new_node(Kind::PortDecl, Loc::invalid());
    c.arena.set_ident(m_decl, intern("m"));
    c.arena.set_type(m_decl, c.int_ty);
    c.arena.set_class(m_decl, Class::Constant);

    let thirty_two = c.int_lit(32);

    let y = c.signal("y", c.int_ty);
    let n_use = c.sig_ref(n_decl);
    let wave = c.waveform(n_use);
    let ry = c.sig_ref(y);
    let cassign = c.arena.new_node(Kind::CAssign, Loc::invalid());
    c.arena.set_target(cassign, ry);
    c.arena.add_waveform(cassign, wave);

    let block = c.arena.new_node(Kind::Block, Loc::invalid());
    c.arena.set_ident(block, intern("b"));
    c.arena.add_generic(block, n_decl);
    c.arena.add_generic(block, m_decl);
    // Only m is mapped, by name; n falls back to its default.
    let m_name = c.sig_ref(m_decl);
    c.arena.add_genmap(block, Assoc::named(m_name, thirty_two));
    c.arena.add_stmt(block, cassign);

    let arch = c.arch("rtl");
    c.arena.add_decl(arch, y);
    c.arena.add_stmt(arch, block);

    c.simplify(arch);

    let proc = c.arena.stmts(block)[0];
    let assign = c.arena.stmts(proc)[0];
    let value = c.arena.value(c.arena.waveforms(assign)[0]);
    assert_eq!(c.arena.folded_int(value), Some(8));
}

// ─── S6: case selection ───────────────────────────────────────────────────────

#[test]
fn s6_case_with_folded_scrutinee_selects_the_matching_arm() {
    let mut c = ctx();
    let x = c.var("x", c.int_ty);

    let arm = |c: &mut Ctx, v: i64| -> NodeId {
        let lit = c.int_lit(v);
        let assign = c.var_assign(x, lit);
        let block = c.arena.new_node(Kind::Block, Loc::invalid());
        c.arena.add_stmt(block, assign);
        block
    };

    let case = c.arena.new_node(Kind::CaseStmt, Loc::invalid());
    let two = c.int_lit(2);
    c.arena.set_value(case, two);
    let c1 = c.int_lit(1);
    let a1 = arm(&mut c, 100);
    c.arena.add_assoc(case, Assoc::named(c1, a1));
    let c2 = c.int_lit(2);
    let a2 = arm(&mut c, 200);
    c.arena.add_assoc(case, Assoc::named(c2, a2));
    let a3 = arm(&mut c, 300);
    c.arena.add_assoc(case, Assoc { sel: AssocSel::Others, value: a3 });

    let proc = c.arena.new_node(Kind::Process, Loc::invalid());
    c.arena.add_decl(proc, x);
    c.arena.add_stmt(proc, case);
    let arch = c.arch("rtl");
    c.arena.add_stmt(arch, proc);

    c.simplify(arch);

    let body = c.arena.stmts(proc).to_vec();
    assert_eq!(body.len(), 1);
    assert_eq!(c.arena.kind(body[0]), Kind::VarAssign);
    assert_eq!(c.arena.folded_int(c.arena.value(body[0])), Some(200));
}

// ─── Further reductions ───────────────────────────────────────────────────────

#[test]
fn comparison_folds_to_boolean_and_prunes_the_if() {
    let mut c = ctx();
    let a = c.var("a", c.int_ty);

    // if 1 < 2 then a := 7; end if;
    let one = c.int_lit(1);
    let two = c.int_lit(2);
    let cmp = c.binop("<", c.bool_ty, one, two);
    let seven = c.int_lit(7);
    let assign = c.var_assign(a, seven);
    let iff = c.arena.new_node(Kind::If, Loc::invalid());
    c.arena.set_value(iff, cmp);
    c.arena.add_stmt(iff, assign);

    let proc = c.arena.new_node(Kind::Process, Loc::invalid());
    c.arena.add_decl(proc, a);
    c.arena.add_stmt(proc, iff);
    let arch = c.arch("rtl");
    c.arena.add_stmt(arch, proc);

    c.simplify(arch);

    // The comparison folded to a reference to `true`, which in turn let
    // the if statement reduce to its then branch.
    assert_eq!(c.arena.stmts(proc), &[assign]);
}

#[test]
fn while_false_is_deleted() {
    let mut c = ctx();
    let cond = c.bool_ref(false);
    let w = c.arena.new_node(Kind::While, Loc::invalid());
    c.arena.set_value(w, cond);
    let nul = c.arena.new_node(Kind::NullStmt, Loc::invalid());
    c.arena.add_stmt(w, nul);

    let proc = c.arena.new_node(Kind::Process, Loc::invalid());
    c.arena.add_stmt(proc, w);
    let arch = c.arch("rtl");
    c.arena.add_stmt(arch, proc);

    c.simplify(arch);
    assert!(c.arena.stmts(proc).is_empty());
}

#[test]
fn constant_true_concurrent_assert_is_removed() {
    let mut c = ctx();
    let cond = c.bool_ref(true);
    let ca = c.arena.new_node(Kind::CAssert, Loc::invalid());
    c.arena.set_value(ca, cond);
    let arch = c.arch("rtl");
    c.arena.add_stmt(arch, ca);

    c.simplify(arch);
    assert!(c.arena.stmts(arch).is_empty());
}

#[test]
fn concurrent_assert_on_a_signal_becomes_a_process() {
    let mut c = ctx();
    let s = c.signal("ready", c.bit_ty);
    let cond = c.sig_ref(s);
    let ca = c.arena.new_node(Kind::CAssert, Loc::invalid());
    c.arena.set_value(ca, cond);
    let arch = c.arch("rtl");
    c.arena.add_decl(arch, s);
    c.arena.add_stmt(arch, ca);

    c.simplify(arch);

    let proc = c.arena.stmts(arch)[0];
    assert_eq!(c.arena.kind(proc), Kind::Process);
    let body = c.arena.stmts(proc).to_vec();
    assert_eq!(c.arena.kind(body[0]), Kind::Assert);
    let wait = body[1];
    assert_eq!(c.arena.reference(c.arena.triggers(wait)[0]), s);
}

#[test]
fn sensitivity_deduplicates_by_declaration() {
    let mut c = ctx();
    let a = c.signal("a", c.bit_ty);
    let y = c.signal("y", c.bit_ty);

    // y <= a and a;  two distinct refs, one trigger.
    let r1 = c.sig_ref(a);
    let r2 = c.sig_ref(a);
    let d = c.predef("and");
    let call = c.arena.new_node(Kind::FCall, Loc::invalid());
    c.arena.set_ident(call, intern("and"));
    c.arena.set_ref(call, d);
    c.arena.add_param(call, Assoc::pos(0, r1));
    c.arena.add_param(call, Assoc::pos(1, r2));
    let wave = c.waveform(call);
    let ry = c.sig_ref(y);
    let cassign = c.arena.new_node(Kind::CAssign, Loc::invalid());
    c.arena.set_target(cassign, ry);
    c.arena.add_waveform(cassign, wave);

    let arch = c.arch("rtl");
    c.arena.add_decl(arch, a);
    c.arena.add_decl(arch, y);
    c.arena.add_stmt(arch, cassign);
    c.simplify(arch);

    let proc = c.arena.stmts(arch)[0];
    let wait = c.arena.stmts(proc)[1];
    assert_eq!(c.arena.triggers(wait).len(), 1);
}

#[test]
fn static_index_keeps_the_fine_grained_trigger() {
    let mut c = ctx();
    let elem_dims = {
        let lo = c.int_lit(0);
        let hi = c.int_lit(7);
        let r = c.arena.new_node(Kind::Range, Loc::invalid());
        c.arena.set_range_kind(r, RangeKind::To);
        c.arena.set_left(r, lo);
        c.arena.set_right(r, hi);
        vec![r]
    };
    let vec_ty = c.arena.types.new_type(
        intern("bit_vector"),
        TypeKind::Array {
            index: vec![c.int_ty],
            elem: c.bit_ty,
            dims: elem_dims,
        },
    );
    let mem = c.signal("mem", vec_ty);
    let idx_sig = c.signal("i", c.int_ty);
    let y = c.signal("y", c.bit_ty);

    // Static index: the whole indexed name is the trigger.
    let base1 = c.sig_ref(mem);
    let three = c.int_lit(3);
    let static_idx = c.arena.new_node(Kind::ArrayRef, Loc::invalid());
    c.arena.set_value(static_idx, base1);
    c.arena.add_param(static_idx, Assoc::pos(0, three));
    c.arena.set_type(static_idx, c.bit_ty);

    let wave1 = c.waveform(static_idx);
    let ry1 = c.sig_ref(y);
    let ca1 = c.arena.new_node(Kind::CAssign, Loc::invalid());
    c.arena.set_target(ca1, ry1);
    c.arena.add_waveform(ca1, wave1);

    let arch1 = c.arch("rtl1");
    c.arena.add_stmt(arch1, ca1);
    c.simplify(arch1);
    let wait1 = {
        let proc = c.arena.stmts(arch1)[0];
        c.arena.stmts(proc)[1]
    };
    let t1 = c.arena.triggers(wait1).to_vec();
    assert_eq!(t1.len(), 1);
    assert_eq!(c.arena.kind(t1[0]), Kind::ArrayRef);

    // Signal index: base signal and index signal are both triggers.
    let base2 = c.sig_ref(mem);
    let ri = c.sig_ref(idx_sig);
    let dyn_idx = c.arena.new_node(Kind::ArrayRef, Loc::invalid());
    c.arena.set_value(dyn_idx, base2);
    c.arena.add_param(dyn_idx, Assoc::pos(0, ri));
    c.arena.set_type(dyn_idx, c.bit_ty);

    let wave2 = c.waveform(dyn_idx);
    let ry2 = c.sig_ref(y);
    let ca2 = c.arena.new_node(Kind::CAssign, Loc::invalid());
    c.arena.set_target(ca2, ry2);
    c.arena.add_waveform(ca2, wave2);

    let arch2 = c.arch("rtl2");
    c.arena.add_stmt(arch2, ca2);
    c.simplify(arch2);
    let wait2 = {
        let proc = c.arena.stmts(arch2)[0];
        c.arena.stmts(proc)[1]
    };
    let t2: Vec<NodeId> = c
        .arena
        .triggers(wait2)
        .iter()
        .map(|&t| c.arena.reference(t))
        .collect();
    assert_eq!(t2, vec![mem, idx_sig]);
}

#[test]
fn named_call_arguments_are_normalized_to_positional() {
    let mut c = ctx();
    // procedure step(count : integer := 1; enable : boolean := true)
    let p = c.arena.new_node(Kind::ProcBody, Loc::invalid());
    c.arena.set_ident(p, intern("step"));
    let count = c.arena.new_node(Kind::PortDecl, Loc::invalid());
    c.arena.set_ident(count, intern("count"));
    c.arena.set_type(count, c.int_ty);
    c.arena.set_port_mode(count, PortMode::In);
    c.arena.set_class(count, Class::Constant);
    let one = c.int_lit(1);
    c.arena.set_value(count, one);
    let enable = c.arena.new_node(Kind::PortDecl, Loc::invalid());
    c.arena.set_ident(enable, intern("enable"));
    c.arena.set_type(enable, c.bool_ty);
    c.arena.set_port_mode(enable, PortMode::In);
    c.arena.set_class(enable, Class::Constant);
    let dflt = c.bool_ref(true);
    c.arena.set_value(enable, dflt);
    c.arena.add_port(p, count);
    c.arena.add_port(p, enable);

    // step(enable => false);
    let call = c.arena.new_node(Kind::PCall, Loc::invalid());
    c.arena.set_ident(call, intern("step"));
    c.arena.set_ref(call, p);
    let formal = c.sig_ref(enable);
    let actual = c.bool_ref(false);
    c.arena.add_param(call, Assoc::named(formal, actual));

    let proc = c.arena.new_node(Kind::Process, Loc::invalid());
    c.arena.add_stmt(proc, call);
    let arch = c.arch("rtl");
    c.arena.add_decl(arch, p);
    c.arena.add_stmt(arch, proc);

    c.simplify(arch);

    let params = c.arena.params(call).to_vec();
    assert_eq!(params.len(), 2);
    assert!(matches!(params[0].sel, AssocSel::Pos(0)));
    assert!(matches!(params[1].sel, AssocSel::Pos(1)));
    // count takes its default, enable the named actual.
    assert_eq!(params[0].value, one);
    assert_eq!(params[1].value, actual);
}

#[test]
fn select_assignment_desugars_to_a_case_process() {
    let mut c = ctx();
    let sel_sig = c.signal("sel", c.int_ty);
    let a = c.signal("a", c.bit_ty);
    let b = c.signal("b", c.bit_ty);
    let y = c.signal("y", c.bit_ty);

    let select = c.arena.new_node(Kind::SelectAssign, Loc::invalid());
    let ry = c.sig_ref(y);
    c.arena.set_target(select, ry);
    let rsel = c.sig_ref(sel_sig);
    c.arena.set_value(select, rsel);

    let zero = c.int_lit(0);
    let ra = c.sig_ref(a);
    let wa = c.waveform(ra);
    c.arena.add_assoc(select, Assoc::named(zero, wa));
    let rb = c.sig_ref(b);
    let wb = c.waveform(rb);
    c.arena.add_assoc(select, Assoc { sel: AssocSel::Others, value: wb });

    let arch = c.arch("rtl");
    for d in [sel_sig, a, b, y] {
        c.arena.add_decl(arch, d);
    }
    c.arena.add_stmt(arch, select);

    c.simplify(arch);

    let proc = c.arena.stmts(arch)[0];
    assert_eq!(c.arena.kind(proc), Kind::Process);
    let body = c.arena.stmts(proc).to_vec();
    assert_eq!(c.arena.kind(body[0]), Kind::CaseStmt);
    let arms = c.arena.assocs(body[0]).to_vec();
    assert_eq!(arms.len(), 2);
    assert_eq!(c.arena.kind(arms[0].value), Kind::SignalAssign);

    let wait = body[1];
    let triggers: Vec<NodeId> = c
        .arena
        .triggers(wait)
        .iter()
        .map(|&t| c.arena.reference(t))
        .collect();
    assert_eq!(triggers, vec![sel_sig, a, b]);
}

#[test]
fn all_sensitized_process_collects_body_reads() {
    let mut c = ctx();
    let clk = c.signal("clk", c.bit_ty);
    let d = c.signal("d", c.bit_ty);
    let en = c.signal("en", c.bit_ty);
    let q = c.signal("q", c.bit_ty);

    // procedure latch(v : bit) reads `en` in its body.
    let proc_body = c.arena.new_node(Kind::ProcBody, Loc::invalid());
    c.arena.set_ident(proc_body, intern("latch"));
    let v = c.arena.new_node(Kind::PortDecl, Loc::invalid());
    c.arena.set_ident(v, intern("v"));
    c.arena.set_port_mode(v, PortMode::In);
    c.arena.set_class(v, Class::Constant);
    c.arena.add_port(proc_body, v);
    let ren = c.sig_ref(en);
    let inner_assert = c.arena.new_node(Kind::Assert, Loc::invalid());
    c.arena.set_value(inner_assert, ren);
    c.arena.add_stmt(proc_body, inner_assert);

    // process (all) is begin
    //   if clk then q <= d; end if;
    //   latch(d);
    // end process;
    let rclk = c.sig_ref(clk);
    let rd = c.sig_ref(d);
    let wave = c.waveform(rd);
    let rq = c.sig_ref(q);
    let assign = c.arena.new_node(Kind::SignalAssign, Loc::invalid());
    c.arena.set_target(assign, rq);
    c.arena.add_waveform(assign, wave);
    let iff = c.arena.new_node(Kind::If, Loc::invalid());
    c.arena.set_value(iff, rclk);
    c.arena.add_stmt(iff, assign);

    let rd2 = c.sig_ref(d);
    let call = c.arena.new_node(Kind::PCall, Loc::invalid());
    c.arena.set_ident(call, intern("latch"));
    c.arena.set_ref(call, proc_body);
    c.arena.add_param(call, Assoc::pos(0, rd2));

    let proc = c.arena.new_node(Kind::Process, Loc::invalid());
    c.arena.set_flag(proc, Flags::ALL_SENSITIZED);
    c.arena.add_stmt(proc, iff);
    c.arena.add_stmt(proc, call);

    let arch = c.arch("rtl");
    for s in [clk, d, en, q] {
        c.arena.add_decl(arch, s);
    }
    c.arena.add_decl(arch, proc_body);
    c.arena.add_stmt(arch, proc);

    c.simplify(arch);

    // clk and d from the body, en through the called procedure; q is
    // only written, never read.
    let triggers: Vec<NodeId> = c
        .arena
        .triggers(proc)
        .iter()
        .map(|&t| c.arena.reference(t))
        .collect();
    assert_eq!(triggers, vec![clk, d, en]);
}

#[test]
fn null_statements_vanish() {
    let mut c = ctx();
    let nul = c.arena.new_node(Kind::NullStmt, Loc::invalid());
    let keep = c.arena.new_node(Kind::Wait, Loc::invalid());
    let proc = c.arena.new_node(Kind::Process, Loc::invalid());
    c.arena.add_stmt(proc, nul);
    c.arena.add_stmt(proc, keep);
    let arch = c.arch("rtl");
    c.arena.add_stmt(arch, proc);

    c.simplify(arch);
    assert_eq!(c.arena.stmts(proc), &[keep]);
}
