/// Constant-fold evaluator.
///
/// Runs thunks produced by `lower` on a small value stack and turns the
/// result back into a literal node typed like the folded expression.
/// Every failure mode (division by zero, step budget, missing body,
/// arithmetic overflow) aborts the fold and leaves the original node in
/// place; the pass decides whether to warn.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ident::Ident;
use crate::kind::Kind;
use crate::lower::{self, Op, Thunk};
use crate::tree::{Arena, LitValue, NodeId};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExecFlags: u32 {
        /// Allow folding calls to user-defined functions.
        const FCALL = 1 << 0;
        /// Emit a warning when a fold is prevented.
        const WARN = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Int(i64),
    Real(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldFail {
    DivZero,
    Overflow,
    Budget,
    NoBody,
    /// Control fell off the end of a function body.
    NoReturn,
    /// The result does not fit the expression's type.
    Range,
}

impl FoldFail {
    pub fn describe(self) -> &'static str {
        match self {
            FoldFail::DivZero => "division by zero",
            FoldFail::Overflow => "arithmetic overflow",
            FoldFail::Budget => "evaluation budget exhausted",
            FoldFail::NoBody => "subprogram has no body available",
            FoldFail::NoReturn => "function did not return a value",
            FoldFail::Range => "result out of range for its type",
        }
    }
}

const MAX_CALL_DEPTH: usize = 64;

pub struct Exec {
    flags: ExecFlags,
    budget: u64,
    subprograms: HashMap<Ident, NodeId>,
    thunks: HashMap<NodeId, Option<Rc<Thunk>>>,
}

impl Exec {
    pub fn new(flags: ExecFlags, budget: u64) -> Exec {
        Exec {
            flags,
            budget: budget.max(1),
            subprograms: HashMap::new(),
            thunks: HashMap::new(),
        }
    }

    pub fn flags(&self) -> ExecFlags {
        self.flags
    }

    /// Install the demand-lower table: subprogram bodies by name,
    /// collected by the global pass before rewriting.
    pub fn set_subprograms(&mut self, table: HashMap<Ident, NodeId>) {
        self.subprograms = table;
        self.thunks.clear();
    }

    /// Whether a call through `decl` could be folded: predefined
    /// operators always, user functions only with a known body and the
    /// FCALL flag.
    pub fn has_body(&self, arena: &Arena, decl: NodeId) -> bool {
        if arena.kind(decl) == Kind::FuncBody {
            return true;
        }
        arena.has_ident(decl) && self.subprograms.contains_key(&arena.ident(decl))
    }

    /// Run `thunk` and replace `expr` with the resulting literal.
    pub fn fold(
        &mut self,
        arena: &mut Arena,
        expr: NodeId,
        thunk: &Thunk,
    ) -> Result<NodeId, FoldFail> {
        let mut steps = self.budget;
        let value = self.run(arena, thunk, Vec::new(), 0, &mut steps)?;
        self.materialize(arena, expr, value)
    }

    fn body_thunk(&mut self, arena: &Arena, decl: NodeId) -> Option<Rc<Thunk>> {
        if let Some(cached) = self.thunks.get(&decl) {
            return cached.clone();
        }
        let body = if arena.kind(decl) == Kind::FuncBody {
            Some(decl)
        } else if arena.has_ident(decl) {
            self.subprograms.get(&arena.ident(decl)).copied()
        } else {
            None
        };
        let thunk = body.and_then(|b| lower::lower_body(arena, b)).map(Rc::new);
        self.thunks.insert(decl, thunk.clone());
        thunk
    }

    fn run(
        &mut self,
        arena: &Arena,
        thunk: &Thunk,
        args: Vec<Value>,
        depth: usize,
        steps: &mut u64,
    ) -> Result<Value, FoldFail> {
        if depth > MAX_CALL_DEPTH {
            return Err(FoldFail::Budget);
        }
        let mut locals = args;
        locals.resize(thunk.nlocals.max(locals.len()), Value::Int(0));
        let mut stack: Vec<Value> = Vec::new();
        let mut ip = 0usize;

        macro_rules! pop {
            () => {
                stack.pop().expect("evaluator stack underflow")
            };
        }

        while ip < thunk.code.len() {
            if *steps == 0 {
                return Err(FoldFail::Budget);
            }
            *steps -= 1;

            let op = thunk.code[ip];
            ip += 1;
            match op {
                Op::PushInt(v) => stack.push(Value::Int(v)),
                Op::PushReal(v) => stack.push(Value::Real(v)),
                Op::Load(idx) => stack.push(locals[idx]),
                Op::Store(idx) => {
                    let v = pop!();
                    locals[idx] = v;
                }
                Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod | Op::Rem => {
                    let rhs = pop!();
                    let lhs = pop!();
                    stack.push(arith(op, lhs, rhs)?);
                }
                Op::Neg => {
                    let v = pop!();
                    stack.push(match v {
                        Value::Int(i) => Value::Int(i.checked_neg().ok_or(FoldFail::Overflow)?),
                        Value::Real(r) => Value::Real(-r),
                    });
                }
                Op::Abs => {
                    let v = pop!();
                    stack.push(match v {
                        Value::Int(i) => Value::Int(i.checked_abs().ok_or(FoldFail::Overflow)?),
                        Value::Real(r) => Value::Real(r.abs()),
                    });
                }
                Op::Not => {
                    let v = int_of(pop!());
                    stack.push(Value::Int(if v == 0 { 1 } else { 0 }));
                }
                Op::And | Op::Or | Op::Xor => {
                    let rhs = int_of(pop!());
                    let lhs = int_of(pop!());
                    let r = match op {
                        Op::And => lhs & rhs,
                        Op::Or => lhs | rhs,
                        _ => lhs ^ rhs,
                    };
                    stack.push(Value::Int(r));
                }
                Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge => {
                    let rhs = pop!();
                    let lhs = pop!();
                    stack.push(Value::Int(compare(op, lhs, rhs) as i64));
                }
                Op::IntToReal => {
                    let v = pop!();
                    stack.push(Value::Real(match v {
                        Value::Int(i) => i as f64,
                        Value::Real(r) => r,
                    }));
                }
                Op::RealToInt => {
                    let v = pop!();
                    stack.push(Value::Int(match v {
                        Value::Int(i) => i,
                        // Round to nearest, as the language requires.
                        Value::Real(r) => r.round() as i64,
                    }));
                }
                Op::Call { decl, nargs } => {
                    if !self.flags.contains(ExecFlags::FCALL) {
                        return Err(FoldFail::NoBody);
                    }
                    let thunk = self.body_thunk(arena, decl).ok_or(FoldFail::NoBody)?;
                    let mut call_args = Vec::with_capacity(nargs);
                    for _ in 0..nargs {
                        call_args.push(pop!());
                    }
                    call_args.reverse();
                    let result = self.run(arena, &thunk, call_args, depth + 1, steps)?;
                    stack.push(result);
                }
                Op::Jump(target) => ip = target,
                Op::JumpIfFalse(target) => {
                    if int_of(pop!()) == 0 {
                        ip = target;
                    }
                }
                Op::Ret => {
                    return Ok(pop!());
                }
            }
        }
        Err(FoldFail::NoReturn)
    }

    fn materialize(
        &self,
        arena: &mut Arena,
        expr: NodeId,
        value: Value,
    ) -> Result<NodeId, FoldFail> {
        let ty = arena.type_of(expr);
        let loc = arena.loc(expr);

        if arena.types.is_enum(ty) {
            let pos = int_of(value);
            let literals = arena.types.enum_literals(ty).to_vec();
            let decl = *literals
                .get(usize::try_from(pos).map_err(|_| FoldFail::Range)?)
                .ok_or(FoldFail::Range)?;
            let r = arena.new_node(Kind::Ref, loc);
            arena.set_ident(r, arena.ident(decl));
            arena.set_ref(r, decl);
            arena.set_type(r, ty);
            return Ok(r);
        }

        let lit = arena.new_node(Kind::Literal, loc);
        if arena.types.is_real(ty) {
            let v = match value {
                Value::Int(i) => i as f64,
                Value::Real(r) => r,
            };
            arena.set_literal(lit, LitValue::Real(v));
        } else {
            arena.set_literal(lit, LitValue::Int(int_of(value)));
        }
        arena.set_type(lit, ty);
        Ok(lit)
    }
}

fn int_of(v: Value) -> i64 {
    match v {
        Value::Int(i) => i,
        Value::Real(r) => r as i64,
    }
}

fn arith(op: Op, lhs: Value, rhs: Value) -> Result<Value, FoldFail> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            let r = match op {
                Op::Add => a.checked_add(b),
                Op::Sub => a.checked_sub(b),
                Op::Mul => a.checked_mul(b),
                Op::Div => {
                    if b == 0 {
                        return Err(FoldFail::DivZero);
                    }
                    a.checked_div(b)
                }
                Op::Rem => {
                    if b == 0 {
                        return Err(FoldFail::DivZero);
                    }
                    a.checked_rem(b)
                }
                Op::Mod => {
                    if b == 0 {
                        return Err(FoldFail::DivZero);
                    }
                    // mod takes the sign of the divisor.
                    a.checked_rem(b).map(|r| if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
                }
                _ => unreachable!(),
            };
            r.map(Value::Int).ok_or(FoldFail::Overflow)
        }
        (a, b) => {
            let fa = match a {
                Value::Int(i) => i as f64,
                Value::Real(r) => r,
            };
            let fb = match b {
                Value::Int(i) => i as f64,
                Value::Real(r) => r,
            };
            let r = match op {
                Op::Add => fa + fb,
                Op::Sub => fa - fb,
                Op::Mul => fa * fb,
                Op::Div => {
                    if fb == 0.0 {
                        return Err(FoldFail::DivZero);
                    }
                    fa / fb
                }
                Op::Mod | Op::Rem => {
                    if fb == 0.0 {
                        return Err(FoldFail::DivZero);
                    }
                    fa % fb
                }
                _ => unreachable!(),
            };
            Ok(Value::Real(r))
        }
    }
}

fn compare(op: Op, lhs: Value, rhs: Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => match op {
            Op::Eq => a == b,
            Op::Ne => a != b,
            Op::Lt => a < b,
            Op::Le => a <= b,
            Op::Gt => a > b,
            Op::Ge => a >= b,
            _ => unreachable!(),
        },
        (a, b) => {
            let fa = match a {
                Value::Int(i) => i as f64,
                Value::Real(r) => r,
            };
            let fb = match b {
                Value::Int(i) => i as f64,
                Value::Real(r) => r,
            };
            match op {
                Op::Eq => fa == fb,
                Op::Ne => fa != fb,
                Op::Lt => fa < fb,
                Op::Le => fa <= fb,
                Op::Gt => fa > fb,
                Op::Ge => fa >= fb,
                _ => unreachable!(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::intern;
    use crate::kind::Flags;
    use crate::loc::Loc;
    use crate::lower::lower_thunk;
    use crate::ttype::TypeKind;
    use crate::tree::Assoc;

    fn int_type(a: &mut Arena) -> crate::ttype::TypeId {
        a.types
            .new_type(intern("integer"), TypeKind::Integer { dims: vec![] })
    }

    fn lit(a: &mut Arena, v: i64) -> NodeId {
        let n = a.new_node(Kind::Literal, Loc::invalid());
        a.set_literal(n, LitValue::Int(v));
        n
    }

    fn binop(a: &mut Arena, name: &str, l: NodeId, r: NodeId) -> NodeId {
        let d = a.new_node(Kind::FuncDecl, Loc::invalid());
        a.set_ident(d, intern(name));
        a.set_flag(d, Flags::PREDEFINED);
        let call = a.new_node(Kind::FCall, Loc::invalid());
        a.set_ident(call, intern(name));
        a.set_ref(call, d);
        a.add_param(call, Assoc::pos(0, l));
        a.add_param(call, Assoc::pos(1, r));
        call
    }

    #[test]
    fn folds_arithmetic_to_a_literal() {
        let mut a = Arena::new();
        let ty = int_type(&mut a);
        let three = lit(&mut a, 3);
        let four = lit(&mut a, 4);
        let mul = binop(&mut a, "*", three, four);
        let two = lit(&mut a, 2);
        let add = binop(&mut a, "+", two, mul);
        a.set_type(add, ty);

        let thunk = lower_thunk(&a, add).unwrap();
        let mut exec = Exec::new(ExecFlags::empty(), 1000);
        let folded = exec.fold(&mut a, add, &thunk).unwrap();
        assert_eq!(a.folded_int(folded), Some(14));
        assert_eq!(a.type_of(folded), ty);
    }

    #[test]
    fn division_by_zero_aborts_the_fold() {
        let mut a = Arena::new();
        let ty = int_type(&mut a);
        let one = lit(&mut a, 1);
        let zero = lit(&mut a, 0);
        let div = binop(&mut a, "/", one, zero);
        a.set_type(div, ty);

        let thunk = lower_thunk(&a, div).unwrap();
        let mut exec = Exec::new(ExecFlags::empty(), 1000);
        assert_eq!(exec.fold(&mut a, div, &thunk), Err(FoldFail::DivZero));
    }

    #[test]
    fn mod_follows_the_divisor_sign() {
        assert_eq!(
            arith(Op::Mod, Value::Int(-7), Value::Int(3)),
            Ok(Value::Int(2))
        );
        assert_eq!(
            arith(Op::Rem, Value::Int(-7), Value::Int(3)),
            Ok(Value::Int(-1))
        );
    }

    #[test]
    fn user_function_calls_fold_with_fcall() {
        let mut a = Arena::new();
        let ty = int_type(&mut a);

        // function twice(x : integer) return integer is
        //   begin return x + x; end;
        let body = a.new_node(Kind::FuncBody, Loc::invalid());
        a.set_ident(body, intern("twice"));
        let x = a.new_node(Kind::PortDecl, Loc::invalid());
        a.set_ident(x, intern("x"));
        a.add_port(body, x);
        let xr = a.new_node(Kind::Ref, Loc::invalid());
        a.set_ident(xr, intern("x"));
        a.set_ref(xr, x);
        let sum = binop(&mut a, "+", xr, xr);
        let ret = a.new_node(Kind::Return, Loc::invalid());
        a.set_value(ret, sum);
        a.add_stmt(body, ret);

        let twenty_one = lit(&mut a, 21);
        let call = a.new_node(Kind::FCall, Loc::invalid());
        a.set_ident(call, intern("twice"));
        a.set_ref(call, body);
        a.add_param(call, Assoc::pos(0, twenty_one));
        a.set_type(call, ty);

        let thunk = lower_thunk(&a, call).unwrap();

        let mut without = Exec::new(ExecFlags::empty(), 1000);
        assert_eq!(without.fold(&mut a, call, &thunk), Err(FoldFail::NoBody));

        let mut with = Exec::new(ExecFlags::FCALL, 1000);
        let folded = with.fold(&mut a, call, &thunk).unwrap();
        assert_eq!(a.folded_int(folded), Some(42));
    }

    #[test]
    fn runaway_loops_hit_the_budget() {
        let mut a = Arena::new();
        let ty = int_type(&mut a);

        // function spin return integer is begin
        //   while true loop null; end loop; return 0; end;
        let body = a.new_node(Kind::FuncBody, Loc::invalid());
        a.set_ident(body, intern("spin"));
        let t = lit(&mut a, 1);
        let w = a.new_node(Kind::While, Loc::invalid());
        a.set_value(w, t);
        let nul = a.new_node(Kind::NullStmt, Loc::invalid());
        a.add_stmt(w, nul);
        a.add_stmt(body, w);
        let ret = a.new_node(Kind::Return, Loc::invalid());
        let zero = lit(&mut a, 0);
        a.set_value(ret, zero);
        a.add_stmt(body, ret);

        let call = a.new_node(Kind::FCall, Loc::invalid());
        a.set_ident(call, intern("spin"));
        a.set_ref(call, body);
        a.set_type(call, ty);

        let thunk = lower_thunk(&a, call).unwrap();
        let mut exec = Exec::new(ExecFlags::FCALL, 500);
        assert_eq!(exec.fold(&mut a, call, &thunk), Err(FoldFail::Budget));
    }
}
