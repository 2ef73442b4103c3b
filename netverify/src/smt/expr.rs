// Netverify: Symbolic Verification of Network Control Planes
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Term representation with constant folding on construction.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Sort of a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sort {
    /// Boolean sort
    Bool,
    /// Unbounded integer sort
    Int,
    /// Bit-vector of the given width
    BitVec(u32),
}

/// Node of a term. Terms are shared through [`Expr`], and therefore form a DAG.
#[derive(Debug, PartialEq)]
pub enum Term {
    /// Boolean literal
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Bit-vector literal with its width
    BitVec(u64, u32),
    /// Free variable
    Var(String, Sort),
    /// Boolean negation
    Not(Expr),
    /// N-ary conjunction
    And(Vec<Expr>),
    /// N-ary disjunction
    Or(Vec<Expr>),
    /// Implication
    Implies(Expr, Expr),
    /// If-then-else
    Ite(Expr, Expr, Expr),
    /// Equality of two terms with the same sort
    Eq(Expr, Expr),
    /// Integer strict less-than
    Lt(Expr, Expr),
    /// Integer less-or-equal
    Le(Expr, Expr),
    /// Integer addition
    Add(Expr, Expr),
    /// Integer subtraction
    Sub(Expr, Expr),
    /// Bitwise and of two bit-vectors
    BvAnd(Expr, Expr),
    /// Unsigned less-or-equal of two bit-vectors
    BvUle(Expr, Expr),
}

/// Shared handle to a term. Cloning is cheap.
#[derive(Clone, PartialEq)]
pub struct Expr(Rc<Term>);

impl Expr {
    fn new(t: Term) -> Self {
        Self(Rc::new(t))
    }

    /// Access the underlying term node
    pub fn term(&self) -> &Term {
        &self.0
    }

    /// Address of the shared node, used to memoize traversals of the DAG.
    pub(crate) fn node_id(&self) -> *const Term {
        Rc::as_ptr(&self.0)
    }

    /// Boolean literal
    pub fn bool(b: bool) -> Self {
        Self::new(Term::Bool(b))
    }

    /// The literal `true`
    pub fn tru() -> Self {
        Self::bool(true)
    }

    /// The literal `false`
    pub fn fls() -> Self {
        Self::bool(false)
    }

    /// Integer literal
    pub fn int(i: i64) -> Self {
        Self::new(Term::Int(i))
    }

    /// Bit-vector literal. The value is truncated to `width` bits.
    pub fn bv(v: u64, width: u32) -> Self {
        Self::new(Term::BitVec(v & bv_mask(width), width))
    }

    /// Free variable. Prefer [`Context`](super::Context) to create variables, such that they are
    /// registered and show up in models.
    pub fn var(name: impl Into<String>, sort: Sort) -> Self {
        Self::new(Term::Var(name.into(), sort))
    }

    /// Returns the sort of the term
    pub fn sort(&self) -> Sort {
        match self.term() {
            Term::Bool(_)
            | Term::Not(_)
            | Term::And(_)
            | Term::Or(_)
            | Term::Implies(_, _)
            | Term::Eq(_, _)
            | Term::Lt(_, _)
            | Term::Le(_, _)
            | Term::BvUle(_, _) => Sort::Bool,
            Term::Int(_) | Term::Add(_, _) | Term::Sub(_, _) => Sort::Int,
            Term::BitVec(_, w) => Sort::BitVec(*w),
            Term::Var(_, s) => *s,
            Term::Ite(_, t, _) => t.sort(),
            Term::BvAnd(a, _) => a.sort(),
        }
    }

    /// Returns the boolean value if the term is a boolean literal
    pub fn as_bool(&self) -> Option<bool> {
        match self.term() {
            Term::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer value if the term is an integer literal
    pub fn as_int(&self) -> Option<i64> {
        match self.term() {
            Term::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value if the term is a bit-vector literal
    pub fn as_bv(&self) -> Option<u64> {
        match self.term() {
            Term::BitVec(v, _) => Some(*v),
            _ => None,
        }
    }

    /// Returns true if the term is the literal `true`
    pub fn is_true(&self) -> bool {
        self.as_bool() == Some(true)
    }

    /// Returns true if the term is the literal `false`
    pub fn is_false(&self) -> bool {
        self.as_bool() == Some(false)
    }

    /// Returns the name of the variable, if the term is a variable
    pub fn var_name(&self) -> Option<&str> {
        match self.term() {
            Term::Var(n, _) => Some(n),
            _ => None,
        }
    }

    fn is_literal(&self) -> bool {
        matches!(self.term(), Term::Bool(_) | Term::Int(_) | Term::BitVec(_, _))
    }

    /// Cheap syntactic identity: same node, equal literals or the same variable.
    pub fn same(&self, other: &Expr) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        match (self.term(), other.term()) {
            (Term::Bool(a), Term::Bool(b)) => a == b,
            (Term::Int(a), Term::Int(b)) => a == b,
            (Term::BitVec(a, wa), Term::BitVec(b, wb)) => a == b && wa == wb,
            (Term::Var(a, sa), Term::Var(b, sb)) => a == b && sa == sb,
            _ => false,
        }
    }

    /// Boolean negation
    pub fn not(&self) -> Expr {
        match self.term() {
            Term::Bool(b) => Expr::bool(!b),
            Term::Not(x) => x.clone(),
            _ => Expr::new(Term::Not(self.clone())),
        }
    }

    /// Conjunction of all terms. Nested conjunctions are flattened.
    pub fn and_all<I: IntoIterator<Item = Expr>>(terms: I) -> Expr {
        let mut args = Vec::new();
        for t in terms {
            match t.term() {
                Term::Bool(true) => {}
                Term::Bool(false) => return Expr::fls(),
                Term::And(inner) => args.extend(inner.iter().cloned()),
                _ => args.push(t),
            }
        }
        match args.len() {
            0 => Expr::tru(),
            1 => args.pop().unwrap_or_else(Expr::tru),
            _ => Expr::new(Term::And(args)),
        }
    }

    /// Disjunction of all terms. Nested disjunctions are flattened.
    pub fn or_all<I: IntoIterator<Item = Expr>>(terms: I) -> Expr {
        let mut args = Vec::new();
        for t in terms {
            match t.term() {
                Term::Bool(false) => {}
                Term::Bool(true) => return Expr::tru(),
                Term::Or(inner) => args.extend(inner.iter().cloned()),
                _ => args.push(t),
            }
        }
        match args.len() {
            0 => Expr::fls(),
            1 => args.pop().unwrap_or_else(Expr::fls),
            _ => Expr::new(Term::Or(args)),
        }
    }

    /// Binary conjunction
    pub fn and(&self, other: &Expr) -> Expr {
        Expr::and_all(vec![self.clone(), other.clone()])
    }

    /// Binary disjunction
    pub fn or(&self, other: &Expr) -> Expr {
        Expr::or_all(vec![self.clone(), other.clone()])
    }

    /// Implication `self => other`
    pub fn implies(&self, other: &Expr) -> Expr {
        match (self.as_bool(), other.as_bool()) {
            (Some(false), _) | (_, Some(true)) => Expr::tru(),
            (Some(true), _) => other.clone(),
            (_, Some(false)) => self.not(),
            _ => Expr::new(Term::Implies(self.clone(), other.clone())),
        }
    }

    /// If-then-else
    pub fn ite(cond: &Expr, then: &Expr, els: &Expr) -> Expr {
        match cond.as_bool() {
            Some(true) => return then.clone(),
            Some(false) => return els.clone(),
            None => {}
        }
        if then.same(els) {
            return then.clone();
        }
        match (then.as_bool(), els.as_bool()) {
            (Some(true), Some(false)) => cond.clone(),
            (Some(false), Some(true)) => cond.not(),
            (Some(true), None) => cond.or(els),
            (Some(false), None) => cond.not().and(els),
            (None, Some(true)) => cond.not().or(then),
            (None, Some(false)) => cond.and(then),
            _ => Expr::new(Term::Ite(cond.clone(), then.clone(), els.clone())),
        }
    }

    /// Equality
    pub fn equals(&self, other: &Expr) -> Expr {
        if self.same(other) {
            return Expr::tru();
        }
        if self.is_literal() && other.is_literal() {
            return Expr::fls();
        }
        match (self.as_bool(), other.as_bool()) {
            (Some(true), _) => other.clone(),
            (Some(false), _) => other.not(),
            (_, Some(true)) => self.clone(),
            (_, Some(false)) => self.not(),
            _ => Expr::new(Term::Eq(self.clone(), other.clone())),
        }
    }

    /// Integer `self < other`
    pub fn lt(&self, other: &Expr) -> Expr {
        match (self.as_int(), other.as_int()) {
            (Some(a), Some(b)) => Expr::bool(a < b),
            _ if self.same(other) => Expr::fls(),
            _ => Expr::new(Term::Lt(self.clone(), other.clone())),
        }
    }

    /// Integer `self <= other`
    pub fn le(&self, other: &Expr) -> Expr {
        match (self.as_int(), other.as_int()) {
            (Some(a), Some(b)) => Expr::bool(a <= b),
            _ if self.same(other) => Expr::tru(),
            _ => Expr::new(Term::Le(self.clone(), other.clone())),
        }
    }

    /// Integer `self > other`
    pub fn gt(&self, other: &Expr) -> Expr {
        other.lt(self)
    }

    /// Integer `self >= other`
    pub fn ge(&self, other: &Expr) -> Expr {
        other.le(self)
    }

    /// Integer addition
    pub fn add(&self, other: &Expr) -> Expr {
        match (self.as_int(), other.as_int()) {
            (Some(a), Some(b)) => Expr::int(a.saturating_add(b)),
            (_, Some(0)) => self.clone(),
            (Some(0), _) => other.clone(),
            _ => Expr::new(Term::Add(self.clone(), other.clone())),
        }
    }

    /// Integer subtraction
    pub fn sub(&self, other: &Expr) -> Expr {
        match (self.as_int(), other.as_int()) {
            (Some(a), Some(b)) => Expr::int(a.saturating_sub(b)),
            (_, Some(0)) => self.clone(),
            _ => Expr::new(Term::Sub(self.clone(), other.clone())),
        }
    }

    /// Bitwise and
    pub fn bvand(&self, other: &Expr) -> Expr {
        match (self.term(), other.term()) {
            (Term::BitVec(a, w), Term::BitVec(b, _)) => Expr::bv(a & b, *w),
            _ => Expr::new(Term::BvAnd(self.clone(), other.clone())),
        }
    }

    /// Unsigned `self <= other` on bit-vectors
    pub fn bvule(&self, other: &Expr) -> Expr {
        match (self.as_bv(), other.as_bv()) {
            (Some(a), Some(b)) => Expr::bool(a <= b),
            _ => Expr::new(Term::BvUle(self.clone(), other.clone())),
        }
    }

    /// Rebuild the term bottom-up through the folding constructors. Shared nodes are visited once.
    pub fn simplify(&self) -> Expr {
        let mut memo = HashMap::new();
        self.simplify_memo(&mut memo)
    }

    fn simplify_memo(&self, memo: &mut HashMap<*const Term, Expr>) -> Expr {
        if let Some(e) = memo.get(&self.node_id()) {
            return e.clone();
        }
        let result = match self.term() {
            Term::Bool(_) | Term::Int(_) | Term::BitVec(_, _) | Term::Var(_, _) => self.clone(),
            Term::Not(x) => x.simplify_memo(memo).not(),
            Term::And(xs) => {
                let args: Vec<Expr> = xs.iter().map(|x| x.simplify_memo(memo)).collect();
                Expr::and_all(args)
            }
            Term::Or(xs) => {
                let args: Vec<Expr> = xs.iter().map(|x| x.simplify_memo(memo)).collect();
                Expr::or_all(args)
            }
            Term::Implies(a, b) => a.simplify_memo(memo).implies(&b.simplify_memo(memo)),
            Term::Ite(c, t, e) => {
                let c = c.simplify_memo(memo);
                let t = t.simplify_memo(memo);
                let e = e.simplify_memo(memo);
                Expr::ite(&c, &t, &e)
            }
            Term::Eq(a, b) => a.simplify_memo(memo).equals(&b.simplify_memo(memo)),
            Term::Lt(a, b) => a.simplify_memo(memo).lt(&b.simplify_memo(memo)),
            Term::Le(a, b) => a.simplify_memo(memo).le(&b.simplify_memo(memo)),
            Term::Add(a, b) => a.simplify_memo(memo).add(&b.simplify_memo(memo)),
            Term::Sub(a, b) => a.simplify_memo(memo).sub(&b.simplify_memo(memo)),
            Term::BvAnd(a, b) => a.simplify_memo(memo).bvand(&b.simplify_memo(memo)),
            Term::BvUle(a, b) => a.simplify_memo(memo).bvule(&b.simplify_memo(memo)),
        };
        memo.insert(self.node_id(), result.clone());
        result
    }

    /// Returns true if the SMT-LIB serialization of this term has at most `limit` characters.
    /// Serialization stops as soon as the limit is exceeded.
    pub fn serialized_len_within(&self, limit: usize) -> bool {
        let mut w = BoundedWriter { len: 0, limit };
        fmt::write(&mut w, format_args!("{}", self)).is_ok()
    }
}

fn bv_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

struct BoundedWriter {
    len: usize,
    limit: usize,
}

impl fmt::Write for BoundedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.len += s.len();
        if self.len > self.limit {
            Err(fmt::Error)
        } else {
            Ok(())
        }
    }
}

fn write_app(f: &mut fmt::Formatter<'_>, op: &str, args: &[&Expr]) -> fmt::Result {
    write!(f, "({}", op)?;
    for a in args {
        write!(f, " {}", a)?;
    }
    write!(f, ")")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.term() {
            Term::Bool(b) => write!(f, "{}", b),
            Term::Int(i) if *i < 0 => write!(f, "(- {})", i.unsigned_abs()),
            Term::Int(i) => write!(f, "{}", i),
            Term::BitVec(v, w) if w % 4 == 0 => {
                write!(f, "#x{:0width$x}", v, width = (*w / 4) as usize)
            }
            Term::BitVec(v, w) => write!(f, "(_ bv{} {})", v, w),
            Term::Var(n, _) => write!(f, "{}", n),
            Term::Not(x) => write_app(f, "not", &[x]),
            Term::And(xs) => write_app(f, "and", &xs.iter().collect::<Vec<_>>()),
            Term::Or(xs) => write_app(f, "or", &xs.iter().collect::<Vec<_>>()),
            Term::Implies(a, b) => write_app(f, "=>", &[a, b]),
            Term::Ite(c, t, e) => write_app(f, "ite", &[c, t, e]),
            Term::Eq(a, b) => write_app(f, "=", &[a, b]),
            Term::Lt(a, b) => write_app(f, "<", &[a, b]),
            Term::Le(a, b) => write_app(f, "<=", &[a, b]),
            Term::Add(a, b) => write_app(f, "+", &[a, b]),
            Term::Sub(a, b) => write_app(f, "-", &[a, b]),
            Term::BvAnd(a, b) => write_app(f, "bvand", &[a, b]),
            Term::BvUle(a, b) => write_app(f, "bvule", &[a, b]),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn folding_connectives() {
        let a = Expr::var("a", Sort::Bool);
        let b = Expr::var("b", Sort::Bool);
        assert!(a.and(&Expr::fls()).is_false());
        assert!(a.or(&Expr::tru()).is_true());
        assert_eq!(a.and(&Expr::tru()), a);
        assert_eq!(a.not().not(), a);
        assert_eq!(Expr::ite(&a, &Expr::tru(), &Expr::fls()), a);
        assert_eq!(Expr::ite(&a, &b, &b), b);
        assert_eq!(Expr::and_all(vec![a.and(&b), a.clone()]).to_string(), "(and a b a)");
    }

    #[test]
    fn folding_arithmetic() {
        let x = Expr::var("x", Sort::Int);
        assert_eq!(Expr::int(3).add(&Expr::int(4)), Expr::int(7));
        assert_eq!(x.add(&Expr::int(0)), x);
        assert!(Expr::int(3).lt(&Expr::int(4)).is_true());
        assert!(x.le(&x).is_true());
        assert!(Expr::int(1).equals(&Expr::int(2)).is_false());
        assert!(Expr::bv(0xff, 8).bvand(&Expr::bv(0x0f, 8)).same(&Expr::bv(0x0f, 8)));
    }

    #[test]
    fn serialization() {
        let x = Expr::var("x", Sort::Int);
        let c = Expr::var("c", Sort::Bool);
        let e = Expr::ite(&c, &x.add(&Expr::int(2)), &Expr::int(-1));
        assert_eq!(e.to_string(), "(ite c (+ x 2) (- 1))");
        assert_eq!(Expr::bv(10, 32).to_string(), "#x0000000a");
        assert!(e.serialized_len_within(100));
        assert!(!e.serialized_len_within(5));
    }

    #[test]
    fn simplify_rebuilds() {
        let c = Expr::var("c", Sort::Bool);
        let raw = Expr::new(Term::And(vec![c.clone(), Expr::new(Term::Not(Expr::fls()))]));
        assert_eq!(raw.simplify(), c);
    }
}
