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

//! Concrete assignments returned by a solver.

use super::{Expr, SmtError, Sort, Term};
use std::collections::HashMap;
use std::fmt;

/// Concrete value of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Bit-vector value
    BitVec(u64),
}

impl Value {
    /// Default value of a sort, used for variables the model does not mention.
    pub fn default_of(sort: Sort) -> Self {
        match sort {
            Sort::Bool => Value::Bool(false),
            Sort::Int => Value::Int(0),
            Sort::BitVec(_) => Value::BitVec(0),
        }
    }

    fn sort_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::BitVec(_) => "BitVec",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::BitVec(v) => write!(f, "{}", v),
        }
    }
}

/// Total assignment of variables. Variables without an entry evaluate to the default of their
/// sort.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    values: HashMap<String, Value>,
}

impl Model {
    /// Create an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of a variable
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Get the value assigned to a variable, if any
    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).copied()
    }

    /// Number of explicitly assigned variables
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no variable is explicitly assigned
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Evaluate a term under this model.
    pub fn eval(&self, e: &Expr) -> Result<Value, SmtError> {
        let mut memo = HashMap::new();
        self.eval_memo(e, &mut memo)
    }

    /// Evaluate a boolean term
    pub fn eval_bool(&self, e: &Expr) -> Result<bool, SmtError> {
        match self.eval(e)? {
            Value::Bool(b) => Ok(b),
            v => Err(SmtError::SortMismatch(e.to_string(), "Bool", v.sort_name())),
        }
    }

    /// Evaluate an integer or bit-vector term as a number
    pub fn eval_int(&self, e: &Expr) -> Result<i64, SmtError> {
        match self.eval(e)? {
            Value::Int(i) => Ok(i),
            Value::BitVec(v) => Ok(v as i64),
            v => Err(SmtError::SortMismatch(e.to_string(), "Int", v.sort_name())),
        }
    }

    fn eval_memo(
        &self,
        e: &Expr,
        memo: &mut HashMap<*const Term, Value>,
    ) -> Result<Value, SmtError> {
        if let Some(v) = memo.get(&e.node_id()) {
            return Ok(*v);
        }
        let bool_of = |v: Value, e: &Expr| match v {
            Value::Bool(b) => Ok(b),
            v => Err(SmtError::SortMismatch(e.to_string(), "Bool", v.sort_name())),
        };
        let int_of = |v: Value, e: &Expr| match v {
            Value::Int(i) => Ok(i),
            v => Err(SmtError::SortMismatch(e.to_string(), "Int", v.sort_name())),
        };
        let bv_of = |v: Value, e: &Expr| match v {
            Value::BitVec(b) => Ok(b),
            v => Err(SmtError::SortMismatch(e.to_string(), "BitVec", v.sort_name())),
        };
        let result = match e.term() {
            Term::Bool(b) => Value::Bool(*b),
            Term::Int(i) => Value::Int(*i),
            Term::BitVec(v, _) => Value::BitVec(*v),
            Term::Var(name, sort) => match self.values.get(name) {
                Some(v) => *v,
                None => Value::default_of(*sort),
            },
            Term::Not(x) => Value::Bool(!bool_of(self.eval_memo(x, memo)?, x)?),
            Term::And(xs) => {
                let mut r = true;
                for x in xs {
                    if !bool_of(self.eval_memo(x, memo)?, x)? {
                        r = false;
                        break;
                    }
                }
                Value::Bool(r)
            }
            Term::Or(xs) => {
                let mut r = false;
                for x in xs {
                    if bool_of(self.eval_memo(x, memo)?, x)? {
                        r = true;
                        break;
                    }
                }
                Value::Bool(r)
            }
            Term::Implies(a, b) => {
                let a = bool_of(self.eval_memo(a, memo)?, a)?;
                Value::Bool(!a || bool_of(self.eval_memo(b, memo)?, b)?)
            }
            Term::Ite(c, t, f) => {
                if bool_of(self.eval_memo(c, memo)?, c)? {
                    self.eval_memo(t, memo)?
                } else {
                    self.eval_memo(f, memo)?
                }
            }
            Term::Eq(a, b) => {
                let va = self.eval_memo(a, memo)?;
                let vb = self.eval_memo(b, memo)?;
                Value::Bool(va == vb)
            }
            Term::Lt(a, b) => {
                let va = int_of(self.eval_memo(a, memo)?, a)?;
                Value::Bool(va < int_of(self.eval_memo(b, memo)?, b)?)
            }
            Term::Le(a, b) => {
                let va = int_of(self.eval_memo(a, memo)?, a)?;
                Value::Bool(va <= int_of(self.eval_memo(b, memo)?, b)?)
            }
            Term::Add(a, b) => {
                let va = int_of(self.eval_memo(a, memo)?, a)?;
                Value::Int(va.saturating_add(int_of(self.eval_memo(b, memo)?, b)?))
            }
            Term::Sub(a, b) => {
                let va = int_of(self.eval_memo(a, memo)?, a)?;
                Value::Int(va.saturating_sub(int_of(self.eval_memo(b, memo)?, b)?))
            }
            Term::BvAnd(a, b) => {
                let va = bv_of(self.eval_memo(a, memo)?, a)?;
                Value::BitVec(va & bv_of(self.eval_memo(b, memo)?, b)?)
            }
            Term::BvUle(a, b) => {
                let va = bv_of(self.eval_memo(a, memo)?, a)?;
                Value::Bool(va <= bv_of(self.eval_memo(b, memo)?, b)?)
            }
        };
        memo.insert(e.node_id(), result);
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn eval_total() {
        let x = Expr::var("x", Sort::Int);
        let c = Expr::var("c", Sort::Bool);
        let e = Expr::ite(&c, &x.add(&Expr::int(2)), &Expr::int(7));
        let mut m = Model::new();
        assert_eq!(m.eval(&e), Ok(Value::Int(7)));
        m.set("c", Value::Bool(true)).set("x", Value::Int(5));
        assert_eq!(m.eval(&e), Ok(Value::Int(7)));
        m.set("x", Value::Int(1));
        assert_eq!(m.eval_int(&e), Ok(3));
    }

    #[test]
    fn eval_sort_mismatch() {
        let x = Expr::var("x", Sort::Int);
        let mut m = Model::new();
        m.set("x", Value::Bool(true));
        assert!(m.eval_int(&x.add(&Expr::var("y", Sort::Int))).is_err());
    }

    #[test]
    fn eval_bitvec() {
        let ip = Expr::var("ip", Sort::BitVec(32));
        let mask = Expr::bv(0xffff_ff00, 32);
        let mut m = Model::new();
        m.set("ip", Value::BitVec(0x0a00_0005));
        let e = ip.bvand(&mask).equals(&Expr::bv(0x0a00_0000, 32));
        assert_eq!(m.eval_bool(&e), Ok(true));
    }
}
