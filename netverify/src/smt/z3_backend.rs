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

//! Translation of contexts to z3.

use super::{Context, Expr, Model, SatAnswer, SmtError, Solver, Sort, Term, Value};
use log::*;
use std::collections::HashMap;
use z3::ast::{Ast, Bool, Int, BV};
use z3::SatResult;

#[derive(Clone)]
enum Z3Term {
    Bool(Bool),
    Int(Int),
    Bv(BV),
}

impl Z3Term {
    fn into_bool(self) -> Result<Bool, SmtError> {
        match self {
            Z3Term::Bool(b) => Ok(b),
            _ => Err(SmtError::Backend("expected a boolean term".to_string())),
        }
    }

    fn into_int(self) -> Result<Int, SmtError> {
        match self {
            Z3Term::Int(i) => Ok(i),
            _ => Err(SmtError::Backend("expected an integer term".to_string())),
        }
    }

    fn into_bv(self) -> Result<BV, SmtError> {
        match self {
            Z3Term::Bv(b) => Ok(b),
            _ => Err(SmtError::Backend("expected a bit-vector term".to_string())),
        }
    }
}

/// Solver backed by z3. Every call to [`Solver::check`] translates the full context into a fresh
/// z3 solver.
#[derive(Debug, Default)]
pub struct Z3Solver {}

impl Z3Solver {
    /// Create a new z3 solver
    pub fn new() -> Self {
        Self::default()
    }
}

struct Translator {
    memo: HashMap<*const Term, Z3Term>,
}

impl Translator {
    fn translate(&mut self, e: &Expr) -> Result<Z3Term, SmtError> {
        if let Some(t) = self.memo.get(&e.node_id()) {
            return Ok(t.clone());
        }
        let t = match e.term() {
            Term::Bool(b) => Z3Term::Bool(Bool::from_bool(*b)),
            Term::Int(i) => Z3Term::Int(Int::from_i64(*i)),
            Term::BitVec(v, w) => Z3Term::Bv(BV::from_u64(*v, *w)),
            Term::Var(name, Sort::Bool) => Z3Term::Bool(Bool::new_const(name.as_str())),
            Term::Var(name, Sort::Int) => Z3Term::Int(Int::new_const(name.as_str())),
            Term::Var(name, Sort::BitVec(w)) => Z3Term::Bv(BV::new_const(name.as_str(), *w)),
            Term::Not(x) => Z3Term::Bool(self.translate(x)?.into_bool()?.not()),
            Term::And(xs) => {
                let bools = xs
                    .iter()
                    .map(|x| self.translate(x).and_then(|t| t.into_bool()))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&Bool> = bools.iter().collect();
                Z3Term::Bool(Bool::and(&refs))
            }
            Term::Or(xs) => {
                let bools = xs
                    .iter()
                    .map(|x| self.translate(x).and_then(|t| t.into_bool()))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&Bool> = bools.iter().collect();
                Z3Term::Bool(Bool::or(&refs))
            }
            Term::Implies(a, b) => {
                let a = self.translate(a)?.into_bool()?;
                let b = self.translate(b)?.into_bool()?;
                Z3Term::Bool(a.implies(&b))
            }
            Term::Ite(c, t, f) => {
                let c = self.translate(c)?.into_bool()?;
                match (self.translate(t)?, self.translate(f)?) {
                    (Z3Term::Bool(t), Z3Term::Bool(f)) => Z3Term::Bool(c.ite(&t, &f)),
                    (Z3Term::Int(t), Z3Term::Int(f)) => Z3Term::Int(c.ite(&t, &f)),
                    (Z3Term::Bv(t), Z3Term::Bv(f)) => Z3Term::Bv(c.ite(&t, &f)),
                    _ => return Err(SmtError::Backend(format!("sort mismatch in {}", e))),
                }
            }
            Term::Eq(a, b) => match (self.translate(a)?, self.translate(b)?) {
                (Z3Term::Bool(a), Z3Term::Bool(b)) => Z3Term::Bool(a.eq(&b)),
                (Z3Term::Int(a), Z3Term::Int(b)) => Z3Term::Bool(a.eq(&b)),
                (Z3Term::Bv(a), Z3Term::Bv(b)) => Z3Term::Bool(a.eq(&b)),
                _ => return Err(SmtError::Backend(format!("sort mismatch in {}", e))),
            },
            Term::Lt(a, b) => {
                let a = self.translate(a)?.into_int()?;
                Z3Term::Bool(a.lt(&self.translate(b)?.into_int()?))
            }
            Term::Le(a, b) => {
                let a = self.translate(a)?.into_int()?;
                Z3Term::Bool(a.le(&self.translate(b)?.into_int()?))
            }
            Term::Add(a, b) => {
                let a = self.translate(a)?.into_int()?;
                let b = self.translate(b)?.into_int()?;
                Z3Term::Int(&a + &b)
            }
            Term::Sub(a, b) => {
                let a = self.translate(a)?.into_int()?;
                let b = self.translate(b)?.into_int()?;
                Z3Term::Int(&a - &b)
            }
            Term::BvAnd(a, b) => {
                let a = self.translate(a)?.into_bv()?;
                Z3Term::Bv(a.bvand(&self.translate(b)?.into_bv()?))
            }
            Term::BvUle(a, b) => {
                let a = self.translate(a)?.into_bv()?;
                Z3Term::Bool(a.bvule(&self.translate(b)?.into_bv()?))
            }
        };
        self.memo.insert(e.node_id(), t.clone());
        Ok(t)
    }
}

impl Solver for Z3Solver {
    fn check(&mut self, ctx: &Context) -> Result<SatAnswer, SmtError> {
        let solver = z3::Solver::new();
        let mut tr = Translator { memo: HashMap::new() };
        for a in ctx.assertions() {
            solver.assert(&tr.translate(a)?.into_bool()?);
        }
        debug!(
            "z3: checking {} assertions over {} variables",
            ctx.num_constraints(),
            ctx.num_variables()
        );
        match solver.check() {
            SatResult::Unsat => Ok(SatAnswer::Unsat),
            SatResult::Unknown => Ok(SatAnswer::Unknown(
                solver.get_reason_unknown().unwrap_or_else(|| "unknown".to_string()),
            )),
            SatResult::Sat => {
                let z3_model = solver
                    .get_model()
                    .ok_or_else(|| SmtError::Backend("SAT but no model available".to_string()))?;
                let mut model = Model::new();
                for (name, var) in ctx.variables() {
                    let value = match tr.translate(var)? {
                        Z3Term::Bool(b) => {
                            z3_model.eval(&b, true).and_then(|v| v.as_bool()).map(Value::Bool)
                        }
                        Z3Term::Int(i) => {
                            z3_model.eval(&i, true).and_then(|v| v.as_i64()).map(Value::Int)
                        }
                        Z3Term::Bv(b) => {
                            z3_model.eval(&b, true).and_then(|v| v.as_u64()).map(Value::BitVec)
                        }
                    };
                    match value {
                        Some(v) => {
                            model.set(name, v);
                        }
                        None => {
                            return Err(SmtError::Backend(format!("no value for {}", name)));
                        }
                    }
                }
                Ok(SatAnswer::Sat(model))
            }
        }
    }
}
