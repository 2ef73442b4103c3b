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

//! Variable registry and assertion stack of one encoding.

use super::{Expr, SmtError, Sort};
use std::collections::HashMap;

/// Owns every variable and assertion of one verification run. Two network copies that must be
/// related to each other are encoded into the same context, using different encoding ids in their
/// variable names.
#[derive(Debug, Default)]
pub struct Context {
    variables: Vec<(String, Expr)>,
    index: HashMap<String, usize>,
    assertions: Vec<Expr>,
    next_id: usize,
}

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    fn mk_var(&mut self, name: String, sort: Sort) -> Expr {
        if let Some(i) = self.index.get(&name) {
            return self.variables[*i].1.clone();
        }
        let v = Expr::var(name.clone(), sort);
        self.index.insert(name.clone(), self.variables.len());
        self.variables.push((name, v.clone()));
        v
    }

    /// Create a new variable. Unlike the `mk_*_var` functions, this never returns an existing
    /// variable: if `name` is already registered (with any sort), an error is returned.
    pub fn mk_fresh_var(&mut self, name: impl Into<String>, sort: Sort) -> Result<Expr, SmtError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(SmtError::DuplicateVariable(name));
        }
        Ok(self.mk_var(name, sort))
    }

    /// Create (or look up) a boolean variable
    pub fn mk_bool_var(&mut self, name: impl Into<String>) -> Expr {
        self.mk_var(name.into(), Sort::Bool)
    }

    /// Create (or look up) an integer variable
    pub fn mk_int_var(&mut self, name: impl Into<String>) -> Expr {
        self.mk_var(name.into(), Sort::Int)
    }

    /// Create (or look up) a bit-vector variable of the given width
    pub fn mk_bv_var(&mut self, name: impl Into<String>, width: u32) -> Expr {
        self.mk_var(name.into(), Sort::BitVec(width))
    }

    /// Add an assertion. Literal `true` is dropped.
    pub fn add(&mut self, e: Expr) {
        if !e.is_true() {
            self.assertions.push(e);
        }
    }

    /// All assertions in insertion order
    pub fn assertions(&self) -> &[Expr] {
        &self.assertions
    }

    /// All registered variables in creation order
    pub fn variables(&self) -> impl Iterator<Item = (&str, &Expr)> {
        self.variables.iter().map(|(n, e)| (n.as_str(), e))
    }

    /// Look up a registered variable by name
    pub fn variable(&self, name: &str) -> Option<&Expr> {
        self.index.get(name).map(|i| &self.variables[*i].1)
    }

    /// Number of registered variables
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Number of assertions
    pub fn num_constraints(&self) -> usize {
        self.assertions.len()
    }

    /// Returns a fresh id, unique within this context
    pub fn generate_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registry() {
        let mut ctx = Context::new();
        let a = ctx.mk_bool_var("a");
        let a2 = ctx.mk_bool_var("a");
        assert!(a.same(&a2));
        ctx.mk_int_var("x");
        assert_eq!(ctx.num_variables(), 2);
        assert_eq!(ctx.variables().map(|(n, _)| n).collect::<Vec<_>>(), vec!["a", "x"]);
        ctx.add(Expr::tru());
        ctx.add(a);
        assert_eq!(ctx.num_constraints(), 1);
        assert_eq!(ctx.generate_id(), 0);
        assert_eq!(ctx.generate_id(), 1);
    }

    #[test]
    fn fresh_variables_never_alias() {
        let mut ctx = Context::new();
        let v = ctx.mk_fresh_var("SSA_65000:123", Sort::Bool).unwrap();
        assert_eq!(v.sort(), Sort::Bool);
        assert_eq!(
            ctx.mk_fresh_var("SSA_65000:123", Sort::Int),
            Err(SmtError::DuplicateVariable("SSA_65000:123".to_string()))
        );
        assert_eq!(
            ctx.mk_fresh_var("SSA_65000:123", Sort::Bool),
            Err(SmtError::DuplicateVariable("SSA_65000:123".to_string()))
        );
        ctx.mk_int_var("x");
        assert!(ctx.mk_fresh_var("x", Sort::BitVec(32)).is_err());
        assert_eq!(ctx.num_variables(), 2);
    }
}
