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

//! # SMT
//!
//! Solver-independent term layer. Formulas are built as [`Expr`] terms, which fold constants on
//! construction. A [`Context`] collects variables and assertions, and a [`Solver`] decides
//! satisfiability of a context, returning a [`Model`] on success. With the feature `z3-solver`,
//! [`Z3Solver`] translates the context to z3.

mod context;
mod expr;
mod model;
mod solver;
#[cfg(feature = "z3-solver")]
mod z3_backend;

pub use context::Context;
pub use expr::{Expr, Sort, Term};
pub use model::{Model, Value};
pub use solver::{FixedSolver, SatAnswer, Solver};
#[cfg(feature = "z3-solver")]
pub use z3_backend::Z3Solver;

use thiserror::Error;

/// Errors of the term layer and the solver backends
#[derive(Debug, Error, PartialEq)]
pub enum SmtError {
    /// A term was evaluated with a value of the wrong sort
    #[error("Term {0} expected sort {1}, but got {2}")]
    SortMismatch(String, &'static str, &'static str),
    /// The solver could not decide satisfiability
    #[error("Solver returned unknown: {0}")]
    Unknown(String),
    /// The backend failed to produce a model or a value
    #[error("Solver backend error: {0}")]
    Backend(String),
    /// A fresh variable was requested under a name that is already registered
    #[error("Variable {0} is already declared")]
    DuplicateVariable(String),
}
