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

//! Solver interface.

use super::{Context, Model, SmtError};

/// Answer of a satisfiability check
#[derive(Debug, Clone, PartialEq)]
pub enum SatAnswer {
    /// The assertions are unsatisfiable
    Unsat,
    /// The assertions are satisfiable, with a model assigning every registered variable
    Sat(Model),
    /// The solver gave up, with its reason
    Unknown(String),
}

/// A satisfiability checker over the assertions of a [`Context`].
pub trait Solver {
    /// Check the conjunction of all assertions in `ctx`. The returned model must contain a value
    /// for every variable registered in `ctx`.
    fn check(&mut self, ctx: &Context) -> Result<SatAnswer, SmtError>;
}

/// Solver returning a fixed answer, independent of the context. Useful to drive the
/// counterexample reconstruction from a hand-built model.
#[derive(Debug, Clone)]
pub struct FixedSolver {
    answer: SatAnswer,
}

impl FixedSolver {
    /// Create a solver that always returns `answer`
    pub fn new(answer: SatAnswer) -> Self {
        Self { answer }
    }
}

impl Solver for FixedSolver {
    fn check(&mut self, _ctx: &Context) -> Result<SatAnswer, SmtError> {
        Ok(self.answer.clone())
    }
}
