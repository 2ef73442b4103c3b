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

//! Evaluation parameters and partial results of the transfer function compiler.

use crate::network::CommunityVar;
use crate::smt::Expr;
use std::collections::BTreeMap;
use std::fmt;

/// How the current policy was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallContext {
    /// Top-level policy of the edge
    None,
    /// Called from a boolean expression
    ExprCall,
    /// Called as a statement
    StmtCall,
}

/// Chain the current expression is evaluated in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainContext {
    /// Not part of a chain
    None,
    /// Part of a conjunction chain
    Conjunction,
}

/// Field of the working route that a statement may update. Ordered such that the control flow
/// pseudo-fields come first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    /// Return value of the policy
    Return,
    /// Control reached the end of a policy without a decision
    Fallthrough,
    /// Metric (AS path length for BGP)
    Metric,
    /// Prefix length
    PrefixLen,
    /// Local preference
    LocalPref,
    /// OSPF type
    OspfType,
    /// Community flag
    Community(CommunityVar),
}

impl Field {
    /// Returns true for the control flow pseudo-fields
    pub fn is_control(&self) -> bool {
        matches!(self, Field::Return | Field::Fallthrough)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Return => write!(f, "RETURN"),
            Field::Fallthrough => write!(f, "FALLTHROUGH"),
            Field::Metric => write!(f, "METRIC"),
            Field::PrefixLen => write!(f, "PREFIX-LEN"),
            Field::LocalPref => write!(f, "LOCAL-PREF"),
            Field::OspfType => write!(f, "OSPF-TYPE"),
            Field::Community(c) => write!(f, "{}", c),
        }
    }
}

/// Parameters of one recursive evaluation step. The working route is passed next to it, so that
/// branches can operate on their own copy.
#[derive(Debug, Clone)]
pub struct TransferParam {
    /// How the current policy was entered
    pub call_context: CallContext,
    /// Chain the current expression belongs to
    pub chain_context: ChainContext,
    /// Action taken if the top-level policy does not return
    pub default_accept: bool,
    /// Value of `ReturnLocalDefaultAction`
    pub default_accept_local: bool,
    /// Policy evaluated at the end of a chain
    pub default_policy: Option<String>,
    /// Nesting depth, `0` for the top-level statement list
    pub indent: usize,
}

impl Default for TransferParam {
    fn default() -> Self {
        Self {
            call_context: CallContext::None,
            chain_context: ChainContext::None,
            default_accept: true,
            default_accept_local: false,
            default_policy: None,
            indent: 0,
        }
    }
}

impl TransferParam {
    /// Parameters for a nested evaluation
    pub fn indent(&self) -> Self {
        let mut p = self.clone();
        p.indent += 1;
        p
    }

    /// Returns true for the top-level statement list of the edge
    pub fn is_initial_call(&self) -> bool {
        self.indent == 0
    }

    pub(super) fn log(&self, msg: impl AsRef<str>) {
        log::trace!("{:width$}{}", "", msg.as_ref(), width = self.indent * 2);
    }
}

/// Partial result of evaluating an expression or a statement list.
#[derive(Debug, Clone)]
pub struct TransferResult {
    /// Value returned by the policy, if a return happened
    pub return_value: Expr,
    /// The policy fell through
    pub fallthrough_value: Expr,
    /// A return (or fallthrough) happened
    pub return_assigned: Expr,
    /// Latest value of every field updated so far
    pub changed: BTreeMap<Field, Expr>,
}

impl TransferResult {
    /// Result before anything was evaluated
    pub fn initial() -> Self {
        Self {
            return_value: Expr::fls(),
            fallthrough_value: Expr::fls(),
            return_assigned: Expr::fls(),
            changed: BTreeMap::new(),
        }
    }

    /// Result of a plain boolean expression
    pub fn from_expr(e: Expr) -> Self {
        Self { return_value: e, return_assigned: Expr::tru(), ..Self::initial() }
    }

    /// Record the new value of a field
    pub fn add_changed(&mut self, f: Field, e: Expr) {
        self.changed.insert(f, e);
    }

    /// Merge the changed fields of `other` into `self`. Control pseudo-fields are only merged if
    /// `with_control` is set.
    pub fn merge_changed(&mut self, other: &TransferResult, with_control: bool) {
        for (f, e) in other.changed.iter() {
            if with_control || !f.is_control() {
                self.changed.insert(f.clone(), e.clone());
            }
        }
    }

    /// Returns true if the field was updated
    pub fn is_changed(&self, f: &Field) -> bool {
        self.changed.contains_key(f)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::{Community, CommunityVar};
    use std::collections::BTreeSet;

    #[test]
    fn control_fields_sort_first() {
        let fields: BTreeSet<Field> = vec![
            Field::Community(CommunityVar::exact(Community::new(1, 2))),
            Field::Metric,
            Field::Fallthrough,
            Field::LocalPref,
            Field::Return,
        ]
        .into_iter()
        .collect();
        let order: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        assert_eq!(&order[..3], &["RETURN", "FALLTHROUGH", "METRIC"]);
    }

    #[test]
    fn merge_skips_control() {
        let mut a = TransferResult::initial();
        let mut b = TransferResult::initial();
        b.add_changed(Field::Return, Expr::tru());
        b.add_changed(Field::Metric, Expr::int(3));
        a.merge_changed(&b, false);
        assert!(!a.is_changed(&Field::Return));
        assert!(a.is_changed(&Field::Metric));
    }
}
