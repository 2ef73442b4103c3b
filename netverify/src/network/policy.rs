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

//! # Routing Policies
//!
//! Vendor-independent routing policy language. A policy is an ordered list of [`Statement`]s,
//! which match on routes with [`BooleanExpr`]s and modify their attributes.

use super::{Community, Configuration, OspfMetricType, PrefixRange, RoutingProtocol};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Named routing policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    /// Name of the policy
    pub name: String,
    /// Body of the policy
    pub statements: Vec<Statement>,
}

impl RoutingPolicy {
    /// Create a new policy
    pub fn new(name: impl Into<String>, statements: Vec<Statement>) -> Self {
        Self { name: name.into(), statements }
    }
}

/// Statement of a routing policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Accept the route and leave the policy
    ExitAccept,
    /// Reject the route and leave the policy
    ExitReject,
    /// Return `true` from the current policy
    ReturnTrue,
    /// Return `false` from the current policy
    ReturnFalse,
    /// Return the local default action
    ReturnLocalDefaultAction,
    /// Leave the policy without a decision
    FallThrough,
    /// Return from the current policy
    Return,
    /// Set the default action to accept
    SetDefaultActionAccept,
    /// Set the default action to reject
    SetDefaultActionReject,
    /// Set the local default action to accept
    SetLocalDefaultActionAccept,
    /// Set the local default action to reject
    SetLocalDefaultActionReject,
    /// Suppress routes covered by an aggregate
    Suppress,
    /// Unsuppress routes covered by an aggregate
    Unsuppress,
    /// Remove private AS numbers from the AS path
    RemovePrivateAs,
    /// Conditional
    If {
        /// Condition
        guard: BooleanExpr,
        /// Statements executed when the guard holds
        true_statements: Vec<Statement>,
        /// Statements executed otherwise
        false_statements: Vec<Statement>,
    },
    /// Set the policy evaluated at the end of a chain
    SetDefaultPolicy(String),
    /// Set the metric (MED for BGP)
    SetMetric(LongExpr),
    /// Set the OSPF metric type
    SetOspfMetricType(OspfMetricType),
    /// Set the local preference
    SetLocalPreference(LongExpr),
    /// Add communities
    AddCommunity(CommunitySetExpr),
    /// Replace communities
    SetCommunity(CommunitySetExpr),
    /// Remove communities
    DeleteCommunity(CommunitySetExpr),
    /// Prepend to the AS path
    PrependAsPath(AsPathListExpr),
    /// Set the BGP origin attribute
    SetOrigin(String),
    /// Set the next hop
    SetNextHop(String),
    /// Set the route tag
    SetTag(i64),
    /// Set the BGP weight
    SetWeight(i64),
}

impl Statement {
    /// Convenience constructor for [`Statement::If`]
    pub fn if_then_else(
        guard: BooleanExpr,
        true_statements: Vec<Statement>,
        false_statements: Vec<Statement>,
    ) -> Self {
        Statement::If { guard, true_statements, false_statements }
    }
}

/// Boolean expression of a routing policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BooleanExpr {
    /// Always true
    True,
    /// Always false
    False,
    /// True if the enclosing policy was called as an expression
    CallExprContext,
    /// True if the enclosing policy was called as a statement
    CallStatementContext,
    /// Matches IPv4 routes
    MatchIpv4,
    /// Matches IPv6 routes
    MatchIpv6,
    /// All sub-expressions hold
    Conjunction(Vec<BooleanExpr>),
    /// Some sub-expression holds
    Disjunction(Vec<BooleanExpr>),
    /// Chain of policies, where each one may fall through to the next
    ConjunctionChain(Vec<BooleanExpr>),
    /// Chain of policies, where the first decision is taken
    FirstMatchChain(Vec<BooleanExpr>),
    /// Negation
    Not(Box<BooleanExpr>),
    /// Matches the protocol the route was learned from
    MatchProtocol(Vec<RoutingProtocol>),
    /// Matches the prefix of the route
    MatchPrefixSet(PrefixSetExpr),
    /// Matches an IPv6 prefix set
    MatchPrefix6Set,
    /// Calls another policy as an expression
    CallExpr(String),
    /// Evaluates the expression in a modified environment
    WithEnvironment(Box<BooleanExpr>),
    /// Matches the communities of the route
    MatchCommunitySet(CommunitySetExpr),
    /// Matches the AS path with a regex
    MatchAsPath(String),
    /// Matches the interface the route was received on
    MatchSrcInterface(Vec<String>),
    /// Matches if the named access list permits the route
    PermittedByAcl(String),
    /// Matches the route tag
    MatchTag(i64),
}

/// Integer expression, modifying an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LongExpr {
    /// Set to a literal value
    Literal(i64),
    /// Increment the current value
    Increment(i64),
    /// Decrement the current value
    Decrement(i64),
}

/// Prefix set used in a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrefixSetExpr {
    /// Inline prefix ranges
    Explicit(Vec<PrefixRange>),
    /// Route filter list of the configuration
    Named(String),
}

/// Community set used in matches and modifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommunitySetExpr {
    /// Inline communities
    Literal(Vec<Community>),
    /// Community list of the configuration
    Named(String),
}

/// AS path to prepend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsPathListExpr {
    /// The same AS number `count` times
    Multiplied {
        /// AS number to prepend
        as_number: u32,
        /// How often
        count: u32,
    },
    /// Explicit list of AS numbers
    Literal(Vec<u32>),
}

impl AsPathListExpr {
    /// Number of AS hops added by this expression
    pub fn prepend_length(&self) -> u32 {
        match self {
            AsPathListExpr::Multiplied { count, .. } => *count,
            AsPathListExpr::Literal(l) => l.len() as u32,
        }
    }
}

/// Node of a policy visited by [`walk_policy`]
#[derive(Debug, Clone, Copy)]
pub enum PolicyNode<'a> {
    /// A statement
    Stmt(&'a Statement),
    /// A boolean expression
    Expr(&'a BooleanExpr),
}

/// Visit every statement and expression reachable from the named policy of `conf`, following
/// policy calls and default policies. Every policy is visited at most once.
pub fn walk_policy<'a, F>(conf: &'a Configuration, name: &str, f: &mut F)
where
    F: FnMut(PolicyNode<'a>),
{
    let mut visited = HashSet::new();
    walk_named(conf, name, f, &mut visited);
}

/// Visit every statement and expression of `stmts`, following policy calls of `conf`.
pub fn walk_statements<'a, F>(conf: &'a Configuration, stmts: &'a [Statement], f: &mut F)
where
    F: FnMut(PolicyNode<'a>),
{
    let mut visited = HashSet::new();
    walk_stmts(conf, stmts, f, &mut visited);
}

fn walk_named<'a, F>(conf: &'a Configuration, name: &str, f: &mut F, visited: &mut HashSet<String>)
where
    F: FnMut(PolicyNode<'a>),
{
    if !visited.insert(name.to_string()) {
        return;
    }
    if let Some(pol) = conf.routing_policies.get(name) {
        walk_stmts(conf, &pol.statements, f, visited);
    }
}

fn walk_stmts<'a, F>(
    conf: &'a Configuration,
    stmts: &'a [Statement],
    f: &mut F,
    visited: &mut HashSet<String>,
) where
    F: FnMut(PolicyNode<'a>),
{
    for s in stmts {
        f(PolicyNode::Stmt(s));
        match s {
            Statement::If { guard, true_statements, false_statements } => {
                walk_expr(conf, guard, f, visited);
                walk_stmts(conf, true_statements, f, visited);
                walk_stmts(conf, false_statements, f, visited);
            }
            Statement::SetDefaultPolicy(name) => walk_named(conf, name, f, visited),
            _ => {}
        }
    }
}

fn walk_expr<'a, F>(
    conf: &'a Configuration,
    e: &'a BooleanExpr,
    f: &mut F,
    visited: &mut HashSet<String>,
) where
    F: FnMut(PolicyNode<'a>),
{
    f(PolicyNode::Expr(e));
    match e {
        BooleanExpr::Conjunction(xs)
        | BooleanExpr::Disjunction(xs)
        | BooleanExpr::ConjunctionChain(xs)
        | BooleanExpr::FirstMatchChain(xs) => {
            xs.iter().for_each(|x| walk_expr(conf, x, f, visited))
        }
        BooleanExpr::Not(x) | BooleanExpr::WithEnvironment(x) => walk_expr(conf, x, f, visited),
        BooleanExpr::CallExpr(name) => walk_named(conf, name, f, visited),
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::Protocol;

    #[test]
    fn walk_follows_calls() {
        let mut conf = Configuration::new("r1");
        conf.routing_policies.insert(
            "inner".to_string(),
            RoutingPolicy::new("inner", vec![Statement::SetLocalPreference(LongExpr::Literal(200))]),
        );
        conf.routing_policies.insert(
            "outer".to_string(),
            RoutingPolicy::new(
                "outer",
                vec![Statement::if_then_else(
                    BooleanExpr::Conjunction(vec![
                        BooleanExpr::MatchProtocol(vec![RoutingProtocol::Ospf]),
                        BooleanExpr::CallExpr("inner".to_string()),
                    ]),
                    vec![Statement::ExitAccept],
                    vec![Statement::ExitReject],
                )],
            ),
        );
        let mut protos = Vec::new();
        let mut sets_lp = false;
        walk_policy(&conf, "outer", &mut |n| match n {
            PolicyNode::Expr(BooleanExpr::MatchProtocol(ps)) => {
                protos.extend(ps.iter().filter_map(|p| p.to_protocol()))
            }
            PolicyNode::Stmt(Statement::SetLocalPreference(_)) => sets_lp = true,
            _ => {}
        });
        assert_eq!(protos, vec![Protocol::Ospf]);
        assert!(sets_lp);
    }

    #[test]
    fn prepend_length() {
        assert_eq!(AsPathListExpr::Multiplied { as_number: 1, count: 3 }.prepend_length(), 3);
        assert_eq!(AsPathListExpr::Literal(vec![1, 2]).prepend_length(), 2);
    }
}
