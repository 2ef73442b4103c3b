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

//! # Communities
//!
//! Communities matched or set by policies are tracked as [`CommunityVar`]s. Every literal
//! community becomes an [`Exact`](CommunityVarKind::Exact) variable. Every regex becomes a
//! [`Regex`](CommunityVarKind::Regex) variable, together with an
//! [`Other`](CommunityVarKind::Other) variable standing for communities matching the regex that
//! are never mentioned in the network.

use super::{Community, Configuration, LineAction, NetworkError};
use crate::network::policy::{walk_statements, CommunitySetExpr, PolicyNode, Statement};
use crate::network::BooleanExpr;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Kind of a community variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommunityVarKind {
    /// A literal community
    Exact,
    /// A regex over communities
    Regex,
    /// Unknown communities matching a regex
    Other,
}

/// Community variable, identified by its kind and its textual value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommunityVar {
    kind: CommunityVarKind,
    value: String,
}

impl CommunityVar {
    /// Variable for a literal community
    pub fn exact(c: Community) -> Self {
        Self { kind: CommunityVarKind::Exact, value: c.to_string() }
    }

    /// Variable for a regex
    pub fn regex(r: impl Into<String>) -> Self {
        Self { kind: CommunityVarKind::Regex, value: r.into() }
    }

    /// Variable for the unknown communities matching a regex
    pub fn other(r: impl Into<String>) -> Self {
        Self { kind: CommunityVarKind::Other, value: r.into() }
    }

    /// Kind of the variable
    pub fn kind(&self) -> CommunityVarKind {
        self.kind
    }

    /// Literal community text or regex
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true for regex variables
    pub fn is_regex(&self) -> bool {
        self.kind == CommunityVarKind::Regex
    }

    /// Suffix used to name symbolic variables of this community
    pub fn var_suffix(&self) -> String {
        match self.kind {
            CommunityVarKind::Exact | CommunityVarKind::Regex => self.value.clone(),
            CommunityVarKind::Other => format!("{}_OTHER", self.value),
        }
    }
}

impl fmt::Display for CommunityVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CommunityVarKind::Exact | CommunityVarKind::Regex => write!(f, "{}", self.value),
            CommunityVarKind::Other => write!(f, "OTHER({})", self.value),
        }
    }
}

/// Match condition of a community list line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommunityMatch {
    /// Matches a literal community
    Exact(Community),
    /// Matches communities whose text matches the regex
    Regex(String),
}

impl CommunityMatch {
    /// The community variable of this condition
    pub fn to_community_var(&self) -> CommunityVar {
        match self {
            CommunityMatch::Exact(c) => CommunityVar::exact(*c),
            CommunityMatch::Regex(r) => CommunityVar::regex(r.clone()),
        }
    }
}

/// Line of a community list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityListLine {
    /// Action of the line
    pub action: LineAction,
    /// Match condition
    pub matcher: CommunityMatch,
}

/// Named community list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityList {
    /// Name of the list
    pub name: String,
    /// Lines of the list
    pub lines: Vec<CommunityListLine>,
}

/// Community variables referenced by a community set expression.
pub fn collect_community_vars(
    conf: &Configuration,
    e: &CommunitySetExpr,
) -> Result<BTreeSet<CommunityVar>, NetworkError> {
    match e {
        CommunitySetExpr::Literal(cs) => Ok(cs.iter().map(|c| CommunityVar::exact(*c)).collect()),
        CommunitySetExpr::Named(name) => {
            let cl = conf.community_lists.get(name).ok_or_else(|| {
                NetworkError::CommunityListNotFound(conf.hostname.clone(), name.clone())
            })?;
            Ok(cl.lines.iter().map(|l| l.matcher.to_community_var()).collect())
        }
    }
}

/// All community variables mentioned by the policies of a router.
pub fn find_communities(conf: &Configuration) -> Result<BTreeSet<CommunityVar>, NetworkError> {
    let mut exprs: Vec<&CommunitySetExpr> = Vec::new();
    for pol in conf.routing_policies.values() {
        walk_statements(conf, &pol.statements, &mut |n| match n {
            PolicyNode::Stmt(Statement::AddCommunity(e))
            | PolicyNode::Stmt(Statement::SetCommunity(e))
            | PolicyNode::Stmt(Statement::DeleteCommunity(e))
            | PolicyNode::Expr(BooleanExpr::MatchCommunitySet(e)) => exprs.push(e),
            _ => {}
        });
    }
    let mut comms = BTreeSet::new();
    for e in exprs {
        comms.extend(collect_community_vars(conf, e)?);
    }
    Ok(comms)
}

/// Maps every regex variable to the variables it depends on: every exact variable whose text
/// matches the regex, and the corresponding other variable.
pub fn community_dependencies(
    all: &BTreeSet<CommunityVar>,
) -> Result<BTreeMap<CommunityVar, Vec<CommunityVar>>, NetworkError> {
    let mut deps = BTreeMap::new();
    for c1 in all.iter().filter(|c| c.is_regex()) {
        let re = Regex::new(&c1.value)
            .map_err(|e| NetworkError::InvalidRegex(c1.value.clone(), e.to_string()))?;
        let list: Vec<CommunityVar> = all
            .iter()
            .filter(|c2| match c2.kind {
                CommunityVarKind::Exact => re.is_match(&c2.value),
                CommunityVarKind::Other => c2.value == c1.value,
                CommunityVarKind::Regex => false,
            })
            .cloned()
            .collect();
        deps.insert(c1.clone(), list);
    }
    Ok(deps)
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreeset;

    #[test]
    fn dependencies_of_regex() {
        let a = CommunityVar::exact(Community::new(65000, 100));
        let b = CommunityVar::exact(Community::new(65001, 1));
        let r = CommunityVar::regex("^65000:");
        let o = CommunityVar::other("^65000:");
        let all = btreeset! {a.clone(), b, r.clone(), o.clone()};
        let deps = community_dependencies(&all).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[&r], vec![a, o]);
    }

    #[test]
    fn invalid_regex() {
        let all = btreeset! {CommunityVar::regex("(")};
        assert!(community_dependencies(&all).is_err());
    }

    #[test]
    fn var_names_distinguish_other() {
        assert_eq!(CommunityVar::regex("^1:").var_suffix(), "^1:");
        assert_eq!(CommunityVar::other("^1:").var_suffix(), "^1:_OTHER");
        assert_eq!(CommunityVar::exact(Community::new(1, 2)).to_string(), "1:2");
    }
}
