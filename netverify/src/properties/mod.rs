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

//! # Properties
//!
//! Questions, property instrumentation and the checks built on top of the
//! [`Encoder`](crate::encoder::Encoder).
//!
//! Every check follows the same pattern. The checker builds one (or two) encodings of the
//! network, instruments them with auxiliary variables using the [`PropertyAdder`], and asserts
//! the *negation* of the property. If the solver finds a model, it is a counterexample and the
//! result is not verified. Otherwise, the property holds for every packet, every failure
//! scenario within the bound and every environment permitted by the question.
//!
//! Source routers and destination interfaces are selected with regular expressions, which must
//! match the whole name (see [`PatternMatch`]).

mod adder;
mod checker;
mod question;

pub use adder::PropertyAdder;
pub use checker::{infer_destination_header_space, PropertyChecker};
pub use question::{
    BgpDecisionVariable, DiffType, EnvironmentType, HeaderLocationQuestion, HeaderQuestion,
    LocalConsistencyQuestion,
};

use crate::network::{Graph, GraphEdge};
use regex::Regex;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors caused by ill-posed questions
#[derive(Debug, Error)]
pub enum QueryError {
    /// No interface matches the destination patterns
    #[error("Set of valid destination interfaces is empty")]
    NoDestinations,
    /// No router matches the ingress patterns
    #[error("Set of valid ingress nodes is empty")]
    NoSources,
    /// Two routers compared for local equivalence have different interfaces
    #[error("Routers {0} and {1} have different interfaces")]
    MismatchedInterfaces(String, String),
    /// Two routers compared for local equivalence run different protocols on an interface
    #[error("Routers {0} and {1} run different protocols on interface {2}")]
    MismatchedProtocols(String, String, String),
    /// An environment route exists on one of the two compared routers only
    #[error("Environment route on {0} has no counterpart")]
    OneSidedEnvironment(String),
    /// Multipath consistency cannot be negated
    #[error("Negation is not supported for multipath consistency")]
    NegatedMultipath,
    /// A pattern is not a valid regular expression
    #[error("Invalid pattern: {0}")]
    InvalidRegex(#[from] regex::Error),
}

/// Name filter made of an including and an excluding pattern. Both must match the whole name,
/// and the empty pattern matches nothing.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    include: Regex,
    exclude: Regex,
}

impl PatternMatch {
    /// Compile the two patterns
    pub fn new(include: &str, exclude: &str) -> Result<Self, QueryError> {
        Ok(Self { include: whole_name(include)?, exclude: whole_name(exclude)? })
    }

    /// Returns true if `name` matches the including and not the excluding pattern
    pub fn matches(&self, name: &str) -> bool {
        !name.is_empty() && self.include.is_match(name) && !self.exclude.is_match(name)
    }
}

fn whole_name(pattern: &str) -> Result<Regex, QueryError> {
    Ok(Regex::new(&format!("^(?:{})$", pattern))?)
}

/// Destination interfaces of a question: physical edges of the matched routers whose interface
/// matches the interface patterns.
pub fn find_matching_edges(
    g: &Graph,
    q: &HeaderLocationQuestion,
) -> Result<BTreeSet<GraphEdge>, QueryError> {
    let nodes = PatternMatch::new(&q.final_node_regex, &q.not_final_node_regex)?;
    let ifaces = PatternMatch::new(&q.final_iface_regex, &q.not_final_iface_regex)?;
    Ok(g.edge_map()
        .iter()
        .filter(|(r, _)| nodes.matches(r))
        .flat_map(|(_, edges)| edges.iter())
        .filter(|ge| !ge.is_abstract && !ge.is_null_edge && ifaces.matches(&ge.start.name))
        .cloned()
        .collect())
}

/// Edges from a router matching `n1` towards a router matching `n2`. Edges leaving the network
/// match `n2` on the name of their interface.
pub fn find_matching_links(g: &Graph, n1: &PatternMatch, n2: &PatternMatch) -> BTreeSet<GraphEdge> {
    g.edge_map()
        .iter()
        .filter(|(r, _)| n1.matches(r))
        .flat_map(|(_, edges)| edges.iter())
        .filter(|ge| n2.matches(ge.peer.as_deref().unwrap_or(&ge.start.name)))
        .cloned()
        .collect()
}

/// Routers matching the filter, in name order
pub fn matching_nodes(g: &Graph, p: &PatternMatch) -> Vec<String> {
    g.routers().filter(|r| p.matches(r)).cloned().collect()
}

/// Source routers of a question
pub fn source_nodes(g: &Graph, q: &HeaderLocationQuestion) -> Result<Vec<String>, QueryError> {
    let p = PatternMatch::new(&q.ingress_node_regex, &q.not_ingress_node_regex)?;
    Ok(matching_nodes(g, &p))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::*;

    fn triangle() -> Graph {
        let mut a = Configuration::new("A");
        a.add_interface(Interface::new("eth0", "10.0.1.1/30".parse().unwrap()))
            .add_interface(Interface::new("eth1", "10.0.2.1/30".parse().unwrap()))
            .add_interface(Interface::new("ext", "172.16.0.1/24".parse().unwrap()));
        let mut b = Configuration::new("B");
        b.add_interface(Interface::new("eth0", "10.0.1.2/30".parse().unwrap()))
            .add_interface(Interface::new("eth1", "10.0.3.1/30".parse().unwrap()));
        let mut c = Configuration::new("C1");
        c.add_interface(Interface::new("eth0", "10.0.2.2/30".parse().unwrap()))
            .add_interface(Interface::new("eth1", "10.0.3.2/30".parse().unwrap()));
        Graph::new(vec![a, b, c], None).unwrap()
    }

    #[test]
    fn patterns_match_whole_names() {
        let p = PatternMatch::new("C", "").unwrap();
        assert!(!p.matches("C1"));
        let p = PatternMatch::new("C.*|A", "C2").unwrap();
        assert!(p.matches("C1"));
        assert!(p.matches("A"));
        assert!(!p.matches("C2"));
        assert!(!PatternMatch::new("", "").unwrap().matches("A"));
        assert!(PatternMatch::new("(", "").is_err());
    }

    #[test]
    fn destination_edges() {
        let g = triangle();
        let q = HeaderLocationQuestion::new(".*", "A", "ext");
        let edges = find_matching_edges(&g, &q).unwrap();
        assert_eq!(edges.len(), 1);
        assert!(edges.iter().all(|ge| ge.peer.is_none() && ge.router == "A"));
    }

    #[test]
    fn links_in_both_directions() {
        let g = triangle();
        let a = PatternMatch::new("A", "").unwrap();
        let b = PatternMatch::new("B", "").unwrap();
        let ab = find_matching_links(&g, &a, &b);
        let ba = find_matching_links(&g, &b, &a);
        assert_eq!(ab.len(), 1);
        assert_eq!(ba.len(), 1);
        let all = PatternMatch::new(".*", "").unwrap();
        // external edges are matched by their interface name
        assert!(find_matching_links(&g, &a, &all).iter().any(|ge| ge.start.name == "ext"));
    }

    #[test]
    fn sources() {
        let g = triangle();
        let mut q = HeaderLocationQuestion::new("[AB]", ".*", ".*");
        assert_eq!(source_nodes(&g, &q).unwrap(), vec!["A", "B"]);
        q.not_ingress_node_regex = "B".to_string();
        assert_eq!(source_nodes(&g, &q).unwrap(), vec!["A"]);
    }
}
