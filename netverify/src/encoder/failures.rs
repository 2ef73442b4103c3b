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

//! Link and node failure indicators.

use super::EncodingError;
use crate::network::{Graph, GraphEdge};
use crate::smt::{Context, Expr};
use std::collections::BTreeMap;

/// Failure variables of one encoding. Every variable is an integer which is `1` if the link (or
/// router) is down and `0` otherwise. Both directions of an internal link share one variable.
/// Abstract and null-route edges never fail.
#[derive(Debug, Clone, Default)]
pub struct SymbolicFailures {
    internal_links: BTreeMap<(String, String), Expr>,
    edge_links: BTreeMap<GraphEdge, Expr>,
    nodes: BTreeMap<String, Expr>,
}

fn link_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl SymbolicFailures {
    /// Allocate the failure variables of the graph, prefixed with `prefix`.
    pub fn new(ctx: &mut Context, g: &Graph, prefix: &str) -> Self {
        let mut f = Self::default();
        for ge in g.all_real_edges().iter().filter(|ge| !ge.is_null_edge) {
            match &ge.peer {
                Some(peer) => {
                    let key = link_key(&ge.router, peer);
                    if !f.internal_links.contains_key(&key) {
                        let name = format!("{}FAILED-EDGE_{}_{}", prefix, key.0, key.1);
                        f.internal_links.insert(key, ctx.mk_int_var(name));
                    }
                }
                None => {
                    let name = format!("{}FAILED-EDGE_{}_{}", prefix, ge.router, ge.start.name);
                    f.edge_links.insert(ge.clone(), ctx.mk_int_var(name));
                }
            }
        }
        for router in g.routers() {
            let name = format!("{}FAILED-NODE_{}", prefix, router);
            f.nodes.insert(router.clone(), ctx.mk_int_var(name));
        }
        f
    }

    /// Failure variable of the link of an edge. Edges that cannot fail yield the constant `0`.
    /// Any other edge must belong to the graph these variables were allocated for.
    pub fn failed_variable(&self, ge: &GraphEdge) -> Result<Expr, EncodingError> {
        if ge.is_abstract || ge.is_null_edge {
            return Ok(Expr::int(0));
        }
        let v = match &ge.peer {
            Some(peer) => self.internal_links.get(&link_key(&ge.router, peer)),
            None => self.edge_links.get(ge),
        };
        v.cloned().ok_or_else(|| EncodingError::MissingVariable(format!("failure of {}", ge)))
    }

    /// Failure variable of a router
    pub fn failed_node(&self, router: &str) -> Expr {
        self.nodes.get(router).cloned().unwrap_or_else(|| Expr::int(0))
    }

    /// Failure variables of internal links, keyed by the sorted router names
    pub fn internal_links(&self) -> &BTreeMap<(String, String), Expr> {
        &self.internal_links
    }

    /// Failure variables of links leaving the network
    pub fn edge_links(&self) -> &BTreeMap<GraphEdge, Expr> {
        &self.edge_links
    }

    /// Failure variables of routers
    pub fn nodes(&self) -> &BTreeMap<String, Expr> {
        &self.nodes
    }

    /// All link failure variables
    pub fn all_links(&self) -> impl Iterator<Item = &Expr> {
        self.internal_links.values().chain(self.edge_links.values())
    }

    /// Every failure variable of `self` equals the one of `other`
    pub fn mk_eq(&self, other: &SymbolicFailures) -> Expr {
        let mut eqs = Vec::new();
        for (k, v) in self.internal_links.iter() {
            if let Some(o) = other.internal_links.get(k) {
                eqs.push(v.equals(o));
            }
        }
        for (k, v) in self.edge_links.iter() {
            if let Some(o) = other.edge_links.get(k) {
                eqs.push(v.equals(o));
            }
        }
        for (k, v) in self.nodes.iter() {
            if let Some(o) = other.nodes.get(k) {
                eqs.push(v.equals(o));
            }
        }
        Expr::and_all(eqs)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::*;

    #[test]
    fn shared_by_both_directions() {
        let mut r1 = Configuration::new("R1");
        r1.add_interface(Interface::new("eth0", "192.168.0.1/30".parse().unwrap()))
            .add_interface(Interface::new("eth1", "172.16.0.1/24".parse().unwrap()))
            .add_static_route(StaticRoute::null("10.0.0.0/8".parse().unwrap()));
        let mut r2 = Configuration::new("R2");
        r2.add_interface(Interface::new("eth0", "192.168.0.2/30".parse().unwrap()));
        let g = Graph::new(vec![r1, r2], None).unwrap();
        let mut ctx = Context::new();
        let f = SymbolicFailures::new(&mut ctx, &g, "0_");

        let e12 = g.edges("R1").iter().find(|e| e.start.name == "eth0").unwrap();
        let e21 = g.other_end(e12).unwrap();
        let v12 = f.failed_variable(e12).unwrap();
        assert!(v12.same(&f.failed_variable(e21).unwrap()));
        assert_eq!(v12.var_name(), Some("0_FAILED-EDGE_R1_R2"));

        let ext = g.edges("R1").iter().find(|e| e.start.name == "eth1").unwrap();
        assert_eq!(f.failed_variable(ext).unwrap().var_name(), Some("0_FAILED-EDGE_R1_eth1"));

        let null = g.edges("R1").iter().find(|e| e.is_null_edge).unwrap();
        assert_eq!(f.failed_variable(null).unwrap().as_int(), Some(0));
        assert_eq!(f.internal_links().len(), 1);
        assert_eq!(f.nodes().len(), 2);
    }

    #[test]
    fn edges_of_another_graph_are_errors() {
        let mut r1 = Configuration::new("R1");
        r1.add_interface(Interface::new("eth0", "192.168.0.1/30".parse().unwrap()));
        let mut r3 = Configuration::new("R3");
        r3.add_interface(Interface::new("eth0", "192.168.0.2/30".parse().unwrap()));
        let other = Graph::new(vec![r1.clone(), r3], None).unwrap();
        let g = Graph::new(vec![r1], None).unwrap();
        let mut ctx = Context::new();
        let f = SymbolicFailures::new(&mut ctx, &g, "0_");

        let foreign = other.edges("R1").iter().find(|e| e.peer.is_some()).unwrap();
        assert!(matches!(
            f.failed_variable(foreign),
            Err(EncodingError::MissingVariable(what)) if what.starts_with("failure of")
        ));
    }
}
