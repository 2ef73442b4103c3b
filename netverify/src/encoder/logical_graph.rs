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

//! Protocol-centric view of the network graph.

use super::symbolic_route::SymbolicRoute;
use super::EncodingError;
use crate::network::{Configuration, Graph, GraphEdge, Protocol};
use crate::smt::Expr;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Direction of a logical edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeType {
    /// Routes received over the edge
    Import,
    /// Routes sent over the edge
    Export,
}

/// Identity of a logical edge. Import and export edges of the same graph edge are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalEdgeId {
    /// Underlying graph edge
    pub edge: GraphEdge,
    /// Direction
    pub edge_type: EdgeType,
    /// Protocol instance
    pub proto: Protocol,
}

/// A graph edge in one direction for one protocol, with the route crossing it.
#[derive(Debug, Clone)]
pub struct LogicalEdge {
    /// Underlying graph edge
    pub edge: GraphEdge,
    /// Direction
    pub edge_type: EdgeType,
    /// Route crossing the edge
    pub route: SymbolicRoute,
}

impl LogicalEdge {
    /// Create a new logical edge. The protocol is taken from the route.
    pub fn new(edge: GraphEdge, edge_type: EdgeType, route: SymbolicRoute) -> Self {
        Self { edge, edge_type, route }
    }

    /// Protocol of the route. Logical edges always carry a protocol specific route.
    pub fn proto(&self) -> Protocol {
        self.route.proto.unwrap_or(Protocol::Connected)
    }

    /// Identity of the edge
    pub fn id(&self) -> LogicalEdgeId {
        LogicalEdgeId { edge: self.edge.clone(), edge_type: self.edge_type, proto: self.proto() }
    }
}

impl PartialEq for LogicalEdge {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Display for LogicalEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} {}", self.edge_type, self.proto(), self.edge)
    }
}

/// Logical edges of every router and protocol, grouped by graph edge (imports first), together
/// with the opposite end of every edge and the routes received from outside of the network.
#[derive(Debug, Clone, Default)]
pub struct LogicalGraph {
    logical_edges: BTreeMap<String, BTreeMap<Protocol, Vec<Vec<LogicalEdge>>>>,
    other_end: HashMap<LogicalEdgeId, LogicalEdgeId>,
    environment_vars: BTreeMap<LogicalEdgeId, SymbolicRoute>,
    redistributed_protocols: BTreeMap<String, BTreeMap<Protocol, BTreeSet<Protocol>>>,
}

impl LogicalGraph {
    /// Create an empty logical graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the (possibly empty) edge list of a router and protocol
    pub fn add_protocol(&mut self, router: &str, proto: Protocol) {
        self.logical_edges.entry(router.to_string()).or_default().entry(proto).or_default();
    }

    /// Add the logical edges of one graph edge
    pub fn add_edges(&mut self, router: &str, proto: Protocol, edges: Vec<LogicalEdge>) {
        self.logical_edges
            .entry(router.to_string())
            .or_default()
            .entry(proto)
            .or_default()
            .push(edges);
    }

    /// Logical edges of a router and protocol, grouped by graph edge
    pub fn edges(&self, router: &str, proto: Protocol) -> &[Vec<LogicalEdge>] {
        self.logical_edges
            .get(router)
            .and_then(|m| m.get(&proto))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All logical edges of a router and protocol
    pub fn all_edges(&self, router: &str, proto: Protocol) -> impl Iterator<Item = &LogicalEdge> {
        self.edges(router, proto).iter().flatten()
    }

    /// All logical edges of the network, by router and protocol
    pub fn logical_edges(&self) -> &BTreeMap<String, BTreeMap<Protocol, Vec<Vec<LogicalEdge>>>> {
        &self.logical_edges
    }

    /// Import edges of a router and protocol that may carry routes
    pub fn import_edges<'a>(
        &'a self,
        g: &'a Graph,
        conf: &'a Configuration,
        proto: Protocol,
    ) -> impl Iterator<Item = &'a LogicalEdge> + 'a {
        self.all_edges(&conf.hostname, proto)
            .filter(move |le| le.edge_type == EdgeType::Import)
            .filter(move |le| g.is_edge_used(conf, proto, &le.edge))
    }

    /// Look up a logical edge by its identity
    pub fn get(&self, id: &LogicalEdgeId) -> Option<&LogicalEdge> {
        self.all_edges(&id.edge.router, id.proto).find(|le| le.edge == id.edge && le.edge_type == id.edge_type)
    }

    /// Link two logical edges as opposite ends of the same session
    pub fn set_other_end(&mut self, e: LogicalEdgeId, other: LogicalEdgeId) {
        self.other_end.insert(e, other);
    }

    /// The opposite end of a logical edge, if the neighbor is part of the network
    pub fn other_end(&self, le: &LogicalEdge) -> Option<&LogicalEdge> {
        self.other_end.get(&le.id()).and_then(|id| self.get(id))
    }

    /// Routes received from outside of the network
    pub fn environment_vars(&self) -> &BTreeMap<LogicalEdgeId, SymbolicRoute> {
        &self.environment_vars
    }

    /// Register the environment route of an import edge
    pub fn set_environment_var(&mut self, id: LogicalEdgeId, route: SymbolicRoute) {
        self.environment_vars.insert(id, route);
    }

    /// Route sent by the other end of the edge. Falls back to the environment route if the
    /// neighbor is outside of the network.
    pub fn find_other_vars(&self, le: &LogicalEdge) -> Option<&SymbolicRoute> {
        match self.other_end(le) {
            Some(other) => Some(&other.route),
            None => self.environment_vars.get(&le.id()),
        }
    }

    /// Protocols whose routes are redistributed into `proto` at `router`, including `proto`
    pub fn redistributed_protocols(&self, router: &str, proto: Protocol) -> Option<&BTreeSet<Protocol>> {
        self.redistributed_protocols.get(router).and_then(|m| m.get(&proto))
    }

    /// Set the redistributed protocols of a router and protocol
    pub fn set_redistributed_protocols(&mut self, router: &str, proto: Protocol, ps: BTreeSet<Protocol>) {
        self.redistributed_protocols.entry(router.to_string()).or_default().insert(proto, ps);
    }

    /// Returns true if the logical edge may carry routes
    pub fn is_edge_used(&self, g: &Graph, conf: &Configuration, le: &LogicalEdge) -> bool {
        g.is_edge_used(conf, le.proto(), &le.edge)
    }

    /// Router id of the neighbor across the edge, as a constant term. Returns `0` for protocols
    /// without router ids.
    pub fn find_router_id(&self, g: &Graph, ge: &GraphEdge, proto: Protocol) -> Result<Expr, EncodingError> {
        match g.find_router_id(ge, proto) {
            Some(id) => Ok(Expr::int(id as i64)),
            None => Err(EncodingError::MissingRouterId(ge.to_string(), proto)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoder::optimizations::Optimizations;
    use crate::network::*;
    use crate::smt::Context;

    fn route(ctx: &mut Context, g: &Graph, opts: &Optimizations, name: &str, router: &str) -> SymbolicRoute {
        SymbolicRoute::new(ctx, name, router, Some(Protocol::Bgp), opts, g, true, false)
    }

    #[test]
    fn other_vars_fall_back_to_environment() {
        let mut r1 = Configuration::new("R1");
        r1.add_interface(Interface::new("eth0", "192.168.0.1/30".parse().unwrap()))
            .add_interface(Interface::new("eth1", "172.16.0.1/30".parse().unwrap()));
        r1.bgp = Some(
            BgpProcess::new("1.1.1.1".parse().unwrap())
                .neighbor(BgpNeighbor::new("192.168.0.2".parse().unwrap(), 1, 2))
                .neighbor(BgpNeighbor::new("172.16.0.2".parse().unwrap(), 1, 3)),
        );
        let mut r2 = Configuration::new("R2");
        r2.add_interface(Interface::new("eth0", "192.168.0.2/30".parse().unwrap()));
        r2.bgp = Some(
            BgpProcess::new("2.2.2.2".parse().unwrap())
                .neighbor(BgpNeighbor::new("192.168.0.1".parse().unwrap(), 2, 1)),
        );
        let g = Graph::new(vec![r1, r2], None).unwrap();
        let opts = Optimizations::new(&g, &HeaderSpace::default(), true);
        let mut ctx = Context::new();
        let mut lg = LogicalGraph::new();

        let e12 = g.edges("R1").iter().find(|e| e.start.name == "eth0").unwrap().clone();
        let ext = g.edges("R1").iter().find(|e| e.start.name == "eth1").unwrap().clone();
        let e21 = g.other_end(&e12).unwrap().clone();

        let imp = LogicalEdge::new(e12.clone(), EdgeType::Import, route(&mut ctx, &g, &opts, "imp", "R1"));
        let imp_ext = LogicalEdge::new(ext.clone(), EdgeType::Import, route(&mut ctx, &g, &opts, "imp_ext", "R1"));
        let exp = LogicalEdge::new(e21, EdgeType::Export, route(&mut ctx, &g, &opts, "exp", "R2"));
        lg.add_edges("R1", Protocol::Bgp, vec![imp.clone()]);
        lg.add_edges("R1", Protocol::Bgp, vec![imp_ext.clone()]);
        lg.add_edges("R2", Protocol::Bgp, vec![exp.clone()]);
        lg.set_other_end(imp.id(), exp.id());
        lg.set_environment_var(imp_ext.id(), route(&mut ctx, &g, &opts, "env", "R1"));

        assert_eq!(lg.find_other_vars(&imp).unwrap().name, "exp");
        assert_eq!(lg.find_other_vars(&imp_ext).unwrap().name, "env");
        assert!(lg.find_other_vars(&exp).is_none());
        assert_eq!(lg.all_edges("R1", Protocol::Bgp).count(), 2);

        let id = lg.find_router_id(&g, &e12, Protocol::Bgp).unwrap();
        assert_eq!(id.as_int(), Some("2.2.2.2".parse::<Ip>().unwrap().as_u64() as i64));
        assert_eq!(lg.find_router_id(&g, &ext, Protocol::Ospf).unwrap().as_int(), Some(0));
    }
}
