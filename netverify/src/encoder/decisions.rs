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

//! Best routes and forwarding decisions of every router.

use super::logical_graph::LogicalEdgeId;
use super::optimizations::Optimizations;
use super::symbolic_route::SymbolicRoute;
use crate::network::{GraphEdge, Protocol};
use crate::smt::Expr;
use std::collections::BTreeMap;

/// Decision variables of one slice.
///
/// Routers running a single protocol only have an overall best route, which then also serves as
/// the best route of that protocol.
#[derive(Debug, Clone, Default)]
pub struct SymbolicDecisions {
    /// Overall best route per router
    pub best_neighbor: BTreeMap<String, SymbolicRoute>,
    /// Best route per router and protocol, for routers with more than one protocol
    pub best_neighbor_per_protocol: BTreeMap<String, BTreeMap<Protocol, SymbolicRoute>>,
    /// Per router and protocol: the import edge is chosen as best route of the protocol
    pub choice_variables: BTreeMap<String, BTreeMap<Protocol, BTreeMap<LogicalEdgeId, Expr>>>,
    /// Per router and edge: the best route points out of the edge
    pub control_forwarding: BTreeMap<String, BTreeMap<GraphEdge, Expr>>,
    /// Per router and edge: packets leave on the edge after the outbound filter. Abstract
    /// edges have no data forwarding variable.
    pub data_forwarding: BTreeMap<String, BTreeMap<GraphEdge, Expr>>,
}

impl SymbolicDecisions {
    /// Create empty decisions
    pub fn new() -> Self {
        Self::default()
    }

    /// Best route of a router for one protocol
    pub fn best_vars(&self, opts: &Optimizations, router: &str, proto: Protocol) -> Option<&SymbolicRoute> {
        if opts.has_single_protocol(router) {
            self.best_neighbor.get(router)
        } else {
            self.best_neighbor_per_protocol.get(router).and_then(|m| m.get(&proto))
        }
    }

    /// Control forwarding variable of an edge
    pub fn control_forwarding(&self, ge: &GraphEdge) -> Option<&Expr> {
        self.control_forwarding.get(&ge.router).and_then(|m| m.get(ge))
    }

    /// Data forwarding variable of an edge
    pub fn data_forwarding(&self, ge: &GraphEdge) -> Option<&Expr> {
        self.data_forwarding.get(&ge.router).and_then(|m| m.get(ge))
    }

    /// Choice variable of an import edge
    pub fn choice(&self, router: &str, id: &LogicalEdgeId) -> Option<&Expr> {
        self.choice_variables.get(router).and_then(|m| m.get(&id.proto)).and_then(|m| m.get(id))
    }
}
