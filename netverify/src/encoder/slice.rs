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

//! # Encoder Slice
//!
//! One copy of the network, specialized to a set of packets (the header space of the slice).
//! The main slice models every protocol for the packet of the question. Additional slices model
//! the IGP towards the loopback of an iBGP speaker, which tells whether iBGP sessions can be
//! established.
//!
//! A slice is built in two phases. [`EncoderSlice::new`] allocates all variables (routes,
//! decisions, ACLs). Only once every slice exists, [`EncoderSlice::compute_encoding`] adds the
//! constraints, because the main slice refers to the variables of the iBGP slices.

use super::acl::{compile_acl, first_bits_equal, header_space};
use super::decisions::SymbolicDecisions;
use super::failures::SymbolicFailures;
use super::logical_graph::{EdgeType, LogicalEdge, LogicalEdgeId, LogicalGraph};
use super::optimizations::{relevant_prefix, Optimizations};
use super::symbolic_packet::SymbolicPacket;
use super::symbolic_route::SymbolicRoute;
use super::transfer::TransferFunction;
use super::EncodingError;
use crate::network::{
    BgpSendType, BooleanExpr, Configuration, Graph, GraphEdge, HeaderSpace, InterfaceAddress,
    NetworkError, OspfType, Prefix, Protocol, RoutingProtocol, Statement,
};
use crate::properties::{BgpDecisionVariable, HeaderQuestion};
use crate::smt::{Context, Expr};

use log::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

/// Name of the main slice, if iBGP slices exist.
pub const MAIN_SLICE_NAME: &str = "SLICE-MAIN_";

/// Local preference of routes that do not carry one
pub const DEFAULT_LOCAL_PREF: i64 = 100;

/// Name of the slice modeling the reachability of the iBGP speaker `router`
pub fn slice_name(router: &str) -> String {
    format!("SLICE-{}_", router)
}

/// Administrative distance of a route of the protocol, if the route does not carry one. Routes
/// learned over iBGP have a distance of 200.
pub fn default_admin_distance(proto: Protocol, route: &SymbolicRoute) -> Expr {
    let def = Expr::int(match proto {
        Protocol::Connected => 0,
        Protocol::Static => 1,
        Protocol::Ospf => 110,
        Protocol::Bgp => 20,
    });
    match &route.bgp_internal {
        Some(internal) if proto.is_bgp() => Expr::ite(internal, &Expr::int(200), &def),
        _ => def,
    }
}

/// MED of a route of the protocol, if the route does not carry one
pub fn default_med(proto: Protocol) -> i64 {
    if proto.is_bgp() {
        100
    } else {
        0
    }
}

/// The protocol history of `best` matches the protocol of `vars`.
pub fn equal_histories(best: &SymbolicRoute, vars: &SymbolicRoute) -> Result<Expr, EncodingError> {
    match (&best.protocol_history, &vars.protocol_history, vars.proto) {
        (None, _, _) => Ok(Expr::tru()),
        (Some(b), Some(v), _) => Ok(b.mk_eq(v)),
        (Some(b), None, Some(p)) => b.check_if_value(&p),
        (Some(_), None, None) => Ok(Expr::tru()),
    }
}

fn safe_eq(x: Option<&Expr>, value: Expr) -> Expr {
    match x {
        Some(x) => x.equals(&value),
        None => Expr::tru(),
    }
}

fn eq_helper(best: Option<&Expr>, vars: Option<&Expr>, default: Expr) -> Expr {
    match (best, vars) {
        (None, _) => Expr::tru(),
        (Some(b), Some(v)) => b.equals(v),
        (Some(b), None) => b.equals(&default),
    }
}

fn better_helper(best: Option<&Expr>, vars: Option<&Expr>, default: Expr, less: bool) -> Expr {
    let best = match best {
        Some(b) => b,
        None => return Expr::fls(),
    };
    let other = vars.cloned().unwrap_or(default);
    if less {
        best.lt(&other)
    } else {
        best.gt(&other)
    }
}

fn ip_expr(a: InterfaceAddress) -> Expr {
    Expr::bv(a.ip.as_u64(), 32)
}

/// Everything a slice needs to know about the rest of the encoding while adding its
/// constraints.
#[derive(Debug)]
pub struct SliceEnv<'a> {
    /// Failure variables, shared by all slices
    pub failures: &'a SymbolicFailures,
    /// All slices of the encoding, by name
    pub slices: &'a BTreeMap<String, EncoderSlice>,
    /// Per iBGP speaker `r`, and per router `x`: `x` reaches the loopback of `r`.
    pub slice_reachability: &'a BTreeMap<String, BTreeMap<String, Expr>>,
    /// The question being checked
    pub question: &'a HeaderQuestion,
    /// iBGP sessions depend on IGP reachability
    pub model_igp: bool,
}

impl<'a> SliceEnv<'a> {
    /// The iBGP slice of a router
    pub fn slice(&self, router: &str) -> Option<&'a EncoderSlice> {
        self.slices.get(&slice_name(router))
    }

    fn reachability(&self, slice_of: &str, router: &str) -> Expr {
        self.slice_reachability
            .get(slice_of)
            .and_then(|m| m.get(router))
            .cloned()
            .unwrap_or_else(Expr::fls)
    }
}

/// Encoding of the network for one header space.
#[derive(Debug)]
pub struct EncoderSlice {
    id: usize,
    name: String,
    is_main: bool,
    model_igp: bool,
    graph: Rc<Graph>,
    header_space: HeaderSpace,
    optimizations: Optimizations,
    logical_graph: LogicalGraph,
    decisions: SymbolicDecisions,
    packet: SymbolicPacket,
    inbound_acls: BTreeMap<GraphEdge, Expr>,
    outbound_acls: BTreeMap<GraphEdge, Expr>,
    forwards_across: BTreeMap<String, BTreeMap<GraphEdge, Expr>>,
    ospf_redistributed: BTreeMap<String, SymbolicRoute>,
    originated_networks: BTreeMap<String, BTreeMap<Protocol, BTreeSet<Prefix>>>,
    all_routes: Vec<SymbolicRoute>,
}

impl EncoderSlice {
    /// Allocate all variables of the slice. Variable names are prefixed with `{id}_{name}`.
    pub fn new(
        ctx: &mut Context,
        id: usize,
        name: impl Into<String>,
        graph: Rc<Graph>,
        header_space: HeaderSpace,
        model_igp: bool,
    ) -> Result<Self, EncodingError> {
        let name = name.into();
        let is_main = name.is_empty() || name == MAIN_SLICE_NAME;
        let optimizations = Optimizations::new(&graph, &header_space, is_main);
        let packet = SymbolicPacket::new(ctx, &format!("{}_{}", id, name));
        debug!("Create slice {:?} with protocols {:?}", name, optimizations.protocols());

        let mut slice = Self {
            id,
            name,
            is_main,
            model_igp,
            graph,
            header_space,
            optimizations,
            logical_graph: LogicalGraph::new(),
            decisions: SymbolicDecisions::new(),
            packet,
            inbound_acls: BTreeMap::new(),
            outbound_acls: BTreeMap::new(),
            forwards_across: BTreeMap::new(),
            ospf_redistributed: BTreeMap::new(),
            originated_networks: BTreeMap::new(),
            all_routes: Vec::new(),
        };

        slice.init_originated_networks()?;
        slice.init_redistribution_protocols()?;
        slice.add_forwarding_variables(ctx);
        slice.add_best_variables(ctx);
        slice.add_symbolic_records(ctx)?;
        slice.add_choice_variables(ctx);
        slice.add_environment_variables(ctx);
        slice.init_acl_functions(ctx)?;
        slice.init_forwards_across();
        Ok(slice)
    }

    /// Numeric id of the encoding this slice belongs to
    pub fn id(&self) -> usize {
        self.id
    }

    /// Name of the slice, `""` or [`MAIN_SLICE_NAME`] for the main slice
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true for the main slice
    pub fn is_main(&self) -> bool {
        self.is_main
    }

    /// Prefix of every variable name of this slice
    pub fn prefix(&self) -> String {
        format!("{}_{}", self.id, self.name)
    }

    /// The network graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Packets modeled by this slice
    pub fn header_space(&self) -> &HeaderSpace {
        &self.header_space
    }

    /// The symbolic packet
    pub fn packet(&self) -> &SymbolicPacket {
        &self.packet
    }

    /// Protocols and attributes modeled by this slice
    pub fn optimizations(&self) -> &Optimizations {
        &self.optimizations
    }

    /// Logical edges and environment routes
    pub fn logical_graph(&self) -> &LogicalGraph {
        &self.logical_graph
    }

    /// Best routes and forwarding decisions
    pub fn decisions(&self) -> &SymbolicDecisions {
        &self.decisions
    }

    /// Inbound ACL variables, by edge
    pub fn inbound_acls(&self) -> &BTreeMap<GraphEdge, Expr> {
        &self.inbound_acls
    }

    /// Outbound ACL variables, by edge
    pub fn outbound_acls(&self) -> &BTreeMap<GraphEdge, Expr> {
        &self.outbound_acls
    }

    /// Packets leave `router` on `ge`, and are not dropped by the inbound ACL of the neighbor.
    pub fn forwards_across(&self, router: &str, ge: &GraphEdge) -> Option<&Expr> {
        self.forwards_across.get(router).and_then(|m| m.get(ge))
    }

    /// Best route of a router for one protocol
    pub fn best_vars(&self, router: &str, proto: Protocol) -> Option<&SymbolicRoute> {
        self.decisions.best_vars(&self.optimizations, router, proto)
    }

    /// Every route variable of the slice
    pub fn all_routes(&self) -> &[SymbolicRoute] {
        &self.all_routes
    }

    fn init_originated_networks(&mut self) -> Result<(), EncodingError> {
        for (router, protos) in self.optimizations.protocols() {
            let conf = self.graph.config(router)?;
            let entry = self.originated_networks.entry(router.clone()).or_default();
            for proto in protos {
                entry.insert(*proto, Graph::originated_networks(conf, *proto));
            }
        }
        Ok(())
    }

    fn init_redistribution_protocols(&mut self) -> Result<(), EncodingError> {
        let g = self.graph.clone();
        for (router, protos) in self.optimizations.protocols() {
            let conf = g.config(router)?;
            for proto in protos {
                let policies: Vec<&str> = match proto {
                    Protocol::Ospf => {
                        conf.ospf.iter().filter_map(|o| o.export_policy.as_deref()).collect()
                    }
                    Protocol::Bgp => conf
                        .bgp
                        .iter()
                        .flat_map(|b| b.neighbors.iter())
                        .filter_map(|n| n.export_policy.as_deref())
                        .collect(),
                    _ => Vec::new(),
                };
                let mut redistributed = BTreeSet::new();
                redistributed.insert(*proto);
                for pol in policies {
                    // the other protocol may be sliced away
                    redistributed.extend(
                        Graph::find_redistributed_protocols(conf, pol, *proto)
                            .into_iter()
                            .filter(|p| protos.contains(p)),
                    );
                }
                self.logical_graph.set_redistributed_protocols(router, *proto, redistributed);
            }
        }
        Ok(())
    }

    fn add_forwarding_variables(&mut self, ctx: &mut Context) {
        let prefix = self.prefix();
        for (router, edges) in self.graph.edge_map() {
            for ge in edges {
                let iface = &ge.start.name;
                let cf = ctx.mk_bool_var(format!("{}CONTROL-FORWARDING_{}_{}", prefix, router, iface));
                self.decisions
                    .control_forwarding
                    .entry(router.clone())
                    .or_default()
                    .insert(ge.clone(), cf);
                if !ge.is_abstract {
                    let df = ctx.mk_bool_var(format!("{}DATA-FORWARDING_{}_{}", prefix, router, iface));
                    self.decisions
                        .data_forwarding
                        .entry(router.clone())
                        .or_default()
                        .insert(ge.clone(), df);
                }
            }
        }
    }

    fn new_route(&self, ctx: &mut Context, name: String, router: &str, proto: Option<Protocol>, env: bool) -> SymbolicRoute {
        SymbolicRoute::new(ctx, name, router, proto, &self.optimizations, &self.graph, self.model_igp, env)
    }

    fn add_best_variables(&mut self, ctx: &mut Context) {
        let prefix = self.prefix();
        let protocols = self.optimizations.protocols().clone();
        for (router, protos) in protocols.iter() {
            let name = format!("{}{}_OVERALL_BEST_None", prefix, router);
            let best = self.new_route(ctx, name, router, None, false);
            self.all_routes.push(best.clone());
            self.decisions.best_neighbor.insert(router.clone(), best);

            if !self.optimizations.has_single_protocol(router) {
                for proto in protos {
                    let name = format!("{}{}_{}_BEST_None", prefix, router, proto.name());
                    let best = self.new_route(ctx, name, router, Some(*proto), false);
                    self.all_routes.push(best.clone());
                    self.decisions
                        .best_neighbor_per_protocol
                        .entry(router.clone())
                        .or_default()
                        .insert(*proto, best);
                }
            }
        }
    }

    fn add_symbolic_records(&mut self, ctx: &mut Context) -> Result<(), EncodingError> {
        let g = self.graph.clone();
        let prefix = self.prefix();
        let protocols = self.optimizations.protocols().clone();

        for (router, protos) in protocols.iter() {
            let conf = g.config(router)?;
            for proto in protos {
                self.logical_graph.add_protocol(router, *proto);
                for ge in g.edges(router) {
                    if !g.is_edge_used(conf, *proto, ge) {
                        continue;
                    }
                    let mut group = Vec::new();
                    for edge_type in [EdgeType::Import, EdgeType::Export].iter().copied() {
                        let needed = match edge_type {
                            EdgeType::Import if proto.is_connected() => ge
                                .start
                                .prefix()
                                .map(|p| relevant_prefix(&self.header_space, &p))
                                .unwrap_or(false),
                            EdgeType::Import => true,
                            EdgeType::Export => proto.is_ospf() || proto.is_bgp(),
                        };
                        if !needed {
                            continue;
                        }
                        let dir = match edge_type {
                            EdgeType::Import => "IMPORT",
                            EdgeType::Export => "EXPORT",
                        };
                        let name = format!("{}{}_{}_{}_{}", prefix, router, proto.name(), dir, ge.start.name);
                        let route = self.new_route(ctx, name, router, Some(*proto), false);
                        self.all_routes.push(route.clone());
                        group.push(LogicalEdge::new(ge.clone(), edge_type, route));
                    }
                    if !group.is_empty() {
                        self.logical_graph.add_edges(router, *proto, group);
                    }
                }
            }
        }

        // link the import edge of one router to the export edge of its neighbor
        let mut links = Vec::new();
        let all = self.logical_graph.logical_edges().values().flat_map(|m| m.iter());
        for (proto, le) in all.flat_map(|(p, gs)| gs.iter().flatten().map(move |le| (*p, le))) {
            let opposite_type = match le.edge_type {
                EdgeType::Import => EdgeType::Export,
                EdgeType::Export => EdgeType::Import,
            };
            if let Some(opp) = g.other_end(&le.edge) {
                let found = self
                    .logical_graph
                    .all_edges(&opp.router, proto)
                    .find(|x| x.edge == *opp && x.edge_type == opposite_type);
                if let Some(o) = found {
                    links.push((le.id(), o.id()));
                }
            }
        }
        for (a, b) in links {
            self.logical_graph.set_other_end(a, b);
        }

        // OSPF redistribution needs a separate record, next to the best OSPF route
        for (router, protos) in protocols.iter() {
            if !protos.contains(&Protocol::Ospf) {
                continue;
            }
            let multiple = self
                .logical_graph
                .redistributed_protocols(router, Protocol::Ospf)
                .map(|s| s.len() > 1)
                .unwrap_or(false);
            let has_export = self
                .logical_graph
                .all_edges(router, Protocol::Ospf)
                .any(|le| le.edge_type == EdgeType::Export);
            if multiple && has_export {
                let name = format!("{}{}_OSPF_Redistributed", prefix, router);
                let route = self.new_route(ctx, name, router, Some(Protocol::Ospf), false);
                self.all_routes.push(route.clone());
                self.ospf_redistributed.insert(router.clone(), route);
            }
        }
        Ok(())
    }

    fn add_choice_variables(&mut self, ctx: &mut Context) {
        let mut choices = Vec::new();
        for (router, protos) in self.logical_graph.logical_edges() {
            for (proto, groups) in protos {
                for le in groups.iter().flatten().filter(|le| le.edge_type == EdgeType::Import) {
                    let choice = ctx.mk_bool_var(format!("{}_choice", le.route.name));
                    choices.push((router.clone(), *proto, le.id(), choice));
                }
            }
        }
        for (router, proto, id, choice) in choices {
            self.decisions
                .choice_variables
                .entry(router)
                .or_default()
                .entry(proto)
                .or_default()
                .insert(id, choice);
        }
    }

    /// Routes received from eBGP peers outside of the network. Only the main slice models BGP.
    fn add_environment_variables(&mut self, ctx: &mut Context) {
        if !self.is_main {
            return;
        }
        let g = self.graph.clone();
        let prefix = self.prefix();
        let mut envs = Vec::new();
        for (router, protos) in self.logical_graph.logical_edges() {
            let groups = match protos.get(&Protocol::Bgp) {
                Some(groups) => groups,
                None => continue,
            };
            for le in groups.iter().flatten().filter(|le| le.edge_type == EdgeType::Import) {
                if !g.is_external(&le.edge) {
                    continue;
                }
                if let Some(n) = g.ebgp_neighbors().get(&le.edge) {
                    let name = format!("{}{}_BGP_EXPORT_ENV-{}", prefix, router, n.peer_address);
                    envs.push((router.clone(), le.id(), name));
                }
            }
        }
        for (router, id, name) in envs {
            let route = self.new_route(ctx, name, &router, Some(Protocol::Bgp), true);
            self.all_routes.push(route.clone());
            self.logical_graph.set_environment_var(id, route);
        }
    }

    fn init_acl_functions(&mut self, ctx: &mut Context) -> Result<(), EncodingError> {
        let prefix = self.prefix();
        for (router, edges) in self.graph.edge_map() {
            let conf = self.graph.config(router)?;
            for ge in edges {
                let iface = &ge.start;
                let filters = [(&iface.outgoing_filter, "OUTBOUND"), (&iface.incoming_filter, "INBOUND")];
                for (filter, dir) in filters.iter() {
                    let name = match filter {
                        Some(name) => name,
                        None => continue,
                    };
                    let acl = conf
                        .acls
                        .get(name)
                        .ok_or_else(|| NetworkError::AclNotFound(router.clone(), name.clone()))?;
                    let var = ctx.mk_bool_var(format!("{}_{}_{}_{}_{}", prefix, router, iface.name, dir, name));
                    ctx.add(var.equals(&compile_acl(&self.packet, acl)?));
                    let acls = if *dir == "OUTBOUND" { &mut self.outbound_acls } else { &mut self.inbound_acls };
                    acls.insert(ge.clone(), var);
                }
            }
        }
        Ok(())
    }

    fn init_forwards_across(&mut self) {
        for (router, edges) in self.decisions.data_forwarding.iter() {
            for (ge, dfwd) in edges {
                let in_acl = match &ge.end {
                    None => Expr::tru(),
                    Some(_) => self
                        .graph
                        .other_end(ge)
                        .and_then(|o| self.inbound_acls.get(o))
                        .cloned()
                        .unwrap_or_else(Expr::tru),
                };
                self.forwards_across
                    .entry(router.clone())
                    .or_default()
                    .insert(ge.clone(), dfwd.and(&in_acl));
            }
        }
    }

    /// Add all constraints of the slice to the context. Every slice of `env` must exist.
    pub fn compute_encoding(&self, ctx: &mut Context, env: &SliceEnv) -> Result<(), EncodingError> {
        info!("Encode slice {:?}", self.name);
        self.add_bound_constraints(ctx);
        self.add_community_constraints(ctx);
        self.add_transfer_functions(ctx, env)?;
        self.add_history_constraints(ctx)?;
        self.add_best_per_protocol_constraints(ctx, env)?;
        self.add_choice_per_protocol_constraints(ctx)?;
        self.add_best_overall_constraints(ctx, env)?;
        self.add_control_forwarding_constraints(ctx)?;
        self.add_data_forwarding_constraints(ctx, env)?;
        self.add_unused_default_value_constraints(ctx);
        ctx.add(header_space(&self.packet, &self.header_space));
        if self.is_main {
            self.add_environment_constraints(ctx)?;
        }
        Ok(())
    }

    fn add_bound_constraints(&self, ctx: &mut Context) {
        let zero = Expr::int(0);
        let pkt = &self.packet;
        let range = |x: &Expr, upper: i64| x.ge(&zero).and(&x.lt(&Expr::int(upper)));
        ctx.add(range(&pkt.dst_port, 1 << 16));
        ctx.add(range(&pkt.src_port, 1 << 16));
        ctx.add(range(&pkt.icmp_type, 1 << 8));
        ctx.add(pkt.ip_protocol.ge(&zero).and(&pkt.ip_protocol.le(&Expr::int(1 << 8))));
        ctx.add(range(&pkt.icmp_code, 1 << 4));

        for r in self.all_routes.iter() {
            if let Some(id) = &r.router_id {
                ctx.add(id.ge(&zero));
            }
            if let Some(ad) = &r.admin_dist {
                ctx.add(range(ad, 1 << 8));
            }
            if let Some(med) = &r.med {
                ctx.add(range(med, 1 << 32));
            }
            if let Some(lp) = &r.local_pref {
                ctx.add(range(lp, 1 << 32));
            }
            ctx.add(r.metric.ge(&zero));
            if r.is_env {
                ctx.add(r.metric.lt(&Expr::int(1 << 8)));
            }
            ctx.add(r.metric.lt(&Expr::int(1 << 16)));
            if let Some(igp) = &r.igp_metric {
                ctx.add(igp.ge(&zero));
            }
            ctx.add(r.prefix_length.ge(&zero).and(&r.prefix_length.le(&Expr::int(32))));
        }
    }

    /// A regex community is attached iff one of the exact communities it matches is attached.
    fn add_community_constraints(&self, ctx: &mut Context) {
        let deps = self.graph.community_dependencies();
        for r in self.all_routes.iter() {
            for (c, e) in r.communities.iter().filter(|(c, _)| c.is_regex()) {
                let any = Expr::or_all(
                    deps.get(c).into_iter().flatten().filter_map(|d| r.communities.get(d)).cloned(),
                );
                ctx.add(any.equals(e));
            }
        }
    }

    fn policy_statements(&self, conf: &Configuration, name: Option<&str>) -> Result<Option<Vec<Statement>>, EncodingError> {
        match name {
            None => Ok(None),
            Some(name) => conf
                .routing_policies
                .get(name)
                .map(|p| Some(p.statements.clone()))
                .ok_or_else(|| NetworkError::PolicyNotFound(conf.hostname.clone(), name.to_string()).into()),
        }
    }

    fn add_transfer_functions(&self, ctx: &mut Context, env: &SliceEnv) -> Result<(), EncodingError> {
        for (router, protos) in self.optimizations.protocols() {
            let conf = self.graph.config(router)?;
            for proto in protos {
                let mut has_edge = false;
                for le in self.logical_graph.all_edges(router, *proto) {
                    if !self.graph.is_edge_used(conf, *proto, &le.edge) {
                        continue;
                    }
                    has_edge = true;
                    match le.edge_type {
                        EdgeType::Import => self.add_import_constraint(ctx, env, conf, *proto, le)?,
                        EdgeType::Export => self.add_export_constraint(ctx, env, conf, *proto, le)?,
                    }
                }
                if !has_edge {
                    if let Some(best) = self.best_vars(router, *proto) {
                        ctx.add(best.permitted.not());
                    }
                }
            }
        }
        Ok(())
    }

    fn not_failed(env: &SliceEnv, ge: &GraphEdge) -> Result<Expr, EncodingError> {
        Ok(env.failures.failed_variable(ge)?.equals(&Expr::int(0)))
    }

    fn not_failed_node(env: &SliceEnv, router: &str) -> Expr {
        env.failures.failed_node(router).equals(&Expr::int(0))
    }

    fn add_import_constraint(
        &self,
        ctx: &mut Context,
        env: &SliceEnv,
        conf: &Configuration,
        proto: Protocol,
        le: &LogicalEdge,
    ) -> Result<(), EncodingError> {
        let ge = &le.edge;
        let iface = &ge.start;
        let vars = &le.route;
        let not_permitted = vars.permitted.not();
        let not_failed = Self::not_failed(env, ge)?;
        let not_failed_node = Self::not_failed_node(env, &ge.router);
        let active = Expr::bool(Graph::is_interface_active(proto, iface));
        let dst = &self.packet.dst_ip;

        let origin = |p: &Prefix, ad: i64| {
            let relevant = Expr::and_all(vec![
                active.clone(),
                first_bits_equal(dst, p),
                not_failed.clone(),
                not_failed_node.clone(),
            ]);
            let values = Expr::and_all(vec![
                vars.permitted.clone(),
                vars.prefix_length.equals(&Expr::int(p.len() as i64)),
                safe_eq(vars.admin_dist.as_ref(), Expr::int(ad)),
                safe_eq(vars.local_pref.as_ref(), Expr::int(0)),
                vars.metric.equals(&Expr::int(0)),
            ]);
            (relevant, values)
        };

        match proto {
            Protocol::Connected => {
                let c = match iface.prefix() {
                    Some(p) => {
                        let (relevant, values) = origin(&p, 1);
                        Expr::ite(&relevant, &values, &not_permitted)
                    }
                    None => not_permitted,
                };
                ctx.add(c);
            }
            Protocol::Static => {
                let mut srs: Vec<_> = self.graph.static_routes(&ge.router, &iface.name).iter().collect();
                // the most specific route is checked first
                srs.sort_by_key(|sr| sr.network.len());
                let mut acc = not_permitted;
                for sr in srs {
                    let (relevant, values) = origin(&sr.network, sr.admin_cost as i64);
                    acc = Expr::ite(&relevant, &values, &acc);
                }
                ctx.add(acc);
            }
            Protocol::Ospf | Protocol::Bgp => {
                let other = match self.logical_graph.find_other_vars(le) {
                    Some(other) => other,
                    None => {
                        ctx.add(not_permitted);
                        return Ok(());
                    }
                };
                let receive = self.receive_message(env, proto, ge, other, &not_failed)?;

                // BGP loop prevention
                let loop_ = match (proto.is_bgp(), ge.peer.is_some()) {
                    (true, true) => self
                        .graph
                        .other_end(ge)
                        .and_then(|o| self.decisions.control_forwarding(o))
                        .cloned()
                        .unwrap_or_else(Expr::fls),
                    _ => Expr::fls(),
                };
                let usable = Expr::and_all(vec![
                    loop_.not(),
                    active,
                    other.permitted.clone(),
                    receive,
                    not_failed_node,
                ]);

                let policy = self.graph.find_import_routing_policy(proto, ge);
                let statements = self.policy_statements(conf, policy)?.unwrap_or_else(|| vec![Statement::ExitAccept]);
                let cost = if proto.is_ospf() { iface.ospf_cost.unwrap_or(1) as i64 } else { 0 };
                let f = TransferFunction::new(self, env, conf, other, vars, proto, &statements, cost, ge, false);
                let import = f.compute(ctx)?;
                ctx.add(Expr::ite(&usable, &import, &not_permitted));
            }
        }
        Ok(())
    }

    /// Condition under which the route of an iBGP session is received. With IGP modeling, the
    /// sender must be reachable in its iBGP slice.
    fn receive_message(
        &self,
        env: &SliceEnv,
        proto: Protocol,
        ge: &GraphEdge,
        other: &SymbolicRoute,
        not_failed: &Expr,
    ) -> Result<Expr, EncodingError> {
        if !proto.is_bgp() || !env.model_igp {
            return Ok(not_failed.clone());
        }
        let peer_type = self.graph.peer_type(ge)?;
        let current = &ge.router;
        match (peer_type, &ge.peer) {
            (BgpSendType::ToEbgp, _) => Ok(not_failed.clone()),
            (BgpSendType::ToRr, _) => {
                let mut acc = Vec::new();
                if let Some(cid) = &other.client_id {
                    for (r, id) in self.graph.originator_id().iter().filter(|(r, _)| *r != current) {
                        acc.push(cid.check_if_value(id)?.implies(&env.reachability(current, r)));
                    }
                }
                Ok(Expr::and_all(acc))
            }
            (_, Some(peer)) => Ok(env.reachability(current, peer)),
            (_, None) => Ok(not_failed.clone()),
        }
    }

    fn add_export_constraint(
        &self,
        ctx: &mut Context,
        env: &SliceEnv,
        conf: &Configuration,
        proto: Protocol,
        le: &LogicalEdge,
    ) -> Result<(), EncodingError> {
        let ge = &le.edge;
        let iface = &ge.start;
        let router = &ge.router;
        let vars = &le.route;
        let not_permitted = vars.permitted.not();

        if !(proto.is_ospf() || proto.is_bgp()) {
            ctx.add(not_permitted);
            return Ok(());
        }

        let (other, redistributed, overall_best) = if proto.is_ospf() {
            (
                self.best_vars(router, proto),
                self.ospf_redistributed.get(router),
                self.decisions.best_neighbor.get(router),
            )
        } else {
            (self.decisions.best_neighbor.get(router), None, None)
        };
        let other = match other {
            Some(other) => other,
            None => {
                ctx.add(not_permitted);
                return Ok(());
            }
        };

        let not_failed = Self::not_failed(env, ge)?;
        let not_failed_node = match &ge.peer {
            Some(peer) => Self::not_failed_node(env, peer),
            None => Expr::tru(),
        };
        let active = Expr::bool(Graph::is_interface_active(proto, iface));

        let mut cost = if proto.is_bgp() { 1 } else { 0 };
        let mut do_export = Expr::tru();
        // (1) eBGP and clients receive everything, (2) non-clients only receive routes not
        // learned over iBGP.
        if proto.is_bgp() && self.optimizations.need_bgp_internal(router) {
            match self.graph.peer_type(ge)? {
                BgpSendType::ToEbgp => {}
                BgpSendType::ToClient => cost = 0,
                BgpSendType::ToNonclient | BgpSendType::ToRr => {
                    let best_bgp = self.best_vars(router, proto).unwrap_or(other);
                    if let Some(internal) = &best_bgp.bgp_internal {
                        do_export = internal.not();
                        cost = 0;
                    }
                }
            }
        }

        let policy = self.graph.find_export_routing_policy(conf, proto, ge);
        let policy = self.policy_statements(conf, policy)?;
        let statements = if proto.is_ospf() {
            vec![Statement::if_then_else(
                BooleanExpr::MatchProtocol(vec![RoutingProtocol::Ospf]),
                vec![Statement::ExitAccept],
                policy.unwrap_or_else(|| vec![Statement::ExitReject]),
            )]
        } else {
            policy.unwrap_or_else(|| vec![Statement::ExitAccept])
        };

        let f = TransferFunction::new(self, env, conf, other, vars, proto, &statements, cost, ge, true);
        let export = f.compute(ctx)?;
        let usable = Expr::and_all(vec![
            active.clone(),
            do_export.clone(),
            other.permitted.clone(),
            not_failed.clone(),
            not_failed_node.clone(),
        ]);

        let mut acc = match (redistributed, overall_best) {
            (Some(redist), Some(best)) => {
                // export the better of the OSPF route and the redistributed route
                let f = TransferFunction::new(self, env, conf, best, redist, proto, &statements, cost, ge, true);
                let redist_transfer = f.compute(ctx)?;
                ctx.add(redist_transfer);
                let usable_redist = Expr::and_all(vec![
                    active.clone(),
                    do_export,
                    redist.permitted.clone(),
                    not_failed,
                    not_failed_node,
                ]);
                let geq = self.greater_or_equal(env, conf, proto, redist, other, Some(le))?;
                let uses_ospf = other.permitted.and(&redist.permitted.and(&geq).not());
                let eq = self
                    .equal(conf, proto, redist, Some(vars), Some(le), false)?
                    .and(&redist.permitted.equals(&vars.permitted));
                Expr::ite(
                    &uses_ospf,
                    &Expr::ite(&usable, &export, &not_permitted),
                    &Expr::ite(&usable_redist, &eq, &not_permitted),
                )
            }
            _ => Expr::ite(&usable, &export, &not_permitted),
        };

        if proto.is_ospf() {
            let mut origins: Vec<Prefix> = self
                .originated_networks
                .get(router)
                .and_then(|m| m.get(&proto))
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default();
            origins.sort_by_key(|p| p.len());
            for p in origins {
                let len = Expr::int(p.len() as i64);
                let mut relevant = active.and(&first_bits_equal(&self.packet.dst_ip, &p));
                if let Some(redist) = redistributed {
                    let ad = redist.admin_dist.clone().unwrap_or_else(|| Expr::int(110));
                    let better = redist
                        .prefix_length
                        .gt(&len)
                        .or(&redist.prefix_length.equals(&len).and(&ad.lt(&Expr::int(110))));
                    relevant = relevant.and(&redist.permitted.and(&better).not());
                }
                let mut values = vec![
                    vars.permitted.clone(),
                    safe_eq(vars.local_pref.as_ref(), Expr::int(0)),
                    safe_eq(vars.admin_dist.as_ref(), Expr::int(110)),
                    vars.metric.equals(&Expr::int(cost)),
                    safe_eq(vars.med.as_ref(), Expr::int(100)),
                    vars.prefix_length.equals(&len),
                    safe_eq(vars.bgp_internal.as_ref(), Expr::fls()),
                    safe_eq(vars.igp_metric.as_ref(), Expr::int(0)),
                ];
                if let Some(t) = &vars.ospf_type {
                    values.push(t.check_if_value(&OspfType::O)?);
                }
                if let (Some(area), Some(a)) = (&vars.ospf_area, iface.ospf_area) {
                    values.push(area.check_if_value(&a)?);
                }
                values.extend(vars.communities.values().map(|c| c.not()));
                acc = Expr::ite(&relevant, &Expr::and_all(values), &acc);
            }
        }

        ctx.add(acc);
        Ok(())
    }

    /// `best` is equal to `vars` in all attributes relevant for the decision process. If `vars`
    /// is `None`, `best` must carry the default values.
    pub fn equal(
        &self,
        conf: &Configuration,
        proto: Protocol,
        best: &SymbolicRoute,
        vars: Option<&SymbolicRoute>,
        e: Option<&LogicalEdge>,
        compare_communities: bool,
    ) -> Result<Expr, EncodingError> {
        let v = |f: fn(&SymbolicRoute) -> Option<&Expr>| vars.and_then(f);
        let default_ad = default_admin_distance(proto, vars.unwrap_or(best));
        let mut eqs = vec![
            eq_helper(Some(&best.prefix_length), v(|r| Some(&r.prefix_length)), Expr::int(0)),
            eq_helper(best.admin_dist.as_ref(), v(|r| r.admin_dist.as_ref()), default_ad),
            eq_helper(best.local_pref.as_ref(), v(|r| r.local_pref.as_ref()), Expr::int(DEFAULT_LOCAL_PREF)),
            eq_helper(Some(&best.metric), v(|r| Some(&r.metric)), Expr::int(0)),
            eq_helper(best.med.as_ref(), v(|r| r.med.as_ref()), Expr::int(default_med(proto))),
            eq_helper(best.igp_metric.as_ref(), v(|r| r.igp_metric.as_ref()), Expr::int(0)),
        ];

        match (&best.ospf_type, vars.and_then(|r| r.ospf_type.as_ref())) {
            (Some(b), Some(t)) => eqs.push(b.mk_eq(t)),
            (Some(b), None) => eqs.push(b.is_default()),
            _ => {}
        }

        if let (Some(e), Some(area)) = (e, &best.ospf_area) {
            match (vars.and_then(|r| r.ospf_area.as_ref()), e.edge.start.ospf_area) {
                (Some(a), _) => eqs.push(area.mk_eq(a)),
                (None, Some(a)) => eqs.push(area.check_if_value(&a)?),
                (None, None) => eqs.push(area.is_default()),
            }
        }

        match (&best.router_id, vars.and_then(|r| r.router_id.as_ref()), e) {
            (Some(b), Some(id), _) => eqs.push(b.equals(id)),
            (Some(b), None, Some(e)) => {
                eqs.push(b.equals(&self.logical_graph.find_router_id(&self.graph, &e.edge, proto)?))
            }
            _ => {}
        }

        if let Some(vars) = vars {
            eqs.push(equal_histories(best, vars)?);
            if let (Some(a), Some(b)) = (&best.bgp_internal, &vars.bgp_internal) {
                eqs.push(a.equals(b));
            }
        }

        if let Some(cid) = &best.client_id {
            match vars.and_then(|r| r.client_id.as_ref()) {
                Some(other) => eqs.push(cid.mk_eq(other)),
                None => {
                    let x = self.graph.originator_id().get(&conf.hostname).copied().unwrap_or(0);
                    eqs.push(cid.check_if_value(&x)?);
                }
            }
        }

        if compare_communities {
            for (c, b) in best.communities.iter() {
                match vars.and_then(|r| r.communities.get(c)) {
                    Some(o) => eqs.push(b.equals(o)),
                    None => eqs.push(b.not()),
                }
            }
        }

        Ok(Expr::and_all(eqs))
    }

    /// `best` is at least as good as `vars`. Attributes are compared lexicographically: prefix
    /// length, administrative distance, the BGP ranking of the question, OSPF type and the router
    /// id as final tie-breaker.
    fn greater_or_equal(
        &self,
        env: &SliceEnv,
        _conf: &Configuration,
        proto: Protocol,
        best: &SymbolicRoute,
        vars: &SymbolicRoute,
        e: Option<&LogicalEdge>,
    ) -> Result<Expr, EncodingError> {
        let tiebreak = match (&best.router_id, &vars.router_id, e) {
            (Some(b), Some(v), _) => b.le(v),
            (Some(b), None, None) => b.le(&Expr::int(0)),
            (Some(b), None, Some(e)) => b.le(&self.logical_graph.find_router_id(&self.graph, &e.edge, proto)?),
            (None, _, _) => Expr::tru(),
        };

        let (better_type, equal_type) = match (&best.ospf_type, &vars.ospf_type) {
            (Some(b), Some(v)) => (v.bitvec().bvule(b.bitvec()).not(), b.mk_eq(v)),
            (Some(b), None) => (Expr::fls(), b.is_default()),
            _ => (Expr::fls(), Expr::tru()),
        };
        let mut b = better_type.or(&equal_type.and(&tiebreak));

        for var in env.question.bgp_ranking.iter().rev() {
            let (better, equal) = match var {
                BgpDecisionVariable::Localpref => {
                    let def = Expr::int(DEFAULT_LOCAL_PREF);
                    let (bl, vl) = (best.local_pref.as_ref(), vars.local_pref.as_ref());
                    (better_helper(bl, vl, def.clone(), false), eq_helper(bl, vl, def))
                }
                BgpDecisionVariable::Pathlen => {
                    let (bm, vm) = (Some(&best.metric), Some(&vars.metric));
                    (better_helper(bm, vm, Expr::int(0), true), eq_helper(bm, vm, Expr::int(0)))
                }
                BgpDecisionVariable::Med => {
                    let def = Expr::int(default_med(proto));
                    let (bm, vm) = (best.med.as_ref(), vars.med.as_ref());
                    (better_helper(bm, vm, def.clone(), true), eq_helper(bm, vm, def))
                }
                BgpDecisionVariable::EbgpPrefIbgp => match (&best.bgp_internal, &vars.bgp_internal) {
                    (Some(bi), Some(vi)) => (bi.not().and(vi), bi.equals(vi)),
                    _ => (Expr::fls(), Expr::tru()),
                },
                BgpDecisionVariable::Igpcost => {
                    let (bi, vi) = (best.igp_metric.as_ref(), vars.igp_metric.as_ref());
                    (better_helper(bi, vi, Expr::int(0), true), eq_helper(bi, vi, Expr::int(0)))
                }
            };
            b = better.or(&equal.and(&b));
        }

        let default_ad = default_admin_distance(proto, vars);
        let (ba, va) = (best.admin_dist.as_ref(), vars.admin_dist.as_ref());
        b = better_helper(ba, va, default_ad.clone(), true).or(&eq_helper(ba, va, default_ad).and(&b));

        let (bl, vl) = (Some(&best.prefix_length), Some(&vars.prefix_length));
        b = better_helper(bl, vl, Expr::int(0), false).or(&eq_helper(bl, vl, Expr::int(0)).and(&b));
        Ok(b)
    }

    fn add_history_constraints(&self, ctx: &mut Context) -> Result<(), EncodingError> {
        for (router, best) in self.decisions.best_neighbor.iter() {
            if !self.optimizations.has_single_protocol(router) {
                continue;
            }
            if let (Some(h), Some(proto)) =
                (&best.protocol_history, self.optimizations.router_protocols(router).first())
            {
                ctx.add(best.permitted.implies(&h.check_if_value(proto)?));
            }
        }
        Ok(())
    }

    fn add_best_per_protocol_constraints(&self, ctx: &mut Context, env: &SliceEnv) -> Result<(), EncodingError> {
        for (router, protos) in self.optimizations.protocols() {
            let conf = self.graph.config(router)?;
            for proto in protos {
                let best = match self.best_vars(router, *proto) {
                    Some(best) => best,
                    None => continue,
                };
                let mut some_permitted = Vec::new();
                let mut acc = Vec::new();
                for le in self.logical_graph.import_edges(&self.graph, conf, *proto) {
                    let vars = &le.route;
                    some_permitted.push(vars.permitted.clone());
                    acc.push(vars.permitted.and(&self.equal(conf, *proto, best, Some(vars), Some(le), true)?));
                    let geq = self.greater_or_equal(env, conf, *proto, best, vars, Some(le))?;
                    ctx.add(vars.permitted.implies(&geq));
                }
                if !some_permitted.is_empty() {
                    let some = Expr::or_all(some_permitted);
                    ctx.add(some.equals(&best.permitted));
                    ctx.add(some.implies(&Expr::or_all(acc)));
                }
            }
        }
        Ok(())
    }

    fn add_choice_per_protocol_constraints(&self, ctx: &mut Context) -> Result<(), EncodingError> {
        for (router, protos) in self.optimizations.protocols() {
            let conf = self.graph.config(router)?;
            for proto in protos {
                let best = match self.best_vars(router, *proto) {
                    Some(best) => best,
                    None => continue,
                };
                for le in self.logical_graph.import_edges(&self.graph, conf, *proto) {
                    let choice = self
                        .decisions
                        .choice(router, &le.id())
                        .ok_or_else(|| EncodingError::MissingVariable(format!("choice of {}", le)))?;
                    let vars = &le.route;
                    let is_best = vars.permitted.and(&self.equal(conf, *proto, best, Some(vars), Some(le), false)?);
                    ctx.add(choice.equals(&is_best));
                }
            }
        }
        Ok(())
    }

    fn add_best_overall_constraints(&self, ctx: &mut Context, env: &SliceEnv) -> Result<(), EncodingError> {
        for (router, protos) in self.optimizations.protocols() {
            if self.optimizations.has_single_protocol(router) {
                continue;
            }
            let conf = self.graph.config(router)?;
            let best = match self.decisions.best_neighbor.get(router) {
                Some(best) => best,
                None => continue,
            };
            let mut some_permitted = Vec::new();
            let mut acc = Vec::new();
            for proto in protos {
                let bv = match self.best_vars(router, *proto) {
                    Some(bv) => bv,
                    None => continue,
                };
                some_permitted.push(bv.permitted.clone());
                acc.push(bv.permitted.and(&self.equal(conf, *proto, best, Some(bv), None, true)?));
                let geq = self.greater_or_equal(env, conf, *proto, best, bv, None)?;
                ctx.add(bv.permitted.implies(&geq));
            }
            if some_permitted.is_empty() {
                ctx.add(best.permitted.not());
            } else {
                let some = Expr::or_all(some_permitted);
                ctx.add(some.equals(&best.permitted));
                ctx.add(some.implies(&Expr::or_all(acc)));
            }
        }
        Ok(())
    }

    /// Connected routes only forward packets not addressed to the router itself.
    fn connected_will_send(&self, ge: &GraphEdge) -> Expr {
        let dst = &self.packet.dst_ip;
        let to_host = ge.peer.as_deref().map(|p| self.graph.is_host(p)).unwrap_or(false);
        match self.graph.other_end(ge) {
            Some(other) if !to_host => {
                other.start_address().map(|a| dst.equals(&ip_expr(a))).unwrap_or_else(Expr::fls)
            }
            _ => ge.start_address().map(|a| dst.equals(&ip_expr(a)).not()).unwrap_or_else(Expr::tru),
        }
    }

    fn add_control_forwarding_constraints(&self, ctx: &mut Context) -> Result<(), EncodingError> {
        for (router, conf) in self.graph.configurations() {
            let cf_of = |ge: &GraphEdge| {
                self.decisions
                    .control_forwarding(ge)
                    .cloned()
                    .ok_or_else(|| EncodingError::MissingVariable(format!("control forwarding of {}", ge)))
            };
            let best = self.decisions.best_neighbor.get(router);
            let mut sends_over: HashMap<GraphEdge, Vec<Expr>> = HashMap::new();
            let mut some_edge = false;

            if let Some(best) = best {
                for proto in self.optimizations.router_protocols(router) {
                    for le in self.logical_graph.import_edges(&self.graph, conf, *proto) {
                        some_edge = true;
                        let ge = &le.edge;
                        let choice = self
                            .decisions
                            .choice(router, &le.id())
                            .cloned()
                            .ok_or_else(|| EncodingError::MissingVariable(format!("choice of {}", le)))?;
                        let is_best = choice.and(&self.equal(conf, *proto, best, Some(&le.route), Some(le), false)?);
                        let can_send =
                            if proto.is_connected() { self.connected_will_send(ge) } else { Expr::tru() };
                        let sends = can_send.and(&is_best);
                        ctx.add(sends.implies(&cf_of(ge)?));
                        sends_over.entry(ge.clone()).or_default().push(sends);
                    }
                }
            }

            for ge in self.graph.edges(router) {
                if !sends_over.contains_key(ge) {
                    ctx.add(cf_of(ge)?.not());
                }
            }

            if some_edge {
                // no forwarding without a best route over the edge
                let mut seen = BTreeSet::new();
                for le in self
                    .optimizations
                    .router_protocols(router)
                    .iter()
                    .flat_map(|p| self.logical_graph.all_edges(router, *p))
                {
                    if !seen.insert(le.edge.clone()) {
                        continue;
                    }
                    let cf = cf_of(&le.edge)?;
                    match sends_over.get(&le.edge) {
                        Some(sends) => ctx.add(Expr::or_all(sends.iter().cloned()).not().implies(&cf.not())),
                        None => ctx.add(cf.not()),
                    }
                }
            }
        }
        Ok(())
    }

    fn add_data_forwarding_constraints(&self, ctx: &mut Context, env: &SliceEnv) -> Result<(), EncodingError> {
        for (router, edges) in self.graph.edge_map() {
            for ge in edges.iter().filter(|ge| !ge.is_abstract) {
                let missing = |what: &str| EncodingError::MissingVariable(format!("{} of {}", what, ge));
                let cf = self.decisions.control_forwarding(ge).ok_or_else(|| missing("control forwarding"))?;
                let df = self.decisions.data_forwarding(ge).ok_or_else(|| missing("data forwarding"))?;

                let mut fwd = vec![cf.clone()];
                // packets routed over an iBGP session follow the IGP towards the next hop
                if self.is_main {
                    for ge2 in edges.iter().filter(|ge| ge.is_abstract) {
                        let ctrl = match self.decisions.control_forwarding(ge2) {
                            Some(ctrl) => ctrl,
                            None => continue,
                        };
                        if self.graph.peer_type(ge2)? == BgpSendType::ToRr {
                            let cid = self.decisions.best_neighbor.get(router).and_then(|b| b.client_id.as_ref());
                            for (r, id) in self.graph.originator_id() {
                                let next = env.slice(r).and_then(|s| s.decisions.data_forwarding(ge));
                                if let (Some(cid), Some(next)) = (cid, next) {
                                    fwd.push(Expr::and_all(vec![ctrl.clone(), cid.check_if_value(id)?, next.clone()]));
                                }
                            }
                        } else if let Some(peer) = &ge2.peer {
                            if let Some(next) = env.slice(peer).and_then(|s| s.decisions.data_forwarding(ge)) {
                                fwd.push(ctrl.and(next));
                            }
                        }
                    }
                }

                let acl = self.outbound_acls.get(ge).cloned().unwrap_or_else(Expr::tru);
                ctx.add(Expr::or_all(fwd).and(&acl).equals(df));
            }
        }
        Ok(())
    }

    fn add_unused_default_value_constraints(&self, ctx: &mut Context) {
        let zero = Expr::int(0);
        for r in self.all_routes.iter() {
            let not_permitted = r.permitted.not();
            let mut defaults = vec![
                r.prefix_length.equals(&zero),
                r.metric.equals(&zero),
            ];
            for x in [&r.admin_dist, &r.med, &r.local_pref, &r.igp_metric, &r.router_id].iter() {
                if let Some(x) = x {
                    defaults.push(x.equals(&zero));
                }
            }
            if let Some(a) = &r.ospf_area {
                defaults.push(a.is_default());
            }
            if let Some(t) = &r.ospf_type {
                defaults.push(t.is_default());
            }
            if let Some(h) = &r.protocol_history {
                defaults.push(h.is_default());
            }
            if let Some(c) = &r.client_id {
                defaults.push(c.is_default());
            }
            if let Some(i) = &r.bgp_internal {
                defaults.push(i.not());
            }
            defaults.extend(r.communities.values().map(|c| c.not()));
            for d in defaults {
                ctx.add(not_permitted.implies(&d));
            }
        }
    }

    /// Environment routes are never internal, and never come from a route reflector client.
    fn add_environment_constraints(&self, ctx: &mut Context) -> Result<(), EncodingError> {
        for r in self.logical_graph.environment_vars().values() {
            if let Some(i) = &r.bgp_internal {
                ctx.add(i.not());
            }
            if let Some(c) = &r.client_id {
                ctx.add(c.check_if_value(&0)?);
            }
        }
        Ok(())
    }

    /// Import edge identities of a router, in the order of the logical graph
    pub fn import_edge_ids(&self, router: &str) -> Vec<LogicalEdgeId> {
        self.optimizations
            .router_protocols(router)
            .iter()
            .flat_map(|p| self.logical_graph.all_edges(router, *p))
            .filter(|le| le.edge_type == EdgeType::Import)
            .map(|le| le.id())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::*;

    fn two_routers() -> Rc<Graph> {
        let mut r1 = Configuration::new("R1");
        r1.add_interface(Interface::new("eth0", "192.168.0.1/30".parse().unwrap()))
            .add_interface(Interface::new("eth1", "172.16.0.1/30".parse().unwrap()).outgoing_filter("block"))
            .add_acl(IpAccessList::new("block", vec![]));
        r1.bgp = Some(
            BgpProcess::new("1.1.1.1".parse().unwrap())
                .neighbor(BgpNeighbor::new("192.168.0.2".parse().unwrap(), 1, 2))
                .neighbor(BgpNeighbor::new("172.16.0.2".parse().unwrap(), 1, 3)),
        );
        let mut r2 = Configuration::new("R2");
        r2.add_interface(Interface::new("eth0", "192.168.0.2/30".parse().unwrap()))
            .add_interface(Interface::new("eth1", "10.0.0.1/24".parse().unwrap()));
        r2.bgp = Some(
            BgpProcess::new("2.2.2.2".parse().unwrap())
                .neighbor(BgpNeighbor::new("192.168.0.1".parse().unwrap(), 2, 1))
                .network("10.0.0.0/24".parse().unwrap()),
        );
        Rc::new(Graph::new(vec![r1, r2], None).unwrap())
    }

    fn find<'a>(ctx: &'a Context, name: &str) -> Option<&'a Expr> {
        ctx.variable(name)
    }

    #[test]
    fn variables_are_named_per_slice() {
        let g = two_routers();
        let mut ctx = Context::new();
        let s = EncoderSlice::new(&mut ctx, 0, "", g, HeaderSpace::default(), true).unwrap();
        assert!(s.is_main());
        assert!(find(&ctx, "0_CONTROL-FORWARDING_R1_eth0").is_some());
        assert!(find(&ctx, "0_DATA-FORWARDING_R1_eth0").is_some());
        assert!(find(&ctx, "0_R1_OVERALL_BEST_None_permitted").is_some());
        assert!(find(&ctx, "0_R1_BGP_BEST_None_permitted").is_some());
        assert!(find(&ctx, "0_R1_BGP_IMPORT_eth0_permitted").is_some());
        assert!(find(&ctx, "0_R1_BGP_EXPORT_eth0_permitted").is_some());
        assert!(find(&ctx, "0_R1_BGP_IMPORT_eth0_choice").is_some());
        assert!(find(&ctx, "0_R1_BGP_EXPORT_ENV-172.16.0.2_permitted").is_some());
        assert!(find(&ctx, "0__R1_eth1_OUTBOUND_block").is_some());
        assert_eq!(s.logical_graph().environment_vars().len(), 1);
    }

    #[test]
    fn import_edges_are_linked_to_neighbor_exports() {
        let g = two_routers();
        let mut ctx = Context::new();
        let s = EncoderSlice::new(&mut ctx, 0, "", g, HeaderSpace::default(), true).unwrap();
        let imp = s
            .logical_graph()
            .all_edges("R1", Protocol::Bgp)
            .find(|le| le.edge_type == EdgeType::Import && le.edge.start.name == "eth0")
            .unwrap();
        let other = s.logical_graph().find_other_vars(imp).unwrap();
        assert_eq!(other.name, "0_R2_BGP_EXPORT_eth0");

        let ext = s
            .logical_graph()
            .all_edges("R1", Protocol::Bgp)
            .find(|le| le.edge_type == EdgeType::Import && le.edge.start.name == "eth1")
            .unwrap();
        assert!(s.logical_graph().find_other_vars(ext).unwrap().is_env);
    }

    #[test]
    fn forwards_across_includes_acl() {
        let g = two_routers();
        let mut ctx = Context::new();
        let s = EncoderSlice::new(&mut ctx, 0, "", g.clone(), HeaderSpace::default(), true).unwrap();
        let e = g.edges("R1").iter().find(|e| e.start.name == "eth0").unwrap();
        let fa = s.forwards_across("R1", e).unwrap();
        // no inbound acl on R2: only the data forwarding variable remains
        assert!(fa.simplify().same(s.decisions().data_forwarding(e).unwrap()));
        assert_eq!(s.outbound_acls().len(), 1);
        assert!(s.inbound_acls().is_empty());
    }

    #[test]
    fn default_values() {
        let g = two_routers();
        let mut ctx = Context::new();
        let s = EncoderSlice::new(&mut ctx, 0, "", g, HeaderSpace::default(), true).unwrap();
        let best = s.best_vars("R1", Protocol::Bgp).unwrap();
        assert_eq!(default_admin_distance(Protocol::Ospf, best).as_int(), Some(110));
        assert_eq!(default_admin_distance(Protocol::Connected, best).as_int(), Some(0));
        assert_eq!(default_med(Protocol::Bgp), 100);
        assert_eq!(default_med(Protocol::Ospf), 0);
        let overall = &s.decisions().best_neighbor["R1"];
        // the overall best route of a router with several protocols tracks its history
        let h = equal_histories(overall, best).unwrap();
        assert!(!h.is_true());
        assert!(equal_histories(best, overall).unwrap().is_true());
    }

    #[test]
    fn other_slices_skip_bgp() {
        let g = two_routers();
        let mut ctx = Context::new();
        let hs = HeaderSpace { dst_ips: vec!["10.0.0.1/32".parse().unwrap()], ..Default::default() };
        let s = EncoderSlice::new(&mut ctx, 0, slice_name("R2"), g, hs, true).unwrap();
        assert!(!s.is_main());
        assert!(s.logical_graph().environment_vars().is_empty());
        assert!(s.optimizations().router_protocols("R1").is_empty());
        assert_eq!(s.optimizations().router_protocols("R2"), &[Protocol::Connected]);
        assert!(find(&ctx, "0_SLICE-R2_dst-ip").is_some());
    }
}
