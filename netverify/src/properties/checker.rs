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

//! Property checks on top of the network encoding.

use super::{
    find_matching_edges, find_matching_links, matching_nodes, source_nodes, DiffType,
    EnvironmentType, HeaderLocationQuestion, HeaderQuestion, LocalConsistencyQuestion,
    PatternMatch, PropertyAdder, QueryError,
};
use crate::counterexample::{build_route, CounterExample};
use crate::encoder::acl::first_bits_equal;
use crate::encoder::{EdgeType, Encoder, EncoderSlice, EncodingError, LogicalEdge, SymbolicRoute};
use crate::error::Error;
use crate::network::{Configuration, Graph, GraphEdge, HeaderSpace, Prefix, Protocol};
use crate::result::{
    SmtDeterminismAnswer, SmtManyAnswer, SmtOneAnswer, SmtReachabilityAnswer, StatsSummary,
    VerificationResult,
};
use crate::smt::{Context, Expr, Model, Solver};

use itertools::Itertools;
use log::*;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// Maximal AS path length of an environment route in a `SANE` environment
const SANE_METRIC_BOUND: i64 = 50;

/// Outcome of a check built by [`PropertyChecker::check_property`]. The second encoding only
/// exists for differential questions.
struct PropertyRun {
    result: VerificationResult,
    model: Option<Model>,
    sources: Vec<String>,
    enc: Encoder,
    prop: BTreeMap<String, Expr>,
    base: Option<(Encoder, BTreeMap<String, Expr>)>,
}

/// Runs the property checks of a network on a [`Solver`].
///
/// Every check builds a fresh [`Context`], such that the checker can be reused for several
/// questions.
#[derive(Debug)]
pub struct PropertyChecker<S> {
    graph: Rc<Graph>,
    solver: S,
    name: String,
}

impl<S: Solver> PropertyChecker<S> {
    /// Create a checker for the network
    pub fn new(graph: Graph, solver: S) -> Self {
        Self { graph: Rc::new(graph), solver, name: "network".to_string() }
    }

    /// Name of the network, used in the environments of the reconstructed flows
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The network
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Compute the forwarding of one packet in one environment, without any failure.
    pub fn check_forwarding(&mut self, q: &HeaderQuestion) -> Result<SmtOneAnswer, Error> {
        let mut q = q.clone();
        q.failures = 0;
        let mut ctx = Context::new();
        let enc = Encoder::new(&mut ctx, self.graph.clone(), q.clone())?;
        enc.compute_encoding(&mut ctx)?;
        add_environment_constraints(&mut ctx, &enc, q.environment_type);
        let (result, _) = enc.verify(&mut ctx, &mut self.solver)?;
        Ok(SmtOneAnswer { result })
    }

    /// Every source router reaches one of the destination interfaces. For differential
    /// questions, the reachability of the network with failures is compared to the one without.
    pub fn check_reachability(
        &mut self,
        q: &HeaderLocationQuestion,
    ) -> Result<SmtReachabilityAnswer, Error> {
        let run = self.check_property(q, |ctx, enc, _, dst| {
            Ok(PropertyAdder::new(enc.main_slice()).instrument_reachability(ctx, dst)?)
        })?;
        let model = match &run.model {
            Some(m) if !run.result.verified => m,
            _ => return Ok(SmtReachabilityAnswer { result: run.result, flow_history: None }),
        };

        let ce = CounterExample::new(model);
        let flow_history = match &run.base {
            Some((base, base_prop)) => ce.build_flow_history_diff(
                &self.name,
                &run.sources,
                &run.enc,
                base,
                &run.prop,
                base_prop,
            )?,
            None => {
                let mut reach = BTreeMap::new();
                for (router, p) in run.prop.iter() {
                    reach.insert(router.clone(), ce.is_true(p)? ^ q.negate);
                }
                ce.build_flow_history(&self.name, &run.sources, &run.enc, &reach)?
            }
        };
        Ok(SmtReachabilityAnswer { result: run.result, flow_history: Some(flow_history) })
    }

    /// The path from every source router to the destination is at most `q.bound` hops long.
    pub fn check_bounded_length(&mut self, q: &HeaderLocationQuestion) -> Result<SmtOneAnswer, Error> {
        let bound = Expr::int(q.bound);
        let run = self.check_property(q, |ctx, enc, _, dst| {
            let lens = PropertyAdder::new(enc.main_slice()).instrument_path_length(ctx, dst)?;
            Ok(lens.into_iter().map(|(r, len)| (r, len.le(&bound))).collect())
        })?;
        Ok(SmtOneAnswer { result: run.result })
    }

    /// All source routers have the same path length to the destination.
    pub fn check_equal_length(&mut self, q: &HeaderLocationQuestion) -> Result<SmtOneAnswer, Error> {
        let run = self.check_property(q, |ctx, enc, sources, dst| {
            let lens = PropertyAdder::new(enc.main_slice()).instrument_path_length(ctx, dst)?;
            let source_lens: Vec<Expr> =
                sources.iter().filter_map(|s| lens.get(s)).cloned().collect();
            let all_equal = PropertyAdder::all_equal(&source_lens);
            Ok(lens
                .keys()
                .map(|r| {
                    let p = if sources.contains(r) { all_equal.clone() } else { Expr::tru() };
                    (r.clone(), p)
                })
                .collect())
        })?;
        Ok(SmtOneAnswer { result: run.result })
    }

    /// Traffic towards each destination interface is balanced: source routers that are
    /// neighbors of the same source router carry loads differing by at most `q.bound`. Every
    /// destination interface is checked on its own, and the results are keyed by
    /// `router,interface`.
    pub fn check_load_balancing(&mut self, q: &HeaderLocationQuestion) -> Result<SmtManyAnswer, Error> {
        let (dest_ports, sources) = self.endpoints(q)?;
        let q = self.with_inferred_header_space(q, &dest_ports);
        let fail_links = fail_link_set(&self.graph, &q)?;
        let fail_nodes = fail_node_set(&self.graph, &q)?;
        let bound = Expr::int(q.bound.max(0));

        let mut results = BTreeMap::new();
        for port in dest_ports.iter() {
            let mut ctx = Context::new();
            let enc = Encoder::new(&mut ctx, self.graph.clone(), q.header.clone())?;
            enc.compute_encoding(&mut ctx)?;
            add_environment_constraints(&mut ctx, &enc, q.header.environment_type);

            let mut target = BTreeSet::new();
            target.insert(port.clone());
            let loads = PropertyAdder::new(enc.main_slice()).instrument_load(&mut ctx, &target)?;

            let mut balanced = Vec::new();
            for source in sources.iter() {
                let peers: Vec<&Expr> = self
                    .graph
                    .neighbors(source)
                    .filter(|n| sources.contains(n))
                    .filter_map(|n| loads.get(n))
                    .collect();
                for (a, b) in peers.iter().tuple_combinations() {
                    balanced.push(a.sub(b).le(&bound).and(&b.sub(a).le(&bound)));
                }
            }
            ctx.add(Expr::and_all(balanced).not());
            add_link_failure_constraints(&mut ctx, &enc, &dest_ports, &fail_links)?;
            add_node_failure_constraints(&mut ctx, &enc, &fail_nodes);

            let (result, _) = enc.verify(&mut ctx, &mut self.solver)?;
            results.insert(format!("{},{}", port.router, port.start.name), result);
        }
        Ok(many_answer(results, q.header.benchmark))
    }

    /// Forwarding is uniquely determined by the packet, the failures and the environment: two
    /// copies of the network with the same inputs forward the packet over the same edges.
    pub fn check_determinism(&mut self, q: &HeaderQuestion) -> Result<SmtDeterminismAnswer, Error> {
        let mut ctx = Context::new();
        let enc1 = Encoder::new(&mut ctx, self.graph.clone(), q.clone())?;
        let enc2 = Encoder::new(&mut ctx, self.graph.clone(), q.clone())?;
        enc1.compute_encoding(&mut ctx)?;
        enc2.compute_encoding(&mut ctx)?;
        add_environment_constraints(&mut ctx, &enc1, q.environment_type);

        let related = Expr::and_all(vec![
            enc1.failures().mk_eq(enc2.failures()),
            relate_environments(&enc1, &enc2)?,
            enc1.main_slice().packet().mk_eq(enc2.main_slice().packet()),
        ]);
        let edges = self.forwarding_pairs(&enc1, &enc2);
        let required = Expr::and_all(edges.iter().map(|(_, d1, d2)| d1.equals(d2)));
        ctx.add(related);
        ctx.add(required.not());

        let (result, model) = enc1.verify(&mut ctx, &mut self.solver)?;
        let model = match model {
            Some(m) if !result.verified => m,
            _ => {
                return Ok(SmtDeterminismAnswer {
                    result,
                    flow: None,
                    forwarding_case1: BTreeSet::new(),
                    forwarding_case2: BTreeSet::new(),
                })
            }
        };

        let ce = CounterExample::new(&model);
        let flow = ce.build_flow(enc1.main_slice().packet(), "(none)")?;
        let mut case1 = BTreeSet::new();
        let mut case2 = BTreeSet::new();
        for (ge, d1, d2) in edges.iter() {
            let (b1, b2) = (ce.is_true(d1)?, ce.is_true(d2)?);
            if b1 == b2 {
                continue;
            }
            let (case, slice) = if b1 { (&mut case1, enc1.main_slice()) } else { (&mut case2, enc2.main_slice()) };
            let best = slice
                .decisions()
                .best_neighbor
                .get(&ge.router)
                .ok_or_else(|| EncodingError::MissingVariable(format!("best route of {}", ge.router)))?;
            let pfx = ce.build_prefix(best, &flow)?;
            let proto = ce.build_protocol(best, slice, &ge.router)?;
            case.insert(format!("{} -- {}", ge, build_route(&pfx, proto, ge)));
        }

        // report the case with the smaller first edge first
        let (forwarding_case1, forwarding_case2) =
            if case2.iter().next() < case1.iter().next() { (case2, case1) } else { (case1, case2) };
        Ok(SmtDeterminismAnswer { result, flow: Some(flow), forwarding_case1, forwarding_case2 })
    }

    /// No router inside of the network receives traffic and then drops it. Routers with an edge
    /// leaving the network are not checked.
    pub fn check_black_hole(&mut self, q: &HeaderQuestion) -> Result<SmtOneAnswer, Error> {
        let mut ctx = Context::new();
        let enc = Encoder::new(&mut ctx, self.graph.clone(), q.clone())?;
        enc.compute_encoding(&mut ctx)?;
        let decisions = enc.main_slice().decisions();
        let no_edges = BTreeMap::new();

        let mut some_black_hole = Vec::new();
        for (router, edges) in self.graph.edge_map() {
            if edges.iter().any(|ge| ge.end.is_none()) {
                continue;
            }
            let fwd = decisions.data_forwarding.get(router).unwrap_or(&no_edges);
            let does_not_fwd = Expr::and_all(fwd.values().map(|d| d.not()));
            let is_fwd_to = Expr::or_all(self.graph.neighbors(router).flat_map(|n| {
                decisions
                    .data_forwarding
                    .get(n)
                    .unwrap_or(&no_edges)
                    .iter()
                    .filter(|(ge, _)| ge.peer.as_deref() == Some(router.as_str()))
                    .map(|(_, d)| d.clone())
            }));
            some_black_hole.push(is_fwd_to.and(&does_not_fwd));
        }
        ctx.add(Expr::or_all(some_black_hole));

        let (result, _) = enc.verify(&mut ctx, &mut self.solver)?;
        Ok(SmtOneAnswer { result })
    }

    /// Traffic is treated the same on all paths: if a router reaches the destination, then
    /// every edge its best route points to forwards the packet, towards a router that reaches
    /// the destination as well.
    pub fn check_multipath_consistency(
        &mut self,
        q: &HeaderLocationQuestion,
    ) -> Result<SmtOneAnswer, Error> {
        if q.negate {
            return Err(QueryError::NegatedMultipath.into());
        }
        let dest_ports = find_matching_edges(&self.graph, q)?;
        if dest_ports.is_empty() {
            return Err(QueryError::NoDestinations.into());
        }
        let q = self.with_inferred_header_space(q, &dest_ports);

        let mut ctx = Context::new();
        let enc = Encoder::new(&mut ctx, self.graph.clone(), q.header.clone())?;
        enc.compute_encoding(&mut ctx)?;
        let slice = enc.main_slice();
        let reach = PropertyAdder::new(slice).instrument_reachability(&mut ctx, &dest_ports)?;

        let mut acc = Vec::new();
        for (router, edges) in self.graph.edge_map() {
            let reaches = match reach.get(router) {
                Some(r) => r,
                None => continue,
            };
            let mut all = Vec::new();
            for ge in edges.iter() {
                let (fwd, ctrl) =
                    match (slice.forwards_across(router, ge), slice.decisions().control_forwarding(ge)) {
                        (Some(f), Some(c)) => (f, c),
                        _ => continue,
                    };
                let peer_reach = match ge.peer.as_ref().and_then(|p| reach.get(p)) {
                    Some(p) => p.clone(),
                    None => Expr::tru(),
                };
                all.push(ctrl.implies(&fwd.and(&peer_reach)));
            }
            acc.push(reaches.implies(&Expr::and_all(all)).not());
        }
        ctx.add(Expr::or_all(acc));

        let (result, _) = enc.verify(&mut ctx, &mut self.solver)?;
        Ok(SmtOneAnswer { result })
    }

    /// No packet towards a destination of a static route loops. Only routers with static routes
    /// are considered as part of a loop, since the dynamic protocols prevent loops on their own.
    pub fn check_routing_loop(&mut self, q: &HeaderQuestion) -> Result<SmtOneAnswer, Error> {
        let mut q = q.clone();
        let mut routers = Vec::new();
        let mut prefixes: BTreeSet<Prefix> = BTreeSet::new();
        for (router, conf) in self.graph.configurations() {
            if !conf.static_routes.is_empty() {
                routers.push(router.clone());
            }
            prefixes.extend(conf.static_routes.iter().map(|sr| sr.network));
        }
        q.header_space.dst_ips = prefixes.into_iter().collect();
        debug!("Check routing loops through {:?}", routers);

        let mut ctx = Context::new();
        let enc = Encoder::new(&mut ctx, self.graph.clone(), q)?;
        enc.compute_encoding(&mut ctx)?;
        let adder = PropertyAdder::new(enc.main_slice());
        let mut some_loop = Vec::new();
        for router in routers.iter() {
            some_loop.push(adder.instrument_loop(&mut ctx, router)?);
        }
        ctx.add(Expr::or_all(some_loop));

        let (result, _) = enc.verify(&mut ctx, &mut self.solver)?;
        Ok(SmtOneAnswer { result })
    }

    /// Compare each pair of consecutive routers (in name order) matching the router pattern.
    /// Two routers are equivalent if, given the same environment on each interface, they forward
    /// the same packets out of the same interfaces and export the same routes. In strict mode,
    /// at most one environment route is permitted and the best routes must be equal. Results are
    /// keyed by `r1<-->r2`.
    pub fn check_local_equivalence(
        &mut self,
        q: &LocalConsistencyQuestion,
    ) -> Result<SmtManyAnswer, Error> {
        let pattern = PatternMatch::new(&q.router_regex, "")?;
        let routers = matching_nodes(&self.graph, &pattern);
        let mut hq = q.header.clone();
        hq.failures = 0;
        hq.environment_type = EnvironmentType::Any;

        let mut results = BTreeMap::new();
        for (r1, r2) in routers.iter().tuple_windows() {
            let result = self.check_pair_equivalence(r1, r2, &hq, q.strict)?;
            results.insert(format!("{}<-->{}", r1, r2), result);
        }
        Ok(many_answer(results, hq.benchmark))
    }

    fn check_pair_equivalence(
        &mut self,
        r1: &str,
        r2: &str,
        q: &HeaderQuestion,
        strict: bool,
    ) -> Result<VerificationResult, Error> {
        let conf1 = self.graph.config(r1)?.clone();
        let conf2 = self.graph.config(r2)?.clone();
        let mut ctx = Context::new();
        let e1 = Encoder::new(&mut ctx, Rc::new(Graph::new(vec![conf1.clone()], None)?), q.clone())?;
        e1.compute_encoding(&mut ctx)?;
        let e2 = Encoder::new(&mut ctx, Rc::new(Graph::new(vec![conf2.clone()], None)?), q.clone())?;
        e2.compute_encoding(&mut ctx)?;
        let slice1 = e1.main_slice();
        let slice2 = e2.main_slice();

        let edges1 = interface_edges(e1.graph(), r1);
        let edges2 = interface_edges(e2.graph(), r2);
        if edges1.keys().ne(edges2.keys()) {
            return Err(QueryError::MismatchedInterfaces(r1.to_string(), r2.to_string()).into());
        }

        let mut lge_map2: BTreeMap<(Protocol, String, EdgeType), &LogicalEdge> = BTreeMap::new();
        for proto in slice2.optimizations().router_protocols(r2) {
            for lge in slice2.logical_graph().all_edges(r2, *proto) {
                lge_map2.insert((*proto, lge.edge.start.name.clone(), lge.edge_type), lge);
            }
        }

        let env1 = slice1.logical_graph().environment_vars();
        let env2 = slice2.logical_graph().environment_vars();
        let mut equal_envs = Vec::new();
        let mut equal_outputs = Vec::new();
        let mut warned: BTreeSet<String> = BTreeSet::new();
        let mut env_records: Vec<&SymbolicRoute> = Vec::new();

        for proto in slice1.optimizations().router_protocols(r1) {
            for lge1 in slice1.logical_graph().all_edges(r1, *proto) {
                let iface = lge1.edge.start.name.as_str();
                let lge2 = lge_map2.get(&(*proto, iface.to_string(), lge1.edge_type)).ok_or_else(|| {
                    QueryError::MismatchedProtocols(r1.to_string(), r2.to_string(), iface.to_string())
                })?;

                if lge1.edge_type == EdgeType::Export {
                    equal_outputs.push(slice1.equal(
                        &conf1,
                        *proto,
                        &lge1.route,
                        Some(&lge2.route),
                        Some(lge1),
                        false,
                    )?);
                    continue;
                }

                match (env1.get(&lge1.id()), env2.get(&lge2.id())) {
                    (Some(vars1), Some(vars2)) => {
                        let mut parts = vec![vars1.permitted.equals(&vars2.permitted)];
                        for (cvar, c1) in vars1.communities.iter() {
                            match vars2.communities.get(cvar) {
                                Some(c2) => parts.push(c1.equals(c2)),
                                None => {
                                    warn_one_sided(&mut warned, cvar.value(), r1, r2);
                                    parts.push(c1.not());
                                }
                            }
                        }
                        for (cvar, c2) in vars2.communities.iter() {
                            if !vars1.communities.contains_key(cvar) {
                                warn_one_sided(&mut warned, cvar.value(), r2, r1);
                                parts.push(c2.not());
                            }
                        }
                        parts.push(slice1.equal(&conf1, *proto, vars1, Some(vars2), Some(lge1), true)?);
                        equal_envs.push(Expr::and_all(parts));
                        env_records.push(vars1);
                    }
                    (None, None) => {}
                    _ => return Err(QueryError::OneSidedEnvironment(format!("{} {}", r1, lge1)).into()),
                }
            }
        }

        if strict {
            for (i, a) in env_records.iter().enumerate() {
                for (j, b) in env_records.iter().enumerate() {
                    if i != j {
                        ctx.add(a.permitted.implies(&b.permitted.not()));
                    }
                }
            }
        }

        let assumptions = Expr::and_all(vec![
            Expr::and_all(equal_envs),
            slice1.packet().mk_eq(slice2.packet()),
            ignored_destinations(slice1, r1, &conf1),
            ignored_destinations(slice2, r2, &conf2),
        ]);

        let required = if strict {
            let missing = |r: &str| EncodingError::MissingVariable(format!("best route of {}", r));
            let best1 = slice1.decisions().best_neighbor.get(r1).ok_or_else(|| missing(r1))?;
            let best2 = slice2.decisions().best_neighbor.get(r2).ok_or_else(|| missing(r2))?;
            equal(slice2, &conf2, best1, best2)?
        } else {
            let mut same_forwarding = Vec::new();
            for (iface, ge1) in edges1.iter() {
                let d1 = slice1.decisions().data_forwarding(ge1);
                let d2 = edges2.get(iface).and_then(|ge2| slice2.decisions().data_forwarding(ge2));
                if let (Some(d1), Some(d2)) = (d1, d2) {
                    same_forwarding.push(d1.equals(d2));
                }
            }
            Expr::and_all(same_forwarding).and(&Expr::and_all(equal_outputs))
        };

        ctx.add(assumptions);
        ctx.add(required.not());
        let (result, _) = e2.verify(&mut ctx, &mut self.solver)?;
        Ok(result)
    }

    /// Shared driver of the checks between sources and destination interfaces. `instrument`
    /// returns, per router, the property that must hold for the router.
    fn check_property<F>(&mut self, q: &HeaderLocationQuestion, instrument: F) -> Result<PropertyRun, Error>
    where
        F: Fn(&mut Context, &Encoder, &[String], &BTreeSet<GraphEdge>) -> Result<BTreeMap<String, Expr>, Error>,
    {
        let (dest_ports, sources) = self.endpoints(q)?;
        let q = self.with_inferred_header_space(q, &dest_ports);
        let fail_links = fail_link_set(&self.graph, &q)?;
        let fail_nodes = fail_node_set(&self.graph, &q)?;

        let mut ctx = Context::new();
        let enc = Encoder::new(&mut ctx, self.graph.clone(), q.header.clone())?;
        enc.compute_encoding(&mut ctx)?;
        if !q.header.diff {
            add_environment_constraints(&mut ctx, &enc, q.header.environment_type);
        }
        let prop = instrument(&mut ctx, &enc, &sources, &dest_ports)?;

        let base = if q.header.diff {
            let mut base_q = q.header.clone();
            base_q.failures = 0;
            let base = Encoder::new(&mut ctx, self.graph.clone(), base_q)?;
            base.compute_encoding(&mut ctx)?;
            add_environment_constraints(&mut ctx, &base, q.header.environment_type);
            let base_prop = instrument(&mut ctx, &base, &sources, &dest_ports)?;

            let mut required = Vec::new();
            for source in sources.iter() {
                let (delta, base) = match (prop.get(source), base_prop.get(source)) {
                    (Some(d), Some(b)) => (d, b),
                    _ => continue,
                };
                required.push(match q.header.diff_type {
                    DiffType::Increased => base.implies(delta),
                    DiffType::Reduced => delta.implies(base),
                    DiffType::Any => delta.equals(base),
                });
            }
            ctx.add(relate_environments(&enc, &base)?);
            ctx.add(enc.main_slice().packet().mk_eq(base.main_slice().packet()));
            ctx.add(Expr::and_all(required).not());
            Some((base, base_prop))
        } else {
            let all = sources
                .iter()
                .filter_map(|s| prop.get(s))
                .map(|p| if q.negate { p.not() } else { p.clone() });
            ctx.add(Expr::and_all(all).not());
            None
        };

        add_link_failure_constraints(&mut ctx, &enc, &dest_ports, &fail_links)?;
        add_node_failure_constraints(&mut ctx, &enc, &fail_nodes);

        let (result, model) = enc.verify(&mut ctx, &mut self.solver)?;
        info!("{} sources, verified: {}", sources.len(), result.verified);
        Ok(PropertyRun { result, model, sources, enc, prop, base })
    }

    /// Destination interfaces and source routers of a question. Both must be non-empty.
    fn endpoints(&self, q: &HeaderLocationQuestion) -> Result<(BTreeSet<GraphEdge>, Vec<String>), Error> {
        let dest_ports = find_matching_edges(&self.graph, q)?;
        let sources = source_nodes(&self.graph, q)?;
        if dest_ports.is_empty() {
            return Err(QueryError::NoDestinations.into());
        }
        if sources.is_empty() {
            return Err(QueryError::NoSources.into());
        }
        Ok((dest_ports, sources))
    }

    fn with_inferred_header_space(
        &self,
        q: &HeaderLocationQuestion,
        dest_ports: &BTreeSet<GraphEdge>,
    ) -> HeaderLocationQuestion {
        let mut q = q.clone();
        infer_destination_header_space(&self.graph, dest_ports, &mut q.header.header_space);
        q
    }

    /// Data forwarding variables of every real edge in both copies
    fn forwarding_pairs(&self, enc1: &Encoder, enc2: &Encoder) -> Vec<(GraphEdge, Expr, Expr)> {
        let d1 = enc1.main_slice().decisions();
        let d2 = enc2.main_slice().decisions();
        self.graph
            .all_real_edges()
            .iter()
            .filter_map(|ge| match (d1.data_forwarding(ge), d2.data_forwarding(ge)) {
                (Some(a), Some(b)) => Some((ge.clone(), a.clone(), b.clone())),
                _ => None,
            })
            .collect()
    }
}

/// Constrain the destination of the packet to the destination interfaces, unless the question
/// already does. If a destination leaves the network, the destination stays unconstrained.
pub fn infer_destination_header_space(g: &Graph, dest_ports: &BTreeSet<GraphEdge>, hs: &mut HeaderSpace) {
    if !hs.dst_ips.is_empty() {
        return;
    }
    for ge in dest_ports.iter() {
        if g.is_external(ge) {
            hs.dst_ips.clear();
            hs.not_dst_ips.clear();
            return;
        }
        let addr = match ge.start.address {
            Some(a) => a,
            None => continue,
        };
        if ge.peer.is_none() {
            hs.dst_ips.push(Prefix::new(addr.ip, addr.len));
        } else if g.is_host(&ge.router) {
            hs.dst_ips.push(Prefix::new(addr.ip, addr.len));
            if let Some(end) = ge.end.as_ref().and_then(|i| i.address) {
                hs.not_dst_ips.push(Prefix::new(end.ip, 32));
            }
        } else {
            hs.dst_ips.push(Prefix::new(addr.ip, 32));
        }
    }
}

/// Edges that may fail: links between the two failure patterns, in either direction, except the
/// links between the two excluding patterns.
fn fail_link_set(g: &Graph, q: &HeaderLocationQuestion) -> Result<BTreeSet<GraphEdge>, QueryError> {
    let n1 = PatternMatch::new(&q.fail_node1_regex, "")?;
    let n2 = PatternMatch::new(&q.fail_node2_regex, "")?;
    let not1 = PatternMatch::new(&q.not_fail_node1_regex, "")?;
    let not2 = PatternMatch::new(&q.not_fail_node2_regex, "")?;
    let mut choices = find_matching_links(g, &n1, &n2);
    choices.extend(find_matching_links(g, &n2, &n1));
    for ge in find_matching_links(g, &not1, &not2).iter().chain(find_matching_links(g, &not2, &not1).iter()) {
        choices.remove(ge);
    }
    Ok(choices)
}

fn fail_node_set(g: &Graph, q: &HeaderLocationQuestion) -> Result<BTreeSet<String>, QueryError> {
    let p = PatternMatch::new(&q.fail_node_regex, &q.not_fail_node_regex)?;
    Ok(matching_nodes(g, &p).into_iter().collect())
}

/// Links outside of `fail_set` never fail. Destination interfaces do not fail for packets
/// towards their own subnet.
fn add_link_failure_constraints(
    ctx: &mut Context,
    enc: &Encoder,
    dest_ports: &BTreeSet<GraphEdge>,
    fail_set: &BTreeSet<GraphEdge>,
) -> Result<(), EncodingError> {
    let zero = Expr::int(0);
    let dst_ip = &enc.main_slice().packet().dst_ip;
    for ge in enc.graph().edge_map().values().flatten() {
        let f = enc.failures().failed_variable(ge)?;
        if !fail_set.contains(ge) {
            ctx.add(f.equals(&zero));
        } else if dest_ports.contains(ge) {
            if let Some(addr) = ge.start.address {
                let relevant = first_bits_equal(dst_ip, &Prefix::new(addr.ip, addr.len));
                ctx.add(relevant.implies(&f.equals(&zero)));
            }
        }
    }
    Ok(())
}

fn add_node_failure_constraints(ctx: &mut Context, enc: &Encoder, fail_nodes: &BTreeSet<String>) {
    for router in enc.graph().routers().filter(|r| !fail_nodes.contains(*r)) {
        ctx.add(enc.failures().failed_node(router).equals(&Expr::int(0)));
    }
}

/// Restrict the routes received from outside of the network
fn add_environment_constraints(ctx: &mut Context, enc: &Encoder, t: EnvironmentType) {
    let env = enc.main_slice().logical_graph().environment_vars();
    match t {
        EnvironmentType::Any => {}
        EnvironmentType::None => env.values().for_each(|r| ctx.add(r.permitted.not())),
        EnvironmentType::Sane => {
            env.values().for_each(|r| ctx.add(r.metric.le(&Expr::int(SANE_METRIC_BOUND))))
        }
    }
}

/// Both routes are equal in every attribute, including whether they are permitted.
fn equal(
    slice: &EncoderSlice,
    conf: &Configuration,
    r1: &SymbolicRoute,
    r2: &SymbolicRoute,
) -> Result<Expr, EncodingError> {
    let eq = slice.equal(conf, Protocol::Connected, r1, Some(r2), None, true)?;
    Ok(eq.and(&r1.permitted.equals(&r2.permitted)))
}

/// Every environment route of `enc1` equals the one on the same edge of `enc2`.
fn relate_environments(enc1: &Encoder, enc2: &Encoder) -> Result<Expr, Error> {
    let related_env: BTreeMap<(&GraphEdge, EdgeType), &SymbolicRoute> = enc2
        .main_slice()
        .logical_graph()
        .environment_vars()
        .iter()
        .map(|(id, r)| ((&id.edge, id.edge_type), r))
        .collect();
    let slice = enc1.main_slice();
    let mut related = Vec::new();
    for (id, r1) in slice.logical_graph().environment_vars() {
        let conf = enc1.graph().config(&id.edge.router)?;
        let r2 = related_env.get(&(&id.edge, id.edge_type)).ok_or_else(|| {
            EncodingError::MissingVariable(format!("environment of {} in the second copy", id.edge))
        })?;
        related.push(equal(slice, conf, r1, r2)?);
    }
    Ok(Expr::and_all(related))
}

/// Physical edges of a router, by interface name
fn interface_edges<'a>(g: &'a Graph, router: &str) -> BTreeMap<String, &'a GraphEdge> {
    g.edges(router)
        .iter()
        .filter(|ge| !ge.is_abstract && !ge.is_null_edge)
        .map(|ge| (ge.start.name.clone(), ge))
        .collect()
}

/// Packets towards networks originated by the router itself differ trivially between two
/// routers, and are excluded.
fn ignored_destinations(slice: &EncoderSlice, router: &str, conf: &Configuration) -> Expr {
    let dst_ip = &slice.packet().dst_ip;
    Expr::and_all(slice.optimizations().router_protocols(router).iter().map(|proto| {
        Expr::or_all(Graph::originated_networks(conf, *proto).iter().map(|p| first_bits_equal(dst_ip, p)))
            .not()
    }))
}

fn warn_one_sided(warned: &mut BTreeSet<String>, community: &str, has: &str, has_not: &str) {
    if warned.insert(community.to_string()) {
        warn!("Community {} found for router {} but not {}", community, has, has_not);
    }
}

fn many_answer(results: BTreeMap<String, VerificationResult>, benchmark: bool) -> SmtManyAnswer {
    let stats = if benchmark {
        Some(StatsSummary::from_stats(results.values().filter_map(|r| r.stats.as_ref())))
    } else {
        None
    };
    SmtManyAnswer { results, stats }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::{Configuration, Interface, StaticRoute};
    use crate::smt::{FixedSolver, SatAnswer};

    fn line() -> Graph {
        let mut r1 = Configuration::new("R1");
        r1.add_interface(Interface::new("eth0", "10.0.1.1/30".parse().unwrap()))
            .add_interface(Interface::new("lan", "192.168.1.1/24".parse().unwrap()));
        r1.add_static_route(StaticRoute {
            network: "10.0.0.0/24".parse().unwrap(),
            next_hop_ip: Some("10.0.1.2".parse().unwrap()),
            next_hop_interface: None,
            admin_cost: 1,
        });
        let mut r2 = Configuration::new("R2");
        r2.add_interface(Interface::new("eth0", "10.0.1.2/30".parse().unwrap()))
            .add_interface(Interface::new("eth1", "10.0.0.1/24".parse().unwrap()));
        Graph::new(vec![r1, r2], None).unwrap()
    }

    fn unsat() -> PropertyChecker<FixedSolver> {
        PropertyChecker::new(line(), FixedSolver::new(SatAnswer::Unsat))
    }

    #[test]
    fn empty_endpoints_are_rejected() {
        let mut checker = unsat();
        let q = HeaderLocationQuestion::new("R1", "R3", ".*");
        assert!(matches!(
            checker.check_reachability(&q),
            Err(Error::QueryError(QueryError::NoDestinations))
        ));
        let q = HeaderLocationQuestion::new("X.*", "R2", "eth1");
        assert!(matches!(
            checker.check_reachability(&q),
            Err(Error::QueryError(QueryError::NoSources))
        ));
    }

    #[test]
    fn destination_header_space() {
        let g = line();
        let edges: BTreeSet<GraphEdge> =
            g.edges("R2").iter().filter(|ge| ge.start.name == "eth1").cloned().collect();
        let mut hs = HeaderSpace::default();
        infer_destination_header_space(&g, &edges, &mut hs);
        assert_eq!(hs.dst_ips, vec!["10.0.0.0/24".parse::<Prefix>().unwrap()]);

        let edges: BTreeSet<GraphEdge> =
            g.edges("R2").iter().filter(|ge| ge.start.name == "eth0").cloned().collect();
        let mut hs = HeaderSpace::default();
        infer_destination_header_space(&g, &edges, &mut hs);
        assert_eq!(hs.dst_ips, vec!["10.0.1.2/32".parse::<Prefix>().unwrap()]);

        let fixed: Prefix = "1.2.3.0/24".parse().unwrap();
        let mut hs = HeaderSpace { dst_ips: vec![fixed], ..Default::default() };
        infer_destination_header_space(&g, &edges, &mut hs);
        assert_eq!(hs.dst_ips, vec![fixed]);
    }

    #[test]
    fn failure_choices() {
        let g = line();
        let mut q = HeaderLocationQuestion::new("R1", "R2", "eth1");
        assert_eq!(fail_link_set(&g, &q).unwrap().len(), g.edge_map().values().flatten().count());
        q.not_fail_node1_regex = "R1".to_string();
        q.not_fail_node2_regex = "R2".to_string();
        let links = fail_link_set(&g, &q).unwrap();
        assert!(links.iter().all(|ge| ge.peer.is_none()));
        q.not_fail_node_regex = "R2".to_string();
        assert_eq!(fail_node_set(&g, &q).unwrap().into_iter().collect::<Vec<_>>(), vec!["R1"]);
    }

    #[test]
    fn unsat_means_verified() {
        let mut checker = unsat();
        let q = HeaderLocationQuestion::new("R1", "R2", "eth1");
        let answer = checker.check_reachability(&q).unwrap();
        assert!(answer.result.verified);
        assert!(answer.flow_history.is_none());
        assert!(checker.check_bounded_length(&q.clone().bound(3)).unwrap().result.verified);
        assert!(checker.check_routing_loop(&HeaderQuestion::default()).unwrap().result.verified);
        assert!(checker.check_black_hole(&HeaderQuestion::default()).unwrap().result.verified);
        let det = checker.check_determinism(&HeaderQuestion::default()).unwrap();
        assert!(det.result.verified);
        assert!(det.flow.is_none());
    }

    #[test]
    fn load_balancing_per_destination() {
        let mut checker = unsat();
        let q = HeaderLocationQuestion::new("R1", "R2", "eth.*");
        let answer = checker.check_load_balancing(&q).unwrap();
        let keys: Vec<&String> = answer.results.keys().collect();
        assert_eq!(keys, vec!["R2,eth0", "R2,eth1"]);
        assert!(answer.verified());
        assert!(answer.stats.is_none());
    }

    #[test]
    fn multipath_cannot_be_negated() {
        let mut checker = unsat();
        let mut q = HeaderLocationQuestion::new("R1", "R2", "eth1");
        q.negate = true;
        assert!(matches!(
            checker.check_multipath_consistency(&q),
            Err(Error::QueryError(QueryError::NegatedMultipath))
        ));
        q.negate = false;
        assert!(checker.check_multipath_consistency(&q).unwrap().result.verified);
    }

    #[test]
    fn local_equivalence_needs_equal_interfaces() {
        let mut checker = unsat();
        let q = LocalConsistencyQuestion { router_regex: "R1".to_string(), ..Default::default() };
        assert!(checker.check_local_equivalence(&q).unwrap().results.is_empty());
        let q = LocalConsistencyQuestion { router_regex: "R.*".to_string(), ..Default::default() };
        assert!(matches!(
            checker.check_local_equivalence(&q),
            Err(Error::QueryError(QueryError::MismatchedInterfaces(a, b))) if a == "R1" && b == "R2"
        ));
    }

    #[test]
    fn local_equivalence_of_twins() {
        let mut a = Configuration::new("A");
        a.add_interface(Interface::new("eth0", "10.0.1.1/24".parse().unwrap()));
        let mut b = Configuration::new("B");
        b.add_interface(Interface::new("eth0", "10.0.2.1/24".parse().unwrap()));
        let g = Graph::new(vec![a, b], None).unwrap();
        let mut checker = PropertyChecker::new(g, FixedSolver::new(SatAnswer::Unsat));
        let q = LocalConsistencyQuestion { router_regex: ".*".to_string(), ..Default::default() };
        let answer = checker.check_local_equivalence(&q).unwrap();
        assert!(answer.results["A<-->B"].verified);
    }
}
