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

//! Network-wide encoding: slices, failures and the solver call.

use super::failures::SymbolicFailures;
use super::slice::{slice_name, EncoderSlice, SliceEnv, MAIN_SLICE_NAME};
use super::symbolic_enum::SymbolicEnum;
use super::symbolic_route::SymbolicRoute;
use super::EncodingError;
use crate::network::{Graph, HeaderSpace, Ip, Prefix, SubRange, BGP_PORT, IP_PROTOCOL_TCP};
use crate::properties::{HeaderQuestion, PropertyAdder};
use crate::result::{VerificationResult, VerificationStats};
use crate::smt::{Context, Expr, Model, SatAnswer, SmtError, Solver};

use log::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Display};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Encoding of one copy of the network. See the [module documentation](super).
#[derive(Debug)]
pub struct Encoder {
    id: usize,
    graph: Rc<Graph>,
    question: HeaderQuestion,
    model_igp: bool,
    failures: SymbolicFailures,
    slices: BTreeMap<String, EncoderSlice>,
    main_slice: String,
    slice_reachability: BTreeMap<String, BTreeMap<String, Expr>>,
    created: Instant,
}

impl Encoder {
    /// Allocate the variables of a new copy of the network. The id of the copy is taken from
    /// `ctx`, such that several encoders can share one context.
    pub fn new(
        ctx: &mut Context,
        graph: Rc<Graph>,
        question: HeaderQuestion,
    ) -> Result<Self, EncodingError> {
        let created = Instant::now();
        let id = ctx.generate_id();
        let model_igp = true;
        let failures = SymbolicFailures::new(ctx, &graph, &format!("{}_", id));

        let main_slice =
            if graph.ibgp_neighbors().is_empty() || !model_igp { "" } else { MAIN_SLICE_NAME };
        let mut slices = BTreeMap::new();
        let main = EncoderSlice::new(
            ctx,
            id,
            main_slice,
            graph.clone(),
            question.header_space.clone(),
            model_igp,
        )?;
        slices.insert(main_slice.to_string(), main);

        let mut slice_reachability = BTreeMap::new();
        if model_igp {
            for (router, ip) in ibgp_session_addresses(&graph) {
                let mut hs = HeaderSpace::default();
                hs.dst_ips = vec![Prefix::new(ip, 32)];
                hs.dst_ports = vec![SubRange::singleton(BGP_PORT as u32)];
                hs.ip_protocols = vec![IP_PROTOCOL_TCP];
                let name = slice_name(&router);
                debug!("iBGP slice {} towards {}", name, ip);
                let slice = EncoderSlice::new(ctx, id, name.clone(), graph.clone(), hs, model_igp)?;
                let reach = PropertyAdder::new(&slice).instrument_reachability_router(ctx, &router)?;
                slice_reachability.insert(router, reach);
                slices.insert(name, slice);
            }
        }

        Ok(Self {
            id,
            graph,
            question,
            model_igp,
            failures,
            slices,
            main_slice: main_slice.to_string(),
            slice_reachability,
            created,
        })
    }

    /// Id of this copy, the first part of every variable name
    pub fn id(&self) -> usize {
        self.id
    }

    /// The network graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Shared pointer to the network graph
    pub fn graph_rc(&self) -> Rc<Graph> {
        self.graph.clone()
    }

    /// The question this copy was built for
    pub fn question(&self) -> &HeaderQuestion {
        &self.question
    }

    /// Link and node failure variables
    pub fn failures(&self) -> &SymbolicFailures {
        &self.failures
    }

    /// All slices, by name
    pub fn slices(&self) -> &BTreeMap<String, EncoderSlice> {
        &self.slices
    }

    /// The slice modeling the packets of the question
    pub fn main_slice(&self) -> &EncoderSlice {
        // the main slice is inserted by the constructor and never removed
        &self.slices[&self.main_slice]
    }

    /// Per iBGP speaker, the routers that reach its session address
    pub fn slice_reachability(&self) -> &BTreeMap<String, BTreeMap<String, Expr>> {
        &self.slice_reachability
    }

    /// Add the constraints of every slice, and the failure constraints.
    pub fn compute_encoding(&self, ctx: &mut Context) -> Result<(), EncodingError> {
        self.add_failed_constraints(ctx, self.question.failures);
        if self.question.no_environment {
            for r in self.main_slice().logical_graph().environment_vars().values() {
                ctx.add(r.permitted.not());
            }
        }
        let env = SliceEnv {
            failures: &self.failures,
            slices: &self.slices,
            slice_reachability: &self.slice_reachability,
            question: &self.question,
            model_igp: self.model_igp,
        };
        self.main_slice().compute_encoding(ctx, &env)?;
        for (name, slice) in self.slices.iter().filter(|(n, _)| **n != self.main_slice) {
            trace!("Compute encoding of slice {}", name);
            slice.compute_encoding(ctx, &env)?;
        }
        Ok(())
    }

    /// At most `k` links fail. With node failures enabled, routers count towards `k` as well,
    /// and otherwise no router fails.
    fn add_failed_constraints(&self, ctx: &mut Context, k: usize) {
        let mut vars: Vec<Expr> = self
            .failures
            .internal_links()
            .values()
            .chain(self.failures.edge_links().values())
            .cloned()
            .collect();
        if self.question.fail_node_query {
            vars.extend(self.failures.nodes().values().cloned());
        } else {
            for v in self.failures.nodes().values() {
                ctx.add(v.equals(&Expr::int(0)));
            }
        }
        let zero = Expr::int(0);
        let one = Expr::int(1);
        let mut sum = Expr::int(0);
        for v in vars.iter() {
            ctx.add(v.ge(&zero));
            ctx.add(v.le(&one));
            sum = sum.add(v);
        }
        if k == 0 {
            for v in vars.iter() {
                ctx.add(v.equals(&zero));
            }
        } else {
            ctx.add(sum.le(&Expr::int(k as i64)));
        }
    }

    /// Check the assertions of the context. If they are satisfiable, the result describes the
    /// model, which is returned as well. With `minimize` set, the solver is asked again for models
    /// that use fewer environment routes, until no smaller one exists.
    pub fn verify<S: Solver>(
        &self,
        ctx: &mut Context,
        solver: &mut S,
    ) -> Result<(VerificationResult, Option<Model>), EncodingError> {
        let encoding_time = self.created.elapsed();
        let mut solver_time = Duration::default();
        let mut last: Option<(VerificationResult, Model)> = None;

        loop {
            let start = Instant::now();
            let answer = solver.check(ctx)?;
            solver_time += start.elapsed();
            let model = match answer {
                SatAnswer::Unsat => break,
                SatAnswer::Unknown(reason) => return Err(SmtError::Unknown(reason).into()),
                SatAnswer::Sat(model) => model,
            };
            let result = self.build_counterexample(ctx, &model)?;
            if !self.question.minimize {
                last = Some((result, model));
                break;
            }
            let blocking = self.minimization_clause(&model)?;
            last = Some((result, model));
            ctx.add(blocking);
        }

        let stats = VerificationStats {
            num_nodes: self.graph.routers().count(),
            num_edges: self.graph.routers().map(|r| self.graph.neighbors(r).count()).sum(),
            num_variables: ctx.num_variables(),
            num_constraints: ctx.num_constraints(),
            encoding_time,
            solver_time,
        };
        info!(
            "Solved encoding with {} variables and {} constraints in {:?}",
            stats.num_variables, stats.num_constraints, solver_time
        );
        let stats = if self.question.benchmark { Some(stats) } else { None };

        Ok(match last {
            None => (VerificationResult::verified(stats), None),
            Some((mut result, model)) => {
                result.stats = stats;
                (result, Some(model))
            }
        })
    }

    /// Some environment variable that is true in `model` must become false, and every false one
    /// must stay false.
    fn minimization_clause(&self, model: &Model) -> Result<Expr, EncodingError> {
        let mut some_dropped = Vec::new();
        let mut none_added = Vec::new();
        let env = self.main_slice().logical_graph().environment_vars();
        let vars = env
            .values()
            .map(|r| &r.permitted)
            .chain(env.values().flat_map(|r| r.communities.values()));
        for x in vars {
            if model.eval_bool(x)? {
                some_dropped.push(x.not());
            } else {
                none_added.push(x.not());
            }
        }
        Ok(Expr::or_all(some_dropped).and(&Expr::and_all(none_added)))
    }

    fn build_counterexample(
        &self,
        ctx: &Context,
        model: &Model,
    ) -> Result<VerificationResult, EncodingError> {
        let mut result = VerificationResult::default();
        let slice = self.main_slice();

        if self.question.full_model {
            for (name, var) in ctx.variables() {
                result.model.insert(name.to_string(), model.eval(var)?.to_string());
            }
        }

        result.packet_model = packet_model(slice, model)?;

        for (id, r) in slice.logical_graph().environment_vars() {
            if !model.eval_bool(&r.permitted)? {
                continue;
            }
            let key = format!("{},{} ({})", id.edge.router, id.edge.start.name, id.proto.name());
            result.env_model.insert(key, route_model(r, &slice.packet().dst_ip, model)?);
        }

        for edges in slice.decisions().data_forwarding.values() {
            for (ge, df) in edges.iter() {
                if model.eval_bool(df)? {
                    result.fwd_model.insert(ge.to_string());
                }
            }
        }

        for ((a, b), v) in self.failures.internal_links() {
            if model.eval_int(v)? == 1 {
                result.failures.insert(format!("link({},{})", a, b));
            }
        }
        for (ge, v) in self.failures.edge_links() {
            if model.eval_int(v)? == 1 {
                result.failures.insert(format!("link({},{})", ge.router, ge.start.name));
            }
        }
        for (r, v) in self.failures.nodes() {
            if model.eval_int(v)? == 1 {
                result.failures.insert(format!("node({})", r));
            }
        }
        Ok(result)
    }
}

/// Per router, the first local address of its iBGP sessions
fn ibgp_session_addresses(g: &Graph) -> BTreeMap<String, Ip> {
    let mut pairs: BTreeSet<(String, Ip)> = BTreeSet::new();
    for (ge, n) in g.ibgp_neighbors() {
        let ip = match n.local_ip {
            Some(ip) => ip,
            None => match g.config(&ge.router) {
                Ok(conf) => conf.bgp_router_id(),
                Err(_) => continue,
            },
        };
        pairs.insert((ge.router.clone(), ip));
    }
    let mut result = BTreeMap::new();
    for (router, ip) in pairs {
        result.entry(router).or_insert(ip);
    }
    result
}

/// Decode the value of a symbolic enumeration
pub fn decode_enum<'a, T>(e: &'a SymbolicEnum<T>, model: &Model) -> Result<Option<&'a T>, SmtError>
where
    T: Clone + PartialEq + Debug + Display,
{
    let idx = model.eval_int(e.bitvec())?;
    Ok(e.value(idx as u64))
}

/// Header fields of the packet of a slice. Zero-valued optional fields are left out.
pub fn packet_model(slice: &EncoderSlice, model: &Model) -> Result<BTreeMap<String, String>, SmtError> {
    let pkt = slice.packet();
    let mut m = BTreeMap::new();
    m.insert("dstIp".to_string(), Ip(model.eval_int(&pkt.dst_ip)? as u32).to_string());
    let src = model.eval_int(&pkt.src_ip)?;
    if src != 0 {
        m.insert("srcIp".to_string(), Ip(src as u32).to_string());
    }
    let optional = [
        ("dstPort", &pkt.dst_port),
        ("srcPort", &pkt.src_port),
        ("icmpCode", &pkt.icmp_code),
        ("icmpType", &pkt.icmp_type),
    ];
    for (name, e) in optional.iter() {
        let v = model.eval_int(e)?;
        if v != 0 {
            m.insert(name.to_string(), v.to_string());
        }
    }
    m.insert("ipProtocol".to_string(), model.eval_int(&pkt.ip_protocol)?.to_string());
    let names = ["tcpAck", "tcpCwr", "tcpEce", "tcpFin", "tcpPsh", "tcpRst", "tcpSyn", "tcpUrg"];
    for (name, e) in names.iter().zip(pkt.tcp_flags().iter()) {
        if model.eval_bool(e)? {
            m.insert(name.to_string(), "set".to_string());
        }
    }
    Ok(m)
}

/// Fields of a route record under a model. Communities attached to the route appear as keys
/// `community <value>` with an empty value.
pub fn route_model(
    r: &SymbolicRoute,
    dst_ip: &Expr,
    model: &Model,
) -> Result<BTreeMap<String, String>, SmtError> {
    let mut m = BTreeMap::new();
    let len = model.eval_int(&r.prefix_length)?;
    let dst = Ip(model.eval_int(dst_ip)? as u32);
    m.insert("prefix".to_string(), Prefix::new(dst, len.max(0).min(32) as u8).to_string());
    let fields = [
        ("admin distance", r.admin_dist.as_ref()),
        ("local preference", r.local_pref.as_ref()),
        ("multi-exit disc.", r.med.as_ref()),
        ("protocol metric", Some(&r.metric)),
    ];
    for (name, e) in fields.iter() {
        if let Some(e) = e {
            m.insert(name.to_string(), model.eval_int(e)?.to_string());
        }
    }
    if let Some(area) = &r.ospf_area {
        if let Some(a) = decode_enum(area, model)? {
            m.insert("OSPF Area".to_string(), a.to_string());
        }
    }
    if let Some(t) = &r.ospf_type {
        if let Some(t) = decode_enum(t, model)? {
            m.insert("OSPF Type".to_string(), t.to_string());
        }
    }
    for (c, e) in r.communities.iter() {
        if model.eval_bool(e)? {
            m.insert(format!("community {}", c.value()), String::new());
        }
    }
    Ok(m)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::*;
    use crate::smt::{FixedSolver, Value};

    fn two_routers(ibgp: bool) -> Rc<Graph> {
        let mut r1 = Configuration::new("R1");
        r1.add_interface(Interface::new("eth0", "192.168.0.1/30".parse().unwrap()))
            .add_interface(Interface::new("eth1", "172.16.0.1/30".parse().unwrap()));
        let mut r2 = Configuration::new("R2");
        r2.add_interface(Interface::new("eth0", "192.168.0.2/30".parse().unwrap()));
        if ibgp {
            r1.bgp = Some(
                BgpProcess::new("1.1.1.1".parse().unwrap())
                    .neighbor(
                        BgpNeighbor::new("192.168.0.2".parse().unwrap(), 1, 1)
                            .local_ip("192.168.0.1".parse().unwrap()),
                    ),
            );
            r2.bgp = Some(
                BgpProcess::new("2.2.2.2".parse().unwrap())
                    .neighbor(
                        BgpNeighbor::new("192.168.0.1".parse().unwrap(), 1, 1)
                            .local_ip("192.168.0.2".parse().unwrap()),
                    ),
            );
        }
        Rc::new(Graph::new(vec![r1, r2], None).unwrap())
    }

    #[test]
    fn slices_and_ids() {
        let mut ctx = Context::new();
        let e1 = Encoder::new(&mut ctx, two_routers(true), HeaderQuestion::default()).unwrap();
        let e2 = Encoder::new(&mut ctx, two_routers(true), HeaderQuestion::default()).unwrap();
        assert_eq!(e1.id(), 0);
        assert_eq!(e2.id(), 1);
        assert_eq!(e1.main_slice().name(), MAIN_SLICE_NAME);
        let names: Vec<&String> = e1.slices().keys().collect();
        assert_eq!(names, vec!["SLICE-MAIN_", "SLICE-R1_", "SLICE-R2_"]);
        assert!(e1.slice_reachability()["R1"].contains_key("R2"));
        assert!(ctx.variable("0_FAILED-EDGE_R1_R2").is_some());
        assert!(ctx.variable("1_FAILED-EDGE_R1_R2").is_some());
        assert!(ctx.variable("0_SLICE-R2__reachable_R1").is_some());

        let mut ctx = Context::new();
        let e = Encoder::new(&mut ctx, two_routers(false), HeaderQuestion::default()).unwrap();
        assert_eq!(e.slices().len(), 1);
        assert_eq!(e.main_slice().name(), "");
    }

    #[test]
    fn failure_bound() {
        let mut ctx = Context::new();
        let q = HeaderQuestion::default().failures(1);
        let e = Encoder::new(&mut ctx, two_routers(false), q).unwrap();
        let before = ctx.num_constraints();
        e.add_failed_constraints(&mut ctx, 1);
        // two links and two pinned routers
        assert_eq!(ctx.num_constraints() - before, 2 * 2 + 2 + 1);

        let sum = ctx.assertions().last().unwrap().clone();
        let mut m = Model::new();
        m.set("0_FAILED-EDGE_R1_R2", Value::Int(1));
        assert!(m.eval_bool(&sum).unwrap());
        m.set("0_FAILED-EDGE_R1_eth1", Value::Int(1));
        assert!(!m.eval_bool(&sum).unwrap());
    }

    #[test]
    fn verified_on_unsat() {
        let mut ctx = Context::new();
        let q = HeaderQuestion { benchmark: true, ..Default::default() };
        let e = Encoder::new(&mut ctx, two_routers(false), q).unwrap();
        let mut solver = FixedSolver::new(SatAnswer::Unsat);
        let (res, model) = e.verify(&mut ctx, &mut solver).unwrap();
        assert!(res.verified);
        assert!(model.is_none());
        let stats = res.stats.unwrap();
        assert_eq!(stats.num_nodes, 2);
        assert_eq!(stats.num_edges, 2);

        let mut solver = FixedSolver::new(SatAnswer::Unknown("timeout".to_string()));
        assert_eq!(
            e.verify(&mut ctx, &mut solver).unwrap_err(),
            EncodingError::Smt(SmtError::Unknown("timeout".to_string()))
        );
    }

    #[test]
    fn counterexample_from_model() {
        let mut ctx = Context::new();
        let e = Encoder::new(&mut ctx, two_routers(false), HeaderQuestion::default()).unwrap();
        let mut m = Model::new();
        m.set("0_dst-ip", Value::BitVec(0x0a00_0001))
            .set("0_dst-port", Value::Int(80))
            .set("0_ip-protocol", Value::Int(6))
            .set("0_tcp-syn", Value::Bool(true))
            .set("0_FAILED-EDGE_R1_R2", Value::Int(1))
            .set("0_DATA-FORWARDING_R1_eth1", Value::Bool(true));
        let mut solver = FixedSolver::new(SatAnswer::Sat(m));
        let (res, model) = e.verify(&mut ctx, &mut solver).unwrap();
        assert!(!res.verified);
        assert!(model.is_some());
        assert_eq!(res.packet_model["dstIp"], "10.0.0.1");
        assert_eq!(res.packet_model["dstPort"], "80");
        assert_eq!(res.packet_model["tcpSyn"], "set");
        assert!(!res.packet_model.contains_key("srcIp"));
        assert!(res.failures.contains("link(R1,R2)"));
        assert_eq!(res.fwd_model.len(), 1);
        assert!(res.stats.is_none());
    }
}
