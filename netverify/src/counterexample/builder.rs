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

//! Reconstruction of concrete counterexamples from a model.

use super::{
    BgpAdvertisement, Edge, Environment, FlowDisposition, FlowHistory, FlowTrace, FlowTraceHop,
    Scenario,
};
use crate::encoder::{decode_enum, Encoder, EncoderSlice, EncodingError, SymbolicPacket, SymbolicRoute};
use crate::network::{
    Community, CommunityVarKind, Flow, Graph, GraphEdge, Ip, NetworkError, Prefix, Protocol,
    TcpFlags, NULL_INTERFACE_NAME,
};
use crate::smt::{Expr, Model, SmtError};

use log::*;
use std::collections::{BTreeMap, BTreeSet};

const NEIGHBOR_UNREACHABLE_NOTE: &str =
    "NEIGHBOR_UNREACHABLE_OR_EXITS_NETWORK - insufficient information to decide";

/// Decodes a model into packets, failures, environment routes and traces.
#[derive(Debug, Clone, Copy)]
pub struct CounterExample<'a> {
    model: &'a Model,
}

impl<'a> CounterExample<'a> {
    /// Decode the given model
    pub fn new(model: &'a Model) -> Self {
        Self { model }
    }

    /// Value of a boolean term
    pub fn is_true(&self, e: &Expr) -> Result<bool, SmtError> {
        self.model.eval_bool(e)
    }

    fn int_val(&self, e: &Expr) -> Result<i64, SmtError> {
        self.model.eval_int(e)
    }

    /// The concrete packet, entering the network at `router`
    pub fn build_flow(&self, pkt: &SymbolicPacket, router: &str) -> Result<Flow, SmtError> {
        let f = pkt.tcp_flags();
        Ok(Flow {
            ingress_node: router.to_string(),
            src_ip: Ip(self.int_val(&pkt.src_ip)? as u32),
            dst_ip: Ip(self.int_val(&pkt.dst_ip)? as u32),
            src_port: self.int_val(&pkt.src_port)? as u32,
            dst_port: self.int_val(&pkt.dst_port)? as u32,
            ip_protocol: self.int_val(&pkt.ip_protocol)? as u32,
            icmp_type: self.int_val(&pkt.icmp_type)? as u32,
            icmp_code: self.int_val(&pkt.icmp_code)? as u32,
            tcp_flags: TcpFlags {
                ack: self.is_true(f[0])?,
                cwr: self.is_true(f[1])?,
                ece: self.is_true(f[2])?,
                fin: self.is_true(f[3])?,
                psh: self.is_true(f[4])?,
                rst: self.is_true(f[5])?,
                syn: self.is_true(f[6])?,
                urg: self.is_true(f[7])?,
            },
            tag: "SMT".to_string(),
        })
    }

    /// Failed links. Each internal link is reported in one direction only.
    pub fn build_failed_links(&self, enc: &Encoder) -> Result<BTreeSet<Edge>, EncodingError> {
        let g = enc.graph();
        let mut failed: BTreeSet<&GraphEdge> = BTreeSet::new();
        for ge in g.edge_map().values().flatten() {
            if self.int_val(&enc.failures().failed_variable(ge)?)? == 0 {
                continue;
            }
            let reverse_known = g.other_end(ge).map(|o| failed.contains(o)).unwrap_or(false);
            if !reverse_known {
                failed.insert(ge);
            }
        }
        Ok(failed.into_iter().map(from_graph_edge).collect())
    }

    /// Routes received from the environment that are selected by the receiving router.
    pub fn build_env_routing_table(
        &self,
        enc: &Encoder,
    ) -> Result<BTreeSet<BgpAdvertisement>, EncodingError> {
        let slice = enc.main_slice();
        let decisions = slice.decisions();
        let mut routes = BTreeSet::new();
        for (id, record) in slice.logical_graph().environment_vars() {
            if !self.is_true(&record.permitted)? {
                continue;
            }
            let ge = &id.edge;
            let ctrl = decisions.control_forwarding(ge).ok_or_else(|| {
                EncodingError::MissingVariable(format!("control forwarding of {}", ge))
            })?;
            if !self.is_true(ctrl)? {
                continue;
            }
            let best = match decisions.best_neighbor.get(&ge.router) {
                Some(b) => b,
                None => continue,
            };
            let flow = self.build_flow(slice.packet(), &ge.router)?;
            let network = self.build_prefix(best, &flow)?;
            let path_len = self.int_val(&best.metric)?.max(0) as usize;

            let neighbor = slice.graph().ebgp_neighbors().get(ge);
            let src_node = neighbor.map(|n| format!("as{}", n.remote_as)).unwrap_or_default();
            let dst_ip = neighbor
                .and_then(|n| n.local_ip)
                .or_else(|| ge.start.address.map(|a| a.ip))
                .unwrap_or(Ip::ZERO);

            let mut communities = BTreeSet::new();
            for (c, e) in best.communities.iter() {
                if c.kind() == CommunityVarKind::Exact && self.is_true(e)? {
                    communities.insert(c.value().parse::<Community>()?);
                }
            }

            routes.insert(BgpAdvertisement {
                adv_type: "EBGP_RECEIVED".to_string(),
                network,
                src_node,
                dst_node: ge.router.clone(),
                dst_ip,
                protocol: Protocol::Bgp,
                local_pref: 100,
                med: 80,
                as_path: vec![-1; path_len],
                communities,
            });
        }
        Ok(routes)
    }

    /// Prefix of a route towards the destination of the packet
    pub fn build_prefix(&self, route: &SymbolicRoute, flow: &Flow) -> Result<Prefix, SmtError> {
        let len = self.int_val(&route.prefix_length)?.max(0).min(32);
        Ok(Prefix::new(flow.dst_ip, len as u8))
    }

    /// Protocol of the route. Routers with a single protocol do not record the history.
    pub fn build_protocol(
        &self,
        route: &SymbolicRoute,
        slice: &EncoderSlice,
        router: &str,
    ) -> Result<Protocol, SmtError> {
        if let Some(h) = &route.protocol_history {
            if let Some(p) = decode_enum(h, self.model)? {
                return Ok(*p);
            }
        }
        Ok(slice.optimizations().router_protocols(router).first().copied().unwrap_or(Protocol::Connected))
    }

    /// Path of the packet starting at `router`, following the data forwarding decisions of the
    /// main slice until the packet is accepted, dropped, or loops.
    pub fn build_flow_trace(&self, enc: &Encoder, router: &str) -> Result<(Flow, FlowTrace), EncodingError> {
        let slice = enc.main_slice();
        let g = slice.graph();
        let decisions = slice.decisions();
        let flow = self.build_flow(slice.packet(), router)?;
        let no_edges = BTreeMap::new();

        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut hops = Vec::new();
        let mut current = router.to_string();
        let finish = |disposition: FlowDisposition,
                      hops: Vec<FlowTraceHop>,
                      notes: String|
         -> Result<(Flow, FlowTrace), EncodingError> {
            Ok((flow.clone(), FlowTrace { disposition, hops, notes }))
        };

        loop {
            visited.insert(current.clone());
            let best = decisions.best_neighbor.get(&current);
            let (pfx, proto) = match best {
                Some(b) => (self.build_prefix(b, &flow)?, self.build_protocol(b, slice, &current)?),
                None => (Prefix::new(flow.dst_ip, 0), Protocol::Connected),
            };

            let mut next = None;
            for (ge, dfwd) in decisions.data_forwarding.get(&current).unwrap_or(&no_edges) {
                let route = build_route(&pfx, proto, ge);
                if self.is_true(dfwd)? {
                    hops.push(build_hop(ge, route));
                    if ge.peer.as_ref().map(|p| visited.contains(p)).unwrap_or(false) {
                        return finish(FlowDisposition::Loop, hops, "LOOP".to_string());
                    }
                    let across = slice.forwards_across(&current, ge).ok_or_else(|| {
                        EncodingError::MissingVariable(format!("forwards across {}", ge))
                    })?;
                    if !self.is_true(across)? {
                        let (peer, filter) = match (&ge.peer, &ge.end) {
                            (Some(p), Some(end)) => (p.as_str(), end.incoming_filter.as_deref()),
                            _ => (current.as_str(), None),
                        };
                        let notes = denied_note("DENIED_IN", g, peer, filter, &flow)?;
                        return finish(FlowDisposition::DeniedIn, hops, notes);
                    }
                    if g.is_loopback(ge) {
                        return finish(FlowDisposition::Accepted, hops, "ACCEPTED".to_string());
                    }
                    match &ge.peer {
                        None if g.ebgp_neighbors().contains_key(ge) => {
                            return finish(FlowDisposition::Accepted, hops, "ACCEPTED".to_string());
                        }
                        None => {
                            return finish(
                                FlowDisposition::NeighborUnreachableOrExitsNetwork,
                                hops,
                                NEIGHBOR_UNREACHABLE_NOTE.to_string(),
                            );
                        }
                        Some(peer) if g.is_host(peer) => {
                            return finish(FlowDisposition::Accepted, hops, "ACCEPTED".to_string());
                        }
                        Some(peer) => {
                            next = Some(peer.clone());
                            break;
                        }
                    }
                } else if let Some(ctrl) = decisions.control_forwarding(ge) {
                    if self.is_true(ctrl)? {
                        hops.push(build_hop(ge, route));
                        let filter = ge.start.outgoing_filter.as_deref();
                        let notes = denied_note("DENIED_OUT", g, &current, filter, &flow)?;
                        return finish(FlowDisposition::DeniedOut, hops, notes);
                    }
                }
            }

            match next {
                Some(n) => {
                    trace!("Packet continues from {} to {}", current, n);
                    current = n;
                }
                None => {
                    let permitted = match best {
                        Some(b) => self.is_true(&b.permitted)?,
                        None => false,
                    };
                    if !permitted {
                        return finish(FlowDisposition::NoRoute, hops, "NO_ROUTE".to_string());
                    }
                    let local = g
                        .edges(&current)
                        .iter()
                        .any(|ge| ge.start.address.map(|a| a.ip == flow.dst_ip).unwrap_or(false));
                    return if local {
                        finish(FlowDisposition::Accepted, hops, "ACCEPTED".to_string())
                    } else {
                        finish(
                            FlowDisposition::NeighborUnreachableOrExitsNetwork,
                            hops,
                            NEIGHBOR_UNREACHABLE_NOTE.to_string(),
                        )
                    };
                }
            }
        }
    }

    fn environment(&self, name: String, enc: &Encoder) -> Result<Environment, EncodingError> {
        Ok(Environment {
            name,
            failed_links: self.build_failed_links(enc)?,
            bgp_advertisements: self.build_env_routing_table(enc)?,
        })
    }

    /// Traces of every source that does not reach the destination
    pub fn build_flow_history(
        &self,
        name: &str,
        sources: &[String],
        enc: &Encoder,
        reach: &BTreeMap<String, bool>,
    ) -> Result<FlowHistory, EncodingError> {
        let mut history = FlowHistory::new();
        for source in sources.iter() {
            if reach.get(source).copied().unwrap_or(false) {
                continue;
            }
            let (flow, trace) = self.build_flow_trace(enc, source)?;
            history.add_flow_trace(flow, Scenario::Base, self.environment(name.to_string(), enc)?, trace);
        }
        Ok(history)
    }

    /// Traces of every source whose reachability differs between the `base` and the `delta`
    /// network.
    pub fn build_flow_history_diff(
        &self,
        name: &str,
        sources: &[String],
        delta: &Encoder,
        base: &Encoder,
        reach_delta: &BTreeMap<String, Expr>,
        reach_base: &BTreeMap<String, Expr>,
    ) -> Result<FlowHistory, EncodingError> {
        let mut history = FlowHistory::new();
        for source in sources.iter() {
            let (d, b) = match (reach_delta.get(source), reach_base.get(source)) {
                (Some(d), Some(b)) => (d, b),
                _ => continue,
            };
            if self.is_true(d)? == self.is_true(b)? {
                continue;
            }
            let (flow_base, trace_base) = self.build_flow_trace(base, source)?;
            let (flow_delta, trace_delta) = self.build_flow_trace(delta, source)?;
            let env_base = self.environment(name.to_string(), base)?;
            let env_delta = self.environment(format!("{}-with-delta", name), delta)?;
            history.add_flow_trace(flow_base, Scenario::Base, env_base, trace_base);
            history.add_flow_trace(flow_delta, Scenario::Delta, env_delta, trace_delta);
        }
        Ok(history)
    }
}

fn from_graph_edge(ge: &GraphEdge) -> Edge {
    Edge::new(
        ge.router.clone(),
        ge.start.name.clone(),
        ge.peer.clone().unwrap_or_else(|| "none".to_string()),
        ge.end.as_ref().map(|i| i.name.clone()).unwrap_or_else(|| "none".to_string()),
    )
}

fn build_hop(ge: &GraphEdge, route: String) -> FlowTraceHop {
    let edge = Edge::new(
        ge.router.clone(),
        ge.start.name.clone(),
        ge.peer.clone().unwrap_or_else(|| "(none)".to_string()),
        ge.end.as_ref().map(|i| i.name.clone()).unwrap_or_else(|| NULL_INTERFACE_NAME.to_string()),
    );
    let mut routes = BTreeSet::new();
    routes.insert(route);
    FlowTraceHop { edge, routes }
}

/// Textual form of the route used to forward over an edge
pub fn build_route(pfx: &Prefix, proto: Protocol, ge: &GraphEdge) -> String {
    if proto.is_connected() {
        format!("ConnectedRoute<{},nhip:AUTO/NONE(-1l),nhint:{}>", pfx, ge.start.name)
    } else {
        let nhip = ge.start.address.map(|a| a.ip.to_string()).unwrap_or_else(|| "none".to_string());
        format!("{:?}Route<{},nhip:{},nhint:dynamic>", proto, pfx, nhip)
    }
}

/// Reason for a dropped packet: the filter and the line that matched it.
fn denied_note(
    kind: &str,
    g: &Graph,
    router: &str,
    filter: Option<&str>,
    flow: &Flow,
) -> Result<String, NetworkError> {
    let name = match filter {
        Some(name) => name,
        None => return Ok(kind.to_string()),
    };
    let conf = g.config(router)?;
    let acl = conf
        .acls
        .get(name)
        .ok_or_else(|| NetworkError::AclNotFound(router.to_string(), name.to_string()))?;
    let result = acl.filter(flow, &conf.acls)?;
    let line = result
        .matched_line
        .and_then(|i| acl.lines.get(i))
        .map(|l| l.name.as_str())
        .unwrap_or("default deny");
    Ok(format!("{}{{{}}}{{{}}}", kind, acl.name, line))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::*;
    use crate::properties::HeaderQuestion;
    use crate::smt::{Context, Value};
    use std::rc::Rc;

    fn network() -> Rc<Graph> {
        let mut r1 = Configuration::new("R1");
        r1.add_interface(Interface::new("eth0", "192.168.0.1/30".parse().unwrap()))
            .add_static_route(StaticRoute::via("10.0.0.0/24".parse().unwrap(), "192.168.0.2".parse().unwrap()));
        let mut r2 = Configuration::new("R2");
        r2.add_interface(Interface::new("eth0", "192.168.0.2/30".parse().unwrap()).incoming_filter("guard"))
            .add_interface(Interface::new("eth1", "10.0.0.1/24".parse().unwrap()))
            .add_acl(IpAccessList::new("guard", vec![]));
        Rc::new(Graph::new(vec![r1, r2], None).unwrap())
    }

    fn encoder() -> Encoder {
        let mut ctx = Context::new();
        Encoder::new(&mut ctx, network(), HeaderQuestion::default()).unwrap()
    }

    fn packet_to(dst: &str) -> Model {
        let mut m = Model::new();
        m.set("0_dst-ip", Value::BitVec(dst.parse::<Ip>().unwrap().as_u64()));
        m
    }

    #[test]
    fn flow_is_tagged() {
        let enc = encoder();
        let mut m = packet_to("10.0.0.1");
        m.set("0_tcp-syn", Value::Bool(true));
        let flow = CounterExample::new(&m).build_flow(enc.main_slice().packet(), "R1").unwrap();
        assert_eq!(flow.tag, "SMT");
        assert_eq!(flow.ingress_node, "R1");
        assert_eq!(flow.dst_ip.to_string(), "10.0.0.1");
        assert!(flow.tcp_flags.syn);
        assert!(!flow.tcp_flags.ack);
    }

    #[test]
    fn accepted_at_destination_router() {
        let enc = encoder();
        let mut m = packet_to("10.0.0.1");
        m.set("0_DATA-FORWARDING_R1_eth0", Value::Bool(true))
            .set("0__R2_eth0_INBOUND_guard", Value::Bool(true))
            .set("0_R2_OVERALL_BEST_None_permitted", Value::Bool(true));
        let (_, trace) = CounterExample::new(&m).build_flow_trace(&enc, "R1").unwrap();
        assert_eq!(trace.disposition, FlowDisposition::Accepted);
        assert_eq!(trace.hops.len(), 1);
        assert_eq!(trace.hops[0].edge, Edge::new("R1", "eth0", "R2", "eth0"));
    }

    #[test]
    fn denied_by_inbound_filter() {
        let enc = encoder();
        let mut m = packet_to("10.0.0.1");
        m.set("0_DATA-FORWARDING_R1_eth0", Value::Bool(true));
        let (_, trace) = CounterExample::new(&m).build_flow_trace(&enc, "R1").unwrap();
        assert_eq!(trace.disposition, FlowDisposition::DeniedIn);
        assert_eq!(trace.notes, "DENIED_IN{guard}{default deny}");
    }

    #[test]
    fn no_route_and_loop() {
        let enc = encoder();
        let m = packet_to("10.0.0.1");
        let (_, trace) = CounterExample::new(&m).build_flow_trace(&enc, "R1").unwrap();
        assert_eq!(trace.disposition, FlowDisposition::NoRoute);
        assert!(trace.hops.is_empty());

        let mut m = packet_to("10.0.0.1");
        m.set("0_DATA-FORWARDING_R1_eth0", Value::Bool(true))
            .set("0_DATA-FORWARDING_R2_eth0", Value::Bool(true))
            .set("0__R2_eth0_INBOUND_guard", Value::Bool(true));
        let ce = CounterExample::new(&m);
        let (_, first) = ce.build_flow_trace(&enc, "R1").unwrap();
        let (_, second) = ce.build_flow_trace(&enc, "R1").unwrap();
        assert_eq!(first.disposition, FlowDisposition::Loop);
        assert_eq!(first.hops.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn failed_links_once() {
        let enc = encoder();
        let mut m = Model::new();
        m.set("0_FAILED-EDGE_R1_R2", Value::Int(1));
        let links = CounterExample::new(&m).build_failed_links(&enc).unwrap();
        assert_eq!(links.len(), 1);
        let l = links.iter().next().unwrap();
        assert_eq!((l.node1.as_str(), l.node2.as_str()), ("R1", "R2"));
    }

    #[test]
    fn history_skips_reaching_sources() {
        let enc = encoder();
        let m = packet_to("10.0.0.1");
        let reach: BTreeMap<String, bool> =
            vec![("R1".to_string(), false), ("R2".to_string(), true)].into_iter().collect();
        let sources = vec!["R1".to_string(), "R2".to_string()];
        let h = CounterExample::new(&m).build_flow_history("net", &sources, &enc, &reach).unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h.traces[0].scenario, Scenario::Base);
        assert_eq!(h.traces[0].flow.ingress_node, "R1");
        assert!(h.traces[0].environment.failed_links.is_empty());
    }

    #[test]
    fn route_text() {
        let g = network();
        let ge = g.edges("R1").iter().find(|e| e.start.name == "eth0").unwrap();
        let p: Prefix = "10.0.0.0/24".parse().unwrap();
        assert_eq!(
            build_route(&p, Protocol::Connected, ge),
            "ConnectedRoute<10.0.0.0/24,nhip:AUTO/NONE(-1l),nhint:eth0>"
        );
        assert_eq!(build_route(&p, Protocol::Bgp, ge), "BgpRoute<10.0.0.0/24,nhip:192.168.0.1,nhint:dynamic>");
    }
}
