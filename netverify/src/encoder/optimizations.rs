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

//! Network-wide decisions on which parts of the encoding are needed.

use crate::network::policy::{walk_statements, PolicyNode};
use crate::network::{Configuration, GeneratedRoute, Graph, HeaderSpace, Prefix, Protocol, Statement};
use std::collections::{BTreeMap, BTreeSet};

/// Route filter lists whose name contains this marker list the aggregates that suppress more
/// specific routes.
pub const AGGREGATION_SUPPRESS_NAME: &str = "MATCH_SUPPRESSED_SUMMARY_ONLY";

/// Returns true if a route for prefix `p` may be used by a packet in the header space.
pub fn relevant_prefix(hs: &HeaderSpace, p: &Prefix) -> bool {
    hs.dst_ips.is_empty()
        || hs.dst_ips.iter().any(|d| d.contains_prefix(p) || p.contains_prefix(d))
}

/// Optimizations of one encoder slice. Attributes that are never modified by any policy are
/// dropped from the route records, and protocols irrelevant for the destination are not modeled.
#[derive(Debug, Clone)]
pub struct Optimizations {
    protocols: BTreeMap<String, Vec<Protocol>>,
    relevant_aggregates: BTreeMap<String, Vec<GeneratedRoute>>,
    suppressed_aggregates: BTreeMap<String, BTreeSet<Prefix>>,
    single_protocol: BTreeSet<String>,
    need_bgp_internal: BTreeSet<String>,
    need_router_id: BTreeSet<String>,
    keep_local_pref: bool,
    keep_admin_dist: bool,
    keep_med: bool,
    keep_ospf_type: bool,
    need_originator_ids: bool,
}

fn any_statement<F>(g: &Graph, pred: F) -> bool
where
    F: Fn(&Statement) -> bool,
{
    let mut found = false;
    for conf in g.configurations().values() {
        for pol in conf.routing_policies.values() {
            walk_statements(conf, &pol.statements, &mut |n| {
                if let PolicyNode::Stmt(s) = n {
                    found |= pred(s);
                }
            });
        }
    }
    found
}

fn has_relevant_originated_route(hs: &HeaderSpace, conf: &Configuration, proto: Protocol) -> bool {
    Graph::originated_networks(conf, proto).iter().any(|p| relevant_prefix(hs, p))
}

impl Optimizations {
    /// Compute the optimizations of a slice over the header space `hs`.
    pub fn new(g: &Graph, hs: &HeaderSpace, is_main_slice: bool) -> Self {
        let keep_local_pref = any_statement(g, |s| matches!(s, Statement::SetLocalPreference(_)));
        let sets_metric_type = any_statement(g, |s| matches!(s, Statement::SetOspfMetricType(_)));
        let areas: BTreeSet<u64> = g.routers().flat_map(|r| g.area_ids(r).copied()).collect();

        let mut protocols = BTreeMap::new();
        for (router, conf) in g.configurations().iter() {
            let mut protos = Vec::new();
            if conf.ospf.is_some() {
                protos.push(Protocol::Ospf);
            }
            if conf.bgp.is_some() && is_main_slice {
                protos.push(Protocol::Bgp);
            }
            if has_relevant_originated_route(hs, conf, Protocol::Connected) {
                protos.push(Protocol::Connected);
            }
            if has_relevant_originated_route(hs, conf, Protocol::Static) {
                protos.push(Protocol::Static);
            }
            protocols.insert(router.clone(), protos);
        }

        let need_bgp_internal: BTreeSet<String> =
            g.ibgp_neighbors().keys().map(|ge| ge.router.clone()).collect();

        let single_protocol = protocols
            .iter()
            .filter(|(_, ps)| ps.len() == 1)
            .map(|(r, _)| r.clone())
            .collect();

        let mut relevant_aggregates = BTreeMap::new();
        let mut suppressed_aggregates = BTreeMap::new();
        for (router, conf) in g.configurations().iter() {
            let aggs: Vec<GeneratedRoute> = conf
                .generated_routes
                .iter()
                .filter(|gr| relevant_prefix(hs, &gr.network))
                .cloned()
                .collect();
            let mut suppressed: BTreeSet<Prefix> =
                conf.generated_routes.iter().filter(|gr| gr.summary_only).map(|gr| gr.network).collect();
            for (name, rfl) in conf.route_filter_lists.iter() {
                if name.contains(AGGREGATION_SUPPRESS_NAME) {
                    suppressed.extend(rfl.lines.iter().map(|l| l.range.prefix));
                }
            }
            relevant_aggregates.insert(router.clone(), aggs);
            suppressed_aggregates.insert(router.clone(), suppressed);
        }

        let mut need_router_id = BTreeSet::new();
        for (router, conf) in g.configurations().iter() {
            let uses_ibgp = g.edges(router).iter().any(|ge| g.ibgp_neighbors().contains_key(ge));
            let uses_ebgp = protocols[router].contains(&Protocol::Bgp);
            let (mp_ibgp, mp_ebgp) =
                conf.bgp.as_ref().map(|b| (b.multipath_ibgp, b.multipath_ebgp)).unwrap_or_default();
            if (uses_ibgp && !mp_ibgp) || (uses_ebgp && !mp_ebgp) {
                need_router_id.insert(router.clone());
            }
        }

        Self {
            protocols,
            relevant_aggregates,
            suppressed_aggregates,
            single_protocol,
            need_bgp_internal,
            need_router_id,
            keep_local_pref,
            keep_admin_dist: sets_metric_type,
            keep_med: false,
            keep_ospf_type: sets_metric_type || areas.len() > 1,
            need_originator_ids: !g.route_reflector_parent().is_empty(),
        }
    }

    /// Modeled protocols of every router
    pub fn protocols(&self) -> &BTreeMap<String, Vec<Protocol>> {
        &self.protocols
    }

    /// Modeled protocols of a router
    pub fn router_protocols(&self, router: &str) -> &[Protocol] {
        self.protocols.get(router).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Returns true if the router runs a single modeled protocol
    pub fn has_single_protocol(&self, router: &str) -> bool {
        self.single_protocol.contains(router)
    }

    /// Aggregates of a router that are relevant for the destination
    pub fn relevant_aggregates(&self, router: &str) -> &[GeneratedRoute] {
        self.relevant_aggregates.get(router).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Returns true if the aggregate of the router suppresses more specific routes
    pub fn is_suppressed_aggregate(&self, router: &str, p: &Prefix) -> bool {
        self.suppressed_aggregates.get(router).map(|s| s.contains(p)).unwrap_or(false)
    }

    /// Returns true if the router must distinguish iBGP from eBGP routes
    pub fn need_bgp_internal(&self, router: &str) -> bool {
        self.need_bgp_internal.contains(router)
    }

    /// Returns true if the router breaks ties using the router id
    pub fn need_router_id(&self, router: &str) -> bool {
        self.need_router_id.contains(router)
    }

    /// Local preference is modified by some policy
    pub fn keep_local_pref(&self) -> bool {
        self.keep_local_pref
    }

    /// Administrative distance must be tracked per route
    pub fn keep_admin_dist(&self) -> bool {
        self.keep_admin_dist
    }

    /// MED must be tracked
    pub fn keep_med(&self) -> bool {
        self.keep_med
    }

    /// OSPF type must be tracked
    pub fn keep_ospf_type(&self) -> bool {
        self.keep_ospf_type
    }

    /// Some router is a route reflector client
    pub fn need_originator_ids(&self) -> bool {
        self.need_originator_ids
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::*;

    fn net() -> Graph {
        let mut r1 = Configuration::new("R1");
        r1.add_interface(Interface::new("eth0", "192.168.0.1/30".parse().unwrap()))
            .add_static_route(StaticRoute::via("10.0.0.0/24".parse().unwrap(), "192.168.0.2".parse().unwrap()));
        let mut r2 = Configuration::new("R2");
        r2.add_interface(Interface::new("eth0", "192.168.0.2/30".parse().unwrap()))
            .add_interface(Interface::new("eth1", "10.0.0.1/24".parse().unwrap()))
            .add_policy(RoutingPolicy::new(
                "lp",
                vec![Statement::SetLocalPreference(LongExpr::Literal(200)), Statement::ExitAccept],
            ));
        r2.bgp = Some(BgpProcess::new("2.2.2.2".parse().unwrap()));
        Graph::new(vec![r1, r2], None).unwrap()
    }

    #[test]
    fn protocols_of_destination() {
        let g = net();
        let hs = HeaderSpace { dst_ips: vec!["10.0.0.0/24".parse().unwrap()], ..Default::default() };
        let o = Optimizations::new(&g, &hs, true);
        assert_eq!(o.router_protocols("R1"), &[Protocol::Static]);
        assert_eq!(o.router_protocols("R2"), &[Protocol::Bgp, Protocol::Connected]);
        assert!(o.has_single_protocol("R1"));
        assert!(!o.has_single_protocol("R2"));
        assert!(o.keep_local_pref());
        assert!(!o.keep_med());
        assert!(!o.keep_ospf_type());
        assert!(o.need_router_id("R2"));
        assert!(!o.need_router_id("R1"));

        let o = Optimizations::new(&g, &hs, false);
        assert_eq!(o.router_protocols("R2"), &[Protocol::Connected]);
    }

    #[test]
    fn relevance() {
        let hs = HeaderSpace { dst_ips: vec!["10.0.0.0/24".parse().unwrap()], ..Default::default() };
        assert!(relevant_prefix(&hs, &"10.0.0.0/8".parse().unwrap()));
        assert!(relevant_prefix(&hs, &"10.0.0.128/25".parse().unwrap()));
        assert!(!relevant_prefix(&hs, &"10.0.1.0/24".parse().unwrap()));
        assert!(relevant_prefix(&HeaderSpace::default(), &"1.2.3.0/24".parse().unwrap()));
    }
}
