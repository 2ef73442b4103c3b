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

//! Symbolic control plane records.

use super::optimizations::Optimizations;
use super::symbolic_enum::{
    SymbolicArea, SymbolicEnum, SymbolicHistory, SymbolicOriginatorId, SymbolicOspfType,
};
use crate::network::{CommunityVar, Graph, Protocol};
use crate::smt::{Context, Expr};
use std::collections::{BTreeMap, BTreeSet};

/// Symbolic route. Attributes not needed by the encoding are `None`, and comparisons use the
/// protocol default instead.
#[derive(Debug, Clone)]
pub struct SymbolicRoute {
    /// Name prefix of all variables of the record
    pub name: String,
    /// Protocol of the record, `None` for the overall best route of a router
    pub proto: Option<Protocol>,
    /// Route received from outside of the network
    pub is_env: bool,
    /// The route exists
    pub permitted: Expr,
    /// Prefix length
    pub prefix_length: Expr,
    /// Metric, or AS path length for BGP
    pub metric: Expr,
    /// Administrative distance
    pub admin_dist: Option<Expr>,
    /// BGP local preference
    pub local_pref: Option<Expr>,
    /// BGP MED
    pub med: Option<Expr>,
    /// Router id of the neighbor the route was learned from
    pub router_id: Option<Expr>,
    /// OSPF area
    pub ospf_area: Option<SymbolicArea>,
    /// OSPF route type
    pub ospf_type: Option<SymbolicOspfType>,
    /// Route learned over iBGP
    pub bgp_internal: Option<Expr>,
    /// Route reflector client the route was learned from
    pub client_id: Option<SymbolicOriginatorId>,
    /// IGP cost to the BGP next hop
    pub igp_metric: Option<Expr>,
    /// Protocol that produced the overall best route
    pub protocol_history: Option<SymbolicHistory>,
    /// One flag per community variable
    pub communities: BTreeMap<CommunityVar, Expr>,
}

/// Area ids of the network, in increasing order
pub fn all_areas(g: &Graph) -> Vec<u64> {
    let areas: BTreeSet<u64> = g.routers().flat_map(|r| g.area_ids(r).copied()).collect();
    areas.into_iter().collect()
}

/// Originator ids of the network, starting with `0` for routes not learned from a client.
pub fn all_originator_ids(g: &Graph) -> Vec<u64> {
    let mut ids = vec![0];
    let set: BTreeSet<u64> = g.originator_id().values().copied().collect();
    ids.extend(set);
    ids
}

impl SymbolicRoute {
    /// Allocate a new record for `router`. Records with `proto == None` hold the overall best
    /// route over all protocols of the router.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &mut Context,
        name: impl Into<String>,
        router: &str,
        proto: Option<Protocol>,
        opts: &Optimizations,
        g: &Graph,
        model_igp: bool,
        is_env: bool,
    ) -> Self {
        let name = name.into();
        let router_protos = opts.router_protocols(router);
        let covers: Vec<Protocol> = match proto {
            Some(p) => vec![p],
            None => router_protos.to_vec(),
        };
        let has_bgp = covers.contains(&Protocol::Bgp);
        let has_ospf = covers.contains(&Protocol::Ospf);
        let multiple_protos = router_protos.len() > 1;

        let var = |ctx: &mut Context, suffix: &str| ctx.mk_int_var(format!("{}_{}", name, suffix));
        let permitted = ctx.mk_bool_var(format!("{}_permitted", name));
        let prefix_length = var(ctx, "prefixLength");
        let metric = var(ctx, "metric");
        let admin_dist =
            if opts.keep_admin_dist() || multiple_protos { Some(var(ctx, "adminDist")) } else { None };
        let local_pref =
            if has_bgp && opts.keep_local_pref() { Some(var(ctx, "localPref")) } else { None };
        let med = if has_bgp && opts.keep_med() { Some(var(ctx, "med")) } else { None };
        let router_id =
            if has_bgp && opts.need_router_id(router) { Some(var(ctx, "routerID")) } else { None };
        let areas = all_areas(g);
        let ospf_area = if has_ospf && areas.len() > 1 {
            Some(SymbolicEnum::new(ctx, format!("{}_ospfArea", name), areas))
        } else {
            None
        };
        let ospf_type = if has_ospf && opts.keep_ospf_type() {
            Some(SymbolicEnum::ospf_type(ctx, format!("{}_ospfType", name)))
        } else {
            None
        };
        let bgp_internal = if has_bgp && opts.need_bgp_internal(router) {
            Some(ctx.mk_bool_var(format!("{}_internal", name)))
        } else {
            None
        };
        let client_id = if has_bgp && opts.need_originator_ids() {
            Some(SymbolicEnum::new(ctx, format!("{}_clientId", name), all_originator_ids(g)))
        } else {
            None
        };
        let igp_metric = if has_bgp && model_igp && opts.need_bgp_internal(router) {
            Some(var(ctx, "igpMetric"))
        } else {
            None
        };
        let protocol_history = if proto.is_none() && multiple_protos {
            Some(SymbolicEnum::new(ctx, format!("{}_history", name), router_protos.to_vec()))
        } else {
            None
        };
        let mut communities = BTreeMap::new();
        if has_bgp {
            for c in g.all_communities() {
                let v = ctx.mk_bool_var(format!("{}_community_{}", name, c.var_suffix()));
                communities.insert(c.clone(), v);
            }
        }

        Self {
            name,
            proto,
            is_env,
            permitted,
            prefix_length,
            metric,
            admin_dist,
            local_pref,
            med,
            router_id,
            ospf_area,
            ospf_type,
            bgp_internal,
            client_id,
            igp_metric,
            protocol_history,
            communities,
        }
    }

    /// Community flag, or `false` if the record does not track the community
    pub fn community(&self, c: &CommunityVar) -> Expr {
        self.communities.get(c).cloned().unwrap_or_else(Expr::fls)
    }

    /// Equality of all attributes tracked by both records
    pub fn mk_eq(&self, other: &SymbolicRoute) -> Expr {
        let opt = |a: &Option<Expr>, b: &Option<Expr>| match (a, b) {
            (Some(a), Some(b)) => a.equals(b),
            _ => Expr::tru(),
        };
        let mut eqs = vec![
            self.permitted.equals(&other.permitted),
            self.prefix_length.equals(&other.prefix_length),
            self.metric.equals(&other.metric),
            opt(&self.admin_dist, &other.admin_dist),
            opt(&self.local_pref, &other.local_pref),
            opt(&self.med, &other.med),
            opt(&self.router_id, &other.router_id),
            opt(&self.bgp_internal, &other.bgp_internal),
            opt(&self.igp_metric, &other.igp_metric),
        ];
        if let (Some(a), Some(b)) = (&self.ospf_area, &other.ospf_area) {
            eqs.push(a.mk_eq(b));
        }
        if let (Some(a), Some(b)) = (&self.ospf_type, &other.ospf_type) {
            eqs.push(a.mk_eq(b));
        }
        if let (Some(a), Some(b)) = (&self.client_id, &other.client_id) {
            eqs.push(a.mk_eq(b));
        }
        if let (Some(a), Some(b)) = (&self.protocol_history, &other.protocol_history) {
            eqs.push(a.mk_eq(b));
        }
        for (c, e) in self.communities.iter() {
            if let Some(o) = other.communities.get(c) {
                eqs.push(e.equals(o));
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
    fn fields_follow_optimizations() {
        let mut r1 = Configuration::new("R1");
        r1.add_interface(Interface::new("eth0", "10.0.0.1/24".parse().unwrap()));
        r1.bgp = Some(BgpProcess::new("1.1.1.1".parse().unwrap()));
        r1.add_policy(RoutingPolicy::new(
            "tag",
            vec![Statement::AddCommunity(CommunitySetExpr::Literal(vec![Community::new(65000, 100)]))],
        ));
        let g = Graph::new(vec![r1], None).unwrap();
        let opts = Optimizations::new(&g, &HeaderSpace::default(), true);
        let mut ctx = Context::new();

        let bgp = SymbolicRoute::new(&mut ctx, "0_R1_BGP_BEST_None", "R1", Some(Protocol::Bgp), &opts, &g, true, false);
        assert!(bgp.local_pref.is_none());
        assert!(bgp.admin_dist.is_some());
        assert!(bgp.router_id.is_some());
        assert!(bgp.bgp_internal.is_none());
        assert!(bgp.ospf_type.is_none());
        assert_eq!(bgp.communities.len(), 1);
        assert_eq!(bgp.permitted.var_name(), Some("0_R1_BGP_BEST_None_permitted"));

        let best = SymbolicRoute::new(&mut ctx, "0_R1_OVERALL_BEST_None", "R1", None, &opts, &g, true, false);
        let h = best.protocol_history.as_ref().unwrap();
        assert_eq!(h.domain(), &[Protocol::Bgp, Protocol::Connected]);

        let conn = SymbolicRoute::new(&mut ctx, "0_R1_CONNECTED_IMPORT_eth0", "R1", Some(Protocol::Connected), &opts, &g, true, false);
        assert!(conn.communities.is_empty());
        assert!(conn.community(&CommunityVar::exact(Community::new(65000, 100))).is_false());
    }
}
