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

//! Instrumentation of a slice with auxiliary variables for reachability, path length, load and
//! forwarding loops.

use crate::encoder::{EncoderSlice, EncodingError};
use crate::network::{GraphEdge, Protocol};
use crate::smt::{Context, Expr};

use log::*;
use std::collections::{BTreeMap, BTreeSet};

/// Adds property variables to one slice of an encoding.
///
/// Every variable is named `{slice prefix}_{kind}_{router}`, so the variables of two encodings in
/// the same context never collide.
#[derive(Debug, Clone, Copy)]
pub struct PropertyAdder<'a> {
    slice: &'a EncoderSlice,
}

impl<'a> PropertyAdder<'a> {
    /// Instrument the given slice
    pub fn new(slice: &'a EncoderSlice) -> Self {
        Self { slice }
    }

    fn var_name(&self, kind: &str, router: &str) -> String {
        format!("{}_{}_{}", self.slice.prefix(), kind, router)
    }

    fn forwards_across(&self, router: &str, ge: &GraphEdge) -> Result<&'a Expr, EncodingError> {
        self.slice
            .forwards_across(router, ge)
            .ok_or_else(|| EncodingError::MissingVariable(format!("forwards across {}", ge)))
    }

    /// The router absorbs the packet on one of the edges, because its address is the destination.
    fn absorbed(&self, router: &str, edges: &[&GraphEdge]) -> Expr {
        let connected = match self.slice.best_vars(router, Protocol::Connected) {
            Some(r) => r,
            None => return Expr::fls(),
        };
        let dst = &self.slice.packet().dst_ip;
        Expr::or_all(edges.iter().filter_map(|ge| ge.start.address).map(|a| {
            connected.permitted.and(&dst.equals(&Expr::bv(a.ip.as_u64(), 32)))
        }))
    }

    /// Create the reachability variables of every router. The id of a router is `0` iff it does
    /// not reach the destination, and strictly decreases along the forwarding path otherwise.
    fn reachability_vars(
        &self,
        ctx: &mut Context,
    ) -> (BTreeMap<String, Expr>, BTreeMap<String, Expr>) {
        let zero = Expr::int(0);
        let mut reach = BTreeMap::new();
        let mut ids = BTreeMap::new();
        for router in self.slice.graph().routers() {
            let id = ctx.mk_int_var(self.var_name("reachable-id", router));
            let var = ctx.mk_bool_var(self.var_name("reachable", router));
            ctx.add(var.equals(&id.gt(&zero)));
            ctx.add(id.ge(&zero));
            ids.insert(router.clone(), id);
            reach.insert(router.clone(), var);
        }
        (reach, ids)
    }

    /// The router reaches the destination through some neighbor with a smaller id.
    fn recursive_reachability(
        &self,
        router: &str,
        ids: &BTreeMap<String, Expr>,
    ) -> Result<Expr, EncodingError> {
        let zero = Expr::int(0);
        let id = &ids[router];
        let mut has_recursive_route = Expr::fls();
        let mut larger_ids = Expr::tru();
        for ge in self.slice.graph().edges(router).iter().filter(|ge| !ge.is_abstract) {
            let peer_id = match ge.peer.as_ref().and_then(|p| ids.get(p)) {
                Some(x) => x,
                None => continue,
            };
            let fwd = self.forwards_across(router, ge)?;
            let send_to_reachable = fwd.and(&peer_id.gt(&zero));
            has_recursive_route = has_recursive_route.or(&send_to_reachable);
            larger_ids = larger_ids.and(&send_to_reachable.implies(&id.gt(peer_id)));
        }
        Ok(Expr::ite(&has_recursive_route, &larger_ids, &id.equals(&zero)))
    }

    /// Reachability of the destination edges `ges`. A router reaches the destination if it
    /// forwards out of a destination edge leaving the network, if it owns the destination
    /// address, or if it forwards to a neighbor that reaches the destination. Hosts owning a
    /// destination edge always reach it.
    pub fn instrument_reachability(
        &self,
        ctx: &mut Context,
        ges: &BTreeSet<GraphEdge>,
    ) -> Result<BTreeMap<String, Expr>, EncodingError> {
        let graph = self.slice.graph();
        let (reach, ids) = self.reachability_vars(ctx);
        for (router, edges) in graph.edge_map() {
            let dest_edges: Vec<&GraphEdge> =
                edges.iter().filter(|ge| !ge.is_abstract && ges.contains(ge)).collect();
            let mut direct = Expr::fls();
            if graph.is_host(router) && !dest_edges.is_empty() {
                direct = Expr::tru();
            } else {
                for ge in dest_edges.iter().filter(|ge| ge.peer.is_none()) {
                    direct = direct.or(self.forwards_across(router, ge)?);
                }
            }
            let absorbed = self.absorbed(router, &dest_edges);
            let recursive = self.recursive_reachability(router, &ids)?;
            ctx.add(Expr::ite(&direct.or(&absorbed), &ids[router].equals(&Expr::int(1)), &recursive));
        }
        Ok(reach)
    }

    /// Reachability of the router `dst` itself, used by the iBGP slices.
    pub fn instrument_reachability_router(
        &self,
        ctx: &mut Context,
        dst: &str,
    ) -> Result<BTreeMap<String, Expr>, EncodingError> {
        let (reach, ids) = self.reachability_vars(ctx);
        for router in self.slice.graph().routers() {
            if router == dst {
                ctx.add(ids[router].equals(&Expr::int(1)));
            } else {
                ctx.add(self.recursive_reachability(router, &ids)?);
            }
        }
        trace!("Instrumented reachability of {} in slice {:?}", dst, self.slice.name());
        Ok(reach)
    }

    /// Number of hops from every router to the destination edges, or `-1` if the destination is
    /// not reached.
    pub fn instrument_path_length(
        &self,
        ctx: &mut Context,
        ges: &BTreeSet<GraphEdge>,
    ) -> Result<BTreeMap<String, Expr>, EncodingError> {
        let graph = self.slice.graph();
        let zero = Expr::int(0);
        let minus_one = Expr::int(-1);
        let mut lens = BTreeMap::new();
        for router in graph.routers() {
            let var = ctx.mk_int_var(self.var_name("path-length", router));
            ctx.add(var.ge(&minus_one));
            lens.insert(router.clone(), var);
        }

        for (router, edges) in graph.edge_map() {
            let len = &lens[router];
            let mut direct = Expr::fls();
            for ge in edges.iter().filter(|ge| !ge.is_abstract && ges.contains(ge)) {
                direct = direct.or(self.forwards_across(router, ge)?);
            }
            let mut acc_none = Expr::tru();
            let mut acc_some = Expr::fls();
            for ge in edges.iter().filter(|ge| !ge.is_abstract) {
                let peer_len = match ge.peer.as_ref().and_then(|p| lens.get(p)) {
                    Some(x) => x,
                    None => continue,
                };
                let fwd = self.forwards_across(router, ge)?;
                acc_none = acc_none.and(&peer_len.lt(&zero).or(&fwd.not()));
                let via_peer = Expr::and_all(vec![
                    peer_len.ge(&zero),
                    fwd.clone(),
                    len.equals(&peer_len.add(&Expr::int(1))),
                ]);
                acc_some = acc_some.or(&via_peer);
            }
            let otherwise = Expr::ite(&acc_none, &len.equals(&minus_one), &acc_some);
            ctx.add(Expr::ite(&direct, &len.equals(&zero), &otherwise));
        }
        Ok(lens)
    }

    /// Number of forwarding paths from every router towards the destination edges. Routers
    /// sending to a destination edge directly have load `1`.
    pub fn instrument_load(
        &self,
        ctx: &mut Context,
        ges: &BTreeSet<GraphEdge>,
    ) -> Result<BTreeMap<String, Expr>, EncodingError> {
        let graph = self.slice.graph();
        let zero = Expr::int(0);
        let mut loads = BTreeMap::new();
        for router in graph.routers() {
            let var = ctx.mk_int_var(self.var_name("load", router));
            ctx.add(var.ge(&zero));
            loads.insert(router.clone(), var);
        }

        for (router, edges) in graph.edge_map() {
            let load = &loads[router];
            let dest_edges: Vec<&GraphEdge> =
                edges.iter().filter(|ge| !ge.is_abstract && ges.contains(ge)).collect();
            let mut direct = Expr::fls();
            for ge in dest_edges.iter().filter(|ge| ge.peer.is_none()) {
                direct = direct.or(self.forwards_across(router, ge)?);
            }
            let absorbed = self.absorbed(router, &dest_edges);

            let mut acc = Expr::int(0);
            for ge in edges.iter().filter(|ge| !ge.is_abstract) {
                let fwd = self.forwards_across(router, ge)?;
                if let Some(peer_load) = ge.peer.as_ref().and_then(|p| loads.get(p)) {
                    acc = acc.add(&Expr::ite(fwd, peer_load, &zero));
                }
            }
            ctx.add(Expr::ite(&direct.or(&absorbed), &load.equals(&Expr::int(1)), &load.equals(&acc)));
        }
        Ok(loads)
    }

    /// Returns a variable that holds iff packets sent by `router` come back to it.
    pub fn instrument_loop(&self, ctx: &mut Context, router: &str) -> Result<Expr, EncodingError> {
        let graph = self.slice.graph();
        let mut on_loop = BTreeMap::new();
        for r in graph.routers() {
            let var = ctx.mk_bool_var(self.var_name("on-loop", &format!("{}_{}", router, r)));
            on_loop.insert(r.clone(), var);
        }

        for (r, edges) in graph.edge_map() {
            let mut acc = Expr::fls();
            for ge in edges.iter().filter(|ge| !ge.is_abstract) {
                let peer = match &ge.peer {
                    Some(p) => p,
                    None => continue,
                };
                let fwd = self.forwards_across(r, ge)?;
                if peer == router {
                    acc = acc.or(fwd);
                } else if let Some(peer_on_loop) = on_loop.get(peer) {
                    acc = acc.or(&fwd.and(peer_on_loop));
                }
            }
            ctx.add(on_loop[r].equals(&acc));
        }

        on_loop
            .remove(router)
            .ok_or_else(|| EncodingError::MissingVariable(format!("on-loop variable of {}", router)))
    }

    /// All terms are equal to each other
    pub fn all_equal(xs: &[Expr]) -> Expr {
        Expr::and_all(xs.windows(2).map(|w| w[0].equals(&w[1])))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::*;
    use crate::smt::{Model, Value};
    use std::rc::Rc;

    fn two_routers() -> Rc<Graph> {
        let mut r1 = Configuration::new("R1");
        r1.add_interface(Interface::new("eth0", "192.168.0.1/30".parse().unwrap()));
        r1.add_static_route(StaticRoute::via("10.0.0.0/24".parse().unwrap(), "192.168.0.2".parse().unwrap()));
        let mut r2 = Configuration::new("R2");
        r2.add_interface(Interface::new("eth0", "192.168.0.2/30".parse().unwrap()))
            .add_interface(Interface::new("eth1", "10.0.0.1/24".parse().unwrap()));
        Rc::new(Graph::new(vec![r1, r2], None).unwrap())
    }

    fn slice(ctx: &mut Context, g: Rc<Graph>) -> EncoderSlice {
        let hs = HeaderSpace { dst_ips: vec!["10.0.0.0/24".parse().unwrap()], ..Default::default() };
        EncoderSlice::new(ctx, 0, "", g, hs, true).unwrap()
    }

    fn dest(g: &Graph) -> BTreeSet<GraphEdge> {
        g.edges("R2").iter().filter(|ge| ge.start.name == "eth1").cloned().collect()
    }

    fn holds(ctx: &Context, from: usize, m: &Model) -> bool {
        ctx.assertions()[from..].iter().all(|a| m.eval_bool(a).unwrap())
    }

    fn forwarding(m: &mut Model) {
        m.set("0_DATA-FORWARDING_R1_eth0", Value::Bool(true))
            .set("0_DATA-FORWARDING_R2_eth1", Value::Bool(true));
    }

    #[test]
    fn reachability_ids_decrease() {
        let g = two_routers();
        let mut ctx = Context::new();
        let s = slice(&mut ctx, g.clone());
        let before = ctx.num_constraints();
        let reach = PropertyAdder::new(&s).instrument_reachability(&mut ctx, &dest(&g)).unwrap();
        assert_eq!(reach["R1"].var_name(), Some("0__reachable_R1"));

        let mut m = Model::new();
        forwarding(&mut m);
        m.set("0__reachable-id_R2", Value::Int(1))
            .set("0__reachable_R2", Value::Bool(true))
            .set("0__reachable-id_R1", Value::Int(2))
            .set("0__reachable_R1", Value::Bool(true));
        assert!(holds(&ctx, before, &m));

        // R1 cannot claim the destination without forwarding to it
        m.set("0_DATA-FORWARDING_R1_eth0", Value::Bool(false));
        assert!(!holds(&ctx, before, &m));
        m.set("0__reachable-id_R1", Value::Int(0)).set("0__reachable_R1", Value::Bool(false));
        assert!(holds(&ctx, before, &m));
    }

    #[test]
    fn path_length_counts_hops() {
        let g = two_routers();
        let mut ctx = Context::new();
        let s = slice(&mut ctx, g.clone());
        let before = ctx.num_constraints();
        let lens = PropertyAdder::new(&s).instrument_path_length(&mut ctx, &dest(&g)).unwrap();
        assert_eq!(lens.len(), 2);

        let mut m = Model::new();
        forwarding(&mut m);
        m.set("0__path-length_R2", Value::Int(0)).set("0__path-length_R1", Value::Int(1));
        assert!(holds(&ctx, before, &m));
        m.set("0__path-length_R1", Value::Int(2));
        assert!(!holds(&ctx, before, &m));
    }

    #[test]
    fn load_sums_neighbors() {
        let g = two_routers();
        let mut ctx = Context::new();
        let s = slice(&mut ctx, g.clone());
        let before = ctx.num_constraints();
        PropertyAdder::new(&s).instrument_load(&mut ctx, &dest(&g)).unwrap();

        let mut m = Model::new();
        forwarding(&mut m);
        m.set("0__load_R2", Value::Int(1)).set("0__load_R1", Value::Int(1));
        assert!(holds(&ctx, before, &m));
        m.set("0_DATA-FORWARDING_R1_eth0", Value::Bool(false));
        assert!(!holds(&ctx, before, &m));
    }

    #[test]
    fn loop_between_two_routers() {
        let g = two_routers();
        let mut ctx = Context::new();
        let s = slice(&mut ctx, g);
        let before = ctx.num_constraints();
        let on_loop = PropertyAdder::new(&s).instrument_loop(&mut ctx, "R1").unwrap();
        assert_eq!(on_loop.var_name(), Some("0__on-loop_R1_R1"));

        let mut m = Model::new();
        m.set("0_DATA-FORWARDING_R1_eth0", Value::Bool(true))
            .set("0_DATA-FORWARDING_R2_eth0", Value::Bool(true))
            .set("0__on-loop_R1_R1", Value::Bool(true))
            .set("0__on-loop_R1_R2", Value::Bool(true));
        assert!(holds(&ctx, before, &m));
        m.set("0_DATA-FORWARDING_R2_eth0", Value::Bool(false));
        assert!(!holds(&ctx, before, &m));
    }

    #[test]
    fn all_equal_chains() {
        assert!(PropertyAdder::all_equal(&[]).is_true());
        assert!(PropertyAdder::all_equal(&[Expr::int(3)]).is_true());
        let e = PropertyAdder::all_equal(&[Expr::int(3), Expr::int(3), Expr::int(4)]);
        assert!(e.simplify().is_false());
    }
}
