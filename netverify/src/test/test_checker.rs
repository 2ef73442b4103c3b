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

//! Checks on small networks. The scenarios that need a real solver only run with the
//! `z3-solver` feature.

use crate::network::*;
use crate::properties::*;
use crate::smt::{FixedSolver, Model, SatAnswer};

fn tag() -> Community {
    Community::new(65000, 100)
}

/// R1 has a static default route towards R2, and R2 announces its LAN 10.0.0.0/24 to R1 over
/// eBGP. With `tagged`, R2 also peers with AS 3 over `eth2`, and its policy `TAG` adds 65000:100
/// to routes sent to R1 and to routes received from AS 3.
fn routers(tagged: bool) -> Vec<Configuration> {
    let mut r1 = Configuration::new("R1");
    r1.add_interface(Interface::new("eth0", "10.0.1.1/30".parse().unwrap()))
        .add_static_route(StaticRoute {
            network: "0.0.0.0/0".parse().unwrap(),
            next_hop_ip: Some("10.0.1.2".parse().unwrap()),
            next_hop_interface: None,
            admin_cost: 1,
        });
    r1.bgp = Some(
        BgpProcess::new("10.0.1.1".parse().unwrap())
            .neighbor(BgpNeighbor::new("10.0.1.2".parse().unwrap(), 1, 2)),
    );

    let mut r2 = Configuration::new("R2");
    r2.add_interface(Interface::new("eth0", "10.0.1.2/30".parse().unwrap()))
        .add_interface(Interface::new("eth1", "10.0.0.1/24".parse().unwrap()));
    let mut to_r1 = BgpNeighbor::new("10.0.1.1".parse().unwrap(), 2, 1);
    let mut bgp = BgpProcess::new("10.0.1.2".parse().unwrap()).network("10.0.0.0/24".parse().unwrap());
    if tagged {
        r2.add_interface(Interface::new("eth2", "172.16.0.1/30".parse().unwrap()))
            .add_policy(RoutingPolicy::new(
                "TAG",
                vec![Statement::AddCommunity(CommunitySetExpr::Literal(vec![tag()]))],
            ));
        to_r1 = to_r1.export_policy("TAG");
        bgp = bgp.neighbor(BgpNeighbor::new("172.16.0.2".parse().unwrap(), 2, 3).import_policy("TAG"));
    }
    r2.bgp = Some(bgp.neighbor(to_r1));
    vec![r1, r2]
}

fn network() -> Graph {
    Graph::new(routers(false), None).unwrap()
}

#[test]
fn satisfiable_forwarding_is_reported() {
    let mut checker = PropertyChecker::new(network(), FixedSolver::new(SatAnswer::Sat(Model::new())));
    let answer = checker.check_forwarding(&HeaderQuestion::default()).unwrap();
    assert!(!answer.result.verified);
    assert!(answer.result.failures.is_empty());
}

#[test]
fn unsatisfiable_checks_are_verified() {
    let mut checker = PropertyChecker::new(network(), FixedSolver::new(SatAnswer::Unsat));
    let q = HeaderQuestion::default();
    assert!(checker.check_black_hole(&q).unwrap().result.verified);
    assert!(checker.check_routing_loop(&q).unwrap().result.verified);
    let answer = checker.check_determinism(&q).unwrap();
    assert!(answer.result.verified);
    assert!(answer.flow.is_none());
    let q = HeaderLocationQuestion::new("R1", "R2", "eth1");
    let answer = checker.check_reachability(&q).unwrap();
    assert!(answer.result.verified);
    assert!(answer.flow_history.is_none());
    assert!(checker.check_bounded_length(&q).unwrap().result.verified);
}

#[test]
fn unknown_answers_are_errors() {
    let mut checker =
        PropertyChecker::new(network(), FixedSolver::new(SatAnswer::Unknown("timeout".to_string())));
    assert!(checker.check_forwarding(&HeaderQuestion::default()).is_err());
}

#[cfg(feature = "z3-solver")]
mod with_z3 {
    use super::*;
    use crate::counterexample::{CounterExample, FlowDisposition};
    use crate::encoder::Encoder;
    use crate::smt::{Context, Z3Solver};
    use maplit::btreeset;
    use std::rc::Rc;

    fn checker() -> PropertyChecker<Z3Solver> {
        let _ = pretty_env_logger::try_init();
        PropertyChecker::new(network(), Z3Solver::new())
    }

    #[test]
    fn reachable_without_failures() {
        let q = HeaderLocationQuestion::new("R1", "R2", "eth1");
        assert_eq!(q.header.failures, 0);
        let answer = checker().check_reachability(&q).unwrap();
        assert!(answer.result.verified);
        assert!(answer.flow_history.is_none());
    }

    #[test]
    fn single_link_failure_disconnects() {
        let mut q = HeaderLocationQuestion::new("R1", "R2", "eth1");
        q.header.failures = 1;
        let answer = checker().check_reachability(&q).unwrap();
        assert!(!answer.result.verified);
        assert_eq!(answer.result.failures, btreeset! {"link(R1,R2)".to_string()});

        let history = answer.flow_history.unwrap();
        assert_eq!(history.len(), 1);
        let entry = &history.traces[0];
        assert_eq!(entry.flow.ingress_node, "R1");
        let failed: Vec<(&str, &str)> = entry
            .environment
            .failed_links
            .iter()
            .map(|l| (l.node1.as_str(), l.node2.as_str()))
            .collect();
        assert_eq!(failed, vec![("R1", "R2")]);
        assert!(matches!(
            entry.trace.disposition,
            FlowDisposition::NeighborUnreachableOrExitsNetwork | FlowDisposition::NoRoute
        ));
    }

    #[test]
    fn bounded_length() {
        let mut q = HeaderLocationQuestion::new("R1", "R2", "eth1");
        q.bound = 1;
        assert!(checker().check_bounded_length(&q).unwrap().result.verified);
        q.bound = 0;
        assert!(!checker().check_bounded_length(&q).unwrap().result.verified);
    }

    #[test]
    fn no_loops_and_deterministic() {
        let q = HeaderQuestion::default();
        assert!(checker().check_routing_loop(&q).unwrap().result.verified);
        assert!(checker().check_determinism(&q).unwrap().result.verified);
    }

    #[test]
    fn environment_routes_carry_the_exported_tag() {
        let _ = pretty_env_logger::try_init();
        let mut ctx = Context::new();
        let mut q = HeaderQuestion::default();
        q.header_space.dst_ips = vec!["8.8.8.0/24".parse().unwrap()];
        let graph = Graph::new(routers(true), None).unwrap();
        let enc = Encoder::new(&mut ctx, Rc::new(graph), q).unwrap();
        enc.compute_encoding(&mut ctx).unwrap();

        // R2 uses the route of AS 3, and R1 learns it from R2
        let ext = enc.graph().edges("R2").iter().find(|ge| ge.start.name == "eth2").unwrap().clone();
        let fwd = enc.main_slice().decisions().control_forwarding(&ext).unwrap().clone();
        ctx.add(fwd);
        let r1_bgp = enc.main_slice().best_vars("R1", Protocol::Bgp).unwrap().clone();
        ctx.add(r1_bgp.permitted.clone());

        let (result, model) = enc.verify(&mut ctx, &mut Z3Solver::new()).unwrap();
        assert!(!result.verified);
        let model = model.unwrap();

        let routes = CounterExample::new(&model).build_env_routing_table(&enc).unwrap();
        assert_eq!(routes.len(), 1);
        let route = routes.iter().next().unwrap();
        assert_eq!(route.src_node, "as3");
        assert_eq!(route.dst_node, "R2");
        assert_eq!(route.communities, btreeset! {tag()});

        let sent = &r1_bgp.communities[&CommunityVar::exact(tag())];
        assert!(model.eval_bool(sent).unwrap());
    }
}
