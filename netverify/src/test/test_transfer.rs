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

//! Policies compiled by the transfer function, evaluated on hand-written assignments. R1 has a
//! single eBGP session towards an external peer, so the environment route and the import record
//! of that session track the same attributes, and the all-zero assignment relates them.

use crate::encoder::{Encoder, EncodingError, SliceEnv, SymbolicRoute, TransferFunction};
use crate::network::*;
use crate::properties::HeaderQuestion;
use crate::smt::{Context, Expr, Model, Term, Value};
use std::rc::Rc;

fn community() -> Community {
    Community::new(65000, 100)
}

fn external_peer(send_community: bool) -> Graph {
    Graph::new(vec![peer_config(send_community)], None).unwrap()
}

fn peer_config(send_community: bool) -> Configuration {
    let mut r1 = Configuration::new("R1");
    r1.add_interface(Interface::new("eth0", "10.0.0.1/30".parse().unwrap()));
    r1.add_policy(RoutingPolicy::new(
        "IN",
        vec![Statement::if_then_else(
            BooleanExpr::MatchCommunitySet(CommunitySetExpr::Literal(vec![community()])),
            vec![Statement::SetLocalPreference(LongExpr::Literal(200))],
            vec![Statement::PrependAsPath(AsPathListExpr::Multiplied { as_number: 1, count: 2 })],
        )],
    ));
    let mut neighbor = BgpNeighbor::new("10.0.0.2".parse().unwrap(), 1, 2).import_policy("IN");
    neighbor.send_community = send_community;
    r1.bgp = Some(BgpProcess::new("10.0.0.1".parse().unwrap()).neighbor(neighbor));
    r1
}

struct Fixture {
    ctx: Context,
    enc: Encoder,
}

impl Fixture {
    fn new(send_community: bool) -> Self {
        Self::with(external_peer(send_community), HeaderQuestion::default())
    }

    fn with(graph: Graph, question: HeaderQuestion) -> Self {
        let mut ctx = Context::new();
        let enc = Encoder::new(&mut ctx, Rc::new(graph), question).unwrap();
        Self { ctx, enc }
    }

    /// Environment route and the import record it is received into
    fn records(&self) -> (SymbolicRoute, SymbolicRoute) {
        let lg = self.enc.main_slice().logical_graph();
        let (id, env) = lg.environment_vars().iter().next().unwrap();
        let import = lg.get(id).unwrap();
        (env.clone(), import.route.clone())
    }

    /// Compile `statements` on the eBGP edge, transforming `other` into `current`.
    fn compile(&mut self, statements: &[Statement], is_export: bool) -> Result<Expr, EncodingError> {
        self.compile_with(statements, is_export, usize::MAX)
    }

    /// Like `compile`, but terms larger than `limit` are bound to SSA variables.
    fn compile_with(
        &mut self,
        statements: &[Statement],
        is_export: bool,
        limit: usize,
    ) -> Result<Expr, EncodingError> {
        let (other, current) = self.records();
        let lg = self.enc.main_slice().logical_graph();
        let (id, _) = lg.environment_vars().iter().next().unwrap();
        let edge = id.edge.clone();
        let env = SliceEnv {
            failures: self.enc.failures(),
            slices: self.enc.slices(),
            slice_reachability: self.enc.slice_reachability(),
            question: self.enc.question(),
            model_igp: true,
        };
        let slice = self.enc.main_slice();
        let conf = self.enc.graph().config("R1").unwrap();
        TransferFunction::new(
            slice,
            &env,
            conf,
            &other,
            &current,
            Protocol::Bgp,
            statements,
            0,
            &edge,
            is_export,
        )
        .inline_limit(limit)
        .compute(&mut self.ctx)
    }

    fn policy(&self) -> Vec<Statement> {
        self.enc.graph().config("R1").unwrap().routing_policies["IN"].statements.clone()
    }
}

fn name(e: &Expr) -> String {
    e.var_name().unwrap().to_string()
}

/// Extend `m` with the values of all SSA variables defined since assertion `from`.
fn with_definitions(ctx: &Context, from: usize, m: &Model) -> Model {
    let mut m = m.clone();
    for a in &ctx.assertions()[from..] {
        match a.term() {
            Term::Eq(v, e) => {
                let value = m.eval(e).unwrap();
                m.set(name(v), value);
            }
            Term::Var(n, _) => {
                m.set(n.clone(), Value::Bool(true));
            }
            Term::Not(v) => {
                m.set(name(v), Value::Bool(false));
            }
            t => panic!("unexpected definition {:?}", t),
        }
    }
    m
}

/// Both routes permitted, all other attributes zero.
fn permitted(other: &SymbolicRoute, current: &SymbolicRoute) -> Model {
    let mut m = Model::new();
    m.set(name(&other.permitted), Value::Bool(true)).set(name(&current.permitted), Value::Bool(true));
    m
}

#[test]
fn branches_join_into_one_route() {
    let mut f = Fixture::new(true);
    let policy = f.policy();
    let e = f.compile(&policy, false).unwrap();
    let (other, current) = f.records();
    let c = CommunityVar::exact(community());
    let lp = |r: &SymbolicRoute| name(r.local_pref.as_ref().unwrap());

    // tagged routes get the local preference, the metric is kept
    let mut m = permitted(&other, &current);
    m.set(name(&other.communities[&c]), Value::Bool(true))
        .set(name(&current.communities[&c]), Value::Bool(true))
        .set(lp(&other), Value::Int(100))
        .set(lp(&current), Value::Int(200))
        .set(name(&other.metric), Value::Int(3))
        .set(name(&current.metric), Value::Int(3));
    assert!(m.eval_bool(&e).unwrap());
    m.set(lp(&current), Value::Int(100));
    assert!(!m.eval_bool(&e).unwrap());

    // untagged routes keep the local preference, the path grows by two
    let mut m = permitted(&other, &current);
    m.set(lp(&other), Value::Int(100))
        .set(lp(&current), Value::Int(100))
        .set(name(&other.metric), Value::Int(3))
        .set(name(&current.metric), Value::Int(5));
    assert!(m.eval_bool(&e).unwrap());
    m.set(name(&current.metric), Value::Int(3));
    assert!(!m.eval_bool(&e).unwrap());
    m.set(name(&current.metric), Value::Int(5)).set(lp(&current), Value::Int(200));
    assert!(!m.eval_bool(&e).unwrap());
}

#[test]
fn rejected_routes_are_not_permitted() {
    let mut f = Fixture::new(true);
    let e = f.compile(&[Statement::ExitReject], false).unwrap();
    let (other, current) = f.records();
    let m = permitted(&other, &current);
    assert!(!m.eval_bool(&e).unwrap());
    let mut m = Model::new();
    m.set(name(&other.permitted), Value::Bool(true));
    assert!(m.eval_bool(&e).unwrap());
}

#[test]
fn communities_are_sent_when_enabled() {
    let c = CommunityVar::exact(community());

    let mut f = Fixture::new(true);
    let e = f.compile(&[], true).unwrap();
    let (other, current) = f.records();
    let mut m = permitted(&other, &current);
    m.set(name(&other.communities[&c]), Value::Bool(true));
    assert!(!m.eval_bool(&e).unwrap());
    m.set(name(&current.communities[&c]), Value::Bool(true));
    assert!(m.eval_bool(&e).unwrap());

    let mut f = Fixture::new(false);
    let e = f.compile(&[], true).unwrap();
    let (other, current) = f.records();
    let mut m = permitted(&other, &current);
    m.set(name(&other.communities[&c]), Value::Bool(true));
    assert!(m.eval_bool(&e).unwrap());
    m.set(name(&current.communities[&c]), Value::Bool(true));
    assert!(!m.eval_bool(&e).unwrap());
}

#[test]
fn added_communities_are_set() {
    let c = CommunityVar::exact(community());
    let mut f = Fixture::new(true);
    let e = f
        .compile(&[Statement::AddCommunity(CommunitySetExpr::Literal(vec![community()]))], false)
        .unwrap();
    let (other, current) = f.records();
    let mut m = permitted(&other, &current);
    assert!(!m.eval_bool(&e).unwrap());
    m.set(name(&current.communities[&c]), Value::Bool(true));
    assert!(m.eval_bool(&e).unwrap());
}

#[test]
fn unsupported_constructs_are_errors() {
    let mut f = Fixture::new(true);
    assert!(matches!(
        f.compile(&[Statement::SetTag(5)], false),
        Err(EncodingError::UnsupportedConstruct { router, direction: "import", .. }) if router == "R1"
    ));
    // ignored with a warning
    assert!(f.compile(&[Statement::SetOrigin("igp".to_string())], false).is_ok());
}

#[test]
fn empty_first_match_chain_is_an_error() {
    let mut f = Fixture::new(true);
    let stmt = Statement::if_then_else(BooleanExpr::FirstMatchChain(vec![]), vec![], vec![]);
    assert!(matches!(
        f.compile(&[stmt], false),
        Err(EncodingError::EmptyFirstMatchChain(router)) if router == "R1"
    ));
}

#[test]
fn inlining_does_not_change_verdicts() {
    let mut inlined = Fixture::new(true);
    let policy = inlined.policy();
    let e_inlined = inlined.compile(&policy, false).unwrap();

    let mut ssa = Fixture::new(true);
    let from = ssa.ctx.num_constraints();
    let e_ssa = ssa.compile_with(&policy, false, 0).unwrap();
    assert!(ssa.ctx.variables().any(|(n, _)| n.starts_with("SSA_")));
    assert!(ssa.ctx.num_constraints() > from);

    let (other, current) = inlined.records();
    let c = CommunityVar::exact(community());
    let lp = |r: &SymbolicRoute| name(r.local_pref.as_ref().unwrap());
    let mut accepted = 0;
    for tagged in [false, true] {
        for cur_lp in [100, 200] {
            for cur_metric in [3, 5] {
                for cur_permitted in [false, true] {
                    let mut m = Model::new();
                    m.set(name(&other.permitted), Value::Bool(true))
                        .set(name(&current.permitted), Value::Bool(cur_permitted))
                        .set(name(&other.communities[&c]), Value::Bool(tagged))
                        .set(name(&current.communities[&c]), Value::Bool(tagged))
                        .set(lp(&other), Value::Int(100))
                        .set(lp(&current), Value::Int(cur_lp))
                        .set(name(&other.metric), Value::Int(3))
                        .set(name(&current.metric), Value::Int(cur_metric));
                    let verdict = m.eval_bool(&e_inlined).unwrap();
                    let full = with_definitions(&ssa.ctx, from, &m);
                    assert_eq!(full.eval_bool(&e_ssa).unwrap(), verdict);
                    if verdict && cur_permitted {
                        accepted += 1;
                    }
                }
            }
        }
    }
    // one accepted assignment per branch
    assert_eq!(accepted, 2);
}

#[test]
fn community_fields_ending_in_digits_get_distinct_variables() {
    let mut r1 = peer_config(true);
    let tags = vec![Community::new(65000, 1), Community::new(65000, 12)];
    r1.add_policy(RoutingPolicy::new(
        "TAGS",
        vec![Statement::AddCommunity(CommunitySetExpr::Literal(tags.clone()))],
    ));
    let mut f = Fixture::with(Graph::new(vec![r1], None).unwrap(), HeaderQuestion::default());
    let statements = f.enc.graph().config("R1").unwrap().routing_policies["TAGS"].statements.clone();

    let vars_before = f.ctx.num_variables();
    let from = f.ctx.num_constraints();
    let e = f.compile_with(&statements, false, 0).unwrap();

    // every binding introduced a new variable
    let ssa: Vec<String> = f
        .ctx
        .variables()
        .skip(vars_before)
        .map(|(n, _)| n.to_string())
        .filter(|n| n.starts_with("SSA_"))
        .collect();
    assert_eq!(ssa.len(), f.ctx.num_constraints() - from);
    assert!(ssa.iter().any(|n| n.starts_with("SSA_65000:1_")));
    assert!(ssa.iter().any(|n| n.starts_with("SSA_65000:12_")));

    // both tags are attached to the accepted route
    let (other, current) = f.records();
    let mut m = permitted(&other, &current);
    for t in tags {
        m.set(name(&current.communities[&CommunityVar::exact(t)]), Value::Bool(true));
    }
    assert!(with_definitions(&f.ctx, from, &m).eval_bool(&e).unwrap());
}

#[test]
fn metric_overflow_rejects_the_route() {
    let question = HeaderQuestion { model_overflow: true, ..HeaderQuestion::default() };
    let mut f = Fixture::with(external_peer(true), question);
    let e = f.compile(&[], false).unwrap();
    let (other, current) = f.records();

    let mut m = permitted(&other, &current);
    m.set(name(&other.metric), Value::Int(200)).set(name(&current.metric), Value::Int(200));
    assert!(m.eval_bool(&e).unwrap());

    m.set(name(&other.metric), Value::Int(300)).set(name(&current.metric), Value::Int(300));
    assert!(!m.eval_bool(&e).unwrap());
    m.set(name(&current.permitted), Value::Bool(false));
    assert!(m.eval_bool(&e).unwrap());

    // without overflow modeling, long paths are accepted
    let mut f = Fixture::new(true);
    let e = f.compile(&[], false).unwrap();
    let mut m = permitted(&other, &current);
    m.set(name(&other.metric), Value::Int(300)).set(name(&current.metric), Value::Int(300));
    assert!(m.eval_bool(&e).unwrap());
}
