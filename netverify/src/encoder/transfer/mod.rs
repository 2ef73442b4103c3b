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

//! # Transfer Function
//!
//! Compiles the statements of a routing policy into a single formula relating the route sent by
//! the neighbor (`other`) to the route after the policy (`current`). Statements are evaluated on
//! a working copy of the input route. Every update creates a new version of the field (either an
//! inlined term, or a fresh `SSA_` variable for large terms). Both branches of a conditional are
//! evaluated on separate copies, and the fields changed by either branch are merged with an
//! if-then-else on the guard.

mod param;

pub use param::{CallContext, ChainContext, Field, TransferParam, TransferResult};

use super::slice::{default_admin_distance, default_med, equal_histories, EncoderSlice, SliceEnv};
use super::slice::DEFAULT_LOCAL_PREF;
use super::symbolic_enum::{SymbolicEnum, SymbolicOspfType};
use super::symbolic_route::SymbolicRoute;
use super::EncodingError;
use crate::network::community::collect_community_vars;
use crate::network::{
    BgpSendType, BooleanExpr, CommunitySetExpr, Configuration, Graph, GraphEdge, LongExpr, NetworkError,
    OspfMetricType, OspfType, PrefixRange, PrefixSetExpr, Protocol, Statement,
};
use crate::smt::{Context, Expr};

use log::*;
use std::collections::BTreeSet;
use std::fmt::{Debug, Display};

/// Terms whose serialization is at most this long are inlined instead of bound to a fresh
/// variable.
pub const INLINE_LIMIT: usize = 3000;

/// Transfer function of one logical edge.
#[derive(Debug)]
pub struct TransferFunction<'a> {
    slice: &'a EncoderSlice,
    env: &'a SliceEnv<'a>,
    conf: &'a Configuration,
    other: &'a SymbolicRoute,
    current: &'a SymbolicRoute,
    proto: Protocol,
    statements: &'a [Statement],
    cost: i64,
    edge: &'a GraphEdge,
    is_export: bool,
    inline_limit: usize,
}

fn safe_eq(x: Option<&Expr>, value: &Expr) -> Expr {
    match x {
        Some(x) => x.equals(value),
        None => Expr::tru(),
    }
}

fn safe_eq_enum<T>(x: Option<&SymbolicEnum<T>>, y: Option<&SymbolicEnum<T>>) -> Expr
where
    T: Clone + PartialEq + Debug + Display,
{
    match (x, y) {
        (Some(x), Some(y)) => x.mk_eq(y),
        _ => Expr::tru(),
    }
}

fn apply_long_expr(x: &Expr, e: &LongExpr) -> Expr {
    match e {
        LongExpr::Literal(v) => Expr::int(*v),
        LongExpr::Increment(v) => x.add(&Expr::int(*v)),
        LongExpr::Decrement(v) => x.sub(&Expr::int(*v)),
    }
}

fn field_value(data: &SymbolicRoute, f: &Field) -> Option<Expr> {
    match f {
        Field::Return | Field::Fallthrough => None,
        Field::Metric => Some(data.metric.clone()),
        Field::PrefixLen => Some(data.prefix_length.clone()),
        Field::LocalPref => data.local_pref.clone(),
        Field::OspfType => data.ospf_type.as_ref().map(|t| t.bitvec().clone()),
        Field::Community(c) => data.communities.get(c).cloned(),
    }
}

fn set_field(data: &mut SymbolicRoute, f: &Field, e: Expr) {
    match f {
        Field::Return | Field::Fallthrough => {}
        Field::Metric => data.metric = e,
        Field::PrefixLen => data.prefix_length = e,
        Field::LocalPref => data.local_pref = Some(e),
        Field::OspfType => {
            if let Some(t) = data.ospf_type.as_mut() {
                t.set_bitvec(e)
            }
        }
        Field::Community(c) => {
            data.communities.insert(c.clone(), e);
        }
    }
}

impl<'a> TransferFunction<'a> {
    /// Prepare the transfer function of `edge` for the protocol `proto`. `cost` is added to the
    /// metric when importing OSPF routes or exporting BGP routes.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        slice: &'a EncoderSlice,
        env: &'a SliceEnv<'a>,
        conf: &'a Configuration,
        other: &'a SymbolicRoute,
        current: &'a SymbolicRoute,
        proto: Protocol,
        statements: &'a [Statement],
        cost: i64,
        edge: &'a GraphEdge,
        is_export: bool,
    ) -> Self {
        Self {
            slice,
            env,
            conf,
            other,
            current,
            proto,
            statements,
            cost,
            edge,
            is_export,
            inline_limit: INLINE_LIMIT,
        }
    }

    /// Change the size up to which terms are inlined
    pub fn inline_limit(mut self, limit: usize) -> Self {
        self.inline_limit = limit;
        self
    }

    /// Compile the policy. The resulting formula holds if `current` is the result of applying
    /// the policy to `other`, or `current` is not permitted if the policy rejects the route.
    pub fn compute(&self, ctx: &mut Context) -> Result<Expr, EncodingError> {
        debug!(
            "{} transfer function of {} on {} ({} statements)",
            if self.is_export { "Export" } else { "Import" },
            self.proto,
            self.edge,
            self.statements.len()
        );
        let mut data = self.other.clone();
        let p = TransferParam::default();
        self.compute_intermediate_prefix_len(ctx, &mut data)?;
        self.apply_metric_update(&mut data)?;
        if data.local_pref.is_none() {
            data.local_pref = Some(Expr::int(DEFAULT_LOCAL_PREF));
        }
        let result = self.compute_statements(ctx, self.statements, &p, &mut data, TransferResult::initial())?;
        Ok(result.return_value)
    }

    fn direction(&self) -> &'static str {
        if self.is_export {
            "export"
        } else {
            "import"
        }
    }

    fn unsupported(&self, construct: String) -> EncodingError {
        EncodingError::UnsupportedConstruct {
            construct,
            router: self.conf.hostname.clone(),
            proto: self.proto,
            direction: self.direction(),
            edge: self.edge.to_string(),
        }
    }

    /// Inline `e` if it is small, otherwise bind it to a fresh variable.
    fn create_var(&self, ctx: &mut Context, name: &str, e: Expr) -> Result<Expr, EncodingError> {
        let e = e.simplify();
        if e.serialized_len_within(self.inline_limit) {
            return Ok(e);
        }
        let var_name = format!("SSA_{}_{}", name, ctx.generate_id());
        let v = ctx.mk_fresh_var(var_name, e.sort())?;
        ctx.add(v.equals(&e));
        Ok(v)
    }

    /// The destination of the packet lies in the range, and the length matches.
    fn is_relevant_for(&self, len: &Expr, range: &PrefixRange) -> Expr {
        let lower = range.length_range.start as i64;
        let upper = range.length_range.end as i64;
        let in_prefix = super::acl::first_bits_equal(&self.slice.packet().dst_ip, &range.prefix);
        let in_len = if lower == upper {
            len.equals(&Expr::int(lower))
        } else {
            Expr::int(lower).le(len).and(&len.le(&Expr::int(upper)))
        };
        in_prefix.and(&in_len)
    }

    fn compute_intermediate_prefix_len(
        &self,
        ctx: &mut Context,
        data: &mut SymbolicRoute,
    ) -> Result<(), EncodingError> {
        if !(self.is_export && self.proto.is_bgp()) {
            return Ok(());
        }
        let router = &self.conf.hostname;
        let opts = self.slice.optimizations();
        let aggregates = opts.relevant_aggregates(router);
        if aggregates.is_empty() {
            return Ok(());
        }
        let mut prefix_len = data.prefix_length.clone();
        for gr in aggregates {
            let len = Expr::int(gr.network.len() as i64);
            let relevant_pfx = super::acl::first_bits_equal(&self.slice.packet().dst_ip, &gr.network);
            let relevant_len = data.prefix_length.gt(&len);
            let suppressed = Expr::bool(opts.is_suppressed_aggregate(router, &gr.network));
            let relevant = Expr::and_all(vec![relevant_pfx, relevant_len, suppressed]);
            prefix_len = Expr::ite(&relevant, &len, &prefix_len);
        }
        data.prefix_length = self.create_var(ctx, &Field::PrefixLen.to_string(), prefix_len)?;
        Ok(())
    }

    fn apply_metric_update(&self, data: &mut SymbolicRoute) -> Result<(), EncodingError> {
        let update_ospf = !self.is_export && self.proto.is_ospf();
        let update_bgp = self.is_export && self.proto.is_bgp();
        if !(update_ospf || update_bgp) {
            return Ok(());
        }
        let cost = Expr::int(self.cost);
        let sum = data.metric.add(&cost);
        data.metric = if self.proto.is_bgp() {
            // routes redistributed from an IGP start with the cost only
            let is_bgp = match &self.other.protocol_history {
                Some(h) => h.check_if_value(&Protocol::Bgp)?,
                None => {
                    Expr::bool(self.slice.optimizations().has_single_protocol(&self.conf.hostname))
                }
            };
            Expr::ite(&is_bgp, &sum, &cost)
        } else {
            sum
        };
        Ok(())
    }

    fn return_value(
        &self,
        ctx: &mut Context,
        mut r: TransferResult,
        val: Expr,
    ) -> Result<TransferResult, EncodingError> {
        let b = Expr::ite(&r.return_assigned, &r.return_value, &val);
        let new_ret = self.create_var(ctx, "RETURN", b)?;
        r.return_value = new_ret.clone();
        r.return_assigned = Expr::tru();
        r.add_changed(Field::Return, new_ret);
        Ok(r)
    }

    fn fallthrough(
        &self,
        ctx: &mut Context,
        mut r: TransferResult,
    ) -> Result<TransferResult, EncodingError> {
        let b = Expr::ite(&r.return_assigned, &r.fallthrough_value, &Expr::tru());
        let new_ft = self.create_var(ctx, "FALLTHROUGH", b)?;
        r.fallthrough_value = new_ft.clone();
        r.return_assigned = Expr::tru();
        r.add_changed(Field::Fallthrough, new_ft);
        Ok(r)
    }

    /// Update a field of the working route, unless the policy already returned.
    fn update_field(
        &self,
        ctx: &mut Context,
        r: &mut TransferResult,
        data: &mut SymbolicRoute,
        f: Field,
        value: Expr,
    ) -> Result<(), EncodingError> {
        if let Some(old) = field_value(data, &f) {
            let new = Expr::ite(&r.return_assigned, &old, &value);
            let x = self.create_var(ctx, &f.to_string(), new)?;
            set_field(data, &f, x.clone());
            r.add_changed(f, x);
        }
        Ok(())
    }

    fn compute_all(
        &self,
        ctx: &mut Context,
        exprs: &[BooleanExpr],
        p: &TransferParam,
        data: &mut SymbolicRoute,
        conjunction: bool,
    ) -> Result<TransferResult, EncodingError> {
        let mut result = TransferResult::initial();
        let mut terms = Vec::with_capacity(exprs.len());
        for e in exprs {
            let r = self.compute_expr(ctx, e, &p.indent(), data)?;
            result.merge_changed(&r, false);
            terms.push(r.return_value);
        }
        result.return_value = if conjunction { Expr::and_all(terms) } else { Expr::or_all(terms) };
        result.return_assigned = Expr::tru();
        Ok(result)
    }

    fn compute_chain(
        &self,
        ctx: &mut Context,
        exprs: &[BooleanExpr],
        p: &TransferParam,
        data: &mut SymbolicRoute,
    ) -> Result<TransferResult, EncodingError> {
        let mut param = p.indent();
        param.default_policy = None;
        param.chain_context = ChainContext::Conjunction;
        let mut result = TransferResult::initial();
        let mut acc = Expr::fls();
        for e in exprs.iter().rev() {
            let r = self.compute_expr(ctx, e, &param, data)?;
            result.merge_changed(&r, false);
            acc = Expr::ite(&r.fallthrough_value, &acc, &r.return_value);
        }
        result.return_value = acc;
        result.return_assigned = Expr::tru();
        Ok(result)
    }

    /// Subroutines of a chain, followed by the default policy, if set.
    fn chain_with_default(&self, exprs: &[BooleanExpr], p: &TransferParam) -> Vec<BooleanExpr> {
        let mut subs = exprs.to_vec();
        if let Some(dp) = &p.default_policy {
            subs.push(BooleanExpr::CallExpr(dp.clone()));
        }
        subs
    }

    fn compute_expr(
        &self,
        ctx: &mut Context,
        expr: &BooleanExpr,
        p: &TransferParam,
        data: &mut SymbolicRoute,
    ) -> Result<TransferResult, EncodingError> {
        match expr {
            BooleanExpr::True => Ok(TransferResult::from_expr(Expr::tru())),
            BooleanExpr::False => Ok(TransferResult::from_expr(Expr::fls())),
            BooleanExpr::MatchIpv4 => Ok(TransferResult::from_expr(Expr::tru())),
            BooleanExpr::MatchIpv6 | BooleanExpr::MatchPrefix6Set => {
                warn!("IPv6 match on router {} is treated as false", self.conf.hostname);
                Ok(TransferResult::from_expr(Expr::fls()))
            }
            BooleanExpr::Conjunction(xs) => self.compute_all(ctx, xs, p, data, true),
            BooleanExpr::Disjunction(xs) => self.compute_all(ctx, xs, p, data, false),
            BooleanExpr::ConjunctionChain(xs) => {
                let subs = self.chain_with_default(xs, p);
                if subs.is_empty() {
                    return Ok(TransferResult::from_expr(Expr::tru()));
                }
                self.compute_chain(ctx, &subs, p, data)
            }
            BooleanExpr::FirstMatchChain(xs) => {
                let subs = self.chain_with_default(xs, p);
                if subs.is_empty() {
                    return Err(EncodingError::EmptyFirstMatchChain(self.conf.hostname.clone()));
                }
                self.compute_chain(ctx, &subs, p, data)
            }
            BooleanExpr::Not(x) => {
                let mut r = self.compute_expr(ctx, x, &p.indent(), data)?;
                r.return_value = r.return_value.not();
                Ok(r)
            }
            BooleanExpr::MatchProtocol(ps) => {
                if ps.len() > 1 {
                    let single: Vec<BooleanExpr> =
                        ps.iter().map(|rp| BooleanExpr::MatchProtocol(vec![*rp])).collect();
                    return self.compute_all(ctx, &single, p, data, false);
                }
                let proto = match ps.first().and_then(|rp| rp.to_protocol()) {
                    Some(proto) => proto,
                    None => return Ok(TransferResult::from_expr(Expr::fls())),
                };
                let m = match &self.other.protocol_history {
                    None => Expr::bool(proto == self.proto),
                    Some(h) if h.domain().contains(&proto) => h.check_if_value(&proto)?,
                    Some(_) => Expr::fls(),
                };
                p.log(format!("MatchProtocol({}): {}", proto, m));
                Ok(TransferResult::from_expr(m))
            }
            BooleanExpr::MatchPrefixSet(ps) => {
                let mut r = self.match_prefix_set(ctx, ps, data)?;
                r.return_assigned = Expr::tru();
                Ok(r)
            }
            BooleanExpr::CallExpr(name) => {
                let policy = self.conf.routing_policies.get(name).ok_or_else(|| {
                    NetworkError::PolicyNotFound(self.conf.hostname.clone(), name.clone())
                })?;
                p.log(format!("CallExpr({})", name));
                let mut cp = p.indent();
                cp.call_context = CallContext::ExprCall;
                self.compute_statements(ctx, &policy.statements, &cp, data, TransferResult::initial())
            }
            BooleanExpr::WithEnvironment(x) => self.compute_expr(ctx, x, p, data),
            BooleanExpr::MatchCommunitySet(cs) => {
                Ok(TransferResult::from_expr(self.match_community_set(cs, data)?))
            }
            BooleanExpr::CallExprContext => {
                Ok(TransferResult::from_expr(Expr::bool(p.call_context == CallContext::ExprCall)))
            }
            // policies are never called as statements
            BooleanExpr::CallStatementContext => Ok(TransferResult::from_expr(Expr::fls())),
            BooleanExpr::MatchAsPath(regex) => {
                warn!(
                    "AS path match {} on router {} is treated as false",
                    regex, self.conf.hostname
                );
                Ok(TransferResult::from_expr(Expr::fls()))
            }
            BooleanExpr::MatchSrcInterface(_) | BooleanExpr::PermittedByAcl(_) | BooleanExpr::MatchTag(_) => {
                Err(self.unsupported(format!("{:?}", expr)))
            }
        }
    }

    fn match_prefix_set(
        &self,
        ctx: &mut Context,
        e: &PrefixSetExpr,
        data: &mut SymbolicRoute,
    ) -> Result<TransferResult, EncodingError> {
        let other_len = data.prefix_length.clone();
        let mut result = TransferResult::initial();
        match e {
            PrefixSetExpr::Explicit(ranges) => {
                if ranges.is_empty() {
                    result.return_value = Expr::tru();
                    return Ok(result);
                }
                // A BGP network statement only announces the prefix if a matching IGP route
                // exists, so check for the originating route itself.
                if let [r] = ranges.as_slice() {
                    let pfx = r.prefix;
                    let exact = r.length_range.start == r.length_range.end
                        && r.length_range.start == pfx.len() as u32;
                    if exact && Graph::originated_networks(self.conf, Protocol::Bgp).contains(&pfx) {
                        let origin_len = Expr::int(pfx.len() as i64);
                        let direct = Graph::originated_networks(self.conf, Protocol::Static).contains(&pfx)
                            || Graph::originated_networks(self.conf, Protocol::Connected).contains(&pfx);
                        let router = &self.conf.hostname;
                        let relevant = if direct {
                            Some(self.is_relevant_for(&origin_len, r))
                        } else {
                            self.slice
                                .decisions()
                                .best_neighbor_per_protocol
                                .get(router)
                                .and_then(|m| m.get(&Protocol::Ospf))
                                .map(|rec| self.is_relevant_for(&rec.prefix_length, r))
                        };
                        if let Some(relevant) = relevant {
                            let new_len = Expr::ite(&relevant, &origin_len, &other_len);
                            let x = self.create_var(ctx, &Field::PrefixLen.to_string(), new_len)?;
                            data.prefix_length = x.clone();
                            result.add_changed(Field::PrefixLen, x);
                            result.return_value = relevant;
                            return Ok(result);
                        }
                    }
                }
                result.return_value =
                    Expr::or_all(ranges.iter().map(|r| self.is_relevant_for(&other_len, r)));
                Ok(result)
            }
            PrefixSetExpr::Named(name) => {
                let rfl = self.conf.route_filter_lists.get(name).ok_or_else(|| {
                    NetworkError::RouteFilterListNotFound(self.conf.hostname.clone(), name.clone())
                })?;
                let mut acc = Expr::fls();
                for line in rfl.lines.iter().rev() {
                    let m = self.is_relevant_for(&other_len, &line.range);
                    acc = Expr::ite(&m, &Expr::bool(line.action.is_permit()), &acc);
                }
                result.return_value = acc;
                Ok(result)
            }
        }
    }

    fn match_community_set(&self, e: &CommunitySetExpr, data: &SymbolicRoute) -> Result<Expr, EncodingError> {
        match e {
            CommunitySetExpr::Literal(_) => {
                let comms = collect_community_vars(self.conf, e)?;
                Ok(Expr::and_all(comms.iter().map(|c| data.community(c))))
            }
            CommunitySetExpr::Named(name) => {
                let cl = self.conf.community_lists.get(name).ok_or_else(|| {
                    NetworkError::CommunityListNotFound(self.conf.hostname.clone(), name.clone())
                })?;
                let mut acc = Expr::fls();
                for line in cl.lines.iter().rev() {
                    let c = data.community(&line.matcher.to_community_var());
                    acc = Expr::ite(&c, &Expr::bool(line.action.is_permit()), &acc);
                }
                Ok(acc)
            }
        }
    }

    fn compute_statements(
        &self,
        ctx: &mut Context,
        statements: &[Statement],
        p: &TransferParam,
        data: &mut SymbolicRoute,
        input: TransferResult,
    ) -> Result<TransferResult, EncodingError> {
        let mut p = p.clone();
        let mut cur = input;
        let mut does_return = false;

        for stmt in statements {
            match stmt {
                Statement::ExitAccept | Statement::ReturnTrue | Statement::Unsuppress => {
                    does_return = true;
                    cur = self.return_value(ctx, cur, Expr::tru())?;
                }
                Statement::ExitReject | Statement::ReturnFalse | Statement::Suppress => {
                    does_return = true;
                    cur = self.return_value(ctx, cur, Expr::fls())?;
                }
                Statement::ReturnLocalDefaultAction => {
                    does_return = true;
                    cur = self.return_value(ctx, cur, Expr::bool(p.default_accept_local))?;
                }
                Statement::FallThrough => {
                    does_return = true;
                    cur = self.fallthrough(ctx, cur)?;
                }
                Statement::Return => p.log("Return"),
                Statement::SetDefaultActionAccept => p.default_accept = true,
                Statement::SetDefaultActionReject => p.default_accept = false,
                Statement::SetLocalDefaultActionAccept => p.default_accept_local = true,
                Statement::SetLocalDefaultActionReject => p.default_accept_local = false,
                Statement::RemovePrivateAs => {
                    warn!("RemovePrivateAs on router {} is ignored", self.conf.hostname)
                }
                Statement::If { guard, true_statements, false_statements } => {
                    cur = self.compute_if(ctx, guard, true_statements, false_statements, &p, data, cur)?;
                }
                Statement::SetDefaultPolicy(name) => p.default_policy = Some(name.clone()),
                Statement::SetMetric(e) => {
                    // the MED is not modeled
                    if self.current.proto != Some(Protocol::Bgp) {
                        let value = apply_long_expr(&data.metric, e);
                        self.update_field(ctx, &mut cur, data, Field::Metric, value)?;
                    }
                }
                Statement::SetOspfMetricType(mt) => {
                    let t = match mt {
                        OspfMetricType::E1 => OspfType::E1,
                        OspfMetricType::E2 => OspfType::E2,
                    };
                    let value = SymbolicOspfType::ospf_type_constant(t).bitvec().clone();
                    self.update_field(ctx, &mut cur, data, Field::OspfType, value)?;
                }
                Statement::SetLocalPreference(e) => {
                    let old = data.local_pref.clone().unwrap_or_else(|| Expr::int(DEFAULT_LOCAL_PREF));
                    let value = apply_long_expr(&old, e);
                    self.update_field(ctx, &mut cur, data, Field::LocalPref, value)?;
                }
                Statement::AddCommunity(cs) | Statement::SetCommunity(cs) => {
                    for c in collect_community_vars(self.conf, cs)? {
                        self.update_field(ctx, &mut cur, data, Field::Community(c), Expr::tru())?;
                    }
                }
                Statement::DeleteCommunity(cs) => {
                    let mut deleted = BTreeSet::new();
                    for c in collect_community_vars(self.conf, cs)? {
                        if c.is_regex() {
                            if let Some(deps) = self.slice.graph().community_dependencies().get(&c) {
                                deleted.extend(deps.iter().cloned());
                            }
                        } else {
                            deleted.insert(c);
                        }
                    }
                    for c in deleted {
                        self.update_field(ctx, &mut cur, data, Field::Community(c), Expr::fls())?;
                    }
                }
                Statement::PrependAsPath(l) => {
                    let value = data.metric.add(&Expr::int(l.prepend_length() as i64));
                    self.update_field(ctx, &mut cur, data, Field::Metric, value)?;
                }
                Statement::SetOrigin(_) | Statement::SetNextHop(_) => {
                    warn!("{:?} on router {} is ignored", stmt, self.conf.hostname)
                }
                Statement::SetTag(_) | Statement::SetWeight(_) => {
                    return Err(self.unsupported(format!("{:?}", stmt)))
                }
            }
        }

        if p.is_initial_call() {
            if !does_return {
                p.log(format!("default action: {}", p.default_accept));
                cur = self.return_value(ctx, cur, Expr::bool(p.default_accept))?;
            }
            let related = self.relate_variables(&cur, data)?;
            cur.return_value = Expr::ite(&cur.return_value, &related, &self.current.permitted.not());
        }

        Ok(cur)
    }

    #[allow(clippy::too_many_arguments)]
    fn compute_if(
        &self,
        ctx: &mut Context,
        guard: &BooleanExpr,
        true_statements: &[Statement],
        false_statements: &[Statement],
        p: &TransferParam,
        data: &mut SymbolicRoute,
        mut cur: TransferResult,
    ) -> Result<TransferResult, EncodingError> {
        let g = self.compute_expr(ctx, guard, &p.indent(), data)?;
        cur.merge_changed(&g, false);
        let guard = g.return_value.simplify();

        if guard.is_true() {
            p.log("guard is true");
            return self.compute_statements(ctx, true_statements, &p.indent(), data, cur);
        }
        if guard.is_false() {
            p.log("guard is false");
            return self.compute_statements(ctx, false_statements, &p.indent(), data, cur);
        }

        let mut data_true = data.clone();
        let mut data_false = data.clone();
        let r_true =
            self.compute_statements(ctx, true_statements, &p.indent(), &mut data_true, TransferResult::initial())?;
        let r_false =
            self.compute_statements(ctx, false_statements, &p.indent(), &mut data_false, TransferResult::initial())?;

        let fields: BTreeSet<Field> =
            r_true.changed.keys().chain(r_false.changed.keys()).cloned().collect();
        let assigned_before = cur.return_assigned.clone();

        // control flow first. Both branches start unassigned, so their values are only live if
        // nothing returned before the conditional.
        if fields.iter().any(|f| f.is_control()) {
            let branch = |t: &Expr, f: &Expr| Expr::ite(&guard, t, f);
            let ret = Expr::ite(
                &assigned_before,
                &cur.return_value,
                &branch(&r_true.return_value, &r_false.return_value),
            );
            let ft = Expr::ite(
                &assigned_before,
                &cur.fallthrough_value,
                &branch(&r_true.fallthrough_value, &r_false.fallthrough_value),
            );
            let assigned = assigned_before.or(&branch(&r_true.return_assigned, &r_false.return_assigned));
            cur.return_value = self.create_var(ctx, "RETURN", ret)?;
            cur.fallthrough_value = self.create_var(ctx, "FALLTHROUGH", ft)?;
            cur.return_assigned = self.create_var(ctx, "ASSIGNED", assigned)?;
            if fields.contains(&Field::Return) {
                cur.add_changed(Field::Return, cur.return_value.clone());
            }
            if fields.contains(&Field::Fallthrough) {
                cur.add_changed(Field::Fallthrough, cur.fallthrough_value.clone());
            }
        }

        for f in fields.iter().filter(|f| !f.is_control()) {
            let old = match field_value(data, f) {
                Some(old) => old,
                None => continue,
            };
            let t = field_value(&data_true, f).unwrap_or_else(|| old.clone());
            let e = field_value(&data_false, f).unwrap_or_else(|| old.clone());
            let new = Expr::ite(&assigned_before, &old, &Expr::ite(&guard, &t, &e));
            let x = self.create_var(ctx, &f.to_string(), new)?;
            set_field(data, f, x.clone());
            cur.add_changed(f.clone(), x);
        }

        Ok(cur)
    }

    fn no_overflow(&self, metric: &Expr) -> Expr {
        if !self.env.question.model_overflow {
            return Expr::tru();
        }
        match self.proto {
            Protocol::Ospf => metric.le(&Expr::int(65535)),
            Protocol::Bgp => metric.le(&Expr::int(255)),
            Protocol::Connected | Protocol::Static => Expr::tru(),
        }
    }

    fn send_community(&self) -> bool {
        if !self.proto.is_bgp() {
            return false;
        }
        if !self.is_export {
            return true;
        }
        self.slice.graph().find_bgp_neighbor(self.edge).map(|n| n.send_community).unwrap_or(false)
    }

    fn relate_variables(&self, result: &TransferResult, data: &SymbolicRoute) -> Result<Expr, EncodingError> {
        let g = self.slice.graph();
        let current = self.current;
        let iface = &self.edge.start;
        let router = &self.edge.router;

        let default_ad = default_admin_distance(self.proto, data);
        let is_ibgp = self.edge.is_abstract && self.proto.is_bgp();
        let peer_type = if self.edge.is_abstract { Some(g.peer_type(self.edge)?) } else { None };
        let is_non_client = matches!(peer_type, Some(t) if t != BgpSendType::ToEbgp);
        let is_client = peer_type == Some(BgpSendType::ToRr);

        let per = current.permitted.equals(&data.permitted);
        let len = current.prefix_length.equals(&data.prefix_length);

        // the router id is only updated on import
        let id = if self.is_export {
            Expr::tru()
        } else {
            let other_id = data.router_id.clone().unwrap_or_else(|| Expr::int(0));
            safe_eq(current.router_id.as_ref(), &other_id)
        };

        let area = match (&data.ospf_area, iface.ospf_area, &current.ospf_area) {
            (Some(_), Some(a), Some(c)) => c.check_if_value(&a)?,
            _ => Expr::tru(),
        };

        let mut igp_met = Expr::tru();
        if let (true, Some(cur_igp)) = (self.edge.is_abstract, &current.igp_metric) {
            if is_client {
                let mut acc = Vec::new();
                if let Some(cid) = &data.client_id {
                    for (r, id) in g.originator_id().iter().filter(|(r, _)| *r != router) {
                        let best = self.env.slice(r).and_then(|s| s.decisions().best_neighbor.get(r));
                        if let Some(best) = best {
                            acc.push(cid.check_if_value(id)?.implies(&cur_igp.equals(&best.metric)));
                        }
                    }
                }
                igp_met = Expr::and_all(acc);
            } else if is_non_client {
                let peer = self.edge.peer.as_deref().unwrap_or_default();
                if let Some(best) = self.env.slice(peer).and_then(|s| s.decisions().best_neighbor.get(router)) {
                    igp_met = cur_igp.equals(&best.metric);
                }
            }
        }

        let is_internal = safe_eq(current.bgp_internal.as_ref(), &Expr::bool(is_ibgp));

        let copy_type = safe_eq_enum(current.ospf_type.as_ref(), data.ospf_type.as_ref());
        let typ = if result.is_changed(&Field::OspfType) {
            copy_type
        } else {
            match (&data.ospf_type, &data.ospf_area, iface.ospf_area, &current.ospf_type) {
                (Some(t), Some(a), Some(iface_area), Some(ct)) => {
                    let crossed = t.is_internal().and(&a.check_if_value(&iface_area)?.not());
                    Expr::ite(&crossed, &ct.check_if_value(&OspfType::OIA)?, &copy_type)
                }
                _ => copy_type,
            }
        };

        let send = self.send_community();
        let comms = Expr::and_all(current.communities.iter().filter_map(|(c, e)| {
            if !send {
                Some(e.not())
            } else if !c.is_regex() {
                Some(e.equals(&data.community(c)))
            } else {
                None
            }
        }));

        let other_ad = data.admin_dist.clone().unwrap_or(default_ad);
        let other_med = data.med.clone().unwrap_or_else(|| Expr::int(default_med(self.proto)));
        let other_lp = data.local_pref.clone().unwrap_or_else(|| Expr::int(DEFAULT_LOCAL_PREF));
        let other_met = data.metric.clone();

        let ad = safe_eq(current.admin_dist.as_ref(), &other_ad);
        let history = equal_histories(current, data)?;
        let med = safe_eq(current.med.as_ref(), &other_med);
        let met = current.metric.equals(&other_met);
        let lp = safe_eq(current.local_pref.as_ref(), &other_lp);

        let mut cid = Expr::tru();
        if self.proto.is_bgp() {
            if let (Some(data_cid), Some(cur_cid)) = (&data.client_id, &current.client_id) {
                let copy_over = cur_cid.mk_eq(data_cid);
                if self.is_export {
                    cid = if g.ebgp_neighbors().contains_key(self.edge) {
                        cur_cid.check_if_value(&0)?
                    } else {
                        copy_over
                    };
                } else {
                    let from_external = data_cid.check_if_value(&0)?;
                    let edge_is_internal = Expr::bool(!is_client && !is_non_client);
                    let x = g.originator_id().get(router).copied().unwrap_or(0);
                    let set_new = cur_cid.check_if_value(&x)?;
                    cid = Expr::ite(&from_external.and(&edge_is_internal), &set_new, &copy_over);
                }
            }
        }

        let updates = Expr::and_all(vec![
            per, len, ad, med, lp, met, id, cid, typ, area, comms, history, is_internal, igp_met,
        ]);
        Ok(Expr::ite(&self.no_overflow(&other_met), &updates, &current.permitted.not()))
    }
}
