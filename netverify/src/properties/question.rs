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

//! Questions asked to the property checker.

use crate::network::{HeaderSpace, Prefix, SubRange, TcpFlagsMatch};
use serde::{Deserialize, Serialize};

/// Attribute compared by the BGP decision process, in the order given by
/// [`HeaderQuestion::bgp_ranking`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BgpDecisionVariable {
    /// Higher local preference wins
    Localpref,
    /// Shorter AS path wins
    Pathlen,
    /// Lower MED wins
    Med,
    /// eBGP routes win over iBGP routes
    EbgpPrefIbgp,
    /// Lower IGP cost to the next hop wins
    Igpcost,
}

/// Restriction on the routes received from outside of the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvironmentType {
    /// Any route may be received
    Any,
    /// No route is received
    None,
    /// Received routes have an AS path length of at most 50
    Sane,
}

/// Relation required between the base and the delta network of a differential question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffType {
    /// The delta network reaches at least what the base network reaches
    Increased,
    /// The delta network reaches at most what the base network reaches
    Reduced,
    /// Both networks reach the same
    Any,
}

/// Options shared by every property check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderQuestion {
    /// Packets considered by the check
    pub header_space: HeaderSpace,
    /// Maximum number of simultaneously failed links
    pub failures: usize,
    /// Fail routers instead of links
    pub fail_node_query: bool,
    /// Report the value of every variable in the result
    pub full_model: bool,
    /// Forbid routes from outside of the network
    pub no_environment: bool,
    /// Treat metrics exceeding the protocol maximum as unreachable
    pub model_overflow: bool,
    /// BGP decision process
    pub bgp_ranking: Vec<BgpDecisionVariable>,
    /// Restriction on received routes
    pub environment_type: EnvironmentType,
    /// Relation between base and delta network
    pub diff_type: DiffType,
    /// Compare the base network against a delta network
    pub diff: bool,
    /// Collect encoding statistics
    pub benchmark: bool,
    /// Minimize the number of environment routes of a counterexample
    pub minimize: bool,
}

impl Default for HeaderQuestion {
    fn default() -> Self {
        Self {
            header_space: HeaderSpace::default(),
            failures: 0,
            fail_node_query: false,
            full_model: false,
            no_environment: false,
            model_overflow: false,
            bgp_ranking: vec![
                BgpDecisionVariable::Localpref,
                BgpDecisionVariable::Pathlen,
                BgpDecisionVariable::Med,
                BgpDecisionVariable::EbgpPrefIbgp,
                BgpDecisionVariable::Igpcost,
            ],
            environment_type: EnvironmentType::Any,
            diff_type: DiffType::Any,
            diff: false,
            benchmark: false,
            minimize: false,
        }
    }
}

impl HeaderQuestion {
    /// Set the number of failures
    pub fn failures(mut self, k: usize) -> Self {
        self.failures = k;
        self
    }

    /// Restrict the destination addresses
    pub fn dst_ips(mut self, dst: Vec<Prefix>) -> Self {
        self.header_space.dst_ips = dst;
        self
    }

    /// Restrict the destination ports
    pub fn dst_ports(mut self, ports: Vec<SubRange>) -> Self {
        self.header_space.dst_ports = ports;
        self
    }

    /// Restrict the TCP flags
    pub fn tcp_flags(mut self, flags: Vec<TcpFlagsMatch>) -> Self {
        self.header_space.tcp_flags = flags;
        self
    }
}

/// Question over a set of source routers and destination interfaces. The patterns are regular
/// expressions, matched against the whole name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderLocationQuestion {
    /// Shared options
    #[serde(flatten)]
    pub header: HeaderQuestion,
    /// Source routers
    pub ingress_node_regex: String,
    /// Excluded source routers
    pub not_ingress_node_regex: String,
    /// Routers of the destination interfaces
    pub final_node_regex: String,
    /// Excluded routers of the destination interfaces
    pub not_final_node_regex: String,
    /// Destination interfaces
    pub final_iface_regex: String,
    /// Excluded destination interfaces
    pub not_final_iface_regex: String,
    /// Routers on one side of the links that may fail
    pub fail_node1_regex: String,
    /// Routers on the other side of the links that may fail
    pub fail_node2_regex: String,
    /// Excludes links from failing, together with `not_fail_node2_regex`
    pub not_fail_node1_regex: String,
    /// Excludes links from failing, together with `not_fail_node1_regex`
    pub not_fail_node2_regex: String,
    /// Routers that may fail, if `fail_node_query` is set
    pub fail_node_regex: String,
    /// Routers that never fail
    pub not_fail_node_regex: String,
    /// Maximal path length, or the tolerated load difference
    pub bound: i64,
    /// Check the negation of the property
    pub negate: bool,
}

impl Default for HeaderLocationQuestion {
    fn default() -> Self {
        Self {
            header: HeaderQuestion::default(),
            ingress_node_regex: ".*".to_string(),
            not_ingress_node_regex: String::new(),
            final_node_regex: ".*".to_string(),
            not_final_node_regex: String::new(),
            final_iface_regex: ".*".to_string(),
            not_final_iface_regex: String::new(),
            fail_node1_regex: ".*".to_string(),
            fail_node2_regex: ".*".to_string(),
            not_fail_node1_regex: String::new(),
            not_fail_node2_regex: String::new(),
            fail_node_regex: ".*".to_string(),
            not_fail_node_regex: String::new(),
            bound: 0,
            negate: false,
        }
    }
}

impl HeaderLocationQuestion {
    /// Question from `ingress` routers to the `iface` interfaces of the `dst` routers
    pub fn new(ingress: impl Into<String>, dst: impl Into<String>, iface: impl Into<String>) -> Self {
        Self {
            ingress_node_regex: ingress.into(),
            final_node_regex: dst.into(),
            final_iface_regex: iface.into(),
            ..Default::default()
        }
    }

    /// Set the bound of length and load checks
    pub fn bound(mut self, bound: i64) -> Self {
        self.bound = bound;
        self
    }

    /// Replace the shared options
    pub fn with_header(mut self, header: HeaderQuestion) -> Self {
        self.header = header;
        self
    }
}

/// Question comparing two routers of the same network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConsistencyQuestion {
    /// Shared options
    #[serde(flatten)]
    pub header: HeaderQuestion,
    /// Routers to compare pairwise
    pub router_regex: String,
    /// Compare the selected routes instead of the forwarding decisions
    pub strict: bool,
}

impl Default for LocalConsistencyQuestion {
    fn default() -> Self {
        Self { header: HeaderQuestion::default(), router_regex: ".*".to_string(), strict: false }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_from_json() {
        let q: HeaderLocationQuestion =
            serde_json::from_str(r#"{"failures": 1, "ingress_node_regex": "R1"}"#).unwrap();
        assert_eq!(q.header.failures, 1);
        assert_eq!(q.ingress_node_regex, "R1");
        assert_eq!(q.final_node_regex, ".*");
        assert_eq!(q.header.bgp_ranking.len(), 5);
        assert_eq!(q.header.environment_type, EnvironmentType::Any);
        assert_eq!(q.fail_node1_regex, ".*");
        assert!(q.not_fail_node_regex.is_empty());
    }

    #[test]
    fn enums_use_upper_case() {
        let r: Vec<BgpDecisionVariable> =
            serde_json::from_str(r#"["LOCALPREF", "EBGP_PREF_IBGP"]"#).unwrap();
        assert_eq!(r, vec![BgpDecisionVariable::Localpref, BgpDecisionVariable::EbgpPrefIbgp]);
        let e: EnvironmentType = serde_json::from_str(r#""SANE""#).unwrap();
        assert_eq!(e, EnvironmentType::Sane);
    }
}
