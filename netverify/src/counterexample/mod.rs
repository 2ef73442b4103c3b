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

//! # Counterexamples
//!
//! Concrete description of a violated property, decoded from a solver model by the
//! [`CounterExample`] reconstructor: the packet, the failed links, the routes received from the
//! environment and the hop-by-hop path of the packet.

mod builder;

pub use builder::{build_route, CounterExample};

use crate::network::{Community, Flow, Ip, Prefix, Protocol};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Directed link between two interfaces
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    /// First router
    pub node1: String,
    /// Interface of the first router
    pub int1: String,
    /// Second router
    pub node2: String,
    /// Interface of the second router
    pub int2: String,
}

impl Edge {
    /// Create a new edge
    pub fn new(
        node1: impl Into<String>,
        int1: impl Into<String>,
        node2: impl Into<String>,
        int2: impl Into<String>,
    ) -> Self {
        Self { node1: node1.into(), int1: int1.into(), node2: node2.into(), int2: int2.into() }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} -> {}:{}", self.node1, self.int1, self.node2, self.int2)
    }
}

/// Final state of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowDisposition {
    /// The packet reached its destination
    Accepted,
    /// Dropped by the inbound filter of the next router
    DeniedIn,
    /// Dropped by the outbound filter of the interface
    DeniedOut,
    /// The packet came back to a router it already visited
    Loop,
    /// A router has no route for the packet
    NoRoute,
    /// The packet left the network, or it is not known what happens next
    NeighborUnreachableOrExitsNetwork,
}

impl fmt::Display for FlowDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowDisposition::Accepted => "ACCEPTED",
            FlowDisposition::DeniedIn => "DENIED_IN",
            FlowDisposition::DeniedOut => "DENIED_OUT",
            FlowDisposition::Loop => "LOOP",
            FlowDisposition::NoRoute => "NO_ROUTE",
            FlowDisposition::NeighborUnreachableOrExitsNetwork => {
                "NEIGHBOR_UNREACHABLE_OR_EXITS_NETWORK"
            }
        };
        f.write_str(s)
    }
}

/// One hop of a packet, with the route used to forward it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowTraceHop {
    /// The edge crossed by the packet
    pub edge: Edge,
    /// Textual form of the routes used
    pub routes: BTreeSet<String>,
}

/// Path of a packet through the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowTrace {
    /// Final state
    pub disposition: FlowDisposition,
    /// Hops in order
    pub hops: Vec<FlowTraceHop>,
    /// Explanation of the final state
    pub notes: String,
}

impl fmt::Display for FlowTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, hop) in self.hops.iter().enumerate() {
            let routes: Vec<&str> = hop.routes.iter().map(|s| s.as_str()).collect();
            writeln!(f, "{}. {} [{}]", i + 1, hop.edge, routes.join(", "))?;
        }
        write!(f, "{}", self.notes)
    }
}

/// BGP route received from outside of the network. The AS path is not modeled symbolically, so
/// it only has the right length and consists of placeholder AS numbers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BgpAdvertisement {
    /// Kind of the advertisement
    pub adv_type: String,
    /// Advertised network
    pub network: Prefix,
    /// Sender, named after its AS
    pub src_node: String,
    /// Receiving router
    pub dst_node: String,
    /// Address of the receiving router
    pub dst_ip: Ip,
    /// Protocol of the route
    pub protocol: Protocol,
    /// Local preference
    pub local_pref: u32,
    /// MED
    pub med: u32,
    /// AS path
    pub as_path: Vec<i64>,
    /// Attached communities
    pub communities: BTreeSet<Community>,
}

/// Failures and received routes of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Name of the network copy
    pub name: String,
    /// Failed links
    pub failed_links: BTreeSet<Edge>,
    /// Routes received from the environment
    pub bgp_advertisements: BTreeSet<BgpAdvertisement>,
}

/// Network copy a trace belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scenario {
    /// The base network
    Base,
    /// The network with the delta applied
    Delta,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scenario::Base => f.write_str("BASE"),
            Scenario::Delta => f.write_str("DELTA"),
        }
    }
}

/// A traced packet in one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowHistoryEntry {
    /// The packet
    pub flow: Flow,
    /// Scenario of the trace
    pub scenario: Scenario,
    /// Failures and received routes
    pub environment: Environment,
    /// Path of the packet
    pub trace: FlowTrace,
}

/// Traces of a counterexample
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowHistory {
    /// Traces, in the order they were added
    pub traces: Vec<FlowHistoryEntry>,
}

impl FlowHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trace
    pub fn add_flow_trace(&mut self, flow: Flow, scenario: Scenario, environment: Environment, trace: FlowTrace) {
        self.traces.push(FlowHistoryEntry { flow, scenario, environment, trace });
    }

    /// Returns true if there is no trace
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Number of traces
    pub fn len(&self) -> usize {
        self.traces.len()
    }
}

impl fmt::Display for FlowHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.traces.iter() {
            writeln!(f, "{} {}", entry.scenario, entry.flow)?;
            for link in entry.environment.failed_links.iter() {
                writeln!(f, "  failed {}", link)?;
            }
            for adv in entry.environment.bgp_advertisements.iter() {
                writeln!(f, "  received {} from {} at {}", adv.network, adv.src_node, adv.dst_node)?;
            }
            for line in entry.trace.to_string().lines() {
                writeln!(f, "  {}", line)?;
            }
        }
        Ok(())
    }
}
