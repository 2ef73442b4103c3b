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

//! # Verification Results
//!
//! Every property check ends in a [`VerificationResult`]. If the property does not hold, the
//! result carries the relevant parts of the counterexample model as text, and the answer types
//! add the reconstructed flows on top of it.

use crate::counterexample::FlowHistory;
use crate::network::Flow;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

/// Size of the encoding and time spent for one solver call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationStats {
    /// Number of routers
    pub num_nodes: usize,
    /// Number of directed router adjacencies
    pub num_edges: usize,
    /// Number of variables in the context
    pub num_variables: usize,
    /// Number of assertions in the context
    pub num_constraints: usize,
    /// Time spent building the encoding
    pub encoding_time: Duration,
    /// Time spent in the solver, summed over all calls of the minimization loop
    pub solver_time: Duration,
}

/// Aggregate over several [`VerificationStats`], as collected when one question is checked
/// once per pair of routers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    /// Number of solver runs
    pub runs: usize,
    /// Average number of variables
    pub avg_variables: f64,
    /// Maximum number of variables
    pub max_variables: usize,
    /// Average number of constraints
    pub avg_constraints: f64,
    /// Maximum number of constraints
    pub max_constraints: usize,
    /// Shortest solver time
    pub min_solver_time: Duration,
    /// Longest solver time
    pub max_solver_time: Duration,
    /// Average solver time
    pub avg_solver_time: Duration,
}

impl StatsSummary {
    /// Summarize a set of runs
    pub fn from_stats<'a, I>(stats: I) -> Self
    where
        I: IntoIterator<Item = &'a VerificationStats>,
    {
        let stats: Vec<&VerificationStats> = stats.into_iter().collect();
        let n = stats.len();
        if n == 0 {
            return Self::default();
        }
        let total_time: Duration = stats.iter().map(|s| s.solver_time).sum();
        Self {
            runs: n,
            avg_variables: stats.iter().map(|s| s.num_variables as f64).sum::<f64>() / n as f64,
            max_variables: stats.iter().map(|s| s.num_variables).max().unwrap_or(0),
            avg_constraints: stats.iter().map(|s| s.num_constraints as f64).sum::<f64>() / n as f64,
            max_constraints: stats.iter().map(|s| s.num_constraints).max().unwrap_or(0),
            min_solver_time: stats.iter().map(|s| s.solver_time).min().unwrap_or_default(),
            max_solver_time: stats.iter().map(|s| s.solver_time).max().unwrap_or_default(),
            avg_solver_time: total_time / n as u32,
        }
    }
}

/// Outcome of one solver call. If `verified` is false, the maps describe the counterexample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// The property holds
    pub verified: bool,
    /// Failed links (`link(a,b)`) and routers (`node(r)`)
    pub failures: BTreeSet<String>,
    /// Value of every variable, only filled if the question asks for the full model
    pub model: BTreeMap<String, String>,
    /// Header fields of the packet
    pub packet_model: BTreeMap<String, String>,
    /// Routes received from outside of the network, by `router,iface (BGP)`
    pub env_model: BTreeMap<String, BTreeMap<String, String>>,
    /// Edges over which the packet is forwarded
    pub fwd_model: BTreeSet<String>,
    /// Statistics, if the question asks for them
    pub stats: Option<VerificationStats>,
}

impl VerificationResult {
    /// Result of a property that holds
    pub fn verified(stats: Option<VerificationStats>) -> Self {
        Self { verified: true, stats, ..Default::default() }
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "verified: {}", self.verified)?;
        if self.verified {
            return Ok(());
        }
        if !self.packet_model.is_empty() {
            writeln!(f, "Packet:")?;
            for (k, v) in self.packet_model.iter() {
                writeln!(f, "  {}: {}", k, v)?;
            }
        }
        if !self.env_model.is_empty() {
            writeln!(f, "Environment messages:")?;
            for (k, record) in self.env_model.iter() {
                writeln!(f, "  {}", k)?;
                for (field, v) in record.iter() {
                    if v.is_empty() {
                        writeln!(f, "    {}", field)?;
                    } else {
                        writeln!(f, "    {}: {}", field, v)?;
                    }
                }
            }
        }
        if !self.failures.is_empty() {
            writeln!(f, "Failures:")?;
            for x in self.failures.iter() {
                writeln!(f, "  {}", x)?;
            }
        }
        if !self.fwd_model.is_empty() {
            writeln!(f, "Forwarding:")?;
            for x in self.fwd_model.iter() {
                writeln!(f, "  {}", x)?;
            }
        }
        Ok(())
    }
}

/// Answer of a question with one solver call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtOneAnswer {
    /// Result of the solver call
    pub result: VerificationResult,
}

/// Answer of a question checked once per key, e.g. once per router pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmtManyAnswer {
    /// Results by key
    pub results: BTreeMap<String, VerificationResult>,
    /// Statistics over all runs, if requested
    pub stats: Option<StatsSummary>,
}

impl SmtManyAnswer {
    /// All results hold
    pub fn verified(&self) -> bool {
        self.results.values().all(|r| r.verified)
    }
}

/// Answer of a reachability question, with the reconstructed counterexample flows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtReachabilityAnswer {
    /// Result of the solver call
    pub result: VerificationResult,
    /// Counterexample flows, if the property does not hold
    pub flow_history: Option<FlowHistory>,
}

/// Answer of a determinism question: one packet, forwarded differently in two copies of the
/// network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtDeterminismAnswer {
    /// Result of the solver call
    pub result: VerificationResult,
    /// The packet, if the forwarding is not deterministic
    pub flow: Option<Flow>,
    /// Forwarding edges and their routes in the first copy
    pub forwarding_case1: BTreeSet<String>,
    /// Forwarding edges and their routes in the second copy
    pub forwarding_case2: BTreeSet<String>,
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::{btreemap, btreeset};

    #[test]
    fn summary() {
        let a = VerificationStats {
            num_variables: 10,
            num_constraints: 4,
            solver_time: Duration::from_millis(10),
            ..Default::default()
        };
        let b = VerificationStats {
            num_variables: 20,
            num_constraints: 8,
            solver_time: Duration::from_millis(30),
            ..Default::default()
        };
        let s = StatsSummary::from_stats(vec![&a, &b]);
        assert_eq!(s.runs, 2);
        assert_eq!(s.max_variables, 20);
        assert!((s.avg_constraints - 6.0).abs() < 1e-9);
        assert_eq!(s.min_solver_time, Duration::from_millis(10));
        assert_eq!(s.avg_solver_time, Duration::from_millis(20));
        assert_eq!(StatsSummary::from_stats(Vec::new()), StatsSummary::default());
    }

    #[test]
    fn display_counterexample() {
        let r = VerificationResult {
            verified: false,
            failures: btreeset! {"link(R1,R2)".to_string()},
            packet_model: btreemap! {"dstIp".to_string() => "10.0.0.1".to_string()},
            env_model: btreemap! {
                "R1,eth1 (BGP)".to_string() => btreemap! {
                    "prefix".to_string() => "10.0.0.0/24".to_string(),
                    "community 65000:100".to_string() => String::new(),
                }
            },
            ..Default::default()
        };
        let s = r.to_string();
        assert!(s.starts_with("verified: false"));
        assert!(s.contains("  dstIp: 10.0.0.1"));
        assert!(s.contains("    community 65000:100\n"));
        assert!(s.contains("  link(R1,R2)"));
        assert_eq!(VerificationResult::verified(None).to_string(), "verified: true\n");
    }
}
