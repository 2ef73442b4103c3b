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

use netverify::network::{Configuration, Graph, Topology};
use netverify::properties::{
    HeaderLocationQuestion, HeaderQuestion, LocalConsistencyQuestion, PropertyChecker,
};
use netverify::smt::Solver;

use clap::{Parser, Subcommand};
use log::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let args = CommandLineArguments::parse();

    let network: NetworkDescription = read_json(&args.network)?;
    let graph = Graph::new(network.configurations, network.topology.as_ref())?;
    info!("Loaded {} routers from {}", graph.routers().count(), args.network.display());

    let name = args
        .network
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "network".to_string());
    let output = run(&graph, name, &args)?;
    println!("{}", output);
    Ok(())
}

#[cfg(feature = "z3-solver")]
fn run(graph: &Graph, name: String, args: &CommandLineArguments) -> Result<String, Box<dyn Error>> {
    let checker = PropertyChecker::new(graph.clone(), netverify::smt::Z3Solver::new()).with_name(name);
    check(checker, args)
}

#[cfg(not(feature = "z3-solver"))]
fn run(_: &Graph, _: String, _: &CommandLineArguments) -> Result<String, Box<dyn Error>> {
    Err("netverify_main was built without a solver, enable the feature `z3-solver`".into())
}

/// Run the selected check and serialize its answer.
#[cfg_attr(not(feature = "z3-solver"), allow(dead_code))]
fn check<S: Solver>(mut checker: PropertyChecker<S>, args: &CommandLineArguments) -> Result<String, Box<dyn Error>> {
    let json = match &args.cmd {
        Property::Forwarding => to_json(&checker.check_forwarding(&args.header_question()?)?)?,
        Property::BlackHole => to_json(&checker.check_black_hole(&args.header_question()?)?)?,
        Property::RoutingLoop => to_json(&checker.check_routing_loop(&args.header_question()?)?)?,
        Property::Determinism => to_json(&checker.check_determinism(&args.header_question()?)?)?,
        Property::Reachability(loc) => {
            to_json(&checker.check_reachability(&args.location_question(loc)?)?)?
        }
        Property::BoundedLength(loc) => {
            to_json(&checker.check_bounded_length(&args.location_question(loc)?)?)?
        }
        Property::EqualLength(loc) => {
            to_json(&checker.check_equal_length(&args.location_question(loc)?)?)?
        }
        Property::LoadBalancing(loc) => {
            to_json(&checker.check_load_balancing(&args.location_question(loc)?)?)?
        }
        Property::Multipath(loc) => {
            to_json(&checker.check_multipath_consistency(&args.location_question(loc)?)?)?
        }
        Property::LocalEquivalence { routers, strict } => {
            let mut q: LocalConsistencyQuestion = args.question_file()?;
            args.apply_header_options(&mut q.header);
            if let Some(r) = routers {
                q.router_regex = r.clone();
            }
            q.strict |= *strict;
            to_json(&checker.check_local_equivalence(&q)?)?
        }
    };
    Ok(json)
}

fn to_json<T: Serialize>(answer: &T) -> Result<String, Box<dyn Error>> {
    Ok(serde_json::to_string_pretty(answer)?)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Configurations of all routers. Without a topology, links are inferred from the interface
/// addresses.
#[derive(Debug, Deserialize)]
struct NetworkDescription {
    configurations: Vec<Configuration>,
    #[serde(default)]
    topology: Option<Topology>,
}

/// Verify a property of a network for all packets, all failures up to a bound and all routes
/// received from external peers. The answer is printed as JSON.
#[derive(Parser, Debug)]
#[clap(name = "netverify", author = "Tibor Schneider")]
struct CommandLineArguments {
    /// JSON file with the network description
    network: PathBuf,
    /// JSON file with the question. Options given on the command line take precedence.
    #[clap(short = 'q', long)]
    question: Option<PathBuf>,
    /// Maximal number of failed links
    #[clap(short = 'k', long)]
    failures: Option<usize>,
    /// Let routers fail as well
    #[clap(long)]
    fail_nodes: bool,
    /// Ignore routes received from external peers
    #[clap(long)]
    no_environment: bool,
    /// Print the value of every variable of a counterexample
    #[clap(long)]
    full_model: bool,
    /// Search for a counterexample with as few environment routes as possible
    #[clap(long)]
    minimize: bool,
    /// Collect statistics of the encoding and the solver
    #[clap(long)]
    benchmark: bool,
    /// Property to check
    #[clap(subcommand)]
    cmd: Property,
}

#[derive(Subcommand, Debug)]
enum Property {
    /// Compute the forwarding state of the network
    #[clap(name = "forwarding")]
    Forwarding,
    /// No packet is dropped by a router without a route
    #[clap(name = "black-hole")]
    BlackHole,
    /// No packet is forwarded in a loop
    #[clap(name = "routing-loop")]
    RoutingLoop,
    /// The forwarding does not depend on the message ordering
    #[clap(name = "determinism")]
    Determinism,
    /// Sources reach the destination
    #[clap(name = "reachability")]
    Reachability(Location),
    /// Sources reach the destination within a number of hops
    #[clap(name = "bounded-length")]
    BoundedLength(Location),
    /// Sources reach the destination with paths of equal length
    #[clap(name = "equal-length")]
    EqualLength(Location),
    /// Neighboring sources send the same amount of traffic to each destination
    #[clap(name = "load-balancing")]
    LoadBalancing(Location),
    /// Packets are either delivered on every path or dropped on every path
    #[clap(name = "multipath")]
    Multipath(Location),
    /// Routers with the same interfaces behave the same
    #[clap(name = "local-equivalence")]
    LocalEquivalence {
        /// Routers to compare
        #[clap(short = 'r', long)]
        routers: Option<String>,
        /// Compare the selected routes instead of the forwarding decisions
        #[clap(short = 's', long)]
        strict: bool,
    },
}

/// Sources and destinations of a property
#[derive(clap::Args, Debug)]
struct Location {
    /// Source routers
    #[clap(short = 's', long)]
    ingress: Option<String>,
    /// Destination routers
    #[clap(short = 'd', long)]
    dst: Option<String>,
    /// Destination interfaces
    #[clap(short = 'i', long)]
    iface: Option<String>,
    /// Maximal path length, or the tolerated load difference
    #[clap(short = 'b', long)]
    bound: Option<i64>,
    /// Check the negation of the property
    #[clap(short = 'n', long)]
    negate: bool,
    /// Compare the network with failures to the one without
    #[clap(long)]
    diff: bool,
}

impl CommandLineArguments {
    fn question_file<T: DeserializeOwned + Default>(&self) -> Result<T, Box<dyn Error>> {
        match &self.question {
            Some(path) => read_json(path),
            None => Ok(T::default()),
        }
    }

    fn apply_header_options(&self, q: &mut HeaderQuestion) {
        if let Some(k) = self.failures {
            q.failures = k;
        }
        q.fail_node_query |= self.fail_nodes;
        q.no_environment |= self.no_environment;
        q.full_model |= self.full_model;
        q.minimize |= self.minimize;
        q.benchmark |= self.benchmark;
    }

    fn header_question(&self) -> Result<HeaderQuestion, Box<dyn Error>> {
        let mut q: HeaderQuestion = self.question_file()?;
        self.apply_header_options(&mut q);
        Ok(q)
    }

    fn location_question(&self, loc: &Location) -> Result<HeaderLocationQuestion, Box<dyn Error>> {
        let mut q: HeaderLocationQuestion = self.question_file()?;
        self.apply_header_options(&mut q.header);
        if let Some(x) = &loc.ingress {
            q.ingress_node_regex = x.clone();
        }
        if let Some(x) = &loc.dst {
            q.final_node_regex = x.clone();
        }
        if let Some(x) = &loc.iface {
            q.final_iface_regex = x.clone();
        }
        if let Some(b) = loc.bound {
            q.bound = b;
        }
        q.negate |= loc.negate;
        q.header.diff |= loc.diff;
        debug!("{:?}", q);
        Ok(q)
    }
}
