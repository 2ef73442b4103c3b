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

#![deny(missing_docs)]

//! # Netverify: Symbolic Verification of Network Control Planes
//!
//! This library encodes the stable states of a network control plane (connected, static, OSPF
//! and BGP routing, together with access lists and routing policies) as a single SMT formula.
//! Properties like reachability, bounded path length or the absence of routing loops are checked
//! for every packet, every combination of up to `k` link failures and every set of routes an
//! external peer may announce. Violated properties come with a concrete counterexample: a packet,
//! the failed links, the routes received from the environment and the path the packet takes.
//!
//! ## Structure
//!
//! - **[`Network`](network)**: Vendor independent configurations and the
//!   [`Graph`](network::Graph) of routers and their interfaces.
//!
//! - **[`Smt`](smt)**: Terms, the assertion [`Context`](smt::Context) and the
//!   [`Solver`](smt::Solver) trait. The z3 backend is enabled with the feature `z3-solver`.
//!
//! - **[`Encoder`](encoder)**: Symbolic routes, packets and failures, the transfer functions of
//!   routing policies and the per-slice encoding of the network.
//!
//! - **[`Properties`](properties)**: Questions and the [`PropertyChecker`](properties::PropertyChecker),
//!   which builds an encoding, negates the property and calls the solver.
//!
//! - **[`CounterExample`](counterexample)**: Turns a model into flows, traces and environments.
//!
//! - **[`Result`](result)**: Answers of the checks, which are serialized as JSON.
//!
//! ## Features
//!
//! - *`z3-solver`*: Link against the system z3 library and provide `smt::Z3Solver`.
//! - *`z3-bundled`*: Build z3 from source.
//!
//! ## Usage
//!
//! ```
//! use netverify::network::*;
//! use netverify::properties::{HeaderLocationQuestion, PropertyChecker};
//! use netverify::smt::Solver;
//! use netverify::Error;
//!
//! fn lan_reachable<S: Solver>(solver: S) -> Result<bool, Error> {
//!     let mut r1 = Configuration::new("R1");
//!     r1.add_interface(Interface::new("eth0", "10.0.1.1/30".parse()?))
//!         .add_static_route(StaticRoute {
//!             network: "10.0.0.0/24".parse()?,
//!             next_hop_ip: Some("10.0.1.2".parse()?),
//!             next_hop_interface: None,
//!             admin_cost: 1,
//!         });
//!     let mut r2 = Configuration::new("R2");
//!     r2.add_interface(Interface::new("eth0", "10.0.1.2/30".parse()?))
//!         .add_interface(Interface::new("eth1", "10.0.0.1/24".parse()?));
//!
//!     let graph = Graph::new(vec![r1, r2], None)?;
//!     let mut checker = PropertyChecker::new(graph, solver);
//!
//!     // R1 reaches the LAN of R2, even if one link fails
//!     let mut q = HeaderLocationQuestion::new("R1", "R2", "eth1");
//!     q.header.failures = 1;
//!     let answer = checker.check_reachability(&q)?;
//!     if let Some(history) = &answer.flow_history {
//!         println!("{:#?}", history);
//!     }
//!     Ok(answer.result.verified)
//! }
//! ```

pub mod counterexample;
pub mod encoder;
mod error;
pub mod network;
pub mod properties;
pub mod result;
pub mod smt;

#[cfg(test)]
mod test;

pub use error::Error;
