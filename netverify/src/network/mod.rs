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

#![deny(missing_docs, missing_debug_implementations)]

//! # Network Model
//!
//! Vendor-independent description of the network that is verified: router
//! [`Configuration`]s with their interfaces, routing processes, routing policies, access lists,
//! community lists and route filter lists, and the [`Graph`] built from them.
//!
//! ## Example usage
//!
//! The following example builds two routers connected by one link. `R1` has a static default
//! route towards `R2`, and `R2` announces `10.0.0.0/24` over eBGP.
//!
//! ```rust
//! use netverify::network::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut r1 = Configuration::new("R1");
//!     r1.add_interface(Interface::new("eth0", "192.168.0.1/30".parse()?))
//!         .add_static_route(StaticRoute::via("0.0.0.0/0".parse()?, "192.168.0.2".parse()?));
//!     r1.bgp = Some(
//!         BgpProcess::new("1.1.1.1".parse()?)
//!             .neighbor(BgpNeighbor::new("192.168.0.2".parse()?, 1, 2)),
//!     );
//!
//!     let mut r2 = Configuration::new("R2");
//!     r2.add_interface(Interface::new("eth0", "192.168.0.2/30".parse()?))
//!         .add_interface(Interface::new("eth1", "10.0.0.1/24".parse()?));
//!     r2.bgp = Some(
//!         BgpProcess::new("2.2.2.2".parse()?)
//!             .neighbor(BgpNeighbor::new("192.168.0.1".parse()?, 2, 1))
//!             .network("10.0.0.0/24".parse()?),
//!     );
//!
//!     let g = Graph::new(vec![r1, r2], None)?;
//!     assert_eq!(g.neighbors("R1").collect::<Vec<_>>(), vec!["R2"]);
//!     Ok(())
//! }
//! ```

mod acl;
pub mod community;
mod config;
mod flow;
mod graph;
pub mod policy;
mod types;

pub use acl::*;
pub use community::{CommunityList, CommunityListLine, CommunityMatch, CommunityVar, CommunityVarKind};
pub use config::*;
pub use flow::*;
pub use graph::*;
pub use policy::{
    AsPathListExpr, BooleanExpr, CommunitySetExpr, LongExpr, PrefixSetExpr, RoutingPolicy,
    Statement,
};
pub use types::*;
