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

//! # Encoder
//!
//! Translates the network [`Graph`](crate::network::Graph) into a formula over symbolic packets,
//! routes, and link failures. The [`Encoder`] owns one or more [`EncoderSlice`]s: the main slice
//! models the packets of the question, and every router with iBGP sessions gets a slice that
//! models the packets towards its session address, such that iBGP messages only flow if the IGP
//! reaches the peer.
//!
//! Routing policies are compiled by the [`TransferFunction`] into side-effect-free formulas
//! relating the route received over an edge to the route installed (or sent) on it.
//!
//! Two encoders can share one [`Context`](crate::smt::Context). Every variable name starts with
//! the id of its encoder, which keeps the two copies of the network apart.

pub mod acl;
mod decisions;
mod encoding;
mod failures;
mod logical_graph;
mod optimizations;
mod slice;
mod symbolic_enum;
mod symbolic_packet;
mod symbolic_route;
pub mod transfer;

pub use decisions::SymbolicDecisions;
pub use encoding::{decode_enum, packet_model, route_model, Encoder};
pub use failures::SymbolicFailures;
pub use logical_graph::{EdgeType, LogicalEdge, LogicalEdgeId, LogicalGraph};
pub use optimizations::{relevant_prefix, Optimizations};
pub use slice::{
    default_admin_distance, default_med, slice_name, EncoderSlice, SliceEnv, DEFAULT_LOCAL_PREF,
    MAIN_SLICE_NAME,
};
pub use symbolic_enum::{
    SymbolicArea, SymbolicEnum, SymbolicHistory, SymbolicOriginatorId, SymbolicOspfType,
};
pub use symbolic_packet::SymbolicPacket;
pub use symbolic_route::SymbolicRoute;
pub use transfer::TransferFunction;

use crate::network::{NetworkError, Protocol};
use crate::smt::SmtError;
use thiserror::Error;

/// Errors raised while building the encoding
#[derive(Debug, Error, PartialEq)]
pub enum EncodingError {
    /// A value outside of the domain of a symbolic enumeration was requested
    #[error("Value {0} is not part of the domain of {1}")]
    UnknownEnumValue(String, String),
    /// No router id is known for a protocol that needs one
    #[error("Cannot determine the router id of {0} for {1}")]
    MissingRouterId(String, Protocol),
    /// An access list uses a match that has no symbolic model
    #[error("Access list {0} uses an unsupported match: {1}")]
    UnsupportedAclMatch(String, String),
    /// A routing policy uses a construct that has no symbolic model
    #[error("Unsupported construct {construct} in {direction} policy of {router} ({proto}) on {edge}")]
    UnsupportedConstruct {
        /// The construct
        construct: String,
        /// Router of the policy
        router: String,
        /// Protocol of the policy
        proto: Protocol,
        /// `import` or `export`
        direction: &'static str,
        /// Edge the policy is applied on
        edge: String,
    },
    /// A first-match chain without any policy
    #[error("Empty first-match chain in a policy of {0}")]
    EmptyFirstMatchChain(String),
    /// A symbolic variable that must exist was not allocated
    #[error("Missing symbolic variable: {0}")]
    MissingVariable(String),
    /// Error in the network model
    #[error("{0}")]
    Network(#[from] NetworkError),
    /// Error of the solver
    #[error("{0}")]
    Smt(#[from] SmtError),
}
