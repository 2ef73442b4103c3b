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

//! Module containing all error types

use crate::encoder::EncodingError;
use crate::network::NetworkError;
use crate::properties::QueryError;
use crate::smt::SmtError;
use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Error propagated from the solver interface
    #[error("SMT Error: {0}")]
    SmtError(#[from] SmtError),
    /// Error in the network model
    #[error("Network Error: {0}")]
    NetworkError(#[from] NetworkError),
    /// Error while building the encoding
    #[error("Encoding Error: {0}")]
    EncodingError(#[from] EncodingError),
    /// The question cannot be answered for this network
    #[error("Query Error: {0}")]
    QueryError(#[from] QueryError),
}
