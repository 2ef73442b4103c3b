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

//! Module containing all type definitions of the input model

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// IPv4 address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ip(pub u32);

impl Ip {
    /// The address `0.0.0.0`
    pub const ZERO: Ip = Ip(0);

    /// Numeric value as u64, as used in bit-vector literals
    pub fn as_u64(self) -> u64 {
        self.0 as u64
    }
}

impl fmt::Display for Ip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(f, "{}.{}.{}.{}", b[0], b[1], b[2], b[3])
    }
}

impl FromStr for Ip {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 4 {
            return Err(NetworkError::InvalidAddress(s.to_string()));
        }
        let mut ip: u32 = 0;
        for p in parts {
            let b: u8 = p.parse().map_err(|_| NetworkError::InvalidAddress(s.to_string()))?;
            ip = (ip << 8) | b as u32;
        }
        Ok(Ip(ip))
    }
}

impl TryFrom<String> for Ip {
    type Error = NetworkError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ip> for String {
    fn from(ip: Ip) -> Self {
        ip.to_string()
    }
}

/// Network mask of the given prefix length
pub fn mask_of(len: u8) -> u32 {
    if len == 0 {
        0
    } else if len >= 32 {
        u32::MAX
    } else {
        u32::MAX << (32 - len as u32)
    }
}

/// IPv4 prefix. The address is always the network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Prefix {
    ip: Ip,
    len: u8,
}

impl Prefix {
    /// Create a new prefix, masking the host bits of `ip`.
    pub fn new(ip: Ip, len: u8) -> Self {
        let len = len.min(32);
        Self { ip: Ip(ip.0 & mask_of(len)), len }
    }

    /// The network address
    pub fn start_ip(&self) -> Ip {
        self.ip
    }

    /// The broadcast address
    pub fn end_ip(&self) -> Ip {
        Ip(self.ip.0 | !mask_of(self.len))
    }

    /// Prefix length
    pub fn len(&self) -> u8 {
        self.len
    }

    /// Returns true if the prefix is `0.0.0.0/0`
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if `ip` lies in this prefix
    pub fn contains_ip(&self, ip: Ip) -> bool {
        ip.0 & mask_of(self.len) == self.ip.0
    }

    /// Returns true if `other` is equal to or more specific than this prefix
    pub fn contains_prefix(&self, other: &Prefix) -> bool {
        other.len >= self.len && self.contains_ip(other.ip)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.len)
    }
}

fn parse_ip_len(s: &str) -> Result<(Ip, u8), NetworkError> {
    let mut parts = s.trim().splitn(2, '/');
    let ip: Ip = parts.next().unwrap_or_default().parse()?;
    let len = match parts.next() {
        Some(l) => l.parse().map_err(|_| NetworkError::InvalidPrefix(s.to_string()))?,
        None => 32,
    };
    if len > 32 {
        return Err(NetworkError::InvalidPrefix(s.to_string()));
    }
    Ok((ip, len))
}

impl FromStr for Prefix {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, len) = parse_ip_len(s)?;
        Ok(Prefix::new(ip, len))
    }
}

impl TryFrom<String> for Prefix {
    type Error = NetworkError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Prefix> for String {
    fn from(p: Prefix) -> Self {
        p.to_string()
    }
}

/// Address assigned to an interface: the host address together with the subnet length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceAddress {
    /// Address of the interface itself
    pub ip: Ip,
    /// Length of the attached subnet
    pub len: u8,
}

impl InterfaceAddress {
    /// Create a new interface address
    pub fn new(ip: Ip, len: u8) -> Self {
        Self { ip, len: len.min(32) }
    }

    /// The attached subnet
    pub fn prefix(&self) -> Prefix {
        Prefix::new(self.ip, self.len)
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.len)
    }
}

impl FromStr for InterfaceAddress {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, len) = parse_ip_len(s)?;
        Ok(InterfaceAddress::new(ip, len))
    }
}

impl TryFrom<String> for InterfaceAddress {
    type Error = NetworkError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<InterfaceAddress> for String {
    fn from(a: InterfaceAddress) -> Self {
        a.to_string()
    }
}

/// Inclusive range of integers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubRange {
    /// Lower bound
    pub start: u32,
    /// Upper bound
    pub end: u32,
}

impl SubRange {
    /// Create a new range
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Range containing exactly one value
    pub fn singleton(v: u32) -> Self {
        Self { start: v, end: v }
    }

    /// Returns true if `v` lies in the range
    pub fn includes(&self, v: u32) -> bool {
        self.start <= v && v <= self.end
    }
}

/// A prefix together with a range of accepted prefix lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrefixRange {
    /// Prefix to match
    pub prefix: Prefix,
    /// Accepted lengths
    pub length_range: SubRange,
}

impl PrefixRange {
    /// Create a new prefix range
    pub fn new(prefix: Prefix, length_range: SubRange) -> Self {
        Self { prefix, length_range }
    }

    /// Prefix range matching exactly the prefix
    pub fn exact(prefix: Prefix) -> Self {
        Self { prefix, length_range: SubRange::singleton(prefix.len() as u32) }
    }

    /// Returns true if the prefix `p` is matched by this range
    pub fn includes_prefix(&self, p: &Prefix) -> bool {
        let len = p.len();
        let bits = self.prefix.len().min(len);
        self.length_range.includes(len as u32)
            && Prefix::new(p.start_ip(), bits) == Prefix::new(self.prefix.start_ip(), bits)
    }
}

/// Routing protocols modeled by the encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    /// Directly connected networks
    Connected,
    /// Static routes
    Static,
    /// OSPF
    Ospf,
    /// BGP
    Bgp,
}

impl Protocol {
    /// Returns true for [`Protocol::Connected`]
    pub fn is_connected(&self) -> bool {
        *self == Protocol::Connected
    }

    /// Returns true for [`Protocol::Static`]
    pub fn is_static(&self) -> bool {
        *self == Protocol::Static
    }

    /// Returns true for [`Protocol::Ospf`]
    pub fn is_ospf(&self) -> bool {
        *self == Protocol::Ospf
    }

    /// Returns true for [`Protocol::Bgp`]
    pub fn is_bgp(&self) -> bool {
        *self == Protocol::Bgp
    }

    /// Upper-case name, as used in variable names
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Connected => "CONNECTED",
            Protocol::Static => "STATIC",
            Protocol::Ospf => "OSPF",
            Protocol::Bgp => "BGP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Route sources that policies can match on. Only some of them are modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoutingProtocol {
    /// Connected route
    Connected,
    /// Static route
    Static,
    /// OSPF route
    Ospf,
    /// External BGP route
    Bgp,
    /// Internal BGP route
    Ibgp,
    /// Aggregate route
    Aggregate,
    /// IS-IS route
    Isis,
    /// RIP route
    Rip,
}

impl RoutingProtocol {
    /// The modeled protocol, if any
    pub fn to_protocol(self) -> Option<Protocol> {
        match self {
            RoutingProtocol::Connected => Some(Protocol::Connected),
            RoutingProtocol::Static => Some(Protocol::Static),
            RoutingProtocol::Ospf => Some(Protocol::Ospf),
            RoutingProtocol::Bgp | RoutingProtocol::Ibgp => Some(Protocol::Bgp),
            RoutingProtocol::Aggregate | RoutingProtocol::Isis | RoutingProtocol::Rip => None,
        }
    }
}

/// Standard BGP community, `high:low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Community(pub u32);

impl Community {
    /// Create a community from its two halves
    pub fn new(high: u16, low: u16) -> Self {
        Community(((high as u32) << 16) | low as u32)
    }
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0 >> 16, self.0 & 0xffff)
    }
}

impl FromStr for Community {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || NetworkError::InvalidCommunity(s.to_string());
        let mut parts = s.trim().splitn(2, ':');
        let high: u16 = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let low: u16 = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        Ok(Community::new(high, low))
    }
}

impl TryFrom<String> for Community {
    type Error = NetworkError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Community> for String {
    fn from(c: Community) -> Self {
        c.to_string()
    }
}

/// Action of a filter line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LineAction {
    /// Permit the matched object
    Permit,
    /// Deny the matched object
    Deny,
}

impl LineAction {
    /// Returns true for [`LineAction::Permit`]
    pub fn is_permit(&self) -> bool {
        *self == LineAction::Permit
    }
}

/// OSPF route type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OspfType {
    /// Intra-area
    O,
    /// Inter-area
    OIA,
    /// External type 1
    E1,
    /// External type 2
    E2,
}

impl OspfType {
    /// All OSPF types, in the order of preference
    pub const ALL: [OspfType; 4] = [OspfType::O, OspfType::OIA, OspfType::E1, OspfType::E2];
}

impl fmt::Display for OspfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OspfType::O => "O",
            OspfType::OIA => "OIA",
            OspfType::E1 => "E1",
            OspfType::E2 => "E2",
        };
        write!(f, "{}", s)
    }
}

/// Metric type of redistributed OSPF routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OspfMetricType {
    /// External type 1
    E1,
    /// External type 2
    E2,
}

/// IP protocol number of TCP
pub const IP_PROTOCOL_TCP: u8 = 6;
/// IP protocol number of UDP
pub const IP_PROTOCOL_UDP: u8 = 17;
/// IP protocol number of ICMP
pub const IP_PROTOCOL_ICMP: u8 = 1;
/// TCP port of BGP sessions
pub const BGP_PORT: u16 = 179;

/// Network Errors
#[derive(Error, Debug, PartialEq)]
pub enum NetworkError {
    /// Router is not present in the network
    #[error("Router does not exist: {0}")]
    RouterNotFound(String),
    /// Interface is not present on the router
    #[error("Interface {1} does not exist on router {0}")]
    InterfaceNotFound(String, String),
    /// Routing policy referenced but not defined
    #[error("Routing policy {1} is not defined on router {0}")]
    PolicyNotFound(String, String),
    /// Access list referenced but not defined
    #[error("Access list {1} is not defined on router {0}")]
    AclNotFound(String, String),
    /// Community list referenced but not defined
    #[error("Community list {1} is not defined on router {0}")]
    CommunityListNotFound(String, String),
    /// Route filter list referenced but not defined
    #[error("Route filter list {1} is not defined on router {0}")]
    RouteFilterListNotFound(String, String),
    /// Text is not an IPv4 address
    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),
    /// Text is not an IPv4 prefix
    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),
    /// Text is not a community
    #[error("Invalid community: {0}")]
    InvalidCommunity(String),
    /// Community regex does not compile
    #[error("Invalid community regex {0}: {1}")]
    InvalidRegex(String, String),
    /// Topology refers to interfaces in an inconsistent way
    #[error("Inconsistent topology: {0}")]
    InconsistentTopology(String),
    /// A router two times in the configuration set
    #[error("Router is defined multiple times: {0}")]
    DuplicateRouter(String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ip_parsing() {
        let ip: Ip = "10.0.0.1".parse().unwrap();
        assert_eq!(ip, Ip(0x0a00_0001));
        assert_eq!(ip.to_string(), "10.0.0.1");
        assert!("10.0.1".parse::<Ip>().is_err());
        assert!("10.0.0.256".parse::<Ip>().is_err());
    }

    #[test]
    fn prefix_masks_host_bits() {
        let p: Prefix = "10.0.0.5/24".parse().unwrap();
        assert_eq!(p.to_string(), "10.0.0.0/24");
        assert!(p.contains_ip("10.0.0.200".parse().unwrap()));
        assert!(!p.contains_ip("10.0.1.1".parse().unwrap()));
        assert_eq!(p.end_ip().to_string(), "10.0.0.255");
        let default: Prefix = "0.0.0.0/0".parse().unwrap();
        assert!(default.contains_prefix(&p));
        assert!(!p.contains_prefix(&default));
    }

    #[test]
    fn prefix_range() {
        let p: Prefix = "10.0.0.0/8".parse().unwrap();
        let r = PrefixRange::new(p, SubRange::new(8, 24));
        assert!(r.includes_prefix(&"10.1.0.0/16".parse().unwrap()));
        assert!(!r.includes_prefix(&"10.1.1.0/25".parse().unwrap()));
        assert!(!r.includes_prefix(&"11.0.0.0/16".parse().unwrap()));
    }

    #[test]
    fn community_text() {
        let c: Community = "65000:100".parse().unwrap();
        assert_eq!(c, Community::new(65000, 100));
        assert_eq!(c.to_string(), "65000:100");
        assert!("65000".parse::<Community>().is_err());
    }
}
