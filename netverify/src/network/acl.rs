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

//! # Access Lists
//!
//! Packet filters attached to interfaces, with a concrete evaluation on [`Flow`]s.

use super::{Flow, Ip, LineAction, NetworkError, Prefix, SubRange, TcpFlags};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named access list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpAccessList {
    /// Name of the list
    pub name: String,
    /// Lines, evaluated in order
    pub lines: Vec<AclLine>,
}

/// Line of an access list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AclLine {
    /// Textual description of the line
    pub name: String,
    /// Action taken when the line matches
    pub action: LineAction,
    /// Match condition
    pub matcher: AclLineMatchExpr,
}

/// Match condition of an access list line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AclLineMatchExpr {
    /// Matches every packet
    True,
    /// Matches no packet
    False,
    /// Matches packets in the header space
    MatchHeaderSpace(HeaderSpace),
    /// All sub-expressions match
    And(Vec<AclLineMatchExpr>),
    /// Some sub-expression matches
    Or(Vec<AclLineMatchExpr>),
    /// Negation
    Not(Box<AclLineMatchExpr>),
    /// Matches if the named access list permits the packet
    PermittedByAcl(String),
    /// Matches the interface the packet was received on
    MatchSrcInterface(Vec<String>),
}

/// Matcher on TCP flags. Flags set to `None` are not constrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpFlagsMatch {
    /// ACK
    pub ack: Option<bool>,
    /// CWR
    pub cwr: Option<bool>,
    /// ECE
    pub ece: Option<bool>,
    /// FIN
    pub fin: Option<bool>,
    /// PSH
    pub psh: Option<bool>,
    /// RST
    pub rst: Option<bool>,
    /// SYN
    pub syn: Option<bool>,
    /// URG
    pub urg: Option<bool>,
}

impl TcpFlagsMatch {
    /// Names and constraints of all flags, in the order of [`TcpFlags::named`]
    pub fn named(&self) -> [(&'static str, Option<bool>); 8] {
        [
            ("ack", self.ack),
            ("cwr", self.cwr),
            ("ece", self.ece),
            ("fin", self.fin),
            ("psh", self.psh),
            ("rst", self.rst),
            ("syn", self.syn),
            ("urg", self.urg),
        ]
    }

    /// Returns true if all constrained flags have the required value
    pub fn matches(&self, flags: &TcpFlags) -> bool {
        self.named()
            .iter()
            .zip(flags.named().iter())
            .all(|((_, want), (_, have))| want.map(|w| w == *have).unwrap_or(true))
    }
}

/// Set of packet headers. Empty positive lists do not constrain the packet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderSpace {
    /// Destination addresses
    pub dst_ips: Vec<Prefix>,
    /// Excluded destination addresses
    pub not_dst_ips: Vec<Prefix>,
    /// Source addresses
    pub src_ips: Vec<Prefix>,
    /// Excluded source addresses
    pub not_src_ips: Vec<Prefix>,
    /// Destination ports
    pub dst_ports: Vec<SubRange>,
    /// Excluded destination ports
    pub not_dst_ports: Vec<SubRange>,
    /// Source ports
    pub src_ports: Vec<SubRange>,
    /// Excluded source ports
    pub not_src_ports: Vec<SubRange>,
    /// IP protocols
    pub ip_protocols: Vec<u8>,
    /// Excluded IP protocols
    pub not_ip_protocols: Vec<u8>,
    /// ICMP types
    pub icmp_types: Vec<SubRange>,
    /// Excluded ICMP types
    pub not_icmp_types: Vec<SubRange>,
    /// ICMP codes
    pub icmp_codes: Vec<SubRange>,
    /// Excluded ICMP codes
    pub not_icmp_codes: Vec<SubRange>,
    /// TCP flag matchers, one of which must match
    pub tcp_flags: Vec<TcpFlagsMatch>,
}

fn ip_in(ip: Ip, pos: &[Prefix], neg: &[Prefix]) -> bool {
    (pos.is_empty() || pos.iter().any(|p| p.contains_ip(ip)))
        && !neg.iter().any(|p| p.contains_ip(ip))
}

fn num_in(v: u32, pos: &[SubRange], neg: &[SubRange]) -> bool {
    (pos.is_empty() || pos.iter().any(|r| r.includes(v))) && !neg.iter().any(|r| r.includes(v))
}

impl HeaderSpace {
    /// Returns true if the flow lies in the header space
    pub fn matches(&self, flow: &Flow) -> bool {
        let proto = flow.ip_protocol;
        ip_in(flow.dst_ip, &self.dst_ips, &self.not_dst_ips)
            && ip_in(flow.src_ip, &self.src_ips, &self.not_src_ips)
            && num_in(flow.dst_port, &self.dst_ports, &self.not_dst_ports)
            && num_in(flow.src_port, &self.src_ports, &self.not_src_ports)
            && (self.ip_protocols.is_empty() || self.ip_protocols.iter().any(|p| *p as u32 == proto))
            && !self.not_ip_protocols.iter().any(|p| *p as u32 == proto)
            && num_in(flow.icmp_type, &self.icmp_types, &self.not_icmp_types)
            && num_in(flow.icmp_code, &self.icmp_codes, &self.not_icmp_codes)
            && (self.tcp_flags.is_empty()
                || self.tcp_flags.iter().any(|m| m.matches(&flow.tcp_flags)))
    }
}

/// Result of filtering a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterResult {
    /// Index of the first matching line, if any
    pub matched_line: Option<usize>,
    /// Resulting action. Packets matching no line are denied.
    pub action: LineAction,
}

impl IpAccessList {
    /// Create a new access list
    pub fn new(name: impl Into<String>, lines: Vec<AclLine>) -> Self {
        Self { name: name.into(), lines }
    }

    /// Evaluate the access list on a concrete packet. `acls` resolves references to other lists.
    pub fn filter(
        &self,
        flow: &Flow,
        acls: &BTreeMap<String, IpAccessList>,
    ) -> Result<FilterResult, NetworkError> {
        for (i, line) in self.lines.iter().enumerate() {
            if line.matcher.matches(flow, acls)? {
                return Ok(FilterResult { matched_line: Some(i), action: line.action });
            }
        }
        Ok(FilterResult { matched_line: None, action: LineAction::Deny })
    }
}

impl AclLineMatchExpr {
    /// Concrete evaluation on a packet. Packets are not associated with a source interface, so
    /// [`AclLineMatchExpr::MatchSrcInterface`] never matches.
    pub fn matches(
        &self,
        flow: &Flow,
        acls: &BTreeMap<String, IpAccessList>,
    ) -> Result<bool, NetworkError> {
        Ok(match self {
            AclLineMatchExpr::True => true,
            AclLineMatchExpr::False => false,
            AclLineMatchExpr::MatchHeaderSpace(h) => h.matches(flow),
            AclLineMatchExpr::And(xs) => {
                for x in xs {
                    if !x.matches(flow, acls)? {
                        return Ok(false);
                    }
                }
                true
            }
            AclLineMatchExpr::Or(xs) => {
                for x in xs {
                    if x.matches(flow, acls)? {
                        return Ok(true);
                    }
                }
                false
            }
            AclLineMatchExpr::Not(x) => !x.matches(flow, acls)?,
            AclLineMatchExpr::PermittedByAcl(name) => {
                let acl = acls
                    .get(name)
                    .ok_or_else(|| NetworkError::AclNotFound(flow.ingress_node.clone(), name.clone()))?;
                acl.filter(flow, acls)?.action.is_permit()
            }
            AclLineMatchExpr::MatchSrcInterface(_) => false,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreemap;

    fn flow(dst: &str, port: u32) -> Flow {
        Flow {
            ingress_node: "r1".to_string(),
            dst_ip: dst.parse().unwrap(),
            dst_port: port,
            ip_protocol: 6,
            ..Default::default()
        }
    }

    fn deny_web() -> IpAccessList {
        IpAccessList::new(
            "deny-web",
            vec![
                AclLine {
                    name: "deny tcp any 10.0.0.0/24 eq 80".to_string(),
                    action: LineAction::Deny,
                    matcher: AclLineMatchExpr::MatchHeaderSpace(HeaderSpace {
                        dst_ips: vec!["10.0.0.0/24".parse().unwrap()],
                        dst_ports: vec![SubRange::singleton(80)],
                        ..Default::default()
                    }),
                },
                AclLine {
                    name: "permit ip any any".to_string(),
                    action: LineAction::Permit,
                    matcher: AclLineMatchExpr::True,
                },
            ],
        )
    }

    #[test]
    fn filter_first_match() {
        let acl = deny_web();
        let acls = BTreeMap::new();
        let r = acl.filter(&flow("10.0.0.1", 80), &acls).unwrap();
        assert_eq!(r, FilterResult { matched_line: Some(0), action: LineAction::Deny });
        let r = acl.filter(&flow("10.0.0.1", 22), &acls).unwrap();
        assert_eq!(r, FilterResult { matched_line: Some(1), action: LineAction::Permit });
    }

    #[test]
    fn filter_default_deny_and_reference() {
        let empty = IpAccessList::new("empty", vec![]);
        let acls = btreemap! {"deny-web".to_string() => deny_web()};
        let r = empty.filter(&flow("1.1.1.1", 80), &acls).unwrap();
        assert_eq!(r.action, LineAction::Deny);
        assert_eq!(r.matched_line, None);
        let nested = IpAccessList::new(
            "nested",
            vec![AclLine {
                name: "permit if deny-web permits".to_string(),
                action: LineAction::Permit,
                matcher: AclLineMatchExpr::PermittedByAcl("deny-web".to_string()),
            }],
        );
        assert!(nested.filter(&flow("1.1.1.1", 80), &acls).unwrap().action.is_permit());
        assert!(!nested.filter(&flow("10.0.0.9", 80), &acls).unwrap().action.is_permit());
    }

    #[test]
    fn tcp_flags_match() {
        let m = TcpFlagsMatch { syn: Some(true), ack: Some(false), ..Default::default() };
        assert!(m.matches(&TcpFlags { syn: true, ..Default::default() }));
        assert!(!m.matches(&TcpFlags { syn: true, ack: true, ..Default::default() }));
    }
}
