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

//! Concrete packets

use super::Ip;
use serde::{Deserialize, Serialize};
use std::fmt;

/// TCP flags of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TcpFlags {
    /// ACK
    pub ack: bool,
    /// CWR
    pub cwr: bool,
    /// ECE
    pub ece: bool,
    /// FIN
    pub fin: bool,
    /// PSH
    pub psh: bool,
    /// RST
    pub rst: bool,
    /// SYN
    pub syn: bool,
    /// URG
    pub urg: bool,
}

impl TcpFlags {
    /// Names and values of all flags, in a fixed order
    pub fn named(&self) -> [(&'static str, bool); 8] {
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
}

/// Concrete packet entering the network at a router
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Flow {
    /// Router where the packet enters
    pub ingress_node: String,
    /// Source address
    pub src_ip: Ip,
    /// Destination address
    pub dst_ip: Ip,
    /// Source port
    pub src_port: u32,
    /// Destination port
    pub dst_port: u32,
    /// IP protocol number
    pub ip_protocol: u32,
    /// ICMP type
    pub icmp_type: u32,
    /// ICMP code
    pub icmp_code: u32,
    /// TCP flags
    pub tcp_flags: TcpFlags,
    /// Free-form tag
    pub tag: String,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Flow<ingress:{} src:{}:{} dst:{}:{} proto:{}",
            self.ingress_node,
            self.src_ip,
            self.src_port,
            self.dst_ip,
            self.dst_port,
            self.ip_protocol
        )?;
        if self.icmp_type != 0 || self.icmp_code != 0 {
            write!(f, " icmp:{}/{}", self.icmp_type, self.icmp_code)?;
        }
        for (name, set) in self.tcp_flags.named().iter() {
            if *set {
                write!(f, " {}", name)?;
            }
        }
        write!(f, ">")
    }
}
