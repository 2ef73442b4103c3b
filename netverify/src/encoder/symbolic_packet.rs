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

//! Symbolic packet headers.

use crate::smt::{Context, Expr};

/// Symbolic packet, shared by every router of one slice. Packets are never rewritten.
#[derive(Debug, Clone)]
pub struct SymbolicPacket {
    /// Destination address, 32 bit
    pub dst_ip: Expr,
    /// Source address, 32 bit
    pub src_ip: Expr,
    /// Destination port
    pub dst_port: Expr,
    /// Source port
    pub src_port: Expr,
    /// ICMP code
    pub icmp_code: Expr,
    /// ICMP type
    pub icmp_type: Expr,
    /// IP protocol number
    pub ip_protocol: Expr,
    /// TCP ACK
    pub tcp_ack: Expr,
    /// TCP CWR
    pub tcp_cwr: Expr,
    /// TCP ECE
    pub tcp_ece: Expr,
    /// TCP FIN
    pub tcp_fin: Expr,
    /// TCP PSH
    pub tcp_psh: Expr,
    /// TCP RST
    pub tcp_rst: Expr,
    /// TCP SYN
    pub tcp_syn: Expr,
    /// TCP URG
    pub tcp_urg: Expr,
}

impl SymbolicPacket {
    /// Allocate the packet variables, with names prefixed by `prefix`.
    pub fn new(ctx: &mut Context, prefix: &str) -> Self {
        let n = |s: &str| format!("{}{}", prefix, s);
        Self {
            dst_ip: ctx.mk_bv_var(n("dst-ip"), 32),
            src_ip: ctx.mk_bv_var(n("src-ip"), 32),
            dst_port: ctx.mk_int_var(n("dst-port")),
            src_port: ctx.mk_int_var(n("src-port")),
            icmp_code: ctx.mk_int_var(n("icmp-code")),
            icmp_type: ctx.mk_int_var(n("icmp-type")),
            ip_protocol: ctx.mk_int_var(n("ip-protocol")),
            tcp_ack: ctx.mk_bool_var(n("tcp-ack")),
            tcp_cwr: ctx.mk_bool_var(n("tcp-cwr")),
            tcp_ece: ctx.mk_bool_var(n("tcp-ece")),
            tcp_fin: ctx.mk_bool_var(n("tcp-fin")),
            tcp_psh: ctx.mk_bool_var(n("tcp-psh")),
            tcp_rst: ctx.mk_bool_var(n("tcp-rst")),
            tcp_syn: ctx.mk_bool_var(n("tcp-syn")),
            tcp_urg: ctx.mk_bool_var(n("tcp-urg")),
        }
    }

    /// TCP flags in the order of [`TcpFlags::named`](crate::network::TcpFlags::named)
    pub fn tcp_flags(&self) -> [&Expr; 8] {
        [
            &self.tcp_ack,
            &self.tcp_cwr,
            &self.tcp_ece,
            &self.tcp_fin,
            &self.tcp_psh,
            &self.tcp_rst,
            &self.tcp_syn,
            &self.tcp_urg,
        ]
    }

    /// Field-wise equality of two packets
    pub fn mk_eq(&self, other: &SymbolicPacket) -> Expr {
        let mut eqs = vec![
            self.dst_ip.equals(&other.dst_ip),
            self.src_ip.equals(&other.src_ip),
            self.dst_port.equals(&other.dst_port),
            self.src_port.equals(&other.src_port),
            self.icmp_code.equals(&other.icmp_code),
            self.icmp_type.equals(&other.icmp_type),
            self.ip_protocol.equals(&other.ip_protocol),
        ];
        for (a, b) in self.tcp_flags().iter().zip(other.tcp_flags().iter()) {
            eqs.push(a.equals(b));
        }
        Expr::and_all(eqs)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names_are_prefixed() {
        let mut ctx = Context::new();
        let p = SymbolicPacket::new(&mut ctx, "0_");
        assert_eq!(p.dst_ip.var_name(), Some("0_dst-ip"));
        assert_eq!(p.tcp_urg.var_name(), Some("0_tcp-urg"));
        assert_eq!(ctx.num_variables(), 15);
        assert!(p.mk_eq(&p).is_true());
    }
}
