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

//! Compilation of header spaces and access lists over the symbolic packet.

use super::symbolic_packet::SymbolicPacket;
use super::EncodingError;
use crate::network::{mask_of, AclLineMatchExpr, HeaderSpace, IpAccessList, Prefix, SubRange};
use crate::smt::Expr;

/// The first `prefix.len()` bits of the 32 bit term `x` equal the ones of the prefix.
pub fn first_bits_equal(x: &Expr, prefix: &Prefix) -> Expr {
    let len = prefix.len();
    if len == 0 {
        return Expr::tru();
    }
    let mask = Expr::bv(mask_of(len) as u64, 32);
    let value = Expr::bv(prefix.start_ip().as_u64(), 32);
    x.bvand(&mask).equals(&value.bvand(&mask))
}

fn in_range(x: &Expr, r: &SubRange) -> Expr {
    if r.start == r.end {
        x.equals(&Expr::int(r.start as i64))
    } else {
        Expr::int(r.start as i64).le(x).and(&x.le(&Expr::int(r.end as i64)))
    }
}

/// Positive list (empty means unconstrained) minus the negative list.
fn constrain<T, F>(pos: &[T], neg: &[T], f: F) -> Expr
where
    F: Fn(&T) -> Expr,
{
    let positive = if pos.is_empty() { Expr::tru() } else { Expr::or_all(pos.iter().map(&f)) };
    let negative = Expr::or_all(neg.iter().map(&f));
    positive.and(&negative.not())
}

/// Formula describing the packets of a header space
pub fn header_space(pkt: &SymbolicPacket, hs: &HeaderSpace) -> Expr {
    let int = |x: &Expr, v: u8| x.equals(&Expr::int(v as i64));
    let tcp = if hs.tcp_flags.is_empty() {
        Expr::tru()
    } else {
        Expr::or_all(hs.tcp_flags.iter().map(|m| {
            Expr::and_all(
                m.named()
                    .iter()
                    .zip(pkt.tcp_flags().iter())
                    .filter_map(|((_, want), var)| want.map(|w| var.equals(&Expr::bool(w)))),
            )
        }))
    };
    Expr::and_all(vec![
        constrain(&hs.dst_ips, &hs.not_dst_ips, |p| first_bits_equal(&pkt.dst_ip, p)),
        constrain(&hs.src_ips, &hs.not_src_ips, |p| first_bits_equal(&pkt.src_ip, p)),
        constrain(&hs.dst_ports, &hs.not_dst_ports, |r| in_range(&pkt.dst_port, r)),
        constrain(&hs.src_ports, &hs.not_src_ports, |r| in_range(&pkt.src_port, r)),
        constrain(&hs.ip_protocols, &hs.not_ip_protocols, |p| int(&pkt.ip_protocol, *p)),
        constrain(&hs.icmp_types, &hs.not_icmp_types, |r| in_range(&pkt.icmp_type, r)),
        constrain(&hs.icmp_codes, &hs.not_icmp_codes, |r| in_range(&pkt.icmp_code, r)),
        tcp,
    ])
}

fn match_expr(pkt: &SymbolicPacket, acl: &str, e: &AclLineMatchExpr) -> Result<Expr, EncodingError> {
    Ok(match e {
        AclLineMatchExpr::True => Expr::tru(),
        AclLineMatchExpr::False => Expr::fls(),
        AclLineMatchExpr::MatchHeaderSpace(hs) => header_space(pkt, hs),
        AclLineMatchExpr::And(xs) => Expr::and_all(
            xs.iter().map(|x| match_expr(pkt, acl, x)).collect::<Result<Vec<_>, _>>()?,
        ),
        AclLineMatchExpr::Or(xs) => Expr::or_all(
            xs.iter().map(|x| match_expr(pkt, acl, x)).collect::<Result<Vec<_>, _>>()?,
        ),
        AclLineMatchExpr::Not(x) => match_expr(pkt, acl, x)?.not(),
        AclLineMatchExpr::PermittedByAcl(name) => {
            return Err(EncodingError::UnsupportedAclMatch(
                acl.to_string(),
                format!("PermittedByAcl({})", name),
            ))
        }
        AclLineMatchExpr::MatchSrcInterface(ifaces) => {
            return Err(EncodingError::UnsupportedAclMatch(
                acl.to_string(),
                format!("MatchSrcInterface({})", ifaces.join(",")),
            ))
        }
    })
}

/// Formula that holds if the access list permits the packet. The first matching line decides,
/// and packets matching no line are denied.
pub fn compile_acl(pkt: &SymbolicPacket, acl: &IpAccessList) -> Result<Expr, EncodingError> {
    let mut acc = Expr::fls();
    for line in acl.lines.iter().rev() {
        let m = match_expr(pkt, &acl.name, &line.matcher)?;
        acc = Expr::ite(&m, &Expr::bool(line.action.is_permit()), &acc);
    }
    Ok(acc)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::*;
    use crate::smt::{Context, Model, Value};

    fn packet(ctx: &mut Context) -> SymbolicPacket {
        SymbolicPacket::new(ctx, "0_")
    }

    fn model(dst: &str, port: i64) -> Model {
        let mut m = Model::new();
        m.set("0_dst-ip", Value::BitVec(dst.parse::<Ip>().unwrap().as_u64()))
            .set("0_dst-port", Value::Int(port))
            .set("0_ip-protocol", Value::Int(IP_PROTOCOL_TCP as i64));
        m
    }

    #[test]
    fn prefix_match_ignores_host_bits() {
        let mut ctx = Context::new();
        let pkt = packet(&mut ctx);
        let p: Prefix = "10.0.0.0/24".parse().unwrap();
        let e = first_bits_equal(&pkt.dst_ip, &p);
        assert!(model("10.0.0.77", 0).eval_bool(&e).unwrap());
        assert!(!model("10.0.1.1", 0).eval_bool(&e).unwrap());
        assert!(first_bits_equal(&pkt.dst_ip, &"0.0.0.0/0".parse().unwrap()).is_true());
    }

    #[test]
    fn first_matching_line_decides() {
        let mut ctx = Context::new();
        let pkt = packet(&mut ctx);
        let deny_ssh = HeaderSpace { dst_ports: vec![SubRange::singleton(22)], ..Default::default() };
        let net = HeaderSpace { dst_ips: vec!["10.0.0.0/8".parse().unwrap()], ..Default::default() };
        let acl = IpAccessList::new(
            "filter",
            vec![
                AclLine {
                    name: "deny ssh".to_string(),
                    action: LineAction::Deny,
                    matcher: AclLineMatchExpr::MatchHeaderSpace(deny_ssh),
                },
                AclLine {
                    name: "permit net".to_string(),
                    action: LineAction::Permit,
                    matcher: AclLineMatchExpr::MatchHeaderSpace(net),
                },
            ],
        );
        let e = compile_acl(&pkt, &acl).unwrap();
        assert!(!model("10.1.1.1", 22).eval_bool(&e).unwrap());
        assert!(model("10.1.1.1", 80).eval_bool(&e).unwrap());
        assert!(!model("11.1.1.1", 80).eval_bool(&e).unwrap());
    }

    #[test]
    fn negative_lists_exclude() {
        let mut ctx = Context::new();
        let pkt = packet(&mut ctx);
        let hs = HeaderSpace {
            dst_ports: vec![SubRange::new(0, 1000)],
            not_dst_ports: vec![SubRange::singleton(179)],
            ..Default::default()
        };
        let e = header_space(&pkt, &hs);
        assert!(model("1.1.1.1", 80).eval_bool(&e).unwrap());
        assert!(!model("1.1.1.1", 179).eval_bool(&e).unwrap());
        assert!(!model("1.1.1.1", 2000).eval_bool(&e).unwrap());
    }

    #[test]
    fn nested_acl_reference_is_rejected() {
        let mut ctx = Context::new();
        let pkt = packet(&mut ctx);
        let acl = IpAccessList::new(
            "outer",
            vec![AclLine {
                name: "ref".to_string(),
                action: LineAction::Permit,
                matcher: AclLineMatchExpr::PermittedByAcl("inner".to_string()),
            }],
        );
        assert!(matches!(
            compile_acl(&pkt, &acl),
            Err(EncodingError::UnsupportedAclMatch(name, _)) if name == "outer"
        ));
    }
}
