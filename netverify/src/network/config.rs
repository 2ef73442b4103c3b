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

//! # Router Configurations
//!
//! Vendor-independent configuration of a single router. Configurations are usually read from
//! JSON files, but they can also be built in code:
//!
//! ```rust
//! use netverify::network::{Configuration, Interface};
//!
//! let mut r1 = Configuration::new("r1");
//! r1.add_interface(Interface::new("eth0", "10.0.0.1/30".parse().unwrap()).ospf(0, 1));
//! assert!(r1.interfaces.contains_key("eth0"));
//! ```

use super::community::CommunityList;
use super::policy::RoutingPolicy;
use super::{InterfaceAddress, Ip, IpAccessList, LineAction, Prefix, PrefixRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_true() -> bool {
    true
}

fn default_admin_cost() -> u32 {
    1
}

/// Configuration of a router (or host)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Name of the device
    pub hostname: String,
    /// True if the device is an end host rather than a router
    #[serde(default)]
    pub is_host: bool,
    /// Interfaces, by name
    #[serde(default)]
    pub interfaces: BTreeMap<String, Interface>,
    /// Static routes
    #[serde(default)]
    pub static_routes: Vec<StaticRoute>,
    /// Aggregate routes
    #[serde(default)]
    pub generated_routes: Vec<GeneratedRoute>,
    /// BGP process
    #[serde(default)]
    pub bgp: Option<BgpProcess>,
    /// OSPF process
    #[serde(default)]
    pub ospf: Option<OspfProcess>,
    /// Access lists, by name
    #[serde(default)]
    pub acls: BTreeMap<String, IpAccessList>,
    /// Routing policies, by name
    #[serde(default)]
    pub routing_policies: BTreeMap<String, RoutingPolicy>,
    /// Community lists, by name
    #[serde(default)]
    pub community_lists: BTreeMap<String, CommunityList>,
    /// Route filter lists, by name
    #[serde(default)]
    pub route_filter_lists: BTreeMap<String, RouteFilterList>,
}

impl Configuration {
    /// Create an empty router configuration
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            is_host: false,
            interfaces: BTreeMap::new(),
            static_routes: Vec::new(),
            generated_routes: Vec::new(),
            bgp: None,
            ospf: None,
            acls: BTreeMap::new(),
            routing_policies: BTreeMap::new(),
            community_lists: BTreeMap::new(),
            route_filter_lists: BTreeMap::new(),
        }
    }

    /// Add an interface, replacing an interface of the same name
    pub fn add_interface(&mut self, iface: Interface) -> &mut Self {
        self.interfaces.insert(iface.name.clone(), iface);
        self
    }

    /// Add a routing policy
    pub fn add_policy(&mut self, policy: RoutingPolicy) -> &mut Self {
        self.routing_policies.insert(policy.name.clone(), policy);
        self
    }

    /// Add an access list
    pub fn add_acl(&mut self, acl: IpAccessList) -> &mut Self {
        self.acls.insert(acl.name.clone(), acl);
        self
    }

    /// Add a community list
    pub fn add_community_list(&mut self, list: CommunityList) -> &mut Self {
        self.community_lists.insert(list.name.clone(), list);
        self
    }

    /// Add a route filter list
    pub fn add_route_filter_list(&mut self, list: RouteFilterList) -> &mut Self {
        self.route_filter_lists.insert(list.name.clone(), list);
        self
    }

    /// Add a static route
    pub fn add_static_route(&mut self, route: StaticRoute) -> &mut Self {
        self.static_routes.push(route);
        self
    }

    /// Router id of the BGP process, or `0.0.0.0`
    pub fn bgp_router_id(&self) -> Ip {
        self.bgp.as_ref().map(|b| b.router_id).unwrap_or(Ip::ZERO)
    }

    /// All OSPF areas of the interfaces of this router
    pub fn ospf_areas(&self) -> impl Iterator<Item = u64> + '_ {
        self.interfaces.values().filter_map(|i| i.ospf_area)
    }
}

/// Interface of a router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    /// Name of the interface
    pub name: String,
    /// Assigned address, if any
    #[serde(default)]
    pub address: Option<InterfaceAddress>,
    /// Administrative state
    #[serde(default = "default_true")]
    pub active: bool,
    /// Loopback interface
    #[serde(default)]
    pub loopback: bool,
    /// ACL filtering packets received on the interface
    #[serde(default)]
    pub incoming_filter: Option<String>,
    /// ACL filtering packets sent out of the interface
    #[serde(default)]
    pub outgoing_filter: Option<String>,
    /// OSPF runs on the interface
    #[serde(default)]
    pub ospf_enabled: bool,
    /// OSPF cost
    #[serde(default)]
    pub ospf_cost: Option<u32>,
    /// OSPF area
    #[serde(default)]
    pub ospf_area: Option<u64>,
}

impl Interface {
    /// Create an active interface with an address
    pub fn new(name: impl Into<String>, address: InterfaceAddress) -> Self {
        Self {
            name: name.into(),
            address: Some(address),
            active: true,
            loopback: false,
            incoming_filter: None,
            outgoing_filter: None,
            ospf_enabled: false,
            ospf_cost: None,
            ospf_area: None,
        }
    }

    /// Enable OSPF on the interface
    pub fn ospf(mut self, area: u64, cost: u32) -> Self {
        self.ospf_enabled = true;
        self.ospf_area = Some(area);
        self.ospf_cost = Some(cost);
        self
    }

    /// Set the incoming ACL
    pub fn incoming_filter(mut self, acl: impl Into<String>) -> Self {
        self.incoming_filter = Some(acl.into());
        self
    }

    /// Set the outgoing ACL
    pub fn outgoing_filter(mut self, acl: impl Into<String>) -> Self {
        self.outgoing_filter = Some(acl.into());
        self
    }

    /// Mark the interface as loopback
    pub fn loopback(mut self) -> Self {
        self.loopback = true;
        self
    }

    /// Returns true for loopback interfaces, recognized by the flag or by the name
    pub fn is_loopback(&self) -> bool {
        self.loopback || self.name.to_lowercase().starts_with("lo")
    }

    /// The attached subnet
    pub fn prefix(&self) -> Option<Prefix> {
        self.address.map(|a| a.prefix())
    }
}

/// Static route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticRoute {
    /// Destination network
    pub network: Prefix,
    /// Next hop address
    #[serde(default)]
    pub next_hop_ip: Option<Ip>,
    /// Next hop interface
    #[serde(default)]
    pub next_hop_interface: Option<String>,
    /// Administrative distance
    #[serde(default = "default_admin_cost")]
    pub admin_cost: u32,
}

impl StaticRoute {
    /// Static route towards a next hop address
    pub fn via(network: Prefix, next_hop: Ip) -> Self {
        Self { network, next_hop_ip: Some(next_hop), next_hop_interface: None, admin_cost: 1 }
    }

    /// Static route out of an interface
    pub fn out(network: Prefix, iface: impl Into<String>) -> Self {
        Self {
            network,
            next_hop_ip: None,
            next_hop_interface: Some(iface.into()),
            admin_cost: 1,
        }
    }

    /// Static route dropping all traffic
    pub fn null(network: Prefix) -> Self {
        Self::out(network, super::NULL_INTERFACE_NAME)
    }

    /// Returns true if traffic is dropped
    pub fn is_null_routed(&self) -> bool {
        self.next_hop_interface.as_deref() == Some(super::NULL_INTERFACE_NAME)
    }
}

/// Aggregate route, originated by BGP when a more specific route exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedRoute {
    /// Aggregate network
    pub network: Prefix,
    /// Drop traffic not matching any more specific route
    #[serde(default)]
    pub discard: bool,
    /// Suppress more specific routes when exporting
    #[serde(default)]
    pub summary_only: bool,
}

/// BGP process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpProcess {
    /// Router id
    pub router_id: Ip,
    /// Neighbors, in configuration order
    #[serde(default)]
    pub neighbors: Vec<BgpNeighbor>,
    /// Multipath for eBGP routes
    #[serde(default)]
    pub multipath_ebgp: bool,
    /// Multipath for iBGP routes
    #[serde(default)]
    pub multipath_ibgp: bool,
    /// Networks originated into BGP
    #[serde(default)]
    pub networks: Vec<Prefix>,
}

impl BgpProcess {
    /// Create a BGP process without neighbors
    pub fn new(router_id: Ip) -> Self {
        Self {
            router_id,
            neighbors: Vec::new(),
            multipath_ebgp: false,
            multipath_ibgp: false,
            networks: Vec::new(),
        }
    }

    /// Add a neighbor
    pub fn neighbor(mut self, n: BgpNeighbor) -> Self {
        self.neighbors.push(n);
        self
    }

    /// Originate a network
    pub fn network(mut self, p: Prefix) -> Self {
        self.networks.push(p);
        self
    }
}

/// BGP session to a neighbor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpNeighbor {
    /// Address of the peer
    pub peer_address: Ip,
    /// Local address of the session
    #[serde(default)]
    pub local_ip: Option<Ip>,
    /// Local AS number
    pub local_as: u32,
    /// AS number of the peer
    pub remote_as: u32,
    /// Policy applied to received routes
    #[serde(default)]
    pub import_policy: Option<String>,
    /// Policy applied to sent routes
    #[serde(default)]
    pub export_policy: Option<String>,
    /// Send communities to the peer
    #[serde(default = "default_true")]
    pub send_community: bool,
    /// The peer is a route reflector client
    #[serde(default)]
    pub route_reflector_client: bool,
}

impl BgpNeighbor {
    /// Create a session without policies
    pub fn new(peer_address: Ip, local_as: u32, remote_as: u32) -> Self {
        Self {
            peer_address,
            local_ip: None,
            local_as,
            remote_as,
            import_policy: None,
            export_policy: None,
            send_community: true,
            route_reflector_client: false,
        }
    }

    /// Returns true for iBGP sessions
    pub fn is_ibgp(&self) -> bool {
        self.local_as == self.remote_as
    }

    /// Set the local address
    pub fn local_ip(mut self, ip: Ip) -> Self {
        self.local_ip = Some(ip);
        self
    }

    /// Set the import policy
    pub fn import_policy(mut self, name: impl Into<String>) -> Self {
        self.import_policy = Some(name.into());
        self
    }

    /// Set the export policy
    pub fn export_policy(mut self, name: impl Into<String>) -> Self {
        self.export_policy = Some(name.into());
        self
    }

    /// Mark the peer as route reflector client
    pub fn rr_client(mut self) -> Self {
        self.route_reflector_client = true;
        self
    }
}

/// OSPF process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OspfProcess {
    /// Router id
    pub router_id: Ip,
    /// Policy selecting routes redistributed into OSPF
    #[serde(default)]
    pub export_policy: Option<String>,
}

/// Line of a route filter list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteFilterLine {
    /// Action of the line
    pub action: LineAction,
    /// Matched prefixes
    pub range: PrefixRange,
}

/// Named route filter list. The first matching line decides, and no match denies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteFilterList {
    /// Name of the list
    pub name: String,
    /// Lines of the list
    pub lines: Vec<RouteFilterLine>,
}

impl RouteFilterList {
    /// Concrete evaluation on a prefix
    pub fn permits(&self, p: &Prefix) -> bool {
        self.lines
            .iter()
            .find(|l| l.range.includes_prefix(p))
            .map(|l| l.action.is_permit())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::SubRange;

    #[test]
    fn defaults_from_json() {
        let conf: Configuration = serde_json::from_str(
            r#"{
                "hostname": "r1",
                "interfaces": {
                    "eth0": { "name": "eth0", "address": "10.0.0.1/30" }
                },
                "bgp": {
                    "router_id": "1.1.1.1",
                    "neighbors": [
                        { "peer_address": "10.0.0.2", "local_as": 1, "remote_as": 2 }
                    ]
                }
            }"#,
        )
        .unwrap();
        let iface = &conf.interfaces["eth0"];
        assert!(iface.active);
        assert!(!iface.ospf_enabled);
        assert_eq!(iface.prefix(), Some("10.0.0.0/30".parse().unwrap()));
        let n = &conf.bgp.as_ref().unwrap().neighbors[0];
        assert!(n.send_community);
        assert!(!n.is_ibgp());
        assert_eq!(conf.bgp_router_id(), "1.1.1.1".parse().unwrap());
    }

    #[test]
    fn null_routes() {
        let p: Prefix = "10.0.0.0/8".parse().unwrap();
        assert!(StaticRoute::null(p).is_null_routed());
        assert!(!StaticRoute::via(p, Ip(1)).is_null_routed());
    }

    #[test]
    fn route_filter_first_match() {
        let p: Prefix = "10.0.0.0/8".parse().unwrap();
        let rfl = RouteFilterList {
            name: "f".to_string(),
            lines: vec![
                RouteFilterLine {
                    action: LineAction::Deny,
                    range: PrefixRange::new(p, SubRange::new(25, 32)),
                },
                RouteFilterLine { action: LineAction::Permit, range: PrefixRange::new(p, SubRange::new(8, 32)) },
            ],
        };
        assert!(rfl.permits(&"10.1.0.0/16".parse().unwrap()));
        assert!(!rfl.permits(&"10.1.0.0/30".parse().unwrap()));
        assert!(!rfl.permits(&"11.0.0.0/8".parse().unwrap()));
    }
}
