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

//! # Network Graph
//!
//! The [`Graph`] is built once from the router configurations and a physical [`Topology`]. It
//! contains one directed [`GraphEdge`] per interface with an address, and additional edges for
//! null-routed static routes and for iBGP sessions. All other lookups needed by the encoding
//! (BGP neighbors, route reflectors, static routes per interface, communities) are computed here.

use super::community::{community_dependencies, find_communities, CommunityMatch, CommunityVar};
use super::policy::{walk_policy, PolicyNode};
use super::{
    BgpNeighbor, BooleanExpr, Configuration, Interface, InterfaceAddress, NetworkError, Prefix,
    Protocol, StaticRoute,
};
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Name of the interface used by null-routed static routes
pub const NULL_INTERFACE_NAME: &str = "null_interface";

/// Prefix of the names of abstract iBGP interfaces
pub const IBGP_INTERFACE_PREFIX: &str = "iBGP-";

/// Directed edge of the network graph, starting at `router` on interface `start`.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    /// Router owning the start interface
    pub router: String,
    /// Start interface
    pub start: Interface,
    /// Neighboring router, if it is part of the network
    pub peer: Option<String>,
    /// Interface of the neighbor
    pub end: Option<Interface>,
    /// Edge of an iBGP session rather than a physical link
    pub is_abstract: bool,
    /// Edge of a null-routed static route
    pub is_null_edge: bool,
}

impl GraphEdge {
    fn key(&self) -> (&str, &str, Option<InterfaceAddress>, Option<&str>, Option<&str>, bool, bool) {
        (
            &self.router,
            &self.start.name,
            self.start.address,
            self.peer.as_deref(),
            self.end.as_ref().map(|i| i.name.as_str()),
            self.is_abstract,
            self.is_null_edge,
        )
    }

    /// Address of the start interface
    pub fn start_address(&self) -> Option<InterfaceAddress> {
        self.start.address
    }

    /// Address of the end interface
    pub fn end_address(&self) -> Option<InterfaceAddress> {
        self.end.as_ref().and_then(|i| i.address)
    }
}

impl PartialEq for GraphEdge {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for GraphEdge {}

impl Hash for GraphEdge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state)
    }
}

impl PartialOrd for GraphEdge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GraphEdge {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for GraphEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{} --> ", self.router, self.start.name)?;
        match (&self.peer, &self.end) {
            (Some(p), Some(e)) => write!(f, "{},{}", p, e.name),
            (None, Some(e)) => write!(f, "_,{}", e.name),
            _ => write!(f, "_"),
        }
    }
}

/// Kind of a BGP session, from the point of view of the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BgpSendType {
    /// Sending to an eBGP peer
    ToEbgp,
    /// Sending to a regular iBGP peer
    ToNonclient,
    /// Route reflector sending to one of its clients
    ToClient,
    /// Client sending to its route reflector
    ToRr,
}

/// Interface of a router, used to describe the topology
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeInterface {
    /// Name of the router
    pub router: String,
    /// Name of the interface
    pub iface: String,
}

impl NodeInterface {
    /// Create a new node interface
    pub fn new(router: impl Into<String>, iface: impl Into<String>) -> Self {
        Self { router: router.into(), iface: iface.into() }
    }
}

/// Physical links between interfaces. Links are undirected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    links: BTreeSet<(NodeInterface, NodeInterface)>,
}

impl Topology {
    /// Empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a link between two interfaces
    pub fn add_link(&mut self, a: NodeInterface, b: NodeInterface) -> &mut Self {
        if a <= b {
            self.links.insert((a, b));
        } else {
            self.links.insert((b, a));
        }
        self
    }

    /// All links
    pub fn links(&self) -> impl Iterator<Item = &(NodeInterface, NodeInterface)> {
        self.links.iter()
    }

    /// Interfaces linked to `ni`
    pub fn neighbors(&self, ni: &NodeInterface) -> BTreeSet<NodeInterface> {
        self.links
            .iter()
            .filter_map(|(a, b)| {
                if a == ni {
                    Some(b.clone())
                } else if b == ni {
                    Some(a.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Infer the topology from the interface addresses: two interfaces are linked if they are in
    /// the same subnet and have distinct addresses. Loopbacks and host routes are never linked.
    pub fn infer(configs: &BTreeMap<String, Configuration>) -> Self {
        let mut candidates: Vec<(NodeInterface, InterfaceAddress)> = Vec::new();
        for conf in configs.values() {
            for iface in conf.interfaces.values() {
                if iface.is_loopback() || !iface.active {
                    continue;
                }
                if let Some(addr) = iface.address {
                    if addr.len < 32 {
                        candidates.push((NodeInterface::new(&conf.hostname, &iface.name), addr));
                    }
                }
            }
        }
        let mut topo = Topology::new();
        for (i, (n1, a1)) in candidates.iter().enumerate() {
            for (n2, a2) in candidates.iter().skip(i + 1) {
                if a1.prefix() == a2.prefix() && a1.ip != a2.ip {
                    topo.add_link(n1.clone(), n2.clone());
                }
            }
        }
        topo
    }
}

/// Network graph, see the module documentation.
#[derive(Debug, Clone)]
pub struct Graph {
    configurations: BTreeMap<String, Configuration>,
    edge_map: BTreeMap<String, Vec<GraphEdge>>,
    all_real_edges: BTreeSet<GraphEdge>,
    all_edges: BTreeSet<GraphEdge>,
    other_end: HashMap<GraphEdge, GraphEdge>,
    neighbors: BTreeMap<String, BTreeSet<String>>,
    static_routes: BTreeMap<String, BTreeMap<String, Vec<StaticRoute>>>,
    has_static_route_with_dynamic_next_hop: bool,
    ebgp_neighbors: HashMap<GraphEdge, BgpNeighbor>,
    ibgp_neighbors: HashMap<GraphEdge, BgpNeighbor>,
    route_reflector_parent: BTreeMap<String, String>,
    route_reflector_clients: BTreeMap<String, BTreeSet<String>>,
    originator_id: BTreeMap<String, u64>,
    area_ids: BTreeMap<String, BTreeSet<u64>>,
    domain_map: BTreeMap<String, usize>,
    domains: Vec<BTreeSet<String>>,
    all_communities: BTreeSet<CommunityVar>,
    community_dependencies: BTreeMap<CommunityVar, Vec<CommunityVar>>,
    named_communities: BTreeMap<String, String>,
}

impl Graph {
    /// Build the graph from the configurations. Without a topology, links are inferred from the
    /// interface addresses.
    pub fn new(
        configs: Vec<Configuration>,
        topology: Option<&Topology>,
    ) -> Result<Self, NetworkError> {
        let mut configurations = BTreeMap::new();
        for conf in configs {
            let name = conf.hostname.clone();
            if configurations.insert(name.clone(), conf).is_some() {
                return Err(NetworkError::DuplicateRouter(name));
            }
        }
        let inferred;
        let topology = match topology {
            Some(t) => t,
            None => {
                inferred = Topology::infer(&configurations);
                &inferred
            }
        };

        let mut g = Graph {
            configurations,
            edge_map: BTreeMap::new(),
            all_real_edges: BTreeSet::new(),
            all_edges: BTreeSet::new(),
            other_end: HashMap::new(),
            neighbors: BTreeMap::new(),
            static_routes: BTreeMap::new(),
            has_static_route_with_dynamic_next_hop: false,
            ebgp_neighbors: HashMap::new(),
            ibgp_neighbors: HashMap::new(),
            route_reflector_parent: BTreeMap::new(),
            route_reflector_clients: BTreeMap::new(),
            originator_id: BTreeMap::new(),
            area_ids: BTreeMap::new(),
            domain_map: BTreeMap::new(),
            domains: Vec::new(),
            all_communities: BTreeSet::new(),
            community_dependencies: BTreeMap::new(),
            named_communities: BTreeMap::new(),
        };
        g.init_graph(topology)?;
        g.init_static_routes();
        g.add_null_route_edges();
        g.init_ebgp_neighbors();
        g.init_ibgp_neighbors();
        g.init_area_ids();
        g.init_domains();
        g.init_communities()?;
        Ok(g)
    }

    fn init_graph(&mut self, topology: &Topology) -> Result<(), NetworkError> {
        for (a, b) in topology.links() {
            for ni in [a, b].iter() {
                let conf = self
                    .configurations
                    .get(&ni.router)
                    .ok_or_else(|| NetworkError::InconsistentTopology(format!("{:?}", ni)))?;
                if !conf.interfaces.contains_key(&ni.iface) {
                    return Err(NetworkError::InterfaceNotFound(
                        ni.router.clone(),
                        ni.iface.clone(),
                    ));
                }
            }
        }

        for (router, conf) in self.configurations.iter() {
            let mut edges: BTreeSet<GraphEdge> = BTreeSet::new();
            let mut neighs: BTreeSet<String> = BTreeSet::new();
            for iface in conf.interfaces.values() {
                let external = GraphEdge {
                    router: router.clone(),
                    start: iface.clone(),
                    peer: None,
                    end: None,
                    is_abstract: false,
                    is_null_edge: false,
                };
                let ns = topology.neighbors(&NodeInterface::new(router, &iface.name));
                if ns.is_empty() {
                    if iface.address.is_some() {
                        edges.insert(external);
                    }
                    continue;
                }
                if ns.len() > 2 {
                    edges.insert(external);
                    continue;
                }
                for n in ns {
                    if &n.router == router {
                        edges.insert(external.clone());
                    }
                    // validated above
                    let i2 = self.configurations[&n.router].interfaces[&n.iface].clone();
                    let ge1 = GraphEdge {
                        router: router.clone(),
                        start: iface.clone(),
                        peer: Some(n.router.clone()),
                        end: Some(i2.clone()),
                        is_abstract: false,
                        is_null_edge: false,
                    };
                    let ge2 = GraphEdge {
                        router: n.router.clone(),
                        start: i2,
                        peer: Some(router.clone()),
                        end: Some(iface.clone()),
                        is_abstract: false,
                        is_null_edge: false,
                    };
                    self.other_end.insert(ge1.clone(), ge2);
                    edges.insert(ge1);
                    neighs.insert(n.router);
                }
            }
            self.all_real_edges.extend(edges.iter().cloned());
            self.all_edges.extend(edges.iter().cloned());
            self.edge_map.insert(router.clone(), edges.into_iter().collect());
            self.neighbors.insert(router.clone(), neighs);
        }
        Ok(())
    }

    fn init_static_routes(&mut self) {
        for (router, conf) in self.configurations.iter() {
            let mut map: BTreeMap<String, Vec<StaticRoute>> = BTreeMap::new();
            for sr in conf.static_routes.iter() {
                let mut some_iface = false;
                for ge in self.edge_map[router].iter() {
                    let here = &ge.start.name;
                    if sr.next_hop_interface.as_deref() == Some(here.as_str()) {
                        some_iface = true;
                        map.entry(here.clone()).or_default().push(sr.clone());
                    }
                    let is_next_hop = match (ge.end_address(), sr.next_hop_ip) {
                        (Some(a), Some(nh)) => a.ip == nh,
                        _ => false,
                    };
                    if is_next_hop {
                        some_iface = true;
                        map.entry(here.clone()).or_default().push(sr.clone());
                    }
                }
                if !some_iface && !sr.is_null_routed() {
                    self.has_static_route_with_dynamic_next_hop = true;
                }
            }
            self.static_routes.insert(router.clone(), map);
        }
    }

    fn add_null_route_edges(&mut self) {
        for (router, conf) in self.configurations.iter() {
            for sr in conf.static_routes.iter().filter(|sr| sr.is_null_routed()) {
                let mut iface = Interface::new(
                    NULL_INTERFACE_NAME,
                    InterfaceAddress::new(sr.network.start_ip(), sr.network.len()),
                );
                iface.active = true;
                self.static_routes
                    .entry(router.clone())
                    .or_default()
                    .entry(NULL_INTERFACE_NAME.to_string())
                    .or_default()
                    .push(sr.clone());
                let ge = GraphEdge {
                    router: router.clone(),
                    start: iface,
                    peer: None,
                    end: None,
                    is_abstract: false,
                    is_null_edge: true,
                };
                self.all_real_edges.insert(ge.clone());
                self.all_edges.insert(ge.clone());
                self.edge_map.entry(router.clone()).or_default().push(ge);
            }
        }
    }

    fn init_ebgp_neighbors(&mut self) {
        for (router, conf) in self.configurations.iter() {
            let bgp = match &conf.bgp {
                Some(bgp) => bgp,
                None => continue,
            };
            for ge in self.edge_map[router].iter() {
                let prefix = match ge.start.prefix() {
                    Some(p) => p,
                    None => continue,
                };
                for n in bgp.neighbors.iter().filter(|n| !n.is_ibgp()) {
                    if prefix.contains_ip(n.peer_address) {
                        self.ebgp_neighbors.insert(ge.clone(), n.clone());
                    }
                }
            }
        }
    }

    /// iBGP sessions likely to come up: source router -> target router -> session of the source.
    fn generate_ibgp_neighbors(&self) -> BTreeMap<String, BTreeMap<String, BgpNeighbor>> {
        let mut local_ips: BTreeMap<&str, BTreeSet<_>> = BTreeMap::new();
        for (router, conf) in self.configurations.iter() {
            if let Some(bgp) = &conf.bgp {
                for n in bgp.neighbors.iter().filter(|n| n.is_ibgp()) {
                    if let Some(ip) = n.local_ip {
                        local_ips.entry(router.as_str()).or_default().insert(ip);
                    }
                }
            }
        }
        let mut neighbors: BTreeMap<String, BTreeMap<String, BgpNeighbor>> = BTreeMap::new();
        for (router, conf) in self.configurations.iter() {
            let bgp = match &conf.bgp {
                Some(bgp) => bgp,
                None => continue,
            };
            for n in bgp.neighbors.iter().filter(|n| n.is_ibgp()) {
                for (candidate, ips) in local_ips.iter() {
                    if *candidate != router && ips.contains(&n.peer_address) {
                        neighbors
                            .entry(router.clone())
                            .or_default()
                            .insert(candidate.to_string(), n.clone());
                    }
                }
            }
        }
        neighbors
    }

    fn init_ibgp_neighbors(&mut self) {
        let neighbors = self.generate_ibgp_neighbors();
        let ibgp_iface = |n: &BgpNeighbor, peer: &str| {
            Interface::new(
                format!("{}{}", IBGP_INTERFACE_PREFIX, peer),
                InterfaceAddress::new(n.peer_address, 32),
            )
        };

        let mut reverse: BTreeMap<(String, String), GraphEdge> = BTreeMap::new();
        for (r1, ns) in neighbors.iter() {
            for (r2, n1) in ns.iter() {
                let back = neighbors.get(r2).and_then(|m| m.get(r1));
                let ge = GraphEdge {
                    router: r1.clone(),
                    start: ibgp_iface(n1, r2),
                    peer: back.map(|_| r2.clone()),
                    end: back.map(|n2| ibgp_iface(n2, r1)),
                    is_abstract: true,
                    is_null_edge: false,
                };
                self.all_edges.insert(ge.clone());
                self.ibgp_neighbors.insert(ge.clone(), n1.clone());
                self.edge_map.entry(r1.clone()).or_default().push(ge.clone());
                reverse.insert((r1.clone(), r2.clone()), ge);
            }
        }
        for ((r1, r2), ge1) in reverse.iter() {
            if let Some(ge2) = reverse.get(&(r2.clone(), r1.clone())) {
                self.other_end.insert(ge1.clone(), ge2.clone());
            }
        }

        let mut id = 1;
        for (r1, ns) in neighbors.iter() {
            if !self.originator_id.contains_key(r1) {
                self.originator_id.insert(r1.clone(), id);
                id += 1;
            }
            let mut clients = BTreeSet::new();
            for (r2, n) in ns.iter() {
                if n.route_reflector_client {
                    clients.insert(r2.clone());
                    self.route_reflector_parent.insert(r2.clone(), r1.clone());
                }
            }
            self.route_reflector_clients.insert(r1.clone(), clients);
        }
    }

    fn init_area_ids(&mut self) {
        for (router, conf) in self.configurations.iter() {
            let ids = if conf.ospf.is_some() { conf.ospf_areas().collect() } else { BTreeSet::new() };
            self.area_ids.insert(router.clone(), ids);
        }
    }

    /// Routers connected without crossing an eBGP session form a domain. Domains are ordered by
    /// their smallest router name.
    fn init_domains(&mut self) {
        let routers: Vec<&String> = self.configurations.keys().collect();
        let index: HashMap<&str, usize> =
            routers.iter().enumerate().map(|(i, r)| (r.as_str(), i)).collect();
        let mut uf = UnionFind::new(routers.len());
        for (router, edges) in self.edge_map.iter() {
            for ge in edges.iter().filter(|ge| !self.ebgp_neighbors.contains_key(*ge)) {
                let peer = ge.peer.as_deref().and_then(|p| index.get(p));
                if let (Some(a), Some(b)) = (index.get(router.as_str()), peer) {
                    uf.union(*a, *b);
                }
            }
        }
        let mut by_root: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
        for (i, r) in routers.iter().enumerate() {
            by_root.entry(uf.find(i)).or_default().insert((*r).clone());
        }
        let mut domains: Vec<BTreeSet<String>> = by_root.into_iter().map(|(_, d)| d).collect();
        domains.sort_by(|a, b| a.iter().next().cmp(&b.iter().next()));
        for (i, domain) in domains.iter().enumerate() {
            for r in domain.iter() {
                self.domain_map.insert(r.clone(), i);
            }
        }
        self.domains = domains;
    }

    fn init_communities(&mut self) -> Result<(), NetworkError> {
        let mut comms = BTreeSet::new();
        for conf in self.configurations.values() {
            comms.extend(find_communities(conf)?);
        }
        let others: Vec<CommunityVar> = comms
            .iter()
            .filter(|c| c.is_regex())
            .map(|c| CommunityVar::other(c.value()))
            .collect();
        comms.extend(others);
        self.community_dependencies = community_dependencies(&comms)?;
        self.all_communities = comms;

        for conf in self.configurations.values() {
            for (name, cl) in conf.community_lists.iter() {
                if let [line] = cl.lines.as_slice() {
                    if let CommunityMatch::Regex(r) = &line.matcher {
                        self.named_communities.insert(r.clone(), name.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// All router configurations, by name
    pub fn configurations(&self) -> &BTreeMap<String, Configuration> {
        &self.configurations
    }

    /// Configuration of a router
    pub fn config(&self, router: &str) -> Result<&Configuration, NetworkError> {
        self.configurations
            .get(router)
            .ok_or_else(|| NetworkError::RouterNotFound(router.to_string()))
    }

    /// Names of all routers
    pub fn routers(&self) -> impl Iterator<Item = &String> {
        self.configurations.keys()
    }

    /// Outgoing edges of every router
    pub fn edge_map(&self) -> &BTreeMap<String, Vec<GraphEdge>> {
        &self.edge_map
    }

    /// Outgoing edges of a router
    pub fn edges(&self, router: &str) -> &[GraphEdge] {
        self.edge_map.get(router).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// All edges, including abstract iBGP edges
    pub fn all_edges(&self) -> &BTreeSet<GraphEdge> {
        &self.all_edges
    }

    /// All physical and null-route edges
    pub fn all_real_edges(&self) -> &BTreeSet<GraphEdge> {
        &self.all_real_edges
    }

    /// The same link in the opposite direction
    pub fn other_end(&self, ge: &GraphEdge) -> Option<&GraphEdge> {
        self.other_end.get(ge)
    }

    /// Physical neighbors of a router
    pub fn neighbors(&self, router: &str) -> impl Iterator<Item = &String> {
        self.neighbors.get(router).into_iter().flatten()
    }

    /// Static routes of a router that leave through the given interface
    pub fn static_routes(&self, router: &str, iface: &str) -> &[StaticRoute] {
        self.static_routes
            .get(router)
            .and_then(|m| m.get(iface))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns true if some static route has no directly connected next hop
    pub fn has_static_route_with_dynamic_next_hop(&self) -> bool {
        self.has_static_route_with_dynamic_next_hop
    }

    /// eBGP sessions by edge
    pub fn ebgp_neighbors(&self) -> &HashMap<GraphEdge, BgpNeighbor> {
        &self.ebgp_neighbors
    }

    /// iBGP sessions by (abstract) edge
    pub fn ibgp_neighbors(&self) -> &HashMap<GraphEdge, BgpNeighbor> {
        &self.ibgp_neighbors
    }

    /// Route reflector of each client
    pub fn route_reflector_parent(&self) -> &BTreeMap<String, String> {
        &self.route_reflector_parent
    }

    /// Clients of each route reflector
    pub fn route_reflector_clients(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.route_reflector_clients
    }

    /// Originator id of every router with iBGP sessions, starting at 1
    pub fn originator_id(&self) -> &BTreeMap<String, u64> {
        &self.originator_id
    }

    /// OSPF areas of a router
    pub fn area_ids(&self, router: &str) -> impl Iterator<Item = &u64> {
        self.area_ids.get(router).into_iter().flatten()
    }

    /// Routers in the same autonomous system as `router`
    pub fn domain(&self, router: &str) -> Option<&BTreeSet<String>> {
        self.domain_map.get(router).map(|i| &self.domains[*i])
    }

    /// All community variables of the network
    pub fn all_communities(&self) -> &BTreeSet<CommunityVar> {
        &self.all_communities
    }

    /// Variables each regex community depends on
    pub fn community_dependencies(&self) -> &BTreeMap<CommunityVar, Vec<CommunityVar>> {
        &self.community_dependencies
    }

    /// Name of community lists consisting of a single regex, by regex
    pub fn named_communities(&self) -> &BTreeMap<String, String> {
        &self.named_communities
    }

    /// BGP session type of an edge
    pub fn peer_type(&self, ge: &GraphEdge) -> Result<BgpSendType, NetworkError> {
        if self.ebgp_neighbors.contains_key(ge) {
            return Ok(BgpSendType::ToEbgp);
        }
        if self.ibgp_neighbors.contains_key(ge) {
            let is_client_of = |rr: Option<&String>, client: &str| {
                rr.and_then(|rr| self.route_reflector_clients.get(rr))
                    .map(|cs| cs.contains(client))
                    .unwrap_or(false)
            };
            if is_client_of(ge.peer.as_ref(), &ge.router) {
                return Ok(BgpSendType::ToRr);
            }
            if let Some(peer) = &ge.peer {
                if is_client_of(Some(&ge.router), peer) {
                    return Ok(BgpSendType::ToClient);
                }
            }
            return Ok(BgpSendType::ToNonclient);
        }
        Err(NetworkError::InconsistentTopology(format!("Invalid BGP edge: {}", ge)))
    }

    /// BGP session of an edge
    pub fn find_bgp_neighbor(&self, ge: &GraphEdge) -> Option<&BgpNeighbor> {
        if ge.is_abstract {
            self.ibgp_neighbors.get(ge)
        } else {
            self.ebgp_neighbors.get(ge)
        }
    }

    /// Returns true if the edge leads to an eBGP peer outside of the network
    pub fn is_external(&self, ge: &GraphEdge) -> bool {
        ge.peer.is_none() && self.ebgp_neighbors.contains_key(ge)
    }

    /// Returns true if the router is an end host
    pub fn is_host(&self, router: &str) -> bool {
        self.configurations.get(router).map(|c| c.is_host).unwrap_or(false)
    }

    /// Returns true if the edge starts at a loopback interface
    pub fn is_loopback(&self, ge: &GraphEdge) -> bool {
        ge.start.is_loopback()
    }

    /// Returns true if the interface takes part in the protocol
    pub fn is_interface_active(proto: Protocol, iface: &Interface) -> bool {
        if proto.is_ospf() {
            iface.active && iface.ospf_enabled
        } else {
            iface.active
        }
    }

    /// Returns true if the edge can carry routes of the protocol
    pub fn is_edge_used(&self, conf: &Configuration, proto: Protocol, ge: &GraphEdge) -> bool {
        let iface = &ge.start;
        if ge.is_null_edge {
            return proto.is_static();
        }
        if !Self::is_interface_active(proto, iface) {
            return false;
        }
        if iface.name.starts_with(IBGP_INTERFACE_PREFIX) {
            return proto.is_bgp();
        }
        if iface.is_loopback() {
            return proto.is_connected();
        }
        let to_outside = match &ge.peer {
            None => true,
            Some(p) => self.is_host(p),
        };
        if to_outside && proto.is_ospf() {
            return false;
        }
        match proto {
            Protocol::Static => !self.static_routes(&conf.hostname, &iface.name).is_empty(),
            Protocol::Bgp => {
                self.ebgp_neighbors.contains_key(ge) || self.ibgp_neighbors.contains_key(ge)
            }
            _ => true,
        }
    }

    /// Name of the import policy of the edge
    pub fn find_import_routing_policy(&self, proto: Protocol, ge: &GraphEdge) -> Option<&str> {
        match proto {
            Protocol::Bgp => self.find_bgp_neighbor(ge).and_then(|n| n.import_policy.as_deref()),
            _ => None,
        }
    }

    /// Name of the export policy of the edge
    pub fn find_export_routing_policy<'a>(
        &'a self,
        conf: &'a Configuration,
        proto: Protocol,
        ge: &GraphEdge,
    ) -> Option<&'a str> {
        match proto {
            Protocol::Ospf => conf.ospf.as_ref().and_then(|o| o.export_policy.as_deref()),
            Protocol::Bgp => self.find_bgp_neighbor(ge).and_then(|n| n.export_policy.as_deref()),
            _ => None,
        }
    }

    /// Protocols that may be redistributed into `proto` by the policy
    pub fn find_redistributed_protocols(
        conf: &Configuration,
        policy: &str,
        proto: Protocol,
    ) -> BTreeSet<Protocol> {
        let mut protos = BTreeSet::new();
        walk_policy(conf, policy, &mut |n| {
            if let PolicyNode::Expr(BooleanExpr::MatchProtocol(ps)) = n {
                protos.extend(ps.iter().filter_map(|p| p.to_protocol()).filter(|p| *p != proto));
            }
        });
        protos
    }

    /// Router id of the neighbor across the edge, or `None` if it cannot be determined. Router
    /// ids are only tracked for BGP.
    pub fn find_router_id(&self, ge: &GraphEdge, proto: Protocol) -> Option<u64> {
        if !proto.is_bgp() {
            return Some(0);
        }
        if let Some(other) = self.other_end.get(ge) {
            return self.configurations.get(&other.router).map(|c| c.bgp_router_id().as_u64());
        }
        self.find_bgp_neighbor(ge).map(|n| n.peer_address.as_u64())
    }

    /// Prefixes originated by a router into a protocol. Connected and static routes originate
    /// their own networks.
    pub fn originated_networks(conf: &Configuration, proto: Protocol) -> BTreeSet<Prefix> {
        match proto {
            Protocol::Ospf => conf
                .interfaces
                .values()
                .filter(|i| i.active && i.ospf_enabled)
                .filter_map(|i| i.prefix())
                .collect(),
            Protocol::Connected => conf.interfaces.values().filter_map(|i| i.prefix()).collect(),
            Protocol::Static => conf.static_routes.iter().map(|sr| sr.network).collect(),
            Protocol::Bgp => {
                conf.bgp.as_ref().map(|b| b.networks.iter().cloned().collect()).unwrap_or_default()
            }
        }
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---------- Router to edges map ----------")?;
        for (router, edges) in self.edge_map.iter() {
            writeln!(f, "Router: {}", router)?;
            for ge in edges {
                write!(f, "  edge from: {}", ge.start.name)?;
                match (&ge.peer, &ge.end) {
                    (Some(p), Some(e)) => write!(f, " to: {},{}", p, e.name)?,
                    _ => write!(f, " to: null")?,
                }
                if let Some(a) = ge.start.address {
                    write!(f, " {}", a)?;
                }
                writeln!(f)?;
            }
        }
        writeln!(f, "---------------- eBGP Neighbors ----------------")?;
        for ge in self.all_edges.iter() {
            if let Some(n) = self.ebgp_neighbors.get(ge) {
                writeln!(f, "Edge: {} ({})", ge, n.peer_address)?;
            }
        }
        writeln!(f, "---------------- iBGP Neighbors ----------------")?;
        for ge in self.all_edges.iter() {
            if let Some(n) = self.ibgp_neighbors.get(ge) {
                writeln!(f, "Edge: {} ({})", ge, n.peer_address)?;
            }
        }
        writeln!(f, "---------- Static Routes by Interface ----------")?;
        for (router, map) in self.static_routes.iter() {
            for (iface, srs) in map.iter() {
                for sr in srs {
                    writeln!(f, "Router: {}, Interface: {} --> {}", router, iface, sr.network)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::{BgpProcess, Ip};

    fn addr(s: &str) -> InterfaceAddress {
        s.parse().unwrap()
    }

    fn ip(s: &str) -> Ip {
        s.parse().unwrap()
    }

    fn two_routers() -> Vec<Configuration> {
        let mut r1 = Configuration::new("r1");
        r1.add_interface(Interface::new("eth0", addr("10.0.0.1/30")))
            .add_interface(Interface::new("eth1", addr("192.168.0.1/24")))
            .add_static_route(StaticRoute::via("0.0.0.0/0".parse().unwrap(), ip("10.0.0.2")))
            .add_static_route(StaticRoute::null("172.16.0.0/12".parse().unwrap()));
        r1.bgp = Some(
            BgpProcess::new(ip("1.1.1.1"))
                .neighbor(BgpNeighbor::new(ip("10.0.0.2"), 1, 2))
                .neighbor(BgpNeighbor::new(ip("192.168.0.2"), 1, 3)),
        );
        let mut r2 = Configuration::new("r2");
        r2.add_interface(Interface::new("eth0", addr("10.0.0.2/30")));
        r2.bgp = Some(BgpProcess::new(ip("2.2.2.2")).neighbor(BgpNeighbor::new(ip("10.0.0.1"), 2, 1)));
        vec![r1, r2]
    }

    #[test]
    fn inferred_edges() {
        let g = Graph::new(two_routers(), None).unwrap();
        let r1 = g.edges("r1");
        assert_eq!(r1.len(), 3);
        let link = r1.iter().find(|e| e.start.name == "eth0").unwrap();
        assert_eq!(link.peer.as_deref(), Some("r2"));
        let back = g.other_end(link).unwrap();
        assert_eq!(back.router, "r2");
        assert_eq!(g.other_end(back), Some(link));
        let ext = r1.iter().find(|e| e.start.name == "eth1").unwrap();
        assert!(ext.peer.is_none());
        assert!(g.is_external(ext));
        assert!(!g.is_external(link));
        assert_eq!(g.peer_type(link).unwrap(), BgpSendType::ToEbgp);
        assert_eq!(g.domain("r1"), Some(&maplit::btreeset! {"r1".to_string()}));
    }

    #[test]
    fn static_and_null_routes() {
        let g = Graph::new(two_routers(), None).unwrap();
        assert_eq!(g.static_routes("r1", "eth0").len(), 1);
        let null = g.edges("r1").iter().find(|e| e.is_null_edge).unwrap();
        assert_eq!(g.static_routes("r1", NULL_INTERFACE_NAME).len(), 1);
        let conf = g.config("r1").unwrap();
        assert!(g.is_edge_used(conf, Protocol::Static, null));
        assert!(!g.is_edge_used(conf, Protocol::Bgp, null));
        assert!(!g.has_static_route_with_dynamic_next_hop());
    }

    #[test]
    fn router_ids() {
        let g = Graph::new(two_routers(), None).unwrap();
        let link = g.edges("r1").iter().find(|e| e.start.name == "eth0").unwrap();
        assert_eq!(g.find_router_id(link, Protocol::Bgp), Some(ip("2.2.2.2").as_u64()));
        assert_eq!(g.find_router_id(link, Protocol::Ospf), Some(0));
        let ext = g.edges("r1").iter().find(|e| e.start.name == "eth1").unwrap();
        assert_eq!(g.find_router_id(ext, Protocol::Bgp), Some(ip("192.168.0.2").as_u64()));
    }

    #[test]
    fn ibgp_route_reflector() {
        let mut confs = Vec::new();
        for (name, lo, peers) in [
            ("rr", "9.9.9.1", vec!["9.9.9.2", "9.9.9.3"]),
            ("c1", "9.9.9.2", vec!["9.9.9.1"]),
            ("c2", "9.9.9.3", vec!["9.9.9.1"]),
        ]
        .iter()
        {
            let mut c = Configuration::new(*name);
            c.add_interface(Interface::new("lo0", addr(&format!("{}/32", lo))).loopback());
            let mut bgp = BgpProcess::new(ip(lo));
            for p in peers {
                let mut n = BgpNeighbor::new(ip(p), 1, 1).local_ip(ip(lo));
                if *name == "rr" {
                    n = n.rr_client();
                }
                bgp = bgp.neighbor(n);
            }
            c.bgp = Some(bgp);
            confs.push(c);
        }
        let g = Graph::new(confs, Some(&Topology::new())).unwrap();
        let to_c1 = g.edges("rr").iter().find(|e| e.start.name == "iBGP-c1").unwrap();
        assert!(to_c1.is_abstract);
        assert_eq!(g.peer_type(to_c1).unwrap(), BgpSendType::ToClient);
        let to_rr = g.other_end(to_c1).unwrap();
        assert_eq!(g.peer_type(to_rr).unwrap(), BgpSendType::ToRr);
        assert_eq!(g.route_reflector_parent()["c1"], "rr");
        assert_eq!(g.originator_id().len(), 3);
        assert_eq!(g.originator_id()["c1"], 1);
        let conf = g.config("rr").unwrap();
        assert!(g.is_edge_used(conf, Protocol::Bgp, to_c1));
        assert!(!g.is_edge_used(conf, Protocol::Ospf, to_c1));
    }

    #[test]
    fn duplicate_router() {
        let confs = vec![Configuration::new("r1"), Configuration::new("r1")];
        assert_eq!(
            Graph::new(confs, None).unwrap_err(),
            NetworkError::DuplicateRouter("r1".to_string())
        );
    }
}
