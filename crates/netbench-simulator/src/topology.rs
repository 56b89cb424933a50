//! server -> core router -> edge router -> access point -> stations.
//!
//! Addressing follows one /24 per segment: 10.1.1.0 (server, core),
//! 10.1.2.0 (core, edge), 10.1.3.0 (edge, AP) and 192.168.0.0 for the
//! wireless cell with the AP at .1 and station `i` at `.2 + i`.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum NodeId {
    Server,
    CoreRouter,
    EdgeRouter,
    AccessPoint,
    Station(u32),
}

impl NodeId {
    /// Position along the chain from the server outwards.
    fn depth(&self) -> u8 {
        match self {
            NodeId::Server => 0,
            NodeId::CoreRouter => 1,
            NodeId::EdgeRouter => 2,
            NodeId::AccessPoint => 3,
            NodeId::Station(_) => 4,
        }
    }

    fn at_depth(depth: u8) -> Self {
        match depth {
            0 => NodeId::Server,
            1 => NodeId::CoreRouter,
            2 => NodeId::EdgeRouter,
            _ => NodeId::AccessPoint,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Server => f.write_str("server"),
            NodeId::CoreRouter => f.write_str("core-router"),
            NodeId::EdgeRouter => f.write_str("edge-router"),
            NodeId::AccessPoint => f.write_str("ap"),
            NodeId::Station(i) => write!(f, "sta{i}"),
        }
    }
}

/// How a node reaches the next hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    Wired { to: NodeId },
    Wireless { to: NodeId },
}

const SERVER_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 1);
const AP_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 1);

#[derive(Debug, Clone)]
pub struct Topology {
    interfaces: Vec<(NodeId, Ipv4Addr)>,
    nodes: HashMap<Ipv4Addr, NodeId>,
}

impl Topology {
    /// `stations` must fit the /24 cell (at most 253).
    pub fn new(stations: u32) -> Self {
        let mut interfaces = vec![
            (NodeId::Server, SERVER_ADDRESS),
            (NodeId::CoreRouter, Ipv4Addr::new(10, 1, 1, 2)),
            (NodeId::CoreRouter, Ipv4Addr::new(10, 1, 2, 1)),
            (NodeId::EdgeRouter, Ipv4Addr::new(10, 1, 2, 2)),
            (NodeId::EdgeRouter, Ipv4Addr::new(10, 1, 3, 1)),
            (NodeId::AccessPoint, Ipv4Addr::new(10, 1, 3, 2)),
            (NodeId::AccessPoint, AP_ADDRESS),
        ];
        interfaces.extend((0..stations).map(|i| (NodeId::Station(i), station_address(i))));
        let nodes = interfaces.iter().map(|(node, a)| (*a, *node)).collect();
        Self { interfaces, nodes }
    }

    /// Address of the server's first (and only) interface.
    pub fn server_address(&self) -> Ipv4Addr {
        SERVER_ADDRESS
    }

    pub fn station_address(&self, index: u32) -> Ipv4Addr {
        station_address(index)
    }

    /// Every interface in the topology, for setup logging.
    pub fn interfaces(&self) -> &[(NodeId, Ipv4Addr)] {
        &self.interfaces
    }

    /// The wired links, each listed once.
    pub fn wired_links(&self) -> [(NodeId, NodeId); 3] {
        [
            (NodeId::Server, NodeId::CoreRouter),
            (NodeId::CoreRouter, NodeId::EdgeRouter),
            (NodeId::EdgeRouter, NodeId::AccessPoint),
        ]
    }

    pub fn node_for_address(&self, address: Ipv4Addr) -> Option<NodeId> {
        self.nodes.get(&address).copied()
    }

    /// Static route from `at` towards `destination`; `None` once arrived.
    pub fn next_hop(&self, at: NodeId, destination: NodeId) -> Option<Hop> {
        if at == destination {
            return None;
        }
        match (at, destination) {
            (NodeId::Station(_), _) => Some(Hop::Wireless {
                to: NodeId::AccessPoint,
            }),
            (NodeId::AccessPoint, NodeId::Station(_)) => Some(Hop::Wireless { to: destination }),
            _ => {
                let depth = if destination.depth() > at.depth() {
                    at.depth() + 1
                } else {
                    at.depth() - 1
                };
                Some(Hop::Wired {
                    to: NodeId::at_depth(depth),
                })
            }
        }
    }
}

fn station_address(index: u32) -> Ipv4Addr {
    let [a, b, c, d] = AP_ADDRESS.octets();
    Ipv4Addr::new(a, b, c, d + 1 + index as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses() {
        let topo = Topology::new(4);
        assert_eq!(topo.server_address(), Ipv4Addr::new(10, 1, 1, 1));
        assert_eq!(topo.station_address(3), Ipv4Addr::new(192, 168, 0, 5));
        assert_eq!(
            topo.node_for_address(Ipv4Addr::new(192, 168, 0, 2)),
            Some(NodeId::Station(0))
        );
        assert_eq!(topo.node_for_address(Ipv4Addr::new(192, 168, 0, 6)), None);
        assert_eq!(
            topo.node_for_address(Ipv4Addr::new(10, 1, 3, 2)),
            Some(NodeId::AccessPoint)
        );
        assert_eq!(topo.interfaces().len(), 7 + 4);
        assert_eq!(
            topo.node_for_address(Ipv4Addr::new(192, 168, 0, 1)),
            Some(NodeId::AccessPoint)
        );
    }

    #[test]
    fn downlink_route_walks_the_chain() {
        let topo = Topology::new(2);
        let dest = NodeId::Station(1);
        let mut at = NodeId::Server;
        let mut path = vec![at];
        while let Some(hop) = topo.next_hop(at, dest) {
            at = match hop {
                Hop::Wired { to } | Hop::Wireless { to } => to,
            };
            path.push(at);
        }
        assert_eq!(
            path,
            vec![
                NodeId::Server,
                NodeId::CoreRouter,
                NodeId::EdgeRouter,
                NodeId::AccessPoint,
                NodeId::Station(1)
            ]
        );
    }

    #[test]
    fn uplink_route() {
        let topo = Topology::new(2);
        assert_eq!(
            topo.next_hop(NodeId::Station(0), NodeId::Server),
            Some(Hop::Wireless {
                to: NodeId::AccessPoint
            })
        );
        assert_eq!(
            topo.next_hop(NodeId::AccessPoint, NodeId::Server),
            Some(Hop::Wired {
                to: NodeId::EdgeRouter
            })
        );
        assert_eq!(
            topo.next_hop(NodeId::CoreRouter, NodeId::Server),
            Some(Hop::Wired { to: NodeId::Server })
        );
        assert_eq!(topo.next_hop(NodeId::Server, NodeId::Server), None);
    }
}
