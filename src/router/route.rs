use crate::wire::{Ipv4Address, Ipv4Subnet};

/// A static routing table entry. Immutable after load.
#[derive(Debug, Clone)]
pub struct Route {
    /// The network this entry routes.
    pub subnet: Ipv4Subnet,
    /// The next hop, or `None` when the network is directly connected and
    /// the destination itself is the next hop.
    pub gateway: Option<Ipv4Address>,
    /// Name of the interface packets leave on.
    pub interface: String,
}

impl Route {
    /// A route to a directly connected network.
    pub fn local(subnet: Ipv4Subnet, interface: &str) -> Self {
        Route { subnet, gateway: None, interface: interface.into() }
    }

    /// A route through a gateway.
    pub fn via(subnet: Ipv4Subnet, gateway: Ipv4Address, interface: &str) -> Self {
        Route { subnet, gateway: Some(gateway), interface: interface.into() }
    }

    /// The address the next frame for `dst` is addressed to on the link.
    pub fn next_hop(&self, dst: Ipv4Address) -> Ipv4Address {
        self.gateway.unwrap_or(dst)
    }
}

/// A routing table: a flat list searched by longest prefix.
#[derive(Debug, Default)]
pub struct Routes {
    storage: Vec<Route>,
}

impl Routes {
    /// Create an empty routing table.
    pub fn new() -> Self {
        Routes { storage: Vec::new() }
    }

    /// Create a routing table from a list of entries.
    pub fn import(storage: Vec<Route>) -> Self {
        Routes { storage }
    }

    /// Append a route.
    pub fn add_route(&mut self, route: Route) {
        self.storage.push(route);
    }

    /// Find the route whose subnet contains `addr` with the longest
    /// prefix. On equal prefix lengths the earliest inserted entry wins.
    /// A `/0` entry is the default route and matches everything.
    pub fn lookup(&self, addr: Ipv4Address) -> Option<&Route> {
        let mut best_match: Option<&Route> = None;
        for route in self.storage.iter() {
            if !route.subnet.contains(addr) {
                continue;
            }

            match best_match {
                Some(best) if best.subnet.prefix_len() >= route.subnet.prefix_len() => {},
                _ => best_match = Some(route),
            }
        }
        best_match
    }
}
