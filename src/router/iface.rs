use core::fmt;

use crate::wire::{EthernetAddress, Ipv4Address, Ipv4Cidr};

/// An opaque handle naming the link a frame travels over.
///
/// The host's link-layer driver assigns these; the router only carries
/// them between `Interface` and the frame sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub usize);

/// A configured network interface. Immutable after load.
#[derive(Debug, Clone)]
pub struct Interface {
    /// The short name the routing table refers to, e.g. `eth0`.
    pub name: String,
    /// The address and subnet assigned to this interface.
    pub addr: Ipv4Cidr,
    /// The hardware address of this interface.
    pub mac: EthernetAddress,
    /// The link this interface sends and receives on.
    pub link: LinkId,
}

impl Interface {
    /// The IPv4 address assigned to this interface.
    pub fn ip(&self) -> Ipv4Address {
        self.addr.address()
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {} {}", self.name, self.addr, self.mac)
    }
}

/// The interface table, built at startup and never mutated.
#[derive(Debug, Default)]
pub struct Interfaces {
    entries: Vec<Interface>,
}

impl Interfaces {
    /// Create the table from its entries.
    ///
    /// # Panics
    /// Panics if two entries share a name or a link, the configuration
    /// errors no later lookup could make sense of.
    pub fn new(entries: Vec<Interface>) -> Self {
        for (idx, entry) in entries.iter().enumerate() {
            for other in &entries[idx + 1..] {
                assert!(entry.name != other.name, "duplicate interface name {}", entry.name);
                assert!(entry.link != other.link, "duplicate link for {}", entry.name);
            }
        }

        Interfaces { entries }
    }

    /// Resolve an interface by name.
    pub fn get(&self, name: &str) -> Option<&Interface> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Resolve an interface by the link it is attached to.
    pub fn by_link(&self, link: LinkId) -> Option<&Interface> {
        self.entries.iter().find(|entry| entry.link == link)
    }

    /// Query whether an address is assigned to any interface.
    pub fn has_addr(&self, addr: Ipv4Address) -> bool {
        self.entries.iter().any(|entry| entry.ip() == addr)
    }

    /// Iterate over all interfaces.
    pub fn iter(&self) -> impl Iterator<Item=&Interface> {
        self.entries.iter()
    }
}
