//! The forwarding plane.
//!
//! A [`Router`] is built once from its interface and routing tables and
//! then driven by two actors: the receive path calls [`handle_frame`] for
//! every frame the link layer delivers, and a periodic task calls
//! [`sweep`] once per second. Everything the router emits goes through the
//! caller-supplied [`FrameSink`]; the router itself performs no I/O and
//! reads no clock.
//!
//! The ARP cache is the only state shared between the two actors and sits
//! behind a mutex; interfaces and routes are immutable after construction.
//!
//! [`Router`]: struct.Router.html
//! [`handle_frame`]: struct.Router.html#method.handle_frame
//! [`sweep`]: struct.Router.html#method.sweep
//! [`FrameSink`]: trait.FrameSink.html
use std::sync::Mutex;

use crate::time::Instant;
use crate::wire::{
    arp_packet, ethernet_frame, icmpv4_packet, ipv4_packet,
    ArpOperation, ArpRepr, EthernetAddress, EthernetProtocol, EthernetRepr,
    Icmpv4DstUnreachable, Icmpv4Repr, Icmpv4TimeExceeded,
    IpProtocol, Ipv4Address, Ipv4Repr,
};

pub mod arp_cache;
mod iface;
mod route;

#[cfg(test)]
mod tests;

pub use self::iface::{Interface, Interfaces, LinkId};
pub use self::route::{Route, Routes};

use self::arp_cache::Cache;

/// TTL of every locally generated ICMP message.
const ICMP_TTL: u8 = 60;

/// The MTU advertised in destination-unreachable messages.
const ICMP_NEXT_MTU: u16 = 1500;

/// The outgoing half of the link layer.
///
/// `transmit` must not block; the frame is complete and owned by the
/// callee for the duration of the call only.
pub trait FrameSink {
    /// Queue one frame on a link.
    fn transmit(&mut self, link: LinkId, frame: &[u8]);
}

impl<F: FnMut(LinkId, &[u8])> FrameSink for F {
    fn transmit(&mut self, link: LinkId, frame: &[u8]) {
        self(link, frame)
    }
}

/// The router: interface table, routing table, ARP cache.
#[derive(Debug)]
pub struct Router {
    interfaces: Interfaces,
    routes: Routes,
    cache: Mutex<Cache>,
}

impl Router {
    /// Create a router over its startup tables.
    pub fn new(interfaces: Interfaces, routes: Routes) -> Self {
        Router {
            interfaces,
            routes,
            cache: Mutex::new(Cache::new()),
        }
    }

    /// The interface table.
    pub fn interfaces(&self) -> &Interfaces {
        &self.interfaces
    }

    /// Process one frame received on `link`.
    ///
    /// The buffer is borrowed from the link layer; anything that must
    /// outlive the call is copied.
    pub fn handle_frame<S: FrameSink>(
        &self,
        frame: &[u8],
        link: LinkId,
        now: Instant,
        sink: &mut S,
    ) {
        let eth = match ethernet_frame::new_checked(frame) {
            Ok(eth) => eth,
            Err(err) => {
                net_debug!("dropping frame on {:?}: {}", link, err);
                return;
            },
        };

        let in_if = match self.interfaces.by_link(link) {
            Some(in_if) => in_if,
            None => {
                net_debug!("frame on unknown link {:?}", link);
                return;
            },
        };

        match eth.ethertype() {
            EthernetProtocol::Ipv4 => self.handle_ipv4(eth, in_if, now, sink),
            EthernetProtocol::Arp => self.handle_arp(eth, in_if, now, sink),
            _ => (),
        }
    }

    fn handle_ipv4<S: FrameSink>(
        &self,
        eth: &ethernet_frame,
        in_if: &Interface,
        now: Instant,
        sink: &mut S,
    ) {
        let packet = match ipv4_packet::new_checked(eth.payload_slice()) {
            Ok(packet) => packet,
            Err(err) => {
                net_debug!("dropping ip packet on {}: {}", in_if.name, err);
                return;
            },
        };

        if !packet.verify_checksum() {
            net_debug!("dropping ip packet on {}: wrong checksum", in_if.name);
            return;
        }

        let dst = packet.dst_addr();

        if self.interfaces.has_addr(dst) {
            let answered = match packet.protocol() {
                IpProtocol::Icmp => self.answer_echo(eth, in_if, sink),
                _ => false,
            };
            // No service listens behind the router's own addresses;
            // everything but an echo request bounces.
            if !answered {
                self.send_icmp_error(
                    in_if,
                    eth.src_addr(),
                    eth.payload_slice(),
                    Icmpv4Repr::DstUnreachable {
                        reason: Icmpv4DstUnreachable::PortUnreachable,
                        next_mtu: ICMP_NEXT_MTU,
                    },
                    sink,
                );
            }
            return;
        }

        if packet.ttl() <= 1 {
            self.send_icmp_error(
                in_if,
                eth.src_addr(),
                eth.payload_slice(),
                Icmpv4Repr::TimeExceeded { reason: Icmpv4TimeExceeded::TtlExpired },
                sink,
            );
            return;
        }

        let route = match self.routes.lookup(dst) {
            Some(route) => route,
            None => {
                self.send_icmp_error(
                    in_if,
                    eth.src_addr(),
                    eth.payload_slice(),
                    Icmpv4Repr::DstUnreachable {
                        reason: Icmpv4DstUnreachable::NetUnreachable,
                        next_mtu: ICMP_NEXT_MTU,
                    },
                    sink,
                );
                return;
            },
        };

        let out_if = match self.interfaces.get(&route.interface) {
            Some(out_if) => out_if,
            None => {
                net_debug!("route for {} names unknown interface {}", dst, route.interface);
                return;
            },
        };
        let next_hop = route.next_hop(dst);

        // The input buffer is borrowed from the link layer; rewrite a copy.
        let mut forward = eth.as_bytes().to_vec();
        {
            let eth = ethernet_frame::new_unchecked_mut(&mut forward);
            let ip = ipv4_packet::new_unchecked_mut(eth.payload_mut_slice());
            ip.set_ttl(ip.ttl() - 1);
            ip.fill_checksum();
        }

        let mut cache = self.cache.lock().unwrap();
        match cache.lookup(next_hop, now) {
            Some(mac) => {
                drop(cache);
                let eth = ethernet_frame::new_unchecked_mut(&mut forward);
                eth.set_src_addr(out_if.mac);
                eth.set_dst_addr(mac);
                net_trace!("forwarding {} -> {} via {}", packet.src_addr(), dst, out_if.name);
                sink.transmit(out_if.link, &forward);
            },
            None => {
                net_trace!("queueing {} -> {} until {} resolves", packet.src_addr(), dst, next_hop);
                cache.enqueue(next_hop, forward, &out_if.name);
            },
        }
    }

    /// Reply to an ICMP echo request addressed to one of our interfaces.
    ///
    /// Returns whether a reply went out; anything that is not a valid
    /// echo request is left for the caller to bounce.
    fn answer_echo<S: FrameSink>(
        &self,
        eth: &ethernet_frame,
        in_if: &Interface,
        sink: &mut S,
    ) -> bool {
        let packet = ipv4_packet::new_unchecked(eth.payload_slice());
        let request = match icmpv4_packet::new_checked(packet.payload_slice()) {
            Ok(request) => request,
            Err(_) => return false,
        };

        let reply = match Icmpv4Repr::parse(request).ok().and_then(Icmpv4Repr::echo_reply) {
            Some(reply) => reply,
            None => return false,
        };

        net_trace!("echo request for {} on {}", packet.dst_addr(), in_if.name);
        self.send_icmp(
            in_if,
            eth.src_addr(),
            packet.src_addr(),
            packet.ident(),
            reply,
            request.payload_slice(),
            sink,
        );
        true
    }

    /// Send an ICMP error quoting the offending datagram.
    fn send_icmp_error<S: FrameSink>(
        &self,
        via: &Interface,
        dst_mac: EthernetAddress,
        offending: &[u8],
        repr: Icmpv4Repr,
        sink: &mut S,
    ) {
        let offender = ipv4_packet::new_unchecked(offending);
        net_debug!("sending {} to {} via {}", repr, offender.src_addr(), via.name);
        self.send_icmp(
            via,
            dst_mac,
            offender.src_addr(),
            offender.ident(),
            repr,
            offending,
            sink,
        );
    }

    /// Emit one locally generated ICMP message.
    ///
    /// `body` is the echo data or the offending datagram to quote; it is
    /// truncated or zero-padded to the body length of `repr`.
    fn send_icmp<S: FrameSink>(
        &self,
        via: &Interface,
        dst_mac: EthernetAddress,
        dst_ip: Ipv4Address,
        ident: u16,
        repr: Icmpv4Repr,
        body: &[u8],
        sink: &mut S,
    ) {
        let icmp_len = repr.buffer_len();
        let mut buffer = vec![0u8; ethernet_frame::buffer_len(ipv4_packet::buffer_len(icmp_len))];

        let eth = ethernet_frame::new_unchecked_mut(&mut buffer);
        EthernetRepr {
            src_addr: via.mac,
            dst_addr: dst_mac,
            ethertype: EthernetProtocol::Ipv4,
        }.emit(eth);

        let ip = ipv4_packet::new_unchecked_mut(eth.payload_mut_slice());
        Ipv4Repr {
            src_addr: via.ip(),
            dst_addr: dst_ip,
            protocol: IpProtocol::Icmp,
            payload_len: icmp_len,
            ttl: ICMP_TTL,
            ident,
            dont_frag: true,
        }.emit(ip);

        let icmp = icmpv4_packet::new_unchecked_mut(ip.payload_mut_slice());
        repr.emit(icmp);
        let data = icmp.payload_mut_slice();
        let copy = body.len().min(data.len());
        data[..copy].copy_from_slice(&body[..copy]);
        icmp.fill_checksum();

        sink.transmit(via.link, &buffer);
    }

    fn handle_arp<S: FrameSink>(
        &self,
        eth: &ethernet_frame,
        in_if: &Interface,
        now: Instant,
        sink: &mut S,
    ) {
        let repr = match arp_packet::new_checked(eth.payload_slice()).and_then(ArpRepr::parse) {
            Ok(repr) => repr,
            Err(err) => {
                net_debug!("dropping arp packet on {}: {}", in_if.name, err);
                return;
            },
        };

        match repr.operation {
            ArpOperation::Request if repr.target_protocol_addr == in_if.ip() => {
                net_trace!("answering {}", repr);
                let answer = ArpRepr {
                    operation: ArpOperation::Reply,
                    source_hardware_addr: in_if.mac,
                    source_protocol_addr: in_if.ip(),
                    target_hardware_addr: repr.source_hardware_addr,
                    target_protocol_addr: repr.source_protocol_addr,
                };
                // Unicast back to the requester; the sender mapping is
                // not cached.
                self.send_arp(in_if, eth.src_addr(), answer, sink);
            },

            ArpOperation::Reply if repr.target_protocol_addr == in_if.ip() => {
                net_trace!("caching {}", repr);
                let pending = self.cache.lock().unwrap()
                    .insert(repr.source_protocol_addr, repr.source_hardware_addr, now);

                if let Some(request) = pending {
                    for frame in request.frames {
                        let out_if = match self.interfaces.get(&frame.interface) {
                            Some(out_if) => out_if,
                            None => continue,
                        };
                        let mut bytes = frame.bytes;
                        {
                            let eth = ethernet_frame::new_unchecked_mut(&mut bytes);
                            eth.set_src_addr(out_if.mac);
                            eth.set_dst_addr(repr.source_hardware_addr);
                        }
                        sink.transmit(out_if.link, &bytes);
                    }
                }
            },

            _ => (),
        }
    }

    /// Emit one ARP packet.
    fn send_arp<S: FrameSink>(
        &self,
        via: &Interface,
        dst_mac: EthernetAddress,
        repr: ArpRepr,
        sink: &mut S,
    ) {
        let mut buffer = vec![0u8; ethernet_frame::buffer_len(repr.buffer_len())];

        let eth = ethernet_frame::new_unchecked_mut(&mut buffer);
        EthernetRepr {
            src_addr: via.mac,
            dst_addr: dst_mac,
            ethertype: EthernetProtocol::Arp,
        }.emit(eth);
        repr.emit(arp_packet::new_unchecked_mut(eth.payload_mut_slice()));

        sink.transmit(via.link, &buffer);
    }

    /// One pass of the periodic sweeper, to be called once per second.
    ///
    /// Expires cache entries, broadcasts a request for every resolution
    /// that is due another attempt, and bounces the queue of every
    /// resolution that ran out of attempts with host-unreachable errors.
    pub fn sweep<S: FrameSink>(&self, now: Instant, sink: &mut S) {
        let outcome = self.cache.lock().unwrap().sweep(now);

        for retry in outcome.retries {
            let out_if = match self.interfaces.get(&retry.interface) {
                Some(out_if) => out_if,
                None => continue,
            };

            net_trace!("requesting {} on {}", retry.ip, out_if.name);
            let request = ArpRepr {
                operation: ArpOperation::Request,
                source_hardware_addr: out_if.mac,
                source_protocol_addr: out_if.ip(),
                target_hardware_addr: EthernetAddress::UNSPECIFIED,
                target_protocol_addr: retry.ip,
            };
            self.send_arp(out_if, EthernetAddress::BROADCAST, request, sink);
        }

        for request in outcome.exhausted {
            net_debug!("{} unreachable, dropping {} queued frames",
                       request.ip, request.frames.len());
            for frame in request.frames {
                let out_if = match self.interfaces.get(&frame.interface) {
                    Some(out_if) => out_if,
                    None => continue,
                };
                let eth = match ethernet_frame::new_checked(&frame.bytes) {
                    Ok(eth) => eth,
                    Err(_) => continue,
                };
                if ipv4_packet::new_checked(eth.payload_slice()).is_err() {
                    continue;
                }

                self.send_icmp_error(
                    out_if,
                    eth.src_addr(),
                    eth.payload_slice(),
                    Icmpv4Repr::DstUnreachable {
                        reason: Icmpv4DstUnreachable::HostUnreachable,
                        next_mtu: ICMP_NEXT_MTU,
                    },
                    sink,
                );
            }
        }
    }
}
