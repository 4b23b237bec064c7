use super::*;
use crate::time::Duration;
use crate::wire::{icmpv4_packet, Icmpv4Message};

const MAC_A: EthernetAddress = EthernetAddress([0, 0, 0, 0, 0, 0xaa]);
const MAC_B: EthernetAddress = EthernetAddress([0, 0, 0, 0, 0, 0xbb]);
const MAC_C: EthernetAddress = EthernetAddress([0, 0, 0, 0, 0, 0xcc]);
const MAC_HOST: EthernetAddress = EthernetAddress([0, 0, 0, 0, 0, 0x01]);

const IP_ETH1: Ipv4Address = Ipv4Address([10, 0, 1, 1]);
const IP_ETH2: Ipv4Address = Ipv4Address([10, 0, 2, 1]);
const IP_ORIGIN: Ipv4Address = Ipv4Address([1, 2, 3, 4]);
const IP_TARGET: Ipv4Address = Ipv4Address([10, 0, 2, 5]);

const LINK_1: LinkId = LinkId(1);
const LINK_2: LinkId = LinkId(2);

#[derive(Default)]
struct Sink {
    frames: Vec<(LinkId, Vec<u8>)>,
}

impl FrameSink for Sink {
    fn transmit(&mut self, link: LinkId, frame: &[u8]) {
        self.frames.push((link, frame.to_vec()));
    }
}

fn router() -> Router {
    let interfaces = Interfaces::new(vec![
        Interface {
            name: "eth1".into(),
            addr: "10.0.1.1/24".parse().unwrap(),
            mac: MAC_A,
            link: LINK_1,
        },
        Interface {
            name: "eth2".into(),
            addr: "10.0.2.1/24".parse().unwrap(),
            mac: MAC_B,
            link: LINK_2,
        },
    ]);

    let mut routes = Routes::new();
    routes.add_route(Route::local("10.0.2.0/24".parse::<crate::wire::Ipv4Cidr>().unwrap().subnet(), "eth2"));

    Router::new(interfaces, routes)
}

fn ipv4_frame(
    src_mac: EthernetAddress,
    dst_mac: EthernetAddress,
    src_ip: Ipv4Address,
    dst_ip: Ipv4Address,
    ttl: u8,
    protocol: IpProtocol,
    payload: &[u8],
) -> Vec<u8> {
    let mut bytes = vec![0u8; ethernet_frame::buffer_len(ipv4_packet::buffer_len(payload.len()))];

    let eth = ethernet_frame::new_unchecked_mut(&mut bytes);
    EthernetRepr {
        src_addr: src_mac,
        dst_addr: dst_mac,
        ethertype: EthernetProtocol::Ipv4,
    }.emit(eth);

    let ip = ipv4_packet::new_unchecked_mut(eth.payload_mut_slice());
    Ipv4Repr {
        src_addr: src_ip,
        dst_addr: dst_ip,
        protocol,
        payload_len: payload.len(),
        ttl,
        ident: 0x42,
        dont_frag: false,
    }.emit(ip);
    ip.payload_mut_slice().copy_from_slice(payload);

    bytes
}

fn icmp_frame(
    src_mac: EthernetAddress,
    dst_mac: EthernetAddress,
    src_ip: Ipv4Address,
    dst_ip: Ipv4Address,
    repr: Icmpv4Repr,
    data: &[u8],
) -> Vec<u8> {
    let mut icmp_bytes = vec![0u8; repr.buffer_len()];
    {
        let icmp = icmpv4_packet::new_unchecked_mut(&mut icmp_bytes);
        repr.emit(icmp);
        icmp.payload_mut_slice().copy_from_slice(data);
        icmp.fill_checksum();
    }
    ipv4_frame(src_mac, dst_mac, src_ip, dst_ip, 64, IpProtocol::Icmp, &icmp_bytes)
}

fn echo_request_frame(
    src_mac: EthernetAddress,
    dst_mac: EthernetAddress,
    src_ip: Ipv4Address,
    dst_ip: Ipv4Address,
    ident: u16,
    seq_no: u16,
    data: &[u8],
) -> Vec<u8> {
    let repr = Icmpv4Repr::EchoRequest { ident, seq_no, payload: data.len() };
    icmp_frame(src_mac, dst_mac, src_ip, dst_ip, repr, data)
}

fn arp_frame(repr: ArpRepr, src_mac: EthernetAddress, dst_mac: EthernetAddress) -> Vec<u8> {
    let mut bytes = vec![0u8; ethernet_frame::buffer_len(repr.buffer_len())];
    let eth = ethernet_frame::new_unchecked_mut(&mut bytes);
    EthernetRepr {
        src_addr: src_mac,
        dst_addr: dst_mac,
        ethertype: EthernetProtocol::Arp,
    }.emit(eth);
    repr.emit(arp_packet::new_unchecked_mut(eth.payload_mut_slice()));
    bytes
}

/// Check the reflection rules of §icmp-replies over an emitted frame and
/// return the ICMP message for further checks.
fn check_icmp_reply<'a>(
    frame: &'a [u8],
    via_mac: EthernetAddress,
    via_ip: Ipv4Address,
    dst_mac: EthernetAddress,
    dst_ip: Ipv4Address,
) -> &'a icmpv4_packet {
    let eth = ethernet_frame::new_checked(frame).unwrap();
    assert_eq!(eth.src_addr(), via_mac);
    assert_eq!(eth.dst_addr(), dst_mac);
    assert_eq!(eth.ethertype(), EthernetProtocol::Ipv4);

    let ip = ipv4_packet::new_checked(eth.payload_slice()).unwrap();
    assert!(ip.verify_checksum());
    assert_eq!(ip.src_addr(), via_ip);
    assert_eq!(ip.dst_addr(), dst_ip);
    assert_eq!(ip.ttl(), 60);
    assert!(ip.dont_frag());
    assert_eq!(ip.protocol(), IpProtocol::Icmp);

    let offset = ethernet_frame::header_len() + ipv4_packet::header_len();
    let end = offset + ip.payload_slice().len();
    let icmp = icmpv4_packet::new_checked(&frame[offset..end]).unwrap();
    assert!(icmp.verify_checksum());
    icmp
}

#[test]
fn forward_with_arp_miss_then_hit() {
    let router = router();
    let mut sink = Sink::default();
    let t0 = Instant::from_secs(0);

    let payload = [0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17];
    let frame = ipv4_frame(MAC_HOST, MAC_A, IP_ORIGIN, IP_TARGET, 64, IpProtocol::Udp, &payload);
    router.handle_frame(&frame, LINK_1, t0, &mut sink);

    // Nothing goes out until the sweeper resolves the next hop.
    assert!(sink.frames.is_empty());

    router.sweep(t0, &mut sink);
    assert_eq!(sink.frames.len(), 1);
    let (link, request) = &sink.frames[0];
    assert_eq!(*link, LINK_2);
    let eth = ethernet_frame::new_checked(request).unwrap();
    assert_eq!(eth.dst_addr(), EthernetAddress::BROADCAST);
    assert_eq!(eth.src_addr(), MAC_B);
    assert_eq!(eth.ethertype(), EthernetProtocol::Arp);
    let request = ArpRepr::parse(arp_packet::new_checked(eth.payload_slice()).unwrap()).unwrap();
    assert_eq!(request.operation, ArpOperation::Request);
    assert_eq!(request.source_hardware_addr, MAC_B);
    assert_eq!(request.source_protocol_addr, IP_ETH2);
    assert_eq!(request.target_hardware_addr, EthernetAddress::UNSPECIFIED);
    assert_eq!(request.target_protocol_addr, IP_TARGET);

    // The reply releases the parked frame.
    sink.frames.clear();
    let reply = arp_frame(ArpRepr {
        operation: ArpOperation::Reply,
        source_hardware_addr: MAC_C,
        source_protocol_addr: IP_TARGET,
        target_hardware_addr: MAC_B,
        target_protocol_addr: IP_ETH2,
    }, MAC_C, MAC_B);
    router.handle_frame(&reply, LINK_2, t0 + Duration::from_millis(10), &mut sink);

    assert_eq!(sink.frames.len(), 1);
    let (link, forwarded) = &sink.frames[0];
    assert_eq!(*link, LINK_2);
    let eth = ethernet_frame::new_checked(forwarded).unwrap();
    assert_eq!(eth.src_addr(), MAC_B);
    assert_eq!(eth.dst_addr(), MAC_C);
    let ip = ipv4_packet::new_checked(eth.payload_slice()).unwrap();
    assert_eq!(ip.ttl(), 63);
    assert!(ip.verify_checksum());
    assert_eq!(ip.src_addr(), IP_ORIGIN);
    assert_eq!(ip.dst_addr(), IP_TARGET);
    assert_eq!(ip.payload_slice(), &payload[..]);

    // The mapping is cached now; more traffic forwards immediately.
    sink.frames.clear();
    router.handle_frame(&frame, LINK_1, t0 + Duration::from_millis(20), &mut sink);
    assert_eq!(sink.frames.len(), 1);
}

#[test]
fn ttl_expiry_answers_time_exceeded() {
    let router = router();
    let mut sink = Sink::default();

    let payload = [0x20; 8];
    let frame = ipv4_frame(MAC_HOST, MAC_A, IP_ORIGIN, IP_TARGET, 1, IpProtocol::Udp, &payload);
    router.handle_frame(&frame, LINK_1, Instant::from_secs(0), &mut sink);

    // No forward, only the error.
    assert_eq!(sink.frames.len(), 1);
    let (link, reply) = &sink.frames[0];
    assert_eq!(*link, LINK_1);
    let icmp = check_icmp_reply(reply, MAC_A, IP_ETH1, MAC_HOST, IP_ORIGIN);
    assert_eq!(icmp.msg_type(), Icmpv4Message::TimeExceeded);
    assert_eq!(icmp.msg_code(), 0);

    // The quote is the offending header plus eight payload octets.
    let offending = &frame[ethernet_frame::header_len()..];
    assert_eq!(icmp.payload_slice(), &offending[..28]);
}

#[test]
fn no_route_answers_net_unreachable() {
    let router = router();
    let mut sink = Sink::default();

    let frame = ipv4_frame(
        MAC_HOST, MAC_A, IP_ORIGIN, Ipv4Address([10, 9, 9, 9]),
        64, IpProtocol::Udp, &[0x30; 8]);
    router.handle_frame(&frame, LINK_1, Instant::from_secs(0), &mut sink);

    assert_eq!(sink.frames.len(), 1);
    let icmp = check_icmp_reply(&sink.frames[0].1, MAC_A, IP_ETH1, MAC_HOST, IP_ORIGIN);
    assert_eq!(icmp.msg_type(), Icmpv4Message::DstUnreachable);
    assert_eq!(icmp.msg_code(), 0);
    assert_eq!(icmp.next_mtu(), 1500);
}

#[test]
fn local_delivery_answers_port_unreachable() {
    let router = router();
    let mut sink = Sink::default();

    let frame = ipv4_frame(MAC_HOST, MAC_A, IP_ORIGIN, IP_ETH1, 64, IpProtocol::Tcp, &[0x40; 8]);
    router.handle_frame(&frame, LINK_1, Instant::from_secs(0), &mut sink);

    assert_eq!(sink.frames.len(), 1);
    let icmp = check_icmp_reply(&sink.frames[0].1, MAC_A, IP_ETH1, MAC_HOST, IP_ORIGIN);
    assert_eq!(icmp.msg_type(), Icmpv4Message::DstUnreachable);
    assert_eq!(icmp.msg_code(), 3);
}

#[test]
fn echo_to_router_is_answered() {
    let router = router();
    let mut sink = Sink::default();

    let frame = echo_request_frame(MAC_HOST, MAC_A, IP_ORIGIN, IP_ETH1, 7, 3, b"hi");
    router.handle_frame(&frame, LINK_1, Instant::from_secs(0), &mut sink);

    assert_eq!(sink.frames.len(), 1);
    let (link, reply) = &sink.frames[0];
    assert_eq!(*link, LINK_1);
    let icmp = check_icmp_reply(reply, MAC_A, IP_ETH1, MAC_HOST, IP_ORIGIN);
    assert_eq!(icmp.msg_type(), Icmpv4Message::EchoReply);
    assert_eq!(icmp.msg_code(), 0);
    assert_eq!(icmp.echo_ident(), 7);
    assert_eq!(icmp.echo_seq_no(), 3);
    assert_eq!(icmp.payload_slice(), b"hi");
}

#[test]
fn non_echo_icmp_to_router_is_bounced() {
    let router = router();
    let mut sink = Sink::default();

    // An echo reply addressed to the router is not a request; like any
    // other unserved protocol it gets port unreachable.
    let repr = Icmpv4Repr::EchoReply { ident: 7, seq_no: 3, payload: 2 };
    let frame = icmp_frame(MAC_HOST, MAC_A, IP_ORIGIN, IP_ETH1, repr, b"hi");
    router.handle_frame(&frame, LINK_1, Instant::from_secs(0), &mut sink);

    assert_eq!(sink.frames.len(), 1);
    let icmp = check_icmp_reply(&sink.frames[0].1, MAC_A, IP_ETH1, MAC_HOST, IP_ORIGIN);
    assert_eq!(icmp.msg_type(), Icmpv4Message::DstUnreachable);
    assert_eq!(icmp.msg_code(), 3);

    // The quote starts with the offending IP header.
    let offending = &frame[ethernet_frame::header_len()..];
    assert_eq!(icmp.payload_slice(), &offending[..28]);
}

#[test]
fn corrupt_checksum_is_dropped() {
    let router = router();
    let mut sink = Sink::default();

    let mut frame = ipv4_frame(MAC_HOST, MAC_A, IP_ORIGIN, IP_TARGET, 64, IpProtocol::Udp, &[0; 8]);
    // Flip a bit in the IP header.
    frame[ethernet_frame::header_len() + 8] ^= 0x01;
    router.handle_frame(&frame, LINK_1, Instant::from_secs(0), &mut sink);

    assert!(sink.frames.is_empty());
}

#[test]
fn short_frames_are_dropped() {
    let router = router();
    let mut sink = Sink::default();

    router.handle_frame(&[0u8; 13], LINK_1, Instant::from_secs(0), &mut sink);
    router.handle_frame(&[0u8; 14], LINK_1, Instant::from_secs(0), &mut sink);
    assert!(sink.frames.is_empty());
}

#[test]
fn arp_request_for_us_is_answered() {
    let router = router();
    let mut sink = Sink::default();

    let request = arp_frame(ArpRepr {
        operation: ArpOperation::Request,
        source_hardware_addr: MAC_HOST,
        source_protocol_addr: Ipv4Address([10, 0, 1, 9]),
        target_hardware_addr: EthernetAddress::UNSPECIFIED,
        target_protocol_addr: IP_ETH1,
    }, MAC_HOST, EthernetAddress::BROADCAST);
    router.handle_frame(&request, LINK_1, Instant::from_secs(0), &mut sink);

    assert_eq!(sink.frames.len(), 1);
    let (link, reply) = &sink.frames[0];
    assert_eq!(*link, LINK_1);
    let eth = ethernet_frame::new_checked(reply).unwrap();
    assert_eq!(eth.src_addr(), MAC_A);
    assert_eq!(eth.dst_addr(), MAC_HOST);
    assert_eq!(eth.ethertype(), EthernetProtocol::Arp);
    let repr = ArpRepr::parse(arp_packet::new_checked(eth.payload_slice()).unwrap()).unwrap();
    assert_eq!(repr.operation, ArpOperation::Reply);
    assert_eq!(repr.source_hardware_addr, MAC_A);
    assert_eq!(repr.source_protocol_addr, IP_ETH1);
    assert_eq!(repr.target_hardware_addr, MAC_HOST);
    assert_eq!(repr.target_protocol_addr, Ipv4Address([10, 0, 1, 9]));

    // A request for an address that is not ours is not answered.
    sink.frames.clear();
    let request = arp_frame(ArpRepr {
        operation: ArpOperation::Request,
        source_hardware_addr: MAC_HOST,
        source_protocol_addr: Ipv4Address([10, 0, 1, 9]),
        target_hardware_addr: EthernetAddress::UNSPECIFIED,
        target_protocol_addr: Ipv4Address([10, 0, 1, 7]),
    }, MAC_HOST, EthernetAddress::BROADCAST);
    router.handle_frame(&request, LINK_1, Instant::from_secs(0), &mut sink);
    assert!(sink.frames.is_empty());
}

#[test]
fn arp_exhaustion_bounces_the_queue() {
    let router = router();
    let mut sink = Sink::default();
    let t0 = Instant::from_secs(0);

    // Two frames from different origins park on the same resolution.
    let first = ipv4_frame(MAC_HOST, MAC_A, IP_ORIGIN, IP_TARGET, 64, IpProtocol::Udp, &[0x50; 8]);
    let second = ipv4_frame(MAC_C, MAC_A, Ipv4Address([5, 6, 7, 8]), IP_TARGET,
                            64, IpProtocol::Udp, &[0x60; 8]);
    router.handle_frame(&first, LINK_1, t0, &mut sink);
    router.handle_frame(&second, LINK_1, t0, &mut sink);
    assert!(sink.frames.is_empty());

    // Five requests at one second cadence.
    for round in 0..5 {
        sink.frames.clear();
        router.sweep(t0 + Duration::from_secs(round), &mut sink);
        assert_eq!(sink.frames.len(), 1);
        let eth = ethernet_frame::new_checked(&sink.frames[0].1).unwrap();
        assert_eq!(eth.ethertype(), EthernetProtocol::Arp);
    }

    // The sixth due sweep declares the host unreachable, once per
    // parked frame, through the interface the frames were queued on.
    sink.frames.clear();
    router.sweep(t0 + Duration::from_secs(5), &mut sink);
    assert_eq!(sink.frames.len(), 2);

    let icmp = check_icmp_reply(&sink.frames[0].1, MAC_B, IP_ETH2, MAC_HOST, IP_ORIGIN);
    assert_eq!(icmp.msg_type(), Icmpv4Message::DstUnreachable);
    assert_eq!(icmp.msg_code(), 1);
    assert_eq!(sink.frames[0].0, LINK_2);

    let icmp = check_icmp_reply(&sink.frames[1].1, MAC_B, IP_ETH2, MAC_C, Ipv4Address([5, 6, 7, 8]));
    assert_eq!(icmp.msg_code(), 1);

    // The request is gone: nothing further happens.
    sink.frames.clear();
    router.sweep(t0 + Duration::from_secs(6), &mut sink);
    assert!(sink.frames.is_empty());
}

#[test]
fn cached_entries_go_stale() {
    let router = router();
    let mut sink = Sink::default();
    let t0 = Instant::from_secs(0);

    // Resolve the neighbor.
    let reply = arp_frame(ArpRepr {
        operation: ArpOperation::Reply,
        source_hardware_addr: MAC_C,
        source_protocol_addr: IP_TARGET,
        target_hardware_addr: MAC_B,
        target_protocol_addr: IP_ETH2,
    }, MAC_C, MAC_B);
    router.handle_frame(&reply, LINK_2, t0, &mut sink);

    // Within the lifetime traffic forwards directly.
    let frame = ipv4_frame(MAC_HOST, MAC_A, IP_ORIGIN, IP_TARGET, 64, IpProtocol::Udp, &[0; 8]);
    router.handle_frame(&frame, LINK_1, t0 + Duration::from_secs(14), &mut sink);
    assert_eq!(sink.frames.len(), 1);

    // Past it the frame parks again.
    sink.frames.clear();
    router.handle_frame(&frame, LINK_1, t0 + Duration::from_secs(16), &mut sink);
    assert!(sink.frames.is_empty());
}
