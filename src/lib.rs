//! A teaching network stack in two parts.
//!
//! The first part is a software IPv4 router: [`router`] forwards
//! Ethernet-framed datagrams between a handful of interfaces with
//! longest-prefix-match route selection, ICMP error generation and an
//! ARP cache whose pending-packet queue is driven by a periodic sweeper.
//!
//! The second part is a reliable byte-stream transport: [`ctcp`] layers
//! sliding-window delivery, retransmission and an orderly teardown
//! handshake over an unreliable datagram service, with a BBR-style
//! congestion controller setting pacing rate and congestion window.
//!
//! Both share the [`wire`] codecs and the [`time`] structures, and both
//! follow the same discipline: the host owns every buffer, clock and
//! socket, and calls into the stack at well-defined entry points which
//! run to completion. The stack never blocks, never reads a clock and
//! never performs I/O of its own.
//!
//! [`router`]: router/index.html
//! [`ctcp`]: ctcp/index.html
//! [`wire`]: wire/index.html
//! [`time`]: time/index.html
#![warn(unreachable_pub)]

#[macro_use]
mod macros;

pub mod ctcp;
pub mod router;
pub mod time;
pub mod wire;
