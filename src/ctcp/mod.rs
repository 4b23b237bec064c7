//! The reliable byte-stream transport.
//!
//! cTCP carries one ordered byte stream per connection over an unreliable
//! datagram service: a sliding-window sender with head-of-line
//! retransmission, an in-order reassembly buffer on the receive side, and
//! a FIN/ACK teardown handshake. A BBR congestion controller drives the
//! pacing schedule and the congestion window.
//!
//! The stack is callback-shaped. The host owns the buffers and the clock
//! and calls in at four points: [`on_input`] when the application has
//! data, [`on_datagram`] when a segment arrives, [`on_output`] when the
//! output buffer drained, and [`on_tick`] at the configured timer
//! cadence. Everything runs to completion; nothing blocks.
//!
//! [`on_input`]: struct.Connection.html#method.on_input
//! [`on_datagram`]: struct.Connection.html#method.on_datagram
//! [`on_output`]: struct.Connection.html#method.on_output
//! [`on_tick`]: struct.Connection.html#method.on_tick
pub mod bbr;
mod buffers;
mod connection;


pub use self::connection::{
    AppRead,
    Config,
    ConnId,
    Connection,
    Connections,
    Host,
    TickResult,
};
