use crate::time::{Duration, Instant};
use crate::wire::{
    ctcp_segment, SegmentFlags, SegmentRepr, SeqNumber, MAX_SEG_DATA_SIZE,
};

use super::bbr::{Bbr, BW_SCALE};
use super::buffers::{RecvQueue, RecvSegment, SendQueue, SentSegment};

/// Retransmissions of one segment before the peer counts as gone.
pub(crate) const RETRANSMIT_LIMIT: u32 = 5;

/// Per-connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Receive window advertised to the peer, in bytes.
    pub recv_window: u16,
    /// Send window: the most unacknowledged data allowed in flight.
    pub send_window: u16,
    /// How long an unacknowledged segment waits before retransmission.
    pub rt_timeout: Duration,
    /// The cadence the host drives `on_tick` at.
    pub timer_tick: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            recv_window: MAX_SEG_DATA_SIZE as u16,
            send_window: MAX_SEG_DATA_SIZE as u16,
            rt_timeout: Duration::from_millis(200),
            timer_tick: Duration::from_millis(40),
        }
    }
}

/// One application read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRead {
    /// `n` bytes were placed at the start of the buffer.
    Data(usize),
    /// Nothing to read right now.
    Empty,
    /// The application closed its end of the stream.
    Eof,
}

/// The host side of a connection.
///
/// Mirrors the collaborator calls of the transport library the stack is
/// embedded in: application input and output buffers, the unreliable
/// datagram layer underneath, and teardown notification. All calls must
/// be non-blocking.
pub trait Host {
    /// Pull application data to transmit into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> AppRead;

    /// How many bytes the application output buffer accepts right now.
    fn write_space(&self) -> usize;

    /// Hand received, in-order payload to the application.
    fn write(&mut self, data: &[u8]);

    /// Signal end-of-stream to the application.
    fn signal_eof(&mut self);

    /// Send one encoded segment over the datagram layer.
    fn send(&mut self, segment: &[u8]);

    /// The connection is gone; release host resources.
    fn close(&mut self);
}

/// What a timer pass decided about a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    /// Still running.
    Alive,
    /// Torn down or given up on; the owner drops the state.
    Destroyed,
}

/// The state of one reliable byte-stream connection.
pub struct Connection<H: Host> {
    host: H,
    cfg: Config,

    /// Sequence number of the next byte to transmit.
    seqno: SeqNumber,
    /// Sequence number of the next byte expected from the peer.
    ackno: SeqNumber,

    unacked: SendQueue,
    unoutput: RecvQueue,

    sent_fin: bool,
    fin_seqno: Option<SeqNumber>,
    peer_fin_seen: bool,
    our_fin_acked: bool,

    retransmit_count: u32,
    last_retransmit_at: Instant,

    /// Total bytes delivered (cumulatively acknowledged), feeding the
    /// per-ack delivery-rate samples.
    delivered_bytes: u64,
    delivered_at: Instant,

    bbr: Bbr,
    next_send_time: Instant,
}

impl<H: Host> Connection<H> {
    /// Set up the state for a freshly accepted connection.
    pub fn new(host: H, cfg: Config, seed: u64, now: Instant) -> Self {
        let initial_cwnd = usize::from(cfg.send_window);
        Connection {
            host,
            cfg,
            seqno: SeqNumber::INIT,
            ackno: SeqNumber::INIT,
            unacked: SendQueue::new(),
            unoutput: RecvQueue::new(),
            sent_fin: false,
            fin_seqno: None,
            peer_fin_seen: false,
            our_fin_acked: false,
            retransmit_count: 0,
            last_retransmit_at: now,
            delivered_bytes: 0,
            delivered_at: now,
            bbr: Bbr::new(initial_cwnd, seed, now),
            next_send_time: now,
        }
    }

    /// The host half, for inspection.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The host half, mutably.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The congestion controller, for inspection.
    pub fn bbr(&self) -> &Bbr {
        &self.bbr
    }

    /// Bytes currently in flight.
    pub fn inflight(&self) -> usize {
        self.unacked.inflight()
    }

    /// The application has data (or EOF) ready to transmit.
    ///
    /// Sends at most one segment per call, gated by the send window, the
    /// congestion window and the pacing schedule.
    pub fn on_input(&mut self, now: Instant) {
        if self.sent_fin {
            return;
        }
        if now < self.next_send_time {
            return;
        }

        let window = usize::from(self.cfg.send_window).min(self.bbr.cwnd());
        let inflight = self.unacked.inflight();
        if inflight >= window {
            return;
        }

        let budget = MAX_SEG_DATA_SIZE.min(window - inflight);
        let mut buf = vec![0u8; budget];
        match self.host.read(&mut buf) {
            AppRead::Empty => {},

            AppRead::Eof => {
                let bytes = self.emit_segment(SegmentFlags::FIN, &[]);
                net_debug!("sent FIN seq={}", self.seqno);
                self.push_unacked(bytes, 1, now);
                self.fin_seqno = Some(self.seqno);
                self.sent_fin = true;
                self.seqno += 1;
            },

            AppRead::Data(len) => {
                let bytes = self.emit_segment(SegmentFlags::ACK, &buf[..len]);
                self.push_unacked(bytes, len, now);
                self.seqno += len;
            },
        }
    }

    /// A segment arrived from the datagram layer.
    pub fn on_datagram(&mut self, datagram: &[u8], now: Instant) {
        let repr = match ctcp_segment::new_checked(datagram).and_then(SegmentRepr::parse) {
            Ok(repr) => repr,
            // Corrupted or truncated; the retransmission timer recovers.
            Err(_) => return,
        };
        let packet = ctcp_segment::new_unchecked(datagram);

        // A segment entirely before our cumulative ack carries nothing
        // new; remind the peer where we are.
        if repr.seqno < self.ackno && (repr.payload > 0 || repr.flags.fin()) {
            self.send_ack();
            return;
        }

        if repr.flags.ack() {
            self.process_ack(repr.ackno, now);
        }

        if repr.payload > 0 || repr.flags.fin() {
            if repr.flags.fin() {
                self.peer_fin_seen = true;
            }

            let accepted = self.unoutput.insert(RecvSegment {
                seqno: repr.seqno,
                data: packet.data_slice().to_vec(),
                fin: repr.flags.fin(),
            });
            if !accepted {
                // Duplicate delivery; the ack must have been lost.
                self.send_ack();
                return;
            }
        }

        self.on_output();
    }

    fn process_ack(&mut self, ackno: SeqNumber, now: Instant) {
        let acked = self.unacked.remove_acked(ackno);

        for segment in &acked {
            self.delivered_bytes += segment.seq_len as u64;
            self.delivered_at = now;

            let elapsed = (now - segment.first_send_at).as_millis().max(1) as u64;
            let delivered = self.delivered_bytes - segment.delivered_bytes_at_send;
            let bw_sample = (delivered << BW_SCALE) / elapsed;
            self.bbr.on_ack(bw_sample, elapsed, now);
        }

        if !acked.is_empty() {
            // The head changed; the retransmission clock belongs to it.
            self.retransmit_count = 0;
            self.last_retransmit_at = now;
            self.bbr.set_inflight(self.unacked.inflight());
        }

        if self.sent_fin && !self.our_fin_acked {
            if let Some(fin_seqno) = self.fin_seqno {
                if fin_seqno + 1 <= ackno {
                    self.our_fin_acked = true;
                }
            }
        }
    }

    /// Deliver everything in-order the application has room for.
    ///
    /// Also called from `on_datagram` and `on_tick`, which picks up
    /// deliveries deferred while the output buffer was full.
    pub fn on_output(&mut self) {
        let mut delivered = false;

        while let Some(front) = self.unoutput.front() {
            if front.seqno != self.ackno {
                break;
            }
            if front.data.len() > self.host.write_space() {
                // No room; try again on the next segment or tick.
                break;
            }

            let segment = match self.unoutput.pop_front() {
                Some(segment) => segment,
                None => break,
            };

            if !segment.data.is_empty() {
                self.host.write(&segment.data);
                self.ackno += segment.data.len();
            }
            if segment.fin {
                self.ackno += 1;
                self.host.signal_eof();
            }
            delivered = true;
        }

        if delivered {
            self.send_ack();
        }
    }

    /// One pass of the per-connection timer.
    pub fn on_tick(&mut self, now: Instant) -> TickResult {
        // Deliveries deferred on a full output buffer retry here.
        self.on_output();

        if !self.unacked.is_empty() {
            if self.retransmit_count == RETRANSMIT_LIMIT {
                net_debug!("peer unresponsive after {} retransmissions", RETRANSMIT_LIMIT);
                self.host.close();
                return TickResult::Destroyed;
            }

            if now - self.last_retransmit_at >= self.cfg.rt_timeout {
                if let Some(head) = self.unacked.front() {
                    net_debug!("retransmitting seq={}", head.first_seq);
                    // Byte-exact resend; no delivery sample is taken for
                    // retransmissions.
                    self.host.send(&head.bytes);
                }
                self.retransmit_count += 1;
                self.last_retransmit_at = now;
            }
        }

        if self.sent_fin && self.our_fin_acked && self.peer_fin_seen {
            net_debug!("teardown complete");
            self.host.close();
            return TickResult::Destroyed;
        }

        TickResult::Alive
    }

    /// Encode a segment at the current sequence state and send it.
    fn emit_segment(&mut self, flags: SegmentFlags, data: &[u8]) -> Vec<u8> {
        let repr = SegmentRepr {
            seqno: self.seqno,
            ackno: self.ackno,
            flags,
            window: self.cfg.recv_window,
            payload: data.len(),
        };

        let mut bytes = vec![0u8; repr.buffer_len()];
        {
            let segment = ctcp_segment::new_unchecked_mut(&mut bytes);
            repr.emit(segment);
            segment.data_mut_slice().copy_from_slice(data);
            segment.fill_checksum();
        }

        self.host.send(&bytes);
        bytes
    }

    /// Account a freshly sent segment: retransmission bookkeeping, BBR
    /// sample stamps, and the pacing schedule.
    fn push_unacked(&mut self, bytes: Vec<u8>, seq_len: usize, now: Instant) {
        if self.unacked.is_empty() {
            self.retransmit_count = 0;
            self.last_retransmit_at = now;
        }

        let wire_len = bytes.len();
        self.unacked.push(SentSegment {
            bytes,
            first_seq: self.seqno,
            seq_len,
            first_send_at: now,
            delivered_bytes_at_send: self.delivered_bytes,
        });

        self.bbr.set_inflight(self.unacked.inflight());
        self.next_send_time = now + self.bbr.pacing_delay(wire_len);
    }

    fn send_ack(&mut self) {
        let _ = self.emit_segment(SegmentFlags::ACK, &[]);
    }
}

/// A key into a [`Connections`] collection.
///
/// [`Connections`]: struct.Connections.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(usize);

/// The owned collection of live connections.
///
/// The timer pass iterates over a snapshot of the keys so that handlers
/// can destroy connections mid-loop.
pub struct Connections<H: Host> {
    slots: Vec<Option<Connection<H>>>,
}

impl<H: Host> Default for Connections<H> {
    fn default() -> Self {
        Connections { slots: Vec::new() }
    }
}

impl<H: Host> Connections<H> {
    /// An empty collection.
    pub fn new() -> Self {
        Connections::default()
    }

    /// Track a connection, returning its key.
    pub fn insert(&mut self, connection: Connection<H>) -> ConnId {
        match self.slots.iter().position(Option::is_none) {
            Some(idx) => {
                self.slots[idx] = Some(connection);
                ConnId(idx)
            },
            None => {
                self.slots.push(Some(connection));
                ConnId(self.slots.len() - 1)
            },
        }
    }

    /// Access a connection by key.
    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection<H>> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Detach a connection by key.
    pub fn remove(&mut self, id: ConnId) -> Option<Connection<H>> {
        self.slots.get_mut(id.0).and_then(Option::take)
    }

    /// The number of live connections.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether no connection is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the timer over every live connection, dropping the ones that
    /// finished or gave up.
    pub fn on_tick(&mut self, now: Instant) {
        let ids: Vec<usize> = (0..self.slots.len()).collect();
        for idx in ids {
            let destroyed = match self.slots[idx].as_mut() {
                Some(connection) => connection.on_tick(now) == TickResult::Destroyed,
                None => false,
            };
            if destroyed {
                self.slots[idx] = None;
            }
        }
    }
}
