//! The per-connection segment queues.
//!
//! `SendQueue` holds segments sent but not yet cumulatively acknowledged,
//! in send order. `RecvQueue` holds segments received out of order, keyed
//! and sorted by sequence number.
use std::collections::VecDeque;

use crate::time::Instant;
use crate::wire::SeqNumber;

/// A segment in flight, kept byte-exact for retransmission.
#[derive(Debug, Clone)]
pub(crate) struct SentSegment {
    /// The encoded segment as it went on the wire.
    pub(crate) bytes: Vec<u8>,
    /// The sequence number of its first byte.
    pub(crate) first_seq: SeqNumber,
    /// How much sequence space it occupies: the payload length, or one
    /// for a FIN.
    pub(crate) seq_len: usize,
    /// When the segment was first sent. Retransmissions do not update
    /// this; a sample over a retransmitted segment would be meaningless.
    pub(crate) first_send_at: Instant,
    /// The connection's delivered-bytes counter when the segment was
    /// sent. The delta to the counter at acknowledgment time is the
    /// delivery-rate numerator.
    pub(crate) delivered_bytes_at_send: u64,
}

impl SentSegment {
    /// The sequence number just past this segment.
    pub(crate) fn end_seq(&self) -> SeqNumber {
        self.first_seq + self.seq_len
    }
}

/// Sent-but-unacknowledged segments, a FIFO in sequence order.
#[derive(Debug, Default)]
pub(crate) struct SendQueue {
    segments: VecDeque<SentSegment>,
}

impl SendQueue {
    pub(crate) fn new() -> Self {
        SendQueue::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a newly sent segment.
    pub(crate) fn push(&mut self, segment: SentSegment) {
        if let Some(last) = self.segments.back() {
            debug_assert!(last.end_seq() == segment.first_seq);
        }
        self.segments.push_back(segment);
    }

    /// The oldest unacknowledged segment, the retransmission candidate.
    pub(crate) fn front(&self) -> Option<&SentSegment> {
        self.segments.front()
    }

    /// The number of sequence-space bytes currently in flight.
    pub(crate) fn inflight(&self) -> usize {
        match (self.segments.front(), self.segments.back()) {
            (Some(front), Some(back)) => back.end_seq() - front.first_seq,
            _ => 0,
        }
    }

    /// Remove every segment fully covered by a cumulative acknowledgment
    /// and return them in send order.
    pub(crate) fn remove_acked(&mut self, ackno: SeqNumber) -> Vec<SentSegment> {
        let mut acked = Vec::new();
        while let Some(front) = self.segments.front() {
            if front.end_seq() <= ackno {
                acked.push(self.segments.pop_front().unwrap());
            } else {
                break;
            }
        }
        acked
    }
}

/// A segment received but not yet handed to the application.
#[derive(Debug, Clone)]
pub(crate) struct RecvSegment {
    pub(crate) seqno: SeqNumber,
    pub(crate) data: Vec<u8>,
    pub(crate) fin: bool,
}

/// Received segments awaiting in-order delivery, sorted by sequence
/// number with no duplicates.
#[derive(Debug, Default)]
pub(crate) struct RecvQueue {
    segments: Vec<RecvSegment>,
}

impl RecvQueue {
    pub(crate) fn new() -> Self {
        RecvQueue::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Insert a segment at its sequence position.
    ///
    /// Returns `false` without inserting if a segment with the same
    /// sequence number is already queued.
    pub(crate) fn insert(&mut self, segment: RecvSegment) -> bool {
        if self.segments.iter().any(|queued| queued.seqno == segment.seqno) {
            return false;
        }

        let position = self.segments.iter()
            .position(|queued| queued.seqno > segment.seqno)
            .unwrap_or(self.segments.len());
        self.segments.insert(position, segment);
        true
    }

    /// The segment next in sequence order, if any.
    pub(crate) fn front(&self) -> Option<&RecvSegment> {
        self.segments.first()
    }

    /// Remove and return the segment next in sequence order.
    pub(crate) fn pop_front(&mut self) -> Option<RecvSegment> {
        if self.segments.is_empty() {
            None
        } else {
            Some(self.segments.remove(0))
        }
    }
}
