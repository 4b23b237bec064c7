//! The ARP cache and its pending-resolution queue.
//!
//! Resolved mappings live for fifteen seconds. Requests go out from the
//! periodic sweeper only, once per second per unresolved address; after
//! five attempts the queued frames are bounced as host-unreachable and
//! the resolution is dropped.
use std::collections::BTreeMap;
use std::collections::VecDeque;

use crate::time::{Duration, Instant};
use crate::wire::{EthernetAddress, Ipv4Address};

/// How long a resolved mapping stays valid.
pub(crate) const ENTRY_LIFETIME: Duration = Duration::from_secs(15);

/// Minimum delay between two requests for the same address.
pub(crate) const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Number of requests sent before an address is declared unreachable.
pub(crate) const REQUEST_LIMIT: u32 = 5;

/// A resolved neighbor mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    mac: EthernetAddress,
    inserted_at: Instant,
}

/// A frame parked until its next hop resolves.
///
/// Owns a full Ethernet+IP image of what will go on the wire; the
/// Ethernet addresses are filled in at transmission time.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFrame {
    /// The frame bytes, source and destination MAC not yet stamped.
    pub bytes: Vec<u8>,
    /// Name of the interface the frame will leave on.
    pub interface: String,
}

/// The resolution state for one unresolved next hop.
///
/// At most one request exists per address; the pending queue keeps
/// arrival order.
#[derive(Debug, PartialEq)]
pub struct Request {
    /// The address being resolved.
    pub ip: Ipv4Address,
    /// How many requests the sweeper has sent so far.
    pub sent_count: u32,
    /// When the sweeper last sent a request, if ever.
    pub last_sent_at: Option<Instant>,
    /// Frames waiting for the resolution, in arrival order.
    pub frames: VecDeque<PendingFrame>,
}

/// A request the sweeper decided to (re-)send.
#[derive(Debug, PartialEq, Eq)]
pub struct Retry {
    /// The address to ask for.
    pub ip: Ipv4Address,
    /// Name of the interface to broadcast on, taken from the first
    /// pending frame.
    pub interface: String,
}

/// What one sweeper pass decided.
///
/// The cache only does the bookkeeping; emitting the request broadcasts
/// and the host-unreachable errors is the router's job, with the cache
/// lock still held.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    /// Requests due for another broadcast.
    pub retries: Vec<Retry>,
    /// Requests that ran out of attempts, removed from the cache.
    pub exhausted: Vec<Request>,
}

impl Default for Request {
    fn default() -> Self {
        Request {
            ip: Ipv4Address::UNSPECIFIED,
            sent_count: 0,
            last_sent_at: None,
            frames: VecDeque::new(),
        }
    }
}

/// The ARP cache with its pending-resolution queue.
///
/// Shared between the receive path (lookups on forward, inserts on
/// reply) and the periodic sweeper; the owner wraps it in a mutex.
#[derive(Debug, Default)]
pub struct Cache {
    entries: BTreeMap<Ipv4Address, Entry>,
    requests: Vec<Request>,
}

impl Cache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Cache::default()
    }

    /// Look up the hardware address for `ip`.
    ///
    /// Entries older than [`ENTRY_LIFETIME`] are not returned.
    ///
    /// [`ENTRY_LIFETIME`]: constant.ENTRY_LIFETIME.html
    pub fn lookup(&self, ip: Ipv4Address, now: Instant) -> Option<EthernetAddress> {
        let entry = self.entries.get(&ip)?;
        if now - entry.inserted_at < ENTRY_LIFETIME {
            Some(entry.mac)
        } else {
            None
        }
    }

    /// Insert a mapping, refreshing its lifetime.
    ///
    /// If a resolution was pending for `ip` the request is detached and
    /// handed to the caller, which drains the queued frames and drops it.
    pub fn insert(&mut self, ip: Ipv4Address, mac: EthernetAddress, now: Instant)
        -> Option<Request>
    {
        self.entries.insert(ip, Entry { mac, inserted_at: now });

        let position = self.requests.iter().position(|req| req.ip == ip)?;
        Some(self.requests.remove(position))
    }

    /// Park a frame until `next_hop` resolves.
    ///
    /// Creates the request if this is the first frame waiting for the
    /// address; the sweeper will send the actual query.
    pub fn enqueue(&mut self, next_hop: Ipv4Address, bytes: Vec<u8>, interface: &str) {
        let frame = PendingFrame { bytes, interface: interface.into() };

        match self.requests.iter_mut().find(|req| req.ip == next_hop) {
            Some(request) => request.frames.push_back(frame),
            None => {
                let mut request = Request { ip: next_hop, ..Request::default() };
                request.frames.push_back(frame);
                self.requests.push(request);
            },
        }
    }

    /// One pass of the periodic sweeper.
    ///
    /// Evicts expired entries, then walks the requests: ones queried less
    /// than [`RETRY_INTERVAL`] ago are left alone, ones out of attempts
    /// are removed and returned, the rest are marked sent and returned as
    /// retries.
    ///
    /// [`RETRY_INTERVAL`]: constant.RETRY_INTERVAL.html
    pub fn sweep(&mut self, now: Instant) -> SweepOutcome {
        self.entries.retain(|_, entry| now - entry.inserted_at < ENTRY_LIFETIME);

        let mut outcome = SweepOutcome::default();
        let mut keep = Vec::with_capacity(self.requests.len());

        for mut request in self.requests.drain(..) {
            if let Some(last) = request.last_sent_at {
                if now - last < RETRY_INTERVAL {
                    keep.push(request);
                    continue;
                }
            }

            if request.sent_count >= REQUEST_LIMIT {
                outcome.exhausted.push(request);
                continue;
            }

            let interface = match request.frames.front() {
                Some(frame) => frame.interface.clone(),
                // A request without frames has nothing left to resolve for.
                None => continue,
            };

            request.sent_count += 1;
            request.last_sent_at = Some(now);
            outcome.retries.push(Retry { ip: request.ip, interface });
            keep.push(request);
        }

        self.requests = keep;
        outcome
    }

    #[cfg(test)]
    fn request_count(&self) -> usize {
        self.requests.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const IP_A: Ipv4Address = Ipv4Address([10, 0, 2, 5]);
    const IP_B: Ipv4Address = Ipv4Address([10, 0, 2, 6]);
    const MAC_A: EthernetAddress = EthernetAddress([0, 0, 0, 0, 0, 0xa]);

    #[test]
    fn insert_then_lookup() {
        let mut cache = Cache::new();
        let t0 = Instant::from_secs(0);

        assert_eq!(cache.lookup(IP_A, t0), None);
        assert_eq!(cache.insert(IP_A, MAC_A, t0), None);
        assert_eq!(cache.lookup(IP_A, t0), Some(MAC_A));
    }

    #[test]
    fn entries_expire() {
        let mut cache = Cache::new();
        let t0 = Instant::from_secs(0);

        cache.insert(IP_A, MAC_A, t0);
        assert_eq!(cache.lookup(IP_A, t0 + Duration::from_secs(14)), Some(MAC_A));
        assert_eq!(cache.lookup(IP_A, t0 + Duration::from_secs(15)), None);

        // Re-insertion refreshes the stamp.
        cache.insert(IP_A, MAC_A, t0 + Duration::from_secs(20));
        assert_eq!(cache.lookup(IP_A, t0 + Duration::from_secs(30)), Some(MAC_A));
    }

    #[test]
    fn one_request_per_address() {
        let mut cache = Cache::new();

        cache.enqueue(IP_A, vec![1], "eth2");
        cache.enqueue(IP_A, vec![2], "eth2");
        cache.enqueue(IP_B, vec![3], "eth2");
        assert_eq!(cache.request_count(), 2);

        let request = cache.insert(IP_A, MAC_A, Instant::from_secs(0)).unwrap();
        assert_eq!(request.ip, IP_A);
        let queued: Vec<_> = request.frames.iter().map(|f| f.bytes.clone()).collect();
        assert_eq!(queued, vec![vec![1], vec![2]]);
        assert_eq!(cache.request_count(), 1);
    }

    #[test]
    fn sweep_sends_then_exhausts() {
        let mut cache = Cache::new();
        let t0 = Instant::from_secs(0);

        cache.enqueue(IP_A, vec![1], "eth2");

        // First sweep fires immediately, then once per second.
        for round in 0..REQUEST_LIMIT {
            let outcome = cache.sweep(t0 + Duration::from_secs(round as u64));
            assert_eq!(outcome.retries, vec![Retry { ip: IP_A, interface: "eth2".into() }]);
            assert!(outcome.exhausted.is_empty());
        }

        // Sweeping again within the retry interval does nothing.
        let outcome = cache.sweep(t0 + Duration::from_millis(4500));
        assert!(outcome.retries.is_empty());
        assert!(outcome.exhausted.is_empty());

        // The next due sweep gives up.
        let outcome = cache.sweep(t0 + Duration::from_secs(5));
        assert!(outcome.retries.is_empty());
        assert_eq!(outcome.exhausted.len(), 1);
        assert_eq!(outcome.exhausted[0].sent_count, REQUEST_LIMIT);
        assert_eq!(cache.request_count(), 0);
    }

    #[test]
    fn sweep_evicts_expired_entries() {
        let mut cache = Cache::new();
        let t0 = Instant::from_secs(0);

        cache.insert(IP_A, MAC_A, t0);
        cache.sweep(t0 + Duration::from_secs(16));
        assert_eq!(cache.lookup(IP_A, t0 + Duration::from_secs(16)), None);
    }
}
