//! The BBR congestion controller.
//!
//! BBR models the path with two windowed estimates: the bottleneck
//! bandwidth `btl_bw` (a max filter over recent delivery-rate samples)
//! and the round-trip propagation delay `rt_prop` (a min filter over
//! recent RTT samples). A four-mode state machine paces around these:
//!
//! - `Startup` ramps the sending rate to find the bandwidth,
//! - `Drain` empties the queue startup built,
//! - `ProbeBw` cycles its pacing gain around the estimate,
//! - `ProbeRtt` briefly dips the window to re-measure the unloaded RTT.
//!
//! All gains are fixed-point fractions over [`BBR_UNIT`]; bandwidth is in
//! bytes per clock-millisecond, scaled by `2^BW_SCALE` against
//! truncation.
//!
//! [`BBR_UNIT`]: constant.BBR_UNIT.html
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::time::{Duration, Instant};
use crate::wire::MAX_SEG_DATA_SIZE;

/// Scale shift for bandwidth values.
pub const BW_SCALE: u32 = 24;

/// Scale shift for fractional gains.
const BBR_SCALE: u32 = 8;

/// The fixed-point unit gains are expressed over.
pub const BBR_UNIT: u64 = 1 << BBR_SCALE;

/// Number of phases in a pacing gain cycle.
const CYCLE_LEN: usize = 8;

/// Window length of the bandwidth filter, in samples.
const BW_FILTER_LEN: usize = CYCLE_LEN + 2;

/// Window length of the RTT filter, in samples.
const RTT_FILTER_LEN: usize = 10;

/// 2/ln(2), the gain that doubles the pacing rate each round.
const HIGH_GAIN: u64 = 739;

/// Inverse of the startup gain, used to drain the startup queue.
const DRAIN_GAIN: u64 = 89;

/// Steady-state cwnd gain: one BDP of headroom over the pipe.
const STEADY_CWND_GAIN: u64 = 2 * BBR_UNIT;

/// The PROBE_BW pacing gain cycle: probe up, drain, then coast.
const PACING_GAIN_CYCLE: [u64; CYCLE_LEN] = [320, 192, 256, 256, 256, 256, 256, 256];

/// Bandwidth must grow 1.25x per round for startup to keep going.
const FULL_BW_THRESH: u64 = 320;

/// Rounds without such growth before the pipe counts as full.
const FULL_BW_ROUNDS: u32 = 3;

/// How long PROBE_RTT holds the window down.
const PROBE_RTT_DURATION: Duration = Duration::from_millis(200);

/// The floor for the congestion window: four full segments, enough for
/// ack clocking to keep running.
const MIN_CWND: u64 = 4 * MAX_SEG_DATA_SIZE as u64;

/// The `rt_prop` estimate before any sample arrived, in clock units.
const INIT_RT_PROP: u64 = 40;

/// The mode deciding how fast to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Ramp up sending rate rapidly to fill the pipe.
    Startup,
    /// Drain any queue created during startup.
    Drain,
    /// Discover and share bandwidth: pace around the estimated bw.
    ProbeBw,
    /// Cut cwnd to the minimum to probe the unloaded RTT.
    ProbeRtt,
}

/// The congestion control block of one connection.
#[derive(Debug)]
pub struct Bbr {
    mode: Mode,
    pacing_gain: u64,
    cwnd_gain: u64,

    btl_bw: u64,
    btl_bw_filter: [u64; BW_FILTER_LEN],
    btl_bw_stamp: Instant,
    rt_prop: u64,
    rt_prop_filter: [u64; RTT_FILTER_LEN],
    rt_prop_stamp: Instant,

    cycle_idx: usize,
    full_bw: u64,
    full_bw_cnt: u32,

    pacing_rate: u64,
    cwnd: u64,
    prior_cwnd: u64,
    restore_cwnd: bool,
    inflight: u64,
    probe_rtt_done_at: Option<Instant>,

    rng: StdRng,
}

impl Bbr {
    /// Create a controller in startup mode.
    ///
    /// `initial_cwnd` (bytes) seeds the bandwidth estimate as one window
    /// per assumed round trip; `seed` feeds the host-provided randomness
    /// for the PROBE_BW cycle phase.
    pub fn new(initial_cwnd: usize, seed: u64, now: Instant) -> Self {
        let mut bbr = Bbr {
            mode: Mode::Startup,
            pacing_gain: HIGH_GAIN,
            cwnd_gain: HIGH_GAIN,
            btl_bw: ((initial_cwnd as u64) << BW_SCALE) / INIT_RT_PROP,
            btl_bw_filter: [0; BW_FILTER_LEN],
            btl_bw_stamp: now,
            rt_prop: INIT_RT_PROP,
            rt_prop_filter: [u64::max_value(); RTT_FILTER_LEN],
            rt_prop_stamp: now,
            cycle_idx: 0,
            full_bw: 0,
            full_bw_cnt: 0,
            pacing_rate: 0,
            cwnd: MIN_CWND,
            prior_cwnd: 0,
            restore_cwnd: false,
            inflight: 0,
            probe_rtt_done_at: None,
            rng: StdRng::seed_from_u64(seed),
        };
        bbr.set_pacing_rate();
        bbr.set_cwnd();
        bbr
    }

    /// The current congestion window, in bytes.
    pub fn cwnd(&self) -> usize {
        self.cwnd as usize
    }

    /// The current pacing rate, in bytes per millisecond scaled by
    /// `2^BW_SCALE`.
    pub fn pacing_rate(&self) -> u64 {
        self.pacing_rate
    }

    /// The current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// How long sending `bytes` should be spread over at the current
    /// pacing rate.
    pub fn pacing_delay(&self, bytes: usize) -> Duration {
        if self.pacing_rate == 0 {
            return Duration::from_millis(0);
        }
        let millis = ((bytes as u64) << BW_SCALE) / self.pacing_rate;
        Duration::from_millis(millis)
    }

    /// Tell the controller how much is in flight; consulted when leaving
    /// drain mode.
    pub fn set_inflight(&mut self, bytes: usize) {
        self.inflight = bytes as u64;
    }

    /// Whether startup has filled the pipe.
    pub fn full_bw_reached(&self) -> bool {
        self.full_bw_cnt >= FULL_BW_ROUNDS
    }

    /// Absorb one acknowledged segment.
    ///
    /// `bw_sample` is the delivery rate over the segment's flight
    /// (bytes/ms scaled by `2^BW_SCALE`), `rtt_sample` its round-trip
    /// time in clock units. Derives the new pacing rate and window.
    pub fn on_ack(&mut self, bw_sample: u64, rtt_sample: u64, now: Instant) {
        self.update_bw(bw_sample, now);
        self.update_cycle_phase();
        self.check_full_bw_reached();
        self.check_drain();
        self.update_rt_prop(rtt_sample, now);
        self.set_pacing_rate();
        self.set_cwnd();
    }

    /// Push a sample into the bandwidth max-filter.
    fn update_bw(&mut self, bw_sample: u64, now: Instant) {
        for idx in 0..BW_FILTER_LEN - 1 {
            self.btl_bw_filter[idx] = self.btl_bw_filter[idx + 1];
        }
        self.btl_bw_filter[BW_FILTER_LEN - 1] = bw_sample;

        self.btl_bw = self.btl_bw_filter.iter().copied().max()
            .unwrap_or(bw_sample);
        self.btl_bw_stamp = now;
    }

    /// Cycle the pacing gain to converge to a fair bandwidth share.
    fn update_cycle_phase(&mut self) {
        if self.mode == Mode::ProbeBw {
            self.cycle_idx = (self.cycle_idx + 1) % CYCLE_LEN;
            self.pacing_gain = PACING_GAIN_CYCLE[self.cycle_idx];
        }
    }

    /// Estimate whether startup filled the pipe: the bandwidth estimate
    /// stopped growing by 1.25x for three consecutive rounds.
    fn check_full_bw_reached(&mut self) {
        if self.full_bw_reached() {
            return;
        }

        let bw_thresh = self.full_bw.saturating_mul(FULL_BW_THRESH) >> BBR_SCALE;
        if self.btl_bw >= bw_thresh {
            self.full_bw = self.btl_bw;
            self.full_bw_cnt = 0;
            return;
        }
        self.full_bw_cnt += 1;
    }

    /// Leave startup once the pipe is full, and drain until in-flight
    /// data fits the window.
    fn check_drain(&mut self) {
        if self.mode == Mode::Startup && self.full_bw_reached() {
            net_debug!("bbr: startup -> drain");
            self.mode = Mode::Drain;
            self.pacing_gain = DRAIN_GAIN;
            self.cwnd_gain = HIGH_GAIN;
        }
        if self.mode == Mode::Drain && self.inflight <= self.cwnd {
            net_debug!("bbr: drain -> probe_bw");
            self.enter_probe_bw();
        }
    }

    fn enter_probe_bw(&mut self) {
        self.mode = Mode::ProbeBw;
        self.pacing_gain = BBR_UNIT;
        self.cwnd_gain = STEADY_CWND_GAIN;
        self.cycle_idx = CYCLE_LEN - 1 - self.rng.gen_range(0..CYCLE_LEN - 1);
    }

    fn enter_startup(&mut self) {
        self.mode = Mode::Startup;
        self.pacing_gain = HIGH_GAIN;
        self.cwnd_gain = HIGH_GAIN;
    }

    /// Push a sample into the RTT min-filter and run the PROBE_RTT
    /// machine.
    ///
    /// The estimate expires when the in-window minimum rises above the
    /// previous `rt_prop`: the old minimum aged out and nothing as low
    /// arrived since. The brief window dip re-measures the unloaded RTT.
    fn update_rt_prop(&mut self, rtt_sample: u64, now: Instant) {
        let last_rt_prop = self.rt_prop;

        for idx in 0..RTT_FILTER_LEN - 1 {
            self.rt_prop_filter[idx] = self.rt_prop_filter[idx + 1];
        }
        self.rt_prop_filter[RTT_FILTER_LEN - 1] = rtt_sample;

        self.rt_prop = self.rt_prop_filter.iter().copied().min()
            .unwrap_or(rtt_sample);
        self.rt_prop_stamp = now;

        let filter_expired = self.rt_prop > last_rt_prop;
        if filter_expired && self.mode != Mode::ProbeRtt {
            net_debug!("bbr: {:?} -> probe_rtt", self.mode);
            self.mode = Mode::ProbeRtt;
            self.pacing_gain = BBR_UNIT;
            self.cwnd_gain = BBR_UNIT;
            self.save_cwnd();
            self.probe_rtt_done_at = Some(now + PROBE_RTT_DURATION);
        }

        if self.mode == Mode::ProbeRtt {
            if let Some(done_at) = self.probe_rtt_done_at {
                if now >= done_at {
                    self.probe_rtt_done_at = None;
                    if self.full_bw_reached() {
                        self.enter_probe_bw();
                    } else {
                        self.enter_startup();
                    }
                    // The saved window is re-applied by set_cwnd once the
                    // dip is over.
                }
            }
        }
    }

    fn save_cwnd(&mut self) {
        self.prior_cwnd = self.cwnd;
        self.restore_cwnd = true;
    }

    /// Pace at the bandwidth estimate times the mode's gain. During
    /// startup the rate only ratchets upward.
    fn set_pacing_rate(&mut self) {
        let rate = self.btl_bw.saturating_mul(self.pacing_gain) >> BBR_SCALE;
        if self.mode != Mode::Startup || rate > self.pacing_rate {
            self.pacing_rate = rate;
        }
    }

    /// Size the window from the estimated BDP and the mode's gain, with
    /// the PROBE_RTT dip and the four-segment floor applied.
    ///
    /// Leaving the dip, the window saved at entry is re-applied: the
    /// result is `max(cwnd, prior_cwnd)`, so the dip itself never shrinks
    /// the steady-state window.
    fn set_cwnd(&mut self) {
        let bdp = self.btl_bw.saturating_mul(self.rt_prop) >> BW_SCALE;
        let target = bdp.saturating_mul(self.cwnd_gain) >> BBR_SCALE;
        self.cwnd = target.max(MIN_CWND);
        if self.mode == Mode::ProbeRtt {
            self.cwnd = MIN_CWND;
        } else if self.restore_cwnd {
            self.cwnd = self.cwnd.max(self.prior_cwnd);
            self.restore_cwnd = false;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // Steady RTT below the initial estimate, so the min filter never
    // expires unless a test wants it to.
    const RTT: u64 = 10;

    fn controller() -> Bbr {
        Bbr::new(MAX_SEG_DATA_SIZE, 7, Instant::from_millis(0))
    }

    #[test]
    fn initial_state() {
        let bbr = controller();
        assert_eq!(bbr.mode(), Mode::Startup);
        assert_eq!(bbr.cwnd(), MIN_CWND as usize);
        assert!(bbr.pacing_rate() > 0);
        assert!(!bbr.full_bw_reached());
    }

    #[test]
    fn btl_bw_is_windowed_max() {
        let mut bbr = controller();
        let now = Instant::from_millis(0);

        bbr.on_ack(500, RTT, now);
        bbr.on_ack(300, RTT, now);
        assert_eq!(bbr.btl_bw, 500);

        // The maximum ages out of the ten-sample window.
        for _ in 0..BW_FILTER_LEN {
            bbr.on_ack(300, RTT, now);
        }
        assert_eq!(bbr.btl_bw, 300);
    }

    #[test]
    fn pipe_full_detection() {
        let mut bbr = controller();
        let now = Instant::from_millis(0);
        bbr.set_inflight(usize::max_value());

        // No 1.25x growth: one establishing sample, then three
        // non-growth rounds.
        for &sample in &[100u64, 100, 101, 100] {
            assert!(!bbr.full_bw_reached());
            assert_eq!(bbr.mode(), Mode::Startup);
            bbr.on_ack(sample, RTT, now);
        }

        assert!(bbr.full_bw_reached());
        assert_eq!(bbr.mode(), Mode::Drain);
    }

    #[test]
    fn growth_resets_the_count() {
        let mut bbr = controller();
        let now = Instant::from_millis(0);

        bbr.on_ack(100, RTT, now);
        bbr.on_ack(100, RTT, now);
        bbr.on_ack(100, RTT, now);
        // 1.25x growth starts the count over.
        bbr.on_ack(200, RTT, now);
        bbr.on_ack(200, RTT, now);
        bbr.on_ack(200, RTT, now);
        assert!(!bbr.full_bw_reached());
        assert_eq!(bbr.mode(), Mode::Startup);
    }

    #[test]
    fn drain_exits_once_inflight_fits() {
        let mut bbr = controller();
        let now = Instant::from_millis(0);
        bbr.set_inflight(usize::max_value());

        for &sample in &[100u64, 100, 100, 100] {
            bbr.on_ack(sample, RTT, now);
        }
        assert_eq!(bbr.mode(), Mode::Drain);

        bbr.set_inflight(0);
        bbr.on_ack(100, RTT, now);
        assert_eq!(bbr.mode(), Mode::ProbeBw);
        assert!(bbr.cycle_idx < CYCLE_LEN);
    }

    #[test]
    fn probe_bw_cycles_all_eight_phases() {
        let mut bbr = controller();
        let now = Instant::from_millis(0);

        // With nothing in flight, drain is left as soon as it is entered.
        for &sample in &[100u64, 100, 100, 100] {
            bbr.on_ack(sample, RTT, now);
        }
        assert_eq!(bbr.mode(), Mode::ProbeBw);

        let mut seen = [false; CYCLE_LEN];
        for _ in 0..CYCLE_LEN {
            bbr.on_ack(100, RTT, now);
            seen[bbr.cycle_idx] = true;
            assert_eq!(bbr.pacing_gain, PACING_GAIN_CYCLE[bbr.cycle_idx]);
        }
        assert!(seen.iter().all(|&phase| phase));
    }

    #[test]
    fn rt_prop_expiry_enters_and_leaves_probe_rtt() {
        let mut bbr = controller();
        let mut now = Instant::from_millis(0);

        // Keep the bandwidth growing so the pipe never counts as full;
        // establish a low RTT minimum, then let it age out of the window.
        let mut bw = 100u64;
        bbr.on_ack(bw, 5, now);
        for _ in 0..RTT_FILTER_LEN - 1 {
            now += Duration::from_millis(20);
            bw *= 2;
            bbr.on_ack(bw, 20, now);
            assert_eq!(bbr.rt_prop, 5);
            assert_ne!(bbr.mode(), Mode::ProbeRtt);
        }

        now += Duration::from_millis(20);
        bw *= 2;
        bbr.on_ack(bw, 20, now);
        assert_eq!(bbr.rt_prop, 20);
        assert_eq!(bbr.mode(), Mode::ProbeRtt);
        assert_eq!(bbr.cwnd(), MIN_CWND as usize);

        // The dip is bounded: 200 ms later the controller returns to
        // startup, the pipe never having been filled, and the window is
        // at least what it was before the dip.
        let prior = bbr.prior_cwnd;
        now += Duration::from_millis(250);
        bbr.on_ack(bw * 2, 20, now);
        assert_eq!(bbr.mode(), Mode::Startup);
        assert!(bbr.cwnd() as u64 >= prior);
        assert!(!bbr.restore_cwnd);
    }

    #[test]
    fn probe_rtt_exit_restores_the_saved_window() {
        let mut bbr = controller();
        let now = Instant::from_millis(0);

        // Mid-dip, with a large window saved at entry and the dip period
        // already over.
        bbr.mode = Mode::ProbeRtt;
        bbr.pacing_gain = BBR_UNIT;
        bbr.cwnd_gain = BBR_UNIT;
        bbr.prior_cwnd = 10 * MIN_CWND;
        bbr.restore_cwnd = true;
        bbr.probe_rtt_done_at = Some(now);

        // The bandwidth collapsed meanwhile, so the fresh BDP target is
        // far below the saved window. The restore must still win.
        bbr.on_ack(1, 1, now + Duration::from_millis(1));
        assert_ne!(bbr.mode(), Mode::ProbeRtt);
        assert_eq!(bbr.cwnd() as u64, 10 * MIN_CWND);
        assert!(!bbr.restore_cwnd);
    }

    #[test]
    fn startup_pacing_never_decreases() {
        let mut bbr = controller();
        let now = Instant::from_millis(0);

        bbr.on_ack(1_000_000, RTT, now);
        let peak = bbr.pacing_rate();
        bbr.on_ack(10, RTT, now);
        assert_eq!(bbr.mode(), Mode::Startup);
        assert!(bbr.pacing_rate() >= peak);
    }

    #[test]
    fn pacing_delay_scales_with_rate() {
        let mut bbr = controller();
        let now = Instant::from_millis(0);
        bbr.on_ack(1440 << BW_SCALE, RTT, now);

        // At one segment per millisecond (scaled), a segment takes about
        // a millisecond worth of pacing once gains are accounted for.
        let delay = bbr.pacing_delay(MAX_SEG_DATA_SIZE);
        assert!(delay <= Duration::from_millis(2));
    }
}
