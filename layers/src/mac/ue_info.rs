//! Per-UE Scheduling State and Comparison Policies
//!
//! One [`UeSchedulingInfo`] record exists per attached UE per scheduler
//! instance, arena-owned and addressed by RNTI. The [`SchedPolicy`] bundle
//! carries the reset/success/failure/compare hooks the allocators invoke;
//! its four interchangeable strategies (RR, PF, QoS, AI-weighted) differ
//! only in ordering, never in how much resource a pass hands out.

use common::types::{BeamId, Direction, LcgId, Rnti};
use interfaces::{BsrReport, BufferStatusReport, LogicalChannelConfig, WeightUpdate};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::trace;

/// Arena of per-UE records, keyed by the stable RNTI handle
pub type UeArena = BTreeMap<Rnti, UeSchedulingInfo>;

/// Per-TTI grouping of schedulable UEs by beam, with buffer-requirement
/// estimates. Built fresh each TTI, never persisted.
pub type ActiveUeMap = BTreeMap<BeamId, Vec<(Rnti, u32)>>;

/// Ephemeral per-TTI mapping from beam to its assigned symbol count
pub type BeamSymbolMap = BTreeMap<BeamId, u32>;

/// Per-logical-channel downlink buffer state, mirrored from RLC reports
#[derive(Debug, Clone, Copy, Default)]
pub struct LcBufferStatus {
    /// Bytes queued for first transmission
    pub tx_queue_bytes: u32,
    /// Bytes queued for retransmission
    pub retx_queue_bytes: u32,
    /// Pending RLC status PDU bytes
    pub status_pdu_bytes: u32,
    /// Head-of-line delay in milliseconds
    pub hol_delay_ms: u16,
}

impl LcBufferStatus {
    /// Total bytes awaiting transmission
    pub fn total(&self) -> u32 {
        self.tx_queue_bytes + self.retx_queue_bytes + self.status_pdu_bytes
    }
}

/// Scheduling state for one UE within one bandwidth part
///
/// Buffer fields are mutated by buffer-status callbacks; allocation fields
/// are reset at the start of each TTI's pass and mutated only by the
/// allocator during that pass.
#[derive(Debug, Clone)]
pub struct UeSchedulingInfo {
    /// UE identifier, also the arena key
    pub rnti: Rnti,
    /// Beam the UE is served on
    pub beam_id: BeamId,

    /// DL RBG-symbol units allocated this TTI
    pub dl_rbg: u32,
    /// UL RBG-symbol units allocated this TTI
    pub ul_rbg: u32,
    /// DL symbols allocated this TTI
    pub dl_sym: u32,
    /// UL symbols allocated this TTI
    pub ul_sym: u32,

    /// Current DL MCS
    pub dl_mcs: u8,
    /// Current UL MCS
    pub ul_mcs: u8,
    /// DL MIMO rank
    pub dl_rank: u8,
    /// UL MIMO rank
    pub ul_rank: u8,
    /// DL precoding matrix reference
    pub dl_precoding: u8,
    /// UL precoding matrix reference
    pub ul_precoding: u8,

    /// DL transport block size cached after the last allocation change
    pub dl_tbs: u32,
    /// UL transport block size cached after the last allocation change
    pub ul_tbs: u32,

    /// Per-LC downlink buffer state
    pub dl_buffers: BTreeMap<u8, LcBufferStatus>,
    /// Per-LCG uplink buffer occupancy from BSRs
    pub ul_buffers: BTreeMap<LcgId, u32>,
    /// Configured logical channels, keyed by LCID
    pub lc_configs: BTreeMap<u8, LogicalChannelConfig>,

    /// Achievable throughput estimate for the current TTI, DL (bit/s)
    pub dl_potential_tput_bps: f64,
    /// Achievable throughput estimate for the current TTI, UL (bit/s)
    pub ul_potential_tput_bps: f64,
    /// Exponentially smoothed historical throughput, DL (bit/s)
    pub dl_avg_tput_bps: f64,
    /// Exponentially smoothed historical throughput, UL (bit/s)
    pub ul_avg_tput_bps: f64,

    /// Next HARQ process id, DL
    next_dl_harq: u8,
    /// Next HARQ process id, UL
    next_ul_harq: u8,
}

/// Number of HARQ processes per UE per direction
const NUM_HARQ_PROCESSES: u8 = 16;

impl UeSchedulingInfo {
    /// Create the record for a newly attached UE
    pub fn new(rnti: Rnti, beam_id: BeamId) -> Self {
        Self {
            rnti,
            beam_id,
            dl_rbg: 0,
            ul_rbg: 0,
            dl_sym: 0,
            ul_sym: 0,
            dl_mcs: 0,
            ul_mcs: 0,
            dl_rank: 1,
            ul_rank: 1,
            dl_precoding: 0,
            ul_precoding: 0,
            dl_tbs: 0,
            ul_tbs: 0,
            dl_buffers: BTreeMap::new(),
            ul_buffers: BTreeMap::new(),
            lc_configs: BTreeMap::new(),
            dl_potential_tput_bps: 0.0,
            ul_potential_tput_bps: 0.0,
            dl_avg_tput_bps: 0.0,
            ul_avg_tput_bps: 0.0,
            next_dl_harq: 0,
            next_ul_harq: 0,
        }
    }

    /// Reset the per-TTI allocation fields before a scheduling pass
    pub fn reset_allocation(&mut self, direction: Direction) {
        match direction {
            Direction::Dl => {
                self.dl_rbg = 0;
                self.dl_sym = 0;
                self.dl_tbs = 0;
            }
            Direction::Ul => {
                self.ul_rbg = 0;
                self.ul_sym = 0;
                self.ul_tbs = 0;
            }
        }
    }

    /// Apply a downlink buffer status report from RLC
    pub fn update_dl_buffer(&mut self, report: &BufferStatusReport) {
        let entry = self.dl_buffers.entry(report.lcid).or_default();
        entry.tx_queue_bytes = report.tx_queue_bytes;
        entry.retx_queue_bytes = report.retx_queue_bytes;
        entry.status_pdu_bytes = report.status_pdu_bytes;
        entry.hol_delay_ms = report.hol_delay_ms;
        trace!(
            "RNTI {} LCID {}: DL buffer now {} bytes",
            self.rnti.0,
            report.lcid,
            entry.total()
        );
    }

    /// Apply an uplink BSR
    pub fn update_ul_buffer(&mut self, bsr: &BsrReport) {
        self.ul_buffers.insert(bsr.lcg, bsr.buffer_bytes);
    }

    /// Total buffered bytes in one direction
    pub fn buffer_total(&self, direction: Direction) -> u32 {
        match direction {
            Direction::Dl => self.dl_buffers.values().map(|b| b.total()).sum(),
            Direction::Ul => self.ul_buffers.values().sum(),
        }
    }

    /// Best (numerically lowest) bearer priority among the UE's channels
    /// in one direction; default-bearer priority when none is configured
    pub fn priority(&self, direction: Direction) -> u8 {
        self.lc_configs
            .values()
            .filter(|lc| lc.direction == direction)
            .map(|lc| lc.qci.priority())
            .min()
            .unwrap_or(common::types::Qci::DEFAULT.priority())
    }

    /// Aggregate guaranteed bit rate over the UE's GBR bearers
    pub fn gbr_bps(&self, direction: Direction) -> u64 {
        self.lc_configs
            .values()
            .filter(|lc| lc.direction == direction && lc.qci.is_gbr())
            .filter_map(|lc| lc.gbr_bps)
            .sum()
    }

    /// RBG-symbol units allocated this TTI in one direction
    pub fn rbg(&self, direction: Direction) -> u32 {
        match direction {
            Direction::Dl => self.dl_rbg,
            Direction::Ul => self.ul_rbg,
        }
    }

    /// Current MCS in one direction
    pub fn mcs(&self, direction: Direction) -> u8 {
        match direction {
            Direction::Dl => self.dl_mcs,
            Direction::Ul => self.ul_mcs,
        }
    }

    /// MIMO rank in one direction
    pub fn rank(&self, direction: Direction) -> u8 {
        match direction {
            Direction::Dl => self.dl_rank,
            Direction::Ul => self.ul_rank,
        }
    }

    fn avg_tput(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Dl => self.dl_avg_tput_bps,
            Direction::Ul => self.ul_avg_tput_bps,
        }
    }

    fn potential_tput(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Dl => self.dl_potential_tput_bps,
            Direction::Ul => self.ul_potential_tput_bps,
        }
    }

    /// Whether a GBR bearer of this UE is running under its guaranteed rate
    pub fn gbr_starved(&self, direction: Direction) -> bool {
        let gbr = self.gbr_bps(direction);
        gbr > 0 && self.avg_tput(direction) < gbr as f64
    }

    /// Rotate to the next HARQ process id
    pub fn next_harq(&mut self, direction: Direction) -> u8 {
        let counter = match direction {
            Direction::Dl => &mut self.next_dl_harq,
            Direction::Ul => &mut self.next_ul_harq,
        };
        let id = *counter;
        *counter = (*counter + 1) % NUM_HARQ_PROCESSES;
        id
    }
}

/// Comparison strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicyKind {
    /// Serve the UE holding the least resource so far (tie-break: RNTI)
    RoundRobin,
    /// Serve the UE with the best achievable-over-average rate ratio
    ProportionalFair,
    /// Serve by bearer priority with a GBR starvation boost, PF tie-break
    Qos,
    /// Serve by externally injected weights; QoS ordering when absent
    AiWeighted,
}

/// The cohesive hook bundle the allocators drive: reset, success, failure
/// and compare, plus the AI weight store
#[derive(Debug, Clone)]
pub struct SchedPolicy {
    kind: SchedPolicyKind,
    /// PF smoothing window in TTIs; the smoothing factor is 1/window
    pf_window: f64,
    /// Externally injected per-UE weights (AI-weighted strategy only)
    weights: BTreeMap<Rnti, f64>,
}

impl SchedPolicy {
    /// Create a policy of the given kind with the default PF window
    pub fn new(kind: SchedPolicyKind) -> Self {
        Self {
            kind,
            pf_window: 100.0,
            weights: BTreeMap::new(),
        }
    }

    /// The active strategy
    pub fn kind(&self) -> SchedPolicyKind {
        self.kind
    }

    /// Accept a weight update message from an external learning agent
    pub fn apply_weight_update(&mut self, update: &WeightUpdate) {
        for (rnti, weight) in &update.weights {
            self.weights.insert(*rnti, *weight);
        }
    }

    /// Forget the weight of a released UE
    pub fn remove_weights(&mut self, rnti: Rnti) {
        self.weights.remove(&rnti);
    }

    /// Reset hook, invoked once per candidate before the iteration loop
    pub fn before_sched(&self, ue: &mut UeSchedulingInfo, direction: Direction) {
        ue.reset_allocation(direction);
    }

    /// Success hook for the UE that won the current iteration
    pub fn assigned(&self, ue: &mut UeSchedulingInfo, direction: Direction) {
        let alpha = 1.0 / self.pf_window;
        let potential = ue.potential_tput(direction);
        match direction {
            Direction::Dl => {
                ue.dl_avg_tput_bps = (1.0 - alpha) * ue.dl_avg_tput_bps + alpha * potential;
            }
            Direction::Ul => {
                ue.ul_avg_tput_bps = (1.0 - alpha) * ue.ul_avg_tput_bps + alpha * potential;
            }
        }
    }

    /// Failure hook for every UE that did not win the current iteration
    pub fn not_assigned(&self, ue: &mut UeSchedulingInfo, direction: Direction) {
        let alpha = 1.0 / self.pf_window;
        match direction {
            Direction::Dl => {
                ue.dl_avg_tput_bps *= 1.0 - alpha;
            }
            Direction::Ul => {
                ue.ul_avg_tput_bps *= 1.0 - alpha;
            }
        }
    }

    /// PF metric: achievable rate over smoothed historical rate
    fn pf_metric(ue: &UeSchedulingInfo, direction: Direction) -> f64 {
        const EPS: f64 = 1e-9;
        ue.potential_tput(direction) / ue.avg_tput(direction).max(EPS)
    }

    fn compare_rr(a: &UeSchedulingInfo, b: &UeSchedulingInfo, dir: Direction) -> Ordering {
        a.rbg(dir).cmp(&b.rbg(dir)).then(a.rnti.cmp(&b.rnti))
    }

    fn compare_pf(a: &UeSchedulingInfo, b: &UeSchedulingInfo, dir: Direction) -> Ordering {
        Self::pf_metric(b, dir)
            .partial_cmp(&Self::pf_metric(a, dir))
            .unwrap_or(Ordering::Equal)
            .then(a.rnti.cmp(&b.rnti))
    }

    fn compare_qos(a: &UeSchedulingInfo, b: &UeSchedulingInfo, dir: Direction) -> Ordering {
        // Under-served GBR flows jump the priority order entirely
        b.gbr_starved(dir)
            .cmp(&a.gbr_starved(dir))
            .then(a.priority(dir).cmp(&b.priority(dir)))
            .then_with(|| Self::compare_pf(a, b, dir))
    }

    /// Compare hook: total order over the candidate list
    ///
    /// Lower orderings schedule earlier. Ties always end at the RNTI so the
    /// order is deterministic for reproducible runs.
    pub fn compare(
        &self,
        a: &UeSchedulingInfo,
        b: &UeSchedulingInfo,
        direction: Direction,
    ) -> Ordering {
        match self.kind {
            SchedPolicyKind::RoundRobin => Self::compare_rr(a, b, direction),
            SchedPolicyKind::ProportionalFair => Self::compare_pf(a, b, direction),
            SchedPolicyKind::Qos => Self::compare_qos(a, b, direction),
            SchedPolicyKind::AiWeighted => {
                if self.weights.is_empty() {
                    return Self::compare_qos(a, b, direction);
                }
                let wa = self.weights.get(&a.rnti).copied().unwrap_or(0.0);
                let wb = self.weights.get(&b.rnti).copied().unwrap_or(0.0);
                wb.partial_cmp(&wa)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| Self::compare_qos(a, b, direction))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::Qci;

    fn lc(lcid: u8, qci: Qci, dir: Direction, gbr: Option<u64>) -> LogicalChannelConfig {
        LogicalChannelConfig {
            lcid,
            lcg: LcgId(0),
            qci,
            direction: dir,
            gbr_bps: gbr,
            mbr_bps: None,
        }
    }

    fn ue(rnti: u16) -> UeSchedulingInfo {
        UeSchedulingInfo::new(Rnti::new(rnti), BeamId::new(0))
    }

    #[test]
    fn test_buffer_totals() {
        let mut u = ue(1);
        u.update_dl_buffer(&BufferStatusReport {
            rnti: u.rnti,
            lcid: 4,
            tx_queue_bytes: 500,
            retx_queue_bytes: 100,
            status_pdu_bytes: 4,
            hol_delay_ms: 0,
        });
        u.update_dl_buffer(&BufferStatusReport {
            rnti: u.rnti,
            lcid: 5,
            tx_queue_bytes: 200,
            retx_queue_bytes: 0,
            status_pdu_bytes: 0,
            hol_delay_ms: 10,
        });
        assert_eq!(u.buffer_total(Direction::Dl), 804);
        assert_eq!(u.buffer_total(Direction::Ul), 0);

        u.update_ul_buffer(&BsrReport {
            rnti: u.rnti,
            lcg: LcgId(1),
            buffer_bytes: 300,
        });
        assert_eq!(u.buffer_total(Direction::Ul), 300);
    }

    #[test]
    fn test_priority_is_minimum_over_channels() {
        let mut u = ue(1);
        u.lc_configs.insert(4, lc(4, Qci::DEFAULT, Direction::Dl, None));
        assert_eq!(u.priority(Direction::Dl), Qci::DEFAULT.priority());
        u.lc_configs.insert(1, lc(1, Qci::VOICE, Direction::Dl, Some(64_000)));
        assert_eq!(u.priority(Direction::Dl), Qci::VOICE.priority());
        // UL unaffected by DL channels
        assert_eq!(u.priority(Direction::Ul), Qci::DEFAULT.priority());
    }

    #[test]
    fn test_harq_rotation() {
        let mut u = ue(1);
        assert_eq!(u.next_harq(Direction::Dl), 0);
        assert_eq!(u.next_harq(Direction::Dl), 1);
        for _ in 0..14 {
            u.next_harq(Direction::Dl);
        }
        assert_eq!(u.next_harq(Direction::Dl), 0);
        // Directions rotate independently
        assert_eq!(u.next_harq(Direction::Ul), 0);
    }

    #[test]
    fn test_rr_compare_prefers_least_served() {
        let policy = SchedPolicy::new(SchedPolicyKind::RoundRobin);
        let mut a = ue(1);
        let b = ue(2);
        assert_eq!(policy.compare(&a, &b, Direction::Dl), Ordering::Less);
        a.dl_rbg = 20;
        assert_eq!(policy.compare(&a, &b, Direction::Dl), Ordering::Greater);
    }

    #[test]
    fn test_pf_compare_prefers_underserved() {
        let policy = SchedPolicy::new(SchedPolicyKind::ProportionalFair);
        let mut a = ue(1);
        let mut b = ue(2);
        a.dl_potential_tput_bps = 1e6;
        b.dl_potential_tput_bps = 1e6;
        a.dl_avg_tput_bps = 2e6;
        b.dl_avg_tput_bps = 1e5;
        // b has the larger metric, so b sorts first
        assert_eq!(policy.compare(&a, &b, Direction::Dl), Ordering::Greater);
    }

    #[test]
    fn test_pf_hooks_smooth_average() {
        let policy = SchedPolicy::new(SchedPolicyKind::ProportionalFair);
        let mut u = ue(1);
        u.dl_potential_tput_bps = 1e6;
        u.dl_avg_tput_bps = 1e6;
        policy.not_assigned(&mut u, Direction::Dl);
        assert!(u.dl_avg_tput_bps < 1e6);
        let decayed = u.dl_avg_tput_bps;
        u.dl_potential_tput_bps = 2e6;
        policy.assigned(&mut u, Direction::Dl);
        assert!(u.dl_avg_tput_bps > decayed);
    }

    #[test]
    fn test_qos_compare_priority_and_gbr_boost() {
        let policy = SchedPolicy::new(SchedPolicyKind::Qos);
        let mut voice = ue(1);
        let mut best_effort = ue(2);
        voice
            .lc_configs
            .insert(1, lc(1, Qci::VOICE, Direction::Dl, Some(64_000)));
        best_effort
            .lc_configs
            .insert(4, lc(4, Qci::DEFAULT, Direction::Dl, None));

        // Voice is under its GBR floor and outranks best effort
        assert!(voice.gbr_starved(Direction::Dl));
        assert_eq!(
            policy.compare(&voice, &best_effort, Direction::Dl),
            Ordering::Less
        );

        // Once served above the floor, priority still favors voice
        voice.dl_avg_tput_bps = 1e6;
        assert!(!voice.gbr_starved(Direction::Dl));
        assert_eq!(
            policy.compare(&voice, &best_effort, Direction::Dl),
            Ordering::Less
        );
    }

    #[test]
    fn test_ai_weights_override_and_fallback() {
        let mut policy = SchedPolicy::new(SchedPolicyKind::AiWeighted);
        let mut low_prio = ue(1);
        let mut high_prio = ue(2);
        low_prio
            .lc_configs
            .insert(4, lc(4, Qci::DEFAULT, Direction::Dl, None));
        high_prio
            .lc_configs
            .insert(1, lc(1, Qci(5), Direction::Dl, None));

        // No weights: falls back to QoS ordering
        assert_eq!(
            policy.compare(&low_prio, &high_prio, Direction::Dl),
            Ordering::Greater
        );

        policy.apply_weight_update(&WeightUpdate {
            weights: vec![(Rnti::new(1), 0.9), (Rnti::new(2), 0.1)],
        });
        assert_eq!(
            policy.compare(&low_prio, &high_prio, Direction::Dl),
            Ordering::Less
        );
    }
}
