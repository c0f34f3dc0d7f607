//! Medium Access Control (MAC) Scheduler
//!
//! Per-TTI resource allocation for one bandwidth part: the scheduler owns
//! the per-UE state arena, runs the configured allocator (TDMA or OFDMA)
//! with the configured comparison policy, and emits one DCI per scheduled
//! UE per TTI. Scheduling is single-threaded and run-to-completion; the
//! simulator's event loop invokes [`MacScheduler::schedule_slot`] as one
//! atomic callback.

pub mod amc;
pub mod bwp;
pub mod mcs_tables;
pub mod ofdma;
pub mod tdma;
pub mod ue_info;

pub use amc::{Amc, AmcModel, CqiFeedback};
pub use bwp::BwpManager;
pub use mcs_tables::McsTable;
pub use ofdma::OfdmaAllocator;
pub use tdma::TdmaAllocator;
pub use ue_info::{
    ActiveUeMap, BeamSymbolMap, SchedPolicy, SchedPolicyKind, UeArena, UeSchedulingInfo,
};

use crate::SchedError;
use common::types::{BwpId, Direction, Rnti, SubcarrierSpacing};
use common::utils::{time, SYMBOLS_PER_SLOT};
use interfaces::{
    BlerModel, BsrReport, BufferStatusReport, DciInfoElement, LogicalChannelConfig,
    SchedConfigInd, SinrReport, UeConfigRequest, UeObservation, WeightUpdate,
};
use std::collections::BTreeMap;
use tracing::{debug, info, trace};

/// Minimum buffer requirement the fairness guard accounts per candidate,
/// covering MAC+RLC header overhead
pub(crate) const MIN_BUFFER_REQ_BYTES: u32 = 10;

/// Resource allocator selector, composed orthogonally with the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorKind {
    /// Whole-bandwidth symbol slices, one UE per symbol
    Tdma,
    /// Symbols partitioned per beam, frequency RBGs subdivided per UE
    Ofdma,
}

/// Static configuration of one bandwidth part
#[derive(Debug, Clone)]
pub struct BwpConfig {
    /// Bandwidth part index
    pub bwp_id: BwpId,
    /// Subcarrier spacing of the bandwidth part
    pub scs: SubcarrierSpacing,
    /// Total RBGs across the bandwidth part's frequency range
    pub bandwidth_rbg: u32,
    /// Resource blocks per RBG
    pub num_rb_per_rbg: u32,
    /// Mask of notched/reserved RBGs excluded from assignment
    pub notched_rbg: Vec<bool>,
    /// Leading symbols reserved for DL control
    pub dl_ctrl_symbols: u8,
    /// Trailing symbols reserved for UL control
    pub ul_ctrl_symbols: u8,
    /// Symbol budget per slot for DL data
    pub dl_data_symbols: u8,
    /// Symbol budget per slot for UL data
    pub ul_data_symbols: u8,
}

impl BwpConfig {
    /// Validate the configuration; symbol budgets must fit one slot
    pub fn validate(&self) -> Result<(), SchedError> {
        let total = self.dl_ctrl_symbols + self.ul_ctrl_symbols + self.dl_data_symbols
            + self.ul_data_symbols;
        if total > SYMBOLS_PER_SLOT {
            return Err(SchedError::InvalidConfiguration(format!(
                "symbol budget {} exceeds slot length {}",
                total, SYMBOLS_PER_SLOT
            )));
        }
        if self.notched_rbg.len() != self.bandwidth_rbg as usize {
            return Err(SchedError::InvalidConfiguration(format!(
                "notch mask length {} does not match bandwidth of {} RBG",
                self.notched_rbg.len(),
                self.bandwidth_rbg
            )));
        }
        if self.assignable_rbg() == 0 {
            return Err(SchedError::InvalidConfiguration(
                "no assignable RBG left after notching".into(),
            ));
        }
        Ok(())
    }

    /// RBGs per symbol available to the allocator (bandwidth minus notches)
    pub fn assignable_rbg(&self) -> u32 {
        self.bandwidth_rbg - self.notched_rbg.iter().filter(|&&n| n).count() as u32
    }

    /// Bitmask over the full bandwidth with every assignable RBG set
    pub fn assignable_mask(&self) -> Vec<bool> {
        self.notched_rbg.iter().map(|&n| !n).collect()
    }

    /// Slot duration in seconds
    pub fn slot_seconds(&self) -> f64 {
        time::slot_duration_us(self.scs.as_khz()) as f64 / 1e6
    }
}

/// Result of one allocator pass in one direction
#[derive(Debug, Clone, Default)]
pub struct SlotAllocation {
    /// One DCI per UE that ended the pass with a usable transport block
    pub dci: Vec<DciInfoElement>,
    /// Symbols consumed per beam
    pub beam_sym: BeamSymbolMap,
}

/// Throughput the UE would reach with one symbol of the whole assignable
/// bandwidth, used as the PF achievable-rate estimate
pub(crate) fn potential_tput_bps(
    amc: &Amc,
    cfg: &BwpConfig,
    ue: &UeSchedulingInfo,
    direction: Direction,
) -> f64 {
    let tbs = amc.calculate_tb_size(
        ue.mcs(direction),
        ue.rank(direction),
        cfg.assignable_rbg() * cfg.num_rb_per_rbg,
    );
    tbs as f64 * 8.0 / cfg.slot_seconds()
}

/// Transport block size reachable with the UE's current allocation
pub(crate) fn achievable_tbs(
    amc: &Amc,
    cfg: &BwpConfig,
    ue: &UeSchedulingInfo,
    direction: Direction,
) -> u32 {
    let rbg = ue.rbg(direction);
    if rbg == 0 {
        return 0;
    }
    amc.calculate_tb_size(ue.mcs(direction), ue.rank(direction), rbg * cfg.num_rb_per_rbg)
}

/// MAC scheduler instance for one bandwidth part
///
/// Owns its UE records exclusively; all entry points run to completion on
/// the caller's thread, so no locking is involved.
pub struct MacScheduler {
    cfg: BwpConfig,
    allocator: AllocatorKind,
    policy: SchedPolicy,
    dl_amc: Amc,
    ul_amc: Amc,
    ues: UeArena,
    /// Last emitted DCI per (RNTI, HARQ process), kept as retransmission
    /// context
    dl_harq_ctx: BTreeMap<(Rnti, u8), DciInfoElement>,
    ul_harq_ctx: BTreeMap<(Rnti, u8), DciInfoElement>,
    /// Observation batch of the most recent pass, drained by the AI hook
    observations: Vec<UeObservation>,
}

impl MacScheduler {
    /// Create a scheduler instance for one bandwidth part
    pub fn new(
        cfg: BwpConfig,
        allocator: AllocatorKind,
        policy_kind: SchedPolicyKind,
        table: McsTable,
        amc_model: AmcModel,
    ) -> Result<Self, SchedError> {
        cfg.validate()?;
        info!(
            "MAC scheduler for BWP {}: {:?}/{:?}, {} RBG ({} assignable)",
            cfg.bwp_id.0,
            allocator,
            policy_kind,
            cfg.bandwidth_rbg,
            cfg.assignable_rbg()
        );
        Ok(Self {
            dl_amc: Amc::new(table, amc_model),
            ul_amc: Amc::new(table, amc_model),
            cfg,
            allocator,
            policy: SchedPolicy::new(policy_kind),
            ues: UeArena::new(),
            dl_harq_ctx: BTreeMap::new(),
            ul_harq_ctx: BTreeMap::new(),
            observations: Vec::new(),
        })
    }

    /// The bandwidth part configuration
    pub fn config(&self) -> &BwpConfig {
        &self.cfg
    }

    /// Number of attached UEs
    pub fn num_ues(&self) -> usize {
        self.ues.len()
    }

    /// Attach or re-configure a UE (CSCHED_UE_CONFIG_REQ)
    pub fn csched_ue_config_req(&mut self, req: UeConfigRequest) -> Result<(), SchedError> {
        match self.ues.get_mut(&req.rnti) {
            Some(ue) => {
                debug!("RNTI {}: beam update {:?}", req.rnti.0, req.beam_id);
                ue.beam_id = req.beam_id;
            }
            None => {
                debug!("RNTI {}: attached on beam {:?}", req.rnti.0, req.beam_id);
                self.ues
                    .insert(req.rnti, UeSchedulingInfo::new(req.rnti, req.beam_id));
            }
        }
        Ok(())
    }

    /// Release a UE (CSCHED_UE_RELEASE_REQ)
    pub fn csched_ue_release_req(&mut self, rnti: Rnti) -> Result<(), SchedError> {
        self.ues
            .remove(&rnti)
            .ok_or(SchedError::UnknownRnti(rnti.0))?;
        self.dl_harq_ctx.retain(|(r, _), _| *r != rnti);
        self.ul_harq_ctx.retain(|(r, _), _| *r != rnti);
        self.policy.remove_weights(rnti);
        debug!("RNTI {}: released", rnti.0);
        Ok(())
    }

    /// Configure logical channels for a UE (CSCHED_LC_CONFIG_REQ)
    pub fn csched_lc_config_req(
        &mut self,
        rnti: Rnti,
        channels: Vec<LogicalChannelConfig>,
    ) -> Result<(), SchedError> {
        let ue = self
            .ues
            .get_mut(&rnti)
            .ok_or(SchedError::UnknownRnti(rnti.0))?;
        for lc in channels {
            ue.lc_configs.insert(lc.lcid, lc);
        }
        Ok(())
    }

    /// Apply a downlink buffer status report from RLC
    ///
    /// A report for an unregistered RNTI is a configuration bug and aborts.
    pub fn report_buffer_status(&mut self, report: &BufferStatusReport) {
        let ue = self
            .ues
            .get_mut(&report.rnti)
            .unwrap_or_else(|| panic!("Buffer status for unregistered RNTI {}", report.rnti.0));
        assert!(
            ue.lc_configs.contains_key(&report.lcid),
            "Buffer status for unconfigured LCID {} on RNTI {}",
            report.lcid,
            report.rnti.0
        );
        ue.update_dl_buffer(report);
    }

    /// Apply an uplink BSR
    pub fn report_bsr(&mut self, bsr: &BsrReport) {
        let ue = self
            .ues
            .get_mut(&bsr.rnti)
            .unwrap_or_else(|| panic!("BSR for unregistered RNTI {}", bsr.rnti.0));
        ue.update_ul_buffer(bsr);
    }

    /// Apply a per-subband SINR report and adapt the link's MCS
    pub fn report_sinr(&mut self, report: &SinrReport, bler_model: &dyn BlerModel) {
        let amc = match report.direction {
            Direction::Dl => &self.dl_amc,
            Direction::Ul => &self.ul_amc,
        };
        let num_sym = match report.direction {
            Direction::Dl => self.cfg.dl_data_symbols,
            Direction::Ul => self.cfg.ul_data_symbols,
        };
        let feedback = amc.create_cqi_feedback(
            &report.sinr_per_subband,
            num_sym as u32,
            self.cfg.assignable_rbg() * self.cfg.num_rb_per_rbg,
            bler_model,
        );
        let ue = self
            .ues
            .get_mut(&report.rnti)
            .unwrap_or_else(|| panic!("SINR report for unregistered RNTI {}", report.rnti.0));
        match report.direction {
            Direction::Dl => ue.dl_mcs = feedback.mcs,
            Direction::Ul => ue.ul_mcs = feedback.mcs,
        }
        trace!(
            "RNTI {}: {:?} MCS adapted to {} (wb CQI {})",
            report.rnti.0,
            report.direction,
            feedback.mcs,
            feedback.wb_cqi
        );
    }

    /// Apply a reported wideband CQI and adapt the link's MCS
    pub fn report_cqi(&mut self, rnti: Rnti, direction: Direction, cqi: u8) {
        let mcs = match direction {
            Direction::Dl => self.dl_amc.get_mcs_from_cqi(cqi),
            Direction::Ul => self.ul_amc.get_mcs_from_cqi(cqi),
        };
        let ue = self
            .ues
            .get_mut(&rnti)
            .unwrap_or_else(|| panic!("CQI report for unregistered RNTI {}", rnti.0));
        match direction {
            Direction::Dl => ue.dl_mcs = mcs,
            Direction::Ul => ue.ul_mcs = mcs,
        }
    }

    /// Accept a weight update from an external learning agent
    pub fn apply_weight_update(&mut self, update: &WeightUpdate) {
        self.policy.apply_weight_update(update);
    }

    /// Drain the observation batch of the most recent scheduling pass
    pub fn take_observations(&mut self) -> Vec<UeObservation> {
        std::mem::take(&mut self.observations)
    }

    /// The logical channel a DL grant for this UE is credited to: the
    /// highest-priority configured DL channel
    pub fn lc_for_grant(&self, rnti: Rnti) -> Option<u8> {
        self.ues.get(&rnti).and_then(|ue| {
            ue.lc_configs
                .values()
                .filter(|lc| lc.direction == Direction::Dl)
                .min_by_key(|lc| (lc.qci.priority(), lc.lcid))
                .map(|lc| lc.lcid)
        })
    }

    /// Retransmission context retained for a HARQ process, if any
    pub fn harq_context(&self, rnti: Rnti, direction: Direction, harq_id: u8) -> Option<&DciInfoElement> {
        match direction {
            Direction::Dl => self.dl_harq_ctx.get(&(rnti, harq_id)),
            Direction::Ul => self.ul_harq_ctx.get(&(rnti, harq_id)),
        }
    }

    /// Group UEs with outstanding buffer by beam, with buffer estimates
    fn build_active_map(&self, direction: Direction) -> ActiveUeMap {
        let mut active = ActiveUeMap::new();
        for ue in self.ues.values() {
            let buffer = ue.buffer_total(direction);
            if buffer > 0 {
                active
                    .entry(ue.beam_id)
                    .or_default()
                    .push((ue.rnti, buffer));
            }
        }
        active
    }

    /// Run one TTI's scheduling pass and return the aggregate result
    ///
    /// The per-TTI entry point: resets allocation state, runs the configured
    /// allocator for DL then UL, retains HARQ context for every emitted DCI
    /// and replaces the AI-hook observation batch.
    pub fn schedule_slot(&mut self) -> SchedConfigInd {
        let dl_active = self.build_active_map(Direction::Dl);
        let ul_active = self.build_active_map(Direction::Ul);

        let dl = self.run_allocator(&dl_active, Direction::Dl, self.cfg.dl_data_symbols as u32);
        let ul = self.run_allocator(&ul_active, Direction::Ul, self.cfg.ul_data_symbols as u32);

        for dci in &dl.dci {
            self.dl_harq_ctx.insert((dci.rnti, dci.harq_id), dci.clone());
        }
        for dci in &ul.dci {
            self.ul_harq_ctx.insert((dci.rnti, dci.harq_id), dci.clone());
        }

        self.observations = self.build_observations(&dl_active, &dl.dci);

        debug!(
            "BWP {}: TTI scheduled, {} DL DCI / {} UL DCI",
            self.cfg.bwp_id.0,
            dl.dci.len(),
            ul.dci.len()
        );

        SchedConfigInd {
            dl_dci: dl.dci,
            ul_dci: ul.dci,
        }
    }

    fn run_allocator(
        &mut self,
        active: &ActiveUeMap,
        direction: Direction,
        symbols: u32,
    ) -> SlotAllocation {
        let amc = match direction {
            Direction::Dl => &self.dl_amc,
            Direction::Ul => &self.ul_amc,
        };
        match self.allocator {
            AllocatorKind::Tdma => TdmaAllocator::allocate(
                &self.cfg,
                &mut self.ues,
                active,
                &self.policy,
                amc,
                direction,
                symbols,
            ),
            AllocatorKind::Ofdma => OfdmaAllocator::allocate(
                &self.cfg,
                &mut self.ues,
                active,
                &self.policy,
                amc,
                direction,
                symbols,
            ),
        }
    }

    fn build_observations(
        &self,
        active: &ActiveUeMap,
        dl_dci: &[DciInfoElement],
    ) -> Vec<UeObservation> {
        let mut obs = Vec::new();
        for candidates in active.values() {
            for (rnti, buffer) in candidates {
                let ue = &self.ues[rnti];
                let tbs = dl_dci
                    .iter()
                    .find(|d| d.rnti == *rnti)
                    .map(|d| d.tbs_bytes)
                    .unwrap_or(0);
                obs.push(UeObservation {
                    rnti: *rnti,
                    beam_id: ue.beam_id,
                    buffer_bytes: *buffer,
                    assigned_rbg: ue.dl_rbg,
                    tbs_bytes: tbs,
                    mcs: ue.dl_mcs,
                    avg_tput_bps: ue.dl_avg_tput_bps,
                    reward: (tbs as f64 / (*buffer).max(1) as f64).min(1.0),
                });
            }
        }
        obs
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use common::types::BeamId;
    use interfaces::LogicalChannelConfig;

    /// A 20-RBG bandwidth part with no notching and a 14-symbol DL budget
    pub fn test_cfg(bandwidth_rbg: u32, dl_data_symbols: u8) -> BwpConfig {
        BwpConfig {
            bwp_id: BwpId(0),
            scs: SubcarrierSpacing::Scs30,
            bandwidth_rbg,
            num_rb_per_rbg: 1,
            notched_rbg: vec![false; bandwidth_rbg as usize],
            dl_ctrl_symbols: 0,
            ul_ctrl_symbols: 0,
            dl_data_symbols,
            ul_data_symbols: 0,
        }
    }

    /// Populate an arena with one UE holding DL buffer on one beam
    pub fn add_ue(
        arena: &mut UeArena,
        rnti: u16,
        beam: u16,
        mcs: u8,
        dl_buffer: u32,
    ) -> Rnti {
        let rnti = Rnti::new(rnti);
        let mut ue = UeSchedulingInfo::new(rnti, BeamId::new(beam));
        ue.dl_mcs = mcs;
        ue.ul_mcs = mcs;
        if dl_buffer > 0 {
            ue.dl_buffers.insert(
                4,
                super::ue_info::LcBufferStatus {
                    tx_queue_bytes: dl_buffer,
                    ..Default::default()
                },
            );
        }
        arena.insert(rnti, ue);
        rnti
    }

    pub fn default_lc(lcid: u8) -> LogicalChannelConfig {
        LogicalChannelConfig {
            lcid,
            lcg: common::types::LcgId(0),
            qci: common::types::Qci::DEFAULT,
            direction: Direction::Dl,
            gbr_bps: None,
            mbr_bps: None,
        }
    }
}
