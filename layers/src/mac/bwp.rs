//! Bandwidth-Part / Bearer Routing Layer
//!
//! Multiplexes multiple independent scheduler instances, one per bandwidth
//! part, and routes buffer-status reports to the right instance via the
//! QCI-to-BWP map configured at setup time. Transmission opportunities
//! bypass the QoS lookup since a grant already carries the bandwidth part
//! it originated from.
//!
//! A buffer report for an unregistered channel or a QCI mapped to a
//! missing bandwidth part is a configuration bug and aborts.

use crate::mac::MacScheduler;
use crate::SchedError;
use common::types::{BwpId, LcgId, Qci, Rnti};
use interfaces::{
    BsrReport, BufferStatusReport, LogicalChannelConfig, SchedConfigInd, TxOpportunity,
    TxOpportunityHandler, UeConfigRequest,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Routing layer over per-BWP scheduler instances
///
/// Instances share no mutable state; they run sequentially, in BWP-id
/// order, within the same event-loop tick for determinism.
pub struct BwpManager {
    schedulers: BTreeMap<BwpId, MacScheduler>,
    /// Bearer class to bandwidth part, configured at setup time
    qci_to_bwp: BTreeMap<Qci, BwpId>,
    /// QoS class registered per DL logical channel
    lc_qci: BTreeMap<(Rnti, u8), Qci>,
    /// QoS class registered per UL logical channel group
    lcg_qci: BTreeMap<(Rnti, LcgId), Qci>,
}

impl BwpManager {
    /// Create an empty routing layer
    pub fn new() -> Self {
        Self {
            schedulers: BTreeMap::new(),
            qci_to_bwp: BTreeMap::new(),
            lc_qci: BTreeMap::new(),
            lcg_qci: BTreeMap::new(),
        }
    }

    /// Register a scheduler instance under its bandwidth part index
    pub fn add_bwp(&mut self, scheduler: MacScheduler) {
        let bwp_id = scheduler.config().bwp_id;
        info!("Registered scheduler for BWP {}", bwp_id.0);
        self.schedulers.insert(bwp_id, scheduler);
    }

    /// Map a bearer class to a bandwidth part; unmapped classes default to
    /// BWP 0
    pub fn set_qci_mapping(&mut self, qci: Qci, bwp: BwpId) {
        self.qci_to_bwp.insert(qci, bwp);
    }

    /// Number of registered bandwidth parts
    pub fn num_bwps(&self) -> usize {
        self.schedulers.len()
    }

    /// Access one scheduler instance
    pub fn scheduler(&self, bwp: BwpId) -> Option<&MacScheduler> {
        self.schedulers.get(&bwp)
    }

    /// Mutable access to one scheduler instance
    pub fn scheduler_mut(&mut self, bwp: BwpId) -> Option<&mut MacScheduler> {
        self.schedulers.get_mut(&bwp)
    }

    /// Attach a UE on every bandwidth part
    pub fn csched_ue_config_req(&mut self, req: UeConfigRequest) -> Result<(), SchedError> {
        for scheduler in self.schedulers.values_mut() {
            scheduler.csched_ue_config_req(req)?;
        }
        Ok(())
    }

    /// Release a UE from every bandwidth part
    pub fn csched_ue_release_req(&mut self, rnti: Rnti) -> Result<(), SchedError> {
        for scheduler in self.schedulers.values_mut() {
            scheduler.csched_ue_release_req(rnti)?;
        }
        self.lc_qci.retain(|(r, _), _| *r != rnti);
        self.lcg_qci.retain(|(r, _), _| *r != rnti);
        Ok(())
    }

    /// Configure logical channels, registering their QoS routing keys
    pub fn csched_lc_config_req(
        &mut self,
        rnti: Rnti,
        channels: Vec<LogicalChannelConfig>,
    ) -> Result<(), SchedError> {
        for lc in &channels {
            match lc.direction {
                common::types::Direction::Dl => {
                    self.lc_qci.insert((rnti, lc.lcid), lc.qci);
                }
                common::types::Direction::Ul => {
                    self.lcg_qci.insert((rnti, lc.lcg), lc.qci);
                }
            }
        }
        for scheduler in self.schedulers.values_mut() {
            scheduler.csched_lc_config_req(rnti, channels.clone())?;
        }
        Ok(())
    }

    /// Bandwidth part serving a bearer class
    fn resolve_bwp(&self, qci: Qci) -> BwpId {
        self.qci_to_bwp.get(&qci).copied().unwrap_or(BwpId(0))
    }

    /// Route a downlink buffer status report to its bandwidth part
    pub fn report_buffer_status(&mut self, report: &BufferStatusReport) {
        let qci = *self
            .lc_qci
            .get(&(report.rnti, report.lcid))
            .unwrap_or_else(|| {
                panic!(
                    "Buffer status for unregistered channel: RNTI {} LCID {}",
                    report.rnti.0, report.lcid
                )
            });
        let bwp = self.resolve_bwp(qci);
        debug!(
            "RNTI {} LCID {} (QCI {}) routed to BWP {}",
            report.rnti.0, report.lcid, qci.0, bwp.0
        );
        self.schedulers
            .get_mut(&bwp)
            .unwrap_or_else(|| panic!("Bwp index {} not valid", bwp.0))
            .report_buffer_status(report);
    }

    /// Route an uplink BSR to its bandwidth part
    pub fn report_bsr(&mut self, bsr: &BsrReport) {
        let qci = *self.lcg_qci.get(&(bsr.rnti, bsr.lcg)).unwrap_or_else(|| {
            panic!(
                "BSR for unregistered channel group: RNTI {} LCG {}",
                bsr.rnti.0, bsr.lcg.0
            )
        });
        let bwp = self.resolve_bwp(qci);
        self.schedulers
            .get_mut(&bwp)
            .unwrap_or_else(|| panic!("Bwp index {} not valid", bwp.0))
            .report_bsr(bsr);
    }

    /// Run one TTI on every bandwidth part, in BWP-id order
    pub fn schedule_slot(&mut self) -> Vec<(BwpId, SchedConfigInd)> {
        self.schedulers
            .iter_mut()
            .map(|(bwp, scheduler)| (*bwp, scheduler.schedule_slot()))
            .collect()
    }

    /// Forward the transmission opportunities of a TTI's DL grants to the
    /// logical channel owners, bypassing the QoS lookup
    pub fn notify_tx_opportunities(
        &self,
        bwp: BwpId,
        ind: &SchedConfigInd,
        handler: &mut dyn TxOpportunityHandler,
    ) {
        let scheduler = match self.schedulers.get(&bwp) {
            Some(s) => s,
            None => panic!("Bwp index {} not valid", bwp.0),
        };
        for dci in &ind.dl_dci {
            if let Some(lcid) = scheduler.lc_for_grant(dci.rnti) {
                handler.notify_tx_opportunity(TxOpportunity {
                    rnti: dci.rnti,
                    lcid,
                    bwp_id: bwp,
                    bytes: dci.tbs_bytes,
                });
            }
        }
    }
}

impl Default for BwpManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::test_support::test_cfg;
    use crate::mac::{AllocatorKind, AmcModel, MacScheduler, McsTable, SchedPolicyKind};
    use common::types::{BeamId, Direction};

    fn manager_with_two_bwps() -> BwpManager {
        let mut manager = BwpManager::new();
        for bwp in 0..2u8 {
            let mut cfg = test_cfg(20, 14);
            cfg.bwp_id = BwpId(bwp);
            manager.add_bwp(
                MacScheduler::new(
                    cfg,
                    AllocatorKind::Tdma,
                    SchedPolicyKind::RoundRobin,
                    McsTable::Qam64,
                    AmcModel::Shannon,
                )
                .unwrap(),
            );
        }
        manager.set_qci_mapping(Qci::VOICE, BwpId(1));
        manager
    }

    fn lc(lcid: u8, qci: Qci) -> LogicalChannelConfig {
        LogicalChannelConfig {
            lcid,
            lcg: LcgId(0),
            qci,
            direction: Direction::Dl,
            gbr_bps: None,
            mbr_bps: None,
        }
    }

    fn attach(manager: &mut BwpManager, rnti: u16) {
        manager
            .csched_ue_config_req(UeConfigRequest {
                rnti: Rnti::new(rnti),
                beam_id: BeamId::new(0),
            })
            .unwrap();
        manager
            .csched_lc_config_req(
                Rnti::new(rnti),
                vec![lc(1, Qci::VOICE), lc(4, Qci::DEFAULT)],
            )
            .unwrap();
    }

    fn report(manager: &mut BwpManager, rnti: u16, lcid: u8, bytes: u32) {
        manager.report_buffer_status(&BufferStatusReport {
            rnti: Rnti::new(rnti),
            lcid,
            tx_queue_bytes: bytes,
            retx_queue_bytes: 0,
            status_pdu_bytes: 0,
            hol_delay_ms: 0,
        });
    }

    #[test]
    fn test_reports_route_by_qci() {
        let mut manager = manager_with_two_bwps();
        attach(&mut manager, 1);
        manager
            .scheduler_mut(BwpId(0))
            .unwrap()
            .report_cqi(Rnti::new(1), Direction::Dl, 15);
        manager
            .scheduler_mut(BwpId(1))
            .unwrap()
            .report_cqi(Rnti::new(1), Direction::Dl, 15);

        // Voice bearer routes to BWP 1, default bearer to BWP 0
        report(&mut manager, 1, 1, 500);
        report(&mut manager, 1, 4, 2_000);

        let results = manager.schedule_slot();
        assert_eq!(results.len(), 2);
        let (bwp0, ind0) = &results[0];
        let (bwp1, ind1) = &results[1];
        assert_eq!(*bwp0, BwpId(0));
        assert_eq!(*bwp1, BwpId(1));
        assert_eq!(ind0.dl_dci.len(), 1);
        assert_eq!(ind1.dl_dci.len(), 1);
        // The default bearer's demand is larger, the voice grant smaller
        assert!(ind0.dl_dci[0].tbs_bytes >= 2_000 || ind0.dl_dci[0].tbs_bytes > ind1.dl_dci[0].tbs_bytes);
    }

    #[test]
    #[should_panic(expected = "unregistered channel")]
    fn test_unregistered_channel_aborts() {
        let mut manager = manager_with_two_bwps();
        attach(&mut manager, 1);
        report(&mut manager, 1, 7, 100);
    }

    #[test]
    #[should_panic(expected = "Bwp index 3 not valid")]
    fn test_missing_bwp_aborts() {
        let mut manager = manager_with_two_bwps();
        manager.set_qci_mapping(Qci::DEFAULT, BwpId(3));
        attach(&mut manager, 1);
        report(&mut manager, 1, 4, 100);
    }

    struct CollectingHandler {
        opportunities: Vec<TxOpportunity>,
    }

    impl TxOpportunityHandler for CollectingHandler {
        fn notify_tx_opportunity(&mut self, opportunity: TxOpportunity) {
            self.opportunities.push(opportunity);
        }
    }

    #[test]
    fn test_tx_opportunity_forwarding() {
        let mut manager = manager_with_two_bwps();
        attach(&mut manager, 1);
        manager
            .scheduler_mut(BwpId(0))
            .unwrap()
            .report_cqi(Rnti::new(1), Direction::Dl, 15);
        report(&mut manager, 1, 4, 2_000);

        let results = manager.schedule_slot();
        let mut handler = CollectingHandler {
            opportunities: Vec::new(),
        };
        for (bwp, ind) in &results {
            manager.notify_tx_opportunities(*bwp, ind, &mut handler);
        }

        assert_eq!(handler.opportunities.len(), 1);
        let opp = &handler.opportunities[0];
        assert_eq!(opp.rnti, Rnti::new(1));
        assert_eq!(opp.bwp_id, BwpId(0));
        // Credited to the highest-priority DL channel of the UE
        assert_eq!(opp.lcid, 1);
        assert!(opp.bytes > 0);
    }

    #[test]
    fn test_release_cleans_routing_state() {
        let mut manager = manager_with_two_bwps();
        attach(&mut manager, 1);
        manager.csched_ue_release_req(Rnti::new(1)).unwrap();
        assert!(manager.lc_qci.is_empty());
        assert_eq!(manager.scheduler(BwpId(0)).unwrap().num_ues(), 0);
    }
}
