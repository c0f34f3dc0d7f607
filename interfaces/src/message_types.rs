//! Message Types for the Scheduler SAP
//!
//! Defines the message formats exchanged between the scheduler core and its
//! external collaborators (RLC buffer reports in, DCI grants out).

use common::types::{BeamId, BwpId, Direction, LcgId, Qci, Rnti};
use serde::{Deserialize, Serialize};

/// Per-logical-channel buffer status report from RLC
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BufferStatusReport {
    /// UE identifier
    pub rnti: Rnti,
    /// Logical channel ID
    pub lcid: u8,
    /// Bytes queued for first transmission
    pub tx_queue_bytes: u32,
    /// Bytes queued for retransmission
    pub retx_queue_bytes: u32,
    /// Pending RLC status PDU bytes
    pub status_pdu_bytes: u32,
    /// Head-of-line delay of the transmission queue in milliseconds
    pub hol_delay_ms: u16,
}

impl BufferStatusReport {
    /// Total bytes awaiting transmission on this channel
    pub fn total_bytes(&self) -> u32 {
        self.tx_queue_bytes + self.retx_queue_bytes + self.status_pdu_bytes
    }
}

/// Uplink buffer status report (BSR) for one logical channel group
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BsrReport {
    /// UE identifier
    pub rnti: Rnti,
    /// Logical channel group
    pub lcg: LcgId,
    /// Reported UL buffer occupancy in bytes
    pub buffer_bytes: u32,
}

/// Logical channel configuration, carried by CSCHED_LC_CONFIG_REQ
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LogicalChannelConfig {
    /// Logical channel ID
    pub lcid: u8,
    /// Logical channel group the channel reports buffer status under
    pub lcg: LcgId,
    /// QoS class of the bearer mapped onto this channel
    pub qci: Qci,
    /// Transmission direction
    pub direction: Direction,
    /// Guaranteed bit rate in bit/s, for GBR bearers
    pub gbr_bps: Option<u64>,
    /// Maximum bit rate in bit/s
    pub mbr_bps: Option<u64>,
}

/// UE attach/configuration request (CSCHED_UE_CONFIG_REQ)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UeConfigRequest {
    /// UE identifier
    pub rnti: Rnti,
    /// Beam the UE is served on
    pub beam_id: BeamId,
}

/// Per-subband SINR report from the PHY, input to CQI/MCS selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinrReport {
    /// UE identifier
    pub rnti: Rnti,
    /// Transmission direction the measurement applies to
    pub direction: Direction,
    /// Linear (not dB) SINR per subband; 0.0 means no usable signal
    pub sinr_per_subband: Vec<f64>,
}

/// Downlink/Uplink Control Information element
///
/// The immutable allocation result for one UE for one TTI. Consumed by the
/// MAC/PHY layer to build the actual transmission and retained as HARQ
/// retransmission context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DciInfoElement {
    /// UE identifier
    pub rnti: Rnti,
    /// Transmission direction
    pub direction: Direction,
    /// First OFDM symbol of the allocation
    pub start_symbol: u8,
    /// Number of OFDM symbols
    pub num_symbols: u8,
    /// Modulation and coding scheme index
    pub mcs: u8,
    /// Number of MIMO layers
    pub rank: u8,
    /// Precoding matrix reference
    pub precoding: u8,
    /// Transport block size in bytes
    pub tbs_bytes: u32,
    /// HARQ process the transmission belongs to
    pub harq_id: u8,
    /// New data indicator (false for retransmissions)
    pub ndi: bool,
    /// Redundancy version
    pub rv: u8,
    /// Which frequency RBGs the allocation occupies
    pub rbg_bitmask: Vec<bool>,
}

/// Aggregate per-TTI scheduling result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedConfigInd {
    /// Downlink grants for this TTI
    pub dl_dci: Vec<DciInfoElement>,
    /// Uplink grants for this TTI
    pub ul_dci: Vec<DciInfoElement>,
}

/// Transmission opportunity forwarded to a logical channel owner
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TxOpportunity {
    /// UE identifier
    pub rnti: Rnti,
    /// Logical channel ID
    pub lcid: u8,
    /// Bandwidth part the grant originated from
    pub bwp_id: BwpId,
    /// Grant size in bytes
    pub bytes: u32,
}

/// Per-UE feature/reward record emitted after each scheduling pass
///
/// One observation batch per TTI forms the scheduler side of the AI-hook
/// message contract; an external learning agent answers with a
/// [`WeightUpdate`] before a later pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UeObservation {
    /// UE identifier
    pub rnti: Rnti,
    /// Beam the UE is served on
    pub beam_id: BeamId,
    /// Buffer occupancy at the start of the pass in bytes
    pub buffer_bytes: u32,
    /// RBG-symbols assigned during the pass
    pub assigned_rbg: u32,
    /// Transport block size achieved, 0 if no grant was emitted
    pub tbs_bytes: u32,
    /// MCS used for the grant
    pub mcs: u8,
    /// Smoothed historical throughput estimate in bit/s
    pub avg_tput_bps: f64,
    /// Scalar reward (served fraction of demand)
    pub reward: f64,
}

/// Weight update from an external learning agent
///
/// Applied before the next scheduling pass; UEs absent from the list keep
/// their previous weight.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeightUpdate {
    /// (UE, weight) pairs; higher weight schedules earlier
    pub weights: Vec<(Rnti, f64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_report_total() {
        let report = BufferStatusReport {
            rnti: Rnti::new(1),
            lcid: 4,
            tx_queue_bytes: 100,
            retx_queue_bytes: 20,
            status_pdu_bytes: 4,
            hol_delay_ms: 3,
        };
        assert_eq!(report.total_bytes(), 124);
    }

    #[test]
    fn test_dci_serialization_roundtrip() {
        let dci = DciInfoElement {
            rnti: Rnti::new(70),
            direction: Direction::Dl,
            start_symbol: 1,
            num_symbols: 7,
            mcs: 28,
            rank: 1,
            precoding: 0,
            tbs_bytes: 1166,
            harq_id: 3,
            ndi: true,
            rv: 0,
            rbg_bitmask: vec![true; 20],
        };
        let json = serde_json::to_string(&dci).unwrap();
        let back: DciInfoElement = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rnti, dci.rnti);
        assert_eq!(back.tbs_bytes, dci.tbs_bytes);
        assert_eq!(back.rbg_bitmask.len(), 20);
    }
}
