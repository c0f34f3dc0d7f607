//! Adaptive Modulation and Coding (AMC) Engine
//!
//! Translates channel quality (per-subband SINR or CQI) into a transmission
//! configuration: best usable MCS and transport block size. Channel quality
//! arrives from the PHY; block-error-rate estimation is delegated to an
//! external error model behind the [`BlerModel`] trait.

use crate::mac::mcs_tables::{McsTable, MAX_CQI};
use common::utils::SUBCARRIERS_PER_RB;
use interfaces::BlerModel;
use tracing::trace;

/// Transport block CRC length in bits
const TB_CRC_BITS: i64 = 24;

/// Per-code-block CRC length in bits
const CB_CRC_BITS: i64 = 24;

/// Maximum LDPC code block size in bits (base graph 1)
const MAX_CODE_BLOCK_BITS: i64 = 8448;

/// Highest tolerated block error rate when probing MCS candidates
const MAX_BLER: f64 = 0.1;

/// CQI estimation model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmcModel {
    /// Analytic spectral-efficiency estimate from the Shannon bound with a
    /// target-BER backoff
    Shannon,
    /// Iterative probing of the external error model, keeping the highest
    /// MCS whose estimated BLER stays below 10%
    ErrorModel,
}

/// CQI feedback produced from one SINR report
#[derive(Debug, Clone)]
pub struct CqiFeedback {
    /// Wideband CQI over the usable subbands, 0 when none are usable
    pub wb_cqi: u8,
    /// MCS matching the wideband estimate
    pub mcs: u8,
    /// Per-subband CQI; -1 flags a subband with no usable signal
    pub sb_cqi: Vec<i8>,
}

/// AMC engine for one link direction of one bandwidth part
#[derive(Debug, Clone)]
pub struct Amc {
    table: McsTable,
    model: AmcModel,
    /// Target bit error rate for the Shannon backoff factor
    ber: f64,
}

impl Amc {
    /// Create a new AMC engine
    pub fn new(table: McsTable, model: AmcModel) -> Self {
        Self {
            table,
            model,
            ber: 0.00005,
        }
    }

    /// The MCS table variant in use
    pub fn table(&self) -> McsTable {
        self.table
    }

    /// Largest CQI whose table spectral efficiency does not exceed `se`
    pub fn get_cqi_from_spectral_efficiency(&self, se: f64) -> u8 {
        let mut cqi = 0;
        while cqi < MAX_CQI && self.table.spectral_efficiency_for_cqi(cqi + 1) <= se {
            cqi += 1;
        }
        cqi
    }

    /// Largest MCS whose table spectral efficiency does not exceed `se`
    pub fn get_mcs_from_spectral_efficiency(&self, se: f64) -> u8 {
        let mut mcs = 0;
        while mcs < self.table.max_mcs() && self.table.spectral_efficiency_for_mcs(mcs + 1) <= se {
            mcs += 1;
        }
        mcs
    }

    /// MCS matching a reported CQI
    pub fn get_mcs_from_cqi(&self, cqi: u8) -> u8 {
        self.get_mcs_from_spectral_efficiency(self.table.spectral_efficiency_for_cqi(cqi))
    }

    /// Shannon-bound spectral efficiency with target-BER backoff
    ///
    /// `sinr` is linear, not dB.
    fn spectral_efficiency_from_sinr(&self, sinr: f64) -> f64 {
        let gamma = -(5.0 * self.ber).ln() / 1.5;
        (1.0 + sinr / gamma).log2()
    }

    /// Build CQI feedback from a per-subband SINR vector
    ///
    /// `num_sym` and `num_prb` size the hypothetical transport block used
    /// when probing the external error model. A subband with zero SINR is
    /// flagged with the sentinel value -1, never mapped to a zero spectral
    /// efficiency.
    pub fn create_cqi_feedback(
        &self,
        sinr_per_subband: &[f64],
        num_sym: u32,
        num_prb: u32,
        bler_model: &dyn BlerModel,
    ) -> CqiFeedback {
        let usable: Vec<f64> = sinr_per_subband
            .iter()
            .copied()
            .filter(|&s| s > 0.0)
            .collect();

        if usable.is_empty() {
            return CqiFeedback {
                wb_cqi: 0,
                mcs: 0,
                sb_cqi: vec![-1; sinr_per_subband.len()],
            };
        }

        let (wb_cqi, mcs, sb_cqi) = match self.model {
            AmcModel::Shannon => {
                let sb_cqi: Vec<i8> = sinr_per_subband
                    .iter()
                    .map(|&s| {
                        if s > 0.0 {
                            let se = self.spectral_efficiency_from_sinr(s);
                            self.get_cqi_from_spectral_efficiency(se) as i8
                        } else {
                            -1
                        }
                    })
                    .collect();
                let avg_sinr = usable.iter().sum::<f64>() / usable.len() as f64;
                let se = self.spectral_efficiency_from_sinr(avg_sinr);
                (
                    self.get_cqi_from_spectral_efficiency(se),
                    self.get_mcs_from_spectral_efficiency(se),
                    sb_cqi,
                )
            }
            AmcModel::ErrorModel => {
                // Walk the MCS ladder upward while the error model keeps the
                // hypothetical transmission under the BLER ceiling.
                let mut best = 0;
                for mcs in 0..=self.table.max_mcs() {
                    let tbs = self.calculate_tb_size(mcs, 1, num_prb * num_sym);
                    let bler = bler_model.block_error_rate(mcs, tbs, &usable);
                    if bler > MAX_BLER {
                        break;
                    }
                    best = mcs;
                }
                let wb_cqi = self
                    .get_cqi_from_spectral_efficiency(self.table.spectral_efficiency_for_mcs(best));
                let sb_cqi = sinr_per_subband
                    .iter()
                    .map(|&s| if s > 0.0 { wb_cqi as i8 } else { -1 })
                    .collect();
                (wb_cqi, best, sb_cqi)
            }
        };

        trace!(
            "CQI feedback: wb_cqi={} mcs={} ({} of {} subbands usable)",
            wb_cqi,
            mcs,
            usable.len(),
            sinr_per_subband.len()
        );

        CqiFeedback {
            wb_cqi,
            mcs,
            sb_cqi,
        }
    }

    /// Transport block size in bytes for an allocation
    ///
    /// `num_rb` counts RB-symbol units (frequency RBs times allocated
    /// symbols). Subtracts the transport block CRC, and one CRC per code
    /// block segment once the block exceeds the maximum LDPC code block
    /// size. Saturates at zero; minimum-payload floors are enforced by the
    /// allocators at DCI construction.
    pub fn calculate_tb_size(&self, mcs: u8, rank: u8, num_rb: u32) -> u32 {
        assert!(rank >= 1, "MIMO rank must be at least 1");
        let qm = self.table.modulation_order(mcs) as f64;
        let rate = self.table.code_rate(mcs);
        let re = (num_rb * SUBCARRIERS_PER_RB) as f64;

        let raw_bits = (re * qm * rate * rank as f64).floor() as i64;
        let mut bits = raw_bits - TB_CRC_BITS;
        if bits > MAX_CODE_BLOCK_BITS {
            let segments = (bits + MAX_CODE_BLOCK_BITS - 1) / MAX_CODE_BLOCK_BITS;
            bits -= segments * CB_CRC_BITS;
        }
        if bits < 0 {
            0
        } else {
            (bits / 8) as u32
        }
    }
}
