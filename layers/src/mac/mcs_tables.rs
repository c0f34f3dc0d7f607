//! MCS and CQI Lookup Tables
//!
//! Static modulation/code-rate/spectral-efficiency tables from 3GPP
//! TS 38.214 (Tables 5.1.3.1-1/-2 and 5.2.2.1-2/-3). Process-wide
//! immutable constant data; safe for unsynchronized concurrent reads.
//!
//! Out-of-range access is a fatal configuration error and aborts.

/// MCS table variant selector
///
/// Variant 1 tops out at 64-QAM (MCS 0-28), variant 2 at 256-QAM
/// (MCS 0-27).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McsTable {
    /// TS 38.214 Table 5.1.3.1-1 (max 64-QAM)
    Qam64,
    /// TS 38.214 Table 5.1.3.1-2 (max 256-QAM)
    Qam256,
}

/// One MCS table row: (modulation order, code rate x 1024, spectral efficiency)
type McsRow = (u8, f64, f64);

/// TS 38.214 Table 5.1.3.1-1: MCS index table 1 for PDSCH
const MCS_TABLE_1: [McsRow; 29] = [
    (2, 120.0, 0.2344),
    (2, 157.0, 0.3066),
    (2, 193.0, 0.3770),
    (2, 251.0, 0.4902),
    (2, 308.0, 0.6016),
    (2, 379.0, 0.7402),
    (2, 449.0, 0.8770),
    (2, 526.0, 1.0273),
    (2, 602.0, 1.1758),
    (2, 679.0, 1.3262),
    (4, 340.0, 1.3281),
    (4, 378.0, 1.4766),
    (4, 434.0, 1.6953),
    (4, 490.0, 1.9141),
    (4, 553.0, 2.1602),
    (4, 616.0, 2.4063),
    (4, 658.0, 2.5703),
    (6, 438.0, 2.5664),
    (6, 466.0, 2.7305),
    (6, 517.0, 3.0293),
    (6, 567.0, 3.3223),
    (6, 616.0, 3.6094),
    (6, 666.0, 3.9023),
    (6, 719.0, 4.2129),
    (6, 772.0, 4.5234),
    (6, 822.0, 4.8164),
    (6, 873.0, 5.1152),
    (6, 910.0, 5.3320),
    (6, 948.0, 5.5547),
];

/// TS 38.214 Table 5.1.3.1-2: MCS index table 2 for PDSCH
const MCS_TABLE_2: [McsRow; 28] = [
    (2, 120.0, 0.2344),
    (2, 193.0, 0.3770),
    (2, 308.0, 0.6016),
    (2, 449.0, 0.8770),
    (2, 602.0, 1.1758),
    (4, 378.0, 1.4766),
    (4, 434.0, 1.6953),
    (4, 490.0, 1.9141),
    (4, 553.0, 2.1602),
    (4, 616.0, 2.4063),
    (4, 658.0, 2.5703),
    (6, 466.0, 2.7305),
    (6, 517.0, 3.0293),
    (6, 567.0, 3.3223),
    (6, 616.0, 3.6094),
    (6, 666.0, 3.9023),
    (6, 719.0, 4.2129),
    (6, 772.0, 4.5234),
    (6, 822.0, 4.8164),
    (6, 873.0, 5.1152),
    (8, 682.5, 5.3320),
    (8, 711.0, 5.5547),
    (8, 754.0, 5.8906),
    (8, 797.0, 6.2266),
    (8, 841.0, 6.5703),
    (8, 885.0, 6.9141),
    (8, 916.5, 7.1602),
    (8, 948.0, 7.4063),
];

/// TS 38.214 Table 5.2.2.1-2: CQI spectral efficiencies, 64-QAM table
///
/// CQI 0 is "out of range" and carries zero efficiency.
const CQI_TABLE_1: [f64; 16] = [
    0.0, 0.1523, 0.2344, 0.3770, 0.6016, 0.8770, 1.1758, 1.4766, 1.9141, 2.4063, 2.7305, 3.3223,
    3.9023, 4.5234, 5.1152, 5.5547,
];

/// TS 38.214 Table 5.2.2.1-3: CQI spectral efficiencies, 256-QAM table
const CQI_TABLE_2: [f64; 16] = [
    0.0, 0.1523, 0.3770, 0.8770, 1.4766, 1.9141, 2.4063, 2.7305, 3.3223, 3.9023, 4.5234, 5.1152,
    5.5547, 6.2266, 6.9141, 7.4063,
];

/// Maximum valid CQI index
pub const MAX_CQI: u8 = 15;

impl McsTable {
    fn rows(&self) -> &'static [McsRow] {
        match self {
            McsTable::Qam64 => &MCS_TABLE_1,
            McsTable::Qam256 => &MCS_TABLE_2,
        }
    }

    fn row(&self, mcs: u8) -> &'static McsRow {
        let rows = self.rows();
        assert!(
            (mcs as usize) < rows.len(),
            "MCS {} out of range for {:?} (max {})",
            mcs,
            self,
            rows.len() - 1
        );
        &rows[mcs as usize]
    }

    /// Highest valid MCS index of this table variant
    pub fn max_mcs(&self) -> u8 {
        (self.rows().len() - 1) as u8
    }

    /// Modulation order (bits per symbol) for an MCS index
    pub fn modulation_order(&self, mcs: u8) -> u8 {
        self.row(mcs).0
    }

    /// Effective code rate (fraction of 1) for an MCS index
    pub fn code_rate(&self, mcs: u8) -> f64 {
        self.row(mcs).1 / 1024.0
    }

    /// Spectral efficiency in bit/s/Hz for an MCS index
    pub fn spectral_efficiency_for_mcs(&self, mcs: u8) -> f64 {
        self.row(mcs).2
    }

    /// Spectral efficiency in bit/s/Hz for a CQI index
    pub fn spectral_efficiency_for_cqi(&self, cqi: u8) -> f64 {
        assert!(cqi <= MAX_CQI, "CQI {} out of range (max {})", cqi, MAX_CQI);
        match self {
            McsTable::Qam64 => CQI_TABLE_1[cqi as usize],
            McsTable::Qam256 => CQI_TABLE_2[cqi as usize],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_bounds() {
        assert_eq!(McsTable::Qam64.max_mcs(), 28);
        assert_eq!(McsTable::Qam256.max_mcs(), 27);
        assert_eq!(McsTable::Qam64.modulation_order(0), 2);
        assert_eq!(McsTable::Qam64.modulation_order(28), 6);
        assert_eq!(McsTable::Qam256.modulation_order(27), 8);
    }

    #[test]
    #[should_panic(expected = "MCS 29 out of range")]
    fn test_mcs_out_of_range_aborts() {
        McsTable::Qam64.modulation_order(29);
    }

    #[test]
    #[should_panic(expected = "CQI 16 out of range")]
    fn test_cqi_out_of_range_aborts() {
        McsTable::Qam64.spectral_efficiency_for_cqi(16);
    }

    #[test]
    fn test_cqi_tables_monotone() {
        for table in [McsTable::Qam64, McsTable::Qam256] {
            for cqi in 0..MAX_CQI {
                assert!(
                    table.spectral_efficiency_for_cqi(cqi + 1)
                        > table.spectral_efficiency_for_cqi(cqi),
                    "CQI table {:?} not increasing at {}",
                    table,
                    cqi
                );
            }
        }
    }

    #[test]
    fn test_table2_spectral_efficiency_monotone() {
        let t = McsTable::Qam256;
        for mcs in 0..t.max_mcs() {
            assert!(t.spectral_efficiency_for_mcs(mcs + 1) > t.spectral_efficiency_for_mcs(mcs));
        }
    }

    #[test]
    fn test_table1_spectral_efficiency_ordering() {
        // Table 1 carries a single dip at the 16-QAM to 64-QAM switch
        // (MCS 16 -> 17), inherited from TS 38.214. Every other step is
        // increasing.
        let t = McsTable::Qam64;
        for mcs in 0..t.max_mcs() {
            if mcs == 16 {
                continue;
            }
            assert!(
                t.spectral_efficiency_for_mcs(mcs + 1) > t.spectral_efficiency_for_mcs(mcs),
                "unexpected SE dip at MCS {}",
                mcs
            );
        }
    }

    #[test]
    fn test_code_rate_matches_spectral_efficiency() {
        // SE = Qm * R within table rounding
        for table in [McsTable::Qam64, McsTable::Qam256] {
            for mcs in 0..=table.max_mcs() {
                let derived = table.modulation_order(mcs) as f64 * table.code_rate(mcs);
                let listed = table.spectral_efficiency_for_mcs(mcs);
                assert!(
                    (derived - listed).abs() < 5e-4,
                    "{:?} MCS {}: {} vs {}",
                    table,
                    mcs,
                    derived,
                    listed
                );
            }
        }
    }
}
