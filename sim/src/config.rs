//! YAML Scenario Configuration
//!
//! Serde structures describing a simulation scenario: bandwidth parts,
//! scheduler flavor, attached UEs and their traffic.

use serde::{Deserialize, Serialize};

/// Top-level scenario description
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    /// Number of TTIs (slots) to simulate
    #[serde(default = "default_ttis")]
    pub ttis: u64,
    /// RNG seed for traffic jitter; fixed seed, reproducible run
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Resource allocator: "tdma" or "ofdma"
    #[serde(default = "default_allocator")]
    pub allocator: String,
    /// Comparison policy: "rr", "pf", "qos" or "ai"
    #[serde(default = "default_policy")]
    pub policy: String,
    /// MCS table variant: 1 (64-QAM) or 2 (256-QAM)
    #[serde(default = "default_mcs_table")]
    pub mcs_table: u8,
    /// Bandwidth parts
    pub bwps: Vec<BwpSectionConfig>,
    /// QCI to BWP routing entries
    #[serde(default)]
    pub qci_map: Vec<QciMapEntry>,
    /// Attached UEs
    pub ues: Vec<UeSectionConfig>,
}

fn default_ttis() -> u64 {
    1000
}

fn default_seed() -> u64 {
    1
}

fn default_allocator() -> String {
    "tdma".into()
}

fn default_policy() -> String {
    "rr".into()
}

fn default_mcs_table() -> u8 {
    1
}

/// One bandwidth part
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BwpSectionConfig {
    /// Bandwidth part index
    pub bwp_id: u8,
    /// Subcarrier spacing in kHz
    #[serde(default = "default_scs_khz")]
    pub scs_khz: u16,
    /// Total RBGs across the frequency range
    pub bandwidth_rbg: u32,
    /// Resource blocks per RBG
    #[serde(default = "default_rb_per_rbg")]
    pub num_rb_per_rbg: u32,
    /// Notched RBG indices excluded from assignment
    #[serde(default)]
    pub notched_rbg: Vec<u32>,
    /// Leading symbols reserved for DL control
    #[serde(default = "default_dl_ctrl")]
    pub dl_ctrl_symbols: u8,
    /// Trailing symbols reserved for UL control
    #[serde(default = "default_ul_ctrl")]
    pub ul_ctrl_symbols: u8,
    /// Symbols per slot for DL data
    #[serde(default = "default_dl_data")]
    pub dl_data_symbols: u8,
    /// Symbols per slot for UL data
    #[serde(default = "default_ul_data")]
    pub ul_data_symbols: u8,
}

fn default_scs_khz() -> u16 {
    30
}

fn default_rb_per_rbg() -> u32 {
    1
}

fn default_dl_ctrl() -> u8 {
    1
}

fn default_ul_ctrl() -> u8 {
    1
}

fn default_dl_data() -> u8 {
    8
}

fn default_ul_data() -> u8 {
    4
}

/// One QCI-to-BWP routing entry
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct QciMapEntry {
    /// QoS class identifier
    pub qci: u8,
    /// Target bandwidth part
    pub bwp: u8,
}

/// One attached UE and its traffic profile
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UeSectionConfig {
    /// UE identifier
    pub rnti: u16,
    /// Serving beam
    #[serde(default)]
    pub beam: u16,
    /// Reported wideband CQI (0-15)
    #[serde(default = "default_cqi")]
    pub cqi: u8,
    /// Bearer QoS class
    #[serde(default = "default_qci")]
    pub qci: u8,
    /// Logical channel ID of the bearer
    #[serde(default = "default_lcid")]
    pub lcid: u8,
    /// DL offered load in bytes per TTI
    #[serde(default)]
    pub dl_bytes_per_tti: u32,
    /// UL offered load in bytes per TTI
    #[serde(default)]
    pub ul_bytes_per_tti: u32,
    /// Guaranteed bit rate in bit/s for GBR bearers
    #[serde(default)]
    pub gbr_bps: Option<u64>,
}

fn default_cqi() -> u8 {
    15
}

fn default_qci() -> u8 {
    9
}

fn default_lcid() -> u8 {
    4
}

impl Default for ScenarioConfig {
    /// Two full-buffer UEs on one 20-RBG bandwidth part, round robin
    fn default() -> Self {
        Self {
            ttis: default_ttis(),
            seed: default_seed(),
            allocator: default_allocator(),
            policy: default_policy(),
            mcs_table: default_mcs_table(),
            bwps: vec![BwpSectionConfig {
                bwp_id: 0,
                scs_khz: default_scs_khz(),
                bandwidth_rbg: 20,
                num_rb_per_rbg: default_rb_per_rbg(),
                notched_rbg: Vec::new(),
                dl_ctrl_symbols: default_dl_ctrl(),
                ul_ctrl_symbols: default_ul_ctrl(),
                dl_data_symbols: default_dl_data(),
                ul_data_symbols: default_ul_data(),
            }],
            qci_map: Vec::new(),
            ues: vec![
                UeSectionConfig {
                    rnti: 1,
                    beam: 0,
                    cqi: 15,
                    qci: default_qci(),
                    lcid: default_lcid(),
                    dl_bytes_per_tti: 5_000,
                    ul_bytes_per_tti: 1_000,
                    gbr_bps: None,
                },
                UeSectionConfig {
                    rnti: 2,
                    beam: 0,
                    cqi: 10,
                    qci: default_qci(),
                    lcid: default_lcid(),
                    dl_bytes_per_tti: 5_000,
                    ul_bytes_per_tti: 1_000,
                    gbr_bps: None,
                },
            ],
        }
    }
}
