//! Scheduler Service Access Point (SAP) Interfaces Library
//!
//! This crate defines the narrow interfaces through which external
//! collaborators (RLC, PHY, error model, learning agents) interact with the
//! MAC scheduler core. Collaborators are in-process; no wire transport is
//! involved.

pub mod message_types;

pub use message_types::*;

use thiserror::Error;

/// Interface errors
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid message format")]
    InvalidMessage,

    #[error("Unknown RNTI: {0}")]
    UnknownRnti(u16),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// External PHY error model
///
/// Converts a hypothetical transmission (MCS, transport block size, per-chunk
/// SINR) into a block-error-rate estimate. Consumed as a black box by the
/// AMC engine's iterative CQI-feedback mode.
pub trait BlerModel {
    /// Estimated block error rate in [0, 1] for the given transmission
    fn block_error_rate(&self, mcs: u8, tbs_bytes: u32, sinr_per_subband: &[f64]) -> f64;
}

/// Receiver of transmission opportunities (RLC side)
///
/// A grant for a logical channel is delivered here once the owning
/// bandwidth part has scheduled it.
pub trait TxOpportunityHandler {
    /// A transmission opportunity of `bytes` is available for the channel
    fn notify_tx_opportunity(&mut self, opportunity: TxOpportunity);
}

/// Receiver of per-TTI scheduling results (MAC/PHY side)
pub trait SchedSapUser {
    /// Scheduling for one TTI is complete
    fn sched_config_ind(&mut self, ind: SchedConfigInd);
}
