//! NR MAC Scheduler Core Library
//!
//! This crate implements the MAC resource scheduler and link-adaptation
//! subsystem: MCS/CQI tables, the AMC engine, per-UE scheduling state,
//! the TDMA and OFDMA resource allocators and the bandwidth-part routing
//! layer that multiplexes scheduler instances.

pub mod mac;

use thiserror::Error;

/// Recoverable errors of the scheduler core
///
/// Fatal configuration errors (out-of-range table indices, unregistered
/// QoS mappings, resource-accounting violations) abort via panic instead;
/// they indicate a programming or configuration bug, not transient radio
/// state.
#[derive(Error, Debug)]
pub enum SchedError {
    #[error("Unknown RNTI: {0}")]
    UnknownRnti(u16),

    #[error("Unknown logical channel {lcid} for RNTI {rnti}")]
    UnknownLogicalChannel { rnti: u16, lcid: u8 },

    #[error("Duplicate RNTI: {0}")]
    DuplicateRnti(u16),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}
