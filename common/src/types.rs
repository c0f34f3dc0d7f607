//! Common Types for the NR MAC Scheduler
//!
//! Defines fundamental identifier types used throughout the scheduler core

use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

/// Radio Network Temporary Identifier (RNTI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rnti(pub u16);

impl Rnti {
    /// Create a new RNTI
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the RNTI value
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Beam identifier
///
/// Groups UEs that share a beamforming constraint: the cell can only point
/// one beam per symbol, so resource partitioning happens per beam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeamId(pub u16);

impl BeamId {
    /// Create a new beam identifier
    pub fn new(value: u16) -> Self {
        Self(value)
    }
}

/// Bandwidth part index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BwpId(pub u8);

/// QoS Class Identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Qci(pub u8);

impl Qci {
    /// Conversational voice (GBR)
    pub const VOICE: Self = Self(1);
    /// Conversational video (GBR)
    pub const VIDEO: Self = Self(2);
    /// Default bearer (non-GBR)
    pub const DEFAULT: Self = Self(9);

    /// Standardized priority level for this QCI (lower = more urgent)
    pub fn priority(&self) -> u8 {
        match self.0 {
            1 => 20,
            2 => 40,
            3 => 30,
            4 => 50,
            5 => 10,
            65 => 7,
            66 => 20,
            7 => 70,
            8 => 80,
            9 => 90,
            // Operator-specific QCIs fall back to default-bearer priority
            _ => 90,
        }
    }

    /// Whether this QCI carries a guaranteed bit rate
    pub fn is_gbr(&self) -> bool {
        matches!(self.0, 1..=4 | 65 | 66)
    }
}

/// Logical channel group identifier (0-7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LcgId(pub u8);

/// Transmission direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Downlink
    Dl,
    /// Uplink
    Ul,
}

/// Subcarrier spacing values in kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum SubcarrierSpacing {
    /// 15 kHz
    Scs15 = 15,
    /// 30 kHz
    Scs30 = 30,
    /// 60 kHz
    Scs60 = 60,
    /// 120 kHz
    Scs120 = 120,
    /// 240 kHz
    Scs240 = 240,
}

impl SubcarrierSpacing {
    /// Subcarrier spacing in kHz
    pub fn as_khz(&self) -> u16 {
        *self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qci_priority_ordering() {
        // Voice outranks the default bearer
        assert!(Qci::VOICE.priority() < Qci::DEFAULT.priority());
        // IMS signalling outranks voice
        assert!(Qci(5).priority() < Qci::VOICE.priority());
    }

    #[test]
    fn test_qci_gbr_classes() {
        assert!(Qci::VOICE.is_gbr());
        assert!(Qci::VIDEO.is_gbr());
        assert!(!Qci::DEFAULT.is_gbr());
        assert!(!Qci(7).is_gbr());
    }

    #[test]
    fn test_rnti_ordering() {
        assert!(Rnti::new(1) < Rnti::new(2));
        assert_eq!(Rnti::new(70).value(), 70);
    }
}
