//! Common Utilities
//!
//! Numerology and unit-conversion helpers used across the scheduler core

/// Subcarriers per resource block
pub const SUBCARRIERS_PER_RB: u32 = 12;

/// OFDM symbols per slot (normal cyclic prefix)
pub const SYMBOLS_PER_SLOT: u8 = 14;

/// Convert a dB value to linear scale
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 10.0)
}

/// Convert a linear value to dB
pub fn linear_to_db(linear: f64) -> f64 {
    10.0 * linear.log10()
}

/// Calculate resource blocks from bandwidth and subcarrier spacing
pub fn calculate_nrb(bandwidth_hz: u32, scs_khz: u16) -> u16 {
    let scs_hz = scs_khz as u32 * 1000;
    let total_subcarriers = bandwidth_hz / scs_hz;
    (total_subcarriers / SUBCARRIERS_PER_RB) as u16
}

/// Time utilities for slot/frame calculations
pub mod time {
    /// Slot duration in microseconds for different SCS
    pub fn slot_duration_us(scs_khz: u16) -> u32 {
        match scs_khz {
            15 => 1000,
            30 => 500,
            60 => 250,
            120 => 125,
            240 => 62,
            _ => panic!("Invalid SCS: {}", scs_khz),
        }
    }

    /// Number of slots per frame (10ms)
    pub fn slots_per_frame(scs_khz: u16) -> u16 {
        match scs_khz {
            15 => 10,
            30 => 20,
            60 => 40,
            120 => 80,
            240 => 160,
            _ => panic!("Invalid SCS: {}", scs_khz),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_conversion() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-12);
        assert!((db_to_linear(10.0) - 10.0).abs() < 1e-9);
        assert!((linear_to_db(100.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_nrb() {
        // 20 MHz bandwidth with 30 kHz SCS
        assert_eq!(calculate_nrb(20_000_000, 30), 55);

        // 100 MHz bandwidth with 30 kHz SCS
        assert_eq!(calculate_nrb(100_000_000, 30), 277);
    }

    #[test]
    fn test_slot_duration() {
        assert_eq!(time::slot_duration_us(15), 1000);
        assert_eq!(time::slot_duration_us(30), 500);
        assert_eq!(time::slots_per_frame(120), 80);
    }
}
