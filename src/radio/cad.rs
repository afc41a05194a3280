//! Channel Activity Detection (CAD) timing for the simulated LoRa modem
//!
//! CAD on the real chip listens for a handful of symbols and raises a
//! CAD-done interrupt with a detection flag. The simulator reproduces the
//! timing side of that: the symbol counts per SF/BW combination below follow
//! the AN1200.48 recommendations, and `duration_ms` derives the simulated
//! listen window that the state machine arms before raising CAD-done.

use crate::radio::settings::{LoRaBandwidth, SpreadingFactor};
use serde::{Deserialize, Serialize};

/// Channel Activity Detection parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CadParams {
    /// Number of symbols to listen for (1, 2, 4, 8 or 16).
    pub symbol_num: u8,
    /// Peak detection threshold.
    pub det_peak: u8,
    /// Minimum detection threshold (noise floor).
    pub det_min: u8,
}

impl Default for CadParams {
    /// Defaults for SF7/BW125, the most common configuration.
    fn default() -> Self {
        Self {
            symbol_num: 2,
            det_peak: 22,
            det_min: 10,
        }
    }
}

impl CadParams {
    /// Recommended CAD parameters for an SF/BW combination.
    ///
    /// Symbol counts grow with spreading factor and shrink with bandwidth so
    /// the listen window stays long enough to catch a preamble symbol.
    pub fn optimal(sf: SpreadingFactor, bw: LoRaBandwidth) -> Self {
        let (symbol_num, det_peak) = match bw {
            LoRaBandwidth::BW125 => match sf {
                SpreadingFactor::SF6
                | SpreadingFactor::SF7
                | SpreadingFactor::SF8
                | SpreadingFactor::SF9 => (2, 22),
                SpreadingFactor::SF10 | SpreadingFactor::SF11 => (4, 21),
                SpreadingFactor::SF12 => (8, 20),
            },
            LoRaBandwidth::BW250 => match sf {
                SpreadingFactor::SF6 | SpreadingFactor::SF7 => (2, 22),
                SpreadingFactor::SF8 | SpreadingFactor::SF9 => (4, 21),
                SpreadingFactor::SF10 | SpreadingFactor::SF11 => (4, 21),
                SpreadingFactor::SF12 => (8, 20),
            },
            LoRaBandwidth::BW500 => match sf {
                SpreadingFactor::SF6 | SpreadingFactor::SF7 => (4, 22),
                SpreadingFactor::SF8 | SpreadingFactor::SF9 => (4, 21),
                SpreadingFactor::SF10 | SpreadingFactor::SF11 => (8, 20),
                SpreadingFactor::SF12 => (16, 19),
            },
        };

        Self {
            symbol_num,
            det_peak,
            det_min: 10,
        }
    }

    /// Simulated CAD duration in milliseconds, minimum 1 ms.
    pub fn duration_ms(&self, sf: SpreadingFactor, bw: LoRaBandwidth) -> u32 {
        let symbol_time_ms = sf.chips() as f32 * 1_000.0 / bw.hz() as f32;
        (self.symbol_num as f32 * symbol_time_ms).ceil().max(1.0) as u32
    }
}
