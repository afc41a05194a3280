//! # Time-on-Air Arithmetic
//!
//! Airtime calculators for the two modem kinds. These feed the TX-done timer
//! (the simulated transmission takes exactly as long as the real one would)
//! and back the public `time_on_air` query the MAC uses for duty cycle and
//! receive window arithmetic.
//!
//! The LoRa path follows the standard symbol-time formulas: symbol duration
//! is `2^SF / BW`, the preamble costs `preamble_len + 4.25` symbols, and the
//! payload symbol count accounts for header mode, CRC and the coding rate.
//! Low data rate optimization kicks in automatically once the symbol time
//! exceeds 16 ms, matching the chip's behavior.

use crate::radio::settings::{LoRaBandwidth, SpreadingFactor};

/// LoRa airtime parameters for a single packet.
#[derive(Debug, Clone, Copy)]
pub struct LoRaAirtime {
    pub bandwidth: LoRaBandwidth,
    pub spreading_factor: SpreadingFactor,
    /// Coding rate denominator offset, 1 (4/5) through 4 (4/8).
    pub coderate: u8,
    /// Preamble length in symbols.
    pub preamble_len: u16,
    /// Implicit (fixed length) header mode.
    pub implicit_header: bool,
    pub payload_len: u8,
    pub crc_on: bool,
}

impl LoRaAirtime {
    /// Symbol duration in seconds: `2^SF / BW`.
    pub fn symbol_time_s(&self) -> f64 {
        self.spreading_factor.chips() as f64 / self.bandwidth.hz() as f64
    }

    /// Whether low data rate optimization applies.
    ///
    /// The chip enables it whenever the symbol time exceeds 16 ms, which is
    /// SF11/SF12 at 125 kHz and SF12 at 250 kHz.
    pub fn low_data_rate_optimize(&self) -> bool {
        self.symbol_time_s() * 1_000.0 > 16.0
    }

    /// Packet airtime in microseconds.
    pub fn microseconds(&self) -> u32 {
        let ts = self.symbol_time_s();
        let t_preamble = (self.preamble_len as f64 + 4.25) * ts;

        let de = if self.low_data_rate_optimize() { 1.0 } else { 0.0 };
        let sf = self.spreading_factor as u32 as f64;
        let crc = if self.crc_on { 1.0 } else { 0.0 };
        let ih = if self.implicit_header { 1.0 } else { 0.0 };

        let numerator = 8.0 * self.payload_len as f64 - 4.0 * sf + 28.0 + 16.0 * crc - 20.0 * ih;
        let denominator = 4.0 * (sf - 2.0 * de);
        let payload_symbols =
            8.0 + ((numerator / denominator).ceil() * (self.coderate as f64 + 4.0)).max(0.0);

        let t_payload = payload_symbols * ts;
        ((t_preamble + t_payload) * 1_000_000.0).round() as u32
    }
}

/// FSK airtime parameters for a single packet.
///
/// The frame is preamble + 3-byte sync word + optional length byte + payload
/// + optional 2-byte CRC, clocked out at the configured bitrate.
#[derive(Debug, Clone, Copy)]
pub struct FskAirtime {
    /// Datarate in bit/s.
    pub datarate: u32,
    /// Preamble length in bytes.
    pub preamble_len: u16,
    /// Fixed length packets carry no length byte.
    pub fix_len: bool,
    pub payload_len: u8,
    pub crc_on: bool,
}

impl FskAirtime {
    /// Packet airtime in microseconds.
    pub fn microseconds(&self) -> u32 {
        const SYNC_WORD_BYTES: u32 = 3;
        let length_byte = if self.fix_len { 0 } else { 1 };
        let crc_bytes = if self.crc_on { 2 } else { 0 };

        let bits = 8
            * (self.preamble_len as u32
                + SYNC_WORD_BYTES
                + length_byte
                + self.payload_len as u32
                + crc_bytes);

        ((bits as f64 / self.datarate as f64) * 1_000_000.0).round() as u32
    }
}
