//! # Synthesized RSSI/SNR Model
//!
//! There is no physical channel behind the simulator, so every RSSI reading
//! is synthesized here. The model is deliberately simple and deterministic
//! when seeded: an idle channel samples around the thermal noise floor with a
//! few dB of jitter, a harness can raise the ambient level to simulate a
//! foreign carrier (busy channel for carrier sense and CAD), and accepted
//! frames get plausible packet metrics. `random()` draws its entropy bits
//! from the same sample stream, mirroring the chip's wideband-RSSI entropy
//! source.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Idle-channel noise floor in dBm.
pub const NOISE_FLOOR_DBM: i16 = -105;

/// Nominal RSSI of an injected frame in dBm.
pub const FRAME_RSSI_DBM: i16 = -60;

/// Ambient level above which CAD reports channel activity.
pub const CAD_DETECT_THRESHOLD_DBM: i16 = -90;

/// Seeded noise source for all synthesized radio measurements.
#[derive(Debug)]
pub struct RssiModel {
    rng: StdRng,
    /// Harness-injected ambient carrier level; `None` means idle channel.
    ambient_dbm: Option<i16>,
}

impl RssiModel {
    /// A model with a fixed seed, for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ambient_dbm: None,
        }
    }

    /// A model seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            ambient_dbm: None,
        }
    }

    /// Overrides the ambient channel level, simulating a foreign carrier.
    ///
    /// `None` returns the channel to the idle noise floor.
    pub fn set_ambient(&mut self, dbm: Option<i16>) {
        self.ambient_dbm = dbm;
    }

    /// One instantaneous RSSI sample in dBm.
    pub fn sample_dbm(&mut self) -> i16 {
        let base = self.ambient_dbm.unwrap_or(NOISE_FLOOR_DBM);
        base + self.rng.gen_range(-3..=3)
    }

    /// Packet metrics for an accepted frame: `(rssi_dbm, snr_db)`.
    ///
    /// SNR is derived from the RSSI relative to the noise floor and clamped
    /// to the chip's reportable -20..+10 dB range.
    pub fn frame_metrics(&mut self) -> (i16, i8) {
        let rssi = FRAME_RSSI_DBM + self.rng.gen_range(-10..=10);
        let snr = ((rssi - NOISE_FLOOR_DBM) / 4).clamp(-20, 10) as i8;
        (rssi, snr)
    }

    /// Whether a CAD listen window would flag channel activity.
    pub fn channel_active(&mut self) -> bool {
        self.sample_dbm() > CAD_DETECT_THRESHOLD_DBM
    }

    /// A 32-bit value assembled from the low bit of 32 noise samples.
    pub fn entropy_word(&mut self) -> u32 {
        let mut word = 0u32;
        for _ in 0..32 {
            word = (word << 1) | (self.sample_dbm() as u32 & 1);
        }
        word
    }
}
