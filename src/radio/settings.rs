//! # Modem Configuration Store
//!
//! Holds the current RX/TX parameters of the simulated transceiver and the
//! clamping tables that stand in for permissive hardware register writes:
//! out-of-range values are clamped (with a warn log) instead of rejected, so
//! MAC code written against real silicon behaves identically here.
//!
//! ## Field domains
//!
//! The valid domains mirror the SX1276 driver contract:
//!
//! - LoRa bandwidth index: `0` = 125 kHz, `1` = 250 kHz, `2` = 500 kHz
//! - LoRa datarate: spreading factor `6..=12` (chips `64..4096`)
//! - LoRa coderate: `1` = 4/5, `2` = 4/6, `3` = 4/7, `4` = 4/8
//! - FSK bandwidth / AFC bandwidth: `2_600..=250_000` Hz
//! - FSK datarate: `600..=300_000` bit/s
//! - TX power: `-4..=20` dBm
//!
//! Fields irrelevant to the active modem kind are held at a neutral value of
//! `0`/`false` rather than left undefined.

use serde::{Deserialize, Serialize};

/// LoRa sync word for public networks (LoRaWAN).
pub const LORA_MAC_PUBLIC_SYNCWORD: u8 = 0x34;
/// LoRa sync word for private networks.
pub const LORA_MAC_PRIVATE_SYNCWORD: u8 = 0x12;

/// Default shared TX/RX data buffer capacity in bytes.
pub const MAX_DATA_BUFFER_SIZE: usize = 256;

/// The data-encoding scheme governing a transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modem {
    /// Frequency shift keying.
    Fsk,
    /// LoRa chirp spread spectrum.
    LoRa,
}

/// Chip variant tag, selected once at construction.
///
/// The real driver sniffs the antenna-switch pin at runtime to tell an
/// SX1272 shield from an SX1276 shield; the simulator takes the variant as a
/// constructor parameter and expresses the per-variant behavior as data
/// tables below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioVariant {
    Sx1272,
    Sx1276,
}

impl RadioVariant {
    /// Supported RF bands in Hz, `(low, high)` inclusive.
    pub fn bands(self) -> &'static [(u32, u32)] {
        match self {
            // SX1276: LF port 137-175 MHz and 410-525 MHz, HF port 862-1020 MHz
            RadioVariant::Sx1276 => &[
                (137_000_000, 175_000_000),
                (410_000_000, 525_000_000),
                (862_000_000, 1_020_000_000),
            ],
            // SX1272 only has the HF port
            RadioVariant::Sx1272 => &[(860_000_000, 1_020_000_000)],
        }
    }

    /// Range validation against the variant's supported bands.
    pub fn supports_frequency(self, freq_hz: u32) -> bool {
        self.bands()
            .iter()
            .any(|&(lo, hi)| freq_hz >= lo && freq_hz <= hi)
    }
}

/// Spreading factor for LoRa. SX1276 supports SF6 through SF12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpreadingFactor {
    SF6 = 6,
    SF7 = 7,
    SF8 = 8,
    SF9 = 9,
    SF10 = 10,
    SF11 = 11,
    SF12 = 12,
}

impl SpreadingFactor {
    /// Maps a raw datarate register value to a spreading factor, clamping to
    /// the supported `6..=12` range the way the driver does.
    pub fn from_datarate(datarate: u32) -> Self {
        match datarate {
            0..=6 => SpreadingFactor::SF6,
            7 => SpreadingFactor::SF7,
            8 => SpreadingFactor::SF8,
            9 => SpreadingFactor::SF9,
            10 => SpreadingFactor::SF10,
            11 => SpreadingFactor::SF11,
            _ => SpreadingFactor::SF12,
        }
    }

    /// The `2^SF` chips per symbol.
    pub fn chips(self) -> u32 {
        1 << (self as u32)
    }
}

/// Bandwidth for the LoRa modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoRaBandwidth {
    BW125 = 0,
    BW250 = 1,
    BW500 = 2,
}

impl LoRaBandwidth {
    /// Maps the driver's bandwidth index, clamping reserved values to 500 kHz.
    pub fn from_index(index: u32) -> Self {
        match index {
            0 => LoRaBandwidth::BW125,
            1 => LoRaBandwidth::BW250,
            _ => LoRaBandwidth::BW500,
        }
    }

    /// Bandwidth in Hz.
    pub fn hz(self) -> u32 {
        match self {
            LoRaBandwidth::BW125 => 125_000,
            LoRaBandwidth::BW250 => 250_000,
            LoRaBandwidth::BW500 => 500_000,
        }
    }
}

/// Which direction `set_rx_config`/`set_tx_config` touched last.
///
/// `time_on_air` is defined only after one of the two configuration calls has
/// run; it computes over the most recently configured direction, matching the
/// single shared settings block of the original driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigDirection {
    Rx,
    Tx,
}

/// Reception parameters, one block per §set_rx_config argument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RxConfig {
    /// LoRa: bandwidth index 0..=2. FSK: bandwidth in Hz.
    pub bandwidth: u32,
    /// LoRa: spreading factor 6..=12. FSK: bit/s.
    pub datarate: u32,
    /// LoRa only, 1..=4. FSK neutral 0.
    pub coderate: u8,
    /// FSK only, AFC bandwidth in Hz. LoRa neutral 0.
    pub bandwidth_afc: u32,
    /// Preamble length in symbols (LoRa) or bytes (FSK).
    pub preamble_len: u16,
    /// RX single timeout in symbols (LoRa) or bytes (FSK).
    pub symb_timeout: u16,
    /// Fixed length packets (implicit header in LoRa terms).
    pub fix_len: bool,
    /// Payload length when fixed length is used.
    pub payload_len: u8,
    pub crc_on: bool,
    /// Intra-packet frequency hopping (LoRa only).
    pub freq_hop_on: bool,
    /// Symbols between hops (LoRa only).
    pub hop_period: u8,
    /// IQ inversion (LoRa only).
    pub iq_inverted: bool,
    /// Continuous reception mode.
    pub rx_continuous: bool,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            bandwidth: 0,
            datarate: 7,
            coderate: 1,
            bandwidth_afc: 0,
            preamble_len: 8,
            symb_timeout: 5,
            fix_len: false,
            payload_len: 0,
            crc_on: true,
            freq_hop_on: false,
            hop_period: 0,
            iq_inverted: false,
            rx_continuous: false,
        }
    }
}

/// Transmission parameters, one block per §set_tx_config argument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TxConfig {
    /// Output power in dBm, -4..=20.
    pub power: i8,
    /// FSK frequency deviation in Hz. LoRa neutral 0.
    pub fdev: u32,
    /// LoRa: bandwidth index 0..=2. FSK neutral 0.
    pub bandwidth: u32,
    /// LoRa: spreading factor 6..=12. FSK: bit/s.
    pub datarate: u32,
    /// LoRa only, 1..=4. FSK neutral 0.
    pub coderate: u8,
    pub preamble_len: u16,
    pub fix_len: bool,
    pub crc_on: bool,
    pub freq_hop_on: bool,
    pub hop_period: u8,
    pub iq_inverted: bool,
    /// Transmission timeout in milliseconds.
    pub tx_timeout_ms: u32,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            power: 14,
            fdev: 0,
            bandwidth: 0,
            datarate: 7,
            coderate: 1,
            preamble_len: 8,
            fix_len: false,
            crc_on: true,
            freq_hop_on: false,
            hop_period: 0,
            iq_inverted: false,
            tx_timeout_ms: 4_000,
        }
    }
}

/// All user and network specified settings for the simulated radio module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioSettings {
    pub modem: Modem,
    /// Channel RF frequency in Hz.
    pub channel: u32,
    pub rx: RxConfig,
    pub tx: TxConfig,
    /// Maximum payload length per modem kind.
    pub max_payload_fsk: u8,
    pub max_payload_lora: u8,
    /// Public vs private LoRa network; drives the sync word.
    pub public_network: bool,
    /// Current LoRa sync word.
    pub sync_word: u8,
    #[serde(skip)]
    pub rx_configured: bool,
    #[serde(skip)]
    pub tx_configured: bool,
    #[serde(skip)]
    pub last_configured: Option<ConfigDirection>,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            modem: Modem::LoRa,
            channel: 868_000_000,
            rx: RxConfig::default(),
            tx: TxConfig::default(),
            max_payload_fsk: 255,
            max_payload_lora: 255,
            public_network: false,
            sync_word: LORA_MAC_PRIVATE_SYNCWORD,
            rx_configured: false,
            tx_configured: false,
            last_configured: None,
        }
    }
}

impl RadioSettings {
    /// Store a reception configuration, clamping out-of-range fields.
    pub fn apply_rx_config(&mut self, modem: Modem, mut config: RxConfig) {
        match modem {
            Modem::LoRa => {
                config.bandwidth = clamp_field("rx bandwidth", config.bandwidth, 0, 2);
                config.datarate = clamp_field("rx datarate", config.datarate, 6, 12);
                config.coderate = clamp_field("rx coderate", config.coderate, 1, 4);
                // FSK-only fields held at their neutral value
                config.bandwidth_afc = 0;
            }
            Modem::Fsk => {
                config.bandwidth = clamp_field("rx bandwidth", config.bandwidth, 2_600, 250_000);
                config.datarate = clamp_field("rx datarate", config.datarate, 600, 300_000);
                if config.bandwidth_afc != 0 {
                    config.bandwidth_afc =
                        clamp_field("rx afc bandwidth", config.bandwidth_afc, 2_600, 250_000);
                }
                // LoRa-only fields held at their neutral value
                config.coderate = 0;
                config.freq_hop_on = false;
                config.hop_period = 0;
                config.iq_inverted = false;
            }
        }
        self.modem = modem;
        self.rx = config;
        self.rx_configured = true;
        self.last_configured = Some(ConfigDirection::Rx);
        log::debug!("rx config stored: modem {modem:?}, {config:?}");
    }

    /// Store a transmission configuration, clamping out-of-range fields.
    pub fn apply_tx_config(&mut self, modem: Modem, mut config: TxConfig) {
        config.power = clamp_field("tx power", config.power, -4, 20);
        match modem {
            Modem::LoRa => {
                config.bandwidth = clamp_field("tx bandwidth", config.bandwidth, 0, 2);
                config.datarate = clamp_field("tx datarate", config.datarate, 6, 12);
                config.coderate = clamp_field("tx coderate", config.coderate, 1, 4);
                config.fdev = 0;
            }
            Modem::Fsk => {
                config.datarate = clamp_field("tx datarate", config.datarate, 600, 300_000);
                config.bandwidth = 0;
                config.coderate = 0;
                config.freq_hop_on = false;
                config.hop_period = 0;
                config.iq_inverted = false;
            }
        }
        self.modem = modem;
        self.tx = config;
        self.tx_configured = true;
        self.last_configured = Some(ConfigDirection::Tx);
        log::debug!("tx config stored: modem {modem:?}, {config:?}");
    }

    /// Maximum payload length for the given modem kind.
    pub fn max_payload(&self, modem: Modem) -> u8 {
        match modem {
            Modem::Fsk => self.max_payload_fsk,
            Modem::LoRa => self.max_payload_lora,
        }
    }

    /// Set the per-modem maximum payload length.
    pub fn set_max_payload(&mut self, modem: Modem, max: u8) {
        match modem {
            Modem::Fsk => self.max_payload_fsk = max,
            Modem::LoRa => self.max_payload_lora = max,
        }
    }

    /// Switch between the public and private LoRa network sync words.
    pub fn set_public_network(&mut self, enable: bool) {
        self.public_network = enable;
        self.sync_word = if enable {
            LORA_MAC_PUBLIC_SYNCWORD
        } else {
            LORA_MAC_PRIVATE_SYNCWORD
        };
        log::debug!("sync word set to 0x{:02X}", self.sync_word);
    }

    /// Current RX spreading factor (LoRa).
    pub fn rx_spreading_factor(&self) -> SpreadingFactor {
        SpreadingFactor::from_datarate(self.rx.datarate)
    }

    /// Current RX bandwidth (LoRa).
    pub fn rx_lora_bandwidth(&self) -> LoRaBandwidth {
        LoRaBandwidth::from_index(self.rx.bandwidth)
    }
}

/// Clamps a configuration field into its valid domain, warning on adjustment.
///
/// Mirrors permissive register writes: the caller never sees a failure, the
/// nearest valid value is stored instead.
fn clamp_field<T: PartialOrd + Copy + std::fmt::Display>(name: &str, value: T, lo: T, hi: T) -> T {
    if value < lo {
        log::warn!("{name} {value} below valid range, clamped to {lo}");
        lo
    } else if value > hi {
        log::warn!("{name} {value} above valid range, clamped to {hi}");
        hi
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lora_rx_config_clamping() {
        let mut settings = RadioSettings::default();
        settings.apply_rx_config(
            Modem::LoRa,
            RxConfig {
                bandwidth: 9,  // reserved, clamps to 2
                datarate: 42,  // clamps to SF12
                coderate: 0,   // clamps to 4/5
                bandwidth_afc: 125_000, // FSK-only, neutralized
                ..RxConfig::default()
            },
        );
        assert_eq!(settings.rx.bandwidth, 2);
        assert_eq!(settings.rx.datarate, 12);
        assert_eq!(settings.rx.coderate, 1);
        assert_eq!(settings.rx.bandwidth_afc, 0);
        assert!(settings.rx_configured);
        assert_eq!(settings.last_configured, Some(ConfigDirection::Rx));
    }

    #[test]
    fn test_fsk_config_neutralizes_lora_fields() {
        let mut settings = RadioSettings::default();
        settings.apply_rx_config(
            Modem::Fsk,
            RxConfig {
                bandwidth: 50_000,
                datarate: 50_000,
                coderate: 4,
                freq_hop_on: true,
                hop_period: 4,
                iq_inverted: true,
                ..RxConfig::default()
            },
        );
        assert_eq!(settings.modem, Modem::Fsk);
        assert_eq!(settings.rx.coderate, 0);
        assert!(!settings.rx.freq_hop_on);
        assert!(!settings.rx.iq_inverted);
    }

    #[test]
    fn test_tx_power_clamping() {
        let mut settings = RadioSettings::default();
        settings.apply_tx_config(
            Modem::LoRa,
            TxConfig {
                power: 33,
                ..TxConfig::default()
            },
        );
        assert_eq!(settings.tx.power, 20);

        settings.apply_tx_config(
            Modem::LoRa,
            TxConfig {
                power: -20,
                ..TxConfig::default()
            },
        );
        assert_eq!(settings.tx.power, -4);
    }

    #[test]
    fn test_public_network_sync_word() {
        let mut settings = RadioSettings::default();
        assert_eq!(settings.sync_word, LORA_MAC_PRIVATE_SYNCWORD);
        settings.set_public_network(true);
        assert_eq!(settings.sync_word, LORA_MAC_PUBLIC_SYNCWORD);
        settings.set_public_network(false);
        assert_eq!(settings.sync_word, LORA_MAC_PRIVATE_SYNCWORD);
    }

    #[test]
    fn test_variant_band_tables() {
        assert!(RadioVariant::Sx1276.supports_frequency(868_100_000));
        assert!(RadioVariant::Sx1276.supports_frequency(433_000_000));
        assert!(RadioVariant::Sx1276.supports_frequency(169_000_000));
        assert!(!RadioVariant::Sx1276.supports_frequency(2_400_000_000));

        assert!(RadioVariant::Sx1272.supports_frequency(915_000_000));
        assert!(!RadioVariant::Sx1272.supports_frequency(433_000_000));
    }

    #[test]
    fn test_spreading_factor_mapping() {
        assert_eq!(SpreadingFactor::from_datarate(5), SpreadingFactor::SF6);
        assert_eq!(SpreadingFactor::from_datarate(7), SpreadingFactor::SF7);
        assert_eq!(SpreadingFactor::from_datarate(13), SpreadingFactor::SF12);
        assert_eq!(SpreadingFactor::SF9.chips(), 512);
    }
}
