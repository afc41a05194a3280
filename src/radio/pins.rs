//! # Logical Pin Table
//!
//! The real SX1276 driver is constructed with the full set of board pins
//! (SPI, reset, six DIO interrupt lines, and a handful of optional RF front
//! end controls). The simulator keeps the same constructor surface so MAC
//! code and board tables port over unchanged, but no pin ever touches
//! hardware: connected control pins only show up in debug logs, and
//! unconnected pins are silent no-ops.

use serde::{Deserialize, Serialize};

/// A logical pin identifier.
///
/// Mirrors the `PinName`/`NC` convention of embedded board tables: a pin is
/// either a numbered line or not connected. Driving an unconnected pin is a
/// documented no-op, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinName {
    /// A connected logical pin with a board-specific number.
    Pin(u8),
    /// Not connected.
    Nc,
}

impl PinName {
    /// Returns true when the pin is wired up.
    pub fn is_connected(self) -> bool {
        matches!(self, PinName::Pin(_))
    }
}

impl Default for PinName {
    fn default() -> Self {
        PinName::Nc
    }
}

/// Full pin table accepted by the radio constructor.
///
/// The SPI role pins, reset and DIO0..DIO5 correspond to the mandatory pins
/// of the SX1276 shield; everything else is optional front end control
/// (antenna switch, TX/RX switch, power amplifier, TCXO) that many boards
/// leave unconnected.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RadioPins {
    pub spi_mosi: PinName,
    pub spi_miso: PinName,
    pub spi_sclk: PinName,
    pub nss: PinName,
    pub reset: PinName,
    /// Interrupt lines DIO0 through DIO5.
    pub dio: [PinName; 6],
    pub rf_switch_ctl1: PinName,
    pub rf_switch_ctl2: PinName,
    pub txctl: PinName,
    pub rxctl: PinName,
    pub ant_switch: PinName,
    pub pwr_amp_ctl: PinName,
    pub tcxo: PinName,
}

impl RadioPins {
    /// A pin table with every pin unconnected.
    ///
    /// The simulator is fully functional without any pins; this is the
    /// normal construction path for tests and harnesses.
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Drive an optional front end control pin.
    ///
    /// Unconnected pins are skipped silently; connected pins are traced so a
    /// harness can follow the simulated front end switching.
    pub(crate) fn drive(&self, pin: PinName, high: bool, what: &str) {
        if let PinName::Pin(n) = pin {
            log::debug!("front end pin {n} ({what}) -> {}", if high { "high" } else { "low" });
        }
    }
}
