//! # sx1276-sim - A Software Model of the SX1276/SX1272 LoRa Transceiver
//!
//! The sx1276-sim crate provides a chip-accurate software model of an
//! SX1276-class LoRa/FSK radio for testing LoRaWAN MAC stacks without
//! hardware. It preserves the state machine, timing characteristics and
//! asynchronous event contract of the real driver while replacing the
//! physical RF layer with programmatic frame injection.
//!
//! ## Features
//!
//! - Full operating-mode state machine (sleep, standby, TX, RX, continuous
//!   RX, CAD) with hard preemption semantics
//! - LoRa and FSK airtime computation driving realistic TX/RX timing
//! - Asynchronous completion events (tx_done, rx_done, timeouts, cad_done,
//!   FHSS hops) delivered through a serialized IRQ dispatch worker
//! - Frame injection in place of an antenna, filtered by frequency,
//!   bandwidth and datarate like a tuned receiver
//! - Synthesized RSSI/SNR with a harness hook for busy-channel scenarios
//! - Carrier sense, CAD, continuous-wave TX and RSSI-based entropy
//! - Support for logging and error handling
//!
//! ## Usage
//!
//! To use the sx1276-sim crate in your Rust project, add the following to
//! your Cargo.toml file:
//!
//! ```toml
//! [dependencies]
//! sx1276-sim = "1.0.0"
//! ```
//!
//! Then, in your Rust code, you can import the necessary modules and
//! functions:
//!
//! ```rust
//! use sx1276_sim::{
//!     Sx1276Radio, RadioEvents, RadioPins, RadioVariant,
//!     Modem, RxConfig, TxConfig, RadioState, init_logger,
//! };
//! ```
//!
//! Construction spawns the timing engine and dispatch worker, so a radio
//! must be built within a tokio runtime.

pub mod error;
pub mod logging;
pub mod radio;

pub use crate::error::RadioSimError;
pub use crate::logging::{init_logger, log_info};

// Core radio types
pub use radio::events::{RadioEvent, RadioEvents};
pub use radio::pins::{PinName, RadioPins};
pub use radio::settings::{
    LoRaBandwidth, Modem, RadioSettings, RadioVariant, RxConfig, SpreadingFactor, TxConfig,
    LORA_MAC_PRIVATE_SYNCWORD, LORA_MAC_PUBLIC_SYNCWORD, MAX_DATA_BUFFER_SIZE,
};
pub use radio::sim::{RadioState, RadioStats, Sx1276Radio};

// Airtime math, usable standalone for duty-cycle budgeting
pub use radio::airtime::{FskAirtime, LoRaAirtime};
