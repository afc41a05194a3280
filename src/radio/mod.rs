//! Simulated SX1276/SX1272 transceiver.

pub mod airtime;
pub mod cad;
pub mod events;
pub mod irq;
pub mod pins;
pub mod rssi;
pub mod settings;
pub mod sim;
pub mod timer;

pub use events::{RadioEvent, RadioEvents};
pub use pins::{PinName, RadioPins};
pub use settings::{
    LoRaBandwidth, Modem, RadioSettings, RadioVariant, RxConfig, SpreadingFactor, TxConfig,
};
pub use sim::{RadioState, RadioStats, Sx1276Radio};
