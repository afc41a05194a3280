//! # Event Callback Contract
//!
//! The asynchronous notifications the simulated radio delivers to its owning
//! MAC layer. All callbacks run on the serialized IRQ handler context (see
//! `irq`), never inside the raising context, and never while the radio lock
//! is held, so a handler may safely call back into the radio (the usual MAC
//! pattern of re-arming `receive` from inside `rx_done`).
//!
//! Delivery guarantees, per operation:
//! - exactly one of `tx_done`/`tx_timeout` per `send`;
//! - exactly one of `rx_done`/`rx_timeout`/`rx_error` per single-shot
//!   `receive`; continuous reception may deliver any number of `rx_done`;
//! - `cad_done` once per `start_cad`;
//! - `fhss_change_channel` every hop period while hopping is active.
//!
//! The sink is held weakly: the radio never assumes it outlives the MAC, and
//! a dropped sink silently swallows events. Re-registration is allowed at any
//! time.

use std::sync::{Mutex, Weak};

/// Callbacks consumed by the MAC layer.
///
/// All methods default to no-ops so a consumer only implements the events it
/// cares about. Implementations must be `Send + Sync`: delivery happens from
/// the dispatch worker, not the thread that registered the sink.
pub trait RadioEvents: Send + Sync {
    /// Transmission completed.
    fn tx_done(&self) {}

    /// Transmission watchdog elapsed before completion.
    fn tx_timeout(&self) {}

    /// Frame received, with its synthesized link metrics.
    fn rx_done(&self, _payload: &[u8], _rssi_dbm: i16, _snr_db: i8) {}

    /// Single-shot reception window elapsed without a matching frame.
    fn rx_timeout(&self) {}

    /// Reception failed (oversize frame at the injection boundary).
    fn rx_error(&self) {}

    /// Channel activity detection finished.
    fn cad_done(&self, _channel_activity_detected: bool) {}

    /// Intra-packet frequency hop point reached.
    fn fhss_change_channel(&self, _current_channel: u8) {}
}

/// A single dispatched notification.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    TxDone,
    TxTimeout,
    RxDone {
        payload: Vec<u8>,
        rssi_dbm: i16,
        snr_db: i8,
    },
    RxTimeout,
    RxError,
    CadDone {
        detected: bool,
    },
    FhssChangeChannel {
        channel: u8,
    },
}

/// The registered event target, referenced weakly.
#[derive(Default)]
pub struct EventSink {
    target: Mutex<Option<Weak<dyn RadioEvents>>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or re-registers) the MAC-owned callback target.
    pub fn register(&self, events: &std::sync::Arc<dyn RadioEvents>) {
        *self.target.lock().unwrap() = Some(std::sync::Arc::downgrade(events));
    }

    /// Drops the current registration.
    pub fn clear(&self) {
        *self.target.lock().unwrap() = None;
    }

    /// Delivers one event to the sink, if it is still alive.
    pub fn deliver(&self, event: RadioEvent) {
        let target = self.target.lock().unwrap().clone();
        let Some(events) = target.as_ref().and_then(Weak::upgrade) else {
            log::debug!("event sink gone, dropping {event:?}");
            return;
        };

        match event {
            RadioEvent::TxDone => events.tx_done(),
            RadioEvent::TxTimeout => events.tx_timeout(),
            RadioEvent::RxDone {
                payload,
                rssi_dbm,
                snr_db,
            } => events.rx_done(&payload, rssi_dbm, snr_db),
            RadioEvent::RxTimeout => events.rx_timeout(),
            RadioEvent::RxError => events.rx_error(),
            RadioEvent::CadDone { detected } => events.cad_done(detected),
            RadioEvent::FhssChangeChannel { channel } => events.fhss_change_channel(channel),
        }
    }
}
