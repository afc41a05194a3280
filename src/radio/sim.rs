//! # Simulated SX1276 Radio
//!
//! The radio state machine and the public control surface a LoRaWAN MAC
//! expects from the real driver. Instead of driving SPI registers the
//! simulator tracks the chip's operating mode in software, arms the timing
//! engine for everything that takes time on real silicon (airtime, watchdog
//! timeouts, CAD windows), and accepts frames through [`Sx1276Radio::rx_frame`]
//! in place of an antenna.
//!
//! ## Concurrency model
//!
//! All mutable state lives in [`RadioCore`] behind a mutex. Synchronous API
//! calls lock it briefly; timer expirations and injected frames are raised as
//! IRQ signals and handled one at a time on the dispatch worker, which locks
//! the core, applies the transition, releases the lock and only then delivers
//! the resulting callback. [`Sx1276Radio::lock`] hands the mutex to the MAC
//! so a configure-and-transmit sequence can be bracketed atomically; pending
//! IRQ handling simply blocks until the guard drops.
//!
//! Every state-changing call is non-blocking and reports completion through
//! the [`RadioEvents`] callbacks — except `perform_carrier_sense`, which is
//! the one deliberately synchronous operation and blocks the caller for at
//! most its time budget.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::radio::airtime::{FskAirtime, LoRaAirtime};
use crate::radio::cad::CadParams;
use crate::radio::events::{EventSink, RadioEvent, RadioEvents};
use crate::radio::irq::{self, IrqDispatcher, IrqSignal};
use crate::radio::pins::RadioPins;
use crate::radio::rssi::RssiModel;
use crate::radio::settings::{
    ConfigDirection, LoRaBandwidth, Modem, RadioSettings, RadioVariant, RxConfig, SpreadingFactor,
    TxConfig, MAX_DATA_BUFFER_SIZE,
};
use crate::radio::timer::{TimerEngine, TimerKind};

/// The chip's operating mode.
///
/// Exactly one state is active at a time; transitions happen only through
/// the public operations or through timer/IRQ completion, never implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioState {
    /// Idle, configuration possible.
    Standby,
    /// Lowest power, everything cancelled.
    Sleep,
    /// Frequency synthesis. Transitional on real silicon; the simulator
    /// passes through it instantaneously so it is never observable.
    FreqSynth,
    /// Transmission in flight.
    Tx,
    /// Single-shot reception window.
    Rx,
    /// Continuous reception.
    RxContinuous,
    /// Channel activity detection listen window.
    Cad,
}

/// Packet counters, mostly useful to harnesses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RadioStats {
    pub frames_sent: u32,
    pub frames_received: u32,
    /// Injected frames dropped for tuning mismatch or wrong state.
    pub frames_filtered: u32,
}

/// An accepted frame (or boundary failure) waiting for its DIO0 handler.
#[derive(Debug, Clone, Copy)]
enum PendingRx {
    Frame {
        len: usize,
        rssi_dbm: i16,
        snr_db: i8,
    },
    /// Frame exceeded the payload cap at the injection boundary.
    Oversize,
}

/// The radio's entire mutable state plus its timing/dispatch handles.
///
/// Not constructed directly; obtained through [`Sx1276Radio::lock`], which
/// also brackets it against concurrent IRQ handling.
pub struct RadioCore {
    variant: RadioVariant,
    pins: RadioPins,
    settings: RadioSettings,
    state: RadioState,
    /// Single data buffer shared by the TX and RX paths, as on the chip.
    /// State-machine gating guarantees only one direction owns it at a time.
    buffer: [u8; MAX_DATA_BUFFER_SIZE],
    buffer_len: usize,
    pending_rx: Option<PendingRx>,
    continuous_wave: bool,
    /// Cleared by `random()`, restored by the next configuration call.
    irqs_enabled: bool,
    /// Bumped on every mode change; stale signals carry an older value and
    /// are discarded by the handler.
    generation: u64,
    hop_channel: u8,
    rssi: RssiModel,
    timers: TimerEngine,
    dispatcher: IrqDispatcher,
    stats: RadioStats,
}

impl RadioCore {
    fn new(
        pins: RadioPins,
        variant: RadioVariant,
        rssi: RssiModel,
        timers: TimerEngine,
        dispatcher: IrqDispatcher,
    ) -> Self {
        log::info!("simulated {variant:?} radio ready");
        Self {
            variant,
            pins,
            settings: RadioSettings::default(),
            state: RadioState::Standby,
            buffer: [0; MAX_DATA_BUFFER_SIZE],
            buffer_len: 0,
            pending_rx: None,
            continuous_wave: false,
            irqs_enabled: true,
            generation: 0,
            hop_channel: 0,
            rssi,
            timers,
            dispatcher,
            stats: RadioStats::default(),
        }
    }

    /// Forces the radio back to standby with default configuration, as a
    /// hardware reset pulse would.
    pub fn reset(&mut self) {
        log::info!("radio reset");
        self.preempt(RadioState::Standby);
        self.settings = RadioSettings::default();
        self.buffer_len = 0;
        self.hop_channel = 0;
        self.irqs_enabled = true;
        self.stats = RadioStats::default();
    }

    /// Powers down the simulated RF front end. Any in-flight operation is
    /// abandoned silently.
    pub fn sleep(&mut self) {
        self.pins.drive(self.pins.txctl, false, "txctl");
        self.pins.drive(self.pins.rxctl, false, "rxctl");
        self.pins.drive(self.pins.pwr_amp_ctl, false, "pwr_amp_ctl");
        self.preempt(RadioState::Sleep);
    }

    /// Returns to standby from any state.
    ///
    /// This is a hard preemption: if a TX or RX is in flight, it is
    /// abandoned and its completion callback is never issued, matching an
    /// abrupt hardware mode write.
    pub fn standby(&mut self) {
        self.preempt(RadioState::Standby);
    }

    /// Sets the carrier frequency in Hz.
    pub fn set_channel(&mut self, freq_hz: u32) {
        log::debug!("channel set to {freq_hz} Hz");
        self.settings.channel = freq_hz;
    }

    /// Stores the reception parameters.
    ///
    /// Out-of-range fields are clamped (see `settings`); calling while an
    /// operation is in flight is rejected as a no-op and the prior valid
    /// configuration is preserved.
    pub fn set_rx_config(&mut self, modem: Modem, config: RxConfig) {
        if self.operation_in_flight() {
            log::warn!("set_rx_config ignored in state {:?}", self.state);
            return;
        }
        self.settings.apply_rx_config(modem, config);
        self.irqs_enabled = true;
    }

    /// Stores the transmission parameters. Same clamping and in-flight
    /// rejection rules as [`Self::set_rx_config`].
    pub fn set_tx_config(&mut self, modem: Modem, config: TxConfig) {
        if self.operation_in_flight() {
            log::warn!("set_tx_config ignored in state {:?}", self.state);
            return;
        }
        self.settings.apply_tx_config(modem, config);
        self.irqs_enabled = true;
    }

    /// Starts a transmission.
    ///
    /// The payload is copied into the shared data buffer and the radio moves
    /// to TX; completion arrives later as exactly one of `tx_done` (after
    /// the computed airtime) or `tx_timeout` (after the configured
    /// watchdog). An oversize payload or a busy radio clamps the call to a
    /// no-op.
    pub fn send(&mut self, payload: &[u8]) {
        let max = usize::from(self.settings.max_payload(self.settings.modem));
        if payload.len() > max || payload.len() > MAX_DATA_BUFFER_SIZE {
            log::warn!(
                "send of {} bytes exceeds max payload {max}, ignored",
                payload.len()
            );
            return;
        }
        if self.state != RadioState::Standby {
            log::warn!("send ignored in state {:?}", self.state);
            return;
        }

        self.buffer[..payload.len()].copy_from_slice(payload);
        self.buffer_len = payload.len();
        self.enter(RadioState::Tx);

        let airtime = Duration::from_micros(u64::from(self.tx_airtime_us(payload.len() as u8)));
        let watchdog = Duration::from_millis(u64::from(self.settings.tx.tx_timeout_ms));
        self.arm(TimerKind::TxDone, airtime);
        self.arm(TimerKind::TxTimeout, watchdog);
        self.arm_hop_timer();

        self.pins.drive(self.pins.txctl, true, "txctl");
        self.pins.drive(self.pins.pwr_amp_ctl, true, "pwr_amp_ctl");
        log::info!(
            "tx started: {} bytes, airtime {airtime:?}",
            payload.len()
        );
    }

    /// Opens a reception window.
    ///
    /// `timeout_ms == 0` enters continuous reception (the documented
    /// equivalence with a continuous RX configuration); otherwise the window
    /// closes with `rx_timeout` unless a matching frame arrives first.
    pub fn receive(&mut self, timeout_ms: u32) {
        if self.state != RadioState::Standby {
            log::warn!("receive ignored in state {:?}", self.state);
            return;
        }

        self.pending_rx = None;
        self.buffer_len = 0;
        let continuous = timeout_ms == 0 || self.settings.rx.rx_continuous;
        self.enter(if continuous {
            RadioState::RxContinuous
        } else {
            RadioState::Rx
        });

        if !continuous {
            self.arm(
                TimerKind::RxTimeout,
                Duration::from_millis(u64::from(timeout_ms)),
            );
            if self.settings.modem == Modem::Fsk {
                // Sync-word acquisition window: symb_timeout is in bytes for FSK
                let us = u64::from(self.settings.rx.symb_timeout) * 8 * 1_000_000
                    / u64::from(self.settings.rx.datarate.max(600));
                self.arm(TimerKind::SyncTimeout, Duration::from_micros(us));
            }
        }
        self.arm_hop_timer();

        self.pins.drive(self.pins.rxctl, true, "rxctl");
        log::debug!(
            "rx started, {}",
            if continuous {
                "continuous".to_string()
            } else {
                format!("{timeout_ms} ms window")
            }
        );
    }

    /// Starts a channel activity detection cycle.
    ///
    /// After the simulated listen window (derived from the current SF/BW)
    /// the radio returns to standby and reports `cad_done` with the
    /// synthesized detection result.
    pub fn start_cad(&mut self) {
        if self.state != RadioState::Standby {
            log::warn!("start_cad ignored in state {:?}", self.state);
            return;
        }
        let sf = self.settings.rx_spreading_factor();
        let bw = self.settings.rx_lora_bandwidth();
        let window = CadParams::optimal(sf, bw).duration_ms(sf, bw);
        self.enter(RadioState::Cad);
        self.arm(TimerKind::CadDone, Duration::from_millis(u64::from(window)));
        log::debug!("cad started, {window} ms window at {sf:?}/{bw:?}");
    }

    /// Transmits an unmodulated carrier for `time_s` seconds.
    ///
    /// No payload is sent and no completion callback is issued; an internal
    /// timer returns the radio to standby when the window closes.
    pub fn set_tx_continuous_wave(&mut self, freq_hz: u32, power_dbm: i8, time_s: u16) {
        self.preempt(RadioState::Standby);
        self.settings.channel = freq_hz;
        self.settings.tx.power = power_dbm.clamp(-4, 20);
        self.enter(RadioState::Tx);
        self.continuous_wave = true;
        self.arm(TimerKind::TxTimeout, Duration::from_secs(u64::from(time_s)));
        log::info!("continuous wave on {freq_hz} Hz for {time_s} s");
    }

    /// Current operating mode. Pure read, no side effects.
    pub fn status(&self) -> RadioState {
        self.state
    }

    /// Packet airtime in microseconds for `pkt_len` bytes under the current
    /// settings.
    ///
    /// Defined only after `set_rx_config` or `set_tx_config` has run; the
    /// most recently configured direction supplies the parameters. Queried
    /// before any configuration it warns and returns 0.
    pub fn time_on_air(&self, modem: Modem, pkt_len: u8) -> u32 {
        let Some(direction) = self.settings.last_configured else {
            log::warn!("time_on_air queried before configuration");
            return 0;
        };
        match (modem, direction) {
            (Modem::LoRa, ConfigDirection::Tx) => self.lora_airtime_tx(pkt_len).microseconds(),
            (Modem::LoRa, ConfigDirection::Rx) => self.lora_airtime_rx(pkt_len).microseconds(),
            (Modem::Fsk, ConfigDirection::Tx) => FskAirtime {
                datarate: self.settings.tx.datarate.max(600),
                preamble_len: self.settings.tx.preamble_len,
                fix_len: self.settings.tx.fix_len,
                payload_len: pkt_len,
                crc_on: self.settings.tx.crc_on,
            }
            .microseconds(),
            (Modem::Fsk, ConfigDirection::Rx) => FskAirtime {
                datarate: self.settings.rx.datarate.max(600),
                preamble_len: self.settings.rx.preamble_len,
                fix_len: self.settings.rx.fix_len,
                payload_len: pkt_len,
                crc_on: self.settings.rx.crc_on,
            }
            .microseconds(),
        }
    }

    /// Sets the per-modem maximum payload length.
    pub fn set_max_payload_length(&mut self, modem: Modem, max: u8) {
        self.settings.set_max_payload(modem, max);
    }

    /// Switches the LoRa sync word between the public and private network
    /// constants.
    pub fn set_public_network(&mut self, enable: bool) {
        self.settings.set_public_network(enable);
    }

    /// Range validation against the variant's supported bands.
    pub fn check_rf_frequency(&self, freq_hz: u32) -> bool {
        self.variant.supports_frequency(freq_hz)
    }

    /// A 32-bit value derived from synthesized wideband RSSI noise.
    ///
    /// Forces the modem to LoRa and disables completion interrupts; the
    /// radio is left in a non-operational intermediate state by design and
    /// the caller must run `set_rx_config` or `set_tx_config` before the
    /// next TX/RX operation.
    pub fn random(&mut self) -> u32 {
        self.preempt(RadioState::Standby);
        self.settings.modem = Modem::LoRa;
        self.settings.rx_configured = false;
        self.settings.tx_configured = false;
        self.settings.last_configured = None;
        self.irqs_enabled = false;
        let word = self.rssi.entropy_word();
        log::debug!("entropy word drawn from rssi noise");
        word
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> &RadioSettings {
        &self.settings
    }

    /// Packet counters.
    pub fn stats(&self) -> RadioStats {
        self.stats
    }

    /// Harness hook: overrides the ambient channel level seen by carrier
    /// sense and CAD. `None` restores the idle noise floor.
    pub fn set_ambient_rssi(&mut self, dbm: Option<i16>) {
        self.rssi.set_ambient(dbm);
    }

    // ---- frame injection ----

    pub(crate) fn accept_frame(&mut self, frame: &[u8], freq: u32, bandwidth: u32, datarate: u32) {
        if !matches!(self.state, RadioState::Rx | RadioState::RxContinuous) {
            log::debug!("injected frame ignored, radio not listening");
            self.stats.frames_filtered += 1;
            return;
        }
        if freq != self.settings.channel
            || bandwidth != self.settings.rx.bandwidth
            || datarate != self.settings.rx.datarate
        {
            // A tuned receiver simply never sees foreign signals
            log::debug!(
                "injected frame filtered: {freq} Hz bw {bandwidth} dr {datarate} vs tuned {} Hz bw {} dr {}",
                self.settings.channel,
                self.settings.rx.bandwidth,
                self.settings.rx.datarate
            );
            self.stats.frames_filtered += 1;
            return;
        }
        if self.pending_rx.is_some() {
            log::warn!("previous frame still pending, injected frame dropped");
            self.stats.frames_filtered += 1;
            return;
        }

        let _ = self.timers.cancel(TimerKind::RxTimeout);
        let _ = self.timers.cancel(TimerKind::SyncTimeout);

        let max = usize::from(self.settings.max_payload(self.settings.modem));
        if frame.len() > max || frame.len() > MAX_DATA_BUFFER_SIZE {
            log::warn!("injected frame of {} bytes exceeds max payload {max}", frame.len());
            self.pending_rx = Some(PendingRx::Oversize);
        } else {
            self.buffer[..frame.len()].copy_from_slice(frame);
            self.buffer_len = frame.len();
            let (rssi_dbm, snr_db) = self.rssi.frame_metrics();
            self.pending_rx = Some(PendingRx::Frame {
                len: frame.len(),
                rssi_dbm,
                snr_db,
            });
        }

        let generation = self.generation;
        if let Err(err) = self.dispatcher.raise(IrqSignal::Dio0 { generation }) {
            log::error!("frame delivery lost: {err}");
        }
    }

    pub(crate) fn sample_rssi_dbm(&mut self) -> i16 {
        self.rssi.sample_dbm()
    }

    /// Selects the modem and channel ahead of a carrier sense poll, as the
    /// hardware sequence does before listening.
    pub(crate) fn prepare_carrier_sense(&mut self, modem: Modem, freq_hz: u32) {
        if self.operation_in_flight() {
            log::warn!("carrier sense tuning skipped in state {:?}", self.state);
            return;
        }
        self.settings.modem = modem;
        self.settings.channel = freq_hz;
    }

    // ---- serialized IRQ handling ----

    pub(crate) fn handle_signal(&mut self, signal: IrqSignal) -> Option<RadioEvent> {
        if !self.irqs_enabled {
            log::debug!("irqs disabled, signal {signal:?} dropped");
            return None;
        }
        match signal {
            IrqSignal::Dio0 { generation } => self.handle_dio0(generation),
            IrqSignal::Dio1 { generation } => self.handle_sync_timeout(generation),
            IrqSignal::Dio2 { generation } => self.handle_hop(generation),
            IrqSignal::Dio3 { generation } => self.handle_cad_done(generation),
            IrqSignal::Timeout { generation } => self.handle_timeout(generation),
            // CAD-detected and mode-ready lines: no modeled behavior, like
            // the reference driver's empty handlers
            IrqSignal::Dio4 { .. } | IrqSignal::Dio5 { .. } => None,
        }
    }

    /// DIO0: TX done while transmitting, RX done while listening.
    fn handle_dio0(&mut self, generation: u64) -> Option<RadioEvent> {
        match self.state {
            RadioState::Tx => {
                if generation != self.generation || self.continuous_wave {
                    return None;
                }
                let _ = self.timers.cancel(TimerKind::TxTimeout);
                let _ = self.timers.cancel(TimerKind::FhssHop);
                self.finish_operation();
                self.pins.drive(self.pins.txctl, false, "txctl");
                self.stats.frames_sent += 1;
                Some(RadioEvent::TxDone)
            }
            RadioState::Rx | RadioState::RxContinuous => {
                let pending = self.pending_rx.take()?;
                if self.state == RadioState::Rx {
                    self.finish_operation();
                }
                match pending {
                    PendingRx::Frame {
                        len,
                        rssi_dbm,
                        snr_db,
                    } => {
                        self.stats.frames_received += 1;
                        Some(RadioEvent::RxDone {
                            payload: self.buffer[..len].to_vec(),
                            rssi_dbm,
                            snr_db,
                        })
                    }
                    PendingRx::Oversize => Some(RadioEvent::RxError),
                }
            }
            _ => None,
        }
    }

    /// Timeout line: TX watchdog or single-shot RX window.
    fn handle_timeout(&mut self, generation: u64) -> Option<RadioEvent> {
        if generation != self.generation {
            return None;
        }
        match self.state {
            RadioState::Tx => {
                let was_cw = self.continuous_wave;
                let _ = self.timers.cancel(TimerKind::TxDone);
                let _ = self.timers.cancel(TimerKind::FhssHop);
                self.finish_operation();
                self.pins.drive(self.pins.txctl, false, "txctl");
                if was_cw {
                    log::debug!("continuous wave window closed");
                    None
                } else {
                    Some(RadioEvent::TxTimeout)
                }
            }
            RadioState::Rx => {
                self.finish_operation();
                Some(RadioEvent::RxTimeout)
            }
            _ => None,
        }
    }

    /// DIO1: FSK sync-word window elapsed without acquisition.
    fn handle_sync_timeout(&mut self, generation: u64) -> Option<RadioEvent> {
        if generation != self.generation || self.state != RadioState::Rx {
            return None;
        }
        let _ = self.timers.cancel(TimerKind::RxTimeout);
        self.finish_operation();
        Some(RadioEvent::RxTimeout)
    }

    /// DIO2: intra-packet frequency hop point.
    fn handle_hop(&mut self, generation: u64) -> Option<RadioEvent> {
        if generation != self.generation {
            return None;
        }
        if !matches!(
            self.state,
            RadioState::Tx | RadioState::Rx | RadioState::RxContinuous
        ) {
            return None;
        }
        self.hop_channel = self.hop_channel.wrapping_add(1);
        self.arm_hop_timer();
        Some(RadioEvent::FhssChangeChannel {
            channel: self.hop_channel,
        })
    }

    /// DIO3: CAD window elapsed; synthesize the detection result.
    fn handle_cad_done(&mut self, generation: u64) -> Option<RadioEvent> {
        if generation != self.generation || self.state != RadioState::Cad {
            return None;
        }
        self.finish_operation();
        let detected = self.rssi.channel_active();
        Some(RadioEvent::CadDone { detected })
    }

    // ---- internals ----

    fn operation_in_flight(&self) -> bool {
        matches!(
            self.state,
            RadioState::Tx | RadioState::Rx | RadioState::RxContinuous | RadioState::Cad
        )
    }

    /// Moves to a new state as part of starting an operation.
    fn enter(&mut self, state: RadioState) {
        log::debug!("state {:?} -> {state:?}", self.state);
        self.state = state;
        self.generation += 1;
    }

    /// Completes the current operation and returns to standby.
    fn finish_operation(&mut self) {
        log::debug!("state {:?} -> Standby (operation complete)", self.state);
        self.state = RadioState::Standby;
        self.continuous_wave = false;
        self.generation += 1;
    }

    /// Hard preemption: cancel everything outstanding and jump to `state`.
    /// In-flight completions become stale and are never reported.
    fn preempt(&mut self, state: RadioState) {
        if let Err(err) = self.timers.cancel_all() {
            log::error!("timer cancellation failed: {err}");
        }
        self.pending_rx = None;
        self.continuous_wave = false;
        log::debug!("state {:?} -> {state:?} (preempted)", self.state);
        self.state = state;
        self.generation += 1;
    }

    fn arm(&mut self, kind: TimerKind, delay: Duration) {
        if let Err(err) = self.timers.schedule(kind, delay, self.generation) {
            log::error!("failed to arm {kind:?}: {err}");
        }
    }

    /// Arms the FHSS hop timer if hopping is enabled for the active
    /// direction (LoRa only).
    fn arm_hop_timer(&mut self) {
        let (hop_on, period) = match self.state {
            RadioState::Tx => (self.settings.tx.freq_hop_on, self.settings.tx.hop_period),
            RadioState::Rx | RadioState::RxContinuous => {
                (self.settings.rx.freq_hop_on, self.settings.rx.hop_period)
            }
            _ => return,
        };
        if self.settings.modem != Modem::LoRa || !hop_on || period == 0 {
            return;
        }
        let symbol_time = match self.state {
            RadioState::Tx => self.lora_airtime_tx(0).symbol_time_s(),
            _ => LoRaAirtime {
                bandwidth: self.settings.rx_lora_bandwidth(),
                spreading_factor: self.settings.rx_spreading_factor(),
                coderate: self.settings.rx.coderate.max(1),
                preamble_len: self.settings.rx.preamble_len,
                implicit_header: self.settings.rx.fix_len,
                payload_len: 0,
                crc_on: self.settings.rx.crc_on,
            }
            .symbol_time_s(),
        };
        let delay = Duration::from_secs_f64(symbol_time * f64::from(period));
        self.arm(TimerKind::FhssHop, delay);
    }

    fn lora_airtime_tx(&self, pkt_len: u8) -> LoRaAirtime {
        LoRaAirtime {
            bandwidth: LoRaBandwidth::from_index(self.settings.tx.bandwidth),
            spreading_factor: SpreadingFactor::from_datarate(self.settings.tx.datarate),
            coderate: self.settings.tx.coderate.max(1),
            preamble_len: self.settings.tx.preamble_len,
            implicit_header: self.settings.tx.fix_len,
            payload_len: pkt_len,
            crc_on: self.settings.tx.crc_on,
        }
    }

    fn lora_airtime_rx(&self, pkt_len: u8) -> LoRaAirtime {
        LoRaAirtime {
            bandwidth: self.settings.rx_lora_bandwidth(),
            spreading_factor: self.settings.rx_spreading_factor(),
            coderate: self.settings.rx.coderate.max(1),
            preamble_len: self.settings.rx.preamble_len,
            implicit_header: self.settings.rx.fix_len,
            payload_len: pkt_len,
            crc_on: self.settings.rx.crc_on,
        }
    }

    fn tx_airtime_us(&self, pkt_len: u8) -> u32 {
        match self.settings.modem {
            Modem::LoRa => self.lora_airtime_tx(pkt_len).microseconds(),
            Modem::Fsk => FskAirtime {
                datarate: self.settings.tx.datarate.max(600),
                preamble_len: self.settings.tx.preamble_len,
                fix_len: self.settings.tx.fix_len,
                payload_len: pkt_len,
                crc_on: self.settings.tx.crc_on,
            }
            .microseconds(),
        }
    }
}

struct Shared {
    core: Mutex<RadioCore>,
    sink: EventSink,
}

/// Exclusive access guard over the radio.
///
/// While held, IRQ handling is deferred: timer expirations and injected
/// frames queue up and are processed only after the guard drops, so a MAC
/// can bracket a configuration + send/receive sequence atomically.
pub struct RadioGuard<'a> {
    core: MutexGuard<'a, RadioCore>,
}

impl Deref for RadioGuard<'_> {
    type Target = RadioCore;

    fn deref(&self) -> &RadioCore {
        &self.core
    }
}

impl DerefMut for RadioGuard<'_> {
    fn deref_mut(&mut self) -> &mut RadioCore {
        &mut self.core
    }
}

/// Handle to a simulated SX1276-class radio.
///
/// Cloning shares the same radio. Construction spawns the timing engine and
/// IRQ dispatch worker, so it must happen within a tokio runtime. All
/// state-changing calls return immediately; completion is reported through
/// the registered [`RadioEvents`] callbacks, always from the serialized
/// dispatch context.
#[derive(Clone)]
pub struct Sx1276Radio {
    shared: Arc<Shared>,
}

impl Sx1276Radio {
    /// Builds a radio with OS-entropy noise seeding.
    pub fn new(pins: RadioPins, variant: RadioVariant) -> Self {
        Self::build(pins, variant, RssiModel::from_entropy())
    }

    /// Builds a radio with a fixed noise seed, for reproducible harness runs.
    pub fn with_seed(pins: RadioPins, variant: RadioVariant, seed: u64) -> Self {
        Self::build(pins, variant, RssiModel::with_seed(seed))
    }

    fn build(pins: RadioPins, variant: RadioVariant, rssi: RssiModel) -> Self {
        let (dispatcher, receiver) = IrqDispatcher::channel();

        // Timer expirations re-enter through the same dispatch queue as any
        // other interrupt source, mapped onto the chip's DIO lines.
        let raiser = dispatcher.clone();
        let timers = TimerEngine::spawn(move |fired| {
            let generation = fired.generation;
            let signal = match fired.kind {
                TimerKind::TxDone => IrqSignal::Dio0 { generation },
                TimerKind::SyncTimeout => IrqSignal::Dio1 { generation },
                TimerKind::FhssHop => IrqSignal::Dio2 { generation },
                TimerKind::CadDone => IrqSignal::Dio3 { generation },
                TimerKind::TxTimeout | TimerKind::RxTimeout => IrqSignal::Timeout { generation },
            };
            if let Err(err) = raiser.raise(signal) {
                log::error!("timer expiry lost: {err}");
            }
        });

        let core = RadioCore::new(pins, variant, rssi, timers, dispatcher);
        let shared = Arc::new(Shared {
            core: Mutex::new(core),
            sink: EventSink::new(),
        });

        // The worker holds the shared state weakly so dropping the last
        // radio handle tears the tasks down instead of leaking a cycle.
        let weak = Arc::downgrade(&shared);
        irq::spawn_worker(receiver, move |signal| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let event = shared.core.lock().unwrap().handle_signal(signal);
            // Callback delivery happens outside the core lock so a handler
            // may re-enter the radio (e.g. re-arm receive from rx_done)
            if let Some(event) = event {
                shared.sink.deliver(event);
            }
        });

        Self { shared }
    }

    /// Registers the MAC-owned event callbacks. May be called again at any
    /// time to re-register.
    pub fn init_radio(&self, events: &Arc<dyn RadioEvents>) {
        self.shared.sink.register(events);
    }

    /// Acquires exclusive access to the radio.
    ///
    /// IRQ handling is deferred for as long as the guard lives.
    pub fn lock(&self) -> RadioGuard<'_> {
        RadioGuard {
            core: self.shared.core.lock().unwrap(),
        }
    }

    /// Delivers an "over-the-air" frame to the simulated receiver.
    ///
    /// Safe to call from any thread. The frame is accepted only while the
    /// radio is listening and only if `freq`/`bandwidth`/`datarate` match
    /// the current RX configuration; mismatches are dropped silently, like a
    /// tuned receiver ignoring foreign signals.
    pub fn rx_frame(&self, frame: &[u8], freq: u32, bandwidth: u32, datarate: u32) {
        self.lock().accept_frame(frame, freq, bandwidth, datarate);
    }

    /// Polls synthesized RSSI against `rssi_threshold_dbm` for up to
    /// `max_carrier_sense_time_ms`.
    ///
    /// Returns `true` (channel free) if no sample exceeds the threshold
    /// within the budget, `false` as soon as one does. This is the single
    /// blocking operation in the API; every other RF operation returns
    /// immediately and completes through the event callbacks.
    pub fn perform_carrier_sense(
        &self,
        modem: Modem,
        freq: u32,
        rssi_threshold_dbm: i16,
        max_carrier_sense_time_ms: u32,
    ) -> bool {
        self.lock().prepare_carrier_sense(modem, freq);
        let budget = Duration::from_millis(u64::from(max_carrier_sense_time_ms));
        let start = Instant::now();
        loop {
            let sample = self.lock().sample_rssi_dbm();
            if sample >= rssi_threshold_dbm {
                log::debug!("carrier sense: channel busy at {sample} dBm");
                return false;
            }
            if start.elapsed() >= budget {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    // Convenience forwarders; each locks the core for the duration of the
    // single call. Use `lock()` to bracket sequences atomically.

    pub fn reset(&self) {
        self.lock().reset();
    }

    pub fn sleep(&self) {
        self.lock().sleep();
    }

    pub fn standby(&self) {
        self.lock().standby();
    }

    pub fn set_channel(&self, freq_hz: u32) {
        self.lock().set_channel(freq_hz);
    }

    pub fn set_rx_config(&self, modem: Modem, config: RxConfig) {
        self.lock().set_rx_config(modem, config);
    }

    pub fn set_tx_config(&self, modem: Modem, config: TxConfig) {
        self.lock().set_tx_config(modem, config);
    }

    pub fn send(&self, payload: &[u8]) {
        self.lock().send(payload);
    }

    pub fn receive(&self, timeout_ms: u32) {
        self.lock().receive(timeout_ms);
    }

    pub fn start_cad(&self) {
        self.lock().start_cad();
    }

    pub fn set_tx_continuous_wave(&self, freq_hz: u32, power_dbm: i8, time_s: u16) {
        self.lock().set_tx_continuous_wave(freq_hz, power_dbm, time_s);
    }

    pub fn get_status(&self) -> RadioState {
        self.lock().status()
    }

    pub fn time_on_air(&self, modem: Modem, pkt_len: u8) -> u32 {
        self.lock().time_on_air(modem, pkt_len)
    }

    pub fn set_max_payload_length(&self, modem: Modem, max: u8) {
        self.lock().set_max_payload_length(modem, max);
    }

    pub fn set_public_network(&self, enable: bool) {
        self.lock().set_public_network(enable);
    }

    pub fn check_rf_frequency(&self, freq_hz: u32) -> bool {
        self.lock().check_rf_frequency(freq_hz)
    }

    pub fn random(&self) -> u32 {
        self.lock().random()
    }

    pub fn get_stats(&self) -> RadioStats {
        self.lock().stats()
    }

    /// Harness hook: simulate a foreign carrier occupying the channel.
    pub fn set_ambient_rssi(&self, dbm: Option<i16>) {
        self.lock().set_ambient_rssi(dbm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::settings::MAX_DATA_BUFFER_SIZE;

    fn radio() -> Sx1276Radio {
        Sx1276Radio::with_seed(RadioPins::disconnected(), RadioVariant::Sx1276, 1)
    }

    fn lora_rx_config() -> RxConfig {
        RxConfig {
            bandwidth: 0,
            datarate: 7,
            ..RxConfig::default()
        }
    }

    #[tokio::test]
    async fn test_send_enters_tx_state() {
        let radio = radio();
        radio.set_tx_config(Modem::LoRa, TxConfig::default());
        radio.send(b"hello");
        assert_eq!(radio.get_status(), RadioState::Tx);
    }

    #[tokio::test]
    async fn test_send_oversize_is_noop() {
        let radio = radio();
        radio.set_tx_config(Modem::LoRa, TxConfig::default());
        radio.set_max_payload_length(Modem::LoRa, 16);
        radio.send(&[0u8; 32]);
        assert_eq!(radio.get_status(), RadioState::Standby);
    }

    #[tokio::test]
    async fn test_receive_zero_is_continuous() {
        let radio = radio();
        radio.set_rx_config(Modem::LoRa, lora_rx_config());
        radio.receive(0);
        assert_eq!(radio.get_status(), RadioState::RxContinuous);
    }

    #[tokio::test]
    async fn test_reconfiguration_rejected_in_flight() {
        let radio = radio();
        radio.set_rx_config(Modem::LoRa, lora_rx_config());
        radio.receive(1_000);
        assert_eq!(radio.get_status(), RadioState::Rx);

        // Rejected: prior configuration must survive unchanged
        radio.set_rx_config(
            Modem::LoRa,
            RxConfig {
                datarate: 12,
                ..lora_rx_config()
            },
        );
        assert_eq!(radio.lock().settings().rx.datarate, 7);
    }

    #[tokio::test]
    async fn test_standby_preempts_receive() {
        let radio = radio();
        radio.set_rx_config(Modem::LoRa, lora_rx_config());
        radio.receive(5_000);
        radio.standby();
        assert_eq!(radio.get_status(), RadioState::Standby);
    }

    #[tokio::test]
    async fn test_sleep_and_wake() {
        let radio = radio();
        radio.sleep();
        assert_eq!(radio.get_status(), RadioState::Sleep);
        radio.standby();
        assert_eq!(radio.get_status(), RadioState::Standby);
    }

    #[tokio::test]
    async fn test_random_leaves_radio_unconfigured() {
        let radio = radio();
        radio.set_rx_config(Modem::Fsk, RxConfig::default());
        let _ = radio.random();
        let guard = radio.lock();
        assert_eq!(guard.settings().modem, Modem::LoRa);
        assert!(!guard.settings().rx_configured);
        assert!(guard.settings().last_configured.is_none());
    }

    #[tokio::test]
    async fn test_random_values_differ() {
        let radio = radio();
        let a = radio.random();
        let b = radio.random();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_check_rf_frequency_uses_variant_bands() {
        let radio = radio();
        assert!(radio.check_rf_frequency(868_100_000));
        assert!(!radio.check_rf_frequency(2_400_000_000));

        let sx1272 =
            Sx1276Radio::with_seed(RadioPins::disconnected(), RadioVariant::Sx1272, 1);
        assert!(!sx1272.check_rf_frequency(433_000_000));
    }

    #[tokio::test]
    async fn test_time_on_air_unconfigured_returns_zero() {
        let radio = radio();
        assert_eq!(radio.time_on_air(Modem::LoRa, 32), 0);
        radio.set_tx_config(Modem::LoRa, TxConfig::default());
        assert!(radio.time_on_air(Modem::LoRa, 32) > 0);
    }

    #[tokio::test]
    async fn test_buffer_capacity_bound() {
        let radio = radio();
        radio.set_tx_config(Modem::LoRa, TxConfig::default());
        radio.send(&[0u8; MAX_DATA_BUFFER_SIZE + 1][..]);
        assert_eq!(radio.get_status(), RadioState::Standby);
    }

    #[tokio::test]
    async fn test_lock_brackets_configuration() {
        let radio = radio();
        {
            let mut guard = radio.lock();
            guard.set_channel(868_300_000);
            guard.set_rx_config(Modem::LoRa, lora_rx_config());
            guard.receive(0);
        }
        assert_eq!(radio.get_status(), RadioState::RxContinuous);
    }
}
