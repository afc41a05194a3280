//! End-to-end behavior tests for the simulated radio: full send/receive
//! cycles, timeout delivery, preemption, frame filtering, CAD and carrier
//! sense, driven through the public API exactly as a MAC layer would.
//!
//! Most tests run on a paused tokio clock so airtime-scale waits complete
//! instantly and deterministically; carrier sense tests use real time since
//! that operation blocks the calling thread.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sx1276_sim::{
    Modem, RadioEvents, RadioPins, RadioState, RadioVariant, RxConfig, Sx1276Radio, TxConfig,
};

const CHANNEL_HZ: u32 = 868_000_000;
const LORA_BW_125: u32 = 0;
const LORA_SF7: u32 = 7;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    TxDone,
    TxTimeout,
    RxDone(Vec<u8>, i16, i8),
    RxTimeout,
    RxError,
    CadDone(bool),
    FhssChangeChannel(u8),
}

/// Records every callback in delivery order.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl RadioEvents for Recorder {
    fn tx_done(&self) {
        self.push(Event::TxDone);
    }

    fn tx_timeout(&self) {
        self.push(Event::TxTimeout);
    }

    fn rx_done(&self, payload: &[u8], rssi_dbm: i16, snr_db: i8) {
        self.push(Event::RxDone(payload.to_vec(), rssi_dbm, snr_db));
    }

    fn rx_timeout(&self) {
        self.push(Event::RxTimeout);
    }

    fn rx_error(&self) {
        self.push(Event::RxError);
    }

    fn cad_done(&self, channel_activity_detected: bool) {
        self.push(Event::CadDone(channel_activity_detected));
    }

    fn fhss_change_channel(&self, current_channel: u8) {
        self.push(Event::FhssChangeChannel(current_channel));
    }
}

fn radio_with_recorder() -> (Sx1276Radio, Arc<Recorder>, Arc<dyn RadioEvents>) {
    let radio = Sx1276Radio::with_seed(RadioPins::disconnected(), RadioVariant::Sx1276, 7);
    let recorder = Arc::new(Recorder::default());
    let events: Arc<dyn RadioEvents> = recorder.clone();
    radio.init_radio(&events);
    (radio, recorder, events)
}

fn lora_rx_config() -> RxConfig {
    RxConfig {
        bandwidth: LORA_BW_125,
        datarate: LORA_SF7,
        ..RxConfig::default()
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_send_completes_with_single_tx_done() {
    let (radio, recorder, _events) = radio_with_recorder();
    radio.set_tx_config(Modem::LoRa, TxConfig::default());

    radio.send(b"hello lorawan");
    assert_eq!(radio.get_status(), RadioState::Tx);

    // SF7/BW125 airtime for this payload is well under 100 ms
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(recorder.take(), vec![Event::TxDone]);
    assert_eq!(radio.get_status(), RadioState::Standby);
    assert_eq!(radio.get_stats().frames_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn test_tx_watchdog_fires_when_airtime_exceeds_timeout() {
    let (radio, recorder, _events) = radio_with_recorder();
    // SF12 with a 200-byte payload is airborne for seconds; a 50 ms
    // watchdog must win and tx_done must never arrive.
    radio.set_tx_config(
        Modem::LoRa,
        TxConfig {
            datarate: 12,
            tx_timeout_ms: 50,
            ..TxConfig::default()
        },
    );

    radio.send(&[0xAB; 200]);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(recorder.take(), vec![Event::TxTimeout]);
    assert_eq!(radio.get_status(), RadioState::Standby);
    assert_eq!(radio.get_stats().frames_sent, 0);
}

#[tokio::test(start_paused = true)]
async fn test_standby_preempts_send_without_callbacks() {
    let (radio, recorder, _events) = radio_with_recorder();
    radio.set_tx_config(Modem::LoRa, TxConfig::default());

    radio.send(b"abandoned");
    radio.standby();
    assert_eq!(radio.get_status(), RadioState::Standby);

    // Well past both the airtime and the watchdog: the preempted
    // operation must stay silent.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(recorder.take(), vec![]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_rx_window_times_out_once() {
    let (radio, recorder, _events) = radio_with_recorder();
    radio.set_rx_config(Modem::LoRa, lora_rx_config());

    radio.receive(50);
    assert_eq!(radio.get_status(), RadioState::Rx);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(recorder.take(), vec![Event::RxTimeout]);
    assert_eq!(radio.get_status(), RadioState::Standby);
}

#[tokio::test(start_paused = true)]
async fn test_matching_frame_delivers_payload_unchanged() {
    let (radio, recorder, _events) = radio_with_recorder();
    radio.set_rx_config(Modem::LoRa, lora_rx_config());
    radio.receive(1_000);

    let payload = b"\x40\x01\x02\x03\x04 join-accept";
    radio.rx_frame(payload, CHANNEL_HZ, LORA_BW_125, LORA_SF7);
    settle().await;

    let events = recorder.take();
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::RxDone(received, rssi_dbm, snr_db) => {
            assert_eq!(received.as_slice(), payload);
            assert!((-90..=-30).contains(rssi_dbm));
            assert!((-20..=10).contains(&i16::from(*snr_db)));
        }
        other => panic!("expected rx_done, got {other:?}"),
    }

    // Single-shot window closed by the frame, not by its timer.
    assert_eq!(radio.get_status(), RadioState::Standby);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(recorder.take(), vec![]);
    assert_eq!(radio.get_stats().frames_received, 1);
}

#[tokio::test(start_paused = true)]
async fn test_mismatched_frames_are_filtered() {
    let (radio, recorder, _events) = radio_with_recorder();
    radio.set_rx_config(Modem::LoRa, lora_rx_config());
    radio.receive(1_000);

    // Wrong frequency, wrong bandwidth, wrong datarate: all invisible.
    radio.rx_frame(b"foreign", 915_000_000, LORA_BW_125, LORA_SF7);
    radio.rx_frame(b"foreign", CHANNEL_HZ, 2, LORA_SF7);
    radio.rx_frame(b"foreign", CHANNEL_HZ, LORA_BW_125, 12);
    settle().await;

    assert_eq!(recorder.take(), vec![]);
    assert_eq!(radio.get_status(), RadioState::Rx);
    assert_eq!(radio.get_stats().frames_filtered, 3);

    // A matching frame still gets through afterwards.
    radio.rx_frame(b"matching", CHANNEL_HZ, LORA_BW_125, LORA_SF7);
    settle().await;
    let events = recorder.take();
    match events.as_slice() {
        [Event::RxDone(payload, _, _)] => assert_eq!(payload.as_slice(), b"matching"),
        other => panic!("expected a single rx_done, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_continuous_rx_delivers_every_frame() {
    let (radio, recorder, _events) = radio_with_recorder();
    radio.sleep();
    radio.standby();
    radio.set_rx_config(
        Modem::LoRa,
        RxConfig {
            rx_continuous: true,
            ..lora_rx_config()
        },
    );

    radio.receive(0);
    assert_eq!(radio.get_status(), RadioState::RxContinuous);

    for i in 0..3u8 {
        radio.rx_frame(&[i; 4], CHANNEL_HZ, LORA_BW_125, LORA_SF7);
        settle().await;
    }

    let events = recorder.take();
    assert_eq!(events.len(), 3, "one rx_done per injected frame");
    for (i, event) in events.iter().enumerate() {
        match event {
            Event::RxDone(payload, _, _) => assert_eq!(payload.as_slice(), &[i as u8; 4]),
            other => panic!("expected rx_done, got {other:?}"),
        }
    }

    // No re-arming needed, the radio keeps listening.
    assert_eq!(radio.get_status(), RadioState::RxContinuous);
    assert_eq!(radio.get_stats().frames_received, 3);
}

#[tokio::test(start_paused = true)]
async fn test_oversize_frame_reports_rx_error() {
    let (radio, recorder, _events) = radio_with_recorder();
    radio.set_rx_config(Modem::LoRa, lora_rx_config());
    radio.set_max_payload_length(Modem::LoRa, 16);
    radio.receive(1_000);

    radio.rx_frame(&[0u8; 32], CHANNEL_HZ, LORA_BW_125, LORA_SF7);
    settle().await;

    assert_eq!(recorder.take(), vec![Event::RxError]);
    assert_eq!(radio.get_status(), RadioState::Standby);
    assert_eq!(radio.get_stats().frames_received, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cad_reflects_ambient_channel() {
    let (radio, recorder, _events) = radio_with_recorder();
    radio.set_rx_config(Modem::LoRa, lora_rx_config());

    // Idle channel: no activity detected.
    radio.start_cad();
    assert_eq!(radio.get_status(), RadioState::Cad);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(recorder.take(), vec![Event::CadDone(false)]);
    assert_eq!(radio.get_status(), RadioState::Standby);

    // Foreign carrier present: detected.
    radio.set_ambient_rssi(Some(-60));
    radio.start_cad();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(recorder.take(), vec![Event::CadDone(true)]);
}

#[tokio::test(start_paused = true)]
async fn test_fhss_hops_announced_during_tx() {
    let (radio, recorder, _events) = radio_with_recorder();
    radio.set_tx_config(
        Modem::LoRa,
        TxConfig {
            freq_hop_on: true,
            hop_period: 4,
            ..TxConfig::default()
        },
    );

    // ~41 ms airtime at SF7/BW125 against a ~4 ms hop period.
    radio.send(&[0x55; 12]);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let events = recorder.take();
    let hops: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            Event::FhssChangeChannel(channel) => Some(*channel),
            _ => None,
        })
        .collect();
    assert!(hops.len() >= 2, "expected multiple hops, got {hops:?}");
    for (i, channel) in hops.iter().enumerate() {
        assert_eq!(usize::from(*channel), i + 1, "hop channels must increment");
    }
    assert_eq!(events.last(), Some(&Event::TxDone), "tx_done ends the hops");
}

#[tokio::test(start_paused = true)]
async fn test_fhss_hops_announced_during_rx() {
    let (radio, recorder, _events) = radio_with_recorder();
    radio.set_rx_config(
        Modem::LoRa,
        RxConfig {
            freq_hop_on: true,
            hop_period: 4,
            ..lora_rx_config()
        },
    );

    // ~4 ms hop period at SF7/BW125 against a 50 ms listen window.
    radio.receive(50);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let events = recorder.take();
    let hops: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            Event::FhssChangeChannel(channel) => Some(*channel),
            _ => None,
        })
        .collect();
    assert!(hops.len() >= 2, "expected multiple hops, got {hops:?}");
    for (i, channel) in hops.iter().enumerate() {
        assert_eq!(usize::from(*channel), i + 1, "hop channels must increment");
    }
    assert_eq!(
        events.last(),
        Some(&Event::RxTimeout),
        "window still times out"
    );
    assert_eq!(radio.get_status(), RadioState::Standby);
}

#[tokio::test(start_paused = true)]
async fn test_fsk_sync_timeout_closes_rx_window() {
    let (radio, recorder, _events) = radio_with_recorder();
    radio.set_rx_config(
        Modem::Fsk,
        RxConfig {
            bandwidth: 50_000,
            datarate: 50_000,
            symb_timeout: 5,
            ..RxConfig::default()
        },
    );

    // Sync window (5 bytes at 50 kbit/s, sub-millisecond) elapses long
    // before the 10 s outer window.
    radio.receive(10_000);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(recorder.take(), vec![Event::RxTimeout]);
    assert_eq!(radio.get_status(), RadioState::Standby);
}

#[tokio::test(start_paused = true)]
async fn test_continuous_wave_ends_silently() {
    let (radio, recorder, _events) = radio_with_recorder();
    radio.set_tx_config(Modem::LoRa, TxConfig::default());

    radio.set_tx_continuous_wave(CHANNEL_HZ, 14, 1);
    assert_eq!(radio.get_status(), RadioState::Tx);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(radio.get_status(), RadioState::Standby);
    assert_eq!(recorder.take(), vec![], "cw window closes without callbacks");
}

#[tokio::test(start_paused = true)]
async fn test_random_disables_completions_until_reconfigured() {
    let (radio, recorder, _events) = radio_with_recorder();
    radio.set_tx_config(Modem::LoRa, TxConfig::default());

    let _ = radio.random();
    radio.send(b"lost");
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(recorder.take(), vec![], "completions suppressed after random");

    // Reconfiguration restores normal operation.
    radio.standby();
    radio.set_tx_config(Modem::LoRa, TxConfig::default());
    radio.send(b"recovered");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(recorder.take(), vec![Event::TxDone]);
}

/// Re-arming receive from inside rx_done, the usual MAC idiom. Callback
/// delivery happens outside the radio lock, so this must not deadlock.
struct RearmingMac {
    radio: Mutex<Option<Sx1276Radio>>,
    rx_count: AtomicU32,
}

impl RadioEvents for RearmingMac {
    fn rx_done(&self, _payload: &[u8], _rssi_dbm: i16, _snr_db: i8) {
        self.rx_count.fetch_add(1, Ordering::SeqCst);
        if let Some(radio) = self.radio.lock().unwrap().as_ref() {
            radio.receive(1_000);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_rearm_receive_from_rx_done_callback() {
    let radio = Sx1276Radio::with_seed(RadioPins::disconnected(), RadioVariant::Sx1276, 7);
    let mac = Arc::new(RearmingMac {
        radio: Mutex::new(Some(radio.clone())),
        rx_count: AtomicU32::new(0),
    });
    let events: Arc<dyn RadioEvents> = mac.clone();
    radio.init_radio(&events);

    radio.set_rx_config(Modem::LoRa, lora_rx_config());
    radio.receive(1_000);

    radio.rx_frame(b"first", CHANNEL_HZ, LORA_BW_125, LORA_SF7);
    settle().await;
    assert_eq!(radio.get_status(), RadioState::Rx, "callback re-armed rx");

    radio.rx_frame(b"second", CHANNEL_HZ, LORA_BW_125, LORA_SF7);
    settle().await;
    assert_eq!(mac.rx_count.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_carrier_sense_honors_time_budget() {
    let (radio, _recorder, _events) = radio_with_recorder();

    let start = Instant::now();
    let free = radio.perform_carrier_sense(Modem::LoRa, CHANNEL_HZ, -80, 30);
    let elapsed = start.elapsed();

    assert!(free, "idle channel must report free");
    assert!(elapsed >= Duration::from_millis(30));
    assert!(elapsed < Duration::from_millis(500), "budget overrun");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_carrier_sense_detects_busy_channel() {
    let (radio, _recorder, _events) = radio_with_recorder();
    radio.set_ambient_rssi(Some(-60));

    let start = Instant::now();
    let free = radio.perform_carrier_sense(Modem::LoRa, CHANNEL_HZ, -80, 1_000);

    assert!(!free, "busy channel must report occupied");
    assert!(
        start.elapsed() < Duration::from_millis(500),
        "busy detection must return early"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_carrier_sense_selects_modem_and_channel() {
    let (radio, _recorder, _events) = radio_with_recorder();

    let free = radio.perform_carrier_sense(Modem::Fsk, 869_525_000, -80, 10);
    assert!(free);

    let guard = radio.lock();
    assert_eq!(guard.settings().modem, Modem::Fsk);
    assert_eq!(guard.settings().channel, 869_525_000);
}

#[tokio::test(start_paused = true)]
async fn test_injection_while_not_listening_is_dropped() {
    let (radio, recorder, _events) = radio_with_recorder();
    radio.set_rx_config(Modem::LoRa, lora_rx_config());

    radio.rx_frame(b"nobody home", CHANNEL_HZ, LORA_BW_125, LORA_SF7);
    settle().await;

    assert_eq!(recorder.take(), vec![]);
    assert_eq!(radio.get_stats().frames_filtered, 1);
}
