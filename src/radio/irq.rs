//! # IRQ Dispatch Layer
//!
//! Models the chip's edge-triggered interrupt lines (DIO0..DIO5 plus the
//! timeout line) as discrete named signals. Raising a signal never runs any
//! handling logic in the raising context: the signal is pushed onto an
//! unbounded queue and a single worker task drains it, invoking the handler
//! one signal at a time in raise order. That serialization is the concurrency
//! backbone of the simulator — state machine transitions only ever happen on
//! the worker or inside a synchronous API call, never interleaved.
//!
//! `raise` is synchronous and lock-free, so it is safe from any context: the
//! timing engine task, a harness thread injecting frames, or the MAC thread.

use tokio::sync::mpsc;

use crate::error::RadioSimError;

/// A named interrupt signal.
///
/// Line assignments mirror the SX1276's DIO mapping: DIO0 carries TX-done and
/// RX-done, DIO1 the FSK sync-word timeout, DIO2 the FHSS hop point, DIO3
/// CAD-done. DIO4/DIO5 (CAD-detected, mode-ready) exist on the chip but their
/// handlers are no-ops here, as in the reference driver. The timeout line
/// carries the TX/RX watchdog expirations.
///
/// Each signal carries the state-machine generation current when it was
/// raised; the handler discards signals whose generation no longer matches,
/// which is how a preempting `standby()`/`sleep()` silently swallows
/// in-flight completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqSignal {
    Dio0 { generation: u64 },
    Dio1 { generation: u64 },
    Dio2 { generation: u64 },
    Dio3 { generation: u64 },
    Dio4 { generation: u64 },
    Dio5 { generation: u64 },
    Timeout { generation: u64 },
}

/// Raising half of the dispatch layer. Cheap to clone.
#[derive(Clone)]
pub struct IrqDispatcher {
    signal_tx: mpsc::UnboundedSender<IrqSignal>,
}

/// Receiving half, consumed by [`spawn_worker`].
pub struct SignalReceiver {
    signal_rx: mpsc::UnboundedReceiver<IrqSignal>,
}

impl IrqDispatcher {
    /// Creates the dispatch queue.
    pub fn channel() -> (Self, SignalReceiver) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        (Self { signal_tx }, SignalReceiver { signal_rx })
    }

    /// Enqueues a signal for deferred handling.
    ///
    /// Non-blocking; callable from any thread or task. Fails only once the
    /// worker has shut down.
    pub fn raise(&self, signal: IrqSignal) -> Result<(), RadioSimError> {
        self.signal_tx
            .send(signal)
            .map_err(|_| RadioSimError::DispatchClosed)
    }
}

/// Spawns the worker task that serializes handler execution.
///
/// The handler runs one signal at a time, in raise order, on the worker task.
/// Must be called within a tokio runtime.
pub fn spawn_worker<F>(mut receiver: SignalReceiver, mut handler: F)
where
    F: FnMut(IrqSignal) + Send + 'static,
{
    tokio::spawn(async move {
        log::debug!("irq worker started");
        while let Some(signal) = receiver.signal_rx.recv().await {
            handler(signal);
        }
        log::debug!("irq worker stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_signals_handled_in_raise_order() {
        let (dispatcher, receiver) = IrqDispatcher::channel();
        let (handled_tx, handled_rx) = std_mpsc::channel();
        spawn_worker(receiver, move |signal| {
            let _ = handled_tx.send(signal);
        });

        dispatcher.raise(IrqSignal::Dio0 { generation: 1 }).unwrap();
        dispatcher.raise(IrqSignal::Timeout { generation: 1 }).unwrap();
        dispatcher.raise(IrqSignal::Dio3 { generation: 2 }).unwrap();

        sleep(Duration::from_millis(20)).await;
        let order: Vec<IrqSignal> = handled_rx.try_iter().collect();
        assert_eq!(
            order,
            vec![
                IrqSignal::Dio0 { generation: 1 },
                IrqSignal::Timeout { generation: 1 },
                IrqSignal::Dio3 { generation: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_raise_from_foreign_thread() {
        let (dispatcher, receiver) = IrqDispatcher::channel();
        let (handled_tx, handled_rx) = std_mpsc::channel();
        spawn_worker(receiver, move |signal| {
            let _ = handled_tx.send(signal);
        });

        let raiser = dispatcher.clone();
        std::thread::spawn(move || {
            raiser.raise(IrqSignal::Dio2 { generation: 7 }).unwrap();
        })
        .join()
        .unwrap();

        sleep(Duration::from_millis(20)).await;
        assert_eq!(
            handled_rx.try_recv().unwrap(),
            IrqSignal::Dio2 { generation: 7 }
        );
    }
}
