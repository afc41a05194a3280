//! # Simulator Error Handling
//!
//! The radio control surface deliberately mirrors permissive hardware register
//! semantics: out-of-range configuration is clamped and wrong-state calls are
//! no-ops, so none of the MAC-facing operations return errors. RadioSimError
//! only covers internal plumbing failures (the dispatch queue or timing engine
//! going away), which are logged at the point of occurrence.

use thiserror::Error;

/// Represents the internal failure modes of the simulated radio.
#[derive(Debug, Error)]
pub enum RadioSimError {
    /// The IRQ dispatch worker has shut down and can no longer accept signals.
    #[error("IRQ dispatch queue closed")]
    DispatchClosed,

    /// The timing engine task has shut down and can no longer accept commands.
    #[error("Timing engine stopped")]
    TimerEngineStopped,
}
