//! Tandem Substrate - the durable execution boundary
//!
//! The orchestration engine in `tandem-core` is written against this crate
//! rather than against the runtime directly:
//! - [`SagaClock`]: the durable timer primitive. Backoff delays go through it
//!   so a replay-capable deployment can substitute durable timers, and tests
//!   can substitute a virtual clock.
//! - [`RetryPolicy`]: per-collaborator retry evaluation, driven by error
//!   classification rather than guesswork.
//! - [`TransitionJournal`]: an append-only write-ahead log of state
//!   transitions with integrity verification and snapshot replay, the
//!   minimum a from-scratch deployment needs for idempotent resumption.
//!
//! Crash-safe cross-process persistence itself is out of scope here; a
//! production deployment mounts these seams onto a mature durable-execution
//! engine.

pub mod clock;
pub mod journal;
pub mod retry;

pub use clock::{SagaClock, TokioClock, VirtualClock};
pub use journal::{JournalError, TransitionJournal, TransitionRecord};
pub use retry::{retry_call, Classify, ErrorClass, RetryPolicy};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
