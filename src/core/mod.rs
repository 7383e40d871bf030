//! Core abstractions shared by the cache and the sync engine.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};
