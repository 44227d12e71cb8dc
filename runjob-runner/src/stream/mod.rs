//! Event stream layer
//!
//! Turns one-shot watch subscriptions into a continuous event sequence for
//! the driver.

mod resilient;

pub use resilient::{ResilientEventStream, StreamHandle, StreamItem, StreamState};
