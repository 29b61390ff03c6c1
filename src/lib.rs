//! Pacer - Leading-Edge Throttle with Trailing Coalescence
//!
//! This crate implements a call-rate-limiting scheduler: it wraps an action
//! and a minimum interval and guarantees the action runs at most once per
//! interval, no matter how often it is triggered, without ever dropping the
//! most recent invocation's arguments. The first call in a quiet period runs
//! immediately; calls arriving while the interval window is active are
//! coalesced into a single deferred run carrying only the newest arguments.
//!
//! The core is [`ThrottleMachine`], a pure three-state machine usable with
//! any timer source. [`Throttle`] hosts that machine on a tokio worker task
//! with a periodic timer and serialized event delivery.

pub mod config;
pub mod error;
pub mod throttle;

pub use config::PacerConfig;
pub use error::{PacerError, Result};
pub use throttle::{Throttle, ThrottleMachine, ThrottleState, DEFAULT_INTERVAL};
