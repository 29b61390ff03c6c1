//! Throttling logic and state management.

mod limiter;
mod machine;

pub use limiter::{Throttle, DEFAULT_INTERVAL};
pub use machine::{InvokeAction, ThrottleMachine, ThrottleState, TickAction};
