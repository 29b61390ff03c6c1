//! The throttling state machine.
//!
//! This is the timer-agnostic core of the crate: a three-state machine driven
//! by two kinds of events, invocations and periodic timer ticks. It decides
//! *when* the wrapped action runs but never runs it itself; each event method
//! returns the effect the driver must perform after the transition has been
//! committed. That ordering matters: because the machine's state is already
//! consistent by the time the driver calls the action, a failing action
//! cannot corrupt the machine.

use tracing::trace;

/// The observable state of a throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleState {
    /// No recent activity; no timer running.
    Idle,
    /// A call ran within the current interval window; timer running;
    /// nothing newer is waiting.
    Cooldown,
    /// A call ran within the current window and at least one newer
    /// invocation has arrived since; timer running.
    Pending,
}

/// Internal phase. The pending arguments live inside the `Pending` variant,
/// so "pending args exist iff state is Pending" holds by construction.
enum Phase<T> {
    Idle,
    Cooldown,
    Pending(T),
}

/// Effect of an invocation event.
#[derive(Debug, PartialEq, Eq)]
pub enum InvokeAction<T> {
    /// Leading edge: the driver must start the periodic timer and then call
    /// the action with these arguments.
    Run(T),
    /// The arguments were absorbed into the pending snapshot; any previously
    /// pending arguments were discarded. Nothing to do.
    Coalesced,
}

/// Effect of a timer tick event.
#[derive(Debug, PartialEq, Eq)]
pub enum TickAction<T> {
    /// Trailing edge: the driver must call the action with the pending
    /// arguments. The timer keeps running.
    Run(T),
    /// A full interval elapsed with nothing pending; the driver must stop
    /// the periodic timer.
    Stop,
}

/// A leading-edge throttle with trailing coalescence.
///
/// The first invocation in a quiet period is released immediately; further
/// invocations inside the interval window collapse into a single "most
/// recent arguments" snapshot that is released on the next tick. Arbitrarily
/// many invocations per window therefore produce at most one deferred run,
/// and superseded arguments are discarded, never queued.
///
/// The timer is not restarted by invocations: once started it ticks at a
/// fixed cadence, and the machine rides that cadence until a full interval
/// passes with nothing pending.
pub struct ThrottleMachine<T> {
    phase: Phase<T>,
}

impl<T> ThrottleMachine<T> {
    /// Create a machine in the `Idle` state.
    pub fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    /// The current state.
    pub fn state(&self) -> ThrottleState {
        match self.phase {
            Phase::Idle => ThrottleState::Idle,
            Phase::Cooldown => ThrottleState::Cooldown,
            Phase::Pending(_) => ThrottleState::Pending,
        }
    }

    /// Handle an invocation event.
    ///
    /// Never fails. From `Idle` this returns [`InvokeAction::Run`] and the
    /// driver must start its periodic timer before calling the action; from
    /// any other state the arguments replace the pending snapshot.
    pub fn on_invoke(&mut self, args: T) -> InvokeAction<T> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => {
                self.phase = Phase::Cooldown;
                trace!(state = ?self.state(), "leading-edge invocation");
                InvokeAction::Run(args)
            }
            Phase::Cooldown | Phase::Pending(_) => {
                self.phase = Phase::Pending(args);
                trace!(state = ?self.state(), "invocation coalesced");
                InvokeAction::Coalesced
            }
        }
    }

    /// Handle a periodic timer tick.
    ///
    /// A tick while `Idle` is impossible for a well-behaved driver (the
    /// timer only runs in `Cooldown`/`Pending`); it is treated as a
    /// redundant [`TickAction::Stop`].
    pub fn on_tick(&mut self) -> TickAction<T> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            // No timer runs while idle; a stray tick from a manual driver
            // is answered with a redundant stop.
            Phase::Idle => TickAction::Stop,
            Phase::Cooldown => {
                trace!(state = ?self.state(), "quiet interval elapsed");
                TickAction::Stop
            }
            Phase::Pending(args) => {
                self.phase = Phase::Cooldown;
                trace!(state = ?self.state(), "trailing-edge release");
                TickAction::Run(args)
            }
        }
    }
}

impl<T> Default for ThrottleMachine<T> {
    fn default() -> Self {
        Self::new()
    }
}
