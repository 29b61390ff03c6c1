//! Tokio-hosted throttle driver.
//!
//! [`Throttle`] wraps a [`ThrottleMachine`] in a dedicated worker task that
//! owns the machine, the wrapped action, and the periodic timer. Invocations
//! and timer ticks are delivered to the worker through one `select!` loop, so
//! they are handled strictly in arrival order and run to completion before
//! the next event: the single-threaded delivery model the machine assumes,
//! even when the handle is used from a multi-threaded runtime. No locking is
//! required and the action is never called concurrently with itself: the
//! worker calls it inline between polls of its own loop, so no interleaving
//! that overlaps two action calls can be constructed. That exclusion is
//! structural rather than something a test can observe.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace};

use crate::error::{PacerError, Result};

use super::machine::{InvokeAction, ThrottleMachine, ThrottleState, TickAction};

/// Default minimum interval between action runs.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

/// A rate-limited wrapper around an action.
///
/// The wrapped action runs at most once per interval no matter how often
/// [`invoke`](Throttle::invoke) is called, and the most recent invocation's
/// arguments are never silently dropped: they are either delivered on the
/// leading edge (first call in a quiet period, released immediately) or
/// coalesced into a single trailing call on the next timer tick.
///
/// Dropping the handle aborts the worker task, which releases the periodic
/// timer. Any still-pending arguments are discarded with it; there is no
/// flush operation. Use [`shutdown`](Throttle::shutdown) to stop gracefully.
///
/// # Action failures
///
/// The machine transition is committed before the action is called, so a
/// panicking action leaves the throttle's state consistent. The panic is not
/// suppressed: it tears down the worker task (later `invoke` calls become
/// no-ops) and is surfaced as [`PacerError::Worker`] by `shutdown`.
pub struct Throttle<T> {
    tx: mpsc::UnboundedSender<T>,
    state_rx: watch::Receiver<ThrottleState>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Throttle<T> {
    /// Create a throttle around `action` with the given minimum interval.
    ///
    /// Returns [`PacerError::InvalidInterval`] if `interval` is zero.
    pub fn new<F>(interval: Duration, action: F) -> Result<Self>
    where
        F: FnMut(T) + Send + 'static,
    {
        if interval.is_zero() {
            return Err(PacerError::InvalidInterval { interval });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ThrottleState::Idle);
        let worker = tokio::spawn(run_worker(rx, state_tx, interval, action));

        debug!(interval_ms = interval.as_millis() as u64, "throttle started");

        Ok(Self {
            tx,
            state_rx,
            worker: Some(worker),
        })
    }

    /// Create a throttle with the [`DEFAULT_INTERVAL`] of 200 ms.
    pub fn with_default_interval<F>(action: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        match Self::new(DEFAULT_INTERVAL, action) {
            Ok(throttle) => throttle,
            // DEFAULT_INTERVAL is non-zero.
            Err(_) => unreachable!(),
        }
    }

    /// Request a run of the wrapped action with `args`.
    ///
    /// Fire and forget: this never fails and never blocks, and is safe to
    /// call arbitrarily often. The action runs either immediately (first
    /// invocation in a quiet period) or on a later timer tick with the most
    /// recent arguments supplied by then.
    pub fn invoke(&self, args: T) {
        // Send only fails once the worker is gone (panicked action); the
        // throttle is inert at that point and the invocation is dropped.
        let _ = self.tx.send(args);
    }

    /// The current state of the underlying machine.
    ///
    /// Primarily useful for tests and diagnostics; by the time the caller
    /// observes the value the worker may already have moved on.
    pub fn state(&self) -> ThrottleState {
        *self.state_rx.borrow()
    }

    /// Stop the throttle and wait for the worker task to finish.
    ///
    /// Pending arguments that have not yet reached a tick are discarded.
    /// Surfaces a panic from the wrapped action as [`PacerError::Worker`].
    pub async fn shutdown(mut self) -> Result<()> {
        // Closing the channel lets the worker drain and exit on its own.
        let (closed_tx, _) = mpsc::unbounded_channel();
        drop(std::mem::replace(&mut self.tx, closed_tx));
        if let Some(worker) = self.worker.take() {
            worker.await?;
        }
        debug!("throttle stopped");
        Ok(())
    }
}

impl<T> Drop for Throttle<T> {
    fn drop(&mut self) {
        // Releases the periodic timer along with the worker.
        if let Some(worker) = &self.worker {
            worker.abort();
        }
    }
}

/// The worker loop: the single event loop that drives the machine.
async fn run_worker<T, F>(
    mut rx: mpsc::UnboundedReceiver<T>,
    state_tx: watch::Sender<ThrottleState>,
    interval: Duration,
    mut action: F,
) where
    F: FnMut(T),
{
    let mut machine = ThrottleMachine::new();
    // Present iff the machine is not Idle.
    let mut ticker: Option<Interval> = None;

    loop {
        tokio::select! {
            biased;

            received = rx.recv() => {
                let Some(args) = received else {
                    // All handles dropped; nothing more can be invoked.
                    break;
                };
                match machine.on_invoke(args) {
                    InvokeAction::Run(args) => {
                        ticker = Some(start_ticker(interval));
                        let _ = state_tx.send(machine.state());
                        action(args);
                    }
                    InvokeAction::Coalesced => {
                        let _ = state_tx.send(machine.state());
                    }
                }
            }

            _ = next_tick(&mut ticker), if ticker.is_some() => {
                match machine.on_tick() {
                    TickAction::Run(args) => {
                        trace!("releasing coalesced invocation");
                        let _ = state_tx.send(machine.state());
                        action(args);
                    }
                    TickAction::Stop => {
                        ticker = None;
                        let _ = state_tx.send(machine.state());
                    }
                }
            }
        }
    }
}

/// Start the periodic timer. The first tick is one full interval away; the
/// leading-edge run has already consumed the current instant.
fn start_ticker(interval: Duration) -> Interval {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    // If the worker falls behind, stay on a fixed cadence instead of
    // delivering a burst of catch-up ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        // Guarded out by `if ticker.is_some()`.
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::task::yield_now;
    use tokio::time::advance;

    /// Records every action call together with the virtual time it ran at.
    fn recording_action(
        start: Instant,
    ) -> (
        impl FnMut(&'static str) + Send + 'static,
        Arc<Mutex<Vec<(&'static str, Duration)>>>,
    ) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let action = move |args: &'static str| {
            sink.lock().unwrap().push((args, Instant::now() - start));
        };
        (action, calls)
    }

    /// Let the worker task drain everything delivered so far.
    async fn settle() {
        for _ in 0..8 {
            yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_invoke_runs_immediately() {
        let (action, calls) = recording_action(Instant::now());
        let throttle = Throttle::new(Duration::from_millis(100), action).unwrap();

        throttle.invoke("a");
        settle().await;

        assert_eq!(*calls.lock().unwrap(), vec![("a", Duration::ZERO)]);
        assert_eq!(throttle.state(), ThrottleState::Cooldown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_invoke_returns_to_idle_after_one_tick() {
        let (action, calls) = recording_action(Instant::now());
        let throttle = Throttle::new(Duration::from_millis(100), action).unwrap();

        throttle.invoke("a");
        settle().await;
        advance(Duration::from_millis(101)).await;
        settle().await;

        assert_eq!(throttle.state(), ThrottleState::Idle);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_first_and_last() {
        let start = Instant::now();
        let (action, calls) = recording_action(start);
        let throttle = Throttle::new(Duration::from_millis(100), action).unwrap();

        // interval = 100: invoke "x" at t=0, "y" at t=10, "z" at t=50.
        throttle.invoke("x");
        settle().await;
        advance(Duration::from_millis(10)).await;
        throttle.invoke("y");
        settle().await;
        advance(Duration::from_millis(40)).await;
        throttle.invoke("z");
        settle().await;
        advance(Duration::from_millis(50)).await;
        settle().await;

        // "x" immediately, "z" at the next tick (t=100), never "y".
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                ("x", Duration::ZERO),
                ("z", Duration::from_millis(100)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_reentry_runs_leading_edge_again() {
        let start = Instant::now();
        let (action, calls) = recording_action(start);
        let throttle = Throttle::new(Duration::from_millis(100), action).unwrap();

        throttle.invoke("a");
        settle().await;
        advance(Duration::from_millis(250)).await;
        settle().await;
        assert_eq!(throttle.state(), ThrottleState::Idle);

        throttle.invoke("b");
        settle().await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], ("b", Duration::from_millis(250)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_storm_is_rate_bounded() {
        let (action, calls) = recording_action(Instant::now());
        let throttle = Throttle::new(Duration::from_millis(100), action).unwrap();

        // Invoke every 10 ms for 500 ms: 51 invocations over T = 500 ms.
        for i in 0..=50 {
            throttle.invoke("i");
            settle().await;
            if i < 50 {
                advance(Duration::from_millis(10)).await;
            }
        }
        settle().await;

        // At most ceil(T / interval) + 1 = 6 action runs.
        let count = calls.lock().unwrap().len();
        assert!(count <= 6, "expected at most 6 runs, got {count}");
        assert!(count >= 5, "expected roughly one run per interval, got {count}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_run_rides_the_fixed_cadence() {
        let start = Instant::now();
        let (action, calls) = recording_action(start);
        let throttle = Throttle::new(Duration::from_millis(100), action).unwrap();

        throttle.invoke("a");
        settle().await;
        // A very late straggler still lands on the next tick, not
        // `interval` after it was invoked.
        advance(Duration::from_millis(99)).await;
        throttle.invoke("b");
        settle().await;
        advance(Duration::from_millis(1)).await;
        settle().await;

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                ("a", Duration::ZERO),
                ("b", Duration::from_millis(100)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_overwrites_across_windows() {
        let start = Instant::now();
        let (action, calls) = recording_action(start);
        let throttle = Throttle::new(Duration::from_millis(100), action).unwrap();

        throttle.invoke("a");
        throttle.invoke("b");
        settle().await;
        advance(Duration::from_millis(100)).await;
        settle().await;
        // "b" ran at t=100; machine is back in Cooldown. Defer again.
        throttle.invoke("c");
        settle().await;
        advance(Duration::from_millis(100)).await;
        settle().await;

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                ("a", Duration::ZERO),
                ("b", Duration::from_millis(100)),
                ("c", Duration::from_millis(200)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_rejected() {
        let result = Throttle::new(Duration::ZERO, |_: u32| {});
        assert!(matches!(
            result,
            Err(PacerError::InvalidInterval { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_joins_worker() {
        let throttle = Throttle::with_default_interval(|_: u32| {});
        throttle.invoke(1);
        settle().await;

        throttle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_action_tears_down_worker() {
        let throttle = Throttle::new(Duration::from_millis(100), |_: u32| {
            panic!("action failed");
        })
        .unwrap();

        throttle.invoke(1);
        settle().await;

        // The worker died with the panic; later invocations are dropped
        // without error.
        throttle.invoke(2);
        settle().await;
        advance(Duration::from_millis(500)).await;
        settle().await;

        // The panic is not suppressed: shutdown surfaces it.
        let result = throttle.shutdown().await;
        assert!(matches!(result, Err(PacerError::Worker(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_worker() {
        let (action, calls) = recording_action(Instant::now());
        let throttle = Throttle::new(Duration::from_millis(100), action).unwrap();

        throttle.invoke("a");
        throttle.invoke("b");
        settle().await;
        drop(throttle);
        settle().await;
        advance(Duration::from_millis(500)).await;
        settle().await;

        // The pending "b" died with the worker; no trailing run happened.
        assert_eq!(*calls.lock().unwrap(), vec![("a", Duration::ZERO)]);
    }
}
