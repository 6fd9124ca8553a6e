//! Tick sources for the show: a restartable periodic clock and one-shot timers.
//!
//! Both deliver into the orchestrator's event channel and own a child
//! [`CancellationToken`], so stopping is synchronous from the caller's side:
//! once `stop()` returns no new event will be produced. Events already queued
//! are the receiver's problem.

use std::time::Duration;

use rand::Rng;
use tokio::select;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalPolicy {
    Fixed(Duration),
    /// Uniform in `[min, max]`, drawn again before every tick.
    Randomized { min: Duration, max: Duration },
}

impl IntervalPolicy {
    pub fn next_interval<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match *self {
            IntervalPolicy::Fixed(period) => period,
            IntervalPolicy::Randomized { min, max } => {
                if max <= min {
                    min
                } else {
                    rng.random_range(min..=max)
                }
            }
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, IntervalPolicy::Fixed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Period taken once; ticks land on a fixed grid. Only for constant intervals.
    FixedRate,
    /// Next interval evaluated after each tick has been delivered.
    SelfRescheduling,
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic tick source that can be stopped and restarted with a new cadence.
pub struct SchedulingClock {
    parent: CancellationToken,
    running: Option<Running>,
}

impl SchedulingClock {
    pub fn new(parent: CancellationToken) -> Self {
        Self {
            parent,
            running: None,
        }
    }

    /// Starts ticking after `first_delay`, replacing any previous run.
    ///
    /// `on_tick` returns `false` to end the clock (e.g. its receiver is gone).
    pub fn start<I, T>(&mut self, first_delay: Duration, mut interval: I, pacing: Pacing, mut on_tick: T)
    where
        I: FnMut() -> Duration + Send + 'static,
        T: FnMut() -> bool + Send + 'static,
    {
        self.stop();
        let token = self.parent.child_token();
        let handle = tokio::spawn({
            let token = token.clone();
            async move {
                select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = sleep(first_delay) => {}
                }
                if !on_tick() {
                    return;
                }
                match pacing {
                    Pacing::FixedRate => {
                        let period = interval();
                        let mut ticker = interval_at(Instant::now() + period, period);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        loop {
                            select! {
                                biased;
                                _ = token.cancelled() => break,
                                _ = ticker.tick() => {
                                    if !on_tick() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    Pacing::SelfRescheduling => loop {
                        let next = interval();
                        trace!(?next, "next tick scheduled");
                        select! {
                            biased;
                            _ = token.cancelled() => break,
                            _ = sleep(next) => {
                                if !on_tick() {
                                    break;
                                }
                            }
                        }
                    },
                }
            }
        });
        self.running = Some(Running { token, handle });
    }

    /// Convenience wrapper that delivers `event` on `tx` using `policy`.
    pub fn start_events<E, R>(
        &mut self,
        first_delay: Duration,
        policy: IntervalPolicy,
        pacing: Pacing,
        mut rng: R,
        tx: mpsc::Sender<E>,
        event: E,
    ) where
        E: Clone + Send + std::fmt::Debug + 'static,
        R: Rng + Send + 'static,
    {
        let pacing = if policy.is_fixed() {
            pacing
        } else {
            Pacing::SelfRescheduling
        };
        self.start(
            first_delay,
            move || policy.next_interval(&mut rng),
            pacing,
            move || match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(dropped)) => {
                    debug!(?dropped, "event queue full; dropping tick");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            },
        );
    }

    /// Idempotent; a never-started clock is fine too.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.token.cancel();
            debug!("scheduling clock stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }
}

impl Drop for SchedulingClock {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A cancellable single-fire timer. Dropping it cancels it.
pub struct OneShot {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl OneShot {
    pub fn schedule<E>(parent: &CancellationToken, after: Duration, tx: mpsc::Sender<E>, event: E) -> Self
    where
        E: Send + 'static,
    {
        let token = parent.child_token();
        let handle = tokio::spawn({
            let token = token.clone();
            async move {
                // The send is raced against the token too: a full queue must
                // not let a cancelled timer deliver later.
                select! {
                    biased;
                    _ = token.cancelled() => {}
                    sent = async {
                        sleep(after).await;
                        tx.send(event).await
                    } => {
                        if sent.is_err() {
                            debug!("event receiver gone; one-shot dropped");
                        }
                    }
                }
            }
        });
        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for OneShot {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
