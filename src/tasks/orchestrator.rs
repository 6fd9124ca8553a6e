//! Drives a [`Slideshow`] with real timers and the transition engine.
//!
//! The task owns the show, the clock, every pending timer and the in-flight
//! transition. All state-machine calls happen in synchronous handlers between
//! two `select!` polls, so a reveal cancels the clock and the phase timers
//! before anything else gets to run.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::{Configuration, WinnerTrigger};
use crate::events::ShowEvent;
use crate::show::{
    RecapPhase, RecapStep, RevealOutcome, ShowState, ShowView, Slideshow, StateChange,
    TransitionKind, TransitionPlan,
};
use crate::tasks::clock::{IntervalPolicy, OneShot, Pacing, SchedulingClock};
use crate::tasks::transition::{
    TransitionEngine, TransitionError, TransitionReport, TransitionRequest, TransitionStyle,
};

const EVENT_QUEUE: usize = 32;

/// Timing knobs the orchestrator needs, lifted out of the configuration.
#[derive(Debug, Clone)]
pub struct ShowSettings {
    pub startup_delay: Duration,
    pub slide_duration: Duration,
    pub recap_interval: IntervalPolicy,
    pub normal_transition: Duration,
    pub recap_transition: Duration,
    pub winner_transition: Duration,
    pub trigger: WinnerTrigger,
}

impl ShowSettings {
    pub fn from_config(cfg: &Configuration) -> Self {
        Self {
            startup_delay: cfg.slideshow.startup_delay,
            slide_duration: cfg.slideshow.slide_duration,
            recap_interval: IntervalPolicy::Randomized {
                min: cfg.slideshow.recap_interval_min,
                max: cfg.slideshow.recap_interval_max,
            },
            normal_transition: cfg.transition.normal_duration,
            recap_transition: cfg.transition.recap_duration,
            winner_transition: cfg.transition.winner_duration(),
            trigger: cfg.winner_trigger,
        }
    }
}

type Joined = (TransitionPlan, Result<TransitionReport, TransitionError>);

struct Orchestrator {
    show: Slideshow,
    settings: ShowSettings,
    engine: TransitionEngine,
    clock: SchedulingClock,
    timers: Vec<OneShot>,
    stop_timer: Option<OneShot>,
    transitions: JoinSet<Joined>,
    in_flight: Option<TransitionPlan>,
    events: mpsc::Sender<ShowEvent>,
    cancel: CancellationToken,
    rng: StdRng,
    view_tx: watch::Sender<ShowView>,
}

/// Runs the show until `cancel` fires. The show itself goes inert once it
/// reaches its terminal state; the task keeps the final view published.
pub async fn run(
    catalog: Arc<Catalog>,
    settings: ShowSettings,
    engine: TransitionEngine,
    view_tx: watch::Sender<ShowView>,
    cancel: CancellationToken,
    seed: u64,
) -> Result<()> {
    let (events, mut events_rx) = mpsc::channel::<ShowEvent>(EVENT_QUEUE);
    let mut rng = StdRng::seed_from_u64(seed);
    let show = Slideshow::new(catalog, settings.trigger, StdRng::from_rng(&mut rng));
    let mut orch = Orchestrator {
        show,
        settings,
        engine,
        clock: SchedulingClock::new(cancel.clone()),
        timers: Vec::new(),
        stop_timer: None,
        transitions: JoinSet::new(),
        in_flight: None,
        events,
        cancel: cancel.clone(),
        rng,
        view_tx,
    };

    if !orch.start().await {
        info!("cancel received while loading the first slide");
        return Ok(());
    }
    orch.publish();

    loop {
        select! {
            _ = cancel.cancelled() => break,
            Some(event) = events_rx.recv() => orch.on_event(event),
            Some(joined) = orch.transitions.join_next() => orch.on_joined(joined),
        }
        orch.publish();
    }

    info!("cancel received; stopping show");
    orch.halt_scheduling();
    orch.transitions.shutdown().await;
    Ok(())
}

impl Orchestrator {
    /// Returns `false` if cancelled before the show could start.
    async fn start(&mut self) -> bool {
        let first = self.show.current_index();
        if let Some(item) = self.show.catalog().get(first) {
            let asset_ref = item.asset_ref.clone();
            let primed = select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                primed = self.engine.prime(first, &asset_ref) => primed,
            };
            if let Err(err) = primed {
                warn!(error = %err, "first slide failed to load");
                self.show.on_asset_failed(first);
            }
        }
        if let Some(change) = self.show.initialize() {
            self.on_state_change(change);
        }
        if self.show.state() == ShowState::Normal {
            self.start_normal_clock();
        }
        if let WinnerTrigger::AfterDuration { after } = self.settings.trigger {
            info!(?after, "winner reveal scheduled");
            self.stop_timer = Some(OneShot::schedule(
                &self.cancel,
                after,
                self.events.clone(),
                ShowEvent::StopAfterElapsed,
            ));
        }
        true
    }

    fn on_event(&mut self, event: ShowEvent) {
        match event {
            ShowEvent::Tick => {
                if let Some(plan) = self.show.on_tick() {
                    self.start_transition(plan);
                }
            }
            ShowEvent::RecapStep => match self.show.on_recap_step() {
                RecapStep::Revealed(index) => {
                    debug!(index, "recap grid cell revealed");
                    let delay = self.settings.recap_interval.next_interval(&mut self.rng);
                    self.schedule(delay, ShowEvent::RecapStep);
                }
                RecapStep::Exhausted => {
                    if let WinnerTrigger::RecapSequence { grid_dwell, .. } = self.settings.trigger {
                        self.schedule(grid_dwell, ShowEvent::PhaseElapsed(RecapPhase::Grid));
                    }
                }
                RecapStep::Ignored => debug!("stale recap step; ignoring"),
            },
            ShowEvent::PhaseElapsed(phase) => {
                if let Some(change) = self.show.on_phase_elapsed(phase) {
                    self.on_state_change(change);
                }
            }
            ShowEvent::WinnerPause => {
                let outcome = self.show.on_winner_pause();
                self.on_reveal(outcome);
            }
            ShowEvent::StopAfterElapsed => {
                let outcome = self.show.on_stop_timer();
                self.on_reveal(outcome);
            }
        }
    }

    fn on_state_change(&mut self, change: StateChange) {
        info!(from = ?change.from, to = ?change.to, "show state changed");
        let WinnerTrigger::RecapSequence {
            flash_dwell,
            winner_pause,
            ..
        } = self.settings.trigger
        else {
            return;
        };
        match change.to {
            ShowState::Recap(RecapPhase::Grid) => {
                self.clock.stop();
                let delay = self.settings.recap_interval.next_interval(&mut self.rng);
                self.schedule(delay, ShowEvent::RecapStep);
            }
            ShowState::Recap(RecapPhase::Flash) => {
                self.schedule(flash_dwell, ShowEvent::PhaseElapsed(RecapPhase::Flash));
            }
            ShowState::Recap(RecapPhase::Winner) => {
                let rng = StdRng::from_rng(&mut self.rng);
                self.clock.start_events(
                    Duration::ZERO,
                    self.settings.recap_interval,
                    Pacing::SelfRescheduling,
                    rng,
                    self.events.clone(),
                    ShowEvent::Tick,
                );
                self.schedule(winner_pause, ShowEvent::WinnerPause);
            }
            ShowState::Normal | ShowState::Stopped { .. } => {}
        }
    }

    fn on_reveal(&mut self, outcome: RevealOutcome) {
        match outcome {
            RevealOutcome::Started(plan) => {
                self.halt_scheduling();
                self.start_transition(plan);
            }
            RevealOutcome::Deferred => {
                self.halt_scheduling();
                debug!("winner transition waits for the running one");
            }
            RevealOutcome::Halted => self.halt_scheduling(),
            RevealOutcome::Ignored => {}
        }
    }

    fn on_joined(&mut self, joined: Result<Joined, JoinError>) {
        let in_flight = self.in_flight.take();
        match joined {
            Ok((plan, Ok(report))) => {
                debug!(index = report.index, frames = report.frames, "transition finished");
                if let Some(change) = self.show.on_transition_complete(plan.to) {
                    self.on_state_change(change);
                }
            }
            Ok((_, Err(TransitionError::Asset { index, source }))) => {
                warn!(index, error = %source, "transition aborted; slide skipped");
                if let Some(change) = self.show.on_transition_failed(index) {
                    self.on_state_change(change);
                }
            }
            Ok((plan, Err(err @ TransitionError::Busy { .. }))) => {
                debug!(error = %err, "transition rejected");
                self.show.on_transition_rejected(plan.to);
            }
            Err(err) => {
                warn!("transition task failed: {err}");
                if let Some(plan) = in_flight {
                    self.show.on_transition_rejected(plan.to);
                }
            }
        }
        if let Some(plan) = self.show.take_pending_reveal() {
            self.start_transition(plan);
        }
    }

    fn start_transition(&mut self, plan: TransitionPlan) {
        let Some(item) = self.show.catalog().get(plan.to) else {
            warn!(index = plan.to, "transition target outside catalog");
            self.show.on_transition_rejected(plan.to);
            return;
        };
        let style = match plan.kind {
            TransitionKind::Normal => {
                TransitionStyle::normal(self.settings.normal_transition, &mut self.rng)
            }
            TransitionKind::Recap => {
                TransitionStyle::recap(self.settings.recap_transition, &mut self.rng)
            }
            TransitionKind::Winner => {
                TransitionStyle::winner(self.settings.winner_transition, &mut self.rng)
            }
        };
        let request = TransitionRequest {
            plan,
            asset_ref: item.asset_ref.clone(),
            style,
        };
        match self.engine.begin(request) {
            Ok(pending) => {
                debug!(from = plan.from, to = plan.to, kind = ?plan.kind, "transition started");
                self.in_flight = Some(plan);
                self.transitions
                    .spawn(async move { (plan, pending.run().await) });
            }
            Err(err) => {
                debug!(error = %err, "transition rejected");
                self.show.on_transition_rejected(plan.to);
            }
        }
    }

    fn start_normal_clock(&mut self) {
        let rng = StdRng::from_rng(&mut self.rng);
        self.clock.start_events(
            self.settings.startup_delay,
            IntervalPolicy::Fixed(self.settings.slide_duration),
            Pacing::FixedRate,
            rng,
            self.events.clone(),
            ShowEvent::Tick,
        );
    }

    fn schedule(&mut self, after: Duration, event: ShowEvent) {
        self.timers.retain(|timer| !timer.is_finished());
        self.timers.push(OneShot::schedule(
            &self.cancel,
            after,
            self.events.clone(),
            event,
        ));
    }

    /// Stops every source of future show events.
    fn halt_scheduling(&mut self) {
        self.clock.stop();
        self.timers.clear();
        self.stop_timer = None;
    }

    fn publish(&self) {
        let view = self.show.view();
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_configuration() {
        let cfg = Configuration::default();
        let settings = ShowSettings::from_config(&cfg);
        assert_eq!(settings.winner_transition, Duration::from_millis(1950));
        assert_eq!(
            settings.recap_interval,
            IntervalPolicy::Randomized {
                min: Duration::from_millis(100),
                max: Duration::from_millis(300),
            }
        );
        assert!(settings.trigger.uses_recap());
    }

    #[test]
    fn recap_interval_draws_vary() {
        let settings = ShowSettings::from_config(&Configuration::default());
        let mut rng = StdRng::seed_from_u64(8);
        let draws: std::collections::BTreeSet<_> = (0..20)
            .map(|_| settings.recap_interval.next_interval(&mut rng))
            .collect();
        assert!(draws.len() > 1);
    }
}
