use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use super::selection::{RecapCursor, next_valid_index, pick_flash_set};
use super::state::{RecapPhase, ShowInput, ShowState, StateChange};
use crate::catalog::Catalog;
use crate::config::WinnerTrigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Normal,
    Recap,
    Winner,
}

/// A transition the show wants the engine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPlan {
    pub from: usize,
    pub to: usize,
    pub kind: TransitionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// Terminal state entered; run this transition now.
    Started(TransitionPlan),
    /// Terminal state entered; the transition waits for the one in flight.
    Deferred,
    /// Stopped without a winner to show.
    Halted,
    /// Already stopped, or not in a phase that reveals.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecapStep {
    Revealed(usize),
    Exhausted,
    Ignored,
}

/// Everything the presentation layer needs to draw the show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowView {
    pub current_index: usize,
    pub state: ShowState,
    pub grid: Vec<usize>,
    pub flash: Vec<usize>,
    pub failed: Vec<usize>,
    pub transitioning: bool,
}

impl Default for ShowView {
    fn default() -> Self {
        Self {
            current_index: 0,
            state: ShowState::Normal,
            grid: Vec::new(),
            flash: Vec::new(),
            failed: Vec::new(),
            transitioning: false,
        }
    }
}

/// Slideshow core: the single owner of all mutable show state.
///
/// Every entry point checks the current state first, so inputs that arrive
/// late (a tick queued before the reveal, a phase timer for a phase already
/// left) fall through as no-ops.
pub struct Slideshow {
    catalog: Arc<Catalog>,
    trigger: WinnerTrigger,
    state: ShowState,
    current: usize,
    seen: BTreeSet<usize>,
    cycle_latched: bool,
    transitioning: Option<usize>,
    pending_reveal: Option<TransitionPlan>,
    failed: BTreeSet<usize>,
    cursor: RecapCursor,
    grid: Vec<usize>,
    flash: Vec<usize>,
    rng: StdRng,
}

impl Slideshow {
    pub fn new(catalog: Arc<Catalog>, trigger: WinnerTrigger, rng: StdRng) -> Self {
        Self {
            catalog,
            trigger,
            state: ShowState::Normal,
            current: 0,
            seen: BTreeSet::new(),
            cycle_latched: false,
            transitioning: None,
            pending_reveal: None,
            failed: BTreeSet::new(),
            cursor: RecapCursor::default(),
            grid: Vec::new(),
            flash: Vec::new(),
            rng,
        }
    }

    /// Marks the first slide as seen. A one-slide catalog completes its
    /// cycle right here.
    pub fn initialize(&mut self) -> Option<StateChange> {
        self.seen.insert(self.current);
        self.check_cycle()
    }

    pub fn state(&self) -> ShowState {
        self.state
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning.is_some()
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn failed(&self) -> &BTreeSet<usize> {
        &self.failed
    }

    pub fn flash(&self) -> &[usize] {
        &self.flash
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn next_index(&self) -> Option<usize> {
        let skip = match self.state {
            ShowState::Recap(RecapPhase::Winner) => self.catalog.winner_index(),
            _ => None,
        };
        next_valid_index(self.current, self.catalog.len(), &self.failed, skip)
    }

    pub fn on_tick(&mut self) -> Option<TransitionPlan> {
        if self.state.is_terminal() {
            debug!("tick after stop; ignoring");
            return None;
        }
        if let Some(target) = self.transitioning {
            debug!(target, "tick while transitioning; ignoring");
            return None;
        }
        let kind = match self.state {
            ShowState::Normal => TransitionKind::Normal,
            ShowState::Recap(RecapPhase::Winner) => TransitionKind::Recap,
            ShowState::Recap(phase) => {
                debug!(?phase, "recap phase owns advancement; ignoring tick");
                return None;
            }
            ShowState::Stopped { .. } => return None,
        };
        let Some(to) = self.next_index() else {
            debug!(current = self.current, "no eligible slide to advance to");
            return None;
        };
        self.transitioning = Some(to);
        Some(TransitionPlan {
            from: self.current,
            to,
            kind,
        })
    }

    pub fn on_transition_complete(&mut self, index: usize) -> Option<StateChange> {
        if !self.release(index) {
            return None;
        }
        if self.state.is_terminal() {
            debug!(index, current = self.current, "transition finished after stop");
            return None;
        }
        self.current = index;
        if self.state == ShowState::Normal {
            self.seen.insert(index);
            return self.check_cycle();
        }
        None
    }

    /// Records an asset failure for `index` and releases the engine claim.
    pub fn on_transition_failed(&mut self, index: usize) -> Option<StateChange> {
        self.release(index);
        self.on_asset_failed(index)
    }

    /// Adds `index` to the failed set; it is never offered again this session.
    pub fn on_asset_failed(&mut self, index: usize) -> Option<StateChange> {
        if index >= self.catalog.len() {
            return None;
        }
        if self.failed.insert(index) {
            warn!(index, "slide failed to load; skipping it from now on");
        }
        if self.state == ShowState::Normal {
            return self.check_cycle();
        }
        None
    }

    /// The engine refused to start the transition for `index`.
    pub fn on_transition_rejected(&mut self, index: usize) {
        if self.release(index) {
            debug!(index, "transition rejected; dropping");
        }
    }

    /// Enters the terminal state and moves `current_index` to the winner
    /// before any transition work starts.
    pub fn request_winner_reveal(&mut self) -> RevealOutcome {
        if self.state.is_terminal() {
            debug!("reveal requested after stop; ignoring");
            return RevealOutcome::Ignored;
        }
        let Some(winner) = self.catalog.winner_index() else {
            let change = self.goto(self.state.apply(ShowInput::Halted));
            info!(?change, "no winner in catalog; show halted");
            return RevealOutcome::Halted;
        };
        let from = self.current;
        self.goto(self.state.apply(ShowInput::WinnerRevealed));
        self.current = winner;
        self.flash.clear();
        info!(winner, name = %self.winner_name(), "winner revealed");
        let plan = TransitionPlan {
            from,
            to: winner,
            kind: TransitionKind::Winner,
        };
        if self.transitioning.is_some() {
            self.pending_reveal = Some(plan);
            return RevealOutcome::Deferred;
        }
        self.transitioning = Some(winner);
        RevealOutcome::Started(plan)
    }

    /// Hands out a deferred winner transition once the engine is free.
    pub fn take_pending_reveal(&mut self) -> Option<TransitionPlan> {
        if self.transitioning.is_some() {
            return None;
        }
        let plan = self.pending_reveal.take()?;
        self.transitioning = Some(plan.to);
        Some(plan)
    }

    pub fn on_recap_step(&mut self) -> RecapStep {
        if self.state != ShowState::Recap(RecapPhase::Grid) {
            return RecapStep::Ignored;
        }
        match self
            .cursor
            .next(self.catalog.len(), self.catalog.winner_index())
        {
            Some(index) => {
                self.grid.push(index);
                RecapStep::Revealed(index)
            }
            None => RecapStep::Exhausted,
        }
    }

    pub fn on_phase_elapsed(&mut self, phase: RecapPhase) -> Option<StateChange> {
        if self.state != ShowState::Recap(phase) {
            debug!(?phase, state = ?self.state, "stale phase timer; ignoring");
            return None;
        }
        let change = self.goto(self.state.apply(ShowInput::PhaseElapsed(phase)))?;
        if change.to == ShowState::Recap(RecapPhase::Flash) {
            self.flash = pick_flash_set(
                self.catalog.len(),
                self.catalog.winner_index(),
                &self.failed,
                &mut self.rng,
            );
            debug!(flash = ?self.flash, "flash set chosen");
        }
        Some(change)
    }

    pub fn on_winner_pause(&mut self) -> RevealOutcome {
        if self.state != ShowState::Recap(RecapPhase::Winner) {
            return RevealOutcome::Ignored;
        }
        self.request_winner_reveal()
    }

    /// Fixed-duration trigger path.
    pub fn on_stop_timer(&mut self) -> RevealOutcome {
        if self.state.is_terminal() {
            return RevealOutcome::Ignored;
        }
        self.request_winner_reveal()
    }

    pub fn view(&self) -> ShowView {
        ShowView {
            current_index: self.current,
            state: self.state,
            grid: self.grid.clone(),
            flash: self.flash.clone(),
            failed: self.failed.iter().copied().collect(),
            transitioning: self.transitioning.is_some(),
        }
    }

    fn winner_name(&self) -> &str {
        self.catalog
            .get(self.current)
            .map(|item| item.display_name.as_str())
            .unwrap_or_default()
    }

    fn release(&mut self, index: usize) -> bool {
        if self.transitioning == Some(index) {
            self.transitioning = None;
            true
        } else {
            debug!(index, in_flight = ?self.transitioning, "unexpected transition report; ignoring");
            false
        }
    }

    fn check_cycle(&mut self) -> Option<StateChange> {
        if self.cycle_latched {
            return None;
        }
        let covered = self.seen.union(&self.failed).count();
        if covered < self.catalog.len() {
            return None;
        }
        self.cycle_latched = true;
        info!(slides = self.catalog.len(), "first cycle complete");
        if self.trigger.uses_recap() {
            self.goto(self.state.apply(ShowInput::FirstCycleComplete))
        } else {
            None
        }
    }

    fn goto(&mut self, to: ShowState) -> Option<StateChange> {
        if self.state == to {
            return None;
        }
        let change = StateChange {
            from: self.state,
            to,
        };
        debug!(from = ?change.from, to = ?change.to, "show state change");
        self.state = to;
        Some(change)
    }
}

/// One line of a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanEvent {
    Advanced { to: usize, kind: TransitionKind },
    GridRevealed(usize),
    Changed(StateChange),
    Flash(Vec<usize>),
    Revealed(usize),
    Halted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub step: usize,
    pub event: PlanEvent,
    pub current_index: usize,
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}  ", self.step)?;
        match &self.event {
            PlanEvent::Advanced { to, kind } => write!(f, "advance -> {to} ({kind:?})"),
            PlanEvent::GridRevealed(index) => write!(f, "grid reveals {index}"),
            PlanEvent::Changed(change) => write!(f, "{:?} -> {:?}", change.from, change.to),
            PlanEvent::Flash(set) => write!(f, "flash {set:?}"),
            PlanEvent::Revealed(index) => write!(f, "winner {index}"),
            PlanEvent::Halted => write!(f, "halted without winner"),
        }
    }
}

/// Drives a show with instantaneous timers and transitions.
///
/// With the fixed-duration trigger the reveal happens after `iterations`
/// steps, standing in for the timer.
pub fn simulate(
    catalog: Arc<Catalog>,
    trigger: WinnerTrigger,
    seed: u64,
    iterations: usize,
) -> Vec<PlanStep> {
    let mut show = Slideshow::new(catalog, trigger, StdRng::seed_from_u64(seed));
    let mut events = Vec::new();
    if let Some(change) = show.initialize() {
        events.push(PlanEvent::Changed(change));
    }

    let mut steps = Vec::new();
    flush(&show, &mut events, &mut steps);

    while steps.len() < iterations && !show.state().is_terminal() {
        match show.state() {
            ShowState::Normal => {
                let Some(plan) = show.on_tick() else { break };
                let change = show.on_transition_complete(plan.to);
                events.push(PlanEvent::Advanced {
                    to: plan.to,
                    kind: plan.kind,
                });
                events.extend(change.map(PlanEvent::Changed));
            }
            ShowState::Recap(RecapPhase::Grid) => match show.on_recap_step() {
                RecapStep::Revealed(index) => events.push(PlanEvent::GridRevealed(index)),
                RecapStep::Exhausted => {
                    events.extend(
                        show.on_phase_elapsed(RecapPhase::Grid)
                            .map(PlanEvent::Changed),
                    );
                    events.push(PlanEvent::Flash(show.flash().to_vec()));
                }
                RecapStep::Ignored => break,
            },
            ShowState::Recap(phase) => {
                if phase == RecapPhase::Flash {
                    events.extend(show.on_phase_elapsed(phase).map(PlanEvent::Changed));
                } else {
                    let outcome = show.on_winner_pause();
                    reveal(&mut show, outcome, &mut events);
                }
            }
            ShowState::Stopped { .. } => break,
        }
        flush(&show, &mut events, &mut steps);
    }

    if !show.state().is_terminal() && !trigger.uses_recap() {
        let outcome = show.on_stop_timer();
        reveal(&mut show, outcome, &mut events);
        flush(&show, &mut events, &mut steps);
    }
    steps
}

fn reveal(show: &mut Slideshow, outcome: RevealOutcome, events: &mut Vec<PlanEvent>) {
    match outcome {
        RevealOutcome::Started(plan) => {
            show.on_transition_complete(plan.to);
            events.push(PlanEvent::Revealed(plan.to));
        }
        RevealOutcome::Halted => events.push(PlanEvent::Halted),
        RevealOutcome::Deferred | RevealOutcome::Ignored => {}
    }
}

fn flush(show: &Slideshow, events: &mut Vec<PlanEvent>, steps: &mut Vec<PlanStep>) {
    for event in events.drain(..) {
        steps.push(PlanStep {
            step: steps.len(),
            event,
            current_index: show.current_index(),
        });
    }
}
