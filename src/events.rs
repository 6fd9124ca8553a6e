use tokio::sync::oneshot;

use crate::auth::AuthState;
use crate::claims::{ClaimOutcome, SelectOutcome};
use crate::show::RecapPhase;

/// Signals delivered to the show orchestrator by the clock and its timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowEvent {
    /// Periodic advance from the scheduling clock.
    Tick,
    /// Reveal the next cell of the recap grid.
    RecapStep,
    /// The dwell for a recap phase ran out.
    PhaseElapsed(RecapPhase),
    /// Short pause between entering the winner phase and the reveal itself.
    WinnerPause,
    /// Fixed-duration winner trigger fired.
    StopAfterElapsed,
}

/// Requests handled by the claim board actor.
#[derive(Debug)]
pub enum ClaimCommand {
    Hover(Option<u32>),
    Select {
        number: u32,
        reply: oneshot::Sender<SelectOutcome>,
    },
    /// Confirm the number currently open in the dialog for the signed-in user.
    Confirm {
        reply: oneshot::Sender<ClaimOutcome>,
    },
    Dismiss,
    Refresh,
    SetAuth(AuthState),
}
