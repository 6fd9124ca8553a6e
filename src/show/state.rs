/// Sub-phase of the recap sequence that follows the first full cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecapPhase {
    /// Every non-winner slide is revealed cell by cell.
    Grid,
    /// A few slides are highlighted.
    Flash,
    /// Quick flicker right before the reveal.
    Winner,
}

/// Top-level show state. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowState {
    Normal,
    Recap(RecapPhase),
    Stopped { winner_revealed: bool },
}

/// Inputs that may move a [`ShowState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowInput {
    FirstCycleComplete,
    PhaseElapsed(RecapPhase),
    WinnerRevealed,
    /// Stop without a winner to show.
    Halted,
}

impl ShowState {
    /// Pure transition function; inputs that do not apply leave the state as is.
    pub fn apply(self, input: ShowInput) -> ShowState {
        use RecapPhase::*;
        use ShowInput::*;
        match (self, input) {
            (ShowState::Stopped { .. }, _) => self,
            (_, WinnerRevealed) => ShowState::Stopped {
                winner_revealed: true,
            },
            (_, Halted) => ShowState::Stopped {
                winner_revealed: false,
            },
            (ShowState::Normal, FirstCycleComplete) => ShowState::Recap(Grid),
            (ShowState::Recap(Grid), PhaseElapsed(Grid)) => ShowState::Recap(Flash),
            (ShowState::Recap(Flash), PhaseElapsed(Flash)) => ShowState::Recap(Winner),
            _ => self,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ShowState::Stopped { .. })
    }

    pub fn winner_revealed(self) -> bool {
        matches!(
            self,
            ShowState::Stopped {
                winner_revealed: true
            }
        )
    }

    pub fn recap_phase(self) -> Option<RecapPhase> {
        match self {
            ShowState::Recap(phase) => Some(phase),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: ShowState,
    pub to: ShowState,
}
