//! Show orchestration core: state, index selection and the slideshow itself.
//!
//! Nothing in here touches timers or I/O; the orchestrator task feeds events
//! in and carries the returned plans out.

mod selection;
mod slideshow;
mod state;

pub use selection::{RecapCursor, next_valid_index, pick_flash_set};
pub use slideshow::{
    PlanEvent, PlanStep, RecapStep, RevealOutcome, ShowView, Slideshow, TransitionKind,
    TransitionPlan, simulate,
};
pub use state::{RecapPhase, ShowInput, ShowState, StateChange};
