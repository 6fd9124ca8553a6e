use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use lucky_carousel::catalog::{Catalog, SlideItem};
use lucky_carousel::config::WinnerTrigger;
use lucky_carousel::show::{
    PlanEvent, RecapCursor, RecapPhase, RecapStep, RevealOutcome, ShowState, Slideshow,
    TransitionKind, next_valid_index, simulate,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn catalog(n: usize, winner: Option<usize>) -> Arc<Catalog> {
    let items = (0..n)
        .map(|i| SlideItem::new(format!("{i:02}.jpg"), format!("Person {i}"), ""))
        .collect();
    let name = winner.map(|w| format!("Person {w}"));
    Arc::new(Catalog::new(items, name.as_deref()).unwrap())
}

fn fixed_duration() -> WinnerTrigger {
    WinnerTrigger::AfterDuration {
        after: Duration::from_secs(60),
    }
}

fn started(n: usize, winner: Option<usize>, trigger: WinnerTrigger) -> Slideshow {
    let mut show = Slideshow::new(catalog(n, winner), trigger, StdRng::seed_from_u64(11));
    assert!(show.initialize().is_none());
    show
}

/// One tick followed by a successful transition; returns the new index.
fn advance(show: &mut Slideshow) -> usize {
    let plan = show.on_tick().expect("tick should plan a transition");
    show.on_transition_complete(plan.to);
    show.current_index()
}

#[test]
fn three_slides_cycle_back_to_start() {
    let mut show = started(3, None, fixed_duration());
    let sequence: Vec<usize> = (0..3).map(|_| advance(&mut show)).collect();
    assert_eq!(sequence, vec![1, 2, 0]);
    assert_eq!(show.seen_count(), 3);
    // The fixed-duration trigger keeps cycling after the first lap.
    assert_eq!(show.state(), ShowState::Normal);
}

#[test]
fn recap_starts_after_n_minus_one_completions() {
    for n in 2..=6 {
        let mut show = started(n, Some(0), WinnerTrigger::default());
        for _ in 0..n - 2 {
            advance(&mut show);
            assert_eq!(show.state(), ShowState::Normal, "n = {n}");
        }
        let plan = show.on_tick().unwrap();
        let change = show.on_transition_complete(plan.to).expect("mode switch");
        assert_eq!(change.from, ShowState::Normal);
        assert_eq!(change.to, ShowState::Recap(RecapPhase::Grid));
    }
}

#[test]
fn reveal_is_synchronous_and_later_ticks_are_ignored() {
    let mut show = started(5, Some(3), WinnerTrigger::default());
    let outcome = show.request_winner_reveal();
    assert!(matches!(
        outcome,
        RevealOutcome::Started(plan) if plan.to == 3 && plan.kind == TransitionKind::Winner
    ));
    assert_eq!(
        show.state(),
        ShowState::Stopped {
            winner_revealed: true
        }
    );
    assert_eq!(show.current_index(), 3);

    assert!(show.on_tick().is_none());
    assert_eq!(show.current_index(), 3);
}

#[test]
fn terminal_state_absorbs_every_later_input() {
    let mut show = started(5, Some(3), WinnerTrigger::default());
    advance(&mut show);
    let RevealOutcome::Started(plan) = show.request_winner_reveal() else {
        panic!("reveal should start a transition");
    };
    show.on_transition_complete(plan.to);
    let before = show.view();

    for _ in 0..10 {
        assert!(show.on_tick().is_none());
    }
    assert_eq!(show.on_winner_pause(), RevealOutcome::Ignored);
    assert_eq!(show.on_stop_timer(), RevealOutcome::Ignored);
    assert_eq!(show.request_winner_reveal(), RevealOutcome::Ignored);
    assert!(show.on_phase_elapsed(RecapPhase::Grid).is_none());
    assert_eq!(show.on_recap_step(), RecapStep::Ignored);
    assert!(show.on_transition_complete(1).is_none());
    show.on_transition_rejected(4);

    assert_eq!(show.view(), before);
    assert!(show.state().winner_revealed());
}

#[test]
fn only_one_transition_in_flight() {
    let mut show = started(4, None, fixed_duration());
    let first = show.on_tick().unwrap();
    assert!(show.is_transitioning());
    assert!(show.on_tick().is_none());
    assert!(show.on_tick().is_none());

    show.on_transition_complete(first.to);
    assert!(!show.is_transitioning());
    assert!(show.on_tick().is_some());
}

#[test]
fn failed_slide_is_skipped_for_the_rest_of_the_session() {
    let mut show = started(5, None, fixed_duration());
    assert_eq!(advance(&mut show), 1);

    let plan = show.on_tick().unwrap();
    assert_eq!(plan.to, 2);
    show.on_transition_failed(2);
    assert!(show.failed().contains(&2));
    assert_eq!(show.current_index(), 1);

    for _ in 0..3 {
        assert_eq!(show.next_index(), Some(3));
    }
    let mut visited = Vec::new();
    for _ in 0..8 {
        visited.push(advance(&mut show));
    }
    assert!(!visited.contains(&2), "visited {visited:?}");
}

#[test]
fn next_index_never_returns_a_failed_slide() {
    let n = 7;
    let failed = BTreeSet::from([2, 5]);
    for from in 0..n {
        for skip in [None, Some(0), Some(6)] {
            if let Some(next) = next_valid_index(from, n, &failed, skip) {
                assert!(!failed.contains(&next));
                assert_ne!(Some(next), skip);
                assert_ne!(next, from);
            }
        }
    }
}

#[test]
fn recap_grid_walks_every_slide_but_the_winner() {
    for winner in [None, Some(0), Some(3), Some(5)] {
        let mut cursor = RecapCursor::default();
        let mut seen = Vec::new();
        while let Some(index) = cursor.next(6, winner) {
            seen.push(index);
        }
        let expected: Vec<usize> = (0..6).filter(|i| Some(*i) != winner).collect();
        assert_eq!(seen, expected, "winner {winner:?}");
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.next(6, winner), None);
    }
}

#[test]
fn full_recap_sequence_ends_on_the_winner() {
    let mut show = started(4, Some(2), WinnerTrigger::default());
    for _ in 0..3 {
        advance(&mut show);
    }
    assert_eq!(show.state(), ShowState::Recap(RecapPhase::Grid));
    assert!(show.on_tick().is_none(), "grid phase owns advancement");

    let mut revealed = Vec::new();
    loop {
        match show.on_recap_step() {
            RecapStep::Revealed(index) => revealed.push(index),
            RecapStep::Exhausted => break,
            RecapStep::Ignored => panic!("grid step ignored"),
        }
    }
    assert_eq!(revealed, vec![0, 1, 3]);

    // A stale flash timer must not skip the grid.
    assert!(show.on_phase_elapsed(RecapPhase::Flash).is_none());
    show.on_phase_elapsed(RecapPhase::Grid).unwrap();
    assert_eq!(show.state(), ShowState::Recap(RecapPhase::Flash));
    let flash = show.flash().to_vec();
    assert!((2..=3).contains(&flash.len()), "flash {flash:?}");
    assert!(!flash.contains(&2));

    show.on_phase_elapsed(RecapPhase::Flash).unwrap();
    assert_eq!(show.state(), ShowState::Recap(RecapPhase::Winner));

    for _ in 0..5 {
        let plan = show.on_tick().unwrap();
        assert_eq!(plan.kind, TransitionKind::Recap);
        assert_ne!(plan.to, 2, "flicker never lands on the winner");
        show.on_transition_complete(plan.to);
    }

    let RevealOutcome::Started(plan) = show.on_winner_pause() else {
        panic!("winner pause should reveal");
    };
    assert_eq!(plan.to, 2);
    assert!(show.state().winner_revealed());
    assert!(show.flash().is_empty());
}

#[test]
fn reveal_during_transition_waits_for_the_engine() {
    let mut show = started(4, Some(2), fixed_duration());
    let running = show.on_tick().unwrap();
    assert_eq!(running.to, 1);

    assert_eq!(show.on_stop_timer(), RevealOutcome::Deferred);
    assert_eq!(show.current_index(), 2);
    assert!(show.take_pending_reveal().is_none());

    // The stale completion does not move the show off the winner.
    assert!(show.on_transition_complete(running.to).is_none());
    assert_eq!(show.current_index(), 2);

    let plan = show.take_pending_reveal().expect("parked reveal");
    assert_eq!((plan.from, plan.to), (0, 2));
    assert_eq!(plan.kind, TransitionKind::Winner);
    assert!(show.take_pending_reveal().is_none());
}

#[test]
fn catalog_without_winner_halts() {
    let mut show = started(3, None, fixed_duration());
    advance(&mut show);
    assert_eq!(show.on_stop_timer(), RevealOutcome::Halted);
    assert_eq!(
        show.state(),
        ShowState::Stopped {
            winner_revealed: false
        }
    );
    assert_eq!(show.current_index(), 1);
    assert!(show.on_tick().is_none());
}

#[test]
fn single_slide_catalog_goes_straight_to_recap() {
    let mut show = Slideshow::new(catalog(1, Some(0)), WinnerTrigger::default(), StdRng::seed_from_u64(1));
    let change = show.initialize().expect("one slide completes the cycle");
    assert_eq!(change.to, ShowState::Recap(RecapPhase::Grid));
    assert_eq!(show.on_recap_step(), RecapStep::Exhausted);
}

#[test]
fn dry_run_reaches_the_winner() {
    let steps = simulate(catalog(5, Some(3)), WinnerTrigger::default(), 42, 1_000);
    let last = steps.last().unwrap();
    assert_eq!(last.event, PlanEvent::Revealed(3));
    assert_eq!(last.current_index, 3);
    let grid: Vec<usize> = steps
        .iter()
        .filter_map(|step| match step.event {
            PlanEvent::GridRevealed(index) => Some(index),
            _ => None,
        })
        .collect();
    assert_eq!(grid, vec![0, 1, 2, 4]);
}

#[test]
fn dry_run_is_reproducible_per_seed() {
    let a = simulate(catalog(6, Some(1)), WinnerTrigger::default(), 7, 200);
    let b = simulate(catalog(6, Some(1)), WinnerTrigger::default(), 7, 200);
    assert_eq!(a, b);
}

#[test]
fn dry_run_with_fixed_duration_reveals_after_budget() {
    let steps = simulate(catalog(3, Some(2)), fixed_duration(), 0, 10);
    assert!(steps.iter().all(|step| !matches!(step.event, PlanEvent::GridRevealed(_))));
    assert_eq!(steps.last().unwrap().event, PlanEvent::Revealed(2));

    let halted = simulate(catalog(3, None), fixed_duration(), 0, 4);
    assert_eq!(halted.last().unwrap().event, PlanEvent::Halted);
}
