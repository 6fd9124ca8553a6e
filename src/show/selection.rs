use std::collections::BTreeSet;

use rand::Rng;
use rand::seq::IndexedRandom;

/// Next index after `from` in cycling order, skipping failed slides and `skip`.
///
/// Returns `None` when no slide other than `from` is eligible, so a show
/// with everything failed simply stops advancing.
pub fn next_valid_index(
    from: usize,
    len: usize,
    failed: &BTreeSet<usize>,
    skip: Option<usize>,
) -> Option<usize> {
    (1..len)
        .map(|step| (from + step) % len)
        .find(|idx| !failed.contains(idx) && Some(*idx) != skip)
}

/// Ascending walk over the catalog for the recap grid, stepping over the winner.
#[derive(Debug, Clone, Default)]
pub struct RecapCursor {
    last: Option<usize>,
    exhausted: bool,
}

impl RecapCursor {
    pub fn next(&mut self, len: usize, winner: Option<usize>) -> Option<usize> {
        if self.exhausted {
            return None;
        }
        let mut candidate = self.last.map_or(0, |last| last + 1);
        if Some(candidate) == winner {
            candidate += 1;
        }
        if candidate >= len {
            self.exhausted = true;
            return None;
        }
        self.last = Some(candidate);
        Some(candidate)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Two or three distinct slides to highlight, never the winner or a failed slide.
pub fn pick_flash_set<R: Rng + ?Sized>(
    len: usize,
    winner: Option<usize>,
    failed: &BTreeSet<usize>,
    rng: &mut R,
) -> Vec<usize> {
    let candidates: Vec<usize> = (0..len)
        .filter(|idx| Some(*idx) != winner && !failed.contains(idx))
        .collect();
    let count = rng.random_range(2..=3).min(candidates.len());
    let mut picked: Vec<usize> = candidates.choose_multiple(rng, count).copied().collect();
    picked.sort_unstable();
    picked
}
