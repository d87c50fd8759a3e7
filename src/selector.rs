//! Picks the next image out of a listing snapshot.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::events::{Direction, ImageList, ImageRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationMode {
    #[default]
    Random,
    Sequential,
}

impl RotationMode {
    pub fn from_random_flag(random: bool) -> Self {
        if random { Self::Random } else { Self::Sequential }
    }
}

/// Position within the current snapshot. `None` until the first selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RotationState {
    pub current_index: Option<usize>,
    pub mode: RotationMode,
}

impl RotationState {
    pub fn new(mode: RotationMode) -> Self {
        Self {
            current_index: None,
            mode,
        }
    }

    /// Forget the position, e.g. after the listing has been replaced.
    pub fn reset(&mut self) {
        self.current_index = None;
    }
}

/// Index that follows `current` in a list of `len` entries.
///
/// Random draws never repeat `current` when `len > 1` and ignore `direction`.
/// Sequential wraps in both directions; an unset position moves to the first
/// entry for `Next` and the last entry for `Previous`.
pub fn next_index<R: Rng + ?Sized>(
    len: usize,
    current: Option<usize>,
    mode: RotationMode,
    direction: Direction,
    rng: &mut R,
) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let index = match mode {
        RotationMode::Random => loop {
            let candidate = rng.random_range(0..len);
            if len == 1 || Some(candidate) != current {
                break candidate;
            }
        },
        RotationMode::Sequential => match (direction, current) {
            (Direction::Next, None) => 0,
            (Direction::Next, Some(i)) => (i + 1) % len,
            (Direction::Previous, None) => len - 1,
            (Direction::Previous, Some(i)) => (i % len + len - 1) % len,
        },
    };
    Some(index)
}

/// Owns the rotation state and the random source for one display.
#[derive(Debug)]
pub struct Selector {
    state: RotationState,
    rng: StdRng,
}

impl Selector {
    pub fn new(mode: RotationMode, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            state: RotationState::new(mode),
            rng,
        }
    }

    pub fn state(&self) -> RotationState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Advance within `list` and return the chosen record.
    pub fn select<'a>(&mut self, list: &'a ImageList, direction: Direction) -> Option<&'a ImageRecord> {
        let index = next_index(
            list.len(),
            self.state.current_index,
            self.state.mode,
            direction,
            &mut self.rng,
        )?;
        self.state.current_index = Some(index);
        list.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SourceKind;

    fn list(ids: &[&str]) -> ImageList {
        ImageList::from_ids(ids.iter().copied(), SourceKind::LocalFile)
    }

    #[test]
    fn sequential_walks_forward_and_back() {
        let images = list(&["a.jpg", "b.jpg", "c.jpg"]);
        let mut selector = Selector::new(RotationMode::Sequential, Some(1));
        assert_eq!(selector.state().current_index, None);

        let first = selector.select(&images, Direction::Next).unwrap();
        assert_eq!(first.id, "a.jpg");
        assert_eq!(selector.state().current_index, Some(0));

        let second = selector.select(&images, Direction::Next).unwrap();
        assert_eq!(second.id, "b.jpg");

        selector.select(&images, Direction::Previous).unwrap();
        let wrapped = selector.select(&images, Direction::Previous).unwrap();
        assert_eq!(wrapped.id, "c.jpg");
        assert_eq!(selector.state().current_index, Some(2));
    }

    #[test]
    fn sequential_indices_wrap_for_every_start() {
        let mut rng = StdRng::seed_from_u64(3);
        for len in 1..=7usize {
            for i in 0..len {
                let next = next_index(len, Some(i), RotationMode::Sequential, Direction::Next, &mut rng);
                assert_eq!(next, Some((i + 1) % len));
                let prev =
                    next_index(len, Some(i), RotationMode::Sequential, Direction::Previous, &mut rng);
                assert_eq!(prev, Some((i + len - 1) % len));
            }
        }
    }

    #[test]
    fn random_never_repeats_previous_index() {
        let mut rng = StdRng::seed_from_u64(0xDEC0_D1A5);
        for len in 2..=5usize {
            let mut current = None;
            for _ in 0..500 {
                let next = next_index(len, current, RotationMode::Random, Direction::Next, &mut rng)
                    .unwrap();
                assert!(next < len);
                assert_ne!(Some(next), current);
                current = Some(next);
            }
        }
    }

    #[test]
    fn random_ignores_direction_and_covers_list() {
        let images = list(&["a", "b", "c", "d"]);
        let mut selector = Selector::new(RotationMode::Random, Some(42));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let record = selector.select(&images, Direction::Previous).unwrap();
            seen.insert(record.id.clone());
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn single_entry_repeats_trivially() {
        let images = list(&["only.jpg"]);
        for mode in [RotationMode::Random, RotationMode::Sequential] {
            let mut selector = Selector::new(mode, Some(9));
            for _ in 0..3 {
                assert_eq!(selector.select(&images, Direction::Next).unwrap().id, "only.jpg");
                assert_eq!(selector.state().current_index, Some(0));
            }
        }
    }

    #[test]
    fn empty_list_selects_nothing() {
        let mut selector = Selector::new(RotationMode::Sequential, None);
        assert!(selector.select(&ImageList::default(), Direction::Next).is_none());
        assert_eq!(selector.state().current_index, None);
    }

    #[test]
    fn stale_index_after_shrink_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(5);
        let prev = next_index(2, Some(6), RotationMode::Sequential, Direction::Previous, &mut rng);
        assert_eq!(prev, Some(1));
        let next = next_index(2, Some(6), RotationMode::Sequential, Direction::Next, &mut rng);
        assert_eq!(next, Some(1));
    }
}
