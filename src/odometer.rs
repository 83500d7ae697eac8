//! Projection iterator.
//!
//! A multi-radix counter over the Cartesian product of finalized slices,
//! last position fastest:
//!
//! ```text
//! [0:1:2) x [0:1:3)  ->  (0,0) (0,1) (0,2) (1,0) (1,1) (1,2)
//! ```

use crate::slice::Slice;

/// Row-major index tuples selected by a projection. Restartable with
/// [`Odometer::reset`].
#[derive(Debug, Clone)]
pub struct Odometer {
    slices: Vec<Slice>,
    counters: Vec<u64>,
    done: bool,
}

impl Odometer {
    /// Slices must be resolved; an unresolved slice counts as empty.
    pub fn new(slices: Vec<Slice>) -> Self {
        let counters = vec![0; slices.len()];
        let done = slices.iter().any(|s| s.count() == 0);
        Self {
            slices,
            counters,
            done,
        }
    }

    pub fn rank(&self) -> usize {
        self.slices.len()
    }

    /// Number of tuples a full pass yields (1 for a scalar).
    pub fn total(&self) -> u64 {
        self.slices
            .iter()
            .fold(1u64, |acc, s| acc.saturating_mul(s.count()))
    }

    pub fn reset(&mut self) {
        self.counters.iter_mut().for_each(|c| *c = 0);
        self.done = self.slices.iter().any(|s| s.count() == 0);
    }

    fn remaining(&self) -> u64 {
        if self.done {
            return 0;
        }
        // Tuples already produced, in mixed radix.
        let consumed = self
            .counters
            .iter()
            .zip(&self.slices)
            .fold(0u64, |acc, (c, s)| {
                acc.saturating_mul(s.count()).saturating_add(*c)
            });
        self.total().saturating_sub(consumed)
    }
}

impl Iterator for Odometer {
    type Item = Vec<u64>;

    fn next(&mut self) -> Option<Vec<u64>> {
        if self.done {
            return None;
        }
        let tuple = self
            .counters
            .iter()
            .zip(&self.slices)
            .map(|(c, s)| s.at(*c))
            .collect();

        for i in (0..self.counters.len()).rev() {
            self.counters[i] += 1;
            if self.counters[i] < self.slices[i].count() {
                return Some(tuple);
            }
            self.counters[i] = 0;
        }
        self.done = true;
        Some(tuple)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining()) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_row_major_order() {
        let odo = Odometer::new(vec![Slice::full(2), Slice::full(3)]);
        let tuples: Vec<Vec<u64>> = odo.collect();
        assert_eq!(
            tuples,
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![0, 2],
                vec![1, 0],
                vec![1, 1],
                vec![1, 2],
            ]
        );
    }

    #[test]
    fn test_scalar_yields_one_empty_tuple() {
        let mut odo = Odometer::new(Vec::new());
        assert_eq!(odo.total(), 1);
        assert_eq!(odo.next(), Some(Vec::new()));
        assert_eq!(odo.next(), None);
    }

    #[test]
    fn test_strided_indices() {
        let s = Slice::range(1, 3, Some(7)).finish(10).unwrap();
        let odo = Odometer::new(vec![s]);
        let tuples: Vec<Vec<u64>> = odo.collect();
        assert_eq!(tuples, vec![vec![1], vec![4], vec![7]]);
    }

    #[test]
    fn test_empty_dimension_yields_nothing() {
        let mut odo = Odometer::new(vec![Slice::full(3), Slice::full(0)]);
        assert_eq!(odo.total(), 0);
        assert_eq!(odo.next(), None);
    }

    #[test]
    fn test_reset_restarts() {
        let mut odo = Odometer::new(vec![Slice::full(2)]);
        assert_eq!(odo.by_ref().count(), 2);
        odo.reset();
        assert_eq!(odo.next(), Some(vec![0]));
        assert_eq!(odo.size_hint(), (1, Some(1)));
    }

    proptest! {
        #[test]
        fn odometer_covers_product(a in 0u64..5, b in 0u64..5, c in 1u64..4) {
            let odo = Odometer::new(vec![Slice::full(a), Slice::full(b), Slice::full(c)]);
            let total = odo.total();
            let tuples: Vec<Vec<u64>> = odo.collect();
            prop_assert_eq!(tuples.len() as u64, total);
            prop_assert_eq!(total, a * b * c);
            let mut sorted = tuples.clone();
            sorted.sort();
            prop_assert_eq!(sorted, tuples);
        }
    }
}
