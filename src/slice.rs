//! Index slices over one dimension.
//!
//! A slice selects `start, start+stride, ...` up to (excluding) `stop`.
//! Textually the last selected index is written inclusively:
//! `[i]`, `[first:last]`, `[first:stride:last]`, `[first:]`, `[first:stride:]`
//! and `[]` for the whole dimension.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CeError, Result};

/// One dimension's index range.
///
/// `stop` is `None` until the slice is resolved against a dimension size.
/// An unconstrained slice means "the dimension's full extent" and may be
/// replaced by a dimension redefinition; a constrained slice always yields
/// its own anonymous dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slice {
    pub start: u64,
    pub stride: u64,
    pub stop: Option<u64>,
    pub constrained: bool,
}

impl Default for Slice {
    fn default() -> Self {
        Self::whole()
    }
}

impl Slice {
    /// Unconstrained slice; the extent is taken from the dimension.
    pub fn whole() -> Self {
        Self {
            start: 0,
            stride: 1,
            stop: None,
            constrained: false,
        }
    }

    /// Unconstrained slice already resolved to `size` elements.
    pub fn full(size: u64) -> Self {
        Self {
            stop: Some(size),
            ..Self::whole()
        }
    }

    /// A single index `[i]`.
    pub fn index(i: u64) -> Self {
        Self {
            start: i,
            stride: 1,
            stop: Some(i.saturating_add(1)),
            constrained: true,
        }
    }

    /// `[first:stride:last]` with an inclusive `last`; `None` runs to the end.
    pub fn range(first: u64, stride: u64, last: Option<u64>) -> Self {
        Self {
            start: first,
            stride,
            stop: last.map(|l| l.saturating_add(1)),
            constrained: true,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.stop.is_some()
    }

    /// Fill an open stop with the dimension size.
    pub fn resolve(self, size: u64) -> Self {
        Self {
            stop: Some(self.stop.unwrap_or(size)),
            ..self
        }
    }

    /// Resolve against `size` and check `stride >= 1`, `start <= stop <= size`.
    /// A constrained slice must select at least one index of a non-empty
    /// dimension.
    pub fn finish(self, size: u64) -> Result<Self> {
        let slice = self.resolve(size);
        let stop = slice.stop.unwrap_or(size);
        if slice.stride == 0 {
            return Err(CeError::bad_slice(slice, "stride must be at least 1"));
        }
        if slice.start > stop {
            return Err(CeError::bad_slice(slice, "start is past the end"));
        }
        if stop > size {
            return Err(CeError::bad_slice(
                slice,
                format!("exceeds dimension size {}", size),
            ));
        }
        // [i:j] with j < i, or [size:]
        if slice.constrained && slice.start >= stop && size > 0 {
            return Err(CeError::bad_slice(slice, "last index precedes first"));
        }
        Ok(slice)
    }

    /// Number of selected indices. An unresolved slice counts as empty.
    pub fn count(&self) -> u64 {
        match self.stop {
            Some(stop) if stop > self.start && self.stride > 0 => {
                (stop - self.start).div_ceil(self.stride)
            }
            _ => 0,
        }
    }

    /// Last selected index, if any.
    pub fn last(&self) -> Option<u64> {
        match self.count() {
            0 => None,
            n => Some(self.start + (n - 1) * self.stride),
        }
    }

    /// Index of the `k`-th selected element.
    pub fn at(&self, k: u64) -> u64 {
        self.start + k * self.stride
    }

    pub fn indices(&self) -> impl Iterator<Item = u64> {
        let slice = *self;
        (0..slice.count()).map(move |k| slice.at(k))
    }

    /// Text form for a constraint expression.
    pub fn to_constraint_string(&self) -> String {
        if !self.constrained {
            return "[]".to_string();
        }
        match (self.stop, self.last()) {
            (Some(_), Some(last)) if last == self.start => format!("[{}]", self.start),
            (Some(_), Some(last)) if self.stride == 1 => format!("[{}:{}]", self.start, last),
            (Some(_), Some(last)) => format!("[{}:{}:{}]", self.start, self.stride, last),
            _ if self.stride == 1 => format!("[{}:]", self.start),
            _ => format!("[{}:{}:]", self.start, self.stride),
        }
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stop {
            Some(stop) => write!(f, "[{}:{}:{})", self.start, self.stride, stop),
            None => write!(f, "[{}:{}:*)", self.start, self.stride),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_count_and_last() {
        let s = Slice::range(0, 2, Some(4)).finish(10).unwrap();
        assert_eq!(s.count(), 3);
        assert_eq!(s.last(), Some(4));
        assert_eq!(s.indices().collect::<Vec<_>>(), vec![0, 2, 4]);
    }

    #[test]
    fn test_whole_resolves_to_size() {
        let s = Slice::whole().finish(7).unwrap();
        assert_eq!(s.count(), 7);
        assert!(!s.constrained);
    }

    #[test]
    fn test_open_range_resolves() {
        let s = Slice::range(3, 1, None).finish(5).unwrap();
        assert_eq!(s.indices().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn test_finish_rejects_bad_slices() {
        assert!(Slice::range(0, 0, Some(3)).finish(10).is_err());
        assert!(Slice::range(0, 1, Some(10)).finish(10).is_err());
        assert!(Slice::range(6, 1, None).finish(5).is_err());
        assert!(Slice::range(5, 1, Some(4)).finish(10).is_err());
        let inverted = Slice {
            start: 4,
            stride: 1,
            stop: Some(2),
            constrained: true,
        };
        assert!(inverted.finish(10).is_err());
    }

    #[test]
    fn test_finish_rejects_empty_constrained_slice_at_end() {
        assert!(Slice::range(10, 1, Some(9)).finish(10).is_err());
        assert!(Slice::range(10, 1, None).finish(10).is_err());
        assert!(Slice::range(5, 1, Some(4)).finish(5).is_err());
        assert!(Slice::range(9, 1, None).finish(10).is_ok());
        assert_eq!(Slice::range(0, 1, None).finish(0).unwrap().count(), 0);
    }

    #[test]
    fn test_constraint_strings() {
        assert_eq!(Slice::whole().to_constraint_string(), "[]");
        assert_eq!(Slice::index(3).to_constraint_string(), "[3]");
        assert_eq!(Slice::range(1, 1, Some(4)).to_constraint_string(), "[1:4]");
        assert_eq!(Slice::range(0, 2, Some(4)).to_constraint_string(), "[0:2:4]");
        assert_eq!(Slice::range(2, 1, None).to_constraint_string(), "[2:]");
        assert_eq!(Slice::range(2, 3, None).to_constraint_string(), "[2:3:]");
    }

    proptest! {
        #[test]
        fn count_matches_indices(start in 0u64..50, stride in 1u64..7, len in 1u64..60) {
            let size = start + len;
            let s = Slice::range(start, stride, None).finish(size).unwrap();
            prop_assert_eq!(s.count() as usize, s.indices().count());
            for i in s.indices() {
                prop_assert!(i < size);
            }
        }
    }
}
