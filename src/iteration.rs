//! Licensed under the Apache License, Version 2.0.
//! See LICENSE for details.
//!
//! Lazy cursors over recorded counts (`spec.md` §4.5). Both iterators here
//! borrow a `&Histogram<C>`; the borrow checker enforces that they cannot
//! outlive a `resize`/`reset` call, which is the Rust realization of "must
//! be invalidated on resize/reset" (`spec.md` §5, §9).

use crate::counter::{Counter, CounterStore};
use crate::histogram::Histogram;

/// One reporting point emitted by an iterator: the value reached, the
/// count at that value, the count folded in since the previous point, the
/// running total, and (for [`PercentileIterator`]) the percentile level
/// reached.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IterationValue {
    pub value_iterated_to: u64,
    pub count_at_value_iterated_to: u64,
    pub count_added_in_this_iteration_step: u64,
    pub total_count_to_this_value: u64,
    pub percentile_iterated_to: f64,
}

/// Visits every counter index with a non-zero count, in ascending value
/// order, terminating after the index holding the final recorded sample.
pub struct RecordedValuesIterator<'a, C: Counter> {
    histogram: &'a Histogram<C>,
    index: usize,
    total_count_to_current_index: u64,
}

impl<'a, C: Counter> RecordedValuesIterator<'a, C> {
    pub(crate) fn new(histogram: &'a Histogram<C>) -> Self {
        Self {
            histogram,
            index: 0,
            total_count_to_current_index: 0,
        }
    }
}

impl<'a, C: Counter> Iterator for RecordedValuesIterator<'a, C> {
    type Item = IterationValue;

    fn next(&mut self) -> Option<IterationValue> {
        let total_count = self.histogram.total_count();
        if total_count == 0 {
            return None;
        }
        while self.index < self.histogram.layout().counts_array_length() {
            let count = self.histogram.counts().get(self.index);
            if count > 0 {
                self.total_count_to_current_index += count;
                let value_iterated_to = self
                    .histogram
                    .layout()
                    .highest_equivalent_value(self.histogram.layout().value_from_index(self.index));
                let result = IterationValue {
                    value_iterated_to,
                    count_at_value_iterated_to: count,
                    count_added_in_this_iteration_step: count,
                    total_count_to_this_value: self.total_count_to_current_index,
                    percentile_iterated_to: 100.0 * self.total_count_to_current_index as f64
                        / total_count as f64,
                };
                self.index += 1;
                return Some(result);
            }
            self.index += 1;
        }
        None
    }
}

/// Visits percentile reporting points spaced so that the distance to 100%
/// halves every `ticks_per_half_distance` steps (`spec.md` §4.5).
pub struct PercentileIterator<'a, C: Counter> {
    histogram: &'a Histogram<C>,
    ticks_per_half_distance: u32,
    index: usize,
    folded: bool,
    total_count_to_current_index: u64,
    count_since_last_emit: u64,
    percentile_level_to_iterate_to: f64,
    done: bool,
}

impl<'a, C: Counter> PercentileIterator<'a, C> {
    pub(crate) fn new(histogram: &'a Histogram<C>, ticks_per_half_distance: u32) -> Self {
        Self {
            histogram,
            ticks_per_half_distance: ticks_per_half_distance.max(1),
            index: 0,
            folded: false,
            total_count_to_current_index: 0,
            count_since_last_emit: 0,
            percentile_level_to_iterate_to: 0.0,
            done: false,
        }
    }
}

impl<'a, C: Counter> Iterator for PercentileIterator<'a, C> {
    type Item = IterationValue;

    fn next(&mut self) -> Option<IterationValue> {
        if self.done {
            return None;
        }
        let total_count = self.histogram.total_count();
        if total_count == 0 {
            self.done = true;
            return None;
        }
        let len = self.histogram.layout().counts_array_length();
        loop {
            if !self.folded {
                if self.index >= len {
                    self.done = true;
                    return None;
                }
                let count = self.histogram.counts().get(self.index);
                self.total_count_to_current_index += count;
                self.count_since_last_emit += count;
                self.folded = true;
            }

            let current_percentile =
                100.0 * self.total_count_to_current_index as f64 / total_count as f64;
            let reached_target = current_percentile >= self.percentile_level_to_iterate_to
                && self.total_count_to_current_index > 0;
            let reached_end = self.total_count_to_current_index >= total_count;

            if reached_target || reached_end {
                let value_iterated_to = self
                    .histogram
                    .layout()
                    .highest_equivalent_value(self.histogram.layout().value_from_index(self.index));
                let result = IterationValue {
                    value_iterated_to,
                    count_at_value_iterated_to: self.histogram.counts().get(self.index),
                    count_added_in_this_iteration_step: self.count_since_last_emit,
                    total_count_to_this_value: self.total_count_to_current_index,
                    percentile_iterated_to: current_percentile.min(100.0),
                };
                self.count_since_last_emit = 0;

                if reached_end {
                    self.done = true;
                } else {
                    let current = self.percentile_level_to_iterate_to;
                    let half_distance = 2f64.powf((100.0 / (100.0 - current)).log2().ceil());
                    let step = 50.0 / (half_distance * self.ticks_per_half_distance as f64);
                    self.percentile_level_to_iterate_to = current + step;
                }
                return Some(result);
            }

            self.index += 1;
            self.folded = false;
        }
    }
}
