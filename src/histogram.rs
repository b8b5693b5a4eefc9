//! Licensed under the Apache License, Version 2.0.
//! See LICENSE for details.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::counter::{Counter, CounterStore, DenseCounterStore};
use crate::iteration::{PercentileIterator, RecordedValuesIterator};
use crate::layout::Layout;
use crate::Error;

static IDENTITY: AtomicU64 = AtomicU64::new(0);

/// Unit in the last place of `x`, used to guard percentile rounding
/// against floating-point slop (`spec.md` §4.4, GLOSSARY).
fn ulp(x: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 {
        return f64::MIN_POSITIVE;
    }
    let next = f64::from_bits(x.to_bits() + 1);
    next - x
}

/// A fixed-memory HDR histogram: records non-negative integer values
/// across a configurable dynamic range with a bounded relative error
/// determined by `significant_figures`. See `spec.md` for the full
/// contract.
#[derive(Clone)]
pub struct Histogram<C: Counter> {
    layout: Layout,
    counts: DenseCounterStore<C>,
    total_count: u64,
    max_value: u64,
    min_non_zero_value: u64,
    start_time_ms: u64,
    end_time_ms: u64,
    auto_resize: bool,
    id: u64,
}

impl<C: Counter> Histogram<C> {
    /// Creates a new, empty histogram. Prefer [`crate::Builder`] for
    /// anything beyond the three core parameters.
    pub fn new(
        lowest_discernible_value: u64,
        highest_trackable_value: u64,
        significant_figures: u8,
        auto_resize: bool,
    ) -> Result<Self, Error> {
        let layout = Layout::new(lowest_discernible_value, highest_trackable_value, significant_figures)?;
        let counts = DenseCounterStore::new(layout.counts_array_length());
        Ok(Self {
            layout,
            counts,
            total_count: 0,
            max_value: 0,
            min_non_zero_value: u64::MAX,
            start_time_ms: 0,
            end_time_ms: 0,
            auto_resize,
            id: IDENTITY.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Returns a zero-count histogram sharing this one's configuration.
    pub fn clone_empty(&self) -> Self {
        Self {
            layout: self.layout,
            counts: DenseCounterStore::new(self.layout.counts_array_length()),
            total_count: 0,
            max_value: 0,
            min_non_zero_value: u64::MAX,
            start_time_ms: 0,
            end_time_ms: 0,
            auto_resize: self.auto_resize,
            id: IDENTITY.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn layout(&self) -> &Layout {
        &self.layout
    }

    pub(crate) fn counts(&self) -> &DenseCounterStore<C> {
        &self.counts
    }

    pub fn auto_resize(&self) -> bool {
        self.auto_resize
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn max(&self) -> u64 {
        self.max_value
    }

    pub fn min(&self) -> u64 {
        if self.total_count == 0 {
            0
        } else {
            self.min_non_zero_value
        }
    }

    pub fn start_time_ms(&self) -> u64 {
        self.start_time_ms
    }

    pub fn end_time_ms(&self) -> u64 {
        self.end_time_ms
    }

    pub fn set_timestamps(&mut self, start_time_ms: u64, end_time_ms: u64) {
        self.start_time_ms = start_time_ms;
        self.end_time_ms = end_time_ms;
    }

    pub fn lowest_equivalent_value(&self, value: u64) -> u64 {
        self.layout.lowest_equivalent_value(value)
    }

    pub fn highest_equivalent_value(&self, value: u64) -> u64 {
        self.layout.highest_equivalent_value(value)
    }

    pub fn median_equivalent_value(&self, value: u64) -> u64 {
        self.layout.median_equivalent_value(value)
    }

    pub fn size_of_equivalent_value_range(&self, value: u64) -> u64 {
        self.layout.size_of_equivalent_value_range(value)
    }

    pub fn values_are_equivalent(&self, a: u64, b: u64) -> bool {
        self.layout.lowest_equivalent_value(a) == self.layout.lowest_equivalent_value(b)
    }

    fn update_min_and_max(&mut self, value: u64) {
        if value > self.max_value {
            self.max_value = value + self.layout.unit_magnitude_mask;
        }
        if value != 0 && value < self.min_non_zero_value {
            self.min_non_zero_value = value & !self.layout.unit_magnitude_mask;
        }
    }

    /// `recordValue(v)` from `spec.md` §4.3.
    pub fn record_value(&mut self, value: u64) -> Result<(), Error> {
        self.record_count_at_value(value, 1)
    }

    /// `recordCountAtValue(c, v)` from `spec.md` §4.3.
    pub fn record_count_at_value(&mut self, value: u64, count: u64) -> Result<(), Error> {
        let index = self.layout.counts_array_index(value);
        let index = if index >= self.layout.counts_array_length() {
            self.handle_record_exception(value)?
        } else {
            index
        };
        self.counts.add_at(index, count)?;
        self.update_min_and_max(value);
        self.total_count += count;
        Ok(())
    }

    fn handle_record_exception(&mut self, value: u64) -> Result<usize, Error> {
        if !self.auto_resize {
            return Err(Error::OutOfRange);
        }
        let mut new_highest = self.layout.highest_trackable_value;
        loop {
            new_highest = new_highest.checked_mul(2).ok_or(Error::OutOfRange)?;
            let candidate = self.layout.resized(new_highest)?;
            if (candidate.get_bucket_index(value) as u32) < candidate.bucket_count {
                self.resize(new_highest)?;
                break;
            }
        }
        Ok(self.layout.counts_array_index(value))
    }

    /// `recordSingleValueWithExpectedInterval` / `recordValueWithCountAndExpectedInterval`
    /// from `spec.md` §4.3.2.
    pub fn record_value_with_expected_interval(
        &mut self,
        value: u64,
        expected_interval: u64,
    ) -> Result<(), Error> {
        self.record_count_at_value_with_expected_interval(value, 1, expected_interval)
    }

    pub fn record_count_at_value_with_expected_interval(
        &mut self,
        value: u64,
        count: u64,
        expected_interval: u64,
    ) -> Result<(), Error> {
        self.record_count_at_value(value, count)?;
        if expected_interval == 0 || value <= expected_interval {
            return Ok(());
        }
        let mut missing_value = value - expected_interval;
        while missing_value >= expected_interval {
            self.record_count_at_value(missing_value, count)?;
            missing_value -= expected_interval;
        }
        Ok(())
    }

    /// Clears all counts and aggregate state, preserving configuration.
    pub fn reset(&mut self) {
        self.counts.fill_zero();
        self.total_count = 0;
        self.max_value = 0;
        self.min_non_zero_value = u64::MAX;
        self.start_time_ms = 0;
        self.end_time_ms = 0;
    }

    /// Grows storage to cover `new_highest_trackable_value`. Never shrinks.
    /// Index meaning is preserved (`spec.md` §4.3.1).
    pub fn resize(&mut self, new_highest_trackable_value: u64) -> Result<(), Error> {
        let mut layout = self.layout.resized(new_highest_trackable_value)?;
        if layout.counts_array_length() < self.layout.counts_array_length() {
            return Ok(());
        }
        self.counts.grow_to(layout.counts_array_length());
        layout.highest_trackable_value =
            layout.highest_equivalent_value(layout.value_from_index(layout.counts_array_length() - 1));
        self.layout = layout;
        Ok(())
    }

    fn same_layout<D: Counter>(&self, other: &Histogram<D>) -> bool {
        self.layout.unit_magnitude == other.layout.unit_magnitude
            && self.layout.sub_bucket_half_count_magnitude == other.layout.sub_bucket_half_count_magnitude
            && self.layout.counts_array_length() == other.layout.counts_array_length()
    }

    /// Adds `other`'s recorded counts into `self`, resizing (if
    /// `auto_resize`) to cover `other`'s range first (`spec.md` §4.4).
    pub fn add<D: Counter>(&mut self, other: &Histogram<D>) -> Result<(), Error> {
        if other.total_count > 0 {
            let self_capacity_highest = self
                .layout
                .highest_equivalent_value(self.layout.value_from_index(self.layout.counts_array_length() - 1));
            if other.max_value > self_capacity_highest {
                if self.auto_resize {
                    self.resize(other.max_value)?;
                } else {
                    return Err(Error::OutOfRange);
                }
            }

            if self.same_layout(other) {
                for i in 0..self.layout.counts_array_length() {
                    let count = other.counts.get(i);
                    if count > 0 {
                        self.counts.add_at(i, count)?;
                        self.total_count += count;
                    }
                }
                if other.max_value > self.max_value {
                    self.max_value = other.max_value;
                }
                if other.min_non_zero_value < self.min_non_zero_value {
                    self.min_non_zero_value = other.min_non_zero_value;
                }
            } else {
                for iv in other.recorded_values() {
                    self.record_count_at_value(iv.value_iterated_to, iv.count_at_value_iterated_to)?;
                }
            }
        }

        self.start_time_ms = self.start_time_ms.min(other.start_time_ms);
        self.end_time_ms = self.end_time_ms.max(other.end_time_ms);
        Ok(())
    }

    fn decrement_count_at_value(&mut self, value: u64, count: u64) -> Result<(), Error> {
        let index = self.layout.counts_array_index(value);
        if index >= self.layout.counts_array_length() {
            return Err(Error::OutOfRange);
        }
        self.counts.sub_at(index, count)?;
        self.total_count = self
            .total_count
            .checked_sub(count)
            .ok_or(Error::CounterOverflow { index, attempted: 0 })?;
        Ok(())
    }

    /// Subtracts `other`'s recorded counts from `self`. Fails rather than
    /// clamping if any resulting count would be negative (`spec.md` §9
    /// Open Questions).
    pub fn subtract<D: Counter>(&mut self, other: &Histogram<D>) -> Result<(), Error> {
        if self.same_layout(other) {
            for i in 0..self.layout.counts_array_length() {
                let count = other.counts.get(i);
                if count > 0 {
                    self.counts.sub_at(i, count)?;
                    self.total_count = self
                        .total_count
                        .checked_sub(count)
                        .ok_or(Error::CounterOverflow { index: i, attempted: 0 })?;
                }
            }
        } else {
            for iv in other.recorded_values() {
                self.decrement_count_at_value(iv.value_iterated_to, iv.count_at_value_iterated_to)?;
            }
        }
        Ok(())
    }

    /// Applies coordinated-omission correction to every value recorded in
    /// `other` and folds the result into `self` (`spec.md` §4.3.2).
    pub fn add_while_correcting_for_coordinated_omission<D: Counter>(
        &mut self,
        other: &Histogram<D>,
        expected_interval: u64,
    ) -> Result<(), Error> {
        for iv in other.recorded_values() {
            self.record_count_at_value_with_expected_interval(
                iv.value_iterated_to,
                iv.count_at_value_iterated_to,
                expected_interval,
            )?;
        }
        Ok(())
    }

    /// Returns a copy of `self` with every recorded value corrected for
    /// coordinated omission at `expected_interval`.
    pub fn copy_corrected_for_coordinated_omission(&self, expected_interval: u64) -> Result<Self, Error> {
        let mut result = self.clone_empty();
        result.add_while_correcting_for_coordinated_omission(self, expected_interval)?;
        Ok(result)
    }

    fn recompute_min_max(&mut self) {
        self.min_non_zero_value = u64::MAX;
        self.max_value = 0;
        for i in 0..self.layout.counts_array_length() {
            if self.counts.get(i) > 0 {
                let value = self.layout.value_from_index(i);
                let low = self.layout.lowest_equivalent_value(value);
                let high = self.layout.highest_equivalent_value(value);
                if low < self.min_non_zero_value {
                    self.min_non_zero_value = low;
                }
                if high > self.max_value {
                    self.max_value = high;
                }
            }
        }
    }

    pub(crate) fn recompute_min_max_after_decode(&mut self) {
        self.recompute_min_max();
    }

    /// Folds a decoded counter delta directly into storage and the running
    /// total, bypassing the range/resize machinery that ordinary recording
    /// goes through (the codec already validated the index against the
    /// decoded layout).
    pub(crate) fn decode_add_at(&mut self, index: usize, delta: u64) -> Result<(), Error> {
        self.counts.add_at(index, delta)?;
        self.total_count += delta;
        Ok(())
    }

    /// `getValueAtPercentile(p)` from `spec.md` §4.4.
    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        let percentile = percentile.clamp(0.0, 100.0);
        if self.total_count == 0 {
            return 0;
        }
        let fractional_count = (percentile / 100.0) * self.total_count as f64;
        let target = ((fractional_count - ulp(fractional_count)).ceil() as i64).max(1) as u64;

        let mut total_to_current = 0u64;
        for i in 0..self.layout.counts_array_length() {
            total_to_current += self.counts.get(i);
            if total_to_current >= target {
                let value = self.layout.value_from_index(i);
                return if percentile == 0.0 {
                    self.layout.lowest_equivalent_value(value)
                } else {
                    self.layout.highest_equivalent_value(value)
                };
            }
        }
        0
    }

    /// `getMean()` from `spec.md` §4.4.
    pub fn mean(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        let mut total_value = 0.0f64;
        for iv in self.recorded_values() {
            total_value +=
                self.layout.median_equivalent_value(iv.value_iterated_to) as f64 * iv.count_at_value_iterated_to as f64;
        }
        total_value / self.total_count as f64
    }

    /// `getStdDeviation()` from `spec.md` §4.4 (population variance, no
    /// Bessel correction).
    pub fn stddev(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let mut sum = 0.0f64;
        for iv in self.recorded_values() {
            let median = self.layout.median_equivalent_value(iv.value_iterated_to) as f64;
            let diff = median - mean;
            sum += diff * diff * iv.count_at_value_iterated_to as f64;
        }
        (sum / self.total_count as f64).sqrt()
    }

    pub fn recorded_values(&self) -> RecordedValuesIterator<'_, C> {
        RecordedValuesIterator::new(self)
    }

    pub fn percentiles(&self, ticks_per_half_distance: u32) -> PercentileIterator<'_, C> {
        PercentileIterator::new(self, ticks_per_half_distance)
    }

    /// Renders the text report described in `spec.md` §6: a header row, one
    /// row per percentile tick, and three summary lines.
    pub fn output_percentile_distribution<W: std::fmt::Write>(
        &self,
        writer: &mut W,
        ticks_per_half_distance: u32,
        scaling_ratio: f64,
    ) -> std::fmt::Result {
        writeln!(writer, "       Value     Percentile TotalCount 1/(1-Percentile)")?;
        for iv in self.percentiles(ticks_per_half_distance) {
            let fraction = iv.percentile_iterated_to / 100.0;
            let inverted = if fraction >= 1.0 {
                f64::INFINITY
            } else {
                1.0 / (1.0 - fraction)
            };
            writeln!(
                writer,
                "{:12.3} {:.12} {:10} {:14.2}",
                iv.value_iterated_to as f64 / scaling_ratio,
                fraction,
                iv.total_count_to_this_value,
                inverted
            )?;
        }
        writeln!(
            writer,
            "#[Mean = {:.3}, StdDeviation = {:.3}]",
            self.mean() / scaling_ratio,
            self.stddev() / scaling_ratio
        )?;
        writeln!(
            writer,
            "#[Max = {:.3}, Total count = {}]",
            self.max() as f64 / scaling_ratio,
            self.total_count
        )?;
        writeln!(
            writer,
            "#[Buckets = {}, SubBuckets = {}]",
            self.layout.bucket_count(),
            self.layout.sub_bucket_count()
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_uniform_1_to_10000() {
        let mut h: Histogram<u64> = Histogram::new(1, 1u64 << 53, 3, false).unwrap();
        for v in 1..=10_000u64 {
            h.record_value(v).unwrap();
        }
        let p50 = h.value_at_percentile(50.0);
        assert!((4990..=5010).contains(&p50), "p50 = {p50}");
        let p99 = h.value_at_percentile(99.0);
        assert!((9890..=9910).contains(&p99), "p99 = {p99}");
        assert_eq!(h.value_at_percentile(100.0), h.highest_equivalent_value(10_000));
    }

    #[test]
    fn s2_constant_value() {
        let mut h: Histogram<u32> = Histogram::new(1, 1_000_000, 3, false).unwrap();
        for _ in 0..5 {
            h.record_value(1).unwrap();
        }
        for p in [0.0, 25.0, 50.0, 99.9, 100.0] {
            assert_eq!(h.value_at_percentile(p), 1);
        }
        assert_eq!(h.mean(), 1.0);
        assert_eq!(h.stddev(), 0.0);
    }

    #[test]
    fn s3_auto_resize_grows_to_cover_value() {
        let mut h: Histogram<u64> = Histogram::new(1, 1_000, 2, true).unwrap();
        h.record_value(1_000_000).unwrap();
        assert_eq!(h.value_at_percentile(100.0), h.highest_equivalent_value(1_000_000));
    }

    #[test]
    fn without_auto_resize_out_of_range_values_fail() {
        let mut h: Histogram<u64> = Histogram::new(1, 1_000, 2, false).unwrap();
        assert!(matches!(h.record_value(1_000_000), Err(Error::OutOfRange)));
    }

    #[test]
    fn s4_expected_interval_synthesizes_missing_samples() {
        let mut h: Histogram<u64> = Histogram::new(1, 100_000, 3, false).unwrap();
        h.record_value_with_expected_interval(1000, 100).unwrap();
        assert_eq!(h.total_count(), 10);
        let mut expected = 100u64;
        for iv in h.recorded_values() {
            assert_eq!(iv.value_iterated_to, h.highest_equivalent_value(expected));
            expected += 100;
        }
    }

    #[test]
    fn s5_merge_equivalence() {
        let mut union: Histogram<u64> = Histogram::new(1, 100_000, 3, false).unwrap();
        let mut h1: Histogram<u64> = Histogram::new(1, 100_000, 3, false).unwrap();
        let mut h2: Histogram<u64> = Histogram::new(1, 100_000, 3, false).unwrap();

        for v in 1..=500u64 {
            union.record_value(v).unwrap();
            h1.record_value(v).unwrap();
        }
        for v in 501..=1000u64 {
            union.record_value(v).unwrap();
            h2.record_value(v).unwrap();
        }

        h1.add(&h2).unwrap();

        for p in [1.0, 25.0, 50.0, 75.0, 99.0, 100.0] {
            assert_eq!(h1.value_at_percentile(p), union.value_at_percentile(p), "p={p}");
        }
        assert_eq!(h1.total_count(), union.total_count());
    }

    #[test]
    fn conservation_of_total_count() {
        let mut h: Histogram<u64> = Histogram::new(1, 1_000_000, 3, false).unwrap();
        for v in [1u64, 2, 2, 3, 3, 3] {
            h.record_value(v).unwrap();
        }
        let sum: u64 = (0..h.layout.counts_array_length()).map(|i| h.counts.get(i)).sum();
        assert_eq!(sum, h.total_count());
        assert_eq!(h.total_count(), 6);
    }

    #[test]
    fn subtract_below_zero_fails() {
        let mut h1: Histogram<u64> = Histogram::new(1, 1_000, 3, false).unwrap();
        let mut h2: Histogram<u64> = Histogram::new(1, 1_000, 3, false).unwrap();
        h1.record_value(10).unwrap();
        h2.record_value(10).unwrap();
        h2.record_value(10).unwrap();
        assert!(h1.subtract(&h2).is_err());
    }

    #[test]
    fn width_independence() {
        let mut narrow: Histogram<u32> = Histogram::new(1, 100_000, 3, false).unwrap();
        let mut wide: Histogram<u64> = Histogram::new(1, 100_000, 3, false).unwrap();
        for v in [5u64, 50, 500, 5_000, 50_000] {
            narrow.record_value(v).unwrap();
            wide.record_value(v).unwrap();
        }
        for p in [10.0, 50.0, 90.0, 100.0] {
            assert_eq!(narrow.value_at_percentile(p), wide.value_at_percentile(p));
        }
    }

    #[test]
    fn monotone_percentile() {
        let mut h: Histogram<u64> = Histogram::new(1, 1_000_000, 3, false).unwrap();
        for v in 1..=2000u64 {
            h.record_value(v * 7 % 997 + 1).unwrap();
        }
        let mut last = 0u64;
        let mut p = 0.0;
        while p <= 100.0 {
            let v = h.value_at_percentile(p);
            assert!(v >= last);
            last = v;
            p += 0.5;
        }
    }

    #[test]
    fn empty_histogram_queries_return_zero() {
        let h: Histogram<u64> = Histogram::new(1, 1_000, 3, false).unwrap();
        assert_eq!(h.value_at_percentile(50.0), 0);
        assert_eq!(h.mean(), 0.0);
        assert_eq!(h.stddev(), 0.0);
        assert_eq!(h.min(), 0);
        assert_eq!(h.max(), 0);
    }

    #[test]
    fn reset_clears_counts_but_keeps_configuration() {
        let mut h: Histogram<u64> = Histogram::new(1, 1_000, 3, false).unwrap();
        h.record_value(10).unwrap();
        h.reset();
        assert_eq!(h.total_count(), 0);
        assert_eq!(h.value_at_percentile(50.0), 0);
        h.record_value(20).unwrap();
        assert_eq!(h.total_count(), 1);
    }
}
