//! Licensed under the Apache License, Version 2.0.
//! See LICENSE for details.
//!
//! A fixed-memory HDR (High Dynamic Range) histogram: records non-negative
//! integer values across a configurable dynamic range while guaranteeing a
//! bounded relative error determined by a chosen number of significant
//! decimal digits. Recording is O(1); storage is independent of input
//! cardinality; percentile/mean/stddev queries are O(counts array length).
//!
//! See `spec.md` and `SPEC_FULL.md` in the repository root for the full
//! contract this crate implements.

mod builder;
mod codec;
mod counter;
mod error;
mod histogram;
mod iteration;
mod layout;

pub use builder::Builder;
pub use counter::{Counter, CounterStore, DenseCounterStore};
pub use error::Error;
pub use histogram::Histogram;
pub use iteration::{IterationValue, PercentileIterator, RecordedValuesIterator};
pub use layout::Layout;

pub use codec::{decode, encode};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build() {
        let h: Histogram<u8> = Builder::new()
            .highest_trackable_value(255)
            .significant_figures(3)
            .build()
            .unwrap();
        assert_eq!(h.value_at_percentile(0.0), 0);

        let mut h: Histogram<u16> = Builder::new()
            .highest_trackable_value(10_000)
            .significant_figures(3)
            .build()
            .unwrap();
        assert_eq!(h.value_at_percentile(0.0), 0);
        h.record_value(1).unwrap();
        assert_eq!(h.value_at_percentile(0.0), h.lowest_equivalent_value(1));
        assert_eq!(h.value_at_percentile(100.0), h.highest_equivalent_value(1));
        assert!(matches!(h.record_value(65_535), Err(Error::OutOfRange)));
    }
}
