//! Licensed under the Apache License, Version 2.0.
//! See LICENSE for details.

use crate::counter::Counter;
use crate::histogram::Histogram;
use crate::Error;

/// Chained setters over the constructor config table in `spec.md` §6.
/// `auto_resize` defaults to `true` unless `highest_trackable_value` is
/// explicitly supplied, matching the table's "(default true unless H
/// supplied)" note.
#[derive(Clone, Copy, Debug)]
pub struct Builder {
    lowest_discernible_value: u64,
    highest_trackable_value: u64,
    significant_figures: u8,
    auto_resize: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            lowest_discernible_value: 1,
            highest_trackable_value: 2,
            significant_figures: 3,
            auto_resize: true,
        }
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lowest_discernible_value(mut self, value: u64) -> Self {
        self.lowest_discernible_value = value;
        self
    }

    pub fn highest_trackable_value(mut self, value: u64) -> Self {
        self.highest_trackable_value = value;
        self.auto_resize = false;
        self
    }

    pub fn significant_figures(mut self, digits: u8) -> Self {
        self.significant_figures = digits;
        self
    }

    pub fn auto_resize(mut self, enabled: bool) -> Self {
        self.auto_resize = enabled;
        self
    }

    pub fn build<C: Counter>(self) -> Result<Histogram<C>, Error> {
        Histogram::new(
            self.lowest_discernible_value,
            self.highest_trackable_value,
            self.significant_figures,
            self.auto_resize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_builder_matches_documented_defaults() {
        let h: Histogram<u64> = Builder::new().build().unwrap();
        assert!(h.auto_resize());
    }

    #[test]
    fn supplying_highest_disables_auto_resize_by_default() {
        let h: Histogram<u64> = Builder::new().highest_trackable_value(1_000_000).build().unwrap();
        assert!(!h.auto_resize());
    }

    #[test]
    fn explicit_auto_resize_overrides_the_implicit_default() {
        let h: Histogram<u64> = Builder::new()
            .highest_trackable_value(1_000_000)
            .auto_resize(true)
            .build()
            .unwrap();
        assert!(h.auto_resize());
    }
}
