//! Licensed under the Apache License, Version 2.0.
//! See LICENSE for details.

use crate::Error;

/// Restricts the primitive types that may back a histogram's counters. The
/// Rust-native analogue of the teacher crate's per-width `Counter` trait,
/// but with checked rather than saturating arithmetic: overflow must be
/// reported as a structured [`Error::CounterOverflow`], not silently
/// clamped (`spec.md` §4.2, §9 Open Questions).
pub trait Counter: Copy + Default {
    /// The tag embedded in an encoded payload's cookie; one value per width.
    const WIDTH_TAG: u32;

    fn to_u64(self) -> u64;
    fn checked_add_u64(self, delta: u64) -> Option<Self>;
    fn checked_sub_u64(self, delta: u64) -> Option<Self>;
}

macro_rules! impl_counter {
    ($ty:ty, $tag:expr) => {
        impl Counter for $ty {
            const WIDTH_TAG: u32 = $tag;

            fn to_u64(self) -> u64 {
                self as u64
            }

            fn checked_add_u64(self, delta: u64) -> Option<Self> {
                let sum = self as u64 + delta;
                if sum > <$ty>::MAX as u64 {
                    None
                } else {
                    Some(sum as $ty)
                }
            }

            fn checked_sub_u64(self, delta: u64) -> Option<Self> {
                let current = self as u64;
                if delta > current {
                    None
                } else {
                    Some((current - delta) as $ty)
                }
            }
        }
    };
}

impl_counter!(u8, 8);
impl_counter!(u16, 16);
impl_counter!(u32, 32);
impl_counter!(u64, 64);

/// Abstract dense array of non-negative counters (`spec.md` §4.2). A
/// sparse "packed" encoding is an out-of-scope external collaborator; it
/// would implement this same trait.
pub trait CounterStore {
    fn get(&self, index: usize) -> u64;
    fn increment_at(&mut self, index: usize) -> Result<(), Error>;
    fn add_at(&mut self, index: usize, delta: u64) -> Result<(), Error>;
    fn sub_at(&mut self, index: usize, delta: u64) -> Result<(), Error>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn fill_zero(&mut self);
    /// Grows storage to at least `new_len`, preserving existing values at
    /// their existing indices (`spec.md` §4.3.1).
    fn grow_to(&mut self, new_len: usize);
}

/// The one in-tree `CounterStore` implementation: a flat, densely packed
/// array of `C`-width counters.
#[derive(Clone, Debug)]
pub struct DenseCounterStore<C: Counter>(Vec<C>);

impl<C: Counter> DenseCounterStore<C> {
    pub fn new(len: usize) -> Self {
        Self(vec![C::default(); len])
    }
}

impl<C: Counter> CounterStore for DenseCounterStore<C> {
    fn get(&self, index: usize) -> u64 {
        self.0[index].to_u64()
    }

    fn increment_at(&mut self, index: usize) -> Result<(), Error> {
        self.add_at(index, 1)
    }

    fn add_at(&mut self, index: usize, delta: u64) -> Result<(), Error> {
        let slot = &mut self.0[index];
        match slot.checked_add_u64(delta) {
            Some(updated) => {
                *slot = updated;
                Ok(())
            }
            None => Err(Error::CounterOverflow {
                index,
                attempted: slot.to_u64() + delta,
            }),
        }
    }

    fn sub_at(&mut self, index: usize, delta: u64) -> Result<(), Error> {
        let slot = &mut self.0[index];
        match slot.checked_sub_u64(delta) {
            Some(updated) => {
                *slot = updated;
                Ok(())
            }
            None => Err(Error::CounterOverflow {
                index,
                attempted: slot.to_u64().wrapping_sub(delta),
            }),
        }
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn fill_zero(&mut self) {
        for slot in self.0.iter_mut() {
            *slot = C::default();
        }
    }

    fn grow_to(&mut self, new_len: usize) {
        if new_len > self.0.len() {
            self.0.resize(new_len, C::default());
        }
    }
}
