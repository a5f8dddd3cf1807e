//! The lazily built secondary index of an [`EconomicTable`].
//!
//! Two arrays of 1-based slot references (0 = none):
//! - `buckets`, a power-of-two array mapping a mixed hash to the most recently
//!   linked slot of that bucket.
//! - `chain`, parallel to the table's storage, holding for every indexed slot
//!   the next slot of its collision chain.
//!
//! Both arrays store references at the narrowest width the table capacity
//! allows, so a small table pays a byte per bucket and per slot.
//!
//! [`EconomicTable`]: crate::EconomicTable

use alloc::boxed::Box;
use alloc::vec;

/// Capacity from which slot references need two bytes.
pub(crate) const LARGE: usize = 1 << 8;

/// Capacity from which slot references need four bytes.
pub(crate) const VERY_LARGE: usize = 1 << 16;

/// Storage width of the slot references in a hash index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexWidth {
    /// One byte per reference, tables with a capacity below 256.
    Byte,
    /// Two bytes per reference, tables with a capacity below 65536.
    Short,
    /// Four bytes per reference.
    Int,
}

impl IndexWidth {
    /// The narrowest width able to reference every slot of a table with
    /// `capacity` slots.
    #[inline]
    pub(crate) fn for_capacity(capacity: usize) -> Self {
        if capacity < LARGE {
            IndexWidth::Byte
        } else if capacity < VERY_LARGE {
            IndexWidth::Short
        } else {
            IndexWidth::Int
        }
    }

    /// Size of one reference in bytes.
    pub fn bytes(self) -> usize {
        match self {
            IndexWidth::Byte => 1,
            IndexWidth::Short => 2,
            IndexWidth::Int => 4,
        }
    }
}

#[derive(Debug, Clone)]
enum SlotRefs {
    Byte(Box<[u8]>),
    Short(Box<[u16]>),
    Int(Box<[u32]>),
}

impl SlotRefs {
    fn zeroed(width: IndexWidth, len: usize) -> Self {
        match width {
            IndexWidth::Byte => SlotRefs::Byte(vec![0; len].into_boxed_slice()),
            IndexWidth::Short => SlotRefs::Short(vec![0; len].into_boxed_slice()),
            IndexWidth::Int => SlotRefs::Int(vec![0; len].into_boxed_slice()),
        }
    }

    #[inline]
    fn len(&self) -> usize {
        match self {
            SlotRefs::Byte(refs) => refs.len(),
            SlotRefs::Short(refs) => refs.len(),
            SlotRefs::Int(refs) => refs.len(),
        }
    }

    #[inline]
    fn width(&self) -> IndexWidth {
        match self {
            SlotRefs::Byte(_) => IndexWidth::Byte,
            SlotRefs::Short(_) => IndexWidth::Short,
            SlotRefs::Int(_) => IndexWidth::Int,
        }
    }

    /// Reads the slot referenced at `at`.
    #[inline]
    fn get(&self, at: usize) -> Option<usize> {
        let raw = match self {
            SlotRefs::Byte(refs) => refs[at] as usize,
            SlotRefs::Short(refs) => refs[at] as usize,
            SlotRefs::Int(refs) => refs[at] as usize,
        };
        raw.checked_sub(1)
    }

    /// Stores a reference to `slot` at `at`, or clears it.
    #[inline]
    fn set(&mut self, at: usize, slot: Option<usize>) {
        let raw = slot.map_or(0, |slot| slot + 1);
        match self {
            SlotRefs::Byte(refs) => {
                debug_assert!(raw <= u8::MAX as usize);
                refs[at] = raw as u8;
            }
            SlotRefs::Short(refs) => {
                debug_assert!(raw <= u16::MAX as usize);
                refs[at] = raw as u16;
            }
            SlotRefs::Int(refs) => {
                debug_assert!(raw <= u32::MAX as usize);
                refs[at] = raw as u32;
            }
        }
    }

    /// Reallocates to `len` references, keeping the existing prefix.
    fn resize(&mut self, len: usize) {
        fn resized<T: Copy + Default>(refs: &[T], len: usize) -> Box<[T]> {
            let mut grown = vec![T::default(); len];
            let keep = refs.len().min(len);
            grown[..keep].copy_from_slice(&refs[..keep]);
            grown.into_boxed_slice()
        }

        *self = match self {
            SlotRefs::Byte(refs) => SlotRefs::Byte(resized(refs, len)),
            SlotRefs::Short(refs) => SlotRefs::Short(resized(refs, len)),
            SlotRefs::Int(refs) => SlotRefs::Int(resized(refs, len)),
        };
    }
}

/// Folds the upper bits of a 64-bit hash into the bits used for bucket
/// selection.
#[inline(always)]
fn mix(hash: u64) -> usize {
    let folded = hash ^ (hash >> 32);
    (folded ^ (folded >> 16)) as usize
}

/// Bucket count for an index over `live` entries.
///
/// The smallest power of two above `live`, starting the search at the
/// strategy's threshold, doubled to keep chains short. Byte-wide indices are
/// cheap enough to be doubled once more.
pub(crate) fn bucket_count_for(live: usize, threshold: usize, width: IndexWidth) -> usize {
    let mut buckets = threshold.max(1).next_power_of_two();
    while buckets <= live {
        buckets <<= 1;
    }
    buckets <<= 1;
    if width == IndexWidth::Byte {
        buckets <<= 1;
    }
    buckets
}

#[derive(Debug, Clone)]
pub(crate) struct HashIndex {
    buckets: SlotRefs,
    chain: SlotRefs,
}

impl HashIndex {
    /// Creates an empty index of `bucket_count` buckets for a table of
    /// `capacity` slots.
    pub(crate) fn new(bucket_count: usize, capacity: usize, width: IndexWidth) -> Self {
        debug_assert!(bucket_count.is_power_of_two());
        debug_assert!(width >= IndexWidth::for_capacity(capacity));
        Self {
            buckets: SlotRefs::zeroed(width, bucket_count),
            chain: SlotRefs::zeroed(width, capacity),
        }
    }

    #[inline]
    pub(crate) fn width(&self) -> IndexWidth {
        self.buckets.width()
    }

    #[inline]
    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub(crate) fn bucket_for(&self, hash: u64) -> usize {
        mix(hash) & (self.buckets.len() - 1)
    }

    /// The most recently linked slot of `bucket`.
    #[inline]
    pub(crate) fn head(&self, bucket: usize) -> Option<usize> {
        self.buckets.get(bucket)
    }

    /// The slot following `slot` in its collision chain.
    #[inline]
    pub(crate) fn next(&self, slot: usize) -> Option<usize> {
        self.chain.get(slot)
    }

    /// Makes `slot` the head of `bucket`, chaining the previous head behind
    /// it. Returns `true` if the bucket was already in use.
    #[inline]
    pub(crate) fn link(&mut self, bucket: usize, slot: usize) -> bool {
        let previous = self.buckets.get(bucket);
        self.chain.set(slot, previous);
        self.buckets.set(bucket, Some(slot));
        previous.is_some()
    }

    /// Detaches `slot` from `bucket`, `before` being its predecessor in the
    /// chain or `None` if it is the head.
    #[inline]
    pub(crate) fn unlink(&mut self, bucket: usize, slot: usize, before: Option<usize>) {
        let after = self.chain.get(slot);
        match before {
            None => {
                debug_assert_eq!(self.buckets.get(bucket), Some(slot));
                self.buckets.set(bucket, after);
            }
            Some(before) => {
                debug_assert_eq!(self.chain.get(before), Some(slot));
                self.chain.set(before, after);
            }
        }
        self.chain.set(slot, None);
    }

    /// Resizes the chain array to follow a change of table capacity.
    pub(crate) fn resize_chain(&mut self, capacity: usize) {
        debug_assert!(self.width() >= IndexWidth::for_capacity(capacity));
        self.chain.resize(capacity);
    }

    /// Heap bytes held by the index.
    #[cfg(any(test, feature = "stats"))]
    pub(crate) fn heap_bytes(&self) -> usize {
        (self.buckets.len() + self.chain.len()) * self.width().bytes()
    }

    /// Length of the collision chain rooted at every non-empty bucket.
    #[cfg(any(test, feature = "stats"))]
    pub(crate) fn chain_lengths(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.bucket_count()).filter_map(move |bucket| {
            let mut cursor = self.head(bucket)?;
            let mut length = 1;
            while let Some(next) = self.next(cursor) {
                cursor = next;
                length += 1;
            }
            Some(length)
        })
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    #[test]
    fn width_follows_capacity_boundaries() {
        assert_eq!(IndexWidth::for_capacity(0), IndexWidth::Byte);
        assert_eq!(IndexWidth::for_capacity(LARGE - 1), IndexWidth::Byte);
        assert_eq!(IndexWidth::for_capacity(LARGE), IndexWidth::Short);
        assert_eq!(IndexWidth::for_capacity(VERY_LARGE - 1), IndexWidth::Short);
        assert_eq!(IndexWidth::for_capacity(VERY_LARGE), IndexWidth::Int);
        assert!(IndexWidth::Byte < IndexWidth::Short);
        assert!(IndexWidth::Short < IndexWidth::Int);
    }

    #[test]
    fn bucket_count_is_power_of_two_above_live() {
        assert_eq!(bucket_count_for(5, 4, IndexWidth::Byte), 32);
        assert_eq!(bucket_count_for(5, 4, IndexWidth::Short), 16);
        assert_eq!(bucket_count_for(9, 8, IndexWidth::Byte), 64);
        for live in 0..2000 {
            let buckets = bucket_count_for(live, 4, IndexWidth::Int);
            assert!(buckets.is_power_of_two());
            assert!(buckets > live * 2);
        }
    }

    #[test]
    fn link_builds_newest_first_chain() {
        let mut index = HashIndex::new(8, 16, IndexWidth::Byte);
        assert!(!index.link(3, 0));
        assert!(index.link(3, 5));
        assert!(index.link(3, 9));

        let mut chain = Vec::new();
        let mut cursor = index.head(3);
        while let Some(slot) = cursor {
            chain.push(slot);
            cursor = index.next(slot);
        }
        assert_eq!(chain, [9, 5, 0]);
        assert_eq!(index.head(2), None);
    }

    #[test]
    fn unlink_head_middle_and_tail() {
        let mut index = HashIndex::new(4, 8, IndexWidth::Short);
        for slot in [1, 2, 3, 4] {
            index.link(1, slot);
        }

        index.unlink(1, 4, None);
        assert_eq!(index.head(1), Some(3));
        index.unlink(1, 2, Some(3));
        assert_eq!(index.next(3), Some(1));
        index.unlink(1, 1, Some(3));
        assert_eq!(index.next(3), None);
        index.unlink(1, 3, None);
        assert_eq!(index.head(1), None);
        assert_eq!(index.chain_lengths().count(), 0);
    }

    #[test]
    fn resize_chain_keeps_links() {
        let mut index = HashIndex::new(4, 4, IndexWidth::Byte);
        index.link(0, 0);
        index.link(0, 3);
        index.resize_chain(12);
        index.link(0, 11);

        assert_eq!(index.head(0), Some(11));
        assert_eq!(index.next(11), Some(3));
        assert_eq!(index.next(3), Some(0));
        assert_eq!(index.heap_bytes(), 16);
    }

    #[test]
    fn widest_references_round_trip() {
        let mut index = HashIndex::new(2, 255, IndexWidth::Byte);
        index.link(1, 254);
        assert_eq!(index.head(1), Some(254));

        let mut index = HashIndex::new(2, VERY_LARGE - 1, IndexWidth::Short);
        index.link(0, VERY_LARGE - 2);
        assert_eq!(index.head(0), Some(VERY_LARGE - 2));

        let mut index = HashIndex::new(2, VERY_LARGE + 1, IndexWidth::Int);
        index.link(0, VERY_LARGE);
        assert_eq!(index.head(0), Some(VERY_LARGE));
    }

    #[test]
    fn mix_uses_high_bits() {
        let index = HashIndex::new(16, 4, IndexWidth::Byte);
        assert_ne!(index.bucket_for(1 << 33), index.bucket_for(0));
        assert_ne!(index.bucket_for(1 << 17), index.bucket_for(0));
    }
}
