//! The storage engine shared by [`EconomicMap`] and [`EconomicSet`].
//!
//! Entries live in a flat array in insertion order. Removal leaves a
//! tombstone behind, so slot indices stay stable until the table is
//! compacted. Small tables are searched linearly; once a table holds more
//! entries than its strategy's hash threshold, a hash index with collision
//! chains is built over the slots (see [`hash_index`](crate::hash_index)).
//!
//! The table does not own its [`Equivalence`]: every operation that compares
//! or hashes keys takes the strategy as an argument, so the map and set
//! wrappers decide how it is stored.
//!
//! [`EconomicMap`]: crate::EconomicMap
//! [`EconomicSet`]: crate::EconomicSet

use alloc::vec::Vec;
use core::fmt::Debug;
use core::iter::FusedIterator;

use crate::equivalence::Equivalence;
use crate::hash_index::HashIndex;
use crate::hash_index::IndexWidth;
use crate::hash_index::bucket_count_for;

/// Capacity of the first allocation of a table.
pub const INITIAL_CAPACITY: usize = 4;

/// Lower bound on the number of slots added by growth or by one compaction
/// sizing step.
pub const MIN_CAPACITY_INCREASE: usize = 8;

/// Largest number of slots a table may have.
pub const MAX_CAPACITY: usize = (u32::MAX >> 1) as usize;

/// Growth adds `capacity / GROWTH_DIVISOR` slots (at least
/// [`MIN_CAPACITY_INCREASE`]).
///
/// Candidate for workload-specific tuning.
pub const GROWTH_DIVISOR: usize = 2;

/// A table compacts once `numerator / denominator` of its used slots are
/// tombstones. Checked after removals and before growing a full table.
///
/// Candidate for workload-specific tuning.
pub const COMPACTION_RATIO: (usize, usize) = (3, 4);

/// Compaction sizes the new array in steps of `size / COMPACTION_STEP_DIVISOR`
/// (at least [`MIN_CAPACITY_INCREASE`]) starting from [`INITIAL_CAPACITY`].
pub const COMPACTION_STEP_DIVISOR: usize = 4;

/// A colliding insertion rebuilds the index instead of chaining once the
/// live entries reach `numerator / denominator` of the bucket count.
pub const REHASH_LOAD: (usize, usize) = (3, 4);

#[cold]
#[inline(never)]
fn capacity_overflow() -> ! {
    panic!("capacity overflow")
}

#[cold]
#[inline(never)]
fn cursor_not_on_entry() -> ! {
    panic!("cursor is not positioned on an entry; call `advance` first")
}

/// Statistics about the layout of a table.
///
/// Available under `cfg(test)` or with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct TableStats {
    /// Live entries.
    pub live: usize,
    /// Used slots, live entries plus tombstones.
    pub total: usize,
    /// Tombstoned slots.
    pub tombstones: usize,
    /// Allocated slots.
    pub capacity: usize,
    /// Width of the hash index references, `None` while lookups are linear.
    pub index_width: Option<IndexWidth>,
    /// Buckets in the hash index.
    pub bucket_count: usize,
    /// `chain_histogram[n]` is the number of buckets with a chain of `n`
    /// entries; bucket count minus the sum is the number of empty buckets.
    pub chain_histogram: Vec<usize>,
    /// Longest collision chain.
    pub longest_chain: usize,
    /// Live entries per bucket.
    pub load_factor: f64,
    /// Heap bytes held by the hash index.
    pub index_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl TableStats {
    /// Pretty-print the statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Economic Table Statistics ===");
        println!(
            "Entries: {} live, {} tombstones, {}/{} slots used",
            self.live, self.tombstones, self.total, self.capacity
        );
        match self.index_width {
            None => println!("Index: none (linear lookups)"),
            Some(width) => {
                println!(
                    "Index: {} buckets x {} byte(s), {} bytes, load factor {:.2}",
                    self.bucket_count,
                    width.bytes(),
                    self.index_bytes,
                    self.load_factor
                );
                println!("Longest chain: {}", self.longest_chain);
                for (length, &buckets) in self.chain_histogram.iter().enumerate().skip(1) {
                    if buckets > 0 {
                        println!("  chain {:>3}: {} bucket(s)", length, buckets);
                    }
                }
            }
        }
    }
}

/// An insertion-ordered table of key-value pairs.
///
/// This is the raw engine behind [`EconomicMap`](crate::EconomicMap) and
/// [`EconomicSet`](crate::EconomicSet). Every operation that looks at keys
/// takes the [`Equivalence`] to compare and hash them with; callers must
/// pass the same strategy for the lifetime of the table.
///
/// # Examples
///
/// ```rust
/// # #[cfg(any(feature = "std", feature = "foldhash"))]
/// # {
/// use economic_table::EconomicTable;
/// use economic_table::equivalence::Equality;
///
/// let strategy = Equality::new();
/// let mut table = EconomicTable::new();
/// table.insert(&strategy, "one", 1);
/// table.insert(&strategy, "two", 2);
///
/// assert_eq!(table.get(&strategy, &"two"), Some(&2));
/// assert_eq!(table.remove(&strategy, &"one"), Some(("one", 1)));
/// assert_eq!(table.len(), 1);
/// # }
/// ```
pub struct EconomicTable<K, V> {
    slots: Vec<Option<(K, V)>>,
    capacity: usize,
    deleted: usize,

    index: Option<HashIndex>,
    index_width: IndexWidth,
}

impl<K, V> Debug for EconomicTable<K, V>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EconomicTable")
            .field("slots", &self.slots)
            .field("deleted", &self.deleted)
            .field("capacity", &self.capacity)
            .field("index", &self.index.as_ref().map(HashIndex::width))
            .finish()
    }
}

impl<K, V> Clone for EconomicTable<K, V>
where
    K: Clone,
    V: Clone,
{
    fn clone(&self) -> Self {
        let mut slots = Vec::with_capacity(self.capacity);
        slots.extend(self.slots.iter().cloned());

        Self {
            slots,
            capacity: self.capacity,
            deleted: self.deleted,
            index: self.index.clone(),
            index_width: self.index_width,
        }
    }
}

impl<K, V> Default for EconomicTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> EconomicTable<K, V> {
    /// Creates an empty table. Nothing is allocated until the first insert.
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            capacity: 0,
            deleted: 0,
            index: None,
            index_width: IndexWidth::Byte,
        }
    }

    /// Creates an empty table able to hold `capacity` entries without
    /// growing.
    ///
    /// Hints up to [`INITIAL_CAPACITY`] do not allocate.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_CAPACITY`].
    pub fn with_capacity(capacity: usize) -> Self {
        let mut table = Self::new();
        if capacity > INITIAL_CAPACITY {
            if capacity > MAX_CAPACITY {
                capacity_overflow();
            }
            table.slots.reserve_exact(capacity);
            table.capacity = capacity;
        }
        table
    }

    /// Returns the number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len() - self.deleted
    }

    /// Returns `true` if the table has no live entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of slots allocated, live or not.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of tombstoned slots awaiting compaction.
    #[inline]
    pub fn tombstones(&self) -> usize {
        self.deleted
    }

    /// Returns the reference width of the hash index, or `None` while the
    /// table is searched linearly.
    #[inline]
    pub fn index_width(&self) -> Option<IndexWidth> {
        self.index.as_ref().map(HashIndex::width)
    }

    #[inline]
    fn total(&self) -> usize {
        self.slots.len()
    }

    /// Removes every entry and releases the storage.
    pub fn clear(&mut self) {
        self.slots = Vec::new();
        self.capacity = 0;
        self.deleted = 0;
        self.index = None;
    }

    /// Returns an iterator over the entries in insertion order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: self.slots.iter(),
            remaining: self.len(),
        }
    }

    /// Returns an iterator over the entries in insertion order, with mutable
    /// values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        let remaining = self.len();
        IterMut {
            slots: self.slots.iter_mut(),
            remaining,
        }
    }

    /// Replaces every value with the result of `f`, in insertion order.
    pub fn replace_all(&mut self, mut f: impl FnMut(&K, &V) -> V) {
        for (key, value) in self.slots.iter_mut().flatten() {
            *value = f(key, value);
        }
    }

    fn scan<E>(slots: &[Option<(K, V)>], strategy: &E, key: &K) -> Option<usize>
    where
        E: Equivalence<K>,
    {
        slots.iter().position(|slot| {
            matches!(slot, Some((candidate, _)) if strategy.equivalent(candidate, key))
        })
    }

    fn find_slot<E>(&self, strategy: &E, key: &K) -> Option<usize>
    where
        E: Equivalence<K>,
    {
        let Some(index) = &self.index else {
            return Self::scan(&self.slots, strategy, key);
        };

        let mut cursor = index.head(index.bucket_for(strategy.hash(key)));
        while let Some(slot) = cursor {
            debug_assert!(self.slots[slot].is_some(), "tombstone {slot} still indexed");
            if let Some((candidate, _)) = &self.slots[slot]
                && strategy.equivalent(candidate, key)
            {
                return Some(slot);
            }
            cursor = index.next(slot);
        }
        None
    }

    /// Returns `true` if the table holds `key`.
    pub fn contains_key<E>(&self, strategy: &E, key: &K) -> bool
    where
        E: Equivalence<K>,
    {
        self.find_slot(strategy, key).is_some()
    }

    /// Returns the stored key and value for `key`.
    pub fn get_key_value<E>(&self, strategy: &E, key: &K) -> Option<(&K, &V)>
    where
        E: Equivalence<K>,
    {
        let slot = self.find_slot(strategy, key)?;
        self.slots[slot].as_ref().map(|(k, v)| (k, v))
    }

    /// Returns the value stored for `key`.
    pub fn get<E>(&self, strategy: &E, key: &K) -> Option<&V>
    where
        E: Equivalence<K>,
    {
        self.get_key_value(strategy, key).map(|(_, v)| v)
    }

    /// Returns the value stored for `key`, mutably.
    pub fn get_mut<E>(&mut self, strategy: &E, key: &K) -> Option<&mut V>
    where
        E: Equivalence<K>,
    {
        let slot = self.find_slot(strategy, key)?;
        self.slots[slot].as_mut().map(|(_, v)| v)
    }

    /// Inserts `value` for `key`, returning the previous value.
    ///
    /// An existing entry keeps its position; a new entry is appended after
    /// all others.
    pub fn insert<E>(&mut self, strategy: &E, key: K, value: V) -> Option<V>
    where
        E: Equivalence<K>,
    {
        if let Some(slot) = self.find_slot(strategy, &key) {
            return self.slots[slot]
                .as_mut()
                .map(|(_, current)| core::mem::replace(current, value));
        }

        self.append(strategy, key, value);
        None
    }

    /// Returns the value for `key`, inserting the result of `default` first
    /// if the key is absent.
    pub fn get_or_insert_with<E>(
        &mut self,
        strategy: &E,
        key: K,
        default: impl FnOnce() -> V,
    ) -> &mut V
    where
        E: Equivalence<K>,
    {
        let slot = match self.find_slot(strategy, &key) {
            Some(slot) => slot,
            None => self.append(strategy, key, default()),
        };
        match &mut self.slots[slot] {
            Some((_, value)) => value,
            None => unreachable!("slot {slot} was just looked up or written"),
        }
    }

    /// Removes `key`, returning the stored key and value.
    pub fn remove<E>(&mut self, strategy: &E, key: &K) -> Option<(K, V)>
    where
        E: Equivalence<K>,
    {
        let slot = if self.index.is_some() {
            self.unlink_where(strategy.hash(key), |_, candidate| {
                strategy.equivalent(candidate, key)
            })?
        } else {
            Self::scan(&self.slots, strategy, key)?
        };

        let resume = self.total();
        self.release(strategy, slot, resume).0
    }

    /// Keeps only the entries for which `f` returns `true`.
    pub fn retain<E>(&mut self, strategy: &E, mut f: impl FnMut(&K, &mut V) -> bool)
    where
        E: Equivalence<K>,
    {
        let mut cursor = self.cursor(strategy);
        while cursor.advance() {
            let (key, value) = cursor.entry_mut();
            if !f(key, value) {
                cursor.remove();
            }
        }
    }

    /// Returns a cursor over the entries that can remove the entry it is
    /// positioned on.
    pub fn cursor<'a, E>(&'a mut self, strategy: &'a E) -> RawCursor<'a, K, V, E>
    where
        E: Equivalence<K>,
    {
        RawCursor {
            table: self,
            strategy,
            position: 0,
            current: None,
        }
    }

    /// Appends a new entry and returns its slot.
    fn append<E>(&mut self, strategy: &E, key: K, value: V) -> usize
    where
        E: Equivalence<K>,
    {
        if self.total() == self.capacity {
            self.make_room(strategy);
        }
        debug_assert!(self.total() < self.capacity);

        let slot = self.total();
        self.slots.push(Some((key, value)));

        if self.index.is_some() {
            self.index_slot(strategy, slot);
        } else if self.total() > strategy.hash_threshold() {
            self.rebuild_index(strategy);
        }
        slot
    }

    /// Links a freshly appended slot into the hash index.
    fn index_slot<E>(&mut self, strategy: &E, slot: usize)
    where
        E: Equivalence<K>,
    {
        let Some((key, _)) = &self.slots[slot] else {
            return;
        };
        let hash = strategy.hash(key);
        let live = self.len();

        let Some(index) = self.index.as_mut() else {
            return;
        };
        let bucket = index.bucket_for(hash);
        let crowded = live * REHASH_LOAD.1 >= index.bucket_count() * REHASH_LOAD.0;
        if crowded && index.head(bucket).is_some() {
            // The new slot is already stored, so the rebuild picks it up.
            self.rebuild_index(strategy);
        } else {
            index.link(bucket, slot);
        }
    }

    /// Builds a fresh hash index over all live slots.
    fn rebuild_index<E>(&mut self, strategy: &E)
    where
        E: Equivalence<K>,
    {
        self.index_width = self.index_width.max(IndexWidth::for_capacity(self.capacity));
        let bucket_count =
            bucket_count_for(self.len(), strategy.hash_threshold(), self.index_width);

        let mut index = HashIndex::new(bucket_count, self.capacity, self.index_width);
        for (slot, entry) in self.slots.iter().enumerate() {
            if let Some((key, _)) = entry {
                let bucket = index.bucket_for(strategy.hash(key));
                index.link(bucket, slot);
            }
        }
        self.index = Some(index);
    }

    /// Walks the chain for `hash`, unlinking and returning the first slot
    /// accepted by `is_target`.
    fn unlink_where(
        &mut self,
        hash: u64,
        is_target: impl Fn(usize, &K) -> bool,
    ) -> Option<usize> {
        let index = self.index.as_mut()?;
        let bucket = index.bucket_for(hash);

        let mut before = None;
        let mut cursor = index.head(bucket);
        while let Some(slot) = cursor {
            if let Some((key, _)) = &self.slots[slot]
                && is_target(slot, key)
            {
                index.unlink(bucket, slot, before);
                return Some(slot);
            }
            before = Some(slot);
            cursor = index.next(slot);
        }
        None
    }

    /// Tombstones an unlinked slot, trimming trailing tombstones, and
    /// compacts if enough of the table is dead.
    ///
    /// `resume` is a slot position the caller wants to keep track of; the
    /// returned position addresses the same live entry after compaction.
    fn release<E>(
        &mut self,
        strategy: &E,
        slot: usize,
        resume: usize,
    ) -> (Option<(K, V)>, usize)
    where
        E: Equivalence<K>,
    {
        let entry = self.slots[slot].take();
        debug_assert!(entry.is_some());

        if slot + 1 == self.total() {
            self.slots.pop();
            while let Some(None) = self.slots.last() {
                self.slots.pop();
                self.deleted -= 1;
            }
        } else {
            self.deleted += 1;
        }

        let resume = resume.min(self.total());
        if self.should_compact() {
            (entry, self.compact(strategy, resume))
        } else {
            (entry, resume)
        }
    }

    #[inline]
    fn should_compact(&self) -> bool {
        self.capacity > INITIAL_CAPACITY
            && self.deleted > 0
            && self.deleted * COMPACTION_RATIO.1 >= self.total() * COMPACTION_RATIO.0
    }

    /// Makes room for one more slot in a full table.
    fn make_room<E>(&mut self, strategy: &E)
    where
        E: Equivalence<K>,
    {
        if self.capacity == 0 {
            self.slots.reserve_exact(INITIAL_CAPACITY);
            self.capacity = INITIAL_CAPACITY;
        } else if self.should_compact() {
            self.compact(strategy, self.total());
        } else {
            self.grow(strategy);
        }
    }

    fn grow<E>(&mut self, strategy: &E)
    where
        E: Equivalence<K>,
    {
        let increase = (self.capacity / GROWTH_DIVISOR).max(MIN_CAPACITY_INCREASE);
        let new_capacity = self
            .capacity
            .checked_add(increase)
            .filter(|&capacity| capacity <= MAX_CAPACITY)
            .unwrap_or_else(|| capacity_overflow());

        self.slots.reserve_exact(new_capacity - self.total());
        self.capacity = new_capacity;

        let widened = IndexWidth::for_capacity(new_capacity) > self.index_width;
        if widened {
            // Rebuild at the new reference width.
            if self.index.is_some() {
                self.rebuild_index(strategy);
            }
        } else if let Some(index) = self.index.as_mut() {
            index.resize_chain(new_capacity);
        }
    }

    /// Rewrites the live entries densely, in order, into the smallest
    /// capacity step that holds them.
    ///
    /// Returns where the entry previously at slot `resume` (or the first live
    /// entry after it) now lives.
    fn compact<E>(&mut self, strategy: &E, resume: usize) -> usize
    where
        E: Equivalence<K>,
    {
        let live = self.len();
        let mut new_capacity = INITIAL_CAPACITY;
        while new_capacity <= live {
            new_capacity += (new_capacity / COMPACTION_STEP_DIVISOR).max(MIN_CAPACITY_INCREASE);
        }
        let new_capacity = new_capacity.min(self.capacity);
        debug_assert!(new_capacity > live);

        let mut slots = Vec::with_capacity(new_capacity);
        let mut resumed = live;
        for (slot, entry) in core::mem::take(&mut self.slots).into_iter().enumerate() {
            if slot == resume {
                resumed = slots.len();
            }
            if entry.is_some() {
                slots.push(entry);
            }
        }

        self.slots = slots;
        self.capacity = new_capacity;
        self.deleted = 0;

        if live > strategy.hash_threshold() {
            self.rebuild_index(strategy);
        } else {
            self.index = None;
        }
        resumed
    }

    /// Returns layout statistics for the table.
    #[cfg(any(test, feature = "stats"))]
    pub fn stats(&self) -> TableStats {
        let mut chain_histogram = alloc::vec![0usize; 1];
        let mut longest_chain = 0;
        if let Some(index) = &self.index {
            for length in index.chain_lengths() {
                if chain_histogram.len() <= length {
                    chain_histogram.resize(length + 1, 0);
                }
                chain_histogram[length] += 1;
                longest_chain = longest_chain.max(length);
            }
        }

        let bucket_count = self.index.as_ref().map_or(0, HashIndex::bucket_count);
        TableStats {
            live: self.len(),
            total: self.total(),
            tombstones: self.deleted,
            capacity: self.capacity,
            index_width: self.index_width(),
            bucket_count,
            chain_histogram,
            longest_chain,
            load_factor: if bucket_count == 0 {
                0.0
            } else {
                self.len() as f64 / bucket_count as f64
            },
            index_bytes: self.index.as_ref().map_or(0, HashIndex::heap_bytes),
        }
    }
}

impl<K, V> IntoIterator for EconomicTable<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let remaining = self.len();
        IntoIter {
            slots: self.slots.into_iter(),
            remaining,
        }
    }
}

impl<'a, K, V> IntoIterator for &'a EconomicTable<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A cursor over the entries of an [`EconomicTable`] in insertion order.
///
/// The cursor starts before the first entry; [`advance`](Self::advance)
/// moves it onto the next live entry. Removing through the cursor keeps its
/// place, even when the removal compacts the table.
///
/// # Examples
///
/// ```rust
/// # #[cfg(any(feature = "std", feature = "foldhash"))]
/// # {
/// use economic_table::EconomicTable;
/// use economic_table::equivalence::Equality;
///
/// let strategy = Equality::new();
/// let mut table = EconomicTable::new();
/// for i in 0..10 {
///     table.insert(&strategy, i, i * i);
/// }
///
/// let mut cursor = table.cursor(&strategy);
/// while cursor.advance() {
///     if cursor.key() % 2 == 0 {
///         cursor.remove();
///     }
/// }
///
/// let keys: Vec<_> = table.iter().map(|(k, _)| *k).collect();
/// assert_eq!(keys, [1, 3, 5, 7, 9]);
/// # }
/// ```
pub struct RawCursor<'a, K, V, E> {
    table: &'a mut EconomicTable<K, V>,
    strategy: &'a E,
    position: usize,
    current: Option<usize>,
}

impl<'a, K, V, E> RawCursor<'a, K, V, E>
where
    E: Equivalence<K>,
{
    /// Moves to the next live entry. Returns `false` once the entries are
    /// exhausted.
    pub fn advance(&mut self) -> bool {
        while self.position < self.table.total() {
            let slot = self.position;
            self.position += 1;
            if self.table.slots[slot].is_some() {
                self.current = Some(slot);
                return true;
            }
        }
        self.current = None;
        false
    }

    fn entry(&self) -> &(K, V) {
        match self.current.and_then(|slot| self.table.slots[slot].as_ref()) {
            Some(entry) => entry,
            None => cursor_not_on_entry(),
        }
    }

    /// The key and a mutable reference to the value of the current entry.
    ///
    /// # Panics
    ///
    /// Panics unless the last call to [`advance`](Self::advance) returned
    /// `true`.
    pub fn entry_mut(&mut self) -> (&K, &mut V) {
        match self.current.and_then(|slot| self.table.slots[slot].as_mut()) {
            Some((key, value)) => (&*key, value),
            None => cursor_not_on_entry(),
        }
    }

    /// The key of the current entry.
    ///
    /// # Panics
    ///
    /// Panics unless the last call to [`advance`](Self::advance) returned
    /// `true`.
    pub fn key(&self) -> &K {
        &self.entry().0
    }

    /// The value of the current entry.
    ///
    /// # Panics
    ///
    /// Panics unless the last call to [`advance`](Self::advance) returned
    /// `true`.
    pub fn value(&self) -> &V {
        &self.entry().1
    }

    /// Replaces the value of the current entry, returning the old one.
    ///
    /// # Panics
    ///
    /// Panics unless the last call to [`advance`](Self::advance) returned
    /// `true`.
    pub fn set_value(&mut self, value: V) -> V {
        core::mem::replace(self.entry_mut().1, value)
    }

    /// Removes the current entry and returns it. The cursor must be advanced
    /// before it is read again.
    ///
    /// # Panics
    ///
    /// Panics unless the last call to [`advance`](Self::advance) returned
    /// `true`, or if the entry was already removed.
    pub fn remove(&mut self) -> (K, V) {
        let Some(slot) = self.current.take() else {
            cursor_not_on_entry();
        };
        let Some((key, _)) = &self.table.slots[slot] else {
            cursor_not_on_entry();
        };

        if self.table.index.is_some() {
            let hash = self.strategy.hash(key);
            let unlinked = self.table.unlink_where(hash, |linked, _| linked == slot);
            debug_assert_eq!(unlinked, Some(slot));
        }

        let (entry, position) = self.table.release(self.strategy, slot, self.position);
        self.position = position;
        match entry {
            Some(entry) => entry,
            None => cursor_not_on_entry(),
        }
    }
}

/// An iterator over the entries of an [`EconomicTable`] in insertion order.
#[derive(Clone)]
pub struct Iter<'a, K, V> {
    slots: core::slice::Iter<'a, Option<(K, V)>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.slots.by_ref() {
            if let Some((key, value)) = slot {
                self.remaining -= 1;
                return Some((key, value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// An iterator over the entries of an [`EconomicTable`] in insertion order,
/// with mutable values.
pub struct IterMut<'a, K, V> {
    slots: core::slice::IterMut<'a, Option<(K, V)>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.slots.by_ref() {
            if let Some((key, value)) = slot {
                self.remaining -= 1;
                return Some((&*key, value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// An owning iterator over the entries of an [`EconomicTable`] in insertion
/// order.
pub struct IntoIter<K, V> {
    slots: alloc::vec::IntoIter<Option<(K, V)>>,
    remaining: usize,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.slots.by_ref().flatten().next()?;
        self.remaining -= 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}

impl<K, V> FusedIterator for IntoIter<K, V> {}

#[cfg(test)]
mod tests {
    use alloc::collections::BTreeMap;
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use core::hash::BuildHasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;
    use crate::equivalence::Custom;
    use crate::equivalence::Equality;
    use crate::equivalence::Identity;

    #[derive(Clone)]
    struct SipHashBuilder {
        k0: u64,
        k1: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap_or(0),
                k1: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    fn equality() -> Equality<SipHashBuilder> {
        Equality::with_hasher(SipHashBuilder::default())
    }

    fn keys<K: Clone, V>(table: &EconomicTable<K, V>) -> Vec<K> {
        table.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Every live slot is reachable from its bucket and nothing else is
    /// linked.
    fn assert_index_consistent<K, V, E>(table: &EconomicTable<K, V>, strategy: &E)
    where
        E: Equivalence<K>,
    {
        let Some(index) = &table.index else {
            return;
        };
        let mut linked = 0;
        for (slot, entry) in table.slots.iter().enumerate() {
            if let Some((key, _)) = entry {
                let mut cursor = index.head(index.bucket_for(strategy.hash(key)));
                let mut found = false;
                while let Some(candidate) = cursor {
                    found |= candidate == slot;
                    cursor = index.next(candidate);
                }
                assert!(found, "slot {slot} unreachable");
                linked += 1;
            }
        }
        assert_eq!(index.chain_lengths().sum::<usize>(), linked);
    }

    #[test]
    fn insert_get_and_overwrite() {
        let strategy = equality();
        let mut table = EconomicTable::new();

        assert_eq!(table.insert(&strategy, "a".to_string(), 1), None);
        assert_eq!(table.insert(&strategy, "b".to_string(), 2), None);
        assert_eq!(table.insert(&strategy, "a".to_string(), 3), Some(1));

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&strategy, &"a".to_string()), Some(&3));
        assert_eq!(keys(&table), ["a", "b"]);
    }

    #[test]
    fn lazily_allocates_initial_capacity() {
        let strategy = equality();
        let mut table: EconomicTable<u32, u32> = EconomicTable::with_capacity(3);
        assert_eq!(table.capacity(), 0);

        table.insert(&strategy, 1, 1);
        assert_eq!(table.capacity(), INITIAL_CAPACITY);

        let hinted: EconomicTable<u32, u32> = EconomicTable::with_capacity(100);
        assert_eq!(hinted.capacity(), 100);
        assert!(hinted.is_empty());
    }

    #[test]
    fn growth_sequence() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        let mut capacities = vec![];
        for i in 0..200u32 {
            table.insert(&strategy, i, i);
            if capacities.last() != Some(&table.capacity()) {
                capacities.push(table.capacity());
            }
        }
        assert_eq!(capacities, [4, 12, 20, 30, 45, 67, 100, 150, 225]);
    }

    #[test]
    #[should_panic(expected = "capacity overflow")]
    fn oversized_hint_panics() {
        let _table: EconomicTable<u8, u8> = EconomicTable::with_capacity(MAX_CAPACITY + 1);
    }

    #[test]
    fn index_built_past_equality_threshold() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        for i in 0..4u32 {
            table.insert(&strategy, i, ());
        }
        assert_eq!(table.index_width(), None);

        table.insert(&strategy, 4, ());
        assert_eq!(table.index_width(), Some(IndexWidth::Byte));
        assert_index_consistent(&table, &strategy);
        for i in 0..5u32 {
            assert!(table.contains_key(&strategy, &i));
        }
    }

    #[test]
    fn index_built_past_identity_threshold() {
        let values: Vec<Rc<u32>> = (0..9).map(Rc::new).collect();
        let mut table = EconomicTable::new();
        for value in &values[..8] {
            table.insert(&Identity, value.clone(), **value);
        }
        assert_eq!(table.index_width(), None);

        table.insert(&Identity, values[8].clone(), 8);
        assert!(table.index_width().is_some());
        for value in &values {
            assert_eq!(table.get(&Identity, value), Some(&**value));
        }
        assert_eq!(table.get(&Identity, &Rc::new(3)), None);
    }

    #[test]
    fn index_width_widens_with_capacity() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        for i in 0..200u32 {
            table.insert(&strategy, i, i);
        }
        assert_eq!(table.index_width(), Some(IndexWidth::Byte));

        for i in 200..300u32 {
            table.insert(&strategy, i, i);
        }
        assert_eq!(table.index_width(), Some(IndexWidth::Short));
        assert_index_consistent(&table, &strategy);

        for i in 300..70_000u32 {
            table.insert(&strategy, i, i);
        }
        assert_eq!(table.index_width(), Some(IndexWidth::Int));
        assert_index_consistent(&table, &strategy);
        for i in (0..70_000u32).step_by(97) {
            assert_eq!(table.get(&strategy, &i), Some(&i));
        }
    }

    #[test]
    fn index_width_never_narrows() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        for i in 0..300u32 {
            table.insert(&strategy, i, i);
        }
        for i in 0..290u32 {
            assert_eq!(table.remove(&strategy, &i), Some((i, i)));
        }

        assert!(table.capacity() < crate::hash_index::LARGE);
        assert_eq!(table.index_width(), Some(IndexWidth::Short));
        assert_index_consistent(&table, &strategy);
        assert_eq!(keys(&table), (290..300).collect::<Vec<_>>());
    }

    #[test]
    fn trailing_removal_trims_tombstones() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        for i in 0..4u32 {
            table.insert(&strategy, i, i);
        }

        table.remove(&strategy, &1);
        table.remove(&strategy, &2);
        assert_eq!(table.tombstones(), 2);
        assert_eq!(table.total(), 4);

        table.remove(&strategy, &3);
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.total(), 1);
        assert_eq!(keys(&table), [0]);
    }

    #[test]
    fn remove_then_reinsert_appends() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        for i in 0..1000u32 {
            table.insert(&strategy, i, i);
        }
        for i in 0..800u32 {
            assert_eq!(table.remove(&strategy, &i), Some((i, i)));
        }

        assert_eq!(table.len(), 200);
        assert_eq!(table.get(&strategy, &999), Some(&999));
        assert_eq!(table.get(&strategy, &500), None);
        assert_index_consistent(&table, &strategy);

        assert_eq!(table.insert(&strategy, 500, 500), None);
        assert_eq!(table.len(), 201);
        assert_eq!(keys(&table).last(), Some(&500));
    }

    #[test]
    fn removal_compacts_mostly_dead_table() {
        let strategy = equality();
        let mut table = EconomicTable::with_capacity(16);
        for i in 0..16u32 {
            table.insert(&strategy, i, i);
        }
        // Remove from the front so nothing is trimmed and nothing compacts
        // on the way (11 tombstones out of 16 is below the ratio).
        for i in 0..11u32 {
            table.remove(&strategy, &i);
        }
        assert_eq!(table.tombstones(), 11);
        assert_eq!(table.capacity(), 16);

        table.remove(&strategy, &11);
        // 12 of 16 used slots are tombstones: compacted down to 4 live.
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.capacity(), 12);
        assert_eq!(keys(&table), [12, 13, 14, 15]);
        assert_eq!(table.index_width(), None);
    }

    #[test]
    fn colliding_keys_chain_and_rehash() {
        let strategy = Custom::new(|a: &u32, b: &u32| a == b, |_: &u32| 0);
        let mut table = EconomicTable::new();
        for i in 0..100u32 {
            table.insert(&strategy, i, i * 3);
        }
        assert_index_consistent(&table, &strategy);
        let stats = table.stats();
        assert_eq!(stats.longest_chain, 100);
        assert!(stats.load_factor < 1.0);

        for i in (0..100u32).rev().step_by(3) {
            assert_eq!(table.remove(&strategy, &i), Some((i, i * 3)));
        }
        assert_index_consistent(&table, &strategy);
        for i in 0..100u32 {
            let expected = if (99 - i) % 3 == 0 { None } else { Some(i * 3) };
            assert_eq!(table.get(&strategy, &i).copied(), expected);
        }
    }

    #[test]
    fn cursor_removal_visits_every_entry_once() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        for i in 0..100u32 {
            table.insert(&strategy, i, i);
        }

        let mut visited = vec![];
        let mut cursor = table.cursor(&strategy);
        while cursor.advance() {
            let key = *cursor.key();
            visited.push(key);
            assert_eq!(cursor.remove(), (key, key));
        }

        assert_eq!(visited, (0..100).collect::<Vec<_>>());
        assert!(table.is_empty());
    }

    #[test]
    fn cursor_removal_across_compaction() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        for i in 0..200u32 {
            table.insert(&strategy, i, i);
        }

        let mut visited = vec![];
        let mut cursor = table.cursor(&strategy);
        while cursor.advance() {
            let key = *cursor.key();
            visited.push(key);
            if key % 10 != 0 {
                cursor.remove();
            }
        }

        assert_eq!(visited, (0..200).collect::<Vec<_>>());
        assert_eq!(keys(&table), (0..200).step_by(10).collect::<Vec<_>>());
        assert_index_consistent(&table, &strategy);
    }

    #[test]
    fn cursor_set_value() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        table.insert(&strategy, 1u8, 10);
        table.insert(&strategy, 2u8, 20);

        let mut cursor = table.cursor(&strategy);
        while cursor.advance() {
            let doubled = cursor.value() * 2;
            cursor.set_value(doubled);
        }
        assert_eq!(table.get(&strategy, &2), Some(&40));
    }

    #[test]
    #[should_panic(expected = "cursor is not positioned")]
    fn cursor_remove_before_advance_panics() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        table.insert(&strategy, 1u8, 1u8);
        table.cursor(&strategy).remove();
    }

    #[test]
    fn replace_all_and_retain() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        for i in 0..20u32 {
            table.insert(&strategy, i, i);
        }

        table.replace_all(|k, v| k + v);
        table.retain(&strategy, |_, v| *v % 4 == 0);

        let entries: Vec<_> = table.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(entries, (0..20).step_by(2).map(|k| (k, 2 * k)).collect::<Vec<_>>());
    }

    #[test]
    fn clone_keeps_index_and_order() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        for i in 0..50u32 {
            table.insert(&strategy, i.to_string(), i);
        }
        table.remove(&strategy, &"7".to_string());

        let copy = table.clone();
        assert_eq!(copy.len(), table.len());
        assert_eq!(copy.capacity(), table.capacity());
        assert_eq!(copy.index_width(), table.index_width());
        assert_eq!(keys(&copy), keys(&table));
        for i in 0..50u32 {
            assert_eq!(copy.get(&strategy, &i.to_string()), table.get(&strategy, &i.to_string()));
        }
    }

    #[test]
    fn clear_releases_storage() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        for i in 0..50u32 {
            table.insert(&strategy, i, i);
        }
        table.clear();

        assert!(table.is_empty());
        assert_eq!(table.capacity(), 0);
        assert_eq!(table.index_width(), None);
        assert_eq!(table.get(&strategy, &1), None);

        table.insert(&strategy, 1, 1);
        assert_eq!(table.get(&strategy, &1), Some(&1));
    }

    #[test]
    fn get_or_insert_with_inserts_once() {
        let strategy = equality();
        let mut table: EconomicTable<String, Vec<u32>> = EconomicTable::new();
        table.get_or_insert_with(&strategy, "a".to_string(), Vec::new).push(1);
        table
            .get_or_insert_with(&strategy, "a".to_string(), || panic!("already present"))
            .push(2);

        assert_eq!(table.get(&strategy, &"a".to_string()), Some(&vec![1, 2]));
    }

    #[test]
    fn into_iter_yields_in_order() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        for i in 0..10u32 {
            table.insert(&strategy, i, String::from("v"));
        }
        table.remove(&strategy, &4);

        let owned = table.into_iter();
        assert_eq!(owned.len(), 9);
        assert_eq!(owned.map(|(k, _)| k).collect::<Vec<_>>(), [0, 1, 2, 3, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn random_operations_match_model() {
        let strategy = equality();
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let mut table = EconomicTable::new();
        let mut model: Vec<(u16, u32)> = Vec::new();

        for step in 0..20_000u32 {
            let key = rng.random_range(0..300u16);
            if rng.random_bool(0.6) {
                let previous = table.insert(&strategy, key, step);
                match model.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, value)) => assert_eq!(previous, Some(core::mem::replace(value, step))),
                    None => {
                        assert_eq!(previous, None);
                        model.push((key, step));
                    }
                }
            } else {
                let removed = table.remove(&strategy, &key);
                let position = model.iter().position(|(k, _)| *k == key);
                assert_eq!(removed, position.map(|p| model.remove(p)));
            }

            assert_eq!(table.len(), model.len());
            assert!(table.len() <= table.capacity());
            if step % 500 == 0 {
                assert_index_consistent(&table, &strategy);
                let entries: Vec<_> = table.iter().map(|(k, v)| (*k, *v)).collect();
                assert_eq!(entries, model);
            }
        }

        let lookup: BTreeMap<u16, u32> = model.iter().copied().collect();
        for key in 0..300u16 {
            assert_eq!(table.get(&strategy, &key), lookup.get(&key));
        }
    }

    #[test]
    fn stats_report_layout() {
        let strategy = equality();
        let mut table = EconomicTable::new();
        assert_eq!(table.stats().index_width, None);

        for i in 0..40u32 {
            table.insert(&strategy, i, i);
        }
        table.remove(&strategy, &3);

        let stats = table.stats();
        assert_eq!(stats.live, 39);
        assert_eq!(stats.tombstones, 1);
        assert_eq!(stats.total, 40);
        assert_eq!(stats.index_width, Some(IndexWidth::Byte));
        assert!(stats.bucket_count.is_power_of_two());
        assert_eq!(
            stats
                .chain_histogram
                .iter()
                .enumerate()
                .map(|(len, n)| len * n)
                .sum::<usize>(),
            39
        );
        assert_eq!(stats.index_bytes, stats.bucket_count + stats.capacity);
    }
}
