use core::fmt::Debug;
use core::iter::FusedIterator;

use crate::economic_table;
use crate::economic_table::EconomicTable;
use crate::economic_table::RawCursor;
use crate::equivalence::Equivalence;

/// An insertion-ordered set built on [`EconomicTable`].
///
/// `EconomicSet<K, E>` stores elements of type `K` and decides membership
/// exclusively through its strategy `E`. Adding an element the set already
/// holds keeps the stored one.
///
/// # Performance Characteristics
///
/// - **Memory**: `size_of::<Option<K>>()` per slot, plus one to four bytes per
///   slot and per bucket once the set is indexed.
#[derive(Clone)]
pub struct EconomicSet<K, E> {
    table: EconomicTable<K, ()>,
    strategy: E,
}

impl<K, E> PartialEq for EconomicSet<K, E>
where
    E: Equivalence<K>,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|k| other.contains(k))
    }
}

impl<K, E> Eq for EconomicSet<K, E> where E: Equivalence<K> {}

impl<K, E> Debug for EconomicSet<K, E>
where
    K: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K, E> EconomicSet<K, E>
where
    E: Equivalence<K>,
{
    /// Creates an empty set comparing elements with `strategy`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicSet;
    /// use economic_table::equivalence::Equality;
    ///
    /// let set: EconomicSet<i32, _> = EconomicSet::new(Equality::new());
    /// assert!(set.is_empty());
    /// # }
    /// ```
    pub fn new(strategy: E) -> Self {
        Self {
            table: EconomicTable::new(),
            strategy,
        }
    }

    /// Creates an empty set able to hold `capacity` elements before it has
    /// to grow.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_CAPACITY`](economic_table::MAX_CAPACITY).
    pub fn with_capacity(strategy: E, capacity: usize) -> Self {
        Self {
            table: EconomicTable::with_capacity(capacity),
            strategy,
        }
    }

    /// Creates a set comparing elements with `strategy` holding a copy of
    /// every element of `other`, in `other`'s order.
    pub fn copy_from<F>(strategy: E, other: &EconomicSet<K, F>) -> Self
    where
        K: Clone,
        F: Equivalence<K>,
    {
        let mut set = Self::with_capacity(strategy, other.len());
        set.add_all(other.iter().cloned());
        set
    }

    /// Returns the strategy comparing the elements of this set.
    pub fn strategy(&self) -> &E {
        &self.strategy
    }

    /// Returns the number of elements in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of slots allocated for elements.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes all elements and releases the storage.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns `true` if the set contains `element`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicSet;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut set = EconomicSet::new(Equality::new());
    /// set.add(1);
    /// assert!(set.contains(&1));
    /// assert!(!set.contains(&2));
    /// # }
    /// ```
    pub fn contains(&self, element: &K) -> bool {
        self.table.contains_key(&self.strategy, element)
    }

    /// Returns the stored element equivalent to `element`.
    pub fn get(&self, element: &K) -> Option<&K> {
        self.table
            .get_key_value(&self.strategy, element)
            .map(|(k, _)| k)
    }

    /// Adds `element` to the set. Returns `true` if it was not present; an
    /// element already present is left in place and `element` is dropped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicSet;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut set = EconomicSet::new(Equality::new());
    /// assert!(set.add(1));
    /// assert!(!set.add(1));
    /// assert_eq!(set.len(), 1);
    /// # }
    /// ```
    pub fn add(&mut self, element: K) -> bool {
        self.table.insert(&self.strategy, element, ()).is_none()
    }

    /// Adds every element of `elements`, returning `true` if the set changed.
    pub fn add_all(&mut self, elements: impl IntoIterator<Item = K>) -> bool {
        let mut changed = false;
        for element in elements {
            changed |= self.add(element);
        }
        changed
    }

    /// Removes `element` from the set, returning `true` if it was present.
    pub fn remove(&mut self, element: &K) -> bool {
        self.take(element).is_some()
    }

    /// Removes and returns the stored element equivalent to `element`.
    pub fn take(&mut self, element: &K) -> Option<K> {
        self.table.remove(&self.strategy, element).map(|(k, ())| k)
    }

    /// Removes every element of `elements`, returning `true` if the set
    /// changed.
    pub fn remove_all<'a>(&mut self, elements: impl IntoIterator<Item = &'a K>) -> bool
    where
        K: 'a,
    {
        let mut changed = false;
        for element in elements {
            changed |= self.remove(element);
        }
        changed
    }

    /// Keeps only the elements `other` contains, as decided by `other`'s
    /// strategy. Returns `true` if the set changed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicSet;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut set = EconomicSet::new(Equality::new());
    /// set.add_all([1, 2, 3, 4]);
    ///
    /// let mut keep = EconomicSet::new(Equality::new());
    /// keep.add_all([4, 2, 9]);
    ///
    /// assert!(set.retain_all(&keep));
    /// assert_eq!(set.iter().copied().collect::<Vec<_>>(), [2, 4]);
    /// # }
    /// ```
    pub fn retain_all<F>(&mut self, other: &EconomicSet<K, F>) -> bool
    where
        F: Equivalence<K>,
    {
        let before = self.len();
        self.table.retain(&self.strategy, |k, _| other.contains(k));
        before != self.len()
    }

    /// Keeps only the elements for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&K) -> bool) {
        self.table.retain(&self.strategy, |k, _| f(k));
    }

    /// Returns a cursor over the elements, able to remove the element it is
    /// positioned on.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicSet;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut set = EconomicSet::new(Equality::new());
    /// set.add_all(0..10);
    ///
    /// let mut cursor = set.cursor();
    /// while cursor.advance() {
    ///     if cursor.get() % 2 == 1 {
    ///         cursor.remove();
    ///     }
    /// }
    /// assert_eq!(set.iter().copied().collect::<Vec<_>>(), [0, 2, 4, 6, 8]);
    /// # }
    /// ```
    pub fn cursor(&mut self) -> SetCursor<'_, K, E> {
        SetCursor {
            inner: self.table.cursor(&self.strategy),
        }
    }
}

impl<K, E> EconomicSet<K, E> {
    /// Returns an iterator over the elements in insertion order.
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns the layout statistics of the underlying table.
    #[cfg(any(test, feature = "stats"))]
    pub fn stats(&self) -> economic_table::TableStats {
        self.table.stats()
    }
}

impl<K, E> Default for EconomicSet<K, E>
where
    E: Equivalence<K> + Default,
{
    fn default() -> Self {
        Self::new(E::default())
    }
}

impl<K, E> Extend<K> for EconomicSet<K, E>
where
    E: Equivalence<K>,
{
    fn extend<T: IntoIterator<Item = K>>(&mut self, iter: T) {
        self.add_all(iter);
    }
}

impl<K, E> IntoIterator for EconomicSet<K, E> {
    type Item = K;
    type IntoIter = IntoIter<K>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, K, E> IntoIterator for &'a EconomicSet<K, E> {
    type Item = &'a K;
    type IntoIter = Iter<'a, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A cursor over the elements of an [`EconomicSet`].
///
/// This struct is created by [`EconomicSet::cursor`].
pub struct SetCursor<'a, K, E> {
    inner: RawCursor<'a, K, (), E>,
}

impl<K, E> SetCursor<'_, K, E>
where
    E: Equivalence<K>,
{
    /// Moves to the next element, returning `false` at the end.
    pub fn advance(&mut self) -> bool {
        self.inner.advance()
    }

    /// The current element.
    pub fn get(&self) -> &K {
        self.inner.key()
    }

    /// Removes and returns the current element.
    pub fn remove(&mut self) -> K {
        self.inner.remove().0
    }
}

/// An iterator over the elements of an [`EconomicSet`].
#[derive(Clone)]
pub struct Iter<'a, K> {
    inner: economic_table::Iter<'a, K, ()>,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K> ExactSizeIterator for Iter<'_, K> {}

impl<K> FusedIterator for Iter<'_, K> {}

/// An owning iterator over the elements of an [`EconomicSet`].
pub struct IntoIter<K> {
    inner: economic_table::IntoIter<K, ()>,
}

impl<K> Iterator for IntoIter<K> {
    type Item = K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, ())| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K> ExactSizeIterator for IntoIter<K> {}

impl<K> FusedIterator for IntoIter<K> {}
