use core::fmt::Debug;
use core::iter::FusedIterator;

use crate::economic_table;
use crate::economic_table::EconomicTable;
use crate::economic_table::RawCursor;
use crate::equivalence::Equivalence;

/// An insertion-ordered map built on [`EconomicTable`].
///
/// `EconomicMap<K, V, E>` compares and hashes keys exclusively through its
/// strategy `E`. Maps with few entries are searched linearly and carry no
/// index at all; larger ones build a hash index whose references are one,
/// two or four bytes wide depending on capacity.
///
/// # Performance Characteristics
///
/// - **Memory**: `size_of::<Option<(K, V)>>()` per slot, plus one to four
///   bytes per slot and per bucket once the map is indexed.
/// - **Order**: iteration follows insertion order; overwriting a value keeps
///   the entry's position.
#[derive(Clone)]
pub struct EconomicMap<K, V, E> {
    table: EconomicTable<K, V>,
    strategy: E,
}

impl<K, V, E> Debug for EconomicMap<K, V, E>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.table.iter()).finish()
    }
}

impl<K, V, E> EconomicMap<K, V, E>
where
    E: Equivalence<K>,
{
    /// Creates an empty map comparing keys with `strategy`.
    ///
    /// No memory is allocated until the first insertion.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicMap;
    /// use economic_table::equivalence::Equality;
    ///
    /// let map: EconomicMap<u32, String, _> = EconomicMap::new(Equality::new());
    /// assert!(map.is_empty());
    /// assert_eq!(map.capacity(), 0);
    /// # }
    /// ```
    pub fn new(strategy: E) -> Self {
        Self {
            table: EconomicTable::new(),
            strategy,
        }
    }

    /// Creates an empty map able to hold `capacity` entries before it has to
    /// grow.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_CAPACITY`](economic_table::MAX_CAPACITY).
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicMap;
    /// use economic_table::equivalence::Equality;
    ///
    /// let map: EconomicMap<u32, String, _> = EconomicMap::with_capacity(Equality::new(), 100);
    /// assert!(map.capacity() >= 100);
    /// # }
    /// ```
    pub fn with_capacity(strategy: E, capacity: usize) -> Self {
        Self {
            table: EconomicTable::with_capacity(capacity),
            strategy,
        }
    }

    /// Creates a map comparing keys with `strategy` holding a copy of every
    /// entry of `other`, in `other`'s order.
    ///
    /// Keys that are distinct under `other`'s strategy but the same under
    /// `strategy` collapse into one entry holding the last value. To copy a
    /// map keeping its strategy and layout, clone it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicMap;
    /// use economic_table::equivalence::Custom;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut exact = EconomicMap::new(Equality::new());
    /// exact.put("Key".to_string(), 1);
    /// exact.put("KEY".to_string(), 2);
    ///
    /// let folded = EconomicMap::copy_from(
    ///     Custom::new(
    ///         |a: &String, b: &String| a.eq_ignore_ascii_case(b),
    ///         |k: &String| k.len() as u64,
    ///     ),
    ///     &exact,
    /// );
    /// assert_eq!(folded.len(), 1);
    /// assert_eq!(folded.get(&"key".to_string()), Some(&2));
    /// # }
    /// ```
    pub fn copy_from<F>(strategy: E, other: &EconomicMap<K, V, F>) -> Self
    where
        K: Clone,
        V: Clone,
        F: Equivalence<K>,
    {
        let mut map = Self::with_capacity(strategy, other.len());
        map.put_all(other.iter().map(|(k, v)| (k.clone(), v.clone())));
        map
    }

    /// Creates a map from `entries`, later duplicates overwriting earlier
    /// values.
    pub fn from_entries(strategy: E, entries: impl IntoIterator<Item = (K, V)>) -> Self {
        let entries = entries.into_iter();
        let mut map = Self::with_capacity(strategy, entries.size_hint().0);
        map.put_all(entries);
        map
    }

    /// Returns the strategy comparing the keys of this map.
    pub fn strategy(&self) -> &E {
        &self.strategy
    }

    /// Returns the number of entries in the map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicMap;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut map = EconomicMap::new(Equality::new());
    /// assert_eq!(map.len(), 0);
    /// map.put(1, "a");
    /// assert_eq!(map.len(), 1);
    /// # }
    /// ```
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of slots allocated for entries.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes all entries and releases the storage.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicMap;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut map = EconomicMap::new(Equality::new());
    /// map.put(1, "a");
    /// map.clear();
    /// assert!(map.is_empty());
    /// assert_eq!(map.capacity(), 0);
    /// # }
    /// ```
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns `true` if the map contains an entry for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.table.contains_key(&self.strategy, key)
    }

    /// Returns a reference to the value stored for `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicMap;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut map = EconomicMap::new(Equality::new());
    /// map.put(1, "a");
    /// assert_eq!(map.get(&1), Some(&"a"));
    /// assert_eq!(map.get(&2), None);
    /// # }
    /// ```
    pub fn get(&self, key: &K) -> Option<&V> {
        self.table.get(&self.strategy, key)
    }

    /// Returns a mutable reference to the value stored for `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.table.get_mut(&self.strategy, key)
    }

    /// Returns the stored key and value for `key`.
    ///
    /// The stored key may differ from `key` when the strategy considers
    /// distinct values the same key.
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        self.table.get_key_value(&self.strategy, key)
    }

    /// Associates `value` with `key`, returning the previous value.
    ///
    /// A new key is appended after all existing entries; an existing key
    /// keeps its position and its originally stored key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicMap;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut map = EconomicMap::new(Equality::new());
    /// assert_eq!(map.put(37, "a"), None);
    /// assert_eq!(map.put(37, "b"), Some("a"));
    /// assert_eq!(map.get(&37), Some(&"b"));
    /// # }
    /// ```
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        self.table.insert(&self.strategy, key, value)
    }

    /// Inserts `value` unless `key` is present. Returns the value already
    /// stored, in which case `value` is dropped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicMap;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut map = EconomicMap::new(Equality::new());
    /// assert_eq!(map.put_if_absent("k", 1), None);
    /// assert_eq!(map.put_if_absent("k", 2), Some(&1));
    /// # }
    /// ```
    pub fn put_if_absent(&mut self, key: K, value: V) -> Option<&V> {
        if self.contains_key(&key) {
            return self.get(&key);
        }
        self.put(key, value);
        None
    }

    /// Puts every entry of `entries`, in order.
    pub fn put_all(&mut self, entries: impl IntoIterator<Item = (K, V)>) {
        for (key, value) in entries {
            self.put(key, value);
        }
    }

    /// Returns the value for `key`, inserting `default()` first if absent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicMap;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut map = EconomicMap::new(Equality::new());
    /// *map.get_or_insert_with("hits", || 0) += 1;
    /// *map.get_or_insert_with("hits", || 0) += 1;
    /// assert_eq!(map.get(&"hits"), Some(&2));
    /// # }
    /// ```
    pub fn get_or_insert_with(&mut self, key: K, default: impl FnOnce() -> V) -> &mut V {
        self.table.get_or_insert_with(&self.strategy, key, default)
    }

    /// Removes `key` from the map, returning its value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicMap;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut map = EconomicMap::new(Equality::new());
    /// map.put(1, "a");
    /// assert_eq!(map.remove_key(&1), Some("a"));
    /// assert_eq!(map.remove_key(&1), None);
    /// # }
    /// ```
    pub fn remove_key(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes `key` from the map, returning the stored key and value.
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        self.table.remove(&self.strategy, key)
    }

    /// Replaces every value with `f(key, value)`, in insertion order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicMap;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut map = EconomicMap::new(Equality::new());
    /// map.put(2, 10);
    /// map.put(3, 10);
    /// map.replace_all(|k, v| k * v);
    /// assert_eq!(map.values().copied().collect::<Vec<_>>(), [20, 30]);
    /// # }
    /// ```
    pub fn replace_all(&mut self, f: impl FnMut(&K, &V) -> V) {
        self.table.replace_all(f);
    }

    /// Keeps only the entries for which `f` returns `true`.
    pub fn retain(&mut self, f: impl FnMut(&K, &mut V) -> bool) {
        self.table.retain(&self.strategy, f);
    }

    /// Returns a cursor over the entries, able to update or remove the entry
    /// it is positioned on.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicMap;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut map = EconomicMap::new(Equality::new());
    /// for i in 0..6 {
    ///     map.put(i, i * 10);
    /// }
    ///
    /// let mut cursor = map.entries();
    /// while cursor.advance() {
    ///     if *cursor.key() < 3 {
    ///         cursor.remove();
    ///     } else {
    ///         cursor.set_value(0);
    ///     }
    /// }
    ///
    /// assert_eq!(map.iter().collect::<Vec<_>>(), [(&3, &0), (&4, &0), (&5, &0)]);
    /// # }
    /// ```
    pub fn entries(&mut self) -> MapCursor<'_, K, V, E> {
        MapCursor {
            inner: self.table.cursor(&self.strategy),
        }
    }
}

impl<K, V, E> EconomicMap<K, V, E> {
    /// Returns an iterator over the entries in insertion order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the keys in insertion order.
    ///
    /// Every call starts a fresh pass over the map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use economic_table::EconomicMap;
    /// use economic_table::equivalence::Equality;
    ///
    /// let mut map = EconomicMap::new(Equality::new());
    /// map.put("b", 1);
    /// map.put("a", 2);
    /// assert_eq!(map.keys().collect::<Vec<_>>(), [&"b", &"a"]);
    /// # }
    /// ```
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values in insertion order.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator over mutable references to the values, in
    /// insertion order.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Returns the layout statistics of the underlying table.
    #[cfg(any(test, feature = "stats"))]
    pub fn stats(&self) -> economic_table::TableStats {
        self.table.stats()
    }
}

impl<K, V, E> Default for EconomicMap<K, V, E>
where
    E: Equivalence<K> + Default,
{
    fn default() -> Self {
        Self::new(E::default())
    }
}

impl<K, V, E> PartialEq for EconomicMap<K, V, E>
where
    V: PartialEq,
    E: Equivalence<K>,
{
    /// Maps are equal if they hold the same keys, as decided by `self`'s
    /// strategy, with equal values. Order is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, V, E> Eq for EconomicMap<K, V, E>
where
    V: Eq,
    E: Equivalence<K>,
{
}

impl<K, V, E> Extend<(K, V)> for EconomicMap<K, V, E>
where
    E: Equivalence<K>,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        self.put_all(iter);
    }
}

impl<K, V, E> IntoIterator for EconomicMap<K, V, E> {
    type Item = (K, V);
    type IntoIter = economic_table::IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.table.into_iter()
    }
}

impl<'a, K, V, E> IntoIterator for &'a EconomicMap<K, V, E> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A cursor over the entries of an [`EconomicMap`].
///
/// This struct is created by [`EconomicMap::entries`]. The cursor starts
/// before the first entry; reading it before [`advance`](Self::advance)
/// returned `true` panics.
pub struct MapCursor<'a, K, V, E> {
    inner: RawCursor<'a, K, V, E>,
}

impl<K, V, E> MapCursor<'_, K, V, E>
where
    E: Equivalence<K>,
{
    /// Moves to the next entry, returning `false` at the end.
    pub fn advance(&mut self) -> bool {
        self.inner.advance()
    }

    /// The key of the current entry.
    pub fn key(&self) -> &K {
        self.inner.key()
    }

    /// The value of the current entry.
    pub fn value(&self) -> &V {
        self.inner.value()
    }

    /// The value of the current entry, mutably.
    pub fn value_mut(&mut self) -> &mut V {
        self.inner.entry_mut().1
    }

    /// Replaces the value of the current entry, returning the old one.
    pub fn set_value(&mut self, value: V) -> V {
        self.inner.set_value(value)
    }

    /// Removes the current entry, returning it. Iteration continues with the
    /// entry that followed it.
    pub fn remove(&mut self) -> (K, V) {
        self.inner.remove()
    }
}

/// An iterator over the entries of an [`EconomicMap`].
#[derive(Clone)]
pub struct Iter<'a, K, V> {
    inner: economic_table::Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// An iterator over the keys of an [`EconomicMap`].
#[derive(Clone)]
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// An iterator over the values of an [`EconomicMap`].
#[derive(Clone)]
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

impl<K, V> FusedIterator for Values<'_, K, V> {}

/// A mutable iterator over the values of an [`EconomicMap`].
pub struct ValuesMut<'a, K, V> {
    inner: economic_table::IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}

impl<K, V> FusedIterator for ValuesMut<'_, K, V> {}
