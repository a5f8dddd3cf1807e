//! Key comparison strategies.
//!
//! Every table is parameterised by an [`Equivalence`] that decides what "the
//! same key" means for that instance. The strategy supplies both the equality
//! test and the hash, so two keys are only ever compared through it.

use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use alloc::boxed::Box;
use alloc::rc::Rc;
#[cfg(target_has_atomic = "ptr")]
use alloc::sync::Arc;

/// Live entries a table with an equality-based strategy holds before it
/// builds a hash index.
pub const EQUALITY_HASH_THRESHOLD: usize = 4;

/// Live entries a table with an identity-based strategy holds before it
/// builds a hash index. Identity comparisons are cheap, so linear scans stay
/// competitive for longer.
pub const IDENTITY_HASH_THRESHOLD: usize = 8;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hasher builder used by [`Equality::new`] and
        /// [`IdentityWithIntrinsicHash::new`].
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The hasher builder used by [`Equality::new`] and
        /// [`IdentityWithIntrinsicHash::new`].
        pub type DefaultHashBuilder = std::collections::hash_map::RandomState;
    }
}

/// The equality and hash policy of a table.
///
/// Implementations must be consistent: keys that are `equivalent` must
/// produce the same `hash`.
///
/// # Examples
///
/// ```rust
/// use economic_table::EconomicMap;
/// use economic_table::equivalence::Equivalence;
///
/// struct CaseInsensitive;
///
/// impl Equivalence<String> for CaseInsensitive {
///     fn equivalent(&self, a: &String, b: &String) -> bool {
///         a.eq_ignore_ascii_case(b)
///     }
///
///     fn hash(&self, key: &String) -> u64 {
///         key.bytes()
///             .map(|b| b.to_ascii_lowercase() as u64)
///             .fold(0xcbf2_9ce4_8422_2325, |h, b| (h ^ b).wrapping_mul(0x100_0000_01b3))
///     }
/// }
///
/// let mut map = EconomicMap::new(CaseInsensitive);
/// map.put("Hello".to_string(), 1);
/// assert_eq!(map.get(&"HELLO".to_string()), Some(&1));
/// ```
pub trait Equivalence<K: ?Sized> {
    /// Returns `true` if `a` and `b` are the same key under this strategy.
    fn equivalent(&self, a: &K, b: &K) -> bool;

    /// Hashes `key` consistently with [`equivalent`](Equivalence::equivalent).
    fn hash(&self, key: &K) -> u64;

    /// Number of entries a table keeps before switching from linear scans to
    /// a hash index.
    fn hash_threshold(&self) -> usize {
        EQUALITY_HASH_THRESHOLD
    }
}

/// Keys that have an object identity, i.e. point at a heap or borrowed
/// location that outlives the key handle itself.
pub trait ObjectIdentity {
    /// The address identifying the referenced object.
    fn identity(&self) -> *const ();
}

impl<T: ?Sized> ObjectIdentity for &T {
    fn identity(&self) -> *const () {
        (*self as *const T).cast()
    }
}

impl<T: ?Sized> ObjectIdentity for Box<T> {
    fn identity(&self) -> *const () {
        (&**self as *const T).cast()
    }
}

impl<T: ?Sized> ObjectIdentity for Rc<T> {
    fn identity(&self) -> *const () {
        Rc::as_ptr(self).cast()
    }
}

#[cfg(target_has_atomic = "ptr")]
impl<T: ?Sized> ObjectIdentity for Arc<T> {
    fn identity(&self) -> *const () {
        Arc::as_ptr(self).cast()
    }
}

#[inline(always)]
fn address_hash(address: *const ()) -> u64 {
    // Addresses have zeroed low bits; the multiply spreads them upwards and
    // the table folds the high half back down.
    (address as usize as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Pointer identity: two keys are the same only if they refer to the same
/// object. Hashes the address.
///
/// # Examples
///
/// ```rust
/// use std::rc::Rc;
///
/// use economic_table::EconomicMap;
/// use economic_table::equivalence::Identity;
///
/// let a = Rc::new("key".to_string());
/// let b = Rc::new("key".to_string());
///
/// let mut map = EconomicMap::new(Identity);
/// map.put(a.clone(), 1);
/// assert_eq!(map.get(&a), Some(&1));
/// assert_eq!(map.get(&b), None);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Identity;

impl<K: ObjectIdentity> Equivalence<K> for Identity {
    #[inline]
    fn equivalent(&self, a: &K, b: &K) -> bool {
        a.identity() == b.identity()
    }

    #[inline]
    fn hash(&self, key: &K) -> u64 {
        address_hash(key.identity())
    }

    fn hash_threshold(&self) -> usize {
        IDENTITY_HASH_THRESHOLD
    }
}

/// Pointer identity for equality, but buckets keys by their own [`Hash`]
/// implementation.
///
/// Useful when keys are interned, so equal contents imply the same object,
/// and the content hash is stable across runs while addresses are not.
#[derive(Debug, Default, Clone)]
pub struct IdentityWithIntrinsicHash<S> {
    hash_builder: S,
}

#[cfg(any(feature = "foldhash", feature = "std"))]
impl IdentityWithIntrinsicHash<DefaultHashBuilder> {
    /// Creates the strategy with the default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }
}

impl<S> IdentityWithIntrinsicHash<S> {
    /// Creates the strategy with the given hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self { hash_builder }
    }
}

impl<K, S> Equivalence<K> for IdentityWithIntrinsicHash<S>
where
    K: ObjectIdentity + Hash,
    S: BuildHasher,
{
    #[inline]
    fn equivalent(&self, a: &K, b: &K) -> bool {
        a.identity() == b.identity()
    }

    #[inline]
    fn hash(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    fn hash_threshold(&self) -> usize {
        IDENTITY_HASH_THRESHOLD
    }
}

/// Value equality through [`Eq`], hashed with a [`BuildHasher`].
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
/// map.put("a", 1);
/// map.put("b", 2);
/// map.put("a", 3);
///
/// assert_eq!(map.len(), 2);
/// assert_eq!(map.get(&"a"), Some(&3));
/// assert_eq!(map.keys().copied().collect::<Vec<_>>(), ["a", "b"]);
/// # }
/// ```
#[derive(Debug, Default, Clone)]
pub struct Equality<S> {
    hash_builder: S,
}

#[cfg(any(feature = "foldhash", feature = "std"))]
impl Equality<DefaultHashBuilder> {
    /// Creates the strategy with the default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }
}

impl<S> Equality<S> {
    /// Creates the strategy with the given hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self { hash_builder }
    }

    /// Returns the hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }
}

impl<K, S> Equivalence<K> for Equality<S>
where
    K: Hash + Eq + ?Sized,
    S: BuildHasher,
{
    #[inline]
    fn equivalent(&self, a: &K, b: &K) -> bool {
        a == b
    }

    #[inline]
    fn hash(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }
}

/// A strategy assembled from caller supplied closures.
///
/// # Examples
///
/// ```rust
/// use economic_table::EconomicSet;
/// use economic_table::equivalence::Custom;
///
/// // Compare only the low byte.
/// let strategy = Custom::new(|a: &u32, b: &u32| a & 0xFF == b & 0xFF, |k: &u32| (k & 0xFF) as u64);
/// let mut set = EconomicSet::new(strategy);
/// assert!(set.add(0x101));
/// assert!(!set.add(0x201));
/// assert_eq!(set.len(), 1);
/// ```
#[derive(Clone)]
pub struct Custom<Q, H> {
    equals: Q,
    hash: H,
}

impl<Q, H> Custom<Q, H> {
    /// Creates a strategy from an equality test and a consistent hash.
    pub fn new(equals: Q, hash: H) -> Self {
        Self { equals, hash }
    }
}

impl<Q, H> Debug for Custom<Q, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Custom").finish_non_exhaustive()
    }
}

impl<K, Q, H> Equivalence<K> for Custom<Q, H>
where
    K: ?Sized,
    Q: Fn(&K, &K) -> bool,
    H: Fn(&K) -> u64,
{
    #[inline]
    fn equivalent(&self, a: &K, b: &K) -> bool {
        (self.equals)(a, b)
    }

    #[inline]
    fn hash(&self, key: &K) -> u64 {
        (self.hash)(key)
    }
}
