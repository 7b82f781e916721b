//! Collection types used across mce.
//!
//! Every registry in the streaming core (archive sources, load units,
//! element tables) is keyed by strings and hit on hot paths, so the
//! AHash-backed collections are used instead of SipHash.

// Re-export optimized hash collections
pub use ahash::{AHashMap as HashMap, AHashSet as HashSet, RandomState};

/// Type alias for the standard HashMap with AHash for better performance.
pub type AHashMap<K, V> = ahash::AHashMap<K, V>;

/// Type alias for the standard HashSet with AHash for better performance.
pub type AHashSet<T> = ahash::AHashSet<T>;
