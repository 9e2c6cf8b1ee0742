//! Hashing for the listener table, the slice index and the duplicate-name
//! check in [`StoreBuilder::build`](crate::StoreBuilder::build).
//!
//! None of those keys come from outside the program. Listener ids are drawn
//! from a per-store counter and slice names are constants in the host's source,
//! so a randomly seeded hasher would only cost a per-map `RandomState`. A fixed
//! seed also keeps hashing identical from one store to the next.

use std::hash::BuildHasher;

pub use foldhash::fast::{FixedState, FoldHasher};

/// Fixed-seed foldhash builder. Zero-sized, so every map keyed with it is as
/// small as the map itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct FastHashBuilder;

impl BuildHasher for FastHashBuilder {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(0x517cc1b727220a95).build_hasher()
    }
}

/// Insertion-ordered map keyed with [`FastHashBuilder`].
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, FastHashBuilder>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_hash_builder_is_zero_sized() {
        assert_eq!(std::mem::size_of::<FastHashBuilder>(), 0);
    }

    #[test]
    fn separate_builders_hash_alike() {
        assert_eq!(
            FastHashBuilder.hash_one("Counter"),
            FastHashBuilder::default().hash_one("Counter")
        );
    }

    #[test]
    fn index_map_keeps_insertion_order_after_removal() {
        let mut map: FastIndexMap<u64, &str> = FastIndexMap::default();
        map.insert(3, "c");
        map.insert(1, "a");
        map.insert(2, "b");

        map.shift_remove(&1);

        let keys: Vec<_> = map.keys().copied().collect();
        assert_eq!(keys, vec![3, 2]);
    }
}
