//! Per-sensor hit indexing.
//!
//! Groups hit indices by [`SensorAddress`] so "all hits on sensor S" is a
//! single hash lookup.

use bibfilter_core::SensorAddress;
use std::collections::HashMap;

/// Mapping from sensor address to the indices of the hits on it.
///
/// Indices keep insertion order. The index lives for one event and is
/// rebuilt in place for the next.
#[derive(Debug, Default, Clone)]
pub struct SensorIndex {
    cells: HashMap<SensorAddress, Vec<usize>>,
}

impl SensorIndex {
    /// Builds an index over `addresses`, where position `i` is hit `i`.
    #[must_use]
    pub fn build(addresses: &[SensorAddress]) -> Self {
        let mut index = Self::default();
        index.rebuild(addresses);
        index
    }

    /// Clears the index and refills it from `addresses`.
    pub fn rebuild(&mut self, addresses: &[SensorAddress]) {
        self.clear();
        for (i, address) in addresses.iter().enumerate() {
            self.insert(*address, i);
        }
    }

    /// Clear all data.
    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Appends hit `index` to the sensor at `address`.
    pub fn insert(&mut self, address: SensorAddress, index: usize) {
        self.cells.entry(address).or_default().push(index);
    }

    /// Hit indices on the sensor at `address`, or `None` if it has no hits.
    #[inline]
    #[must_use]
    pub fn get(&self, address: &SensorAddress) -> Option<&[usize]> {
        self.cells.get(address).map(Vec::as_slice)
    }

    /// Number of sensors with at least one hit.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if no hits are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Total number of indexed hits.
    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    /// Iterates over the occupied sensors in no particular order.
    pub fn sensors(&self) -> impl Iterator<Item = &SensorAddress> {
        self.cells.keys()
    }
}
