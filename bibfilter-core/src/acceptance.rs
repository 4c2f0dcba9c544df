//! Per-hit accept/reject decisions.

/// Event-scoped decision flags, one per hit.
///
/// The backing buffer grows to the largest event seen and is cleared in
/// place on [`reset`](Self::reset), so steady-state processing does not
/// reallocate. Indices at or beyond the current event size always read
/// as rejected.
#[derive(Debug, Clone, Default)]
pub struct AcceptanceMap {
    flags: Vec<bool>,
    len: usize,
}

impl AcceptanceMap {
    /// Creates a map sized for `n_hits`, all rejected.
    #[must_use]
    pub fn with_len(n_hits: usize) -> Self {
        Self {
            flags: vec![false; n_hits],
            len: n_hits,
        }
    }

    /// Clears all decisions and resizes for an event with `n_hits` hits.
    pub fn reset(&mut self, n_hits: usize) {
        if self.flags.len() < n_hits {
            self.flags.resize(n_hits, false);
        }
        // Stale flags past `n_hits` must not reappear when the next event grows.
        self.flags[..self.len.max(n_hits)].fill(false);
        self.len = n_hits;
    }

    /// Number of hits in the current event.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the current event has no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Buffer size retained across events.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.flags.len()
    }

    /// Decision for hit `index`.
    #[inline]
    #[must_use]
    pub fn is_accepted(&self, index: usize) -> bool {
        index < self.len && self.flags[index]
    }

    /// Marks hit `index` as accepted. Out-of-range indices are ignored.
    #[inline]
    pub fn accept(&mut self, index: usize) {
        if index < self.len {
            self.flags[index] = true;
        }
    }

    /// Number of accepted hits.
    #[must_use]
    pub fn count_accepted(&self) -> usize {
        self.flags[..self.len].iter().filter(|&&f| f).count()
    }

    /// Iterates over the indices of accepted hits in ascending order.
    pub fn accepted_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.flags[..self.len]
            .iter()
            .enumerate()
            .filter_map(|(i, &f)| f.then_some(i))
    }

    /// Decisions for the current event as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[bool] {
        &self.flags[..self.len]
    }
}
