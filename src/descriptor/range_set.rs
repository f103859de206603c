//! Free-range bookkeeping for descriptor heaps.

use std::collections::BTreeMap;

/// Half-open interval `[start, end)` of descriptor slot indices inside one heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapRange {
    start: u32,
    end: u32,
}

impl HeapRange {
    /// Range covering `[start, end)`.
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self {
            start,
            end,
        }
    }

    /// Range of `length` slots starting at `start`.
    pub fn with_length(start: u32, length: u32) -> Self {
        Self::new(start, start + length)
    }

    /// First slot index.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// One past the last slot index.
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Number of slots covered.
    pub fn length(&self) -> u32 {
        self.end - self.start
    }

    /// True if the range covers no slots.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True if the two ranges share at least one slot.
    pub fn overlaps(&self, other: &HeapRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Set of free intervals ordered by start offset. Reservation is first-fit; release coalesces
/// with adjacent free neighbors immediately, so the set normally stays minimal and the explicit
/// [`coalesce`](RangeSet::coalesce) pass only matters as the one retry before reporting
/// exhaustion.
#[derive(Debug, Clone, Default)]
pub struct RangeSet {
    // start -> end
    free: BTreeMap<u32, u32>,
}

impl RangeSet {
    /// A set with a single free interval `[0, capacity)`.
    pub fn new(capacity: u32) -> Self {
        let mut free = BTreeMap::new();
        if capacity > 0 {
            free.insert(0, capacity);
        }
        Self {
            free,
        }
    }

    /// Reserve the first free interval of at least `length` contiguous slots, walking the free
    /// set in start-offset order. Returns `None` when no interval fits.
    pub fn reserve(&mut self, length: u32) -> Option<HeapRange> {
        debug_assert!(length > 0);
        let (&start, &end) = self
            .free
            .iter()
            .find(|(&start, &end)| end - start >= length)?;
        self.free.remove(&start);
        if end - start > length {
            self.free.insert(start + length, end);
        }
        Some(HeapRange::with_length(start, length))
    }

    /// Return an interval to the free set, merging it with adjacent free neighbors.
    ///
    /// Returns `false` if the released range overlaps an already-free interval, which indicates
    /// a double release; the set is left unchanged in that case.
    pub fn release(&mut self, range: HeapRange) -> bool {
        if range.is_empty() {
            return true;
        }
        let mut start = range.start();
        let mut end = range.end();

        // Reject overlap with any existing free interval.
        let overlaps_predecessor = self
            .free
            .range(..end)
            .next_back()
            .map_or(false, |(&prev_start, &prev_end)| {
                prev_end > start && prev_start < end
            });
        let overlaps_successor = self
            .free
            .range(start..)
            .next()
            .map_or(false, |(&next_start, _)| next_start < end);
        if overlaps_predecessor || overlaps_successor {
            return false;
        }

        // Coalesce with the predecessor ending exactly at our start.
        let predecessor = self
            .free
            .range(..start)
            .next_back()
            .map(|(&prev_start, &prev_end)| (prev_start, prev_end));
        if let Some((prev_start, prev_end)) = predecessor {
            if prev_end == start {
                self.free.remove(&prev_start);
                start = prev_start;
            }
        }
        // Coalesce with the successor starting exactly at our end.
        if let Some(next_end) = self.free.get(&end).copied() {
            self.free.remove(&end);
            end = next_end;
        }
        self.free.insert(start, end);
        true
    }

    /// Merge any adjacent free intervals left in the set. Release already coalesces eagerly, so
    /// this is normally a no-op; it exists as the compaction retry before a reservation fails.
    pub fn coalesce(&mut self) {
        let mut merged: BTreeMap<u32, u32> = BTreeMap::new();
        for (&start, &end) in &self.free {
            match merged.iter_mut().next_back() {
                Some((_, last_end)) if *last_end == start => *last_end = end,
                _ => {
                    merged.insert(start, end);
                }
            }
        }
        self.free = merged;
    }

    /// Total number of free slots.
    pub fn free_total(&self) -> u32 {
        self.free.iter().map(|(&start, &end)| end - start).sum()
    }

    /// Free intervals in start-offset order.
    pub fn free_ranges(&self) -> impl Iterator<Item = HeapRange> + '_ {
        self.free
            .iter()
            .map(|(&start, &end)| HeapRange::new(start, end))
    }
}
