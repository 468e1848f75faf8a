/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use log::{trace, warn};

/// One allocation of the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    /// First byte of the region
    pub start: usize,

    /// First byte after the region. Equals `start` until the region is finalized.
    pub end: usize,

    /// Marking result of the latest reachability scan
    pub reachable: bool,

    /// Start before the last compaction moved this region, if it moved
    pub moved_from: Option<usize>,
}

impl MemoryRegion {
    fn open(start: usize) -> Self {
        Self {
            start,
            end: start,
            reachable: false,
            moved_from: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    pub fn contains(&self, address: usize) -> bool {
        self.start <= address && address < self.end
    }
}

/// Keeps track of all regions in allocation order.
///
/// Because the heap is bump allocated, allocation order is also address order.
/// Every lookup depends on that.
#[derive(Debug, Default, Clone)]
pub struct RegionTracker {
    regions: Vec<MemoryRegion>,
}

impl RegionTracker {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Opens a new region starting at the current heap cursor
    pub fn begin_region(&mut self, here: usize) {
        debug_assert!(
            self.regions.last().map_or(true, |last| last.end <= here),
            "regions have to be created in address order"
        );

        trace!("Begin region at {:#x} (region {})", here, self.regions.len());
        self.regions.push(MemoryRegion::open(here));
    }

    /// Finalizes the most recently opened region at the current heap cursor
    pub fn end_region(&mut self, here: usize) {
        match self.regions.last_mut() {
            Some(region) if here >= region.start => {
                region.end = here;
                trace!(
                    "End region [{:#x}, {:#x}) with {} bytes",
                    region.start,
                    region.end,
                    region.len()
                );
            }
            Some(region) => {
                warn!(
                    "Region end {:#x} lies before its start {:#x}, ignoring it",
                    here, region.start
                );
            }
            None => warn!("Region end at {:#x} without a region begin", here),
        }
    }

    /// Drops the most recently opened region, its allocation did not happen
    pub fn abort_region(&mut self) {
        match self.regions.pop() {
            Some(region) => {
                debug_assert!(region.is_empty(), "only open regions can be aborted");
                trace!("Abort region at {:#x}", region.start);
            }
            None => warn!("Region abort without a region begin"),
        }
    }

    /// Returns the index of the region containing `address`
    pub fn find_region(&self, address: usize) -> Option<usize> {
        // first region that starts after address
        let idx = self.regions.partition_point(|region| region.start <= address);
        if idx == 0 {
            return None;
        }

        // empty regions can share their start with the next one,
        // so the candidate is the last region starting at or before address
        let candidate = idx - 1;
        if self.regions[candidate].contains(address) {
            Some(candidate)
        } else {
            None
        }
    }

    /// Sum of all region lengths
    pub fn allocated_size(&self) -> usize {
        self.regions.iter().map(MemoryRegion::len).sum()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Sum of all region lengths that were not reached by the latest scan
    pub fn unreachable_size(&self) -> usize {
        self.regions
            .iter()
            .filter(|region| !region.reachable)
            .map(MemoryRegion::len)
            .sum()
    }

    #[inline]
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    #[inline]
    pub(crate) fn regions_mut(&mut self) -> &mut [MemoryRegion] {
        &mut self.regions
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<&MemoryRegion> {
        self.regions.get(idx)
    }

    pub(crate) fn reset_marks(&mut self) {
        for region in self.regions.iter_mut() {
            region.reachable = false;
        }
    }

    /// Drops all regions that are not marked as reachable.
    /// Returns the number of freed bytes.
    pub(crate) fn retain_reachable(&mut self) -> usize {
        let freed = self.unreachable_size();
        self.regions.retain(|region| region.reachable);
        freed
    }
}

#[cfg(test)]
mod test {
    use super::RegionTracker;

    fn tracker_with(spans: &[(usize, usize)]) -> RegionTracker {
        let mut tracker = RegionTracker::new();
        for &(start, end) in spans {
            tracker.begin_region(start);
            tracker.end_region(end);
        }
        tracker
    }

    #[test]
    fn test_region_records() {
        let tracker = tracker_with(&[(100, 116), (116, 124), (124, 133)]);

        assert_eq!(tracker.region_count(), 3);
        assert_eq!(tracker.allocated_size(), 33);
        assert_eq!(tracker.get(2).unwrap().len(), 9);
    }

    #[test]
    fn test_find_region() {
        let tracker = tracker_with(&[(100, 116), (120, 128), (128, 129)]);

        assert_eq!(tracker.find_region(99), None);
        assert_eq!(tracker.find_region(100), Some(0));
        assert_eq!(tracker.find_region(108), Some(0));
        assert_eq!(tracker.find_region(115), Some(0));

        // gap between the first two regions
        assert_eq!(tracker.find_region(116), None);
        assert_eq!(tracker.find_region(119), None);

        assert_eq!(tracker.find_region(120), Some(1));
        assert_eq!(tracker.find_region(127), Some(1));
        assert_eq!(tracker.find_region(128), Some(2));
        assert_eq!(tracker.find_region(129), None);
        assert_eq!(tracker.find_region(usize::MAX), None);
    }

    #[test]
    fn test_empty_region_never_matches() {
        let tracker = tracker_with(&[(100, 108), (108, 108), (108, 116)]);

        assert_eq!(tracker.find_region(108), Some(2));
        assert_eq!(tracker.find_region(107), Some(0));
    }

    #[test]
    fn test_open_region_is_empty_until_finalized() {
        let mut tracker = RegionTracker::new();
        tracker.begin_region(200);
        assert_eq!(tracker.find_region(200), None);
        assert_eq!(tracker.allocated_size(), 0);

        tracker.end_region(216);
        assert_eq!(tracker.find_region(200), Some(0));
        assert_eq!(tracker.allocated_size(), 16);
    }

    #[test]
    fn test_abort_region() {
        let mut tracker = tracker_with(&[(0, 8)]);
        tracker.begin_region(8);
        tracker.abort_region();

        assert_eq!(tracker.region_count(), 1);
        assert_eq!(tracker.regions()[0].end, 8);

        // next allocation starts at the same address
        tracker.begin_region(8);
        tracker.end_region(12);
        assert_eq!(tracker.find_region(11), Some(1));
    }

    #[test]
    fn test_retain_reachable() {
        let mut tracker = tracker_with(&[(0, 8), (8, 24), (24, 32)]);
        tracker.regions_mut()[1].reachable = true;

        assert_eq!(tracker.unreachable_size(), 16);
        assert_eq!(tracker.retain_reachable(), 16);
        assert_eq!(tracker.region_count(), 1);
        assert_eq!(tracker.regions()[0].start, 8);
    }
}
