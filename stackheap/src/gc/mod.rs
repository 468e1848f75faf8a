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

//! Relocating garbage collector for a bump allocated interpreter heap.
//!
//! The interpreter reports the bounds of every allocation through
//! [`GarbageCollector::on_region_begin`] and [`GarbageCollector::on_region_end`].
//! Reachability is decided conservatively: any word (at any byte offset) whose value
//! lies inside a region keeps that region alive.

pub mod compactor;
pub mod region_tracker;
pub mod scanner;

use std::time::Instant;

use log::{debug, warn};

use crate::{stack_heap::InterpreterMemory, HeapError};
use compactor::{compact, CompactionResult};
use region_tracker::{MemoryRegion, RegionTracker};
use scanner::mark_reachable;

/// Collector statistics
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GcStats {
    /// Number of collections
    pub collections: u64,

    /// Total time spent collecting (nanoseconds)
    pub total_time_ns: u64,

    /// Bytes reclaimed by the last collection
    pub last_reclaimed: usize,

    /// Regions marked by the last scan
    pub last_marked: usize,

    /// Regions moved by the last collection
    pub last_moved: usize,

    /// Bytes reclaimed by all collections
    pub total_reclaimed: usize,
}

#[derive(Debug, Default, Clone)]
pub struct GarbageCollector {
    tracker: RegionTracker,
    stats: GcStats,
}

impl GarbageCollector {
    pub fn new() -> Self {
        Self {
            tracker: RegionTracker::new(),
            stats: GcStats::default(),
        }
    }

    /// Called by the interpreter right before it allocates
    pub fn on_region_begin<M: InterpreterMemory + ?Sized>(&mut self, memory: &M) {
        self.tracker.begin_region(memory.here());
    }

    /// Called by the interpreter right after it allocated
    pub fn on_region_end<M: InterpreterMemory + ?Sized>(&mut self, memory: &M) {
        self.tracker.end_region(memory.here());
    }

    /// Called by the interpreter instead of [`Self::on_region_end`] when the allocation failed
    pub fn on_region_abort(&mut self) {
        self.tracker.abort_region();
    }

    /// Total bytes of all tracked regions
    pub fn allocated_size(&self) -> usize {
        self.tracker.allocated_size()
    }

    pub fn region_count(&self) -> usize {
        self.tracker.region_count()
    }

    /// Unreachable bytes as of the most recent scan, does not scan again
    pub fn unreachable_size(&self) -> usize {
        self.tracker.unreachable_size()
    }

    /// Runs a reachability scan and returns the number of unreachable bytes
    pub fn scan<M: InterpreterMemory + ?Sized>(&mut self, memory: &M) -> usize {
        self.stats.last_marked = mark_reachable(&mut self.tracker, memory);
        self.tracker.unreachable_size()
    }

    /// Drops unreachable regions, compacts the rest and rewrites pointers into them.
    ///
    /// The interpreter must not allocate while this runs.
    pub fn collect<M: InterpreterMemory + ?Sized>(
        &mut self,
        memory: &mut M,
    ) -> Result<CompactionResult, HeapError> {
        if self.tracker.region_count() == 0 {
            warn!("Collection requested without any tracked region");
            return Ok(CompactionResult::default());
        }

        let start = Instant::now();
        let result = compact(&mut self.tracker, memory)?;

        self.stats.collections += 1;
        self.stats.total_time_ns += start.elapsed().as_nanos() as u64;
        self.stats.last_reclaimed = result.reclaimed;
        self.stats.last_marked = result.marked;
        self.stats.last_moved = result.moved;
        self.stats.total_reclaimed += result.reclaimed;

        debug!(
            "Collection {} finished, {} regions with {} bytes remain",
            self.stats.collections,
            self.tracker.region_count(),
            self.tracker.allocated_size()
        );

        Ok(result)
    }

    /// Region containing `address`, if any
    pub fn find_region(&self, address: usize) -> Option<&MemoryRegion> {
        self.tracker
            .find_region(address)
            .and_then(|idx| self.tracker.get(idx))
    }

    pub fn regions(&self) -> &[MemoryRegion] {
        self.tracker.regions()
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }
}
