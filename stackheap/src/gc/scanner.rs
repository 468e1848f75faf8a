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

use std::collections::VecDeque;

use log::{debug, trace};

use super::region_tracker::RegionTracker;
use crate::{stack_heap::InterpreterMemory, WORD_SIZE};

/// Half open address range `[start, end)` that is scanned for pointers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScanSpan {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl ScanSpan {
    /// Live part of the data stack
    pub(crate) fn stack<M: InterpreterMemory + ?Sized>(memory: &M) -> Self {
        Self {
            start: memory.stack_top(),
            end: memory.stack_bottom(),
        }
    }

    /// Every address a word can be read from without leaving the span.
    /// Steps byte by byte, pointers are not required to be aligned.
    pub(crate) fn word_addresses(&self) -> impl Iterator<Item = usize> {
        let last = self.end.checked_sub(WORD_SIZE).filter(|last| *last >= self.start);
        let start = self.start;
        last.into_iter().flat_map(move |last| start..=last)
    }
}

/// Marks every region that is reachable from the data stack or the latest word.
///
/// Every byte offset of a reachable span is read as a potential pointer,
/// a region counts as referenced if any of its bytes is pointed to.
/// Returns the number of marked regions.
pub fn mark_reachable<M: InterpreterMemory + ?Sized>(
    tracker: &mut RegionTracker,
    memory: &M,
) -> usize {
    tracker.reset_marks();

    let mut marked = 0;
    let mut worklist: VecDeque<ScanSpan> = VecDeque::new();
    worklist.push_back(ScanSpan::stack(memory));

    if let Some(idx) = tracker.find_region(memory.latest()) {
        let region = &mut tracker.regions_mut()[idx];
        region.reachable = true;
        marked += 1;
        worklist.push_back(ScanSpan {
            start: region.start,
            end: region.end,
        });
    }

    while let Some(span) = worklist.pop_front() {
        trace!("Scan [{:#x}, {:#x})", span.start, span.end);

        for address in span.word_addresses() {
            let candidate = match memory.read_word(address) {
                Some(candidate) => candidate,
                None => continue,
            };

            let idx = match tracker.find_region(candidate) {
                Some(idx) => idx,
                None => continue,
            };

            let region = &mut tracker.regions_mut()[idx];
            if region.reachable {
                // already queued once
                continue;
            }

            region.reachable = true;
            marked += 1;
            worklist.push_back(ScanSpan {
                start: region.start,
                end: region.end,
            });
        }
    }

    debug!(
        "Marked {} of {} regions, {} bytes unreachable",
        marked,
        tracker.region_count(),
        tracker.unreachable_size()
    );

    marked
}
