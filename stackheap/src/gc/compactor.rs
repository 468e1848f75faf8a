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

use log::{debug, trace};

use super::{
    region_tracker::RegionTracker,
    scanner::{mark_reachable, ScanSpan},
};
use crate::{stack_heap::InterpreterMemory, HeapError, WORD_SIZE};

/// A region that was moved as one block from `[old_start, old_end)` to `new_start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Relocation {
    pub(crate) old_start: usize,
    pub(crate) old_end: usize,
    pub(crate) new_start: usize,
}

impl Relocation {
    /// Keeps the offset of interior pointers
    #[inline]
    pub(crate) fn translate(&self, value: usize) -> usize {
        self.new_start + (value - self.old_start)
    }
}

/// Relocations of one compaction, ordered by their old start
#[derive(Debug, Default)]
pub(crate) struct RelocationTable {
    entries: Vec<Relocation>,
}

impl RelocationTable {
    fn push(&mut self, relocation: Relocation) {
        debug_assert!(self
            .entries
            .last()
            .map_or(true, |last| last.old_end <= relocation.old_start));
        self.entries.push(relocation);
    }

    /// Finds the relocation whose old span contains `value`
    pub(crate) fn lookup(&self, value: usize) -> Option<&Relocation> {
        let idx = self.entries.partition_point(|entry| entry.old_start <= value);
        let entry = self.entries.get(idx.checked_sub(1)?)?;
        if value < entry.old_end {
            Some(entry)
        } else {
            None
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Outcome of a single compaction
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompactionResult {
    /// Regions that survived the scan
    pub marked: usize,

    /// Bytes of unreachable regions that were dropped
    pub reclaimed: usize,

    /// Regions that changed their address
    pub moved: usize,

    /// Stored pointers that were rewritten (including the latest word pointer)
    pub rewritten: usize,
}

/// Removes unreachable regions and slides the reachable ones down to the start of
/// the tracked heap, then rewrites every pointer into a moved region.
///
/// Regions are processed from low to high addresses. A region is never copied to
/// an address above its old start, so copying can not overwrite live data that is still waiting to be moved.
pub fn compact<M: InterpreterMemory + ?Sized>(
    tracker: &mut RegionTracker,
    memory: &mut M,
) -> Result<CompactionResult, HeapError> {
    let origin = match tracker.regions().first() {
        Some(first) => first.start,
        None => {
            debug!("Nothing to compact, no regions are tracked");
            return Ok(CompactionResult::default());
        }
    };

    let marked = mark_reachable(tracker, &*memory);
    let reclaimed = tracker.retain_reachable();

    let mut relocations = RelocationTable::default();
    let mut dest = origin;
    for region in tracker.regions_mut() {
        let len = region.len();
        let old_start = region.start;
        debug_assert!(dest <= old_start, "compaction must not move regions upwards");

        region.moved_from = None;
        if old_start != dest {
            memory.copy_within(old_start, dest, len)?;

            trace!(
                "Move region [{:#x}, {:#x}) to {:#x}",
                old_start,
                region.end,
                dest
            );
            relocations.push(Relocation {
                old_start,
                old_end: region.end,
                new_start: dest,
            });

            region.moved_from = Some(old_start);
            region.start = dest;
            region.end = dest + len;
        }

        dest += len;
    }

    memory.set_here(dest);

    let rewritten = if relocations.is_empty() {
        0
    } else {
        rewrite_pointers(tracker, memory, &relocations)?
    };

    debug!(
        "Compaction reclaimed {} bytes, moved {} regions, rewrote {} pointers, here is now {:#x}",
        reclaimed,
        relocations.len(),
        rewritten,
        dest
    );

    Ok(CompactionResult {
        marked,
        reclaimed,
        moved: relocations.len(),
        rewritten,
    })
}

/// Rewrites all pointers into old region spans found on the stack, inside regions
/// and in the latest word pointer.
fn rewrite_pointers<M: InterpreterMemory + ?Sized>(
    tracker: &RegionTracker,
    memory: &mut M,
    relocations: &RelocationTable,
) -> Result<usize, HeapError> {
    let mut rewritten = 0;

    let spans = core::iter::once(ScanSpan::stack(&*memory)).chain(
        tracker.regions().iter().map(|region| ScanSpan {
            start: region.start,
            end: region.end,
        }),
    );

    // regions already sit at their new place, their contents still hold old addresses
    let spans: Vec<ScanSpan> = spans.collect();
    for span in spans {
        rewritten += rewrite_span(memory, span, relocations)?;
    }

    let latest = memory.latest();
    if let Some(relocation) = relocations.lookup(latest) {
        let new_latest = relocation.translate(latest);
        trace!("Latest word moved from {:#x} to {:#x}", latest, new_latest);
        memory.set_latest(new_latest);
        rewritten += 1;
    }

    Ok(rewritten)
}

fn rewrite_span<M: InterpreterMemory + ?Sized>(
    memory: &mut M,
    span: ScanSpan,
    relocations: &RelocationTable,
) -> Result<usize, HeapError> {
    let mut rewritten = 0;
    let mut address = span.start;

    while address.saturating_add(WORD_SIZE) <= span.end {
        let value = memory.read_word(address);
        match value.and_then(|value| relocations.lookup(value).map(|r| (value, r))) {
            Some((value, relocation)) => {
                let new_value = relocation.translate(value);
                memory.write_word(address, new_value)?;
                trace!(
                    "Rewrite pointer at {:#x}: {:#x} -> {:#x}",
                    address,
                    value,
                    new_value
                );

                rewritten += 1;
                // the bytes of this pointer are done, do not read them again
                address += WORD_SIZE;
            }
            None => address += 1,
        }
    }

    Ok(rewritten)
}

#[cfg(test)]
mod test {
    use super::{Relocation, RelocationTable};

    #[test]
    fn test_relocation_lookup() {
        let mut table = RelocationTable::default();
        table.push(Relocation {
            old_start: 100,
            old_end: 116,
            new_start: 40,
        });
        table.push(Relocation {
            old_start: 130,
            old_end: 139,
            new_start: 56,
        });

        assert!(table.lookup(99).is_none());
        assert_eq!(table.lookup(100).unwrap().translate(100), 40);
        assert_eq!(table.lookup(108).unwrap().translate(108), 48);
        assert!(table.lookup(116).is_none());
        assert!(table.lookup(129).is_none());
        assert_eq!(table.lookup(138).unwrap().translate(138), 64);
        assert!(table.lookup(139).is_none());
    }
}
