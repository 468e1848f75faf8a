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

use log::trace;

/// Maps the pages of one instance to frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTable {
    entries: Vec<Option<usize>>,
}

impl PageTable {
    pub fn new(page_count: usize) -> Self {
        Self {
            entries: vec![None; page_count],
        }
    }

    pub fn page_count(&self) -> usize {
        self.entries.len()
    }

    /// Frame assigned to `page`
    pub fn get(&self, page: usize) -> Option<usize> {
        *self.entries.get(page)?
    }

    pub fn set(&mut self, page: usize, frame: usize) {
        self.entries[page] = Some(frame);
    }

    /// All pages that have a frame, as `(page, frame)`
    pub fn assigned(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(page, frame)| frame.map(|frame| (page, frame)))
    }
}

/// Share counts of all frames, a frame with count `0` is free
#[derive(Debug)]
pub struct FrameTable {
    share_counts: Vec<usize>,
}

impl FrameTable {
    pub fn new(frame_count: usize) -> Self {
        Self {
            share_counts: vec![0; frame_count],
        }
    }

    pub fn capacity(&self) -> usize {
        self.share_counts.len()
    }

    /// Takes the first free frame
    pub fn allocate(&mut self) -> Option<usize> {
        let frame = self.share_counts.iter().position(|count| *count == 0)?;
        self.share_counts[frame] = 1;

        trace!("Allocated frame {}", frame);
        Some(frame)
    }

    /// One more page table refers to `frame`
    pub fn share(&mut self, frame: usize) {
        debug_assert!(self.share_counts[frame] > 0, "sharing a free frame");
        self.share_counts[frame] += 1;
    }

    /// One page table less refers to `frame`, returns the remaining count
    pub fn release(&mut self, frame: usize) -> usize {
        let count = &mut self.share_counts[frame];
        debug_assert!(*count > 0, "releasing a free frame");
        *count = count.saturating_sub(1);

        if *count == 0 {
            trace!("Frame {} is free again", frame);
        }
        *count
    }

    pub fn share_count(&self, frame: usize) -> usize {
        self.share_counts.get(frame).copied().unwrap_or(0)
    }

    pub fn is_shared(&self, frame: usize) -> bool {
        self.share_count(frame) > 1
    }

    /// Number of frames that are in use
    pub fn used_count(&self) -> usize {
        self.share_counts.iter().filter(|count| **count > 0).count()
    }
}
