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

use core::mem::size_of;

use log::trace;
use static_assertions::{assert_eq_size, const_assert};

use crate::{
    util::{read_word_at, write_word_at},
    HeapError, StackHeapConfig,
};

/// Size of one interpreter cell (and of every pointer stored in the heap)
pub const WORD_SIZE: usize = size_of::<usize>();

const_assert!(WORD_SIZE.is_power_of_two());
assert_eq_size!(usize, *const u8);

/// The part of an interpreter the collector needs to know about.
///
/// Addresses are absolute values as the interpreter stores them in its memory,
/// not offsets into some buffer. Words can be read and written at any byte address.
pub trait InterpreterMemory {
    /// Next free heap byte (the bump pointer)
    fn here(&self) -> usize;

    fn set_here(&mut self, here: usize);

    /// Lowest address of the live data stack
    fn stack_top(&self) -> usize;

    /// Address one past the highest data stack cell
    fn stack_bottom(&self) -> usize;

    /// Address of the most recently defined word, `0` if there is none
    fn latest(&self) -> usize;

    fn set_latest(&mut self, latest: usize);

    /// Reads the word stored at `[address, address + WORD_SIZE)`.
    ///
    /// Returns `None` if this range is not backed by memory.
    fn read_word(&self, address: usize) -> Option<usize>;

    fn write_word(&mut self, address: usize, value: usize) -> Result<(), HeapError>;

    /// Copies `len` bytes from `src` to `dest`. The ranges may overlap.
    fn copy_within(&mut self, src: usize, dest: usize, len: usize) -> Result<(), HeapError>;
}

/// One linear block of interpreter memory.
///
/// ```text
/// base                 heap_limit                stack_bottom
///  | heap -> ... here   |   ... stack_top <- stack |
/// ```
#[derive(Clone)]
pub struct StackHeap {
    base: usize,
    memory: Box<[u8]>,
    heap_limit: usize,
    here: usize,
    stack_top: usize,
    latest: usize,
}

impl StackHeap {
    pub fn new(config: &StackHeapConfig) -> Self {
        assert!(config.base_address != 0, "base address must not be zero");
        assert!(
            config.base_address % WORD_SIZE == 0 && config.stack_size % WORD_SIZE == 0,
            "base address and stack size have to be word aligned"
        );

        let total = config.heap_size + config.stack_size;
        let base = config.base_address;
        assert!(base.checked_add(total).is_some(), "stack heap exceeds address space");

        log::info!(
            "New stack heap at {:#x} with {} heap bytes and {} stack bytes",
            base,
            config.heap_size,
            config.stack_size
        );

        Self {
            base,
            memory: vec![0u8; total].into_boxed_slice(),
            heap_limit: base + config.heap_size,
            here: base,
            stack_top: base + total,
            latest: 0,
        }
    }

    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    /// First address that is not usable by the heap anymore
    #[inline]
    pub fn heap_limit(&self) -> usize {
        self.heap_limit
    }

    /// Bump allocates `len` bytes and returns their address.
    ///
    /// Memory is handed out as is, previous contents are not cleared.
    pub fn allot(&mut self, len: usize) -> Result<usize, HeapError> {
        let available = self.heap_limit - self.here;
        if len > available {
            return Err(HeapError::OutOfMemory {
                requested: len,
                available,
            });
        }

        let start = self.here;
        self.here += len;
        trace!("Allot {} bytes at {:#x}", len, start);
        Ok(start)
    }

    pub fn push(&mut self, value: usize) -> Result<(), HeapError> {
        if self.stack_top - WORD_SIZE < self.heap_limit {
            return Err(HeapError::StackOverflow);
        }

        self.stack_top -= WORD_SIZE;
        self.write_word(self.stack_top, value)
    }

    pub fn pop(&mut self) -> Result<usize, HeapError> {
        let value = self.peek(0)?;
        self.stack_top += WORD_SIZE;
        Ok(value)
    }

    /// Reads the stack cell `depth` cells below the top without removing it
    pub fn peek(&self, depth: usize) -> Result<usize, HeapError> {
        if depth >= self.depth() {
            return Err(HeapError::StackUnderflow);
        }

        self.read_word(self.stack_top + depth * WORD_SIZE)
            .ok_or(HeapError::StackUnderflow)
    }

    /// Number of cells on the data stack
    #[inline]
    pub fn depth(&self) -> usize {
        (self.stack_bottom() - self.stack_top) / WORD_SIZE
    }

    pub fn read_bytes(&self, address: usize, len: usize) -> Result<&[u8], HeapError> {
        let offset = self.offset_of(address, len)?;
        Ok(&self.memory[offset..offset + len])
    }

    pub fn write_bytes(&mut self, address: usize, src: &[u8]) -> Result<(), HeapError> {
        let offset = self.offset_of(address, src.len())?;
        self.memory[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    pub fn fill(&mut self, address: usize, len: usize, value: u8) -> Result<(), HeapError> {
        let offset = self.offset_of(address, len)?;
        self.memory[offset..offset + len].fill(value);
        Ok(())
    }

    /// Translates an absolute address into an index of `memory`
    fn offset_of(&self, address: usize, len: usize) -> Result<usize, HeapError> {
        let out_of_bounds = HeapError::OutOfBounds { address, len };

        let offset = address.checked_sub(self.base).ok_or(out_of_bounds)?;
        let end = offset.checked_add(len).ok_or(out_of_bounds)?;
        if end > self.memory.len() {
            return Err(out_of_bounds);
        }

        Ok(offset)
    }
}

impl InterpreterMemory for StackHeap {
    #[inline]
    fn here(&self) -> usize {
        self.here
    }

    fn set_here(&mut self, here: usize) {
        debug_assert!(here >= self.base && here <= self.heap_limit);
        self.here = here;
    }

    #[inline]
    fn stack_top(&self) -> usize {
        self.stack_top
    }

    #[inline]
    fn stack_bottom(&self) -> usize {
        self.base + self.memory.len()
    }

    #[inline]
    fn latest(&self) -> usize {
        self.latest
    }

    fn set_latest(&mut self, latest: usize) {
        self.latest = latest;
    }

    fn read_word(&self, address: usize) -> Option<usize> {
        let offset = address.checked_sub(self.base)?;
        read_word_at(&self.memory, offset)
    }

    fn write_word(&mut self, address: usize, value: usize) -> Result<(), HeapError> {
        let offset = self.offset_of(address, WORD_SIZE)?;
        write_word_at(&mut self.memory, offset, value);
        Ok(())
    }

    fn copy_within(&mut self, src: usize, dest: usize, len: usize) -> Result<(), HeapError> {
        let src_offset = self.offset_of(src, len)?;
        let dest_offset = self.offset_of(dest, len)?;

        self.memory
            .copy_within(src_offset..src_offset + len, dest_offset);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{InterpreterMemory, StackHeap, WORD_SIZE};
    use crate::{HeapError, StackHeapConfig};

    fn small_heap() -> StackHeap {
        StackHeap::new(&StackHeapConfig {
            base_address: 0x4000,
            heap_size: 64,
            stack_size: 4 * WORD_SIZE,
        })
    }

    #[test]
    fn test_allot_bumps_here() {
        let mut heap = small_heap();
        assert_eq!(heap.allot(10).unwrap(), 0x4000);
        assert_eq!(heap.allot(6).unwrap(), 0x400a);
        assert_eq!(heap.here(), 0x4010);

        assert_eq!(
            heap.allot(49),
            Err(HeapError::OutOfMemory {
                requested: 49,
                available: 48
            })
        );
        assert_eq!(heap.here(), 0x4010, "failed allot must not move here");
    }

    #[test]
    fn test_stack_grows_down() {
        let mut heap = small_heap();
        let bottom = heap.stack_bottom();
        assert_eq!(heap.stack_top(), bottom);

        heap.push(1).unwrap();
        heap.push(2).unwrap();
        assert_eq!(heap.stack_top(), bottom - 2 * WORD_SIZE);
        assert_eq!(heap.depth(), 2);
        assert_eq!(heap.peek(0).unwrap(), 2);
        assert_eq!(heap.peek(1).unwrap(), 1);

        heap.push(3).unwrap();
        heap.push(4).unwrap();
        assert_eq!(heap.push(5), Err(HeapError::StackOverflow));

        assert_eq!(heap.pop().unwrap(), 4);
        assert_eq!(heap.pop().unwrap(), 3);
        assert_eq!(heap.pop().unwrap(), 2);
        assert_eq!(heap.pop().unwrap(), 1);
        assert_eq!(heap.pop(), Err(HeapError::StackUnderflow));
    }

    #[test]
    fn test_bounds() {
        let mut heap = small_heap();
        let end = heap.stack_bottom();

        assert_eq!(heap.read_word(0x3fff), None);
        assert_eq!(heap.read_word(end - WORD_SIZE + 1), None);
        assert!(heap.read_word(end - WORD_SIZE).is_some());
        assert!(heap.write_word(end - 1, 0).is_err());
        assert!(heap.read_bytes(0x4000, 64 + 4 * WORD_SIZE).is_ok());
        assert!(heap.read_bytes(0x4000, 64 + 4 * WORD_SIZE + 1).is_err());
    }

    #[test]
    fn test_overlapping_copy() {
        let mut heap = small_heap();
        heap.write_bytes(0x4004, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        heap.copy_within(0x4004, 0x4000, 8).unwrap();
        assert_eq!(heap.read_bytes(0x4000, 8).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
