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
use memoffset::offset_of;

use crate::{
    gc::{compactor::CompactionResult, GarbageCollector},
    stack_heap::{InterpreterMemory, StackHeap},
    util::round_up_to_nearest,
    vm::ForkContext,
    HeapError, StackHeapConfig, VmError, WORD_SIZE,
};

/// Longest word name the dictionary accepts
pub const MAX_NAME_LEN: usize = 31;

/// Start of every dictionary entry, followed by the name and the body cells
#[repr(C)]
struct WordHeader {
    /// previously defined word, `0` for the first one
    link: usize,
    name_len: usize,
}

#[inline]
fn link_offset() -> usize {
    offset_of!(WordHeader, link)
}

#[inline]
fn name_len_offset() -> usize {
    offset_of!(WordHeader, name_len)
}

#[inline]
fn body_offset(name_len: usize) -> usize {
    round_up_to_nearest(size_of::<WordHeader>() + name_len, WORD_SIZE)
}

/// Drives a [`StackHeap`] the way an interpreter does and reports every
/// allocation to its [`GarbageCollector`].
///
/// Words are chained backwards from the latest word, so the latest word
/// keeps every compiled word alive.
#[derive(Clone)]
pub struct InterpreterHost {
    heap: StackHeap,
    collector: GarbageCollector,
}

impl InterpreterHost {
    pub fn new(config: &StackHeapConfig) -> Self {
        Self {
            heap: StackHeap::new(config),
            collector: GarbageCollector::new(),
        }
    }

    pub fn heap(&self) -> &StackHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut StackHeap {
        &mut self.heap
    }

    pub fn collector(&self) -> &GarbageCollector {
        &self.collector
    }

    /// Allocates inside a tracked region
    fn tracked_allot(&mut self, len: usize) -> Result<usize, HeapError> {
        self.collector.on_region_begin(&self.heap);
        let address = match self.heap.allot(len) {
            Ok(address) => address,
            Err(err) => {
                self.collector.on_region_abort();
                return Err(err);
            }
        };
        self.collector.on_region_end(&self.heap);

        self.heap.fill(address, len, 0)?;
        Ok(address)
    }

    /// `ALLOT`: allocates `len` zeroed bytes and pushes their address
    pub fn allot(&mut self, len: usize) -> Result<usize, HeapError> {
        let address = self.tracked_allot(len)?;
        self.heap.push(address)?;
        Ok(address)
    }

    pub fn push(&mut self, value: usize) -> Result<(), HeapError> {
        self.heap.push(value)
    }

    pub fn pop(&mut self) -> Result<usize, HeapError> {
        self.heap.pop()
    }

    pub fn dup(&mut self) -> Result<(), HeapError> {
        let top = self.heap.peek(0)?;
        self.heap.push(top)
    }

    pub fn drop(&mut self) -> Result<(), HeapError> {
        self.heap.pop().map(|_| ())
    }

    pub fn swap(&mut self) -> Result<(), HeapError> {
        let a = self.heap.pop()?;
        let b = self.heap.pop()?;
        self.heap.push(a)?;
        self.heap.push(b)
    }

    pub fn over(&mut self) -> Result<(), HeapError> {
        let second = self.heap.peek(1)?;
        self.heap.push(second)
    }

    /// `!`: stores `value` at any (not necessarily aligned) address
    pub fn store(&mut self, address: usize, value: usize) -> Result<(), HeapError> {
        self.heap.write_word(address, value)
    }

    /// `@`
    pub fn fetch(&self, address: usize) -> Result<usize, HeapError> {
        self.heap.read_word(address).ok_or(HeapError::OutOfBounds {
            address,
            len: WORD_SIZE,
        })
    }

    /// Compiles a new word with the given body cells and makes it the latest word.
    /// Returns the address of the word.
    pub fn define_word(&mut self, name: &str, body: &[usize]) -> Result<usize, HeapError> {
        if name.len() > MAX_NAME_LEN {
            return Err(HeapError::NameTooLong { max: MAX_NAME_LEN });
        }

        let body_start = body_offset(name.len());
        let word = self.tracked_allot(body_start + body.len() * WORD_SIZE)?;

        let link = self.heap.latest();
        self.heap.write_word(word + link_offset(), link)?;
        self.heap.write_word(word + name_len_offset(), name.len())?;
        self.heap
            .write_bytes(word + size_of::<WordHeader>(), name.as_bytes())?;
        for (i, cell) in body.iter().enumerate() {
            self.heap
                .write_word(word + body_start + i * WORD_SIZE, *cell)?;
        }

        self.heap.set_latest(word);
        trace!("Defined word {} at {:#x}", name, word);
        Ok(word)
    }

    /// `VARIABLE`: allocates one cell and a word that refers to it.
    /// Returns the address of the cell.
    pub fn define_variable(&mut self, name: &str) -> Result<usize, HeapError> {
        let cell = self.tracked_allot(WORD_SIZE)?;
        self.define_word(name, &[cell])?;
        Ok(cell)
    }

    /// Searches the dictionary from the latest word backwards
    pub fn find_word(&self, name: &str) -> Option<usize> {
        let mut word = self.heap.latest();
        let mut remaining = self.collector.region_count();

        while word != 0 && remaining > 0 {
            let name_len = self.heap.read_word(word + name_len_offset())?;
            let stored = self
                .heap
                .read_bytes(word + size_of::<WordHeader>(), name_len)
                .ok()?;
            if stored == name.as_bytes() {
                return Some(word);
            }

            word = self.heap.read_word(word + link_offset())?;
            remaining -= 1;
        }

        None
    }

    /// Address of the first body cell of `word`
    pub fn word_body(&self, word: usize) -> Result<usize, HeapError> {
        let name_len = self.fetch(word + name_len_offset())?;
        Ok(word + body_offset(name_len))
    }

    /// Address of the cell belonging to variable `name`
    pub fn variable(&self, name: &str) -> Option<usize> {
        let word = self.find_word(name)?;
        let body = self.word_body(word).ok()?;
        self.fetch(body).ok()
    }

    /// Scans the heap and returns the number of unreachable bytes
    pub fn scan(&mut self) -> usize {
        self.collector.scan(&self.heap)
    }

    /// Unreachable bytes of the latest scan
    pub fn unreachable_size(&self) -> usize {
        self.collector.unreachable_size()
    }

    pub fn allocated_size(&self) -> usize {
        self.collector.allocated_size()
    }

    pub fn region_count(&self) -> usize {
        self.collector.region_count()
    }

    pub fn collect(&mut self) -> Result<CompactionResult, HeapError> {
        self.collector.collect(&mut self.heap)
    }

    pub fn here(&self) -> usize {
        self.heap.here()
    }
}

/// Like a forked process, the child finds `0` on its data stack and the parent `1`
impl ForkContext for InterpreterHost {
    fn on_forked(&mut self, is_child: bool) -> Result<(), VmError> {
        let result = if is_child { 0 } else { 1 };
        self.heap.push(result).map_err(VmError::ForkResult)
    }
}
