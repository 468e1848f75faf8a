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

use std::path::PathBuf;

/// Layout of the linear memory an interpreter instance works on.
///
/// The heap grows upwards from `base_address`, the data stack grows
/// downwards from `base_address + heap_size + stack_size`.
#[derive(Debug, Clone)]
pub struct StackHeapConfig {
    /// Address of the first heap byte. Must not be zero, so `0` never looks like a heap pointer.
    pub base_address: usize,

    /// Bytes available for allocations
    pub heap_size: usize,

    /// Bytes reserved for the data stack
    pub stack_size: usize,
}

impl Default for StackHeapConfig {
    fn default() -> Self {
        Self {
            base_address: 0x1000_0000,
            heap_size: 4096 * 8,
            stack_size: 4096 * 2,
        }
    }
}

/// Configuration of the single instance demand pager.
#[derive(Debug, Clone)]
pub struct PagingConfig {
    /// Number of pages in the managed window
    pub page_count: usize,

    /// Maximum number of pages that are mapped at the same time
    pub max_active_pages: usize,

    /// Directory the page backing files are created in
    pub backing_dir: PathBuf,

    /// Backing file of page `n` is called `{backing_prefix}_{n}.dat`
    pub backing_prefix: String,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_count: 20,
            max_active_pages: 3,
            backing_dir: std::env::temp_dir(),
            backing_prefix: "page".to_string(),
        }
    }
}

/// Configuration of the multi instance (forking) memory.
#[derive(Debug, Clone)]
pub struct ForkingConfig {
    /// Number of pages each instance sees in the window
    pub page_count: usize,

    /// Maximum number of instances alive at the same time
    pub max_instances: usize,

    /// File holding all frames (`page_count * max_instances` pages)
    pub frame_file: PathBuf,
}

impl Default for ForkingConfig {
    fn default() -> Self {
        Self {
            page_count: 22,
            max_instances: 10,
            frame_file: std::env::temp_dir().join("stackheap_frames.dat"),
        }
    }
}

impl ForkingConfig {
    /// Total number of frames backing all instances
    pub fn frame_count(&self) -> usize {
        self.page_count * self.max_instances
    }
}
