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

//! Software managed virtual memory for interpreter instances.
//!
//! Pages of a [`MemoryWindowModule`] are mapped on demand. Whoever detects a
//! fault (the checked accessors of [`VirtualMemory`] or the SIGSEGV trap) hands
//! the faulting address to [`FaultHandler::on_fault`], which repairs the mapping
//! so the access can be restarted.

pub mod forking;
pub mod page_table;
pub mod pager;

pub use forking::{ForkContext, ForkingMemory};
pub use pager::DemandPager;

use crate::{
    modules::memory_window::{MemoryWindowModule, PageFault},
    VmError, WORD_SIZE,
};

/// How often a single chunk of an access may fault before giving up.
///
/// A write to a page of a swapped out, shared frame faults once for loading
/// and once more for copying.
pub const MAX_FAULTS_PER_ACCESS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PageState {
    /// never touched
    Unmapped,

    /// mapped into the window
    Active,

    /// evicted, contents live in the backing file
    Swapped,
}

/// What a fault handler did to resolve a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingAction {
    /// first touch, `page` was mapped with zeroed contents
    MapZeroed {
        page: usize,
        evicted: Option<usize>,
    },

    /// `page` was mapped again with the contents it had when it was evicted
    Restore {
        page: usize,
        evicted: Option<usize>,
    },

    /// first touch of `page` in this instance, `frame` was allocated for it
    NewFrame { page: usize, frame: usize },

    /// `page` was mapped from its already assigned `frame`
    LoadFrame { page: usize, frame: usize },

    /// write to a shared frame, contents of frame `from` were copied into the new frame `to`
    CopyOnWrite { page: usize, from: usize, to: usize },

    /// write to a frame that is not shared (anymore), it was made writable in place
    Unshare { page: usize, frame: usize },
}

/// Fault counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PagingStats {
    pub faults: u64,
    pub evictions: u64,
    pub restores: u64,
    pub copies: u64,
}

/// Resolves page faults.
///
/// After `on_fault` returned `Ok`, the access that caused the fault can be restarted.
/// Every error is fatal for the faulting instance.
pub trait FaultHandler {
    fn on_fault(&mut self, address: usize) -> Result<MappingAction, VmError>;
}

/// A fault handler that owns its window.
///
/// `read` and `write` split an access into one chunk per page, resolve faults
/// through [`FaultHandler::on_fault`] and restart the chunk afterwards.
pub trait VirtualMemory: FaultHandler {
    type Window: MemoryWindowModule;

    fn window(&self) -> &Self::Window;

    fn window_mut(&mut self) -> &mut Self::Window;

    fn read(&mut self, address: usize, dest: &mut [u8]) -> Result<(), VmError> {
        let mut done = 0;
        while done < dest.len() {
            let current = address + done;
            let len = chunk_len(self.window(), current, dest.len() - done)?;
            let chunk = &mut dest[done..done + len];

            let mut faults = 0;
            while let Err(PageFault { address, .. }) = self.window().read(current, chunk) {
                faults += 1;
                if faults > MAX_FAULTS_PER_ACCESS {
                    return Err(VmError::UnresolvedFault(address));
                }
                self.on_fault(address)?;
            }

            done += len;
        }

        Ok(())
    }

    fn write(&mut self, address: usize, src: &[u8]) -> Result<(), VmError> {
        let mut done = 0;
        while done < src.len() {
            let current = address + done;
            let len = chunk_len(self.window(), current, src.len() - done)?;
            let chunk = &src[done..done + len];

            let mut faults = 0;
            while let Err(PageFault { address, .. }) = self.window_mut().write(current, chunk) {
                faults += 1;
                if faults > MAX_FAULTS_PER_ACCESS {
                    return Err(VmError::UnresolvedFault(address));
                }
                self.on_fault(address)?;
            }

            done += len;
        }

        Ok(())
    }

    fn read_word(&mut self, address: usize) -> Result<usize, VmError> {
        let mut buf = [0u8; WORD_SIZE];
        self.read(address, &mut buf)?;
        Ok(usize::from_ne_bytes(buf))
    }

    fn write_word(&mut self, address: usize, value: usize) -> Result<(), VmError> {
        self.write(address, &value.to_ne_bytes())
    }
}

/// Bytes from `address` up to the end of its page, at most `remaining`
fn chunk_len<W: MemoryWindowModule>(
    window: &W,
    address: usize,
    remaining: usize,
) -> Result<usize, VmError> {
    let page = window
        .page_index(address)
        .ok_or(VmError::AddressOutOfWindow(address))?;
    let page_end = window.page_address(page) + window.page_size();

    Ok((page_end - address).min(remaining))
}
