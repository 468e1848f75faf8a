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

use log::{debug, info, trace, warn};

use super::{FaultHandler, MappingAction, PageState, PagingStats, VirtualMemory};
use crate::{
    modules::{
        eviction::{EvictionModule, PriorityEvictionModule},
        memory_window::{MemoryWindowModule, PageProtection},
        persistent_storage::{FilePersistentStorageModule, PersistentStorageModule},
    },
    PagingConfig, VmError,
};

/// Demand pager for a single interpreter instance.
///
/// At most `max_active_pages` pages are mapped at the same time. Evicted pages
/// are written to their own backing file, which is created the first time the page is touched.
///
/// ```text
/// Unmapped --first touch--> Active --evict--> Swapped
///                             ^                  |
///                             +-----restore------+
/// ```
pub struct DemandPager<W: MemoryWindowModule, E: EvictionModule = PriorityEvictionModule> {
    window: W,
    eviction: E,
    states: Vec<PageState>,
    backing: Vec<Option<FilePersistentStorageModule>>,
    config: PagingConfig,
    stats: PagingStats,
}

impl<W: MemoryWindowModule, E: EvictionModule> DemandPager<W, E> {
    pub fn new(window: W, config: PagingConfig) -> Self {
        assert!(
            config.page_count <= window.page_count(),
            "window has only {} pages, {} requested",
            window.page_count(),
            config.page_count
        );

        info!(
            "New demand pager for {} pages at {:#x}, at most {} active",
            config.page_count,
            window.base(),
            config.max_active_pages
        );

        Self {
            window,
            eviction: E::new(config.max_active_pages),
            states: vec![PageState::Unmapped; config.page_count],
            backing: (0..config.page_count).map(|_| None).collect(),
            config,
            stats: PagingStats::default(),
        }
    }

    pub fn state(&self, page: usize) -> Option<PageState> {
        self.states.get(page).copied()
    }

    pub fn active_count(&self) -> usize {
        self.eviction.active_count()
    }

    pub fn stats(&self) -> &PagingStats {
        &self.stats
    }

    pub fn config(&self) -> &PagingConfig {
        &self.config
    }

    fn managed_page(&self, address: usize) -> Option<usize> {
        self.window
            .page_index(address)
            .filter(|page| *page < self.config.page_count)
    }

    /// Persists `page` to its backing file and unmaps it
    fn evict(&mut self, page: usize) -> Result<(), VmError> {
        let bytes = self
            .window
            .page_bytes(page)
            .ok_or(VmError::Storage { page })?;
        let storage = self.backing[page]
            .as_mut()
            .ok_or(VmError::Storage { page })?;
        storage
            .write(0, bytes)
            .map_err(|_| VmError::Storage { page })?;

        self.window
            .unmap_page(page)
            .map_err(|_| VmError::UnmapFailed { page })?;

        self.states[page] = PageState::Swapped;
        self.stats.evictions += 1;

        debug!("Evicted page {}", page);
        Ok(())
    }

    fn map_fresh(&mut self, page: usize) -> Result<(), VmError> {
        let path = self.config.backing_dir.join(format!(
            "{}_{}.dat",
            self.config.backing_prefix, page
        ));
        let storage = FilePersistentStorageModule::new(path, self.window.page_size())
            .map_err(|err| {
                warn!("Could not create backing file for page {}: {}", page, err);
                VmError::Storage { page }
            })?;
        self.backing[page] = Some(storage);

        self.window
            .map_page(page, PageProtection::ReadWrite)
            .map_err(|_| VmError::MapFailed { page })?;

        trace!("Mapped page {} for the first time", page);
        Ok(())
    }

    fn restore(&mut self, page: usize) -> Result<(), VmError> {
        self.window
            .map_page(page, PageProtection::ReadWrite)
            .map_err(|_| VmError::MapFailed { page })?;

        let bytes = self
            .window
            .page_bytes_mut(page)
            .ok_or(VmError::MapFailed { page })?;
        let storage = self.backing[page]
            .as_mut()
            .ok_or(VmError::Storage { page })?;
        storage
            .read(0, bytes)
            .map_err(|_| VmError::Storage { page })?;

        self.stats.restores += 1;
        trace!("Restored page {}", page);
        Ok(())
    }
}

impl<W: MemoryWindowModule, E: EvictionModule> FaultHandler for DemandPager<W, E> {
    fn on_fault(&mut self, address: usize) -> Result<MappingAction, VmError> {
        let page = self
            .managed_page(address)
            .ok_or(VmError::AddressOutOfWindow(address))?;

        let state = self.states[page];
        if state == PageState::Active {
            return Err(VmError::UnresolvedFault(address));
        }

        self.stats.faults += 1;
        let evicted = self.eviction.victim(page);
        if let Some(victim) = evicted {
            self.evict(victim)?;
            self.eviction.remove(victim);
        }

        let action = match state {
            PageState::Unmapped => {
                self.map_fresh(page)?;
                MappingAction::MapZeroed { page, evicted }
            }
            _ => {
                self.restore(page)?;
                MappingAction::Restore { page, evicted }
            }
        };

        // only pages that are really mapped count as active
        self.eviction.on_fault(page);
        self.states[page] = PageState::Active;
        Ok(action)
    }
}

impl<W: MemoryWindowModule, E: EvictionModule> VirtualMemory for DemandPager<W, E> {
    type Window = W;

    fn window(&self) -> &W {
        &self.window
    }

    fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }
}
