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

use super::{
    page_table::{FrameTable, PageTable},
    FaultHandler, MappingAction, PagingStats, VirtualMemory,
};
use crate::{
    modules::{
        memory_window::{MemoryWindowModule, PageProtection},
        persistent_storage::{FilePersistentStorageModule, PersistentStorageModule},
    },
    ForkingConfig, VmError,
};

/// Interpreter state of one instance.
///
/// It is cloned on fork, afterwards parent and child learn which side they are on.
pub trait ForkContext: Clone {
    /// Called once on the child copy (`is_child`) and once on the parent
    fn on_forked(&mut self, is_child: bool) -> Result<(), VmError>;
}

struct Instance<C> {
    table: PageTable,
    context: C,
}

/// Runs several interpreter instances in the same window.
///
/// Only the current instance is mapped. Each instance has its own page table
/// into a shared pool of frames kept in `frame_storage`. Forking shares all
/// frames of the parent with the child, frames that are shared are mapped read
/// only and copied on the first write.
///
/// `C` is the per instance interpreter state (registers and such), see [`ForkContext`].
pub struct ForkingMemory<W: MemoryWindowModule, S: PersistentStorageModule, C: ForkContext> {
    window: W,
    frame_storage: S,
    frames: FrameTable,
    instances: Vec<Option<Instance<C>>>,
    current: Option<usize>,
    page_count: usize,
    stats: PagingStats,
}

impl<W: MemoryWindowModule, C: ForkContext> ForkingMemory<W, FilePersistentStorageModule, C> {
    /// Keeps all frames in `config.frame_file`, the file is removed on drop
    pub fn with_frame_file(window: W, config: &ForkingConfig) -> Result<Self, VmError> {
        let size = config.frame_count() * window.page_size();
        let storage = FilePersistentStorageModule::new(config.frame_file.clone(), size)
            .map_err(|err| {
                warn!(
                    "Could not create frame file {}: {}",
                    config.frame_file.display(),
                    err
                );
                VmError::FrameStorage { frame: 0 }
            })?;

        Ok(Self::new(window, storage, config))
    }
}

impl<W: MemoryWindowModule, S: PersistentStorageModule, C: ForkContext> ForkingMemory<W, S, C> {
    /// `frame_storage` has to hold `config.frame_count()` pages
    pub fn new(window: W, frame_storage: S, config: &ForkingConfig) -> Self {
        assert!(
            config.page_count <= window.page_count(),
            "window has only {} pages, {} requested",
            window.page_count(),
            config.page_count
        );
        assert!(
            frame_storage.get_max_size() >= config.frame_count() * window.page_size(),
            "frame storage is too small for {} frames",
            config.frame_count()
        );

        info!(
            "New forking memory with {} pages per instance, {} instances and {} frames",
            config.page_count,
            config.max_instances,
            config.frame_count()
        );

        Self {
            window,
            frame_storage,
            frames: FrameTable::new(config.frame_count()),
            instances: (0..config.max_instances).map(|_| None).collect(),
            current: None,
            page_count: config.page_count,
            stats: PagingStats::default(),
        }
    }

    fn free_slot(&self) -> Result<usize, VmError> {
        self.instances
            .iter()
            .position(Option::is_none)
            .ok_or(VmError::InstanceTableFull {
                capacity: self.instances.len(),
            })
    }

    fn instance(&self, id: usize) -> Result<&Instance<C>, VmError> {
        self.instances
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(VmError::UnknownInstance(id))
    }

    fn instance_mut(&mut self, id: usize) -> Result<&mut Instance<C>, VmError> {
        self.instances
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(VmError::UnknownInstance(id))
    }

    /// Creates an instance with an empty page table and switches to it
    pub fn create_instance(&mut self, context: C) -> Result<usize, VmError> {
        let id = self.free_slot()?;
        self.instances[id] = Some(Instance {
            table: PageTable::new(self.page_count),
            context,
        });

        debug!("Created instance {}", id);
        self.switch_to(id)?;
        Ok(id)
    }

    /// Makes `id` the instance that is mapped into the window
    pub fn switch_to(&mut self, id: usize) -> Result<(), VmError> {
        self.instance(id)?;

        self.write_back()?;
        self.unmap_all()?;
        self.current = Some(id);

        let assigned: Vec<(usize, usize)> = self.instance(id)?.table.assigned().collect();
        for (page, frame) in assigned {
            self.load_frame(page, frame)?;
        }

        debug!("Switched to instance {}", id);
        Ok(())
    }

    /// Creates a copy of `parent` that shares all of its frames and returns its id.
    ///
    /// The current instance stays the same. The child context is told it is
    /// the child before the parent context is told it is the parent.
    pub fn fork(&mut self, parent: usize) -> Result<usize, VmError> {
        self.instance(parent)?;
        let child = self.free_slot()?;

        let parent_is_current = self.current == Some(parent);
        if parent_is_current {
            // frames have to contain what the parent sees right now
            self.write_back()?;
        }

        let (table, mut context) = {
            let parent = self.instance(parent)?;
            (parent.table.clone(), parent.context.clone())
        };
        context.on_forked(true)?;

        for (_, frame) in table.assigned() {
            self.frames.share(frame);
        }

        if parent_is_current {
            for (page, _) in table.assigned() {
                if self.window.protection(page) == Some(PageProtection::ReadWrite) {
                    self.window
                        .protect_page(page, PageProtection::ReadOnly)
                        .map_err(|_| VmError::ProtectFailed { page })?;
                }
            }
        }

        self.instances[child] = Some(Instance { table, context });
        self.instance_mut(parent)?.context.on_forked(false)?;

        info!("Forked instance {} into {}", parent, child);
        Ok(child)
    }

    /// Removes instance `id`, its frames are released. Returns its context.
    pub fn destroy(&mut self, id: usize) -> Result<C, VmError> {
        let instance = self
            .instances
            .get_mut(id)
            .and_then(Option::take)
            .ok_or(VmError::UnknownInstance(id))?;

        for (_, frame) in instance.table.assigned() {
            self.frames.release(frame);
        }

        if self.current == Some(id) {
            self.unmap_all()?;
            self.current = None;
        }

        debug!("Destroyed instance {}", id);
        Ok(instance.context)
    }

    /// Writes every writable page of the current instance to its frame
    fn write_back(&mut self) -> Result<(), VmError> {
        let current = match self.current {
            Some(current) => current,
            None => return Ok(()),
        };

        let page_size = self.window.page_size();
        let instance = self.instances[current]
            .as_ref()
            .ok_or(VmError::UnknownInstance(current))?;

        for (page, frame) in instance.table.assigned() {
            if self.window.protection(page) != Some(PageProtection::ReadWrite) {
                // read only pages were not changed
                continue;
            }

            let bytes = self
                .window
                .page_bytes(page)
                .ok_or(VmError::FrameStorage { frame })?;
            self.frame_storage
                .write(frame * page_size, bytes)
                .map_err(|_| VmError::FrameStorage { frame })?;
        }

        Ok(())
    }

    fn unmap_all(&mut self) -> Result<(), VmError> {
        for page in 0..self.page_count {
            if self.window.protection(page).is_some() {
                self.window
                    .unmap_page(page)
                    .map_err(|_| VmError::UnmapFailed { page })?;
            }
        }

        Ok(())
    }

    /// Maps `page` with the contents of `frame`, read only if the frame is shared
    fn load_frame(&mut self, page: usize, frame: usize) -> Result<(), VmError> {
        let page_size = self.window.page_size();

        self.window
            .map_page(page, PageProtection::ReadWrite)
            .map_err(|_| VmError::MapFailed { page })?;
        let bytes = self
            .window
            .page_bytes_mut(page)
            .ok_or(VmError::MapFailed { page })?;
        self.frame_storage
            .read(frame * page_size, bytes)
            .map_err(|_| VmError::FrameStorage { frame })?;

        if self.frames.is_shared(frame) {
            self.window
                .protect_page(page, PageProtection::ReadOnly)
                .map_err(|_| VmError::ProtectFailed { page })?;
        }

        trace!("Loaded frame {} into page {}", frame, page);
        Ok(())
    }

    /// Gives the current instance its own copy of the shared `frame` behind `page`
    fn copy_on_write(&mut self, current: usize, page: usize, frame: usize) -> Result<usize, VmError> {
        let new_frame = self.frames.allocate().ok_or(VmError::FramesExhausted {
            capacity: self.frames.capacity(),
        })?;

        // the window already holds the contents of the old frame
        let page_size = self.window.page_size();
        let bytes = self
            .window
            .page_bytes(page)
            .ok_or(VmError::FrameStorage { frame: new_frame })?;
        self.frame_storage
            .write(new_frame * page_size, bytes)
            .map_err(|_| VmError::FrameStorage { frame: new_frame })?;

        self.window
            .protect_page(page, PageProtection::ReadWrite)
            .map_err(|_| VmError::ProtectFailed { page })?;

        self.instance_mut(current)?.table.set(page, new_frame);
        self.frames.release(frame);
        self.stats.copies += 1;

        debug!(
            "Copied shared frame {} to {} for page {} of instance {}",
            frame, new_frame, page, current
        );
        Ok(new_frame)
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn context(&self, id: usize) -> Result<&C, VmError> {
        Ok(&self.instance(id)?.context)
    }

    pub fn context_mut(&mut self, id: usize) -> Result<&mut C, VmError> {
        Ok(&mut self.instance_mut(id)?.context)
    }

    pub fn page_table(&self, id: usize) -> Result<&PageTable, VmError> {
        Ok(&self.instance(id)?.table)
    }

    /// Frames referenced by at least one instance
    pub fn used_frame_count(&self) -> usize {
        self.frames.used_count()
    }

    pub fn share_count(&self, frame: usize) -> usize {
        self.frames.share_count(frame)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn stats(&self) -> &PagingStats {
        &self.stats
    }
}

impl<W: MemoryWindowModule, S: PersistentStorageModule, C: ForkContext> FaultHandler
    for ForkingMemory<W, S, C>
{
    fn on_fault(&mut self, address: usize) -> Result<MappingAction, VmError> {
        let current = self.current.ok_or(VmError::NoCurrentInstance)?;
        let page = self
            .window
            .page_index(address)
            .filter(|page| *page < self.page_count)
            .ok_or(VmError::AddressOutOfWindow(address))?;

        self.stats.faults += 1;
        let entry = self.instance(current)?.table.get(page);

        match (entry, self.window.protection(page)) {
            (None, _) => {
                let frame = self.frames.allocate().ok_or(VmError::FramesExhausted {
                    capacity: self.frames.capacity(),
                })?;
                self.window
                    .map_page(page, PageProtection::ReadWrite)
                    .map_err(|_| VmError::MapFailed { page })?;
                self.instance_mut(current)?.table.set(page, frame);

                trace!("Page {} of instance {} got frame {}", page, current, frame);
                Ok(MappingAction::NewFrame { page, frame })
            }
            (Some(frame), None) => {
                self.load_frame(page, frame)?;
                self.stats.restores += 1;
                Ok(MappingAction::LoadFrame { page, frame })
            }
            (Some(frame), Some(PageProtection::ReadOnly)) => {
                if self.frames.is_shared(frame) {
                    let to = self.copy_on_write(current, page, frame)?;
                    Ok(MappingAction::CopyOnWrite {
                        page,
                        from: frame,
                        to,
                    })
                } else {
                    // all other users of this frame are gone
                    self.window
                        .protect_page(page, PageProtection::ReadWrite)
                        .map_err(|_| VmError::ProtectFailed { page })?;
                    Ok(MappingAction::Unshare { page, frame })
                }
            }
            (Some(_), Some(PageProtection::ReadWrite)) => Err(VmError::UnresolvedFault(address)),
        }
    }
}

impl<W: MemoryWindowModule, S: PersistentStorageModule, C: ForkContext> VirtualMemory
    for ForkingMemory<W, S, C>
{
    type Window = W;

    fn window(&self) -> &W {
        &self.window
    }

    fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }
}
