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

use core::{ptr::null_mut, slice};

use libc::{
    c_void, mmap, mprotect, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_FIXED, MAP_NORESERVE,
    MAP_PRIVATE, PROT_NONE, PROT_READ, PROT_WRITE,
};
use log::{error, info, trace};

use super::{MemoryWindowModule, PageProtection};
use crate::util::get_page_size;

#[inline]
fn prot_flags(protection: PageProtection) -> i32 {
    match protection {
        PageProtection::ReadOnly => PROT_READ,
        PageProtection::ReadWrite => PROT_READ | PROT_WRITE,
    }
}

/// A window of real virtual memory.
///
/// The whole window is reserved with `PROT_NONE` on creation, so touching an
/// unmapped page raises `SIGSEGV`. Pages are mapped as fixed anonymous mappings.
pub struct MmapWindowModule {
    base: *mut u8,
    page_size: usize,
    protections: Vec<Option<PageProtection>>,
}

impl MmapWindowModule {
    pub fn new(page_count: usize) -> Result<Self, ()> {
        if page_count == 0 {
            return Err(());
        }

        let page_size = get_page_size();
        let size = page_size * page_count;

        let base = unsafe {
            mmap(
                null_mut(),
                size,
                PROT_NONE,
                MAP_PRIVATE | MAP_ANONYMOUS | MAP_NORESERVE,
                -1,
                0,
            )
        };

        if base == MAP_FAILED {
            error!("Could not reserve window of {} bytes", size);
            return Err(());
        }

        info!(
            "Reserved window at {:p} with {} pages of {} bytes",
            base, page_count, page_size
        );

        Ok(Self {
            base: base as *mut u8,
            page_size,
            protections: vec![None; page_count],
        })
    }

    #[inline]
    fn page_ptr(&self, page: usize) -> *mut u8 {
        unsafe { self.base.add(page * self.page_size) }
    }

    /// Replaces `page` with a new anonymous (and therefore zeroed) mapping
    fn remap(&mut self, page: usize, prot: i32, extra_flags: i32) -> Result<(), ()> {
        if page >= self.protections.len() {
            return Err(());
        }

        let addr = self.page_ptr(page) as *mut c_void;
        let res = unsafe {
            mmap(
                addr,
                self.page_size,
                prot,
                MAP_PRIVATE | MAP_ANONYMOUS | MAP_FIXED | extra_flags,
                -1,
                0,
            )
        };

        if res == MAP_FAILED || res != addr {
            return Err(());
        }

        Ok(())
    }
}

impl MemoryWindowModule for MmapWindowModule {
    fn base(&self) -> usize {
        self.base as usize
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> usize {
        self.protections.len()
    }

    fn map_page(&mut self, page: usize, protection: PageProtection) -> Result<(), ()> {
        self.remap(page, prot_flags(protection), 0)?;
        self.protections[page] = Some(protection);

        trace!("Mapped page {} at {:p} as {:?}", page, self.page_ptr(page), protection);
        Ok(())
    }

    fn unmap_page(&mut self, page: usize) -> Result<(), ()> {
        // keep the range reserved, so nobody else gets it
        self.remap(page, PROT_NONE, MAP_NORESERVE)?;
        self.protections[page] = None;

        trace!("Unmapped page {}", page);
        Ok(())
    }

    fn protect_page(&mut self, page: usize, protection: PageProtection) -> Result<(), ()> {
        if self.protection(page).is_none() {
            return Err(());
        }

        let res = unsafe {
            mprotect(
                self.page_ptr(page) as *mut c_void,
                self.page_size,
                prot_flags(protection),
            )
        };
        if res != 0 {
            return Err(());
        }

        self.protections[page] = Some(protection);
        Ok(())
    }

    fn protection(&self, page: usize) -> Option<PageProtection> {
        *self.protections.get(page)?
    }

    fn page_bytes(&self, page: usize) -> Option<&[u8]> {
        self.protection(page)?;

        // page is mapped and at least readable
        Some(unsafe { slice::from_raw_parts(self.page_ptr(page), self.page_size) })
    }

    fn page_bytes_mut(&mut self, page: usize) -> Option<&mut [u8]> {
        if self.protection(page)? != PageProtection::ReadWrite {
            return None;
        }

        Some(unsafe { slice::from_raw_parts_mut(self.page_ptr(page), self.page_size) })
    }
}

impl Drop for MmapWindowModule {
    fn drop(&mut self) {
        let size = self.size();
        if unsafe { munmap(self.base as *mut c_void, size) } != 0 {
            error!("Could not unmap window at {:p}", self.base);
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::{test::test_memory_window_normal, MemoryWindowModule, PageProtection};
    use super::MmapWindowModule;

    #[test]
    fn test_mmap_window_normal() {
        test_memory_window_normal(MmapWindowModule::new(4).unwrap());
    }

    #[test]
    fn test_mmap_window_raw_access() {
        let mut window = MmapWindowModule::new(2).unwrap();
        window.map_page(1, PageProtection::ReadWrite).unwrap();

        let ptr = window.page_address(1) as *mut u64;
        unsafe {
            ptr.write_volatile(0xDEAD_BEEF);
            assert_eq!(ptr.read_volatile(), 0xDEAD_BEEF);
        }

        assert_eq!(&window.page_bytes(1).unwrap()[..4], &0xDEAD_BEEFu64.to_ne_bytes()[..4]);
    }

    #[test]
    fn test_mmap_window_empty() {
        assert!(MmapWindowModule::new(0).is_err());
    }
}
