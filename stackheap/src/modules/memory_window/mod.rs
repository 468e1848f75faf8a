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

#[cfg(feature = "use_libc")]
mod mmap;
mod simulated;

#[cfg(feature = "use_libc")]
pub use mmap::MmapWindowModule;
pub use simulated::SimulatedWindowModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PageProtection {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// An access that could not be served by the current mappings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFault {
    /// first byte that could not be accessed
    pub address: usize,
    pub access: AccessKind,
}

/// A fixed window of `page_count` pages starting at `base`.
///
/// Every page is either unmapped or mapped with some [`PageProtection`].
/// Accessing an unmapped page, or writing a read only page, faults.
pub trait MemoryWindowModule {
    /// Address of the first byte of the window
    fn base(&self) -> usize;

    fn page_size(&self) -> usize;

    fn page_count(&self) -> usize;

    /// Size of the window in bytes
    fn size(&self) -> usize {
        self.page_size() * self.page_count()
    }

    fn contains(&self, address: usize) -> bool {
        address >= self.base() && address - self.base() < self.size()
    }

    /// Index of the page `address` belongs to, `None` if `address` is outside the window
    fn page_index(&self, address: usize) -> Option<usize> {
        if self.contains(address) {
            Some((address - self.base()) / self.page_size())
        } else {
            None
        }
    }

    fn page_address(&self, page: usize) -> usize {
        debug_assert!(page < self.page_count());
        self.base() + page * self.page_size()
    }

    /// Maps `page` with zeroed contents.
    ///
    /// An already mapped page is replaced, its contents are lost.
    fn map_page(&mut self, page: usize, protection: PageProtection) -> Result<(), ()>;

    /// Unmaps `page`, its contents are lost. Unmapping an unmapped page is a no-op.
    fn unmap_page(&mut self, page: usize) -> Result<(), ()>;

    /// Changes the protection of a mapped page
    fn protect_page(&mut self, page: usize, protection: PageProtection) -> Result<(), ()>;

    /// Current protection of `page`, `None` if it is not mapped
    fn protection(&self, page: usize) -> Option<PageProtection>;

    /// Contents of a mapped page
    fn page_bytes(&self, page: usize) -> Option<&[u8]>;

    /// Contents of a page that is mapped read write
    fn page_bytes_mut(&mut self, page: usize) -> Option<&mut [u8]>;

    /// Reads `dest.len()` bytes starting at `address` through the current mappings.
    ///
    /// Stops at the first byte that faults. If this fails, a prefix of `dest` may already be written.
    fn read(&self, address: usize, dest: &mut [u8]) -> Result<(), PageFault> {
        let mut done = 0;
        while done < dest.len() {
            let current = address + done;
            let fault = PageFault {
                address: current,
                access: AccessKind::Read,
            };

            let page = self.page_index(current).ok_or(fault)?;
            let offset = current - self.page_address(page);
            let bytes = self.page_bytes(page).ok_or(fault)?;

            let len = (bytes.len() - offset).min(dest.len() - done);
            dest[done..done + len].copy_from_slice(&bytes[offset..offset + len]);
            done += len;
        }

        Ok(())
    }

    /// Writes `src` to `address` through the current mappings.
    ///
    /// Stops at the first byte that faults. If this fails, a prefix of `src` may already be written.
    fn write(&mut self, address: usize, src: &[u8]) -> Result<(), PageFault> {
        let mut done = 0;
        while done < src.len() {
            let current = address + done;
            let fault = PageFault {
                address: current,
                access: AccessKind::Write,
            };

            let page = self.page_index(current).ok_or(fault)?;
            let offset = current - self.page_address(page);
            let bytes = self.page_bytes_mut(page).ok_or(fault)?;

            let len = (bytes.len() - offset).min(src.len() - done);
            bytes[offset..offset + len].copy_from_slice(&src[done..done + len]);
            done += len;
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::{AccessKind, MemoryWindowModule, PageFault, PageProtection};

    /// mapping, protection and checked access of any window with at least 3 pages
    pub(crate) fn test_memory_window_normal<W: MemoryWindowModule>(mut window: W) {
        let page_size = window.page_size();
        let base = window.base();
        assert!(window.page_count() >= 3);

        assert_eq!(window.page_index(base), Some(0));
        assert_eq!(window.page_index(base + page_size), Some(1));
        assert_eq!(window.page_index(base + window.size()), None);
        assert_eq!(window.page_index(base.wrapping_sub(1)), None);

        // nothing mapped yet
        let mut buffer = [0u8; 4];
        assert_eq!(
            window.read(base, &mut buffer),
            Err(PageFault {
                address: base,
                access: AccessKind::Read
            })
        );

        window.map_page(0, PageProtection::ReadWrite).unwrap();
        window.map_page(1, PageProtection::ReadWrite).unwrap();
        assert!(window.page_bytes(0).unwrap().iter().all(|b| *b == 0));

        // write across the page border
        let data: Vec<u8> = (0..16u8).collect();
        window.write(base + page_size - 8, &data).unwrap();

        let mut read_back = [0u8; 16];
        window.read(base + page_size - 8, &mut read_back).unwrap();
        assert_eq!(&read_back[..], &data[..]);

        // read only pages can be read but not written
        window.protect_page(1, PageProtection::ReadOnly).unwrap();
        assert_eq!(window.protection(1), Some(PageProtection::ReadOnly));
        assert!(window.page_bytes_mut(1).is_none());
        window.read(base + page_size, &mut buffer).unwrap();
        assert_eq!(buffer, [8, 9, 10, 11]);
        assert_eq!(
            window.write(base + page_size - 2, &[1, 2, 3, 4]),
            Err(PageFault {
                address: base + page_size,
                access: AccessKind::Write
            })
        );

        // reaching into an unmapped page faults at its first byte
        assert_eq!(
            window.read(base + 2 * page_size - 2, &mut buffer),
            Err(PageFault {
                address: base + 2 * page_size,
                access: AccessKind::Read
            })
        );

        // unmapping loses the contents
        window.unmap_page(0).unwrap();
        assert_eq!(window.protection(0), None);
        window.map_page(0, PageProtection::ReadWrite).unwrap();
        assert!(window.page_bytes(0).unwrap().iter().all(|b| *b == 0));

        // unmapping twice is fine
        window.unmap_page(2).unwrap();
        window.unmap_page(2).unwrap();
    }
}
