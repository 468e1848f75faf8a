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

use super::{MemoryWindowModule, PageProtection};

struct SimulatedPage {
    protection: PageProtection,
    data: Box<[u8]>,
}

/// A window whose pages live on the heap.
///
/// `base` is only a number, nothing is mapped at that address. Faults are
/// reported by the checked [`MemoryWindowModule::read`] and [`MemoryWindowModule::write`].
pub struct SimulatedWindowModule {
    base: usize,
    page_size: usize,
    pages: Vec<Option<SimulatedPage>>,
}

impl SimulatedWindowModule {
    pub fn new(base: usize, page_size: usize, page_count: usize) -> Self {
        assert!(page_size > 0 && page_count > 0, "window must not be empty");
        assert!(
            base.checked_add(page_size * page_count).is_some(),
            "window exceeds address space"
        );

        Self {
            base,
            page_size,
            pages: (0..page_count).map(|_| None).collect(),
        }
    }
}

impl MemoryWindowModule for SimulatedWindowModule {
    fn base(&self) -> usize {
        self.base
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn map_page(&mut self, page: usize, protection: PageProtection) -> Result<(), ()> {
        let slot = self.pages.get_mut(page).ok_or(())?;
        trace!("Map simulated page {} as {:?}", page, protection);

        *slot = Some(SimulatedPage {
            protection,
            data: vec![0u8; self.page_size].into_boxed_slice(),
        });
        Ok(())
    }

    fn unmap_page(&mut self, page: usize) -> Result<(), ()> {
        let slot = self.pages.get_mut(page).ok_or(())?;
        *slot = None;
        Ok(())
    }

    fn protect_page(&mut self, page: usize, protection: PageProtection) -> Result<(), ()> {
        match self.pages.get_mut(page) {
            Some(Some(mapped)) => {
                mapped.protection = protection;
                Ok(())
            }
            _ => Err(()),
        }
    }

    fn protection(&self, page: usize) -> Option<PageProtection> {
        self.pages.get(page)?.as_ref().map(|mapped| mapped.protection)
    }

    fn page_bytes(&self, page: usize) -> Option<&[u8]> {
        self.pages.get(page)?.as_ref().map(|mapped| &mapped.data[..])
    }

    fn page_bytes_mut(&mut self, page: usize) -> Option<&mut [u8]> {
        match self.pages.get_mut(page)? {
            Some(mapped) if mapped.protection == PageProtection::ReadWrite => {
                Some(&mut mapped.data[..])
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::{test::test_memory_window_normal, MemoryWindowModule, PageProtection};
    use super::SimulatedWindowModule;

    #[test]
    fn test_simulated_window_normal() {
        test_memory_window_normal(SimulatedWindowModule::new(0x4000_0000, 256, 4));
    }

    #[test]
    fn test_simulated_window_invalid_page() {
        let mut window = SimulatedWindowModule::new(0x4000_0000, 256, 2);

        assert!(window.map_page(2, PageProtection::ReadWrite).is_err());
        assert!(window.protect_page(0, PageProtection::ReadOnly).is_err());
        assert_eq!(window.protection(5), None);
    }
}
