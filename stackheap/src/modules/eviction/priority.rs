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

use super::EvictionModule;

struct ActivePage {
    page: usize,
    priority: usize,
}

/// Every fault lowers the priority of all active pages by one, the faulting
/// page starts with the highest priority (`capacity`).
///
/// The victim is the page with the lowest priority, the page that became
/// active first wins ties.
/// Without re-touching active pages this evicts in FIFO order.
pub struct PriorityEvictionModule {
    capacity: usize,
    active: Vec<ActivePage>,
}

impl PriorityEvictionModule {
    /// Priority of `page`, `None` if it is not active
    pub fn priority(&self, page: usize) -> Option<usize> {
        self.active
            .iter()
            .find(|item| item.page == page)
            .map(|item| item.priority)
    }
}

impl EvictionModule for PriorityEvictionModule {
    fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "at least one page has to be active");

        Self {
            capacity,
            active: Vec::with_capacity(capacity),
        }
    }

    fn active_count(&self) -> usize {
        self.active.len()
    }

    fn victim(&self, page: usize) -> Option<usize> {
        if self.active.len() < self.capacity || self.priority(page).is_some() {
            return None;
        }

        // priorities as they are after this fault lowered them
        let victim = self
            .active
            .iter()
            .min_by_key(|item| item.priority.saturating_sub(1))?;

        trace!(
            "Page {} with priority {} makes room for page {}",
            victim.page,
            victim.priority,
            page
        );
        Some(victim.page)
    }

    fn remove(&mut self, page: usize) {
        self.active.retain(|item| item.page != page);
    }

    fn on_fault(&mut self, page: usize) {
        for item in self.active.iter_mut() {
            item.priority = item.priority.saturating_sub(1);
        }

        match self.active.iter_mut().find(|item| item.page == page) {
            Some(item) => item.priority = self.capacity,
            None => {
                debug_assert!(
                    self.active.len() < self.capacity,
                    "active set is full, evict the victim first"
                );
                self.active.push(ActivePage {
                    page,
                    priority: self.capacity,
                });
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::EvictionModule;
    use super::PriorityEvictionModule;

    /// Handles a fault the way the pager does, returns the evicted page
    fn touch(module: &mut PriorityEvictionModule, page: usize) -> Option<usize> {
        let victim = module.victim(page);
        if let Some(victim) = victim {
            module.remove(victim);
        }
        module.on_fault(page);
        victim
    }

    #[test]
    fn test_priority_fifo_order() {
        let mut module = PriorityEvictionModule::new(3);

        assert_eq!(touch(&mut module, 0), None);
        assert_eq!(touch(&mut module, 1), None);
        assert_eq!(touch(&mut module, 2), None);
        assert_eq!(module.active_count(), 3);
        assert_eq!(module.priority(0), Some(1));
        assert_eq!(module.priority(2), Some(3));

        assert_eq!(touch(&mut module, 3), Some(0));
        assert_eq!(touch(&mut module, 4), Some(1));
        assert_eq!(touch(&mut module, 0), Some(2));
        assert_eq!(touch(&mut module, 5), Some(3));

        assert_eq!(module.priority(3), None);
        assert_eq!(module.priority(4), Some(1));
        assert_eq!(module.priority(0), Some(2));
        assert_eq!(module.priority(5), Some(3));
        assert_eq!(module.active_count(), 3);
    }

    #[test]
    fn test_priority_refresh_active_page() {
        let mut module = PriorityEvictionModule::new(2);

        touch(&mut module, 7);
        touch(&mut module, 8);
        // 7 becomes the youngest page again
        assert_eq!(module.victim(7), None);
        assert_eq!(touch(&mut module, 7), None);
        assert_eq!(touch(&mut module, 9), Some(8));
    }

    #[test]
    fn test_victim_does_not_change_state() {
        let mut module = PriorityEvictionModule::new(2);

        touch(&mut module, 1);
        touch(&mut module, 2);
        assert_eq!(module.victim(3), Some(1));
        assert_eq!(module.victim(3), Some(1));
        assert_eq!(module.priority(1), Some(1));
        assert_eq!(module.priority(2), Some(2));
        assert_eq!(module.active_count(), 2);
    }

    #[test]
    fn test_priority_remove() {
        let mut module = PriorityEvictionModule::new(2);

        touch(&mut module, 1);
        touch(&mut module, 2);
        module.remove(1);
        assert_eq!(module.active_count(), 1);
        assert_eq!(touch(&mut module, 3), None);
        assert_eq!(touch(&mut module, 4), Some(2));
    }
}
