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

mod priority;

pub use priority::PriorityEvictionModule;

/// Decides which page leaves the active set when a new page has to be mapped.
///
/// A fault is handled in three steps: ask for a [`Self::victim`], [`Self::remove`]
/// it once it was evicted and [`Self::on_fault`] the faulting page after it was mapped.
pub trait EvictionModule {
    /// Creates a policy for at most `capacity` active pages
    fn new(capacity: usize) -> Self;

    /// Number of currently active pages
    fn active_count(&self) -> usize;

    /// Page that has to be evicted before `page` can become active, if any
    fn victim(&self, page: usize) -> Option<usize>;

    /// `page` is not mapped anymore
    fn remove(&mut self, page: usize);

    /// `page` was faulted in (or touched again) and counts as active
    fn on_fault(&mut self, page: usize);
}
