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

mod file_storage;

pub use file_storage::FilePersistentStorageModule;

/// Byte addressed storage that keeps page contents while they are not mapped.
///
/// Accesses past [`Self::get_max_size`] fail.
pub trait PersistentStorageModule {
    /// Fills `dest` with the bytes at `[offset, offset + dest.len())`.
    ///
    /// `dest` may be partially overwritten if this fails.
    fn read(&mut self, offset: usize, dest: &mut [u8]) -> Result<(), ()>;

    /// Size in bytes
    fn get_max_size(&self) -> usize;

    /// Stores `src` at `[offset, offset + src.len())`
    fn write(&mut self, offset: usize, src: &[u8]) -> Result<(), ()>;
}
