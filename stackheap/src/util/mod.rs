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

use crate::stack_heap::WORD_SIZE;

#[cfg(feature = "use_libc")]
pub(crate) fn get_page_size() -> usize {
    use libc::{sysconf, _SC_PAGE_SIZE};

    unsafe { sysconf(_SC_PAGE_SIZE) as usize }
}

#[inline]
pub(crate) const fn round_up_to_nearest(num: usize, multiple: usize) -> usize {
    ((num + multiple - 1) / multiple) * multiple
}

/// Reads a native endian word from `bytes[offset..offset + WORD_SIZE]`.
///
/// There is no alignment requirement for `offset`.
#[inline]
pub(crate) fn read_word_at(bytes: &[u8], offset: usize) -> Option<usize> {
    let raw = bytes.get(offset..offset.checked_add(WORD_SIZE)?)?;
    let mut buf = [0u8; WORD_SIZE];
    buf.copy_from_slice(raw);
    Some(usize::from_ne_bytes(buf))
}

/// Counterpart of [`read_word_at`]. Returns `false` if the word does not fit.
#[inline]
pub(crate) fn write_word_at(bytes: &mut [u8], offset: usize, value: usize) -> bool {
    let end = match offset.checked_add(WORD_SIZE) {
        Some(end) => end,
        None => return false,
    };
    match bytes.get_mut(offset..end) {
        Some(dest) => {
            dest.copy_from_slice(&value.to_ne_bytes());
            true
        }
        None => false,
    }
}
