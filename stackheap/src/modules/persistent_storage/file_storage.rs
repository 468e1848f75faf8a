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

use std::{
    fs::{remove_file, File},
    io::{self, Read, Seek, SeekFrom, Write},
    mem::ManuallyDrop,
    path::PathBuf,
};

use log::{trace, warn};

use super::PersistentStorageModule;

/// Fixed size storage in a scratch file.
///
/// Page contents only have to outlive a single run, so the file is deleted on drop.
pub struct FilePersistentStorageModule {
    file: ManuallyDrop<File>,
    file_path: PathBuf,
    size: usize,
}

impl FilePersistentStorageModule {
    /// Creates (or truncates) the file at `file_path` and resizes it to `size` zeroed bytes
    pub fn new(file_path: PathBuf, size: usize) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .truncate(true)
            .create(true)
            .open(&file_path)?;
        file.set_len(size as u64)?;

        trace!("Created {} with {} bytes", file_path.display(), size);
        Ok(Self {
            file: ManuallyDrop::new(file),
            file_path,
            size,
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.file_path
    }

    /// Moves the cursor to `offset` if `len` bytes fit behind it
    fn seek_checked(&mut self, offset: usize, len: usize) -> Result<(), ()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => {}
            _ => {
                warn!(
                    "Access of {} bytes at {} is outside of {} ({} bytes)",
                    len,
                    offset,
                    self.file_path.display(),
                    self.size
                );
                return Err(());
            }
        }

        self.file
            .seek(SeekFrom::Start(offset as u64))
            .map(|_| ())
            .map_err(|_| ())
    }
}

impl PersistentStorageModule for FilePersistentStorageModule {
    fn read(&mut self, offset: usize, dest: &mut [u8]) -> Result<(), ()> {
        self.seek_checked(offset, dest.len())?;
        self.file.read_exact(dest).map_err(|_| ())
    }

    fn get_max_size(&self) -> usize {
        self.size
    }

    fn write(&mut self, offset: usize, src: &[u8]) -> Result<(), ()> {
        self.seek_checked(offset, src.len())?;
        self.file.write_all(src).map_err(|_| ())
    }
}

impl Drop for FilePersistentStorageModule {
    fn drop(&mut self) {
        // closed before removal, `file` is not touched afterwards
        unsafe { ManuallyDrop::drop(&mut self.file) };

        if let Err(err) = remove_file(&self.file_path) {
            trace!("Could not remove {}: {}", self.file_path.display(), err);
        }
    }
}
