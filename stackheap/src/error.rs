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

use thiserror::Error;

/// Errors raised by the interpreter memory itself.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    #[error("heap exhausted: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("data stack overflow")]
    StackOverflow,

    #[error("data stack underflow")]
    StackUnderflow,

    #[error("access of {len} bytes at {address:#x} is outside of the stack heap")]
    OutOfBounds { address: usize, len: usize },

    #[error("word name is longer than {max} bytes")]
    NameTooLong { max: usize },
}

/// Errors of the virtual memory layer.
///
/// All of them are fatal for the interpreter instance that caused them.
/// [`crate::fault_trap`] terminates the process when the fault handler returns one.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    #[error("address {0:#x} is not within the managed window")]
    AddressOutOfWindow(usize),

    #[error("could not map page {page}")]
    MapFailed { page: usize },

    #[error("could not unmap page {page}")]
    UnmapFailed { page: usize },

    #[error("could not change protection of page {page}")]
    ProtectFailed { page: usize },

    #[error("backing storage failed for page {page}")]
    Storage { page: usize },

    #[error("frame storage failed for frame {frame}")]
    FrameStorage { frame: usize },

    #[error("instance table is full ({capacity} instances)")]
    InstanceTableFull { capacity: usize },

    #[error("all {capacity} frames are in use")]
    FramesExhausted { capacity: usize },

    #[error("instance {0} does not exist")]
    UnknownInstance(usize),

    #[error("no instance is switched in")]
    NoCurrentInstance,

    #[error("fault at {0:#x} persists after it was handled")]
    UnresolvedFault(usize),

    #[error("could not install the fault trap")]
    TrapInstallFailed,

    #[error("fork result could not be handed to the instance: {0}")]
    ForkResult(HeapError),
}
