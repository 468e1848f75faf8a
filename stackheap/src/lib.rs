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

mod error;
mod interpreter_host;
mod stack_heap;
mod stackheap_config;
mod util;

#[cfg(all(feature = "use_libc", target_os = "linux"))]
pub mod fault_trap;
pub mod gc;
pub mod modules;
pub mod vm;

#[cfg(test)]
mod test;

pub use crate::error::{HeapError, VmError};
pub use crate::interpreter_host::InterpreterHost;
pub use crate::stack_heap::{InterpreterMemory, StackHeap, WORD_SIZE};
pub use stackheap_config::{ForkingConfig, PagingConfig, StackHeapConfig};
