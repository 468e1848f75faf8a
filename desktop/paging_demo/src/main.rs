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

use std::error::Error;

use env_logger::{Builder, Env};
use log::info;
use stackheap::{
    fault_trap::{install_fault_trap, uninstall_fault_trap},
    modules::memory_window::{MemoryWindowModule, MmapWindowModule},
    vm::DemandPager,
    PagingConfig,
};

/// Writes a pattern to every page of a demand paged window through raw
/// pointers, reads it back and prints the paging statistics.
fn main() -> Result<(), Box<dyn Error>> {
    Builder::from_env(Env::default())
        .filter_level(log::LevelFilter::Info)
        .format_module_path(false)
        .init();

    let config = PagingConfig::default();
    let window = MmapWindowModule::new(config.page_count)
        .map_err(|_| "could not reserve the paging window")?;

    let base = window.base();
    let page_size = window.page_size();
    let page_count = config.page_count;
    let words_per_page = page_size / std::mem::size_of::<usize>();

    // the trap refers to the pager until it is uninstalled, so it must not move
    let mut pager: Box<DemandPager<MmapWindowModule>> = Box::new(DemandPager::new(window, config));
    unsafe { install_fault_trap(pager.as_mut())? };

    let memory = base as *mut usize;
    for i in 0..page_count * words_per_page {
        unsafe { memory.add(i).write_volatile(i ^ 0x5A5A) };
    }
    info!("Wrote {} pages", page_count);

    let mut mismatches = 0;
    for i in (0..page_count * words_per_page).rev() {
        if unsafe { memory.add(i).read_volatile() } != i ^ 0x5A5A {
            mismatches += 1;
        }
    }

    uninstall_fault_trap()?;

    info!("Read back all pages, {} mismatches", mismatches);
    println!("{}", serde_json::to_string_pretty(pager.stats())?);

    if mismatches != 0 {
        return Err("paged memory lost data".into());
    }
    Ok(())
}
