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

use crate::{
    modules::{
        memory_window::SimulatedWindowModule,
        persistent_storage::FilePersistentStorageModule,
    },
    vm::{DemandPager, ForkContext, ForkingMemory},
    ForkingConfig, InterpreterHost, PagingConfig, StackHeapConfig, VmError,
};

mod randomized;

/// Base address of simulated windows, far away from the stack heap
const TEST_WINDOW_BASE: usize = 0x7000_0000;
const TEST_PAGE_SIZE: usize = 4096;

/// Routes log output of the code under test through the test harness.
/// Set `RUST_LOG` to see it.
pub(crate) fn init_test_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .is_test(true)
        .try_init();
}

/// Instances that are only told apart by their name
impl ForkContext for String {
    fn on_forked(&mut self, _is_child: bool) -> Result<(), VmError> {
        Ok(())
    }
}

pub(crate) fn get_test_host() -> InterpreterHost {
    init_test_logger();
    InterpreterHost::new(&StackHeapConfig::default())
}

/// Pager with `page_count` pages and backing files named after the test
pub(crate) fn get_test_pager(
    test_name: &str,
    page_count: usize,
    max_active_pages: usize,
) -> DemandPager<SimulatedWindowModule> {
    init_test_logger();
    let window = SimulatedWindowModule::new(TEST_WINDOW_BASE, TEST_PAGE_SIZE, page_count);

    DemandPager::new(
        window,
        PagingConfig {
            page_count,
            max_active_pages,
            backing_prefix: test_name.to_string(),
            ..Default::default()
        },
    )
}

/// Forking memory whose instances carry a name as context
pub(crate) fn get_test_forking_memory(
    test_name: &str,
    page_count: usize,
    max_instances: usize,
) -> ForkingMemory<SimulatedWindowModule, FilePersistentStorageModule, String> {
    get_test_forking_memory_with(test_name, page_count, max_instances)
}

pub(crate) fn get_test_forking_memory_with<C: ForkContext>(
    test_name: &str,
    page_count: usize,
    max_instances: usize,
) -> ForkingMemory<SimulatedWindowModule, FilePersistentStorageModule, C> {
    init_test_logger();
    let config = ForkingConfig {
        page_count,
        max_instances,
        frame_file: format!("/tmp/{}.tmp", test_name).into(),
    };

    let window = SimulatedWindowModule::new(TEST_WINDOW_BASE, TEST_PAGE_SIZE, page_count);
    ForkingMemory::with_frame_file(window, &config).unwrap()
}

/// Address of byte `offset` in page `page` of a test window
pub(crate) fn window_address(page: usize, offset: usize) -> usize {
    TEST_WINDOW_BASE + page * TEST_PAGE_SIZE + offset
}
