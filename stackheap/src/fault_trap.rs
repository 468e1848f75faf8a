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

//! Delivers real segmentation faults to a [`FaultHandler`].
//!
//! With a [`MmapWindowModule`](crate::modules::memory_window::MmapWindowModule)
//! the interpreter can access the window through plain pointers. Touching an
//! unmapped or write protected page raises `SIGSEGV`, the trap resolves the
//! fault and the faulting instruction is executed again.
//!
//! The handler runs on an alternate signal stack. It is not async signal safe
//! in general (the fault handler may allocate and log), so only faults on
//! window accesses outside of allocator code are supported.

use core::{
    mem,
    ptr::{addr_of_mut, null_mut},
};
use std::sync::OnceLock;

use libc::{c_int, c_void, siginfo_t, SA_ONSTACK, SA_SIGINFO, SIGSEGV, SIG_DFL};
use log::info;
use try_lock::TryLock;

use crate::{vm::FaultHandler, VmError};

const ALT_STACK_SIZE: usize = 256 * 1024;

static mut ALT_STACK: [u8; ALT_STACK_SIZE] = [0; ALT_STACK_SIZE];

struct TrapTarget(*mut dyn FaultHandler);

// only ever used from the thread that installed the trap
unsafe impl Send for TrapTarget {}

/// The handler that faults are delivered to.
///
/// Locked while a fault is handled, so a fault inside the handler is detected.
static TRAP: OnceLock<TryLock<Option<TrapTarget>>> = OnceLock::new();

fn trap() -> &'static TryLock<Option<TrapTarget>> {
    TRAP.get_or_init(|| TryLock::new(None))
}

/// Writes `msg` to stderr and terminates the process
fn fail(msg: &str) -> ! {
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            msg.as_ptr() as *const c_void,
            msg.len(),
        );
        libc::_exit(2)
    }
}

extern "C" fn handle_segv(_signal: c_int, info: *mut siginfo_t, _context: *mut c_void) {
    let address = unsafe { (*info).si_addr() } as usize;

    let mut guard = match trap().try_lock() {
        Some(guard) => guard,
        None => fail("segmentation fault while resolving a page fault\n"),
    };

    let target = match guard.as_mut() {
        Some(target) => target,
        None => fail("segmentation fault without a fault handler\n"),
    };

    // the handler is valid until the trap is uninstalled
    let handler = unsafe { &mut *target.0 };
    if handler.on_fault(address).is_err() {
        fail("page fault could not be resolved\n");
    }
}

/// Installs a `SIGSEGV` handler that forwards faults to `handler`.
///
/// Installing again replaces the previous handler.
///
/// ### Safety
///
/// `handler` must not be moved or dropped and must not be accessed otherwise
/// until [`uninstall_fault_trap`] was called.
pub unsafe fn install_fault_trap<H: FaultHandler + 'static>(
    handler: &mut H,
) -> Result<(), VmError> {
    {
        let mut guard = trap().try_lock().ok_or(VmError::TrapInstallFailed)?;
        *guard = Some(TrapTarget(handler as *mut H as *mut dyn FaultHandler));
    }

    let stack = libc::stack_t {
        ss_sp: addr_of_mut!(ALT_STACK) as *mut c_void,
        ss_flags: 0,
        ss_size: ALT_STACK_SIZE,
    };
    if libc::sigaltstack(&stack, null_mut()) != 0 {
        return Err(VmError::TrapInstallFailed);
    }

    let mut action: libc::sigaction = mem::zeroed();
    action.sa_sigaction = handle_segv as usize;
    action.sa_flags = SA_SIGINFO | SA_ONSTACK;
    libc::sigemptyset(&mut action.sa_mask);

    if libc::sigaction(SIGSEGV, &action, null_mut()) != 0 {
        return Err(VmError::TrapInstallFailed);
    }

    info!("Installed fault trap");
    Ok(())
}

/// Restores the default `SIGSEGV` behavior and forgets the handler
pub fn uninstall_fault_trap() -> Result<(), VmError> {
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = SIG_DFL;

    if unsafe { libc::sigaction(SIGSEGV, &action, null_mut()) } != 0 {
        return Err(VmError::TrapInstallFailed);
    }

    let mut guard = trap().try_lock().ok_or(VmError::TrapInstallFailed)?;
    *guard = None;

    info!("Uninstalled fault trap");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{install_fault_trap, uninstall_fault_trap};
    use crate::{
        modules::memory_window::{MemoryWindowModule, MmapWindowModule},
        vm::{DemandPager, PageState, VirtualMemory},
        PagingConfig,
    };

    #[test]
    fn test_fault_trap_demand_paging() {
        let window = MmapWindowModule::new(4).unwrap();
        let base = window.base();
        let page_size = window.page_size();

        let config = PagingConfig {
            page_count: 4,
            max_active_pages: 2,
            backing_prefix: "test_fault_trap_demand_paging".to_string(),
            ..Default::default()
        };

        // the trap keeps a pointer to the pager, so it must not move
        let mut pager: Box<DemandPager<MmapWindowModule>> =
            Box::new(DemandPager::new(window, config));
        unsafe { install_fault_trap(pager.as_mut()).unwrap() };

        for page in 0..4 {
            let ptr = (base + page * page_size + 8) as *mut usize;
            unsafe { ptr.write_volatile(page + 100) };
        }

        // only two pages fit, so every read brings back a swapped page
        for page in 0..4 {
            let ptr = (base + page * page_size + 8) as *const usize;
            assert_eq!(unsafe { ptr.read_volatile() }, page + 100);
        }

        uninstall_fault_trap().unwrap();

        assert_eq!(pager.stats().evictions, 6);
        assert_eq!(pager.stats().restores, 4);
        assert_eq!(pager.state(0), Some(PageState::Swapped));
        assert_eq!(pager.state(3), Some(PageState::Active));

        // without the trap the checked accessors still work
        assert_eq!(pager.read_word(base + 8).unwrap(), 100);
    }
}
