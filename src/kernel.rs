use std::{ptr::NonNull, sync::OnceLock};

/// Cached virtual memory page size of the computer. This is usually 4096,
/// but we can't know the value at compile time.
static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. The allocator, our top level view of this, has nothing to do
/// with the concrete APIs offered by each kernel.
trait PlatformMemory {
    /// Request `len` bytes of fresh, zero-initialized, read-write pages.
    ///
    /// With `exact` set the pages must land exactly at `addr`; the request
    /// fails instead of clobbering an existing mapping. Without it `addr` is
    /// only a hint and the kernel is free to place the pages anywhere.
    ///
    /// Returns a pointer to the mapped range, or `None` if the underlying
    /// syscall fails. Pages are never returned to the kernel.
    unsafe fn request_pages(addr: *mut u8, len: usize, exact: bool) -> Option<NonNull<u8>>;

    /// Returns the virtual memory page size of the computer in bytes.
    fn page_size() -> usize;
}

/// The platform-dependant half of the allocator. See [`PlatformMemory`].
struct Kernel;

/// Wrapper to calculate the computer's page size.
#[inline]
pub(crate) fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(Kernel::page_size)
}

/// Wrapper to use [`PlatformMemory::request_pages`].
///
/// **SAFETY**: caller must not request `exact` placement over a range it does
/// not own unless overlap makes the call fail (which `exact` guarantees).
#[inline]
pub(crate) unsafe fn map_pages(addr: *mut u8, len: usize, exact: bool) -> Option<NonNull<u8>> {
    unsafe { Kernel::request_pages(addr, len, exact) }
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformMemory};

    use libc::{mmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    impl PlatformMemory for Kernel {
        unsafe fn request_pages(addr: *mut u8, len: usize, exact: bool) -> Option<NonNull<u8>> {
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            if exact {
                // Fail with EEXIST instead of replacing whatever already
                // lives at `addr`.
                flags |= libc::MAP_FIXED_NOREPLACE;
            }

            unsafe {
                match mmap(addr as *mut c_void, len as size_t, PROT, flags, FD, OFFSET) {
                    libc::MAP_FAILED => None,
                    mapped => Some(NonNull::new_unchecked(mapped).cast::<u8>()),
                }
            }
        }

        fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::{Kernel, PlatformMemory};

    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Kernel {
        unsafe fn request_pages(addr: *mut u8, len: usize, exact: bool) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            // VirtualAlloc with an explicit address fails if the range is
            // occupied, which is exactly the `exact` contract.
            let at = exact.then_some(addr as *const c_void);

            unsafe {
                let mapped = Memory::VirtualAlloc(at, len, flags, protection);

                NonNull::new(mapped.cast())
            }
        }

        fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}
