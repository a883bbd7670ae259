//! Bounded arena allocator for JIT code.
//!
//! An [`Arena`] owns a single memory mapped region of a fixed capacity. Allocations are bump
//! allocated from it and never freed individually: once the region is full, the owner decides
//! when to [`Arena::clear`] it, which invalidates every allocation made so far.
use easyerr::Error;
use std::marker::PhantomData;
use std::ptr::NonNull;

#[cfg(target_family = "unix")]
use rustix::mm::{self as mman, MapFlags, MprotectFlags, ProtFlags};
#[cfg(target_family = "windows")]
use windows::Win32::System::{
    Diagnostics::Debug::FlushInstructionCache, Memory, Threading::GetCurrentProcess,
};

/// Smallest region ever mapped.
const REGION_MIN_LEN: usize = 1 << 16;

#[derive(Debug, Error)]
pub enum AllocError {
    #[error("arena exhausted: requested {requested} bytes, {remaining} remaining")]
    Exhausted { requested: usize, remaining: usize },
    #[error("failed to map a region of {len} bytes")]
    Map { len: usize },
    #[error("failed to change the protection of {len} bytes")]
    Protect { len: usize },
}

/// A memory mapped region.
struct Region {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: changing the protection can be done from any thread
unsafe impl Send for Region {}

impl Region {
    fn new(len: usize) -> Result<Self, AllocError> {
        let len = len.max(REGION_MIN_LEN);

        #[cfg(target_family = "unix")]
        let region = unsafe {
            mman::mmap_anonymous(
                std::ptr::null_mut(),
                len,
                ProtFlags::empty(),
                MapFlags::PRIVATE,
            )
        }
        .map_err(|_| AllocError::Map { len })?;

        #[cfg(target_family = "windows")]
        let region = unsafe {
            Memory::VirtualAlloc(
                None,
                len,
                Memory::MEM_RESERVE | Memory::MEM_COMMIT,
                Memory::PAGE_NOACCESS,
            )
        };

        let ptr = NonNull::new(region.cast()).ok_or(AllocError::Map { len })?;
        Ok(Self { ptr, len })
    }

    unsafe fn protect(&self, length: usize, protection: Protection) -> Result<(), AllocError> {
        #[cfg(target_family = "unix")]
        let result = unsafe {
            let flags = match protection {
                Protection::ReadExec => MprotectFlags::READ | MprotectFlags::EXEC,
                Protection::ReadWrite => MprotectFlags::READ | MprotectFlags::WRITE,
            };

            mman::mprotect(self.ptr.as_ptr().cast(), length, flags).is_ok()
        };

        #[cfg(target_family = "windows")]
        let result = unsafe {
            let mut previous = Memory::PAGE_PROTECTION_FLAGS(0);
            let flags = match protection {
                Protection::ReadExec => Memory::PAGE_EXECUTE_READ,
                Protection::ReadWrite => Memory::PAGE_READWRITE,
            };

            Memory::VirtualProtect(self.ptr.as_ptr().cast(), length, flags, &raw mut previous)
                .is_ok()
        };

        if result {
            Ok(())
        } else {
            Err(AllocError::Protect { len: length })
        }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // failing to unmap only leaks address space, there's nothing better to do here
        #[cfg(target_family = "unix")]
        unsafe {
            _ = mman::munmap(self.ptr.as_ptr().cast(), self.len);
        }

        #[cfg(target_family = "windows")]
        unsafe {
            _ = Memory::VirtualFree(self.ptr.as_ptr().cast(), 0, Memory::MEM_RELEASE);
        }
    }
}

/// # Safety considerations
/// The arena this allocation comes from must not be cleared or dropped while the allocation
/// is accessed. This is specially important for multi-threaded contexts.
pub struct Allocation<K>(NonNull<[u8]>, PhantomData<K>);

impl<K> Allocation<K> {
    /// Returns a pointer to the allocation.
    ///
    /// # Safety
    /// In order to access the data behind the pointer, accesses to the underlying arena must
    /// be synchronized, as stated in the type docs.
    #[inline(always)]
    pub unsafe fn as_ptr(&self) -> NonNull<[u8]> {
        self.0
    }

    /// Length of the allocation, in bytes.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

// SAFETY: safe to send to another thread as long as accesses to the allocation are synchronized
// with accesses to the arena, which is the user's responsibility
unsafe impl<K> Send for Allocation<K> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    ReadExec,
    ReadWrite,
}

pub trait AllocKind {
    const PROTECTION: Protection;
}

pub struct Exec;
impl AllocKind for Exec {
    const PROTECTION: Protection = Protection::ReadExec;
}

pub struct ReadWrite;
impl AllocKind for ReadWrite {
    const PROTECTION: Protection = Protection::ReadWrite;
}

/// A fixed capacity bump arena.
pub struct Arena<K> {
    /// The mapped region, created on first use
    region: Option<Region>,
    /// Maximum number of bytes this arena hands out
    capacity: usize,
    /// Offset into the region
    offset: usize,
    /// Phantom
    _phantom: PhantomData<K>,
}

impl<K> Arena<K>
where
    K: AllocKind,
{
    #[inline(always)]
    pub const fn new(capacity: usize) -> Self {
        Self {
            region: None,
            capacity,
            offset: 0,
            _phantom: PhantomData,
        }
    }

    /// Maximum number of bytes this arena can hand out before it has to be cleared.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes currently in use, including alignment padding.
    #[inline(always)]
    pub fn used(&self) -> usize {
        self.offset
    }

    fn region(&mut self) -> Result<&Region, AllocError> {
        let region = match self.region.take() {
            Some(region) => region,
            None => Region::new(self.capacity)?,
        };

        Ok(self.region.insert(region))
    }

    /// Returns where an allocation of `length` bytes would start, without taking the space.
    fn reserve(&self, alignment: usize, length: usize) -> Result<usize, AllocError> {
        assert!(length > 0);

        let alignment = alignment.max(1).next_power_of_two();
        let start = self.offset.next_multiple_of(alignment);
        let remaining = self.capacity.saturating_sub(start);
        if remaining < length {
            return Err(AllocError::Exhausted {
                requested: length,
                remaining,
            });
        }

        Ok(start)
    }

    /// Copies `data` into the arena and returns the allocation holding it.
    ///
    /// The space is only taken if the copy succeeds.
    pub fn allocate(&mut self, alignment: usize, data: &[u8]) -> Result<Allocation<K>, AllocError> {
        let start = self.reserve(alignment, data.len())?;
        let end = start + data.len();
        let region = self.region()?;

        let ptr = unsafe { region.ptr.add(start) };
        unsafe {
            region.protect(end, Protection::ReadWrite)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr(), data.len());
            if K::PROTECTION != Protection::ReadWrite {
                region.protect(end, K::PROTECTION)?;
            }

            #[cfg(target_family = "windows")]
            {
                let process = GetCurrentProcess();
                _ = FlushInstructionCache(process, Some(ptr.as_ptr().cast()), data.len());
            }
        }

        self.offset = end;
        Ok(Allocation(
            NonNull::slice_from_raw_parts(ptr, data.len()),
            PhantomData,
        ))
    }

    /// Releases the region. The next allocation maps a fresh one.
    ///
    /// # Safety
    /// Every allocation previously returned by this arena becomes dangling and must not be
    /// accessed anymore.
    pub unsafe fn clear(&mut self) {
        self.region = None;
        self.offset = 0;
    }
}

#[cfg(test)]
mod test {
    use super::{AllocError, Arena, Exec, ReadWrite};

    #[test]
    fn allocations_are_aligned_and_copied() {
        let mut arena = Arena::<ReadWrite>::new(1 << 16);
        let a = arena.allocate(1, &[1, 2, 3]).unwrap();
        let b = arena.allocate(16, &[4, 5, 6, 7]).unwrap();

        let a = unsafe { a.as_ptr() };
        let b = unsafe { b.as_ptr() };
        assert_eq!(b.cast::<u8>().as_ptr().addr() % 16, 0);
        assert_eq!(unsafe { a.as_ref() }, &[1, 2, 3]);
        assert_eq!(unsafe { b.as_ref() }, &[4, 5, 6, 7]);
        assert_eq!(arena.used(), 20);
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut arena = Arena::<Exec>::new(64);
        arena.allocate(16, &[0xC3; 48]).unwrap();

        let err = arena.allocate(16, &[0xC3; 32]).err().unwrap();
        assert!(matches!(
            err,
            AllocError::Exhausted {
                requested: 32,
                remaining: 16
            }
        ));

        unsafe { arena.clear() };
        assert_eq!(arena.used(), 0);
        arena.allocate(16, &[0xC3; 32]).unwrap();
    }

    #[test]
    fn failed_allocation_takes_no_space() {
        let mut arena = Arena::<Exec>::new(64);
        arena.allocate(1, &[0xC3; 40]).unwrap();
        assert_eq!(arena.used(), 40);

        assert!(arena.allocate(16, &[0xC3; 17]).is_err());
        assert_eq!(arena.used(), 40);

        // the failed request's alignment padding is not kept either
        let small = arena.allocate(1, &[0xC3; 24]).unwrap();
        assert_eq!(arena.used(), 64);
        assert_eq!(unsafe { small.as_ptr() }.len(), 24);
    }
}
