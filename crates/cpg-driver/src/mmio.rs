//! Register access for the CPG window
//!
//! [`RegisterPort`] is the only way the engine touches hardware. Two ports
//! exist: [`MappedRegion`] maps the physical window through `/dev/mem`, and
//! [`crate::SimulatedPort`] keeps an in-memory register file.

// MMIO registers are naturally aligned by hardware, so pointer casts are safe
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_ptr_alignment)]

use crate::error::{CpgError, Result};
use cpg_soc::{BitRef, Field};
use rustix::fs::OFlags;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsFd;
use std::ptr::NonNull;

/// Raw 32-bit access to the CPG register window.
///
/// Offsets are relative to the window base. Implementations only supply
/// [`read32`](Self::read32) and [`write32`](Self::write32); the bit and field
/// helpers are read/modify/write sequences built on top.
pub trait RegisterPort: Send {
    /// Read the register at `offset`.
    fn read32(&self, offset: u32) -> u32;

    /// Write `value` to the register at `offset`.
    fn write32(&mut self, offset: u32, value: u32);

    /// Clear `clear`, then set `set`, in one read/modify/write.
    fn modify32(&mut self, offset: u32, clear: u32, set: u32) {
        let value = self.read32(offset);
        self.write32(offset, (value & !clear) | set);
    }

    /// Read a single bit.
    fn read_bit(&self, bit: BitRef) -> bool {
        self.read32(bit.reg) & bit.mask() != 0
    }

    /// Set or clear a single bit.
    fn write_bit(&mut self, bit: BitRef, value: bool) {
        if value {
            self.modify32(bit.reg, 0, bit.mask());
        } else {
            self.modify32(bit.reg, bit.mask(), 0);
        }
    }

    /// Read a register field.
    fn read_field(&self, field: Field) -> u32 {
        field.extract(self.read32(field.reg))
    }

    /// Replace a register field, leaving the other bits untouched.
    fn write_field(&mut self, field: Field, value: u32) {
        let word = self.read32(field.reg);
        self.write32(field.reg, field.insert(word, value));
    }
}

/// Physical register window mapped from `/dev/mem`
pub struct MappedRegion {
    /// Start of the page-aligned mapping
    map: NonNull<u8>,
    /// Length of the page-aligned mapping
    map_len: usize,
    /// Distance from `map` to the requested base
    delta: usize,
    /// Usable window size
    size: usize,
    base: u64,
    _file: File,
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("base", &format_args!("{:#x}", self.base))
            .field("size", &format_args!("{:#x}", self.size))
            .field("map", &format_args!("{:p}", self.map))
            .finish_non_exhaustive()
    }
}

// SAFETY: Send - MappedRegion owns the mapping exclusively. Moving between threads
// doesn't invalidate it (mmap'd memory is process-wide). No thread-local state.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    /// Map `size` bytes of physical address space starting at `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `/dev/mem` cannot be opened (needs root / `CAP_SYS_RAWIO`)
    /// - `size` is zero
    /// - the mmap call fails
    pub fn open(base: u64, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(CpgError::map_failed("window size is 0"));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlags::SYNC.bits() as i32)
            .open("/dev/mem")
            .map_err(|e| CpgError::map_failed(format!("Cannot open /dev/mem: {e}")))?;

        let page = rustix::param::page_size() as u64;
        let aligned = base & !(page - 1);
        let delta = (base - aligned) as usize;
        let map_len = size + delta;

        tracing::debug!("Mapping CPG window {base:#x}+{size:#x} (page base {aligned:#x})");

        // SAFETY: mmap necessary for MMIO - maps the register window into the process.
        // Invariants: (1) file is an open /dev/mem fd; (2) offset is page aligned;
        // (3) ptr valid for map_len bytes or Err. The mapping is released in Drop.
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                map_len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                aligned,
            )
            .map_err(|e| CpgError::map_failed(format!("mmap {base:#x} failed: {e}")))?
        };

        let map = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| CpgError::map_failed("mmap returned null"))?;

        tracing::info!("Mapped CPG window {base:#x} at {:p}, size={size:#x}", map);

        Ok(Self {
            map,
            map_len,
            delta,
            size,
            base,
            _file: file,
        })
    }

    /// Physical base address.
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Window size in bytes.
    pub const fn size(&self) -> usize {
        self.size
    }

    fn reg_ptr(&self, offset: u32) -> *mut u32 {
        let offset = offset as usize;
        assert!(
            offset % 4 == 0 && offset + 4 <= self.size,
            "Register offset {offset:#x} out of bounds"
        );
        // SAFETY: delta + offset + 4 <= map_len, checked above.
        unsafe { self.map.as_ptr().add(self.delta + offset).cast::<u32>() }
    }
}

impl RegisterPort for MappedRegion {
    /// # Panics
    ///
    /// Panics if `offset` is unaligned or outside the window.
    fn read32(&self, offset: u32) -> u32 {
        // SAFETY: read_volatile necessary for MMIO - hardware can change value.
        // reg_ptr bounds-checks and the pointer is 4-byte aligned.
        unsafe { std::ptr::read_volatile(self.reg_ptr(offset)) }
    }

    /// # Panics
    ///
    /// Panics if `offset` is unaligned or outside the window.
    fn write32(&mut self, offset: u32, value: u32) {
        // SAFETY: write_volatile necessary for MMIO - triggers hardware side effects.
        // reg_ptr bounds-checks and the pointer is 4-byte aligned.
        unsafe { std::ptr::write_volatile(self.reg_ptr(offset), value) }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: map/map_len come from the successful mmap in open(); Drop runs once.
        unsafe {
            // Ignore error in Drop (can't propagate)
            let _ = munmap(self.map.as_ptr().cast(), self.map_len);
        }
        tracing::debug!("Unmapped CPG window {:#x}", self.base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Plain(HashMap<u32, u32>);

    impl RegisterPort for Plain {
        fn read32(&self, offset: u32) -> u32 {
            self.0.get(&offset).copied().unwrap_or(0)
        }
        fn write32(&mut self, offset: u32, value: u32) {
            self.0.insert(offset, value);
        }
    }

    #[test]
    fn bit_helpers_preserve_neighbours() {
        let mut port = Plain::default();
        port.write32(0x10, 0xf0);
        port.write_bit(BitRef::new(0x10, 0), true);
        port.write_bit(BitRef::new(0x10, 4), false);
        assert_eq!(port.read32(0x10), 0xe1);
        assert!(port.read_bit(BitRef::new(0x10, 0)));
    }

    #[test]
    fn field_helpers() {
        let mut port = Plain::default();
        port.write32(0x20, 0xffff_ffff);
        let f = Field::new(0x20, 8, 4);
        port.write_field(f, 0x3);
        assert_eq!(port.read32(0x20), 0xffff_f3ff);
        assert_eq!(port.read_field(f), 0x3);
    }

    #[test]
    fn zero_sized_window_rejected() {
        assert!(matches!(MappedRegion::open(0x1101_0000, 0), Err(CpgError::MapFailed { .. })));
    }
}
