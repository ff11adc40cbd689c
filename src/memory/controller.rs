//! The memory controller: page-table-backed RAM shared by every core on the
//! bus, plus the atomic primitives (`cas_u16`) guest code uses to coordinate
//! across cores.
//!
//! Unlike the teacher's `FlatMemory`, which floats unmapped reads to all-1s
//! and silently drops unmapped writes, this controller treats an unmapped
//! page as a hard error: a toy VM that is meant to exercise privilege and
//! fault handling should not paper over addressing bugs with bus-float
//! semantics. See `DESIGN.md` for the rationale.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{CoreError, Result};
use crate::memory::page::{Page, PageFlags, PAGE_SIZE_U32};
use crate::primitives::InterruptVector;

struct Inner {
    pages: HashMap<u32, Page>,
    next_free_index: u32,
}

/// Page index at which the general-purpose allocation pool begins (segment
/// 0xF0 upward). Addresses below this are reserved for segments guest code
/// and test harnesses assign explicitly, so `alloc_page`'s sequential
/// counter never collides with a caller-chosen segment.
const GENERAL_POOL_BASE: u32 = 0xF000;

/// Shared, lock-protected physical memory. Cloning a `MemoryController`
/// handle shares the same backing store — every core holds one such handle.
pub struct MemoryController {
    inner: Mutex<Inner>,
}

impl MemoryController {
    pub fn new() -> Self {
        MemoryController {
            inner: Mutex::new(Inner { pages: HashMap::new(), next_free_index: GENERAL_POOL_BASE }),
        }
    }

    fn page_of(addr: u32) -> (u32, usize) {
        (addr / PAGE_SIZE_U32, (addr % PAGE_SIZE_U32) as usize)
    }

    /// Allocate a fresh page from the general pool (segment 0xF0 upward)
    /// with the given flags, returning its global page index.
    pub fn alloc_page(&self, flags: PageFlags) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        let mut index = inner.next_free_index;
        while inner.pages.contains_key(&index) {
            index = index.wrapping_add(1);
        }
        inner.next_free_index = index.wrapping_add(1);
        inner.pages.insert(index, Page::new(index, flags));
        index
    }

    /// Allocate a specific page index (used by boot configuration to place
    /// code/data pages at caller-chosen segments). Fails if already in use.
    pub fn alloc_page_at(&self, page_index: u32, flags: PageFlags) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.pages.contains_key(&page_index) {
            return Err(CoreError::cpu_exception(format!("page {page_index} already allocated")));
        }
        inner.pages.insert(page_index, Page::new(page_index, flags));
        Ok(())
    }

    /// Release a previously allocated page. A no-op if the page does not
    /// exist (double-free is not treated as fatal — the frame/stack
    /// bookkeeping above this layer is what guarantees single ownership).
    pub fn free_page(&self, page_index: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.pages.remove(&page_index);
    }

    /// Allocate a fresh stack page within `segment`'s 256-page range and
    /// return `(page_index, top_of_stack_logical_address)`. Each segment
    /// can host up to 256 independently allocated one-page stacks at once,
    /// which is how nested interrupt entries each get their own page
    /// without colliding within the same `DS`.
    pub fn alloc_stack(&self, segment: u8) -> Result<(u32, u16)> {
        let base = (segment as u32) * 256;
        let mut inner = self.inner.lock().unwrap();
        for offset in 0..256u32 {
            let index = base + offset;
            if !inner.pages.contains_key(&index) {
                inner.pages.insert(index, Page::new(index, PageFlags::rw()));
                let logical_base = offset * PAGE_SIZE_U32;
                let top = (logical_base + PAGE_SIZE_U32 - 2) as u16;
                return Ok((index, top));
            }
        }
        Err(CoreError::cpu_exception(format!("no free stack page in segment {segment}")))
    }

    pub fn get_page(&self, page_index: u32) -> Option<Page> {
        let inner = self.inner.lock().unwrap();
        inner.pages.get(&page_index).cloned()
    }

    /// Snapshot every currently allocated page, for `MachineDump`.
    pub fn dump_pages(&self) -> Vec<crate::coredump::PageDump> {
        let inner = self.inner.lock().unwrap();
        let mut pages: Vec<_> = inner
            .pages
            .values()
            .map(|p| crate::coredump::PageDump::capture(p.index, &p.bytes))
            .collect();
        pages.sort_by_key(|p| p.index);
        pages
    }

    fn check_access(inner: &Inner, addr: u32, privileged: bool, want_write: bool) -> Result<(u32, usize)> {
        let (page_idx, offset) = Self::page_of(addr);
        let page = inner
            .pages
            .get(&page_idx)
            .ok_or_else(|| CoreError::access_violation("access to unmapped page"))?;
        if page.flags.privileged && !privileged {
            return Err(CoreError::access_violation("access to privileged page outside privileged mode"));
        }
        if want_write && !page.flags.write {
            return Err(CoreError::access_violation("write to read-only page"));
        }
        if !want_write && !page.flags.read {
            return Err(CoreError::access_violation("read from non-readable page"));
        }
        Ok((page_idx, offset))
    }

    pub fn read_u8(&self, addr: u32, privileged: bool) -> Result<u8> {
        let inner = self.inner.lock().unwrap();
        let (page_idx, offset) = Self::check_access(&inner, addr, privileged, false)?;
        Ok(inner.pages[&page_idx].bytes[offset])
    }

    pub fn write_u8(&self, addr: u32, value: u8, privileged: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let (page_idx, offset) = Self::check_access(&inner, addr, privileged, true)?;
        let page = inner.pages.get_mut(&page_idx).unwrap();
        page.bytes[offset] = value;
        page.mark_dirty();
        Ok(())
    }

    /// Half-word (16-bit) read. Unaligned and page-crossing accesses read
    /// the two bytes independently — they need not share a page.
    pub fn read_u16(&self, addr: u32, privileged: bool) -> Result<u16> {
        let lo = self.read_u8(addr, privileged)?;
        let hi = self.read_u8(addr.wrapping_add(1), privileged)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    pub fn write_u16(&self, addr: u32, value: u16, privileged: bool) -> Result<()> {
        let [lo, hi] = value.to_le_bytes();
        self.write_u8(addr, lo, privileged)?;
        self.write_u8(addr.wrapping_add(1), hi, privileged)
    }

    /// Word (32-bit) read, used for instruction fetch and paired 32-bit
    /// arithmetic spills.
    pub fn read_u32(&self, addr: u32, privileged: bool) -> Result<u32> {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.read_u8(addr.wrapping_add(i as u32), privileged)?;
        }
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn write_u32(&self, addr: u32, value: u32, privileged: bool) -> Result<()> {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.write_u8(addr.wrapping_add(i as u32), b, privileged)?;
        }
        Ok(())
    }

    /// Atomic compare-and-swap on a 16-bit word: if the current value at
    /// `addr` equals `expected`, replace it with `replacement` and return
    /// `true`; otherwise leave memory untouched and return `false`. Holds
    /// the controller lock across the whole read-compare-write so it is
    /// genuinely atomic with respect to every other core.
    pub fn cas_u16(&self, addr: u32, expected: u16, replacement: u16, privileged: bool) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let (page_idx, offset) = Self::check_access(&inner, addr, privileged, true)?;
        let (page_idx2, offset2) = Self::check_access(&inner, addr.wrapping_add(1), privileged, true)?;
        let page = inner.pages.get(&page_idx).unwrap();
        let lo = page.bytes[offset];
        let hi = inner.pages.get(&page_idx2).unwrap().bytes[offset2];
        let current = u16::from_le_bytes([lo, hi]);
        if current != expected {
            return Ok(false);
        }
        let [nlo, nhi] = replacement.to_le_bytes();
        {
            let page = inner.pages.get_mut(&page_idx).unwrap();
            page.bytes[offset] = nlo;
            page.mark_dirty();
        }
        {
            let page = inner.pages.get_mut(&page_idx2).unwrap();
            page.bytes[offset2] = nhi;
            page.mark_dirty();
        }
        Ok(true)
    }

    /// Load a 4-byte `{CS, DS, IP}` interrupt vector from `table_base +
    /// index * 4`. Vector tables are always privileged reads — a core must
    /// already be privileged to be dispatching through INT/IRQ entry.
    pub fn load_interrupt_vector(&self, table_base: u32, index: u8) -> Result<InterruptVector> {
        let addr = table_base.wrapping_add((index as u32) * 4);
        let bits = self.read_u32(addr, true)?;
        Ok(InterruptVector::from_bits(bits))
    }
}

impl Default for MemoryController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_write_read_roundtrip() {
        let mc = MemoryController::new();
        let page = mc.alloc_page(PageFlags::rw());
        let addr = page * PAGE_SIZE_U32;
        mc.write_u16(addr, 0x1234, false).unwrap();
        assert_eq!(mc.read_u16(addr, false).unwrap(), 0x1234);
    }

    #[test]
    fn privileged_page_rejects_unprivileged_access() {
        let mc = MemoryController::new();
        let page = mc.alloc_page(PageFlags::privileged_rw());
        let addr = page * PAGE_SIZE_U32;
        assert!(mc.write_u8(addr, 1, false).is_err());
        assert!(mc.write_u8(addr, 1, true).is_ok());
    }

    #[test]
    fn unmapped_page_is_an_access_violation() {
        let mc = MemoryController::new();
        assert!(mc.read_u8(0xFFFFFF, true).is_err());
    }

    #[test]
    fn cas_succeeds_once() {
        let mc = MemoryController::new();
        let page = mc.alloc_page(PageFlags::rw());
        let addr = page * PAGE_SIZE_U32;
        mc.write_u16(addr, 0, false).unwrap();
        assert!(mc.cas_u16(addr, 0, 99, false).unwrap());
        assert!(!mc.cas_u16(addr, 0, 100, false).unwrap());
        assert_eq!(mc.read_u16(addr, false).unwrap(), 99);
    }

    #[test]
    fn free_page_then_access_is_violation() {
        let mc = MemoryController::new();
        let page = mc.alloc_page(PageFlags::rw());
        mc.free_page(page);
        assert!(mc.read_u8(page * PAGE_SIZE_U32, true).is_err());
    }
}
