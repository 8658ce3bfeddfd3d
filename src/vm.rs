//! Virtual-memory boundary. Page tables are owned by the platform's memory
//! manager; the core holds opaque [`PageDir`] handles and drives them
//! through the [`Vm`] trait.

use crate::hal::HalSlot;
use crate::proc::Proc;

/// Opaque handle to a per-process page table.
///
/// Not `Clone`: exactly one live handle exists per page table, and
/// [`Vm::free_vm`] consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct PageDir(usize);

impl PageDir {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> usize {
        self.0
    }

    pub fn into_raw(self) -> usize {
        self.0
    }
}

pub trait Vm: Sync {
    /// Creates a page table with only the kernel mappings.
    /// Returns `None` when out of memory.
    fn setup_kvm(&self) -> Option<PageDir>;

    /// Loads `initcode` at user address 0 of a fresh page table.
    fn init_uvm(&self, pgdir: &mut PageDir, initcode: &[u8]);

    /// Deep-copies a user address space of `sz` bytes.
    /// Returns `None` when out of memory.
    fn copy_uvm(&self, pgdir: &PageDir, sz: usize) -> Option<PageDir>;

    /// Grows user memory from `oldsz` to `newsz`, returning the new size,
    /// or `None` when out of memory.
    fn alloc_uvm(&self, pgdir: &mut PageDir, oldsz: usize, newsz: usize) -> Option<usize>;

    /// Shrinks user memory from `oldsz` to `newsz`, returning the new size.
    fn dealloc_uvm(&self, pgdir: &mut PageDir, oldsz: usize, newsz: usize) -> Option<usize>;

    /// Releases a user page table and every page it maps.
    fn free_vm(&self, pgdir: PageDir);

    /// Activates `p`'s page table and kernel stack on this CPU.
    fn switch_uvm(&self, p: &Proc);

    /// Activates the kernel page table on this CPU.
    fn switch_kvm(&self);
}

static VM: HalSlot<dyn Vm> = HalSlot::new();

/// Registers the memory manager.
///
/// # Safety
/// Must be called while only one hart is running.
pub unsafe fn register(vm: &'static dyn Vm) {
    unsafe { VM.register(vm) };
}

/// Returns the registered memory manager.
pub fn vm() -> &'static dyn Vm {
    VM.get().expect("vm not registered")
}
