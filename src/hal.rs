//! Machine boundary. Everything the core needs from the platform — CPU
//! identity, the interrupt flag, the context-switch primitive, the
//! trap-return path, and a console byte sink — enters through the
//! [`Hardware`] trait, registered once at boot.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::proc::{Context, Proc};

/// Write-once registration slot for a boundary trait object.
pub struct HalSlot<T: ?Sized + 'static> {
    ready: AtomicBool,
    value: UnsafeCell<Option<&'static T>>,
}

// # Safety: `value` is written once, before `ready` is released, and is
// read-only afterwards.
unsafe impl<T: ?Sized + Sync> Sync for HalSlot<T> {}

impl<T: ?Sized + 'static> HalSlot<T> {
    pub const fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            value: UnsafeCell::new(None),
        }
    }

    /// Registers the implementation. The first registration wins; later
    /// calls are ignored.
    ///
    /// # Safety
    /// Must be called while only one hart is running (early boot).
    pub unsafe fn register(&self, value: &'static T) {
        if self.ready.load(Ordering::Acquire) {
            return;
        }
        unsafe { *self.value.get() = Some(value) };
        self.ready.store(true, Ordering::Release);
    }

    pub fn get(&self) -> Option<&'static T> {
        if self.ready.load(Ordering::Acquire) {
            unsafe { *self.value.get() }
        } else {
            None
        }
    }
}

/// Machine services consumed by the scheduler core.
pub trait Hardware: Sync {
    /// Index of the executing CPU, in `0..NCPU`.
    ///
    /// # Safety
    /// Must be called with interrupts disabled to prevent a race with the
    /// caller being moved to another CPU.
    unsafe fn cpu_id(&self) -> usize;

    /// Reads the interrupt-enable flag of this CPU.
    fn intr_get(&self) -> bool;

    fn intr_on(&self);

    fn intr_off(&self);

    /// Saves the caller's callee-saved register set into `old` and loads
    /// `new`. Control resumes wherever `new` last saved, or at the entry
    /// point planted in a fresh context.
    ///
    /// # Safety
    /// Both pointers must refer to live [`Context`] records, and the caller
    /// must uphold the scheduling protocol around the switch.
    unsafe fn swtch(&self, old: *mut Context, new: *const Context);

    /// Returns to user space through the platform trap-return path.
    fn trap_return(&self, p: &'static Proc) -> !;

    fn console_putc(&self, c: u8);
}

static HARDWARE: HalSlot<dyn Hardware> = HalSlot::new();

/// Registers the machine implementation.
///
/// # Safety
/// Must be called while only one hart is running, before any lock or
/// console use.
pub unsafe fn register(hw: &'static dyn Hardware) {
    unsafe { HARDWARE.register(hw) };
}

/// Returns the registered machine implementation.
/// Panics if the boot code has not registered one yet.
pub fn hal() -> &'static dyn Hardware {
    HARDWARE.get().expect("hal not registered")
}

pub fn try_hal() -> Option<&'static dyn Hardware> {
    HARDWARE.get()
}
