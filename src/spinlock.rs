use core::cell::UnsafeCell;
use core::hint;
use core::ops::{Deref, DerefMut};
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::proc::{Cpu, InterruptLock, current_cpu, lock_current_cpu};

/// Mutual-exclusion spinlock.
///
/// Acquiring disables interrupts on this CPU through the push/pop nesting
/// discipline, so a lock holder can never be rescheduled while it owns the
/// lock. The holding CPU is recorded so re-acquisition panics instead of
/// deadlocking. Locked while the CPU pointer is not null.
#[derive(Debug)]
pub struct SpinLock<T> {
    name: &'static str,
    cpu: AtomicPtr<Cpu>,
    data: UnsafeCell<T>,
}

// # Safety: UnsafeCell is not Sync but it can only be consumed with a guard
// or an exclusive reference. So SpinLock is safe to sync, if the inner type
// T is Send.
unsafe impl<T> Sync for SpinLock<T> where T: Send {}

pub struct SpinLockGuard<'a, T: 'a> {
    lock: &'a SpinLock<T>,
    _intr_lock: InterruptLock,
}

impl<T> SpinLock<T> {
    pub const fn new(value: T, name: &'static str) -> Self {
        SpinLock {
            name,
            cpu: AtomicPtr::new(ptr::null_mut()),
            data: UnsafeCell::new(value),
        }
    }

    // # Safety: must be called with interrupts disabled.
    unsafe fn holding(&self) -> bool {
        self.cpu.load(Ordering::Relaxed) == unsafe { current_cpu() as *mut Cpu }
    }

    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let _intr_lock = lock_current_cpu();

        unsafe {
            assert!(!self.holding(), "acquire {}", self.name);

            loop {
                if self
                    .cpu
                    .compare_exchange(
                        ptr::null_mut(),
                        current_cpu(),
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    break SpinLockGuard {
                        lock: self,
                        _intr_lock,
                    };
                }

                hint::spin_loop()
            }
        }
    }

    /// Releases the lock and hands back the lock itself, so the caller can
    /// re-acquire it later. This is the first half of the sleep dance.
    pub fn unlock<'a>(guard: SpinLockGuard<'a, T>) -> &'a SpinLock<T> {
        let lock = guard.lock;
        drop(guard);
        lock
    }

    /// Releases the lock without a guard.
    ///
    /// A freshly forked kernel thread starts in `fork_ret` holding the
    /// process-table lock its scheduler acquired; no guard object exists on
    /// its stack, so the lock is released by hand.
    ///
    /// # Safety
    /// The calling CPU must hold the lock, and no guard for this
    /// acquisition may exist.
    pub unsafe fn force_unlock(&self) {
        unsafe {
            assert!(self.holding(), "force unlock {}", self.name);
            self.cpu.store(ptr::null_mut(), Ordering::Release);
            current_cpu().unlock();
        }
    }

    // Since this call mutably borrows self, we can guarantee no one else is
    // holding a reference.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Use this over `get_mut` when you need unsafe mutable access.
    ///
    /// # Safety
    /// The caller must guarantee no concurrent access through the lock.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut_unchecked(&self) -> &mut T {
        unsafe { &mut *self.data.get() }
    }
}

// Dropping the guard releases the lock on the spinlock and also releases
// the interrupt lock.
impl<'a, T: 'a> Drop for SpinLockGuard<'a, T> {
    fn drop(&mut self) {
        // # Safety: the guard holds an interrupt lock, it is safe to call
        // holding.
        unsafe {
            assert!(self.lock.holding(), "release {}", self.lock.name);
        }

        self.lock.cpu.store(ptr::null_mut(), Ordering::Release);
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::with_kernel;

    #[test]
    fn lock_round_trip() {
        with_kernel(|| {
            let lock = SpinLock::new(5usize, "test");
            {
                let mut guard = lock.lock();
                *guard += 1;
            }
            assert_eq!(*lock.lock(), 6);
        });
    }

    #[test]
    fn unlock_returns_lock() {
        with_kernel(|| {
            let lock = SpinLock::new(1usize, "test");
            let guard = lock.lock();
            let lock_again = SpinLock::unlock(guard);
            assert_eq!(*lock_again.lock(), 1);
        });
    }

    #[test]
    fn nested_locks_balance_interrupt_state() {
        with_kernel(|| {
            let a = SpinLock::new((), "a");
            let b = SpinLock::new((), "b");
            assert!(crate::hal::hal().intr_get());
            {
                let _ga = a.lock();
                assert!(!crate::hal::hal().intr_get());
                let _gb = b.lock();
                assert!(!crate::hal::hal().intr_get());
            }
            assert!(crate::hal::hal().intr_get());
        });
    }
}
