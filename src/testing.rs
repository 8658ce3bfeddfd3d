//! Host-test doubles for the machine, memory, and filesystem seams.
//!
//! The mock machine exposes a single CPU, so test bodies that take kernel
//! locks go through [`with_kernel`], which serializes them and registers
//! the doubles.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::fs::{self, File, Fs, Inode};
use crate::hal::{self, Hardware};
use crate::proc::{Context, Proc};
use crate::vm::{self, PageDir, Vm};

pub static TEST_HW: TestHardware = TestHardware {
    intr: AtomicBool::new(true),
};

pub static TEST_VM: TestVm = TestVm {
    next: AtomicUsize::new(1),
    copy_fails: AtomicBool::new(false),
    frees: AtomicUsize::new(0),
};

pub static TEST_FS: TestFs = TestFs {
    next: AtomicUsize::new(1),
    filedups: AtomicUsize::new(0),
    idups: AtomicUsize::new(0),
};

/// Runs a test body with the doubles registered.
pub fn with_kernel<F: FnOnce()>(f: F) {
    static GATE: Mutex<()> = Mutex::new(());
    let _gate = GATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    unsafe {
        hal::register(&TEST_HW);
        vm::register(&TEST_VM);
        fs::register(&TEST_FS);
    }

    TEST_VM.fail_copy(false);
    TEST_HW.intr_on();

    f();
}

/// One mock CPU with a software interrupt flag.
pub struct TestHardware {
    intr: AtomicBool,
}

impl Hardware for TestHardware {
    unsafe fn cpu_id(&self) -> usize {
        0
    }

    fn intr_get(&self) -> bool {
        self.intr.load(Ordering::Relaxed)
    }

    fn intr_on(&self) {
        self.intr.store(true, Ordering::Relaxed);
    }

    fn intr_off(&self) {
        self.intr.store(false, Ordering::Relaxed);
    }

    unsafe fn swtch(&self, _old: *mut Context, _new: *const Context) {
        unreachable!("no context switch on the host");
    }

    fn trap_return(&self, _p: &'static Proc) -> ! {
        unreachable!("no trap return on the host");
    }

    fn console_putc(&self, _c: u8) {}
}

/// Hands out page-table tokens and counts what comes back.
pub struct TestVm {
    next: AtomicUsize,
    copy_fails: AtomicBool,
    frees: AtomicUsize,
}

impl TestVm {
    pub fn fail_copy(&self, fail: bool) {
        self.copy_fails.store(fail, Ordering::Relaxed);
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::Relaxed)
    }

    fn fresh(&self) -> PageDir {
        PageDir::from_raw(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Vm for TestVm {
    fn setup_kvm(&self) -> Option<PageDir> {
        Some(self.fresh())
    }

    fn init_uvm(&self, _pgdir: &mut PageDir, _initcode: &[u8]) {}

    fn copy_uvm(&self, _pgdir: &PageDir, _sz: usize) -> Option<PageDir> {
        if self.copy_fails.load(Ordering::Relaxed) {
            None
        } else {
            Some(self.fresh())
        }
    }

    fn alloc_uvm(&self, _pgdir: &mut PageDir, _oldsz: usize, newsz: usize) -> Option<usize> {
        Some(newsz)
    }

    fn dealloc_uvm(&self, _pgdir: &mut PageDir, _oldsz: usize, newsz: usize) -> Option<usize> {
        Some(newsz)
    }

    fn free_vm(&self, _pgdir: PageDir) {
        self.frees.fetch_add(1, Ordering::Relaxed);
    }

    fn switch_uvm(&self, _p: &Proc) {}

    fn switch_kvm(&self) {}
}

/// Hands out inode/file tokens and counts reference traffic.
pub struct TestFs {
    next: AtomicUsize,
    filedups: AtomicUsize,
    idups: AtomicUsize,
}

impl TestFs {
    pub fn filedups(&self) -> usize {
        self.filedups.load(Ordering::Relaxed)
    }

    pub fn idups(&self) -> usize {
        self.idups.load(Ordering::Relaxed)
    }
}

impl Fs for TestFs {
    fn init(&self, _dev: u32) {}

    fn namei(&self, _path: &str) -> Option<Inode> {
        Some(Inode::from_raw(self.next.fetch_add(1, Ordering::Relaxed)))
    }

    fn idup(&self, inode: &Inode) -> Inode {
        self.idups.fetch_add(1, Ordering::Relaxed);
        Inode::from_raw(inode.raw())
    }

    fn iput(&self, _inode: Inode) {}

    fn begin_op(&self) {}

    fn end_op(&self) {}

    fn filedup(&self, file: &File) -> File {
        self.filedups.fetch_add(1, Ordering::Relaxed);
        File::from_raw(file.raw())
    }

    fn fileclose(&self, _file: File) {}
}
