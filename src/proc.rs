use core::cell::UnsafeCell;
use core::fmt::{self, Write};
use core::mem::{MaybeUninit, size_of, transmute};
use core::ptr;
use core::sync::atomic::{AtomicBool, Ordering};

use arrayvec::ArrayString;

use crate::clock;
use crate::error::KernelError;
use crate::fixed::Fixed;
use crate::fs;
use crate::hal;
use crate::kalloc::{self, Page, kalloc};
use crate::param::{KSTACKSIZE, MAXPROCNAME, NCPU, NOFILE, NPROC, PGSIZE, ROOTDEV, TICKS_PER_SEC};
use crate::schedule::{SchedInfo, SchedQueue};
use crate::spinlock::{SpinLock, SpinLockGuard};
use crate::sync::OnceLock;
use crate::vm::{self, PageDir};
use crate::{println, try_log};

pub static CPU_TABLE: CpuTable = CpuTable::new();
pub static PROC_TABLE: ProcTable = ProcTable::new();
/// Slot index of the init process, set once by `user_init`.
pub static INIT_PROC: OnceLock<usize> = OnceLock::new();

/// A user program that calls exec("/init").
/// od -t xC initcode
const INITCODE: [u8; 52] = [
    0x17, 0x05, 0, 0, 0x13, 0x05, 0x45, 0x02, 0x97, 0x05, 0, 0, 0x93, 0x85, 0x35, 0x02, 0x93, 0x08,
    0x70, 0, 0x73, 0, 0, 0, 0x93, 0x08, 0x20, 0, 0x73, 0, 0, 0, 0xef, 0xf0, 0x9f, 0xff, 0x2f, 0x69,
    0x6e, 0x69, 0x74, 0, 0, 0x24, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Per-CPU state
pub struct Cpu {
    /// Slot index of the process running on this CPU, if any.
    pub proc: Option<usize>,
    /// swtch() here to enter the scheduler.
    pub context: Context,
    /// Depth of interrupt-disable nesting.
    pub num_off: isize,
    /// Were interrupts enabled before the outermost disable?
    pub interrupts_enabled: bool,
    /// Syscalls dispatched on this CPU.
    pub num_syscalls: usize,
}

impl Cpu {
    const fn new() -> Self {
        Self {
            proc: None,
            context: Context::new(),
            num_off: 0,
            interrupts_enabled: false,
            num_syscalls: 0,
        }
    }

    /// Locks this CPU by disabling interrupts.
    fn lock(&mut self, old_state: bool) -> InterruptLock {
        if self.num_off == 0 {
            self.interrupts_enabled = old_state;
        }
        self.num_off += 1;
        InterruptLock
    }

    /// Unlocks this CPU by enabling interrupts if appropriate.
    pub fn unlock(&mut self) {
        assert!(!hal::hal().intr_get(), "cpu unlock - interruptible");
        assert!(self.num_off >= 1, "cpu unlock");

        self.num_off -= 1;
        if self.num_off == 0 && self.interrupts_enabled {
            hal::hal().intr_on();
        }
    }
}

/// Table of CPUs
pub struct CpuTable([UnsafeCell<Cpu>; NCPU]);

impl CpuTable {
    /// Creates a new CPU table.
    const fn new() -> Self {
        let mut array: [MaybeUninit<UnsafeCell<Cpu>>; NCPU] =
            unsafe { MaybeUninit::uninit().assume_init() };
        let mut i = 0;
        while i < NCPU {
            array[i] = MaybeUninit::new(UnsafeCell::new(Cpu::new()));
            i += 1;
        }
        Self(unsafe {
            transmute::<[MaybeUninit<UnsafeCell<Cpu>>; NCPU], [UnsafeCell<Cpu>; NCPU]>(array)
        })
    }

    /// Returns a reference to a CPU's record without any synchronization.
    ///
    /// # Safety
    /// The read races with the owning CPU; debugging and accounting only.
    pub unsafe fn get(&self, id: usize) -> &Cpu {
        unsafe { &*self.0[id].get() }
    }
}

unsafe impl Sync for CpuTable {}

/// A lock that releases the CPU lock when dropped.
#[derive(Debug)]
pub struct InterruptLock;

impl Drop for InterruptLock {
    fn drop(&mut self) {
        // # Safety: we are still holding the CPU lock
        unsafe { current_cpu().unlock() }
    }
}

/// Returns a mutable reference to the current CPU's [`Cpu`] struct.
///
/// # Safety
/// Must be called with interrupts disabled to prevent a race with the
/// process being moved to a different CPU.
pub unsafe fn current_cpu() -> &'static mut Cpu {
    unsafe {
        assert!(!hal::hal().intr_get(), "current_cpu interrupts enabled");
        let id = hal::hal().cpu_id();
        &mut *CPU_TABLE.0[id].get()
    }
}

/// Locks this CPU by disabling interrupts.
/// Returns an [`InterruptLock`] as the ownership and lifetime of the lock.
pub fn lock_current_cpu() -> InterruptLock {
    let old_state = hal::hal().intr_get();
    hal::hal().intr_off();

    unsafe { current_cpu().lock(old_state) }
}

/// Returns a reference to this CPU's process, if one is running.
pub fn current_proc_opt() -> Option<&'static Proc> {
    let _intr_lock = lock_current_cpu();

    let cpu = unsafe { current_cpu() };
    cpu.proc.map(|idx| PROC_TABLE.get(idx))
}

/// Returns a reference to this CPU's process.
/// Panics if there is no current process.
pub fn current_proc() -> &'static Proc {
    current_proc_opt().expect("no current process")
}

/// Saved registers for kernel context switches: the resume point, a stack,
/// and the callee-saved set. The layout is consumed by the platform's
/// `swtch`.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Context {
    pub pc: usize,
    pub sp: usize,
    pub regs: [usize; 12],
}

impl Context {
    pub const fn new() -> Self {
        Self {
            pc: 0,
            sp: 0,
            regs: [0; 12],
        }
    }

    pub fn zero(&mut self) {
        *self = Self::new();
    }
}

/// Interrupt-enable bit in a trap frame's saved flags.
pub const FL_INTR: usize = 1 << 9;

/// Per-process record of the interrupted user state, written by the
/// platform's trap entry. Lives at the top of the process's kernel stack.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct TrapFrame {
    /// saved user program counter
    pub epc: usize,
    /// saved user stack pointer
    pub sp: usize,
    /// saved status flags
    pub flags: usize,
    /// argument and return registers
    pub a0: usize,
    pub a1: usize,
    pub a2: usize,
    pub a3: usize,
    pub a4: usize,
    pub a5: usize,
    /// syscall number
    pub num: usize,
}

impl TrapFrame {
    pub const fn new() -> Self {
        Self {
            epc: 0,
            sp: 0,
            flags: 0,
            a0: 0,
            a1: 0,
            a2: 0,
            a3: 0,
            a4: 0,
            a5: 0,
            num: 0,
        }
    }
}

/// Process identifier. Strictly positive for live processes and unique
/// across them; slot reuse hands out fresh pids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Pid(usize);

impl From<usize> for Pid {
    fn from(value: usize) -> Self {
        Pid(value)
    }
}

impl core::ops::Deref for Pid {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Channel type for `sleep`/`wakeup`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// A process slot, by index. `wait` sleeps on its own slot; `exit`
    /// wakes the parent's.
    Proc(usize),
    /// System ticks
    Ticks,
}

/// The state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcState {
    #[default]
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

impl ProcState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcState::Unused => "UNUSED",
            ProcState::Embryo => "EMBRYO",
            ProcState::Sleeping => "SLEEPING",
            ProcState::Runnable => "RUNNABLE",
            ProcState::Running => "RUNNING",
            ProcState::Zombie => "ZOMBIE",
        }
    }
}

/// Cross-CPU state of one slot.
///
/// The process-table lock must be held when accessing these.
#[derive(Debug)]
pub struct ProcInner {
    /// Process state
    pub state: ProcState,
    /// Process ID
    pub pid: Pid,
    /// Parent slot index; None only for the init process
    pub parent: Option<usize>,
    /// If Some, sleeping on channel
    pub chan: Option<Channel>,
    /// If true, have been killed
    pub killed: bool,
    /// Creation time in ticks
    pub xticks: usize,
    /// Size of process memory (bytes)
    pub sz: usize,
    /// Scheduling class, age, and best-job-first parameters
    pub sched: SchedInfo,
}

impl ProcInner {
    const fn new() -> Self {
        Self {
            state: ProcState::Unused,
            pid: Pid(0),
            parent: None,
            chan: None,
            killed: false,
            xticks: 0,
            sz: 0,
            sched: SchedInfo::new(),
        }
    }

    fn clear(&mut self) {
        self.pid = Pid(0);
        self.parent = None;
        self.chan = None;
        self.killed = false;
        self.xticks = 0;
        self.sz = 0;
        self.sched = SchedInfo::new();
        self.state = ProcState::Unused;
    }
}

/// Everything the one process-table lock protects: pid issuance and the
/// cross-CPU state of every slot. Scheduling decisions read nothing
/// outside this record.
pub struct TableInner {
    nextpid: usize,
    pub procs: [ProcInner; NPROC],
}

impl TableInner {
    pub const fn new() -> Self {
        Self {
            nextpid: 1,
            procs: [const { ProcInner::new() }; NPROC],
        }
    }

    fn alloc_pid(&mut self) -> Pid {
        let pid = Pid(self.nextpid);
        self.nextpid += 1;
        pid
    }

    /// First slot holding the given pid.
    pub fn find_pid(&self, pid: Pid) -> Option<usize> {
        self.procs.iter().position(|slot| slot.pid == pid)
    }

    /// Wakes up all processes sleeping on chan.
    /// The process-table lock must be held.
    pub fn wakeup1(&mut self, chan: Channel) {
        for slot in self.procs.iter_mut() {
            if slot.state == ProcState::Sleeping && slot.chan == Some(chan) {
                slot.state = ProcState::Runnable;
            }
        }
    }

    /// Counts the slots whose parent is the caller's grandparent, skipping
    /// the caller, its parent, and slots without an identity yet.
    pub fn uncle_count(&self, me: usize) -> usize {
        let Some(parent) = self.procs[me].parent else {
            return 0;
        };
        let Some(grandparent) = self.procs[parent].parent else {
            return 0;
        };

        self.procs
            .iter()
            .enumerate()
            .filter(|(i, slot)| {
                !matches!(slot.state, ProcState::Unused | ProcState::Embryo)
                    && *i != me
                    && *i != parent
                    && slot.parent == Some(grandparent)
            })
            .count()
    }
}

/// Private fields of a process. The owning process reads and writes them
/// without the table lock; other CPUs may only touch them while the slot
/// is Embryo (allocation) or Zombie (reaping).
pub struct ProcData {
    /// Kernel stack page
    pub kstack: Option<ptr::NonNull<Page>>,
    /// Trap frame, carved from the top of the kernel stack.
    /// Valid whenever `kstack` is Some.
    trapframe: *mut TrapFrame,
    /// swtch() here to run process
    pub context: Context,
    /// User page table
    pub pgdir: Option<PageDir>,
    /// Open files
    pub open_files: [Option<fs::File>; NOFILE],
    /// Current directory
    pub cwd: Option<fs::Inode>,
    /// Process name (debugging)
    pub name: ArrayString<MAXPROCNAME>,
}

impl ProcData {
    const fn new() -> Self {
        Self {
            kstack: None,
            trapframe: ptr::null_mut(),
            context: Context::new(),
            pgdir: None,
            open_files: [const { None }; NOFILE],
            cwd: None,
            name: ArrayString::new_const(),
        }
    }

    /// Returns a reference to the trap frame.
    pub fn tf(&self) -> &TrapFrame {
        assert!(!self.trapframe.is_null(), "no trapframe");
        unsafe { &*self.trapframe }
    }

    /// Returns a mutable reference to the trap frame.
    pub fn tf_mut(&mut self) -> &mut TrapFrame {
        assert!(!self.trapframe.is_null(), "no trapframe");
        unsafe { &mut *self.trapframe }
    }
}

/// Process control block
pub struct Proc {
    /// Slot index in `PROC_TABLE`; parent links and sleep channels use it.
    pub id: usize,
    data: UnsafeCell<ProcData>,
}

// # Safety: `data` is only handed out under the rules documented on
// `data_mut`.
unsafe impl Sync for Proc {}

impl Proc {
    const fn new(id: usize) -> Self {
        Self {
            id,
            data: UnsafeCell::new(ProcData::new()),
        }
    }

    pub fn data(&self) -> &ProcData {
        unsafe { &*self.data.get() }
    }

    /// Returns a mutable reference to the process's private data.
    ///
    /// # Safety
    /// The caller must have exclusive access to the `Proc`. This is true if
    /// either
    ///     1. it is the current process (most cases), or
    ///     2. the slot is Embryo (allocation) or Zombie (reaping).
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn data_mut(&self) -> &mut ProcData {
        unsafe { &mut *self.data.get() }
    }

    /// Returns true if this process is the init process.
    pub fn is_init(&self) -> bool {
        INIT_PROC.get().copied() == Some(self.id)
    }
}

/// The process table: a fixed arena of slots and the single lock that
/// serializes every lifecycle transition and scheduling read.
pub struct ProcTable {
    slots: [Proc; NPROC],
    pub(crate) inner: SpinLock<TableInner>,
}

unsafe impl Sync for ProcTable {}

impl ProcTable {
    pub const fn new() -> Self {
        let mut slots: [MaybeUninit<Proc>; NPROC] =
            unsafe { MaybeUninit::uninit().assume_init() };
        let mut i = 0;
        while i < NPROC {
            slots[i] = MaybeUninit::new(Proc::new(i));
            i += 1;
        }

        Self {
            slots: unsafe { transmute::<[MaybeUninit<Proc>; NPROC], [Proc; NPROC]>(slots) },
            inner: SpinLock::new(TableInner::new(), "ptable"),
        }
    }

    /// Returns the process shell at the given slot index.
    pub fn get(&self, idx: usize) -> &Proc {
        &self.slots[idx]
    }

    /// Looks for an Unused slot. If found, issues a pid, marks the slot
    /// Embryo, and initializes the state required to run in the kernel.
    ///
    /// The table lock is dropped before the kernel stack is allocated; no
    /// other CPU touches an Embryo slot without the allocator's
    /// cooperation.
    fn alloc(&self) -> Result<usize, KernelError> {
        let idx = {
            let mut inner = self.inner.lock();

            let Some(idx) = inner
                .procs
                .iter()
                .position(|slot| slot.state == ProcState::Unused)
            else {
                return Err(KernelError::OutOfProc);
            };

            let pid = inner.alloc_pid();
            let slot = &mut inner.procs[idx];
            slot.pid = pid;
            slot.state = ProcState::Embryo;
            idx
        };

        // Allocate the kernel stack.
        let Some(kstack) = kalloc() else {
            let mut inner = self.inner.lock();
            self.free(idx, &mut inner);
            return Err(KernelError::Alloc);
        };

        // # Safety: the slot is Embryo; only we touch it.
        let data = unsafe { self.get(idx).data_mut() };

        // Leave room for the trap frame at the top of the stack.
        let top = unsafe { kstack.as_ptr().cast::<u8>().add(KSTACKSIZE) };
        let trapframe = unsafe { top.sub(size_of::<TrapFrame>()) }.cast::<TrapFrame>();

        data.kstack = Some(kstack);
        data.trapframe = trapframe;

        // Set up a new context to start executing at fork_ret.
        data.context.zero();
        data.context.pc = fork_ret as *const () as usize;
        data.context.sp = trapframe as usize;

        Ok(idx)
    }

    /// Frees a slot and the resources hanging off it. The slot must be
    /// Embryo or Zombie.
    fn free(&self, idx: usize, inner: &mut TableInner) {
        // # Safety: no CPU is running this slot.
        let data = unsafe { self.get(idx).data_mut() };

        if let Some(kstack) = data.kstack.take() {
            data.trapframe = ptr::null_mut();
            unsafe { kalloc::kfree(kstack) };
        }
        if let Some(pgdir) = data.pgdir.take() {
            vm::vm().free_vm(pgdir);
        }
        data.cwd = None;
        data.open_files = [const { None }; NOFILE];
        data.name.clear();
        data.context.zero();

        inner.procs[idx].clear();
    }

    /// Sets up the first user process.
    pub fn user_init(&self) {
        let idx = self.alloc().expect("user_init: out of memory");
        INIT_PROC.initialize(|| Ok::<_, ()>(idx));

        // # Safety: the slot is Embryo; only we touch it.
        let data = unsafe { self.get(idx).data_mut() };

        let mut pgdir = vm::vm().setup_kvm().expect("user_init: out of memory");
        vm::vm().init_uvm(&mut pgdir, &INITCODE);
        data.pgdir = Some(pgdir);

        let tf = data.tf_mut();
        *tf = TrapFrame::new();
        tf.sp = PGSIZE;
        tf.flags = FL_INTR;
        tf.epc = 0; // beginning of initcode

        data.name.push_str("initcode");
        data.cwd = Some(fs::fs().namei("/").expect("user_init: no root"));

        // This assignment to state lets other cores run this process. The
        // acquire forces the writes above to be visible first.
        let mut inner = self.inner.lock();
        inner.procs[idx].sz = PGSIZE;
        inner.procs[idx].state = ProcState::Runnable;
    }

    /// Creates a new process copying `parent`.
    /// Sets up the child to return as if from the fork system call.
    pub fn fork(&self, parent: &Proc) -> Result<Pid, KernelError> {
        let idx = try_log!(self.alloc());
        let child = self.get(idx);

        let pdata = parent.data();
        // # Safety: the child is Embryo; only we touch it.
        let cdata = unsafe { child.data_mut() };

        let psz = { self.inner.lock().procs[parent.id].sz };

        // Copy the parent's address space.
        let parent_pgdir = pdata.pgdir.as_ref().expect("fork: no pgdir");
        match vm::vm().copy_uvm(parent_pgdir, psz) {
            Some(pgdir) => cdata.pgdir = Some(pgdir),
            None => {
                let mut inner = self.inner.lock();
                self.free(idx, &mut inner);
                return Err(KernelError::Alloc);
            }
        }

        // The child resumes exactly where the parent trapped, but fork
        // returns 0 there.
        *cdata.tf_mut() = *pdata.tf();
        cdata.tf_mut().a0 = 0;

        for (fd, file) in pdata.open_files.iter().enumerate() {
            if let Some(file) = file {
                cdata.open_files[fd] = Some(fs::fs().filedup(file));
            }
        }
        cdata.cwd = pdata.cwd.as_ref().map(|cwd| fs::fs().idup(cwd));
        cdata.name = pdata.name;

        let birth = clock::ticks();

        let mut inner = self.inner.lock();
        let slot = &mut inner.procs[idx];
        slot.sz = psz;
        slot.parent = Some(parent.id);
        slot.xticks = birth;
        slot.sched.reset(birth);
        slot.state = ProcState::Runnable;

        Ok(slot.pid)
    }

    /// Exits the current process. Does not return.
    ///
    /// The process remains a zombie until its parent calls `wait`.
    pub fn exit(&self, p: &Proc) -> ! {
        assert!(!p.is_init(), "init exiting");

        // # Safety: we are the current process.
        let data = unsafe { p.data_mut() };

        // Close all open files.
        for file in data.open_files.iter_mut() {
            if let Some(file) = file.take() {
                fs::fs().fileclose(file);
            }
        }

        fs::fs().begin_op();
        if let Some(cwd) = data.cwd.take() {
            fs::fs().iput(cwd);
        }
        fs::fs().end_op();

        let mut inner = self.inner.lock();

        // Parent might be sleeping in wait().
        let parent = inner.procs[p.id].parent.expect("exit: no parent");
        inner.wakeup1(Channel::Proc(parent));

        // Pass abandoned children to init.
        let init = *INIT_PROC.get().expect("exit: no init proc");
        for idx in 0..NPROC {
            if inner.procs[idx].parent == Some(p.id) {
                inner.procs[idx].parent = Some(init);
                if inner.procs[idx].state == ProcState::Zombie {
                    inner.wakeup1(Channel::Proc(init));
                }
            }
        }

        // Jump into the scheduler, never to return.
        inner.procs[p.id].state = ProcState::Zombie;
        let _inner = sched(inner, p);

        panic!("zombie exit");
    }

    /// Waits for a child to exit and returns its pid, or None if the
    /// caller has no children or has been killed.
    pub fn wait(&self, p: &Proc) -> Option<Pid> {
        let mut inner = self.inner.lock();

        loop {
            // Scan through the table looking for exited children.
            let mut have_kids = false;
            let mut zombie = None;

            for idx in 0..NPROC {
                if inner.procs[idx].parent != Some(p.id) {
                    continue;
                }
                have_kids = true;
                if inner.procs[idx].state == ProcState::Zombie {
                    zombie = Some(idx);
                    break;
                }
            }

            if let Some(idx) = zombie {
                let pid = inner.procs[idx].pid;
                self.free(idx, &mut inner);
                return Some(pid);
            }

            // No point waiting if we don't have any children.
            if !have_kids || inner.procs[p.id].killed {
                return None;
            }

            // Wait for a child to exit. (See the wakeup1 call in exit.)
            inner = self.sleep_on(inner, p, Channel::Proc(p.id));
        }
    }

    /// Kills the process with the given pid.
    ///
    /// The victim won't exit until it returns to user space.
    pub fn kill(&self, pid: Pid) -> Result<(), KernelError> {
        let mut inner = self.inner.lock();

        let Some(idx) = inner.find_pid(pid) else {
            return Err(KernelError::NoProcess);
        };

        inner.procs[idx].killed = true;
        // Wake the victim from sleep if necessary, so it reaches user
        // space and observes its pending death.
        if inner.procs[idx].state == ProcState::Sleeping {
            inner.procs[idx].state = ProcState::Runnable;
        }

        Ok(())
    }

    /// Wakes up all processes sleeping on chan.
    pub fn wakeup(&self, chan: Channel) {
        self.inner.lock().wakeup1(chan);
    }

    /// Grows or shrinks the current process's memory by `n` bytes.
    /// Returns the new size.
    pub fn grow(&self, p: &Proc, n: isize) -> Result<usize, KernelError> {
        // # Safety: we are the current process.
        let data = unsafe { p.data_mut() };
        let mut sz = { self.inner.lock().procs[p.id].sz };

        let pgdir = data.pgdir.as_mut().expect("grow: no pgdir");
        if n > 0 {
            sz = vm::vm()
                .alloc_uvm(pgdir, sz, sz + n as usize)
                .ok_or(KernelError::Alloc)?;
        } else if n < 0 {
            let shrink = n.unsigned_abs();
            if shrink > sz {
                return Err(KernelError::InvalidArgument);
            }
            sz = vm::vm()
                .dealloc_uvm(pgdir, sz, sz - shrink)
                .ok_or(KernelError::InvalidArgument)?;
        }

        self.inner.lock().procs[p.id].sz = sz;
        vm::vm().switch_uvm(p);
        Ok(sz)
    }

    /// Atomically goes to sleep on `chan` with the table lock held, and
    /// reacquires it on wakeup. Used by `wait`, whose condition lock *is*
    /// the table lock; everything else goes through the free `sleep`.
    pub(crate) fn sleep_on<'a>(
        &self,
        mut inner: SpinLockGuard<'a, TableInner>,
        p: &Proc,
        chan: Channel,
    ) -> SpinLockGuard<'a, TableInner> {
        // Go to sleep.
        inner.procs[p.id].chan = Some(chan);
        inner.procs[p.id].state = ProcState::Sleeping;

        let mut inner = sched(inner, p);

        inner.procs[p.id].chan = None;
        inner
    }

    /// Pid of a process.
    pub fn pid_of(&self, p: &Proc) -> Pid {
        self.inner.lock().procs[p.id].pid
    }

    /// Memory size of a process.
    pub fn sz_of(&self, p: &Proc) -> usize {
        self.inner.lock().procs[p.id].sz
    }

    /// Whether a process has a pending kill.
    pub fn killed(&self, p: &Proc) -> bool {
        self.inner.lock().procs[p.id].killed
    }

    /// Seconds since a process was created.
    pub fn lifetime(&self, p: &Proc) -> usize {
        let inner = self.inner.lock();
        let now = clock::ticks();
        now.saturating_sub(inner.procs[p.id].xticks) / TICKS_PER_SEC
    }

    /// Uncles of a process; see [`TableInner::uncle_count`].
    pub fn uncle_count(&self, p: &Proc) -> usize {
        self.inner.lock().uncle_count(p.id)
    }

    /// Refreshes `age` to now, then retargets the queue of the process
    /// with the given pid.
    pub fn change_queue(
        &self,
        pid: Pid,
        queue: Option<SchedQueue>,
    ) -> Result<(), KernelError> {
        let mut inner = self.inner.lock();
        let now = clock::ticks();
        if let Some(idx) = inner.find_pid(pid) {
            inner.procs[idx].sched.age = now;
        }
        inner.change_queue(pid, queue)
    }

    /// Sets the four rank ratios on one process.
    pub fn set_bjf(
        &self,
        pid: Pid,
        pr: Fixed,
        ar: Fixed,
        er: Fixed,
        sr: Fixed,
    ) -> Result<(), KernelError> {
        self.inner.lock().set_bjf(pid, pr, ar, er, sr)
    }

    /// Sets the four rank ratios on every slot.
    pub fn set_bjf_all(&self, pr: Fixed, ar: Fixed, er: Fixed, sr: Fixed) {
        self.inner.lock().set_bjf_all(pr, ar, er, sr);
    }

    /// Assigns default queues to slots that have none yet.
    pub fn refresh_queues(&self) {
        self.inner.lock().refresh_queues();
    }

    /// Re-homes starved runnable processes; called once per tick.
    pub fn do_aging(&self, now: usize) {
        self.inner.lock().do_aging(now);
    }

    /// Writes a listing of live slots: identity, state, queue, and the
    /// best-job-first inputs and rank.
    pub fn ps(&self, w: &mut dyn Write) -> fmt::Result {
        writeln!(
            w,
            "name\tpid\tstate\tqueue\tcycle\tarrival\tpriority\tr_pri\tr_arvl\tr_exec\tr_size\trank"
        )?;
        writeln!(
            w,
            "--------------------------------------------------------------------------------"
        )?;

        let inner = self.inner.lock();
        for (idx, slot) in inner.procs.iter().enumerate() {
            if !matches!(
                slot.state,
                ProcState::Sleeping | ProcState::Runnable | ProcState::Running
            ) {
                continue;
            }

            let queue = slot.sched.queue.map(SchedQueue::id).unwrap_or(0);
            let rank = slot.sched.bjf.rank(slot.xticks, slot.sz);
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                self.get(idx).data().name,
                *slot.pid,
                slot.state.as_str(),
                queue,
                slot.sched.bjf.executed_cycle.to_int(),
                slot.xticks,
                slot.sched.bjf.priority,
                slot.sched.bjf.priority_ratio.to_int(),
                slot.sched.bjf.arrival_time_ratio.to_int(),
                slot.sched.bjf.executed_cycle_ratio.to_int(),
                slot.sched.bjf.process_size_ratio.to_int(),
                rank.to_int(),
            )?;
        }

        Ok(())
    }

    /// Prints a process listing to the console. For debugging; runs when
    /// the user types ^P on the console.
    ///
    /// # Safety
    /// Reads the table without the lock, to avoid wedging a stuck machine
    /// further.
    pub unsafe fn dump(&self) {
        println!();

        let inner = unsafe { self.inner.get_mut_unchecked() };
        for (idx, slot) in inner.procs.iter().enumerate() {
            if slot.state == ProcState::Unused {
                continue;
            }
            println!(
                "{} {} {}",
                *slot.pid,
                slot.state.as_str(),
                self.get(idx).data().name
            );
        }
    }
}

/// Sets up the first user process.
pub fn user_init() {
    PROC_TABLE.user_init();
}

/// Creates a new process copying the current one.
/// Returns the child's pid to the parent; the child sees 0 from its trap
/// frame.
pub fn fork() -> Result<Pid, KernelError> {
    PROC_TABLE.fork(current_proc())
}

/// Exits the current process. Does not return.
pub fn exit() -> ! {
    PROC_TABLE.exit(current_proc())
}

/// Waits for a child of the current process to exit.
pub fn wait() -> Option<Pid> {
    PROC_TABLE.wait(current_proc())
}

/// Kills the process with the given pid.
pub fn kill(pid: Pid) -> Result<(), KernelError> {
    PROC_TABLE.kill(pid)
}

/// Grows or shrinks the current process's memory by `n` bytes.
pub fn grow(n: isize) -> Result<usize, KernelError> {
    PROC_TABLE.grow(current_proc(), n)
}

/// Wakes up all processes sleeping on chan.
pub fn wakeup(chan: Channel) {
    PROC_TABLE.wakeup(chan);
}

/// Switches to the CPU's scheduler thread.
///
/// Must hold only the process-table lock (the guard proves it) and have
/// already changed the process's state. Saves and restores
/// `interrupts_enabled` because it is a property of this kernel thread,
/// not this CPU. It should be per-process, but that would break in the few
/// places where a lock is held with no process around.
pub fn sched<'a>(
    inner: SpinLockGuard<'a, TableInner>,
    p: &Proc,
) -> SpinLockGuard<'a, TableInner> {
    let cpu = unsafe { current_cpu() };

    assert_eq!(cpu.num_off, 1, "sched locks");
    assert_ne!(inner.procs[p.id].state, ProcState::Running, "sched running");
    assert!(!hal::hal().intr_get(), "sched interruptible");

    let interrupts_enabled = cpu.interrupts_enabled;

    // # Safety: we are the current process; the scheduler context outlives
    // the switch.
    let context = unsafe { &mut p.data_mut().context };
    unsafe { hal::hal().swtch(context, &cpu.context) };

    // The thread may have been moved to another CPU.
    let cpu = unsafe { current_cpu() };
    cpu.interrupts_enabled = interrupts_enabled;

    inner
}

/// Gives up the CPU for one scheduling round.
pub fn r#yield() {
    let p = current_proc();

    let mut inner = PROC_TABLE.inner.lock();
    inner.procs[p.id].state = ProcState::Runnable;

    let inner = sched(inner, p);
    drop(inner);
}

/// Atomically releases the condition lock and sleeps on chan.
/// Reacquires the condition lock when awakened.
pub fn sleep<'a, T>(chan: Channel, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
    let p = current_proc();

    // Acquire the table lock before releasing the condition lock: the
    // wakeup scan also runs under the table lock, so it cannot slip in
    // between and get lost.
    let inner = PROC_TABLE.inner.lock();
    let lock = SpinLock::unlock(guard);

    let inner = PROC_TABLE.sleep_on(inner, p, chan);
    drop(inner);

    // Reacquire original lock.
    lock.lock()
}

/// A fork child's very first scheduling will swtch here.
pub extern "C" fn fork_ret() {
    // This is atomic since multiple CPUs could schedule their first
    // process simultaneously.
    static FIRST: AtomicBool = AtomicBool::new(true);

    // Still holding the process-table lock from the scheduler.
    unsafe { PROC_TABLE.inner.force_unlock() };

    if FIRST
        .compare_exchange(true, false, Ordering::Acquire, Ordering::Relaxed)
        .is_ok()
    {
        // Filesystem initialization must run in the context of a regular
        // process (it may sleep), so it cannot run from boot.
        fs::fs().init(ROOTDEV);
    }

    // Return to user space, mimicking a trap return.
    hal::hal().trap_return(current_proc());
}

/// Per-CPU process scheduler.
/// Each CPU calls `scheduler` after setting itself up.
/// Scheduler never returns. It loops, doing:
///     - choose a process to run,
///     - swtch to start running that process,
///     - eventually that process transfers control via swtch back.
///
/// # Safety
/// Must be called once per CPU, from the CPU's boot path, with interrupts
/// disabled.
pub unsafe fn scheduler() -> ! {
    // cpu does not change throughout the lifetime of the scheduler.
    let cpu = unsafe { current_cpu() };
    cpu.proc = None;

    loop {
        // Let timer interrupts reach an idle CPU.
        hal::hal().intr_on();

        // Home newly created slots that have no queue yet.
        PROC_TABLE.refresh_queues();

        // Spin until some queue has a runnable process.
        let idx = loop {
            let inner = PROC_TABLE.inner.lock();
            let picked = inner.pick_next();
            drop(inner);
            match picked {
                Some(idx) => break idx,
                None => core::hint::spin_loop(),
            }
        };

        unsafe { run(cpu, idx) };

        // The process just ran; it goes to the back of the round-robin
        // order and its starvation clock restarts.
        let mut inner = PROC_TABLE.inner.lock();
        let now = clock::ticks();
        inner.procs[idx].sched.age = now;
    }
}

/// Runs the chosen process until it comes back through `sched`.
unsafe fn run(cpu: &mut Cpu, idx: usize) {
    let p = PROC_TABLE.get(idx);
    let mut inner = PROC_TABLE.inner.lock();

    // Switch to the chosen process. It is the process's job to release
    // the table lock and then reacquire it before jumping back to us.
    cpu.proc = Some(idx);
    vm::vm().switch_uvm(p);
    inner.procs[idx].state = ProcState::Running;

    unsafe { hal::hal().swtch(&mut cpu.context, &p.data().context) };

    // Process is done running for now. It should have changed its state
    // before coming back. Credit the quantum it consumed.
    inner.procs[idx].sched.bjf.executed_cycle += Fixed::TENTH;

    vm::vm().switch_kvm();
    cpu.proc = None;
    drop(inner);
}
