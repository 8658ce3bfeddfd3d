use core::sync::atomic::{AtomicUsize, Ordering};

use crate::error::KernelError;
use crate::log;
use crate::proc::{Proc, TrapFrame, current_cpu, current_proc, lock_current_cpu};
use crate::sysproc::*;

/// Syscalls dispatched by every CPU together.
pub static SYSCALL_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Wrapper for extracting typed syscall arguments from the trap frame.
pub struct SyscallArgs<'a> {
    trapframe: &'a TrapFrame,
    proc: &'static Proc,
}

impl<'a> SyscallArgs<'a> {
    fn new(trapframe: &'a TrapFrame, proc: &'static Proc) -> Self {
        Self { trapframe, proc }
    }

    pub fn proc(&self) -> &'static Proc {
        self.proc
    }

    /// Returns the argument at the given index as a usize.
    pub fn get_raw(&self, index: usize) -> usize {
        match index {
            0 => self.trapframe.a0,
            1 => self.trapframe.a1,
            2 => self.trapframe.a2,
            3 => self.trapframe.a3,
            4 => self.trapframe.a4,
            5 => self.trapframe.a5,
            _ => panic!("invalid syscall argument index {}", index),
        }
    }

    /// Returns the argument at the given index as an isize.
    pub fn get_int(&self, index: usize) -> isize {
        self.get_raw(index) as isize
    }
}

/// System call numbers. The lab additions start at 22.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Fork = 1,
    Exit = 2,
    Wait = 3,
    Kill = 6,
    Getpid = 11,
    Sbrk = 12,
    Sleep = 13,
    Uptime = 14,
    ChangeQueue = 22,
    SetBjfProcess = 23,
    SetBjfAll = 24,
    Ps = 25,
    UncleCount = 26,
    Lifetime = 27,
    PrintNumSyscalls = 28,
}

impl TryFrom<usize> for Syscall {
    type Error = KernelError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Syscall::Fork),
            2 => Ok(Syscall::Exit),
            3 => Ok(Syscall::Wait),
            6 => Ok(Syscall::Kill),
            11 => Ok(Syscall::Getpid),
            12 => Ok(Syscall::Sbrk),
            13 => Ok(Syscall::Sleep),
            14 => Ok(Syscall::Uptime),
            22 => Ok(Syscall::ChangeQueue),
            23 => Ok(Syscall::SetBjfProcess),
            24 => Ok(Syscall::SetBjfAll),
            25 => Ok(Syscall::Ps),
            26 => Ok(Syscall::UncleCount),
            27 => Ok(Syscall::Lifetime),
            28 => Ok(Syscall::PrintNumSyscalls),
            _ => Err(KernelError::InvalidArgument),
        }
    }
}

/// Handles a system call. Called from the platform's trap entry with the
/// current process's trap frame; the return value lands in `a0`, -1 for
/// any error.
pub fn syscall(trapframe: &mut TrapFrame) {
    let proc = current_proc();

    SYSCALL_COUNT.fetch_add(1, Ordering::Relaxed);
    {
        let _intr_lock = lock_current_cpu();
        // # Safety: interrupts are disabled.
        unsafe { current_cpu() }.num_syscalls += 1;
    }

    let args = SyscallArgs::new(trapframe, proc);

    let result = match Syscall::try_from(trapframe.num) {
        Ok(syscall) => match syscall {
            Syscall::Fork => sys_fork(&args),
            Syscall::Exit => sys_exit(&args),
            Syscall::Wait => sys_wait(&args),
            Syscall::Kill => sys_kill(&args),
            Syscall::Getpid => sys_getpid(&args),
            Syscall::Sbrk => sys_sbrk(&args),
            Syscall::Sleep => sys_sleep(&args),
            Syscall::Uptime => sys_uptime(&args),
            Syscall::ChangeQueue => sys_change_queue(&args),
            Syscall::SetBjfProcess => sys_set_bjf_for_process(&args),
            Syscall::SetBjfAll => sys_set_bjf_for_all(&args),
            Syscall::Ps => sys_ps(&args),
            Syscall::UncleCount => sys_get_uncle_count(&args),
            Syscall::Lifetime => sys_lifetime(&args),
            Syscall::PrintNumSyscalls => sys_print_num_syscalls(&args),
        },
        Err(e) => Err(e),
    };

    trapframe.a0 = match log!(result) {
        Ok(value) => value,
        Err(_) => (-1isize) as usize,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_numbers_round_trip() {
        for syscall in [
            Syscall::Fork,
            Syscall::Exit,
            Syscall::Wait,
            Syscall::Kill,
            Syscall::Getpid,
            Syscall::Sbrk,
            Syscall::Sleep,
            Syscall::Uptime,
            Syscall::ChangeQueue,
            Syscall::SetBjfProcess,
            Syscall::SetBjfAll,
            Syscall::Ps,
            Syscall::UncleCount,
            Syscall::Lifetime,
            Syscall::PrintNumSyscalls,
        ] {
            assert_eq!(Syscall::try_from(syscall as usize), Ok(syscall));
        }

        assert!(Syscall::try_from(0).is_err());
        assert!(Syscall::try_from(4).is_err());
        assert!(Syscall::try_from(99).is_err());
    }

    #[test]
    fn args_index_the_trap_frame() {
        let mut trapframe = TrapFrame::new();
        trapframe.a0 = 10;
        trapframe.a1 = (-3isize) as usize;
        trapframe.a5 = 60;

        let table = &crate::proc::PROC_TABLE;
        let args = SyscallArgs::new(&trapframe, table.get(0));

        assert_eq!(args.get_raw(0), 10);
        assert_eq!(args.get_int(1), -3);
        assert_eq!(args.get_raw(5), 60);
    }
}
