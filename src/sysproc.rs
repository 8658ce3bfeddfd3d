use alloc::string::String;

use crate::clock::{self, TICKS};
use crate::error::KernelError;
use crate::fixed::Fixed;
use crate::param::NCPU;
use crate::proc::{self, CPU_TABLE, Channel, PROC_TABLE, Pid};
use crate::schedule::SchedQueue;
use crate::syscall::{SYSCALL_COUNT, SyscallArgs};
use crate::{err, println, try_log};

pub fn sys_fork(_args: &SyscallArgs) -> Result<usize, KernelError> {
    let pid = try_log!(proc::fork());
    Ok(*pid)
}

pub fn sys_exit(_args: &SyscallArgs) -> ! {
    proc::exit();
}

pub fn sys_wait(_args: &SyscallArgs) -> Result<usize, KernelError> {
    match proc::wait() {
        Some(pid) => Ok(*pid),
        None => err!(KernelError::NoChildren),
    }
}

pub fn sys_kill(args: &SyscallArgs) -> Result<usize, KernelError> {
    let pid = Pid::from(args.get_raw(0));
    proc::kill(pid)?;
    Ok(0)
}

pub fn sys_getpid(args: &SyscallArgs) -> Result<usize, KernelError> {
    Ok(*PROC_TABLE.pid_of(args.proc()))
}

pub fn sys_sbrk(args: &SyscallArgs) -> Result<usize, KernelError> {
    let n = args.get_int(0);
    let addr = PROC_TABLE.sz_of(args.proc());
    try_log!(proc::grow(n));
    Ok(addr)
}

pub fn sys_sleep(args: &SyscallArgs) -> Result<usize, KernelError> {
    let duration = args.get_int(0).max(0) as usize;

    let mut ticks = TICKS.lock();
    let ticks0 = *ticks;

    while *ticks - ticks0 < duration {
        if PROC_TABLE.killed(args.proc()) {
            err!(KernelError::Killed);
        }

        ticks = proc::sleep(Channel::Ticks, ticks);
    }

    Ok(0)
}

pub fn sys_uptime(_args: &SyscallArgs) -> Result<usize, KernelError> {
    Ok(clock::ticks())
}

/// Seconds since the calling process was created.
pub fn sys_lifetime(args: &SyscallArgs) -> Result<usize, KernelError> {
    Ok(PROC_TABLE.lifetime(args.proc()))
}

pub fn sys_change_queue(args: &SyscallArgs) -> Result<usize, KernelError> {
    let pid = Pid::from(args.get_raw(0));
    let queue = SchedQueue::from_id(args.get_raw(1))?;

    PROC_TABLE.change_queue(pid, queue)?;
    Ok(0)
}

pub fn sys_set_bjf_for_process(args: &SyscallArgs) -> Result<usize, KernelError> {
    let pid = Pid::from(args.get_raw(0));
    let pr = Fixed::from_int(args.get_int(1) as i64);
    let ar = Fixed::from_int(args.get_int(2) as i64);
    let er = Fixed::from_int(args.get_int(3) as i64);
    let sr = Fixed::from_int(args.get_int(4) as i64);

    PROC_TABLE.set_bjf(pid, pr, ar, er, sr)?;
    Ok(0)
}

pub fn sys_set_bjf_for_all(args: &SyscallArgs) -> Result<usize, KernelError> {
    let pr = Fixed::from_int(args.get_int(0) as i64);
    let ar = Fixed::from_int(args.get_int(1) as i64);
    let er = Fixed::from_int(args.get_int(2) as i64);
    let sr = Fixed::from_int(args.get_int(3) as i64);

    PROC_TABLE.set_bjf_all(pr, ar, er, sr);
    Ok(0)
}

pub fn sys_ps(_args: &SyscallArgs) -> Result<usize, KernelError> {
    let mut out = String::new();
    PROC_TABLE.ps(&mut out).expect("ps format");
    crate::print!("{}", out);
    Ok(0)
}

pub fn sys_get_uncle_count(args: &SyscallArgs) -> Result<usize, KernelError> {
    Ok(PROC_TABLE.uncle_count(args.proc()))
}

/// Prints the syscall accounting: the shared total and each CPU's share.
pub fn sys_print_num_syscalls(_args: &SyscallArgs) -> Result<usize, KernelError> {
    use core::sync::atomic::Ordering;

    println!(
        "total number of syscalls: {}",
        SYSCALL_COUNT.load(Ordering::Relaxed)
    );

    for id in 0..NCPU {
        // # Safety: racy read; the count is best effort.
        let count = unsafe { CPU_TABLE.get(id) }.num_syscalls;
        if count > 0 {
            println!("cpu {} handled {} syscalls", id, count);
        }
    }

    Ok(0)
}
