/// maximum number of CPUs
pub const NCPU: usize = 8;
/// maximum number of processes
pub const NPROC: usize = 64;
/// open files per process
pub const NOFILE: usize = 16;
/// device number of file system root disk
pub const ROOTDEV: u32 = 1;
/// bytes per memory page
pub const PGSIZE: usize = 4096;
/// bytes per process kernel stack
pub const KSTACKSIZE: usize = PGSIZE;
/// maximum length of a process name
pub const MAXPROCNAME: usize = 16;
/// ticks a runnable process may starve before aging re-homes it
pub const AGED_OUT: usize = 30;
/// timer interrupts per second
pub const TICKS_PER_SEC: usize = 100;
