use crate::proc::{self, Channel, PROC_TABLE};
use crate::spinlock::SpinLock;

/// Ticks since boot. A holder of the process-table lock may take this lock;
/// the reverse nesting only ever happens through `sleep`'s dance.
pub static TICKS: SpinLock<usize> = SpinLock::new(0, "time");

/// Current tick count.
pub fn ticks() -> usize {
    *TICKS.lock()
}

/// Advances kernel time by one tick. Called by the platform's
/// timer-interrupt path.
///
/// Wakes `sys_sleep` sleepers and lets aging re-home starved processes.
pub fn tick() {
    let now = {
        let mut ticks = TICKS.lock();
        *ticks += 1;
        *ticks
    };

    proc::wakeup(Channel::Ticks);
    PROC_TABLE.do_aging(now);
}
