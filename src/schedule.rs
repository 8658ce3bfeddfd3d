//! Scheduling classes. A queue is a label on a slot, not a data structure:
//! the pickers select by linear scan over the table, filtered by label,
//! so everything here operates on [`TableInner`] under the table lock.

use crate::error::KernelError;
use crate::fixed::Fixed;
use crate::param::AGED_OUT;
use crate::proc::{Pid, ProcState, TableInner};

/// Scheduling class of a slot. The discriminants are the syscall ABI;
/// 0 stands for "not homed yet" and is spelled `None` in the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SchedQueue {
    RoundRobin = 1,
    Lcfs = 2,
    Bjf = 3,
}

impl SchedQueue {
    /// Decodes a queue id from the syscall surface.
    pub fn from_id(id: usize) -> Result<Option<SchedQueue>, KernelError> {
        match id {
            0 => Ok(None),
            1 => Ok(Some(SchedQueue::RoundRobin)),
            2 => Ok(Some(SchedQueue::Lcfs)),
            3 => Ok(Some(SchedQueue::Bjf)),
            _ => Err(KernelError::InvalidArgument),
        }
    }

    pub fn id(self) -> usize {
        self as usize
    }

    /// The other side of the aging toggle. Best-job-first does not
    /// participate in aging.
    fn toggled(self) -> SchedQueue {
        match self {
            SchedQueue::Lcfs => SchedQueue::RoundRobin,
            SchedQueue::RoundRobin => SchedQueue::Lcfs,
            SchedQueue::Bjf => SchedQueue::Bjf,
        }
    }
}

/// Default priority for a fresh process.
const DEFAULT_PRIORITY: i64 = 3;

/// Best-job-first inputs of one slot: a priority, the accumulated quanta,
/// and the four rank weights.
#[derive(Debug, Clone, Copy)]
pub struct BjfParams {
    pub priority: i64,
    pub executed_cycle: Fixed,
    pub priority_ratio: Fixed,
    pub arrival_time_ratio: Fixed,
    pub executed_cycle_ratio: Fixed,
    pub process_size_ratio: Fixed,
}

impl BjfParams {
    pub const fn new() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            executed_cycle: Fixed::ZERO,
            priority_ratio: Fixed::ONE,
            arrival_time_ratio: Fixed::ONE,
            executed_cycle_ratio: Fixed::ONE,
            process_size_ratio: Fixed::ONE,
        }
    }

    /// Weighted rank; lower is better.
    pub fn rank(&self, xticks: usize, sz: usize) -> Fixed {
        self.priority_ratio.mul_int(self.priority)
            + self.arrival_time_ratio.mul_int(xticks as i64)
            + self.executed_cycle_ratio.mul(self.executed_cycle)
            + self.process_size_ratio.mul_int(sz as i64)
    }
}

impl Default for BjfParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduling state of one slot.
#[derive(Debug, Clone, Copy)]
pub struct SchedInfo {
    /// Scheduling class; fresh slots have none until the scheduler homes
    /// them.
    pub queue: Option<SchedQueue>,
    /// Tick of the last dispatch or re-homing. Least-recent wins for
    /// round-robin, most-recent for LCFS, and the distance from now is
    /// the starvation measure for aging.
    pub age: usize,
    pub bjf: BjfParams,
}

impl SchedInfo {
    pub const fn new() -> Self {
        Self {
            queue: None,
            age: 0,
            bjf: BjfParams::new(),
        }
    }

    /// Fresh scheduling state for a process born at `birth` ticks.
    pub fn reset(&mut self, birth: usize) {
        *self = Self::new();
        self.age = birth;
    }
}

/// Default class for a pid that has not been homed: the first two
/// processes go round-robin, everyone else starts last-come-first-served.
fn default_queue(pid: Pid) -> Result<SchedQueue, KernelError> {
    match *pid {
        0 => Err(KernelError::InvalidArgument),
        1 | 2 => Ok(SchedQueue::RoundRobin),
        _ => Ok(SchedQueue::Lcfs),
    }
}

impl TableInner {
    /// Retargets the queue of the process with the given pid. `None` asks
    /// for the default assignment.
    pub fn change_queue(
        &mut self,
        pid: Pid,
        queue: Option<SchedQueue>,
    ) -> Result<(), KernelError> {
        let queue = match queue {
            Some(queue) => queue,
            None => default_queue(pid)?,
        };

        let Some(idx) = self.find_pid(pid) else {
            return Err(KernelError::NoProcess);
        };
        self.procs[idx].sched.queue = Some(queue);
        Ok(())
    }

    /// Homes every initialized slot that has no queue yet.
    pub fn refresh_queues(&mut self) {
        for slot in self.procs.iter_mut() {
            if slot.sched.queue.is_some()
                || matches!(slot.state, ProcState::Unused | ProcState::Embryo)
            {
                continue;
            }
            if let Ok(queue) = default_queue(slot.pid) {
                slot.sched.queue = Some(queue);
            }
        }
    }

    /// Round-robin pick: the least recently served runnable slot.
    pub fn pick_rr(&self) -> Option<usize> {
        let mut res = None;
        for (idx, slot) in self.procs.iter().enumerate() {
            if slot.state != ProcState::Runnable
                || slot.sched.queue != Some(SchedQueue::RoundRobin)
            {
                continue;
            }
            match res {
                Some((_, age)) if slot.sched.age >= age => {}
                _ => res = Some((idx, slot.sched.age)),
            }
        }
        res.map(|(idx, _)| idx)
    }

    /// LCFS pick: the most recently arrived runnable slot.
    pub fn pick_lcfs(&self) -> Option<usize> {
        let mut res = None;
        for (idx, slot) in self.procs.iter().enumerate() {
            if slot.state != ProcState::Runnable || slot.sched.queue != Some(SchedQueue::Lcfs) {
                continue;
            }
            match res {
                Some((_, age)) if slot.sched.age <= age => {}
                _ => res = Some((idx, slot.sched.age)),
            }
        }
        res.map(|(idx, _)| idx)
    }

    /// Best-job-first pick: the runnable slot with the lowest rank; ties
    /// keep the first match in table order.
    pub fn pick_bjf(&self) -> Option<usize> {
        let mut res: Option<(usize, Fixed)> = None;
        for (idx, slot) in self.procs.iter().enumerate() {
            if slot.state != ProcState::Runnable || slot.sched.queue != Some(SchedQueue::Bjf) {
                continue;
            }
            let rank = slot.sched.bjf.rank(slot.xticks, slot.sz);
            match res {
                Some((_, best)) if rank >= best => {}
                _ => res = Some((idx, rank)),
            }
        }
        res.map(|(idx, _)| idx)
    }

    /// Selection order: round-robin starves LCFS, LCFS starves
    /// best-job-first. Aging is the counterweight.
    pub fn pick_next(&self) -> Option<usize> {
        self.pick_rr()
            .or_else(|| self.pick_lcfs())
            .or_else(|| self.pick_bjf())
    }

    /// Re-homes runnable processes that have starved longer than
    /// `AGED_OUT` ticks: a starved LCFS job is promoted to round-robin.
    /// Round-robin itself never matches the starvation filter, and
    /// best-job-first jobs are never moved.
    pub fn do_aging(&mut self, now: usize) {
        for slot in self.procs.iter_mut() {
            if slot.state != ProcState::Runnable {
                continue;
            }
            let Some(queue) = slot.sched.queue else {
                continue;
            };
            if queue == SchedQueue::RoundRobin || queue == SchedQueue::Bjf {
                continue;
            }
            if now.saturating_sub(slot.sched.age) > AGED_OUT {
                slot.sched.queue = Some(queue.toggled());
                slot.sched.age = now;
            }
        }
    }

    /// Sets the four rank ratios on one slot.
    pub fn set_bjf(
        &mut self,
        pid: Pid,
        pr: Fixed,
        ar: Fixed,
        er: Fixed,
        sr: Fixed,
    ) -> Result<(), KernelError> {
        let Some(idx) = self.find_pid(pid) else {
            return Err(KernelError::NoProcess);
        };

        let bjf = &mut self.procs[idx].sched.bjf;
        bjf.priority_ratio = pr;
        bjf.arrival_time_ratio = ar;
        bjf.executed_cycle_ratio = er;
        bjf.process_size_ratio = sr;
        Ok(())
    }

    /// Sets the four rank ratios on every slot.
    pub fn set_bjf_all(&mut self, pr: Fixed, ar: Fixed, er: Fixed, sr: Fixed) {
        for slot in self.procs.iter_mut() {
            let bjf = &mut slot.sched.bjf;
            bjf.priority_ratio = pr;
            bjf.arrival_time_ratio = ar;
            bjf.executed_cycle_ratio = er;
            bjf.process_size_ratio = sr;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::NPROC;

    /// Seeds a runnable slot.
    fn runnable(inner: &mut TableInner, idx: usize, pid: usize, queue: Option<SchedQueue>) {
        inner.procs[idx].state = ProcState::Runnable;
        inner.procs[idx].pid = Pid::from(pid);
        inner.procs[idx].sched.queue = queue;
    }

    #[test]
    fn default_queue_splits_on_pid() {
        assert_eq!(default_queue(Pid::from(1)), Ok(SchedQueue::RoundRobin));
        assert_eq!(default_queue(Pid::from(2)), Ok(SchedQueue::RoundRobin));
        assert_eq!(default_queue(Pid::from(3)), Ok(SchedQueue::Lcfs));
        assert_eq!(default_queue(Pid::from(0)), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn queue_ids_round_trip() {
        assert_eq!(SchedQueue::from_id(0), Ok(None));
        assert_eq!(SchedQueue::from_id(1), Ok(Some(SchedQueue::RoundRobin)));
        assert_eq!(SchedQueue::from_id(2), Ok(Some(SchedQueue::Lcfs)));
        assert_eq!(SchedQueue::from_id(3), Ok(Some(SchedQueue::Bjf)));
        assert_eq!(SchedQueue::from_id(4), Err(KernelError::InvalidArgument));
        assert_eq!(SchedQueue::RoundRobin.id(), 1);
    }

    #[test]
    fn refresh_homes_only_initialized_slots() {
        let mut inner = TableInner::new();
        runnable(&mut inner, 0, 1, None);
        runnable(&mut inner, 1, 2, None);
        runnable(&mut inner, 2, 3, None);
        inner.procs[3].state = ProcState::Embryo;
        inner.procs[3].pid = Pid::from(4);

        inner.refresh_queues();

        assert_eq!(inner.procs[0].sched.queue, Some(SchedQueue::RoundRobin));
        assert_eq!(inner.procs[1].sched.queue, Some(SchedQueue::RoundRobin));
        assert_eq!(inner.procs[2].sched.queue, Some(SchedQueue::Lcfs));
        assert_eq!(inner.procs[3].sched.queue, None);
    }

    #[test]
    fn rr_picks_least_recently_served() {
        let mut inner = TableInner::new();
        runnable(&mut inner, 0, 1, Some(SchedQueue::RoundRobin));
        runnable(&mut inner, 1, 2, Some(SchedQueue::RoundRobin));
        runnable(&mut inner, 2, 3, Some(SchedQueue::RoundRobin));
        inner.procs[0].sched.age = 30;
        inner.procs[1].sched.age = 10;
        inner.procs[2].sched.age = 20;

        assert_eq!(inner.pick_rr(), Some(1));

        // serving it pushes it to the back
        inner.procs[1].sched.age = 40;
        assert_eq!(inner.pick_rr(), Some(2));
    }

    #[test]
    fn lcfs_picks_most_recent_arrival() {
        let mut inner = TableInner::new();
        runnable(&mut inner, 0, 3, Some(SchedQueue::Lcfs));
        runnable(&mut inner, 1, 4, Some(SchedQueue::Lcfs));
        inner.procs[0].sched.age = 5;
        inner.procs[1].sched.age = 9;

        assert_eq!(inner.pick_lcfs(), Some(1));
    }

    #[test]
    fn rr_starves_lcfs_starves_bjf() {
        let mut inner = TableInner::new();
        runnable(&mut inner, 0, 5, Some(SchedQueue::Bjf));
        runnable(&mut inner, 1, 3, Some(SchedQueue::Lcfs));
        runnable(&mut inner, 2, 4, Some(SchedQueue::RoundRobin));

        // round-robin wins every dispatch while it has a runnable slot
        assert_eq!(inner.pick_next(), Some(2));

        // it blocks: LCFS gets the CPU
        inner.procs[2].state = ProcState::Sleeping;
        assert_eq!(inner.pick_next(), Some(1));

        // LCFS blocks too: best-job-first finally runs
        inner.procs[1].state = ProcState::Sleeping;
        assert_eq!(inner.pick_next(), Some(0));

        inner.procs[2].state = ProcState::Runnable;
        assert_eq!(inner.pick_next(), Some(2));
    }

    #[test]
    fn bjf_picks_lowest_rank() {
        let mut inner = TableInner::new();
        for (idx, priority) in [(0, 5), (1, 3), (2, 7)] {
            runnable(&mut inner, idx, idx + 10, Some(SchedQueue::Bjf));
            let bjf = &mut inner.procs[idx].sched.bjf;
            bjf.priority = priority;
            bjf.priority_ratio = Fixed::ONE;
            bjf.arrival_time_ratio = Fixed::ZERO;
            bjf.executed_cycle_ratio = Fixed::ZERO;
            bjf.process_size_ratio = Fixed::ZERO;
        }

        // priorities 5, 3, 7 run in order 3, 5, 7
        assert_eq!(inner.pick_bjf(), Some(1));
        inner.procs[1].state = ProcState::Sleeping;
        assert_eq!(inner.pick_bjf(), Some(0));
        inner.procs[0].state = ProcState::Sleeping;
        assert_eq!(inner.pick_bjf(), Some(2));
    }

    #[test]
    fn bjf_tie_keeps_first_match() {
        let mut inner = TableInner::new();
        runnable(&mut inner, 4, 10, Some(SchedQueue::Bjf));
        runnable(&mut inner, 7, 11, Some(SchedQueue::Bjf));

        assert_eq!(inner.pick_bjf(), Some(4));
    }

    #[test]
    fn bjf_rank_weighs_all_inputs() {
        let mut params = BjfParams::new();
        params.priority = 2;
        params.executed_cycle = Fixed::from_int(4);
        // rank = 2 + xticks + 4 + sz
        assert_eq!(params.rank(10, 100).to_int(), 2 + 10 + 4 + 100);

        params.arrival_time_ratio = Fixed::ZERO;
        params.process_size_ratio = Fixed::ZERO;
        assert_eq!(params.rank(10, 100).to_int(), 6);
    }

    #[test]
    fn aging_promotes_starved_lcfs() {
        let mut inner = TableInner::new();
        runnable(&mut inner, 0, 3, Some(SchedQueue::Lcfs));
        inner.procs[0].sched.age = 100;

        // at the threshold: nothing happens
        inner.do_aging(100 + AGED_OUT);
        assert_eq!(inner.procs[0].sched.queue, Some(SchedQueue::Lcfs));

        // one past it: promoted, clock restarted
        inner.do_aging(100 + AGED_OUT + 1);
        assert_eq!(inner.procs[0].sched.queue, Some(SchedQueue::RoundRobin));
        assert_eq!(inner.procs[0].sched.age, 100 + AGED_OUT + 1);
    }

    #[test]
    fn aging_leaves_rr_bjf_and_sleepers_alone() {
        let mut inner = TableInner::new();
        runnable(&mut inner, 0, 3, Some(SchedQueue::RoundRobin));
        runnable(&mut inner, 1, 4, Some(SchedQueue::Bjf));
        runnable(&mut inner, 2, 5, Some(SchedQueue::Lcfs));
        inner.procs[2].state = ProcState::Sleeping;

        inner.do_aging(10_000);

        assert_eq!(inner.procs[0].sched.queue, Some(SchedQueue::RoundRobin));
        assert_eq!(inner.procs[1].sched.queue, Some(SchedQueue::Bjf));
        assert_eq!(inner.procs[2].sched.queue, Some(SchedQueue::Lcfs));
    }

    #[test]
    fn change_queue_is_idempotent_and_checked() {
        let mut inner = TableInner::new();
        runnable(&mut inner, 0, 3, None);

        assert_eq!(
            inner.change_queue(Pid::from(3), Some(SchedQueue::Bjf)),
            Ok(())
        );
        assert_eq!(inner.procs[0].sched.queue, Some(SchedQueue::Bjf));

        // repeating the call changes nothing
        assert_eq!(
            inner.change_queue(Pid::from(3), Some(SchedQueue::Bjf)),
            Ok(())
        );
        assert_eq!(inner.procs[0].sched.queue, Some(SchedQueue::Bjf));

        // None falls back to the pid rule
        assert_eq!(inner.change_queue(Pid::from(3), None), Ok(()));
        assert_eq!(inner.procs[0].sched.queue, Some(SchedQueue::Lcfs));

        assert_eq!(
            inner.change_queue(Pid::from(99), Some(SchedQueue::Bjf)),
            Err(KernelError::NoProcess)
        );
    }

    #[test]
    fn set_bjf_round_trips() {
        let mut inner = TableInner::new();
        runnable(&mut inner, 0, 3, Some(SchedQueue::Bjf));

        let (pr, ar, er, sr) = (
            Fixed::from_int(2),
            Fixed::ZERO,
            Fixed::from_int(5),
            Fixed::ONE,
        );
        assert_eq!(inner.set_bjf(Pid::from(3), pr, ar, er, sr), Ok(()));

        let bjf = &inner.procs[0].sched.bjf;
        assert_eq!(bjf.priority_ratio, pr);
        assert_eq!(bjf.arrival_time_ratio, ar);
        assert_eq!(bjf.executed_cycle_ratio, er);
        assert_eq!(bjf.process_size_ratio, sr);

        assert_eq!(
            inner.set_bjf(Pid::from(99), pr, ar, er, sr),
            Err(KernelError::NoProcess)
        );
    }

    #[test]
    fn set_bjf_all_reaches_every_slot() {
        let mut inner = TableInner::new();
        runnable(&mut inner, 0, 3, Some(SchedQueue::Bjf));
        runnable(&mut inner, 5, 4, Some(SchedQueue::Lcfs));

        inner.set_bjf_all(Fixed::ZERO, Fixed::ZERO, Fixed::ZERO, Fixed::ZERO);

        for idx in 0..NPROC {
            assert_eq!(inner.procs[idx].sched.bjf.priority_ratio, Fixed::ZERO);
            assert_eq!(inner.procs[idx].sched.bjf.process_size_ratio, Fixed::ZERO);
        }
    }
}
