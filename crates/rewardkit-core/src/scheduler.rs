//! Timers used for retries and ad expiry.

use std::cell::RefCell;
use std::fmt;
use std::time::Duration;

pub type Task = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Runs a task once after a delay.
///
/// Cancelling a timer that already fired, or was already cancelled, must be a
/// no-op.
pub trait Scheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId;
    fn cancel(&self, id: TimerId);
}

struct PendingTimer {
    id: TimerId,
    due: Duration,
    delay: Duration,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    pending: Vec<PendingTimer>,
}

/// Scheduler driven by a virtual clock that only moves in [`ManualScheduler::advance`].
///
/// Useful for embedders with their own event loop and for tests.
#[derive(Default)]
pub struct ManualScheduler {
    state: RefCell<ManualState>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.state.borrow().now
    }

    /// Requested delays of the armed timers, in arming order.
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.state.borrow().pending.iter().map(|t| t.delay).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Move the clock forward, running every timer that comes due on the way
    /// in due order. Timers armed by those tasks run too if they fall inside
    /// the window. Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.borrow().now + by;
        let mut fired = 0;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let earliest = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.id))
                    .map(|(idx, _)| idx);
                earliest.map(|idx| {
                    let timer = state.pending.remove(idx);
                    state.now = timer.due;
                    timer
                })
            };
            match next {
                Some(timer) => {
                    log::debug!("firing timer {:?}", timer.id);
                    (timer.task)();
                    fired += 1;
                }
                None => break,
            }
        }
        self.state.borrow_mut().now = target;
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = TimerId(state.next_id);
        let due = state.now + delay;
        state.pending.push(PendingTimer {
            id,
            due,
            delay,
            task,
        });
        id
    }

    fn cancel(&self, id: TimerId) {
        self.state.borrow_mut().pending.retain(|t| t.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn timers_fire_in_due_order() {
        let scheduler = ManualScheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (name, ms) in [("late", 30), ("early", 10), ("middle", 20)] {
            let order = Rc::clone(&order);
            scheduler.schedule(
                Duration::from_millis(ms),
                Box::new(move || order.borrow_mut().push(name)),
            );
        }
        assert_eq!(scheduler.advance(Duration::from_millis(25)), 2);
        assert_eq!(*order.borrow(), vec!["early", "middle"]);
        assert_eq!(scheduler.pending_delays(), vec![Duration::from_millis(30)]);
        assert_eq!(scheduler.advance(Duration::from_millis(5)), 1);
        assert_eq!(scheduler.elapsed(), Duration::from_millis(30));
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let scheduler = ManualScheduler::new();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let id = scheduler.schedule(Duration::ZERO, Box::new(move || flag.set(true)));
        scheduler.cancel(id);
        scheduler.cancel(id);
        assert_eq!(scheduler.advance(Duration::from_secs(1)), 0);
        assert!(!fired.get());
    }

    #[test]
    fn tasks_may_arm_new_timers() {
        let scheduler = Rc::new(ManualScheduler::new());
        let count = Rc::new(Cell::new(0));
        let inner_scheduler = Rc::clone(&scheduler);
        let inner_count = Rc::clone(&count);
        scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                inner_count.set(inner_count.get() + 1);
                let c = Rc::clone(&inner_count);
                inner_scheduler.schedule(
                    Duration::from_millis(10),
                    Box::new(move || c.set(c.get() + 1)),
                );
            }),
        );
        assert_eq!(scheduler.advance(Duration::from_millis(20)), 2);
        assert_eq!(count.get(), 2);
    }
}
