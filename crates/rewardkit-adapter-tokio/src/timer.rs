use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use rewardkit_core::{Scheduler, Task, TimerId};
use tokio::task::AbortHandle;

/// Runs placement timers as local tokio tasks.
///
/// Must be used from inside a [`tokio::task::LocalSet`].
#[derive(Default)]
pub struct TokioScheduler {
    next_id: Cell<u64>,
    pending: Rc<RefCell<HashMap<TimerId, AbortHandle>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId(self.next_id.get() + 1);
        self.next_id.set(id.0);

        let pending = Rc::clone(&self.pending);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            pending.borrow_mut().remove(&id);
            log::debug!("timer {:?} fired after {:?}", id, delay);
            task();
        });
        self.pending
            .borrow_mut()
            .insert(id, handle.abort_handle());
        id
    }

    fn cancel(&self, id: TimerId) {
        let handle = self.pending.borrow_mut().remove(&id);
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.pending.borrow_mut().drain() {
            handle.abort();
        }
    }
}
