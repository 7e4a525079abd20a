//! Messages posted by the ad creative to its host.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Message the creative posts when the user asks to close it.
pub const CLOSE_MESSAGE: &str = "kwizzad.call2Action";

type Handler = Rc<dyn Fn(&str)>;

#[derive(Default)]
struct HubState {
    next_id: Cell<u64>,
    handlers: RefCell<Vec<(u64, Handler)>>,
}

/// Fans creative messages out to subscribers.
///
/// The embedder forwards whatever its creative frame posts with
/// [`MessageHub::dispatch`]. Cloning yields another handle to the same hub.
#[derive(Clone, Default)]
pub struct MessageHub {
    state: Rc<HubState>,
}

impl fmt::Debug for MessageHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl MessageHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler`. It stays registered while the returned guard lives.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, handler: impl Fn(&str) + 'static) -> Subscription {
        let id = self.state.next_id.get() + 1;
        self.state.next_id.set(id);
        self.state
            .handlers
            .borrow_mut()
            .push((id, Rc::new(handler)));
        Subscription {
            id,
            hub: Rc::downgrade(&self.state),
        }
    }

    /// Deliver `message` to every current subscriber in subscription order.
    pub fn dispatch(&self, message: &str) {
        // Snapshot so handlers may subscribe or unsubscribe while running.
        let handlers: Vec<Handler> = self
            .state
            .handlers
            .borrow()
            .iter()
            .map(|(_, h)| Rc::clone(h))
            .collect();
        for handler in handlers {
            handler(message);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.handlers.borrow().len()
    }
}

/// Removes its handler from the hub when dropped.
pub struct Subscription {
    id: u64,
    hub: Weak<HubState>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.hub.upgrade() {
            state.handlers.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_reaches_live_subscribers_only() {
        let hub = MessageHub::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let subscription = hub.subscribe(move |msg| sink.borrow_mut().push(msg.to_string()));

        hub.dispatch(CLOSE_MESSAGE);
        assert_eq!(hub.subscriber_count(), 1);
        drop(subscription);
        hub.dispatch("ignored");

        assert_eq!(*seen.borrow(), vec![CLOSE_MESSAGE.to_string()]);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn subscription_outliving_hub_drops_quietly() {
        let hub = MessageHub::new();
        let subscription = hub.subscribe(|_| {});
        drop(hub);
        drop(subscription);
    }
}
