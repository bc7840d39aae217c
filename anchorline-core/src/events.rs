//! Observer lists.
//!
//! Each notification channel keeps an ordered list of listeners. Emission
//! works on a snapshot of the list, so a listener may subscribe, unsubscribe
//! or call back into the emitter. A listener that panics is logged and
//! skipped; the remaining listeners still run.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

type Slot<E> = (u64, Rc<dyn Fn(&E)>);

pub struct ListenerList<E> {
    channel: &'static str,
    slots: Rc<RefCell<Vec<Slot<E>>>>,
    next_id: Cell<u64>,
}

impl<E: 'static> ListenerList<E> {
    pub fn new(channel: &'static str) -> Self {
        Self {
            channel,
            slots: Rc::new(RefCell::new(Vec::new())),
            next_id: Cell::new(1),
        }
    }

    /// Register a listener. The returned `Subscription` removes exactly this
    /// listener when disposed; dropping it keeps the listener registered.
    pub fn subscribe(&self, listener: impl Fn(&E) + 'static) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.slots.borrow_mut().push((id, Rc::new(listener)));

        let weak: Weak<RefCell<Vec<Slot<E>>>> = Rc::downgrade(&self.slots);
        Subscription::new(move || {
            if let Some(slots) = weak.upgrade() {
                slots.borrow_mut().retain(|(slot_id, _)| *slot_id != id);
            }
        })
    }

    /// Deliver `event` to every listener registered at call time.
    /// Returns how many listeners panicked.
    pub fn emit(&self, event: &E) -> usize {
        let snapshot: Vec<Rc<dyn Fn(&E)>> = self
            .slots
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();

        let mut failures = 0;
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                failures += 1;
                tracing::error!(channel = self.channel, "listener panicked");
            }
        }
        failures
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.slots.borrow_mut().clear();
    }
}

impl<E> fmt::Debug for ListenerList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerList")
            .field("channel", &self.channel)
            .field("listeners", &self.slots.borrow().len())
            .finish()
    }
}

/// Disposer for one registered listener.
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// A subscription with nothing to remove.
    pub fn noop() -> Self {
        Self { dispose: None }
    }

    pub fn dispose(mut self) {
        if let Some(f) = self.dispose.take() {
            f();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispose_removes_only_that_listener() {
        let list: ListenerList<u32> = ListenerList::new("test");
        let hits = Rc::new(RefCell::new(Vec::new()));

        let h1 = hits.clone();
        let first = list.subscribe(move |v| h1.borrow_mut().push(("a", *v)));
        let h2 = hits.clone();
        let _second = list.subscribe(move |v| h2.borrow_mut().push(("b", *v)));

        list.emit(&1);
        first.dispose();
        list.emit(&2);

        assert_eq!(*hits.borrow(), vec![("a", 1), ("b", 1), ("b", 2)]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let list: ListenerList<()> = ListenerList::new("test");
        let ran = Rc::new(Cell::new(false));

        let _boom = list.subscribe(|_| panic!("listener failure"));
        let flag = ran.clone();
        let _ok = list.subscribe(move |_| flag.set(true));

        assert_eq!(list.emit(&()), 1);
        assert!(ran.get());
    }

    #[test]
    fn test_listener_can_unsubscribe_during_emit() {
        let list: Rc<ListenerList<()>> = Rc::new(ListenerList::new("test"));
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let inner = slot.clone();
        let sub = list.subscribe(move |_| {
            if let Some(s) = inner.borrow_mut().take() {
                s.dispose();
            }
        });
        *slot.borrow_mut() = Some(sub);

        list.emit(&());
        assert!(list.is_empty());
    }

    #[test]
    fn test_dispose_after_clear_is_harmless() {
        let list: ListenerList<()> = ListenerList::new("test");
        let sub = list.subscribe(|_| {});
        list.clear();
        sub.dispose();
        assert!(list.is_empty());
    }
}
