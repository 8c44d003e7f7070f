//! Observable values for UI code: the navigation indicator and the current
//! page.

use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use url::Url;

type Subscriber<T> = Rc<dyn Fn(&T)>;

struct Inner<T> {
    value: RefCell<T>,
    subscribers: RefCell<Vec<(u64, Subscriber<T>)>>,
    next_key: Cell<u64>,
}

/// A single-threaded observable cell. Clones share the value.
pub struct Store<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Store<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                value: RefCell::new(value),
                subscribers: RefCell::new(Vec::new()),
                next_key: Cell::new(0),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.notify();
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.notify();
    }

    /// Calls `f` with the current value now and after every change, until
    /// the returned [`Subscription`] is dropped.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Subscription {
        let key = self.inner.next_key.get();
        self.inner.next_key.set(key + 1);
        let f: Subscriber<T> = Rc::new(f);
        self.inner.subscribers.borrow_mut().push((key, f.clone()));
        f(&self.get());

        let inner: Weak<Inner<T>> = Rc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    inner.subscribers.borrow_mut().retain(|(k, _)| *k != key);
                }
            })),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    fn notify(&self) {
        // Subscribers may set or subscribe again while being notified.
        let value = self.get();
        let subscribers: Vec<Subscriber<T>> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        for f in subscribers {
            f(&value);
        }
    }
}

/// Unsubscribes on drop.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Where an in-flight navigation started and where it is headed.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigatingData {
    pub from: Url,
    pub to: Url,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageData {
    pub url: Url,
    /// Caller-supplied state stored with the history entry.
    pub state: Value,
}
