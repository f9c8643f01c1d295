#[cfg(test)]
mod event_test;

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicU64, Ordering};

use crate::task_queue::TaskQueue;

type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

struct Slot<T> {
    id: u64,
    revoked: Arc<AtomicBool>,
    queue: Option<TaskQueue>,
    handler: Handler<T>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Slot {
            id: self.id,
            revoked: Arc::clone(&self.revoked),
            queue: self.queue.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

type Slots<T> = Mutex<Vec<Slot<T>>>;

/// MediaEventProducer fans a value out to every connected listener, either
/// inline or by posting to the listener's TaskQueue.
pub struct MediaEventProducer<T> {
    slots: Arc<Slots<T>>,
    next_id: AtomicU64,
}

impl<T> Default for MediaEventProducer<T> {
    fn default() -> Self {
        MediaEventProducer {
            slots: Arc::new(Mutex::new(vec![])),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T> fmt::Debug for MediaEventProducer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaEventProducer")
            .field("listeners", &self.slots.lock().len())
            .finish()
    }
}

impl<T: Clone + Send + 'static> MediaEventProducer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers every notification to `f` on `queue`.
    pub fn connect<F>(&self, queue: &TaskQueue, f: F) -> MediaEventListener
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.add(Some(queue.clone()), Arc::new(f))
    }

    /// Delivers every notification to `f` on the notifying thread.
    pub fn connect_direct<F>(&self, f: F) -> MediaEventListener
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(f))
    }

    fn add(&self, queue: Option<TaskQueue>, handler: Handler<T>) -> MediaEventListener {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let revoked = Arc::new(AtomicBool::new(false));
        {
            let mut slots = self.slots.lock();
            slots.push(Slot {
                id,
                revoked: Arc::clone(&revoked),
                queue,
                handler,
            });
        }

        let weak: Weak<Slots<T>> = Arc::downgrade(&self.slots);
        MediaEventListener {
            revoked,
            remove: Some(Box::new(move || {
                if let Some(slots) = weak.upgrade() {
                    slots.lock().retain(|s| s.id != id);
                }
            })),
        }
    }

    pub fn notify(&self, value: T) {
        let slots: Vec<Slot<T>> = self.slots.lock().clone();
        for slot in slots {
            if slot.revoked.load(Ordering::SeqCst) {
                continue;
            }
            match slot.queue {
                Some(queue) => {
                    let value = value.clone();
                    let revoked = slot.revoked;
                    let handler = slot.handler;
                    let name = queue.name().to_owned();
                    if queue
                        .post(move || {
                            // a listener disconnected after posting must not fire
                            if !revoked.load(Ordering::SeqCst) {
                                handler(value);
                            }
                        })
                        .is_err()
                    {
                        log::debug!("event dropped, queue {name} closed");
                    }
                }
                None => (slot.handler)(value.clone()),
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn disconnect_all(&self) {
        let mut slots = self.slots.lock();
        for slot in slots.iter() {
            slot.revoked.store(true, Ordering::SeqCst);
        }
        slots.clear();
    }
}

/// MediaEventListener is the handle of one connection. Dropping it disconnects.
pub struct MediaEventListener {
    revoked: Arc<AtomicBool>,
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl fmt::Debug for MediaEventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaEventListener")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl MediaEventListener {
    pub fn is_connected(&self) -> bool {
        !self.revoked.load(Ordering::SeqCst)
    }

    /// Revokes the listener. Deliveries already posted to a queue are skipped.
    pub fn disconnect(&mut self) {
        self.revoked.store(true, Ordering::SeqCst);
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for MediaEventListener {
    fn drop(&mut self) {
        self.disconnect();
    }
}
