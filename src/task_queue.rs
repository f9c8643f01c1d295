#[cfg(test)]
mod task_queue_test;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT_QUEUE: u64;
}

type Task = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Task),
    Stop,
}

struct TaskQueueInternal {
    id: u64,
    name: String,
    tx: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
}

/// TaskQueue is a named serial executor. Tasks posted to it run one at a time,
/// in posting order, on a dedicated tokio task.
///
/// A TaskQueue must be created from within a tokio runtime.
#[derive(Clone)]
pub struct TaskQueue {
    internal: Arc<TaskQueueInternal>,
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("id", &self.internal.id)
            .field("name", &self.internal.name)
            .finish()
    }
}

impl TaskQueue {
    pub fn new(name: impl Into<String>) -> Self {
        let id = NEXT_QUEUE_ID.fetch_add(1, Ordering::SeqCst);
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();

        log::trace!("task queue {name}({id}) started");
        tokio::spawn(CURRENT_QUEUE.scope(id, TaskQueue::run(rx, name.clone())));

        TaskQueue {
            internal: Arc::new(TaskQueueInternal {
                id,
                name,
                tx,
                closed: AtomicBool::new(false),
            }),
        }
    }

    async fn run(mut rx: mpsc::UnboundedReceiver<Message>, name: String) {
        while let Some(msg) = rx.recv().await {
            match msg {
                Message::Run(task) => task(),
                Message::Stop => break,
            }
        }
        log::trace!("task queue {name} stopped");
    }

    pub fn name(&self) -> &str {
        &self.internal.name
    }

    /// Reports whether the caller is running on this queue.
    pub fn is_current(&self) -> bool {
        CURRENT_QUEUE
            .try_with(|id| *id == self.internal.id)
            .unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        self.internal.closed.load(Ordering::SeqCst)
    }

    /// Enqueues `f` behind every task posted before it.
    pub fn post<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_closed() {
            return Err(Error::ErrTaskQueueClosed);
        }
        self.internal
            .tx
            .send(Message::Run(Box::new(f)))
            .map_err(|_| Error::ErrTaskQueueClosed)
    }

    /// Runs `f` on the queue and waits for its result.
    pub async fn invoke<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        debug_assert!(!self.is_current(), "invoke on own queue would deadlock");

        let (done_tx, done_rx) = oneshot::channel();
        self.post(move || {
            let _ = done_tx.send(f());
        })?;
        done_rx.await.map_err(|_| Error::ErrTaskQueueClosed)
    }

    /// Resolves once every task posted before the call has run.
    pub async fn flush(&self) -> Result<()> {
        self.invoke(|| {}).await
    }

    pub async fn flush_timeout(&self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.flush()).await {
            Ok(result) => result,
            Err(_) => Err(Error::ErrFlushTimeout),
        }
    }

    /// Stops the worker once the tasks already queued have run. Later posts
    /// are rejected.
    pub fn close(&self) {
        if self.internal.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.internal.tx.send(Message::Stop);
    }
}
