use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use portable_atomic::{AtomicU32, Ordering};

use super::*;
use crate::error::Result;
use crate::task_queue::TaskQueue;

/// How long `reset` waits for frames already posted to the queue.
pub const RESET_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// FrameSender delivers a frame returned by the transformer to its channel.
pub type FrameSender = Arc<dyn Fn(TransformableFrame) + Send + Sync>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameTransformerState {
    Unregistered,
    Registered,
    ShortCircuited,
}

struct SenderState {
    sender: Option<FrameSender>,
    registered: bool,
    short_circuit: bool,
}

/// FrameTransformerDelegate sits between a channel and a FrameTransformer.
/// Frames go out through `transform` and come back on the channel's queue.
pub struct FrameTransformerDelegate {
    ssrc: AtomicU32,
    queue: TaskQueue,
    transformer: Mutex<Option<Arc<dyn FrameTransformer>>>,
    sender_lock: Mutex<SenderState>,
    weak_self: Weak<FrameTransformerDelegate>,
}

impl FrameTransformerDelegate {
    pub fn new(
        sender: FrameSender,
        transformer: Arc<dyn FrameTransformer>,
        ssrc: u32,
        queue: TaskQueue,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| FrameTransformerDelegate {
            ssrc: AtomicU32::new(ssrc),
            queue,
            transformer: Mutex::new(Some(transformer)),
            sender_lock: Mutex::new(SenderState {
                sender: Some(sender),
                registered: false,
                short_circuit: false,
            }),
            weak_self: weak_self.clone(),
        })
    }

    /// Registers the delegate as the sink callback for its SSRC.
    pub fn init(&self) {
        let transformer = self.transformer.lock().clone();
        let this = match self.weak_self.upgrade() {
            Some(this) => this as Arc<dyn TransformedFrameCallback>,
            None => return,
        };
        if let Some(transformer) = transformer {
            transformer.register_transformed_frame_sink_callback(this, self.ssrc());
            self.sender_lock.lock().registered = true;
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc.load(Ordering::SeqCst)
    }

    /// Moves the sink registration to `ssrc`, for a receiver that learns the
    /// remote SSRC after the delegate was created.
    pub fn set_ssrc(&self, ssrc: u32) {
        let old = self.ssrc.swap(ssrc, Ordering::SeqCst);
        if old == ssrc || !self.sender_lock.lock().registered {
            return;
        }
        let transformer = self.transformer.lock().clone();
        let this = match self.weak_self.upgrade() {
            Some(this) => this as Arc<dyn TransformedFrameCallback>,
            None => return,
        };
        if let Some(transformer) = transformer {
            transformer.unregister_transformed_frame_sink_callback(old);
            transformer.register_transformed_frame_sink_callback(this, ssrc);
        }
    }

    pub fn state(&self) -> FrameTransformerState {
        let state = self.sender_lock.lock();
        if state.short_circuit {
            FrameTransformerState::ShortCircuited
        } else if state.registered {
            FrameTransformerState::Registered
        } else {
            FrameTransformerState::Unregistered
        }
    }

    /// Hands `frame` to the transformer, or straight to the sender once
    /// short-circuited.
    pub fn transform(&self, frame: TransformableFrame) {
        {
            let state = self.sender_lock.lock();
            debug_assert!(
                state.registered || state.short_circuit || state.sender.is_none(),
                "transform before init"
            );
            if state.short_circuit {
                if let Some(sender) = &state.sender {
                    sender(frame);
                }
                return;
            }
        }

        let transformer = self.transformer.lock().clone();
        match transformer {
            Some(transformer) => transformer.transform(frame),
            None => log::trace!("frame for ssrc {} dropped after reset", self.ssrc()),
        }
    }

    fn send_frame(&self, frame: TransformableFrame) {
        debug_assert!(self.queue.is_current());
        let state = self.sender_lock.lock();
        if let Some(sender) = &state.sender {
            sender(frame);
        }
    }

    /// Detaches from the transformer and waits until frames already posted
    /// to the queue have been delivered or dropped.
    pub async fn reset(&self) -> Result<()> {
        let transformer = self.transformer.lock().take();
        if let Some(transformer) = transformer {
            transformer.unregister_transformed_frame_sink_callback(self.ssrc());
        }
        {
            let mut state = self.sender_lock.lock();
            state.sender = None;
            state.registered = false;
        }

        self.queue.flush_timeout(RESET_FLUSH_TIMEOUT).await
    }
}

impl TransformedFrameCallback for FrameTransformerDelegate {
    fn on_transformed_frame(&self, frame: TransformableFrame) {
        let state = self.sender_lock.lock();
        if state.sender.is_none() {
            return;
        }
        let this = match self.weak_self.upgrade() {
            Some(this) => this,
            None => return,
        };
        if let Err(err) = self.queue.post(move || this.send_frame(frame)) {
            log::debug!("transformed frame dropped: {err}");
        }
    }

    fn start_short_circuiting(&self) {
        let mut state = self.sender_lock.lock();
        state.short_circuit = true;
    }
}
