use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::*;

type TransformFn = Box<dyn Fn(TransformableFrame) -> Option<TransformableFrame> + Send + Sync>;

/// FnFrameTransformer runs a closure over every frame and returns the result
/// to the callback registered for the frame's SSRC. While exactly one callback
/// is registered it receives every frame whatever its SSRC, so a receiver
/// that registered before learning the remote SSRC is still served. A closure
/// returning None drops the frame.
pub struct FnFrameTransformer {
    f: TransformFn,
    short_circuit_on_register: bool,
    callbacks: Mutex<HashMap<u32, Arc<dyn TransformedFrameCallback>>>,
}

impl FnFrameTransformer {
    pub fn new<F>(f: F) -> Arc<Self>
    where
        F: Fn(TransformableFrame) -> Option<TransformableFrame> + Send + Sync + 'static,
    {
        Arc::new(FnFrameTransformer {
            f: Box::new(f),
            short_circuit_on_register: false,
            callbacks: Mutex::new(HashMap::new()),
        })
    }

    /// A transformer that returns every frame unchanged.
    pub fn passthrough() -> Arc<Self> {
        Self::new(Some)
    }

    /// A transformer that asks every registered callback to bypass it.
    pub fn short_circuiting() -> Arc<Self> {
        Arc::new(FnFrameTransformer {
            f: Box::new(Some),
            short_circuit_on_register: true,
            callbacks: Mutex::new(HashMap::new()),
        })
    }

    pub fn registered_ssrcs(&self) -> Vec<u32> {
        let mut ssrcs: Vec<u32> = self.callbacks.lock().keys().copied().collect();
        ssrcs.sort_unstable();
        ssrcs
    }
}

impl FrameTransformer for FnFrameTransformer {
    fn transform(&self, frame: TransformableFrame) {
        let callback = {
            let callbacks = self.callbacks.lock();
            match callbacks.get(&frame.ssrc()) {
                Some(cb) => Some(Arc::clone(cb)),
                // a single sink takes every frame
                None if callbacks.len() == 1 => callbacks.values().next().cloned(),
                None => None,
            }
        };

        let callback = match callback {
            Some(cb) => cb,
            None => {
                log::trace!("no sink for ssrc {}, frame dropped", frame.ssrc());
                return;
            }
        };
        if let Some(out) = (self.f)(frame) {
            callback.on_transformed_frame(out);
        }
    }

    fn register_transformed_frame_sink_callback(
        &self,
        callback: Arc<dyn TransformedFrameCallback>,
        ssrc: u32,
    ) {
        if self.short_circuit_on_register {
            callback.start_short_circuiting();
        }
        self.callbacks.lock().insert(ssrc, callback);
    }

    fn unregister_transformed_frame_sink_callback(&self, ssrc: u32) {
        self.callbacks.lock().remove(&ssrc);
    }
}
