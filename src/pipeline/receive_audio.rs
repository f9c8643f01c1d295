use std::sync::Arc;

use portable_atomic::{AtomicBool, Ordering};

use super::{Direction, MediaPipeline};
use crate::audio::{AudioFrame, SUPPORTED_SENDING_RATES};
use crate::conduit::{AudioConduit, MediaSessionConduit};
use crate::error::Result;
use crate::registry::MediaRegistry;
use crate::transport::MediaTransportHandler;

/// Playout rate used when the caller's rate is not one the conduit decodes to.
const FALLBACK_PLAYOUT_RATE: u32 = 48000;

/// MediaPipelineReceiveAudio is the receiving half of an audio m-line. Its
/// owner pulls 10 ms of decoded audio at a time.
pub struct MediaPipelineReceiveAudio {
    pipeline: Arc<MediaPipeline>,
    conduit: Arc<AudioConduit>,
    enabled: AtomicBool,
}

impl MediaPipelineReceiveAudio {
    pub fn new(
        registry: &MediaRegistry,
        pc_id: &str,
        transport_handler: Arc<dyn MediaTransportHandler>,
        conduit: Arc<AudioConduit>,
    ) -> Self {
        let pipeline = MediaPipeline::new(
            registry,
            pc_id,
            Direction::Receive,
            transport_handler,
            Arc::clone(&conduit) as Arc<dyn MediaSessionConduit>,
        );
        MediaPipelineReceiveAudio {
            pipeline,
            conduit,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn pipeline(&self) -> &Arc<MediaPipeline> {
        &self.pipeline
    }

    pub fn conduit(&self) -> &Arc<AudioConduit> {
        &self.conduit
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Starts or stops playout. Repeating the current value does nothing.
    pub fn set_active(&self, active: bool) {
        self.pipeline.set_active(active);
        if self.enabled.swap(active, Ordering::SeqCst) == active {
            return;
        }
        log::debug!("{}: pulling enabled={active}", self.pipeline);
        if active {
            self.conduit.start_receiving();
        } else {
            self.conduit.stop_receiving();
        }
    }

    /// Returns the next 10 ms of audio at `rate`, or at 48 kHz when `rate` is
    /// unsupported. Errors and disabled playout yield silence.
    pub fn pull(&self, rate: u32) -> AudioFrame {
        let rate = if SUPPORTED_SENDING_RATES.contains(&rate) {
            rate
        } else {
            FALLBACK_PLAYOUT_RATE
        };
        if !self.enabled() {
            return AudioFrame::silence(rate, 1);
        }

        match self.conduit.get_audio_frame(rate) {
            Ok(frame) => frame,
            Err(err) => {
                log::debug!("{}: audio pull failed: {err}", self.pipeline);
                AudioFrame::silence(rate, 1)
            }
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.enabled.store(false, Ordering::SeqCst);
        self.pipeline.shutdown()?;
        self.conduit.stop_receiving();
        self.pipeline.sts_queue().flush().await?;
        self.conduit.close().await
    }
}
