use std::sync::Arc;

use parking_lot::Mutex;
use portable_atomic::{AtomicBool, Ordering};

use super::{Direction, MediaPipeline};
use crate::audio::audio_proxy::AudioProxy;
use crate::audio::AudioChunk;
use crate::conduit::{AudioConduit, MediaSessionConduit};
use crate::error::Result;
use crate::event::MediaEventListener;
use crate::registry::MediaRegistry;
use crate::transport::MediaTransportHandler;

/// Feeds captured audio to the conduit once the transport is ready.
struct TransmitListener {
    // set when the transport first becomes ready
    active: AtomicBool,
    // track enabled; disabled tracks send silence
    enabled: AtomicBool,
    proxy: AudioProxy,
}

impl TransmitListener {
    fn set_active(&self, active: bool) {
        if self.active.swap(active, Ordering::SeqCst) != active {
            log::debug!("transmit listener active: {active}");
        }
    }
}

/// MediaPipelineTransmit is the sending half of an audio m-line: captured
/// chunks go through an AudioProxy into the conduit, and the conduit's RTP
/// and RTCP leave through the pipeline.
pub struct MediaPipelineTransmit {
    pipeline: Arc<MediaPipeline>,
    conduit: Arc<AudioConduit>,
    listener: Arc<TransmitListener>,
    transmitting: AtomicBool,
    ready_listener: Mutex<Option<MediaEventListener>>,
}

impl MediaPipelineTransmit {
    pub fn new(
        registry: &MediaRegistry,
        pc_id: &str,
        transport_handler: Arc<dyn MediaTransportHandler>,
        conduit: Arc<AudioConduit>,
    ) -> Self {
        let pipeline = MediaPipeline::new(
            registry,
            pc_id,
            Direction::Transmit,
            transport_handler,
            Arc::clone(&conduit) as Arc<dyn MediaSessionConduit>,
        );
        let listener = Arc::new(TransmitListener {
            active: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            proxy: AudioProxy::new(Arc::clone(&conduit) as _),
        });

        let weak = Arc::downgrade(&listener);
        let ready_listener = pipeline.transport_ready().connect_direct(move |()| {
            if let Some(listener) = weak.upgrade() {
                listener.set_active(true);
            }
        });

        MediaPipelineTransmit {
            pipeline,
            conduit,
            listener,
            transmitting: AtomicBool::new(false),
            ready_listener: Mutex::new(Some(ready_listener)),
        }
    }

    pub fn pipeline(&self) -> &Arc<MediaPipeline> {
        &self.pipeline
    }

    pub fn conduit(&self) -> &Arc<AudioConduit> {
        &self.conduit
    }

    pub fn transmitting(&self) -> bool {
        self.transmitting.load(Ordering::SeqCst)
    }

    /// Whether the transport has come up since creation.
    pub fn listener_active(&self) -> bool {
        self.listener.active.load(Ordering::SeqCst)
    }

    /// Starts or stops sending. Repeating the current value does nothing.
    pub async fn set_active(&self, active: bool) -> Result<()> {
        self.pipeline.set_active(active);
        if self.transmitting.swap(active, Ordering::SeqCst) == active {
            return Ok(());
        }
        log::debug!("{}: transmitting={active}", self.pipeline);
        if active {
            self.conduit.start_transmitting()
        } else {
            self.conduit.stop_transmitting().await
        }
    }

    /// A disabled track keeps the stream alive with silence.
    pub fn set_enabled(&self, enabled: bool) {
        self.listener.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Queues a captured chunk. Chunks are discarded while not transmitting
    /// or before the transport is ready.
    pub fn send_audio_chunk(&self, rate: u32, chunk: AudioChunk) {
        if !self.transmitting() {
            log::trace!("{}: discarding audio, not transmitting", self.pipeline);
            return;
        }
        if !self.listener_active() {
            log::debug!(
                "{}: discarding audio packets because transport not ready",
                self.pipeline
            );
            return;
        }
        let enabled = self.listener.enabled.load(Ordering::SeqCst);
        self.listener.proxy.queue_audio_chunk(rate, chunk, enabled);
    }

    /// Waits for every queued chunk to reach the conduit.
    pub async fn flush(&self) -> Result<()> {
        self.listener.proxy.flush().await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.ready_listener.lock().take();
        self.transmitting.store(false, Ordering::SeqCst);
        self.pipeline.shutdown()?;

        if let Err(err) = self.listener.proxy.flush().await {
            log::debug!("{}: audio proxy flush: {err}", self.pipeline);
        }
        self.listener.proxy.close();
        self.pipeline.sts_queue().flush().await?;
        self.conduit.close().await
    }
}
