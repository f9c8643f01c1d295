
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, Ordering};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pipeline::packet_dumper::PacketDumper;
use crate::task_queue::TaskQueue;

const DEFAULT_CSRC_STATS_WINDOW: Duration = Duration::from_secs(10);
const DEFAULT_PACKET_LOG_INTERVAL: u64 = 100;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// MediaConfig holds the process-wide media settings. Every field has a
/// default so a partial JSON document is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Drops every inbound RTCP packet before it reaches a channel.
    pub force_disable_rtcp_reception: bool,
    /// How long a contributing source stays in the stats after its last packet.
    #[serde(with = "millis")]
    pub csrc_stats_window: Duration,
    /// Sent and received packet counts are logged every this many packets.
    pub packet_log_interval: u64,
    /// Bound on the queue drain performed by `MediaRegistry::shutdown`.
    #[serde(with = "millis")]
    pub shutdown_timeout: Duration,
}

impl Default for MediaConfig {
    fn default() -> Self {
        MediaConfig {
            force_disable_rtcp_reception: false,
            csrc_stats_window: DEFAULT_CSRC_STATS_WINDOW,
            packet_log_interval: DEFAULT_PACKET_LOG_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl MediaConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: MediaConfig = serde_json::from_str(json)?;
        if config.packet_log_interval == 0 {
            return Err(Error::ErrInvalidConfig(
                "packet_log_interval must be positive".to_owned(),
            ));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// MediaRegistry owns what every pipeline of the process shares: the STS
/// queue that carries all packet and transport state work, the call queue
/// the conduits take their input on, the packet dumpers and the config.
/// It is created once and passed to each pipeline.
pub struct MediaRegistry {
    sts_queue: TaskQueue,
    call_queue: TaskQueue,
    packet_dumpers: Mutex<HashMap<String, Arc<PacketDumper>>>,
    config: Arc<ArcSwap<MediaConfig>>,
    is_shutdown: AtomicBool,
}

impl MediaRegistry {
    /// Starts the shared queues. Must be called within a tokio runtime.
    pub fn new(config: MediaConfig) -> Arc<Self> {
        Arc::new(MediaRegistry {
            sts_queue: TaskQueue::new("STS"),
            call_queue: TaskQueue::new("Call"),
            packet_dumpers: Mutex::new(HashMap::new()),
            config: Arc::new(ArcSwap::from_pointee(config)),
            is_shutdown: AtomicBool::new(false),
        })
    }

    pub fn sts_queue(&self) -> &TaskQueue {
        &self.sts_queue
    }

    pub fn call_queue(&self) -> &TaskQueue {
        &self.call_queue
    }

    /// Current settings. Pipelines re-read this per packet, so an update is
    /// seen without rebuilding them.
    pub fn config(&self) -> Arc<MediaConfig> {
        self.config.load_full()
    }

    pub(crate) fn config_handle(&self) -> Arc<ArcSwap<MediaConfig>> {
        Arc::clone(&self.config)
    }

    pub fn update_config(&self, config: MediaConfig) {
        log::debug!("media config updated: {config:?}");
        self.config.store(Arc::new(config));
    }

    /// Returns the dumper of `pc_id`, creating it on first use.
    pub fn packet_dumper(&self, pc_id: &str) -> Arc<PacketDumper> {
        let mut dumpers = self.packet_dumpers.lock();
        Arc::clone(
            dumpers
                .entry(pc_id.to_owned())
                .or_insert_with(|| Arc::new(PacketDumper::new(pc_id))),
        )
    }

    pub fn remove_packet_dumper(&self, pc_id: &str) -> Option<Arc<PacketDumper>> {
        self.packet_dumpers.lock().remove(pc_id)
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// Drains and stops both queues. Pipelines should be shut down first so
    /// their detach work is part of the drain.
    pub async fn shutdown(&self) -> Result<()> {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let timeout = self.config().shutdown_timeout;

        let mut errs = vec![];
        for queue in [&self.sts_queue, &self.call_queue] {
            if let Err(err) = queue.flush_timeout(timeout).await {
                log::warn!("queue {} did not drain: {err}", queue.name());
                errs.push(err);
            }
            queue.close();
        }
        self.packet_dumpers.lock().clear();

        match errs.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
