#[cfg(test)]
mod pipeline_test;

pub mod filter;
pub mod packet_dumper;
pub mod receive_audio;
pub mod transmit;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use rtp::extension::extension_map::ExtensionMap;
use rtp::extension::sdes_mid_extension::MidExtension;
use rtp::header::Header;
use rtp::packet::Packet;
use serde::Serialize;
use util::marshal::Unmarshal;

use crate::channel::ContributingSourceStats;
use crate::conduit::MediaSessionConduit;
use crate::error::Result;
use crate::event::{MediaEventListener, MediaEventProducer};
use crate::media_packet::{MediaPacket, MediaPacketType};
use crate::registry::{MediaConfig, MediaRegistry};
use crate::task_queue::TaskQueue;
use crate::transport::{MediaTransportHandler, TransportLayerState, TransportStates};

pub use filter::{MediaPipelineFilter, RtpExtmap};
pub use packet_dumper::{PacketDump, PacketDumpType, PacketDumper};
pub use receive_audio::MediaPipelineReceiveAudio;
pub use transmit::MediaPipelineTransmit;

/// Direction of a pipeline. A transmit pipeline still receives RTCP for its
/// sender, and a receive pipeline still sends RTCP for its receiver.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Transmit,
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Direction::Transmit => "transmit",
            Direction::Receive => "receive",
        };
        write!(f, "{s}")
    }
}

/// RtpPacketReceived is a parsed inbound RTP packet that passed the filter.
#[derive(Debug, Clone, PartialEq)]
pub struct RtpPacketReceived {
    pub packet: Packet,
    pub arrival_time: SystemTime,
}

impl RtpPacketReceived {
    pub fn header(&self) -> &Header {
        &self.packet.header
    }
}

/// RtpCsrcStats remembers when a contributing source was last seen.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RtpCsrcStats {
    csrc: u32,
    timestamp: SystemTime,
}

impl RtpCsrcStats {
    pub fn new(csrc: u32, timestamp: SystemTime) -> Self {
        RtpCsrcStats { csrc, timestamp }
    }

    pub fn csrc(&self) -> u32 {
        self.csrc
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: SystemTime) {
        self.timestamp = timestamp;
    }

    /// A source is expired once it has been silent for longer than `window`.
    pub fn expired(&self, now: SystemTime, window: Duration) -> bool {
        now.duration_since(self.timestamp)
            .map(|age| age > window)
            .unwrap_or(false)
    }

    pub fn get_stats(&self, inbound_rtp_stream_id: &str) -> ContributingSourceStats {
        ContributingSourceStats {
            id: format!("csrc_{inbound_rtp_stream_id}_{}", self.csrc),
            contributor_ssrc: self.csrc,
            inbound_rtp_stream_id: inbound_rtp_stream_id.to_owned(),
            timestamp: Some(self.timestamp),
        }
    }
}

/// PipelinePacketCounts are the packets a pipeline moved since creation.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct PipelinePacketCounts {
    pub rtp_packets_sent: u64,
    pub rtcp_packets_sent: u64,
    pub rtp_bytes_sent: u64,
    pub rtp_packets_received: u64,
    pub rtcp_packets_received: u64,
    pub rtp_bytes_received: u64,
}

struct PipelineInternal {
    transport_id: String,
    states: TransportStates,
    ready: bool,
    filter: Option<MediaPipelineFilter>,
    extensions: ExtensionMap,
    csrc_stats: HashMap<u32, RtpCsrcStats>,
    counts: PipelinePacketCounts,
    active_sts: bool,
    signals_connected: bool,

    // conduit output into send_packet; dropped on transport failure
    send_listeners: Vec<MediaEventListener>,
    // pipeline receive events into the conduit
    conduit_listeners: Vec<MediaEventListener>,
    transport_listeners: Vec<MediaEventListener>,
}

/// MediaPipeline binds one conduit to one transport of a peer connection.
/// All packet and transport state work runs on the registry's STS queue.
pub struct MediaPipeline {
    pc_id: String,
    direction: Direction,
    level: AtomicUsize,

    conduit: Arc<dyn MediaSessionConduit>,
    transport_handler: Arc<dyn MediaTransportHandler>,
    sts_queue: TaskQueue,
    call_queue: TaskQueue,
    packet_dumper: Arc<PacketDumper>,
    config: Arc<ArcSwap<MediaConfig>>,

    rtp_receive_event: MediaEventProducer<RtpPacketReceived>,
    rtcp_receive_event: MediaEventProducer<MediaPacket>,
    transport_ready: MediaEventProducer<()>,

    active: AtomicBool,
    mirror_connected: AtomicBool,
    internal: Mutex<PipelineInternal>,
    weak_self: Weak<MediaPipeline>,
}

impl fmt::Display for MediaPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}| {} level={}",
            self.pc_id,
            self.direction,
            self.level()
        )
    }
}

impl MediaPipeline {
    /// Creates the pipeline and wires the conduit's events to it.
    pub fn new(
        registry: &MediaRegistry,
        pc_id: &str,
        direction: Direction,
        transport_handler: Arc<dyn MediaTransportHandler>,
        conduit: Arc<dyn MediaSessionConduit>,
    ) -> Arc<Self> {
        let pipeline = Arc::new_cyclic(|weak_self| MediaPipeline {
            pc_id: pc_id.to_owned(),
            direction,
            level: AtomicUsize::new(0),
            conduit,
            transport_handler,
            sts_queue: registry.sts_queue().clone(),
            call_queue: registry.call_queue().clone(),
            packet_dumper: registry.packet_dumper(pc_id),
            config: registry.config_handle(),
            rtp_receive_event: MediaEventProducer::new(),
            rtcp_receive_event: MediaEventProducer::new(),
            transport_ready: MediaEventProducer::new(),
            active: AtomicBool::new(false),
            mirror_connected: AtomicBool::new(true),
            internal: Mutex::new(PipelineInternal {
                transport_id: String::new(),
                states: TransportStates::default(),
                ready: false,
                filter: None,
                extensions: ExtensionMap::new(),
                csrc_stats: HashMap::new(),
                counts: PipelinePacketCounts::default(),
                active_sts: false,
                signals_connected: false,
                send_listeners: vec![],
                conduit_listeners: vec![],
                transport_listeners: vec![],
            }),
            weak_self: weak_self.clone(),
        });
        pipeline.connect_conduit();
        log::debug!("created pipeline {pipeline}");
        pipeline
    }

    fn connect_conduit(&self) {
        let mut send_listeners = vec![];
        let mut conduit_listeners = vec![];
        match self.direction {
            Direction::Transmit => {
                send_listeners.push(self.connect_send_event(self.conduit.sender_rtp_send_event()));
                send_listeners.push(self.connect_send_event(self.conduit.sender_rtcp_send_event()));
                conduit_listeners.push(
                    self.conduit
                        .connect_sender_rtcp_event(&self.call_queue, &self.rtcp_receive_event),
                );
            }
            Direction::Receive => {
                conduit_listeners.push(
                    self.conduit
                        .connect_receiver_rtp_event(&self.call_queue, &self.rtp_receive_event),
                );
                conduit_listeners.push(
                    self.conduit
                        .connect_receiver_rtcp_event(&self.call_queue, &self.rtcp_receive_event),
                );
                send_listeners
                    .push(self.connect_send_event(self.conduit.receiver_rtcp_send_event()));
            }
        }

        let mut internal = self.internal.lock();
        internal.send_listeners = send_listeners;
        internal.conduit_listeners = conduit_listeners;
    }

    fn connect_send_event(&self, event: &MediaEventProducer<MediaPacket>) -> MediaEventListener {
        let weak = self.weak_self.clone();
        event.connect(&self.sts_queue, move |packet| {
            if let Some(pipeline) = weak.upgrade() {
                pipeline.send_packet(packet);
            }
        })
    }

    pub fn pc_id(&self) -> &str {
        &self.pc_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The m-line index this pipeline serves.
    pub fn level(&self) -> usize {
        self.level.load(Ordering::SeqCst)
    }

    pub fn set_level(&self, level: usize) {
        self.level.store(level, Ordering::SeqCst);
    }

    pub fn conduit(&self) -> &Arc<dyn MediaSessionConduit> {
        &self.conduit
    }

    pub fn sts_queue(&self) -> &TaskQueue {
        &self.sts_queue
    }

    pub fn packet_dumper(&self) -> &Arc<PacketDumper> {
        &self.packet_dumper
    }

    pub fn rtp_receive_event(&self) -> &MediaEventProducer<RtpPacketReceived> {
        &self.rtp_receive_event
    }

    pub fn rtcp_receive_event(&self) -> &MediaEventProducer<MediaPacket> {
        &self.rtcp_receive_event
    }

    /// Fires on the STS queue each time both layers become open.
    pub fn transport_ready(&self) -> &MediaEventProducer<()> {
        &self.transport_ready
    }

    pub fn transport_id(&self) -> String {
        self.internal.lock().transport_id.clone()
    }

    pub fn transport_states(&self) -> TransportStates {
        self.internal.lock().states
    }

    pub fn packet_counts(&self) -> PipelinePacketCounts {
        self.internal.lock().counts
    }

    pub fn filter(&self) -> Option<MediaPipelineFilter> {
        self.internal.lock().filter.clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Whether the STS side has seen the active flag. Inbound packets are
    /// dropped until it has.
    pub fn is_active_sts(&self) -> bool {
        self.internal.lock().active_sts
    }

    /// Sets the active flag. Setting the current value again does nothing,
    /// and nothing is mirrored once the pipeline is shut down.
    pub fn set_active(&self, active: bool) {
        if !self.mirror_connected.load(Ordering::SeqCst) {
            return;
        }
        if self.active.swap(active, Ordering::SeqCst) == active {
            return;
        }
        self.update_active();
    }

    /// Mirrors the active flag onto the STS queue.
    pub fn update_active(&self) {
        let active = self.is_active();
        let weak = self.weak_self.clone();
        if let Err(err) = self.sts_queue.post(move || {
            if let Some(pipeline) = weak.upgrade() {
                pipeline.internal.lock().active_sts = active;
            }
        }) {
            log::warn!("{self}: active flag not mirrored: {err}");
        }
    }

    /// Rebinds the pipeline to `transport_id` and installs `filter`. Learned
    /// remote SSRCs survive a filter that carries none.
    pub fn update_transport(
        &self,
        transport_id: &str,
        filter: Option<MediaPipelineFilter>,
        signaling_stable: bool,
    ) -> Result<()> {
        let weak = self.weak_self.clone();
        let transport_id = transport_id.to_owned();
        self.sts_queue.post(move || {
            if let Some(pipeline) = weak.upgrade() {
                pipeline.update_transport_s(transport_id, filter, signaling_stable);
            }
        })
    }

    fn update_transport_s(
        &self,
        transport_id: String,
        filter: Option<MediaPipelineFilter>,
        signaling_stable: bool,
    ) {
        debug_assert!(self.sts_queue.is_current());
        self.connect_transport_signals();

        let changed = {
            let mut internal = self.internal.lock();
            if internal.transport_id != transport_id {
                internal.states = TransportStates {
                    rtp: self.transport_handler.state(&transport_id, false),
                    rtcp: self.transport_handler.state(&transport_id, true),
                };
                internal.transport_id = transport_id;
                true
            } else {
                false
            }
        };
        if changed {
            self.check_transport_states();
        }

        let mut guard = self.internal.lock();
        let internal = &mut *guard;
        if let Some(old) = &internal.filter {
            for extension in old.extmap() {
                internal.extensions.deregister(&extension.uri);
            }
        }
        internal.filter = match (internal.filter.take(), filter) {
            (Some(mut current), Some(update)) => {
                current.update(&update, signaling_stable);
                Some(current)
            }
            (_, filter) => filter,
        };
        if let Some(filter) = &internal.filter {
            for extension in filter.extmap() {
                if let Err(err) = internal
                    .extensions
                    .register_by_uri(extension.id, &extension.uri)
                {
                    log::debug!("{self}: extmap {} {}: {err}", extension.id, extension.uri);
                }
            }
        }
    }

    fn connect_transport_signals(&self) {
        let mut internal = self.internal.lock();
        if internal.signals_connected {
            return;
        }

        let handler = &self.transport_handler;
        let weak = self.weak_self.clone();
        let state_change = handler
            .state_change()
            .connect(&self.sts_queue, move |(transport_id, state)| {
                if let Some(pipeline) = weak.upgrade() {
                    pipeline.rtp_state_change(&transport_id, state);
                }
            });
        let weak = self.weak_self.clone();
        let rtcp_state_change =
            handler
                .rtcp_state_change()
                .connect(&self.sts_queue, move |(transport_id, state)| {
                    if let Some(pipeline) = weak.upgrade() {
                        pipeline.rtcp_state_change(&transport_id, state);
                    }
                });
        let weak = self.weak_self.clone();
        let encrypted_sending =
            handler
                .encrypted_sending()
                .connect(&self.sts_queue, move |(transport_id, packet)| {
                    if let Some(pipeline) = weak.upgrade() {
                        pipeline.encrypted_packet_sending(&transport_id, &packet);
                    }
                });
        let weak = self.weak_self.clone();
        let packet_received =
            handler
                .packet_received()
                .connect(&self.sts_queue, move |(transport_id, packet)| {
                    if let Some(pipeline) = weak.upgrade() {
                        pipeline.packet_received(&transport_id, &packet);
                    }
                });

        internal.transport_listeners = vec![
            state_change,
            rtcp_state_change,
            encrypted_sending,
            packet_received,
        ];
        internal.signals_connected = true;
    }

    pub fn rtp_state_change(&self, transport_id: &str, state: TransportLayerState) {
        self.layer_state_change(transport_id, false, state);
    }

    pub fn rtcp_state_change(&self, transport_id: &str, state: TransportLayerState) {
        self.layer_state_change(transport_id, true, state);
    }

    fn layer_state_change(&self, transport_id: &str, rtcp: bool, state: TransportLayerState) {
        {
            let mut internal = self.internal.lock();
            if internal.transport_id != transport_id {
                return;
            }
            internal.states.set(rtcp, state);
        }
        self.check_transport_states();
    }

    fn check_transport_states(&self) {
        let mut internal = self.internal.lock();
        let states = internal.states;

        if states.any_terminal() {
            log::warn!(
                "{self}: transport {} failed, rtp={} rtcp={}",
                internal.transport_id,
                states.rtp,
                states.rtcp
            );
            internal.ready = false;
            let send_listeners = std::mem::take(&mut internal.send_listeners);
            drop(internal);
            drop(send_listeners);
            self.conduit.set_transport_active(false);
            return;
        }

        if states.rtp.is_open() {
            log::info!("{self}: rtp transport {} ready", internal.transport_id);
        }
        if states.rtcp.is_open() {
            log::info!("{self}: rtcp transport {} ready", internal.transport_id);
        }

        if !states.is_ready() {
            internal.ready = false;
            return;
        }
        let became_ready = !internal.ready;
        internal.ready = true;
        drop(internal);

        self.conduit.set_transport_active(true);
        if became_ready {
            self.transport_ready.notify(());
        }
    }

    /// Sends `packet` on the bound transport. Packets for a layer that is not
    /// open are dropped without error.
    pub fn send_packet(&self, mut packet: MediaPacket) {
        let is_rtcp = packet.typ.is_rtcp();
        let level = self.level();
        let log_interval = self.config.load().packet_log_interval.max(1);

        let transport_id = {
            let mut internal = self.internal.lock();
            let state = internal.states.get(is_rtcp);
            if !state.is_open() {
                log::trace!("{self}: dropping {} while transport is {state}", packet.typ);
                return;
            }

            let counts = &mut internal.counts;
            if is_rtcp {
                counts.rtcp_packets_sent += 1;
                if counts.rtcp_packets_sent % log_interval == 0 {
                    log::info!("{self}: rtcp sent packet count {}", counts.rtcp_packets_sent);
                }
            } else {
                counts.rtp_packets_sent += 1;
                counts.rtp_bytes_sent += packet.len() as u64;
                if counts.rtp_packets_sent % log_interval == 0 {
                    log::info!(
                        "{self}: rtp sent packet count {} ({} bytes)",
                        counts.rtp_packets_sent,
                        counts.rtp_bytes_sent
                    );
                }
            }
            internal.transport_id.clone()
        };

        packet.sdp_level = Some(level);
        let dump_type = if is_rtcp {
            PacketDumpType::Rtcp
        } else {
            PacketDumpType::Rtp
        };
        self.packet_dumper.dump(level, dump_type, true, &packet.data);

        log::debug!(
            "{self}: sending {} bytes of {} on {transport_id}",
            packet.len(),
            packet.typ
        );
        self.transport_handler.send_packet(&transport_id, packet);
    }

    /// Entry point for every datagram of every transport. The slot is shared
    /// by all pipelines.
    pub fn packet_received(&self, transport_id: &str, packet: &Arc<Mutex<MediaPacket>>) {
        {
            let internal = self.internal.lock();
            if !internal.active_sts {
                log::trace!("{self}: discarding packet, pipeline inactive");
                return;
            }
            if internal.transport_id != transport_id {
                return;
            }
        }

        let (typ, is_empty) = {
            let packet = packet.lock();
            (packet.typ, packet.is_empty())
        };
        if is_empty {
            return;
        }

        match typ {
            MediaPacketType::Rtp => {
                let packet = packet.lock().clone();
                self.rtp_packet_received(packet);
            }
            MediaPacketType::Rtcp => self.rtcp_packet_received(packet),
            _ => {}
        }
    }

    fn rtp_packet_received(&self, packet: MediaPacket) {
        if self.direction == Direction::Transmit {
            return;
        }

        let rtp_packet = match Packet::unmarshal(&mut packet.data.clone()) {
            Ok(rtp_packet) => rtp_packet,
            Err(err) => {
                log::debug!("{self}: dropping unparsable rtp: {err}");
                return;
            }
        };

        let now = SystemTime::now();
        let config = self.config.load();
        {
            let mut guard = self.internal.lock();
            let internal = &mut *guard;
            if let Some(filter) = internal.filter.as_mut() {
                if !filter.filter(&rtp_packet.header) {
                    let mid = rtp_packet
                        .header
                        .get_extension_value::<MidExtension>(&internal.extensions)
                        .map(|ext| ext.mid);
                    log::debug!(
                        "{self}: filtered rtp ssrc={} pt={} mid={mid:?}",
                        rtp_packet.header.ssrc,
                        rtp_packet.header.payload_type
                    );
                    return;
                }
            }

            let window = config.csrc_stats_window;
            internal
                .csrc_stats
                .retain(|_, stats| !stats.expired(now, window));
            for csrc in &rtp_packet.header.csrc {
                internal
                    .csrc_stats
                    .entry(*csrc)
                    .and_modify(|stats| stats.set_timestamp(now))
                    .or_insert_with(|| RtpCsrcStats::new(*csrc, now));
            }

            let counts = &mut internal.counts;
            counts.rtp_packets_received += 1;
            counts.rtp_bytes_received += packet.len() as u64;
            if counts.rtp_packets_received % config.packet_log_interval.max(1) == 0 {
                log::info!(
                    "{self}: rtp received packet count {} ({} bytes)",
                    counts.rtp_packets_received,
                    counts.rtp_bytes_received
                );
            }
        }

        let level = self.level();
        if let Some(encrypted) = &packet.encrypted_data {
            self.packet_dumper
                .dump(level, PacketDumpType::Srtp, false, encrypted);
        }
        self.packet_dumper
            .dump(level, PacketDumpType::Rtp, false, &packet.data);

        log::trace!(
            "{self}: received rtp seq={} ssrc={}",
            rtp_packet.header.sequence_number,
            rtp_packet.header.ssrc
        );
        self.rtp_receive_event.notify(RtpPacketReceived {
            packet: rtp_packet,
            arrival_time: now,
        });
    }

    fn rtcp_packet_received(&self, slot: &Arc<Mutex<MediaPacket>>) {
        // first pipeline on the transport takes the packet; the others see it empty
        let packet = slot.lock().take();
        if packet.is_empty() {
            return;
        }

        let level = self.level();
        {
            let mut internal = self.internal.lock();
            internal.counts.rtcp_packets_received += 1;
        }
        if let Some(encrypted) = &packet.encrypted_data {
            self.packet_dumper
                .dump(level, PacketDumpType::Srtcp, false, encrypted);
        }
        self.packet_dumper
            .dump(level, PacketDumpType::Rtcp, false, &packet.data);

        if self.config.load().force_disable_rtcp_reception {
            log::debug!("{self}: rtcp reception disabled, dropping packet");
            return;
        }

        log::trace!("{self}: received rtcp, {} bytes", packet.len());
        self.rtcp_receive_event.notify(packet);
    }

    /// Dumps a packet the transport protected for sending on our transport.
    pub fn encrypted_packet_sending(&self, transport_id: &str, packet: &MediaPacket) {
        if self.internal.lock().transport_id != transport_id {
            return;
        }
        let typ = match packet.typ {
            MediaPacketType::Srtp => PacketDumpType::Srtp,
            MediaPacketType::Srtcp => PacketDumpType::Srtcp,
            MediaPacketType::Dtls => return,
            other => {
                log::debug!("{self}: unexpected {other} in encrypted sending");
                return;
            }
        };
        self.packet_dumper.dump(self.level(), typ, true, &packet.data);
    }

    /// Contributing sources seen within the stats window.
    pub fn get_contributing_source_stats(
        &self,
        inbound_rtp_stream_id: &str,
    ) -> Vec<ContributingSourceStats> {
        let now = SystemTime::now();
        let window = self.config.load().csrc_stats_window;
        let internal = self.internal.lock();
        let mut stats: Vec<ContributingSourceStats> = internal
            .csrc_stats
            .values()
            .filter(|stats| !stats.expired(now, window))
            .map(|stats| stats.get_stats(inbound_rtp_stream_id))
            .collect();
        stats.sort_by_key(|s| s.contributor_ssrc);
        stats
    }

    /// Stops mirroring the active flag and detaches from the transport on
    /// the STS queue.
    pub fn shutdown(&self) -> Result<()> {
        self.mirror_connected.store(false, Ordering::SeqCst);
        let weak = self.weak_self.clone();
        self.sts_queue.post(move || {
            if let Some(pipeline) = weak.upgrade() {
                pipeline.detach_transport();
            }
        })
    }

    fn detach_transport(&self) {
        log::info!("{self}: detaching transport");

        let listeners = {
            let mut internal = self.internal.lock();
            internal.states = TransportStates::default();
            internal.ready = false;
            internal.transport_id.clear();

            let mut listeners = std::mem::take(&mut internal.send_listeners);
            listeners.append(&mut internal.conduit_listeners);
            listeners.append(&mut internal.transport_listeners);
            listeners
        };
        self.conduit.set_transport_active(false);
        drop(listeners);

        self.rtp_receive_event.disconnect_all();
        self.rtcp_receive_event.disconnect_all();
        self.transport_ready.disconnect_all();
    }
}
