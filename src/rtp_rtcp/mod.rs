
pub mod counters;
pub(crate) mod nack_tracker;
pub(crate) mod packet_history;
pub mod receive_statistics;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use parking_lot::Mutex;
use rtcp::goodbye::Goodbye;
use rtcp::receiver_report::ReceiverReport;
use rtcp::reception_report::ReceptionReport;
use rtcp::sender_report::SenderReport;
use rtcp::source_description::{
    SdesType, SourceDescription, SourceDescriptionChunk, SourceDescriptionItem,
};
use rtcp::transport_feedbacks::transport_layer_nack::{
    nack_pairs_from_sequence_numbers, TransportLayerNack,
};
use rtp::extension::abs_capture_time_extension::AbsoluteCaptureTimeExtension;
use rtp::extension::abs_send_time_extension::{unix2ntp, AbsSendTimeExtension};
use rtp::extension::audio_level_extension::AudioLevelExtension;
use rtp::extension::extension_map::ExtensionMap;
use rtp::extension::transport_cc_extension::TransportSequenceNumberExtension;
use rtp::extension::ExtensionKind;
use rtp::header::Header;
use rtp::packet::Packet;
use rtp::sequence::{new_random_sequencer, Sequencer, SequencerImpl};
use tokio::sync::mpsc;
use util::marshal::Marshal;
use waitgroup::WaitGroup;

pub use counters::{ReportBlockData, RtcpPacketTypeCounter, RtpPacketCounter, StreamDataCounters};
pub use receive_statistics::ReceiveStreamStats;

use crate::error::{Error, Result};
use crate::event::MediaEventProducer;
use crate::frame_transformer::AudioFrameType;
use crate::media_packet::{MediaPacket, MediaPacketType};
use nack_tracker::NackTracker;
use packet_history::PacketHistory;
use receive_statistics::StreamStatistician;

/// Default interval between compound RTCP reports for audio.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// A report carries at most 31 reception report blocks.
const MAX_REPORT_BLOCKS: usize = 31;

const MAX_CNAME_LEN: usize = 255;

pub type FnTimeGen = Arc<dyn Fn() -> SystemTime + Send + Sync + 'static>;

type RtcpPackets = Vec<Box<dyn rtcp::packet::Packet + Send + Sync>>;

/// Configuration of one RTP/RTCP module.
#[derive(Clone)]
pub struct RtpRtcpConfig {
    pub ssrc: u32,
    /// Zero disables periodic reports.
    pub report_interval: Duration,
    /// Alternative clock, for tests.
    pub now: Option<FnTimeGen>,
}

impl Default for RtpRtcpConfig {
    fn default() -> Self {
        RtpRtcpConfig {
            ssrc: rand::random::<u32>(),
            report_interval: DEFAULT_REPORT_INTERVAL,
            now: None,
        }
    }
}

/// One encoded audio frame handed to the RTP sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpAudioFrame {
    pub frame_type: AudioFrameType,
    pub payload: Bytes,
    pub payload_type: u8,
    /// Timestamp including the module's start offset.
    pub rtp_timestamp: u32,
    pub csrcs: Vec<u32>,
    pub capture_time_ms: Option<i64>,
    /// Audio level in -dBov.
    pub audio_level_dbov: Option<u8>,
}

struct RtpRtcpState {
    ssrc: u32,
    start_timestamp: u32,
    sequencer: SequencerImpl,
    sending: bool,
    sending_media: bool,
    send_extensions: ExtensionMap,
    payload_frequencies: HashMap<u8, u32>,
    cname: String,
    history: Option<PacketHistory>,
    counters: StreamDataCounters,
    transport_sequence_number: u16,

    last_payload_type: Option<u8>,
    last_rtp_timestamp: u32,
    last_frame_time: Option<SystemTime>,
    last_frame_speech: bool,
    last_sent_payload_type: Option<u8>,

    statisticians: HashMap<u32, StreamStatistician>,
    nack_max_packets: Option<u16>,
    nack_trackers: HashMap<u32, NackTracker>,

    report_blocks: HashMap<u32, ReportBlockData>,
    last_rtt: Option<Duration>,
    rtcp_counter: RtcpPacketTypeCounter,
}

impl RtpRtcpState {
    fn build_report(&mut self, now: SystemTime, bye: bool) -> RtcpPackets {
        let mut ssrcs: Vec<u32> = self
            .statisticians
            .iter()
            .filter(|(_, s)| s.has_received())
            .map(|(ssrc, _)| *ssrc)
            .collect();
        ssrcs.sort_unstable();
        let mut reports: Vec<ReceptionReport> = vec![];
        for ssrc in ssrcs.into_iter().take(MAX_REPORT_BLOCKS) {
            if let Some(statistician) = self.statisticians.get_mut(&ssrc) {
                reports.push(statistician.generate_report(now));
            }
        }

        let mut packets: RtcpPackets = vec![];
        if self.sending {
            packets.push(Box::new(SenderReport {
                ssrc: self.ssrc,
                ntp_time: unix2ntp(now),
                rtp_time: self.rtp_time_at(now),
                packet_count: self.counters.transmitted.packets as u32,
                octet_count: self.counters.transmitted.payload_bytes as u32,
                reports,
                ..Default::default()
            }));
        } else {
            packets.push(Box::new(ReceiverReport {
                ssrc: self.ssrc,
                reports,
                ..Default::default()
            }));
        }

        if !self.cname.is_empty() {
            packets.push(Box::new(SourceDescription {
                chunks: vec![SourceDescriptionChunk {
                    source: self.ssrc,
                    items: vec![SourceDescriptionItem {
                        sdes_type: SdesType::SdesCname,
                        text: Bytes::from(self.cname.clone()),
                    }],
                }],
            }));
        }

        if self.nack_max_packets.is_some() {
            let mut media_ssrcs: Vec<u32> = self.nack_trackers.keys().copied().collect();
            media_ssrcs.sort_unstable();
            for media_ssrc in media_ssrcs {
                let missing = match self.nack_trackers.get(&media_ssrc) {
                    Some(tracker) => tracker.missing_seq_numbers(0),
                    None => continue,
                };
                if missing.is_empty() {
                    continue;
                }
                self.rtcp_counter.nack_packets_sent += 1;
                packets.push(Box::new(TransportLayerNack {
                    sender_ssrc: self.ssrc,
                    media_ssrc,
                    nacks: nack_pairs_from_sequence_numbers(&missing),
                }));
            }
        }

        if bye {
            packets.push(Box::new(Goodbye {
                sources: vec![self.ssrc],
                reason: Bytes::new(),
            }));
        }

        packets
    }

    /// Extrapolates the RTP clock of the last sent frame to `now`.
    fn rtp_time_at(&self, now: SystemTime) -> u32 {
        let clock_rate = self
            .last_payload_type
            .and_then(|pt| self.payload_frequencies.get(&pt).copied())
            .unwrap_or(0);
        match self.last_frame_time {
            Some(t) => {
                let elapsed = now.duration_since(t).unwrap_or_default().as_secs_f64();
                self.last_rtp_timestamp
                    .wrapping_add((elapsed * clock_rate as f64) as u32)
            }
            None => self.start_timestamp,
        }
    }

    fn handle_rtcp(
        &mut self,
        now: SystemTime,
        packet: &(dyn rtcp::packet::Packet + Send + Sync),
        retransmit: &mut Vec<Packet>,
    ) {
        let any = packet.as_any();
        if let Some(sr) = any.downcast_ref::<SenderReport>() {
            if sr.ssrc != self.ssrc {
                self.statisticians
                    .entry(sr.ssrc)
                    .or_insert_with(|| StreamStatistician::new(sr.ssrc, 0))
                    .process_sender_report(now, sr);
            }
            self.handle_report_blocks(now, sr.ssrc, &sr.reports);
        } else if let Some(rr) = any.downcast_ref::<ReceiverReport>() {
            self.handle_report_blocks(now, rr.ssrc, &rr.reports);
        } else if let Some(nack) = any.downcast_ref::<TransportLayerNack>() {
            self.handle_nack(nack, retransmit);
        } else if let Some(bye) = any.downcast_ref::<Goodbye>() {
            log::debug!("rtcp bye from {:?}", bye.sources);
        } else if let Some(compound) =
            any.downcast_ref::<rtcp::compound_packet::CompoundPacket>()
        {
            for p in &compound.0 {
                self.handle_rtcp(now, p.as_ref(), retransmit);
            }
        } else {
            log::trace!("ignoring rtcp packet {}", packet.header().packet_type);
        }
    }

    fn handle_report_blocks(&mut self, now: SystemTime, sender_ssrc: u32, blocks: &[ReceptionReport]) {
        let ssrc = self.ssrc;
        for block in blocks.iter().filter(|b| b.ssrc == ssrc) {
            let data = self.report_blocks.entry(sender_ssrc).or_default();
            data.set_report_block(sender_ssrc, block, now);

            if block.last_sender_report == 0 {
                continue;
            }
            // all three values are in 1/65536 s
            let now_compact = (unix2ntp(now) >> 16) as u32;
            let rtt_units = now_compact
                .wrapping_sub(block.last_sender_report)
                .wrapping_sub(block.delay);
            let rtt = if rtt_units > i32::MAX as u32 {
                Duration::ZERO
            } else {
                Duration::from_secs_f64(rtt_units as f64 / 65536.0)
            }
            .max(Duration::from_millis(1));

            data.add_rtt(rtt);
            self.last_rtt = Some(rtt);
        }
    }

    fn handle_nack(&mut self, nack: &TransportLayerNack, retransmit: &mut Vec<Packet>) {
        if nack.media_ssrc != self.ssrc {
            return;
        }
        self.rtcp_counter.nack_packets += 1;

        for pair in &nack.nacks {
            for seq in pair.packet_list() {
                self.rtcp_counter.nack_requests += 1;
                let packet = match self.history.as_ref().and_then(|h| h.get(seq)) {
                    Some(p) => p.clone(),
                    None => {
                        self.rtcp_counter.nack_requests_missed += 1;
                        continue;
                    }
                };
                self.counters.transmitted.add_packet(&packet);
                self.counters.retransmitted.add_packet(&packet);
                retransmit.push(packet);
            }
        }
    }
}

struct RtpRtcpInternal {
    state: Mutex<RtpRtcpState>,
    now: Option<FnTimeGen>,
    rtp_sent: MediaEventProducer<MediaPacket>,
    rtcp_sent: MediaEventProducer<MediaPacket>,
}

impl RtpRtcpInternal {
    fn now(&self) -> SystemTime {
        match &self.now {
            Some(f) => f(),
            None => SystemTime::now(),
        }
    }

    fn send_report(&self, now: SystemTime, bye: bool) -> Result<()> {
        let packets = {
            let mut state = self.state.lock();
            state.build_report(now, bye)
        };
        self.emit_rtcp(&packets)
    }

    fn emit_rtcp(&self, packets: &[Box<dyn rtcp::packet::Packet + Send + Sync>]) -> Result<()> {
        let data = rtcp::packet::marshal(packets)?;
        log::trace!("sending {} rtcp packets, {} bytes", packets.len(), data.len());
        self.rtcp_sent
            .notify(MediaPacket::new(MediaPacketType::Rtcp, data));
        Ok(())
    }

    fn emit_rtp(&self, packet: &Packet) -> Result<()> {
        let data = packet.marshal()?;
        self.rtp_sent.notify(MediaPacket::new(MediaPacketType::Rtp, data));
        Ok(())
    }

    async fn run(internal: Arc<RtpRtcpInternal>, interval: Duration, mut close_rx: mpsc::Receiver<()>) {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = internal.now();
                    if let Err(err) = internal.send_report(now, false) {
                        log::warn!("failed sending rtcp report: {err}");
                    }
                }
                _ = close_rx.recv() => {
                    return;
                }
            }
        }
    }
}

/// RtpRtcp is the RTP/RTCP module of one channel. It packetizes outgoing
/// frames, keeps send and receive statistics, and produces and consumes the
/// compound RTCP reports of its stream.
///
/// Outbound packets are published on `rtp_packet_sent` and
/// `rtcp_packet_sent`.
pub struct RtpRtcp {
    internal: Arc<RtpRtcpInternal>,

    wg: Mutex<Option<WaitGroup>>,
    close_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl RtpRtcp {
    /// Creates the module and starts its report worker. Must be called
    /// within a tokio runtime.
    pub fn new(config: RtpRtcpConfig) -> Self {
        let internal = Arc::new(RtpRtcpInternal {
            state: Mutex::new(RtpRtcpState {
                ssrc: config.ssrc,
                start_timestamp: rand::random::<u32>(),
                sequencer: new_random_sequencer(),
                sending: false,
                sending_media: false,
                send_extensions: ExtensionMap::new(),
                payload_frequencies: HashMap::new(),
                cname: String::new(),
                history: None,
                counters: StreamDataCounters::default(),
                transport_sequence_number: 0,
                last_payload_type: None,
                last_rtp_timestamp: 0,
                last_frame_time: None,
                last_frame_speech: false,
                last_sent_payload_type: None,
                statisticians: HashMap::new(),
                nack_max_packets: None,
                nack_trackers: HashMap::new(),
                report_blocks: HashMap::new(),
                last_rtt: None,
                rtcp_counter: RtcpPacketTypeCounter::default(),
            }),
            now: config.now,
            rtp_sent: MediaEventProducer::new(),
            rtcp_sent: MediaEventProducer::new(),
        });

        let wg = WaitGroup::new();
        let (close_tx, close_rx) = mpsc::channel(1);
        if !config.report_interval.is_zero() {
            let worker = wg.worker();
            let internal2 = Arc::clone(&internal);
            let interval = config.report_interval;
            tokio::spawn(async move {
                let _d = worker;
                RtpRtcpInternal::run(internal2, interval, close_rx).await;
            });
        }

        RtpRtcp {
            internal,
            wg: Mutex::new(Some(wg)),
            close_tx: Mutex::new(Some(close_tx)),
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.internal.state.lock().ssrc
    }

    /// Random offset added to every outgoing RTP timestamp.
    pub fn start_timestamp(&self) -> u32 {
        self.internal.state.lock().start_timestamp
    }

    pub fn rtp_packet_sent(&self) -> &MediaEventProducer<MediaPacket> {
        &self.internal.rtp_sent
    }

    pub fn rtcp_packet_sent(&self) -> &MediaEventProducer<MediaPacket> {
        &self.internal.rtcp_sent
    }

    pub fn sending(&self) -> bool {
        self.internal.state.lock().sending
    }

    /// Switches between sender and receiver reports. Leaving the sending
    /// state sends a final report followed by an RTCP BYE.
    pub fn set_sending_status(&self, sending: bool) -> Result<()> {
        let was_sending = {
            let mut state = self.internal.state.lock();
            let was_sending = state.sending;
            if sending {
                state.sending = true;
            }
            was_sending
        };

        if was_sending && !sending {
            let now = self.internal.now();
            let result = self.internal.send_report(now, true);
            self.internal.state.lock().sending = false;
            result?;
        }
        Ok(())
    }

    pub fn sending_media(&self) -> bool {
        self.internal.state.lock().sending_media
    }

    pub fn set_sending_media_status(&self, sending: bool) {
        self.internal.state.lock().sending_media = sending;
    }

    pub fn register_send_payload_frequency(&self, payload_type: u8, frequency: u32) {
        self.internal
            .state
            .lock()
            .payload_frequencies
            .insert(payload_type, frequency);
    }

    pub fn register_rtp_header_extension(&self, kind: ExtensionKind, id: u8) -> Result<()> {
        self.internal
            .state
            .lock()
            .send_extensions
            .register(kind, id)?;
        Ok(())
    }

    pub fn deregister_send_rtp_header_extension(&self, uri: &str) -> Option<u8> {
        self.internal.state.lock().send_extensions.deregister(uri)
    }

    pub fn send_extensions(&self) -> ExtensionMap {
        self.internal.state.lock().send_extensions.clone()
    }

    /// Sets the SDES CNAME, truncated to 255 bytes.
    pub fn set_cname(&self, cname: &str) {
        let mut end = cname.len().min(MAX_CNAME_LEN);
        while !cname.is_char_boundary(end) {
            end -= 1;
        }
        self.internal.state.lock().cname = cname[..end].to_owned();
    }

    pub fn cname(&self) -> String {
        self.internal.state.lock().cname.clone()
    }

    /// Enables the retransmission history with room for `number` packets.
    pub fn set_store_packets_status(&self, enable: bool, number: u16) {
        self.internal.state.lock().history = if enable {
            Some(PacketHistory::new(number))
        } else {
            None
        };
    }

    /// Records the timing of a frame about to be sent, for sender reports.
    /// `rtp_timestamp` excludes the start offset. Returns false while not
    /// sending.
    pub fn on_sending_rtp_frame(
        &self,
        rtp_timestamp: u32,
        capture_time_ms: Option<i64>,
        payload_type: u8,
        force_sender_report: bool,
    ) -> bool {
        let now = self.internal.now();
        {
            let mut state = self.internal.state.lock();
            if !state.sending {
                return false;
            }
            state.last_rtp_timestamp = rtp_timestamp.wrapping_add(state.start_timestamp);
            state.last_frame_time = Some(now);
            state.last_payload_type = Some(payload_type);
        }
        log::trace!("frame ts {rtp_timestamp} captured at {capture_time_ms:?}");

        if force_sender_report {
            if let Err(err) = self.internal.send_report(now, false) {
                log::warn!("failed sending forced sender report: {err}");
            }
        }
        true
    }

    /// Packetizes one encoded audio frame and publishes it. Empty frames
    /// (DTX) are skipped.
    pub fn send_audio(&self, frame: RtpAudioFrame) -> Result<()> {
        let now = self.internal.now();
        let packet = {
            let mut guard = self.internal.state.lock();
            let state = &mut *guard;
            if !state.sending_media {
                return Err(Error::ErrNotSending);
            }
            if frame.payload.is_empty() {
                return Ok(());
            }

            let speech = frame.frame_type == AudioFrameType::Speech;
            // first packet of a talkspurt, or after a payload type switch
            let marker = speech
                && (!state.last_frame_speech
                    || state.last_sent_payload_type != Some(frame.payload_type));
            state.last_frame_speech = speech;
            state.last_sent_payload_type = Some(frame.payload_type);

            let mut header = Header {
                version: 2,
                marker,
                payload_type: frame.payload_type,
                sequence_number: state.sequencer.next_sequence_number(),
                timestamp: frame.rtp_timestamp,
                ssrc: state.ssrc,
                csrc: frame.csrcs,
                ..Default::default()
            };

            let extensions = &state.send_extensions;
            if let Some(level) = frame.audio_level_dbov {
                if extensions.is_registered(ExtensionKind::AudioLevel) {
                    header.set_extension_value(
                        extensions,
                        &AudioLevelExtension {
                            level,
                            voice: speech,
                        },
                    )?;
                }
            }
            if extensions.is_registered(ExtensionKind::AbsSendTime) {
                header.set_extension_value(extensions, &AbsSendTimeExtension::new(now))?;
            }
            if extensions.is_registered(ExtensionKind::TransportSequenceNumber) {
                header.set_extension_value(
                    extensions,
                    &TransportSequenceNumberExtension {
                        transport_sequence: state.transport_sequence_number,
                    },
                )?;
                state.transport_sequence_number = state.transport_sequence_number.wrapping_add(1);
            }
            if let Some(ms) = frame.capture_time_ms.filter(|ms| *ms > 0) {
                if extensions.is_registered(ExtensionKind::AbsoluteCaptureTime) {
                    let capture_time = UNIX_EPOCH + Duration::from_millis(ms as u64);
                    header.set_extension_value(
                        extensions,
                        &AbsoluteCaptureTimeExtension::new(capture_time),
                    )?;
                }
            }

            let packet = Packet {
                header,
                payload: frame.payload,
                padding_size: 0,
            };
            if let Some(history) = &mut state.history {
                history.add(&packet);
            }
            state.counters.first_packet_time.get_or_insert(now);
            state.counters.transmitted.add_packet(&packet);
            packet
        };

        log::debug!(
            "sending rtp ssrc {} seq {} ts {} ({} bytes)",
            packet.header.ssrc,
            packet.header.sequence_number,
            packet.header.timestamp,
            packet.payload.len()
        );
        self.internal.emit_rtp(&packet)
    }

    /// Generates and publishes a compound report now.
    pub fn send_rtcp_report(&self) -> Result<()> {
        let now = self.internal.now();
        self.internal.send_report(now, false)
    }

    /// Feeds a received RTP packet into the receive statistics.
    pub fn incoming_rtp_packet(&self, packet: &Packet, clock_rate: u32, arrival: SystemTime) {
        let mut guard = self.internal.state.lock();
        let state = &mut *guard;
        let ssrc = packet.header.ssrc;
        let statistician = state
            .statisticians
            .entry(ssrc)
            .or_insert_with(|| StreamStatistician::new(ssrc, clock_rate));
        statistician.set_clock_rate(clock_rate);
        statistician.process_rtp(arrival, packet);

        if let Some(max_packets) = state.nack_max_packets {
            state
                .nack_trackers
                .entry(ssrc)
                .or_insert_with(|| NackTracker::new(max_packets))
                .add(packet.header.sequence_number);
        }
    }

    /// Parses a compound RTCP packet: reports about our stream update RTT
    /// and report blocks, NACKs are answered from the packet history and
    /// sender reports from the remote side feed LSR/DLSR.
    pub fn incoming_rtcp_packet(&self, data: &[u8]) -> Result<()> {
        let now = self.internal.now();
        let mut buf = Bytes::copy_from_slice(data);
        let packets = rtcp::packet::unmarshal(&mut buf)?;

        let mut retransmit = vec![];
        {
            let mut state = self.internal.state.lock();
            for packet in &packets {
                state.handle_rtcp(now, packet.as_ref(), &mut retransmit);
            }
        }

        for packet in &retransmit {
            log::debug!("retransmitting seq {}", packet.header.sequence_number);
            self.internal.emit_rtp(packet)?;
        }
        Ok(())
    }

    /// Enables NACK generation for received streams, tracking up to
    /// `max_packets` sequence numbers each.
    pub fn set_nack_status(&self, enable: bool, max_packets: u16) {
        let mut state = self.internal.state.lock();
        if enable {
            state.nack_max_packets = Some(max_packets);
        } else {
            state.nack_max_packets = None;
            state.nack_trackers.clear();
        }
    }

    pub fn nack_enabled(&self) -> bool {
        self.internal.state.lock().nack_max_packets.is_some()
    }

    pub fn last_rtt(&self) -> Option<Duration> {
        self.internal.state.lock().last_rtt
    }

    pub fn get_latest_report_block_data(&self) -> Vec<ReportBlockData> {
        let state = self.internal.state.lock();
        let mut blocks: Vec<ReportBlockData> = state.report_blocks.values().cloned().collect();
        blocks.sort_by_key(|b| b.sender_ssrc);
        blocks
    }

    pub fn get_send_stream_data_counters(&self) -> StreamDataCounters {
        self.internal.state.lock().counters
    }

    pub fn rtcp_packet_type_counter(&self) -> RtcpPacketTypeCounter {
        self.internal.state.lock().rtcp_counter
    }

    pub fn receive_statistics(&self, ssrc: u32) -> Option<ReceiveStreamStats> {
        self.internal
            .state
            .lock()
            .statisticians
            .get(&ssrc)
            .filter(|s| s.has_received())
            .map(|s| s.stats())
    }

    /// Every remote SSRC RTP was received from, in ascending order.
    pub fn remote_ssrcs(&self) -> Vec<u32> {
        let state = self.internal.state.lock();
        let mut ssrcs: Vec<u32> = state
            .statisticians
            .iter()
            .filter(|(_, s)| s.has_received())
            .map(|(ssrc, _)| *ssrc)
            .collect();
        ssrcs.sort_unstable();
        ssrcs
    }

    /// Stops the report worker and waits for it to exit.
    pub async fn close(&self) -> Result<()> {
        {
            let mut close_tx = self.close_tx.lock();
            close_tx.take();
        }
        let wg = self.wg.lock().take();
        if let Some(wg) = wg {
            wg.wait().await;
        }
        Ok(())
    }
}
