use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use rtp::extension::audio_level_extension::AudioLevelExtension;
use rtp::extension::csrc_audio_level_extension::CsrcAudioLevelExtension;
use rtp::extension::extension_map::ExtensionMap;
use rtp::extension::ExtensionKind;
use rtp::packet::Packet;

use super::codec::{AudioDecoder, AudioDecoderFactory, BuiltinAudioDecoderFactory, SdpAudioFormat};
use super::statistics::{CallReceiveStatistics, RtpSource, RtpSourceType};
use crate::audio::audio_converter::{AudioConfig, AudioConverter};
use crate::audio::audio_proxy::AudioFrameSink;
use crate::audio::jitter_buffer::{JitterBuffer, JitterBufferConfig, JitterOutput, JitterPacket};
use crate::audio::{samples_per_10ms, AudioFrame};
use crate::crypto::{CryptoOptions, FrameDecryptor};
use crate::error::{Error, Result};
use crate::event::MediaEventProducer;
use crate::frame_transformer::{
    FrameSender, FrameTransformer, FrameTransformerDelegate, TransformableAudioFrame,
    TransformableFrame,
};
use crate::media_packet::MediaPacket;
use crate::rtp_rtcp::{RtpRtcp, RtpRtcpConfig, DEFAULT_REPORT_INTERVAL};
use crate::task_queue::TaskQueue;

/// Sources older than this are no longer reported by `get_sources`.
pub const SOURCE_WINDOW: Duration = Duration::from_secs(10);

/// ChannelReceiveConfig configures a ChannelReceive.
#[derive(Clone)]
pub struct ChannelReceiveConfig {
    /// SSRC used for our own receiver reports.
    pub local_ssrc: u32,
    pub rtcp_report_interval: Duration,
    pub crypto_options: CryptoOptions,
    pub jitter_buffer: JitterBufferConfig,
    /// Zero disables NACK generation.
    pub nack_max_packets: u16,
    pub decoder_factory: Arc<dyn AudioDecoderFactory>,
}

impl fmt::Debug for ChannelReceiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelReceiveConfig")
            .field("local_ssrc", &self.local_ssrc)
            .field("rtcp_report_interval", &self.rtcp_report_interval)
            .field("crypto_options", &self.crypto_options)
            .field("jitter_buffer", &self.jitter_buffer)
            .field("nack_max_packets", &self.nack_max_packets)
            .finish()
    }
}

impl Default for ChannelReceiveConfig {
    fn default() -> Self {
        ChannelReceiveConfig {
            local_ssrc: rand::random::<u32>(),
            rtcp_report_interval: DEFAULT_REPORT_INTERVAL,
            crypto_options: CryptoOptions::default(),
            jitter_buffer: JitterBufferConfig::default(),
            nack_max_packets: 0,
            decoder_factory: Arc::new(BuiltinAudioDecoderFactory),
        }
    }
}

impl ChannelReceiveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_ssrc(mut self, ssrc: u32) -> Self {
        self.local_ssrc = ssrc;
        self
    }

    pub fn with_rtcp_report_interval(mut self, interval: Duration) -> Self {
        self.rtcp_report_interval = interval;
        self
    }

    pub fn with_crypto_options(mut self, crypto_options: CryptoOptions) -> Self {
        self.crypto_options = crypto_options;
        self
    }

    pub fn with_jitter_buffer(mut self, jitter_buffer: JitterBufferConfig) -> Self {
        self.jitter_buffer = jitter_buffer;
        self
    }

    pub fn with_nack_max_packets(mut self, max_packets: u16) -> Self {
        self.nack_max_packets = max_packets;
        self
    }

    pub fn with_decoder_factory(mut self, factory: Arc<dyn AudioDecoderFactory>) -> Self {
        self.decoder_factory = factory;
        self
    }
}

struct PlayoutState {
    codecs: HashMap<u8, SdpAudioFormat>,
    decoders: HashMap<u8, Box<dyn AudioDecoder>>,
    jitter_buffer: JitterBuffer,
    /// Decoded samples not yet played, interleaved at `decoded_config`.
    decoded: VecDeque<i16>,
    decoded_config: Option<AudioConfig>,
    converter: Option<AudioConverter>,
    last_payload_type: Option<u8>,
    playout_timestamp: u32,
}

impl PlayoutState {
    fn decoder(
        &mut self,
        factory: &dyn AudioDecoderFactory,
        payload_type: u8,
    ) -> Option<&mut Box<dyn AudioDecoder>> {
        if !self.decoders.contains_key(&payload_type) {
            let format = self.codecs.get(&payload_type)?;
            let decoder = factory.make_audio_decoder(format)?;
            self.decoders.insert(payload_type, decoder);
        }
        self.decoders.get_mut(&payload_type)
    }

    /// Appends decoded output, dropping leftovers of another format.
    fn push_decoded(&mut self, config: AudioConfig, samples: Vec<i16>) {
        if self.decoded_config != Some(config) {
            self.decoded.clear();
            self.decoded_config = Some(config);
        }
        self.decoded.extend(samples);
    }

    /// Decodes or conceals the next packet out of the jitter buffer. Returns
    /// false once the buffer has nothing to give.
    fn decode_next(&mut self, factory: &dyn AudioDecoderFactory) -> Result<bool> {
        let (pt, payload) = match self.jitter_buffer.pop() {
            Some(JitterOutput::Packet(packet)) => {
                self.last_payload_type = Some(packet.payload_type);
                self.playout_timestamp = packet.timestamp;
                (packet.payload_type, Some(packet.payload))
            }
            Some(JitterOutput::Lost { sequence_number }) => {
                log::trace!("concealing lost packet {sequence_number}");
                match self.last_payload_type {
                    Some(pt) => (pt, None),
                    None => return Ok(true),
                }
            }
            None => return Ok(false),
        };

        let decoder = self.decoder(factory, pt).ok_or(Error::ErrNoDecoder(pt))?;
        let config = AudioConfig::new(decoder.num_channels(), decoder.sample_rate_hz());
        let mut samples = vec![];
        let result = match payload {
            Some(payload) => decoder.decode(&payload, &mut samples).map(|_| ()),
            None => {
                decoder.packet_loss_concealment(&mut samples);
                Ok(())
            }
        };
        if result.is_err() {
            samples.clear();
            decoder.packet_loss_concealment(&mut samples);
        }
        self.push_decoded(config, samples);
        result.map(|_| true)
    }

    fn flush(&mut self) {
        self.jitter_buffer.flush();
        self.decoded.clear();
        self.decoded_config = None;
        self.converter = None;
        for decoder in self.decoders.values_mut() {
            decoder.reset();
        }
    }
}

struct ChannelReceiveInternal {
    rtp_rtcp: RtpRtcp,
    worker_queue: TaskQueue,
    crypto_options: CryptoOptions,
    decoder_factory: Arc<dyn AudioDecoderFactory>,

    playout: Mutex<PlayoutState>,
    receive_extensions: Mutex<ExtensionMap>,
    sources: Mutex<HashMap<(RtpSourceType, u32), RtpSource>>,
    remote_ssrc: Mutex<Option<u32>>,
    frame_decryptor: Mutex<Option<Arc<dyn FrameDecryptor>>>,
    frame_transformer_delegate: Mutex<Option<Arc<FrameTransformerDelegate>>>,
    sink: Mutex<Option<Arc<dyn AudioFrameSink>>>,

    playing: AtomicBool,
    concealed_packets: AtomicU64,
    decrypt_failures: AtomicU64,
}

impl ChannelReceiveInternal {
    fn update_sources(&self, packet: &Packet, arrival: SystemTime) {
        let (level, csrc_levels) = {
            let extensions = self.receive_extensions.lock();
            (
                packet
                    .header
                    .get_extension_value::<AudioLevelExtension>(&extensions)
                    .map(|e| e.level),
                packet
                    .header
                    .get_extension_value::<CsrcAudioLevelExtension>(&extensions)
                    .map(|e| e.levels)
                    .unwrap_or_default(),
            )
        };

        let mut sources = self.sources.lock();
        sources.insert(
            (RtpSourceType::Ssrc, packet.header.ssrc),
            RtpSource {
                source_id: packet.header.ssrc,
                source_type: RtpSourceType::Ssrc,
                timestamp: arrival,
                rtp_timestamp: packet.header.timestamp,
                audio_level: level,
            },
        );
        for (i, csrc) in packet.header.csrc.iter().enumerate() {
            sources.insert(
                (RtpSourceType::Csrc, *csrc),
                RtpSource {
                    source_id: *csrc,
                    source_type: RtpSourceType::Csrc,
                    timestamp: arrival,
                    rtp_timestamp: packet.header.timestamp,
                    audio_level: csrc_levels.get(i).copied(),
                },
            );
        }
        sources.retain(|_, s| {
            arrival
                .duration_since(s.timestamp)
                .map_or(true, |age| age <= SOURCE_WINDOW)
        });
    }

    fn decrypt(&self, csrcs: &[u32], payload: Bytes) -> Result<Bytes> {
        if payload.is_empty() {
            return Ok(payload);
        }
        let decryptor = self.frame_decryptor.lock().clone();
        match decryptor {
            Some(decryptor) => {
                let mut decrypted = vec![0u8; decryptor.max_plaintext_byte_size(payload.len())];
                match decryptor.decrypt(csrcs, &payload, &mut decrypted) {
                    Ok(written) => {
                        decrypted.truncate(written);
                        Ok(decrypted.into())
                    }
                    Err(err) => {
                        self.decrypt_failures.fetch_add(1, Ordering::SeqCst);
                        Err(Error::ErrDecryptionFailed(err.to_string()))
                    }
                }
            }
            None if self.crypto_options.require_frame_encryption => {
                Err(Error::ErrDecryptorRequired)
            }
            None => Ok(payload),
        }
    }

    fn on_received_payload(&self, packet: JitterPacket) {
        if !self.playing.load(Ordering::SeqCst) {
            return;
        }
        // DTX
        if packet.payload.is_empty() {
            return;
        }
        let sequence_number = packet.sequence_number;
        if !self.playout.lock().jitter_buffer.insert(packet) {
            log::trace!("jitter buffer rejected seq {sequence_number}");
        }
    }

    fn frame_sender(weak: Weak<ChannelReceiveInternal>) -> FrameSender {
        Arc::new(move |frame: TransformableFrame| {
            let internal = match weak.upgrade() {
                Some(internal) => internal,
                None => return,
            };
            let frame = frame.into_audio();
            let sequence_number = match frame.sequence_number {
                Some(seq) => seq,
                None => {
                    log::warn!("transformed frame without sequence number dropped");
                    return;
                }
            };
            internal.on_received_payload(JitterPacket {
                sequence_number,
                timestamp: frame.rtp_timestamp,
                payload_type: frame.payload_type,
                payload: frame.data().clone(),
            });
        })
    }
}

/// ChannelReceive accounts, decrypts and buffers received RTP, and decodes
/// it on playout pulls.
pub struct ChannelReceive {
    internal: Arc<ChannelReceiveInternal>,
}

impl ChannelReceive {
    /// Creates the channel. Must be called within a tokio runtime.
    pub fn new(config: ChannelReceiveConfig) -> Self {
        let rtp_rtcp = RtpRtcp::new(RtpRtcpConfig {
            ssrc: config.local_ssrc,
            report_interval: config.rtcp_report_interval,
            now: None,
        });
        if config.nack_max_packets > 0 {
            rtp_rtcp.set_nack_status(true, config.nack_max_packets);
        }

        ChannelReceive {
            internal: Arc::new(ChannelReceiveInternal {
                rtp_rtcp,
                worker_queue: TaskQueue::new("AudioReceive"),
                crypto_options: config.crypto_options,
                decoder_factory: config.decoder_factory,
                playout: Mutex::new(PlayoutState {
                    codecs: HashMap::new(),
                    decoders: HashMap::new(),
                    jitter_buffer: JitterBuffer::new(config.jitter_buffer),
                    decoded: VecDeque::new(),
                    decoded_config: None,
                    converter: None,
                    last_payload_type: None,
                    playout_timestamp: 0,
                }),
                receive_extensions: Mutex::new(ExtensionMap::new()),
                sources: Mutex::new(HashMap::new()),
                remote_ssrc: Mutex::new(None),
                frame_decryptor: Mutex::new(None),
                frame_transformer_delegate: Mutex::new(None),
                sink: Mutex::new(None),
                playing: AtomicBool::new(false),
                concealed_packets: AtomicU64::new(0),
                decrypt_failures: AtomicU64::new(0),
            }),
        }
    }

    pub fn rtp_rtcp(&self) -> &RtpRtcp {
        &self.internal.rtp_rtcp
    }

    /// Outbound RTCP (receiver reports, NACKs) of this channel.
    pub fn rtcp_packet_sent(&self) -> &MediaEventProducer<MediaPacket> {
        self.internal.rtp_rtcp.rtcp_packet_sent()
    }

    pub fn remote_ssrc(&self) -> Option<u32> {
        *self.internal.remote_ssrc.lock()
    }

    /// Installs the payload type map. Decoders are created on first use.
    pub fn set_receive_codecs(&self, codecs: HashMap<u8, SdpAudioFormat>) {
        for (pt, format) in &codecs {
            if self
                .internal
                .decoder_factory
                .make_audio_decoder(format)
                .is_none()
            {
                log::warn!("no decoder for payload type {pt} ({format})");
            }
        }
        let mut playout = self.internal.playout.lock();
        playout.codecs = codecs;
        playout.decoders.clear();
        playout.decoded.clear();
        playout.decoded_config = None;
    }

    pub fn register_receive_rtp_header_extension(&self, kind: ExtensionKind, id: u8) -> Result<()> {
        self.internal.receive_extensions.lock().register(kind, id)?;
        Ok(())
    }

    pub fn set_receive_rtp_header_extensions(&self, extensions: ExtensionMap) {
        *self.internal.receive_extensions.lock() = extensions;
    }

    /// Receives every decoded 10 ms frame that is not silence.
    pub fn set_sink(&self, sink: Option<Arc<dyn AudioFrameSink>>) {
        *self.internal.sink.lock() = sink;
    }

    pub fn start_playout(&self) {
        self.internal.playing.store(true, Ordering::SeqCst);
    }

    pub fn stop_playout(&self) {
        self.internal.playing.store(false, Ordering::SeqCst);
        self.internal.playout.lock().flush();
    }

    pub fn playing(&self) -> bool {
        self.internal.playing.load(Ordering::SeqCst)
    }

    pub fn set_nack_status(&self, enable: bool, max_packets: u16) {
        self.internal.rtp_rtcp.set_nack_status(enable, max_packets);
    }

    pub fn set_frame_decryptor(&self, frame_decryptor: Option<Arc<dyn FrameDecryptor>>) {
        *self.internal.frame_decryptor.lock() = frame_decryptor;
    }

    /// Routes received frames through `frame_transformer` before the jitter
    /// buffer.
    pub fn set_depacketizer_to_decoder_frame_transformer(
        &self,
        frame_transformer: Arc<dyn FrameTransformer>,
    ) {
        let mut slot = self.internal.frame_transformer_delegate.lock();
        if slot.is_some() {
            log::warn!("frame transformer already set");
            return;
        }
        let ssrc = self.remote_ssrc().unwrap_or_default();
        let delegate = FrameTransformerDelegate::new(
            ChannelReceiveInternal::frame_sender(Arc::downgrade(&self.internal)),
            frame_transformer,
            ssrc,
            self.internal.worker_queue.clone(),
        );
        delegate.init();
        *slot = Some(delegate);
    }

    /// Accounts a received packet, then decrypts it and hands it to the
    /// frame transformer or the jitter buffer.
    pub fn on_rtp_packet(&self, packet: &Packet, arrival: SystemTime) -> Result<()> {
        let pt = packet.header.payload_type;
        let clock_rate = match self.internal.playout.lock().codecs.get(&pt) {
            Some(format) => format.clockrate_hz,
            None => {
                log::debug!("unknown payload type {pt}, packet dropped");
                return Err(Error::ErrNoDecoder(pt));
            }
        };

        let learned = self.internal.remote_ssrc.lock().replace(packet.header.ssrc)
            != Some(packet.header.ssrc);
        self.internal
            .rtp_rtcp
            .incoming_rtp_packet(packet, clock_rate, arrival);
        self.internal.update_sources(packet, arrival);

        let payload = self
            .internal
            .decrypt(&packet.header.csrc, packet.payload.clone())?;

        let delegate = self.internal.frame_transformer_delegate.lock().clone();
        if let Some(delegate) = delegate {
            if learned {
                delegate.set_ssrc(packet.header.ssrc);
            }
            let mime_type = match self.internal.playout.lock().codecs.get(&pt) {
                Some(format) => format!("audio/{}", format.name),
                None => String::new(),
            };
            let mut frame = TransformableAudioFrame::new(
                payload,
                pt,
                packet.header.timestamp,
                packet.header.ssrc,
                &mime_type,
            );
            frame.csrcs = packet.header.csrc.clone();
            frame.sequence_number = Some(packet.header.sequence_number);
            frame.receive_time = Some(arrival);
            delegate.transform(TransformableFrame::Receiver(frame));
            return Ok(());
        }

        self.internal.on_received_payload(JitterPacket {
            sequence_number: packet.header.sequence_number,
            timestamp: packet.header.timestamp,
            payload_type: pt,
            payload,
        });
        Ok(())
    }

    pub fn received_rtcp_packet(&self, data: &[u8]) -> Result<()> {
        self.internal.rtp_rtcp.incoming_rtcp_packet(data)
    }

    /// Pulls 10 ms of audio at `sample_rate_hz`. The frame is muted silence
    /// when nothing could be decoded.
    pub fn get_audio_frame_with_info(&self, sample_rate_hz: u32) -> AudioFrame {
        let internal = &self.internal;
        let mut playout = internal.playout.lock();
        let out_channels = playout.decoded_config.map_or(1, |c| c.channels);
        if !internal.playing.load(Ordering::SeqCst) {
            return AudioFrame::silence(sample_rate_hz, out_channels);
        }

        let needed = |p: &PlayoutState| {
            p.decoded_config
                .map(|c| samples_per_10ms(c.rate) * c.channels)
        };
        loop {
            if let Some(n) = needed(&playout) {
                if n > 0 && playout.decoded.len() >= n {
                    break;
                }
            }
            let lost_before = playout.jitter_buffer.stats().packets_lost;
            match playout.decode_next(internal.decoder_factory.as_ref()) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => log::warn!("decoding failed: {err}"),
            }
            let lost = playout.jitter_buffer.stats().packets_lost - lost_before;
            internal.concealed_packets.fetch_add(lost, Ordering::SeqCst);
        }

        let config = match playout.decoded_config {
            Some(config) => config,
            None => return AudioFrame::silence(sample_rate_hz, out_channels),
        };
        let block = samples_per_10ms(config.rate) * config.channels;
        if block == 0 || playout.decoded.len() < block {
            return AudioFrame::silence(sample_rate_hz, config.channels);
        }

        let decoded: Vec<i16> = playout.decoded.drain(..block).collect();
        let out_config = AudioConfig::new(config.channels, sample_rate_hz);
        let data = if out_config == config {
            decoded
        } else {
            let stale = !matches!(&playout.converter,
                Some(c) if c.input_config() == config && c.output_config() == out_config);
            if stale {
                playout.converter = None;
            }
            playout
                .converter
                .get_or_insert_with(|| AudioConverter::new(config, out_config))
                .process(&decoded, samples_per_10ms(config.rate))
        };

        let frame = AudioFrame {
            samples_per_channel: data.len() / config.channels,
            data,
            sample_rate_hz,
            num_channels: config.channels,
            timestamp: playout.playout_timestamp,
            absolute_capture_timestamp_ms: None,
            muted: false,
        };
        drop(playout);

        let sink = internal.sink.lock().clone();
        if let Some(sink) = sink {
            if let Err(err) = sink.send_audio_frame(frame.clone()) {
                log::debug!("audio sink rejected frame: {err}");
            }
        }
        frame
    }

    /// SSRC and CSRC contributions seen within the last ten seconds, newest
    /// first.
    pub fn get_sources(&self) -> Vec<RtpSource> {
        let now = SystemTime::now();
        let mut sources: Vec<RtpSource> = self
            .internal
            .sources
            .lock()
            .values()
            .filter(|s| {
                now.duration_since(s.timestamp)
                    .map_or(true, |age| age <= SOURCE_WINDOW)
            })
            .cloned()
            .collect();
        sources.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        sources
    }

    pub fn get_rtcp_statistics(&self) -> CallReceiveStatistics {
        let rtp_rtcp = &self.internal.rtp_rtcp;
        let remote_ssrc = self.remote_ssrc();
        let mut stats = CallReceiveStatistics {
            remote_ssrc,
            nacks_sent: rtp_rtcp.rtcp_packet_type_counter().nack_packets_sent,
            round_trip_time: rtp_rtcp.last_rtt(),
            concealed_packets: self.internal.concealed_packets.load(Ordering::SeqCst),
            decrypt_failures: self.internal.decrypt_failures.load(Ordering::SeqCst),
            ..Default::default()
        };

        if let Some(rs) = remote_ssrc.and_then(|ssrc| rtp_rtcp.receive_statistics(ssrc)) {
            stats.packets_lost = rs.packets_lost;
            stats.jitter_ms = (rs.jitter_seconds() * 1000.0) as u32;
            stats.payload_bytes_received = rs.counter.payload_bytes;
            stats.header_and_padding_bytes_received =
                rs.counter.header_bytes + rs.counter.padding_bytes;
            stats.packets_received = rs.counter.packets;
            stats.last_packet_received = rs.last_packet_received;
        }
        stats
    }

    /// Detaches the frame transformer and stops the worker queue and the
    /// report worker.
    pub async fn close(&self) -> Result<()> {
        self.stop_playout();
        let delegate = self.internal.frame_transformer_delegate.lock().take();
        if let Some(delegate) = delegate {
            if let Err(err) = delegate.reset().await {
                log::warn!("frame transformer reset: {err}");
            }
        }
        self.internal.worker_queue.flush().await?;
        self.internal.worker_queue.close();
        self.internal.rtp_rtcp.close().await
    }
}
