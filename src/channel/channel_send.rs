use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use portable_atomic::{AtomicBool, Ordering};
use rtp::extension::{ExtensionKind, AUDIO_LEVEL_URI};

use super::audio_coding::{AudioCoding, EncodedPacket};
use super::bitrate_accountant::AudioBitrateAccountant;
use super::codec::{AudioEncoder, BitrateAllocationUpdate, SdpAudioFormat};
use super::statistics::{CallSendStatistics, ReportBlockData};
use crate::audio::audio_level::RmsLevel;
use crate::audio::AudioFrame;
use crate::crypto::{CryptoOptions, FrameEncryptor};
use crate::error::{Error, Result};
use crate::event::MediaEventProducer;
use crate::frame_transformer::{
    FrameSender, FrameTransformer, FrameTransformerDelegate, TransformableAudioFrame,
    TransformableFrame,
};
use crate::media_packet::MediaPacket;
use crate::rtp_rtcp::{RtpAudioFrame, RtpRtcp, RtpRtcpConfig, DEFAULT_REPORT_INTERVAL};
use crate::task_queue::TaskQueue;
use crate::AUDIO_FRAME_DURATION_MS;

/// Packets kept for retransmission unless configured otherwise.
pub const DEFAULT_NACK_HISTORY_PACKETS: u16 = 600;

/// ChannelSendConfig configures a ChannelSend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSendConfig {
    pub ssrc: u32,
    pub rtcp_report_interval: Duration,
    pub crypto_options: CryptoOptions,
    /// Zero disables the retransmission history.
    pub nack_history_packets: u16,
    pub cname: Option<String>,
}

impl Default for ChannelSendConfig {
    fn default() -> Self {
        ChannelSendConfig {
            ssrc: rand::random::<u32>(),
            rtcp_report_interval: DEFAULT_REPORT_INTERVAL,
            crypto_options: CryptoOptions::default(),
            nack_history_packets: DEFAULT_NACK_HISTORY_PACKETS,
            cname: None,
        }
    }
}

impl ChannelSendConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ssrc(mut self, ssrc: u32) -> Self {
        self.ssrc = ssrc;
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

    pub fn with_nack_history_packets(mut self, packets: u16) -> Self {
        self.nack_history_packets = packets;
        self
    }

    pub fn with_cname(mut self, cname: &str) -> Self {
        self.cname = Some(cname.to_owned());
        self
    }
}

#[derive(Default)]
struct CaptureState {
    timestamp: u32,
    last_capture_timestamp_ms: Option<i64>,
}

struct EncoderState {
    audio_coding: AudioCoding,
    rms_level: RmsLevel,
    previous_frame_muted: bool,
}

struct ChannelSendInternal {
    rtp_rtcp: RtpRtcp,
    encoder_queue: TaskQueue,
    crypto_options: CryptoOptions,

    encoder: Mutex<EncoderState>,
    encoder_format: Mutex<SdpAudioFormat>,
    frame_encryptor: Mutex<Option<Arc<dyn FrameEncryptor>>>,
    frame_transformer_delegate: Mutex<Option<Arc<FrameTransformerDelegate>>>,
    bitrate_accountant: Mutex<AudioBitrateAccountant>,
    capture: Mutex<CaptureState>,

    encoder_queue_is_active: AtomicBool,
    first_frame: AtomicBool,
    input_mute: AtomicBool,
    include_audio_level_indication: AtomicBool,
}

impl ChannelSendInternal {
    fn encode_frame(&self, mut frame: AudioFrame) {
        debug_assert!(self.encoder_queue.is_current());
        if !self.encoder_queue_is_active.load(Ordering::SeqCst) {
            return;
        }

        let is_muted = self.input_mute.load(Ordering::SeqCst);
        let include_level = self.include_audio_level_indication.load(Ordering::SeqCst);
        let (result, levels) = {
            let mut encoder = self.encoder.lock();
            frame.apply_mute(encoder.previous_frame_muted, is_muted);

            if include_level {
                let length = (frame.samples_per_channel * frame.num_channels).min(frame.data.len());
                if is_muted && encoder.previous_frame_muted {
                    encoder.rms_level.analyze_muted(length);
                } else {
                    encoder.rms_level.analyze(&frame.data[..length]);
                }
            }
            encoder.previous_frame_muted = is_muted;

            let result = encoder.audio_coding.add_10ms_data(&frame);
            // the meter is drained once per packet handed to the RTP module
            let levels: Vec<Option<u8>> = match &result {
                Ok(packets) => packets
                    .iter()
                    .map(|_| include_level.then(|| encoder.rms_level.average()))
                    .collect(),
                Err(_) => vec![],
            };
            (result, levels)
        };

        let packets = match result {
            Ok(packets) => packets,
            Err(err) => {
                log::error!("add_10ms_data failed: {err}");
                self.bitrate_accountant.lock().reset();
                return;
            }
        };

        let encoded_bytes: usize = packets.iter().map(|p| p.payload.len()).sum();
        self.bitrate_accountant.lock().update_bps_estimate(
            encoded_bytes,
            Duration::from_millis(AUDIO_FRAME_DURATION_MS as u64),
        );

        for (packet, level) in packets.into_iter().zip(levels) {
            if let Err(err) = self.send_data(packet, level) {
                log::warn!("audio frame dropped: {err}");
            }
        }
    }

    fn send_data(&self, packet: EncodedPacket, audio_level_dbov: Option<u8>) -> Result<()> {
        let delegate = self.frame_transformer_delegate.lock().clone();
        if let Some(delegate) = delegate {
            let mime_type = format!("audio/{}", self.encoder_format.lock().name);
            let mut frame = TransformableAudioFrame::new(
                packet.payload,
                packet.payload_type,
                packet
                    .rtp_timestamp
                    .wrapping_add(self.rtp_rtcp.start_timestamp()),
                self.rtp_rtcp.ssrc(),
                &mime_type,
            );
            frame.frame_type = packet.frame_type;
            frame.absolute_capture_timestamp_ms = packet.absolute_capture_timestamp_ms;
            frame.audio_level = audio_level_dbov;
            delegate.transform(TransformableFrame::Sender(frame));
            return Ok(());
        }

        self.send_rtp_audio(RtpAudioFrame {
            frame_type: packet.frame_type,
            payload: packet.payload,
            payload_type: packet.payload_type,
            rtp_timestamp: packet.rtp_timestamp,
            csrcs: vec![],
            capture_time_ms: packet.absolute_capture_timestamp_ms,
            audio_level_dbov,
        })
    }

    /// Encrypts and sends one frame. `frame.rtp_timestamp` excludes the RTP
    /// module's start offset.
    fn send_rtp_audio(&self, mut frame: RtpAudioFrame) -> Result<()> {
        // empty payloads are DTX or DTMF and are never encrypted
        if !frame.payload.is_empty() {
            let encryptor = self.frame_encryptor.lock().clone();
            if let Some(encryptor) = encryptor {
                let mut encrypted =
                    vec![0u8; encryptor.max_ciphertext_byte_size(frame.payload.len())];
                let written =
                    encryptor.encrypt(self.rtp_rtcp.ssrc(), &frame.payload, &mut encrypted)?;
                encrypted.truncate(written);
                frame.payload = encrypted.into();
            } else if self.crypto_options.require_frame_encryption {
                return Err(Error::ErrEncryptorRequired);
            }
        }

        let rtp_timestamp = frame.rtp_timestamp;
        if !self.rtp_rtcp.on_sending_rtp_frame(
            rtp_timestamp,
            frame.capture_time_ms,
            frame.payload_type,
            false,
        ) {
            return Err(Error::ErrNotSending);
        }

        frame.rtp_timestamp = rtp_timestamp.wrapping_add(self.rtp_rtcp.start_timestamp());
        if !self.include_audio_level_indication.load(Ordering::SeqCst) {
            frame.audio_level_dbov = None;
        }
        self.rtp_rtcp.send_audio(frame)
    }

    fn call_encoder<F>(&self, f: F)
    where
        F: FnOnce(&mut dyn AudioEncoder),
    {
        let mut encoder = self.encoder.lock();
        match encoder.audio_coding.encoder_mut() {
            Some(e) => f(e),
            None => log::warn!("trying to call unset encoder"),
        }
    }

    fn frame_sender(weak: Weak<ChannelSendInternal>) -> FrameSender {
        Arc::new(move |frame: TransformableFrame| {
            let internal = match weak.upgrade() {
                Some(internal) => internal,
                None => return,
            };
            let frame = frame.into_audio();
            let rtp_timestamp = frame
                .rtp_timestamp
                .wrapping_sub(internal.rtp_rtcp.start_timestamp());
            let result = internal.send_rtp_audio(RtpAudioFrame {
                frame_type: frame.frame_type,
                payload: frame.data().clone(),
                payload_type: frame.payload_type,
                rtp_timestamp,
                csrcs: frame.csrcs,
                capture_time_ms: frame.absolute_capture_timestamp_ms,
                audio_level_dbov: frame.audio_level,
            });
            if let Err(err) = result {
                log::warn!("transformed audio frame dropped: {err}");
            }
        })
    }
}

/// ChannelSend encodes captured audio on its own task queue and hands the
/// packets to its RTP/RTCP module.
pub struct ChannelSend {
    internal: Arc<ChannelSendInternal>,
    sending: AtomicBool,
}

impl ChannelSend {
    /// Creates the channel. Must be called within a tokio runtime.
    pub fn new(config: ChannelSendConfig) -> Self {
        let rtp_rtcp = RtpRtcp::new(RtpRtcpConfig {
            ssrc: config.ssrc,
            report_interval: config.rtcp_report_interval,
            now: None,
        });
        if config.nack_history_packets > 0 {
            rtp_rtcp.set_store_packets_status(true, config.nack_history_packets);
        }
        if let Some(cname) = &config.cname {
            rtp_rtcp.set_cname(cname);
        }

        ChannelSend {
            internal: Arc::new(ChannelSendInternal {
                rtp_rtcp,
                encoder_queue: TaskQueue::new("AudioEncoder"),
                crypto_options: config.crypto_options,
                encoder: Mutex::new(EncoderState {
                    audio_coding: AudioCoding::new(),
                    rms_level: RmsLevel::new(),
                    previous_frame_muted: false,
                }),
                encoder_format: Mutex::new(SdpAudioFormat::new("x-unknown", 0, 0)),
                frame_encryptor: Mutex::new(None),
                frame_transformer_delegate: Mutex::new(None),
                bitrate_accountant: Mutex::new(AudioBitrateAccountant::new()),
                capture: Mutex::new(CaptureState::default()),
                encoder_queue_is_active: AtomicBool::new(false),
                first_frame: AtomicBool::new(true),
                input_mute: AtomicBool::new(false),
                include_audio_level_indication: AtomicBool::new(false),
            }),
            sending: AtomicBool::new(false),
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.internal.rtp_rtcp.ssrc()
    }

    pub fn rtp_rtcp(&self) -> &RtpRtcp {
        &self.internal.rtp_rtcp
    }

    pub fn encoder_queue(&self) -> &TaskQueue {
        &self.internal.encoder_queue
    }

    /// Outbound RTP of this channel.
    pub fn rtp_packet_sent(&self) -> &MediaEventProducer<MediaPacket> {
        self.internal.rtp_rtcp.rtp_packet_sent()
    }

    /// Outbound RTCP of this channel.
    pub fn rtcp_packet_sent(&self) -> &MediaEventProducer<MediaPacket> {
        self.internal.rtp_rtcp.rtcp_packet_sent()
    }

    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst)
    }

    pub fn start_send(&self) -> Result<()> {
        debug_assert!(!self.is_sending(), "start_send while sending");
        self.sending.store(true, Ordering::SeqCst);

        self.internal.rtp_rtcp.set_sending_media_status(true);
        self.internal.rtp_rtcp.set_sending_status(true)?;

        // encoding may start now
        self.internal.first_frame.store(true, Ordering::SeqCst);
        self.internal
            .encoder_queue_is_active
            .store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stops encoding, waits for queued encode tasks, resets the encoder and
    /// sends an RTCP BYE.
    pub async fn stop_send(&self) -> Result<()> {
        if !self.sending.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.internal
            .encoder_queue_is_active
            .store(false, Ordering::SeqCst);

        let internal = Arc::clone(&self.internal);
        self.internal
            .encoder_queue
            .invoke(move || internal.encoder.lock().audio_coding.reset())
            .await?;

        if let Err(err) = self.internal.rtp_rtcp.set_sending_status(false) {
            log::error!("failed to stop sending: {err}");
        }
        self.internal.rtp_rtcp.set_sending_media_status(false);
        Ok(())
    }

    pub fn set_encoder(
        &self,
        payload_type: u8,
        encoder_format: SdpAudioFormat,
        encoder: Box<dyn AudioEncoder>,
    ) {
        debug_assert!(payload_type <= 127);
        self.internal
            .rtp_rtcp
            .register_send_payload_frequency(payload_type, encoder.rtp_timestamp_rate_hz());
        *self.internal.encoder_format.lock() = encoder_format;
        self.internal.encoder.lock().audio_coding.set_encoder(encoder);
    }

    pub fn encoder_format(&self) -> SdpAudioFormat {
        self.internal.encoder_format.lock().clone()
    }

    pub fn modify_encoder<F>(&self, f: F)
    where
        F: FnOnce(&mut Option<Box<dyn AudioEncoder>>),
    {
        self.internal.encoder.lock().audio_coding.modify_encoder(f);
    }

    /// Runs `f` on the encoder, if one is set.
    pub fn call_encoder<F>(&self, f: F)
    where
        F: FnOnce(&mut dyn AudioEncoder),
    {
        self.internal.call_encoder(f);
    }

    fn call_encoder_async<F>(&self, f: F)
    where
        F: FnOnce(&mut dyn AudioEncoder) + Send + 'static,
    {
        let internal = Arc::clone(&self.internal);
        if let Err(err) = self
            .internal
            .encoder_queue
            .post(move || internal.call_encoder(f))
        {
            log::debug!("encoder call dropped: {err}");
        }
    }

    pub fn on_bitrate_allocation(&self, update: BitrateAllocationUpdate) {
        self.call_encoder_async(move |encoder| encoder.on_received_uplink_allocation(update));
    }

    pub fn get_target_bitrate(&self) -> Option<u32> {
        self.internal.encoder.lock().audio_coding.get_target_bitrate()
    }

    pub fn register_packet_overhead(&self, packet_byte_overhead: usize) {
        self.internal
            .bitrate_accountant
            .lock()
            .register_packet_overhead(packet_byte_overhead);
    }

    /// Encoded bitrate including packet overhead, in bits per second.
    pub fn get_used_rate(&self) -> Option<u32> {
        self.internal.bitrate_accountant.lock().get_used_rate()
    }

    pub fn set_input_mute(&self, enable: bool) {
        self.internal.input_mute.store(enable, Ordering::SeqCst);
    }

    pub fn input_mute(&self) -> bool {
        self.internal.input_mute.load(Ordering::SeqCst)
    }

    pub fn set_send_audio_level_indication_status(&self, enable: bool, id: u8) -> Result<()> {
        self.internal
            .include_audio_level_indication
            .store(enable, Ordering::SeqCst);
        if enable {
            self.internal
                .rtp_rtcp
                .register_rtp_header_extension(ExtensionKind::AudioLevel, id)
        } else {
            self.internal
                .rtp_rtcp
                .deregister_send_rtp_header_extension(AUDIO_LEVEL_URI);
            Ok(())
        }
    }

    pub fn register_rtp_header_extension(&self, kind: ExtensionKind, id: u8) -> Result<()> {
        self.internal.rtp_rtcp.register_rtp_header_extension(kind, id)
    }

    /// Sets the RTCP CNAME, truncated to 255 bytes.
    pub fn set_rtcp_cname(&self, cname: &str) {
        self.internal.rtp_rtcp.set_cname(cname);
    }

    /// Queues one 10 ms frame for encoding and assigns its RTP timestamp.
    pub fn process_and_encode_audio(&self, mut frame: AudioFrame) {
        debug_assert!(frame.samples_per_channel > 0);
        if !self.internal.encoder_queue_is_active.load(Ordering::SeqCst)
            || frame.samples_per_channel == 0
        {
            return;
        }

        {
            let mut capture = self.internal.capture.lock();
            // close the gap left by a pause, based on capture time
            if self.internal.first_frame.swap(false, Ordering::SeqCst) {
                if let (Some(last), Some(current)) = (
                    capture.last_capture_timestamp_ms,
                    frame.absolute_capture_timestamp_ms,
                ) {
                    let spc = frame.samples_per_channel as i64;
                    let diff_ms = current.saturating_sub(last);
                    // whole frames only, minus the one already counted
                    let diff_frames =
                        diff_ms.saturating_mul(frame.sample_rate_hz as i64) / 1000 / spc - 1;
                    capture.timestamp = capture
                        .timestamp
                        .wrapping_add(diff_frames.saturating_mul(spc).max(0) as u32);
                }
            }

            frame.timestamp = capture.timestamp;
            capture.timestamp = capture
                .timestamp
                .wrapping_add(frame.samples_per_channel as u32);
            capture.last_capture_timestamp_ms = frame.absolute_capture_timestamp_ms;
        }

        let internal = Arc::clone(&self.internal);
        if let Err(err) = self
            .internal
            .encoder_queue
            .post(move || internal.encode_frame(frame))
        {
            log::debug!("audio frame dropped: {err}");
        }
    }

    /// Feeds received RTCP to the RTP module and forwards new RTT and loss
    /// figures to the encoder.
    pub fn received_rtcp_packet(&self, data: &[u8]) -> Result<()> {
        self.internal.rtp_rtcp.incoming_rtcp_packet(data)?;

        if let Some(block) = self
            .internal
            .rtp_rtcp
            .get_latest_report_block_data()
            .into_iter()
            .max_by_key(|b| b.report_block_time)
        {
            let fraction = block.fraction_lost();
            self.call_encoder_async(move |encoder| {
                encoder.on_received_uplink_packet_loss_fraction(fraction)
            });
        }

        if let Some(rtt) = self.internal.rtp_rtcp.last_rtt() {
            let rtt_ms = rtt.as_millis() as u64;
            self.call_encoder_async(move |encoder| encoder.on_received_rtt(rtt_ms));
        }
        Ok(())
    }

    pub fn get_remote_rtcp_report_blocks(&self) -> Vec<ReportBlockData> {
        self.internal.rtp_rtcp.get_latest_report_block_data()
    }

    pub fn get_rtcp_statistics(&self) -> CallSendStatistics {
        let rtp_rtcp = &self.internal.rtp_rtcp;
        let counters = rtp_rtcp.get_send_stream_data_counters();
        let rtcp_counter = rtp_rtcp.rtcp_packet_type_counter();
        CallSendStatistics {
            rtt: rtp_rtcp.last_rtt(),
            payload_bytes_sent: counters.transmitted.payload_bytes,
            header_and_padding_bytes_sent: counters.transmitted.header_bytes
                + counters.transmitted.padding_bytes,
            retransmitted_bytes_sent: counters.retransmitted.payload_bytes,
            packets_sent: counters.transmitted.packets,
            retransmitted_packets_sent: counters.retransmitted.packets,
            nacks_received: rtcp_counter.nack_packets,
            rtcp_packet_type_counts: rtcp_counter,
            report_block_datas: rtp_rtcp.get_latest_report_block_data(),
            used_rate_bps: self.get_used_rate(),
        }
    }

    /// Installs the frame encryptor on the encoder queue.
    pub fn set_frame_encryptor(&self, frame_encryptor: Option<Arc<dyn FrameEncryptor>>) {
        let internal = Arc::clone(&self.internal);
        if let Err(err) = self
            .internal
            .encoder_queue
            .post(move || *internal.frame_encryptor.lock() = frame_encryptor)
        {
            log::debug!("set_frame_encryptor dropped: {err}");
        }
    }

    /// Routes encoded frames through `frame_transformer` before packetization.
    pub fn set_encoder_to_packetizer_frame_transformer(
        &self,
        frame_transformer: Arc<dyn FrameTransformer>,
    ) {
        let internal = Arc::clone(&self.internal);
        let result = self.internal.encoder_queue.post(move || {
            let mut slot = internal.frame_transformer_delegate.lock();
            if slot.is_some() {
                log::warn!("frame transformer already set");
                return;
            }
            let delegate = FrameTransformerDelegate::new(
                ChannelSendInternal::frame_sender(Arc::downgrade(&internal)),
                frame_transformer,
                internal.rtp_rtcp.ssrc(),
                internal.encoder_queue.clone(),
            );
            delegate.init();
            *slot = Some(delegate);
        });
        if let Err(err) = result {
            log::debug!("set_encoder_to_packetizer_frame_transformer dropped: {err}");
        }
    }

    /// Stops sending, detaches the frame transformer and shuts down the
    /// encoder queue and the report worker.
    pub async fn close(&self) -> Result<()> {
        let delegate = self.internal.frame_transformer_delegate.lock().take();
        if let Some(delegate) = delegate {
            if let Err(err) = delegate.reset().await {
                log::warn!("frame transformer reset: {err}");
            }
        }

        self.stop_send().await?;
        self.internal.encoder_queue.flush().await?;
        self.internal.encoder_queue.close();
        self.internal.rtp_rtcp.close().await
    }
}
