use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use portable_atomic::{AtomicBool, Ordering};
use rtp::extension::extension_map::ExtensionMap;
use rtp::extension::ExtensionKind;

use crate::audio::audio_proxy::AudioFrameSink;
use crate::audio::{AudioFrame, SUPPORTED_SENDING_RATES};
use crate::channel::{
    AudioEncoder, CallReceiveStatistics, CallSendStatistics, ChannelReceive,
    ChannelReceiveConfig, ChannelSend, ChannelSendConfig, RtpSource, SdpAudioFormat,
};
use crate::error::{Error, Result};
use crate::event::{MediaEventListener, MediaEventProducer};
use crate::media_packet::MediaPacket;
use crate::pipeline::RtpPacketReceived;
use crate::task_queue::TaskQueue;

/// MediaSessionConduit is what a MediaPipeline sees of a media session: the
/// packets it produces and the inputs for the packets it receives.
#[async_trait]
pub trait MediaSessionConduit: Send + Sync {
    /// RTP produced by the send channel.
    fn sender_rtp_send_event(&self) -> &MediaEventProducer<MediaPacket>;

    /// RTCP produced by the send channel.
    fn sender_rtcp_send_event(&self) -> &MediaEventProducer<MediaPacket>;

    /// RTCP produced by the receive channel.
    fn receiver_rtcp_send_event(&self) -> &MediaEventProducer<MediaPacket>;

    /// Feeds RTP from `event` to the receive channel on `queue`.
    fn connect_receiver_rtp_event(
        &self,
        queue: &TaskQueue,
        event: &MediaEventProducer<RtpPacketReceived>,
    ) -> MediaEventListener;

    /// Feeds RTCP from `event` to the receive channel on `queue`.
    fn connect_receiver_rtcp_event(
        &self,
        queue: &TaskQueue,
        event: &MediaEventProducer<MediaPacket>,
    ) -> MediaEventListener;

    /// Feeds RTCP from `event` to the send channel on `queue`.
    fn connect_sender_rtcp_event(
        &self,
        queue: &TaskQueue,
        event: &MediaEventProducer<MediaPacket>,
    ) -> MediaEventListener;

    fn set_transport_active(&self, active: bool);

    fn transport_active(&self) -> bool;

    /// SSRC of the remote stream last received.
    fn remote_ssrc(&self) -> Option<u32>;

    async fn close(&self) -> Result<()>;
}

/// AudioConduit pairs one ChannelSend and one ChannelReceive into an audio
/// session.
pub struct AudioConduit {
    send: ChannelSend,
    receive: ChannelReceive,
    transport_active: AtomicBool,
    weak_self: Weak<AudioConduit>,
}

impl AudioConduit {
    /// Creates the conduit. Must be called within a tokio runtime.
    pub fn new(send_config: ChannelSendConfig, receive_config: ChannelReceiveConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| AudioConduit {
            send: ChannelSend::new(send_config),
            receive: ChannelReceive::new(receive_config),
            transport_active: AtomicBool::new(false),
            weak_self: weak_self.clone(),
        })
    }

    pub fn send_channel(&self) -> &ChannelSend {
        &self.send
    }

    pub fn receive_channel(&self) -> &ChannelReceive {
        &self.receive
    }

    pub fn configure_send_codec(
        &self,
        payload_type: u8,
        format: SdpAudioFormat,
        encoder: Box<dyn AudioEncoder>,
    ) {
        log::debug!("send codec {payload_type} {format}");
        self.send.set_encoder(payload_type, format, encoder);
    }

    pub fn configure_recv_codecs(&self, codecs: HashMap<u8, SdpAudioFormat>) {
        self.receive.set_receive_codecs(codecs);
    }

    pub fn set_local_cname(&self, cname: &str) {
        self.send.set_rtcp_cname(cname);
    }

    pub fn set_local_rtp_extension(&self, kind: ExtensionKind, id: u8) -> Result<()> {
        if kind == ExtensionKind::AudioLevel {
            return self.send.set_send_audio_level_indication_status(true, id);
        }
        self.send.register_rtp_header_extension(kind, id)
    }

    pub fn set_remote_rtp_extensions(&self, extensions: ExtensionMap) {
        self.receive.set_receive_rtp_header_extensions(extensions);
    }

    pub fn start_transmitting(&self) -> Result<()> {
        if self.send.is_sending() {
            return Ok(());
        }
        self.send.start_send()
    }

    pub async fn stop_transmitting(&self) -> Result<()> {
        self.send.stop_send().await
    }

    pub fn start_receiving(&self) {
        self.receive.start_playout();
    }

    pub fn stop_receiving(&self) {
        self.receive.stop_playout();
    }

    pub fn is_receiving(&self) -> bool {
        self.receive.playing()
    }

    /// Pulls 10 ms of decoded audio at `sample_rate_hz`.
    pub fn get_audio_frame(&self, sample_rate_hz: u32) -> Result<AudioFrame> {
        if !SUPPORTED_SENDING_RATES.contains(&sample_rate_hz) {
            return Err(Error::ErrUnsupportedSampleRate(sample_rate_hz));
        }
        if !self.receive.playing() {
            return Err(Error::Other("conduit is not receiving".to_owned()));
        }
        Ok(self.receive.get_audio_frame_with_info(sample_rate_hz))
    }

    pub fn get_sources(&self) -> Vec<RtpSource> {
        self.receive.get_sources()
    }

    pub fn get_send_stats(&self) -> CallSendStatistics {
        self.send.get_rtcp_statistics()
    }

    pub fn get_receive_stats(&self) -> CallReceiveStatistics {
        self.receive.get_rtcp_statistics()
    }

    fn on_rtp_received(&self, received: RtpPacketReceived) {
        if let Err(err) = self
            .receive
            .on_rtp_packet(&received.packet, received.arrival_time)
        {
            log::debug!(
                "rtp packet seq {} dropped: {err}",
                received.packet.header.sequence_number
            );
        }
    }

    fn on_receiver_rtcp(&self, packet: MediaPacket) {
        if let Err(err) = self.receive.received_rtcp_packet(&packet.data) {
            log::debug!("receiver rtcp dropped: {err}");
        }
    }

    fn on_sender_rtcp(&self, packet: MediaPacket) {
        if let Err(err) = self.send.received_rtcp_packet(&packet.data) {
            log::debug!("sender rtcp dropped: {err}");
        }
    }
}

impl AudioFrameSink for AudioConduit {
    fn send_audio_frame(&self, frame: AudioFrame) -> Result<()> {
        if !SUPPORTED_SENDING_RATES.contains(&frame.sample_rate_hz) {
            return Err(Error::ErrUnsupportedSampleRate(frame.sample_rate_hz));
        }
        if frame.num_channels == 0 || frame.num_channels > 2 {
            return Err(Error::ErrUnsupportedChannels(frame.num_channels));
        }
        if !self.send.is_sending() {
            return Err(Error::ErrNotSending);
        }
        self.send.process_and_encode_audio(frame);
        Ok(())
    }
}

#[async_trait]
impl MediaSessionConduit for AudioConduit {
    fn sender_rtp_send_event(&self) -> &MediaEventProducer<MediaPacket> {
        self.send.rtp_packet_sent()
    }

    fn sender_rtcp_send_event(&self) -> &MediaEventProducer<MediaPacket> {
        self.send.rtcp_packet_sent()
    }

    fn receiver_rtcp_send_event(&self) -> &MediaEventProducer<MediaPacket> {
        self.receive.rtcp_packet_sent()
    }

    fn connect_receiver_rtp_event(
        &self,
        queue: &TaskQueue,
        event: &MediaEventProducer<RtpPacketReceived>,
    ) -> MediaEventListener {
        let weak = self.weak_self.clone();
        event.connect(queue, move |received| {
            if let Some(conduit) = weak.upgrade() {
                conduit.on_rtp_received(received);
            }
        })
    }

    fn connect_receiver_rtcp_event(
        &self,
        queue: &TaskQueue,
        event: &MediaEventProducer<MediaPacket>,
    ) -> MediaEventListener {
        let weak = self.weak_self.clone();
        event.connect(queue, move |packet| {
            if let Some(conduit) = weak.upgrade() {
                conduit.on_receiver_rtcp(packet);
            }
        })
    }

    fn connect_sender_rtcp_event(
        &self,
        queue: &TaskQueue,
        event: &MediaEventProducer<MediaPacket>,
    ) -> MediaEventListener {
        let weak = self.weak_self.clone();
        event.connect(queue, move |packet| {
            if let Some(conduit) = weak.upgrade() {
                conduit.on_sender_rtcp(packet);
            }
        })
    }

    fn set_transport_active(&self, active: bool) {
        if self.transport_active.swap(active, Ordering::SeqCst) != active {
            log::debug!("audio conduit transport active: {active}");
        }
    }

    fn transport_active(&self) -> bool {
        self.transport_active.load(Ordering::SeqCst)
    }

    fn remote_ssrc(&self) -> Option<u32> {
        self.receive.remote_ssrc()
    }

    async fn close(&self) -> Result<()> {
        self.set_transport_active(false);
        let send_result = self.send.close().await;
        let receive_result = self.receive.close().await;
        send_result.and(receive_result)
    }
}
