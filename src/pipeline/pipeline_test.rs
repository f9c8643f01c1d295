use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use parking_lot::Mutex;
use portable_atomic::{AtomicUsize, Ordering};
use rtcp::receiver_report::ReceiverReport;
use rtp::extension::SDES_MID_URI;
use rtp::header::Header;
use rtp::packet::Packet;
use util::marshal::Marshal;

use super::*;
use crate::audio::jitter_buffer::JitterBufferConfig;
use crate::audio::AudioChunk;
use crate::channel::{ChannelReceiveConfig, ChannelSendConfig, L16Encoder, SdpAudioFormat};
use crate::conduit::AudioConduit;
use crate::error::Result;
use crate::mock::MockTransportHandler;
use crate::registry::{MediaConfig, MediaRegistry};

const TRANSPORT: &str = "transport_0";
const PT: u8 = 96;
const SSRC: u32 = 0xCAFE_0001;

fn conduit() -> Arc<AudioConduit> {
    AudioConduit::new(
        ChannelSendConfig::new()
            .with_ssrc(SSRC)
            .with_rtcp_report_interval(Duration::ZERO),
        ChannelReceiveConfig::new()
            .with_rtcp_report_interval(Duration::ZERO)
            .with_jitter_buffer(JitterBufferConfig {
                depth: 2,
                max_packets: 50,
            }),
    )
}

fn header(ssrc: u32, payload_type: u8) -> Header {
    Header {
        version: 2,
        payload_type,
        sequence_number: 1,
        ssrc,
        ..Default::default()
    }
}

fn rtp_bytes(ssrc: u32, payload_type: u8, seq: u16, csrc: Vec<u32>) -> Result<Bytes> {
    let packet = Packet {
        header: Header {
            sequence_number: seq,
            csrc,
            ..header(ssrc, payload_type)
        },
        payload: Bytes::from_static(&[0, 1, 0, 2]),
        ..Default::default()
    };
    Ok(packet.marshal()?)
}

fn rtcp_bytes() -> Result<Bytes> {
    let rr = ReceiverReport {
        ssrc: 0x0102_0304,
        ..Default::default()
    };
    Ok(rr.marshal()?)
}

fn rtp_media(data: Bytes) -> MediaPacket {
    MediaPacket::new(MediaPacketType::Rtp, data)
}

fn counter<T: Clone + Send + 'static>(
    producer: &MediaEventProducer<T>,
) -> (Arc<AtomicUsize>, MediaEventListener) {
    let count = Arc::new(AtomicUsize::new(0));
    let count2 = Arc::clone(&count);
    let listener = producer.connect_direct(move |_| {
        count2.fetch_add(1, Ordering::SeqCst);
    });
    (count, listener)
}

async fn bound_pipeline(
    registry: &MediaRegistry,
    handler: &Arc<MockTransportHandler>,
    direction: Direction,
    filter: Option<MediaPipelineFilter>,
) -> Result<Arc<MediaPipeline>> {
    let pipeline = MediaPipeline::new(
        registry,
        "pc",
        direction,
        Arc::clone(handler) as _,
        conduit() as _,
    );
    pipeline.update_transport(TRANSPORT, filter, true)?;
    pipeline.set_active(true);
    registry.sts_queue().flush().await?;
    Ok(pipeline)
}

#[test]
fn test_filter_learns_ssrcs() -> Result<()> {
    let mut filter = MediaPipelineFilter::new(vec![RtpExtmap::new(3, SDES_MID_URI)]);
    filter.add_payload_type(PT);
    filter.set_remote_mid("audio0");

    assert!(filter.filter(&header(1, PT)));
    assert!(filter.remote_ssrcs().contains(&1));
    // known ssrc passes whatever its payload type
    assert!(filter.filter(&header(1, 111)));
    assert!(!filter.filter(&header(2, 111)));

    let mut with_mid = header(5, 111);
    with_mid.set_extension(3, Bytes::from_static(b"audio0"))?;
    assert!(filter.filter(&with_mid));
    assert!(filter.remote_ssrcs().contains(&5));

    let mut other_mid = header(6, 111);
    other_mid.set_extension(3, Bytes::from_static(b"video0"))?;
    assert!(!filter.filter(&other_mid));
    Ok(())
}

#[test]
fn test_filter_update() {
    let mut current = MediaPipelineFilter::default();
    current.add_payload_type(PT);
    current.set_remote_mid("a");
    assert!(current.filter(&header(7, PT)));

    // no ssrcs in the update: learned ones are kept
    let mut update = MediaPipelineFilter::new(vec![RtpExtmap::new(1, SDES_MID_URI)]);
    update.add_payload_type(0);
    update.set_remote_mid("a");
    current.update(&update, false);
    assert!(current.remote_ssrcs().contains(&7));
    assert_eq!(current.extmap(), update.extmap());
    assert!(!current.filter(&header(8, PT)));
    assert!(current.filter(&header(8, 0)));

    let mut explicit = MediaPipelineFilter::default();
    explicit.add_remote_ssrc(42);
    explicit.set_remote_mid("b");
    current.update(&explicit, false);
    assert_eq!(current.remote_ssrcs().len(), 1);
    assert!(current.remote_ssrcs().contains(&42));
    assert_eq!(current.remote_mid(), Some("b"));
}

#[test]
fn test_csrc_stats_expiry() {
    let now = SystemTime::now();
    let mut stats = RtpCsrcStats::new(77, now);
    let window = Duration::from_secs(10);
    assert!(!stats.expired(now + Duration::from_secs(5), window));
    assert!(stats.expired(now + Duration::from_secs(11), window));
    stats.set_timestamp(now + Duration::from_secs(8));
    assert!(!stats.expired(now + Duration::from_secs(11), window));

    let report = stats.get_stats("inbound_audio_1");
    assert_eq!(report.id, "csrc_inbound_audio_1_77");
    assert_eq!(report.contributor_ssrc, 77);
    assert_eq!(report.inbound_rtp_stream_id, "inbound_audio_1");
}

#[tokio::test]
async fn test_send_gated_by_transport_state() -> Result<()> {
    use TransportLayerState::*;

    for state in [None, Connecting, Open, Closed, Error] {
        let registry = MediaRegistry::new(MediaConfig::default());
        let handler = MockTransportHandler::new();
        handler.set_state(TRANSPORT, false, state);
        handler.set_state(TRANSPORT, true, state);

        let pipeline = bound_pipeline(&registry, &handler, Direction::Transmit, Option::None).await?;
        pipeline.set_level(2);
        assert_eq!(pipeline.transport_states().get(false), state);

        let conduit = pipeline.conduit();
        conduit
            .sender_rtp_send_event()
            .notify(rtp_media(rtp_bytes(SSRC, PT, 1, vec![])?));
        conduit
            .sender_rtcp_send_event()
            .notify(MediaPacket::new(MediaPacketType::Rtcp, rtcp_bytes()?));
        registry.sts_queue().flush().await?;

        let sent = handler.sent();
        if state == Open {
            assert_eq!(sent.len(), 2, "state {state}");
            assert!(sent.iter().all(|(_, p)| p.sdp_level == Some(2)));
            assert!(conduit.transport_active());
            let counts = pipeline.packet_counts();
            assert_eq!(counts.rtp_packets_sent, 1);
            assert_eq!(counts.rtcp_packets_sent, 1);
        } else {
            assert!(sent.is_empty(), "state {state} forwarded {sent:?}");
            assert!(!conduit.transport_active());
        }

        pipeline.shutdown()?;
        registry.shutdown().await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_layers_gate_independently() -> Result<()> {
    let registry = MediaRegistry::new(MediaConfig::default());
    let handler = MockTransportHandler::new();
    handler.set_state(TRANSPORT, false, TransportLayerState::Connecting);
    handler.set_state(TRANSPORT, true, TransportLayerState::Connecting);
    let pipeline = bound_pipeline(&registry, &handler, Direction::Transmit, None).await?;
    let (ready, _ready_listener) = counter(pipeline.transport_ready());

    handler.set_state(TRANSPORT, false, TransportLayerState::Open);
    // another transport's events are not ours
    handler.set_state("transport_1", true, TransportLayerState::Error);
    registry.sts_queue().flush().await?;
    assert_eq!(ready.load(Ordering::SeqCst), 0);

    pipeline.send_packet(rtp_media(rtp_bytes(SSRC, PT, 1, vec![])?));
    pipeline.send_packet(MediaPacket::new(MediaPacketType::Rtcp, rtcp_bytes()?));
    assert_eq!(handler.sent_of_type(MediaPacketType::Rtp).len(), 1);
    assert!(handler.sent_of_type(MediaPacketType::Rtcp).is_empty());
    assert!(!pipeline.conduit().transport_active());

    handler.set_state(TRANSPORT, true, TransportLayerState::Open);
    registry.sts_queue().flush().await?;
    assert_eq!(ready.load(Ordering::SeqCst), 1);
    assert!(pipeline.conduit().transport_active());

    // repeating open is not a new transition
    handler.set_state(TRANSPORT, true, TransportLayerState::Open);
    registry.sts_queue().flush().await?;
    assert_eq!(ready.load(Ordering::SeqCst), 1);

    handler.set_state(TRANSPORT, false, TransportLayerState::Closed);
    registry.sts_queue().flush().await?;
    assert!(!pipeline.conduit().transport_active());
    assert_eq!(pipeline.conduit().sender_rtp_send_event().listener_count(), 0);
    assert_eq!(pipeline.conduit().sender_rtcp_send_event().listener_count(), 0);

    handler.clear_sent();
    pipeline.send_packet(rtp_media(rtp_bytes(SSRC, PT, 2, vec![])?));
    assert!(handler.sent().is_empty());

    pipeline.shutdown()?;
    registry.shutdown().await
}

#[tokio::test]
async fn test_rtcp_has_single_consumer() -> Result<()> {
    let registry = MediaRegistry::new(MediaConfig::default());
    let handler = MockTransportHandler::new();
    handler.open(TRANSPORT);

    let mut pipelines = vec![];
    let mut listeners = vec![];
    let mut counts = vec![];
    for i in 0..4 {
        let direction = if i % 2 == 0 {
            Direction::Receive
        } else {
            Direction::Transmit
        };
        let pipeline = bound_pipeline(&registry, &handler, direction, None).await?;
        let (count, listener) = counter(pipeline.rtcp_receive_event());
        counts.push(count);
        listeners.push(listener);
        pipelines.push(pipeline);
    }

    let slot = handler.receive(TRANSPORT, rtcp_bytes()?);
    registry.sts_queue().flush().await?;

    assert!(slot.lock().is_empty(), "packet was not consumed");
    let delivered: usize = counts.iter().map(|c| c.load(Ordering::SeqCst)).sum();
    assert_eq!(delivered, 1);
    let processed: u64 = pipelines
        .iter()
        .map(|p| p.packet_counts().rtcp_packets_received)
        .sum();
    assert_eq!(processed, 1);

    for pipeline in &pipelines {
        pipeline.shutdown()?;
    }
    registry.shutdown().await
}

#[tokio::test]
async fn test_rtcp_reception_can_be_disabled() -> Result<()> {
    let registry = MediaRegistry::new(MediaConfig::default());
    let handler = MockTransportHandler::new();
    handler.open(TRANSPORT);
    let pipeline = bound_pipeline(&registry, &handler, Direction::Receive, None).await?;
    let (delivered, _listener) = counter(pipeline.rtcp_receive_event());

    registry.update_config(MediaConfig {
        force_disable_rtcp_reception: true,
        ..Default::default()
    });
    let slot = handler.receive(TRANSPORT, rtcp_bytes()?);
    registry.sts_queue().flush().await?;
    assert!(slot.lock().is_empty());
    assert_eq!(pipeline.packet_counts().rtcp_packets_received, 1);
    assert_eq!(delivered.load(Ordering::SeqCst), 0);

    registry.update_config(MediaConfig::default());
    handler.receive(TRANSPORT, rtcp_bytes()?);
    registry.sts_queue().flush().await?;
    assert_eq!(delivered.load(Ordering::SeqCst), 1);

    pipeline.shutdown()?;
    registry.shutdown().await
}

#[tokio::test]
async fn test_rtp_receive_filters_and_tracks_csrcs() -> Result<()> {
    let registry = MediaRegistry::new(MediaConfig::default());
    let handler = MockTransportHandler::new();
    handler.open(TRANSPORT);

    let mut filter = MediaPipelineFilter::default();
    filter.add_payload_type(PT);
    let pipeline = bound_pipeline(&registry, &handler, Direction::Receive, Some(filter)).await?;
    let transmit = bound_pipeline(&registry, &handler, Direction::Transmit, None).await?;
    let inactive = bound_pipeline(&registry, &handler, Direction::Receive, None).await?;
    inactive.set_active(false);

    let received: Arc<Mutex<Vec<RtpPacketReceived>>> = Arc::new(Mutex::new(vec![]));
    let received2 = Arc::clone(&received);
    let _listener = pipeline
        .rtp_receive_event()
        .connect_direct(move |p| received2.lock().push(p));

    handler.receive(TRANSPORT, rtp_bytes(1, PT, 1, vec![10, 11])?);
    handler.receive(TRANSPORT, rtp_bytes(2, 111, 1, vec![12])?);
    handler.receive(TRANSPORT, rtp_bytes(1, 111, 2, vec![10])?);
    // too short to parse
    handler.receive(TRANSPORT, Bytes::from_static(&[0x80, 0x60, 0x00]));
    handler.receive(TRANSPORT, Bytes::new());
    registry.sts_queue().flush().await?;

    let received = received.lock().clone();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].header().ssrc, 1);
    assert_eq!(received[1].header().payload_type, 111);
    assert!(pipeline
        .filter()
        .map(|f| f.remote_ssrcs().contains(&1))
        .unwrap_or(false));

    let counts = pipeline.packet_counts();
    assert_eq!(counts.rtp_packets_received, 2);
    assert_eq!(transmit.packet_counts().rtp_packets_received, 0);
    assert_eq!(inactive.packet_counts().rtp_packets_received, 0);

    let csrcs: Vec<String> = pipeline
        .get_contributing_source_stats("inbound_1")
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(csrcs, vec!["csrc_inbound_1_10", "csrc_inbound_1_11"]);

    for p in [&pipeline, &transmit, &inactive] {
        p.shutdown()?;
    }
    registry.shutdown().await
}

#[tokio::test]
async fn test_set_active_repeats_are_no_ops() -> Result<()> {
    let registry = MediaRegistry::new(MediaConfig::default());
    let handler = MockTransportHandler::new();
    handler.open(TRANSPORT);

    let mut filter = MediaPipelineFilter::default();
    filter.add_payload_type(PT);
    let pipeline = bound_pipeline(&registry, &handler, Direction::Receive, Some(filter)).await?;

    pipeline.set_active(true);
    registry.sts_queue().flush().await?;
    assert!(pipeline.is_active());
    assert!(pipeline.is_active_sts());
    handler.receive(TRANSPORT, rtp_bytes(1, PT, 1, vec![])?);
    registry.sts_queue().flush().await?;
    assert_eq!(pipeline.packet_counts().rtp_packets_received, 1);

    pipeline.set_active(false);
    pipeline.set_active(false);
    registry.sts_queue().flush().await?;
    assert!(!pipeline.is_active());
    assert!(!pipeline.is_active_sts());
    handler.receive(TRANSPORT, rtp_bytes(1, PT, 2, vec![])?);
    registry.sts_queue().flush().await?;
    assert_eq!(pipeline.packet_counts().rtp_packets_received, 1);

    pipeline.set_active(true);
    registry.sts_queue().flush().await?;
    handler.receive(TRANSPORT, rtp_bytes(1, PT, 3, vec![])?);
    registry.sts_queue().flush().await?;
    assert_eq!(pipeline.packet_counts().rtp_packets_received, 2);

    // the wrappers start and stop their conduit once per change
    let tx = MediaPipelineTransmit::new(&registry, "pc", Arc::clone(&handler) as _, conduit());
    tx.set_active(true).await?;
    tx.set_active(true).await?;
    assert!(tx.transmitting());
    assert!(tx.conduit().send_channel().is_sending());
    tx.set_active(false).await?;
    tx.set_active(false).await?;
    assert!(!tx.transmitting());
    assert!(!tx.conduit().send_channel().is_sending());

    let rx = MediaPipelineReceiveAudio::new(&registry, "pc", Arc::clone(&handler) as _, conduit());
    rx.set_active(true);
    rx.set_active(true);
    assert!(rx.enabled());
    assert!(rx.conduit().is_receiving());
    rx.set_active(false);
    assert!(!rx.conduit().is_receiving());

    pipeline.shutdown()?;
    tx.shutdown().await?;
    rx.shutdown().await?;
    registry.shutdown().await
}

#[tokio::test]
async fn test_packet_dumps() -> Result<()> {
    let registry = MediaRegistry::new(MediaConfig::default());
    let handler = MockTransportHandler::new();
    handler.open(TRANSPORT);
    let pipeline = bound_pipeline(&registry, &handler, Direction::Transmit, None).await?;

    let dumper = registry.packet_dumper("pc");
    dumper.enable(0, PacketDumpType::Rtp, true);
    dumper.enable(0, PacketDumpType::Srtp, true);
    let dumps: Arc<Mutex<Vec<PacketDump>>> = Arc::new(Mutex::new(vec![]));
    let dumps2 = Arc::clone(&dumps);
    let _listener = dumper
        .packet_dumped()
        .connect_direct(move |d| dumps2.lock().push(d));

    pipeline
        .conduit()
        .sender_rtp_send_event()
        .notify(rtp_media(rtp_bytes(SSRC, PT, 1, vec![])?));
    pipeline
        .conduit()
        .sender_rtcp_send_event()
        .notify(MediaPacket::new(MediaPacketType::Rtcp, rtcp_bytes()?));
    registry.sts_queue().flush().await?;

    let types: Vec<(PacketDumpType, bool)> =
        dumps.lock().iter().map(|d| (d.typ, d.sending)).collect();
    assert_eq!(
        types,
        vec![(PacketDumpType::Rtp, true), (PacketDumpType::Srtp, true)]
    );

    pipeline.shutdown()?;
    registry.shutdown().await
}

#[tokio::test]
async fn test_audio_end_to_end() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let registry = MediaRegistry::new(MediaConfig::default());
    let handler_a = MockTransportHandler::new();
    let handler_b = MockTransportHandler::new();

    let tx_conduit = conduit();
    tx_conduit.configure_send_codec(
        PT,
        SdpAudioFormat::new("L16", 48000, 1),
        Box::new(L16Encoder::new(PT, 48000, 1, 1)?),
    );
    let tx = MediaPipelineTransmit::new(&registry, "a", Arc::clone(&handler_a) as _, tx_conduit);

    let rx_conduit = conduit();
    let mut codecs = HashMap::new();
    codecs.insert(PT, SdpAudioFormat::new("L16", 48000, 1));
    rx_conduit.configure_recv_codecs(codecs);
    let rx = MediaPipelineReceiveAudio::new(&registry, "b", Arc::clone(&handler_b) as _, rx_conduit);

    // nothing flows before the transport is up
    tx.set_active(true).await?;
    tx.send_audio_chunk(48000, AudioChunk::from_s16(vec![vec![100; 480]]));
    tx.flush().await?;
    assert!(!tx.listener_active());

    tx.pipeline().update_transport(TRANSPORT, None, true)?;
    handler_a.open(TRANSPORT);
    let mut filter = MediaPipelineFilter::default();
    filter.add_payload_type(PT);
    rx.pipeline().update_transport(TRANSPORT, Some(filter), true)?;
    handler_b.open(TRANSPORT);
    rx.set_active(true);
    registry.sts_queue().flush().await?;
    assert!(tx.listener_active());

    for _ in 0..4 {
        tx.send_audio_chunk(48000, AudioChunk::from_s16(vec![vec![100; 480]]));
    }
    tx.flush().await?;
    tx.conduit().send_channel().encoder_queue().flush().await?;
    registry.sts_queue().flush().await?;

    let sent = handler_a.sent_of_type(MediaPacketType::Rtp);
    assert_eq!(sent.len(), 4);
    for packet in &sent {
        handler_b.receive(TRANSPORT, packet.data.clone());
    }
    registry.sts_queue().flush().await?;
    registry.call_queue().flush().await?;

    let frame = rx.pull(48000);
    assert!(!frame.muted);
    assert_eq!(frame.data, vec![100; 480]);
    // unsupported rates play out at 48 kHz
    let frame = rx.pull(22050);
    assert_eq!(frame.sample_rate_hz, 48000);
    assert_eq!(frame.samples_per_channel, 480);

    let stats = rx.conduit().get_receive_stats();
    assert_eq!(stats.remote_ssrc, Some(SSRC));
    assert_eq!(stats.packets_received, 4);
    assert_eq!(tx.conduit().get_send_stats().packets_sent, 4);

    tx.shutdown().await?;
    rx.shutdown().await?;
    assert!(tx.pipeline().transport_id().is_empty());
    assert_eq!(
        tx.pipeline().transport_states(),
        crate::transport::TransportStates::default()
    );
    assert!(!tx.pipeline().conduit().transport_active());

    // the mirror is gone after shutdown
    tx.pipeline().set_active(false);
    assert!(tx.pipeline().is_active());
    assert!(rx.pull(48000).muted);

    registry.shutdown().await
}
