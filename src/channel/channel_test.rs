use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use rtcp::goodbye::Goodbye;
use rtp::extension::audio_level_extension::AudioLevelExtension;
use rtp::packet::Packet;
use util::marshal::Unmarshal;

use super::audio_coding::AudioCoding;
use super::bitrate_accountant::AudioBitrateAccountant;
use super::*;
use crate::audio::jitter_buffer::JitterBufferConfig;
use crate::audio::AudioFrame;
use crate::crypto::{CryptoOptions, FrameDecryptor, FrameEncryptor};
use crate::error::{Error, Result};
use crate::event::{MediaEventListener, MediaEventProducer};
use crate::frame_transformer::FnFrameTransformer;
use crate::media_packet::MediaPacket;

const PT: u8 = 96;
const SSRC: u32 = 0x1234_5678;

type Collected = Arc<Mutex<Vec<MediaPacket>>>;

fn collect(producer: &MediaEventProducer<MediaPacket>) -> (Collected, MediaEventListener) {
    let out: Collected = Arc::new(Mutex::new(vec![]));
    let out2 = Arc::clone(&out);
    let listener = producer.connect_direct(move |p| out2.lock().push(p));
    (out, listener)
}

fn rtp_packets(collected: &Collected) -> Result<Vec<Packet>> {
    let mut packets = vec![];
    for p in collected.lock().iter() {
        let mut data = p.data.clone();
        packets.push(Packet::unmarshal(&mut data)?);
    }
    Ok(packets)
}

fn frame(value: i16, capture_ms: Option<i64>) -> Result<AudioFrame> {
    let mut frame = AudioFrame::from_interleaved(vec![value; 480], 48000, 1)?;
    frame.absolute_capture_timestamp_ms = capture_ms;
    Ok(frame)
}

fn l16_sender(config: ChannelSendConfig) -> Result<ChannelSend> {
    let send = ChannelSend::new(config.with_ssrc(SSRC).with_rtcp_report_interval(Duration::ZERO));
    send.set_encoder(
        PT,
        SdpAudioFormat::new("L16", 48000, 1),
        Box::new(L16Encoder::new(PT, 48000, 1, 1)?),
    );
    Ok(send)
}

fn l16_receiver(config: ChannelReceiveConfig) -> ChannelReceive {
    let receive = ChannelReceive::new(config.with_rtcp_report_interval(Duration::ZERO));
    let mut codecs = HashMap::new();
    codecs.insert(PT, SdpAudioFormat::new("L16", 48000, 1));
    receive.set_receive_codecs(codecs);
    receive
}

fn samples(payload: &[u8]) -> Vec<i16> {
    payload
        .chunks_exact(2)
        .map(|b| i16::from_be_bytes([b[0], b[1]]))
        .collect()
}

struct Xor;

impl FrameEncryptor for Xor {
    fn max_ciphertext_byte_size(&self, frame_size: usize) -> usize {
        frame_size + 4
    }

    fn encrypt(&self, _ssrc: u32, frame: &[u8], out: &mut [u8]) -> Result<usize> {
        for (o, b) in out.iter_mut().zip(frame) {
            *o = b ^ 0xFF;
        }
        Ok(frame.len())
    }
}

impl FrameDecryptor for Xor {
    fn max_plaintext_byte_size(&self, frame_size: usize) -> usize {
        frame_size
    }

    fn decrypt(&self, _csrcs: &[u32], frame: &[u8], out: &mut [u8]) -> Result<usize> {
        for (o, b) in out.iter_mut().zip(frame) {
            *o = b ^ 0xFF;
        }
        Ok(frame.len())
    }
}

#[test]
fn test_l16_round_trip() -> Result<()> {
    let mut encoder = L16Encoder::new(PT, 16000, 2, 2)?;
    let audio: Vec<i16> = (0..320).map(|i| i as i16 * 97 - 15000).collect();

    let mut encoded = vec![];
    let info = encoder.encode(1000, &audio, &mut encoded)?;
    assert_eq!(info.encoded_bytes, 0, "first block of two is buffered");
    let info = encoder.encode(1160, &audio, &mut encoded)?;
    assert_eq!(info.encoded_bytes, 1280);
    assert_eq!(info.encoded_timestamp, 1000);

    let mut decoder = L16Decoder::new(16000, 2)?;
    let mut decoded = vec![];
    assert_eq!(decoder.decode(&encoded, &mut decoded)?, 320);
    assert_eq!(&decoded[..320], &audio[..]);
    assert_eq!(&decoded[320..], &audio[..]);

    assert!(decoder.decode(&encoded[..3], &mut decoded).is_err());
    assert_eq!(
        encoder.encode(0, &audio[..100], &mut encoded),
        Err(Error::ErrAudioFrameSize {
            expected: 320,
            got: 100
        })
    );
    assert!(L16Encoder::new(PT, 22050, 1, 1).is_err());
    assert!(L16Decoder::new(48000, 3).is_err());
    Ok(())
}

#[test]
fn test_bitrate_accountant() {
    let mut accountant = AudioBitrateAccountant::new();
    assert_eq!(accountant.get_used_rate(), None);

    accountant.update_bps_estimate(100, Duration::from_millis(10));
    assert_eq!(accountant.get_used_rate(), Some(137_600));

    // a 20 ms frame completed by the second update
    accountant.update_bps_estimate(0, Duration::from_millis(10));
    accountant.update_bps_estimate(50, Duration::from_millis(10));
    assert_eq!(accountant.get_used_rate(), Some(137_600));

    accountant.update_bps_estimate(50, Duration::from_millis(10));
    assert_eq!(accountant.get_used_rate(), Some(97_600));

    accountant.register_packet_overhead(0);
    accountant.reset();
    assert_eq!(accountant.get_used_rate(), None);
    accountant.update_bps_estimate(10, Duration::from_millis(10));
    assert_eq!(accountant.get_used_rate(), Some(8_000));
}

#[test]
fn test_audio_coding_resamples_and_maps_timestamps() -> Result<()> {
    let mut coding = AudioCoding::new();
    let mut frame = AudioFrame::from_interleaved(vec![500; 160], 16000, 1)?;
    assert_eq!(coding.add_10ms_data(&frame), Err(Error::ErrNoEncoder));

    coding.set_encoder(Box::new(L16Encoder::new(PT, 48000, 1, 1)?));
    // the resampler holds back its first input frame
    assert!(coding.add_10ms_data(&frame)?.is_empty());

    frame.timestamp = 160;
    let first = coding.add_10ms_data(&frame)?;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].payload.len(), 960);
    assert_eq!(first[0].rtp_timestamp, 0);

    // skip one 10 ms frame of input
    frame.timestamp = 480;
    let second = coding.add_10ms_data(&frame)?;
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].rtp_timestamp, 960);
    assert_eq!(coding.get_target_bitrate(), Some(768_000));
    Ok(())
}

#[tokio::test]
async fn test_channel_send_packetizes_frames() -> Result<()> {
    let send = l16_sender(ChannelSendConfig::new())?;
    let (sent, _listener) = collect(send.rtp_packet_sent());

    send.process_and_encode_audio(frame(1, Some(0))?);
    send.encoder_queue().flush().await?;
    assert!(sent.lock().is_empty(), "frames before start_send are dropped");

    send.start_send()?;
    for i in 0..3 {
        send.process_and_encode_audio(frame((i + 1) * 100, Some(1000 + i as i64 * 10))?);
    }
    send.encoder_queue().flush().await?;

    let packets = rtp_packets(&sent)?;
    assert_eq!(packets.len(), 3);
    for (i, p) in packets.iter().enumerate() {
        assert_eq!(p.header.ssrc, SSRC);
        assert_eq!(p.header.payload_type, PT);
        assert_eq!(samples(&p.payload), vec![(i as i16 + 1) * 100; 480]);
    }
    assert!(packets[0].header.marker);
    assert_eq!(
        packets[1].header.timestamp.wrapping_sub(packets[0].header.timestamp),
        480
    );
    assert_eq!(
        packets[2]
            .header
            .sequence_number
            .wrapping_sub(packets[0].header.sequence_number),
        2
    );
    assert_eq!(
        packets[0].header.timestamp,
        send.rtp_rtcp().start_timestamp()
    );

    let stats = send.get_rtcp_statistics();
    assert_eq!(stats.packets_sent, 3);
    assert_eq!(stats.payload_bytes_sent, 3 * 960);
    assert!(stats.used_rate_bps.is_some());

    send.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_channel_send_closes_capture_gap_on_resume() -> Result<()> {
    let send = l16_sender(ChannelSendConfig::new())?;
    let (sent, _listener) = collect(send.rtp_packet_sent());

    send.start_send()?;
    send.process_and_encode_audio(frame(1, Some(1000))?);
    send.process_and_encode_audio(frame(1, Some(1010))?);
    send.encoder_queue().flush().await?;
    send.stop_send().await?;

    send.start_send()?;
    send.process_and_encode_audio(frame(1, Some(1100))?);
    send.encoder_queue().flush().await?;

    let packets = rtp_packets(&sent)?;
    assert_eq!(packets.len(), 3);
    // 100 ms after the first frame
    assert_eq!(
        packets[2].header.timestamp.wrapping_sub(packets[0].header.timestamp),
        4800
    );

    send.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_channel_send_extreme_capture_gaps() -> Result<()> {
    let send = l16_sender(ChannelSendConfig::new())?;
    let (sent, _listener) = collect(send.rtp_packet_sent());

    send.start_send()?;
    send.process_and_encode_audio(frame(1, Some(0))?);
    send.encoder_queue().flush().await?;
    send.stop_send().await?;

    // capture time going backwards adds no gap
    send.start_send()?;
    send.process_and_encode_audio(frame(1, Some(i64::MIN))?);
    send.encoder_queue().flush().await?;
    send.stop_send().await?;

    // the widest possible jump saturates instead of overflowing
    send.start_send()?;
    send.process_and_encode_audio(frame(1, Some(i64::MAX))?);
    send.encoder_queue().flush().await?;

    let packets = rtp_packets(&sent)?;
    assert_eq!(packets.len(), 3);
    assert_eq!(
        packets[1].header.timestamp.wrapping_sub(packets[0].header.timestamp),
        480
    );

    send.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_channel_send_mute_and_audio_level() -> Result<()> {
    let send = l16_sender(ChannelSendConfig::new())?;
    send.set_send_audio_level_indication_status(true, 1)?;
    let (sent, _listener) = collect(send.rtp_packet_sent());

    send.start_send()?;
    send.set_input_mute(true);
    assert!(send.input_mute());
    send.process_and_encode_audio(frame(1000, None)?);
    send.process_and_encode_audio(frame(1000, None)?);
    send.encoder_queue().flush().await?;

    let packets = rtp_packets(&sent)?;
    assert_eq!(packets.len(), 2);

    // the first frame fades out over its tail
    let first = samples(&packets[0].payload);
    assert_eq!(first[0], 1000);
    assert_eq!(first[479], 0);
    assert!(samples(&packets[1].payload).iter().all(|s| *s == 0));

    let extensions = send.rtp_rtcp().send_extensions();
    let level = packets[1]
        .header
        .get_extension_value::<AudioLevelExtension>(&extensions)
        .map(|e| e.level);
    assert_eq!(level, Some(127));

    send.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_channel_send_requires_encryptor() -> Result<()> {
    let send = l16_sender(ChannelSendConfig::new().with_crypto_options(CryptoOptions {
        require_frame_encryption: true,
    }))?;
    let (sent, _listener) = collect(send.rtp_packet_sent());

    send.start_send()?;
    send.process_and_encode_audio(frame(7, None)?);
    send.encoder_queue().flush().await?;
    assert!(sent.lock().is_empty());

    send.set_frame_encryptor(Some(Arc::new(Xor)));
    send.process_and_encode_audio(frame(7, None)?);
    send.encoder_queue().flush().await?;

    let packets = rtp_packets(&sent)?;
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].payload.len(), 960);
    assert_eq!(&packets[0].payload[..2], &[0xFF, 0xF8]);

    send.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_channel_send_frame_transformer() -> Result<()> {
    let send = l16_sender(ChannelSendConfig::new())?;
    let (sent, _listener) = collect(send.rtp_packet_sent());

    send.set_encoder_to_packetizer_frame_transformer(FnFrameTransformer::new(|mut frame| {
        assert!(frame.is_sender());
        assert_eq!(frame.audio().mime_type, "audio/L16");
        frame.audio_mut().set_data(vec![1u8, 2, 3]);
        Some(frame)
    }));
    send.start_send()?;
    send.process_and_encode_audio(frame(5, None)?);
    send.process_and_encode_audio(frame(5, None)?);
    // once for encoding, once for the transformed frames
    send.encoder_queue().flush().await?;
    send.encoder_queue().flush().await?;

    let packets = rtp_packets(&sent)?;
    assert_eq!(packets.len(), 2);
    assert_eq!(&packets[0].payload[..], &[1, 2, 3]);
    assert_eq!(
        packets[0].header.timestamp,
        send.rtp_rtcp().start_timestamp()
    );
    assert_eq!(
        packets[1].header.timestamp.wrapping_sub(packets[0].header.timestamp),
        480
    );

    send.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_channel_send_stop_sends_bye() -> Result<()> {
    let send = l16_sender(ChannelSendConfig::new().with_cname("alice"))?;
    let (rtcp, _listener) = collect(send.rtcp_packet_sent());

    send.start_send()?;
    assert!(send.is_sending());
    send.stop_send().await?;
    assert!(!send.is_sending());
    // a second stop is a no-op
    send.stop_send().await?;

    let packets = rtcp.lock().clone();
    assert_eq!(packets.len(), 1);
    let mut data = packets[0].data.clone();
    let parsed = rtcp::packet::unmarshal(&mut data)?;
    let bye = parsed
        .iter()
        .find_map(|p| p.as_any().downcast_ref::<Goodbye>())
        .map(|b| b.sources.clone());
    assert_eq!(bye, Some(vec![SSRC]));

    send.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_channel_receive_plays_out_sent_audio() -> Result<()> {
    let send = l16_sender(ChannelSendConfig::new())?;
    let receive = l16_receiver(
        ChannelReceiveConfig::new().with_jitter_buffer(JitterBufferConfig {
            depth: 2,
            max_packets: 50,
        }),
    );
    send.set_frame_encryptor(Some(Arc::new(Xor)));
    receive.set_frame_decryptor(Some(Arc::new(Xor)));
    let (sent, _listener) = collect(send.rtp_packet_sent());

    send.start_send()?;
    for i in 0..4 {
        send.process_and_encode_audio(frame((i + 1) * 10, None)?);
    }
    send.encoder_queue().flush().await?;
    let packets = rtp_packets(&sent)?;
    assert_eq!(packets.len(), 4);

    // not playing yet: accounted but not buffered
    receive.on_rtp_packet(&packets[0], SystemTime::now())?;
    let silent = receive.get_audio_frame_with_info(48000);
    assert!(silent.muted);

    receive.start_playout();
    for p in &packets[1..] {
        receive.on_rtp_packet(p, SystemTime::now())?;
    }

    let out = receive.get_audio_frame_with_info(48000);
    assert!(!out.muted);
    assert_eq!(out.data, vec![20; 480]);
    let out = receive.get_audio_frame_with_info(16000);
    assert_eq!(out.samples_per_channel, 160);
    assert!(out.data.iter().all(|s| *s == 30));

    let stats = receive.get_rtcp_statistics();
    assert_eq!(stats.remote_ssrc, Some(SSRC));
    assert_eq!(stats.packets_received, 4);
    assert_eq!(stats.packets_lost, 0);
    assert_eq!(stats.decrypt_failures, 0);

    let sources = receive.get_sources();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].source_id, SSRC);
    assert_eq!(sources[0].source_type, RtpSourceType::Ssrc);

    receive.stop_playout();
    assert!(receive.get_audio_frame_with_info(48000).muted);

    send.close().await?;
    receive.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_channel_receive_transformer_follows_remote_ssrc() -> Result<()> {
    let receive = l16_receiver(ChannelReceiveConfig::new());
    let transformer = FnFrameTransformer::passthrough();
    receive.set_depacketizer_to_decoder_frame_transformer(transformer.clone());
    // no remote SSRC yet
    assert_eq!(transformer.registered_ssrcs(), vec![0]);

    let packet = |ssrc: u32, seq: u16| Packet {
        header: rtp::header::Header {
            version: 2,
            payload_type: PT,
            sequence_number: seq,
            ssrc,
            ..Default::default()
        },
        payload: bytes::Bytes::from_static(&[0, 1, 0, 2]),
        ..Default::default()
    };
    receive.on_rtp_packet(&packet(SSRC, 1), SystemTime::now())?;
    assert_eq!(transformer.registered_ssrcs(), vec![SSRC]);
    receive.on_rtp_packet(&packet(SSRC, 2), SystemTime::now())?;
    assert_eq!(transformer.registered_ssrcs(), vec![SSRC]);

    receive.on_rtp_packet(&packet(SSRC + 1, 3), SystemTime::now())?;
    assert_eq!(transformer.registered_ssrcs(), vec![SSRC + 1]);

    receive.close().await?;
    assert!(transformer.registered_ssrcs().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_channel_receive_underrun_and_drops() -> Result<()> {
    let receive = l16_receiver(ChannelReceiveConfig::new().with_crypto_options(CryptoOptions {
        require_frame_encryption: true,
    }));
    receive.start_playout();

    let out = receive.get_audio_frame_with_info(32000);
    assert!(out.muted);
    assert_eq!(out.data.len(), 320);

    let mut packet = Packet::default();
    packet.header.version = 2;
    packet.header.ssrc = SSRC;
    packet.header.payload_type = PT;
    packet.payload = bytes::Bytes::from_static(&[0, 1, 0, 2]);
    assert_eq!(
        receive.on_rtp_packet(&packet, SystemTime::now()),
        Err(Error::ErrDecryptorRequired)
    );
    assert_eq!(receive.get_rtcp_statistics().packets_received, 1);

    packet.header.payload_type = 100;
    assert_eq!(
        receive.on_rtp_packet(&packet, SystemTime::now()),
        Err(Error::ErrNoDecoder(100))
    );

    receive.close().await?;
    Ok(())
}
