use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::event::MediaEventProducer;
use crate::media_packet::{MediaPacket, MediaPacketType};
use crate::transport::*;

/// MockTransportHandler records every packet sent through it and lets the
/// caller drive layer states and inbound traffic by hand.
#[derive(Default)]
pub struct MockTransportHandler {
    states: Mutex<HashMap<String, TransportStates>>,
    sent: Mutex<Vec<(String, MediaPacket)>>,

    state_change: MediaEventProducer<StateChangeEvent>,
    rtcp_state_change: MediaEventProducer<StateChangeEvent>,
    packet_received: MediaEventProducer<PacketReceivedEvent>,
    encrypted_sending: MediaEventProducer<EncryptedSendingEvent>,
}

impl MockTransportHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Changes one layer of `transport_id` and fires the matching event.
    pub fn set_state(&self, transport_id: &str, rtcp: bool, state: TransportLayerState) {
        {
            let mut states = self.states.lock();
            states
                .entry(transport_id.to_owned())
                .or_default()
                .set(rtcp, state);
        }
        let event = (transport_id.to_owned(), state);
        if rtcp {
            self.rtcp_state_change.notify(event);
        } else {
            self.state_change.notify(event);
        }
    }

    /// Opens both layers of `transport_id`.
    pub fn open(&self, transport_id: &str) {
        self.set_state(transport_id, false, TransportLayerState::Open);
        self.set_state(transport_id, true, TransportLayerState::Open);
    }

    /// Delivers a datagram as if it had arrived and been unprotected. Returns
    /// the shared slot so a test can check whether a consumer took it.
    pub fn receive(&self, transport_id: &str, data: Bytes) -> Arc<Mutex<MediaPacket>> {
        let packet = Arc::new(Mutex::new(MediaPacket::from_datagram(data)));
        self.packet_received
            .notify((transport_id.to_owned(), Arc::clone(&packet)));
        packet
    }

    pub fn sent(&self) -> Vec<(String, MediaPacket)> {
        self.sent.lock().clone()
    }

    pub fn sent_of_type(&self, typ: MediaPacketType) -> Vec<MediaPacket> {
        self.sent
            .lock()
            .iter()
            .filter(|(_, p)| p.typ == typ)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }
}

impl MediaTransportHandler for MockTransportHandler {
    fn state(&self, transport_id: &str, rtcp: bool) -> TransportLayerState {
        let states = self.states.lock();
        states
            .get(transport_id)
            .map(|s| s.get(rtcp))
            .unwrap_or_default()
    }

    fn send_packet(&self, transport_id: &str, packet: MediaPacket) {
        log::trace!(
            "mock transport {transport_id} sending {} bytes of {}",
            packet.len(),
            packet.typ
        );

        let mut encrypted = packet.clone();
        encrypted.typ = match packet.typ {
            MediaPacketType::Rtp => MediaPacketType::Srtp,
            MediaPacketType::Rtcp => MediaPacketType::Srtcp,
            other => other,
        };
        self.encrypted_sending
            .notify((transport_id.to_owned(), encrypted));

        self.sent.lock().push((transport_id.to_owned(), packet));
    }

    fn state_change(&self) -> &MediaEventProducer<StateChangeEvent> {
        &self.state_change
    }

    fn rtcp_state_change(&self) -> &MediaEventProducer<StateChangeEvent> {
        &self.rtcp_state_change
    }

    fn packet_received(&self) -> &MediaEventProducer<PacketReceivedEvent> {
        &self.packet_received
    }

    fn encrypted_sending(&self) -> &MediaEventProducer<EncryptedSendingEvent> {
        &self.encrypted_sending
    }
}
