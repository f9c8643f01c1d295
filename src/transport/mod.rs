#[cfg(test)]
mod transport_test;

pub mod transport_state;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::MediaEventProducer;
use crate::media_packet::MediaPacket;
pub use transport_state::{TransportLayerState, TransportStates};

/// StateChangeEvent carries the transport id and its new layer state.
pub type StateChangeEvent = (String, TransportLayerState);

/// PacketReceivedEvent carries the transport id and the received datagram.
/// Every pipeline bound to the transport sees the same slot, so the first
/// consumer to `take()` the packet wins.
pub type PacketReceivedEvent = (String, Arc<Mutex<MediaPacket>>);

/// EncryptedSendingEvent carries a packet after protection, for dumping.
pub type EncryptedSendingEvent = (String, MediaPacket);

/// MediaTransportHandler owns the sockets and the ICE/DTLS/SRTP machinery of
/// every transport. Pipelines hand it plaintext packets and listen to its events.
pub trait MediaTransportHandler: Send + Sync {
    /// Returns the current state of the RTP layer, or the RTCP layer when
    /// `rtcp` is set.
    fn state(&self, transport_id: &str, rtcp: bool) -> TransportLayerState;

    /// Protects and sends `packet` on the transport.
    fn send_packet(&self, transport_id: &str, packet: MediaPacket);

    fn state_change(&self) -> &MediaEventProducer<StateChangeEvent>;
    fn rtcp_state_change(&self) -> &MediaEventProducer<StateChangeEvent>;
    fn packet_received(&self) -> &MediaEventProducer<PacketReceivedEvent>;
    fn encrypted_sending(&self) -> &MediaEventProducer<EncryptedSendingEvent>;
}
