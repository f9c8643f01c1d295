use std::fmt;

use serde::{Deserialize, Serialize};

/// TransportLayerState is the state of one layer (RTP or RTCP) of a media transport.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportLayerState {
    /// No transport has been attached.
    #[default]
    None,
    /// ICE/DTLS negotiation is in progress.
    Connecting,
    /// Keys are installed and packets may flow.
    Open,
    Closed,
    Error,
}

const TRANSPORT_LAYER_STATE_NONE_STR: &str = "none";
const TRANSPORT_LAYER_STATE_CONNECTING_STR: &str = "connecting";
const TRANSPORT_LAYER_STATE_OPEN_STR: &str = "open";
const TRANSPORT_LAYER_STATE_CLOSED_STR: &str = "closed";
const TRANSPORT_LAYER_STATE_ERROR_STR: &str = "error";

impl From<&str> for TransportLayerState {
    fn from(raw: &str) -> Self {
        match raw {
            TRANSPORT_LAYER_STATE_CONNECTING_STR => TransportLayerState::Connecting,
            TRANSPORT_LAYER_STATE_OPEN_STR => TransportLayerState::Open,
            TRANSPORT_LAYER_STATE_CLOSED_STR => TransportLayerState::Closed,
            TRANSPORT_LAYER_STATE_ERROR_STR => TransportLayerState::Error,
            _ => TransportLayerState::None,
        }
    }
}

impl fmt::Display for TransportLayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            TransportLayerState::None => TRANSPORT_LAYER_STATE_NONE_STR,
            TransportLayerState::Connecting => TRANSPORT_LAYER_STATE_CONNECTING_STR,
            TransportLayerState::Open => TRANSPORT_LAYER_STATE_OPEN_STR,
            TransportLayerState::Closed => TRANSPORT_LAYER_STATE_CLOSED_STR,
            TransportLayerState::Error => TRANSPORT_LAYER_STATE_ERROR_STR,
        };
        write!(f, "{s}")
    }
}

impl TransportLayerState {
    /// Closed and Error are final; the layer never opens again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportLayerState::Closed | TransportLayerState::Error)
    }

    pub fn is_open(&self) -> bool {
        *self == TransportLayerState::Open
    }
}

/// TransportStates tracks the RTP and RTCP layers of one transport independently.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransportStates {
    pub rtp: TransportLayerState,
    pub rtcp: TransportLayerState,
}

impl TransportStates {
    pub fn get(&self, rtcp: bool) -> TransportLayerState {
        if rtcp {
            self.rtcp
        } else {
            self.rtp
        }
    }

    pub fn set(&mut self, rtcp: bool, state: TransportLayerState) {
        if rtcp {
            self.rtcp = state;
        } else {
            self.rtp = state;
        }
    }

    /// Both layers are open.
    pub fn is_ready(&self) -> bool {
        self.rtp.is_open() && self.rtcp.is_open()
    }

    pub fn any_terminal(&self) -> bool {
        self.rtp.is_terminal() || self.rtcp.is_terminal()
    }
}
