#![warn(rust_2018_idioms)]
#![allow(dead_code)]

// re-export sub-crates
pub use rtcp;
pub use rtp;
pub use util;

pub mod audio;
pub mod channel;
pub mod conduit;
pub mod crypto;
pub mod error;
pub mod event;
pub mod frame_transformer;
pub mod media_packet;
pub mod mock;
pub mod pipeline;
pub mod registry;
pub mod rtp_rtcp;
pub mod task_queue;
pub mod transport;

pub use error::{Error, Result};

/// Length of one audio packetization interval.
pub(crate) const AUDIO_FRAME_DURATION_MS: u32 = 10;

/// Number of 10 ms frames per second.
pub(crate) const AUDIO_FRAMES_PER_SECOND: u32 = 1000 / AUDIO_FRAME_DURATION_MS;

/// Equal to UDP MTU
pub(crate) const RECEIVE_MTU: usize = 1460;
