use std::num::ParseIntError;

use thiserror::Error;
use tokio::sync::mpsc::error::SendError as MpscSendError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// ErrTransportNotOpen indicates a send on a transport layer that is not open.
    #[error("transport layer not open")]
    ErrTransportNotOpen,

    /// ErrTransportUnknown indicates an operation on a transport id the pipeline does not use.
    #[error("unknown transport id: {0}")]
    ErrTransportUnknown(String),

    /// ErrTaskQueueClosed indicates a post to a queue whose worker has stopped.
    #[error("task queue closed")]
    ErrTaskQueueClosed,

    /// ErrFlushTimeout indicates a flush barrier that did not run in time.
    #[error("task queue flush timed out")]
    ErrFlushTimeout,

    #[error("no encoder set")]
    ErrNoEncoder,
    #[error("no decoder set for payload type {0}")]
    ErrNoDecoder(u8),
    #[error("encoder failed: {0}")]
    ErrEncoder(String),
    #[error("decoder failed: {0}")]
    ErrDecoder(String),
    #[error("unsupported sample rate {0}")]
    ErrUnsupportedSampleRate(u32),
    #[error("unsupported channel count {0}")]
    ErrUnsupportedChannels(usize),
    #[error("audio frame holds {got} samples, expected {expected}")]
    ErrAudioFrameSize { expected: usize, got: usize },

    /// ErrEncryptionFailed indicates the frame encryptor returned an error.
    #[error("frame encryption failed: {0}")]
    ErrEncryptionFailed(String),
    /// ErrDecryptionFailed indicates the frame decryptor returned an error.
    #[error("frame decryption failed: {0}")]
    ErrDecryptionFailed(String),
    /// ErrEncryptorRequired indicates frame encryption is mandatory but no encryptor is set.
    #[error("frame encryption required but no encryptor set")]
    ErrEncryptorRequired,
    /// ErrDecryptorRequired indicates frame decryption is mandatory but no decryptor is set.
    #[error("frame decryption required but no decryptor set")]
    ErrDecryptorRequired,

    #[error("rtp module not sending")]
    ErrNotSending,
    #[error("empty payload")]
    ErrEmptyPayload,
    #[error("packet filtered")]
    ErrPacketFiltered,
    #[error("not an rtp packet")]
    ErrNotRtp,
    #[error("not an rtcp packet")]
    ErrNotRtcp,
    #[error("frame transformer delegate not initialized")]
    ErrDelegateNotInitialized,
    #[error("invalid config: {0}")]
    ErrInvalidConfig(String),

    #[error("{0}")]
    Rtp(#[from] rtp::Error),
    #[error("{0}")]
    Rtcp(#[from] rtcp::Error),
    #[error("{0}")]
    Util(#[from] util::Error),
    #[error("mpsc send: {0}")]
    MpscSend(String),
    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("json: {0}")]
    Json(String),

    #[error("{0}")]
    Other(String),
}

// Because Tokio SendError is parameterized, we sadly lose the backtrace.
impl<T> From<MpscSendError<T>> for Error {
    fn from(e: MpscSendError<T>) -> Self {
        Error::MpscSend(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}

impl From<Error> for util::Error {
    fn from(e: Error) -> Self {
        util::Error::from_std(e)
    }
}

impl PartialEq<rtp::Error> for Error {
    fn eq(&self, other: &rtp::Error) -> bool {
        if let Error::Rtp(e) = self {
            return e == other;
        }
        false
    }
}
