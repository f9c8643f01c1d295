use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("RTP header size insufficient")]
    ErrHeaderSizeInsufficient,
    #[error("RTP header size insufficient for extension")]
    ErrHeaderSizeInsufficientForExtension,
    #[error("buffer too small")]
    ErrBufferTooSmall,
    #[error("invalid RTP version {0}")]
    ErrInvalidVersion(u8),
    #[error("invalid RTP padding")]
    ErrInvalidPadding,
    #[error("extension not enabled")]
    ErrHeaderExtensionsNotEnabled,
    #[error("extension not found")]
    ErrHeaderExtensionNotFound,
    #[error("header extension id must be between 1 and 14 for RFC 5285 one byte extensions")]
    ErrRfc8285oneByteHeaderIdrange,
    #[error("header extension payload must be 16bytes or less for RFC 5285 one byte extensions")]
    ErrRfc8285oneByteHeaderSize,
    #[error("header extension id must be between 1 and 255 for RFC 5285 two byte extensions")]
    ErrRfc8285twoByteHeaderIdrange,
    #[error("header extension payload must be 255bytes or less for RFC 5285 two byte extensions")]
    ErrRfc8285twoByteHeaderSize,
    #[error("header extension id must be 0 for non-RFC 5285 extensions")]
    ErrRfc3550headerIdrange,
    #[error("packet is not large enough")]
    ErrShortPacket,
    #[error("extension_payload must be in 32-bit words")]
    HeaderExtensionPayloadNot32BitWords,

    #[error("header extension value has invalid size {0}")]
    ErrExtensionValueSize(usize),
    #[error("header extension {0} is not registered")]
    ErrExtensionNotRegistered(&'static str),
    #[error("header extension id {0} is out of range")]
    ErrExtensionIdRange(u8),
    #[error("header extension id {0} is already registered for another extension")]
    ErrExtensionIdInUse(u8),
    #[error("header extension {0} is already registered with id {1}")]
    ErrExtensionAlreadyRegistered(&'static str, u8),
    #[error("unknown header extension uri {0}")]
    ErrUnknownExtensionUri(String),
    #[error("audio level overflow")]
    AudioLevelOverflow,
    #[error("playout delay overflow")]
    PlayoutDelayOverflow,
    #[error("playout delay min must not exceed max")]
    PlayoutDelayInverted,
    #[error("transmission offset does not fit 24 bits")]
    TransmissionOffsetOverflow,
    #[error("feedback request sequence count does not fit 15 bits")]
    FeedbackRequestOverflow,
    #[error("csrc audio level count must be between 1 and 15")]
    CsrcAudioLevelCount,
    #[error("invalid video content type {0}")]
    InvalidVideoContentType(u8),
    #[error("invalid video orientation byte {0}")]
    InvalidVideoOrientation(u8),
    #[error("invalid color space {0} value {1}")]
    InvalidColorSpace(&'static str, u8),
    #[error("invalid HDR metadata")]
    InvalidHdrMetadata,
    #[error("string extension must be 1 to 16 bytes")]
    InvalidStringExtension,

    #[error("{0}")]
    Util(#[from] util::Error),

    #[error("{0}")]
    Other(String),
}

impl From<Error> for util::Error {
    fn from(e: Error) -> Self {
        util::Error::from_std(e)
    }
}

impl PartialEq<util::Error> for Error {
    fn eq(&self, other: &util::Error) -> bool {
        if let Some(down) = other.downcast_ref::<Error>() {
            self == down
        } else {
            false
        }
    }
}
