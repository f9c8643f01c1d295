use serde::{Deserialize, Serialize};

use crate::error::Result;

/// CryptoOptions holds the frame protection policy of a channel.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoOptions {
    /// Refuse to send or accept frames without a frame encryptor/decryptor.
    pub require_frame_encryption: bool,
}

/// FrameEncryptor protects an encoded frame before packetization.
pub trait FrameEncryptor: Send + Sync {
    /// Upper bound on the ciphertext size for a frame of `frame_size` bytes.
    fn max_ciphertext_byte_size(&self, frame_size: usize) -> usize;

    /// Encrypts `frame` into `out` and returns the number of bytes written.
    fn encrypt(&self, ssrc: u32, frame: &[u8], out: &mut [u8]) -> Result<usize>;
}

/// FrameDecryptor reverses a FrameEncryptor on the receive side.
pub trait FrameDecryptor: Send + Sync {
    fn max_plaintext_byte_size(&self, frame_size: usize) -> usize;

    /// Decrypts `frame` into `out` and returns the number of bytes written.
    fn decrypt(&self, csrcs: &[u32], frame: &[u8], out: &mut [u8]) -> Result<usize>;
}
