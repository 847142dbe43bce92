//! Transfer frame codec.
//!
//! A frame is three fields written back to back with no delimiters:
//!
//! ```text
//! +----------------+----------------------+------------------------+
//! | size (u32 LE)  | sha1 digest (20 B)   | content (size bytes)   |
//! +----------------+----------------------+------------------------+
//! ```
//!
//! Example for a file containing `hello`:
//!
//! ```text
//! 05 00 00 00 aa f4 c6 1d ... 43 4d 68 65 6c 6c 6f
//! ```

use bytes::Bytes;
use ring::digest::{digest, SHA1_FOR_LEGACY_USE_ONLY};
use thiserror::Error;

/// Length of the little-endian size field.
pub const SIZE_LEN: usize = 4;

/// Length of a SHA-1 digest.
pub const DIGEST_LEN: usize = 20;

/// Fixed header preceding the content.
pub const HEADER_LEN: usize = SIZE_LEN + DIGEST_LEN;

pub type Digest = [u8; DIGEST_LEN];

/// Compute the SHA-1 digest of `data`.
pub fn sha1(data: &[u8]) -> Digest {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(digest(&SHA1_FOR_LEGACY_USE_ONLY, data).as_ref());
    out
}

/// Frame construction and verification errors.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("content of {len} bytes does not fit in a u32 size field")]
    TooLarge { len: usize },

    #[error("digest mismatch: frame carries {expected}, content hashes to {actual}")]
    DigestMismatch { expected: String, actual: String },
}

/// One transfer frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    size: u32,
    digest: Digest,
    content: Bytes,
}

impl Frame {
    /// Build a frame whose size field is the content length.
    pub fn new(content: Bytes) -> Result<Self, FrameError> {
        let size = u32::try_from(content.len())
            .map_err(|_| FrameError::TooLarge { len: content.len() })?;
        Ok(Self::with_declared_size(size, content))
    }

    /// Build a frame with a size determined elsewhere (e.g. file metadata).
    ///
    /// The digest is always computed over `content`, so the size field may
    /// disagree with the content when the caller's size is stale.
    pub fn with_declared_size(size: u32, content: Bytes) -> Self {
        let digest = sha1(&content);
        Self {
            size,
            digest,
            content,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Hex rendering of the digest, for logs.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest())
    }

    /// True when the size field matches the content length.
    pub fn is_consistent(&self) -> bool {
        self.size as usize == self.content.len()
    }

    /// Total number of bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.content.len()
    }

    /// The `size | digest` header.
    pub fn header(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[..SIZE_LEN].copy_from_slice(&self.size.to_le_bytes());
        header[SIZE_LEN..].copy_from_slice(&self.digest);
        header
    }

    /// Check the carried digest against the content.
    pub fn verify(&self) -> Result<(), FrameError> {
        let actual = sha1(&self.content);
        if actual == self.digest {
            Ok(())
        } else {
            Err(FrameError::DigestMismatch {
                expected: hex::encode(self.digest),
                actual: hex::encode(actual),
            })
        }
    }
}

/// Result of decoding a frame from a buffer.
#[derive(Debug)]
pub enum ParseResult {
    /// A whole frame and the number of bytes it consumed.
    Complete(Frame, usize),
    /// At least `needed` more bytes are required.
    Incomplete { needed: usize },
}

/// Decode one frame from the front of `input`.
///
/// The content length is taken from the size field and the carried digest is
/// kept as-is; call [`Frame::verify`] to check it.
pub fn parse(input: &[u8]) -> ParseResult {
    if input.len() < HEADER_LEN {
        return ParseResult::Incomplete {
            needed: HEADER_LEN - input.len(),
        };
    }

    let (size, digest) = parse_header(&input[..HEADER_LEN]);
    let total = HEADER_LEN + size as usize;
    if input.len() < total {
        return ParseResult::Incomplete {
            needed: total - input.len(),
        };
    }

    let frame = Frame {
        size,
        digest,
        content: Bytes::copy_from_slice(&input[HEADER_LEN..total]),
    };
    ParseResult::Complete(frame, total)
}

/// Split a 24-byte header into its size and digest.
fn parse_header(header: &[u8]) -> (u32, Digest) {
    let mut size = [0u8; SIZE_LEN];
    size.copy_from_slice(&header[..SIZE_LEN]);
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&header[SIZE_LEN..HEADER_LEN]);
    (u32::from_le_bytes(size), digest)
}
