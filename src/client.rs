//! Fetch client.
//!
//! Mirrors what a device updater does against the responder: connect, send an
//! identifying trigger, read the size, the digest and then exactly `size`
//! content bytes, and accept the content only if its SHA-1 matches.

use crate::frame::{self, Frame, FrameError, ParseResult, HEADER_LEN};
use bytes::BytesMut;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Largest chunk requested from the socket at a time.
const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("trigger must contain at least one byte")]
    EmptyTrigger,

    #[error("connection closed after {received} of {expected} frame bytes")]
    Closed { received: usize, expected: usize },

    #[error("no complete frame within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Read exactly one frame from `reader`.
///
/// A close before the frame is complete is an error, never an empty frame.
/// The digest is not checked here.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, ClientError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(HEADER_LEN);

    loop {
        match frame::parse(&buffer) {
            ParseResult::Complete(frame, consumed) => {
                debug!(
                    size = frame.size(),
                    bytes = consumed,
                    digest = %frame.digest_hex(),
                    "Frame received"
                );
                return Ok(frame);
            }
            ParseResult::Incomplete { needed } => {
                // Never read past the end of this frame.
                let want = needed.min(CHUNK_SIZE);
                let n = (&mut *reader)
                    .take(want as u64)
                    .read_buf(&mut buffer)
                    .await?;
                if n == 0 {
                    return Err(ClientError::Closed {
                        received: buffer.len(),
                        expected: buffer.len() + needed,
                    });
                }
            }
        }
    }
}

/// Connect to `addr`, send `trigger`, and return one verified frame.
pub async fn fetch(addr: &str, trigger: &[u8], timeout: Duration) -> Result<Frame, ClientError> {
    if trigger.is_empty() {
        return Err(ClientError::EmptyTrigger);
    }

    let exchange = async {
        let mut stream = TcpStream::connect(addr).await?;
        debug!(addr, "Connected");
        stream.write_all(trigger).await?;
        let frame = read_frame(&mut stream).await?;
        frame.verify()?;
        Ok::<_, ClientError>(frame)
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
}
