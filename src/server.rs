//! TCP server for the file transfer responder.
//!
//! Accepts connections and hands each one to its own task. Any inbound bytes
//! are a trigger: the handler answers with one frame, and only reads the next
//! trigger once that frame is fully written.

use crate::config::Config;
use crate::frame::Frame;
use crate::responder::Responder;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Read buffer size. One read is one trigger, so this bounds how much of a
/// single inbound burst is taken as one event. Trigger bytes are only logged.
const BUFFER_SIZE: usize = 64 * 1024;

/// Server instance
pub struct Server {
    config: Config,
    responder: Arc<Responder>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        let responder = Arc::new(Responder::new(config.file.clone(), config.size_from));

        Server { config, responder }
    }

    /// Bind the listener and serve until the process is killed
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await;
        Ok(())
    }

    /// Bind the configured address
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        let listener = TcpListener::bind(&self.config.listen).await?;
        info!(
            address = %listener.local_addr()?,
            file = %self.responder.path().display(),
            size_from = ?self.responder.size_from(),
            "Server listening"
        );
        Ok(listener)
    }

    /// Accept connections on `listener` forever
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    info!(peer = %peer, "New connection");

                    let responder = Arc::clone(&self.responder);

                    tokio::spawn(async move {
                        let mut ctx = ConnectionContext::new(peer);
                        if let Err(e) = handle_connection(stream, &mut ctx, &responder).await {
                            warn!(peer = %peer, error = %e, "Connection error");
                        }
                        info!(
                            peer = %peer,
                            triggers = ctx.triggers,
                            frames = ctx.frames_sent,
                            bytes = ctx.bytes_sent,
                            "Connection closed"
                        );
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// State owned by a single connection's task.
#[derive(Debug)]
pub struct ConnectionContext {
    pub peer: SocketAddr,
    pub triggers: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
}

impl ConnectionContext {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            triggers: 0,
            frames_sent: 0,
            bytes_sent: 0,
        }
    }
}

/// Handle a single client connection until the peer closes it.
///
/// A failed file read is logged and skipped; the connection stays open for
/// the next trigger. Only I/O errors on the stream end the connection.
pub async fn handle_connection<S>(
    mut stream: S,
    ctx: &mut ConnectionContext,
    responder: &Responder,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        buffer.clear();
        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }

        ctx.triggers += 1;
        info!(
            peer = %ctx.peer,
            data = %String::from_utf8_lossy(&buffer),
            "Connection data"
        );

        let frame = match responder.load().await {
            Ok(frame) => frame,
            Err(e) => {
                warn!(peer = %ctx.peer, error = %e, "Failed to load transfer file");
                continue;
            }
        };

        write_frame(&mut stream, ctx, &frame).await?;
    }
}

/// Write one frame: header, then content, before anything else on the stream.
async fn write_frame<S>(
    stream: &mut S,
    ctx: &mut ConnectionContext,
    frame: &Frame,
) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    if !frame.is_consistent() {
        warn!(
            peer = %ctx.peer,
            size = frame.size(),
            read = frame.content().len(),
            "File changed between metadata query and read"
        );
    }

    stream.write_all(&frame.header()).await?;
    stream.write_all(frame.content()).await?;
    stream.flush().await?;

    ctx.frames_sent += 1;
    ctx.bytes_sent += frame.encoded_len() as u64;
    debug!(
        peer = %ctx.peer,
        size = frame.size(),
        digest = %frame.digest_hex(),
        "Frame sent"
    );
    Ok(())
}
