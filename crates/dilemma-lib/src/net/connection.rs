use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};

/// Anything a [`Connection`] can speak over: a real `TcpStream` in the
/// server, an in-memory duplex stream in tests.
pub trait ClientStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<S: AsyncRead + AsyncWrite + Send + Unpin> ClientStream for S {}

/// A line-oriented connection to one client.
///
/// The protocol is one message per logical prompt: the server writes a prompt
/// (no trailing newline required), the client answers with one line. A
/// zero-byte read means the peer disconnected and is reported as `Ok(None)`.
pub struct Connection {
    io: BufStream<Box<dyn ClientStream>>,
}

impl Connection {
    pub fn new<S: ClientStream + 'static>(stream: S) -> Self {
        Self {
            io: BufStream::new(Box::new(stream)),
        }
    }

    /// Write a message to the peer.
    pub async fn send(&mut self, msg: &str) -> io::Result<()> {
        self.io.write_all(msg.as_bytes()).await?;
        self.io.flush().await
    }

    /// Read one line from the peer, with the line terminator stripped.
    /// `Ok(None)` means the peer closed the connection.
    pub async fn recv(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.io.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let reply = line.trim_end_matches(['\r', '\n']).to_owned();
        tracing::trace!(%reply, "received line");
        Ok(Some(reply))
    }

    /// Send a prompt, then wait for the reply line.
    ///
    /// A failed write is deliberately swallowed: a half-dead peer is only
    /// ever detected on the read side, so sessions are never torn down on a
    /// write error alone.
    pub async fn prompt(&mut self, msg: &str) -> io::Result<Option<String>> {
        let _ = self.send(msg).await;
        self.recv().await
    }
}
