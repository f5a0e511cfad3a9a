//! Line-framed message transports
//!
//! The [`Transport`] trait carries one serialized JSON-RPC message per item.
//! [`StdioTransport`] frames messages as newline-delimited JSON over any
//! reader/writer pair (process stdio in production). [`ChannelTransport`] is
//! an in-memory pair used to drive the server from tests.
//!
//! Outbound messages are funnelled through a single writer task, so
//! concurrent `send` calls never interleave bytes within a line.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};

use crate::error::Result;

/// Abstraction over the byte stream the server speaks on.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send one complete JSON-RPC message.
    ///
    /// # Errors
    ///
    /// Returns an error if the outbound side has been closed.
    async fn send(&self, message: String) -> Result<()>;

    /// Stream of inbound messages with trailing newlines stripped. Ends when
    /// the peer closes its side.
    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>>;
}

fn channel_stream(
    rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
) -> Pin<Box<dyn Stream<Item = String> + Send + 'static>> {
    Box::pin(futures::stream::unfold(rx, |rx| async move {
        let mut guard = rx.lock().await;
        let item = guard.recv().await?;
        drop(guard);
        Some((item, rx))
    }))
}

/// Strips the line terminator and decodes lossily, so a line that is not
/// UTF-8 reaches the dispatcher (as a parse error) instead of ending input.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Newline-delimited JSON over a reader/writer pair.
///
/// # Examples
///
/// ```no_run
/// use google_mcp::server::transport::StdioTransport;
///
/// # #[tokio::main]
/// # async fn main() {
/// let transport = StdioTransport::stdio();
/// # }
/// ```
#[derive(Debug)]
pub struct StdioTransport {
    outbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl StdioTransport {
    /// Speak on the process's own stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Wire the transport to arbitrary async I/O.
    ///
    /// Starts two background tasks: one reads lines from `reader`, one
    /// writes queued messages to `writer`, flushing after each line.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(message) = outbound_rx.recv().await {
                let line = format!("{}\n", message);
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    tracing::error!(error = %e, "failed to write response");
                    break;
                }
                if let Err(e) = writer.flush().await {
                    tracing::error!(error = %e, "failed to flush output");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        if inbound_tx.send(decode_line(&buf)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "input stream failed");
                        break;
                    }
                }
            }
            tracing::debug!("input stream closed");
        });

        Self {
            outbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
        }
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: String) -> Result<()> {
        self.outbound_tx
            .send(message)
            .map_err(|e| anyhow::anyhow!("output channel closed: {}", e))
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        channel_stream(Arc::clone(&self.inbound_rx))
    }
}

/// In-memory transport for driving the server without real I/O.
///
/// ```text
/// handle.inbound_tx  -> transport.receive()
/// transport.send()   -> handle.outbound_rx
/// ```
///
/// Dropping the handle's `inbound_tx` ends the receive stream, which is how
/// tests simulate end of input.
#[derive(Debug)]
pub struct ChannelTransport {
    outbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

/// The test-side ends of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ChannelTransportHandle {
    /// Messages the server will receive.
    pub inbound_tx: mpsc::UnboundedSender<String>,
    /// Messages the server sent.
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
}

impl ChannelTransport {
    /// Create a transport and its handle.
    ///
    /// # Examples
    ///
    /// ```
    /// use google_mcp::server::transport::{ChannelTransport, Transport};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let (transport, mut handle) = ChannelTransport::new();
    /// transport.send("{}".to_string()).await.unwrap();
    /// assert_eq!(handle.outbound_rx.recv().await.unwrap(), "{}");
    /// # }
    /// ```
    pub fn new() -> (Self, ChannelTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound_tx,
                inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            },
            ChannelTransportHandle {
                inbound_tx,
                outbound_rx,
            },
        )
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: String) -> Result<()> {
        self.outbound_tx
            .send(message)
            .map_err(|e| anyhow::anyhow!("outbound channel closed: {}", e))
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        channel_stream(Arc::clone(&self.inbound_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_stdio_transport_reads_lines() {
        let (client, server) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let transport = StdioTransport::new(server_read, server_write);

        let (_client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(b"{\"a\":1}\n{\"b\":2}\n")
            .await
            .unwrap();
        drop(client_write);

        let mut stream = transport.receive();
        let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(first, "{\"a\":1}");
        assert_eq!(second, "{\"b\":2}");
    }

    #[tokio::test]
    async fn test_stdio_transport_survives_invalid_utf8() {
        let (client, server) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let transport = StdioTransport::new(server_read, server_write);

        let (_client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(b"\xff\xfe\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\r\n")
            .await
            .unwrap();
        drop(client_write);

        let received: Vec<String> =
            tokio::time::timeout(Duration::from_secs(5), transport.receive().collect())
                .await
                .unwrap();
        assert_eq!(received.len(), 2);
        assert!(received[0].contains('\u{FFFD}'));
        assert_eq!(received[1], r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
    }

    #[test]
    fn test_decode_line_strips_terminators() {
        assert_eq!(decode_line(b"abc\r\n"), "abc");
        assert_eq!(decode_line(b"abc"), "abc");
        assert_eq!(decode_line(b""), "");
    }

    #[tokio::test]
    async fn test_stdio_transport_writes_newline_framed() {
        let (client, server) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let transport = StdioTransport::new(server_read, server_write);

        transport.send("{\"id\":1}".to_string()).await.unwrap();
        transport.send("{\"id\":2}".to_string()).await.unwrap();

        let (mut client_read, _client_write) = tokio::io::split(client);
        let expected = "{\"id\":1}\n{\"id\":2}\n";
        let mut buf = vec![0u8; expected.len()];
        tokio::time::timeout(Duration::from_secs(5), client_read.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_channel_transport_stream_ends_when_handle_drops_sender() {
        let (transport, handle) = ChannelTransport::new();
        handle.inbound_tx.send("one".to_string()).unwrap();
        drop(handle.inbound_tx);

        let received: Vec<String> = transport.receive().collect().await;
        assert_eq!(received, vec!["one".to_string()]);
    }
}
