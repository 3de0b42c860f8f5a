//! # TCP Connection
//!
//! One frame per connection: the sender writes the whole frame and shuts down
//! its write half, and the receiver reads until end-of-stream. The length
//! header inside the frame is not used to delimit the stream.

use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// TCP stream wrapper carrying a single frame.
pub struct Connection {
    /// Underlying TCP stream
    stream: TcpStream,
}

impl Connection {
    /// Create a new Connection from an existing TCP stream.
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Open a new outbound connection to `address:port`.
    ///
    /// # Example
    /// ```ignore
    /// let mut conn = Connection::connect("127.0.0.1", 13579).await?;
    /// conn.write_frame(&frame).await?;
    /// ```
    pub async fn connect(address: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((address, port)).await?;
        Ok(Self::new(stream))
    }

    /// Read everything the peer sends until it closes its side.
    ///
    /// Reads in chunks of at most `buffer_size` bytes. There is no deadline, so
    /// a peer that never closes keeps this pending.
    pub async fn read_frame(&mut self, buffer_size: usize) -> io::Result<Vec<u8>> {
        let mut chunk = vec![0u8; buffer_size.max(1)];
        let mut frame = Vec::new();

        loop {
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            frame.extend_from_slice(&chunk[..n]);
        }

        Ok(frame)
    }

    /// Write a whole frame and close the write half so the peer sees end-of-stream.
    pub async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}
