//! Length-prefixed framing for sync streams.
//!
//! Each message on the wire is a 4-byte little-endian length followed by
//! that many payload bytes. Frames above [`MAX_MESSAGE_BYTES`] are rejected
//! on both paths: writing one is a local bug, reading one means the peer is
//! misbehaving or the stream is corrupt.

use crate::StreamError;
use bytes::Bytes;
use meridian_messages::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};

/// Maximum payload size of one frame (20 MiB).
pub const MAX_MESSAGE_BYTES: usize = 20 * 1024 * 1024;

/// A raw transport wrapped with the sync wire framing.
#[derive(Debug)]
pub struct FramedStream<S> {
    inner: BufStream<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FramedStream<S> {
    pub fn new(transport: S) -> Self {
        Self {
            inner: BufStream::new(transport),
        }
    }

    /// Write one frame and flush it.
    pub async fn write_bytes(&mut self, payload: &[u8]) -> Result<(), StreamError> {
        if payload.len() > MAX_MESSAGE_BYTES {
            return Err(StreamError::MessageTooLarge {
                size: payload.len(),
                limit: MAX_MESSAGE_BYTES,
            });
        }
        self.inner.write_u32_le(payload.len() as u32).await?;
        self.inner.write_all(payload).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Read one frame.
    pub async fn read_bytes(&mut self) -> Result<Bytes, StreamError> {
        let size = self.inner.read_u32_le().await? as usize;
        if size > MAX_MESSAGE_BYTES {
            return Err(StreamError::MessageTooLarge {
                size,
                limit: MAX_MESSAGE_BYTES,
            });
        }
        let mut payload = vec![0u8; size];
        self.inner.read_exact(&mut payload).await?;
        Ok(Bytes::from(payload))
    }

    /// Encode and write one protocol message.
    pub async fn send(&mut self, message: &Message) -> Result<(), StreamError> {
        let bytes = message.encode().map_err(StreamError::Codec)?;
        self.write_bytes(&bytes).await
    }

    /// Read and decode one protocol message.
    pub async fn recv(&mut self) -> Result<Message, StreamError> {
        let bytes = self.read_bytes().await?;
        Ok(Message::decode(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_messages::{GetBlockHashesRequest, MessagePayload};
    use meridian_types::BlockHeight;

    #[tokio::test]
    async fn frame_roundtrip() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FramedStream::new(client);
        let mut reader = FramedStream::new(server);

        writer.write_bytes(b"hello").await.unwrap();
        writer.write_bytes(b"").await.unwrap();

        assert_eq!(reader.read_bytes().await.unwrap().as_ref(), b"hello");
        assert_eq!(reader.read_bytes().await.unwrap().as_ref(), b"");
    }

    #[tokio::test]
    async fn message_roundtrip() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FramedStream::new(client);
        let mut reader = FramedStream::new(server);

        let msg = Message::new(
            9,
            MessagePayload::GetBlockHashesRequest(GetBlockHashesRequest {
                heights: vec![BlockHeight(1)],
            }),
        );
        writer.send(&msg).await.unwrap();
        assert_eq!(reader.recv().await.unwrap(), msg);
    }

    #[tokio::test]
    async fn oversize_write_is_rejected() {
        let (client, _server) = tokio::io::duplex(64);
        let mut writer = FramedStream::new(client);

        let payload = vec![0u8; MAX_MESSAGE_BYTES + 1];
        match writer.write_bytes(&payload).await {
            Err(StreamError::MessageTooLarge { size, limit }) => {
                assert_eq!(size, MAX_MESSAGE_BYTES + 1);
                assert_eq!(limit, MAX_MESSAGE_BYTES);
            }
            other => panic!("expected MessageTooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversize_read_is_rejected() {
        let (client, server) = tokio::io::duplex(64);
        let mut raw = client;
        // Hand-craft a frame header claiming a payload above the limit.
        raw.write_u32_le((MAX_MESSAGE_BYTES + 1) as u32).await.unwrap();
        raw.flush().await.unwrap();

        let mut reader = FramedStream::new(server);
        assert!(matches!(
            reader.read_bytes().await,
            Err(StreamError::MessageTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn length_prefix_is_little_endian() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FramedStream::new(client);
        writer.write_bytes(&[0xaa; 5]).await.unwrap();

        let mut raw = server;
        let mut header = [0u8; 4];
        raw.read_exact(&mut header).await.unwrap();
        assert_eq!(header, [5, 0, 0, 0]);
    }
}
