use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Hard upper bound for a single chunk frame. Chosen so a frame length can
/// never be mistaken for the message magic on the same connection.
pub const MAX_CHUNK_SIZE: usize = 1_000_000;

/// Frame size used when the client does not ask for one.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk stream idle timeout")]
    Timeout,
    #[error("chunk of {0} bytes exceeds the protocol limit")]
    TooLarge(u32),
    #[error("chunk transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Producer side of a chunk stream.
#[async_trait]
pub trait ChunkSink: Send {
    async fn send(&mut self, data: &[u8]) -> Result<(), ChunkError>;

    /// Terminate the current stream (a zero length frame).
    async fn finish(&mut self) -> Result<(), ChunkError>;
}

/// Consumer side of a chunk stream. Strictly reactive - one frame is pulled
/// at a time, nothing is buffered ahead.
#[async_trait]
pub trait ChunkSource: Send {
    /// The next frame, or `None` when the current stream is terminated.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, ChunkError>;
}

/// Both directions of the chunk transport, as handed to command handlers.
pub trait ChunkLink: ChunkSink + ChunkSource {}

impl<T: ChunkSink + ChunkSource> ChunkLink for T {}

/// The connection-backed chunk transport.
///
/// Frames are `length: u32 LE || payload`; a zero length terminates the
/// stream. The idle timer bounds the silence between two frames of a single
/// stream - an expiry aborts the stream, not the connection's other
/// machinery.
pub struct ChunkChannel<'a, S> {
    stream: &'a mut S,
    idle_timeout: Duration,
}

impl<'a, S> ChunkChannel<'a, S> {
    pub fn new(stream: &'a mut S, idle_timeout: Duration) -> Self {
        Self {
            stream,
            idle_timeout,
        }
    }
}

async fn idle_guard<F, T>(idle_timeout: Duration, fut: F) -> Result<T, ChunkError>
where
    F: std::future::Future<Output = std::io::Result<T>>,
{
    if idle_timeout.is_zero() {
        return Ok(fut.await?);
    }
    match tokio::time::timeout(idle_timeout, fut).await {
        Ok(res) => Ok(res?),
        Err(_) => Err(ChunkError::Timeout),
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> ChunkSink for ChunkChannel<'_, S> {
    async fn send(&mut self, data: &[u8]) -> Result<(), ChunkError> {
        if data.len() > MAX_CHUNK_SIZE {
            return Err(ChunkError::TooLarge(data.len() as u32));
        }
        let idle = self.idle_timeout;
        idle_guard(idle, async {
            self.stream.write_u32_le(data.len() as u32).await?;
            self.stream.write_all(data).await?;
            self.stream.flush().await
        })
        .await
    }

    async fn finish(&mut self) -> Result<(), ChunkError> {
        let idle = self.idle_timeout;
        idle_guard(idle, async {
            self.stream.write_u32_le(0).await?;
            self.stream.flush().await
        })
        .await
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> ChunkSource for ChunkChannel<'_, S> {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, ChunkError> {
        let idle = self.idle_timeout;
        let length = idle_guard(idle, self.stream.read_u32_le()).await?;
        if length == 0 {
            return Ok(None);
        }
        if length as usize > MAX_CHUNK_SIZE {
            return Err(ChunkError::TooLarge(length));
        }
        let mut payload = vec![0u8; length as usize];
        idle_guard(idle, self.stream.read_exact(&mut payload)).await?;
        Ok(Some(payload))
    }
}

/// A chunk link that discards everything sent and yields empty streams.
/// Used where a command context is needed but no transport exists.
pub struct NullChunks;

#[async_trait]
impl ChunkSink for NullChunks {
    async fn send(&mut self, _data: &[u8]) -> Result<(), ChunkError> {
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), ChunkError> {
        Ok(())
    }
}

#[async_trait]
impl ChunkSource for NullChunks {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, ChunkError> {
        Ok(None)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{ChunkChannel, ChunkError, ChunkSink, ChunkSource};

    #[tokio::test]
    async fn test_chunk_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);

        let writer = tokio::spawn(async move {
            let mut chunks = ChunkChannel::new(&mut client, Duration::from_secs(1));
            chunks.send(b"hello").await.unwrap();
            chunks.send(b"world").await.unwrap();
            chunks.finish().await.unwrap();
        });

        let mut chunks = ChunkChannel::new(&mut server, Duration::from_secs(1));
        assert_eq!(chunks.recv().await.unwrap().unwrap(), b"hello");
        assert_eq!(chunks.recv().await.unwrap().unwrap(), b"world");
        assert!(chunks.recv().await.unwrap().is_none());

        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_timeout_aborts_stream() {
        let (_client, mut server) = tokio::io::duplex(64);

        let mut chunks = ChunkChannel::new(&mut server, Duration::from_millis(20));
        match chunks.recv().await {
            Err(ChunkError::Timeout) => {}
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);

        tokio::io::AsyncWriteExt::write_u32_le(&mut client, 2_000_000)
            .await
            .unwrap();

        let mut chunks = ChunkChannel::new(&mut server, Duration::from_secs(1));
        match chunks.recv().await {
            Err(ChunkError::TooLarge(2_000_000)) => {}
            other => panic!("expected size error, got {:?}", other),
        }
    }
}
