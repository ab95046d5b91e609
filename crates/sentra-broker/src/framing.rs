//! Frame codec for the broker channel.
//!
//! Each frame is a 4-byte big-endian length prefix followed by that many
//! bytes of JSON. The length cap bounds memory per connection; an
//! oversized prefix is a protocol error, not an allocation.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame payload size.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Frame-level errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer announced a frame larger than [`MAX_FRAME_BYTES`].
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES} byte limit")]
    TooLarge(usize),

    /// The underlying stream failed.
    #[error("frame io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write one frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge(payload.len()));
    }
    #[allow(clippy::cast_possible_truncation)]
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {},
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        write_frame(&mut a, b"{\"ping\":true}").await.unwrap();
        let frame = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(frame, b"{\"ping\":true}");
    }

    #[tokio::test]
    async fn test_multiple_frames_stay_separate() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        write_frame(&mut a, b"one").await.unwrap();
        write_frame(&mut a, b"two").await.unwrap();
        assert_eq!(read_frame(&mut b).await.unwrap().unwrap(), b"one");
        assert_eq!(read_frame(&mut b).await.unwrap().unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_clean_close_yields_none() {
        let (a, mut b) = tokio::io::duplex(4096);
        drop(a);
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_write_is_rejected() {
        let (mut a, _b) = tokio::io::duplex(4096);
        let payload = vec![0u8; MAX_FRAME_BYTES.saturating_add(1)];
        assert!(matches!(
            write_frame(&mut a, &payload).await,
            Err(FrameError::TooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_announced_length_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let bogus = u32::try_from(MAX_FRAME_BYTES).unwrap().saturating_add(1);
        tokio::io::AsyncWriteExt::write_all(&mut a, &bogus.to_be_bytes())
            .await
            .unwrap();
        assert!(matches!(
            read_frame(&mut b).await,
            Err(FrameError::TooLarge(_))
        ));
    }
}
