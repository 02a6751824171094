//! Native messaging framing.
//!
//! Each record is a 4-byte length in native byte order followed by that many
//! bytes of UTF-8 JSON.

use crate::error::FrameError;
use serde_json::Value;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame accepted in either direction (1 MiB)
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Read one record; `Ok(None)` when the other side closed the stream
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Value>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut length_bytes = [0u8; 4];

    match reader.read_exact(&mut length_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let length = u32::from_ne_bytes(length_bytes) as usize;
    if length == 0 {
        return Err(FrameError::Empty);
    }
    if length > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(length));
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;

    Ok(Some(serde_json::from_slice(&body)?))
}

/// Write one record and flush
pub async fn write_frame<W>(writer: &mut W, record: &Value) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(record)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(body.len()));
    }

    let length = body.len() as u32;
    writer.write_all(&length.to_ne_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;

    Ok(())
}
