//! Frame utilities
//!
//! Every protocol document travels as a 4-byte big-endian length prefix
//! followed by a JSON body. Content bytes after an `Ok` response are raw and
//! unframed.

use anyhow::Result;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::TransferError;
use crate::protocol::{FileRequest, FileResponse};

/// Maximum accepted frame body size. Request and response documents are
/// small; anything larger is a protocol violation.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Read a length-prefixed frame body from the stream
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut length_buf = [0u8; 4];
    reader.read_exact(&mut length_buf).await?;
    let length = u32::from_be_bytes(length_buf) as usize;

    if length > MAX_FRAME_LEN {
        return Err(TransferError::network_error_full(
            "Frame exceeds maximum length",
            "unknown".to_string(),
            format!("length: {}", length),
        )
        .into());
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Write a length-prefixed frame to the stream
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a request document from the stream
pub async fn read_request<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<FileRequest> {
    let payload = read_frame(reader).await?;
    let request = serde_json::from_slice(&payload).map_err(TransferError::from)?;
    Ok(request)
}

/// Write a request document to the stream
pub async fn write_request<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    request: &FileRequest,
) -> Result<()> {
    let payload = serde_json::to_vec(request).map_err(TransferError::from)?;
    write_frame(writer, &payload).await
}

/// Read a response document from the stream
pub async fn read_response<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<FileResponse> {
    let payload = read_frame(reader).await?;
    let response = serde_json::from_slice(&payload).map_err(TransferError::from)?;
    Ok(response)
}

/// Write a response document to the stream
pub async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &FileResponse,
) -> Result<()> {
    let payload = serde_json::to_vec(response).map_err(TransferError::from)?;
    write_frame(writer, &payload).await
}
