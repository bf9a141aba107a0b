//! Message framing over a byte stream.
//!
//! TCP has no message boundaries, so every payload is preceded by its length:
//!
//! ```text
//! [len:u32 LE] [payload: len bytes]
//! ```
//!
//! The header belongs to the transport. Payloads are handed to
//! [`Message::decode`](crate::Message::decode) untouched.

use crate::error::{Error, Result};
use monoio::io::{AsyncReadRent, AsyncReadRentExt, AsyncWriteRent, AsyncWriteRentExt};

pub const HEADER_LEN: usize = 4;

macro_rules! attempt {
    ($io:expr) => {{
        let (result, buf) = { $io };
        result?;
        buf
    }};
}

pub fn encode_header(len: usize) -> Result<[u8; HEADER_LEN]> {
    let len = u32::try_from(len).map_err(|_| Error::FrameTooLarge {
        len,
        max: u32::MAX as usize,
    })?;

    Ok(len.to_le_bytes())
}

pub fn decode_header(header: [u8; HEADER_LEN], max_len: usize) -> Result<usize> {
    let len = u32::from_le_bytes(header) as usize;
    if len > max_len {
        return Err(Error::FrameTooLarge { len, max: max_len });
    }

    Ok(len)
}

/// Reads the next frame.
///
/// Returns `Ok(None)` when the peer closed the stream on a frame boundary.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncReadRent,
{
    let (result, mut header) = reader.read(Vec::with_capacity(HEADER_LEN)).await;
    match result? {
        0 => return Ok(None),
        read if read < HEADER_LEN => {
            // an end of stream from here on is a truncated frame
            let rest = attempt!(reader.read_exact(Vec::with_capacity(HEADER_LEN - read)).await);
            header.extend_from_slice(&rest);
        }
        _ => {}
    }

    let mut raw = [0; HEADER_LEN];
    raw.copy_from_slice(&header);
    let len = decode_header(raw, max_len)?;
    if len == 0 {
        return Ok(Some(Vec::new()));
    }

    let payload = attempt!(reader.read_exact(Vec::with_capacity(len)).await);
    trace!(len, "read frame");

    Ok(Some(payload))
}

pub async fn write_frame<W>(writer: &mut W, payload: Vec<u8>) -> Result<()>
where
    W: AsyncWriteRent,
{
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&encode_header(payload.len())?);
    buf.extend_from_slice(&payload);

    attempt!(writer.write_all(buf).await);
    trace!(len = payload.len(), "wrote frame");

    Ok(())
}
