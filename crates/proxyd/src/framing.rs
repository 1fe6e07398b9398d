//! Inner-header framing over a logical channel.
//!
//! Every protobuf message crossing a channel is preceded by the fixed
//! [`MethodHeader`]; the method field is left empty on write and ignored on
//! read, exactly as the host side does.

use std::io;

use bytes::Bytes;
use proxy_core::wire::{MethodHeader, METHOD_HEADER_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use zerocopy::{AsBytes, FromBytes};

/// Read one inner-framed message: header first, then exactly the declared
/// number of payload bytes.
pub async fn read_message<R>(reader: &mut R) -> io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; METHOD_HEADER_SIZE];
    reader.read_exact(&mut header_buf).await?;

    let header = MethodHeader::read_from(&header_buf[..]).expect("sized header buffer");

    let mut payload = vec![0u8; header.data_size.get() as usize];
    reader.read_exact(&mut payload).await?;

    Ok(Bytes::from(payload))
}

/// Write one inner-framed message as a single channel write, so it travels
/// in one mux frame whenever it fits.
pub async fn write_message<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = MethodHeader::new(payload.len() as u32);

    let mut framed = Vec::with_capacity(METHOD_HEADER_SIZE + payload.len());
    framed.extend_from_slice(header.as_bytes());
    framed.extend_from_slice(payload);

    writer.write_all(&framed).await?;
    writer.flush().await
}
