//! Async reading and writing of wire messages.
//!
//! Fixed-size fields are read with exact reads; a peer closing early yields
//! `ProtocolError::ShortRead`. Bodies are accumulated in bounded chunks until
//! exactly the declared length has arrived.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::transport::message::{HEADER_LEN, Header, Message};
use crate::utils::error::ProtocolError;

/// Read a single byte field.
pub async fn read_u8<R>(reader: &mut R) -> Result<u8, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    reader.read_u8().await.map_err(ProtocolError::from_read)
}

/// Read the 8-byte little-endian length field.
pub async fn read_length<R>(reader: &mut R) -> Result<u64, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    reader.read_u64_le().await.map_err(ProtocolError::from_read)
}

/// Read a fixed-width field of `len` bytes.
pub async fn read_field<R>(reader: &mut R, len: usize) -> Result<Bytes, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut field = BytesMut::zeroed(len);
    reader
        .read_exact(&mut field)
        .await
        .map_err(ProtocolError::from_read)?;
    Ok(field.freeze())
}

/// Read exactly `HEADER_LEN` bytes and decode them.
pub async fn read_header<R>(reader: &mut R) -> Result<Header, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(ProtocolError::from_read)?;
    Ok(Header::parse(&buf))
}

/// Read exactly `length` bytes, at most `chunk_size` per read.
///
/// Nothing is preallocated beyond one chunk, so a bogus length from the peer
/// costs memory only as fast as bytes actually arrive.
pub async fn read_body<R>(
    reader: &mut R,
    length: u64,
    chunk_size: usize,
) -> Result<Bytes, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut body = BytesMut::with_capacity(length.min(chunk.len() as u64) as usize);
    let mut received: u64 = 0;

    while received < length {
        let want = (length - received).min(chunk.len() as u64) as usize;
        let n = reader.read(&mut chunk[..want]).await?;
        if n == 0 {
            return Err(ProtocolError::IncompleteBody {
                expected: length,
                received,
            });
        }
        body.extend_from_slice(&chunk[..n]);
        received += n as u64;
    }

    Ok(body.freeze())
}

/// Read a full message: header, then exactly the declared body.
pub async fn read_message<R>(reader: &mut R, chunk_size: usize) -> Result<Message, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let header = read_header(reader).await?;
    let body = read_body(reader, header.length, chunk_size).await?;
    Ok(Message {
        command: header.command,
        channel: header.channel,
        body,
    })
}

/// Write an already framed message and flush it.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

pub async fn write_message<W>(writer: &mut W, message: &Message) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, &message.encode()).await
}
