//! Framed reading and writing of messages over a byte stream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::RESPONSE_HEADER_SIZE;
use crate::error::ProtoError;
use crate::message::Message;

/// Upper bound on a response body; a frame above this is treated as a
/// framing error rather than allocated.
pub const MAX_FRAME_BODY: u32 = 256 * 1024 * 1024;

/// Read one complete response frame: the 8-byte header, then exactly the
/// declared number of body bytes.
pub async fn read_frame<R>(reader: &mut R) -> Result<Message, ProtoError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; RESPONSE_HEADER_SIZE];
    reader.read_exact(&mut header).await?;
    let dlen = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if dlen > MAX_FRAME_BODY {
        return Err(ProtoError::FrameTooLarge {
            size: dlen,
            limit: MAX_FRAME_BODY,
        });
    }
    let mut data = vec![0u8; RESPONSE_HEADER_SIZE + dlen as usize];
    data[..RESPONSE_HEADER_SIZE].copy_from_slice(&header);
    if dlen > 0 {
        reader.read_exact(&mut data[RESPONSE_HEADER_SIZE..]).await?;
    }
    Ok(Message::from_bytes(data))
}

/// Write one complete frame and flush.
pub async fn write_frame<W>(writer: &mut W, msg: &Message) -> Result<(), ProtoError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(msg.bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0102u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&5u32.to_be_bytes());
        data.extend_from_slice(b"hello");
        let msg = Message::from_bytes(data);

        let mut wire = Vec::new();
        write_frame(&mut wire, &msg).await.unwrap();
        assert_eq!(wire.len(), 13);

        let mut cursor = std::io::Cursor::new(wire);
        let decoded = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded.resp_sid(), 0x0102);
        assert_eq!(decoded.resp_body(), b"hello");
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&(MAX_FRAME_BODY + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(data);
        assert!(matches!(
            read_frame(&mut cursor).await,
            Err(ProtoError::FrameTooLarge { .. })
        ));
    }
}
