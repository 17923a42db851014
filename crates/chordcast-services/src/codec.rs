//! Frame I/O over async byte streams.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use chordcast_core::wire::{Frame, FrameHeader, WireError, HEADER_LEN};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Read one frame. `Ok(None)` means the peer closed the stream between
/// frames; a stream that ends anywhere inside a frame is an error.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Frame>, CodecError> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut header[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("connection closed after {filled} of {HEADER_LEN} header bytes"),
                )
                .into())
            }
            n => filled += n,
        }
    }
    let header = FrameHeader::parse(&header)?;

    let mut payload = vec![0u8; header.payload_len()];
    reader.read_exact(&mut payload).await?;
    Ok(Some(Frame::from_parts(&header, payload)?))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<(), CodecError> {
    let bytes = frame.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chordcast_core::message::Request;
    use chordcast_core::wire::FrameKind;

    #[tokio::test]
    async fn frames_cross_a_duplex_stream() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let first = Request::IsReady.to_frame(1).unwrap();
        let second = Request::LookupAllPublishers.to_frame(2).unwrap().forwarded(4);
        write_frame(&mut a, &first).await.unwrap();
        write_frame(&mut a, &second).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b).await.unwrap(), Some(first));
        let got = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(got.kind, FrameKind::LookupAllRequest);
        assert!(got.is_forwarded());
        assert_eq!(got.hops, 4);
        assert_eq!(read_frame(&mut b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn bad_header_is_an_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0xff; HEADER_LEN]).await.unwrap();
        assert!(matches!(
            read_frame(&mut b).await,
            Err(CodecError::Wire(WireError::UnknownVersion(0xff)))
        ));
    }

    #[tokio::test]
    async fn eof_inside_header_is_an_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let bytes = Request::IsReady.to_frame(1).unwrap().encode().unwrap();
        a.write_all(&bytes[..4]).await.unwrap();
        drop(a);
        match read_frame(&mut b).await {
            Err(CodecError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("truncated header read as {other:?}"),
        }
    }

    #[tokio::test]
    async fn eof_inside_payload_is_an_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let bytes = Request::IsReady.to_frame(1).unwrap().encode().unwrap();
        a.write_all(&bytes[..bytes.len() - 1]).await.unwrap();
        drop(a);
        assert!(matches!(read_frame(&mut b).await, Err(CodecError::Io(_))));
    }
}
