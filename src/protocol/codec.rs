//! Message framing
//!
//! Frame layout:
//! ```text
//! +-----------+------+----------+----------+-------------+-----------+
//! | len (u32) | kind | from     | id       | content     | timestamp |
//! |           | (u8) | u16+utf8 | u16+utf8 | u32+utf8    | (i64)     |
//! +-----------+------+----------+----------+-------------+-----------+
//! ```
//! All integers are big-endian. `len` counts the bytes after itself.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::{FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE};
use super::message::{Message, MessageKind};
use crate::error::{CodecError, Result};

/// Bytes a frame payload takes for `msg`, without the length prefix
pub fn payload_len(msg: &Message) -> usize {
    let from_len = floor_char_boundary(&msg.from, 0xFFFF);
    let id_len = floor_char_boundary(&msg.id, 0xFFFF);
    1 + 2 + from_len + 2 + id_len + 4 + msg.content.len() + 8
}

/// Encode a message into a length-prefixed frame
///
/// Fails with `FrameTooLarge` when the payload would exceed
/// `MAX_PAYLOAD_SIZE`, since no peer would accept it.
pub fn encode(msg: &Message) -> std::result::Result<Bytes, CodecError> {
    let payload_len = payload_len(msg);
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(CodecError::FrameTooLarge(payload_len));
    }

    let from_len = floor_char_boundary(&msg.from, 0xFFFF);
    let id_len = floor_char_boundary(&msg.id, 0xFFFF);
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload_len);

    buf.put_u32(payload_len as u32);
    buf.put_u8(msg.kind.to_u8());
    write_short_str(&mut buf, &msg.from[..from_len]);
    write_short_str(&mut buf, &msg.id[..id_len]);
    buf.put_u32(msg.content.len() as u32);
    buf.put_slice(msg.content.as_bytes());
    buf.put_i64(msg.timestamp);

    Ok(buf.freeze())
}

/// Shorten `content` on a char boundary until the frame fits in
/// `MAX_PAYLOAD_SIZE`. Returns `true` if anything was cut.
pub fn fit_content(msg: &mut Message) -> bool {
    let len = payload_len(msg);
    if len <= MAX_PAYLOAD_SIZE {
        return false;
    }
    let fixed = len - msg.content.len();
    let room = MAX_PAYLOAD_SIZE.saturating_sub(fixed);
    let end = floor_char_boundary(&msg.content, room);
    msg.content.truncate(end);
    true
}

/// Decode a frame payload (without the length prefix)
pub fn decode(mut payload: Bytes) -> std::result::Result<Message, CodecError> {
    if payload.remaining() < 1 {
        return Err(CodecError::UnexpectedEof);
    }
    let kind = MessageKind::from_u8(payload.get_u8());
    let from = read_short_str(&mut payload)?;
    let id = read_short_str(&mut payload)?;
    let content = read_long_str(&mut payload)?;

    if payload.remaining() < 8 {
        return Err(CodecError::UnexpectedEof);
    }
    let timestamp = payload.get_i64();

    if payload.has_remaining() {
        return Err(CodecError::TrailingBytes(payload.remaining()));
    }

    Ok(Message {
        kind,
        from,
        id,
        content,
        timestamp,
    })
}

/// Read one framed message from a stream
pub async fn read_message<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(CodecError::FrameTooLarge(len).into());
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(decode(Bytes::from(payload))?)
}

/// Write one framed message to a stream and flush it
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

fn write_short_str(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

fn read_short_str(buf: &mut Bytes) -> std::result::Result<String, CodecError> {
    if buf.remaining() < 2 {
        return Err(CodecError::UnexpectedEof);
    }
    let len = buf.get_u16() as usize;
    read_utf8(buf, len)
}

fn read_long_str(buf: &mut Bytes) -> std::result::Result<String, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::UnexpectedEof);
    }
    let len = buf.get_u32() as usize;
    read_utf8(buf, len)
}

fn read_utf8(buf: &mut Bytes, len: usize) -> std::result::Result<String, CodecError> {
    if buf.remaining() < len {
        return Err(CodecError::UnexpectedEof);
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}

/// Largest prefix length <= max that ends on a char boundary
pub(crate) fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn payload_of(frame: &Bytes) -> Bytes {
        frame.slice(FRAME_HEADER_SIZE..)
    }

    #[test]
    fn test_encode_layout() {
        let msg = Message {
            kind: MessageKind::Normal,
            from: "al".into(),
            id: "a1".into(),
            content: "hi".into(),
            timestamp: 7,
        };
        let frame = encode(&msg).unwrap();

        let expected: &[u8] = &[
            0, 0, 0, 23, // len
            3, // kind
            0, 2, b'a', b'l', // from
            0, 2, b'a', b'1', // id
            0, 0, 0, 2, b'h', b'i', // content
            0, 0, 0, 0, 0, 0, 0, 7, // timestamp
        ];
        assert_eq!(&frame[..], expected);
        assert_eq!(decode(payload_of(&frame)).unwrap(), msg);
    }

    #[test]
    fn test_unknown_kind_is_not_an_error() {
        let mut msg = Message::system("x");
        msg.kind = MessageKind::Unknown(99);
        let decoded = decode(payload_of(&encode(&msg).unwrap())).unwrap();
        assert_eq!(decoded.kind, MessageKind::Unknown(99));
    }

    #[test]
    fn test_unicode_content() {
        let msg = Message::normal("小明", "ab12", "你好，世界");
        let decoded = decode(payload_of(&encode(&msg).unwrap())).unwrap();
        assert_eq!(decoded.from, "小明");
        assert_eq!(decoded.content, "你好，世界");
    }

    #[test]
    fn test_decode_truncated() {
        let frame = encode(&Message::normal("alice", "a1b2", "hello")).unwrap();
        let truncated = frame.slice(FRAME_HEADER_SIZE..frame.len() - 3);
        assert_eq!(decode(truncated), Err(CodecError::UnexpectedEof));
        assert_eq!(decode(Bytes::new()), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let frame = encode(&Message::system("x")).unwrap();
        let mut padded = BytesMut::from(&frame[FRAME_HEADER_SIZE..]);
        padded.put_u16(0);
        assert_eq!(decode(padded.freeze()), Err(CodecError::TrailingBytes(2)));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let payload: &[u8] = &[
            3, 0, 1, 0xFF, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        assert_eq!(
            decode(Bytes::copy_from_slice(payload)),
            Err(CodecError::InvalidUtf8)
        );
    }

    #[test]
    fn test_oversized_frame_is_refused() {
        let msg = Message::normal("bob", "b0b0", "x".repeat(MAX_PAYLOAD_SIZE));
        let expected = payload_len(&msg);
        assert_eq!(encode(&msg), Err(CodecError::FrameTooLarge(expected)));

        // A name alone can overflow the frame
        let msg = Message::login("é".repeat(40_000));
        assert!(matches!(encode(&msg), Err(CodecError::FrameTooLarge(_))));
    }

    #[test]
    fn test_fit_content_trims_to_frame_limit() {
        let mut msg = Message::normal("bob", "b0b0", "é".repeat(MAX_PAYLOAD_SIZE / 2));
        assert!(fit_content(&mut msg));
        assert!(payload_len(&msg) <= MAX_PAYLOAD_SIZE);
        assert!(msg.content.chars().all(|c| c == 'é'));

        let frame = encode(&msg).unwrap();
        assert_eq!(decode(payload_of(&frame)).unwrap().content, msg.content);

        let mut small = Message::normal("bob", "b0b0", "hi");
        assert!(!fit_content(&mut small));
        assert_eq!(small.content, "hi");
    }

    #[tokio::test]
    async fn test_read_message_from_split_stream() {
        let frame = encode(&Message::normal("alice", "a1b2", "hello")).unwrap();
        let mut mock = tokio_test::io::Builder::new()
            .read(&frame[..3])
            .read(&frame[3..10])
            .read(&frame[10..])
            .build();

        let msg = read_message(&mut mock).await.unwrap();
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.id, "a1b2");
    }

    #[tokio::test]
    async fn test_read_message_rejects_oversized_frame() {
        let header = ((MAX_PAYLOAD_SIZE + 1) as u32).to_be_bytes();
        let mut mock = tokio_test::io::Builder::new().read(&header).build();

        let err = read_message(&mut mock).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Codec(CodecError::FrameTooLarge(n)) if n == MAX_PAYLOAD_SIZE + 1
        ));
    }

    #[tokio::test]
    async fn test_read_message_eof_is_connection_closed() {
        let mut mock = tokio_test::io::Builder::new().read(&[0, 0]).build();
        let err = read_message(&mut mock).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_write_message() {
        let msg = Message::heartbeat("bob", "c3d4");
        let frame = encode(&msg).unwrap();
        let mut mock = tokio_test::io::Builder::new().write(&frame).build();

        write_message(&mut mock, &msg).await.unwrap();
    }
}
