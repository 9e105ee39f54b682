use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::message::Frame;
use crate::core::{Error, MAX_DATAGRAM_SIZE};

/// Datagram codec for chat frames.
///
/// Each call to `decode` consumes the whole buffer as one datagram; bytes
/// beyond the maximum datagram size are discarded. The decoded item pairs
/// the frame with the bytes it was parsed from, which relays forward
/// unchanged.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_datagram: usize,
}

impl FrameCodec {
    /// Creates a codec with the default datagram limit
    pub fn new() -> Self {
        FrameCodec {
            max_datagram: MAX_DATAGRAM_SIZE,
        }
    }

    /// Creates a codec that keeps at most `max_datagram` bytes per datagram
    pub fn with_max_datagram(max_datagram: usize) -> Self {
        FrameCodec { max_datagram }
    }

    pub fn max_datagram(&self) -> usize {
        self.max_datagram
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = (Frame, Bytes);
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut datagram = src.split();
        datagram.truncate(self.max_datagram);
        let raw = datagram.freeze();
        Ok(Some((Frame::parse(&raw), raw)))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_to(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{Envelope, MessageId};

    #[test]
    fn test_codec_consumes_whole_datagram() {
        let mut codec = FrameCodec::new();
        let mut bytes = BytesMut::from(&b"@@42-AP@@System: hi"[..]);

        let (frame, raw) = codec.decode(&mut bytes).unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::Message(Envelope::new(MessageId::new("42-AP"), "System: hi"))
        );
        assert_eq!(&raw[..], b"@@42-AP@@System: hi");
        assert!(bytes.is_empty());
        assert!(codec.decode(&mut bytes).unwrap().is_none());
    }

    #[test]
    fn test_codec_truncates_oversized_datagram() {
        let mut codec = FrameCodec::with_max_datagram(8);
        let mut bytes = BytesMut::from(&b"0123456789"[..]);

        let (frame, raw) = codec.decode(&mut bytes).unwrap().unwrap();
        assert_eq!(frame, Frame::Raw(Bytes::from_static(b"01234567")));
        assert_eq!(raw.len(), 8);
    }

    #[test]
    fn test_codec_encode_appends() {
        let mut codec = FrameCodec::new();
        let mut bytes = BytesMut::new();

        codec.encode(Frame::HistoryStart, &mut bytes).unwrap();
        assert_eq!(&bytes[..], b"@@HISTORY_START");

        bytes.clear();
        codec
            .encode(Frame::Ack(MessageId::new("9-10.0.0.7")), &mut bytes)
            .unwrap();
        assert_eq!(&bytes[..], b"@@ACK 9-10.0.0.7");
    }

    #[test]
    fn test_codec_encode_then_decode_message() {
        let mut codec = FrameCodec::new();
        let mut bytes = BytesMut::new();
        let frame = Frame::Message(Envelope::new(
            MessageId::new("5-10.0.0.5"),
            "[10.0.0.5]: hello there",
        ));

        codec.encode(frame.clone(), &mut bytes).unwrap();
        let (decoded, _) = codec.decode(&mut bytes).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }
}
