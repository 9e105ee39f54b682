use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::util::millis;

/// Marker that opens and closes the id section of an envelope
pub const MARKER: &str = "@@";

/// Sent by a peer to the coordinator when it joins
pub const NEW_CLIENT: &str = "@@NEW_CLIENT";

/// Opens a history replay
pub const HISTORY_START: &str = "@@HISTORY_START";

/// Closes a history replay
pub const HISTORY_END: &str = "@@HISTORY_END";

/// Acknowledgment prefix, followed by a space and the message id
pub const ACK: &str = "@@ACK";

/// Opaque message identifier, conventionally `<uptime-ms>-<sender-tag>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        MessageId(id.into())
    }

    /// Builds an id from the sender's uptime and tag.
    ///
    /// Two messages created in the same millisecond by the same sender
    /// share an id.
    pub fn generate(uptime: Duration, tag: &str) -> Self {
        MessageId(format!("{}-{}", millis(uptime), tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chat message in its `@@<id>@@<payload>` framing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub id: MessageId,
    pub payload: String,
}

impl Envelope {
    pub fn new(id: MessageId, payload: impl Into<String>) -> Self {
        Envelope {
            id,
            payload: payload.into(),
        }
    }

    /// Produces `@@<id>@@<payload>`. The payload is not escaped.
    pub fn encode(&self) -> String {
        format!("{MARKER}{}{MARKER}{}", self.id, self.payload)
    }

    /// Splits a wire string at the first two markers.
    ///
    /// The id is the text between them and the payload is everything after
    /// the second, so a payload may itself contain markers. Returns `None`
    /// when fewer than two markers are present.
    pub fn decode(wire: &str) -> Option<Self> {
        let id_start = wire.find(MARKER)? + MARKER.len();
        let id_end = id_start + wire[id_start..].find(MARKER)?;
        Some(Envelope {
            id: MessageId::new(&wire[id_start..id_end]),
            payload: wire[id_end + MARKER.len()..].to_string(),
        })
    }
}

/// One classified datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Join request from a peer
    NewClient,
    /// Start of a history replay
    HistoryStart,
    /// End of a history replay
    HistoryEnd,
    /// Acknowledgment of a message id
    Ack(MessageId),
    /// Enveloped chat message
    Message(Envelope),
    /// Anything else: history chunks, verbatim relays, malformed input
    Raw(Bytes),
}

impl Frame {
    /// Classifies a datagram.
    ///
    /// Control tokens are checked before envelope decoding. `NEW_CLIENT`
    /// must match exactly; the replay markers and `ACK` match as prefixes,
    /// so anything starting with `@@ACK` is an acknowledgment even when it
    /// also looks like an envelope.
    pub fn parse(datagram: &[u8]) -> Frame {
        let text = datagram_text(datagram);

        if text == NEW_CLIENT {
            Frame::NewClient
        } else if text.starts_with(HISTORY_START) {
            Frame::HistoryStart
        } else if text.starts_with(HISTORY_END) {
            Frame::HistoryEnd
        } else if text.starts_with(ACK) {
            let id = text.get(ACK.len() + 1..).unwrap_or("");
            Frame::Ack(MessageId::new(id))
        } else {
            match Envelope::decode(&text) {
                Some(envelope) => Frame::Message(envelope),
                None => Frame::Raw(Bytes::copy_from_slice(datagram)),
            }
        }
    }

    /// Appends the wire form of this frame to `dst`
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            Frame::NewClient => dst.put_slice(NEW_CLIENT.as_bytes()),
            Frame::HistoryStart => dst.put_slice(HISTORY_START.as_bytes()),
            Frame::HistoryEnd => dst.put_slice(HISTORY_END.as_bytes()),
            Frame::Ack(id) => {
                dst.put_slice(ACK.as_bytes());
                dst.put_u8(b' ');
                dst.put_slice(id.as_str().as_bytes());
            }
            Frame::Message(envelope) => dst.put_slice(envelope.encode().as_bytes()),
            Frame::Raw(bytes) => dst.put_slice(bytes),
        }
    }

    /// Wire form of this frame
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf);
        buf.freeze()
    }
}

/// A datagram received from the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Immediate sender
    pub from: SocketAddr,
    /// Classification of `raw`
    pub frame: Frame,
    /// Datagram bytes as received
    pub raw: Bytes,
}

impl Inbound {
    pub fn new(from: SocketAddr, raw: Bytes) -> Self {
        Inbound {
            from,
            frame: Frame::parse(&raw),
            raw,
        }
    }

    /// Datagram as text
    pub fn text(&self) -> Cow<'_, str> {
        datagram_text(&self.raw)
    }
}

/// Datagram bytes as text: anything after a NUL byte is ignored and invalid
/// UTF-8 is replaced.
pub fn datagram_text(datagram: &[u8]) -> Cow<'_, str> {
    let end = datagram
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(datagram.len());
    String::from_utf8_lossy(&datagram[..end])
}
