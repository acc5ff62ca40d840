//! MBAP (Modbus/TCP) framing: header parsing and exactly-one-frame reads.
//!
//! A frame is read in two pieces, a fixed 6-byte prefix then `length` more
//! bytes, so a peer closing mid-frame can be told apart from a peer closing
//! cleanly between frames. The former is a `ShortFrame`; the latter a
//! benign EOF.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ClientFrameError;

/// A decoded MBAP frame. Keeps the raw bytes so that a pass-through reply
/// can be forwarded byte-identical; `unit_id` is exposed separately so the
/// remapper can rewrite it in place without touching anything else.
#[derive(Debug, Clone)]
pub struct MbapFrame {
    bytes: Vec<u8>,
}

impl MbapFrame {
    /// Wrap a complete, already-validated MBAP frame (prefix + body).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        debug_assert!(bytes.len() >= 7, "MBAP frame shorter than the minimum 7 bytes");
        Self { bytes }
    }

    pub fn transaction_id(&self) -> u16 {
        u16::from_be_bytes([self.bytes[0], self.bytes[1]])
    }

    pub fn protocol_id(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2], self.bytes[3]])
    }

    pub fn unit_id(&self) -> u8 {
        self.bytes[6]
    }

    pub fn set_unit_id(&mut self, unit_id: u8) {
        self.bytes[6] = unit_id;
    }

    /// The function-code + data portion, after the unit-ID byte.
    pub fn pdu(&self) -> &[u8] {
        &self.bytes[7..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Build a reply frame carrying `transaction_id`/`protocol_id` from the
    /// original request and the given unit-ID + PDU bytes from the
    /// upstream reply. Used when re-wrapping an RTU reply into MBAP.
    pub fn build(transaction_id: u16, protocol_id: u16, unit_id: u8, pdu: &[u8]) -> Self {
        let length = 1 + pdu.len();
        let mut bytes = Vec::with_capacity(6 + length);
        bytes.extend_from_slice(&transaction_id.to_be_bytes());
        bytes.extend_from_slice(&protocol_id.to_be_bytes());
        bytes.extend_from_slice(&(length as u16).to_be_bytes());
        bytes.push(unit_id);
        bytes.extend_from_slice(pdu);
        Self { bytes }
    }
}

/// The outcome of attempting to read one frame: either a complete frame, or
/// a clean close with nothing consumed (a benign end of stream between
/// frames, not an error).
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(MbapFrame),
    Eof,
}

/// Read exactly one MBAP frame from `reader`, or detect a clean close.
/// A close after only part of a frame has arrived is reported as
/// [`ClientFrameError::ShortFrame`].
pub async fn read_mbap_frame<R>(reader: &mut R) -> Result<ReadOutcome, ClientFrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 6];
    let filled = read_partial(reader, &mut prefix).await.map_err(ClientFrameError::Io)?;
    if filled == 0 {
        return Ok(ReadOutcome::Eof);
    }
    if filled < prefix.len() {
        return Err(ClientFrameError::ShortFrame(filled));
    }

    let length = u16::from_be_bytes([prefix[4], prefix[5]]) as usize;
    if length < 1 {
        return Err(ClientFrameError::ShortFrame(prefix.len()));
    }
    let mut body = vec![0u8; length];
    let body_filled = read_partial(reader, &mut body).await.map_err(ClientFrameError::Io)?;
    if body_filled < body.len() {
        return Err(ClientFrameError::ShortFrame(prefix.len() + body_filled));
    }

    let mut bytes = Vec::with_capacity(6 + length);
    bytes.extend_from_slice(&prefix);
    bytes.extend_from_slice(&body);
    Ok(ReadOutcome::Frame(MbapFrame::from_bytes(bytes)))
}

/// Fill `buf` as far as possible before hitting EOF, returning how many
/// bytes were actually read (which may be less than `buf.len()`).
async fn read_partial<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..]).await?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
