//! Modbus/RTU framing: request encoding and response parsing.
//!
//! The Modbus PDU (function code + body) is transport-independent; MBAP
//! wraps it with a 7-byte TCP header, RTU wraps it with a 1-byte slave-ID
//! and a CRC-16 trailer. Translating a client's MBAP request to RTU is
//! therefore just re-wrapping the same PDU bytes.
//!
//! Response body lengths are derived from the function code using the
//! *response* shape (byte-count-prefixed for reads; fixed 4 bytes for
//! single/multi writes, which echo address+value or address+quantity;
//! 1 byte for an exception). This is deliberately the response table, not
//! the request table.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::core::protocol::checksum::crc16_modbus;

/// A parsed RTU reply, CRC already verified-and-discarded (the proxy does
/// not forward it; an MBAP client has no CRC field).
#[derive(Debug, Clone)]
pub struct RtuReply {
    pub slave_id: u8,
    /// Function code + body, i.e. the Modbus PDU.
    pub pdu: Vec<u8>,
}

/// Errors specific to parsing bytes off an RTU wire. Low-level: the
/// upstream layer wraps these into [`crate::error::UpstreamError`] with the
/// device's identity attached.
#[derive(Debug)]
pub enum RtuFrameError {
    Io(std::io::Error),
    UnsupportedFunction(u8),
}

impl From<std::io::Error> for RtuFrameError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Encode a Modbus PDU as an RTU frame: slave-ID, PDU, then a freshly
/// computed CRC-16 (little-endian on the wire).
pub fn encode_request(slave_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + pdu.len() + 2);
    frame.push(slave_id);
    frame.extend_from_slice(pdu);
    let crc = crc16_modbus(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Read exactly one RTU reply from `reader`: slave-ID, function code, a
/// body whose length is determined by the function code, then a 2-byte CRC
/// (read but not validated; the device is the authority).
pub async fn read_rtu_reply<R>(reader: &mut R) -> Result<RtuReply, RtuFrameError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 2];
    reader.read_exact(&mut head).await?;
    let [slave_id, function_code] = head;

    let mut body = Vec::new();
    if function_code & 0x80 != 0 {
        body.resize(1, 0);
        reader.read_exact(&mut body).await?;
    } else {
        match function_code {
            0x01 | 0x02 | 0x03 | 0x04 => {
                let mut byte_count = [0u8; 1];
                reader.read_exact(&mut byte_count).await?;
                body.push(byte_count[0]);
                let mut rest = vec![0u8; byte_count[0] as usize];
                reader.read_exact(&mut rest).await?;
                body.extend_from_slice(&rest);
            }
            0x05 | 0x06 | 0x0F | 0x10 => {
                body.resize(4, 0);
                reader.read_exact(&mut body).await?;
            }
            other => return Err(RtuFrameError::UnsupportedFunction(other)),
        }
    }

    let mut crc = [0u8; 2];
    reader.read_exact(&mut crc).await?;

    let mut pdu = Vec::with_capacity(1 + body.len());
    pdu.push(function_code);
    pdu.extend_from_slice(&body);
    Ok(RtuReply { slave_id, pdu })
}
