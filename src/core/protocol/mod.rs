//! Wire framing for the two Modbus transports this proxy speaks on its
//! client and upstream sides: MBAP (Modbus/TCP) and RTU (Modbus serial).

pub mod checksum;
pub mod mbap;
pub mod rtu;

pub use checksum::crc16_modbus;
pub use mbap::{read_mbap_frame, MbapFrame, ReadOutcome};
pub use rtu::{encode_request as encode_rtu_request, read_rtu_reply, RtuFrameError, RtuReply};
