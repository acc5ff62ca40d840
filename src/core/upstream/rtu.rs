//! RTU upstream I/O: serial port open (with a one-shot permission fixup)
//! and a write-then-read transaction that translates between the client's
//! MBAP framing and the device's RTU framing.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::config::{SerialParams, SerialParity};
use crate::core::protocol::{encode_rtu_request, read_rtu_reply, MbapFrame, RtuFrameError};
use crate::error::UpstreamError;

pub async fn connect(device: &str, params: &SerialParams, timeout: Duration) -> Result<SerialStream, UpstreamError> {
    check_device(device)?;

    // Opening a serial port is a synchronous syscall, not a cancellable
    // future, so `timeout` only bounds the retried-after-chmod path below,
    // not this first attempt.
    match open_once(device, params) {
        Ok(port) => Ok(port),
        Err(err) if is_permission_denied(&err) => {
            relax_permissions(device)?;
            tokio::time::timeout(timeout, async { open_once(device, params) })
                .await
                .map_err(|_| UpstreamError::Timeout(crate::error::SocketAddrOrPath::Path(device.to_string()), timeout))?
        }
        Err(err) => Err(err),
    }
}

fn open_once(device: &str, params: &SerialParams) -> Result<SerialStream, UpstreamError> {
    let data_bits = match params.databits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    };
    let stop_bits = match params.stopbits {
        2 => StopBits::Two,
        _ => StopBits::One,
    };
    let parity = match params.parity {
        SerialParity::N => Parity::None,
        SerialParity::E => Parity::Even,
        SerialParity::O => Parity::Odd,
    };

    tokio_serial::new(device, params.baudrate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .open_native_async()
        .map_err(|e| match e.kind {
            tokio_serial::ErrorKind::NoDevice => {
                UpstreamError::DeviceUnavailable(device.to_string(), "device not found")
            }
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                UpstreamError::DevicePermission(device.to_string())
            }
            _ => UpstreamError::Io(
                crate::error::SocketAddrOrPath::Path(device.to_string()),
                std::io::Error::other(e.to_string()),
            ),
        })
}

fn is_permission_denied(err: &UpstreamError) -> bool {
    matches!(err, UpstreamError::DevicePermission(_))
}

/// Verify the device path exists and is a character device before
/// attempting to open it.
#[cfg(unix)]
fn check_device(device: &str) -> Result<(), UpstreamError> {
    use std::os::unix::fs::FileTypeExt;

    let metadata = std::fs::metadata(device)
        .map_err(|_| UpstreamError::DeviceUnavailable(device.to_string(), "device not found"))?;
    if !metadata.file_type().is_char_device() {
        return Err(UpstreamError::DeviceUnavailable(device.to_string(), "not a character device"));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_device(_device: &str) -> Result<(), UpstreamError> {
    Ok(())
}

/// One-shot attempt to grant owner+group read/write on the device node.
#[cfg(unix)]
fn relax_permissions(device: &str) -> Result<(), UpstreamError> {
    use nix::sys::stat::{fchmodat, FchmodatFlags, Mode};

    fchmodat(
        None,
        device,
        Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IWGRP,
        FchmodatFlags::FollowSymlink,
    )
    .map_err(|_| UpstreamError::DevicePermission(device.to_string()))
}

#[cfg(not(unix))]
fn relax_permissions(device: &str) -> Result<(), UpstreamError> {
    Err(UpstreamError::DevicePermission(device.to_string()))
}

/// Forward `request` (an MBAP frame the caller has already unit-ID-remapped)
/// to the RTU device and return the equivalent MBAP reply, preserving the
/// client's transaction/protocol IDs.
pub async fn transact(
    port: &mut SerialStream,
    device: &str,
    request: &MbapFrame,
    timeout: Duration,
) -> Result<MbapFrame, UpstreamError> {
    let slave_id = request.unit_id();
    let wire = encode_rtu_request(slave_id, request.pdu());

    tokio::time::timeout(timeout, async {
        port.write_all(&wire).await.map_err(RtuFrameError::Io)?;
        port.flush().await.map_err(RtuFrameError::Io)?;
        read_rtu_reply(port).await
    })
    .await
    .map_err(|_| UpstreamError::Timeout(crate::error::SocketAddrOrPath::Path(device.to_string()), timeout))?
    .map_err(|e| match e {
        RtuFrameError::Io(io) => UpstreamError::Io(crate::error::SocketAddrOrPath::Path(device.to_string()), io),
        RtuFrameError::UnsupportedFunction(fc) => UpstreamError::UnsupportedFunction(fc),
    })
    .map(|reply| MbapFrame::build(request.transaction_id(), request.protocol_id(), reply.slave_id, &reply.pdu))
}
