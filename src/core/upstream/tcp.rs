//! TCP upstream I/O: connect and one write-then-read transaction.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::core::protocol::{read_mbap_frame, MbapFrame, ReadOutcome};
use crate::error::{SocketAddrOrPath, UpstreamError};

pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<TcpStream, UpstreamError> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| UpstreamError::Timeout(SocketAddrOrPath::Addr(addr), timeout))?
        .map_err(|e| UpstreamError::Io(SocketAddrOrPath::Addr(addr), e))?;
    stream
        .set_nodelay(true)
        .map_err(|e| UpstreamError::Io(SocketAddrOrPath::Addr(addr), e))?;
    Ok(stream)
}

pub async fn transact(
    stream: &mut TcpStream,
    addr: SocketAddr,
    request: &MbapFrame,
    timeout: Duration,
) -> Result<MbapFrame, UpstreamError> {
    tokio::time::timeout(timeout, async {
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await?;
        match read_mbap_frame(stream).await {
            Ok(ReadOutcome::Frame(frame)) => Ok(frame),
            Ok(ReadOutcome::Eof) => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "upstream closed before replying",
            )),
            Err(_short_frame) => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "upstream closed mid-frame",
            )),
        }
    })
    .await
    .map_err(|_| UpstreamError::Timeout(SocketAddrOrPath::Addr(addr), timeout))?
    .map_err(|e| UpstreamError::Io(SocketAddrOrPath::Addr(addr), e))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;
    use crate::core::protocol::MbapFrame;

    #[tokio::test]
    async fn transact_times_out_against_a_silent_upstream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _accept_task = tokio::spawn(async move {
            // Accept the connection but never write a reply.
            let _ = listener.accept().await;
            std::future::pending::<()>().await;
        });

        let mut stream = connect(addr, Duration::from_secs(1)).await.unwrap();
        let request = MbapFrame::build(1, 0, 0x11, &[0x03, 0x00, 0x00, 0x00, 0x0A]);

        let result = transact(&mut stream, addr, &request, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(UpstreamError::Timeout(_, _))));
    }
}
