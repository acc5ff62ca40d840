//! The per-client downstream framing loop: read one MBAP request, forward
//! it through the Bridge's gate, write back the reply, repeat until the
//! peer closes or an I/O error ends the session.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::core::bridge::TransactionGate;
use crate::core::protocol::{read_mbap_frame, ReadOutcome};
use crate::core::remap::Remapper;

/// How many attempts `TransactionGate::write_read` gets per client request.
const ATTEMPTS_PER_REQUEST: u32 = 2;

pub async fn run(
    mut stream: TcpStream,
    peer: SocketAddr,
    gate: Arc<TransactionGate>,
    remapper: Arc<Remapper>,
    mut shutdown: watch::Receiver<bool>,
) {
    let span = info_span!("client", %peer);
    async move {
        info!("session started");
        let mut request_count: u64 = 0;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("bridge stopping, closing session");
                        break;
                    }
                    continue;
                }
                outcome = read_mbap_frame(&mut stream) => outcome,
            };

            let mut request = match outcome {
                Ok(ReadOutcome::Frame(frame)) => frame,
                Ok(ReadOutcome::Eof) => {
                    info!("peer closed connection");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "session ended on framing error");
                    break;
                }
            };

            request_count += 1;
            trace!(request_count, frame = %hex::encode(request.as_bytes()), "← request");

            let client_unit_id = request.unit_id();
            let upstream_unit_id = remapper.forward(client_unit_id);
            if upstream_unit_id != client_unit_id {
                trace!(client_unit_id, upstream_unit_id, "remapped unit ID on request");
            }
            request.set_unit_id(upstream_unit_id);

            debug!(
                request_count,
                function_code = request.pdu().first().copied().unwrap_or(0),
                unit_id = upstream_unit_id,
                "forwarding request"
            );

            let reply = match gate.write_read(&request, ATTEMPTS_PER_REQUEST).await {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(error = %err, request_count, "upstream exhausted retries, closing session");
                    break;
                }
            };

            let mut reply = reply;
            let reply_unit_id = remapper.inverse(reply.unit_id());
            if reply_unit_id != reply.unit_id() {
                trace!(from = reply.unit_id(), to = reply_unit_id, "remapped unit ID on reply");
            }
            reply.set_unit_id(reply_unit_id);

            trace!(request_count, frame = %hex::encode(reply.as_bytes()), "→ reply");

            if let Err(err) = stream.write_all(reply.as_bytes()).await {
                warn!(error = %err, "failed writing reply to client");
                break;
            }
            if let Err(err) = stream.flush().await {
                warn!(error = %err, "failed flushing reply to client");
                break;
            }
        }

        let _ = stream.shutdown().await;
        info!(request_count, "session ended");
    }
    .instrument(span)
    .await
}
