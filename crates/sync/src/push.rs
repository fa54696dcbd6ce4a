//! Push channel: SSE subscription for scan events.
//!
//! Reads the scan stream endpoint as raw bytes, reassembles SSE frames,
//! and forwards each decoded [`StreamEvent`] to the owning session's
//! driver in delivery order. The channel never retries: on `done`, an
//! `error` event, or any transport failure it sends a final
//! [`ChannelSignal::PushClosed`] and goes inert, leaving the poll channel
//! to carry the session to consistency.

use std::sync::Arc;

use futures::StreamExt;
use piiwatch_core::types::JobId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::ScannerApi;
use crate::messages::{decode_frame, SseParser, StreamEvent};
use crate::session::ChannelSignal;

/// Spawn the push-channel task for `job_id`.
pub(crate) fn spawn(
    api: Arc<ScannerApi>,
    job_id: JobId,
    tx: mpsc::Sender<ChannelSignal>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(api, job_id, tx, cancel))
}

async fn run(
    api: Arc<ScannerApi>,
    job_id: JobId,
    tx: mpsc::Sender<ChannelSignal>,
    cancel: CancellationToken,
) {
    let response = tokio::select! {
        _ = cancel.cancelled() => return,
        r = api.open_scan_stream(&job_id) => r,
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "Push stream subscription failed");
            let _ = tx.send(ChannelSignal::PushClosed).await;
            return;
        }
    };

    let mut stream = response.bytes_stream();
    let mut parser = SseParser::new();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return,
            c = stream.next() => c,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for frame in parser.feed(&bytes) {
                    match decode_frame(&frame) {
                        Ok(Some(StreamEvent::Done)) => {
                            tracing::debug!(job_id = %job_id, "Push stream ended");
                            let _ = tx.send(ChannelSignal::PushClosed).await;
                            return;
                        }
                        Ok(Some(StreamEvent::Error)) => {
                            tracing::warn!(job_id = %job_id, "Push stream reported an error");
                            let _ = tx.send(ChannelSignal::PushClosed).await;
                            return;
                        }
                        Ok(Some(event)) => {
                            if tx.send(ChannelSignal::Push(event)).await.is_err() {
                                // Driver gone; nothing left to deliver to.
                                return;
                            }
                        }
                        Ok(None) => {
                            tracing::warn!(
                                job_id = %job_id,
                                event = %frame.event,
                                "Ignoring unknown push event",
                            );
                        }
                        Err(e) => {
                            tracing::warn!(
                                job_id = %job_id,
                                event = %frame.event,
                                error = %e,
                                "Failed to decode push event",
                            );
                        }
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!(job_id = %job_id, error = %e, "Push stream receive error");
                let _ = tx.send(ChannelSignal::PushClosed).await;
                return;
            }
            None => {
                tracing::debug!(job_id = %job_id, "Push stream closed by server");
                let _ = tx.send(ChannelSignal::PushClosed).await;
                return;
            }
        }
    }
}
