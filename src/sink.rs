use tokio::sync::mpsc;

use crate::decode::Decoder;
use crate::session::Frame;

/// Consumer half of one subscription's frame queue.
///
/// Drains frames in arrival order for the process lifetime and hands each to
/// the decoder. Finishes only when the queue closes, i.e. when the paired
/// session ended and every pending frame has been processed. Decode failures
/// are reported per frame and do not stop the sink.
pub async fn run_sink(subscription: String, mut frames: mpsc::Receiver<Frame>, mut decoder: Decoder) {
    while let Some(frame) = frames.recv().await {
        if let Err(err) = decoder.decode(frame.req_id, &frame.payload).await {
            tracing::warn!(
                req_id = frame.req_id,
                subscription = %subscription,
                error = %err,
                "failed to decode frame"
            );
        }
    }

    tracing::info!(subscription = %subscription, "output sink finished");
}
