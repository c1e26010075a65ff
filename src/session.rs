use futures::{Stream, StreamExt};
use mdt_dialin::proto::{CreateSubsArgs, CreateSubsReply, QosMarking};
use thiserror::Error;
use tokio::sync::mpsc;
use tonic::Status;

use crate::config::Encoding;
use crate::delay::DelayCell;

/// Pending frames held per subscription before the receive loop blocks.
///
/// A full queue suspends the session's receive call, so a slow sink
/// throttles its producer instead of dropping frames or growing memory.
pub const FRAME_QUEUE_CAPACITY: usize = 10_000;

/// One requested subscription; immutable for the lifetime of the run.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    /// Process-scoped request id, echoed by the device.
    pub req_id: i64,
    pub encoding: Encoding,
    /// Configured subscription name on the device.
    pub name: String,
    pub qos: Option<u32>,
}

impl SubscriptionRequest {
    pub fn to_args(&self) -> CreateSubsArgs {
        CreateSubsArgs {
            req_id: self.req_id,
            encode: self.encoding.selector(),
            subidstr: self.name.clone(),
            qos: self.qos.map(|marking| QosMarking { marking }),
        }
    }
}

/// One unit of raw telemetry, moved from a session to its paired sink.
#[derive(Debug)]
pub struct Frame {
    pub req_id: i64,
    pub payload: Vec<u8>,
}

/// Terminal session failures. Any of these aborts the whole process; a
/// broken session is never retried.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("subscription '{subscription}' (request {req_id}): stream error: {status}")]
    Transport {
        req_id: i64,
        subscription: String,
        status: Status,
    },

    #[error("subscription '{subscription}' (request {req_id}): device reported: {errors}")]
    Device {
        req_id: i64,
        subscription: String,
        errors: String,
    },

    #[error("subscription '{subscription}' (request {req_id}): frame queue closed")]
    QueueClosed { req_id: i64, subscription: String },
}

/// Receive loop for one subscription session.
///
/// Runs until the device closes the stream (clean end, only this session
/// stops) or a terminal error occurs. Frames are delayed by the current
/// [`DelayCell`] value before they are enqueued; the delay sits on the
/// receive side on purpose, so it throttles consumption from the device
/// rather than the sink's drain rate.
///
/// Dropping the queue sender on return is what lets the paired sink drain
/// and finish.
pub async fn run_session<S>(
    request: &SubscriptionRequest,
    mut stream: S,
    delay: DelayCell,
    frames: mpsc::Sender<Frame>,
) -> Result<(), SessionError>
where
    S: Stream<Item = Result<CreateSubsReply, Status>> + Unpin,
{
    tracing::info!(
        req_id = request.req_id,
        subscription = %request.name,
        "dial-in session started"
    );

    while let Some(result) = stream.next().await {
        let reply = match result {
            Ok(reply) => reply,
            Err(status) => {
                return Err(SessionError::Transport {
                    req_id: request.req_id,
                    subscription: request.name.clone(),
                    status,
                });
            }
        };

        if reply.data.is_empty() {
            if !reply.errors.is_empty() {
                return Err(SessionError::Device {
                    req_id: request.req_id,
                    subscription: request.name.clone(),
                    errors: reply.errors,
                });
            }
            // keepalive reply, nothing to forward
            continue;
        }

        delay.wait().await;

        let frame = Frame {
            req_id: request.req_id,
            payload: reply.data,
        };
        if frames.send(frame).await.is_err() {
            return Err(SessionError::QueueClosed {
                req_id: request.req_id,
                subscription: request.name.clone(),
            });
        }
    }

    tracing::info!(
        req_id = request.req_id,
        subscription = %request.name,
        "subscription stream ended"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn request(name: &str) -> SubscriptionRequest {
        SubscriptionRequest {
            req_id: 42,
            encoding: Encoding::Json,
            name: name.to_string(),
            qos: None,
        }
    }

    fn data_reply(payload: &[u8]) -> Result<CreateSubsReply, Status> {
        Ok(CreateSubsReply {
            res_req_id: 42,
            data: payload.to_vec(),
            errors: String::new(),
        })
    }

    fn error_reply(errors: &str) -> Result<CreateSubsReply, Status> {
        Ok(CreateSubsReply {
            res_req_id: 42,
            data: Vec::new(),
            errors: errors.to_string(),
        })
    }

    #[test]
    fn test_to_args_carries_encoding_and_qos() {
        let mut request = request("cpu-util");
        request.encoding = Encoding::SelfDescribingGpb;
        request.qos = Some(46);

        let args = request.to_args();
        assert_eq!(args.req_id, 42);
        assert_eq!(args.encode, 3);
        assert_eq!(args.subidstr, "cpu-util");
        assert_eq!(args.qos, Some(QosMarking { marking: 46 }));
    }

    #[tokio::test]
    async fn test_frames_forwarded_in_order() {
        let stream = futures::stream::iter(vec![
            data_reply(b"first"),
            data_reply(b"second"),
            data_reply(b"third"),
        ]);
        let (tx, mut rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);

        run_session(&request("cpu-util"), stream, DelayCell::new(0), tx)
            .await
            .unwrap();

        let mut payloads = Vec::new();
        while let Some(frame) = rx.recv().await {
            assert_eq!(frame.req_id, 42);
            payloads.push(frame.payload);
        }
        assert_eq!(payloads, vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]);
    }

    #[tokio::test]
    async fn test_end_of_stream_closes_queue() {
        let stream = futures::stream::iter(vec![data_reply(b"only")]);
        let (tx, mut rx) = mpsc::channel(4);

        run_session(&request("cpu-util"), stream, DelayCell::new(0), tx)
            .await
            .unwrap();

        assert!(rx.recv().await.is_some());
        // sender dropped on return, so the queue reports closed
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_keepalive_reply_skipped() {
        let stream = futures::stream::iter(vec![error_reply(""), data_reply(b"data")]);
        let (tx, mut rx) = mpsc::channel(4);

        run_session(&request("cpu-util"), stream, DelayCell::new(0), tx)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().payload, b"data");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_device_error_is_terminal() {
        let stream = futures::stream::iter(vec![
            data_reply(b"data"),
            error_reply("collection group missing"),
            data_reply(b"never received"),
        ]);
        let (tx, mut rx) = mpsc::channel(4);

        let err = run_session(&request("cpu-util"), stream, DelayCell::new(0), tx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Device { req_id: 42, ref errors, .. }
                if errors.as_str() == "collection group missing"
        ));

        // only the frame received before the error made it through
        assert_eq!(rx.recv().await.unwrap().payload, b"data");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_transport_error_is_terminal() {
        let stream = futures::stream::iter(vec![
            data_reply(b"data"),
            Err(Status::unavailable("connection reset")),
        ]);
        let (tx, _rx) = mpsc::channel(4);

        let err = run_session(&request("cpu-util"), stream, DelayCell::new(0), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Transport { req_id: 42, .. }));
    }

    #[tokio::test]
    async fn test_full_queue_blocks_receive_loop() {
        let stream = futures::stream::iter(vec![
            data_reply(b"a"),
            data_reply(b"b"),
            data_reply(b"c"),
        ]);
        // capacity 1 and nobody draining: the session must suspend on the
        // second frame instead of dropping it
        let (tx, mut rx) = mpsc::channel(1);

        let request = request("cpu-util");
        let mut session = Box::pin(run_session(&request, stream, DelayCell::new(0), tx));
        assert!(
            tokio::time::timeout(Duration::from_millis(100), session.as_mut())
                .await
                .is_err()
        );

        // draining one frame frees one slot; the loop advances exactly one
        // send and suspends again
        assert_eq!(rx.recv().await.unwrap().payload, b"a");
        assert!(
            tokio::time::timeout(Duration::from_millis(100), session.as_mut())
                .await
                .is_err()
        );
        assert_eq!(rx.recv().await.unwrap().payload, b"b");

        session.await.unwrap();
        assert_eq!(rx.recv().await.unwrap().payload, b"c");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_delay_change_applies_to_later_frames() {
        let delay = DelayCell::new(0);
        let writer = delay.clone();
        // the second frame arrives after the control plane raised the delay
        let stream = Box::pin(async_stream::stream! {
            yield data_reply(b"a");
            writer.set(40);
            yield data_reply(b"b");
        });
        let (tx, mut rx) = mpsc::channel(4);

        let start = Instant::now();
        run_session(&request("cpu-util"), stream, delay, tx)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));

        assert_eq!(rx.recv().await.unwrap().payload, b"a");
        assert_eq!(rx.recv().await.unwrap().payload, b"b");
    }

    #[tokio::test]
    async fn test_delay_applied_before_enqueue() {
        let stream = futures::stream::iter(vec![data_reply(b"a"), data_reply(b"b")]);
        let (tx, mut rx) = mpsc::channel(4);
        let delay = DelayCell::new(40);

        let start = Instant::now();
        run_session(&request("cpu-util"), stream, delay, tx)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(80));

        assert_eq!(rx.recv().await.unwrap().payload, b"a");
        assert_eq!(rx.recv().await.unwrap().payload, b"b");
    }
}
