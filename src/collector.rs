use std::path::PathBuf;

use mdt_dialin::{DialinClient, DialinError};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::config::{CollectorConfig, ConfigError, Operation};
use crate::control::ControlListener;
use crate::decode::{Decoder, OutputHandle};
use crate::delay::DelayCell;
use crate::lifecycle;
use crate::schema::{self, SchemaError};
use crate::session::{self, FRAME_QUEUE_CAPACITY, Frame, SessionError, SubscriptionRequest};
use crate::sink;

/// Everything that ends the whole process with a non-zero status.
///
/// Fatal conditions inside session tasks are funneled out through a channel
/// and surface here as values, so the abort path is a propagated signal
/// rather than an exit buried in a task.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FatalError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dialin(#[from] DialinError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("failed to open forwarding socket {addr}")]
    Forward {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create output file {path}")]
    OutputFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind control listener on port {port}")]
    ControlBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// How a run ended when it did not end in a fatal error. All of these map to
/// exit status 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The one-shot get-schema operation finished.
    Completed,
    /// A `CLOSE` command arrived on the control port.
    ControlClose,
    /// An interrupt arrived; scratch files were cleaned up first.
    Interrupted,
}

/// Run the collector to completion.
///
/// For `subscribe` this dials the device once, starts the control listener
/// (when configured), opens the output destination, spawns one session +
/// sink pair per subscription name, and then blocks on the supervising join
/// point until a fatal error, a `CLOSE` command, or an interrupt.
pub async fn run(config: CollectorConfig) -> Result<ExitReason, FatalError> {
    config.validate()?;

    let client = crate::connect(&config).await?;
    let req_id = i64::from(std::process::id());

    if config.operation == Operation::GetSchema {
        let yang_path = config.yang_path.as_deref().unwrap_or_default();
        schema::run_get_schema(client, req_id, yang_path, config.out_file.as_deref()).await?;
        return Ok(ExitReason::Completed);
    }

    let delay = DelayCell::new(config.initial_delay_ms);
    let (fatal_tx, mut fatal_rx) = mpsc::channel::<FatalError>(1);
    let (close_tx, mut close_rx) = mpsc::channel::<()>(1);

    if let Some(port) = config.control_port {
        let listener = ControlListener::bind(control_bind_ip(&config), port)
            .await
            .map_err(|source| FatalError::ControlBind { port, source })?;
        tokio::spawn(listener.run(delay.clone(), close_tx));
    }

    let output = open_output(&config).await?;

    for request in subscription_requests(&config, req_id) {
        spawn_subscription(
            client.clone(),
            request,
            &config,
            delay.clone(),
            output.clone(),
            fatal_tx.clone(),
        );
    }

    // This scope keeps one fatal sender alive, so the channel never closes
    // even when every session ends cleanly; the process then keeps blocking
    // until CLOSE or an interrupt.
    tokio::select! {
        Some(err) = fatal_rx.recv() => Err(err),
        Some(()) = close_rx.recv() => Ok(ExitReason::ControlClose),
        _ = lifecycle::wait_for_interrupt(config.cleanup_on_exit) => {
            lifecycle::remove_temp_artifacts(&std::env::temp_dir());
            Ok(ExitReason::Interrupted)
        }
    }
}

/// The control listener stays loopback-only unless an explicit forwarding
/// IP opted this process into non-local traffic.
fn control_bind_ip(config: &CollectorConfig) -> &'static str {
    if config.output_ip.is_some() {
        "0.0.0.0"
    } else {
        "127.0.0.1"
    }
}

fn subscription_requests(config: &CollectorConfig, req_id: i64) -> Vec<SubscriptionRequest> {
    config
        .subscription_names()
        .into_iter()
        .map(|name| SubscriptionRequest {
            req_id,
            encoding: config.encoding,
            name: name.to_string(),
            qos: config.qos,
        })
        .collect()
}

/// Open the output destination shared by every sink: the forwarding socket
/// when configured, else the output file, else stdout.
async fn open_output(config: &CollectorConfig) -> Result<OutputHandle, FatalError> {
    if let Some(port) = config.output_port {
        let ip = config.output_ip.as_deref().unwrap_or("127.0.0.1");
        let addr = format!("{ip}:{port}");
        let socket = TcpStream::connect(&addr)
            .await
            .map_err(|source| FatalError::Forward {
                addr: addr.clone(),
                source,
            })?;
        tracing::info!(%addr, "forwarding decoded output");
        Ok(OutputHandle::from_writer(Box::new(socket)))
    } else if let Some(path) = &config.out_file {
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|source| FatalError::OutputFile {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), "writing decoded output to file");
        Ok(OutputHandle::from_writer(Box::new(file)))
    } else {
        Ok(OutputHandle::stdout())
    }
}

/// Start one session + sink pair. The bounded frame queue between them is
/// created here and never rebound.
fn spawn_subscription(
    mut client: DialinClient,
    request: SubscriptionRequest,
    config: &CollectorConfig,
    delay: DelayCell,
    output: OutputHandle,
    fatal: mpsc::Sender<FatalError>,
) {
    let (frames_tx, frames_rx) = mpsc::channel::<Frame>(FRAME_QUEUE_CAPACITY);

    let decoder = Decoder::new(
        request.encoding,
        output,
        std::env::temp_dir(),
        !config.cleanup_on_exit,
    );
    tokio::spawn(sink::run_sink(request.name.clone(), frames_rx, decoder));

    tokio::spawn(async move {
        let stream = match client.create_subs(request.to_args()).await {
            Ok(stream) => stream,
            Err(err) => {
                let _ = fatal.send(err.into()).await;
                return;
            }
        };
        if let Err(err) = session::run_session(&request, stream, delay, frames_tx).await {
            let _ = fatal.send(err.into()).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Encoding;

    #[test]
    fn test_one_request_per_subscription_name() {
        let config = CollectorConfig::new("device:57500")
            .with_subscriptions("cpu-util#mem-stats#intf-counters")
            .with_encoding(Encoding::Gpb);
        let requests = subscription_requests(&config, 1234);

        assert_eq!(requests.len(), 3);
        let names: Vec<_> = requests.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["cpu-util", "mem-stats", "intf-counters"]);
        assert!(requests.iter().all(|r| r.req_id == 1234));
        assert!(requests.iter().all(|r| r.encoding == Encoding::Gpb));
    }

    #[test]
    fn test_control_bind_is_loopback_unless_forwarding_ip_set() {
        let local = CollectorConfig::new("device:57500");
        assert_eq!(control_bind_ip(&local), "127.0.0.1");

        let exposed = CollectorConfig::new("device:57500")
            .with_forwarding(Some("192.0.2.10".to_string()), 9000);
        assert_eq!(control_bind_ip(&exposed), "0.0.0.0");
    }

    #[tokio::test]
    async fn test_unreachable_forwarding_endpoint_is_fatal() {
        // port 1 on loopback: nothing listens there
        let config = CollectorConfig::new("device:57500")
            .with_subscriptions("cpu-util")
            .with_forwarding(None, 1);

        let err = open_output(&config).await.unwrap_err();
        assert!(matches!(err, FatalError::Forward { .. }));
    }
}
