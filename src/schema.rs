use std::path::{Path, PathBuf};

use futures::{Stream, StreamExt};
use mdt_dialin::{DialinClient, DialinError};
use mdt_dialin::proto::{GetProtoFileArgs, GetProtoFileReply};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tonic::Status;

/// Failures of the one-shot schema fetch. All are fatal for the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchemaError {
    #[error(transparent)]
    Dialin(#[from] DialinError),

    #[error("schema fetch (request {req_id}): stream error: {status}")]
    Transport { req_id: i64, status: Status },

    #[error("schema fetch (request {req_id}): device reported: {errors}")]
    Device { req_id: i64, errors: String },

    #[error("schema fetch: sent request {sent}, received reply for {received}")]
    ReqIdMismatch { sent: i64, received: i64 },

    #[error("failed to create schema output file {path}")]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write schema output")]
    Output(#[source] std::io::Error),
}

/// Fetch the schema file for `yang_path` and write it to `out_file`
/// (stdout when absent). One-shot: the caller exits when this returns.
pub async fn run_get_schema(
    mut client: DialinClient,
    req_id: i64,
    yang_path: &str,
    out_file: Option<&Path>,
) -> Result<(), SchemaError> {
    tracing::info!(req_id, yang_path, "fetching schema file");

    let stream = client
        .get_proto_file(GetProtoFileArgs {
            req_id,
            yang_path: yang_path.to_string(),
        })
        .await?;

    match out_file {
        Some(path) => {
            let mut file =
                tokio::fs::File::create(path)
                    .await
                    .map_err(|source| SchemaError::CreateOutput {
                        path: path.to_path_buf(),
                        source,
                    })?;
            fetch_schema(req_id, stream, &mut file).await
        }
        None => {
            let mut stdout = tokio::io::stdout();
            fetch_schema(req_id, stream, &mut stdout).await
        }
    }
}

/// Drain the schema chunk stream into `out`, in order.
///
/// A device-reported error or an echoed request id that does not match
/// `req_id` aborts before any further content is written.
pub async fn fetch_schema<S, W>(req_id: i64, mut chunks: S, out: &mut W) -> Result<(), SchemaError>
where
    S: Stream<Item = Result<GetProtoFileReply, Status>> + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(result) = chunks.next().await {
        let reply = result.map_err(|status| SchemaError::Transport { req_id, status })?;

        if !reply.errors.is_empty() {
            return Err(SchemaError::Device {
                req_id,
                errors: reply.errors,
            });
        }
        if reply.req_id != req_id {
            return Err(SchemaError::ReqIdMismatch {
                sent: req_id,
                received: reply.req_id,
            });
        }
        if reply.proto_content.is_empty() {
            tracing::debug!(req_id, "empty schema chunk");
            continue;
        }

        out.write_all(reply.proto_content.as_bytes())
            .await
            .map_err(SchemaError::Output)?;
    }

    out.flush().await.map_err(SchemaError::Output)?;
    tracing::info!(req_id, "schema fetch complete");
    Ok(())
}
