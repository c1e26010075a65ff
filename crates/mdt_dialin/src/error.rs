use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while dialing the device or issuing dial-in calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DialinError {
    /// Failed to read the configured TLS CA certificate.
    #[error("failed to read TLS certificate {path}")]
    Certificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The endpoint could not be parsed or the transport failed to connect.
    #[error("failed to connect to {endpoint}")]
    Connect {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },

    /// A credential value is not valid gRPC metadata.
    #[error("credential is not valid request metadata")]
    Credentials(#[from] tonic::metadata::errors::InvalidMetadataValue),

    /// The device rejected the call.
    #[error(transparent)]
    Grpc(#[from] tonic::Status),
}
