use std::path::PathBuf;

use tonic::Request;
use tonic::client::Grpc;
use tonic::codec::Streaming;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::MetadataValue;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};

use crate::error::DialinError;
use crate::proto::{CreateSubsArgs, CreateSubsReply, GetProtoFileArgs, GetProtoFileReply};

const CREATE_SUBS_PATH: &str = "/IOSXRExtensibleManagabilityService.gRPCConfigOper/CreateSubs";
const GET_PROTO_FILE_PATH: &str =
    "/IOSXRExtensibleManagabilityService.gRPCConfigOper/GetProtoFile";

/// Username and password sent as per-request metadata.
///
/// The dial-in service authenticates every call from request metadata rather
/// than at the transport layer, so these are attached to each RPC.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn apply<T>(&self, request: &mut Request<T>) -> Result<(), DialinError> {
        let metadata = request.metadata_mut();
        metadata.insert("username", MetadataValue::try_from(self.username.as_str())?);
        metadata.insert("password", MetadataValue::try_from(self.password.as_str())?);
        Ok(())
    }
}

/// TLS parameters for the device connection.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    /// PEM CA certificate used to verify the device.
    pub ca_certificate: PathBuf,
    /// Server name expected during the TLS handshake.
    pub domain_name: String,
}

/// Client for the dial-in config-oper service.
///
/// Cheap to clone; clones share the underlying HTTP/2 channel, so one dialed
/// connection can drive any number of concurrent streams.
#[derive(Debug, Clone)]
pub struct DialinClient {
    inner: Grpc<Channel>,
    credentials: Credentials,
}

impl DialinClient {
    /// Dial `server_addr` (`host:port`) and return a ready client.
    pub async fn connect(
        server_addr: &str,
        tls: Option<TlsSettings>,
        credentials: Credentials,
    ) -> Result<Self, DialinError> {
        let scheme = if tls.is_some() { "https" } else { "http" };
        let uri = format!("{scheme}://{server_addr}");
        let connect_err = |source| DialinError::Connect {
            endpoint: server_addr.to_string(),
            source,
        };

        let mut endpoint = Endpoint::from_shared(uri).map_err(connect_err)?;
        if let Some(tls) = tls {
            let pem = tokio::fs::read(&tls.ca_certificate)
                .await
                .map_err(|source| DialinError::Certificate {
                    path: tls.ca_certificate.clone(),
                    source,
                })?;
            let config = ClientTlsConfig::new()
                .ca_certificate(Certificate::from_pem(pem))
                .domain_name(tls.domain_name);
            endpoint = endpoint.tls_config(config).map_err(connect_err)?;
        }

        let channel = endpoint.connect().await.map_err(connect_err)?;
        Ok(Self::new(channel, credentials))
    }

    /// Wrap an already-established channel.
    pub fn new(channel: Channel, credentials: Credentials) -> Self {
        Self {
            inner: Grpc::new(channel),
            credentials,
        }
    }

    /// Open a telemetry subscription stream.
    pub async fn create_subs(
        &mut self,
        args: CreateSubsArgs,
    ) -> Result<Streaming<CreateSubsReply>, DialinError> {
        self.server_streaming(args, CREATE_SUBS_PATH).await
    }

    /// Fetch the generated schema file for a yang path.
    pub async fn get_proto_file(
        &mut self,
        args: GetProtoFileArgs,
    ) -> Result<Streaming<GetProtoFileReply>, DialinError> {
        self.server_streaming(args, GET_PROTO_FILE_PATH).await
    }

    async fn server_streaming<M1, M2>(
        &mut self,
        message: M1,
        path: &'static str,
    ) -> Result<Streaming<M2>, DialinError>
    where
        M1: prost::Message + 'static,
        M2: prost::Message + Default + 'static,
    {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("service was not ready: {e}")))?;

        let codec: tonic_prost::ProstCodec<M1, M2> = tonic_prost::ProstCodec::default();
        let mut request = Request::new(message);
        self.credentials.apply(&mut request)?;

        tracing::debug!(path, "issuing dial-in call");
        let response = self
            .inner
            .server_streaming(request, PathAndQuery::from_static(path), codec)
            .await?;
        Ok(response.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_attached_as_metadata() {
        let credentials = Credentials::new("operator", "secret");
        let mut request = Request::new(());
        credentials.apply(&mut request).unwrap();

        let metadata = request.metadata();
        assert_eq!(metadata.get("username").unwrap(), "operator");
        assert_eq!(metadata.get("password").unwrap(), "secret");
    }

    #[test]
    fn test_non_ascii_credentials_rejected() {
        let credentials = Credentials::new("opérateur", "secret");
        let mut request = Request::new(());
        assert!(matches!(
            credentials.apply(&mut request),
            Err(DialinError::Credentials(_))
        ));
    }
}
