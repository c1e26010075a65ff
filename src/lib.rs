pub mod collector;
pub mod config;
pub mod control;
pub mod decode;
pub mod delay;
pub mod lifecycle;
pub mod schema;
pub mod session;
pub mod sink;

use mdt_dialin::{Credentials, DialinClient, DialinError, TlsSettings};

use crate::config::CollectorConfig;

pub use crate::collector::{ExitReason, FatalError, run};
pub use crate::config::{Encoding, Operation};

/// Dial the device described by `config` and return an authenticated client.
///
/// The client wraps one HTTP/2 channel; clones of it share that channel, so
/// every subscription session in the run multiplexes over a single
/// connection.
pub async fn connect(config: &CollectorConfig) -> Result<DialinClient, DialinError> {
    let tls = config.tls_cert.as_ref().map(|cert| TlsSettings {
        ca_certificate: cert.clone(),
        domain_name: config.tls_server_name.clone(),
    });
    let credentials = Credentials::new(config.username.clone(), config.password.clone());

    DialinClient::connect(&config.server_addr, tls, credentials).await
}
