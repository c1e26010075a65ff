use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Delimiter between subscription names in the configured subscription
/// string, e.g. `"cpu-util#mem-stats"`.
pub const SUBSCRIPTION_DELIMITER: char = '#';

/// Default server name verified during the TLS handshake.
pub const DEFAULT_TLS_SERVER_NAME: &str = "ems.cisco.com";

/// Errors produced while validating the startup configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("not supported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("no subscriptions configured")]
    NoSubscriptions,

    #[error("no yang path configured for get-schema")]
    NoYangPath,
}

/// Telemetry payload encoding requested from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Gpb,
    SelfDescribingGpb,
    Json,
}

impl Encoding {
    /// Wire selector sent in `CreateSubsArgs.encode`.
    pub fn selector(self) -> i64 {
        match self {
            Encoding::Gpb => 2,
            Encoding::SelfDescribingGpb => 3,
            Encoding::Json => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Gpb => "gpb",
            Encoding::SelfDescribingGpb => "self-describing-gpb",
            Encoding::Json => "json",
        }
    }
}

impl FromStr for Encoding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gpb" => Ok(Encoding::Gpb),
            "self-describing-gpb" => Ok(Encoding::SelfDescribingGpb),
            "json" => Ok(Encoding::Json),
            other => Err(ConfigError::UnsupportedEncoding(other.to_string())),
        }
    }
}

/// What the process does for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Stream telemetry for the configured subscriptions.
    Subscribe,
    /// Fetch a schema file for a yang path, then exit.
    GetSchema,
}

impl FromStr for Operation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "subscribe" => Ok(Operation::Subscribe),
            "get-schema" | "get-proto" => Ok(Operation::GetSchema),
            other => Err(ConfigError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// Validated startup configuration for a collector run.
///
/// Immutable once the process starts; the control listener adjusts the live
/// delay through [`crate::delay::DelayCell`], not through this struct.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Device address, `host:port`.
    pub server_addr: String,
    pub operation: Operation,
    /// `#`-separated subscription names.
    pub subscriptions: String,
    pub encoding: Encoding,
    pub username: String,
    pub password: String,
    /// CA certificate for TLS; plaintext when absent.
    pub tls_cert: Option<PathBuf>,
    /// Server name to verify during the TLS handshake.
    pub tls_server_name: String,
    /// QoS marking for the subscription sessions.
    pub qos: Option<u32>,
    /// Yang path for the get-schema operation.
    pub yang_path: Option<String>,
    /// Output file; stdout when absent (and no forwarding port is set).
    pub out_file: Option<PathBuf>,
    /// Port for the runtime control listener; absent disables it.
    pub control_port: Option<u16>,
    /// Forwarding destination IP. Also widens the control listener bind
    /// address to all interfaces when set.
    pub output_ip: Option<String>,
    /// Forwarding destination port; absent disables forwarding.
    pub output_port: Option<u16>,
    /// Initial artificial per-frame delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Remove `telemetry-msg-*.dat` scratch files on interrupt.
    pub cleanup_on_exit: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            server_addr: String::new(), // Must be set by user
            operation: Operation::Subscribe,
            subscriptions: String::new(),
            encoding: Encoding::Json,
            username: String::new(),
            password: String::new(),
            tls_cert: None,
            tls_server_name: DEFAULT_TLS_SERVER_NAME.to_string(),
            qos: None,
            yang_path: None,
            out_file: None,
            control_port: None,
            output_ip: None,
            output_port: None,
            initial_delay_ms: 0,
            cleanup_on_exit: true,
        }
    }
}

impl CollectorConfig {
    /// Create a new config for the given device address.
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            ..Default::default()
        }
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    pub fn with_subscriptions(mut self, subscriptions: impl Into<String>) -> Self {
        self.subscriptions = subscriptions.into();
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_control_port(mut self, port: u16) -> Self {
        self.control_port = Some(port);
        self
    }

    pub fn with_forwarding(mut self, ip: Option<String>, port: u16) -> Self {
        self.output_ip = ip;
        self.output_port = Some(port);
        self
    }

    pub fn with_initial_delay_ms(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    pub fn with_cleanup_on_exit(mut self, cleanup: bool) -> Self {
        self.cleanup_on_exit = cleanup;
        self
    }

    /// Subscription names derived from the configured string.
    ///
    /// Empty segments are dropped, so `"a##b"` and `"a#b#"` both yield two
    /// names.
    pub fn subscription_names(&self) -> Vec<&str> {
        self.subscriptions
            .split(SUBSCRIPTION_DELIMITER)
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// Check the per-operation requirements that cannot be expressed in the
    /// types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.operation {
            Operation::Subscribe => {
                if self.subscription_names().is_empty() {
                    return Err(ConfigError::NoSubscriptions);
                }
            }
            Operation::GetSchema => {
                if self.yang_path.as_deref().unwrap_or("").is_empty() {
                    return Err(ConfigError::NoYangPath);
                }
            }
        }
        Ok(())
    }
}
