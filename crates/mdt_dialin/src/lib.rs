//! Client for the IOS-XR model-driven telemetry dial-in service.
//!
//! The device exposes `IOSXRExtensibleManagabilityService.gRPCConfigOper`
//! with two server-streaming calls: `CreateSubs`, which opens a telemetry
//! subscription and streams data frames until the device closes it, and
//! `GetProtoFile`, which streams back the schema file for a yang path.
//!
//! # Example
//!
//! ```ignore
//! use mdt_dialin::{Credentials, DialinClient, proto::CreateSubsArgs};
//!
//! let credentials = Credentials::new("admin", "admin");
//! let mut client = DialinClient::connect("10.0.0.1:57500", None, credentials).await?;
//!
//! let mut stream = client
//!     .create_subs(CreateSubsArgs {
//!         req_id: 1,
//!         encode: 4,
//!         subidstr: "cpu-util".to_string(),
//!         qos: None,
//!     })
//!     .await?;
//!
//! while let Some(reply) = stream.message().await? {
//!     println!("{} bytes", reply.data.len());
//! }
//! ```

mod client;
mod error;
pub mod proto;

pub use client::{Credentials, DialinClient, TlsSettings};
pub use error::DialinError;
