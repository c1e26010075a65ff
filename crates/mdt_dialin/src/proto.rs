//! Message types for the dial-in service, kept in the shape
//! `tonic-prost-build` emits for `mdt_grpc_dialin.proto` so the wire format
//! matches the device exactly.

/// Arguments for the `CreateSubs` subscription call.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateSubsArgs {
    /// Caller-chosen request id, echoed by the device.
    #[prost(int64, tag = "1")]
    pub req_id: i64,
    /// Requested payload encoding (see the collector's encoding selectors).
    #[prost(int64, tag = "2")]
    pub encode: i64,
    /// Name of the configured subscription to stream.
    #[prost(string, tag = "3")]
    pub subidstr: ::prost::alloc::string::String,
    /// Optional QoS marking for the session.
    #[prost(message, optional, tag = "4")]
    pub qos: ::core::option::Option<QosMarking>,
}

/// DSCP marking applied to the telemetry session.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct QosMarking {
    #[prost(uint32, tag = "1")]
    pub marking: u32,
}

/// One unit of the `CreateSubs` response stream.
///
/// A reply carries either telemetry bytes in `data` or, when `data` is
/// empty, an error report in `errors`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateSubsReply {
    /// Request id this reply belongs to.
    #[prost(int64, tag = "1")]
    pub res_req_id: i64,
    /// Raw telemetry payload in the requested encoding.
    #[prost(bytes = "vec", tag = "2")]
    pub data: ::prost::alloc::vec::Vec<u8>,
    /// Device-reported error text, empty on success.
    #[prost(string, tag = "3")]
    pub errors: ::prost::alloc::string::String,
}

/// Arguments for the `GetProtoFile` schema fetch.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetProtoFileArgs {
    #[prost(int64, tag = "1")]
    pub req_id: i64,
    /// Yang model or xpath to fetch the generated schema for.
    #[prost(string, tag = "2")]
    pub yang_path: ::prost::alloc::string::String,
}

/// One chunk of the `GetProtoFile` response stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetProtoFileReply {
    /// Echo of the request id; a mismatch means the reply is not ours.
    #[prost(int64, tag = "1")]
    pub req_id: i64,
    /// Schema file content, streamed in order.
    #[prost(string, tag = "2")]
    pub proto_content: ::prost::alloc::string::String,
    /// Device-reported error text, empty on success.
    #[prost(string, tag = "3")]
    pub errors: ::prost::alloc::string::String,
}
