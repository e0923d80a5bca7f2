//! Goldmane wire types
//!
//! This module contains the Rust types for the Goldmane flow API.
//! With the `proto-gen` feature the code is generated at build time by
//! tonic-build from `proto/goldmane/api.proto`.
//!
//! Otherwise the checked-in types below are used. They must stay in sync with
//! the proto file.

#[cfg(feature = "proto-gen")]
pub mod goldmane {
    tonic::include_proto!("goldmane");
}

#[cfg(not(feature = "proto-gen"))]
pub mod goldmane {
    use prost::Message;

    #[derive(Clone, PartialEq, Message)]
    pub struct FlowStreamRequest {
        #[prost(int64, tag = "1")]
        pub start_time_gte: i64,
        #[prost(message, optional, tag = "2")]
        pub filter: Option<Filter>,
        #[prost(int64, tag = "3")]
        pub aggregation_interval: i64,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct Filter {}

    #[derive(Clone, PartialEq, Message)]
    pub struct FlowResult {
        #[prost(int64, tag = "1")]
        pub id: i64,
        #[prost(message, optional, tag = "2")]
        pub flow: Option<Flow>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct Flow {
        #[prost(message, optional, tag = "1")]
        pub key: Option<FlowKey>,
        #[prost(int64, tag = "2")]
        pub start_time: i64,
        #[prost(int64, tag = "3")]
        pub end_time: i64,
        #[prost(string, repeated, tag = "4")]
        pub source_labels: Vec<String>,
        #[prost(string, repeated, tag = "5")]
        pub dest_labels: Vec<String>,
        #[prost(int64, tag = "6")]
        pub packets_in: i64,
        #[prost(int64, tag = "7")]
        pub packets_out: i64,
        #[prost(int64, tag = "8")]
        pub bytes_in: i64,
        #[prost(int64, tag = "9")]
        pub bytes_out: i64,
        #[prost(int64, tag = "10")]
        pub num_connections_started: i64,
        #[prost(int64, tag = "11")]
        pub num_connections_completed: i64,
        #[prost(int64, tag = "12")]
        pub num_connections_live: i64,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct FlowKey {
        #[prost(string, tag = "1")]
        pub source_name: String,
        #[prost(string, tag = "2")]
        pub source_namespace: String,
        #[prost(enumeration = "EndpointType", tag = "3")]
        pub source_type: i32,
        #[prost(string, tag = "4")]
        pub dest_name: String,
        #[prost(string, tag = "5")]
        pub dest_namespace: String,
        #[prost(enumeration = "EndpointType", tag = "6")]
        pub dest_type: i32,
        #[prost(int64, tag = "7")]
        pub dest_port: i64,
        #[prost(string, tag = "8")]
        pub dest_service_name: String,
        #[prost(string, tag = "9")]
        pub dest_service_namespace: String,
        #[prost(string, tag = "10")]
        pub dest_service_port_name: String,
        #[prost(int64, tag = "11")]
        pub dest_service_port: i64,
        #[prost(string, tag = "12")]
        pub proto: String,
        #[prost(enumeration = "Reporter", tag = "13")]
        pub reporter: i32,
        #[prost(enumeration = "Action", tag = "14")]
        pub action: i32,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum EndpointType {
        Unspecified = 0,
        WorkloadEndpoint = 1,
        HostEndpoint = 2,
        NetworkSet = 3,
        Network = 4,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Reporter {
        Unspecified = 0,
        Src = 1,
        Dst = 2,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Action {
        Unspecified = 0,
        Allow = 1,
        Deny = 2,
        Pass = 3,
    }

    pub mod flows_client {
        use super::*;
        use tonic::codegen::*;

        #[derive(Debug, Clone)]
        pub struct FlowsClient<T> {
            inner: tonic::client::Grpc<T>,
        }

        impl FlowsClient<tonic::transport::Channel> {
            pub fn new(channel: tonic::transport::Channel) -> Self {
                let inner = tonic::client::Grpc::new(channel);
                Self { inner }
            }
        }

        impl<T> FlowsClient<T>
        where
            T: tonic::client::GrpcService<tonic::body::BoxBody>,
            T::Error: Into<StdError>,
            T::ResponseBody: Body<Data = Bytes> + Send + 'static,
            <T::ResponseBody as Body>::Error: Into<StdError> + Send,
        {
            pub fn with_origin(inner: T, origin: http::Uri) -> Self {
                let inner = tonic::client::Grpc::with_origin(inner, origin);
                Self { inner }
            }

            /// Opens the server-streaming flow call.
            pub async fn stream(
                &mut self,
                request: impl tonic::IntoRequest<FlowStreamRequest>,
            ) -> Result<tonic::Response<tonic::codec::Streaming<FlowResult>>, tonic::Status>
            {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static("/goldmane.Flows/Stream");
                self.inner
                    .server_streaming(request.into_request(), path, codec)
                    .await
            }
        }
    }
}

pub use goldmane::flows_client::FlowsClient;
pub use goldmane::*;
