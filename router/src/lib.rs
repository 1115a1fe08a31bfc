#![deny(unreachable_pub)]

//! The router: an Envoy External Processor that steers client MCP traffic.
//!
//! The front proxy hands every HTTP transaction to this service phase by
//! phase. The router parses the JSON-RPC body, resolves `tools/call`
//! requests to the owning backend by tool-name prefix, rewrites the routing
//! headers so the proxy forwards the request there, and keeps the session
//! cache in step with the backend-issued session ids it observes on the
//! response path.

pub mod headers;
pub mod service;
pub mod trace;

/// Generated protobuf/gRPC bindings for the vendored subset of the Envoy
/// External Processor contract.
pub mod envoy {
    pub mod config {
        pub mod core {
            pub mod v3 {
                tonic::include_proto!("envoy.config.core.v3");
            }
        }
    }
    pub mod r#type {
        pub mod v3 {
            tonic::include_proto!("envoy.type.v3");
        }
    }
    pub mod service {
        pub mod ext_proc {
            pub mod v3 {
                tonic::include_proto!("envoy.service.ext_proc.v3");
            }
        }
    }
}

pub use service::RouterService;
pub use service::serve;
