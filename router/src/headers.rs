//! Conversions between the proxy's protobuf header maps and the flat maps
//! the routing logic works with, plus builders for the responses the router
//! emits.

use std::collections::HashMap;

use crate::envoy::config::core::v3::HeaderValue;
use crate::envoy::config::core::v3::HeaderValueOption;
use crate::envoy::r#type::v3::HttpStatus;
use crate::envoy::r#type::v3::StatusCode;
use crate::envoy::service::ext_proc::v3::BodyResponse;
use crate::envoy::service::ext_proc::v3::CommonResponse;
use crate::envoy::service::ext_proc::v3::HeaderMutation;
use crate::envoy::service::ext_proc::v3::HeadersResponse;
use crate::envoy::service::ext_proc::v3::ImmediateResponse;
use crate::envoy::service::ext_proc::v3::ProcessingResponse;
use crate::envoy::service::ext_proc::v3::processing_response::Response;

/// Flattens a proto header map: lowercased keys, `raw_value` preferred over
/// `value` as Envoy populates it on newer versions.
pub fn to_map(headers: Option<&crate::envoy::config::core::v3::HeaderMap>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Some(headers) = headers else {
        return map;
    };
    for header in &headers.headers {
        let value = if header.raw_value.is_empty() {
            header.value.clone()
        } else {
            String::from_utf8_lossy(&header.raw_value).into_owned()
        };
        map.insert(header.key.to_ascii_lowercase(), value);
    }
    map
}

/// A header mutation setting `set` and removing `remove`.
pub fn mutation(set: Vec<(String, String)>, remove: Vec<String>) -> HeaderMutation {
    HeaderMutation {
        set_headers: set
            .into_iter()
            .map(|(key, value)| HeaderValueOption {
                header: Some(HeaderValue {
                    key,
                    raw_value: value.into_bytes(),
                    ..Default::default()
                }),
            })
            .collect(),
        remove_headers: remove,
    }
}

pub fn headers_response(header_mutation: Option<HeaderMutation>) -> ProcessingResponse {
    ProcessingResponse {
        response: Some(Response::RequestHeaders(HeadersResponse {
            response: Some(CommonResponse {
                header_mutation,
                clear_route_cache: true,
                ..Default::default()
            }),
        })),
    }
}

pub fn body_response(header_mutation: Option<HeaderMutation>) -> ProcessingResponse {
    ProcessingResponse {
        response: Some(Response::RequestBody(BodyResponse {
            response: Some(CommonResponse {
                clear_route_cache: header_mutation.is_some(),
                header_mutation,
                ..Default::default()
            }),
        })),
    }
}

pub fn response_headers_response(header_mutation: Option<HeaderMutation>) -> ProcessingResponse {
    ProcessingResponse {
        response: Some(Response::ResponseHeaders(HeadersResponse {
            response: Some(CommonResponse {
                header_mutation,
                ..Default::default()
            }),
        })),
    }
}

pub fn response_body_passthrough() -> ProcessingResponse {
    ProcessingResponse {
        response: Some(Response::ResponseBody(BodyResponse {
            response: Some(CommonResponse::default()),
        })),
    }
}

/// Ends the HTTP transaction at the proxy with `code` and `body`.
pub fn immediate(code: StatusCode, body: &str) -> ProcessingResponse {
    ProcessingResponse {
        response: Some(Response::ImmediateResponse(ImmediateResponse {
            status: Some(HttpStatus { code: code as i32 }),
            headers: None,
            body: body.to_string(),
            details: String::new(),
        })),
    }
}
