//! Boundary to the HTTP client that talks to the ad server.

use serde::Serialize;
use serde_json::Value;

use crate::protocol::OutboundEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Post => "POST",
        }
    }
}

/// One batched call to the ad server. `events` is serialized as the JSON array body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiRequest {
    pub url: String,
    pub method: Method,
    pub events: Vec<OutboundEvent>,
}

impl ApiRequest {
    pub fn body(&self) -> Result<String, TransportError> {
        serde_json::to_string(&self.events).map_err(|e| TransportError::Body(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out")]
    Timeout,
    #[error("request aborted")]
    Aborted,
    #[error("invalid response body: {0}")]
    Body(String),
}

/// Receives the parsed response body, or the reason there is none.
pub type Completion = Box<dyn FnOnce(Result<Value, TransportError>)>;

/// Performs [`ApiRequest`]s.
///
/// Implementations must invoke `on_complete` exactly once and never from within
/// `send` itself: the placement expects to finish its own bookkeeping before
/// any response is handled.
pub trait Transport {
    fn send(&self, request: ApiRequest, on_complete: Completion);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AdDismissed;

    #[test]
    fn body_is_a_json_array_of_events() {
        let request = ApiRequest {
            url: "https://api.example.com/key/install".to_string(),
            method: Method::Post,
            events: vec![OutboundEvent::AdDismissed(AdDismissed {
                ad_id: Some("xyz".to_string()),
            })],
        };
        let body: Value = serde_json::from_str(&request.body().unwrap()).unwrap();
        assert_eq!(body, serde_json::json!([{"type": "adDismissed", "adId": "xyz"}]));
        assert_eq!(request.method.as_str(), "POST");
    }
}
