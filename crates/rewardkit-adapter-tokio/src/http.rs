use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use rewardkit_core::{ApiRequest, Completion, Method, Transport, TransportError};
use serde_json::Value;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts placement events with `reqwest`. Completions run on the local task set.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn request_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.to_string())
    }
}

async fn perform(client: &reqwest::Client, request: ApiRequest) -> Result<Value, TransportError> {
    let body = request.body()?;
    let method = match request.method {
        Method::Post => reqwest::Method::POST,
    };
    let response = client
        .request(method, &request.url)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/json")
        .body(body)
        .send()
        .await
        .map_err(request_error)?;

    // Error statuses still carry JSON event batches.
    let status = response.status();
    if !status.is_success() {
        log::warn!("{} answered {}", request.url, status);
    }
    response.json::<Value>().await.map_err(|e| {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Body(e.to_string())
        }
    })
}

impl Transport for HttpTransport {
    fn send(&self, request: ApiRequest, on_complete: Completion) {
        let client = self.client.clone();
        tokio::task::spawn_local(async move {
            let result = perform(&client, request).await;
            if let Err(e) = &result {
                log::debug!("request failed: {}", e);
            }
            on_complete(result);
        });
    }
}
