//! Production transport over `reqwest`.
//!
//! Maps one `ApiRequest` to one `reqwest` call. Timeouts are reported as
//! `TransportError::Timeout`; every other failure before a complete response
//! is read is `TransportError::Network`.

use crate::{ApiRequest, ApiResponse, RequestBody, Transport, TransportError, TransportResult};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

pub struct ReqwestTransport {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client, default_timeout: Duration) -> Self {
        Self {
            client,
            default_timeout,
        }
    }

    async fn execute(&self, request: ApiRequest) -> TransportResult {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers)
            .timeout(timeout);

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Raw { content_type, data } => {
                builder.header(CONTENT_TYPE, content_type).body(data)
            }
            RequestBody::Multipart(parts) => {
                let mut form = Form::new();
                for part in parts {
                    let mut body = Part::bytes(part.data.to_vec())
                        .mime_str(&part.content_type)
                        .map_err(|e| {
                            TransportError::Network(format!(
                                "invalid multipart content type {}: {e}",
                                part.content_type
                            ))
                        })?;
                    if let Some(file_name) = part.file_name {
                        body = body.file_name(file_name);
                    }
                    form = form.part(part.name, body);
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().await.map_err(|e| map_error(e, timeout))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| map_error(e, timeout))?;

        debug!(status = status.as_u16(), bytes = body.len(), "received response");
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: ApiRequest) -> Pin<Box<dyn Future<Output = TransportResult> + Send + '_>> {
        Box::pin(self.execute(request))
    }
}

fn map_error(error: reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        warn!(timeout_ms = timeout.as_millis() as u64, "request timed out");
        TransportError::Timeout(format!("no response within {}ms", timeout.as_millis()))
    } else {
        warn!(error = %error, "request failed without a response");
        TransportError::Network(error.to_string())
    }
}
