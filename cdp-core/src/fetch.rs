//! Fetch-domain command surface.
//!
//! Typed wrappers over the raw [`TargetClient`] for the interception calls
//! the pipeline issues. Binary fields (`postData`, fulfill bodies) are
//! base64-encoded as the protocol requires; fetched response bodies are
//! decoded transparently.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};

use crate::error::CdpError;
use crate::protocol::HeaderEntry;
use crate::transport::TargetClient;
use crate::Result;

impl TargetClient {
    pub async fn enable_network(&self) -> Result<()> {
        self.call("Network.enable", None).await?;
        Ok(())
    }

    /// Enable interception for every URL at both stages.
    pub async fn enable_fetch(&self) -> Result<()> {
        self.call(
            "Fetch.enable",
            Some(json!({
                "patterns": [
                    {"urlPattern": "*", "requestStage": "Request"},
                    {"urlPattern": "*", "requestStage": "Response"},
                ]
            })),
        )
        .await?;
        Ok(())
    }

    pub async fn disable_fetch(&self) -> Result<()> {
        self.call("Fetch.disable", None).await?;
        Ok(())
    }

    /// Continue a paused request, optionally replacing URL, method, the full
    /// header set, and the body.
    pub async fn continue_request(
        &self,
        request_id: &str,
        url: Option<&str>,
        method: Option<&str>,
        headers: Option<&[HeaderEntry]>,
        post_data: Option<&[u8]>,
    ) -> Result<()> {
        let mut params = json!({"requestId": request_id});
        if let Some(url) = url {
            params["url"] = json!(url);
        }
        if let Some(method) = method {
            params["method"] = json!(method);
        }
        if let Some(headers) = headers {
            params["headers"] = serde_json::to_value(headers)?;
        }
        if let Some(body) = post_data {
            params["postData"] = json!(BASE64.encode(body));
        }
        self.call("Fetch.continueRequest", Some(params)).await?;
        Ok(())
    }

    /// Continue a paused response, optionally overriding status and headers.
    pub async fn continue_response(
        &self,
        request_id: &str,
        response_code: Option<u16>,
        response_headers: Option<&[HeaderEntry]>,
    ) -> Result<()> {
        let mut params = json!({"requestId": request_id});
        if let Some(code) = response_code {
            params["responseCode"] = json!(code);
        }
        if let Some(headers) = response_headers {
            params["responseHeaders"] = serde_json::to_value(headers)?;
        }
        self.call("Fetch.continueResponse", Some(params)).await?;
        Ok(())
    }

    /// Answer a paused event with a synthetic response.
    pub async fn fulfill_request(
        &self,
        request_id: &str,
        response_code: u16,
        response_headers: &[HeaderEntry],
        body: Option<&[u8]>,
    ) -> Result<()> {
        let mut params = json!({
            "requestId": request_id,
            "responseCode": response_code,
        });
        if !response_headers.is_empty() {
            params["responseHeaders"] = serde_json::to_value(response_headers)?;
        }
        if let Some(body) = body {
            params["body"] = json!(BASE64.encode(body));
        }
        self.call("Fetch.fulfillRequest", Some(params)).await?;
        Ok(())
    }

    /// Abort a paused request with a network error reason such as `Failed`.
    pub async fn fail_request(&self, request_id: &str, error_reason: &str) -> Result<()> {
        self.call(
            "Fetch.failRequest",
            Some(json!({"requestId": request_id, "errorReason": error_reason})),
        )
        .await?;
        Ok(())
    }

    /// Fetch the paused response's body as text.
    pub async fn get_response_body(&self, request_id: &str) -> Result<String> {
        let result = self
            .call(
                "Fetch.getResponseBody",
                Some(json!({"requestId": request_id})),
            )
            .await?;
        decode_response_body(&result)
    }
}

fn decode_response_body(result: &Value) -> Result<String> {
    let body = result["body"].as_str().unwrap_or_default();
    if result["base64Encoded"].as_bool().unwrap_or(false) {
        let bytes = BASE64.decode(body).map_err(|_| CdpError::BodyDecode)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        Ok(body.to_string())
    }
}
