//! Generic HTTP adapters for the backend traits.
//!
//! These call a configured base URL with a JSON body and classify the
//! response status the way §4.5 requires (429/5xx-equivalent →
//! `BackendTransient`, everything else → `BackendPermanent`). They are
//! intentionally thin and vendor-agnostic: wiring a specific provider
//! (an image model, a slide-rendering API) in is a matter of pointing
//! `base_url` at it, not rewriting this adapter.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde_json::Value;

use reportdeck_domain::Error;
use reportdeck_retry::is_retryable_http_status;

fn classify_status(status: reqwest::StatusCode) -> Error {
    if is_retryable_http_status(status.as_u16()) {
        Error::backend_transient(format!("upstream returned {status}"))
    } else {
        Error::backend_permanent(format!("upstream returned {status}"))
    }
}

/// POSTs `body` as JSON to `url`, returning the raw response body text on
/// success and a classified [`Error`] otherwise.
pub async fn post_json_for_text(client: &Client, url: &str, body: &Value) -> Result<String, Error> {
    let resp = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| Error::backend_transient(format!("request failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(classify_status(resp.status()));
    }

    resp.text()
        .await
        .map_err(|e| Error::backend_permanent(format!("reading response body: {e}")))
}

/// POSTs `body` as JSON to `url`, returning the raw response bytes
/// (e.g. image payloads) on success.
pub async fn post_json_for_bytes(client: &Client, url: &str, body: &Value) -> Result<Vec<u8>, Error> {
    let resp = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| Error::backend_transient(format!("request failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(classify_status(resp.status()));
    }

    resp.bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| Error::backend_permanent(format!("reading response bytes: {e}")))
}

// ── Concrete HTTP adapters ──────────────────────────────────────────

use async_trait::async_trait;

use crate::backend::{DeckBackend, ImageBackend, SlideContent, SummarizerBackend};

/// Calls `{base_url}/summarize` and `{base_url}/complete` with a plain
/// `{"prompt": ...}` body, expecting a `{"text": "..."}` response.
pub struct HttpSummarizerBackend {
    client: Client,
    base_url: String,
}

impl HttpSummarizerBackend {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn ask(&self, path: &str, prompt: &str) -> Result<String, Error> {
        let url = format!("{}/{path}", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "prompt": prompt });
        let raw = post_json_for_text(&self.client, &url, &body).await?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| Error::backend_permanent(format!("malformed backend response: {e}")))?;
        value
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::backend_permanent("backend response missing `text` field"))
    }
}

#[async_trait]
impl SummarizerBackend for HttpSummarizerBackend {
    async fn summarize(&self, prompt: &str) -> Result<String, Error> {
        self.ask("summarize", prompt).await
    }

    async fn complete(&self, prompt: &str) -> Result<String, Error> {
        self.ask("complete", prompt).await
    }
}

/// Calls `{base_url}/generate` for raw image bytes and
/// `{upload_base_url}/upload` for a shared public URL.
pub struct HttpImageBackend {
    client: Client,
    base_url: String,
    upload_base_url: String,
}

impl HttpImageBackend {
    pub fn new(client: Client, base_url: impl Into<String>, upload_base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            upload_base_url: upload_base_url.into(),
        }
    }
}

#[async_trait]
impl ImageBackend for HttpImageBackend {
    async fn generate(&self, prompt: &str, width: u32, height: u32, safety_tier: &str) -> Result<Vec<u8>, Error> {
        let url = format!("{}/generate", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "prompt": prompt,
            "width": width,
            "height": height,
            "safety_tier": safety_tier,
        });
        post_json_for_bytes(&self.client, &url, &body).await
    }

    async fn upload_public(&self, bytes: &[u8]) -> Result<String, Error> {
        let url = format!("{}/upload", self.upload_base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "bytes_b64": BASE64.encode(bytes) });
        let raw = post_json_for_text(&self.client, &url, &body).await?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| Error::backend_permanent(format!("malformed upload response: {e}")))?;
        value
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::backend_permanent("upload response missing `url` field"))
    }
}

/// Calls a presentation/slide-rendering backend over HTTP at `base_url`.
/// Each method maps to one REST-ish endpoint; the exact vendor contract is
/// an external collaborator (§1), so this adapter only fixes the generic
/// JSON shape, not a specific API.
pub struct HttpDeckBackend {
    client: Client,
    base_url: String,
}

impl HttpDeckBackend {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, Error> {
        let raw = post_json_for_text(&self.client, &self.url(path), &body).await?;
        serde_json::from_str(&raw).map_err(|e| Error::backend_permanent(format!("malformed response: {e}")))
    }
}

#[async_trait]
impl DeckBackend for HttpDeckBackend {
    async fn create_presentation(&self, title: &str) -> Result<(String, String), Error> {
        let resp = self.post("presentations", serde_json::json!({ "title": title })).await?;
        let id = resp
            .get("presentation_id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::backend_permanent("missing presentation_id"))?
            .to_string();
        let url = resp
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://slides.example/presentation/{id}"));
        Ok((id, url))
    }

    async fn delete_first_slide(&self, presentation_id: &str) -> Result<(), Error> {
        self.post(
            &format!("presentations/{presentation_id}/delete-first-slide"),
            serde_json::json!({}),
        )
        .await
        .map(|_| ())
    }

    async fn insert_slide(&self, presentation_id: &str, content: &SlideContent) -> Result<String, Error> {
        let body = serde_json::json!({
            "title": content.title,
            "subtitle": content.subtitle,
            "bullets": content.bullets,
            "image_url": content.image_url,
        });
        let resp = self.post(&format!("presentations/{presentation_id}/slides"), body).await?;
        resp.get("slide_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::backend_permanent("missing slide_id"))
    }

    async fn set_speaker_notes(&self, presentation_id: &str, slide_id: &str, script: &str) -> Result<(), Error> {
        self.post(
            &format!("presentations/{presentation_id}/slides/{slide_id}/notes"),
            serde_json::json!({ "script": script }),
        )
        .await
        .map(|_| ())
    }

    async fn insert_fallback_script_textbox(&self, presentation_id: &str, slide_id: &str, script: &str) -> Result<(), Error> {
        self.post(
            &format!("presentations/{presentation_id}/slides/{slide_id}/textbox"),
            serde_json::json!({ "label": "Presenter Script:", "text": script }),
        )
        .await
        .map(|_| ())
    }

    async fn upload_image(&self, local_path: &str, make_public: bool) -> Result<(String, Option<String>), Error> {
        let bytes = std::fs::read(local_path)
            .map_err(|e| Error::backend_permanent(format!("reading {local_path}: {e}")))?;
        let body = serde_json::json!({ "bytes_b64": BASE64.encode(&bytes), "make_public": make_public });
        let resp = self.post("images", body).await?;
        let handle = resp
            .get("file_id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::backend_permanent("missing file_id"))?
            .to_string();
        let url = resp.get("url").and_then(Value::as_str).map(str::to_string);
        Ok((handle, url))
    }
}
