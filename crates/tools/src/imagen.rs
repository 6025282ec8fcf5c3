//! `image.generate` tool (C7, §4.7).
//!
//! Grounded in `mcp/tools/imagen.py`: the aspect→size lookup table, the
//! `<out_dir>/imagen_<unix_ts>.png` naming, and the retryable-HTTP backoff
//! are carried over; `return_drive_link` becomes `return_shared`
//! (SPEC_FULL.md §E.1: sharing uploads synchronously and returns `url`,
//! never a bare `local_path`, when requested).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use reportdeck_domain::model::ImageArtifact;
use reportdeck_domain::Error;
use reportdeck_protocol::Tool;
use reportdeck_retry::{retry, retryable_by_kind, RetryPolicy};

use crate::backend::ImageBackend;

/// §4.7 step 1: fixed aspect→(width, height) lookup.
fn aspect_to_size(aspect: &str) -> Result<(u32, u32), Error> {
    match aspect {
        "16:9" => Ok((1280, 720)),
        "1:1" => Ok((1024, 1024)),
        "4:3" => Ok((1024, 768)),
        other => Err(Error::bad_request(format!("unknown aspect: {other}"))),
    }
}

fn parse_explicit_size(size: &str) -> Result<(u32, u32), Error> {
    let (w, h) = size
        .split_once('x')
        .ok_or_else(|| Error::bad_request(format!("malformed size, expected WxH: {size}")))?;
    let w: u32 = w
        .parse()
        .map_err(|_| Error::bad_request(format!("malformed size width: {size}")))?;
    let h: u32 = h
        .parse()
        .map_err(|_| Error::bad_request(format!("malformed size height: {size}")))?;
    Ok((w, h))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageGenerateParams {
    pub prompt: String,
    #[serde(default = "default_aspect")]
    pub aspect: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default = "default_safety_tier")]
    pub safety_tier: String,
    #[serde(default)]
    pub return_shared: bool,
}

fn default_aspect() -> String {
    "16:9".to_string()
}
fn default_safety_tier() -> String {
    "default".to_string()
}

pub struct ImageGenerateTool {
    backend: Arc<dyn ImageBackend>,
    policy: RetryPolicy,
    out_dir: PathBuf,
}

impl ImageGenerateTool {
    pub fn new(backend: Arc<dyn ImageBackend>, policy: RetryPolicy, out_dir: PathBuf) -> Self {
        Self {
            backend,
            policy,
            out_dir,
        }
    }

    pub async fn generate(&self, params: &ImageGenerateParams) -> Result<ImageArtifact, Error> {
        let (width, height) = match &params.size {
            Some(size) => parse_explicit_size(size)?,
            None => aspect_to_size(&params.aspect)?,
        };

        let bytes = retry(&self.policy, retryable_by_kind, |_attempt| {
            self.backend
                .generate(&params.prompt, width, height, &params.safety_tier)
        })
        .await?;

        std::fs::create_dir_all(&self.out_dir)?;
        let path = self
            .out_dir
            .join(format!("imagen_{}.png", chrono::Utc::now().timestamp()));
        std::fs::write(&path, &bytes)?;

        if params.return_shared {
            let url = retry(&self.policy, retryable_by_kind, |_attempt| {
                self.backend.upload_public(&bytes)
            })
            .await?;
            return Ok(ImageArtifact::Url { value: url });
        }

        Ok(ImageArtifact::Local {
            value: path.to_string_lossy().to_string(),
        })
    }
}

#[async_trait]
impl Tool for ImageGenerateTool {
    fn method_name(&self) -> &str {
        "image.generate"
    }

    async fn call(&self, params: Value) -> Result<Value, Error> {
        let params: ImageGenerateParams = serde_json::from_value(params)
            .map_err(|e| Error::bad_request(format!("invalid image.generate params: {e}")))?;
        let artifact = self.generate(&params).await?;
        let result = match artifact {
            ImageArtifact::Local { value } => serde_json::json!({ "local_path": value }),
            ImageArtifact::Url { value } => serde_json::json!({ "url": value }),
            ImageArtifact::Handle { value } => serde_json::json!({ "drive_file_id": value }),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockImageBackend;

    fn params(return_shared: bool) -> ImageGenerateParams {
        ImageGenerateParams {
            prompt: "a modern data pipeline".into(),
            aspect: "16:9".into(),
            size: None,
            safety_tier: "default".into(),
            return_shared,
        }
    }

    #[test]
    fn aspect_table_matches_spec() {
        assert_eq!(aspect_to_size("16:9").unwrap(), (1280, 720));
        assert_eq!(aspect_to_size("1:1").unwrap(), (1024, 1024));
        assert_eq!(aspect_to_size("4:3").unwrap(), (1024, 768));
        assert!(aspect_to_size("21:9").is_err());
    }

    #[test]
    fn explicit_size_overrides_aspect() {
        assert_eq!(parse_explicit_size("640x480").unwrap(), (640, 480));
        assert!(parse_explicit_size("garbage").is_err());
    }

    #[tokio::test]
    async fn returns_local_path_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockImageBackend::with_images(vec![vec![1, 2, 3]]));
        let tool = ImageGenerateTool::new(backend, RetryPolicy::default(), dir.path().to_path_buf());
        let artifact = tool.generate(&params(false)).await.unwrap();
        match artifact {
            ImageArtifact::Local { value } => assert!(value.starts_with(dir.path().to_str().unwrap())),
            other => panic!("expected local artifact, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn return_shared_uploads_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(
            MockImageBackend::with_images(vec![vec![1, 2, 3]])
                .with_upload_urls(vec!["https://images.example/shared/x.png".into()]),
        );
        let tool = ImageGenerateTool::new(backend, RetryPolicy::default(), dir.path().to_path_buf());
        let artifact = tool.generate(&params(true)).await.unwrap();
        match artifact {
            ImageArtifact::Url { value } => assert_eq!(value, "https://images.example/shared/x.png"),
            other => panic!("expected url artifact, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn permanent_backend_failure_bubbles_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockImageBackend::with_generate_results(vec![Err(
            Error::backend_permanent("quota exceeded"),
        )]));
        let tool = ImageGenerateTool::new(backend.clone(), RetryPolicy::default(), dir.path().to_path_buf());
        let err = tool.generate(&params(false)).await.unwrap_err();
        assert_eq!(err.kind, reportdeck_domain::ErrorKind::BackendPermanent);
        assert_eq!(backend.generate_call_count(), 1);
    }
}
