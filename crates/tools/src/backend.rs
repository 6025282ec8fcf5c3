//! Backend capability traits.
//!
//! §1 fixes the remote model/rendering backends as external collaborators;
//! §6 fixes only the *shape* of each tool's params/result. These traits are
//! the seam between the two: one trait per capability, `Send + Sync`,
//! `#[async_trait]`, grounded in `sa_providers::traits::LlmProvider`
//! (provider-agnostic request/response structs, one method per operation,
//! no provider-specific types leaking through).

use async_trait::async_trait;

use reportdeck_domain::Error;

/// Produces raw (possibly code-fenced) JSON text from a summarization
/// prompt (§4.6 steps 1-2).
#[async_trait]
pub trait SummarizerBackend: Send + Sync {
    async fn summarize(&self, prompt: &str) -> Result<String, Error>;

    /// Used by the NL→SQL fallback (§4.10 step 3) and insights (§4.10
    /// step 9) — both are "ask the summarizer backend for plain text".
    async fn complete(&self, prompt: &str) -> Result<String, Error>;
}

/// Produces image bytes and (optionally) a public URL (§4.7).
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        width: u32,
        height: u32,
        safety_tier: &str,
    ) -> Result<Vec<u8>, Error>;

    async fn upload_public(&self, bytes: &[u8]) -> Result<String, Error>;
}

/// Slide content for one `insert_slide` call, independent of how the
/// backend renders it (§4.8 step 4).
#[derive(Debug, Clone)]
pub struct SlideContent {
    pub title: String,
    pub subtitle: Option<String>,
    pub bullets: Vec<String>,
    pub image_url: Option<String>,
}

/// Deck/slide rendering backend (§4.8).
#[async_trait]
pub trait DeckBackend: Send + Sync {
    /// Returns `(presentation_id, url)`.
    async fn create_presentation(&self, title: &str) -> Result<(String, String), Error>;

    /// Best-effort delete of the auto-created blank first slide
    /// (§4.8 step 3) — failures are logged and swallowed by the caller.
    async fn delete_first_slide(&self, presentation_id: &str) -> Result<(), Error>;

    /// Returns the new slide's id.
    async fn insert_slide(
        &self,
        presentation_id: &str,
        content: &SlideContent,
    ) -> Result<String, Error>;

    async fn set_speaker_notes(
        &self,
        presentation_id: &str,
        slide_id: &str,
        script: &str,
    ) -> Result<(), Error>;

    /// Fallback path when `set_speaker_notes` fails (§4.8 step 5): a small
    /// text box at the bottom of the slide labeled "Presenter Script:".
    async fn insert_fallback_script_textbox(
        &self,
        presentation_id: &str,
        slide_id: &str,
        script: &str,
    ) -> Result<(), Error>;

    /// Upload a local image file as a shared asset for a slide. Returns
    /// `(handle, public_url)`; `public_url` is `None` when `make_public` is
    /// false (the caller then falls back to a handle-derived link, §4.8
    /// / original `upload_image_to_drive`).
    async fn upload_image(&self, local_path: &str, make_public: bool) -> Result<(String, Option<String>), Error>;
}
